//! HTTP specialist that delegates scoring to a remote service.
//!
//! The analysis request is POSTed as JSON; the service answers with a JSON
//! object mapping field names to numbers. Transport failures and 429/502/503
//! responses map to transient errors so the retry policy can handle them.

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{AnalysisRequest, Payload, SpecialistError};

use super::{MetricField, Specialist};

/// Longest response body kept in an error message
const MAX_ERROR_BODY: usize = 200;

/// Remote specialist reached over HTTP
pub struct HttpSpecialist {
    name: String,
    url: String,
    fields: Vec<MetricField>,
    client: reqwest::Client,
}

impl HttpSpecialist {
    pub fn new(name: String, url: String, fields: Vec<MetricField>) -> Self {
        Self {
            name,
            url,
            fields,
            client: reqwest::Client::new(),
        }
    }
}

/// Map a non-success status to a specialist error
pub fn status_error(code: u16, body: &str) -> SpecialistError {
    let mut message = body.trim().to_string();
    if message.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }

    match code {
        429 => SpecialistError::RateLimited(message),
        _ => SpecialistError::Status { code, message },
    }
}

fn transport_error(e: reqwest::Error) -> SpecialistError {
    if e.is_timeout() {
        SpecialistError::Timeout(e.to_string())
    } else if e.is_connect() || e.is_request() {
        SpecialistError::Connection(e.to_string())
    } else {
        SpecialistError::Other(e.to_string())
    }
}

/// Extract numeric entries from a JSON object response
pub fn parse_payload(value: serde_json::Value) -> Result<Payload, SpecialistError> {
    let object = value
        .as_object()
        .ok_or_else(|| SpecialistError::InvalidPayload("response is not a JSON object".into()))?;

    Ok(object
        .iter()
        .filter_map(|(k, v)| v.as_f64().map(|n| (k.clone(), n)))
        .collect())
}

#[async_trait]
impl Specialist for HttpSpecialist {
    fn name(&self) -> &str {
        &self.name
    }

    fn fields(&self) -> &[MetricField] {
        &self.fields
    }

    async fn invoke(&self, request: &AnalysisRequest) -> Result<Payload, SpecialistError> {
        debug!(specialist = %self.name, url = %self.url, "Invoking remote specialist");

        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &body));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SpecialistError::InvalidPayload(e.to_string()))?;

        parse_payload(value)
    }
}
