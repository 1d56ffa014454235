//! Per-request session contexts.
//!
//! A session groups repeated runs for the same caller-supplied identifier
//! so their merged reports can be compared over time. Contexts live only in
//! process memory; durable history is the report store's job.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::MergedReport;

pub const DEFAULT_MODULE_ID: &str = "UnknownModule";
pub const DEFAULT_COHORT: &str = "DefaultCohort";

/// Caller-supplied run metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub module_id: Option<String>,
    pub cohort: Option<String>,
    /// Prior reports to seed a new session's history with
    pub previous_runs: Option<Vec<MergedReport>>,
}

impl RunMeta {
    pub fn new(module_id: Option<String>, cohort: Option<String>) -> Self {
        Self {
            module_id,
            cohort,
            previous_runs: None,
        }
    }

    pub fn with_previous_runs(mut self, runs: Vec<MergedReport>) -> Self {
        self.previous_runs = Some(runs);
        self
    }

    /// Module id, with a blank label treated as absent
    pub fn module_label(&self) -> Option<&str> {
        non_blank(self.module_id.as_deref())
    }

    /// Cohort, with a blank label treated as absent
    pub fn cohort_label(&self) -> Option<&str> {
        non_blank(self.cohort.as_deref())
    }
}

fn non_blank(label: Option<&str>) -> Option<&str> {
    label.filter(|s| !s.trim().is_empty())
}

/// Metadata and trend history for one session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionContext {
    pub session_id: String,
    pub module_id: String,
    pub cohort: String,
    /// Append-only, oldest first
    pub previous_runs: Vec<MergedReport>,
    pub created_at: DateTime<Utc>,
}

impl SessionContext {
    /// Build a fresh context, defaulting anything the meta leaves out
    pub fn seeded(session_id: impl Into<String>, meta: &RunMeta) -> Self {
        Self {
            session_id: session_id.into(),
            module_id: meta.module_label().unwrap_or(DEFAULT_MODULE_ID).to_string(),
            cohort: meta.cohort_label().unwrap_or(DEFAULT_COHORT).to_string(),
            previous_runs: meta.previous_runs.clone().unwrap_or_default(),
            created_at: Utc::now(),
        }
    }

    /// The most recent report before the latest one, for trend comparison
    pub fn previous(&self) -> Option<&MergedReport> {
        let len = self.previous_runs.len();
        if len < 2 {
            return None;
        }
        self.previous_runs.get(len - 2)
    }
}

/// Keyed store of session contexts
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, SessionContext>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<&SessionContext> {
        self.sessions.get(session_id)
    }

    pub fn set(&mut self, session_id: impl Into<String>, context: SessionContext) {
        self.sessions.insert(session_id.into(), context);
    }

    /// Fetch an existing context or create one from `meta`
    ///
    /// An existing context keeps its history; module and cohort are
    /// refreshed when the meta supplies non-blank labels.
    pub fn get_or_create(&mut self, session_id: &str, meta: &RunMeta) -> &mut SessionContext {
        let context = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionContext::seeded(session_id, meta));

        if let Some(module_id) = meta.module_label() {
            context.module_id = module_id.to_string();
        }
        if let Some(cohort) = meta.cohort_label() {
            context.cohort = cohort.to_string();
        }

        context
    }

    /// Append a report to a session's history; false if the session is unknown
    pub fn append_run(&mut self, session_id: &str, report: MergedReport) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(context) => {
                context.previous_runs.push(report);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, session_id: &str) -> Option<SessionContext> {
        self.sessions.remove(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(value: f64) -> MergedReport {
        [("x".to_string(), value)].into_iter().collect()
    }

    #[test]
    fn test_seeded_defaults() {
        let context = SessionContext::seeded("s1", &RunMeta::default());
        assert_eq!(context.module_id, DEFAULT_MODULE_ID);
        assert_eq!(context.cohort, DEFAULT_COHORT);
        assert!(context.previous_runs.is_empty());
    }

    #[test]
    fn test_get_or_create_keeps_history() {
        let mut store = SessionStore::new();
        let meta = RunMeta::new(Some("m1".into()), None).with_previous_runs(vec![report(0.1)]);

        store.get_or_create("s1", &meta);
        assert!(store.append_run("s1", report(0.2)));

        // Second fetch must not reseed from meta
        let context = store.get_or_create("s1", &meta);
        assert_eq!(context.previous_runs, vec![report(0.1), report(0.2)]);
        assert_eq!(context.previous(), Some(&report(0.1)));
    }

    #[test]
    fn test_get_or_create_refreshes_labels() {
        let mut store = SessionStore::new();
        store.get_or_create("s1", &RunMeta::default());
        let context = store.get_or_create("s1", &RunMeta::new(None, Some("spring".into())));
        assert_eq!(context.module_id, DEFAULT_MODULE_ID);
        assert_eq!(context.cohort, "spring");
    }

    #[test]
    fn test_blank_labels_count_as_absent() {
        let mut store = SessionStore::new();
        let blank = RunMeta::new(Some(String::new()), Some("  ".into()));

        let context = store.get_or_create("s1", &blank);
        assert_eq!(context.module_id, DEFAULT_MODULE_ID);
        assert_eq!(context.cohort, DEFAULT_COHORT);

        store.get_or_create("s1", &RunMeta::new(Some("m1".into()), Some("spring".into())));
        let context = store.get_or_create("s1", &blank);
        assert_eq!(context.module_id, "m1");
        assert_eq!(context.cohort, "spring");
    }

    #[test]
    fn test_append_to_unknown_session() {
        let mut store = SessionStore::new();
        assert!(!store.append_run("missing", report(1.0)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_set_and_remove() {
        let mut store = SessionStore::new();
        store.set("s1", SessionContext::seeded("s1", &RunMeta::default()));
        assert_eq!(store.len(), 1);
        assert!(store.remove("s1").is_some());
        assert!(store.get("s1").is_none());
    }
}
