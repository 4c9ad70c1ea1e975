use crate::intset::IntSetKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Knobs for one analysis run.
///
/// The command-line driver persists this with `confy` between runs; library users usually
/// start from [`Default`] and change a field or two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Name of a registered heap abstraction policy
    pub policy: String,
    /// Maximum length of a method context
    pub depth: usize,
    /// Maximum length of a heap context
    pub heap_depth: usize,
    /// Distinguish the most recently allocated object of each site from older ones
    pub recency: bool,
    /// Worker threads; `0` uses one per available core
    pub workers: usize,
    /// Give up after this many milliseconds and return the partial graph
    pub timeout_ms: Option<u64>,
    pub set_kind: IntSetKind,
    /// Call the heap abstraction twice for every request and fail if the answers differ
    pub verify_policy: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            policy: "object".to_string(),
            depth: 2,
            heap_depth: 1,
            recency: false,
            workers: 0,
            timeout_ms: None,
            set_kind: IntSetKind::default(),
            verify_policy: false,
        }
    }
}

impl AnalysisConfig {
    pub fn with_policy<S: Into<String>>(mut self, policy: S) -> Self {
        self.policy = policy.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}
