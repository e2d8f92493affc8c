use super::request::RequestDescriptor;
use std::fmt;
use std::sync::Arc;

/// Identifier the session assigns to every network dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Where a delivered response originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provenance {
    /// Fresh response from the transport.
    Network,
    /// The transport answered from its own HTTP cache.
    SystemCache,
    /// Served from this crate's response cache, either as a valid entry or as a
    /// contingent fallback after a failed network attempt.
    AppCache,
    /// Synthesized from endpoint mock data.
    Mock,
    /// The request never became dispatchable (e.g., the URL did not compose).
    Invalid,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::Network => "network",
            Provenance::SystemCache => "system_cache",
            Provenance::AppCache => "app_cache",
            Provenance::Mock => "mock",
            Provenance::Invalid => "invalid",
        }
    }

    pub fn is_cached(self) -> bool {
        matches!(self, Provenance::SystemCache | Provenance::AppCache)
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dispatch attempt.
///
/// Only network dispatches carry an identifier. Two tasks are equal when they
/// share identifier and request, regardless of provenance.
#[derive(Debug, Clone)]
pub struct Task {
    id: Option<TaskId>,
    request: Arc<RequestDescriptor>,
    provenance: Provenance,
}

impl Task {
    pub(crate) fn new(
        id: Option<TaskId>,
        request: Arc<RequestDescriptor>,
        provenance: Provenance,
    ) -> Self {
        Self {
            id,
            request,
            provenance,
        }
    }

    pub fn id(&self) -> Option<TaskId> {
        self.id
    }

    pub fn request(&self) -> &RequestDescriptor {
        &self.request
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// Same task, re-labelled (a failed network task answered from cache).
    pub(crate) fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.request == other.request
    }
}

impl Eq for Task {}
