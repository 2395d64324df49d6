use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("merge aborted: {0}")]
    Merge(String),
    #[error("chat history document is malformed: {0}")]
    InvalidDocument(String),
    #[error("first page fetch failed before any message was consumed: {0}")]
    NothingFetched(String),
}

/// Why a fetch ended permanently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermanentFailure {
    /// The feed has no further data; normal end of a walk.
    Exhausted,
    /// A genuine error mid-walk.
    Fault { reason: String },
}

/// Classified outcome of a failed page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// Safe to retry the identical request.
    Transient { reason: String },
    Permanent(PermanentFailure),
}

impl FetchFailure {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
        }
    }

    pub fn fault(reason: impl Into<String>) -> Self {
        Self::Permanent(PermanentFailure::Fault {
            reason: reason.into(),
        })
    }

    pub fn exhausted() -> Self {
        Self::Permanent(PermanentFailure::Exhausted)
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Transient { reason } => reason,
            Self::Permanent(PermanentFailure::Exhausted) => "exhausted",
            Self::Permanent(PermanentFailure::Fault { reason }) => reason,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarnCode {
    W001FetchRetry,
    W002RetryBudgetSpent,
    W003WalkInterrupted,
    W004MergeRejected,
    W005SpoolCleanup,
    W006AuditWrite,
}

impl WarnCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::W001FetchRetry => "W001_FETCH_RETRY",
            Self::W002RetryBudgetSpent => "W002_RETRY_BUDGET_SPENT",
            Self::W003WalkInterrupted => "W003_WALK_INTERRUPTED",
            Self::W004MergeRejected => "W004_MERGE_REJECTED",
            Self::W005SpoolCleanup => "W005_SPOOL_CLEANUP",
            Self::W006AuditWrite => "W006_AUDIT_WRITE",
        }
    }
}
