use serde::{Deserialize, Serialize};

/// Lifecycle state of a single attempt row, derived from its `completed` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum AttemptStatus {
    InProgress,
    Completed,
}

impl AttemptStatus {
    pub(crate) fn from_completed(completed: bool) -> Self {
        if completed {
            Self::Completed
        } else {
            Self::InProgress
        }
    }
}

/// Why a new attempt row was opened; used as a metrics label and in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpenReason {
    FirstTake,
    Retry,
}

impl OpenReason {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::FirstTake => "take",
            Self::Retry => "retry",
        }
    }
}
