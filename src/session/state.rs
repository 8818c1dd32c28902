//! Session status and the snapshot published to observers

use serde::Serialize;
use std::fmt;

use crate::storage::FeedRecord;

/// Where the session is in its lifecycle
///
/// ```text
/// Loading ──ok──> Ready
///    └──err──> Error ──> Recovering ──ok──> Ready
///                             └──err──> Error (final)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum SessionStatus {
    Loading,
    Ready,
    Recovering,
    /// User-facing message
    Error(String),
}

impl SessionStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, SessionStatus::Ready)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SessionStatus::Error(_))
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Loading => write!(f, "loading"),
            SessionStatus::Ready => write!(f, "ready"),
            SessionStatus::Recovering => write!(f, "recovering"),
            SessionStatus::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// Working set plus status, as last published
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    /// Newest first
    pub records: Vec<FeedRecord>,
}

impl SessionSnapshot {
    pub(crate) fn loading() -> Self {
        Self {
            status: SessionStatus::Loading,
            records: Vec::new(),
        }
    }
}
