// Error Taxonomy
// A single sum type for the failure modes the search-indexing core can
// surface. Each variant documents the policy a caller is expected to apply —
// fatal-at-init, retry, log-and-skip, or surface-to-caller.

use thiserror::Error;

/// Crate-wide error type for the search-indexing and query core.
#[derive(Debug, Error)]
pub enum Error {
    /// KQL failed to parse, or the transpiler hit a node it cannot map to a
    /// backend query. Surfaced to the caller as a 400-class response.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A backend failed its health check at construction, or stopped
    /// reporting green/yellow during a runtime ping. Fatal at init; callers
    /// may retry at runtime.
    #[error("search backend unhealthy: {0}")]
    UnhealthyCluster(String),

    /// The live index's mapping or settings differ from the bundled schema
    /// in a watched key. Fatal at init; an operator must act.
    #[error("index schema drift detected, manual action required: {0}")]
    ManualActionRequired(String),

    /// A resource lookup failed during Move/Delete/Restore/Purge. No
    /// partial mutation has been applied.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// An RPC or storage I/O call failed. The caller (typically the event
    /// bus) is expected to retry via a non-ack.
    #[error("transport error: {0}")]
    Transport(#[source] anyhow::Error),

    /// Input failed validation (empty body, bad content-type, malformed
    /// identifier). Surfaced to the caller as a 400-class response.
    #[error("validation error: {0}")]
    Validation(String),

    /// A non-recoverable failure inside an event handler. The worker that
    /// hit it must exit; a process supervisor decides what happens next.
    #[error("fatal event handler failure: {0}")]
    FatalEvent(String),

    /// A recoverable failure tied to a single event or a single key during
    /// a bulk pass (e.g. migration). The caller logs, counts, and
    /// continues.
    #[error("recoverable event error: {0}")]
    Event(String),
}

impl Error {
    /// True for variants that must abort the *whole* worker/process rather
    /// than being logged and skipped for the one item that failed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::UnhealthyCluster(_) | Error::ManualActionRequired(_) | Error::FatalEvent(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Transport(e.into())
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Error::Transport(e.into())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Error::Transport(e.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Transport(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_variants_are_exactly_the_documented_three() {
        assert!(Error::UnhealthyCluster("x".into()).is_fatal());
        assert!(Error::ManualActionRequired("x".into()).is_fatal());
        assert!(Error::FatalEvent("x".into()).is_fatal());
        assert!(!Error::InvalidQuery("x".into()).is_fatal());
        assert!(!Error::NotFound("x".into()).is_fatal());
        assert!(!Error::Event("x".into()).is_fatal());
    }

    #[test]
    fn display_messages_are_human_readable() {
        let err = Error::NotFound("storage$space!opaque".to_string());
        assert_eq!(err.to_string(), "resource not found: storage$space!opaque");
    }
}
