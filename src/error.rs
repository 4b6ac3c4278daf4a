//! Engine error taxonomy.
//!
//! Only `SourceUnavailable` is fatal for an instance. Every other variant is
//! caught where it happens and downgraded to a logged warning so the frame
//! loop keeps running.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad or missing configuration input (zone file, config value).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Capture source cannot be opened or has ended unexpectedly.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// Alert or stream POST failed, timed out, or returned an unexpected status.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Evidence image could not be written to durable storage.
    #[error("evidence persistence failed: {0}")]
    EvidencePersistence(String),

    /// The upstream detector/tracker failed on one frame.
    #[error("detector failed: {0}")]
    Detector(String),
}

impl EngineError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::SourceUnavailable(_))
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_source_unavailable_is_fatal() {
        assert!(EngineError::SourceUnavailable("cam".into()).is_fatal());
        assert!(!EngineError::Delivery("503".into()).is_fatal());
        assert!(!EngineError::EvidencePersistence("disk full".into()).is_fatal());
        assert!(!EngineError::Configuration("zone".into()).is_fatal());
        assert!(!EngineError::Detector("eof".into()).is_fatal());
    }

    #[test]
    fn messages_carry_the_cause() {
        let err = EngineError::Delivery("status 503".into());
        assert_eq!(err.to_string(), "delivery failed: status 503");
    }
}
