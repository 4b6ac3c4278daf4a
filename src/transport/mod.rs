//! Outbound delivery for alerts and live-view frames.
//!
//! Both directions are best-effort: a sink reports failure as
//! [`EngineError::Delivery`] and the caller decides whether to log, spool or
//! drop. Sinks never retry on their own.

pub mod file;
pub mod http;
pub mod memory;

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use url::Url;

use crate::alert::AlertPayload;
use crate::error::{EngineError, EngineResult};

pub use file::JsonlAlertSink;
pub use http::{HttpAlertSink, HttpFrameSink};
pub use memory::{MemoryAlertSink, MemoryFrameSink};

/// Receiver of alert payloads (the backend push endpoint in production).
pub trait AlertSink {
    fn describe(&self) -> String;
    fn deliver(&mut self, payload: &AlertPayload) -> EngineResult<()>;
}

/// Receiver of encoded live-view frames.
pub trait FrameSink {
    fn describe(&self) -> String;
    fn publish(&mut self, jpeg: &[u8]) -> EngineResult<()>;
}

impl<S: AlertSink + ?Sized> AlertSink for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn deliver(&mut self, payload: &AlertPayload) -> EngineResult<()> {
        (**self).deliver(payload)
    }
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn publish(&mut self, jpeg: &[u8]) -> EngineResult<()> {
        (**self).publish(jpeg)
    }
}

/// Pick an alert sink from the configured URL.
///
/// `http(s)://` posts to the backend; `file://` appends JSON lines locally,
/// which is what the replay tool uses.
pub fn alert_sink_for(url: &str, timeout: Duration) -> Result<Box<dyn AlertSink>> {
    let parsed = Url::parse(url).with_context(|| format!("parse alert url '{}'", url))?;
    match parsed.scheme() {
        "http" | "https" => Ok(Box::new(HttpAlertSink::new(url, timeout)?)),
        "file" => {
            let path = parsed
                .to_file_path()
                .map_err(|_| anyhow!("alert url '{}' is not a local file path", url))?;
            Ok(Box::new(JsonlAlertSink::new(path)))
        }
        other => Err(anyhow!(
            "unsupported alert url scheme '{}'; expected http(s) or file",
            other
        )),
    }
}

pub(crate) fn validate_http_url(url: &str) -> EngineResult<Url> {
    let parsed = Url::parse(url)
        .map_err(|e| EngineError::Configuration(format!("invalid url '{}': {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(EngineError::Configuration(format!(
            "unsupported scheme '{}' in '{}'; expected http(s)",
            other, url
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_sink_by_scheme() {
        let timeout = Duration::from_secs(1);
        let http = alert_sink_for("http://localhost:8080/api/internal/push", timeout).unwrap();
        assert!(http.describe().starts_with("http://localhost:8080"));

        let dir = tempfile::tempdir().unwrap();
        let url = Url::from_file_path(dir.path().join("alerts.jsonl")).unwrap();
        let file = alert_sink_for(url.as_str(), timeout).unwrap();
        assert!(file.describe().ends_with("alerts.jsonl"));

        assert!(alert_sink_for("mqtt://broker/topic", timeout).is_err());
        assert!(alert_sink_for("not a url", timeout).is_err());
    }

    #[test]
    fn http_url_validation_rejects_other_schemes() {
        assert!(validate_http_url("https://example.com/x").is_ok());
        assert!(matches!(
            validate_http_url("ftp://example.com/x"),
            Err(EngineError::Configuration(_))
        ));
    }
}
