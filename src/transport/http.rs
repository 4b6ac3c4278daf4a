//! HTTP sinks backed by a blocking `ureq` agent.
//!
//! Each sink owns its agent so the alert and stream paths get independent
//! timeouts. Timeout expiry is the only cancellation mechanism.

use std::time::Duration;

use ureq::{Agent, AgentBuilder, Response};

use super::{validate_http_url, AlertSink, FrameSink};
use crate::alert::AlertPayload;
use crate::error::{EngineError, EngineResult};

/// Status the live-view ingest endpoint answers with.
pub const STREAM_ACCEPTED: u16 = 202;

pub struct HttpAlertSink {
    agent: Agent,
    url: String,
}

impl HttpAlertSink {
    pub fn new(url: &str, timeout: Duration) -> EngineResult<Self> {
        validate_http_url(url)?;
        Ok(Self {
            agent: build_agent(timeout),
            url: url.to_string(),
        })
    }
}

impl AlertSink for HttpAlertSink {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn deliver(&mut self, payload: &AlertPayload) -> EngineResult<()> {
        let status = check_status(self.agent.post(&self.url).send_json(payload), &self.url)?;
        log::debug!("alert for track {} accepted ({})", payload.object_id, status);
        Ok(())
    }
}

pub struct HttpFrameSink {
    agent: Agent,
    url: String,
}

impl HttpFrameSink {
    pub fn new(url: &str, timeout: Duration) -> EngineResult<Self> {
        validate_http_url(url)?;
        Ok(Self {
            agent: build_agent(timeout),
            url: url.to_string(),
        })
    }
}

impl FrameSink for HttpFrameSink {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn publish(&mut self, jpeg: &[u8]) -> EngineResult<()> {
        let result = self
            .agent
            .post(&self.url)
            .set("Content-Type", "image/jpeg")
            .send_bytes(jpeg);
        let status = check_status(result, &self.url)?;
        if status != STREAM_ACCEPTED {
            log::debug!("stream endpoint answered {} (expected {})", status, STREAM_ACCEPTED);
        }
        Ok(())
    }
}

fn build_agent(timeout: Duration) -> Agent {
    AgentBuilder::new().timeout(timeout).build()
}

/// Map a ureq result to the delivery taxonomy: any 2xx is success.
fn check_status(result: Result<Response, ureq::Error>, url: &str) -> EngineResult<u16> {
    match result {
        Ok(response) => {
            let status = response.status();
            if (200..300).contains(&status) {
                Ok(status)
            } else {
                Err(EngineError::Delivery(format!(
                    "{} answered unexpected status {}",
                    url, status
                )))
            }
        }
        Err(ureq::Error::Status(status, _)) => Err(EngineError::Delivery(format!(
            "{} answered status {}",
            url, status
        ))),
        Err(ureq::Error::Transport(transport)) => {
            Err(EngineError::Delivery(format!("{}: {}", url, transport)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_urls() {
        assert!(HttpAlertSink::new("file:///tmp/x", Duration::from_secs(1)).is_err());
        assert!(HttpFrameSink::new("", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn unreachable_endpoint_is_a_delivery_failure() {
        // Port 9 on loopback is almost never listening; refusal is immediate.
        let mut sink =
            HttpFrameSink::new("http://127.0.0.1:9/stream", Duration::from_millis(300)).unwrap();
        let err = sink.publish(&[0xFF, 0xD8, 0xFF, 0xD9]).unwrap_err();
        assert!(matches!(err, EngineError::Delivery(_)));
    }
}
