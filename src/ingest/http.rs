//! HTTP camera source.
//!
//! `connect` issues one GET. A `multipart/*` response is treated as an MJPEG
//! stream and scanned for JPEG start/end markers; anything else is treated as
//! a snapshot endpoint that is re-fetched for every frame. Frames arriving
//! faster than `target_fps` are dropped.
//!
//! A read failure after `connect` drops the stream and marks the source
//! unhealthy. The next `next_frame` call reconnects after a delay that grows
//! with consecutive failures.

use std::io::Read;
use std::time::{Duration, Instant};

use ureq::{Agent, AgentBuilder};

use super::{frame_interval, health_grace, FrameSource, SourceConfig, SourceStats};
use crate::error::{EngineError, EngineResult};
use crate::frame::Frame;

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_BASE: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(5);

pub struct HttpJpegSource {
    config: SourceConfig,
    agent: Agent,
    stream: Option<HttpStream>,
    last_frame_at: Option<Instant>,
    connected_at: Option<Instant>,
    frame_count: u64,
    last_error: Option<String>,
    failures: u32,
    reconnect_at: Option<Instant>,
}

enum HttpStream {
    Mjpeg(MjpegStream),
    Snapshot,
}

impl HttpJpegSource {
    pub fn new(config: SourceConfig) -> EngineResult<Self> {
        crate::transport::validate_http_url(&config.url)
            .map_err(|e| EngineError::SourceUnavailable(e.to_string()))?;
        let agent = AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build();
        Ok(Self {
            config,
            agent,
            stream: None,
            last_frame_at: None,
            connected_at: None,
            frame_count: 0,
            last_error: None,
            failures: 0,
            reconnect_at: None,
        })
    }

    fn read_jpeg(&mut self) -> EngineResult<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or_else(|| {
            EngineError::SourceUnavailable("http source not connected; call connect() first".into())
        })?;
        match stream {
            HttpStream::Mjpeg(stream) => stream.read_next_jpeg(),
            HttpStream::Snapshot => fetch_snapshot(&self.agent, &self.config.url),
        }
    }

    fn open_stream(&mut self) -> EngineResult<()> {
        let response = self.agent.get(&self.config.url).call().map_err(|e| {
            EngineError::SourceUnavailable(format!("connect to {}: {}", self.config.url, e))
        })?;
        let content_type = response.header("Content-Type").unwrap_or("").to_lowercase();
        if content_type.contains("multipart") {
            self.stream = Some(HttpStream::Mjpeg(MjpegStream::new(response.into_reader())));
            log::info!("connected to mjpeg stream {}", self.config.url);
        } else {
            self.stream = Some(HttpStream::Snapshot);
            log::info!("connected to snapshot endpoint {}", self.config.url);
        }
        self.connected_at = Some(Instant::now());
        self.reconnect_at = None;
        Ok(())
    }

    /// Forget the broken stream; the next call reconnects after a delay.
    fn drop_stream(&mut self, err: &EngineError) {
        self.failures = self.failures.saturating_add(1);
        let delay = reconnect_delay(self.failures);
        log::info!(
            "{}: {}; reconnecting in {:.1}s",
            self.config.url,
            err,
            delay.as_secs_f64()
        );
        self.last_error = Some(err.to_string());
        self.stream = None;
        self.reconnect_at = Some(Instant::now() + delay);
    }

    fn reconnect(&mut self) -> EngineResult<()> {
        if let Some(at) = self.reconnect_at {
            let now = Instant::now();
            if at > now {
                std::thread::sleep(at - now);
            }
        }
        if let Err(err) = self.open_stream() {
            self.drop_stream(&err);
            return Err(err);
        }
        Ok(())
    }
}

impl FrameSource for HttpJpegSource {
    fn connect(&mut self) -> EngineResult<()> {
        self.open_stream()?;
        self.last_error = None;
        self.failures = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> EngineResult<Option<Frame>> {
        if self.stream.is_none() && self.connected_at.is_some() {
            self.reconnect()?;
        }
        let min_interval = frame_interval(self.config.target_fps);
        loop {
            let jpeg = match self.read_jpeg() {
                Ok(jpeg) => jpeg,
                Err(err) => {
                    self.drop_stream(&err);
                    return Err(err);
                }
            };

            let now = Instant::now();
            if let Some(last) = self.last_frame_at {
                if now.duration_since(last) < min_interval {
                    continue;
                }
            }

            let image = match image::load_from_memory(&jpeg) {
                Ok(image) => image.into_rgb8(),
                Err(err) => {
                    log::debug!("dropping undecodable frame: {}", err);
                    continue;
                }
            };
            if self.failures > 0 {
                log::info!("{} recovered", self.config.url);
            }
            self.failures = 0;
            self.last_error = None;
            self.frame_count += 1;
            self.last_frame_at = Some(now);
            return Ok(Some(Frame::new(image, self.frame_count)));
        }
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(connected_at) = self.connected_at else {
            return false;
        };
        let Some(last_frame_at) = self.last_frame_at else {
            return connected_at.elapsed() <= Duration::from_secs(5);
        };
        last_frame_at.elapsed() <= health_grace(self.config.target_fps)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}

struct MjpegStream {
    reader: Box<dyn Read + Send + Sync>,
    buffer: Vec<u8>,
}

impl MjpegStream {
    fn new(reader: Box<dyn Read + Send + Sync>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    fn read_next_jpeg(&mut self) -> EngineResult<Vec<u8>> {
        let mut chunk = vec![0u8; 8192];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(frame);
            }

            let read = self
                .reader
                .read(&mut chunk)
                .map_err(|e| EngineError::SourceUnavailable(format!("read mjpeg chunk: {}", e)))?;
            if read == 0 {
                return Err(EngineError::SourceUnavailable("mjpeg stream ended".into()));
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                let keep = 2.min(self.buffer.len());
                let drain_len = self.buffer.len() - keep;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

fn fetch_snapshot(agent: &Agent, url: &str) -> EngineResult<Vec<u8>> {
    let response = agent
        .get(url)
        .call()
        .map_err(|e| EngineError::SourceUnavailable(format!("fetch snapshot {}: {}", url, e)))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_JPEG_BYTES as u64)
        .read_to_end(&mut bytes)
        .map_err(|e| EngineError::SourceUnavailable(format!("read snapshot: {}", e)))?;
    if bytes.is_empty() {
        return Err(EngineError::SourceUnavailable("empty snapshot".into()));
    }
    Ok(bytes)
}

/// `base * 2^(failures-1)`, capped.
fn reconnect_delay(failures: u32) -> Duration {
    let exp = failures.saturating_sub(1).min(8);
    RECONNECT_BASE.saturating_mul(1u32 << exp).min(RECONNECT_MAX)
}

/// Byte range of the first complete SOI..EOI JPEG in `buffer`.
fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn finds_jpeg_between_markers() {
        let buf = [0x00, 0x11, 0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9, 0x33];
        assert_eq!(find_jpeg_bounds(&buf), Some((2, 8)));
        assert_eq!(find_jpeg_bounds(&[0xFF, 0xD8, 0x01]), None);
        assert_eq!(find_jpeg_bounds(&[0x01, 0x02]), None);
    }

    #[test]
    fn mjpeg_stream_yields_frames_then_ends() {
        let jpeg = crate::frame::encode_jpeg(
            &image::RgbImage::from_pixel(4, 4, image::Rgb([1, 2, 3])),
            80,
        )
        .unwrap();
        let mut body = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        body.extend_from_slice(&jpeg);
        body.extend_from_slice(b"\r\n--frame\r\n");
        body.extend_from_slice(&jpeg);

        let mut stream = MjpegStream::new(Box::new(Cursor::new(body)));
        assert_eq!(stream.read_next_jpeg().unwrap(), jpeg);
        assert_eq!(stream.read_next_jpeg().unwrap(), jpeg);
        assert!(matches!(
            stream.read_next_jpeg(),
            Err(EngineError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn reconnect_delay_grows_and_is_capped() {
        assert_eq!(reconnect_delay(1), Duration::from_secs(1));
        assert_eq!(reconnect_delay(2), Duration::from_secs(2));
        assert_eq!(reconnect_delay(3), Duration::from_secs(4));
        assert_eq!(reconnect_delay(10), RECONNECT_MAX);
    }

    #[test]
    fn rejects_non_http_url() {
        let config = SourceConfig {
            url: "udp://0.0.0.0:5000".into(),
            ..SourceConfig::default()
        };
        assert!(HttpJpegSource::new(config).is_err());
    }
}
