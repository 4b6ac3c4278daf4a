//! RailGuard engine
//!
//! Zone dwell-time tracking and alert dispatch for one camera.
//!
//! # Architecture
//!
//! Each camera runs as an independent instance that processes frames strictly
//! in sequence:
//!
//! 1. **Detect**: the external detector/tracker supplies per-frame detections
//!    with stable track ids.
//! 2. **Dwell**: a track's continuous time inside the restricted zone is
//!    measured from its entry; leaving the zone (or a frame with no
//!    detections at all) resets it.
//! 3. **Alert**: once dwell reaches the threshold for an allow-listed class,
//!    an alert fires at most once per cooldown window per track. Evidence is
//!    written to local disk before one best-effort delivery attempt.
//! 4. **Publish**: an annotated frame is pushed to the live view, throttled
//!    to a fixed interval and independent of alert state.
//!
//! Only a source that cannot be opened stops an instance. Delivery and
//! persistence failures are logged and the loop carries on.
//!
//! # Module Structure
//!
//! - `zone`, `dwell`: zone polygon and per-track dwell timing
//! - `alert`: cooldown-gated dispatch, evidence store, undelivered-alert outbox
//! - `stream`: throttled live-view publisher
//! - `cycle`: the per-frame pipeline and run loop
//! - `detect`, `ingest`, `frame`: detector seam, frame sources, owned frames
//! - `transport`: HTTP, JSON-lines and in-memory sinks
//! - `config`, `error`: configuration loading and the error taxonomy

pub mod alert;
pub mod config;
pub mod cycle;
pub mod detect;
pub mod dwell;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod stream;
pub mod transport;
pub mod zone;

pub use alert::{
    Alert, AlertDispatcher, AlertOutbox, AlertPayload, AlertPolicy, DirectoryEvidenceStore,
    DispatchStats, EvidenceRef, EvidenceStore,
};
pub use config::EngineConfig;
pub use cycle::{CycleReport, FrameCycle, RunSummary, StepOutcome};
pub use detect::{
    BoundingBox, Detection, Point, ReplayDetector, ScriptedDetector, TrackId, TrackingDetector,
};
pub use dwell::{DwellTracker, ExitPolicy};
pub use error::{EngineError, EngineResult};
pub use frame::Frame;
pub use ingest::{open_source, FrameSource, SourceConfig};
pub use stream::{PublishOutcome, StreamPublisher};
pub use transport::{AlertSink, FrameSink};
pub use zone::ZonePolygon;
