//! Detector/tracker seam.
//!
//! The object model and the tracker live outside this crate. This module
//! defines what the engine expects back per frame and ships two backends:
//! a JSON-lines replay (file or stdin) and a scripted list for tests.

mod backend;
pub mod backends;
mod result;

pub use backend::TrackingDetector;
pub use backends::{ReplayBatch, ReplayDetector, ScriptedDetector};
pub use result::{BoundingBox, Detection, Point, TrackId};
