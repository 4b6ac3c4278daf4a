pub mod replay;
pub mod scripted;

pub use replay::{ReplayBatch, ReplayDetector};
pub use scripted::ScriptedDetector;
