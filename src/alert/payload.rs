use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Alert;
use crate::detect::TrackId;

pub const ALERT_TYPE: &str = "OBSTACLE_STUCK";

/// JSON body posted to the backend push endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub object_class: String,
    pub confidence: f64,
    pub in_roi: bool,
    pub object_id: TrackId,
    pub duration_seconds: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<String>,
    #[serde(default)]
    pub image_url: String,
}

impl From<&Alert> for AlertPayload {
    fn from(alert: &Alert) -> Self {
        Self {
            kind: ALERT_TYPE.to_string(),
            object_class: alert.class_label.clone(),
            confidence: round_to(alert.confidence as f64, 4),
            in_roi: true,
            object_id: alert.object_id,
            duration_seconds: round_to(alert.dwell.as_secs_f64(), 3),
            timestamp: alert.timestamp,
            camera_id: alert.camera_id.clone(),
            image_url: alert.image_url.clone(),
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}
