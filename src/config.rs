use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::alert::DEFAULT_CLASSES;
use crate::dwell::ExitPolicy;
use crate::ingest::SourceConfig;

const DEFAULT_SOURCE_URL: &str = "stub://cam1";
const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_SOURCE_WIDTH: u32 = 1280;
const DEFAULT_SOURCE_HEIGHT: u32 = 720;
const DEFAULT_THRESHOLD_SECS: f64 = 3.0;
const DEFAULT_ALERT_URL: &str = "http://localhost:8080/api/internal/push";
const DEFAULT_ALERT_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_COOLDOWN_SECS: f64 = 5.0;
const DEFAULT_MIN_CONFIDENCE: f32 = 0.45;
const DEFAULT_EVIDENCE_DIR: &str = "evidence";
const DEFAULT_EVIDENCE_BASE_URL: &str = "http://localhost:8080/evidence";
const DEFAULT_EVIDENCE_JPEG_QUALITY: u8 = 90;
const DEFAULT_STREAM_INTERVAL_MS: u64 = 100;
const DEFAULT_STREAM_TIMEOUT_MS: u64 = 300;
const DEFAULT_STREAM_JPEG_QUALITY: u8 = 70;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct EngineConfigFile {
    camera_id: Option<String>,
    source: Option<SourceConfigFile>,
    zone: Option<ZoneConfigFile>,
    dwell: Option<DwellConfigFile>,
    alert: Option<AlertConfigFile>,
    evidence: Option<EvidenceConfigFile>,
    stream: Option<StreamConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    #[serde(rename = "loop")]
    looping: Option<bool>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ZoneConfigFile {
    path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DwellConfigFile {
    threshold_secs: Option<f64>,
    exit_policy: Option<String>,
    max_missed_frames: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AlertConfigFile {
    url: Option<String>,
    timeout_ms: Option<u64>,
    cooldown_secs: Option<f64>,
    classes: Option<Vec<String>>,
    min_confidence: Option<f32>,
    outbox_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct EvidenceConfigFile {
    dir: Option<PathBuf>,
    public_base_url: Option<String>,
    font_path: Option<PathBuf>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct StreamConfigFile {
    url: Option<String>,
    interval_ms: Option<u64>,
    timeout_ms: Option<u64>,
    jpeg_quality: Option<u8>,
}

/// Resolved configuration for one camera instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub camera_id: Option<String>,
    pub source: SourceConfig,
    pub zone_path: Option<PathBuf>,
    pub dwell: DwellSettings,
    pub alert: AlertSettings,
    pub evidence: EvidenceSettings,
    pub stream: StreamSettings,
}

#[derive(Debug, Clone)]
pub struct DwellSettings {
    pub threshold_secs: f64,
    pub exit_policy: ExitPolicy,
}

#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub url: String,
    pub timeout: Duration,
    pub cooldown_secs: f64,
    pub classes: Vec<String>,
    pub min_confidence: f32,
    pub outbox_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct EvidenceSettings {
    pub dir: PathBuf,
    pub public_base_url: String,
    pub font_path: Option<PathBuf>,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Live-view ingest URL; publishing is disabled when unset.
    pub url: Option<String>,
    pub interval: Duration,
    pub timeout: Duration,
    pub jpeg_quality: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_sections(EngineConfigFile::default(), ExitPolicy::Immediate)
    }
}

impl EngineConfig {
    /// Load from the file named by `RAILGUARD_CONFIG` (if any), then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("RAILGUARD_CONFIG")
            .ok()
            .filter(|p| !p.trim().is_empty());
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => EngineConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn threshold(&self) -> Duration {
        Duration::from_secs_f64(self.dwell.threshold_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.alert.cooldown_secs)
    }

    fn from_file(file: EngineConfigFile) -> Result<Self> {
        let (name, max_missed_frames) = match file.dwell.as_ref() {
            Some(dwell) => (dwell.exit_policy.as_deref(), dwell.max_missed_frames),
            None => (None, None),
        };
        let exit_policy = match name {
            Some(name) => parse_exit_policy(
                name,
                ExitPolicy::Grace {
                    max_missed_frames: max_missed_frames.unwrap_or(0),
                },
            )?,
            None => ExitPolicy::Immediate,
        };
        if max_missed_frames.is_some() && exit_policy == ExitPolicy::Immediate {
            return Err(anyhow!(
                "dwell.max_missed_frames only applies with dwell.exit_policy = \"grace\""
            ));
        }
        Ok(Self::from_sections(file, exit_policy))
    }

    fn from_sections(file: EngineConfigFile, exit_policy: ExitPolicy) -> Self {
        let source = file.source.unwrap_or_default();
        let dwell = file.dwell.unwrap_or_default();
        let alert = file.alert.unwrap_or_default();
        let evidence = file.evidence.unwrap_or_default();
        let stream = file.stream.unwrap_or_default();

        Self {
            camera_id: file.camera_id.filter(|id| !id.trim().is_empty()),
            source: SourceConfig {
                url: source
                    .url
                    .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
                target_fps: source.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
                looping: source.looping.unwrap_or(false),
                width: source.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
                height: source.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
            },
            zone_path: file.zone.and_then(|zone| zone.path),
            dwell: DwellSettings {
                threshold_secs: dwell.threshold_secs.unwrap_or(DEFAULT_THRESHOLD_SECS),
                exit_policy,
            },
            alert: AlertSettings {
                url: alert.url.unwrap_or_else(|| DEFAULT_ALERT_URL.to_string()),
                timeout: Duration::from_millis(
                    alert.timeout_ms.unwrap_or(DEFAULT_ALERT_TIMEOUT_MS),
                ),
                cooldown_secs: alert.cooldown_secs.unwrap_or(DEFAULT_COOLDOWN_SECS),
                classes: alert.classes.unwrap_or_else(|| {
                    DEFAULT_CLASSES.iter().map(|c| c.to_string()).collect()
                }),
                min_confidence: alert.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE),
                outbox_dir: alert.outbox_dir,
            },
            evidence: EvidenceSettings {
                dir: evidence
                    .dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_EVIDENCE_DIR)),
                public_base_url: evidence
                    .public_base_url
                    .unwrap_or_else(|| DEFAULT_EVIDENCE_BASE_URL.to_string()),
                font_path: evidence.font_path,
                jpeg_quality: evidence
                    .jpeg_quality
                    .unwrap_or(DEFAULT_EVIDENCE_JPEG_QUALITY),
            },
            stream: StreamSettings {
                url: stream.url.filter(|url| !url.trim().is_empty()),
                interval: Duration::from_millis(
                    stream.interval_ms.unwrap_or(DEFAULT_STREAM_INTERVAL_MS),
                ),
                timeout: Duration::from_millis(
                    stream.timeout_ms.unwrap_or(DEFAULT_STREAM_TIMEOUT_MS),
                ),
                jpeg_quality: stream.jpeg_quality.unwrap_or(DEFAULT_STREAM_JPEG_QUALITY),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        // CAMERA_ID and STREAM_URL are what a multi-camera supervisor sets.
        for key in ["CAMERA_ID", "RAILGUARD_CAMERA_ID"] {
            if let Some(id) = env_string(key) {
                self.camera_id = Some(id);
            }
        }
        if let Some(url) = env_string("RAILGUARD_SOURCE_URL") {
            self.source.url = url;
        }
        if let Some(fps) = env_parse("RAILGUARD_SOURCE_FPS")? {
            self.source.target_fps = fps;
        }
        if let Some(looping) = env_parse("RAILGUARD_SOURCE_LOOP")? {
            self.source.looping = looping;
        }
        if let Some(path) = env_string("RAILGUARD_ZONE_PATH") {
            self.zone_path = Some(PathBuf::from(path));
        }
        if let Some(secs) = env_parse("RAILGUARD_DWELL_THRESHOLD_SECS")? {
            self.dwell.threshold_secs = secs;
        }
        if let Some(policy) = env_string("RAILGUARD_EXIT_POLICY") {
            self.dwell.exit_policy = parse_exit_policy(&policy, self.dwell.exit_policy)?;
        }
        if let Some(max) = env_parse::<u32>("RAILGUARD_MAX_MISSED_FRAMES")? {
            match &mut self.dwell.exit_policy {
                ExitPolicy::Grace { max_missed_frames } => *max_missed_frames = max,
                ExitPolicy::Immediate => {
                    return Err(anyhow!(
                        "RAILGUARD_MAX_MISSED_FRAMES only applies with the grace exit policy"
                    ))
                }
            }
        }
        if let Some(url) = env_string("RAILGUARD_ALERT_URL") {
            self.alert.url = url;
        }
        if let Some(ms) = env_parse("RAILGUARD_ALERT_TIMEOUT_MS")? {
            self.alert.timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse("RAILGUARD_COOLDOWN_SECS")? {
            self.alert.cooldown_secs = secs;
        }
        if let Some(classes) = env_string("RAILGUARD_ALERT_CLASSES") {
            let parsed = split_csv(&classes);
            if !parsed.is_empty() {
                self.alert.classes = parsed;
            }
        }
        if let Some(conf) = env_parse("RAILGUARD_MIN_CONFIDENCE")? {
            self.alert.min_confidence = conf;
        }
        if let Some(dir) = env_string("RAILGUARD_OUTBOX_DIR") {
            self.alert.outbox_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = env_string("RAILGUARD_EVIDENCE_DIR") {
            self.evidence.dir = PathBuf::from(dir);
        }
        if let Some(url) = env_string("RAILGUARD_EVIDENCE_BASE_URL") {
            self.evidence.public_base_url = url;
        }
        if let Some(path) = env_string("RAILGUARD_FONT_PATH") {
            self.evidence.font_path = Some(PathBuf::from(path));
        }
        for key in ["STREAM_URL", "RAILGUARD_STREAM_URL"] {
            if let Some(url) = env_string(key) {
                self.stream.url = Some(url);
            }
        }
        if let Some(ms) = env_parse("RAILGUARD_STREAM_INTERVAL_MS")? {
            self.stream.interval = Duration::from_millis(ms);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        check_seconds("dwell.threshold_secs", self.dwell.threshold_secs)?;
        check_seconds("alert.cooldown_secs", self.alert.cooldown_secs)?;
        if !(0.0..=1.0).contains(&self.alert.min_confidence) {
            return Err(anyhow!("alert.min_confidence must be within [0, 1]"));
        }

        self.alert.classes = self
            .alert
            .classes
            .iter()
            .map(|c| c.trim().to_ascii_lowercase())
            .filter(|c| !c.is_empty())
            .collect();
        if self.alert.classes.is_empty() {
            return Err(anyhow!("alert.classes must name at least one class"));
        }

        let alert_url = url::Url::parse(&self.alert.url)
            .with_context(|| format!("alert.url '{}' is not a valid url", self.alert.url))?;
        if !matches!(alert_url.scheme(), "http" | "https" | "file") {
            return Err(anyhow!(
                "alert.url must use http(s) or file, got '{}'",
                alert_url.scheme()
            ));
        }
        if let Some(stream_url) = &self.stream.url {
            crate::transport::validate_http_url(stream_url)
                .context("stream.url must be an http(s) url")?;
        }

        if self.alert.timeout.is_zero() || self.stream.timeout.is_zero() {
            return Err(anyhow!("network timeouts must be greater than zero"));
        }
        for (name, quality) in [
            ("evidence.jpeg_quality", self.evidence.jpeg_quality),
            ("stream.jpeg_quality", self.stream.jpeg_quality),
        ] {
            if !(1..=100).contains(&quality) {
                return Err(anyhow!("{} must be within 1..=100", name));
            }
        }
        if self.source.url.trim().is_empty() {
            return Err(anyhow!("source.url must not be empty"));
        }
        if let Some(id) = &self.camera_id {
            self.camera_id = Some(id.trim().to_string());
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<EngineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_exit_policy(value: &str, current: ExitPolicy) -> Result<ExitPolicy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "immediate" => Ok(ExitPolicy::Immediate),
        "grace" => Ok(match current {
            ExitPolicy::Grace { .. } => current,
            ExitPolicy::Immediate => ExitPolicy::Grace {
                max_missed_frames: 0,
            },
        }),
        other => Err(anyhow!(
            "unknown exit policy '{}'; expected immediate or grace",
            other
        )),
    }
}

fn check_seconds(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(anyhow!("{} must be a non-negative number of seconds", name));
    }
    Ok(())
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} has an invalid value '{}'", key, raw)),
        None => Ok(None),
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
