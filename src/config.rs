// src/config.rs
use crate::errors::StudioError;
use std::time::Duration;

const MAX_STAGGER_MS: u64 = 60_000;
const MAX_DURATION_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct StudioConfig {
    pub bind_addr: String,
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub image_model: String,
    pub analysis_model: String,
    pub tts_model: String,
    pub video_model: String,
    pub redis_url: Option<String>,
    pub static_dir: Option<String>,
    /// Session document loaded at startup and written back on shutdown.
    pub session_file: Option<String>,
    pub stagger: Duration,
    pub video_poll_interval: Duration,
    pub video_max_wait: Duration,
    pub request_timeout: Duration,
    pub max_upload_dimension: u32,
}

impl StudioConfig {
    /// Reads the process environment, after loading `.env` if one exists.
    pub fn from_env() -> Result<Self, StudioError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StudioError> {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let number = |key: &str, default: u64| -> Result<u64, StudioError> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|_| StudioError::Config(format!("{} must be a number, got '{}'", key, raw))),
                None => Ok(default),
            }
        };
        let bounded = |key: &str, default: u64, max: u64| -> Result<u64, StudioError> {
            let value = number(key, default)?;
            if value > max {
                return Err(StudioError::Config(format!("{} must be at most {}", key, max)));
            }
            Ok(value)
        };

        let gemini_api_key = lookup("GEMINI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| StudioError::Config("GEMINI_API_KEY must be set".to_string()))?;

        let max_upload_dimension = u32::try_from(number("MAX_UPLOAD_DIMENSION", 2048)?)
            .map_err(|_| StudioError::Config("MAX_UPLOAD_DIMENSION is too large".to_string()))?;

        Ok(Self {
            bind_addr: text("BIND_ADDR", "0.0.0.0:8080"),
            gemini_api_key,
            gemini_base_url: text(
                "GEMINI_BASE_URL",
                "https://generativelanguage.googleapis.com/v1beta",
            ),
            image_model: text("IMAGE_MODEL", "gemini-3-pro-image-preview"),
            analysis_model: text("ANALYSIS_MODEL", "gemini-2.5-flash"),
            tts_model: text("TTS_MODEL", "gemini-2.5-flash-preview-tts"),
            video_model: text("VIDEO_MODEL", "veo-3.1-fast-generate-preview"),
            redis_url: lookup("REDIS_URL").filter(|u| !u.is_empty()),
            static_dir: lookup("STATIC_DIR").filter(|d| !d.is_empty()),
            session_file: lookup("SESSION_FILE").filter(|f| !f.is_empty()),
            stagger: Duration::from_millis(bounded("STAGGER_MS", 600, MAX_STAGGER_MS)?),
            video_poll_interval: Duration::from_secs(bounded("VIDEO_POLL_INTERVAL_SECS", 3, MAX_DURATION_SECS)?),
            video_max_wait: Duration::from_secs(bounded("VIDEO_MAX_WAIT_SECS", 600, MAX_DURATION_SECS)?),
            request_timeout: Duration::from_secs(bounded("REQUEST_TIMEOUT_SECS", 120, MAX_DURATION_SECS)?),
            max_upload_dimension,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_key_is_set() {
        let config = StudioConfig::from_lookup(lookup(&[("GEMINI_API_KEY", "k")])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.stagger, Duration::from_millis(600));
        assert_eq!(config.video_poll_interval, Duration::from_secs(3));
        assert_eq!(config.video_max_wait, Duration::from_secs(600));
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let err = StudioConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, StudioError::Config(_)));
    }

    #[test]
    fn bad_number_is_rejected() {
        let err = StudioConfig::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "k"),
            ("STAGGER_MS", "soon"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("STAGGER_MS"));
    }

    #[test]
    fn oversized_timings_are_rejected() {
        for key in ["STAGGER_MS", "VIDEO_POLL_INTERVAL_SECS", "VIDEO_MAX_WAIT_SECS"] {
            let err = StudioConfig::from_lookup(lookup(&[
                ("GEMINI_API_KEY", "k"),
                (key, "18446744073709551615"),
            ]))
            .unwrap_err();
            assert!(matches!(err, StudioError::Config(_)));
            assert!(err.to_string().contains(key));
        }
    }
}
