// src/services/gateway.rs
//! The seam between the orchestrator and the external generative service.
//! Only implementations of [`GenerationGateway`] know the wire format.

use crate::errors::{GatewayError, StudioError};
use crate::models::{AspectRatio, UploadedImage};
use async_trait::async_trait;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Let the model ground the design in externally researched trends.
    pub trend_research: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub instruction: String,
    pub images: Vec<UploadedImage>,
    pub aspect_ratio: AspectRatio,
    pub capabilities: Capabilities,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoRequest {
    pub instruction: String,
    pub seed_image: Option<UploadedImage>,
    pub aspect_ratio: AspectRatio,
}

/// Opaque handle for a long-running video job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoJob(pub String);

#[derive(Debug, Clone, PartialEq)]
pub enum VideoStatus {
    Pending,
    /// Playable media reference.
    Ready(String),
    Failed(GatewayError),
}

#[async_trait]
pub trait GenerationGateway: Send + Sync {
    /// Returns the generated image as a `data:` URL.
    async fn request_image(&self, request: &ImageRequest) -> Result<String, GatewayError>;

    async fn request_video(&self, request: &VideoRequest) -> Result<VideoJob, GatewayError>;

    async fn poll_video(&self, job: &VideoJob) -> Result<VideoStatus, GatewayError>;

    /// Structured JSON answer about `image`, constrained by `schema`.
    async fn request_analysis(
        &self,
        image: &UploadedImage,
        instruction: &str,
        schema: &Value,
    ) -> Result<Value, GatewayError>;

    /// Base64 encoded audio for `text`.
    async fn request_audio(&self, text: &str) -> Result<String, GatewayError>;
}

/// Analysis call decoded into `T`; shape mismatches become `MalformedResponse`.
pub async fn request_structured<T: DeserializeOwned>(
    gateway: &dyn GenerationGateway,
    image: &UploadedImage,
    instruction: &str,
    schema: &Value,
) -> Result<T, GatewayError> {
    let value = gateway.request_analysis(image, instruction, schema).await?;
    serde_json::from_value(value)
        .map_err(|e| GatewayError::MalformedResponse(format!("analysis did not match schema: {}", e)))
}

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_wait: Duration::from_secs(600),
        }
    }
}

/// Poll `job` at a fixed interval until it resolves, `max_wait` elapses or
/// `cancel` fires.
pub async fn poll_until_ready(
    gateway: &dyn GenerationGateway,
    job: &VideoJob,
    settings: &PollSettings,
    cancel: &CancellationToken,
) -> Result<String, StudioError> {
    let started = Instant::now();
    let mut attempt = 0u32;

    loop {
        if started.elapsed().saturating_add(settings.interval) > settings.max_wait {
            warn!("Video job {} still pending after {} polls, giving up", job.0, attempt);
            return Err(GatewayError::Transient(format!(
                "video generation timed out after {}s",
                settings.max_wait.as_secs()
            ))
            .into());
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(StudioError::Cancelled),
            _ = tokio::time::sleep(settings.interval) => {}
        }

        attempt += 1;
        let status = tokio::select! {
            _ = cancel.cancelled() => return Err(StudioError::Cancelled),
            status = gateway.poll_video(job) => status?,
        };

        match status {
            VideoStatus::Pending => debug!("Video job {} pending (poll {})", job.0, attempt),
            VideoStatus::Ready(media) => return Ok(media),
            VideoStatus::Failed(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory gateway for orchestrator tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    pub struct ScriptedGateway {
        /// Outcomes for successive image calls; empty means success.
        pub image_script: Mutex<VecDeque<(Duration, Result<(), GatewayError>)>>,
        pub image_calls: Mutex<Vec<ImageRequest>>,
        pub image_call_times: Mutex<Vec<Instant>>,
        pub video_polls: Mutex<VecDeque<VideoStatus>>,
        pub video_calls: AtomicUsize,
        pub poll_calls: AtomicUsize,
        pub analysis_reply: Mutex<Option<Result<Value, GatewayError>>>,
        pub analysis_calls: AtomicUsize,
        pub audio_reply: Mutex<Option<Result<String, GatewayError>>>,
        pub audio_calls: AtomicUsize,
        counter: AtomicUsize,
    }

    impl ScriptedGateway {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_image(&self, delay: Duration, outcome: Result<(), GatewayError>) {
            self.image_script.lock().unwrap().push_back((delay, outcome));
        }

        pub fn image_call_count(&self) -> usize {
            self.image_calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl GenerationGateway for ScriptedGateway {
        async fn request_image(&self, request: &ImageRequest) -> Result<String, GatewayError> {
            self.image_calls.lock().unwrap().push(request.clone());
            self.image_call_times.lock().unwrap().push(Instant::now());
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            let scripted = self.image_script.lock().unwrap().pop_front();
            let (delay, outcome) = scripted.unwrap_or((Duration::ZERO, Ok(())));
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            outcome.map(|_| format!("data:image/png;base64,IMG{}", n))
        }

        async fn request_video(&self, _request: &VideoRequest) -> Result<VideoJob, GatewayError> {
            self.video_calls.fetch_add(1, Ordering::SeqCst);
            Ok(VideoJob("operations/test".to_string()))
        }

        async fn poll_video(&self, _job: &VideoJob) -> Result<VideoStatus, GatewayError> {
            self.poll_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .video_polls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(VideoStatus::Pending))
        }

        async fn request_analysis(
            &self,
            _image: &UploadedImage,
            _instruction: &str,
            _schema: &Value,
        ) -> Result<Value, GatewayError> {
            self.analysis_calls.fetch_add(1, Ordering::SeqCst);
            self.analysis_reply
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Err(GatewayError::Transient("no analysis scripted".into())))
        }

        async fn request_audio(&self, _text: &str) -> Result<String, GatewayError> {
            self.audio_calls.fetch_add(1, Ordering::SeqCst);
            self.audio_reply
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Ok("UENN".to_string()))
        }
    }
}
