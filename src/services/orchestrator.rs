// src/services/orchestrator.rs
//! Mode-specific dispatch strategies.
//!
//! The orchestrator decides how many gateway calls a request needs, in what
//! order, and how their results land in the [`ResultsStore`]. It never hands
//! artifacts back to the caller: everything surfaces through store writes
//! and notices, so partial completion is visible while siblings are still
//! running.

use crate::errors::StudioError;
use crate::models::*;
use crate::services::analysis::{analyze_product, assess_ad_safety};
use crate::services::credentials::CredentialProvider;
use crate::services::gateway::{
    GenerationGateway, ImageRequest, PollSettings, VideoRequest, poll_until_ready,
};
use crate::services::image_processor::image_from_data_url;
use crate::services::prompt_composer::{self, Composition, VARIANT_PALETTE};
use crate::services::results_store::{Action, ResultsStore};
use chrono::Utc;
use futures_util::future::join_all;
use log::{debug, error, info, warn};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const FASHION_RATIONALE: &str =
    "Virtual try-on: the garment is fitted to the model respecting fabric physics and lighting.";
const VIDEO_RATIONALE: &str =
    "Cinematic motion ad built from the product photo to stop the scroll.";
const VARIANT_RATIONALE: &str =
    "Color variation of an existing design. Layout, product and copy are unchanged.";

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Gap between successive STANDARD dispatches.
    pub stagger: Duration,
    pub video: PollSettings,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            stagger: Duration::from_millis(600),
            video: PollSettings::default(),
        }
    }
}

/// Outcome of one generate action that produced at least one artifact.
#[derive(Debug)]
pub struct GenerationReport {
    pub mode: GeneratorMode,
    pub artifact_ids: Vec<String>,
    pub failures: Vec<StudioError>,
}

impl GenerationReport {
    fn new(mode: GeneratorMode) -> Self {
        Self {
            mode,
            artifact_ids: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn record(&mut self, outcome: Result<String, StudioError>) {
        match outcome {
            Ok(id) => self.artifact_ids.push(id),
            Err(e) => self.failures.push(e),
        }
    }

    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Whole-operation failure only when nothing landed. Authorization
    /// failures win so the caller sees the actionable one.
    fn into_result(mut self) -> Result<Self, StudioError> {
        if !self.artifact_ids.is_empty() {
            return Ok(self);
        }
        let index = self.failures.iter().position(is_authorization).unwrap_or(0);
        if index < self.failures.len() {
            Err(self.failures.swap_remove(index))
        } else {
            Err(StudioError::Validation("No designs were requested".to_string()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MagicOutcome {
    Updated,
    /// A new artifact was created with this id.
    Spawned(String),
}

fn is_authorization(e: &StudioError) -> bool {
    matches!(e, StudioError::Gateway(g) if g.is_authorization())
}

fn image_request(composition: &Composition, aspect_ratio: AspectRatio) -> ImageRequest {
    ImageRequest {
        instruction: composition.instruction.clone(),
        images: composition.images.clone(),
        aspect_ratio,
        capabilities: composition.capabilities,
    }
}

fn pick_variant_color() -> &'static str {
    VARIANT_PALETTE
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(VARIANT_PALETTE[0])
}

fn invalid(message: &str) -> StudioError {
    StudioError::Validation(message.to_string())
}

pub struct Orchestrator {
    gateway: Arc<dyn GenerationGateway>,
    credentials: Arc<dyn CredentialProvider>,
    store: Arc<ResultsStore>,
    settings: OrchestratorSettings,
    credentials_ready: AtomicBool,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<dyn GenerationGateway>,
        credentials: Arc<dyn CredentialProvider>,
        store: Arc<ResultsStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            gateway,
            credentials,
            store,
            settings,
            credentials_ready: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    /// Stops any video poll still running.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Mode-specific required inputs. Runs before any network activity.
    pub fn validate(request: &GenerationRequest) -> Result<(), StudioError> {
        match request.mode {
            GeneratorMode::Standard | GeneratorMode::Campaign | GeneratorMode::Video => {
                if request.products.is_empty() {
                    return Err(invalid("Please upload at least one product image"));
                }
                if request.brand_name.is_empty() {
                    return Err(invalid("Please enter a brand name"));
                }
            }
            GeneratorMode::Bulk => {
                if request.bulk.input_images.is_empty() {
                    return Err(invalid("Please upload at least one image to process in bulk"));
                }
            }
            GeneratorMode::Fashion => {
                if request.fashion.model_image.is_none() || request.fashion.garment_image.is_none() {
                    return Err(invalid("Fashion mode needs both a model photo and a garment photo"));
                }
            }
        }
        Ok(())
    }

    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationReport, StudioError> {
        Self::validate(&request)?;
        self.ensure_credentials().await;
        info!(
            "Starting {:?} generation for '{}'",
            request.mode, request.brand_name
        );

        let outcome = match request.mode {
            GeneratorMode::Standard => self.run_standard(&request).await,
            GeneratorMode::Campaign => self.run_campaign(&request).await,
            GeneratorMode::Fashion => self.run_fashion(&request).await,
            GeneratorMode::Bulk => self.run_bulk(&request).await,
            GeneratorMode::Video => self.run_video(&request).await,
        };
        self.conclude(request.mode, outcome).await
    }

    async fn conclude(
        &self,
        mode: GeneratorMode,
        outcome: Result<GenerationReport, StudioError>,
    ) -> Result<GenerationReport, StudioError> {
        let hit_authorization = match &outcome {
            Ok(report) => report.failures.iter().any(is_authorization),
            Err(e) => is_authorization(e),
        };
        if hit_authorization {
            self.refresh_credentials().await;
        }

        match &outcome {
            Ok(report) if !report.is_partial() => {
                info!("{:?} generation finished: {} artifact(s)", mode, report.artifact_ids.len());
                self.store.notify(
                    NoticeLevel::Success,
                    format!("{} design(s) ready", report.artifact_ids.len()),
                );
            }
            Ok(report) => {
                let ready = report.artifact_ids.len();
                let total = ready + report.failures.len();
                warn!("{:?} generation partially failed: {}/{} ready", mode, ready, total);
                let reason = report
                    .failures
                    .first()
                    .map(StudioError::user_message)
                    .unwrap_or_default();
                self.store.notify(
                    NoticeLevel::Info,
                    format!("{} of {} designs ready. {}", ready, total, reason),
                );
            }
            Err(e) => {
                error!("{:?} generation failed: {}", mode, e);
                self.store.notify(NoticeLevel::Error, e.user_message());
            }
        }
        outcome
    }

    /// `variant_count` concurrent calls, slot `i` starting at `i * stagger`.
    async fn run_standard(&self, request: &GenerationRequest) -> Result<GenerationReport, StudioError> {
        let composition = prompt_composer::compose_standard(request);
        let rationale = prompt_composer::design_rationale(request.style, &request.brand_name);
        let prompt = if request.custom_prompt.trim().is_empty() {
            "Standard banner".to_string()
        } else {
            request.custom_prompt.clone()
        };
        let (composition, rationale, prompt) = (&composition, &rationale, &prompt);
        let start = Instant::now();

        let slots = (0..u32::from(request.variant_count)).map(move |index| async move {
            let offset = self.settings.stagger.saturating_mul(index);
            tokio::time::sleep(offset.saturating_sub(start.elapsed())).await;
            let image_url = self
                .gateway
                .request_image(&image_request(composition, request.aspect_ratio))
                .await
                .map_err(|e| {
                    warn!("Standard slot {} failed: {}", index, e);
                    StudioError::from(e)
                })?;

            let artifact = Artifact {
                design_rationale: Some(rationale.clone()),
                aspect_ratio: Some(request.aspect_ratio),
                ..Artifact::ready_image(image_url, prompt.clone())
            };
            let id = artifact.id.clone();
            self.store.insert(artifact)?;
            Ok::<_, StudioError>(id)
        });

        let mut report = GenerationReport::new(GeneratorMode::Standard);
        for outcome in join_all(slots).await {
            report.record(outcome);
        }
        report.into_result()
    }

    /// Four concurrent stage calls; survivors share one campaign id and are
    /// inserted as one batch in stage order.
    async fn run_campaign(&self, request: &GenerationRequest) -> Result<GenerationReport, StudioError> {
        let compositions = prompt_composer::compose_campaign(request);
        let calls = compositions.iter().map(move |composition| async move {
            let outcome = self
                .gateway
                .request_image(&image_request(composition, request.aspect_ratio))
                .await;
            (composition.stage, outcome)
        });
        let settled = join_all(calls).await;

        let campaign_id = new_id();
        let mut report = GenerationReport::new(GeneratorMode::Campaign);
        let mut artifacts = Vec::new();
        for (stage, outcome) in settled {
            let label = stage.map(|s| s.label()).unwrap_or("Campaign");
            match outcome {
                Ok(image_url) => artifacts.push(Artifact {
                    design_rationale: Some(format!(
                        "Campaign stage {}. One step of the funnel, kept visually consistent with the rest of the set.",
                        label
                    )),
                    aspect_ratio: Some(request.aspect_ratio),
                    campaign_id: Some(campaign_id.clone()),
                    stage,
                    ..Artifact::ready_image(image_url, format!("Campaign: {}", label))
                }),
                Err(e) => {
                    warn!("Campaign stage {} failed: {}", label, e);
                    report.failures.push(e.into());
                }
            }
        }

        artifacts.sort_by_key(|a| a.stage);
        report.artifact_ids = artifacts.iter().map(|a| a.id.clone()).collect();
        if !artifacts.is_empty() {
            self.store.insert_many(artifacts)?;
        }
        report.into_result()
    }

    async fn run_fashion(&self, request: &GenerationRequest) -> Result<GenerationReport, StudioError> {
        let composition = prompt_composer::compose_fashion(request)?;
        let image_url = self
            .gateway
            .request_image(&image_request(&composition, request.aspect_ratio))
            .await
            .inspect_err(|e| warn!("Fashion try-on failed: {}", e))?;

        let artifact = Artifact {
            design_rationale: Some(FASHION_RATIONALE.to_string()),
            aspect_ratio: Some(request.aspect_ratio),
            ..Artifact::ready_image(image_url, "Fashion try-on")
        };
        let mut report = GenerationReport::new(GeneratorMode::Fashion);
        report.artifact_ids.push(artifact.id.clone());
        self.store.insert(artifact)?;
        Ok(report)
    }

    /// Placeholders go in first, in input order; each is then filled in
    /// place by strictly sequential calls. A failed item keeps a `Failed`
    /// placeholder and the run continues.
    async fn run_bulk(&self, request: &GenerationRequest) -> Result<GenerationReport, StudioError> {
        let compositions = prompt_composer::compose_bulk(request);
        let rationale = prompt_composer::design_rationale(request.style, &request.brand_name);

        let placeholders: Vec<Artifact> = compositions
            .iter()
            .map(|_| Artifact {
                aspect_ratio: Some(request.aspect_ratio),
                ..Artifact::pending("Bulk create")
            })
            .collect();
        let ids: Vec<String> = placeholders.iter().map(|a| a.id.clone()).collect();
        self.store.insert_many(placeholders)?;

        let mut report = GenerationReport::new(GeneratorMode::Bulk);
        for (index, (id, composition)) in ids.iter().zip(&compositions).enumerate() {
            let outcome = self
                .gateway
                .request_image(&image_request(composition, request.aspect_ratio))
                .await;
            let patch = match &outcome {
                Ok(image_url) => ArtifactPatch {
                    image_url: Some(image_url.clone()),
                    status: Some(ArtifactStatus::Ready),
                    design_rationale: Some(rationale.clone()),
                    ..ArtifactPatch::settle()
                },
                Err(e) => {
                    warn!("Bulk item {}/{} failed: {}", index + 1, ids.len(), e);
                    ArtifactPatch {
                        status: Some(ArtifactStatus::Failed),
                        error: Some(Some(e.user_message())),
                        ..ArtifactPatch::settle()
                    }
                }
            };
            if let Err(e) = self.store.update_by_id(id, patch) {
                warn!("Bulk placeholder {} could not be updated: {}", id, e);
            }
            report.record(outcome.map(|_| id.clone()).map_err(StudioError::from));
        }
        report.into_result()
    }

    /// One long-running job. Nothing reaches the store until polling ends.
    async fn run_video(&self, request: &GenerationRequest) -> Result<GenerationReport, StudioError> {
        let composition = prompt_composer::compose_video(request);
        self.store.notify(
            NoticeLevel::Info,
            "Generating video commercial. This can take a few minutes.",
        );

        let job = self
            .gateway
            .request_video(&VideoRequest {
                instruction: composition.instruction,
                seed_image: composition.images.into_iter().next(),
                aspect_ratio: request.aspect_ratio,
            })
            .await?;
        info!("Video job {} submitted", job.0);

        let media =
            poll_until_ready(self.gateway.as_ref(), &job, &self.settings.video, &self.shutdown).await?;

        let artifact = Artifact {
            video_url: Some(media),
            design_rationale: Some(VIDEO_RATIONALE.to_string()),
            aspect_ratio: Some(request.aspect_ratio),
            ..Artifact::ready_image(String::new(), "Video commercial")
        };
        let mut report = GenerationReport::new(GeneratorMode::Video);
        report.artifact_ids.push(artifact.id.clone());
        self.store.insert(artifact)?;
        Ok(report)
    }

    /// Edits artifact `id` in place. Rejected with `InFlight`, without any
    /// gateway call, while another mutation of the same artifact runs.
    pub async fn regenerate(&self, id: &str, instruction: &str) -> Result<(), StudioError> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(invalid("Please describe the edit"));
        }
        self.ensure_credentials().await;
        let before = self.store.try_begin_mutation(id)?;
        info!("Regenerating {}: {}", id, instruction);

        match self.edit(&before, instruction).await {
            Ok(image_url) => {
                self.store.update_by_id(
                    id,
                    ArtifactPatch {
                        image_url: Some(image_url),
                        prompt_used: Some(instruction.to_string()),
                        status: Some(ArtifactStatus::Ready),
                        error: Some(None),
                        ..ArtifactPatch::settle()
                    },
                )?;
                self.store.notify(NoticeLevel::Success, "Design updated");
                Ok(())
            }
            Err(e) => {
                warn!("Regenerate of {} failed: {}", id, e);
                self.release(id);
                self.fail(e).await
            }
        }
    }

    async fn edit(&self, artifact: &Artifact, instruction: &str) -> Result<String, StudioError> {
        if artifact.is_video() {
            return Err(invalid("Video results cannot be edited"));
        }
        let current = image_from_data_url(&artifact.image_url)?;
        let composition = prompt_composer::compose_edit(current, instruction);
        let aspect_ratio = artifact.aspect_ratio.unwrap_or_default();
        Ok(self
            .gateway
            .request_image(&image_request(&composition, aspect_ratio))
            .await?)
    }

    /// Spawns a color variant of `id` as a new artifact and returns its id.
    /// The source artifact is never touched.
    pub async fn create_variant(&self, id: &str) -> Result<String, StudioError> {
        let source = self.require(id)?;
        if source.is_video() {
            return Err(invalid("Variants can only be made from image results"));
        }
        let current = image_from_data_url(&source.image_url)?;
        let aspect_ratio = source.aspect_ratio.unwrap_or_default();
        let color = pick_variant_color();
        self.ensure_credentials().await;

        let placeholder = Artifact {
            id: new_id(),
            prompt_used: format!("Color variant: {}", color),
            timestamp: Utc::now(),
            is_regenerating: true,
            status: ArtifactStatus::Pending,
            error: None,
            safety_report: None,
            comments: Vec::new(),
            audio_pitch_data: None,
            campaign_id: None,
            stage: None,
            ..source
        };
        let variant_id = placeholder.id.clone();
        self.store.insert(placeholder)?;
        self.store
            .notify(NoticeLevel::Info, format!("Creating a {} variant", color));

        let composition = prompt_composer::compose_variant(current, color);
        match self
            .gateway
            .request_image(&image_request(&composition, aspect_ratio))
            .await
        {
            Ok(image_url) => {
                self.store.update_by_id(
                    &variant_id,
                    ArtifactPatch {
                        image_url: Some(image_url),
                        status: Some(ArtifactStatus::Ready),
                        design_rationale: Some(VARIANT_RATIONALE.to_string()),
                        ..ArtifactPatch::settle()
                    },
                )?;
                self.store.notify(NoticeLevel::Success, "Variant ready");
                Ok(variant_id)
            }
            Err(e) => {
                warn!("Variant {} of {} failed: {}", variant_id, id, e);
                self.store.update_by_id(
                    &variant_id,
                    ArtifactPatch {
                        status: Some(ArtifactStatus::Failed),
                        error: Some(Some(e.user_message())),
                        ..ArtifactPatch::settle()
                    },
                )?;
                self.fail(e.into()).await
            }
        }
    }

    pub async fn magic_action(&self, id: &str, action: MagicAction) -> Result<MagicOutcome, StudioError> {
        match action {
            MagicAction::Variant => self.create_variant(id).await.map(MagicOutcome::Spawned),
            MagicAction::Annotate => {
                let current = self.require(id)?;
                self.store.update_by_id(
                    id,
                    ArtifactPatch {
                        annotations: Some(!current.annotations.unwrap_or(false)),
                        ..Default::default()
                    },
                )?;
                Ok(MagicOutcome::Updated)
            }
            MagicAction::Motion => {
                let current = self.require(id)?;
                let next = match current.motion_effect {
                    Some(_) => None,
                    None => Some(MotionEffect::Pan),
                };
                self.apply_motion(id, next)?;
                Ok(MagicOutcome::Updated)
            }
            edit => {
                let instruction = prompt_composer::magic_instruction(edit)
                    .ok_or_else(|| StudioError::Validation(format!("{:?} is not an edit action", edit)))?;
                self.regenerate(id, instruction).await?;
                Ok(MagicOutcome::Updated)
            }
        }
    }

    pub fn apply_motion(&self, id: &str, effect: Option<MotionEffect>) -> Result<(), StudioError> {
        self.store.update_by_id(
            id,
            ArtifactPatch {
                motion_effect: Some(effect),
                ..Default::default()
            },
        )?;
        match effect {
            Some(effect) => self.store.notify(
                NoticeLevel::Success,
                format!("Motion effect applied: {}", format!("{:?}", effect).to_uppercase()),
            ),
            None => self.store.notify(NoticeLevel::Info, "Motion effect removed"),
        }
        Ok(())
    }

    pub fn add_comment(
        &self,
        id: &str,
        x: f64,
        y: f64,
        text: &str,
        author: &str,
    ) -> Result<Comment, StudioError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(invalid("Comment text is empty"));
        }
        let author = match author.trim() {
            "" => "Reviewer",
            name => name,
        };
        let comment = Comment {
            id: new_id(),
            x,
            y,
            text: text.to_string(),
            author: author.to_string(),
            timestamp: Utc::now(),
        };
        self.store.dispatch(Action::AddComment {
            id: id.to_string(),
            comment: comment.clone(),
        })?;
        Ok(comment)
    }

    /// Replaces the artifact's safety report. On failure the previous report
    /// stays in place. Holds the artifact's in-flight marker while it runs.
    pub async fn check_safety(&self, id: &str) -> Result<AdSafetyReport, StudioError> {
        if self.require(id)?.is_video() {
            self.store
                .notify(NoticeLevel::Info, "Safety check is not available for video yet");
            return Err(invalid("Safety check does not support video results"));
        }
        self.ensure_credentials().await;
        let before = self.store.try_begin_mutation(id)?;
        let image = match image_from_data_url(&before.image_url) {
            Ok(image) => image,
            Err(e) => {
                self.release(id);
                return Err(e);
            }
        };
        self.store.notify(NoticeLevel::Info, "Checking ad safety...");

        match assess_ad_safety(self.gateway.as_ref(), &image).await {
            Ok(report) => {
                self.store.update_by_id(
                    id,
                    ArtifactPatch {
                        safety_report: Some(report.clone()),
                        ..ArtifactPatch::settle()
                    },
                )?;
                if report.is_safe {
                    self.store.notify(
                        NoticeLevel::Success,
                        format!("Ad looks safe (score {})", report.score),
                    );
                } else {
                    self.store.notify(
                        NoticeLevel::Error,
                        format!("Ad risks found: {}", report.warnings.join(", ")),
                    );
                }
                Ok(report)
            }
            Err(e) => {
                warn!("Safety check of {} failed: {}", id, e);
                self.release(id);
                self.fail(e).await
            }
        }
    }

    /// Narrates the design rationale and stores the audio on the artifact.
    pub async fn generate_pitch(&self, id: &str) -> Result<(), StudioError> {
        self.require(id)?
            .design_rationale
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| invalid("This design has no rationale to narrate"))?;
        self.ensure_credentials().await;
        let before = self.store.try_begin_mutation(id)?;
        let rationale = before.design_rationale.unwrap_or_default();

        match self
            .gateway
            .request_audio(&prompt_composer::pitch_script(&rationale))
            .await
        {
            Ok(audio) => {
                self.store.update_by_id(
                    id,
                    ArtifactPatch {
                        audio_pitch_data: Some(audio),
                        ..ArtifactPatch::settle()
                    },
                )?;
                Ok(())
            }
            Err(e) => {
                warn!("Pitch audio for {} failed: {}", id, e);
                self.release(id);
                self.fail(e.into()).await
            }
        }
    }

    /// Runs product analysis unless one is already running. The result, or
    /// the generic fallback, becomes the current analysis.
    pub async fn analyze_upload(&self, image: &UploadedImage) -> Option<ProductAnalysis> {
        if !self.store.try_begin_analysis() {
            debug!("Analysis already running, skipping {}", image.id);
            return None;
        }
        let analysis = analyze_product(self.gateway.as_ref(), image).await;
        for action in [
            Action::SetAnalysis(Some(analysis.clone())),
            Action::SetAnalyzing(false),
        ] {
            if let Err(e) = self.store.dispatch(action) {
                error!("Could not record product analysis: {}", e);
            }
        }
        Some(analysis)
    }

    /// Clears the in-flight marker after a failed mutation.
    fn release(&self, id: &str) {
        if let Err(e) = self.store.update_by_id(id, ArtifactPatch::settle()) {
            error!("Could not clear in-flight marker on {}: {}", id, e);
        }
    }

    fn require(&self, id: &str) -> Result<Artifact, StudioError> {
        self.store
            .find_by_id(id)
            .ok_or_else(|| StudioError::NotFound(format!("artifact {}", id)))
    }

    /// Tail of every failed single-artifact operation.
    async fn fail<T>(&self, e: StudioError) -> Result<T, StudioError> {
        if is_authorization(&e) {
            self.refresh_credentials().await;
        }
        self.store.notify(NoticeLevel::Error, e.user_message());
        Err(e)
    }

    async fn ensure_credentials(&self) {
        if self.credentials_ready.load(Ordering::SeqCst) {
            return;
        }
        let ready = self.credentials.is_ready().await || self.credentials.refresh().await;
        if !ready {
            warn!("No API credential selected; requests may be rejected");
        }
        self.credentials_ready.store(ready, Ordering::SeqCst);
    }

    async fn refresh_credentials(&self) {
        self.credentials_ready.store(false, Ordering::SeqCst);
        info!("Authorization failed, asking the host to refresh credentials");
        let ready = self.credentials.refresh().await;
        self.credentials_ready.store(ready, Ordering::SeqCst);
    }
}
