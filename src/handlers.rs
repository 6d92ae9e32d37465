// src/handlers.rs
use crate::services::orchestrator::MagicOutcome;
use crate::services::results_store::Action;
use crate::services::{Orchestrator, session};
use crate::{AppState, errors::StudioError, models::*};
use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use bytes::BytesMut;
use futures_util::TryStreamExt;
use log::{debug, info};
use serde::Deserialize;

/// Partial form update; absent fields keep their current value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormUpdate {
    pub brand_name: Option<String>,
    pub tagline: Option<String>,
    pub global_prompt: Option<String>,
    pub style_category: Option<StyleCategory>,
    pub aspect_ratio: Option<AspectRatio>,
    pub variant_count: Option<u8>,
    pub is_trend_aware: Option<bool>,
    pub generator_mode: Option<GeneratorMode>,
    pub pain_point: Option<String>,
    pub platform_preset: Option<PlatformPreset>,
    pub keep_face: Option<bool>,
    pub keep_pose: Option<bool>,
}

impl FormUpdate {
    fn apply_to(self, form: &mut FormState) {
        if let Some(v) = self.brand_name {
            form.brand_name = v;
        }
        if let Some(v) = self.tagline {
            form.tagline = v;
        }
        if let Some(v) = self.global_prompt {
            form.global_prompt = v;
        }
        if let Some(v) = self.style_category {
            form.style_category = v;
        }
        if let Some(v) = self.aspect_ratio {
            form.aspect_ratio = v;
        }
        if let Some(v) = self.variant_count {
            form.variant_count = v;
        }
        if let Some(v) = self.is_trend_aware {
            form.is_trend_aware = v;
        }
        if let Some(v) = self.generator_mode {
            form.generator_mode = v;
        }
        if let Some(v) = self.pain_point {
            form.pain_point = v;
        }
        if let Some(v) = self.platform_preset {
            form.platform_preset = v;
        }
        if let Some(v) = self.keep_face {
            form.fashion_state.keep_face = v;
        }
        if let Some(v) = self.keep_pose {
            form.fashion_state.keep_pose = v;
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegenerateBody {
    pub instruction: String,
}

#[derive(Debug, Deserialize)]
pub struct MagicBody {
    pub action: MagicAction,
}

#[derive(Debug, Deserialize)]
pub struct MotionBody {
    pub effect: Option<MotionEffect>,
}

#[derive(Debug, Deserialize)]
pub struct CommentBody {
    pub x: f64,
    pub y: f64,
    pub text: String,
    #[serde(default)]
    pub author: String,
}

#[derive(Debug, Deserialize)]
pub struct SelectionBody {
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewModeBody {
    pub enabled: bool,
}

fn artifact_response(data: &AppState, id: &str) -> Result<HttpResponse, StudioError> {
    let artifact = data
        .store
        .find_by_id(id)
        .ok_or_else(|| StudioError::NotFound(format!("artifact {}", id)))?;
    Ok(HttpResponse::Ok().json(&artifact))
}

pub async fn get_state(data: web::Data<AppState>) -> Result<HttpResponse, StudioError> {
    Ok(HttpResponse::Ok().json(data.store.snapshot()))
}

pub async fn update_form(
    data: web::Data<AppState>,
    body: web::Json<FormUpdate>,
) -> Result<HttpResponse, StudioError> {
    let mut form = data.store.read(|s| s.form.clone());
    body.into_inner().apply_to(&mut form);
    data.store.dispatch(Action::SetForm(form.clone()))?;
    Ok(HttpResponse::Ok().json(&form))
}

pub async fn replace_brand_kit(
    data: web::Data<AppState>,
    body: web::Json<BrandKit>,
) -> Result<HttpResponse, StudioError> {
    let kit = body.into_inner();
    data.store.dispatch(Action::SetBrandKit(kit.clone()))?;
    Ok(HttpResponse::Ok().json(&kit))
}

pub async fn upload_images(
    path: web::Path<ImageSlot>,
    mut payload: Multipart,
    data: web::Data<AppState>,
) -> Result<HttpResponse, StudioError> {
    let slot = path.into_inner();
    let mut images = Vec::new();

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| StudioError::Validation(e.to_string()))?
    {
        let mut image_data = BytesMut::new();
        while let Some(chunk) = field
            .try_next()
            .await
            .map_err(|e| StudioError::Validation(e.to_string()))?
        {
            image_data.extend_from_slice(&chunk);
        }
        if image_data.is_empty() {
            continue;
        }
        images.push(data.image_processor.normalize(&image_data)?);
    }

    if images.is_empty() {
        return Err(StudioError::Validation("No image data received".to_string()));
    }

    let ids: Vec<String> = images.iter().map(|i| i.id.clone()).collect();
    let first = images[0].clone();
    data.store.dispatch(Action::AddImages { slot, images })?;
    info!("Stored {} image(s) in slot {:?}", ids.len(), slot);

    if slot == ImageSlot::Product {
        let orchestrator = data.orchestrator.clone();
        tokio::spawn(async move {
            if let Some(analysis) = orchestrator.analyze_upload(&first).await {
                debug!("Upload analysed as {:?}", analysis.category);
            }
        });
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "slot": slot,
        "images": ids,
        "count": ids.len()
    })))
}

pub async fn remove_image(
    path: web::Path<(ImageSlot, String)>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, StudioError> {
    let (slot, id) = path.into_inner();
    data.store.dispatch(Action::RemoveImage { slot, id })?;
    Ok(HttpResponse::NoContent().finish())
}

/// Validates synchronously, then runs the generation in the background.
/// Progress is observed through `/state` and `/notifications`.
pub async fn generate(data: web::Data<AppState>) -> Result<HttpResponse, StudioError> {
    let request = data.store.read(GenerationRequest::from_state);
    Orchestrator::validate(&request)?;

    let mode = request.mode;
    let orchestrator = data.orchestrator.clone();
    tokio::spawn(async move {
        if let Ok(report) = orchestrator.generate(request).await {
            debug!(
                "{:?} generation stored {} artifact(s)",
                report.mode,
                report.artifact_ids.len()
            );
        }
    });

    Ok(HttpResponse::Accepted().json(serde_json::json!({
        "mode": mode,
        "status": "accepted"
    })))
}

pub async fn regenerate_result(
    path: web::Path<String>,
    data: web::Data<AppState>,
    body: web::Json<RegenerateBody>,
) -> Result<HttpResponse, StudioError> {
    let id = path.into_inner();
    data.orchestrator.regenerate(&id, &body.instruction).await?;
    artifact_response(&data, &id)
}

pub async fn magic_action(
    path: web::Path<String>,
    data: web::Data<AppState>,
    body: web::Json<MagicBody>,
) -> Result<HttpResponse, StudioError> {
    let id = path.into_inner();
    match data.orchestrator.magic_action(&id, body.action).await? {
        MagicOutcome::Updated => artifact_response(&data, &id),
        MagicOutcome::Spawned(variant_id) => {
            let artifact = data
                .store
                .find_by_id(&variant_id)
                .ok_or_else(|| StudioError::NotFound(format!("artifact {}", variant_id)))?;
            Ok(HttpResponse::Created().json(&artifact))
        }
    }
}

pub async fn set_motion(
    path: web::Path<String>,
    data: web::Data<AppState>,
    body: web::Json<MotionBody>,
) -> Result<HttpResponse, StudioError> {
    let id = path.into_inner();
    data.orchestrator.apply_motion(&id, body.effect)?;
    artifact_response(&data, &id)
}

pub async fn add_comment(
    path: web::Path<String>,
    data: web::Data<AppState>,
    body: web::Json<CommentBody>,
) -> Result<HttpResponse, StudioError> {
    let id = path.into_inner();
    let comment = data
        .orchestrator
        .add_comment(&id, body.x, body.y, &body.text, &body.author)?;
    Ok(HttpResponse::Created().json(&comment))
}

pub async fn check_safety(
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, StudioError> {
    let report = data.orchestrator.check_safety(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(&report))
}

pub async fn generate_pitch(
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, StudioError> {
    let id = path.into_inner();
    data.orchestrator.generate_pitch(&id).await?;
    artifact_response(&data, &id)
}

pub async fn select_result(
    data: web::Data<AppState>,
    body: web::Json<SelectionBody>,
) -> Result<HttpResponse, StudioError> {
    data.store
        .dispatch(Action::SelectResult(body.into_inner().id))?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn set_review_mode(
    data: web::Data<AppState>,
    body: web::Json<ReviewModeBody>,
) -> Result<HttpResponse, StudioError> {
    data.store.dispatch(Action::SetReviewMode(body.enabled))?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn drain_notifications(data: web::Data<AppState>) -> Result<HttpResponse, StudioError> {
    Ok(HttpResponse::Ok().json(data.store.drain_notices()))
}

pub async fn export_session(data: web::Data<AppState>) -> Result<HttpResponse, StudioError> {
    let document = session::export(&data.store.snapshot())?;
    Ok(HttpResponse::Ok()
        .content_type("application/json")
        .insert_header((
            "Content-Disposition",
            "attachment; filename=\"adforge-session.json\"",
        ))
        .body(document))
}

pub async fn import_session(
    data: web::Data<AppState>,
    body: String,
) -> Result<HttpResponse, StudioError> {
    session::restore(&data.store, session::import(&body)?)?;
    Ok(HttpResponse::Ok().json(data.store.snapshot()))
}

fn snapshot_store(data: &AppState) -> Result<&crate::services::SnapshotStore, StudioError> {
    data.snapshots
        .as_deref()
        .ok_or_else(|| StudioError::Redis("session snapshots are not configured".to_string()))
}

pub async fn save_snapshot(data: web::Data<AppState>) -> Result<HttpResponse, StudioError> {
    let id = snapshot_store(&data)?.save(&data.store.snapshot()).await?;
    info!("Saved session snapshot {}", id);
    Ok(HttpResponse::Created().json(serde_json::json!({ "id": id })))
}

pub async fn load_snapshot(
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, StudioError> {
    let state = snapshot_store(&data)?.load(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(&state))
}

pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "adforge",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gateway::PollSettings;
    use crate::services::gateway::testing::ScriptedGateway;
    use crate::services::{AlwaysReady, ImageProcessor, OrchestratorSettings, ResultsStore};
    use actix_web::{App, http::StatusCode, test};
    use std::sync::Arc;
    use std::time::Duration;

    fn app_state() -> (AppState, Arc<ScriptedGateway>) {
        let gateway = Arc::new(ScriptedGateway::new());
        let store = Arc::new(ResultsStore::default());
        let orchestrator = Arc::new(Orchestrator::new(
            gateway.clone(),
            Arc::new(AlwaysReady),
            store.clone(),
            OrchestratorSettings {
                stagger: Duration::ZERO,
                video: PollSettings::default(),
            },
        ));
        let state = AppState {
            store,
            orchestrator,
            image_processor: Arc::new(ImageProcessor::new(2048)),
            snapshots: None,
        };
        (state, gateway)
    }

    #[actix_web::test]
    async fn generate_validates_before_running_in_background() {
        let (state, gateway) = app_state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/generate", web::post().to(generate)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::post().uri("/generate").to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(gateway.image_call_count(), 0);

        let mut form = state.store.read(|s| s.form.clone());
        form.brand_name = "Lumi".into();
        form.variant_count = 2;
        form.product_images.push(UploadedImage {
            id: "p1".into(),
            data: "AAAA".into(),
            mime_type: "image/png".into(),
        });
        state.store.dispatch(Action::SetForm(form)).unwrap();

        let resp = test::call_service(&app, test::TestRequest::post().uri("/generate").to_request()).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        for _ in 0..100 {
            if state.store.read(|s| s.results.len()) == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(gateway.image_call_count(), 2);
        assert_eq!(state.store.read(|s| s.results.len()), 2);
    }

    #[::core::prelude::v1::test]
    fn form_update_touches_only_present_fields() {
        let mut form = FormState {
            brand_name: "Lumi".into(),
            tagline: "Glow".into(),
            ..Default::default()
        };
        let update: FormUpdate = serde_json::from_value(serde_json::json!({
            "tagline": "Shine",
            "variantCount": 2,
            "keepPose": true
        }))
        .unwrap();

        update.apply_to(&mut form);

        assert_eq!(form.brand_name, "Lumi");
        assert_eq!(form.tagline, "Shine");
        assert_eq!(form.variant_count, 2);
        assert!(form.fashion_state.keep_pose);
        assert!(form.fashion_state.keep_face);
    }
}
