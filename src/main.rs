// src/main.rs
use actix_files::Files;
use actix_web::{App, HttpServer, middleware, web};
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;

mod config;
mod errors;
mod handlers;
mod models;
mod services;

use crate::config::StudioConfig;
use crate::handlers::*;
use crate::services::gateway::{GenerationGateway, PollSettings};
use crate::services::{
    AlwaysReady, GeminiGateway, ImageProcessor, Orchestrator, OrchestratorSettings, ResultsStore,
    SnapshotStore, session,
};

const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    store: Arc<ResultsStore>,
    orchestrator: Arc<Orchestrator>,
    image_processor: Arc<ImageProcessor>,
    snapshots: Option<Arc<SnapshotStore>>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting adforge studio service...");
    let config = StudioConfig::from_env()?;

    // Initialize services
    let store = Arc::new(ResultsStore::default());
    if let Some(path) = config.session_file.as_deref().filter(|p| Path::new(p).exists()) {
        session::restore(&store, session::load_from_file(path)?)?;
        info!("Restored session from {}", path);
    }

    let gateway: Arc<dyn GenerationGateway> = Arc::new(GeminiGateway::new(&config)?);
    let orchestrator = Arc::new(Orchestrator::new(
        gateway,
        Arc::new(AlwaysReady),
        store.clone(),
        OrchestratorSettings {
            stagger: config.stagger,
            video: PollSettings {
                interval: config.video_poll_interval,
                max_wait: config.video_max_wait,
            },
        },
    ));
    let image_processor = Arc::new(ImageProcessor::new(config.max_upload_dimension));

    let snapshots = match &config.redis_url {
        Some(url) => match SnapshotStore::new(url).await {
            Ok(snapshots) => Some(Arc::new(snapshots)),
            Err(e) => {
                warn!("Session snapshots disabled: {}", e);
                None
            }
        },
        None => None,
    };

    let app_state = AppState {
        store: store.clone(),
        orchestrator: orchestrator.clone(),
        image_processor,
        snapshots,
    };
    let static_dir = config.static_dir.clone();

    info!("Starting HTTP server on {}", config.bind_addr);

    HttpServer::new(move || {
        let app = App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().limit(MAX_BODY_BYTES))
            .app_data(web::PayloadConfig::new(MAX_BODY_BYTES))
            .wrap(middleware::Logger::default())
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health_check))
                    .route("/state", web::get().to(get_state))
                    .route("/form", web::put().to(update_form))
                    .route("/brand-kit", web::put().to(replace_brand_kit))
                    .route("/selection", web::put().to(select_result))
                    .route("/review-mode", web::put().to(set_review_mode))
                    .route("/images/{slot}", web::post().to(upload_images))
                    .route("/images/{slot}/{id}", web::delete().to(remove_image))
                    .route("/generate", web::post().to(generate))
                    .route("/results/{id}/regenerate", web::post().to(regenerate_result))
                    .route("/results/{id}/magic", web::post().to(magic_action))
                    .route("/results/{id}/motion", web::put().to(set_motion))
                    .route("/results/{id}/comments", web::post().to(add_comment))
                    .route("/results/{id}/safety", web::post().to(check_safety))
                    .route("/results/{id}/pitch", web::post().to(generate_pitch))
                    .route("/notifications", web::get().to(drain_notifications))
                    .route("/session/export", web::get().to(export_session))
                    .route("/session/import", web::post().to(import_session))
                    .route("/session/snapshots", web::post().to(save_snapshot))
                    .route("/session/snapshots/{id}", web::get().to(load_snapshot)),
            )
            .route("/health", web::get().to(health_check));

        match &static_dir {
            Some(dir) => app.service(Files::new("/", dir).index_file("index.html")),
            None => app,
        }
    })
    .bind(&config.bind_addr)?
    .run()
    .await?;

    orchestrator.shutdown();
    if let Some(path) = &config.session_file {
        session::save_to_file(&store.snapshot(), path)?;
        info!("Session saved to {}", path);
    }
    Ok(())
}
