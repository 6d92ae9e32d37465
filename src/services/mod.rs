// src/services/mod.rs
pub mod analysis;
pub mod credentials;
pub mod gateway;
pub mod gemini;
pub mod image_processor;
pub mod orchestrator;
pub mod prompt_composer;
pub mod redis_service;
pub mod results_store;
pub mod session;

pub use credentials::AlwaysReady;
pub use gemini::GeminiGateway;
pub use image_processor::ImageProcessor;
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use redis_service::SnapshotStore;
pub use results_store::ResultsStore;
