// src/services/session.rs
//! The session document: the whole [`StudioState`] as JSON. Export writes it
//! verbatim; import validates everything before the state is replaced.

use crate::errors::StudioError;
use crate::models::*;
use crate::services::results_store::{Action, ResultsStore};
use log::info;
use std::path::Path;

pub fn export(state: &StudioState) -> Result<String, StudioError> {
    serde_json::to_string_pretty(state).map_err(|e| StudioError::Serialization(e.to_string()))
}

/// Parses and validates a session document without touching any store.
pub fn import(document: &str) -> Result<StudioState, StudioError> {
    let state: StudioState =
        serde_json::from_str(document).map_err(|e| StudioError::Session(e.to_string()))?;
    validate(&state)?;
    Ok(state)
}

pub fn validate(state: &StudioState) -> Result<(), StudioError> {
    let reject = |message: String| Err(StudioError::Session(message));

    if !(MIN_VARIANTS..=MAX_VARIANTS).contains(&state.form.variant_count) {
        return reject(format!(
            "variantCount {} outside {}-{}",
            state.form.variant_count, MIN_VARIANTS, MAX_VARIANTS
        ));
    }
    if let Some(color) = state.brand_kit.duplicate_color() {
        return reject(format!("secondary color {} listed twice", color));
    }

    let mut artifact_ids: Vec<&str> = Vec::with_capacity(state.results.len());
    for artifact in &state.results {
        if artifact_ids.contains(&artifact.id.as_str()) {
            return reject(format!("duplicate artifact id {}", artifact.id));
        }
        artifact_ids.push(&artifact.id);

        let mut comment_ids: Vec<&str> = Vec::with_capacity(artifact.comments.len());
        for comment in &artifact.comments {
            if comment_ids.contains(&comment.id.as_str()) {
                return reject(format!(
                    "duplicate comment id {} on artifact {}",
                    comment.id, artifact.id
                ));
            }
            if !(0.0..=100.0).contains(&comment.x) || !(0.0..=100.0).contains(&comment.y) {
                return reject(format!("comment {} lies outside its artifact", comment.id));
            }
            comment_ids.push(&comment.id);
        }

        if let Some(problem) = artifact.safety_report.as_ref().and_then(|r| r.out_of_range()) {
            return reject(format!("artifact {}: {}", artifact.id, problem));
        }
    }

    if let Some(selected) = &state.selected_banner_id {
        if !artifact_ids.contains(&selected.as_str()) {
            return reject(format!("selected artifact {} does not exist", selected));
        }
    }
    Ok(())
}

/// Replaces the store's state with an imported one in a single action.
/// Stale in-flight markers are cleared; artifacts with a mutation still
/// running in this process keep theirs.
pub fn restore(store: &ResultsStore, mut state: StudioState) -> Result<(), StudioError> {
    validate(&state)?;
    for artifact in state.results.iter_mut().filter(|a| a.is_regenerating) {
        artifact.is_regenerating = false;
        if artifact.status == ArtifactStatus::Pending {
            artifact.status = ArtifactStatus::Failed;
            artifact.error = Some("Interrupted before completion".to_string());
        }
    }
    state.is_analyzing = false;

    let count = state.results.len();
    store.dispatch(Action::Import(Box::new(state)))?;
    info!("Session imported with {} result(s)", count);
    Ok(())
}

pub fn save_to_file(state: &StudioState, path: impl AsRef<Path>) -> Result<(), StudioError> {
    let path = path.as_ref();
    std::fs::write(path, export(state)?)
        .map_err(|e| StudioError::Session(format!("cannot write {}: {}", path.display(), e)))
}

pub fn load_from_file(path: impl AsRef<Path>) -> Result<StudioState, StudioError> {
    let path = path.as_ref();
    let document = std::fs::read_to_string(path)
        .map_err(|e| StudioError::Session(format!("cannot read {}: {}", path.display(), e)))?;
    import(&document)
}
