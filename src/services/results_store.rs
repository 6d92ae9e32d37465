// src/services/results_store.rs
//! The studio state and the only way to change it.
//!
//! Every write is an [`Action`] applied by [`StudioState::apply`]. Actions
//! are checked before anything is written, so a rejected action leaves the
//! state exactly as it was. [`ResultsStore`] serializes actions behind one
//! lock that is never held across an await point.

use crate::errors::StudioError;
use crate::models::*;
use chrono::Utc;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub enum Action {
    SetForm(FormState),
    AddImages { slot: ImageSlot, images: Vec<UploadedImage> },
    RemoveImage { slot: ImageSlot, id: String },
    SetBrandKit(BrandKit),
    AddResult(Artifact),
    /// Prepended as one batch, keeping the batch's own order.
    AddResults(Vec<Artifact>),
    UpdateResult { id: String, patch: ArtifactPatch },
    AddComment { id: String, comment: Comment },
    SetAnalysis(Option<ProductAnalysis>),
    SetAnalyzing(bool),
    SelectResult(Option<String>),
    SetReviewMode(bool),
    Import(Box<StudioState>),
}

impl StudioState {
    pub fn find(&self, id: &str) -> Option<&Artifact> {
        self.results.iter().find(|r| r.id == id)
    }

    fn find_mut(&mut self, id: &str) -> Result<&mut Artifact, StudioError> {
        self.results
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StudioError::NotFound(format!("artifact {}", id)))
    }

    fn ensure_new_ids<'a>(&self, ids: impl Iterator<Item = &'a str>) -> Result<(), StudioError> {
        let mut seen: Vec<&str> = Vec::new();
        for id in ids {
            if seen.contains(&id) || self.find(id).is_some() {
                return Err(StudioError::Validation(format!("duplicate artifact id {}", id)));
            }
            seen.push(id);
        }
        Ok(())
    }

    pub fn apply(&mut self, action: Action) -> Result<(), StudioError> {
        match action {
            Action::SetForm(form) => {
                if !(MIN_VARIANTS..=MAX_VARIANTS).contains(&form.variant_count) {
                    return Err(StudioError::Validation(format!(
                        "variant count must be between {} and {}",
                        MIN_VARIANTS, MAX_VARIANTS
                    )));
                }
                self.form = form;
            }
            Action::AddImages { slot, images } => add_images(&mut self.form, &mut self.brand_kit, slot, images),
            Action::RemoveImage { slot, id } => remove_image(&mut self.form, &mut self.brand_kit, slot, &id),
            Action::SetBrandKit(kit) => {
                if let Some(color) = kit.duplicate_color() {
                    return Err(StudioError::Validation(format!(
                        "secondary color {} listed twice",
                        color
                    )));
                }
                self.brand_kit = kit;
            }
            Action::AddResult(artifact) => {
                self.ensure_new_ids(std::iter::once(artifact.id.as_str()))?;
                self.results.insert(0, artifact);
            }
            Action::AddResults(batch) => {
                self.ensure_new_ids(batch.iter().map(|a| a.id.as_str()))?;
                self.results.splice(0..0, batch);
            }
            Action::UpdateResult { id, patch } => patch.apply_to(self.find_mut(&id)?),
            Action::AddComment { id, comment } => {
                if !(0.0..=100.0).contains(&comment.x) || !(0.0..=100.0).contains(&comment.y) {
                    return Err(StudioError::Validation(
                        "comment position must be within 0-100".to_string(),
                    ));
                }
                let artifact = self.find_mut(&id)?;
                if artifact.comments.iter().any(|c| c.id == comment.id) {
                    return Err(StudioError::Validation(format!(
                        "comment {} already exists",
                        comment.id
                    )));
                }
                artifact.comments.push(comment);
            }
            Action::SetAnalysis(analysis) => self.current_analysis = analysis,
            Action::SetAnalyzing(flag) => self.is_analyzing = flag,
            Action::SelectResult(id) => {
                if let Some(id) = &id {
                    self.find_mut(id)?;
                }
                self.selected_banner_id = id;
            }
            Action::SetReviewMode(flag) => self.is_review_mode = flag,
            Action::Import(mut state) => {
                // tasks still running here own their artifacts' markers
                for artifact in state.results.iter_mut() {
                    if self.find(&artifact.id).is_some_and(|live| live.is_regenerating) {
                        artifact.is_regenerating = true;
                    }
                }
                state.is_analyzing |= self.is_analyzing;
                *self = *state;
            }
        }
        Ok(())
    }
}

fn add_images(form: &mut FormState, kit: &mut BrandKit, slot: ImageSlot, images: Vec<UploadedImage>) {
    match slot {
        ImageSlot::Reference => form.reference_images.extend(images),
        ImageSlot::Product => form.product_images.extend(images),
        ImageSlot::BulkInput => form.bulk_state.input_images.extend(images),
        // single-image slots keep the most recent upload
        ImageSlot::StyleReference => {
            if let Some(image) = images.into_iter().last() {
                form.bulk_state.style_reference = Some(image);
            }
        }
        ImageSlot::Model => {
            if let Some(image) = images.into_iter().last() {
                form.fashion_state.model_image = Some(image);
            }
        }
        ImageSlot::Garment => {
            if let Some(image) = images.into_iter().last() {
                form.fashion_state.garment_image = Some(image);
            }
        }
        ImageSlot::Logo => {
            if let Some(image) = images.into_iter().last() {
                kit.logo = Some(image);
            }
        }
    }
}

fn remove_image(form: &mut FormState, kit: &mut BrandKit, slot: ImageSlot, id: &str) {
    let clear = |image: &mut Option<UploadedImage>| {
        if image.as_ref().is_some_and(|i| i.id == id) {
            *image = None;
        }
    };
    match slot {
        ImageSlot::Reference => form.reference_images.retain(|i| i.id != id),
        ImageSlot::Product => form.product_images.retain(|i| i.id != id),
        ImageSlot::BulkInput => form.bulk_state.input_images.retain(|i| i.id != id),
        ImageSlot::StyleReference => clear(&mut form.bulk_state.style_reference),
        ImageSlot::Model => clear(&mut form.fashion_state.model_image),
        ImageSlot::Garment => clear(&mut form.fashion_state.garment_image),
        ImageSlot::Logo => clear(&mut kit.logo),
    }
}

pub struct ResultsStore {
    state: Mutex<StudioState>,
    notices: Mutex<Vec<Notice>>,
}

impl ResultsStore {
    pub fn new(state: StudioState) -> Self {
        Self {
            state: Mutex::new(state),
            notices: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StudioState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn dispatch(&self, action: Action) -> Result<(), StudioError> {
        self.lock().apply(action)
    }

    pub fn snapshot(&self) -> StudioState {
        self.lock().clone()
    }

    pub fn read<T>(&self, f: impl FnOnce(&StudioState) -> T) -> T {
        f(&self.lock())
    }

    pub fn insert(&self, artifact: Artifact) -> Result<(), StudioError> {
        self.dispatch(Action::AddResult(artifact))
    }

    pub fn insert_many(&self, artifacts: Vec<Artifact>) -> Result<(), StudioError> {
        self.dispatch(Action::AddResults(artifacts))
    }

    pub fn update_by_id(&self, id: &str, patch: ArtifactPatch) -> Result<(), StudioError> {
        self.dispatch(Action::UpdateResult {
            id: id.to_string(),
            patch,
        })
    }

    pub fn find_by_id(&self, id: &str) -> Option<Artifact> {
        self.lock().find(id).cloned()
    }

    /// Check-and-set of the in-flight marker. Returns the artifact as it was
    /// before the mutation started.
    pub fn try_begin_mutation(&self, id: &str) -> Result<Artifact, StudioError> {
        let mut state = self.lock();
        let artifact = state.find_mut(id)?;
        if artifact.is_regenerating {
            return Err(StudioError::InFlight(id.to_string()));
        }
        let before = artifact.clone();
        artifact.is_regenerating = true;
        Ok(before)
    }

    /// Claims the single product-analysis slot. False when one is running.
    pub fn try_begin_analysis(&self) -> bool {
        let mut state = self.lock();
        if state.is_analyzing {
            return false;
        }
        state.is_analyzing = true;
        true
    }

    pub fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        let notice = Notice {
            id: new_id(),
            level,
            message: message.into(),
            created_at: Utc::now(),
        };
        self.notices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notice);
    }

    pub fn drain_notices(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl Default for ResultsStore {
    fn default() -> Self {
        Self::new(StudioState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(id: &str) -> Artifact {
        Artifact {
            id: id.to_string(),
            ..Artifact::ready_image("data:image/png;base64,AAAA".into(), "prompt")
        }
    }

    fn comment(id: &str) -> Comment {
        Comment {
            id: id.to_string(),
            x: 10.0,
            y: 20.0,
            text: "Logo too small".into(),
            author: "Reviewer".into(),
            timestamp: Utc::now(),
        }
    }

    fn ids(store: &ResultsStore) -> Vec<String> {
        store.read(|s| s.results.iter().map(|r| r.id.clone()).collect())
    }

    #[test]
    fn insert_prepends_and_batches_keep_their_order() {
        let store = ResultsStore::default();
        store.insert(artifact("old")).unwrap();
        store.insert(artifact("newer")).unwrap();
        store
            .insert_many(vec![artifact("b1"), artifact("b2"), artifact("b3")])
            .unwrap();

        assert_eq!(ids(&store), vec!["b1", "b2", "b3", "newer", "old"]);
    }

    #[test]
    fn duplicate_ids_are_rejected_without_partial_writes() {
        let store = ResultsStore::default();
        store.insert(artifact("a")).unwrap();

        assert!(store.insert(artifact("a")).is_err());
        assert!(store.insert_many(vec![artifact("x"), artifact("a")]).is_err());
        assert!(store.insert_many(vec![artifact("y"), artifact("y")]).is_err());
        assert_eq!(ids(&store), vec!["a"]);
    }

    #[test]
    fn update_merges_only_named_fields() {
        let store = ResultsStore::default();
        let mut original = artifact("a");
        original.design_rationale = Some("why".into());
        store.insert(original).unwrap();

        store
            .update_by_id(
                "a",
                ArtifactPatch {
                    prompt_used: Some("edited".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        let updated = store.find_by_id("a").unwrap();
        assert_eq!(updated.prompt_used, "edited");
        assert_eq!(updated.design_rationale.as_deref(), Some("why"));
        assert!(matches!(
            store.update_by_id("missing", ArtifactPatch::settle()),
            Err(StudioError::NotFound(_))
        ));
    }

    #[test]
    fn in_flight_marker_is_exclusive() {
        let store = ResultsStore::default();
        store.insert(artifact("a")).unwrap();

        let before = store.try_begin_mutation("a").unwrap();
        assert!(!before.is_regenerating);
        assert!(matches!(
            store.try_begin_mutation("a"),
            Err(StudioError::InFlight(_))
        ));

        store.update_by_id("a", ArtifactPatch::settle()).unwrap();
        assert!(store.try_begin_mutation("a").is_ok());
    }

    #[test]
    fn comments_are_append_only_and_unique() {
        let store = ResultsStore::default();
        store.insert(artifact("a")).unwrap();
        let add = |c: Comment| {
            store.dispatch(Action::AddComment {
                id: "a".into(),
                comment: c,
            })
        };

        add(comment("c1")).unwrap();
        add(comment("c2")).unwrap();
        assert!(add(comment("c1")).is_err());

        let mut off_canvas = comment("c3");
        off_canvas.x = 130.0;
        assert!(add(off_canvas).is_err());

        let stored = store.find_by_id("a").unwrap();
        let comment_ids: Vec<_> = stored.comments.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(comment_ids, vec!["c1", "c2"]);
    }

    #[test]
    fn brand_kit_is_replaced_whole_and_validated() {
        let store = ResultsStore::default();
        let mut kit = BrandKit {
            is_enabled: true,
            secondary_colors: vec!["#FFFFFF".into(), "#ffffff".into()],
            ..Default::default()
        };
        assert!(store.dispatch(Action::SetBrandKit(kit.clone())).is_err());
        assert!(!store.read(|s| s.brand_kit.is_enabled));

        kit.secondary_colors.pop();
        store.dispatch(Action::SetBrandKit(kit.clone())).unwrap();
        assert_eq!(store.read(|s| s.brand_kit.clone()), kit);
    }

    #[test]
    fn image_slots_route_uploads() {
        let store = ResultsStore::default();
        let image = |id: &str| UploadedImage {
            id: id.into(),
            data: "AAAA".into(),
            mime_type: "image/png".into(),
        };

        store
            .dispatch(Action::AddImages {
                slot: ImageSlot::Product,
                images: vec![image("p1"), image("p2")],
            })
            .unwrap();
        store
            .dispatch(Action::AddImages {
                slot: ImageSlot::Garment,
                images: vec![image("g1"), image("g2")],
            })
            .unwrap();
        store
            .dispatch(Action::RemoveImage {
                slot: ImageSlot::Product,
                id: "p1".into(),
            })
            .unwrap();

        let form = store.read(|s| s.form.clone());
        assert_eq!(form.product_images.len(), 1);
        assert_eq!(form.product_images[0].id, "p2");
        assert_eq!(form.fashion_state.garment_image.unwrap().id, "g2");
    }

    #[test]
    fn selecting_unknown_result_fails() {
        let store = ResultsStore::default();
        assert!(store.dispatch(Action::SelectResult(Some("nope".into()))).is_err());
        store.insert(artifact("a")).unwrap();
        store.dispatch(Action::SelectResult(Some("a".into()))).unwrap();
        assert_eq!(store.read(|s| s.selected_banner_id.clone()), Some("a".into()));
    }

    #[test]
    fn only_one_analysis_runs_at_a_time() {
        let store = ResultsStore::default();
        assert!(store.try_begin_analysis());
        assert!(!store.try_begin_analysis());
        store.dispatch(Action::SetAnalyzing(false)).unwrap();
        assert!(store.try_begin_analysis());
    }

    #[test]
    fn notices_drain_once() {
        let store = ResultsStore::default();
        store.notify(NoticeLevel::Info, "working");
        store.notify(NoticeLevel::Success, "done");
        assert_eq!(store.drain_notices().len(), 2);
        assert!(store.drain_notices().is_empty());
    }

    #[test]
    fn import_keeps_markers_of_running_mutations() {
        let store = ResultsStore::default();
        store.insert(artifact("a")).unwrap();
        store.insert(artifact("b")).unwrap();
        store.try_begin_mutation("a").unwrap();
        assert!(store.try_begin_analysis());

        let mut imported = store.snapshot();
        for artifact in imported.results.iter_mut() {
            artifact.is_regenerating = false;
        }
        imported.is_analyzing = false;
        store.dispatch(Action::Import(Box::new(imported))).unwrap();

        assert!(matches!(store.try_begin_mutation("a"), Err(StudioError::InFlight(_))));
        assert!(store.try_begin_mutation("b").is_ok());
        assert!(!store.try_begin_analysis());
    }
}
