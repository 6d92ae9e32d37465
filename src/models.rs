// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MIN_VARIANTS: u8 = 1;
pub const MAX_VARIANTS: u8 = 5;

pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// An image after normalization: always base64 PNG, identity fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedImage {
    pub id: String,
    pub data: String,
    pub mime_type: String,
}

impl UploadedImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandKit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<UploadedImage>,
    pub primary_color: String,
    #[serde(default)]
    pub secondary_colors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidelines_summary: Option<String>,
    #[serde(default)]
    pub is_enabled: bool,
}

impl Default for BrandKit {
    fn default() -> Self {
        Self {
            logo: None,
            primary_color: "#FF0000".to_string(),
            secondary_colors: Vec::new(),
            font_name: None,
            guidelines_summary: None,
            is_enabled: false,
        }
    }
}

impl BrandKit {
    /// First secondary color that appears more than once (case-insensitive).
    pub fn duplicate_color(&self) -> Option<&str> {
        self.secondary_colors.iter().enumerate().find_map(|(i, c)| {
            self.secondary_colors[..i]
                .iter()
                .any(|prev| prev.eq_ignore_ascii_case(c))
                .then_some(c.as_str())
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StyleCategory {
    Elegant,
    Cute,
    Bold,
    Modern,
    Retro,
    Impact,
    #[default]
    Auto,
}

impl StyleCategory {
    pub fn label(&self) -> &'static str {
        match self {
            StyleCategory::Elegant => "Luxury / Fashion / Refined",
            StyleCategory::Cute => "Cute / Youthful / Rounded",
            StyleCategory::Bold => "Bold / Vibrant / Eye-catching",
            StyleCategory::Modern => "Professional / Modern / Minimal",
            StyleCategory::Retro => "Nostalgic / Vintage / Film colors",
            StyleCategory::Impact => "Powerful / Shock promotion",
            StyleCategory::Auto => "Auto-detect from the product",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AspectRatio {
    #[default]
    Square,
    Portrait,
    Landscape,
}

impl AspectRatio {
    pub fn token(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Landscape => "16:9",
        }
    }

    /// Video models only render widescreen or vertical.
    pub fn video_token(&self) -> &'static str {
        match self {
            AspectRatio::Portrait => "9:16",
            AspectRatio::Square | AspectRatio::Landscape => "16:9",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlatformPreset {
    #[default]
    None,
    Shopee,
    Lazada,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeneratorMode {
    #[default]
    Standard,
    Campaign,
    Fashion,
    Bulk,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStage {
    Hook,
    Solution,
    Proof,
    Offer,
}

impl CampaignStage {
    pub const ALL: [CampaignStage; 4] = [
        CampaignStage::Hook,
        CampaignStage::Solution,
        CampaignStage::Proof,
        CampaignStage::Offer,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            CampaignStage::Hook => "1. HOOK (Attention)",
            CampaignStage::Solution => "2. SOLUTION (Interest)",
            CampaignStage::Proof => "3. PROOF (Desire)",
            CampaignStage::Offer => "4. OFFER (Action)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MotionEffect {
    Pan,
    Zoom,
    Pulse,
    Shake,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MagicAction {
    Crop,
    Resize,
    Eraser,
    FaceSwap,
    Annotate,
    Variant,
    Motion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactStatus {
    Pending,
    #[default]
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapPoint {
    pub x: f64,
    pub y: f64,
    pub intensity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdSafetyReport {
    pub score: u8,
    pub text_overlay_percentage: u8,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub is_safe: bool,
    pub attention_score: u8,
    pub brand_clarity_score: u8,
    pub sentiment: Sentiment,
    pub critique: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heatmap_points: Option<Vec<HeatmapPoint>>,
}

impl AdSafetyReport {
    /// Range check for scores and heatmap coordinates.
    pub fn out_of_range(&self) -> Option<String> {
        let scores = [
            ("score", self.score),
            ("textOverlayPercentage", self.text_overlay_percentage),
            ("attentionScore", self.attention_score),
            ("brandClarityScore", self.brand_clarity_score),
        ];
        if let Some((name, value)) = scores.iter().find(|(_, v)| *v > 100) {
            return Some(format!("{} out of range: {}", name, value));
        }
        self.heatmap_points.iter().flatten().find_map(|p| {
            let in_range = (0.0..=100.0).contains(&p.x)
                && (0.0..=100.0).contains(&p.y)
                && (0.5..=1.0).contains(&p.intensity);
            (!in_range).then(|| format!("heatmap point out of range: ({}, {}, {})", p.x, p.y, p.intensity))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub text: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
}

/// One gallery entry. `video_url` wins over `image_url` when both are set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    pub prompt_used: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_regenerating: bool,
    #[serde(default)]
    pub status: ArtifactStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design_rationale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_report: Option<AdSafetyReport>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motion_effect: Option<MotionEffect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_pitch_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<AspectRatio>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<CampaignStage>,
}

impl Artifact {
    pub fn ready_image(image_url: String, prompt_used: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            image_url,
            video_url: None,
            prompt_used: prompt_used.into(),
            timestamp: Utc::now(),
            is_regenerating: false,
            status: ArtifactStatus::Ready,
            error: None,
            design_rationale: None,
            safety_report: None,
            comments: Vec::new(),
            annotations: None,
            motion_effect: None,
            audio_pitch_data: None,
            aspect_ratio: None,
            campaign_id: None,
            stage: None,
        }
    }

    pub fn pending(prompt_used: impl Into<String>) -> Self {
        Self {
            is_regenerating: true,
            status: ArtifactStatus::Pending,
            ..Self::ready_image(String::new(), prompt_used)
        }
    }

    pub fn primary_media(&self) -> &str {
        self.video_url.as_deref().unwrap_or(&self.image_url)
    }

    pub fn is_video(&self) -> bool {
        self.video_url.is_some()
    }
}

/// Shallow partial update: only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactPatch {
    pub image_url: Option<String>,
    pub prompt_used: Option<String>,
    pub is_regenerating: Option<bool>,
    pub status: Option<ArtifactStatus>,
    pub error: Option<Option<String>>,
    pub design_rationale: Option<String>,
    pub annotations: Option<bool>,
    pub motion_effect: Option<Option<MotionEffect>>,
    pub audio_pitch_data: Option<String>,
    pub safety_report: Option<AdSafetyReport>,
}

impl ArtifactPatch {
    pub fn apply_to(self, artifact: &mut Artifact) {
        if let Some(v) = self.image_url {
            artifact.image_url = v;
        }
        if let Some(v) = self.prompt_used {
            artifact.prompt_used = v;
        }
        if let Some(v) = self.is_regenerating {
            artifact.is_regenerating = v;
        }
        if let Some(v) = self.status {
            artifact.status = v;
        }
        if let Some(v) = self.error {
            artifact.error = v;
        }
        if let Some(v) = self.design_rationale {
            artifact.design_rationale = Some(v);
        }
        if let Some(v) = self.annotations {
            artifact.annotations = Some(v);
        }
        if let Some(v) = self.motion_effect {
            artifact.motion_effect = v;
        }
        if let Some(v) = self.audio_pitch_data {
            artifact.audio_pitch_data = Some(v);
        }
        if let Some(v) = self.safety_report {
            artifact.safety_report = Some(v);
        }
    }

    /// Ends an in-flight mutation without touching the media.
    pub fn settle() -> Self {
        Self {
            is_regenerating: Some(false),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCategory {
    Food,
    Beauty,
    Tech,
    Fashion,
    Decor,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductAnalysis {
    pub category: ProductCategory,
    pub suggested_tags: Vec<String>,
    pub magic_prompt: String,
}

impl ProductAnalysis {
    pub fn fallback() -> Self {
        Self {
            category: ProductCategory::Other,
            suggested_tags: ["Professional", "Studio", "Creative", "Minimal", "4K"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            magic_prompt: "Professional product photography, studio lighting, clean background, high detail."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FashionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_image: Option<UploadedImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub garment_image: Option<UploadedImage>,
    pub keep_face: bool,
    pub keep_pose: bool,
}

impl Default for FashionState {
    fn default() -> Self {
        Self {
            model_image: None,
            garment_image: None,
            keep_face: true,
            keep_pose: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkState {
    #[serde(default)]
    pub input_images: Vec<UploadedImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_reference: Option<UploadedImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormState {
    pub brand_name: String,
    pub tagline: String,
    pub global_prompt: String,
    pub style_category: StyleCategory,
    pub aspect_ratio: AspectRatio,
    pub variant_count: u8,
    pub is_trend_aware: bool,
    pub generator_mode: GeneratorMode,
    pub pain_point: String,
    pub platform_preset: PlatformPreset,
    #[serde(default)]
    pub reference_images: Vec<UploadedImage>,
    #[serde(default)]
    pub product_images: Vec<UploadedImage>,
    #[serde(default)]
    pub fashion_state: FashionState,
    #[serde(default)]
    pub bulk_state: BulkState,
}

impl Default for FormState {
    fn default() -> Self {
        Self {
            brand_name: String::new(),
            tagline: String::new(),
            global_prompt: String::new(),
            style_category: StyleCategory::Auto,
            aspect_ratio: AspectRatio::Square,
            variant_count: 4,
            is_trend_aware: false,
            generator_mode: GeneratorMode::Standard,
            pain_point: String::new(),
            platform_preset: PlatformPreset::None,
            reference_images: Vec::new(),
            product_images: Vec::new(),
            fashion_state: FashionState::default(),
            bulk_state: BulkState::default(),
        }
    }
}

/// The whole session; this is exactly what export writes and import reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudioState {
    pub form: FormState,
    pub brand_kit: BrandKit,
    #[serde(default)]
    pub results: Vec<Artifact>,
    #[serde(default)]
    pub selected_banner_id: Option<String>,
    #[serde(default)]
    pub is_review_mode: bool,
    #[serde(default)]
    pub current_analysis: Option<ProductAnalysis>,
    #[serde(default)]
    pub is_analyzing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSlot {
    Reference,
    Product,
    BulkInput,
    StyleReference,
    Model,
    Garment,
    Logo,
}

/// Immutable snapshot of everything one generate action needs.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub mode: GeneratorMode,
    pub brand_name: String,
    pub tagline: String,
    pub custom_prompt: String,
    pub style: StyleCategory,
    pub aspect_ratio: AspectRatio,
    pub variant_count: u8,
    pub trend_aware: bool,
    pub pain_point: String,
    pub references: Vec<UploadedImage>,
    pub products: Vec<UploadedImage>,
    pub brand_kit: BrandKit,
    pub fashion: FashionState,
    pub bulk: BulkState,
}

impl GenerationRequest {
    pub fn from_state(state: &StudioState) -> Self {
        let form = &state.form;
        Self {
            mode: form.generator_mode,
            brand_name: form.brand_name.trim().to_string(),
            tagline: form.tagline.trim().to_string(),
            custom_prompt: form.global_prompt.clone(),
            style: form.style_category,
            aspect_ratio: form.aspect_ratio,
            variant_count: form.variant_count.clamp(MIN_VARIANTS, MAX_VARIANTS),
            trend_aware: form.is_trend_aware,
            pain_point: form.pain_point.clone(),
            references: form.reference_images.clone(),
            products: form.product_images.clone(),
            brand_kit: state.brand_kit.clone(),
            fashion: form.fashion_state.clone(),
            bulk: form.bulk_state.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub id: String,
    pub level: NoticeLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_secondary_colors_are_detected() {
        let mut kit = BrandKit::default();
        kit.secondary_colors = vec!["#111111".into(), "#222222".into(), "#111111".into()];
        assert_eq!(kit.duplicate_color(), Some("#111111"));

        kit.secondary_colors.pop();
        assert_eq!(kit.duplicate_color(), None);
    }

    #[test]
    fn video_wins_as_primary_media() {
        let mut artifact = Artifact::ready_image("data:image/png;base64,AAA".into(), "p");
        assert_eq!(artifact.primary_media(), "data:image/png;base64,AAA");

        artifact.video_url = Some("data:video/mp4;base64,BBB".into());
        assert_eq!(artifact.primary_media(), "data:video/mp4;base64,BBB");
    }

    #[test]
    fn patch_only_touches_named_fields() {
        let mut artifact = Artifact::pending("first");
        artifact.design_rationale = Some("kept".into());

        ArtifactPatch {
            image_url: Some("data:image/png;base64,NEW".into()),
            is_regenerating: Some(false),
            ..Default::default()
        }
        .apply_to(&mut artifact);

        assert_eq!(artifact.image_url, "data:image/png;base64,NEW");
        assert!(!artifact.is_regenerating);
        assert_eq!(artifact.prompt_used, "first");
        assert_eq!(artifact.design_rationale.as_deref(), Some("kept"));
        assert_eq!(artifact.status, ArtifactStatus::Pending);
    }

    #[test]
    fn request_snapshot_clamps_variant_count() {
        let mut state = StudioState::default();
        state.form.variant_count = 9;
        assert_eq!(GenerationRequest::from_state(&state).variant_count, MAX_VARIANTS);

        state.form.variant_count = 0;
        assert_eq!(GenerationRequest::from_state(&state).variant_count, MIN_VARIANTS);
    }

    #[test]
    fn safety_report_range_check() {
        let mut report = AdSafetyReport {
            score: 80,
            text_overlay_percentage: 10,
            warnings: vec![],
            is_safe: true,
            attention_score: 70,
            brand_clarity_score: 60,
            sentiment: Sentiment::Neutral,
            critique: "ok".into(),
            heatmap_points: Some(vec![HeatmapPoint { x: 50.0, y: 40.0, intensity: 0.8 }]),
        };
        assert!(report.out_of_range().is_none());

        report.heatmap_points = Some(vec![HeatmapPoint { x: 50.0, y: 40.0, intensity: 0.2 }]);
        assert!(report.out_of_range().is_some());

        report.heatmap_points = None;
        report.attention_score = 140;
        assert!(report.out_of_range().unwrap().contains("attentionScore"));
    }
}
