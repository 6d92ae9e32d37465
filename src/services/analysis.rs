// src/services/analysis.rs
//! Lightweight inspection calls: product analysis for prompt defaults and
//! the ad safety critique for finished artifacts.

use crate::errors::{GatewayError, StudioError};
use crate::models::{AdSafetyReport, ProductAnalysis, UploadedImage};
use crate::services::gateway::{GenerationGateway, request_structured};
use log::warn;
use serde_json::{Value, json};

const PRODUCT_INSTRUCTION: &str = r#"
Analyze this product image for an advertising campaign.

1. IDENTIFY CATEGORY: Choose one of [Food, Beauty, Tech, Fashion, Decor, Other].
2. SUGGEST TAGS: Provide 5 short adjectives or nouns describing a suitable background.
   - Food: warm, natural settings (wooden table, morning sun, fresh). Avoid neon or cyberpunk.
   - Beauty: silk, water surface, flowers, pastel, pure. Avoid grunge or industrial.
   - Tech: neon, dark studio, laser, modern, concrete.
3. MAGIC PROMPT: Write a detailed, photorealistic prompt describing the perfect scene for this product.
   Format: "[Style] + [Context/Background] + [Lighting] + [Details]".
"#;

const SAFETY_INSTRUCTION: &str = r#"
Act as an advertising quality assurance expert. Analyze this ad banner.

Evaluate:
1. Text overlay: estimate the percentage of the image covered by text (20% rule).
2. Brand clarity: is the logo or brand name visible?
3. Visual appeal: contrast, lighting and composition.
4. Heatmap: identify 3 focal points where the eye is drawn first (0-100 coordinates, intensity 0.5-1.0).

isSafe must be true only when score is above 70. Keep the critique to at most 2 sentences.
"#;

fn product_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "category": {
                "type": "STRING",
                "enum": ["Food", "Beauty", "Tech", "Fashion", "Decor", "Other"]
            },
            "suggestedTags": { "type": "ARRAY", "items": { "type": "STRING" } },
            "magicPrompt": { "type": "STRING" }
        },
        "required": ["category", "suggestedTags", "magicPrompt"]
    })
}

fn safety_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "score": { "type": "INTEGER" },
            "textOverlayPercentage": { "type": "INTEGER" },
            "warnings": { "type": "ARRAY", "items": { "type": "STRING" } },
            "isSafe": { "type": "BOOLEAN" },
            "attentionScore": { "type": "INTEGER" },
            "brandClarityScore": { "type": "INTEGER" },
            "sentiment": { "type": "STRING", "enum": ["Positive", "Neutral", "Negative"] },
            "critique": { "type": "STRING" },
            "heatmapPoints": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "x": { "type": "INTEGER" },
                        "y": { "type": "INTEGER" },
                        "intensity": { "type": "NUMBER" }
                    }
                }
            }
        },
        "required": [
            "score", "textOverlayPercentage", "warnings", "isSafe",
            "attentionScore", "brandClarityScore", "sentiment", "critique"
        ]
    })
}

/// Category, tags and a ready prompt for `image`. Never fails: any gateway
/// problem yields the generic fallback so manual prompting stays possible.
pub async fn analyze_product(gateway: &dyn GenerationGateway, image: &UploadedImage) -> ProductAnalysis {
    match try_analyze_product(gateway, image).await {
        Ok(analysis) => analysis,
        Err(e) => {
            warn!("Product analysis failed, using fallback: {}", e);
            ProductAnalysis::fallback()
        }
    }
}

async fn try_analyze_product(
    gateway: &dyn GenerationGateway,
    image: &UploadedImage,
) -> Result<ProductAnalysis, GatewayError> {
    let mut analysis: ProductAnalysis =
        request_structured(gateway, image, PRODUCT_INSTRUCTION, &product_schema()).await?;

    analysis.suggested_tags.retain(|t| !t.trim().is_empty());
    if analysis.suggested_tags.is_empty() {
        analysis.suggested_tags = ProductAnalysis::fallback().suggested_tags;
    }
    if analysis.magic_prompt.trim().is_empty() {
        analysis.magic_prompt = ProductAnalysis::fallback().magic_prompt;
    }
    Ok(analysis)
}

pub async fn assess_ad_safety(
    gateway: &dyn GenerationGateway,
    image: &UploadedImage,
) -> Result<AdSafetyReport, StudioError> {
    let report: AdSafetyReport =
        request_structured(gateway, image, SAFETY_INSTRUCTION, &safety_schema()).await?;
    if let Some(problem) = report.out_of_range() {
        return Err(GatewayError::MalformedResponse(problem).into());
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProductCategory, Sentiment};
    use crate::services::gateway::testing::ScriptedGateway;

    fn image() -> UploadedImage {
        UploadedImage {
            id: "i".into(),
            data: "AAAA".into(),
            mime_type: "image/png".into(),
        }
    }

    #[tokio::test]
    async fn product_analysis_parses_reply() {
        let gateway = ScriptedGateway::new();
        *gateway.analysis_reply.lock().unwrap() = Some(Ok(json!({
            "category": "Beauty",
            "suggestedTags": ["Silk", "", "Pastel"],
            "magicPrompt": "Macro beauty shot on silk"
        })));

        let analysis = analyze_product(&gateway, &image()).await;
        assert_eq!(analysis.category, ProductCategory::Beauty);
        assert_eq!(analysis.suggested_tags, vec!["Silk", "Pastel"]);
        assert_eq!(analysis.magic_prompt, "Macro beauty shot on silk");
    }

    #[tokio::test]
    async fn product_analysis_falls_back_on_any_failure() {
        let gateway = ScriptedGateway::new();
        *gateway.analysis_reply.lock().unwrap() =
            Some(Err(GatewayError::Quota("slow down".into())));
        assert_eq!(analyze_product(&gateway, &image()).await, ProductAnalysis::fallback());

        *gateway.analysis_reply.lock().unwrap() = Some(Ok(json!({ "category": "Spaceship" })));
        assert_eq!(analyze_product(&gateway, &image()).await, ProductAnalysis::fallback());
    }

    #[tokio::test]
    async fn safety_report_is_range_checked() {
        let gateway = ScriptedGateway::new();
        let mut reply = json!({
            "score": 82,
            "textOverlayPercentage": 15,
            "warnings": [],
            "isSafe": true,
            "attentionScore": 75,
            "brandClarityScore": 90,
            "sentiment": "Positive",
            "critique": "Clear hierarchy.",
            "heatmapPoints": [{ "x": 40, "y": 30, "intensity": 0.9 }]
        });
        *gateway.analysis_reply.lock().unwrap() = Some(Ok(reply.clone()));
        let report = assess_ad_safety(&gateway, &image()).await.unwrap();
        assert_eq!(report.sentiment, Sentiment::Positive);
        assert_eq!(report.heatmap_points.as_ref().map(Vec::len), Some(1));

        reply["heatmapPoints"][0]["x"] = json!(180);
        *gateway.analysis_reply.lock().unwrap() = Some(Ok(reply));
        let err = assess_ad_safety(&gateway, &image()).await.unwrap_err();
        assert!(matches!(
            err,
            StudioError::Gateway(GatewayError::MalformedResponse(_))
        ));
    }
}
