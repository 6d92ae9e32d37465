// src/services/prompt_composer.rs
//! Turns a generation request into the instruction text and attached
//! images sent to the gateway. Everything here is pure.

use crate::errors::StudioError;
use crate::models::*;
use crate::services::gateway::Capabilities;

const MARKET_CONTEXT: &str = "Vietnamese e-commerce";
const OUTPUT_LANGUAGE: &str = "Vietnamese";

pub const VARIANT_PALETTE: [&str; 6] = [
    "Red",
    "Blue",
    "Emerald Green",
    "Gold",
    "Purple",
    "Minimalist White",
];

/// One gateway call worth of input.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub instruction: String,
    pub images: Vec<UploadedImage>,
    pub capabilities: Capabilities,
    pub stage: Option<CampaignStage>,
}

/// Ordered rules, first match wins. Matching is on whole words.
const PROOF_RULES: &[(&[&str], &str)] = &[
    (
        &[
            "cosmetic", "cosmetics", "skincare", "skin care", "serum", "cream", "lipstick",
            "makeup", "moisturizer", "kem", "son môi", "mỹ phẩm",
        ],
        "Natural ingredients (leaves, water drops) and safety badges",
    ),
    (
        &[
            "apparel", "clothing", "shirt", "t-shirt", "dress", "jacket", "jeans", "hoodie",
            "fashion", "thời trang", "quần áo",
        ],
        "Extreme close-up on fabric texture and stitching details",
    ),
    (
        &[
            "electronic", "electronics", "speaker", "headphones", "earbuds", "laptop", "phone",
            "smartphone", "charger", "camera", "điện thoại", "loa",
        ],
        "Technical specs (processor, battery life) and high-tech diagrams",
    ),
];

const DEFAULT_PROOF: &str = "Customer reviews and 5-star ratings";

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn contains_phrase(haystack: &[String], phrase: &str) -> bool {
    let needle = words(phrase);
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle.as_slice())
}

pub fn proof_type(brand_name: &str, custom_prompt: &str) -> &'static str {
    let haystack = words(&format!("{} {}", custom_prompt, brand_name));
    PROOF_RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| contains_phrase(&haystack, k)))
        .map(|(_, proof)| *proof)
        .unwrap_or(DEFAULT_PROOF)
}

pub fn design_rationale(style: StyleCategory, brand_name: &str) -> String {
    match style {
        StyleCategory::Elegant => format!(
            "Negative space carries the premium feel for {}. Colors follow the 60-30-10 rule with deep tones dominant for a trustworthy, high-end impression.",
            brand_name
        ),
        StyleCategory::Cute => format!(
            "Rounded shapes and a pastel palette keep the mood friendly. A centered layout lets the {} product stand out without feeling harsh.",
            brand_name
        ),
        StyleCategory::Bold | StyleCategory::Impact => format!(
            "Maximum contrast grabs attention in the first half second. Heavy typography and a Z-pattern lead the eye straight to {}.",
            brand_name
        ),
        StyleCategory::Retro => format!(
            "Film grain and a vintage palette evoke nostalgia and build an emotional connection with {}.",
            brand_name
        ),
        StyleCategory::Modern => {
            "A strict grid and modern sans-serif typography read as professional, transparent and efficient.".to_string()
        }
        StyleCategory::Auto => format!(
            "Image and message are balanced. The focal point sits on the {} product along the rule of thirds to maximise conversion.",
            brand_name
        ),
    }
}

fn brand_block(kit: &BrandKit) -> String {
    if !kit.is_enabled {
        return String::new();
    }
    let secondary = if kit.secondary_colors.is_empty() {
        "None provided".to_string()
    } else {
        kit.secondary_colors.join(", ")
    };

    let mut block = format!(
        "STRICT BRAND DNA ENFORCEMENT:\n\
         - Primary Brand Color: {}. Use this for key elements (CTA, highlights).\n\
         - Secondary Brand Colors: {}. Use these for supporting elements and shapes.\n\
         - Logo Placement: Integrate the brand logo naturally (top corner or bottom right).\n",
        kit.primary_color, secondary
    );
    if let Some(font) = &kit.font_name {
        block.push_str(&format!("- Typography: Use the {} typeface for headlines.\n", font));
    }
    if let Some(guidelines) = &kit.guidelines_summary {
        block.push_str(&format!("- Brand Guidelines: {}\n", guidelines));
    }
    block
}

fn tagline_line(tagline: &str) -> String {
    if tagline.is_empty() {
        format!(
            "- Create a short, punchy, rhyming {} tagline using power words.",
            OUTPUT_LANGUAGE
        )
    } else {
        format!("- Tagline: \"{}\"", tagline)
    }
}

const TREND_BLOCK: &str = "TREND AWARENESS ENABLED: Research current design trends for this product category and incorporate them into the visual style (colors, motifs, layout).";

/// Images in the order the gateway must see them: logo, references, products.
fn attachments(
    kit: &BrandKit,
    references: &[UploadedImage],
    products: &[UploadedImage],
) -> Vec<UploadedImage> {
    let logo = kit.logo.iter().filter(|_| kit.is_enabled);
    logo.chain(references).chain(products).cloned().collect()
}

fn banner(
    request: &GenerationRequest,
    references: &[UploadedImage],
    products: &[UploadedImage],
) -> Composition {
    let mut instruction = format!(
        "Act as a world-class Creative Director and CRO expert. Design a high-conversion banner for the {market} market.\n\n\
         CORE MARKETING PRINCIPLES TO APPLY:\n\
         1. AIDA MODEL: Grab attention (headline/color) -> build interest (product) -> create desire (visuals) -> call to action.\n\
         2. Z-PATTERN LAYOUT: Arrange elements so the eye flows from top-left to bottom-right.\n\
         3. 60-30-10 COLOR RULE: 60% dominant, 30% secondary, 10% accent for key info and CTA.\n\
         4. VISUAL HIERARCHY: Brand name and headline must be distinct. The product is the hero.\n\n\
         {brand}\n\
         SPECIFIC INSTRUCTIONS:\n\
         - Context: {market}.\n\
         - Brand Name: \"{name}\" (must be clear, legible, professional).\n\
         - Language: {language} only.\n\
         {tagline}\n\
         - Style Direction: {style}.\n\
         - Custom Request: {custom}\n\
         - Product Integration: Blend the product into the scene with realistic lighting and shadows.\n\n\
         Output a photorealistic, high-resolution design suitable for a premium ad campaign.",
        market = MARKET_CONTEXT,
        brand = brand_block(&request.brand_kit),
        name = request.brand_name,
        language = OUTPUT_LANGUAGE,
        tagline = tagline_line(&request.tagline),
        style = request.style.label(),
        custom = request.custom_prompt,
    );

    if request.trend_aware {
        instruction.push_str("\n\n");
        instruction.push_str(TREND_BLOCK);
    }
    if request.brand_kit.is_enabled && request.brand_kit.logo.is_some() {
        instruction.push_str("\nNOTE: The first image provided is the BRAND LOGO. Place it prominently.");
    }

    Composition {
        instruction,
        images: attachments(&request.brand_kit, references, products),
        capabilities: Capabilities {
            trend_research: request.trend_aware,
        },
        stage: None,
    }
}

pub fn compose_standard(request: &GenerationRequest) -> Composition {
    banner(request, &request.references, &request.products)
}

fn stage_brief(stage: CampaignStage, request: &GenerationRequest, pain_point: &str) -> String {
    match stage {
        CampaignStage::Hook => format!(
            "SLIDE 1: ATTENTION (THE HOOK).\n\
             Goal: Stop the scroll. Address the pain point: \"{pain}\".\n\
             Visual: High contrast, a close-up of the problem or the product in dramatic lighting.\n\
             Text: Large, bold question or statement about \"{pain}\".\n\
             Layout: Text dominant (40-50%). Striking background color.",
            pain = pain_point
        ),
        CampaignStage::Solution => format!(
            "SLIDE 2: INTEREST (THE SOLUTION).\n\
             Goal: Introduce the product as the hero.\n\
             Visual: Beautiful studio shot of the product, perfectly lit. Clean background.\n\
             Text: Product name \"{}\" + key benefit or tagline \"{}\".\n\
             Layout: Product centered. Balanced text.",
            request.brand_name, request.tagline
        ),
        CampaignStage::Proof => format!(
            "SLIDE 3: DESIRE (THE PROOF).\n\
             Goal: Build trust.\n\
             Visual: {}. Show why it works.\n\
             Text: Short credibility statement (e.g. \"Top Rated\", \"100% Organic\"). Add 5-star graphic elements.\n\
             Layout: Detail-oriented, trust-building aesthetic.",
            proof_type(&request.brand_name, &request.custom_prompt)
        ),
        CampaignStage::Offer => "SLIDE 4: ACTION (THE OFFER).\n\
             Goal: Convert the sale.\n\
             Visual: Product shown with packaging or in a gift/sale context.\n\
             Text: Strong CTA such as \"BUY NOW\" or \"50% OFF\". Scarcity element \"Today only\".\n\
             Layout: The button is the focal point. Use the accent color heavily."
            .to_string(),
    }
}

/// Four compositions in Hook, Solution, Proof, Offer order sharing one preamble.
pub fn compose_campaign(request: &GenerationRequest) -> Vec<Composition> {
    let pain_point = if request.pain_point.trim().is_empty() {
        "General needs"
    } else {
        request.pain_point.trim()
    };
    let brand = brand_block(&request.brand_kit);
    let trend = if request.trend_aware { TREND_BLOCK } else { "" };

    CampaignStage::ALL
        .iter()
        .map(|&stage| Composition {
            instruction: format!(
                "Act as a marketing expert. Design the slide for campaign stage: {stage}.\n\
                 CONTEXT: {market}.\n\
                 BRAND: {name}.\n\
                 STYLE: {style}.\n\
                 CONSISTENCY: Use the same color palette and lighting across all slides.\n\
                 {brand}{trend}\n\n\
                 SPECIFIC SLIDE INSTRUCTIONS:\n{brief}",
                stage = stage.label(),
                market = MARKET_CONTEXT,
                name = request.brand_name,
                style = request.style.label(),
                brand = brand,
                trend = trend,
                brief = stage_brief(stage, request, pain_point),
            ),
            images: attachments(&request.brand_kit, &request.references, &request.products),
            capabilities: Capabilities {
                trend_research: request.trend_aware,
            },
            stage: Some(stage),
        })
        .collect()
}

/// Virtual try-on. Images are always `[model, garment]`.
pub fn compose_fashion(request: &GenerationRequest) -> Result<Composition, StudioError> {
    let (model, garment) = match (&request.fashion.model_image, &request.fashion.garment_image) {
        (Some(model), Some(garment)) => (model.clone(), garment.clone()),
        _ => {
            return Err(StudioError::Validation(
                "Fashion mode needs both a model photo and a garment photo".to_string(),
            ));
        }
    };

    let face = if request.fashion.keep_face {
        "YES, preserve the model's face exactly"
    } else {
        "NO, generate a new model face"
    };
    let pose = if request.fashion.keep_pose {
        "YES, preserve the pose"
    } else {
        "NO, you may improve the pose"
    };

    Ok(Composition {
        instruction: format!(
            "Act as a virtual fitting room AI.\n\
             Task: Realistically put the GARMENT (second image) onto the MODEL (first image).\n\n\
             Instructions:\n\
             - Keep the model's face: {}.\n\
             - Keep the pose: {}.\n\
             - Fit the garment naturally, respecting fabric physics, lighting and shadows.\n\
             - Brand context: {}.\n\n\
             Output a high-fashion photography result.",
            face, pose, request.brand_name
        ),
        images: vec![model, garment],
        capabilities: Capabilities::default(),
        stage: None,
    })
}

/// One standard composition per bulk input, in input order.
pub fn compose_bulk(request: &GenerationRequest) -> Vec<Composition> {
    let references: Vec<UploadedImage> = request.bulk.style_reference.iter().cloned().collect();
    request
        .bulk
        .input_images
        .iter()
        .map(|input| banner(request, &references, std::slice::from_ref(input)))
        .collect()
}

/// Video prompt plus the seed frame (first product image).
pub fn compose_video(request: &GenerationRequest) -> Composition {
    let direction = if request.custom_prompt.trim().is_empty() {
        "Slow motion, high quality, professional lighting."
    } else {
        request.custom_prompt.trim()
    };
    let mut instruction = format!(
        "Cinematic product commercial for {}. {}\nShowcase the product details clearly.\nStyle: {}.\n{}",
        request.brand_name,
        direction,
        request.style.label(),
        tagline_line(&request.tagline),
    );
    let brand = brand_block(&request.brand_kit);
    if !brand.is_empty() {
        instruction.push('\n');
        instruction.push_str(&brand);
    }
    if request.trend_aware {
        instruction.push('\n');
        instruction.push_str(TREND_BLOCK);
    }

    Composition {
        instruction,
        images: request.products.iter().take(1).cloned().collect(),
        capabilities: Capabilities {
            trend_research: request.trend_aware,
        },
        stage: None,
    }
}

pub fn compose_edit(current: UploadedImage, instruction: &str) -> Composition {
    Composition {
        instruction: format!(
            "Expertly edit this advertising banner based on: \"{}\".\n\
             Maintain the strategic marketing layout (Z-pattern) and high-end typography.\n\
             Ensure text remains legible {}.",
            instruction, OUTPUT_LANGUAGE
        ),
        images: vec![current],
        capabilities: Capabilities::default(),
        stage: None,
    }
}

pub fn compose_variant(current: UploadedImage, target_color: &str) -> Composition {
    Composition {
        instruction: format!(
            "Act as a colorist expert.\n\
             TASK: Create a distinct color variation of this ad banner.\n\
             INSTRUCTION: Change the dominant color scheme to: {} theme.\n\
             CONSTRAINT: Keep the product image, layout, text and composition EXACTLY the same. Only modify the background colors, shapes and lighting tone.",
            target_color
        ),
        images: vec![current],
        capabilities: Capabilities::default(),
        stage: None,
    }
}

/// Fixed edit instruction for the one-click edit actions.
pub fn magic_instruction(action: MagicAction) -> Option<&'static str> {
    match action {
        MagicAction::Crop => {
            Some("Crop the image closer to the main product, keeping it centered and high resolution.")
        }
        MagicAction::Resize => Some(
            "Zoom out significantly, extending the background seamlessly to create more negative space.",
        ),
        MagicAction::Eraser => Some(
            "Remove any text overlays, watermarks or distracting elements from the background. Keep the product clean.",
        ),
        MagicAction::FaceSwap => Some(
            "Replace the model's face with a friendly, smiling local model suitable for a regional ad.",
        ),
        MagicAction::Annotate | MagicAction::Variant | MagicAction::Motion => None,
    }
}

pub fn pitch_script(rationale: &str) -> String {
    format!("Explain the design idea: {}", rationale)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(id: &str) -> UploadedImage {
        UploadedImage {
            id: id.to_string(),
            data: "AAAA".to_string(),
            mime_type: "image/png".to_string(),
        }
    }

    fn request() -> GenerationRequest {
        let mut state = StudioState::default();
        state.form.brand_name = "Lumi".into();
        state.form.product_images = vec![image("p1")];
        state.form.reference_images = vec![image("r1")];
        GenerationRequest::from_state(&state)
    }

    #[test]
    fn proof_rules_first_match_wins() {
        assert_eq!(
            proof_type("Lumi", "hydrating face serum"),
            "Natural ingredients (leaves, water drops) and safety badges"
        );
        assert_eq!(
            proof_type("Threadline", "linen shirt for summer"),
            "Extreme close-up on fabric texture and stitching details"
        );
        assert_eq!(
            proof_type("Boom", "portable speaker"),
            "Technical specs (processor, battery life) and high-tech diagrams"
        );
        // cosmetics rule is listed before electronics
        assert_eq!(
            proof_type("Glow", "serum with a phone holder"),
            "Natural ingredients (leaves, water drops) and safety badges"
        );
        assert_eq!(proof_type("Bakery", "sourdough bread"), DEFAULT_PROOF);
    }

    #[test]
    fn keywords_match_whole_words_only() {
        // "address" must not trigger the "dress" rule
        assert_eq!(proof_type("Acme", "delivery to any address"), DEFAULT_PROOF);
        assert_eq!(
            proof_type("Acme", "Kem chống nắng"),
            "Natural ingredients (leaves, water drops) and safety badges"
        );
    }

    #[test]
    fn empty_tagline_asks_for_an_invented_one() {
        let composition = compose_standard(&request());
        assert!(composition.instruction.contains("rhyming"));

        let mut with_tagline = request();
        with_tagline.tagline = "Glow every day".into();
        let composition = compose_standard(&with_tagline);
        assert!(composition.instruction.contains("Tagline: \"Glow every day\""));
        assert!(!composition.instruction.contains("rhyming"));
    }

    #[test]
    fn brand_kit_block_and_logo_only_when_enabled() {
        let mut req = request();
        req.brand_kit.logo = Some(image("logo"));
        req.brand_kit.secondary_colors = vec!["#00FF00".into()];

        let disabled = compose_standard(&req);
        assert!(!disabled.instruction.contains("BRAND DNA"));
        assert_eq!(
            disabled.images.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(),
            vec!["r1", "p1"]
        );

        req.brand_kit.is_enabled = true;
        let enabled = compose_standard(&req);
        assert!(enabled.instruction.contains("BRAND DNA"));
        assert!(enabled.instruction.contains("#00FF00"));
        assert_eq!(
            enabled.images.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(),
            vec!["logo", "r1", "p1"]
        );
    }

    #[test]
    fn trend_flag_sets_instruction_and_capability() {
        let mut req = request();
        assert!(!compose_standard(&req).capabilities.trend_research);

        req.trend_aware = true;
        let composition = compose_standard(&req);
        assert!(composition.capabilities.trend_research);
        assert!(composition.instruction.contains("TREND AWARENESS"));
    }

    #[test]
    fn campaign_has_four_ordered_stages_sharing_a_preamble() {
        let mut req = request();
        req.custom_prompt = "vitamin serum".into();
        let stages = compose_campaign(&req);

        assert_eq!(
            stages.iter().map(|c| c.stage).collect::<Vec<_>>(),
            CampaignStage::ALL.iter().copied().map(Some).collect::<Vec<_>>()
        );
        for composition in &stages {
            assert!(composition.instruction.contains("BRAND: Lumi."));
            assert!(composition.instruction.contains("CONSISTENCY"));
        }
        assert!(stages[0].instruction.contains("General needs"));
        assert!(stages[2].instruction.contains("Natural ingredients"));
    }

    #[test]
    fn fashion_attaches_model_then_garment() {
        let mut req = request();
        req.fashion.model_image = Some(image("model"));
        req.fashion.garment_image = Some(image("garment"));
        req.fashion.keep_face = true;
        req.fashion.keep_pose = false;

        let composition = compose_fashion(&req).unwrap();
        assert_eq!(composition.images[0].id, "model");
        assert_eq!(composition.images[1].id, "garment");
        assert!(composition.instruction.contains("preserve the model's face exactly"));
        assert!(composition.instruction.contains("you may improve the pose"));

        req.fashion.keep_face = false;
        req.fashion.keep_pose = true;
        let composition = compose_fashion(&req).unwrap();
        assert!(composition.instruction.contains("generate a new model face"));
        assert!(composition.instruction.contains("YES, preserve the pose"));

        req.fashion.garment_image = None;
        assert!(compose_fashion(&req).is_err());
    }

    #[test]
    fn bulk_shares_style_reference_per_input() {
        let mut req = request();
        req.bulk.input_images = vec![image("a"), image("b"), image("c")];
        req.bulk.style_reference = Some(image("style"));

        let compositions = compose_bulk(&req);
        assert_eq!(compositions.len(), 3);
        for (composition, expected) in compositions.iter().zip(["a", "b", "c"]) {
            let ids: Vec<_> = composition.images.iter().map(|i| i.id.as_str()).collect();
            assert_eq!(ids, vec!["style", expected]);
        }
    }

    #[test]
    fn variant_constrains_everything_but_color() {
        let composition = compose_variant(image("current"), "Gold");
        assert!(composition.instruction.contains("Gold theme"));
        assert!(composition.instruction.contains("EXACTLY the same"));
        assert_eq!(composition.images.len(), 1);
    }

    #[test]
    fn video_uses_first_product_as_seed() {
        let mut req = request();
        req.products.push(image("p2"));
        let composition = compose_video(&req);
        assert_eq!(composition.images.len(), 1);
        assert_eq!(composition.images[0].id, "p1");
        assert!(composition.instruction.contains("Slow motion"));
    }

    #[test]
    fn only_edit_actions_have_instructions() {
        assert!(magic_instruction(MagicAction::Crop).is_some());
        assert!(magic_instruction(MagicAction::FaceSwap).is_some());
        assert!(magic_instruction(MagicAction::Variant).is_none());
        assert!(magic_instruction(MagicAction::Annotate).is_none());
    }
}
