// src/services/gemini.rs
use crate::config::StudioConfig;
use crate::errors::{GatewayError, StudioError};
use crate::models::UploadedImage;
use crate::services::gateway::*;
use crate::services::image_processor::data_url;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

const VIDEO_MIME: &str = "video/mp4";
const PITCH_VOICE: &str = "Kore";

/// Finish reasons that mean the model refused rather than failed.
const REFUSAL_REASONS: &[&str] = &[
    "SAFETY",
    "IMAGE_SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
    "RECITATION",
];

pub struct GeminiGateway {
    api_key: String,
    base_url: String,
    image_model: String,
    analysis_model: String,
    tts_model: String,
    video_model: String,
    client: Client,
}

impl GeminiGateway {
    pub fn new(config: &StudioConfig) -> Result<Self, StudioError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StudioError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            api_key: config.gemini_api_key.clone(),
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            image_model: config.image_model.clone(),
            analysis_model: config.analysis_model.clone(),
            tts_model: config.tts_model.clone(),
            video_model: config.video_model.clone(),
            client,
        })
    }

    async fn post(&self, url: String, body: &Value) -> Result<Value, GatewayError> {
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        read_json(response).await
    }

    async fn generate_content(&self, model: &str, body: &Value) -> Result<Value, GatewayError> {
        debug!("generateContent on {}", model);
        self.post(
            format!("{}/models/{}:generateContent", self.base_url, model),
            body,
        )
        .await
    }

    async fn download(&self, uri: &str) -> Result<Vec<u8>, GatewayError> {
        let response = self
            .client
            .get(uri)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        let bytes = response.bytes().await.map_err(transport_error)?;
        if bytes.is_empty() {
            return Err(GatewayError::MalformedResponse("empty video download".to_string()));
        }
        Ok(bytes.to_vec())
    }
}

fn inline_part(image: &UploadedImage) -> Value {
    json!({ "inlineData": { "mimeType": image.mime_type, "data": image.data } })
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Transient(format!("request timed out: {}", e))
    } else if e.is_decode() {
        GatewayError::MalformedResponse(e.to_string())
    } else {
        GatewayError::Transient(e.to_string())
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value, GatewayError> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;
    if !status.is_success() {
        return Err(classify_status(status, &body));
    }
    if body.trim().is_empty() {
        return Err(GatewayError::MalformedResponse("empty response body".to_string()));
    }
    serde_json::from_str(&body).map_err(|e| GatewayError::MalformedResponse(e.to_string()))
}

/// Map a non-success HTTP answer onto the failure taxonomy.
pub fn classify_status(status: StatusCode, body: &str) -> GatewayError {
    let lower = body.to_lowercase();
    let excerpt: String = body.chars().take(300).collect();

    if matches!(
        status,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
    ) || lower.contains("permission")
        || lower.contains("entity was not found")
        || lower.contains("api key not valid")
    {
        return GatewayError::Authorization(format!("{}: {}", status, excerpt));
    }
    if status == StatusCode::TOO_MANY_REQUESTS || body.contains("RESOURCE_EXHAUSTED") {
        return GatewayError::Quota(excerpt);
    }
    if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        return GatewayError::Transient(format!("{}: {}", status, excerpt));
    }
    if lower.contains("safety") || lower.contains("blocked") {
        return GatewayError::ContentRejected(excerpt);
    }
    GatewayError::Transient(format!("unexpected status {}", status))
}

fn refusal(response: &Value) -> Option<GatewayError> {
    if let Some(reason) = response["promptFeedback"]["blockReason"].as_str() {
        return Some(GatewayError::ContentRejected(reason.to_string()));
    }
    let reason = response["candidates"][0]["finishReason"].as_str()?;
    REFUSAL_REASONS
        .contains(&reason)
        .then(|| GatewayError::ContentRejected(reason.to_string()))
}

/// First inline payload of the first candidate as `(mime, base64)`.
pub fn extract_inline(response: &Value) -> Result<(String, String), GatewayError> {
    let parts = response["candidates"][0]["content"]["parts"].as_array();
    let inline = parts
        .into_iter()
        .flatten()
        .find_map(|p| p.get("inlineData"))
        .and_then(|d| Some((d["mimeType"].as_str()?, d["data"].as_str()?)))
        .filter(|(_, data)| !data.is_empty());

    match inline {
        Some((mime, data)) => Ok((mime.to_string(), data.to_string())),
        None => Err(refusal(response).unwrap_or_else(|| {
            GatewayError::MalformedResponse("no inline media in response".to_string())
        })),
    }
}

pub fn extract_text(response: &Value) -> Result<String, GatewayError> {
    let text: String = response["candidates"][0]["content"]["parts"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|p| p["text"].as_str())
        .collect();
    if text.trim().is_empty() {
        return Err(refusal(response)
            .unwrap_or_else(|| GatewayError::MalformedResponse("no text in response".to_string())));
    }
    Ok(text)
}

/// Interpret a long-running operation document.
pub fn operation_status(operation: &Value) -> Result<Option<String>, GatewayError> {
    if !operation["done"].as_bool().unwrap_or(false) {
        return Ok(None);
    }
    if let Some(error) = operation.get("error") {
        let code = error["code"].as_u64().unwrap_or(500) as u16;
        let message = error["message"].as_str().unwrap_or("video generation failed");
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return Err(classify_status(status, message));
    }

    let video = &operation["response"]["generateVideoResponse"];
    if let Some(reasons) = video["raiMediaFilteredReasons"].as_array() {
        let joined: Vec<&str> = reasons.iter().filter_map(Value::as_str).collect();
        if !joined.is_empty() {
            return Err(GatewayError::ContentRejected(joined.join("; ")));
        }
    }
    video["generatedSamples"][0]["video"]["uri"]
        .as_str()
        .map(|uri| Some(uri.to_string()))
        .ok_or_else(|| GatewayError::MalformedResponse("video job finished without a URI".to_string()))
}

#[async_trait]
impl GenerationGateway for GeminiGateway {
    async fn request_image(&self, request: &ImageRequest) -> Result<String, GatewayError> {
        let mut parts: Vec<Value> = request.images.iter().map(inline_part).collect();
        parts.push(json!({ "text": request.instruction }));

        let mut body = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
                "imageConfig": {
                    "aspectRatio": request.aspect_ratio.token(),
                    "imageSize": "1K"
                }
            }
        });
        if request.capabilities.trend_research {
            body["tools"] = json!([{ "googleSearch": {} }]);
        }

        let response = self.generate_content(&self.image_model, &body).await?;
        let (mime, data) = extract_inline(&response)?;
        Ok(format!("data:{};base64,{}", mime, data))
    }

    async fn request_video(&self, request: &VideoRequest) -> Result<VideoJob, GatewayError> {
        let mut instance = json!({ "prompt": request.instruction });
        if let Some(seed) = &request.seed_image {
            instance["image"] = json!({
                "bytesBase64Encoded": seed.data,
                "mimeType": seed.mime_type
            });
        }
        let body = json!({
            "instances": [instance],
            "parameters": {
                "aspectRatio": request.aspect_ratio.video_token(),
                "resolution": "720p",
                "sampleCount": 1
            }
        });

        let response = self
            .post(
                format!("{}/models/{}:predictLongRunning", self.base_url, self.video_model),
                &body,
            )
            .await?;
        response["name"]
            .as_str()
            .map(|name| VideoJob(name.to_string()))
            .ok_or_else(|| GatewayError::MalformedResponse("no operation name".to_string()))
    }

    async fn poll_video(&self, job: &VideoJob) -> Result<VideoStatus, GatewayError> {
        let response = self
            .client
            .get(format!("{}/{}", self.base_url, job.0))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(transport_error)?;
        let operation = read_json(response).await?;

        match operation_status(&operation) {
            Ok(None) => Ok(VideoStatus::Pending),
            Ok(Some(uri)) => {
                let bytes = self.download(&uri).await?;
                Ok(VideoStatus::Ready(data_url(VIDEO_MIME, &bytes)))
            }
            Err(e) => {
                warn!("Video job {} failed: {}", job.0, e);
                Ok(VideoStatus::Failed(e))
            }
        }
    }

    async fn request_analysis(
        &self,
        image: &UploadedImage,
        instruction: &str,
        schema: &Value,
    ) -> Result<Value, GatewayError> {
        let body = json!({
            "contents": [{ "parts": [inline_part(image), { "text": instruction }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": schema
            }
        });

        let response = self.generate_content(&self.analysis_model, &body).await?;
        let text = extract_text(&response)?;
        serde_json::from_str(&text)
            .map_err(|e| GatewayError::MalformedResponse(format!("analysis JSON: {}", e)))
    }

    async fn request_audio(&self, text: &str) -> Result<String, GatewayError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": text }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": PITCH_VOICE } }
                }
            }
        });

        let response = self.generate_content(&self.tts_model, &body).await?;
        let (_, data) = extract_inline(&response)?;
        // must be valid base64
        general_purpose::STANDARD
            .decode(&data)
            .map_err(|e| GatewayError::MalformedResponse(format!("audio payload: {}", e)))?;
        Ok(data)
    }
}
