use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct Instance {
    prompt: String,
}

#[derive(Serialize)]
struct Parameters {
    #[serde(rename = "sampleCount")]
    sample_count: u32,
}

#[derive(Serialize)]
struct PredictRequest {
    instances: Vec<Instance>,
    parameters: Parameters,
}

#[derive(Deserialize)]
struct Prediction {
    #[serde(rename = "bytesBase64Encoded")]
    bytes_base64: String,
    #[serde(rename = "mimeType", default)]
    mime_type: Option<String>,
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

/// One decoded image returned by the service.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Clone)]
pub struct ImagenClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl ImagenClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, "https://generativelanguage.googleapis.com")
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Request a single image for the given topic. No retries; the caller
    /// surfaces failure in the modal.
    pub async fn generate(&self, model: &str, topic: &str) -> Result<GeneratedImage> {
        let url = format!("{}/v1beta/models/{}:predict", self.base_url, model);

        let request = PredictRequest {
            instances: vec![Instance {
                prompt: art_prompt(topic),
            }],
            parameters: Parameters { sample_count: 1 },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Imagen API error {}: {}", status, text));
        }

        let predict_response: PredictResponse = response.json().await?;
        let prediction = predict_response
            .predictions
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Imagen returned no predictions"))?;

        let bytes = BASE64.decode(prediction.bytes_base64.as_bytes())?;
        Ok(GeneratedImage {
            bytes,
            mime_type: prediction
                .mime_type
                .unwrap_or_else(|| "image/jpeg".to_string()),
        })
    }
}

fn art_prompt(topic: &str) -> String {
    format!(
        "A vibrant, imaginative digital artwork inspired by the topic \"{}\". \
         Educational, detailed, suitable for a learning app.",
        topic
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn art_prompt_embeds_topic() {
        assert!(art_prompt("Volcanoes").contains("\"Volcanoes\""));
    }

    #[test]
    fn decodes_prediction_payload() {
        let json = r#"{"predictions":[{"bytesBase64Encoded":"aGVsbG8=","mimeType":"image/png"}]}"#;
        let response: PredictResponse = serde_json::from_str(json).unwrap();
        let prediction = response.predictions.into_iter().next().unwrap();
        assert_eq!(BASE64.decode(prediction.bytes_base64).unwrap(), b"hello");
        assert_eq!(prediction.mime_type.as_deref(), Some("image/png"));
    }
}
