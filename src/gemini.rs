use crate::config::EntityConfig;
use crate::logging;
use crate::prompts;
use crate::router::Turn;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::time::Duration;

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const REQUEST_TIMEOUT_SECS: u64 = 60; // 60 second timeout for API requests

// Model constants
pub const GEMINI_FLASH: &str = "gemini-1.5-flash";
pub const GEMINI_FLASH_8B: &str = "gemini-1.5-flash-8b";

/// Remote completion collaborator. Given the entity configuration, one user
/// message and bounded recent context, return one natural-language reply or
/// fail. The router decides what failure degrades to.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(
        &self,
        config: &EntityConfig,
        message: &str,
        context: &[Turn],
    ) -> Result<String, Box<dyn Error + Send + Sync>>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: ErrorDetails,
}

#[derive(Debug, Deserialize)]
struct ErrorDetails {
    message: String,
    status: String,
}

/// Gemini client with a primary model and a distinct fallback model. One
/// attempt per model, sequential; a fallback chain, not a retry of
/// identical work.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    primary_model: String,
    fallback_model: String,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_models(api_key, GEMINI_FLASH, GEMINI_FLASH_8B)
    }

    pub fn with_models(api_key: &str, primary_model: &str, fallback_model: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key: api_key.to_string(),
            primary_model: primary_model.to_string(),
            fallback_model: fallback_model.to_string(),
        }
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        let response = self
            .client
            .post(format!(
                "{}/{}:generateContent?key={}",
                GEMINI_API_URL, model, self.api_key
            ))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;

            // Try to parse structured error
            if let Ok(parsed_error) = serde_json::from_str::<GeminiError>(&error_text) {
                return Err(format!(
                    "Gemini API error ({}): {} - {}",
                    status, parsed_error.error.status, parsed_error.error.message
                )
                .into());
            }

            return Err(format!("Gemini API error ({}): {}", status, error_text).into());
        }

        let completion: GenerateResponse = response.json().await?;

        completion
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .and_then(|p| p.text.clone())
            .ok_or_else(|| "No text response from Gemini".into())
    }

    /// Validate the Gemini API key with a minimal request
    pub async fn validate_api_key(&self) -> Result<bool, Box<dyn Error + Send + Sync>> {
        match self.generate(&self.primary_model, "Say 'ok'").await {
            Ok(_) => Ok(true),
            Err(e) => {
                let message = e.to_string();
                if message.contains("API_KEY_INVALID") || message.contains("(401") || message.contains("(403") {
                    return Err("Invalid Gemini API key".into());
                }
                if message.contains("(429") {
                    return Err("Rate limited - too many requests".into());
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Completion for GeminiClient {
    async fn complete(
        &self,
        config: &EntityConfig,
        message: &str,
        context: &[Turn],
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        let prompt = prompts::build_prompt(config, message, context);

        match self.generate(&self.primary_model, &prompt).await {
            Ok(text) => Ok(text),
            Err(e) => {
                logging::log_error(None, &format!(
                    "Model {} failed ({}), trying {}",
                    self.primary_model, e, self.fallback_model
                ));
                self.generate(&self.fallback_model, &prompt).await
            }
        }
    }
}
