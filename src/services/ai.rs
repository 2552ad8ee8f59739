//! AI text-generation client
//!
//! Thin client for an OpenAI-compatible chat-completions endpoint. Used
//! for three things: translating natural-language audience queries into
//! rule trees, drafting campaign message variants, and summarizing
//! campaign delivery stats into human-readable insights.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::models::CampaignStats;
use crate::segment::RuleSet;

/// AI service errors
#[derive(Debug, Error)]
pub enum AiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// A suggested campaign message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageVariant {
    pub message: String,
    pub tone: String,
    pub rationale: String,
}

#[derive(Debug, Deserialize)]
struct SuggestedMessages {
    #[serde(default)]
    variants: Vec<MessageVariant>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Chat-completions client
#[derive(Clone)]
pub struct AiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AiClient {
    pub fn new(config: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.ai_timeout)
            .build()
            .expect("failed to build HTTP client");
        Self {
            http,
            base_url: config.ai_base_url.trim_end_matches('/').to_string(),
            api_key: config.ai_api_key.clone(),
            model: config.ai_model.clone(),
        }
    }

    /// Convert a natural-language audience query into a rule tree
    pub async fn parse_rules(&self, query: &str) -> Result<RuleSet, AiError> {
        let prompt = format!(
            "Convert the following natural language query into a structured rule \
             format for customer segmentation:\n\
             Query: \"{query}\"\n\n\
             Return the response in the following JSON format:\n\
             {{\"combinator\": \"and\" | \"or\", \"rules\": [{{\"field\": string, \
             \"operator\": string, \"value\": string | number}}]}}\n\n\
             Available fields: total_spent (number), last_active (date), \
             visit_count (number), order_count (number), \
             days_since_last_order (number).\n\
             Available operators: =, !=, <, >, <=, >= and contains, beginsWith, \
             endsWith for text fields."
        );
        let content = self
            .chat(
                "You are a helpful assistant that converts natural language queries \
                 into structured rules for customer segmentation.",
                &prompt,
                0.3,
            )
            .await?;
        parse_json_content(&content)
    }

    /// Draft three message variants for a campaign objective and audience
    pub async fn suggest_messages(
        &self,
        objective: &str,
        audience_description: &str,
    ) -> Result<Vec<MessageVariant>, AiError> {
        let prompt = format!(
            "Generate 3 message variants for a campaign with the following \
             objective and audience:\n\
             Objective: {objective}\n\
             Audience: {audience_description}\n\n\
             Return the response in the following JSON format:\n\
             {{\"variants\": [{{\"message\": string, \"tone\": string, \
             \"rationale\": string}}]}}"
        );
        let content = self
            .chat(
                "You are a marketing copywriter that creates engaging, personalized \
                 messages for different customer segments.",
                &prompt,
                0.8,
            )
            .await?;
        let suggested: SuggestedMessages = parse_json_content(&content)?;
        Ok(suggested.variants)
    }

    /// Summarize delivery stats into actionable insights
    pub async fn campaign_insights(&self, stats: &CampaignStats) -> Result<String, AiError> {
        let stats_json =
            serde_json::to_string_pretty(stats).map_err(|e| AiError::Malformed(e.to_string()))?;
        let prompt = format!(
            "Generate human-readable insights for the following campaign \
             statistics:\n{stats_json}\n\n\
             Focus on:\n\
             1. Overall performance\n\
             2. Success/failure patterns\n\
             3. Notable trends\n\
             4. Recommendations for improvement\n\n\
             Keep the response concise and actionable."
        );
        self.chat(
            "You are a marketing analytics expert that provides clear, actionable \
             insights from campaign data.",
            &prompt,
            0.7,
        )
        .await
    }

    async fn chat(&self, system: &str, user: &str, temperature: f32) -> Result<String, AiError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature,
        };

        let response: ChatResponse = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AiError::Malformed("no completion choices".into()))
    }
}

/// Parse a JSON payload out of completion content, tolerating markdown
/// code fences around the object.
fn parse_json_content<T: serde::de::DeserializeOwned>(content: &str) -> Result<T, AiError> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str(body).map_err(|e| AiError::Malformed(e.to_string()))
}
