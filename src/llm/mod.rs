use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::brain::gateway::{GenerationRequest, GenerationResponse, Role, TextGenerator};
use crate::config::LlmConfig;
use crate::error::GenerationError;
use crate::events::{Emotion, Intent};

/// OpenAI-compatible chat completion client
#[derive(Clone)]
pub struct LLMClient {
    pub client: Client<OpenAIConfig>,
    pub model: String,
    pub max_tokens: u32,
}

impl LLMClient {
    pub fn new(api_key: String, base_url: Option<String>, model: String, max_tokens: u32) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(url) = base_url {
            config = config.with_api_base(url);
        }
        let client = Client::with_config(config);
        Self {
            client,
            model,
            max_tokens,
        }
    }

    /// `None` when no API key is configured (degraded mode)
    pub fn from_config(config: &LlmConfig) -> Option<Self> {
        let key = config.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())?;
        if let Some(url) = &config.base_url {
            info!("🤖 Using custom LLM base URL: {}", url);
        }
        info!("🤖 Using LLM model: {}", config.model);
        Some(Self::new(
            key.to_string(),
            config.base_url.clone(),
            config.model.clone(),
            config.max_tokens,
        ))
    }

    pub async fn chat(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        debug!("🤖 Sending request to LLM (Model: {})...", self.model);

        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system.as_str())
                .build()?,
        ));
        for (role, content) in &request.history {
            let msg = match role {
                Role::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(content.as_str())
                        .build()?,
                ),
                Role::Assistant => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(content.as_str())
                        .build()?,
                ),
            };
            messages.push(msg);
        }
        messages.push(ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.context.as_str())
                .build()?,
        ));

        let req = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .max_tokens(self.max_tokens)
            .messages(messages)
            .build()?;

        let response = self.client.chat().create(req).await?;
        debug!("🤖 LLM Response received.");

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GenerationError::Malformed("no choices in response".to_string()))
    }
}

#[async_trait]
impl TextGenerator for LLMClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, GenerationError> {
        let raw = self.chat(&request).await?;
        parse_generation(&raw)
    }
}

#[derive(Deserialize)]
struct RawGeneration {
    text: Option<String>,
    emotion: Option<String>,
    action: Option<String>,
    confidence: Option<f64>,
}

fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if start < end {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Parses the `{text, emotion, action, confidence}` contract. Tolerates
/// code fences and chatter around the object; anything without usable text
/// is malformed.
pub fn parse_generation(raw: &str) -> Result<GenerationResponse, GenerationError> {
    let json = extract_json(raw).ok_or_else(|| GenerationError::Malformed(format!("no JSON object in: {}", raw)))?;
    let parsed: RawGeneration =
        serde_json::from_str(json).map_err(|e| GenerationError::Malformed(e.to_string()))?;

    let text = parsed
        .text
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| GenerationError::Malformed("missing text".to_string()))?;

    Ok(GenerationResponse {
        text,
        emotion: parsed.emotion.as_deref().map(Emotion::parse).unwrap_or_default(),
        intent: parsed.action.as_deref().map(Intent::parse).unwrap_or_default(),
        confidence: parsed.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
    })
}
