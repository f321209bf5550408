//! Gemini `generateContent` API client and wire types

use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::config::AppConfig;
use crate::error::ChatError;
use crate::prompt::{SYSTEM_MESSAGE, SearchEmailsProps, search_emails_tool};

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum Role {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "model")]
    Model,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

/// One piece of a content block: text, a function-call request, or a
/// function-call result. Exactly one field is set in practice but the
/// API models them as optional siblings.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "functionCall", skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(rename = "functionResponse", skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

impl Part {
    pub fn text(content: &str) -> Self {
        Part {
            text: Some(content.to_string()),
            ..Default::default()
        }
    }

    pub fn function_call(name: &str, args: Map<String, Value>) -> Self {
        Part {
            function_call: Some(FunctionCall {
                name: name.to_string(),
                args,
            }),
            ..Default::default()
        }
    }

    /// The API expects the tool output wrapped in a `response` object
    pub fn function_response(name: &str, result: &str) -> Self {
        Part {
            function_response: Some(FunctionResponse {
                name: name.to_string(),
                response: json!({ "result": result }),
            }),
            ..Default::default()
        }
    }
}

/// Model-native grouping of one or more parts under a single role.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Content { role, parts }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct Property {
    pub r#type: String,
    pub description: String,
}

#[derive(Serialize, Clone, Debug)]
pub struct Parameters<Props: Serialize> {
    pub r#type: String,
    pub properties: Props,
    pub required: Vec<String>,
}

#[derive(Serialize, Clone, Debug)]
pub struct FunctionDeclaration<Props: Serialize> {
    pub name: String,
    pub description: String,
    pub parameters: Parameters<Props>,
}

#[derive(Serialize, Clone, Debug)]
pub struct Tool<Props: Serialize> {
    #[serde(rename = "functionDeclarations")]
    pub function_declarations: Vec<FunctionDeclaration<Props>>,
}

/// Single blocking call to the hosted model. Failure is fatal for the
/// request; the loop never retries it.
#[async_trait]
pub trait GenerateContent {
    async fn generate(&self, contents: &[Content]) -> Result<Content, ChatError>;
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

pub struct GeminiClient {
    http: reqwest::Client,
    api_hostname: String,
    api_key: String,
    model: String,
    system_instruction: String,
    tools: Vec<Tool<SearchEmailsProps>>,
}

impl GeminiClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_hostname: config.gemini_api_hostname.clone(),
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
            system_instruction: String::from(SYSTEM_MESSAGE),
            tools: vec![search_emails_tool()],
        }
    }

    async fn call(&self, contents: &[Content]) -> Result<Content, Error> {
        let payload = json!({
            "systemInstruction": { "parts": [{ "text": self.system_instruction }] },
            "contents": contents,
            "tools": self.tools,
        });
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_hostname.trim_end_matches("/"),
            self.model
        );
        let res = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(120))
            .json(&payload)
            .send()
            .await?;
        let status = res.status();
        let text = res.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("Model call failed: {} ({})", status, text);
        }
        let resp: GenerateContentResponse = serde_json::from_str(&text)?;
        resp.candidates
            .and_then(|mut candidates| {
                if candidates.is_empty() {
                    None
                } else {
                    Some(candidates.remove(0).content)
                }
            })
            .ok_or_else(|| anyhow!("Model response contained no candidates: {}", text))
    }
}

#[async_trait]
impl GenerateContent for GeminiClient {
    async fn generate(&self, contents: &[Content]) -> Result<Content, ChatError> {
        self.call(contents).await.map_err(ChatError::ModelInvocation)
    }
}
