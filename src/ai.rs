use crate::config::GeminiConfig;
use crate::models::{ChatPart, ChatTurn};
use crate::quiz::{build_prompt, QuizRequest, PAIR_SEPARATOR};
use futures::future::BoxFuture;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

pub trait AiClient: Send + Sync {
    /// Continues a conversation: `history` goes first, then `message` as a new
    /// user turn. Returns the model's reply text.
    fn chat(&self, history: Vec<ChatTurn>, message: String) -> BoxFuture<'static, anyhow::Result<String>>;

    /// Returns the raw `Question :: Answer` text blob for a quiz.
    fn generate_quiz_text(&self, request: &QuizRequest) -> BoxFuture<'static, anyhow::Result<String>>;
}

#[derive(Clone)]
pub struct MockAiClient;

impl AiClient for MockAiClient {
    fn chat(&self, history: Vec<ChatTurn>, message: String) -> BoxFuture<'static, anyhow::Result<String>> {
        Box::pin(async move {
            Ok(format!(
                "Mock reply after {} earlier turns: {}",
                history.len(),
                message.trim()
            ))
        })
    }

    fn generate_quiz_text(&self, request: &QuizRequest) -> BoxFuture<'static, anyhow::Result<String>> {
        let topic = request.topic.trim().to_string();
        let count = request.question_count.max(1);
        Box::pin(async move {
            let lines: Vec<String> = (1..=count)
                .map(|idx| format!("{} question {} {} answer{}", topic, idx, PAIR_SEPARATOR, idx))
                .collect();
            Ok(lines.join("\n"))
        })
    }
}

#[derive(Clone)]
pub struct GeminiAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    chat_model: String,
    quiz_model: String,
}

impl GeminiAiClient {
    pub fn new(config: &GeminiConfig, api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chat_model: config.chat_model.clone(),
            quiz_model: config.quiz_model.clone(),
        })
    }

    pub fn chat_model(&self) -> &str {
        &self.chat_model
    }

    pub fn quiz_model(&self) -> &str {
        &self.quiz_model
    }

    async fn generate_content(&self, model: &str, contents: Vec<ChatTurn>) -> anyhow::Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let started = std::time::Instant::now();
        let res = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(&GenerateContentRequest { contents })
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            let msg = extract_gemini_error(&body).unwrap_or(body);
            anyhow::bail!("gemini HTTP {}: {}", status, msg);
        }

        let body: GenerateContentResponse = res.json().await?;
        let text = body.reply_text()?;
        info!(
            model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            reply_len = text.len(),
            "gemini reply received"
        );
        Ok(text)
    }
}

impl AiClient for GeminiAiClient {
    fn chat(&self, history: Vec<ChatTurn>, message: String) -> BoxFuture<'static, anyhow::Result<String>> {
        let this = self.clone();
        Box::pin(async move {
            let mut contents = history;
            contents.push(ChatTurn::user(message));
            let model = this.chat_model.clone();
            this.generate_content(&model, contents).await
        })
    }

    fn generate_quiz_text(&self, request: &QuizRequest) -> BoxFuture<'static, anyhow::Result<String>> {
        let this = self.clone();
        let prompt = build_prompt(request);
        Box::pin(async move {
            let model = this.quiz_model.clone();
            this.generate_content(&model, vec![ChatTurn::user(prompt)]).await
        })
    }
}

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<ChatTurn>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback", default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ChatPart>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason", default)]
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn reply_text(self) -> anyhow::Result<String> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            let reason = self
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates".to_string());
            anyhow::bail!("gemini returned no reply: {}", reason);
        };
        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        Ok(text)
    }
}

fn extract_gemini_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct EWrap {
        error: EObj,
    }
    #[derive(Deserialize)]
    struct EObj {
        message: String,
    }
    serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
