//! Language model collaborator
//!
//! Unmatched utterances are forwarded to a remote chat endpoint. Failures
//! never propagate: every error path degrades to a short canned reply that
//! is spoken instead.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;
use serde::Serialize;

use crate::Result;
use crate::config::LlmConfig;

/// Reply when the service answers with a non-success status
pub const SERVICE_UNAVAILABLE_REPLY: &str = "服务暂时不可用，请稍后再试";

/// Reply when the request times out
pub const TIMEOUT_REPLY: &str = "请求超时，请稍后再试";

/// Reply for any other request failure
pub const FAILURE_REPLY: &str = "处理请求时出错";

/// Reply when the response carries no answer
pub const MISSING_CONTENT_REPLY: &str = "响应中缺少有效内容";

/// Punctuation that ends a streamed answer
const SENTENCE_TERMINALS: [char; 6] = ['.', '?', '!', '。', '？', '！'];

static MARKDOWN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[#*_`~]").expect("valid regex"));
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<.*?>").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static JSON_FRAGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{.*?\}").expect("valid regex"));
static LOOSE_ANSWER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""answer":\s*"([^"]+)""#).expect("valid regex"));

/// Answers free-form questions
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Answer `text`; failures come back as a canned reply, never an error
    async fn ask(&self, text: &str) -> String;
}

/// Strip formatting the speech synthesizer should not read aloud
///
/// Removes markdown emphasis characters and HTML-like tags, collapses
/// whitespace runs, unescapes literal `\n`/`\t`, then drops `{...}`
/// fragments.
#[must_use]
pub fn clean_response(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let text = MARKDOWN.replace_all(text, "");
    let text = HTML_TAG.replace_all(&text, "");
    let text = WHITESPACE.replace_all(&text, " ");
    let text = text.replace("\\n", "\n").replace("\\t", "\t");
    let text = JSON_FRAGMENT.replace_all(&text, "");
    text.trim().to_string()
}

/// Pull the answer out of a blocking response body
///
/// Prefers `data.answer`, then a top-level `answer`.
#[must_use]
pub fn extract_answer(body: &serde_json::Value) -> Option<&str> {
    body.get("data")
        .filter(|data| data.is_object())
        .and_then(|data| data.get("answer"))
        .or_else(|| body.get("answer"))
        .and_then(serde_json::Value::as_str)
}

/// Assembles a streamed answer line by line
///
/// Stops at the first chunk that completes a sentence or carries a
/// `metadata` marker.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    metadata_seen: bool,
    complete: bool,
}

impl StreamAccumulator {
    /// Create an empty accumulator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one stream line; returns `true` once the answer is finished
    pub fn push_line(&mut self, line: &str) -> bool {
        let line = line.trim();
        let line = line.strip_prefix("data:").map_or(line, str::trim);
        if line.is_empty() {
            return self.is_done();
        }

        match serde_json::from_str::<serde_json::Value>(line) {
            Ok(chunk) => {
                if !self.metadata_seen {
                    if let Some(answer) = chunk.get("answer").and_then(serde_json::Value::as_str) {
                        let cleaned = clean_response(answer);
                        if cleaned.ends_with(SENTENCE_TERMINALS) {
                            self.complete = true;
                        }
                        self.text.push_str(&cleaned);
                    }
                }
                if chunk.get("metadata").is_some() {
                    self.metadata_seen = true;
                }
            }
            Err(_) => {
                if let Some(caps) = LOOSE_ANSWER.captures(line) {
                    self.text.push_str(&clean_response(&caps[1]));
                }
            }
        }

        self.is_done()
    }

    /// Whether no more lines are needed
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.metadata_seen || self.complete
    }

    /// Whether any text was collected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The collected answer
    #[must_use]
    pub fn finish(self) -> String {
        self.text
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    query: &'a str,
    #[serde(rename = "ResponseMode")]
    response_mode: &'a str,
    #[serde(rename = "UserId")]
    user_id: &'a str,
    #[serde(rename = "ProjectId", skip_serializing_if = "Option::is_none")]
    project_id: Option<&'a str>,
}

/// HTTP chat client
pub struct LlmClient {
    client: reqwest::Client,
    url: String,
    user_id: String,
    project_id: Option<String>,
    streaming: bool,
    timeout: Duration,
}

impl LlmClient {
    /// Create a client; `user_id` identifies this robot to the service
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &LlmConfig, user_id: impl Into<String>) -> Result<Self> {
        let timeout = config.timeout();
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: config.chat_url(),
            user_id: user_id.into(),
            project_id: config.project_id.clone(),
            streaming: config.streaming,
            timeout,
        })
    }

    /// Endpoint in use
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(
        &self,
        text: &str,
        response_mode: &str,
    ) -> std::result::Result<reqwest::Response, String> {
        let request = ChatRequest {
            query: text,
            response_mode,
            user_id: &self.user_id,
            project_id: self.project_id.as_deref(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.degrade(&e))?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "language model request failed");
            return Err(SERVICE_UNAVAILABLE_REPLY.to_string());
        }
        Ok(response)
    }

    /// Ask and wait for the complete response body
    pub async fn query(&self, text: &str) -> String {
        let response = match self.post(text, "blocking").await {
            Ok(response) => response,
            Err(reply) => return reply,
        };

        let body: serde_json::Value = match response.json().await {
            Ok(body) => body,
            Err(e) => return self.degrade(&e),
        };

        if let Some(answer) = extract_answer(&body) {
            return clean_response(answer);
        }
        tracing::warn!(%body, "response has no answer field");
        MISSING_CONTENT_REPLY.to_string()
    }

    /// Ask and assemble the answer from a line-delimited JSON stream
    ///
    /// If the stream breaks after some text arrived, that text is returned.
    pub async fn stream_query(&self, text: &str) -> String {
        let response = match self.post(text, "streaming").await {
            Ok(response) => response,
            Err(reply) => return reply,
        };

        let mut accumulator = StreamAccumulator::new();
        let mut pending: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    if accumulator.is_empty() {
                        return self.degrade(&e);
                    }
                    tracing::warn!(error = %e, "stream interrupted, using partial answer");
                    return accumulator.finish();
                }
            };

            pending.extend_from_slice(&bytes);
            while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                if accumulator.push_line(&String::from_utf8_lossy(&line)) {
                    return accumulator.finish();
                }
            }
        }

        if !pending.is_empty() {
            accumulator.push_line(&String::from_utf8_lossy(&pending));
        }
        accumulator.finish()
    }

    fn degrade(&self, error: &reqwest::Error) -> String {
        if error.is_timeout() {
            tracing::warn!(
                timeout_secs = self.timeout.as_secs_f64(),
                "language model request timed out"
            );
            TIMEOUT_REPLY.to_string()
        } else {
            tracing::warn!(error = %error, "language model request error");
            FAILURE_REPLY.to_string()
        }
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn ask(&self, text: &str) -> String {
        if self.streaming {
            self.stream_query(text).await
        } else {
            self.query(text).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleans_markdown_tags_and_json() {
        assert_eq!(clean_response("**你好**，<b>世界</b>"), "你好，世界");
        assert_eq!(clean_response("a   b\n\nc"), "a b c");
        assert_eq!(clean_response("答案{\"id\":1}完毕"), "答案完毕");
        assert_eq!(clean_response(""), "");
    }

    #[test]
    fn unescapes_after_collapsing() {
        // Literal backslash sequences survive whitespace collapsing
        assert_eq!(clean_response(r"一\n二"), "一\n二");
    }

    #[test]
    fn answer_extraction_order() {
        let nested = serde_json::json!({"data": {"answer": "inner"}, "answer": "outer"});
        assert_eq!(extract_answer(&nested), Some("inner"));

        let flat = serde_json::json!({"data": "x", "answer": "outer"});
        assert_eq!(extract_answer(&flat), Some("outer"));

        assert_eq!(extract_answer(&serde_json::json!({"result": 1})), None);
    }

    #[test]
    fn stream_stops_at_sentence_end() {
        let mut acc = StreamAccumulator::new();
        assert!(!acc.push_line(r#"data: {"answer": "今天"}"#));
        assert!(acc.push_line(r#"{"answer": "天气晴。"}"#));
        assert_eq!(acc.finish(), "今天天气晴。");
    }

    #[test]
    fn stream_stops_at_metadata() {
        let mut acc = StreamAccumulator::new();
        acc.push_line(r#"{"answer": "好的"}"#);
        assert!(acc.push_line(r#"{"event": "message_end", "metadata": {}}"#));
        acc.push_line(r#"{"answer": "ignored"}"#);
        assert_eq!(acc.finish(), "好的");
    }

    #[test]
    fn stream_salvages_broken_json() {
        let mut acc = StreamAccumulator::new();
        acc.push_line(r#"{"answer": "半截", "x": "#);
        acc.push_line("");
        assert_eq!(acc.finish(), "半截");
    }
}
