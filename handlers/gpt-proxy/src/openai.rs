//! Typed client for the upstream conversational API.
//!
//! Covers the four endpoint shapes the proxy forwards to: chat completions,
//! thread creation, run creation (with or without an inline thread), and the
//! run-status / thread-messages follow-ups used by the polling flow.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Fixed model identifier for chat completion requests.
pub const CHAT_MODEL: &str = "gpt-4";

/// Answer returned when the upstream response carries no extractable text.
pub const FALLBACK_ANSWER: &str = "Sorry, I couldn't process your request.";

const ASSISTANTS_BETA: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread: Option<NewThread<'a>>,
}

#[derive(Debug, Serialize)]
struct NewThread<'a> {
    messages: &'a [ChatMessage],
}

/// Token accounting attached to completed upstream work.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: Option<ChatMessage>,
}

impl ChatCompletionResponse {
    /// First choice's message content, or the canned apology.
    pub fn answer_text(&self) -> String {
        self.choices
            .first()
            .and_then(|choice| choice.message.as_ref())
            .map(|message| message.content.clone())
            .unwrap_or_else(|| FALLBACK_ANSWER.to_string())
    }
}

/// A conversation thread object. Thread creation never returns usage data,
/// which is why `POST /threads` always fails the usage gate downstream.
#[derive(Debug, Default, Deserialize)]
pub struct ThreadObject {
    pub id: Option<String>,
    pub usage: Option<Usage>,
}

/// An asynchronous run against a conversation thread.
#[derive(Debug, Default, Deserialize)]
pub struct Run {
    pub id: Option<String>,
    pub thread_id: Option<String>,
    pub status: Option<String>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessageList {
    #[serde(default)]
    pub data: Vec<ThreadMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ThreadMessage {
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

#[derive(Debug, Deserialize)]
pub struct MessageContent {
    pub text: Option<TextContent>,
}

#[derive(Debug, Deserialize)]
pub struct TextContent {
    pub value: String,
}

impl MessageList {
    /// First message's first content block, or the canned apology.
    pub fn answer_text(&self) -> String {
        self.data
            .first()
            .and_then(|message| message.content.first())
            .and_then(|content| content.text.as_ref())
            .map(|text| text.value.clone())
            .unwrap_or_else(|| FALLBACK_ANSWER.to_string())
    }
}

/// Backoff schedule for run-status polling. The default reproduces the
/// historical fixed cadence of five 5-second attempts.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    pub backoff: f64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            interval: Duration::from_secs(5),
            backoff: 1.0,
        }
    }
}

impl PollPolicy {
    /// Delay before the zero-based retry `attempt`.
    fn delay(&self, attempt: u32) -> Duration {
        self.interval.mul_f64(self.backoff.powi(attempt as i32))
    }
}

/// How a polled run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed,
    Cancelled,
    Expired,
    /// The attempt budget ran out before a terminal status was seen.
    Exhausted,
}

impl RunOutcome {
    fn from_status(status: &str) -> Option<Self> {
        match status {
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// Thin client over the upstream API. One instance lives in `AppState` for
/// the lifetime of the process.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http,
            base_url,
            api_key: api_key.into(),
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
    }

    #[instrument(skip_all, fields(messages = messages.len()))]
    pub async fn chat_completion(
        &self,
        messages: &[ChatMessage],
    ) -> Result<ChatCompletionResponse, reqwest::Error> {
        self.post("/chat/completions")
            .json(&ChatCompletionRequest {
                model: CHAT_MODEL,
                messages,
            })
            .send()
            .await?
            .json()
            .await
    }

    /// Thread creation takes an empty body.
    #[instrument(skip_all)]
    pub async fn create_thread(&self) -> Result<ThreadObject, reqwest::Error> {
        self.post("/threads")
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body("")
            .send()
            .await?
            .json()
            .await
    }

    /// Create a run on a brand new thread seeded with the message list.
    #[instrument(skip_all, fields(assistant_id, messages = messages.len()))]
    pub async fn create_run(
        &self,
        assistant_id: &str,
        messages: &[ChatMessage],
    ) -> Result<Run, reqwest::Error> {
        self.post("/threads/runs")
            .header(ASSISTANTS_BETA.0, ASSISTANTS_BETA.1)
            .json(&CreateRunRequest {
                assistant_id,
                thread: Some(NewThread { messages }),
            })
            .send()
            .await?
            .json()
            .await
    }

    /// Create a run on an existing thread. No message list is sent here;
    /// the thread already holds the conversation upstream.
    #[instrument(skip_all, fields(thread_id, assistant_id))]
    pub async fn create_run_in_thread(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<Run, reqwest::Error> {
        self.post(&format!("/threads/{thread_id}/runs"))
            .header(ASSISTANTS_BETA.0, ASSISTANTS_BETA.1)
            .json(&CreateRunRequest {
                assistant_id,
                thread: None,
            })
            .send()
            .await?
            .json()
            .await
    }

    #[instrument(skip_all, fields(thread_id, run_id))]
    pub async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, reqwest::Error> {
        self.get(&format!("/threads/{thread_id}/runs/{run_id}"))
            .header(ASSISTANTS_BETA.0, ASSISTANTS_BETA.1)
            .send()
            .await?
            .json()
            .await
    }

    #[instrument(skip_all, fields(thread_id))]
    pub async fn list_messages(&self, thread_id: &str) -> Result<MessageList, reqwest::Error> {
        self.get(&format!("/threads/{thread_id}/messages"))
            .header(ASSISTANTS_BETA.0, ASSISTANTS_BETA.1)
            .send()
            .await?
            .json()
            .await
    }

    /// Poll the run status until it reaches a terminal state or the attempt
    /// budget runs out. Returns the classification together with the last run
    /// object seen; its usage field feeds the response headers.
    #[instrument(skip_all, fields(thread_id, run_id))]
    pub async fn wait_for_run(
        &self,
        thread_id: &str,
        run_id: &str,
        policy: &PollPolicy,
    ) -> Result<(RunOutcome, Run), reqwest::Error> {
        let mut last = Run::default();
        for attempt in 0..policy.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(policy.delay(attempt - 1)).await;
            }
            let run = self.get_run(thread_id, run_id).await?;
            let status = run.status.clone().unwrap_or_default();
            tracing::debug!(attempt, %status, "polled run status");
            if let Some(outcome) = RunOutcome::from_status(&status) {
                return Ok((outcome, run));
            }
            last = run;
        }
        tracing::warn!(
            attempts = policy.max_attempts,
            "run never reached a terminal status"
        );
        Ok((RunOutcome::Exhausted, last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy(max_attempts: u32) -> PollPolicy {
        PollPolicy {
            max_attempts,
            interval: Duration::from_millis(5),
            backoff: 1.0,
        }
    }

    fn run_body(status: &str) -> serde_json::Value {
        json!({
            "id": "run_1",
            "thread_id": "th_1",
            "status": status,
            "usage": {"prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 7}
        })
    }

    #[test]
    fn backoff_schedule_multiplies_the_interval() {
        let policy = PollPolicy {
            max_attempts: 4,
            interval: Duration::from_millis(100),
            backoff: 2.0,
        };
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
    }

    #[test]
    fn default_policy_matches_the_historical_cadence() {
        let policy = PollPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.interval, Duration::from_secs(5));
        assert_eq!(policy.delay(3), Duration::from_secs(5));
    }

    #[test]
    fn answer_extraction_falls_back_to_the_apology() {
        let empty = ChatCompletionResponse::default();
        assert_eq!(empty.answer_text(), FALLBACK_ANSWER);

        let list = MessageList::default();
        assert_eq!(list.answer_text(), FALLBACK_ANSWER);
    }

    #[test]
    fn answer_extraction_takes_the_first_message() {
        let list: MessageList = serde_json::from_value(json!({
            "data": [
                {"content": [{"type": "text", "text": {"value": "first"}}]},
                {"content": [{"type": "text", "text": {"value": "second"}}]}
            ]
        }))
        .unwrap();
        assert_eq!(list.answer_text(), "first");
    }

    #[tokio::test]
    async fn chat_completion_sends_the_fixed_model_and_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_json(json!({
                "model": "gpt-4",
                "messages": [{"role": "user", "content": "hi"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "hello"}}],
                "usage": {"prompt_tokens": 1, "completion_tokens": 2, "total_tokens": 3}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(reqwest::Client::new(), server.uri(), "sk-test");
        let response = client
            .chat_completion(&[ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(response.answer_text(), "hello");
        assert_eq!(response.usage.unwrap().total_tokens, Some(3));
    }

    #[tokio::test]
    async fn run_creation_without_thread_omits_the_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/threads/th_9/runs"))
            .and(header("OpenAI-Beta", "assistants=v2"))
            .and(body_json(json!({"assistant_id": "asst_default"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(run_body("queued")))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(reqwest::Client::new(), server.uri(), "sk-test");
        let run = client
            .create_run_in_thread("th_9", "asst_default")
            .await
            .unwrap();
        assert_eq!(run.id.as_deref(), Some("run_1"));
    }

    #[tokio::test]
    async fn polling_stops_early_on_completed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/threads/th_1/runs/run_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(run_body("in_progress")))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/threads/th_1/runs/run_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(run_body("completed")))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(reqwest::Client::new(), server.uri(), "sk-test");
        let (outcome, run) = client
            .wait_for_run("th_1", "run_1", &fast_policy(5))
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(run.status.as_deref(), Some("completed"));
    }

    #[tokio::test]
    async fn polling_stops_early_on_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/threads/th_1/runs/run_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(run_body("failed")))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(reqwest::Client::new(), server.uri(), "sk-test");
        let (outcome, _) = client
            .wait_for_run("th_1", "run_1", &fast_policy(5))
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::Failed);
    }

    #[tokio::test]
    async fn polling_exhausts_its_attempt_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/threads/th_1/runs/run_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(run_body("in_progress")))
            .expect(3)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(reqwest::Client::new(), server.uri(), "sk-test");
        let (outcome, last) = client
            .wait_for_run("th_1", "run_1", &fast_policy(3))
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::Exhausted);
        // The last observed run object is kept for the usage gate.
        assert!(last.usage.is_some());
    }
}
