//! Request pipeline for the proxy: method gate, route resolution, history
//! folding, upstream dispatch, run polling, and response assembly.

use std::sync::Arc;

use aws_lambda_events::apigw::{ApiGatewayProxyRequest, ApiGatewayProxyResponse};
use http::Method;
use lambda_runtime::{Error as LambdaError, LambdaEvent};
use serde::Deserialize;
use tracing::instrument;

use crate::config::ProxyConfig;
use crate::conversation::ConversationStore;
use crate::error::ProxyError;
use crate::openai::{ChatMessage, OpenAiClient, PollPolicy, Run, RunOutcome, Usage};
use crate::response;
use crate::routes::{self, Target};

/// Shared application state across Lambda invocations.
pub struct AppState {
    pub openai: OpenAiClient,
    pub conversations: ConversationStore,
    pub default_assistant_id: String,
    pub poll: PollPolicy,
}

impl AppState {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            openai: OpenAiClient::new(reqwest::Client::new(), config.base_url, config.api_key),
            conversations: ConversationStore::new(
                config.conversation_ttl,
                config.conversation_capacity,
            ),
            default_assistant_id: config.assistant_id,
            poll: config.poll,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PromptRequest {
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    context_id: Option<String>,
}

/// Lambda entry point. Domain errors become HTTP responses, never
/// invocation failures.
#[instrument(skip_all, fields(method, path))]
pub async fn handle_request(
    event: LambdaEvent<ApiGatewayProxyRequest>,
    state: Arc<AppState>,
) -> Result<ApiGatewayProxyResponse, LambdaError> {
    let (request, _context) = event.into_parts();
    Ok(match process(request, &state).await {
        Ok(response) => response,
        Err(error) => error.into_response(),
    })
}

async fn process(
    request: ApiGatewayProxyRequest,
    state: &AppState,
) -> Result<ApiGatewayProxyResponse, ProxyError> {
    let method = request.http_method.clone();
    let path = inbound_path(&request);
    let span = tracing::Span::current();
    span.record("method", method.as_str());
    span.record("path", path.as_str());
    tracing::info!(%method, %path, "received request");

    if method == Method::OPTIONS {
        // CORS preflight, nothing to forward
        return Ok(response::response(200, None));
    }
    if method != Method::POST {
        return Err(ProxyError::MethodNotAllowed(method));
    }

    let route = routes::resolve(&path).ok_or_else(|| ProxyError::PathNotFound(path.clone()))?;
    tracing::debug!(route = ?route, "resolved route");

    let body = request
        .body
        .as_deref()
        .ok_or_else(|| ProxyError::InvalidInput("missing request body".to_string()))?;
    let input: PromptRequest =
        serde_json::from_str(body).map_err(|error| ProxyError::InvalidInput(error.to_string()))?;

    let assistant_id = route
        .mode
        .assistant_id()
        .unwrap_or(&state.default_assistant_id)
        .to_string();

    // A non-empty context_id opts this request into stored history.
    let history_key = input
        .context_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .map(|id| format!("{}:{}", route.mode, id));

    let messages = match &history_key {
        Some(key) => state.conversations.push_user(key, &input.prompt),
        None => vec![ChatMessage::user(&input.prompt)],
    };
    tracing::debug!(turns = messages.len(), "outbound message list built");

    let (answer, usage) = match &route.target {
        Target::ChatCompletions => {
            let completion = state.openai.chat_completion(&messages).await?;
            let usage = require_usage(&completion.usage)?;
            (completion.answer_text(), usage)
        }
        Target::CreateThread => {
            let thread = state.openai.create_thread().await?;
            // Thread objects carry no usage data, so this always rejects.
            let usage = require_usage(&thread.usage)?;
            (crate::openai::FALLBACK_ANSWER.to_string(), usage)
        }
        Target::CreateRun => {
            let run = state.openai.create_run(&assistant_id, &messages).await?;
            run_answer(state, run).await?
        }
        Target::CreateRunInThread(thread_id) => {
            // Only the default assistant id is forwarded here; the message
            // list stays out of the body because the upstream thread already
            // holds the conversation.
            let run = state
                .openai
                .create_run_in_thread(thread_id, &state.default_assistant_id)
                .await?;
            run_answer(state, run).await?
        }
        Target::Thread(_) => return Err(ProxyError::NoUpstreamRoute(path)),
    };

    if let Some(key) = &history_key {
        state.conversations.push_assistant(key, &answer);
    }

    tracing::info!(
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        total_tokens = usage.total_tokens,
        "request completed"
    );
    Ok(response::success(&answer, &usage))
}

/// Poll the freshly created run, then fetch the thread messages for the
/// answer. Non-completed outcomes are logged, not fatal: the message fetch
/// happens regardless.
async fn run_answer(state: &AppState, run: Run) -> Result<(String, Usage), ProxyError> {
    let (Some(run_id), Some(thread_id)) = (run.id, run.thread_id) else {
        tracing::error!("run creation response carried no run or thread id");
        return Err(ProxyError::MissingUsage);
    };
    tracing::info!(%thread_id, %run_id, "created run");

    let (outcome, last) = state
        .openai
        .wait_for_run(&thread_id, &run_id, &state.poll)
        .await?;
    if outcome != RunOutcome::Completed {
        tracing::warn!(?outcome, "run did not complete; fetching messages anyway");
    }

    let usage = require_usage(&last.usage)?;
    let messages = state.openai.list_messages(&thread_id).await?;
    Ok((messages.answer_text(), usage))
}

fn require_usage(usage: &Option<Usage>) -> Result<Usage, ProxyError> {
    usage
        .as_ref()
        .filter(|usage| usage.prompt_tokens.is_some())
        .cloned()
        .ok_or(ProxyError::MissingUsage)
}

/// The greedy `{proxy+}` parameter when the integration provides it,
/// otherwise the raw request path.
fn inbound_path(request: &ApiGatewayProxyRequest) -> String {
    match request.path_parameters.get("proxy") {
        Some(proxy) => format!("/{}", proxy.trim_start_matches('/')),
        None => request.path.clone().unwrap_or_default(),
    }
}
