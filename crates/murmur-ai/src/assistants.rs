use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::types::{
    AssistantBackend, AssistantError, AssistantRun, AssistantThread, MessageRole, PostedMessage,
    RunStatus, ThreadMessage, DEFAULT_RUN_POLL_INTERVAL_MS,
};

/// Public struct `AssistantsConfig` describing how the client reaches the
/// hosted assistants API.
#[derive(Debug, Clone)]
pub struct AssistantsConfig {
    pub api_base: String,
    pub api_key: String,
    pub assistant_id: String,
    pub request_timeout_ms: u64,
    pub max_retries: usize,
    pub retry_budget_ms: u64,
    pub retry_jitter: bool,
    pub run_poll_interval_ms: u64,
    pub run_poll_budget_ms: u64,
}

impl Default for AssistantsConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            assistant_id: String::new(),
            request_timeout_ms: 30_000,
            max_retries: 3,
            retry_budget_ms: 20_000,
            retry_jitter: true,
            run_poll_interval_ms: DEFAULT_RUN_POLL_INTERVAL_MS,
            run_poll_budget_ms: 120_000,
        }
    }
}

/// Identity of the configured assistant, fetched once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantProfile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ThreadObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunObject {
    id: String,
    status: RunStatus,
}

#[derive(Debug, Deserialize)]
struct MessageTextValue {
    value: String,
}

#[derive(Debug, Deserialize)]
struct MessageContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<MessageTextValue>,
}

#[derive(Debug, Deserialize)]
struct MessageObject {
    id: String,
    role: MessageRole,
    #[serde(default)]
    content: Vec<MessageContentPart>,
}

#[derive(Debug, Deserialize)]
struct MessageListResponse {
    #[serde(default)]
    data: Vec<MessageObject>,
}

const RETRY_BASE_DELAY_MS: u64 = 200;
const RETRY_BACKOFF_CAP_EXPONENT: u32 = 6;

static RNG_STATE: AtomicU64 = AtomicU64::new(0);
static REQUEST_SERIAL: AtomicU64 = AtomicU64::new(0);

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 409 | 425 | 429) || status >= 500
}

fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

/// Xorshift over shared state, seeded from the clock on first use. Good
/// enough to decorrelate retry storms without a rand dependency.
fn pseudo_random() -> u64 {
    let mut state = RNG_STATE.load(Ordering::Relaxed);
    if state == 0 {
        state = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as u64
            | 1;
    }
    state ^= state << 13;
    state ^= state >> 7;
    state ^= state << 17;
    RNG_STATE.store(state, Ordering::Relaxed);
    state
}

/// Exponential backoff window for an attempt; with jitter the delay lands in
/// the upper half of the window.
fn backoff_delay_ms(attempt: usize, jitter: bool) -> u64 {
    let exponent = u32::try_from(attempt)
        .unwrap_or(RETRY_BACKOFF_CAP_EXPONENT)
        .min(RETRY_BACKOFF_CAP_EXPONENT);
    let window = RETRY_BASE_DELAY_MS.saturating_mul(1_u64 << exponent);
    if !jitter {
        return window;
    }
    let floor = window / 2;
    floor.saturating_add(pseudo_random() % window.saturating_sub(floor).saturating_add(1))
}

/// Reads a `Retry-After` header given either as seconds or an HTTP date.
fn retry_after_hint_ms(headers: &HeaderMap) -> Option<u64> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(seconds.saturating_mul(1_000));
    }
    let resume_at = chrono::DateTime::parse_from_rfc2822(raw).ok()?;
    let wait_ms = resume_at
        .signed_duration_since(chrono::Utc::now())
        .num_milliseconds();
    Some(u64::try_from(wait_ms).unwrap_or(0))
}

fn next_retry_delay_ms(attempt: usize, jitter: bool, hint_ms: Option<u64>) -> u64 {
    let computed = backoff_delay_ms(attempt, jitter);
    hint_ms.map_or(computed, |hint| computed.max(hint))
}

fn within_retry_budget(elapsed_ms: u64, delay_ms: u64, budget_ms: u64) -> bool {
    budget_ms == 0 || elapsed_ms.saturating_add(delay_ms) <= budget_ms
}

fn next_request_id() -> String {
    let serial = REQUEST_SERIAL.fetch_add(1, Ordering::Relaxed);
    format!("murmur-{:x}-{serial}", std::process::id())
}

/// Client for the vendor-hosted assistants API. One conversation thread is
/// shared by all callers and created lazily on first use.
pub struct AssistantsClient {
    client: Client,
    config: AssistantsConfig,
    thread: Mutex<Option<String>>,
}

impl AssistantsClient {
    pub fn new(config: AssistantsConfig) -> Result<Self, AssistantError> {
        if config.api_key.trim().is_empty() {
            return Err(AssistantError::MissingApiKey);
        }

        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", config.api_key);
        let mut auth_header = HeaderValue::from_str(auth_value.as_str())
            .map_err(|_| AssistantError::InvalidResponse("API key is not header-safe".into()))?;
        auth_header.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_header);
        headers.insert("OpenAI-Beta", HeaderValue::from_static("assistants=v2"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;

        Ok(Self {
            client,
            config,
            thread: Mutex::new(None),
        })
    }

    pub fn assistant_id(&self) -> &str {
        self.config.assistant_id.as_str()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    async fn request_json(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, AssistantError> {
        let url = self.endpoint(path);
        let request_id = next_request_id();
        let started = Instant::now();
        let mut attempt = 0usize;

        loop {
            let mut request = self
                .client
                .request(method.clone(), url.as_str())
                .header("x-murmur-request-id", request_id.as_str())
                .header("x-murmur-retry-attempt", attempt.to_string());
            if let Some(body) = body.as_ref() {
                request = request.json(body);
            }

            let outcome = request.send().await;
            match outcome {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if response.status().is_success() {
                        return Ok(response.json::<Value>().await?);
                    }
                    let retry_after_ms = retry_after_hint_ms(response.headers());
                    let body_text = response.text().await.unwrap_or_default();
                    if attempt >= self.config.max_retries || !is_retryable_status(status) {
                        return Err(AssistantError::HttpStatus {
                            status,
                            body: body_text,
                        });
                    }
                    let delay_ms =
                        next_retry_delay_ms(attempt, self.config.retry_jitter, retry_after_ms);
                    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                    if !within_retry_budget(elapsed_ms, delay_ms, self.config.retry_budget_ms) {
                        return Err(AssistantError::HttpStatus {
                            status,
                            body: body_text,
                        });
                    }
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(error) => {
                    if attempt >= self.config.max_retries || !is_retryable_transport_error(&error) {
                        return Err(AssistantError::Http(error));
                    }
                    let delay_ms = next_retry_delay_ms(attempt, self.config.retry_jitter, None);
                    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                    if !within_retry_budget(elapsed_ms, delay_ms, self.config.retry_budget_ms) {
                        return Err(AssistantError::Http(error));
                    }
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }
            attempt += 1;
        }
    }

    /// Fetches the configured assistant so startup fails fast on a bad id.
    pub async fn retrieve_assistant(&self) -> Result<AssistantProfile, AssistantError> {
        let path = format!("/assistants/{}", self.config.assistant_id);
        let value = self.request_json(Method::GET, path.as_str(), None).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn create_thread(&self) -> Result<AssistantThread, AssistantError> {
        let value = self
            .request_json(Method::POST, "/threads", Some(json!({})))
            .await?;
        let thread: ThreadObject = serde_json::from_value(value)?;
        Ok(AssistantThread { id: thread.id })
    }

    pub async fn post_user_message(
        &self,
        thread_id: &str,
        text: &str,
    ) -> Result<PostedMessage, AssistantError> {
        let path = format!("/threads/{thread_id}/messages");
        let body = json!({ "role": "user", "content": text });
        let value = self
            .request_json(Method::POST, path.as_str(), Some(body))
            .await?;
        let message: MessageObject = serde_json::from_value(value)?;
        Ok(PostedMessage { id: message.id })
    }

    pub async fn create_run(&self, thread_id: &str) -> Result<AssistantRun, AssistantError> {
        let path = format!("/threads/{thread_id}/runs");
        let body = json!({ "assistant_id": self.config.assistant_id });
        let value = self
            .request_json(Method::POST, path.as_str(), Some(body))
            .await?;
        let run: RunObject = serde_json::from_value(value)?;
        Ok(AssistantRun {
            id: run.id,
            status: run.status,
        })
    }

    pub async fn retrieve_run(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<AssistantRun, AssistantError> {
        let path = format!("/threads/{thread_id}/runs/{run_id}");
        let value = self.request_json(Method::GET, path.as_str(), None).await?;
        let run: RunObject = serde_json::from_value(value)?;
        Ok(AssistantRun {
            id: run.id,
            status: run.status,
        })
    }

    /// Polls a run until the vendor reports a terminal status or the
    /// configured poll budget is exhausted.
    pub async fn wait_for_run(
        &self,
        thread_id: &str,
        run: AssistantRun,
    ) -> Result<AssistantRun, AssistantError> {
        let interval_ms = self.config.run_poll_interval_ms.max(1);
        let budget_ms = self.config.run_poll_budget_ms;
        let started = Instant::now();
        let mut current = run;

        while current.status.is_pending() {
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            if budget_ms > 0 && elapsed_ms.saturating_add(interval_ms) > budget_ms {
                return Err(AssistantError::RunPollBudgetExhausted {
                    run_id: current.id,
                    budget_ms,
                });
            }
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
            current = self.retrieve_run(thread_id, current.id.as_str()).await?;
        }

        Ok(current)
    }

    /// Lists thread messages posted after `message_id`, oldest first.
    pub async fn list_messages_after(
        &self,
        thread_id: &str,
        message_id: &str,
    ) -> Result<Vec<ThreadMessage>, AssistantError> {
        let path = format!("/threads/{thread_id}/messages?order=asc&after={message_id}");
        let value = self.request_json(Method::GET, path.as_str(), None).await?;
        let listing: MessageListResponse = serde_json::from_value(value)?;
        Ok(listing
            .data
            .into_iter()
            .map(|message| {
                let text = message
                    .content
                    .iter()
                    .filter(|part| part.kind == "text")
                    .filter_map(|part| part.text.as_ref())
                    .map(|text| text.value.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                ThreadMessage {
                    id: message.id,
                    role: message.role,
                    text,
                }
            })
            .collect())
    }

    async fn ensure_thread(&self) -> Result<String, AssistantError> {
        let mut guard = self.thread.lock().await;
        if let Some(thread_id) = guard.as_ref() {
            return Ok(thread_id.clone());
        }
        let thread = self.create_thread().await?;
        *guard = Some(thread.id.clone());
        Ok(thread.id)
    }
}

fn first_assistant_text(messages: &[ThreadMessage]) -> Option<&str> {
    messages
        .iter()
        .find(|message| message.role == MessageRole::Assistant && !message.text.trim().is_empty())
        .map(|message| message.text.as_str())
}

#[async_trait::async_trait]
impl AssistantBackend for AssistantsClient {
    async fn generate_reply(&self, prompt: &str) -> Result<String, AssistantError> {
        let thread_id = self.ensure_thread().await?;
        let posted = self.post_user_message(thread_id.as_str(), prompt).await?;
        let run = self.create_run(thread_id.as_str()).await?;
        let finished = self.wait_for_run(thread_id.as_str(), run).await?;
        if finished.status != RunStatus::Completed {
            return Err(AssistantError::RunEnded {
                run_id: finished.id,
                status: finished.status.as_str().to_string(),
            });
        }

        let messages = self
            .list_messages_after(thread_id.as_str(), posted.id.as_str())
            .await?;
        match first_assistant_text(&messages) {
            Some(text) => Ok(text.to_string()),
            None => Err(AssistantError::InvalidResponse(
                "run completed without an assistant reply".to_string(),
            )),
        }
    }
}
