use super::client::{AssistantError, GenerativeModel};
use super::protocol::{Content, GenerateRequest, GenerateResponse, GenerationConfig, Part};
use super::session::{ChatReply, ChatSession};
use crate::config::AssistantConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const OFFLINE_MESSAGE: &str =
    "You're offline. Insights will be back as soon as you reconnect.";
pub const TIP_FALLBACK: &str =
    "Shift heavy loads like laundry and EV charging to off-peak hours to lower your bill.";
pub const ANALYSIS_FALLBACK: &str =
    "An error occurred while analyzing the data. Please try again.";
pub const CHAT_FALLBACK: &str =
    "I'm sorry, I'm having trouble connecting right now. Please try again later.";

const QUICK_TIP_PROMPT: &str =
    "Give one short, practical tip for reducing home energy use. Answer in a single sentence.";
const SPEECH_PREFIX: &str = "Say with a calm and clear voice: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Tip,
    Analysis,
    ImageEdit,
    Speech,
    Chat,
}

impl Operation {
    const COUNT: usize = 5;

    fn index(self) -> usize {
        self as usize
    }

    fn name(self) -> &'static str {
        match self {
            Operation::Tip => "quick_tip",
            Operation::Analysis => "analysis",
            Operation::ImageEdit => "image_edit",
            Operation::Speech => "speech",
            Operation::Chat => "chat",
        }
    }
}

/// Clears the loading flag when the call finishes, however it finishes
struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

enum Attempt {
    /// Another call of the same kind is still loading
    Ignored,
    Offline,
    Failed,
    Done(GenerateResponse),
}

/// Single-attempt access to the AI collaborator.
///
/// Transport failures, timeouts, error statuses and unusable bodies become
/// canned fallbacks. The only error returned is
/// [`AssistantError::MissingCredential`].
pub struct InsightFetcher {
    model: Arc<dyn GenerativeModel>,
    config: AssistantConfig,
    timeout: Duration,
    online: AtomicBool,
    loading: [AtomicBool; Operation::COUNT],
}

impl InsightFetcher {
    pub fn new(model: Arc<dyn GenerativeModel>, config: AssistantConfig) -> Self {
        let timeout = config.timeout();
        let online = AtomicBool::new(!config.offline);

        Self {
            model,
            config,
            timeout,
            online,
            loading: Default::default(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }

    fn is_loading(&self, op: Operation) -> bool {
        self.loading[op.index()].load(Ordering::Acquire)
    }

    fn begin(&self, op: Operation) -> Option<LoadingGuard<'_>> {
        let flag = &self.loading[op.index()];
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LoadingGuard(flag))
    }

    async fn attempt(
        &self,
        op: Operation,
        model: &str,
        request: GenerateRequest,
    ) -> Result<Attempt, AssistantError> {
        let Some(_guard) = self.begin(op) else {
            debug!(operation = op.name(), "request already in flight, ignoring");
            return Ok(Attempt::Ignored);
        };

        if !self.is_online() {
            debug!(operation = op.name(), "offline, skipping request");
            return Ok(Attempt::Offline);
        }

        match tokio::time::timeout(self.timeout, self.model.generate(model, request)).await {
            Ok(Ok(response)) => Ok(Attempt::Done(response)),
            Ok(Err(AssistantError::MissingCredential)) => Err(AssistantError::MissingCredential),
            Ok(Err(e)) => {
                warn!(operation = op.name(), model, error = %e, "assistant request failed");
                Ok(Attempt::Failed)
            }
            Err(_) => {
                let e = AssistantError::Timeout(self.timeout);
                warn!(operation = op.name(), model, error = %e, "assistant request failed");
                Ok(Attempt::Failed)
            }
        }
    }

    /// Shared shape of the text operations
    async fn text_call(
        &self,
        op: Operation,
        model: &str,
        request: GenerateRequest,
        fallback: &str,
    ) -> Result<Option<String>, AssistantError> {
        let text = match self.attempt(op, model, request).await? {
            Attempt::Ignored => return Ok(None),
            Attempt::Offline => OFFLINE_MESSAGE.to_string(),
            Attempt::Failed => fallback.to_string(),
            Attempt::Done(response) => response.text().unwrap_or_else(|| {
                warn!(operation = op.name(), "response carried no text");
                fallback.to_string()
            }),
        };
        Ok(Some(text))
    }

    /// Shared shape of the binary operations
    async fn bytes_call(
        &self,
        op: Operation,
        model: &str,
        request: GenerateRequest,
    ) -> Result<Option<Vec<u8>>, AssistantError> {
        let response = match self.attempt(op, model, request).await? {
            Attempt::Done(response) => response,
            _ => return Ok(None),
        };

        let Some(data) = response.inline_data() else {
            warn!(operation = op.name(), "response carried no inline data");
            return Ok(None);
        };

        match data.decode() {
            Ok(bytes) if !bytes.is_empty() => Ok(Some(bytes)),
            Ok(_) => Ok(None),
            Err(e) => {
                warn!(operation = op.name(), error = %e, "inline data is not valid base64");
                Ok(None)
            }
        }
    }

    /// A one-line saving tip. `None` if a tip request is already loading.
    pub async fn quick_tip(&self) -> Result<Option<String>, AssistantError> {
        self.text_call(
            Operation::Tip,
            &self.config.tip_model,
            GenerateRequest::prompt(QUICK_TIP_PROMPT),
            TIP_FALLBACK,
        )
        .await
    }

    /// Long-form report using the thinking model
    pub async fn analyze(&self, prompt: &str) -> Result<Option<String>, AssistantError> {
        let request = GenerateRequest::prompt(prompt)
            .with_config(GenerationConfig::thinking(self.config.thinking_budget));

        self.text_call(
            Operation::Analysis,
            &self.config.analysis_model,
            request,
            ANALYSIS_FALLBACK,
        )
        .await
    }

    /// Edited image bytes, or `None` on any failure
    pub async fn edit_image(
        &self,
        image: &[u8],
        mime_type: &str,
        instruction: &str,
    ) -> Result<Option<Vec<u8>>, AssistantError> {
        if image.is_empty() || instruction.trim().is_empty() {
            debug!("image edit needs both an image and an instruction");
            return Ok(None);
        }

        let request = GenerateRequest {
            contents: vec![Content::user(vec![
                Part::inline(mime_type, image),
                Part::text(instruction),
            ])],
            ..Default::default()
        }
        .with_config(GenerationConfig::image());

        self.bytes_call(Operation::ImageEdit, &self.config.image_model, request)
            .await
    }

    /// Synthesized speech audio, or `None` on any failure
    pub async fn synthesize_speech(&self, text: &str) -> Result<Option<Vec<u8>>, AssistantError> {
        let request = GenerateRequest::prompt(format!("{}{}", SPEECH_PREFIX, text))
            .with_config(GenerationConfig::speech(self.config.voice.clone()));

        self.bytes_call(Operation::Speech, &self.config.speech_model, request)
            .await
    }

    /// Send one chat message within `session`. Blank input is ignored.
    pub async fn chat(
        &self,
        session: &mut ChatSession,
        text: &str,
    ) -> Result<Option<ChatReply>, AssistantError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let request = session.request_for(text);
        let reply = match self.attempt(Operation::Chat, &self.config.chat_model, request).await? {
            Attempt::Ignored => return Ok(None),
            Attempt::Offline => {
                session.record_fallback(text, OFFLINE_MESSAGE);
                ChatReply {
                    text: OFFLINE_MESSAGE.to_string(),
                    grounding: None,
                }
            }
            Attempt::Failed => {
                session.record_fallback(text, CHAT_FALLBACK);
                ChatReply {
                    text: CHAT_FALLBACK.to_string(),
                    grounding: None,
                }
            }
            Attempt::Done(response) => match response.text() {
                Some(reply_text) => {
                    session.record_exchange(text, &reply_text);
                    ChatReply {
                        text: reply_text,
                        grounding: response.grounding().cloned(),
                    }
                }
                None => {
                    session.record_fallback(text, CHAT_FALLBACK);
                    ChatReply {
                        text: CHAT_FALLBACK.to_string(),
                        grounding: None,
                    }
                }
            },
        };

        Ok(Some(reply))
    }

    pub fn tip_loading(&self) -> bool {
        self.is_loading(Operation::Tip)
    }

    pub fn analysis_loading(&self) -> bool {
        self.is_loading(Operation::Analysis)
    }
}
