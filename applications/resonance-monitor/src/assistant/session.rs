use super::protocol::{Content, GenerateRequest, Part};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

pub const SYSTEM_INSTRUCTION: &str = "You are a helpful assistant for Resonance Control, a premium energy management app. Answer questions concisely about the app's features and energy management.";

pub const GREETING: &str =
    "Hello! I'm the Resonance assistant. How can I help you manage your energy today?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub text: String,
    pub sender: Sender,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub text: String,
    pub grounding: Option<Value>,
}

/// One conversation, owned by whoever shows it.
///
/// `history` is what the model sees; `transcript` is what the user sees,
/// including the greeting and any fallback replies.
#[derive(Debug, Clone)]
pub struct ChatSession {
    id: Uuid,
    system_instruction: Content,
    history: Vec<Content>,
    transcript: Vec<ChatMessage>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new(SYSTEM_INSTRUCTION)
    }
}

impl ChatSession {
    pub fn new(system_instruction: &str) -> Self {
        let id = Uuid::new_v4();
        info!(session = %id, "chat session started");

        Self {
            id,
            system_instruction: Content::instruction(system_instruction),
            history: Vec::new(),
            transcript: vec![ChatMessage {
                text: GREETING.to_string(),
                sender: Sender::Bot,
            }],
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    /// Number of model-visible turns
    pub fn turns(&self) -> usize {
        self.history.len()
    }

    /// Request for `text` on top of the existing history
    pub(crate) fn request_for(&self, text: &str) -> GenerateRequest {
        let mut contents = self.history.clone();
        contents.push(Content::user(vec![Part::text(text)]));

        GenerateRequest {
            contents,
            system_instruction: Some(self.system_instruction.clone()),
            generation_config: None,
        }
    }

    pub(crate) fn record_exchange(&mut self, user: &str, reply: &str) {
        self.history.push(Content::user(vec![Part::text(user)]));
        self.history.push(Content::model(reply));
        self.push_transcript(user, reply);
    }

    /// A fallback reply is shown but kept out of the model history
    pub(crate) fn record_fallback(&mut self, user: &str, reply: &str) {
        self.push_transcript(user, reply);
    }

    fn push_transcript(&mut self, user: &str, reply: &str) {
        self.transcript.push(ChatMessage {
            text: user.to_string(),
            sender: Sender::User,
        });
        self.transcript.push(ChatMessage {
            text: reply.to_string(),
            sender: Sender::Bot,
        });
    }

    /// Explicit teardown
    pub fn end(self) {
        info!(session = %self.id, turns = self.history.len(), "chat session ended");
    }
}
