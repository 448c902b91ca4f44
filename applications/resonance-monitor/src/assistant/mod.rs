pub mod client;
pub mod fetcher;
pub mod protocol;
pub mod session;

pub use client::{AssistantError, GeminiClient, GenerativeModel};
pub use fetcher::{InsightFetcher, ANALYSIS_FALLBACK, CHAT_FALLBACK, OFFLINE_MESSAGE, TIP_FALLBACK};
pub use session::{ChatMessage, ChatReply, ChatSession, Sender};
