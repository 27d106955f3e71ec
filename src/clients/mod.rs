pub mod openai;
pub mod scripted;
pub mod traits;

pub use openai::OpenAiChatClient;
pub use scripted::ScriptedGenerator;
pub use traits::{GenerationError, GenerationRequest, TextGenerator, backoff_delay_ms};
