pub mod error;
pub mod openai;
pub mod traits;
pub mod util;

pub use error::AiError;
pub use openai::{OpenAi, OpenAiPromptBuilder};
pub use traits::{Agent, EmbedAgent, Message, MessageRole, PromptBuilder};
pub use util::{cosine_similarity, strip_code_blocks, truncate_to_char_boundary};
