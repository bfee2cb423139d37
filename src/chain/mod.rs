// Chain 模块：文本 + 图片的问答流水线

pub mod answer;
pub mod chain;
pub mod convert;
pub mod image;
pub mod input;
pub mod memory;
pub mod output;
pub mod prompt;

pub use answer::{answer_with_model, get_answer, Answer, AnswerRequest};
pub use chain::{create_chain, invoke_chain, Chain};
pub use convert::{s2hk, ChineseConverter};
pub use image::{display_images, resize_base64_image, ImageSummary};
pub use input::{process_input, ChatInput};
pub use memory::{ConversationMemory, HistoryEntry};
pub use output::{JsonOutputParser, StrOutputParser};
pub use prompt::{create_prompt, ChatPromptTemplate, PromptTemplate};
