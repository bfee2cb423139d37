pub mod chain;
pub mod config;
pub mod error;
pub mod graph;
pub mod llm;
pub mod retrieval;
pub mod storm;
pub mod utils;

pub use chain::{
    answer_with_model, create_chain, create_prompt, display_images, get_answer, invoke_chain,
    process_input, resize_base64_image, s2hk, Answer, AnswerRequest, Chain, ChatInput,
    ChatPromptTemplate, ChineseConverter, ConversationMemory, JsonOutputParser, StrOutputParser,
};
pub use config::{EnvConfig, ModelSettings, StormConfig};
pub use error::{Result, StormFlowError};
#[cfg(feature = "memory-store")]
pub use graph::MemorySaver;
pub use graph::{
    Checkpoint, Checkpointer, CompiledGraph, GraphEvent, GraphNode, RunnableConfig, StateGraph,
    StateSnapshot, END, START,
};
#[cfg(feature = "http-providers")]
pub use llm::GenericHttpClient;
pub use llm::{
    select_model, ChatMessage, ChatModel, ChatRequest, ChatResponse, DynChatModel,
    LocalEchoClient, ModelProvider, UsageSnapshot, UsageTracker,
};
pub use retrieval::{Document, Embeddings, InMemoryVectorStore, NoSearch, SearchEngine};
pub use storm::{ResearchState, Storm, StormBuilder};
pub use utils::logging;
