// Retrieval 模块：文档、向量化、内存向量库与网页搜索

pub mod document;
pub mod embeddings;
pub mod search;
pub mod vectorstore;

pub use document::Document;
#[cfg(feature = "http-providers")]
pub use embeddings::HttpEmbeddings;
pub use embeddings::{DynEmbeddings, Embeddings, HashingEmbeddings};
#[cfg(feature = "http-providers")]
pub use search::TavilySearch;
pub use search::{DynSearchEngine, NoSearch, SearchEngine, SearchResult};
pub use vectorstore::InMemoryVectorStore;
