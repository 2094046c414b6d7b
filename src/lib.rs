//! smartstore-faq-bot - 스마트스토어 FAQ RAG 챗봇
//!
//! FAQ 질문 임베딩을 LanceDB에 인덱싱하고, 사용자 질문과 가까운 FAQ를
//! 검색해 OpenAI 호환 LLM으로 답변을 생성합니다.

pub mod chat;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod faq;
pub mod ingest;
pub mod knowledge;
pub mod llm;
pub mod server;

// Re-exports
pub use chat::{
    ChatError, ChatEvent, ChatEventStream, ChatPipeline, ChatReply, EventStatus, PromptTemplate,
    Retrieval, RetrievalSettings, RetrievedContext,
};
pub use config::{get_api_key, get_data_dir, has_api_key, Config, ConfigError};
pub use embedding::{EmbeddingProvider, OpenAiEmbedding};
pub use faq::{FaqRecord, FaqTable};
pub use knowledge::{FaqVectorEntry, LanceVectorStore, SearchHit, VectorStore};
pub use llm::{ChatMessage, ChatModel, OpenAiChat, Role};
