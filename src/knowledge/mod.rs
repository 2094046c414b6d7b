//! Knowledge 모듈 - FAQ 벡터 인덱스
//!
//! - vector: VectorStore 트레이트 + 엔트리/결과 타입
//! - lance: LanceDB 구현 (디스크 영속)

mod lance;
mod vector;

// Re-exports
pub use lance::{LanceVectorStore, DEFAULT_COLLECTION};
pub use vector::{FaqMetadata, FaqVectorEntry, SearchHit, VectorStore};
