//! Vector Store - FAQ 벡터 검색 트레이트 및 타입
//!
//! 검색 결과는 거리 오름차순(가장 유사한 것이 먼저)입니다.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::faq::FaqRecord;

// ============================================================================
// Types
// ============================================================================

/// 벡터 엔트리 메타데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqMetadata {
    pub question_clean: String,
    pub category: Vec<String>,
    pub subcategory: String,
}

/// 벡터 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct FaqVectorEntry {
    /// FAQ 행 위치 (문자열)
    pub id: String,
    /// 정제 질문
    pub document: String,
    pub metadata: FaqMetadata,
    /// 질문 임베딩
    pub embedding: Vec<f32>,
}

impl FaqVectorEntry {
    /// FAQ 레코드로 엔트리 생성 (임베딩 없으면 에러)
    pub fn from_record(position: usize, record: &FaqRecord) -> Result<Self> {
        let embedding = record
            .embedding
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Row {} has no embedding", position))?;

        Ok(Self {
            id: position.to_string(),
            document: record.question_clean.clone(),
            metadata: FaqMetadata {
                question_clean: record.question_clean.clone(),
                category: record.category.clone(),
                subcategory: record.subcategory.clone(),
            },
            embedding,
        })
    }
}

/// 검색 결과
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    /// 정제 질문
    pub document: String,
    pub metadata: FaqMetadata,
    /// 쿼리와의 거리 (작을수록 유사)
    pub distance: f32,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 벡터 배치 삽입 (같은 id의 처리는 저장소 정책을 따름)
    async fn insert_batch(&self, entries: &[FaqVectorEntry]) -> Result<usize>;

    /// 최근접 이웃 검색 (거리 오름차순)
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchHit>>;

    /// 벡터 개수 조회
    async fn count(&self) -> Result<usize>;

    /// 컬렉션 존재 여부
    async fn exists(&self) -> Result<bool>;

    /// 컬렉션 삭제 (없으면 무시)
    async fn reset(&self) -> Result<()>;
}
