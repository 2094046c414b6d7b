//! Chat 모듈 - FAQ 검색 기반 답변 생성 파이프라인
//!
//! 1. 쿼리 임베딩
//! 2. top-K 최근접 FAQ 검색
//! 3. 최소 거리가 임계값을 넘으면 LLM 호출 없이 사과 메시지
//! 4. 상위 `answer_count`개는 답변 컨텍스트, 나머지는 추천 질문
//! 5. 정제 질문으로 FAQ 테이블에서 정제 답변 조회
//! 6. 프롬프트 조립 후 LLM 호출 (단일 응답 또는 스트림)
//!
//! 모든 상태는 시작 시 한 번 만들어지고 이후 읽기 전용입니다.

mod events;
mod prompt;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::config::{Config, RetrievalConfig};
use crate::embedding::{EmbeddingProvider, OpenAiEmbedding};
use crate::faq::{clean_question, FaqTable};
use crate::knowledge::{LanceVectorStore, SearchHit, VectorStore};
use crate::llm::{ChatModel, OpenAiChat};

pub use events::{
    message_events, token_events, ChatEvent, ChatEventStream, EventStatus, GENERIC_FAILURE,
    STREAM_FINISHED,
};
pub use prompt::PromptTemplate;

/// 관련 FAQ가 없을 때의 응답
pub const NO_MATCH_MESSAGE: &str = "질문과 관련된 FAQ가 없습니다. 다시 시도해 주세요.";

/// 빈 질문 에러 메시지
pub const EMPTY_QUERY_MESSAGE: &str = "질문이 비어 있습니다.";

// ============================================================================
// Errors
// ============================================================================

/// 요청 처리 에러
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("{}", EMPTY_QUERY_MESSAGE)]
    EmptyQuery,
    #[error("Query embedding failed: {0:#}")]
    Embedding(anyhow::Error),
    #[error("FAQ search failed: {0:#}")]
    Search(anyhow::Error),
    #[error("LLM generation failed: {0:#}")]
    Generation(anyhow::Error),
}

impl ChatError {
    /// 호출자 잘못인지 (HTTP 400)
    pub fn is_client_error(&self) -> bool {
        matches!(self, ChatError::EmptyQuery)
    }
}

// ============================================================================
// Types
// ============================================================================

/// 검색 설정
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub answer_count: usize,
    pub distance_threshold: f32,
    pub normalize_query: bool,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for RetrievalSettings {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            top_k: config.top_k,
            answer_count: config.answer_count,
            distance_threshold: config.distance_threshold,
            normalize_query: config.normalize_query,
        }
    }
}

/// LLM에 넘길 검색 컨텍스트
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedContext {
    /// 상위 결과의 정제 답변 (순위 순)
    pub answers: Vec<String>,
    /// 나머지 결과의 정제 질문 (순위 순)
    pub recommended: Vec<String>,
    /// 원본 검색 결과
    pub hits: Vec<SearchHit>,
}

/// 검색 결과 판정
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    /// 관련 FAQ 없음 (LLM 호출 생략)
    NoMatch { min_distance: Option<f32> },
    /// 관련 FAQ 있음
    Context(RetrievedContext),
}

/// 단일 응답
#[derive(Debug, Clone, PartialEq)]
pub enum ChatReply {
    NoMatch,
    Answer(String),
}

impl ChatReply {
    pub fn text(&self) -> &str {
        match self {
            ChatReply::NoMatch => NO_MATCH_MESSAGE,
            ChatReply::Answer(text) => text,
        }
    }
}

/// 검색 결과를 (답변용, 추천용)으로 분할 (순서 유지)
pub fn split_hits(hits: &[SearchHit], answer_count: usize) -> (&[SearchHit], &[SearchHit]) {
    hits.split_at(answer_count.min(hits.len()))
}

// ============================================================================
// ChatPipeline
// ============================================================================

/// 애플리케이션 컨텍스트 겸 RAG 파이프라인
pub struct ChatPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    table: Arc<FaqTable>,
    llm: Arc<dyn ChatModel>,
    prompt: PromptTemplate,
    settings: RetrievalSettings,
}

impl ChatPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        table: Arc<FaqTable>,
        llm: Arc<dyn ChatModel>,
        prompt: PromptTemplate,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            embedder,
            store,
            table,
            llm,
            prompt,
            settings,
        }
    }

    /// 설정으로 파이프라인 구성
    ///
    /// API 키 누락, 컬렉션 누락, FAQ 테이블 누락은 모두 여기서 실패합니다.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let embedder = OpenAiEmbedding::from_config(&config.openai)
            .context("Failed to create embedder")?;
        let llm = OpenAiChat::from_config(&config.openai).context("Failed to create LLM client")?;
        tracing::info!("OpenAI 클라이언트 초기화 완료 (chat: {})", llm.name());

        let store = LanceVectorStore::open_existing(
            &config.vector_store_path(),
            &config.retrieval.collection,
        )
        .await
        .context("Failed to open vector store")?;
        tracing::info!("컬렉션 '{}' 로드 완료", store.table_name());

        let table = FaqTable::load_csv(&config.faq_table_path())
            .context("Failed to load FAQ table")?;

        Ok(Self::new(
            Arc::new(embedder),
            Arc::new(store),
            Arc::new(table),
            Arc::new(llm),
            PromptTemplate::smartstore(),
            RetrievalSettings::from(&config.retrieval),
        ))
    }

    pub fn faq_count(&self) -> usize {
        self.table.len()
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    /// 임베딩할 쿼리 텍스트 결정
    fn prepare_query(&self, query: &str) -> std::result::Result<String, ChatError> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(ChatError::EmptyQuery);
        }

        if self.settings.normalize_query {
            let cleaned = clean_question(trimmed);
            if !cleaned.is_empty() {
                return Ok(cleaned);
            }
        }
        Ok(trimmed.to_string())
    }

    /// 검색 및 컨텍스트 구성 (LLM 호출 없음)
    pub async fn retrieve(&self, query: &str) -> std::result::Result<Retrieval, ChatError> {
        let text = self.prepare_query(query)?;

        let embedding = self.embedder.embed(&text).await.map_err(|e| {
            tracing::error!("쿼리 임베딩 실패: {:#}", e);
            ChatError::Embedding(e)
        })?;

        let hits = self
            .store
            .search(&embedding, self.settings.top_k)
            .await
            .map_err(|e| {
                tracing::error!("FAQ 검색 실패: {:#}", e);
                ChatError::Search(e)
            })?;
        tracing::info!("유사한 FAQ 검색 완료 ({} 건)", hits.len());

        let min_distance = hits.iter().map(|h| h.distance).reduce(f32::min);
        match min_distance {
            Some(d) if d <= self.settings.distance_threshold => {}
            _ => {
                tracing::info!(
                    "FAQ 유사도 낮음 (min_distance={:?}), LLM 호출 생략",
                    min_distance
                );
                return Ok(Retrieval::NoMatch { min_distance });
            }
        }

        let (answer_hits, recommended_hits) = split_hits(&hits, self.settings.answer_count);
        let answers: Vec<String> = answer_hits
            .iter()
            .map(|h| self.table.answer_for(&h.document).to_string())
            .collect();
        let recommended: Vec<String> = recommended_hits
            .iter()
            .map(|h| h.document.clone())
            .collect();
        tracing::info!("FAQ 답변 추출 완료");

        Ok(Retrieval::Context(RetrievedContext {
            answers,
            recommended,
            hits,
        }))
    }

    /// 단일 응답 생성
    pub async fn answer(&self, query: &str) -> std::result::Result<ChatReply, ChatError> {
        let context = match self.retrieve(query).await? {
            Retrieval::NoMatch { .. } => return Ok(ChatReply::NoMatch),
            Retrieval::Context(context) => context,
        };

        let messages = self
            .prompt
            .render(query.trim(), &context.answers, &context.recommended);
        let text = self.llm.complete(&messages).await.map_err(|e| {
            tracing::error!("챗봇 응답 생성 실패: {:#}", e);
            ChatError::Generation(e)
        })?;

        Ok(ChatReply::Answer(text))
    }

    /// 스트리밍 응답 생성
    ///
    /// LLM 요청이 수락된 뒤에 이벤트 스트림을 반환하므로,
    /// 스트림 시작 전 실패는 에러로, 시작 후 실패는 `error` 이벤트로 전달됩니다.
    pub async fn answer_stream(
        &self,
        query: &str,
    ) -> std::result::Result<ChatEventStream, ChatError> {
        let context = match self.retrieve(query).await? {
            Retrieval::NoMatch { .. } => return Ok(message_events(NO_MATCH_MESSAGE)),
            Retrieval::Context(context) => context,
        };

        let messages = self
            .prompt
            .render(query.trim(), &context.answers, &context.recommended);
        let tokens = self.llm.complete_stream(&messages).await.map_err(|e| {
            tracing::error!("챗봇 스트림 시작 실패: {:#}", e);
            ChatError::Generation(e)
        })?;

        Ok(token_events(tokens))
    }
}

// ============================================================================
// Tests
// ============================================================================
