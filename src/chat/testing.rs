//! 파이프라인/서버 테스트용 목 구현

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use super::{ChatPipeline, PromptTemplate, RetrievalSettings};
use crate::embedding::EmbeddingProvider;
use crate::faq::{FaqRecord, FaqTable};
use crate::knowledge::{FaqMetadata, FaqVectorEntry, SearchHit, VectorStore};
use crate::llm::{ChatMessage, ChatModel, TokenStream};

pub const MOCK_ANSWER: &str = "스마트스토어센터에서 가입하실 수 있습니다. 도움이 되셨길 바랍니다.";

pub fn hit(document: &str, distance: f32) -> SearchHit {
    SearchHit {
        id: document.len().to_string(),
        document: document.to_string(),
        metadata: FaqMetadata {
            question_clean: document.to_string(),
            category: vec!["테스트".to_string()],
            subcategory: String::new(),
        },
        distance,
    }
}

fn record(question_clean: &str, answer_clean: &str) -> FaqRecord {
    FaqRecord {
        question: question_clean.to_string(),
        answer: answer_clean.to_string(),
        category: vec!["테스트".to_string()],
        subcategory: String::new(),
        question_clean: question_clean.to_string(),
        answer_clean: answer_clean.to_string(),
        embedding: None,
    }
}

pub fn faq_table() -> FaqTable {
    FaqTable::new(vec![
        record("회원가입 방법", "네이버 커머스 ID로 가입합니다"),
        record("정산 주기", "구매확정 후 1영업일입니다"),
        record("반품 배송비", "반품 사유에 따라 부담 주체가 다릅니다"),
        record("상품 등록", "상품관리 메뉴에서 등록합니다"),
    ])
}

// ============================================================================
// Mocks
// ============================================================================

#[derive(Default)]
pub struct MockEmbedder {
    queries: Mutex<Vec<String>>,
    fail: bool,
}

impl MockEmbedder {
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.queries.lock().unwrap().extend(texts.iter().cloned());
        if self.fail {
            anyhow::bail!("embedding API unavailable");
        }
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }

    fn name(&self) -> &str {
        "mock-embedding"
    }
}

#[derive(Default)]
pub struct MockStore {
    hits: Vec<SearchHit>,
    searches: AtomicUsize,
    fail: bool,
}

impl MockStore {
    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorStore for MockStore {
    async fn insert_batch(&self, entries: &[FaqVectorEntry]) -> Result<usize> {
        Ok(entries.len())
    }

    async fn search(&self, _query_embedding: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("vector store unavailable");
        }
        Ok(self.hits.iter().take(limit).cloned().collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.hits.len())
    }

    async fn exists(&self) -> Result<bool> {
        Ok(true)
    }

    async fn reset(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MockLlm {
    calls: AtomicUsize,
    last: Mutex<Vec<ChatMessage>>,
    fail: bool,
}

impl MockLlm {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_messages(&self) -> Vec<ChatMessage> {
        self.last.lock().unwrap().clone()
    }

    fn record(&self, messages: &[ChatMessage]) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = messages.to_vec();
        if self.fail {
            anyhow::bail!("LLM API unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl ChatModel for MockLlm {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.record(messages)?;
        Ok(MOCK_ANSWER.to_string())
    }

    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream> {
        self.record(messages)?;
        let tokens: Vec<Result<String>> = MOCK_ANSWER
            .split_inclusive(' ')
            .map(|t| Ok(t.to_string()))
            .collect();
        Ok(Box::pin(futures::stream::iter(tokens)))
    }

    fn name(&self) -> &str {
        "mock-llm"
    }
}

// ============================================================================
// Fixture
// ============================================================================

/// 목 구성요소 묶음 (호출 기록 확인용)
pub struct Fixture {
    pub embedder: Arc<MockEmbedder>,
    pub store: Arc<MockStore>,
    pub llm: Arc<MockLlm>,
    pub settings: RetrievalSettings,
}

impl Fixture {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self {
            embedder: Arc::new(MockEmbedder::default()),
            store: Arc::new(MockStore {
                hits,
                ..MockStore::default()
            }),
            llm: Arc::new(MockLlm::default()),
            settings: RetrievalSettings::default(),
        }
    }

    pub fn raw_queries(mut self) -> Self {
        self.settings.normalize_query = false;
        self
    }

    pub fn failing_embedder(mut self) -> Self {
        self.embedder = Arc::new(MockEmbedder {
            fail: true,
            ..MockEmbedder::default()
        });
        self
    }

    pub fn failing_store(mut self) -> Self {
        self.store = Arc::new(MockStore {
            hits: self.store.hits.clone(),
            fail: true,
            ..MockStore::default()
        });
        self
    }

    pub fn failing_llm(mut self) -> Self {
        self.llm = Arc::new(MockLlm {
            fail: true,
            ..MockLlm::default()
        });
        self
    }

    pub fn pipeline(&self) -> ChatPipeline {
        ChatPipeline::new(
            self.embedder.clone(),
            self.store.clone(),
            Arc::new(faq_table()),
            self.llm.clone(),
            PromptTemplate::smartstore(),
            self.settings.clone(),
        )
    }
}
