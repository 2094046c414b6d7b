//! 임베딩 모듈 - OpenAI Embeddings API를 통한 텍스트 벡터화
//!
//! FAQ 질문(오프라인)과 사용자 쿼리(요청 시)를 같은 모델로 벡터화합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = OpenAiEmbedding::from_config(&config.openai)?;
//! let embedding = embedder.embed("스마트스토어 회원가입 절차").await?;
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{get_api_key, OpenAiConfig};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding API returned no vector"))
    }

    /// 배치 임베딩 (입력 순서 유지)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// OpenAI Embedding
// ============================================================================

/// OpenAI 임베딩 구현체
///
/// 재시도 없이 한 번만 호출합니다. 실패는 호출자에게 그대로 전달됩니다.
#[derive(Debug)]
pub struct OpenAiEmbedding {
    api_key: String,
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OpenAiEmbedding {
    /// 새 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `api_key` - OpenAI API 키
    /// * `config` - 엔드포인트/모델 설정
    pub fn new(api_key: String, config: &OpenAiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            model: config.embedding_model.clone(),
        })
    }

    /// 환경변수(`OPENAI_API_KEY`)에서 키를 읽어 생성
    pub fn from_config(config: &OpenAiConfig) -> Result<Self> {
        let api_key = get_api_key()?;
        Self::new(api_key, config)
    }
}

/// Embeddings API 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// Embeddings API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI API 에러 응답
#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiError {
    pub error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiErrorDetail {
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// 실패 응답 본문을 에러 메시지로 변환
pub(crate) fn api_error(status: reqwest::StatusCode, body: &str) -> anyhow::Error {
    match serde_json::from_str::<OpenAiError>(body) {
        Ok(error) => anyhow::anyhow!(
            "OpenAI API error ({}, {}): {}",
            status,
            error.error.kind.as_deref().unwrap_or("unknown"),
            error.error.message
        ),
        Err(_) => anyhow::anyhow!("OpenAI API error ({}): {}", status, body),
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        if let Some(i) = texts.iter().position(|t| t.trim().is_empty()) {
            anyhow::bail!("Cannot embed empty text (input #{})", i);
        }

        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send embedding request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        let mut parsed: EmbedResponse =
            serde_json::from_str(&body).context("Failed to parse embedding response")?;

        if parsed.data.len() != texts.len() {
            anyhow::bail!(
                "Embedding count mismatch: sent {}, received {}",
                texts.len(),
                parsed.data.len()
            );
        }

        // 응답 순서가 입력 순서와 다를 수 있음
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Batching
// ============================================================================

/// 배치 단위로 나누어 임베딩 (입력 순서대로 누적)
///
/// # Arguments
/// * `embedder` - 임베딩 프로바이더
/// * `texts` - 임베딩할 텍스트 목록
/// * `batch_size` - API 한 번에 보낼 텍스트 수
pub async fn embed_in_batches(
    embedder: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let batch_size = batch_size.max(1);
    let total_batches = texts.len().div_ceil(batch_size);
    let mut embeddings = Vec::with_capacity(texts.len());

    for (i, batch) in texts.chunks(batch_size).enumerate() {
        tracing::info!(
            "Batch {}/{}: Processing {} items",
            i + 1,
            total_batches,
            batch.len()
        );
        let vectors = embedder
            .embed_batch(batch)
            .await
            .with_context(|| format!("Embedding batch {} failed", i + 1))?;

        if vectors.len() != batch.len() {
            anyhow::bail!(
                "Batch {} returned {} vectors for {} texts",
                i + 1,
                vectors.len(),
                batch.len()
            );
        }
        embeddings.extend(vectors);
    }

    Ok(embeddings)
}

// ============================================================================
// Tests
// ============================================================================
