//! 설정 모듈 - TOML 설정 파일 + 환경변수
//!
//! 설정 파일 위치: `--config <path>` 또는 `~/.smartstore-faq-bot/config.toml`
//! 파일이 없으면 기본값을 사용합니다.
//!
//! ```toml
//! [openai]
//! chat_model = "gpt-4o-mini"
//!
//! [retrieval]
//! top_k = 5
//! distance_threshold = 1.0
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 기본 OpenAI API 엔드포인트
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// API 키 환경변수
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// 엔드포인트 오버라이드 환경변수
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";

/// 설정 파일 이름
const CONFIG_FILE_NAME: &str = "config.toml";

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.smartstore-faq-bot/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".smartstore-faq-bot")
}

// ============================================================================
// Types
// ============================================================================

/// 설정 검증 에러
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid top_k: {0} (must be at least 1)")]
    InvalidTopK(usize),
    #[error("Invalid answer_count: {0} (must be between 1 and top_k={1})")]
    InvalidAnswerCount(usize, usize),
    #[error("Invalid distance_threshold: {0} (must be a finite, non-negative number)")]
    InvalidThreshold(f32),
    #[error("Invalid embed_batch_size: {0} (must be between 1 and 2048)")]
    InvalidBatchSize(usize),
    #[error("Invalid base_url: {0}")]
    InvalidBaseUrl(String),
    #[error("Invalid server port: {0}")]
    InvalidPort(u16),
    #[error("Empty collection name")]
    EmptyCollection,
}

/// 전체 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 데이터 디렉토리 (CSV, LanceDB)
    pub data_dir: PathBuf,
    pub openai: OpenAiConfig,
    pub retrieval: RetrievalConfig,
    pub server: ServerConfig,
}

/// OpenAI 호환 API 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub embedding_model: String,
    pub chat_model: String,
    /// 임베딩 API 한 번에 보낼 텍스트 수
    pub embed_batch_size: usize,
    pub temperature: f32,
    pub top_p: f32,
    /// 연결 타임아웃 (초). 응답 대기에는 타임아웃이 없습니다.
    pub connect_timeout_secs: u64,
}

/// 검색 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// LanceDB 테이블 이름
    pub collection: String,
    /// 최근접 이웃 검색 개수
    pub top_k: usize,
    /// 답변 컨텍스트로 사용할 상위 결과 수 (나머지는 추천 질문)
    pub answer_count: usize,
    /// 최소 거리가 이 값을 넘으면 LLM 호출 없이 사과 메시지 반환
    pub distance_threshold: f32,
    /// 쿼리에도 FAQ 질문과 같은 정제 적용
    pub normalize_query: bool,
}

/// HTTP 서버 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: get_data_dir(),
            openai: OpenAiConfig::default(),
            retrieval: RetrievalConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            embed_batch_size: 50,
            temperature: 0.4,
            top_p: 0.9,
            connect_timeout_secs: 10,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            collection: "faq_embeddings".to_string(),
            top_k: 5,
            answer_count: 3,
            distance_threshold: 1.0,
            normalize_query: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl Config {
    /// 설정 로드
    ///
    /// 우선순위:
    /// 1. `path` 지정 시 해당 파일 (없으면 에러)
    /// 2. 기본 데이터 디렉토리의 `config.toml` (없으면 기본값)
    ///
    /// 이후 `OPENAI_BASE_URL` 환경변수가 있으면 덮어씁니다.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = get_data_dir().join(CONFIG_FILE_NAME);
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    tracing::debug!("No config file, using defaults");
                    Self::default()
                }
            }
        };

        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            if !base_url.is_empty() {
                tracing::debug!("Using base URL from {}", BASE_URL_ENV);
                config.openai.base_url = base_url;
            }
        }

        config.validate().context("Configuration validation failed")?;
        Ok(config)
    }

    /// TOML 파일에서 로드
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// 설정값 검증
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let retrieval = &self.retrieval;
        if retrieval.top_k == 0 {
            return Err(ConfigError::InvalidTopK(retrieval.top_k));
        }
        if retrieval.answer_count == 0 || retrieval.answer_count > retrieval.top_k {
            return Err(ConfigError::InvalidAnswerCount(
                retrieval.answer_count,
                retrieval.top_k,
            ));
        }
        if !retrieval.distance_threshold.is_finite() || retrieval.distance_threshold < 0.0 {
            return Err(ConfigError::InvalidThreshold(retrieval.distance_threshold));
        }
        if retrieval.collection.trim().is_empty() {
            return Err(ConfigError::EmptyCollection);
        }

        if !(1..=2048).contains(&self.openai.embed_batch_size) {
            return Err(ConfigError::InvalidBatchSize(self.openai.embed_batch_size));
        }
        url::Url::parse(&self.openai.base_url)
            .map_err(|e| ConfigError::InvalidBaseUrl(format!("{} ({})", self.openai.base_url, e)))?;

        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort(self.server.port));
        }

        Ok(())
    }

    /// 임베딩이 포함된 FAQ CSV 경로
    pub fn faq_table_path(&self) -> PathBuf {
        self.data_dir.join("faq_embeddings.csv")
    }

    /// LanceDB 디렉토리 경로
    pub fn vector_store_path(&self) -> PathBuf {
        self.data_dir.join("faq.lance")
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (`OPENAI_API_KEY` 환경변수)
pub fn get_api_key() -> Result<String> {
    match std::env::var(API_KEY_ENV) {
        Ok(key) if !key.is_empty() => Ok(key),
        _ => anyhow::bail!(
            "API key not found. Set {} environment variable (or add it to .env).",
            API_KEY_ENV
        ),
    }
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    std::env::var(API_KEY_ENV)
        .map(|key| !key.is_empty())
        .unwrap_or(false)
}

// ============================================================================
// Tests
// ============================================================================
