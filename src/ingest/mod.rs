//! 오프라인 인제스트 - 전처리 → 임베딩 → 벡터 인덱싱
//!
//! 각 단계는 CSV 파일을 사이에 두고 따로 실행할 수 있습니다.
//! - `prepare`: 원본 JSON → 정제 FAQ CSV
//! - `embed_table`: 정제 질문을 배치 임베딩하여 테이블에 기록
//! - `index_table`: 임베딩을 벡터 저장소에 삽입 (id = 행 위치)

use std::path::Path;

use anyhow::{Context, Result};

use crate::embedding::{embed_in_batches, EmbeddingProvider};
use crate::faq::{load_raw_faqs, preprocess, validate_records, FaqTable};
use crate::knowledge::{FaqVectorEntry, VectorStore};

/// 벡터 저장소 삽입 단위
const INSERT_CHUNK_SIZE: usize = 500;

/// 원본 JSON을 전처리하여 CSV로 저장
pub fn prepare(raw_path: &Path, output_path: &Path) -> Result<FaqTable> {
    let raw = load_raw_faqs(raw_path)?;
    let records = preprocess(&raw);
    validate_records(&records).context("Preprocessed records failed validation")?;

    let table = FaqTable::new(records);
    table.save_csv(output_path)?;
    Ok(table)
}

/// 테이블의 모든 정제 질문을 임베딩
///
/// 배치 하나라도 실패하면 전체가 실패합니다 (재시도 없음).
pub async fn embed_table(
    table: &mut FaqTable,
    embedder: &dyn EmbeddingProvider,
    batch_size: usize,
) -> Result<usize> {
    let questions: Vec<String> = table
        .records()
        .iter()
        .map(|r| r.question_clean.clone())
        .collect();

    tracing::info!(
        "Embedding 생성 시작: {} rows (model: {}, batch: {})",
        questions.len(),
        embedder.name(),
        batch_size
    );

    let embeddings = embed_in_batches(embedder, &questions, batch_size).await?;
    table.set_embeddings(embeddings)?;

    tracing::info!("Embedding 생성 완료: {} rows", questions.len());
    Ok(questions.len())
}

/// 임베딩된 테이블을 벡터 저장소에 삽입
///
/// # Arguments
/// * `reset` - 삽입 전에 기존 컬렉션 삭제
///
/// # Returns
/// 삽입된 엔트리 수 (= 테이블 행 수)
pub async fn index_table(table: &FaqTable, store: &dyn VectorStore, reset: bool) -> Result<usize> {
    let entries = table
        .records()
        .iter()
        .enumerate()
        .map(|(i, record)| FaqVectorEntry::from_record(i, record))
        .collect::<Result<Vec<_>>>()
        .context("FAQ table is not fully embedded. Run `faqbot embed` first.")?;

    if reset {
        store.reset().await?;
    }

    let mut inserted = 0;
    for chunk in entries.chunks(INSERT_CHUNK_SIZE) {
        inserted += store.insert_batch(chunk).await?;
    }

    tracing::info!("Embedding 데이터베이스 삽입 완료: {} entries", inserted);
    Ok(inserted)
}

// ============================================================================
// Tests
// ============================================================================
