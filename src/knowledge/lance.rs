//! LanceDB Vector Store - FAQ 질문 임베딩 저장소
//!
//! 기본 L2 거리로 검색하며 `_distance` 컬럼(LanceDB 자동 추가)을 그대로 반환합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;

use super::vector::{FaqMetadata, FaqVectorEntry, SearchHit, VectorStore};

/// 기본 컬렉션(테이블) 이름
pub const DEFAULT_COLLECTION: &str = "faq_embeddings";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
pub struct LanceVectorStore {
    db: Connection,
    table_name: String,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `table_name` - 컬렉션 이름
    pub async fn open(path: &Path, table_name: &str) -> Result<Self> {
        // 부모 디렉토리 생성
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self {
            db,
            table_name: table_name.to_string(),
        })
    }

    /// 기존 컬렉션 열기 (없으면 에러)
    ///
    /// 서버 시작 시 사용합니다. 인덱싱되지 않은 상태로 서버를 띄우지 않습니다.
    pub async fn open_existing(path: &Path, table_name: &str) -> Result<Self> {
        let store = Self::open(path, table_name).await?;
        if !store.exists().await? {
            anyhow::bail!(
                "Collection '{}' not found in {}. Run `faqbot index` first.",
                table_name,
                path.display()
            );
        }
        Ok(store)
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// 벡터 테이블 스키마 생성
    fn create_schema(dimension: i32) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("document", DataType::Utf8, false),
            Field::new("question_clean", DataType::Utf8, false),
            Field::new("category", DataType::Utf8, false),
            Field::new("subcategory", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(entries: &[FaqVectorEntry]) -> Result<RecordBatch> {
        let first = entries
            .first()
            .ok_or_else(|| anyhow::anyhow!("Cannot create batch from empty entries"))?;

        let dimension = first.embedding.len();
        if dimension == 0 {
            anyhow::bail!("Entry {} has an empty embedding", first.id);
        }
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dimension) {
            anyhow::bail!(
                "Embedding dimension mismatch: entry {} has {}, expected {}",
                bad.id,
                bad.embedding.len(),
                dimension
            );
        }
        let dimension = i32::try_from(dimension).context("Embedding dimension too large")?;

        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        let documents: Vec<&str> = entries.iter().map(|e| e.document.as_str()).collect();
        let questions: Vec<&str> = entries
            .iter()
            .map(|e| e.metadata.question_clean.as_str())
            .collect();
        let categories = entries
            .iter()
            .map(|e| serde_json::to_string(&e.metadata.category))
            .collect::<std::result::Result<Vec<String>, _>>()
            .context("Failed to encode categories")?;
        let subcategories: Vec<&str> = entries
            .iter()
            .map(|e| e.metadata.subcategory.as_str())
            .collect();

        // 임베딩을 FixedSizeList로 변환
        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        let batch = RecordBatch::try_new(
            Arc::new(Self::create_schema(dimension)),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(documents)),
                Arc::new(StringArray::from(questions)),
                Arc::new(StringArray::from(categories)),
                Arc::new(StringArray::from(subcategories)),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")?;

        Ok(batch)
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> Result<bool> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .context("Failed to list LanceDB tables")?;
        Ok(names.iter().any(|name| name == &self.table_name))
    }

    async fn open_table(&self) -> Result<lancedb::table::Table> {
        self.db
            .open_table(&self.table_name)
            .execute()
            .await
            .with_context(|| format!("Failed to open table '{}'", self.table_name))
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn insert_batch(&self, entries: &[FaqVectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let batch = Self::entries_to_batch(entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists().await? {
            // 기존 테이블에 추가 (id 중복 시에도 추가됨)
            self.open_table()
                .await?
                .add(batches)
                .execute()
                .await
                .context("Failed to add vectors to table")?;
        } else {
            self.db
                .create_table(&self.table_name, batches)
                .execute()
                .await
                .context("Failed to create table")?;
        }

        tracing::debug!("Inserted {} vectors into '{}'", entries.len(), self.table_name);
        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        if limit == 0 || !self.table_exists().await? {
            return Ok(vec![]);
        }

        let results = self
            .open_table()
            .await?
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .distance_type(DistanceType::L2)
            .limit(limit)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = results.try_collect().await?;
        let mut hits = Vec::new();

        for batch in batches {
            let ids = string_column(&batch, "id")?;
            let documents = string_column(&batch, "document")?;
            let questions = string_column(&batch, "question_clean")?;
            let categories = string_column(&batch, "category")?;
            let subcategories = string_column(&batch, "subcategory")?;

            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                let category: Vec<String> = serde_json::from_str(categories.value(i))
                    .context("Invalid category value in vector store")?;

                hits.push(SearchHit {
                    id: ids.value(i).to_string(),
                    document: documents.value(i).to_string(),
                    metadata: FaqMetadata {
                        question_clean: questions.value(i).to_string(),
                        category,
                        subcategory: subcategories.value(i).to_string(),
                    },
                    distance: distances.value(i),
                });
            }
        }

        // 배치 경계를 넘어서도 거리 오름차순 보장
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        let count = self
            .open_table()
            .await?
            .count_rows(None)
            .await
            .context("Failed to count rows")?;
        Ok(count)
    }

    async fn exists(&self) -> Result<bool> {
        self.table_exists().await
    }

    async fn reset(&self) -> Result<()> {
        if self.table_exists().await? {
            self.db
                .drop_table(&self.table_name)
                .await
                .with_context(|| format!("Failed to drop table '{}'", self.table_name))?;
            tracing::info!("컬렉션 '{}' 삭제 완료", self.table_name);
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
