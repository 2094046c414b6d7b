//! FAQ 테이블 - 정제 질문 → 정제 답변 조회
//!
//! CSV 컬럼: question, answer, category, subcategory, question_clean, answer_clean, embedding
//! - category: JSON 문자열 배열 (`["가입절차","회원정보"]`), 작은따옴표 목록도 허용
//! - embedding: JSON 실수 배열 또는 빈 문자열
//!
//! 첫 헤더 앞의 UTF-8 BOM은 무시합니다.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::FaqRecord;

/// 검색된 질문이 테이블에 없을 때의 답변
pub const ANSWER_NOT_FOUND: &str = "해당 질문에 대한 답변을 찾을 수 없습니다.";

/// CSV 한 행
#[derive(Debug, Serialize, Deserialize)]
struct FaqRow {
    question: String,
    answer: String,
    category: String,
    subcategory: String,
    question_clean: String,
    answer_clean: String,
    #[serde(default)]
    embedding: String,
}

impl FaqRow {
    fn from_record(record: &FaqRecord) -> Result<Self> {
        let embedding = match &record.embedding {
            Some(values) => serde_json::to_string(values)?,
            None => String::new(),
        };

        Ok(Self {
            question: record.question.clone(),
            answer: record.answer.clone(),
            category: serde_json::to_string(&record.category)?,
            subcategory: record.subcategory.clone(),
            question_clean: record.question_clean.clone(),
            answer_clean: record.answer_clean.clone(),
            embedding,
        })
    }

    fn into_record(self) -> Result<FaqRecord> {
        let category = parse_category(&self.category)?;

        let embedding = if self.embedding.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str(&self.embedding).context("Invalid embedding column")?)
        };

        Ok(FaqRecord {
            question: self.question,
            answer: self.answer,
            category,
            subcategory: self.subcategory,
            question_clean: self.question_clean,
            answer_clean: self.answer_clean,
            embedding,
        })
    }
}

/// `["a","b"]` 또는 `['a', 'b']`
fn parse_category(value: &str) -> Result<Vec<String>> {
    serde_json::from_str(value)
        .or_else(|_| serde_json::from_str(&value.replace('\'', "\"")))
        .with_context(|| format!("Invalid category column: {}", value))
}

/// 첫 헤더의 BOM 제거
fn strip_bom(headers: &csv::StringRecord) -> Option<csv::StringRecord> {
    let first = headers.get(0)?;
    if !first.starts_with('\u{feff}') {
        return None;
    }
    Some(
        headers
            .iter()
            .enumerate()
            .map(|(i, h)| if i == 0 { h.trim_start_matches('\u{feff}') } else { h })
            .collect(),
    )
}

// ============================================================================
// FaqTable
// ============================================================================

/// 메모리 FAQ 테이블
///
/// 서버 시작 시 한 번 로드되고 이후 읽기 전용입니다.
#[derive(Debug, Clone, Default)]
pub struct FaqTable {
    records: Vec<FaqRecord>,
    /// question_clean → 첫 번째 행 인덱스
    index: HashMap<String, usize>,
}

impl FaqTable {
    /// 레코드로 테이블 생성
    pub fn new(records: Vec<FaqRecord>) -> Self {
        let mut index = HashMap::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            index.entry(record.question_clean.clone()).or_insert(i);
        }
        Self { records, index }
    }

    /// CSV 파일에서 로드
    pub fn load_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open FAQ table: {}", path.display()))?;

        let headers = reader.headers().context("Failed to read FAQ table header")?;
        if let Some(headers) = strip_bom(headers) {
            reader.set_headers(headers);
        }

        let mut records = Vec::new();
        for (i, row) in reader.deserialize::<FaqRow>().enumerate() {
            let row = row.with_context(|| format!("Failed to read FAQ row {}", i))?;
            records.push(
                row.into_record()
                    .with_context(|| format!("Failed to parse FAQ row {}", i))?,
            );
        }

        tracing::info!("FAQ 테이블 로드 완료: {} rows ({})", records.len(), path.display());
        Ok(Self::new(records))
    }

    /// CSV 파일로 저장
    pub fn save_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create FAQ table directory")?;
            }
        }

        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create FAQ table: {}", path.display()))?;

        for record in &self.records {
            writer.serialize(FaqRow::from_record(record)?)?;
        }
        writer.flush().context("Failed to flush FAQ table")?;

        tracing::info!("FAQ 테이블 저장 완료: {} rows ({})", self.records.len(), path.display());
        Ok(())
    }

    /// 정제 질문으로 정제 답변 조회 (없으면 [`ANSWER_NOT_FOUND`])
    pub fn answer_for(&self, question_clean: &str) -> &str {
        self.index
            .get(question_clean)
            .map(|&i| self.records[i].answer_clean.as_str())
            .unwrap_or(ANSWER_NOT_FOUND)
    }

    pub fn records(&self) -> &[FaqRecord] {
        &self.records
    }

    /// 행 순서대로 임베딩 기록 (개수가 다르면 에러)
    pub fn set_embeddings(&mut self, embeddings: Vec<Vec<f32>>) -> Result<()> {
        if embeddings.len() != self.records.len() {
            anyhow::bail!(
                "Embedding count mismatch: {} rows, {} embeddings",
                self.records.len(),
                embeddings.len()
            );
        }
        for (record, embedding) in self.records.iter_mut().zip(embeddings) {
            record.embedding = Some(embedding);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(question_clean: &str, answer_clean: &str) -> FaqRecord {
        FaqRecord {
            question: format!("[테스트] {}?", question_clean),
            answer: format!("{}.", answer_clean),
            category: vec!["테스트".to_string()],
            subcategory: String::new(),
            question_clean: question_clean.to_string(),
            answer_clean: answer_clean.to_string(),
            embedding: None,
        }
    }

    #[test]
    fn test_answer_lookup() {
        let table = FaqTable::new(vec![
            record("회원가입 방법", "네이버 커머스 ID로 가입합니다"),
            record("정산 주기", "구매확정 후 1영업일입니다"),
        ]);

        assert_eq!(table.answer_for("정산 주기"), "구매확정 후 1영업일입니다");
        assert_eq!(table.answer_for("없는 질문"), ANSWER_NOT_FOUND);
        assert_eq!(table.answer_for(""), ANSWER_NOT_FOUND);
    }

    #[test]
    fn test_duplicate_question_uses_first_row() {
        let table = FaqTable::new(vec![record("중복", "첫 번째"), record("중복", "두 번째")]);
        assert_eq!(table.answer_for("중복"), "첫 번째");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_csv_roundtrip_with_embedding() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("faq.csv");

        let mut with_embedding = record("배송비 설정", "상품 등록 화면에서 설정합니다");
        with_embedding.category = vec!["배송".to_string(), "상품".to_string()];
        with_embedding.subcategory = "묶음배송".to_string();
        with_embedding.embedding = Some(vec![0.25, -0.5, 1.0]);

        let table = FaqTable::new(vec![with_embedding.clone(), record("반품", "반품 안내")]);
        table.save_csv(&path).unwrap();

        let loaded = FaqTable::load_csv(&path).unwrap();
        assert_eq!(loaded.records(), table.records());
        assert_eq!(loaded.answer_for("배송비 설정"), "상품 등록 화면에서 설정합니다");
    }

    #[test]
    fn test_set_embeddings_checks_count() {
        let mut table = FaqTable::new(vec![record("정산 주기", "1영업일"), record("반품", "안내")]);

        assert!(table.set_embeddings(vec![vec![1.0]]).is_err());
        assert!(table.records().iter().all(|r| r.embedding.is_none()));

        table.set_embeddings(vec![vec![1.0], vec![2.0]]).unwrap();
        assert_eq!(table.records()[1].embedding, Some(vec![2.0]));
        assert_eq!(table.answer_for("반품"), "안내");
    }

    #[test]
    fn test_load_bom_and_python_list_csv() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("faq_embeddings.csv");
        let content = "\u{feff}question,answer,category,subcategory,question_clean,answer_clean,embedding\n\
                       \"[가입] 가입 방법?\",가입 안내.,\"['가입', '회원']\",,가입 방법,가입 안내,\"[0.5, -1.0]\"\n";
        std::fs::write(&path, content).unwrap();

        let table = FaqTable::load_csv(&path).unwrap();
        let row = &table.records()[0];
        assert_eq!(row.category, vec!["가입", "회원"]);
        assert_eq!(row.subcategory, "");
        assert_eq!(row.embedding, Some(vec![0.5, -1.0]));
        assert_eq!(table.answer_for("가입 방법"), "가입 안내");
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(FaqTable::load_csv(Path::new("/nonexistent/faq.csv")).is_err());
    }
}
