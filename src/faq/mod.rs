//! FAQ 모듈 - 원본 FAQ 전처리 및 FAQ 테이블
//!
//! - preprocess: 카테고리 추출 + 텍스트 정제 (오프라인)
//! - table: 정제된 FAQ CSV 로드/저장 및 답변 조회 (서버 시작 시 메모리 로드)

mod preprocess;
mod table;

use serde::{Deserialize, Serialize};

// Re-exports
pub use preprocess::{
    clean_answer, clean_question, extract_categories, extract_subcategory, load_raw_faqs,
    preprocess, validate_records, RawFaq, UNCATEGORIZED,
};
pub use table::{FaqTable, ANSWER_NOT_FOUND};

/// 정제된 FAQ 레코드 (행 위치가 키)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqRecord {
    /// 원본 질문
    pub question: String,
    /// 원본 답변
    pub answer: String,
    /// 대괄호 카테고리 목록
    pub category: Vec<String>,
    /// 문장 끝 소괄호 서브카테고리
    pub subcategory: String,
    /// 정제 질문 (임베딩/검색 대상)
    pub question_clean: String,
    /// 정제 답변 (LLM 컨텍스트)
    pub answer_clean: String,
    /// 질문 임베딩 (embed 단계 이후 채워짐)
    pub embedding: Option<Vec<f32>>,
}
