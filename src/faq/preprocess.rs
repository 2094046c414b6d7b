//! FAQ 전처리 - 카테고리 추출 및 텍스트 정제
//!
//! 원본 질문 예시: `[가입절차] [회원정보] 회원가입은 어떻게 하나요? (개인 판매자)`
//! - 카테고리: 질문 안의 모든 대괄호 내용 → `["가입절차", "회원정보"]`
//! - 서브카테고리: 문장 끝 소괄호 내용 → `"개인 판매자"`
//! - 정제 질문: `회원정보 회원가입은 어떻게 하나요`

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use super::FaqRecord;

/// 카테고리가 없는 질문의 기본값
pub const UNCATEGORIZED: &str = "Uncategorized";

static CATEGORY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]").expect("valid category regex"));
static LEADING_CATEGORY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[([^\]]+)\]").expect("valid leading category regex"));
static SUBCATEGORY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^)]+)\)$").expect("valid subcategory regex"));
static SPECIAL_CHAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid special char regex"));
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

// ============================================================================
// Types
// ============================================================================

/// 전처리 전 원본 질문/답변 쌍
#[derive(Debug, Clone, PartialEq)]
pub struct RawFaq {
    pub question: String,
    pub answer: String,
}

// ============================================================================
// Extraction
// ============================================================================

/// 질문에서 모든 대괄호 카테고리 추출
///
/// 대괄호가 없으면 `["Uncategorized"]`
pub fn extract_categories(question: &str) -> Vec<String> {
    let categories: Vec<String> = CATEGORY_RE
        .captures_iter(question)
        .map(|caps| caps[1].to_string())
        .collect();

    if categories.is_empty() {
        vec![UNCATEGORIZED.to_string()]
    } else {
        categories
    }
}

/// 문장 끝 소괄호 내용 추출 (없으면 빈 문자열)
pub fn extract_subcategory(question: &str) -> String {
    SUBCATEGORY_RE
        .captures(question)
        .map(|caps| caps[1].to_string())
        .unwrap_or_default()
}

// ============================================================================
// Cleaning
// ============================================================================

/// 특수 문자 제거 + 공백 정리
fn normalize(text: &str) -> String {
    let text = SPECIAL_CHAR_RE.replace_all(text, " ");
    let text = WHITESPACE_RE.replace_all(&text, " ");
    text.trim().to_string()
}

/// 질문 텍스트 정제
///
/// - 문장 시작의 대괄호 하나 제거 (중간 대괄호는 내용 유지)
/// - 문장 끝의 소괄호 제거
/// - 특수 문자를 공백으로 치환
/// - 연속 공백을 하나로, 양끝 공백 제거
pub fn clean_question(text: &str) -> String {
    let text = LEADING_CATEGORY_RE.replace(text, "");
    let text = SUBCATEGORY_RE.replace(&text, "");
    normalize(&text)
}

/// 답변 텍스트 정제 (특수 문자 + 공백 정리만)
pub fn clean_answer(text: &str) -> String {
    normalize(text)
}

// ============================================================================
// Pipeline
// ============================================================================

/// 원본 JSON 로드
///
/// 형식: `{ "질문": "답변", ... }` (파일 순서 유지)
pub fn load_raw_faqs(path: &Path) -> Result<Vec<RawFaq>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read raw FAQ file: {}", path.display()))?;

    let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse raw FAQ JSON: {}", path.display()))?;

    let faqs: Vec<RawFaq> = map
        .into_iter()
        .map(|(question, answer)| RawFaq {
            question,
            answer: match answer {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            },
        })
        .collect();

    tracing::info!("원본 FAQ 로드 완료: {} rows", faqs.len());
    Ok(faqs)
}

/// 원본 쌍을 정제된 FAQ 레코드로 변환
///
/// 질문/답변이 비었거나 정제 후 질문이 비는 행은 제거합니다
/// (임베딩 API가 빈 입력을 거부함).
pub fn preprocess(raw: &[RawFaq]) -> Vec<FaqRecord> {
    let mut records = Vec::with_capacity(raw.len());
    let mut dropped = 0usize;

    for faq in raw {
        if faq.question.trim().is_empty() || faq.answer.trim().is_empty() {
            dropped += 1;
            continue;
        }

        let question_clean = clean_question(&faq.question);
        if question_clean.is_empty() {
            tracing::warn!("정제 후 빈 질문 제외: {:?}", faq.question);
            dropped += 1;
            continue;
        }

        records.push(FaqRecord {
            question: faq.question.clone(),
            answer: faq.answer.clone(),
            category: extract_categories(&faq.question),
            subcategory: extract_subcategory(&faq.question),
            question_clean,
            answer_clean: clean_answer(&faq.answer),
            embedding: None,
        });
    }

    if dropped > 0 {
        tracing::warn!("결측/빈 행 {} 건 제거 ({} → {})", dropped, raw.len(), records.len());
    }
    tracing::info!("전처리 완료: {} rows", records.len());

    records
}

/// 레코드 유효성 검사
pub fn validate_records(records: &[FaqRecord]) -> Result<()> {
    for (i, record) in records.iter().enumerate() {
        if record.question_clean.is_empty() {
            anyhow::bail!("Row {}: empty question_clean", i);
        }
        if record.category.is_empty() {
            anyhow::bail!("Row {}: empty category list", i);
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
