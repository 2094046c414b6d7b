//! 프롬프트 템플릿
//!
//! 답변 컨텍스트, 추천 질문 후보, 말투/형식 지시를 하나의 템플릿으로 조립합니다.

use crate::llm::{ChatMessage, Role};

const SMARTSTORE_SYSTEM: &str = "You are a friendly and helpful Korean chatbot named 'SmartStore Bot'. \
You speak in a polite and warm tone, providing thorough explanations. \
If you cannot find relevant info in the FAQ, politely apologize and suggest other possible solutions.";

const SMARTSTORE_INSTRUCTIONS: &str = "You are a friendly and helpful Korean chatbot named 'SmartStore Bot'. \
When answering the user's question, please speak in a warm and polite tone, \
providing sufficient detail and clarity. Refer to the given FAQ context if it is relevant. \
If the user asks for a step-by-step procedure, list each step clearly and use friendly language. \
If the FAQ doesn't have an answer, politely apologize and suggest alternative actions. \
Please provide the answer in Korean. Keep the response concise but not too short, \
around 200~300 characters or a few paragraphs is okay. \
Use line breaks to improve readability, but avoid using Markdown like Bold.\n\n\
예시 포맷:\n\
1) 첫 번째 작업을 설명합니다.\n\
2) 두 번째 작업을 설명합니다.\n\
3) 세 번째 작업을 설명합니다.\n\n\
End the answer with a short polite closing statement such as \
'도움이 되셨길 바랍니다. 더 궁금한 점 있으시면 언제든 알려주세요!'.";

const SMARTSTORE_ANSWER_FORMAT: &str = "아래 형식을 참고하여 답변을 작성하세요:\n\
-----\n\
답변:\n\
(FAQ들을 참조해서 사용자 질문에 대한 답변을 작성)\n\n\
추천 질문:\n\
(연관 질문 후보 중 2~3개를 자연스럽게 나열)\n\
-----\n\
답변:";

/// LLM 프롬프트 템플릿
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    /// developer 역할 메시지 (페르소나)
    pub system: String,
    /// 말투/형식 지시 (user 메시지 앞부분)
    pub instructions: String,
    /// 출력 형식 안내 (user 메시지 끝부분)
    pub answer_format: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::smartstore()
    }
}

impl PromptTemplate {
    /// 스마트스토어 FAQ 봇 기본 템플릿
    pub fn smartstore() -> Self {
        Self {
            system: SMARTSTORE_SYSTEM.to_string(),
            instructions: SMARTSTORE_INSTRUCTIONS.to_string(),
            answer_format: SMARTSTORE_ANSWER_FORMAT.to_string(),
        }
    }

    /// 말투/형식 지시 교체
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// 출력 형식 안내 교체
    pub fn with_answer_format(mut self, answer_format: impl Into<String>) -> Self {
        self.answer_format = answer_format.into();
        self
    }

    /// `FAQ n Answer:` 블록 목록
    pub fn faq_context(answers: &[String]) -> String {
        answers
            .iter()
            .enumerate()
            .map(|(i, answer)| format!("FAQ {} Answer:\n{}\n\n", i + 1, answer))
            .collect()
    }

    /// `- 질문` 목록 (없으면 `(없음)`)
    pub fn recommended_context(questions: &[String]) -> String {
        if questions.is_empty() {
            return "(없음)\n".to_string();
        }
        questions.iter().map(|q| format!("- {}\n", q)).collect()
    }

    /// 메시지 목록 생성 (developer + user)
    pub fn render(
        &self,
        query: &str,
        answers: &[String],
        recommended: &[String],
    ) -> Vec<ChatMessage> {
        let mut prompt = String::new();
        if !self.instructions.is_empty() {
            prompt.push_str(&self.instructions);
            prompt.push_str("\n\n");
        }
        prompt.push_str(&format!("사용자 질문: {}\n\n", query));
        prompt.push_str(&format!("FAQ 답변 정보:\n{}\n", Self::faq_context(answers)));
        prompt.push_str(&format!(
            "연관 질문 후보:\n{}\n",
            Self::recommended_context(recommended)
        ));
        prompt.push_str(&self.answer_format);

        vec![
            ChatMessage::new(Role::Developer, self.system.clone()),
            ChatMessage::new(Role::User, prompt),
        ]
    }
}
