//! LLM 모듈 - OpenAI Chat Completions API 호출
//!
//! 단일 응답(`complete`)과 토큰 스트림(`complete_stream`) 두 가지 방식을 제공합니다.
//! 스트림은 소비자가 drop하면 HTTP 응답 본문도 함께 해제됩니다.

mod sse;

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::config::{get_api_key, OpenAiConfig};
use crate::embedding::api_error;

pub use sse::{SseDecoder, SseFrame};

/// 토큰 스트림 (유한, 재시작 불가)
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

// ============================================================================
// Types
// ============================================================================

/// 메시지 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Developer,
    System,
    User,
    Assistant,
}

/// 채팅 메시지
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

// ============================================================================
// ChatModel Trait
// ============================================================================

/// LLM 채팅 모델 트레이트
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// 단일 응답 생성
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// 토큰 스트림 생성
    ///
    /// 요청 전송과 상태 코드 확인까지 끝난 뒤 스트림을 반환합니다.
    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream>;

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// OpenAI Chat
// ============================================================================

/// OpenAI Chat Completions 구현체
#[derive(Debug)]
pub struct OpenAiChat {
    api_key: String,
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChat {
    pub fn new(api_key: String, config: &OpenAiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            client,
            endpoint: format!(
                "{}/chat/completions",
                config.base_url.trim_end_matches('/')
            ),
            model: config.chat_model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
        })
    }

    /// 환경변수(`OPENAI_API_KEY`)에서 키를 읽어 생성
    pub fn from_config(config: &OpenAiConfig) -> Result<Self> {
        let api_key = get_api_key()?;
        Self::new(api_key, config)
    }

    async fn send(&self, messages: &[ChatMessage], stream: bool) -> Result<reqwest::Response> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            top_p: self.top_p,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            stream,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send chat completion request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self.send(messages, false).await?;
        let parsed: CompletionResponse = response
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("Chat completion returned no content"))?;

        tracing::info!("LLM 응답 생성 완료 ({} chars)", content.chars().count());
        Ok(content)
    }

    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream> {
        let response = self.send(messages, true).await?;
        Ok(decode_token_stream(response.bytes_stream()))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Stream Decoding
// ============================================================================

struct DecodeState<S> {
    bytes: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String>>,
    saw_done: bool,
    finished: bool,
}

impl<S> DecodeState<S> {
    /// 프레임을 대기열에 넣음 (`[DONE]` 또는 에러 이후는 버림)
    fn enqueue(&mut self, frames: Vec<Result<SseFrame>>) {
        for frame in frames {
            match frame {
                Ok(SseFrame::Token(token)) => self.pending.push_back(Ok(token)),
                Ok(SseFrame::Done) => {
                    self.saw_done = true;
                    self.finished = true;
                    return;
                }
                Err(e) => {
                    self.pending.push_back(Err(e));
                    self.finished = true;
                    return;
                }
            }
        }
    }
}

/// 바이트 스트림을 토큰 스트림으로 변환
///
/// `[DONE]`에서 정상 종료합니다. 읽기 실패, 에러 프레임, `[DONE]` 없는 본문 종료는
/// 그때까지의 토큰 뒤에 에러 하나를 내고 끝납니다.
pub fn decode_token_stream<S, B, E>(bytes: S) -> TokenStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        saw_done: false,
        finished: false,
    };

    let stream = futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let frames = state.decoder.push(chunk.as_ref());
                    state.enqueue(frames);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    let err = anyhow::Error::new(e).context("Stream read failed");
                    return Some((Err(err), state));
                }
                None => {
                    let frames = state.decoder.finish();
                    state.enqueue(frames);
                    if !state.saw_done && !state.finished {
                        let err = anyhow::anyhow!("Stream ended before [DONE]");
                        state.pending.push_back(Err(err));
                    }
                    state.finished = true;
                }
            }
        }
    });

    Box::pin(stream)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{token_events, ChatEvent};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> OpenAiConfig {
        OpenAiConfig {
            base_url: base_url.to_string(),
            ..OpenAiConfig::default()
        }
    }

    fn messages() -> Vec<ChatMessage> {
        vec![
            ChatMessage::new(Role::Developer, "You are SmartStore Bot."),
            ChatMessage::new(Role::User, "회원가입 방법?"),
        ]
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_value(ChatMessage::new(Role::Developer, "x")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "developer", "content": "x"}));
    }

    #[tokio::test]
    async fn test_complete() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "답변입니다."}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let chat = OpenAiChat::new("key".to_string(), &test_config(&server.uri())).unwrap();
        let answer = chat.complete(&messages()).await.unwrap();
        assert_eq!(answer, "답변입니다.");
    }

    #[tokio::test]
    async fn test_complete_stream() {
        let body = [
            r#"data: {"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{"content":"도움이 "}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{"content":"되셨길"}}]}"#,
            "data: [DONE]",
        ]
        .join("\n\n");

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let chat = OpenAiChat::new("key".to_string(), &test_config(&server.uri())).unwrap();
        let tokens: Vec<String> = chat
            .complete_stream(&messages())
            .await
            .unwrap()
            .map(|t| t.unwrap())
            .collect()
            .await;

        assert_eq!(tokens, vec!["도움이 ", "되셨길"]);
    }

    #[tokio::test]
    async fn test_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let chat = OpenAiChat::new("key".to_string(), &test_config(&server.uri())).unwrap();
        assert!(chat.complete(&messages()).await.is_err());
        assert!(chat.complete_stream(&messages()).await.is_err());
    }

    #[tokio::test]
    async fn test_decode_stops_at_done() {
        let first = r#"data: {"choices":[{"delta":{"content":"a"}}]}"#.to_string() + "\n\n";
        let chunks: Vec<std::result::Result<Vec<u8>, std::io::Error>> = vec![
            Ok(format!("{}data: [DONE]\n\n", first).into_bytes()),
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\n".to_vec()),
        ];
        let tokens: Vec<String> = decode_token_stream(futures::stream::iter(chunks))
            .map(|t| t.unwrap())
            .collect()
            .await;
        assert_eq!(tokens, vec!["a"]);
    }

    #[tokio::test]
    async fn test_decode_read_error_ends_stream() {
        let chunks: Vec<std::result::Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n".to_vec()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\n".to_vec()),
        ];
        let items: Vec<Result<String>> =
            decode_token_stream(futures::stream::iter(chunks)).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "a");
        assert!(items[1].is_err());
    }

    const PARTIAL: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"부분\"}}]}\n\n";

    fn byte_chunks(parts: &[&str]) -> Vec<std::result::Result<Vec<u8>, std::io::Error>> {
        parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect()
    }

    async fn events_for(parts: &[&str]) -> Vec<ChatEvent> {
        let tokens = decode_token_stream(futures::stream::iter(byte_chunks(parts)));
        token_events(tokens).collect().await
    }

    #[tokio::test]
    async fn test_error_frame_ends_with_error_event() {
        let error = r#"data: {"error":{"message":"overloaded","type":"server_error"}}"#;
        let events = events_for(&[PARTIAL, error, "\n\n"]).await;
        assert_eq!(events, vec![ChatEvent::processing("부분"), ChatEvent::error()]);
    }

    #[tokio::test]
    async fn test_body_closed_before_done_ends_with_error_event() {
        let events = events_for(&[PARTIAL]).await;
        assert_eq!(events, vec![ChatEvent::processing("부분"), ChatEvent::error()]);

        let events = events_for(&[PARTIAL, "data: [DONE]\n\n"]).await;
        assert_eq!(events, vec![ChatEvent::processing("부분"), ChatEvent::complete()]);
    }

    #[tokio::test]
    async fn test_invalid_line_delivers_earlier_tokens() {
        let chunks = byte_chunks(&[PARTIAL, "data: {broken\n\n"]);
        let items: Vec<Result<String>> =
            decode_token_stream(futures::stream::iter(chunks)).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "부분");
        assert!(items[1].is_err());
    }
}
