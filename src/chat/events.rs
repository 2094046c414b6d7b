//! 스트리밍 응답 이벤트
//!
//! LLM 토큰 스트림을 `{status, data}` 이벤트 시퀀스로 변환합니다.
//! - 토큰마다 `processing`
//! - 소진되면 `complete` 하나로 종료
//! - 중간 실패 시 `error` 하나로 종료

use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::llm::TokenStream;

/// `complete` 이벤트 데이터
pub const STREAM_FINISHED: &str = "Stream finished";

/// 사용자에게 보여줄 일반 실패 메시지
pub const GENERIC_FAILURE: &str = "챗봇 응답 생성에 실패했습니다.";

/// 이벤트 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Processing,
    Complete,
    Error,
}

/// 스트리밍 이벤트 페이로드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub status: EventStatus,
    pub data: String,
}

impl ChatEvent {
    pub fn processing(data: impl Into<String>) -> Self {
        Self {
            status: EventStatus::Processing,
            data: data.into(),
        }
    }

    pub fn complete() -> Self {
        Self {
            status: EventStatus::Complete,
            data: STREAM_FINISHED.to_string(),
        }
    }

    pub fn error() -> Self {
        Self {
            status: EventStatus::Error,
            data: GENERIC_FAILURE.to_string(),
        }
    }

    /// 종료 이벤트 여부
    pub fn is_terminal(&self) -> bool {
        self.status != EventStatus::Processing
    }
}

/// 이벤트 스트림 (유한, 재시작 불가)
pub type ChatEventStream = Pin<Box<dyn Stream<Item = ChatEvent> + Send>>;

enum State {
    Streaming { tokens: TokenStream, emitted: bool },
    Closing,
    Done,
}

/// 토큰 스트림 → 이벤트 스트림
///
/// 토큰이 하나도 없이 끝나면 빈 `processing` 하나를 먼저 보냅니다.
/// 종료 이벤트 이후에는 아무것도 내지 않습니다.
pub fn token_events(tokens: TokenStream) -> ChatEventStream {
    let initial = State::Streaming {
        tokens,
        emitted: false,
    };

    let stream = futures::stream::unfold(initial, |state| async move {
        match state {
            State::Streaming {
                mut tokens,
                emitted,
            } => match tokens.next().await {
                Some(Ok(token)) => Some((
                    ChatEvent::processing(token),
                    State::Streaming {
                        tokens,
                        emitted: true,
                    },
                )),
                Some(Err(e)) => {
                    tracing::error!("LLM 스트림 실패: {:#}", e);
                    Some((ChatEvent::error(), State::Done))
                }
                None if !emitted => Some((ChatEvent::processing(""), State::Closing)),
                None => Some((ChatEvent::complete(), State::Done)),
            },
            State::Closing => Some((ChatEvent::complete(), State::Done)),
            State::Done => None,
        }
    });

    Box::pin(stream)
}

/// 고정 메시지 하나를 `processing` + `complete`로 보냄
pub fn message_events(message: impl Into<String>) -> ChatEventStream {
    let events = vec![ChatEvent::processing(message), ChatEvent::complete()];
    Box::pin(futures::stream::iter(events))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(items: Vec<anyhow::Result<String>>) -> TokenStream {
        Box::pin(futures::stream::iter(items))
    }

    #[tokio::test]
    async fn test_processing_then_complete() {
        let events: Vec<ChatEvent> = token_events(tokens(vec![
            Ok("도움이 ".to_string()),
            Ok("되셨길".to_string()),
        ]))
        .collect()
        .await;

        assert_eq!(
            events,
            vec![
                ChatEvent::processing("도움이 "),
                ChatEvent::processing("되셨길"),
                ChatEvent::complete(),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_stream_still_has_processing() {
        let events: Vec<ChatEvent> = token_events(tokens(vec![])).collect().await;
        assert_eq!(events, vec![ChatEvent::processing(""), ChatEvent::complete()]);
    }

    #[tokio::test]
    async fn test_error_terminates() {
        let events: Vec<ChatEvent> = token_events(tokens(vec![
            Ok("a".to_string()),
            Err(anyhow::anyhow!("connection reset")),
            Ok("never".to_string()),
        ]))
        .collect()
        .await;

        assert_eq!(events, vec![ChatEvent::processing("a"), ChatEvent::error()]);
    }

    #[tokio::test]
    async fn test_message_events() {
        let events: Vec<ChatEvent> = message_events("관련 FAQ 없음").collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ChatEvent::processing("관련 FAQ 없음"));
        assert!(events[1].is_terminal());
        assert_eq!(events[1].data, STREAM_FINISHED);
    }

    #[test]
    fn test_event_json() {
        let json = serde_json::to_string(&ChatEvent::processing("안녕")).unwrap();
        assert_eq!(json, r#"{"status":"processing","data":"안녕"}"#);
        let json = serde_json::to_string(&ChatEvent::complete()).unwrap();
        assert_eq!(json, r#"{"status":"complete","data":"Stream finished"}"#);
    }
}
