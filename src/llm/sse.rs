//! Chat Completions 스트림 디코더
//!
//! 응답 본문은 `data: {json}\n\n` 줄의 연속이고 `data: [DONE]`으로 끝납니다.
//! 네트워크 청크 경계가 UTF-8 문자 중간에 올 수 있으므로 바이트 단위로 버퍼링합니다.

use anyhow::{Context, Result};
use serde::Deserialize;

/// 스트림 한 프레임
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    /// 토큰 조각 (빈 delta는 건너뜀)
    Token(String),
    /// `[DONE]` 종료 표시
    Done,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    /// 스트림 도중 서버 에러 (`{"error": {...}}`)
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// 줄 단위 SSE 디코더
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 바이트 청크를 넣고 완성된 프레임을 꺼냄
    ///
    /// 잘못된 줄을 만나면 그때까지의 프레임 뒤에 에러 하나를 붙이고 멈춥니다.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<SseFrame>> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            match decode_line(&line) {
                Ok(Some(frame)) => frames.push(Ok(frame)),
                Ok(None) => {}
                Err(e) => {
                    frames.push(Err(e));
                    break;
                }
            }
        }
        frames
    }

    /// 스트림 종료 시 개행 없이 남은 줄 처리
    pub fn finish(&mut self) -> Vec<Result<SseFrame>> {
        let rest = std::mem::take(&mut self.buf);
        decode_line(&rest).transpose().into_iter().collect()
    }
}

fn decode_line(line: &[u8]) -> Result<Option<SseFrame>> {
    if line.is_empty() {
        return Ok(None);
    }
    let line = std::str::from_utf8(line).context("Stream line is not valid UTF-8")?;
    parse_line(line)
}

fn parse_line(line: &str) -> Result<Option<SseFrame>> {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(data) = line.strip_prefix("data:") else {
        // 빈 줄, 주석(`:`), event/id 필드는 무시
        return Ok(None);
    };
    let data = data.trim_start();

    if data == "[DONE]" {
        return Ok(Some(SseFrame::Done));
    }
    if data.is_empty() {
        return Ok(None);
    }

    let chunk: StreamChunk =
        serde_json::from_str(data).with_context(|| format!("Invalid stream chunk: {}", data))?;

    if let Some(error) = chunk.error {
        anyhow::bail!(
            "Upstream stream error ({}): {}",
            error.kind.as_deref().unwrap_or("unknown"),
            error.message
        );
    }

    let token: String = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .collect();

    if token.is_empty() {
        Ok(None)
    } else {
        Ok(Some(SseFrame::Token(token)))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"index": 0, "delta": {"content": content}}]})
        )
    }

    fn ok_frames(items: Vec<Result<SseFrame>>) -> Vec<SseFrame> {
        items.into_iter().map(|f| f.unwrap()).collect()
    }

    #[test]
    fn test_decode_tokens_and_done() {
        let body = format!(
            "data: {}\n\n{}{}data: [DONE]\n\n",
            serde_json::json!({"choices": [{"index": 0, "delta": {"role": "assistant"}}]}),
            chunk("안녕"),
            chunk("하세요")
        );

        let mut decoder = SseDecoder::new();
        let frames = ok_frames(decoder.push(body.as_bytes()));

        assert_eq!(
            frames,
            vec![
                SseFrame::Token("안녕".to_string()),
                SseFrame::Token("하세요".to_string()),
                SseFrame::Done,
            ]
        );
    }

    #[test]
    fn test_split_inside_multibyte_char() {
        let body = chunk("회원가입");
        let bytes = body.as_bytes();
        // "회" 바이트 중간에서 분할
        let split = body.find('회').unwrap() + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&bytes[..split]).is_empty());
        let frames = ok_frames(decoder.push(&bytes[split..]));
        assert_eq!(frames, vec![SseFrame::Token("회원가입".to_string())]);
    }

    #[test]
    fn test_ignores_comments_and_crlf() {
        let mut decoder = SseDecoder::new();
        let frames = ok_frames(decoder.push(b": keep-alive\r\n\r\ndata: [DONE]\r\n"));
        assert_eq!(frames, vec![SseFrame::Done]);
    }

    #[test]
    fn test_finish_flushes_trailing_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(ok_frames(decoder.finish()), vec![SseFrame::Done]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_invalid_line_keeps_earlier_tokens() {
        let body = format!("{}data: {{not json}}\n\n{}", chunk("앞부분"), chunk("뒤"));
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(body.as_bytes());

        assert_eq!(frames.len(), 2);
        assert_eq!(
            frames[0].as_ref().unwrap(),
            &SseFrame::Token("앞부분".to_string())
        );
        assert!(frames[1].is_err());
    }

    #[test]
    fn test_error_frame_is_error() {
        let body = format!(
            "{}data: {}\n\n",
            chunk("부분"),
            serde_json::json!({"error": {"message": "overloaded", "type": "server_error"}})
        );
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(body.as_bytes());

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref().unwrap(), &SseFrame::Token("부분".to_string()));
        let err = frames[1].as_ref().unwrap_err();
        assert!(format!("{:#}", err).contains("server_error"));
    }
}
