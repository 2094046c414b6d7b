//! HTTP 서버 - 챗봇 API
//!
//! - `GET /` 내장 채팅 페이지
//! - `GET /chat?query=..` SSE 스트리밍 응답
//! - `POST /chat` 단일 JSON 응답
//! - `GET /health` 상태 확인

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::chat::{ChatError, ChatEvent, ChatPipeline, EMPTY_QUERY_MESSAGE, GENERIC_FAILURE};

const INDEX_HTML: &str = include_str!("index.html");

/// 요청 형식 오류 메시지
pub const INVALID_REQUEST_MESSAGE: &str = "요청 형식이 올바르지 않습니다.";

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

/// 클라이언트용 에러 응답 (`{"detail": ..}`, 내부 정보 없음)
#[derive(Debug)]
pub enum ApiError {
    /// 본문/쿼리 파싱 실패
    InvalidRequest,
    Chat(ChatError),
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        Self::Chat(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::warn!("잘못된 요청 본문: {}", rejection.body_text());
        Self::InvalidRequest
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        tracing::warn!("잘못된 쿼리 문자열: {}", rejection.body_text());
        Self::InvalidRequest
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::InvalidRequest => (StatusCode::BAD_REQUEST, INVALID_REQUEST_MESSAGE),
            ApiError::Chat(e) if e.is_client_error() => {
                (StatusCode::BAD_REQUEST, EMPTY_QUERY_MESSAGE)
            }
            ApiError::Chat(_) => (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

/// 라우터 생성
pub fn router(pipeline: Arc<ChatPipeline>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/chat", get(chat_stream).post(chat_once))
        .route("/health", get(health))
        .with_state(pipeline)
}

/// 서버 실행 (Ctrl+C로 종료)
pub async fn serve(pipeline: Arc<ChatPipeline>, host: &str, port: u16) -> Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", host, port))?;
    tracing::info!("챗봇 서버 시작: http://{}:{}", host, port);

    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(shutdown_on(tokio::signal::ctrl_c()))
        .await
        .context("HTTP server failed")
}

/// 종료 신호 대기
///
/// 신호 핸들러 등록에 실패하면 종료하지 않고 계속 대기합니다.
async fn shutdown_on<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        tracing::error!("종료 신호 핸들러 등록 실패: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("서버 종료 중...");
}

// ============================================================================
// Handlers
// ============================================================================

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health(State(pipeline): State<Arc<ChatPipeline>>) -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "faq_count": pipeline.faq_count() }))
}

async fn chat_stream(
    State(pipeline): State<Arc<ChatPipeline>>,
    params: Result<Query<ChatQuery>, QueryRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let Query(params) = params?;
    tracing::info!("스트리밍 질문 수신: {}", params.query.trim());
    let events = pipeline.answer_stream(&params.query).await?;
    Ok(Sse::new(events.map(to_sse_event)))
}

async fn chat_once(
    State(pipeline): State<Arc<ChatPipeline>>,
    request: Result<Json<ChatQuery>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = request?;
    tracing::info!("질문 수신: {}", request.query.trim());
    let reply = pipeline.answer(&request.query).await?;
    Ok(Json(ChatResponse {
        response: reply.text().to_string(),
    }))
}

fn to_sse_event(event: ChatEvent) -> Result<Event, axum::Error> {
    Event::default().json_data(&event)
}

// ============================================================================
// Tests
// ============================================================================
