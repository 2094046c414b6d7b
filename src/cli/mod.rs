//! CLI 모듈
//!
//! faqbot 명령어 정의 및 구현

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio::io::AsyncBufReadExt;

use crate::chat::{ChatEvent, ChatPipeline, ChatReply, EventStatus};
use crate::config::{has_api_key, Config, API_KEY_ENV};
use crate::embedding::OpenAiEmbedding;
use crate::faq::FaqTable;
use crate::ingest;
use crate::knowledge::{LanceVectorStore, VectorStore};
use crate::server;

/// 전처리 결과 기본 파일명
const PREPROCESSED_FILE_NAME: &str = "faq.csv";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "faqbot")]
#[command(version, about = "스마트스토어 FAQ 챗봇", long_about = None)]
pub struct Cli {
    /// 설정 파일 경로 (기본: ~/.smartstore-faq-bot/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 원본 FAQ JSON을 정제 CSV로 변환
    Preprocess {
        /// 원본 JSON (질문 → 답변 객체)
        #[arg(short, long)]
        input: PathBuf,

        /// 출력 CSV (기본: 데이터 디렉토리/faq.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 정제 질문 임베딩 생성
    Embed {
        /// 전처리된 CSV (기본: 데이터 디렉토리/faq.csv)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// 임베딩 포함 CSV (기본: 데이터 디렉토리/faq_embeddings.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 임베딩을 벡터 저장소에 인덱싱
    Index {
        /// 임베딩 포함 CSV (기본: 데이터 디렉토리/faq_embeddings.csv)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// 기존 컬렉션 삭제 후 인덱싱
        #[arg(long)]
        reset: bool,
    },

    /// 단일 질문
    Ask {
        /// 질문
        query: String,

        /// 토큰 단위 스트리밍 출력
        #[arg(short, long)]
        stream: bool,
    },

    /// 대화형 챗봇 (exit 입력 시 종료)
    Chat,

    /// HTTP 서버 실행
    Serve {
        /// 바인드 주소
        #[arg(long)]
        host: Option<String>,

        /// 포트
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Preprocess { input, output } => cmd_preprocess(&config, &input, output),
        Commands::Embed { input, output } => cmd_embed(&config, input, output).await,
        Commands::Index { input, reset } => cmd_index(&config, input, reset).await,
        Commands::Ask { query, stream } => cmd_ask(&config, &query, stream).await,
        Commands::Chat => cmd_chat(&config).await,
        Commands::Serve { host, port } => cmd_serve(&config, host, port).await,
        Commands::Status => cmd_status(&config).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

fn require_api_key() -> Result<()> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export {}=your-api-key\n  \
             또는 .env 파일에 {}=your-api-key 추가",
            API_KEY_ENV,
            API_KEY_ENV
        );
    }
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    Ok(())
}

/// 전처리 명령어 (preprocess)
///
/// 원본 JSON에서 카테고리/서브카테고리를 추출하고 질문/답변을 정제합니다.
fn cmd_preprocess(config: &Config, input: &Path, output: Option<PathBuf>) -> Result<()> {
    let output = output.unwrap_or_else(|| config.data_dir.join(PREPROCESSED_FILE_NAME));
    ensure_parent_dir(&output)?;

    println!("[*] FAQ 전처리 중: {}", input.display());
    let table = ingest::prepare(input, &output).context("FAQ 전처리 실패")?;

    println!("[OK] {} 건 저장: {}", table.len(), output.display());
    for record in table.records().iter().take(3) {
        println!(
            "     [{}] {}",
            record.category.join(", "),
            truncate_text(&record.question_clean, 60)
        );
    }

    Ok(())
}

/// 임베딩 명령어 (embed)
async fn cmd_embed(config: &Config, input: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    require_api_key()?;

    let input = input.unwrap_or_else(|| config.data_dir.join(PREPROCESSED_FILE_NAME));
    let output = output.unwrap_or_else(|| config.faq_table_path());
    ensure_parent_dir(&output)?;

    let mut table = FaqTable::load_csv(&input).context("FAQ 테이블 로드 실패")?;
    let embedder = OpenAiEmbedding::from_config(&config.openai)?;

    println!(
        "[*] 임베딩 생성 중: {} 건 (batch {})",
        table.len(),
        config.openai.embed_batch_size
    );
    let count = ingest::embed_table(&mut table, &embedder, config.openai.embed_batch_size)
        .await
        .context("임베딩 생성 실패")?;
    table.save_csv(&output)?;

    println!("[OK] {} 건 임베딩 저장: {}", count, output.display());
    Ok(())
}

/// 인덱싱 명령어 (index)
async fn cmd_index(config: &Config, input: Option<PathBuf>, reset: bool) -> Result<()> {
    let input = input.unwrap_or_else(|| config.faq_table_path());
    let table = FaqTable::load_csv(&input).context("FAQ 테이블 로드 실패")?;

    let store = LanceVectorStore::open(&config.vector_store_path(), &config.retrieval.collection)
        .await
        .context("벡터 저장소 열기 실패")?;

    if reset {
        println!("[*] 기존 컬렉션 '{}' 삭제", store.table_name());
    }
    println!("[*] 인덱싱 중: {} 건", table.len());

    let inserted = ingest::index_table(&table, &store, reset)
        .await
        .context("인덱싱 실패")?;
    let total = store.count().await?;

    println!("[OK] {} 건 인덱싱 완료 (컬렉션 총 {} 건)", inserted, total);
    Ok(())
}

/// 단일 질문 명령어 (ask)
async fn cmd_ask(config: &Config, query: &str, stream: bool) -> Result<()> {
    require_api_key()?;
    let pipeline = ChatPipeline::from_config(config).await?;

    if stream {
        print_stream(&pipeline, query).await
    } else {
        print_reply(&pipeline, query).await
    }
}

/// 대화형 챗봇 명령어 (chat)
async fn cmd_chat(config: &Config) -> Result<()> {
    require_api_key()?;
    let pipeline = ChatPipeline::from_config(config).await?;

    println!("스마트스토어 FAQ 챗봇 ({} FAQ)", pipeline.faq_count());
    println!("질문을 입력하세요. 종료하려면 'exit'를 입력하세요.");

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n사용자: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.eq_ignore_ascii_case("exit") {
            break;
        }
        if query.is_empty() {
            continue;
        }

        print!("챗봇: ");
        if let Err(e) = print_stream(&pipeline, query).await {
            println!("[!] {}", e);
        }
    }

    println!("챗봇을 종료합니다.");
    Ok(())
}

/// 서버 명령어 (serve)
async fn cmd_serve(config: &Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    require_api_key()?;

    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    if port == 0 {
        bail!("포트는 0일 수 없습니다");
    }

    let pipeline = Arc::new(ChatPipeline::from_config(config).await?);
    println!("[*] FAQ {} 건 로드", pipeline.faq_count());
    println!("[OK] http://{}:{} 에서 대기 중 (Ctrl+C로 종료)", host, port);

    server::serve(pipeline, &host, port).await
}

/// 상태 명령어 (status)
///
/// 시스템 상태를 확인합니다.
async fn cmd_status(config: &Config) -> Result<()> {
    println!("faqbot v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());
    println!(
        "[*] 모델: {} (embedding), {} (chat)",
        config.openai.embedding_model, config.openai.chat_model
    );
    println!("[*] API 엔드포인트: {}", config.openai.base_url);

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정 ({})", API_KEY_ENV);
    }

    // FAQ 테이블
    let table_path = config.faq_table_path();
    if table_path.exists() {
        let size = std::fs::metadata(&table_path).map(|m| m.len()).unwrap_or(0);
        match FaqTable::load_csv(&table_path) {
            Ok(table) => println!(
                "[OK] FAQ 테이블: {} 건 ({})",
                table.len(),
                format_bytes(size as usize)
            ),
            Err(e) => println!("[!] FAQ 테이블 로드 실패: {}", e),
        }
    } else {
        println!("[!] FAQ 테이블 없음: {}", table_path.display());
    }

    // 벡터 저장소
    match LanceVectorStore::open_existing(
        &config.vector_store_path(),
        &config.retrieval.collection,
    )
    .await
    {
        Ok(store) => println!(
            "[OK] 컬렉션 '{}': {} 건",
            store.table_name(),
            store.count().await?
        ),
        Err(_) => println!(
            "[!] 컬렉션 '{}' 없음 (faqbot index 실행 필요)",
            config.retrieval.collection
        ),
    }

    println!();
    println!(
        "[*] 검색 설정: top_k={}, answer_count={}, threshold={}",
        config.retrieval.top_k, config.retrieval.answer_count, config.retrieval.distance_threshold
    );

    Ok(())
}

// ============================================================================
// Output Helpers
// ============================================================================

async fn print_reply(pipeline: &ChatPipeline, query: &str) -> Result<()> {
    match pipeline.answer(query).await? {
        ChatReply::NoMatch => println!("[!] {}", ChatReply::NoMatch.text()),
        ChatReply::Answer(text) => println!("{}", text),
    }
    Ok(())
}

async fn print_stream(pipeline: &ChatPipeline, query: &str) -> Result<()> {
    let mut events = pipeline.answer_stream(query).await?;
    let mut stdout = std::io::stdout();

    while let Some(ChatEvent { status, data }) = events.next().await {
        match status {
            EventStatus::Processing => {
                print!("{}", data);
                stdout.flush()?;
            }
            EventStatus::Complete => println!(),
            EventStatus::Error => println!("\n[!] {}", data),
        }
    }

    Ok(())
}

/// 텍스트를 지정된 길이로 자르기
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("회원가입 방법", 10), "회원가입 방법");
        assert_eq!(truncate_text("정산 주기는 언제인가요", 5), "정산 주기...");
        assert_eq!(truncate_text("반품\n배송비", 20), "반품 배송비");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_parse_commands() {
        let cli = Cli::try_parse_from(["faqbot", "index", "--reset"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Index {
                input: None,
                reset: true
            }
        ));

        let args = ["faqbot", "ask", "정산 주기?", "--stream", "--config", "bot.toml"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("bot.toml")));
        match cli.command {
            Commands::Ask { query, stream } => {
                assert_eq!(query, "정산 주기?");
                assert!(stream);
            }
            _ => panic!("expected ask"),
        }

        let cli = Cli::try_parse_from(["faqbot", "serve", "--port", "9000"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Serve {
                host: None,
                port: Some(9000)
            }
        ));

        assert!(Cli::try_parse_from(["faqbot", "preprocess"]).is_err());
    }
}
