//! Command-line interface
//!
//! Argument parsing and the command implementations: the web server, a
//! terminal chat, one-shot questions, index maintenance, retrieval checks
//! and a setup check.

use crate::api::endpoints::{AppState, create_router};
use crate::core::client::ModelClient;
use crate::core::config::Config;
use crate::core::constants::{EXPECTED_PDF_COUNT, collection};
use crate::core::providers::OpenAIProvider;
use crate::graph::nodes::preview;
use crate::models::openai::OpenAIMessage;
use crate::rag::index::{IndexOptions, build_index};
use crate::rag::loader::{find_documents, is_pdf};
use crate::rag::prompt::build_prompt;
use crate::store::VectorStore;
use crate::tools::context::search_settings;
use crate::tools::rag_tool::retrieve;
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

/// Class materials study agent
#[derive(Parser)]
#[command(name = "study-agent")]
#[command(about = "ReAct study agent over class materials, with memory and tools", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Load settings from this TOML file only, ignoring the environment
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the chat API (default)
    Serve {
        /// Bind address (overrides HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port (overrides PORT)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Chat with the agent in the terminal
    Chat,

    /// Ask the agent a single question
    Ask {
        question: String,
    },

    /// Rebuild the document index from the data directory
    Index,

    /// Run sample retrievals, then answer questions from the materials
    Query {
        /// Answer only this question
        question: Option<String>,
    },

    /// Verify API key, connectivity, class materials and storage
    Check,
}

const EXIT_WORDS: [&str; 3] = ["quit", "exit", "종료"];

const SAMPLE_QUERIES: [&str; 4] = [
    "LangGraph State 설계 방법",
    "ReAct 패턴이란?",
    "HNSW 알고리즘 설명",
    "Memory 시스템 구성요소",
];

/// Every command but `check` calls the OpenAI API
pub fn requires_api_key(command: &Commands) -> bool {
    !matches!(command, Commands::Check)
}

fn build_client(config: &Config) -> Result<ModelClient> {
    let provider = OpenAIProvider::new(
        config.openai_api_key.clone(),
        config.openai_base_url.clone(),
        config.request_timeout,
    )
    .context("Failed to create the OpenAI provider")?;
    Ok(ModelClient::new(
        Arc::new(provider),
        config.chat_model.clone(),
        config.embed_model.clone(),
    ))
}

fn open_store(config: &Config) -> Result<Arc<VectorStore>> {
    VectorStore::open(&config.chroma_dir)
        .with_context(|| format!("Failed to open vector store at {}", config.chroma_dir.display()))
}

fn is_exit(input: &str) -> bool {
    EXIT_WORDS.contains(&input.to_lowercase().as_str())
}

/// Print `label` and read one trimmed line; `None` at end of input
async fn prompt_line<R>(lines: &mut tokio::io::Lines<R>, label: &str) -> Result<Option<String>>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    print!("{}", label);
    std::io::stdout().flush()?;
    Ok(lines.next_line().await?.map(|line| line.trim().to_string()))
}

pub async fn run(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Serve { host, port } => {
            let mut config = config;
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            serve(Arc::new(config)).await
        }
        Commands::Chat => chat(Arc::new(config)).await,
        Commands::Ask { question } => ask(Arc::new(config), &question).await,
        Commands::Index => index(&config).await,
        Commands::Query { question } => query(&config, question).await,
        Commands::Check => {
            if check(&config).await {
                Ok(())
            } else {
                bail!("setup check failed")
            }
        }
    }
}

async fn serve(config: Arc<Config>) -> Result<()> {
    let client = build_client(&config)?;
    info!("Using provider: {}", client.provider_name());
    let state = AppState::new(config.clone(), client, open_store(&config)?)?;
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

async fn chat(config: Arc<Config>) -> Result<()> {
    let client = build_client(&config)?;
    let state = AppState::new(config.clone(), client, open_store(&config)?)?;
    let thread_id = uuid::Uuid::new_v4().to_string();

    println!("{}", state.agent.registry().describe());
    println!("\n💬 ReAct Agent 대화 (종료: quit / exit / 종료)");
    println!("{}", "-".repeat(50));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut history: Vec<OpenAIMessage> = Vec::new();

    while let Some(input) = prompt_line(&mut lines, "\n👤 You: ").await? {
        if is_exit(&input) {
            println!("👋 대화를 종료합니다.");
            break;
        }
        if input.is_empty() {
            continue;
        }

        match state.agent.run_agent(&input, &thread_id).await {
            Ok(answer) => {
                println!("\n🤖 Agent: {}", answer);
                history.push(OpenAIMessage::user(input.as_str()));
                history.push(OpenAIMessage::assistant(answer));

                if let Some(extractor) = &state.extractor {
                    let saved = extractor
                        .auto_save_recent_memories(
                            &history,
                            config.memory_recent_n,
                            config.memory_min_importance,
                        )
                        .await;
                    if saved > 0 {
                        println!("💾 {}개의 기억을 저장했습니다.", saved);
                    }
                }
            }
            Err(e) => {
                error!("Agent error: {}", e);
                println!("\n❌ 오류가 발생했습니다: {}", e);
            }
        }
    }
    Ok(())
}

async fn ask(config: Arc<Config>, question: &str) -> Result<()> {
    let client = build_client(&config)?;
    let state = AppState::new(config.clone(), client, open_store(&config)?)?;
    let thread_id = uuid::Uuid::new_v4().to_string();

    let answer = state.agent.run_agent(question, &thread_id).await?;
    println!("{}", answer);
    Ok(())
}

async fn index(config: &Config) -> Result<()> {
    let client = build_client(config)?;
    let store = open_store(config)?;
    let options = IndexOptions {
        data_dir: config.data_dir.clone(),
        chunk_size: config.chunk_size,
        chunk_overlap: config.chunk_overlap,
        batch_size: config.embed_batch_size,
    };

    let stats = build_index(&client, &store, &options).await?;

    println!("\n{}", "=".repeat(50));
    println!("✅ 인덱스 구축 완료!");
    println!("   처리된 파일: {}개", stats.files_processed);
    if stats.files_failed > 0 {
        println!("   실패한 파일: {}개", stats.files_failed);
    }
    println!("   생성된 청크: {}개", stats.chunks_created);
    if let Some(path) = &stats.storage_path {
        println!("   저장 위치: {}", path.display());
    }
    println!("{}", "=".repeat(50));
    Ok(())
}

async fn answer_from_materials(
    client: &ModelClient,
    store: &Arc<VectorStore>,
    config: &Config,
    question: &str,
) -> Result<()> {
    let retrieval = retrieve(client, store, &search_settings(config), question, 5).await?;
    if retrieval.results.is_empty() {
        println!("❌ 관련 문서를 찾을 수 없습니다.");
        return Ok(());
    }

    let answer = client
        .chat_text(build_prompt(question, &retrieval.results))
        .await?;
    println!("\n🤖 답변:");
    println!("{}", "-".repeat(50));
    println!("{}", answer);
    Ok(())
}

async fn query(config: &Config, question: Option<String>) -> Result<()> {
    let client = build_client(config)?;
    let store = open_store(config)?;

    if let Some(question) = question {
        return answer_from_materials(&client, &store, config, &question).await;
    }

    let settings = search_settings(config);
    println!("\n{}", "=".repeat(50));
    println!("RAG 검색 테스트");
    println!("{}", "=".repeat(50));

    for (i, sample) in SAMPLE_QUERIES.iter().enumerate() {
        println!("\n[테스트 {}] 질문: {}", i + 1, sample);
        println!("{}", "-".repeat(50));

        let retrieval = retrieve(&client, &store, &settings, sample, 3).await?;
        if retrieval.results.is_empty() {
            println!("❌ 검색 결과 없음");
            continue;
        }

        println!("✅ 검색 성공! {}개 결과 발견\n", retrieval.results.len());
        for result in &retrieval.results {
            println!(
                "  [{}] {} (청크 {}) - 유사도: {:.3}",
                result.rank, result.source, result.chunk_id, result.embedding_similarity
            );
            println!("      내용 미리보기: {}", preview(&result.content, 100));
            println!();
        }
    }

    println!("\n💬 대화형 검색 모드 (종료: 'quit' 또는 'exit')");
    println!("{}", "-".repeat(50));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(input) = prompt_line(&mut lines, "\n질문을 입력하세요: ").await? {
        if is_exit(&input) {
            println!("👋 검색을 종료합니다.");
            break;
        }
        if input.is_empty() {
            continue;
        }
        if let Err(e) = answer_from_materials(&client, &store, config, &input).await {
            println!("❌ {}", e);
        }
    }
    Ok(())
}

/// Run every setup check, printing one line per check
async fn check(config: &Config) -> bool {
    let mut ok = true;
    println!("\n🔍 환경 설정 확인");
    println!("{}", "=".repeat(50));

    if config.validate_api_key() {
        println!("✅ OPENAI_API_KEY 설정됨");
        match build_client(config) {
            Ok(client) => match client.ping().await {
                Ok(_) => println!("✅ OpenAI API 연결 성공 ({})", client.chat_model()),
                Err(e) => {
                    println!("❌ OpenAI API 연결 실패: {}", e);
                    ok = false;
                }
            },
            Err(e) => {
                println!("❌ OpenAI 클라이언트 생성 실패: {}", e);
                ok = false;
            }
        }
    } else {
        println!("❌ OPENAI_API_KEY가 설정되지 않았습니다.");
        ok = false;
    }

    if config.google_search_configured() {
        println!("✅ Google Search API 설정됨");
    } else {
        println!("⚠️ Google Search API 미설정 (모의 결과 사용)");
    }

    match find_documents(&config.data_dir) {
        Ok(files) => {
            let pdfs = files.iter().filter(|path| is_pdf(path)).count();
            if pdfs == EXPECTED_PDF_COUNT {
                println!("✅ PDF 파일 {}개 확인 ({})", pdfs, config.data_dir.display());
            } else {
                println!(
                    "⚠️ PDF 파일 {}개 발견 (예상: {}개, {})",
                    pdfs,
                    EXPECTED_PDF_COUNT,
                    config.data_dir.display()
                );
            }
        }
        Err(e) => {
            println!("❌ {}", e);
            ok = false;
        }
    }

    match open_store(config).and_then(|store| {
        let collections = store.list_collections()?;
        let chunks = match store.get_collection(collection::DOCUMENTS) {
            Ok(documents) => Some(documents.count()?),
            Err(_) => None,
        };
        Ok((collections, chunks))
    }) {
        Ok((collections, chunks)) => {
            println!(
                "✅ 벡터 저장소 접근 가능 ({}, 컬렉션 {}개)",
                config.chroma_dir.display(),
                collections.len()
            );
            match chunks {
                Some(count) => println!("✅ 문서 인덱스: {}개 청크", count),
                None => {
                    println!("⚠️ 문서 인덱스가 없습니다. `study-agent index`를 먼저 실행하세요.")
                }
            }
        }
        Err(e) => {
            println!("❌ 벡터 저장소 오류: {:#}", e);
            ok = false;
        }
    }

    println!("{}", "=".repeat(50));
    if ok {
        println!("🎉 모든 확인 완료!");
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        let cli = Cli::try_parse_from(["study-agent", "serve", "--port", "9000"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Serve { port: Some(9000), host: None })
        ));

        let cli = Cli::try_parse_from(["study-agent", "ask", "ReAct가 뭐야?"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Ask { ref question }) if question == "ReAct가 뭐야?"
        ));

        let cli = Cli::try_parse_from(["study-agent", "query"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Query { question: None })));

        assert!(Cli::try_parse_from(["study-agent"]).unwrap().command.is_none());
        assert!(Cli::try_parse_from(["study-agent", "ask"]).is_err());
    }

    #[test]
    fn test_exit_words_and_key_requirement() {
        assert!(is_exit("quit"));
        assert!(is_exit("EXIT"));
        assert!(is_exit("종료"));
        assert!(!is_exit("quitting"));

        assert!(requires_api_key(&Commands::Chat));
        assert!(requires_api_key(&Commands::Index));
        assert!(!requires_api_key(&Commands::Check));
    }

    #[tokio::test]
    async fn test_check_reports_missing_setup() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            openai_api_key: String::new(),
            data_dir: dir.path().join("missing"),
            chroma_dir: dir.path().join("chroma"),
            ..Config::default()
        };
        assert!(!check(&config).await);
    }
}
