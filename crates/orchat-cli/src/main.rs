mod render;

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::*;
use orchat_common::{
    AppConfig, ChatThread, DEFAULT_THREAD_TITLE, ModelDescriptor, StorageBackend, ThreadUpdate,
};
use orchat_llm::{ChatSession, OpenRouterClient, TurnStatus};
use orchat_memory::{
    MemoryThreadStore, NewThread, SurrealConfig, SurrealThreadStore, ThreadStore,
};
use orchat_tools::{DuckDuckGoSearch, SearchBackend, TavilySearch, ToolRegistry, WebSearchTool};
use render::{
    filter_models, print_history, print_models, print_outcome, print_threads,
    spawn_turn_renderer,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use termimad::MadSkin;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for the Orchat CLI
#[derive(Parser)]
#[command(
    name = "orchat",
    about = "Orchat - streaming OpenRouter chat with web search"
)]
pub struct Args {
    /// Model id to chat with (defaults to the configured model)
    #[clap(short, long)]
    model: Option<String>,

    /// Resume an existing thread by id
    #[clap(short, long)]
    thread: Option<String>,

    /// Path to the configuration file
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Keep threads in memory only
    #[clap(long)]
    memory: bool,

    /// List tool-capable models and exit
    #[clap(long)]
    list_models: bool,

    /// Enable debug mode
    #[clap(short, long)]
    debug: bool,
}

fn init_tracing(config: &AppConfig, debug: bool) -> Result<()> {
    let default_level = if debug { "debug" } else { config.log_level.as_str() };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init()
        .context("Failed to install tracing subscriber")
}

async fn open_store(config: &AppConfig, in_memory: bool) -> Result<Arc<dyn ThreadStore>> {
    let storage = &config.storage;
    let backend = if in_memory {
        StorageBackend::InMemory
    } else {
        storage.backend
    };

    let store: Arc<dyn ThreadStore> = match backend {
        StorageBackend::InMemory => Arc::new(MemoryThreadStore::new()),
        StorageBackend::SurrealMemory => Arc::new(
            SurrealThreadStore::new(SurrealConfig::Memory {
                namespace: storage.namespace.clone(),
                database: storage.database.clone(),
            })
            .await?,
        ),
        StorageBackend::SurrealFile => {
            if let Some(parent) = storage.path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create data directory: {:?}", parent))?;
            }
            Arc::new(
                SurrealThreadStore::new(SurrealConfig::File {
                    path: storage.path.clone(),
                    namespace: storage.namespace.clone(),
                    database: storage.database.clone(),
                })
                .await?,
            )
        }
    };

    info!("Thread storage: {:?}", backend);
    Ok(store)
}

fn build_tools(config: &AppConfig) -> Arc<ToolRegistry> {
    let search = &config.search;
    let backend: Arc<dyn SearchBackend> = match &search.tavily_api_key {
        Some(key) if !key.trim().is_empty() => Arc::new(
            TavilySearch::new(key.clone())
                .with_max_results(search.max_results)
                .with_search_depth(search.search_depth.clone()),
        ),
        _ => Arc::new(DuckDuckGoSearch::new().with_max_results(search.max_results)),
    };
    debug!("Web search backend: {}", backend.name());

    Arc::new(ToolRegistry::new().with_tool(WebSearchTool::new(backend)))
}

fn read_line(prompt: &str) -> Result<Option<String>> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}

/// REPL state: the active session plus what is needed to open others
struct App {
    store: Arc<dyn ThreadStore>,
    client: Arc<OpenRouterClient>,
    tools: Arc<ToolRegistry>,
    models: Vec<ModelDescriptor>,
    config: AppConfig,
    session: ChatSession,
    skin: MadSkin,
}

impl App {
    async fn open_session(&self, thread_id: &str, model: ModelDescriptor) -> Result<ChatSession> {
        Ok(ChatSession::open(thread_id, model, self.client.clone(), self.store.clone())
            .await
            .with_context(|| format!("Failed to open thread {}", thread_id))?
            .with_tools(self.tools.clone())
            .with_config(self.config.conversation.clone()))
    }

    fn find_model(&self, id: &str) -> Option<ModelDescriptor> {
        self.models.iter().find(|m| m.id == id).cloned()
    }

    async fn thread_by_number(&self, arg: &str) -> Result<ChatThread> {
        let n: usize = arg
            .trim()
            .parse()
            .with_context(|| format!("Not a thread number: '{}'", arg))?;
        let threads = self.store.list_threads().await?;
        n.checked_sub(1)
            .and_then(|i| threads.into_iter().nth(i))
            .with_context(|| format!("No thread #{}", n))
    }

    async fn new_thread(&mut self) -> Result<()> {
        let model = self.session.model().clone();
        let thread_id = self
            .store
            .create_thread(NewThread::new(DEFAULT_THREAD_TITLE, model.id.clone()))
            .await?;
        self.session = self.open_session(&thread_id, model).await?;
        println!("{}", "🆕 Started a new thread.".bright_green());
        Ok(())
    }

    async fn switch_thread(&mut self, arg: &str) -> Result<()> {
        let thread = self.thread_by_number(arg).await?;
        let model = self
            .find_model(&thread.model_id)
            .unwrap_or_else(|| self.session.model().clone());
        self.session = self.open_session(&thread.id, model).await?;
        println!(
            "{}",
            format!("📂 Switched to '{}'", thread.title).bright_green()
        );
        print_history(&self.session.messages().await, &self.skin);
        Ok(())
    }

    async fn delete_thread(&mut self, arg: &str) -> Result<()> {
        let thread = self.thread_by_number(arg).await?;
        self.store.delete_thread(&thread.id).await?;
        println!("{}", format!("🗑  Deleted '{}'", thread.title).bright_yellow());
        if thread.id == self.session.thread_id() {
            self.new_thread().await?;
        }
        Ok(())
    }

    async fn set_model(&mut self, id: &str) -> Result<()> {
        let Some(model) = self.find_model(id) else {
            bail!("Unknown model '{}'. Try /models to search the catalog.", id);
        };
        if !model.supports_tools {
            println!(
                "{}",
                "⚠️  This model does not support tools; web search is disabled.".yellow()
            );
        }

        let update = ThreadUpdate {
            model_id: Some(model.id.clone()),
            ..Default::default()
        };
        if let Err(e) = self.store.update_thread(self.session.thread_id(), update).await {
            warn!("Failed to record model change: {}", e);
        }

        println!("{}", format!("🤖 Now using {}", model.name).bright_green());
        self.session.set_model(model);
        Ok(())
    }

    async fn show_cost(&self) -> Result<()> {
        let messages = self.session.messages().await;
        let total = orchat_common::total_cost(&messages);
        let turns = messages.iter().filter(|m| m.cost.is_some()).count();
        println!(
            "{} {}",
            "Thread cost:".bright_yellow(),
            format!("${:.6} over {} replies", total, turns).bright_white()
        );
        Ok(())
    }

    async fn send(&self, input: &str) {
        print!("{} ", "Assistant:".bright_green().bold());
        let _ = io::stdout().flush();

        let renderer = spawn_turn_renderer(self.session.subscribe_to_events());

        let cancel = CancellationToken::new();
        let interrupt = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let outcome = self.session.send_message_with_cancel(input, cancel).await;
        interrupt.abort();

        if outcome.status == TurnStatus::Ignored {
            renderer.abort();
        } else {
            let _ = renderer.await;
        }
        print_outcome(&outcome);
    }

    /// Handle one REPL line. Returns false when the user quits.
    async fn handle(&mut self, input: &str) -> Result<bool> {
        let (command, arg) = match input.split_once(' ') {
            Some((command, arg)) => (command, arg.trim()),
            None => (input, ""),
        };

        match command {
            "/quit" | "/exit" => return Ok(false),
            "/new" => self.new_thread().await?,
            "/threads" => {
                let threads = self.store.list_threads().await?;
                print_threads(&threads, self.session.thread_id());
            }
            "/switch" => self.switch_thread(arg).await?,
            "/delete" => self.delete_thread(arg).await?,
            "/models" => print_models(&filter_models(&self.models, arg)),
            "/model" if arg.is_empty() => {
                let model = self.session.model();
                println!("{} ({})", model.name.bright_green().bold(), model.id.bright_blue());
            }
            "/model" => self.set_model(arg).await?,
            "/history" => print_history(&self.session.messages().await, &self.skin),
            "/cost" => self.show_cost().await?,
            _ if command.starts_with('/') => {
                println!("{}", format!("Unknown command: {}", command).red());
                print_help();
            }
            _ => self.send(input).await,
        }
        Ok(true)
    }
}

fn print_help() {
    println!(
        "{}",
        "/new  /threads  /switch <n>  /delete <n>  /models [filter]  /model <id>  /history  /cost  /quit"
            .dimmed()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => AppConfig::config_path()?,
    };
    let mut config = AppConfig::load(&config_path)?;
    config.apply_env();

    init_tracing(&config, args.debug)?;
    debug!("Loaded configuration from {:?}", config_path);

    let client = Arc::new(
        OpenRouterClient::from_config(&config.provider).context("Failed to set up OpenRouter")?,
    );
    let models = client
        .fetch_models()
        .await
        .context("Failed to fetch the model catalog; check your API key")?;

    if args.list_models {
        let capable: Vec<&ModelDescriptor> = models.iter().filter(|m| m.supports_tools).collect();
        print_models(&capable);
        return Ok(());
    }

    let model_id = args
        .model
        .clone()
        .unwrap_or_else(|| config.provider.default_model.clone());
    let Some(model) = models.iter().find(|m| m.id == model_id).cloned() else {
        bail!("Unknown model '{}'. Use --list-models to see options.", model_id);
    };

    let store = open_store(&config, args.memory).await?;
    let tools = build_tools(&config);

    let thread_id = match &args.thread {
        Some(id) => {
            if store.get_thread(id).await?.is_none() {
                bail!("No thread with id {}", id);
            }
            id.clone()
        }
        None => {
            store
                .create_thread(NewThread::new(DEFAULT_THREAD_TITLE, model.id.clone()))
                .await?
        }
    };

    info!("Starting Orchat with model {}", model.id);

    let session = ChatSession::open(&thread_id, model, client.clone(), store.clone())
        .await?
        .with_tools(tools.clone())
        .with_config(config.conversation.clone());

    let mut app = App {
        store,
        client,
        tools,
        models,
        config,
        session,
        skin: MadSkin::default(),
    };

    println!(
        "{}",
        format!(
            "💬 Chatting with {}. Type /quit to exit, Ctrl-C cancels a reply.",
            app.session.model().name
        )
        .bright_green()
    );
    print_help();
    println!();

    if args.thread.is_some() {
        print_history(&app.session.messages().await, &app.skin);
    }

    while let Some(input) = read_line(&format!("{}", "You: ".bright_cyan().bold()))? {
        if input.is_empty() {
            continue;
        }
        match app.handle(&input).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => println!("{}", format!("❌ {}", e).red()),
        }
    }

    println!("{}", "👋 Goodbye!".bright_green());
    Ok(())
}
