//! Parley application binary - composition root.
//!
//! Ties together all Parley crates into a single executable:
//! 1. Load configuration from TOML and apply CLI overrides
//! 2. Open the SQLite database and seed the FAQ knowledge base
//! 3. Build the chat orchestrator (knowledge -> generative -> templates)
//! 4. Run the requested command: interactive chat, one-shot ask, FAQ
//!    management, or statistics

mod cli;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use parley_chat::{AnalyticsTracker, ChatOrchestrator, NoopSink, StorageMetricSink};
use parley_core::config::{GeneralConfig, ParleyConfig};
use parley_llm::OpenAiCompletionClient;
use parley_storage::{
    ConversationRepository, Database, KnowledgeRepository, MetricsRepository, ProfileUpdate,
    UserRepository,
};

use cli::{CliArgs, Command, FaqCommand, UserCommand};

/// Words that end an interactive session without a farewell turn.
const QUIT_WORDS: [&str; 3] = ["quit", "exit", "q"];

/// Database window attached to a chat session's exported dashboard.
const CHAT_EXPORT_DAYS: u32 = 7;

/// Expand ~ to home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") || data_dir.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}

/// Build the orchestrator with every collaborator the configuration asks for.
///
/// A missing API key disables the generative stage instead of failing startup.
fn build_orchestrator(
    mut config: ParleyConfig,
    db: &Arc<Database>,
) -> Result<ChatOrchestrator, parley_chat::ChatError> {
    let mut builder = ChatOrchestrator::builder(config.clone());

    if config.pipeline.generative_enabled {
        match OpenAiCompletionClient::from_env(&config.generative) {
            Ok(client) => {
                tracing::info!(model = %client.model(), "Generative stage enabled");
                builder = builder.completion_service(Arc::new(client));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Generative stage disabled");
                config.pipeline.generative_enabled = false;
                builder = ChatOrchestrator::builder(config);
            }
        }
    }

    builder
        .knowledge_store(Arc::new(KnowledgeRepository::new(Arc::clone(db))))
        .metric_sink(Arc::new(StorageMetricSink::new(MetricsRepository::new(
            Arc::clone(db),
        ))))
        .conversation_log(ConversationRepository::new(Arc::clone(db)))
        .build()
}

/// Interactive stdin conversation.
async fn run_chat(
    orchestrator: &ChatOrchestrator,
    general: &GeneralConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}: {}", general.bot_name, general.greeting);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut session = None;

    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if QUIT_WORDS.contains(&text.to_lowercase().as_str()) {
            println!("{}: {}", general.bot_name, general.farewell_message);
            break;
        }

        match orchestrator.process_text(text, session).await {
            Ok(turn) => {
                session = Some(turn.session_id);
                tracing::debug!(
                    intent = %turn.intent,
                    confidence = turn.confidence,
                    method = %turn.method,
                    "Reply ready"
                );
                println!("{}: {}", general.bot_name, turn.response_text);
                if turn.ends_conversation() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Turn rejected");
                println!(
                    "{}: {}",
                    general.bot_name,
                    orchestrator.selector().templates().error_response()
                );
            }
        }
    }

    orchestrator.flush_metrics().await;
    let stats = orchestrator.analytics().session_statistics();
    tracing::info!(
        queries = stats.total_queries,
        success_rate = stats.success_rate,
        "Chat session finished"
    );
    Ok(())
}

/// Write a metrics dashboard for `tracker`, with database figures when
/// they can be computed.
fn export_dashboard(
    tracker: &AnalyticsTracker,
    metrics: &MetricsRepository,
    days: u32,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let database_stats = match metrics.database_statistics(days) {
        Ok(stats) => Some(stats),
        Err(e) => {
            tracing::warn!(error = %e, "Database statistics unavailable for export");
            None
        }
    };
    tracker.export(path, database_stats)?;
    Ok(())
}

fn parse_preferences(raw: Option<&str>) -> Result<Option<serde_json::Value>, Box<dyn std::error::Error>> {
    match raw {
        None => Ok(None),
        Some(raw) => {
            let value: serde_json::Value = serde_json::from_str(raw)?;
            if !value.is_object() {
                return Err("preferences must be a JSON object".into());
            }
            Ok(Some(value))
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(path: &Path) -> (ParleyConfig, Option<String>) {
    if !path.exists() {
        return (ParleyConfig::default(), None);
    }
    match ParleyConfig::load(path) {
        Ok(config) => (config, None),
        Err(e) => (ParleyConfig::default(), Some(e.to_string())),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let (mut config, load_error) = load_config(&config_file);
    args.apply_overrides(&mut config);

    // Tracing. Logs go to stderr so JSON output stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Parley v{}", env!("CARGO_PKG_VERSION"));
    match load_error {
        Some(e) => tracing::warn!(path = %config_file.display(), error = %e, "Failed to load config. Using defaults."),
        None => tracing::debug!(path = %config_file.display(), "Configuration resolved"),
    }

    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }

    // Storage.
    let data_dir = resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    let db_path = data_dir.join(&config.storage.db_file);
    let db = Arc::new(Database::new(&db_path)?);

    let knowledge = KnowledgeRepository::new(Arc::clone(&db));
    if config.storage.seed_default_faqs {
        let seeded = knowledge.seed_defaults()?;
        if seeded > 0 {
            tracing::info!(count = seeded, "Default FAQs seeded");
        }
    }

    match args.resolve_command() {
        Command::Chat { export } => {
            let orchestrator = build_orchestrator(config.clone(), &db)?;
            run_chat(&orchestrator, &config.general).await?;
            if let Some(path) = export {
                export_dashboard(
                    orchestrator.analytics(),
                    &MetricsRepository::new(Arc::clone(&db)),
                    CHAT_EXPORT_DAYS,
                    &path,
                )?;
            }
        }
        Command::Ask { text } => {
            let orchestrator = build_orchestrator(config.clone(), &db)?;
            let turn = orchestrator.process_text(&text.join(" "), None).await?;
            orchestrator.flush_metrics().await;
            print_json(&turn)?;
        }
        Command::Faq { action } => match action {
            FaqCommand::List => print_json(&knowledge.list()?)?,
            FaqCommand::Add {
                question,
                answer,
                category,
                keywords,
            } => {
                let record = knowledge.add(&question, &answer, &category, &keywords)?;
                tracing::info!(id = record.id, "FAQ added");
                print_json(&record)?;
            }
        },
        Command::Stats { days, export } => {
            let metrics = MetricsRepository::new(Arc::clone(&db));
            print_json(&metrics.database_statistics(days)?)?;
            if let Some(path) = export {
                // A fresh tracker: this process has served no queries.
                let tracker = AnalyticsTracker::new(Arc::new(NoopSink));
                export_dashboard(&tracker, &metrics, days, &path)?;
            }
        }
        Command::User { action } => {
            let users = UserRepository::new(Arc::clone(&db));
            match action {
                UserCommand::Show { user_id } => match users.get(&user_id)? {
                    Some(profile) => print_json(&profile)?,
                    None => {
                        tracing::warn!(user_id = %user_id, "No such user");
                        return Err(format!("user '{}' not found", user_id).into());
                    }
                },
                UserCommand::Set {
                    user_id,
                    name,
                    email,
                    phone,
                    preferences,
                } => {
                    let preferences = parse_preferences(preferences.as_deref())?;
                    let profile = users.upsert(
                        &user_id,
                        &ProfileUpdate {
                            name: name.as_deref(),
                            email: email.as_deref(),
                            phone: phone.as_deref(),
                            preferences: preferences.as_ref(),
                        },
                    )?;
                    print_json(&profile)?;
                }
            }
        }
    }

    Ok(())
}
