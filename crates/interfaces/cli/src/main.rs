use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use orchestrator_config::AppConfig;
use orchestrator_flows::{Flows, MailLimits};
use orchestrator_llm::OpenAiCompatibleClient;
use orchestrator_memory::JsonlMemoryStore;
use orchestrator_runtime::Orchestrator;
use orchestrator_services::calendar::{CalendarService, GoogleCalendarService};
use orchestrator_services::mail::{GmailService, MailService};
use orchestrator_services::oauth::RefreshTokenSource;
use orchestrator_services::task_board::{TaskBoardService, TrelloService};
use orchestrator_tools::builtins::calendar::{CalendarCancelTool, CalendarCreateTool, CalendarModifyTool, CalendarNoteTool};
use orchestrator_tools::builtins::mail::MailSendTool;
use orchestrator_tools::builtins::task_board::{TaskBoardDispatchTool, TaskBoardListTool, TaskBoardLookupTool};
use orchestrator_tools::ToolRegistry;
use orchestrator_webhook::{AppState, TelegramMessagingClient};

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Parser)]
#[command(name = "orchestrator", version, about = "Conversational assistant turn orchestrator")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config/default.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Boot the webhook server and start handling turns.
    Serve,
    /// Print the effective configuration and exit.
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Serve => serve(config).await,
    }
}

async fn serve(config: AppConfig) -> Result<()> {
    if config.mail.refresh_token.is_empty() || config.calendar.refresh_token.is_empty() {
        bail!("mail and calendar refresh tokens must be set (MAIL_REFRESH_TOKEN / CALENDAR_REFRESH_TOKEN or config file)");
    }
    if config.task_board.api_token.is_empty() {
        bail!("task board api token must be set (TASK_BOARD_API_TOKEN or config file)");
    }

    let mail_tokens = Arc::new(RefreshTokenSource::new(
        GOOGLE_TOKEN_URL,
        config.mail.client_id.clone(),
        config.mail.client_secret.clone(),
        config.mail.refresh_token.clone(),
    ));
    let calendar_tokens = Arc::new(RefreshTokenSource::new(
        GOOGLE_TOKEN_URL,
        config.calendar.client_id.clone(),
        config.calendar.client_secret.clone(),
        config.calendar.refresh_token.clone(),
    ));

    let mail: Arc<dyn MailService> = Arc::new(GmailService::new(mail_tokens));
    let calendar: Arc<dyn CalendarService> = Arc::new(GoogleCalendarService::new(calendar_tokens, config.calendar.calendar_id.clone()));
    let task_board: Arc<dyn TaskBoardService> = Arc::new(TrelloService::new(config.task_board.api_key.clone(), config.task_board.api_token.clone()));

    let mut tools = ToolRegistry::default();
    tools.register(Box::new(MailSendTool::new(mail.clone())));
    tools.register(Box::new(CalendarCreateTool::new(calendar.clone())));
    tools.register(Box::new(CalendarModifyTool::new(calendar.clone())));
    tools.register(Box::new(CalendarCancelTool::new(calendar.clone())));
    tools.register(Box::new(CalendarNoteTool::new(calendar.clone())));
    tools.register(Box::new(TaskBoardDispatchTool::new(task_board.clone())));
    tools.register(Box::new(TaskBoardLookupTool::new(task_board.clone())));
    tools.register(Box::new(TaskBoardListTool::new(task_board.clone())));
    let tools = Arc::new(tools);

    let data_dir = std::path::Path::new(config.data_dir());
    std::fs::create_dir_all(data_dir)?;

    let mail_limits = MailLimits {
        list_page_size: config.mail.list_page_size as u32,
        max_scan: config.mail.max_scan,
        max_per_turn_delete: config.bulk.mail_max_per_turn_delete,
        max_per_turn_mark_read: config.bulk.mail_max_per_turn_mark_read,
    };
    let flows = Flows::new(data_dir, mail.clone(), mail_limits, calendar.clone(), task_board.clone(), tools.clone());

    let llm = Arc::new(OpenAiCompatibleClient::new(
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        config.llm.api_key.clone(),
    ));

    let memory = Arc::new(JsonlMemoryStore::new(data_dir.join("memory_log.jsonl"), data_dir.join("memory_summaries.json")));

    let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();
    if bot_token.is_empty() {
        bail!("TELEGRAM_BOT_TOKEN must be set");
    }
    let messaging = Arc::new(TelegramMessagingClient::new(bot_token));

    let orchestrator = Arc::new(Orchestrator::new(config.clone(), flows, llm, tools, memory));
    let state = AppState::new(config, orchestrator, messaging, None, None);
    orchestrator_webhook::run(state).await
}
