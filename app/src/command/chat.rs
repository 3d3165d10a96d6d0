//! Conversation command: one-shot (`-m`) or an interactive loop.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flowchat_config::Config;
use flowchat_conversation::{
    RequestBuilder, Session, SessionOption, TurnEvent, TurnOrchestrator, TurnOutcome,
    UploadHandler,
};
use flowchat_core::{FlowError, Role};
use flowchat_providers::{DriveStore, WorkflowClient};
use tracing::{debug, info};

/// Input parameters for the Chat command strategy.
#[derive(Debug, Clone)]
pub struct ChatInput {
    pub config_path: Option<PathBuf>,
    /// Optional single message to send (non-interactive mode)
    pub message: Option<String>,
    /// Optional file to upload first
    pub file: Option<PathBuf>,
    pub no_rag: bool,
    pub system_prompt: Option<String>,
}

/// Strategy for executing the Chat command.
#[derive(Debug, Clone, Copy)]
pub struct ChatStrategy;

impl super::CommandStrategy for ChatStrategy {
    type Input = ChatInput;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        let config = Config::load(input.config_path.as_deref())?;
        let chat = ChatSession::new(config, &input)?;

        if let Some(path) = &input.file {
            chat.upload(path).await?;
        }

        if let Some(msg) = input.message {
            chat.ask(&msg).await?;
        } else {
            chat.run_interactive().await?;
        }
        Ok(())
    }
}

/// What one line typed at the prompt asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Line<'a> {
    Empty,
    Exit,
    Help,
    History,
    Reset,
    Upload(&'a str),
    Set { key: &'a str, value: &'a str },
    Unknown(&'a str),
    Query(&'a str),
}

fn parse_line(input: &str) -> Line<'_> {
    let input = input.trim();
    if input.is_empty() {
        return Line::Empty;
    }
    if matches!(input, "exit" | "quit" | "q") {
        return Line::Exit;
    }
    let Some(command) = input.strip_prefix('/') else {
        return Line::Query(input);
    };

    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map_or((command, ""), |(name, rest)| (name, rest.trim()));
    match name {
        "help" => Line::Help,
        "history" => Line::History,
        "reset" => Line::Reset,
        "upload" if !rest.is_empty() => Line::Upload(rest),
        "set" if !rest.is_empty() => {
            let (key, value) = rest
                .split_once(char::is_whitespace)
                .map_or((rest, ""), |(key, value)| (key, value.trim()));
            Line::Set { key, value }
        }
        _ => Line::Unknown(input),
    }
}

const HELP: &str = "\
Commands:
  /upload PATH        upload a file and use it for the following questions
  /set KEY VALUE      set is_rag (on|off) or system_prompt (empty clears it)
  /history            show the conversation so far
  /reset              clear the conversation, the file and the options
  /help               show this help
  exit | quit | q     leave";

struct ChatSession {
    config: Config,
    session: Arc<Session>,
    orchestrator: TurnOrchestrator,
}

impl ChatSession {
    fn new(config: Config, input: &ChatInput) -> anyhow::Result<Self> {
        let (base_url, api_key) = config
            .workflow_credentials()
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;
        let backend = WorkflowClient::new(base_url, api_key)
            .with_connect_retries(config.workflow.connect_retries);

        // Command-line overrides become the session defaults so /reset keeps them
        let mut defaults = config.session_options();
        if input.no_rag {
            defaults.is_rag = false;
        }
        if let Some(prompt) = &input.system_prompt {
            defaults.system_prompt = Some(prompt.clone());
        }
        let session = Session::shared(defaults);

        let orchestrator =
            TurnOrchestrator::new(session.clone(), Arc::new(backend), Arc::new(config.noise_table()?))
                .with_request_builder(RequestBuilder::new(config.workflow.user_id.clone()))
                .with_idle_timeout(config.workflow.idle_timeout());

        Ok(Self {
            config,
            session,
            orchestrator,
        })
    }

    /// Storage is only required once the user uploads something.
    fn upload_handler(&self) -> Result<UploadHandler, FlowError> {
        let storage = &self.config.storage;
        let store = DriveStore::new(self.config.storage_token()?)
            .with_upload_url(storage.upload_url.clone())
            .with_api_url(storage.api_url.clone());

        Ok(UploadHandler::new(self.session.clone(), Arc::new(store))
            .with_prefix(self.config.folder_id())
            .with_public_visibility(storage.make_public))
    }

    async fn upload(&self, path: &Path) -> anyhow::Result<()> {
        let handler = self
            .upload_handler()
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let receipt = handler
            .handle_upload(&name, bytes)
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;

        match &receipt.object.web_link {
            Some(link) => println!("✅ Uploaded {}: {link}", receipt.object.name),
            None => println!("✅ Uploaded. File ID: {}", receipt.object_id()),
        }
        if let Some(warning) = &receipt.visibility_warning {
            eprintln!("⚠️  {}", warning.user_message());
        }
        Ok(())
    }

    /// Run one turn, streaming fragments to stdout.
    async fn ask(&self, query: &str) -> anyhow::Result<()> {
        let mut stdout = std::io::stdout();
        let mut streamed = false;

        let result = self
            .orchestrator
            .submit(query, |event| match event {
                TurnEvent::Fragment(text) => {
                    streamed = true;
                    print!("{text}");
                    if let Err(e) = stdout.flush() {
                        debug!("Failed to flush stdout: {e}");
                    }
                }
                TurnEvent::Finished { .. } => println!(),
                TurnEvent::Failed { .. } => {
                    if streamed {
                        println!();
                    }
                }
            })
            .await;

        match result {
            Ok(TurnOutcome::Answered(_)) => Ok(()),
            Ok(TurnOutcome::Discarded) => {
                println!("\n(conversation was reset, answer discarded)");
                Ok(())
            }
            Err(e) => Err(anyhow::anyhow!(e.user_message())),
        }
    }

    fn print_history(&self) {
        let state = self.session.snapshot();
        println!(
            "(session started {})",
            self.session.created_at().format("%Y-%m-%d %H:%M:%S UTC")
        );
        if state.transcript().is_empty() {
            println!("(no messages yet)");
        }
        for exchange in state.transcript() {
            let who = match exchange.role {
                Role::User => "you",
                Role::Assistant => "assistant",
            };
            println!("[{who}] {}", exchange.text);
        }
        if let Some(file) = state.file_object_id() {
            println!("(file: {file})");
        }
        let options = state.options();
        println!(
            "(is_rag: {}, system_prompt: {})",
            options.is_rag,
            options.system_prompt.as_deref().unwrap_or("-")
        );
    }

    async fn run_interactive(&self) -> anyhow::Result<()> {
        println!("=== flowchat session: {} ===", self.session.id());
        println!("Type /help for commands, 'exit' to leave.\n");
        if let Some(greeting) = &self.config.session.greeting {
            println!("{greeting}\n");
        }

        loop {
            print!("> ");
            std::io::stdout().flush()?;

            let mut input = String::new();
            if std::io::stdin().read_line(&mut input)? == 0 {
                break;
            }

            match parse_line(&input) {
                Line::Empty => {}
                Line::Exit => break,
                Line::Help => println!("{HELP}"),
                Line::History => self.print_history(),
                Line::Reset => {
                    self.session.reset();
                    println!("Conversation cleared.");
                    if let Some(greeting) = &self.config.session.greeting {
                        println!("{greeting}");
                    }
                }
                Line::Upload(path) => {
                    if let Err(e) = self.upload(Path::new(path)).await {
                        eprintln!("Error: {e}");
                    }
                }
                Line::Set { key, value } => match SessionOption::parse(key, value) {
                    Ok(option) => {
                        self.session.set_option(option);
                        println!("Option {key} updated.");
                    }
                    Err(e) => eprintln!("Error: {}", e.user_message()),
                },
                Line::Unknown(command) => {
                    eprintln!("Unknown command: {command}. Type /help for the list.");
                }
                Line::Query(query) => {
                    if let Err(e) = self.ask(query).await {
                        eprintln!("Error: {e}");
                    }
                    println!();
                }
            }
        }

        info!(
            "Conversation ended: {} turns",
            self.session.snapshot().turn_count()
        );
        Ok(())
    }
}
