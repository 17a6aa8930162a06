use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use chatd::{
    default_chatd_dir, ChatId, ChatStore, ChatdDirectory, Config, ConfigStore, StoreError,
};

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Storage root directory (defaults to ~/.chatd)
    #[clap(long, env = "CHATD_ROOT")]
    root: Option<PathBuf>,

    /// Enable debug logging to stderr
    #[clap(long)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List saved chats
    List,

    /// Create a new empty chat
    New {
        /// System prompt for the chat (defaults to the configured one)
        #[clap(long)]
        system_prompt: Option<String>,
    },

    /// Print a chat transcript
    Show { id: String },

    /// Rename a chat
    Rename { id: String, title: String },

    /// Delete a chat (safe to repeat)
    Delete { id: String },

    /// Reconcile the chat index with the transcript files on disk
    Repair,

    /// Show or edit the configuration
    Config {
        #[clap(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the current configuration
    Show,

    /// Update configuration fields
    Set {
        #[clap(long)]
        system_prompt: Option<String>,

        #[clap(long)]
        api_base_url: Option<String>,

        #[clap(long)]
        api_key: Option<String>,
    },
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        tracing_subscriber::filter::LevelFilter::DEBUG
    } else {
        tracing_subscriber::filter::LevelFilter::WARN
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(level)
        .init();
}

/// Load config, falling back to defaults with a surfaced warning if the
/// persisted file is corrupt. I/O failures still propagate.
fn load_config_or_defaults(config_store: &ConfigStore) -> Result<Config> {
    match config_store.load() {
        Ok(config) => Ok(config),
        Err(e @ StoreError::CorruptConfig { .. }) => {
            warn!("{}", e);
            eprintln!("warning: {}; using default configuration", e);
            Ok(Config::default())
        }
        Err(e) => Err(e.into()),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose);

    let dir = match args.root {
        Some(root) => ChatdDirectory::new(root),
        None => default_chatd_dir().context("Could not determine home directory")?,
    };
    info!("Using storage root: {}", dir.root.display());

    let config_store = ConfigStore::new(dir.clone());
    let chat_store = ChatStore::new(dir);

    match args.command {
        Command::List => {
            let chats = chat_store.list_chats()?;
            if chats.is_empty() {
                println!("No chats.");
            }
            for entry in chats {
                println!("{}  {}", entry.id, entry.title);
            }
        }

        Command::New { system_prompt } => {
            let prompt = match system_prompt {
                Some(prompt) => prompt,
                None => load_config_or_defaults(&config_store)?.system_prompt,
            };
            let record = chat_store.create_chat(&prompt)?;
            println!("{}", record.id);
        }

        Command::Show { id } => {
            let record = chat_store.load_chat(&ChatId::from(id))?;
            println!("# {}", record.title);
            for message in &record.messages {
                println!("[{}] {}", message.role, message.content);
            }
        }

        Command::Rename { id, title } => {
            chat_store.rename_chat(&ChatId::from(id), &title)?;
        }

        Command::Delete { id } => {
            chat_store.delete_chat(&ChatId::from(id))?;
        }

        Command::Repair => {
            let report = chat_store.repair_index()?;
            if report.is_clean() {
                println!("Index is consistent.");
            } else {
                for entry in &report.dropped {
                    println!("dropped: {}  {}", entry.id, entry.title);
                }
                for entry in &report.added {
                    println!("added:   {}  {}", entry.id, entry.title);
                }
            }
        }

        Command::Config { command } => match command {
            ConfigCommand::Show => {
                let config = config_store.load()?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            ConfigCommand::Set {
                system_prompt,
                api_base_url,
                api_key,
            } => {
                let mut config = load_config_or_defaults(&config_store)?;
                if let Some(system_prompt) = system_prompt {
                    config.system_prompt = system_prompt;
                }
                if let Some(api_base_url) = api_base_url {
                    config.api_base_url = api_base_url;
                }
                if let Some(api_key) = api_key {
                    config.api_key = api_key;
                }
                config_store.save(&config)?;
            }
        },
    }

    Ok(())
}
