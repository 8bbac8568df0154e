//! Address book CLI
//!
//! Usage:
//!   addressbook              - Interactive shell on stdin
//!   addressbook shell        - Same as above
//!   addressbook run <script> - Execute a file of commands

mod command;
mod interpreter;
mod session;

use std::fs::File;
use std::io::{self, BufReader, IsTerminal};
use std::path::PathBuf;

use addressbook_store::{RecordStore, StoreConfig, DEFAULT_FILE_PREFIX, DEFAULT_FOLDER};
use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::interpreter::Interpreter;
use crate::session::KeySource;

#[derive(Parser)]
#[command(name = "addressbook")]
#[command(author = "HeyBattle1")]
#[command(version)]
#[command(about = "Encrypted per-user address book", long_about = None)]
struct Cli {
    /// Folder holding one encrypted file per user
    #[arg(long, global = true, env = "ADDRESSBOOK_DATA_DIR", default_value = DEFAULT_FOLDER)]
    data_dir: PathBuf,

    /// File name prefix placed before the user id
    #[arg(
        long,
        global = true,
        env = "ADDRESSBOOK_FILE_PREFIX",
        default_value = DEFAULT_FILE_PREFIX
    )]
    file_prefix: String,

    /// How login passwords are turned into keys
    #[arg(long, global = true, value_enum, default_value_t = KeySource::Passphrase)]
    key_source: KeySource,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read commands from stdin (type HLP for the list)
    Shell,
    /// Execute the commands in a file
    Run {
        /// Script with one command per line
        script: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so replies on stdout stay parseable
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    let config = StoreConfig::new(&cli.data_dir).with_file_prefix(&cli.file_prefix);
    info!(folder = %config.folder.display(), "opening address book");
    let mut interpreter = Interpreter::new(RecordStore::new(config), cli.key_source);

    match cli.command.unwrap_or(Commands::Shell) {
        Commands::Shell => {
            let stdin = io::stdin();
            let prompt = stdin.is_terminal().then_some("> ");
            interpreter
                .run(stdin.lock(), io::stdout().lock(), prompt)
                .context("shell I/O failed")?;
        }

        Commands::Run { script } => {
            let file = File::open(&script)
                .with_context(|| format!("cannot open script {}", script.display()))?;
            interpreter
                .run(BufReader::new(file), io::stdout().lock(), None)
                .with_context(|| format!("failed while running {}", script.display()))?;
        }
    }

    if let Some(user) = interpreter.session_user() {
        info!(user, "input ended without LOU");
    }
    Ok(())
}
