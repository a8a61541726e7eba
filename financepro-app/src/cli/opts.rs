use clap::{Args, Parser, Subcommand};
use financepro_json::DEFAULT_MAX_BACKUPS;
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;

#[derive(Debug, Parser, Clone)]
#[command(name = "financepro", version, about = "FinancePro expense tracker")]
pub struct Cli {
    /// User whose expenses are opened
    #[arg(long, short, env = "FINANCEPRO_USER", default_value = "guest")]
    pub user: String,

    /// Application data directory (defaults to the platform data dir + /financepro)
    #[arg(long, env = "FINANCEPRO_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// How many timestamped copies of data.json to keep
    #[arg(long, default_value_t = DEFAULT_MAX_BACKUPS)]
    pub max_backups: usize,

    /// off, error, warn, info, debug, trace (RUST_LOG takes precedence)
    #[arg(long, default_value_t = LevelFilter::WARN)]
    pub log_level: LevelFilter,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Add one expense and save it
    Add(ExpenseArgs),
    /// Create a tag without an expense and save it
    Tag { tag: String },
    /// List all expenses
    List,
    /// Show known names, categories and tags
    Indices,
    /// Show launch count, data size and file locations
    Info,
    /// Write all expenses to a CSV file
    ExportCsv { path: PathBuf },
    /// Move unreadable data files into backups/ and start a fresh record
    Reset,
    /// Interactive session: add, tag, list, pending, save, revert, quit
    Shell,
}

#[derive(Debug, Args, Clone)]
pub struct ExpenseArgs {
    #[arg(long)]
    pub amount: String,
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub category: String,
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    /// e.g. 2024-05-01T18:30, "2024-05-01 18:30" or 2024-05-01
    #[arg(long)]
    pub at: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}
