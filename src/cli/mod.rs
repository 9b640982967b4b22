//! CLI command definitions and parsing
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::retrieval::QueryMode;

#[derive(Parser, Debug)]
#[command(
    name = "themis",
    version,
    author = "neur0map",
    about = "Hybrid retrieval and answer generation over French consumer law",
    long_about = "Themis answers legal questions by retrieving statute articles with dense and \
                  keyword search, reranking them with a cross-encoder, and grounding a language \
                  model's answer in the articles it found."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/themis/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP API
    Serve {
        /// Address to listen on (overrides server.bind)
        #[arg(short, long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Ask a question from the command line
    Ask {
        /// Question to ask
        query: String,

        /// Retrieval pipeline to use
        #[arg(short, long, value_enum, default_value_t = ModeArg::Advanced)]
        mode: ModeArg,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Load articles from a JSON file into the store and indexes
    Index {
        /// JSON array of {code_source?, article_number, content, metadata?}
        file: PathBuf,
    },

    /// Show corpus and index statistics
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeArg {
    Naive,
    Advanced,
    Compare,
}

impl From<ModeArg> for QueryMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Naive => QueryMode::Naive,
            ModeArg::Advanced => QueryMode::Advanced,
            ModeArg::Compare => QueryMode::Compare,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
