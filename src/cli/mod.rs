//! CLI command definitions and parsing
use crate::retrieval::RetrievalScope;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "docent",
    version,
    author = "neur0map",
    about = "Ask questions about a document and get answers grounded in its text",
    long_about = "Docent splits a document into chunks, embeds and indexes them, and answers \
                  questions using only the most relevant passages. An optional image can be \
                  described and indexed alongside the text."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/docent/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration profile to apply
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer a single question about a document
    Ask {
        /// Plain-text document
        document: PathBuf,

        /// Question to ask
        question: String,

        #[command(flatten)]
        query: QueryArgs,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Interactive question session over a document
    Chat {
        /// Plain-text document
        document: PathBuf,

        #[command(flatten)]
        query: QueryArgs,
    },

    /// Show how a document is split into chunks
    Chunk {
        /// Plain-text document
        document: PathBuf,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Options shared by question-answering commands
#[derive(clap::Args, Debug, Clone)]
pub struct QueryArgs {
    /// Image to describe and index with the document (png or jpeg)
    #[arg(short, long, value_name = "FILE")]
    pub image: Option<PathBuf>,

    /// Generation model (llama-3.1-8b-instant, openai/gpt-oss-120b)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Restrict retrieval to text or image chunks
    #[arg(short, long, value_enum)]
    pub scope: Option<RetrievalScope>,

    /// Number of chunks to retrieve before reranking
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Print the context passed to the model
    #[arg(long)]
    pub show_context: bool,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ask() {
        let cli = Cli::try_parse_from([
            "docent",
            "ask",
            "notes.txt",
            "What is a cat?",
            "--scope",
            "text",
            "-k",
            "4",
            "--json",
        ])
        .unwrap();

        match cli.command {
            Commands::Ask {
                document,
                question,
                query,
                json,
            } => {
                assert_eq!(document, PathBuf::from("notes.txt"));
                assert_eq!(question, "What is a cat?");
                assert_eq!(query.scope, Some(RetrievalScope::Text));
                assert_eq!(query.top_k, Some(4));
                assert!(json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["docent", "chunk", "a.txt", "--verbose", "-p", "offline"])
            .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.profile.as_deref(), Some("offline"));
    }
}
