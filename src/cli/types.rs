//! CLI type definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::commands::consume::ConsumeArgs;
use crate::cli::commands::ingest::IngestArgs;
use crate::cli::commands::projects::ProjectsArgs;
use crate::cli::commands::search::SearchArgs;

#[derive(Parser, Debug)]
#[command(name = "docbot")]
#[command(about = "Document bot - saga participant and hybrid semantic retrieval", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .docbot/config.yaml)
    #[arg(short, long, global = true, env = "DOCBOT_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay saga events through the coordinator
    Consume(ConsumeArgs),

    /// Index a document text file
    Ingest(IngestArgs),

    /// Semantic search over a collection
    Search(SearchArgs),

    /// Project management and hybrid project search
    Projects(ProjectsArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search_with_filters() {
        let cli = Cli::try_parse_from([
            "docbot",
            "--json",
            "search",
            "solar panels",
            "--eq",
            "type=INTERNAL",
            "--range",
            "budget=1000..5000",
            "--limit",
            "3",
        ])
        .unwrap();
        assert!(cli.json);
        let Commands::Search(args) = cli.command else {
            panic!("expected search");
        };
        assert_eq!(args.eq, vec!["type=INTERNAL"]);
        assert_eq!(args.limit, Some(3));
    }
}
