use std::path::PathBuf;

use clap::{Parser, Subcommand};
use doc_search::Result;
use doc_search::commands::{run_ingest, run_search, run_serve, run_status};
use doc_search::config::Config;

#[derive(Parser)]
#[command(name = "doc-search")]
#[command(about = "Similarity search over an embedded document chunk index")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the vector index from the source document
    Ingest {
        /// Override the configured source document path
        document: Option<PathBuf>,
    },
    /// Serve similarity search over HTTP
    Serve,
    /// Run a one-off similarity search from the terminal
    Search {
        /// Query text
        query: String,
        /// Number of results to return
        #[arg(short, long, default_value_t = 5)]
        k: usize,
    },
    /// Show connectivity and index status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Ingest { document } => {
            run_ingest(&config, document).await?;
        }
        Commands::Serve => {
            run_serve(&config).await?;
        }
        Commands::Search { query, k } => {
            run_search(&config, &query, k).await?;
        }
        Commands::Status => {
            run_status(&config).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["doc-search", "status"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::Status);
        }
    }

    #[test]
    fn ingest_with_document_override() {
        let cli = Cli::try_parse_from(["doc-search", "ingest", "notes.md"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ingest { document } = parsed.command {
                assert_eq!(document, Some(PathBuf::from("notes.md")));
            }
        }
    }

    #[test]
    fn ingest_without_document() {
        let cli = Cli::try_parse_from(["doc-search", "ingest"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ingest { document } = parsed.command {
                assert_eq!(document, None);
            }
        }
    }

    #[test]
    fn search_with_k() {
        let cli = Cli::try_parse_from(["doc-search", "search", "license terms", "-k", "3"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Search { query, k } = parsed.command {
                assert_eq!(query, "license terms");
                assert_eq!(k, 3);
            }
        }
    }

    #[test]
    fn search_default_k() {
        let cli = Cli::try_parse_from(["doc-search", "search", "license terms"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Search { k, .. } = parsed.command {
                assert_eq!(k, 5);
            }
        }
    }

    #[test]
    fn config_flag_override() {
        let cli = Cli::try_parse_from(["doc-search", "--config", "/etc/doc-search.toml", "serve"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert_eq!(parsed.config, PathBuf::from("/etc/doc-search.toml"));
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["doc-search", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["doc-search", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
