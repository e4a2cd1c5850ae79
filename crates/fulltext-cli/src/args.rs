use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments accepted by the `fulltext` binary.
#[derive(Parser, Debug)]
#[command(
    name = "fulltext",
    version,
    about = "Index local documents and search their contents"
)]
pub(crate) struct CliArgs {
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "TOML configuration file (default: built-in defaults)"
    )]
    pub(crate) config: Option<PathBuf>,
    #[arg(
        long,
        value_name = "DIR",
        help = "Override the index directory from the configuration"
    )]
    pub(crate) index_dir: Option<PathBuf>,
    #[arg(
        long,
        value_name = "FILE",
        help = "Write logs to this file (default: logging disabled)"
    )]
    pub(crate) log_file: Option<PathBuf>,
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        help = "Log level used when RUST_LOG is not set"
    )]
    pub(crate) log_level: String,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Build the index for a directory tree.
    Index {
        #[arg(value_name = "ROOT")]
        root: String,
        #[arg(long, help = "Only build when the index is empty")]
        if_missing: bool,
    },
    /// Search document contents under a target directory or URL.
    Search {
        #[arg(value_name = "TARGET")]
        target: String,
        #[arg(value_name = "KEYWORD", required = true, num_args = 1..)]
        keyword: Vec<String>,
    },
    /// Print storage statistics of the index.
    Stats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_search_with_multiword_keyword() {
        let args = CliArgs::try_parse_from([
            "fulltext",
            "--log-level",
            "debug",
            "search",
            "file:///home/u",
            "annual",
            "report",
        ])
        .unwrap();

        assert_eq!(args.log_level, "debug");
        match args.command {
            Command::Search { target, keyword } => {
                assert_eq!(target, "file:///home/u");
                assert_eq!(keyword.join(" "), "annual report");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn search_requires_keyword() {
        assert!(CliArgs::try_parse_from(["fulltext", "search", "/home"]).is_err());
    }

    #[test]
    fn index_flags() {
        let args =
            CliArgs::try_parse_from(["fulltext", "index", "/data", "--if-missing"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Index {
                if_missing: true,
                ..
            }
        ));
    }
}
