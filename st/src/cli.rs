//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// stepstream - live task trees from streamed model output
#[derive(Parser)]
#[command(
    name = "st",
    about = "Repair streamed JSON and grow a live task tree from it",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Repair truncated JSON and print the result
    Repair {
        /// Input file (reads stdin when omitted)
        file: Option<PathBuf>,

        /// Print the repaired text without parsing it
        #[arg(long)]
        raw: bool,
    },

    /// Replay a recorded model reply through a session chunk by chunk
    Replay {
        /// Recorded reply (reads stdin when omitted)
        file: Option<PathBuf>,

        /// Characters per chunk
        #[arg(short = 'n', long, default_value_t = 16)]
        chunk_size: usize,

        /// Print the tree after every chunk
        #[arg(short, long)]
        verbose: bool,

        /// Print the final tree as stored records (JSON)
        #[arg(long)]
        json: bool,
    },

    /// Ask the model for a plan and render it as it streams
    Generate {
        /// What you want to get done
        goal: String,

        /// Existing plan (JSON) to revise instead of starting fresh
        #[arg(long, requires = "feedback")]
        revise: Option<PathBuf>,

        /// What to change about the existing plan
        #[arg(long, requires = "revise")]
        feedback: Option<String>,

        /// Print the final tree as stored records (JSON)
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_replay_defaults() {
        let cli = Cli::try_parse_from(["st", "replay", "reply.txt"]).unwrap();
        match cli.command {
            Command::Replay {
                file,
                chunk_size,
                verbose,
                json,
            } => {
                assert_eq!(file, Some(PathBuf::from("reply.txt")));
                assert_eq!(chunk_size, 16);
                assert!(!verbose);
                assert!(!json);
            }
            other => panic!("Expected Replay, got {:?}", other),
        }
    }

    #[test]
    fn test_revise_requires_feedback() {
        assert!(Cli::try_parse_from(["st", "generate", "sail", "--revise", "plan.json"]).is_err());
        assert!(
            Cli::try_parse_from(["st", "generate", "sail", "--revise", "plan.json", "--feedback", "cheaper"]).is_ok()
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["st", "repair", "-l", "debug"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }
}
