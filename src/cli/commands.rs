use clap::{Parser, Subcommand};

/// `toolwarden` - gate an LLM agent's file and shell tool calls.
#[derive(Parser, Debug)]
#[command(name = "toolwarden")]
#[command(version)]
#[command(about = "Mediates an LLM agent's file and shell tool calls.", long_about = None)]
pub struct Cli {
    /// Log at debug level regardless of config
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one task through the tool loop and print the final answer
    Run {
        /// Task for the agent
        prompt: String,

        /// Directory tools operate in (default: config, then current directory)
        #[arg(short = 'C', long)]
        working_dir: Option<String>,

        /// Maximum backend calls for this run
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Deny every confirmation instead of prompting
        #[arg(long)]
        non_interactive: bool,
    },

    /// Classify a command line without running it
    Classify {
        /// Command line, quoted as one argument
        command: String,
    },

    /// Classify a filesystem path without touching it
    CheckPath {
        path: String,

        /// Classify for writing instead of reading
        #[arg(long)]
        write: bool,
    },

    /// List the registered tools and their parameter schemas
    Tools,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_overrides() {
        let cli = Cli::try_parse_from([
            "toolwarden",
            "run",
            "fix the tests",
            "-C",
            "/tmp/project",
            "--max-iterations",
            "5",
            "--non-interactive",
        ])
        .expect("parse");
        match cli.command {
            Commands::Run {
                prompt,
                working_dir,
                max_iterations,
                non_interactive,
            } => {
                assert_eq!(prompt, "fix the tests");
                assert_eq!(working_dir.as_deref(), Some("/tmp/project"));
                assert_eq!(max_iterations, Some(5));
                assert!(non_interactive);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn check_path_defaults_to_read() {
        let cli = Cli::try_parse_from(["toolwarden", "check-path", "/etc/passwd"]).expect("parse");
        assert!(matches!(cli.command, Commands::CheckPath { write: false, .. }));
    }
}
