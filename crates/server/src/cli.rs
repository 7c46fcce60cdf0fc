//! CLI argument parsing.

use clap::{Parser, Subcommand};

/// grounded-search server: answers questions through a web-grounded agent.
#[derive(Parser, Debug)]
#[command(name = "grounded-server", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Start the HTTP server (default).
    Serve {
        /// Bind address; overrides HOST.
        #[arg(long)]
        host: Option<String>,

        /// Listen port; overrides PORT.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run a single search and print the JSON response.
    Search {
        /// Question to answer.
        query: String,
    },
}

impl Cli {
    /// The requested command, falling back to `serve` with no overrides.
    pub fn command(self) -> Command {
        self.command.unwrap_or(Command::Serve {
            host: None,
            port: None,
        })
    }
}
