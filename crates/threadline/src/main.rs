// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Threadline - one conversation across many channels.
//!
//! This is the binary entry point.

mod check;
mod serve;
mod status;
mod tasks;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use threadline_config::ThreadlineConfig;

/// Threadline - one conversation across many channels.
#[derive(Parser, Debug)]
#[command(name = "threadline", version, about, long_about = None)]
struct Cli {
    /// Read this config file instead of the standard lookup.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway, scheduler, and worker.
    Serve,
    /// Query a running server's health endpoint.
    Status {
        /// Print machine-readable JSON.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
    /// Inspect tasks in the database.
    Task {
        #[command(subcommand)]
        action: TaskCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate configuration and print a redacted summary.
    Check,
}

#[derive(Subcommand, Debug)]
enum TaskCommand {
    /// List a user's tasks.
    List {
        /// Owner of the tasks.
        #[arg(long)]
        user: String,
        /// Print machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> ThreadlineConfig {
    let loaded = match path {
        Some(path) => threadline_config::load_and_validate_path(path),
        None => threadline_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            threadline_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("threadline: use --help for available commands");
        return;
    };

    let config = load_config(cli.config.as_ref());

    let result = match command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Status { json, plain } => status::run_status(&config, json, plain).await,
        Commands::Config {
            action: ConfigCommand::Check,
        } => {
            check::run_config_check(&config, cli.config.as_deref());
            Ok(())
        }
        Commands::Task {
            action: TaskCommand::List { user, json },
        } => tasks::run_task_list(&config, &user, json).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_task_list() {
        let cli = Cli::try_parse_from(["threadline", "task", "list", "--user", "u1"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Task {
                action: TaskCommand::List { ref user, json: false }
            }) if user == "u1"
        ));
    }

    #[test]
    fn parses_global_config_flag() {
        let cli =
            Cli::try_parse_from(["threadline", "config", "check", "--config", "/tmp/t.toml"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/t.toml")));
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = threadline_config::load_and_validate_str("")
            .expect("default config should be valid");
        assert_eq!(config.agent.name, "threadline");
    }
}
