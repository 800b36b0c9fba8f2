use clap::{Parser, Subcommand};

/// Command line interface for the application
#[derive(Parser)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value_t = String::from("newsmill.yaml"))]
    pub config: String,

    /// Sets the logging verbosity level for the application
    /// Possible values: "error", "warn", "info", "debug", "trace"
    #[arg(long, default_value_t = String::from("info"))]
    pub logging_level: String,

    /// Also write logs to a daily-rotating file under ./logs
    #[arg(long, default_value_t = false)]
    pub log_to_file: bool,

    /// Overrides the worker identifier recorded in task leases
    #[arg(long)]
    pub worker_id: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the polling worker (the default when no command is given)
    Work,
    /// Reactivate failed or cancelled tasks for one more attempt
    Retry {
        /// Task ids to retry
        #[arg(required = true)]
        ids: Vec<String>,
        /// Model profile to use for the retry
        #[arg(long)]
        model: Option<String>,
        /// Prompt profile to use for the retry
        #[arg(long)]
        prompt: Option<String>,
    },
    /// Cancel pending tasks
    Cancel {
        /// Task ids to cancel
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Print a task with its event timeline and model usage
    Show {
        /// Task id to inspect
        id: String,
    },
}
