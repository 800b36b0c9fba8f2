//! Main entry point for the application.
//!
//! This module initializes logging, loads environment variables and
//! configuration, and either starts the polling worker or runs one of the
//! queue administration commands.

mod chunking;
mod cli;
mod config;
mod constants;
mod core;
mod db;
mod errors;
mod llm;
mod pipeline;
mod queue;
mod schema;
mod utils;

use clap::Parser;
use cli::Command;
use crate::core::worker::Worker;
use db::Database;
use llm::OpenAiFactory;
use queue::{QueueAdmin, RetryOverrides};
use std::sync::Arc;
use tracing::warn;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::try_parse().expect("Failed to parse CLI arguments");
    utils::init_logging(&cli.logging_level, cli.log_to_file);

    if let Err(e) = dotenvy::dotenv() {
        warn!("Failed to load .env file: {}", e);
    }

    let mut app_config =
        config::load_app_config(&cli.config).expect("Failed to parse configuration");
    if cli.worker_id.is_some() {
        app_config.worker.worker_id = cli.worker_id.clone();
    }

    let db = Database::new(&app_config.database.path);

    match cli.command.unwrap_or(Command::Work) {
        Command::Work => {
            let worker = Worker::new(db, Arc::new(app_config), Arc::new(OpenAiFactory));
            worker.run().await;
        }
        Command::Retry { ids, model, prompt } => {
            let admin = QueueAdmin::new(&db);
            let overrides = RetryOverrides { model, prompt };
            let outcomes = admin
                .retry_selected(&ids, &overrides)
                .expect("Failed to retry tasks");
            for (id, outcome) in outcomes {
                println!("{}: {:?}", id, outcome);
            }
        }
        Command::Cancel { ids } => {
            let admin = QueueAdmin::new(&db);
            let outcomes = admin.cancel_selected(&ids).expect("Failed to cancel tasks");
            for (id, outcome) in outcomes {
                println!("{}: {:?}", id, outcome);
            }
        }
        Command::Show { id } => {
            let admin = QueueAdmin::new(&db);
            let timeline = admin.timeline(&id).expect("Failed to load task");
            println!(
                "{} {} {} attempts {}/{}",
                timeline.task.id,
                timeline.task.task_kind,
                timeline.task.status,
                timeline.task.attempts,
                timeline.task.max_attempts
            );
            for event in &timeline.events {
                println!(
                    "  {} {} {} -> {} {}",
                    event.created_at,
                    event.event_kind,
                    event.from_status.as_deref().unwrap_or("-"),
                    event.to_status.as_deref().unwrap_or("-"),
                    event.message.as_deref().unwrap_or("")
                );
            }
            for usage in &timeline.usage {
                println!(
                    "  round {} model {} prompt {} completion {} latency {}ms",
                    usage.round,
                    usage.model,
                    usage.prompt_tokens,
                    usage.completion_tokens,
                    usage.latency_ms
                );
            }
        }
    }
}
