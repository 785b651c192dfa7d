pub mod api;
pub mod chat;
pub mod cli;
pub mod error;
pub mod models;
pub mod poller;
pub mod repl;
pub mod session;

#[cfg(test)]
mod testing;

use api::OpenAIAssistantsClient;
use chat::ChatController;
use cli::Args;
use log::info;
use repl::{ InitialConfig, Repl };
use std::error::Error;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::mpsc;

const EVENT_BUFFER: usize = 64;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Base URL: {}", args.base_url);
    info!("Beta Header: {}", args.beta_header);
    info!("Poll Interval: {}ms", args.poll_interval_ms);
    info!("Assistant List Limit: {}", args.list_limit);
    info!("API Key Provided: {}", !args.api_key.trim().is_empty());
    info!("Assistant ID: {}", args.assistant_id.as_deref().unwrap_or("<select>"));
    info!("Thread ID: {}", args.thread_id.as_deref().unwrap_or("<new>"));
    info!("-------------------------");

    let api = Arc::new(OpenAIAssistantsClient::new(&args.api_config())?);
    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let chat = ChatController::new(api, args.chat_settings(), events_tx);

    let repl = Repl::new(
        chat,
        events_rx,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        InitialConfig::from(&args)
    );
    repl.run().await
}
