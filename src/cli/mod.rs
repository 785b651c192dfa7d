use clap::Parser;
use std::time::Duration;

use crate::api::{ ApiConfig, DEFAULT_BASE_URL, DEFAULT_BETA_HEADER };
use crate::chat::ChatSettings;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Credentials & Selection ---
    /// API key sent as the bearer credential. Prompted for when empty.
    #[arg(long, env = "OPENAI_API_KEY", default_value = "", hide_env_values = true)]
    pub api_key: String,

    /// Assistant to talk to. When unset, assistants are listed for selection.
    #[arg(long, env = "ASSISTANT_ID")]
    pub assistant_id: Option<String>,

    /// Existing thread to continue. A new thread is created on the first message otherwise.
    #[arg(long, env = "THREAD_ID")]
    pub thread_id: Option<String>,

    // --- Service Args ---
    /// Base URL of the assistants API
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Value of the OpenAI-Beta header selecting the protocol version
    #[arg(long, env = "OPENAI_BETA", default_value = DEFAULT_BETA_HEADER)]
    pub beta_header: String,

    /// Number of assistants fetched for selection
    #[arg(long, env = "ASSISTANT_LIST_LIMIT", default_value = "20")]
    pub list_limit: u32,

    // --- Polling Args ---
    /// Delay between run status checks, in milliseconds
    #[arg(long, env = "POLL_INTERVAL_MS", default_value = "1000")]
    pub poll_interval_ms: u64,

    // --- General App Args ---
    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}

impl Args {
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.base_url.clone(),
            beta_header: self.beta_header.clone(),
            list_limit: self.list_limit,
        }
    }

    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_hosted_service() {
        let args = Args::try_parse_from(["openassist", "--api-key", "sk-test"]).unwrap();
        let api = args.api_config();
        assert_eq!(api.base_url, "https://api.openai.com/v1");
        assert_eq!(api.beta_header, "assistants=v2");
        assert_eq!(api.list_limit, 20);
        assert_eq!(args.chat_settings().poll_interval, Duration::from_millis(1000));
    }

    #[test]
    fn poll_interval_is_configurable() {
        let args = Args::try_parse_from([
            "openassist",
            "--poll-interval-ms",
            "2500",
            "--thread-id",
            "thread_1",
        ]).unwrap();
        assert_eq!(args.chat_settings().poll_interval, Duration::from_millis(2500));
        assert_eq!(args.thread_id.as_deref(), Some("thread_1"));
    }
}
