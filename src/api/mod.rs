pub mod openai;

use async_trait::async_trait;

use crate::error::{ AssistantError, Result };
use crate::models::assistant::{ Assistant, Message, Run, RunStatus, ThreadRun, VectorStoreFile };

pub use self::openai::OpenAIAssistantsClient;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_BETA_HEADER: &str = "assistants=v2";
pub const DEFAULT_LIST_LIMIT: u32 = 20;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub beta_header: String,
    pub list_limit: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            beta_header: DEFAULT_BETA_HEADER.to_string(),
            list_limit: DEFAULT_LIST_LIMIT,
        }
    }
}

/// Operations consumed from the hosted assistants service.
///
/// Every call takes the bearer credential explicitly; the session owns it,
/// not the client. Implementations reject empty credentials and ids with
/// [`AssistantError::Validation`] before touching the network.
#[async_trait]
pub trait AssistantsApi: Send + Sync {
    async fn list_assistants(&self, api_key: &str) -> Result<Vec<Assistant>>;

    /// Creates a thread seeded with one user message and starts a run on it.
    async fn create_thread_and_run(
        &self,
        api_key: &str,
        assistant_id: &str,
        seed_message: &str
    ) -> Result<ThreadRun>;

    async fn post_message(&self, api_key: &str, thread_id: &str, text: &str) -> Result<()>;

    async fn start_run(&self, api_key: &str, thread_id: &str, assistant_id: &str) -> Result<ThreadRun>;

    async fn get_run(&self, api_key: &str, thread_id: &str, run_id: &str) -> Result<Run>;

    async fn get_run_status(&self, api_key: &str, thread_id: &str, run_id: &str) -> Result<RunStatus> {
        self.get_run(api_key, thread_id, run_id).await.map(|run| run.status)
    }

    /// Messages of a thread, newest first as the service returns them.
    async fn list_messages(&self, api_key: &str, thread_id: &str) -> Result<Vec<Message>>;

    async fn list_vector_store_files(
        &self,
        api_key: &str,
        vector_store_id: &str
    ) -> Result<Vec<VectorStoreFile>>;
}

pub(crate) fn require(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(AssistantError::missing(what))
    } else {
        Ok(())
    }
}
