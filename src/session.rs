use chrono::Utc;
use log::debug;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::AssistantError;
use crate::models::assistant::{ Message, MessageRole };
use crate::models::chat::SessionView;

/// All state of one chat session. Owned by the controller and mutated only
/// through these methods.
#[derive(Debug, Default)]
pub struct Session {
    api_key: String,
    assistant_id: String,
    thread_id: String,
    run_id: Option<String>,
    run_token: Option<CancellationToken>,
    transcript: Vec<Message>,
    loading: bool,
    last_error: Option<AssistantError>,
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configure(&mut self, api_key: &str, assistant_id: &str, thread_id: Option<&str>) {
        self.api_key = api_key.trim().to_string();
        self.assistant_id = assistant_id.trim().to_string();
        self.thread_id = thread_id.map(|t| t.trim().to_string()).unwrap_or_default();
        self.last_error = None;
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn assistant_id(&self) -> &str {
        &self.assistant_id
    }

    pub fn thread_id(&self) -> Option<&str> {
        if self.thread_id.is_empty() { None } else { Some(&self.thread_id) }
    }

    pub fn set_thread_id(&mut self, thread_id: &str) {
        self.thread_id = thread_id.to_string();
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&AssistantError> {
        self.last_error.as_ref()
    }

    /// True when outbound calls are allowed at all.
    pub fn can_call(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub fn has_thread(&self) -> bool {
        self.can_call() && !self.thread_id.is_empty()
    }

    /// Appends a user message before the service has confirmed it.
    pub fn push_optimistic(&mut self, text: &str) -> Message {
        let message = Message {
            id: format!("local-{}", Uuid::new_v4()),
            role: MessageRole::User,
            content: text.to_string(),
            created_at: Utc::now().timestamp(),
            run_id: None,
            pending: true,
        };
        self.transcript.push(message.clone());
        message
    }

    /// Makes `run_id` the current run. Any poll running for the previous run
    /// is cancelled through its token.
    pub fn begin_run(&mut self, run_id: &str) -> CancellationToken {
        if let Some(previous) = self.run_token.take() {
            debug!("Superseding run {:?} with {}", self.run_id, run_id);
            previous.cancel();
        }
        let token = CancellationToken::new();
        self.run_id = Some(run_id.to_string());
        self.run_token = Some(token.clone());
        self.loading = true;
        self.last_error = None;
        token
    }

    pub fn is_current_run(&self, run_id: &str) -> bool {
        self.run_id.as_deref() == Some(run_id)
    }

    /// Replaces the transcript with a fetched listing.
    ///
    /// `for_run` ties the fetch to the run that triggered it; a fetch for a
    /// superseded run is dropped and `false` is returned. `None` is used for
    /// loads not tied to a run.
    pub fn apply_transcript(&mut self, for_run: Option<&str>, fetched: Vec<Message>) -> bool {
        if let Some(run_id) = for_run {
            if !self.is_current_run(run_id) {
                debug!("Dropping transcript fetched for stale run {}", run_id);
                return false;
            }
        }
        self.transcript = chronological(fetched);
        true
    }

    /// Clears the loading flag for `run_id` if it is still the current run.
    pub fn finish_run(&mut self, run_id: &str, error: Option<AssistantError>) -> bool {
        if !self.is_current_run(run_id) {
            return false;
        }
        self.loading = false;
        self.run_token = None;
        if error.is_some() {
            self.last_error = error;
        }
        true
    }

    pub fn record_error(&mut self, error: AssistantError) {
        self.last_error = Some(error);
    }

    /// Drops the failed optimistic message so the transcript only shows what
    /// the service accepted.
    pub fn discard_optimistic(&mut self, local_id: &str) {
        self.transcript.retain(|m| !(m.pending && m.id == local_id));
    }

    /// Marks an optimistic message as delivered when no fetch will follow.
    pub fn confirm_optimistic(&mut self, local_id: &str) {
        if let Some(message) = self.transcript.iter_mut().find(|m| m.id == local_id) {
            message.pending = false;
        }
    }

    pub fn reset_all(&mut self) {
        if let Some(token) = self.run_token.take() {
            token.cancel();
        }
        *self = Self::default();
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            configured: self.can_call(),
            assistant_id: non_empty(&self.assistant_id),
            thread_id: non_empty(&self.thread_id),
            run_id: self.run_id.clone(),
            transcript: self.transcript.clone(),
            loading: self.loading,
            last_error: self.last_error.clone(),
        }
    }
}

/// Orders a newest-first listing oldest-first. The stable sort keeps the
/// reversed order for messages sharing a timestamp.
pub fn chronological(mut messages: Vec<Message>) -> Vec<Message> {
    messages.reverse();
    messages.sort_by_key(|m| m.created_at);
    messages
}
