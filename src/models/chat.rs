use crate::error::AssistantError;
use crate::models::assistant::{ Message, RunStatus };

/// Notifications emitted by the chat controller for the front end.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatEvent {
    RunStarted {
        thread_id: String,
        run_id: String,
    },
    RunStatus {
        run_id: String,
        status: RunStatus,
    },
    TranscriptUpdated {
        messages: Vec<Message>,
    },
    RunFailed {
        error: AssistantError,
    },
    Error {
        error: AssistantError,
    },
}

/// Read-only copy of the session used for rendering.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionView {
    pub configured: bool,
    pub assistant_id: Option<String>,
    pub thread_id: Option<String>,
    pub run_id: Option<String>,
    pub transcript: Vec<Message>,
    pub loading: bool,
    pub last_error: Option<AssistantError>,
}
