use serde::{ Deserialize, Serialize };
use std::fmt;

pub const UNAVAILABLE_CONTENT: &str = "(message unavailable)";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Assistant {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub created_at: i64,
}

impl Assistant {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.id)
    }
}

/// Identifiers returned when a run is created, with or without a new thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadRun {
    pub thread_id: String,
    pub run_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    Unknown(String),
}

impl RunStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
            RunStatus::Unknown(other) => other,
        }
    }

    /// Statuses after which the run will not produce anything new. Pending
    /// and unrecognised statuses are polled again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed |
                RunStatus::Failed |
                RunStatus::Expired |
                RunStatus::Cancelled |
                RunStatus::Incomplete |
                RunStatus::RequiresAction
        )
    }
}

impl From<&str> for RunStatus {
    fn from(s: &str) -> Self {
        match s {
            "queued" => RunStatus::Queued,
            "in_progress" => RunStatus::InProgress,
            "requires_action" => RunStatus::RequiresAction,
            "cancelling" => RunStatus::Cancelling,
            "cancelled" => RunStatus::Cancelled,
            "failed" => RunStatus::Failed,
            "completed" => RunStatus::Completed,
            "incomplete" => RunStatus::Incomplete,
            "expired" => RunStatus::Expired,
            other => RunStatus::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for RunStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RunStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(RunStatus::from(raw.as_str()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub assistant_id: Option<String>,
    pub status: RunStatus,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

impl Run {
    pub fn failure_reason(&self) -> Option<String> {
        self.last_error.as_ref().and_then(|e| {
            match (&e.code, &e.message) {
                (Some(code), Some(msg)) => Some(format!("{}: {}", code, msg)),
                (None, Some(msg)) => Some(msg.clone()),
                (Some(code), None) => Some(code.clone()),
                (None, None) => None,
            }
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn label(&self) -> &'static str {
        match self {
            MessageRole::User => "You",
            MessageRole::Assistant => "Assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: i64,
    pub run_id: Option<String>,
    /// Set on locally appended user messages not yet confirmed by the service.
    pub pending: bool,
}

#[derive(Deserialize, Debug)]
pub(crate) struct WireTextValue {
    pub value: String,
}

#[derive(Deserialize, Debug)]
pub(crate) struct WireContentPart {
    #[serde(rename = "type")]
    pub part_type: String,
    #[serde(default)]
    pub text: Option<WireTextValue>,
}

/// Message as returned by the service; role is kept as a string because the
/// listing may carry roles this client does not display.
#[derive(Deserialize, Debug)]
pub(crate) struct WireMessage {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub content: Vec<WireContentPart>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub run_id: Option<String>,
}

impl WireMessage {
    pub fn into_message(self) -> Option<Message> {
        let role = match self.role.as_str() {
            "user" => MessageRole::User,
            "assistant" => MessageRole::Assistant,
            _ => {
                return None;
            }
        };
        let texts: Vec<String> = self.content
            .into_iter()
            .filter(|part| part.part_type == "text")
            .filter_map(|part| part.text.map(|t| t.value))
            .filter(|v| !v.is_empty())
            .collect();
        let content = if texts.is_empty() {
            UNAVAILABLE_CONTENT.to_string()
        } else {
            texts.join("\n\n")
        };
        Some(Message {
            id: self.id,
            role,
            content,
            created_at: self.created_at,
            run_id: self.run_id,
            pending: false,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VectorStoreFile {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub usage_bytes: u64,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ListResponse<T> {
    pub data: Vec<T>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ApiErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
}
