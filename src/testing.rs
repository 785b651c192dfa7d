use async_trait::async_trait;
use std::collections::{ HashMap, HashSet, VecDeque };
use std::sync::Mutex;
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::time::Duration;

use crate::api::AssistantsApi;
use crate::error::{ AssistantError, Result };
use crate::models::assistant::{
    Assistant,
    Message,
    MessageRole,
    Run,
    RunStatus,
    ThreadRun,
    VectorStoreFile,
};

#[derive(Default)]
struct State {
    log: Vec<String>,
    fail_next: HashSet<String>,
    unauthorized: HashSet<String>,
    statuses: HashMap<String, VecDeque<String>>,
    replied: HashSet<String>,
    threads: HashMap<String, Vec<Message>>,
    run_threads: HashMap<String, String>,
    next_thread: usize,
    next_run: usize,
    clock: i64,
    assistants: Vec<Assistant>,
}

/// In-memory stand-in for the hosted service.
///
/// Run statuses are scripted per run id; the last scripted status repeats.
/// The first time a run reports `completed`, an assistant reply is added to
/// its thread. Listings come back newest first, like the real service.
#[derive(Default)]
pub struct ScriptedApi {
    state: Mutex<State>,
    list_delay: Mutex<Option<Duration>>,
    lists_in_flight: AtomicUsize,
    max_lists_in_flight: AtomicUsize,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_run(&self, run_id: &str, statuses: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.statuses.insert(run_id.to_string(), statuses.iter().map(|s| s.to_string()).collect());
    }

    pub fn fail_next(&self, op: &str) {
        self.state.lock().unwrap().fail_next.insert(op.to_string());
    }

    /// Every later call to `op` fails as if the key were rejected.
    pub fn reject_key_for(&self, op: &str) {
        self.state.lock().unwrap().unauthorized.insert(op.to_string());
    }

    pub fn add_assistant(&self, id: &str, name: &str) {
        self.state.lock().unwrap().assistants.push(Assistant {
            id: id.to_string(),
            name: Some(name.to_string()),
            model: None,
            instructions: None,
            created_at: 0,
        });
    }

    pub fn seed_thread(&self, thread_id: &str, turns: &[(MessageRole, &str)]) {
        let mut state = self.state.lock().unwrap();
        for (role, text) in turns {
            Self::push_message(&mut state, thread_id, role.clone(), text, None);
        }
    }

    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self, op: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .log.iter()
            .filter(|entry| entry.as_str() == op)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().unwrap().log.len()
    }

    pub fn call_log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn max_concurrent_lists(&self) -> usize {
        self.max_lists_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self, op: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.log.push(op.to_string());
        if state.unauthorized.contains(op) {
            return Err(AssistantError::Auth {
                status: 401,
                message: "Incorrect API key provided".to_string(),
            });
        }
        if state.fail_next.remove(op) {
            return Err(AssistantError::Transport {
                status: Some(500),
                message: format!("scripted {} failure", op),
            });
        }
        Ok(())
    }

    fn push_message(state: &mut State, thread_id: &str, role: MessageRole, text: &str, run_id: Option<String>) {
        state.clock += 1;
        let msg = Message {
            id: format!("msg_{}", state.clock),
            role,
            content: text.to_string(),
            created_at: state.clock,
            run_id,
            pending: false,
        };
        state.threads.entry(thread_id.to_string()).or_default().push(msg);
    }

    fn new_run(state: &mut State, thread_id: &str) -> String {
        state.next_run += 1;
        let run_id = format!("run_{}", state.next_run);
        state.run_threads.insert(run_id.clone(), thread_id.to_string());
        run_id
    }
}

#[async_trait]
impl AssistantsApi for ScriptedApi {
    async fn list_assistants(&self, _api_key: &str) -> Result<Vec<Assistant>> {
        self.enter("list_assistants")?;
        Ok(self.state.lock().unwrap().assistants.clone())
    }

    async fn create_thread_and_run(
        &self,
        _api_key: &str,
        _assistant_id: &str,
        seed_message: &str
    ) -> Result<ThreadRun> {
        self.enter("create_thread_and_run")?;
        let mut state = self.state.lock().unwrap();
        state.next_thread += 1;
        let thread_id = format!("thread_{}", state.next_thread);
        Self::push_message(&mut state, &thread_id, MessageRole::User, seed_message, None);
        let run_id = Self::new_run(&mut state, &thread_id);
        Ok(ThreadRun { thread_id, run_id })
    }

    async fn post_message(&self, _api_key: &str, thread_id: &str, text: &str) -> Result<()> {
        self.enter("post_message")?;
        let mut state = self.state.lock().unwrap();
        Self::push_message(&mut state, thread_id, MessageRole::User, text, None);
        Ok(())
    }

    async fn start_run(&self, _api_key: &str, thread_id: &str, _assistant_id: &str) -> Result<ThreadRun> {
        self.enter("start_run")?;
        let mut state = self.state.lock().unwrap();
        let run_id = Self::new_run(&mut state, thread_id);
        Ok(ThreadRun { thread_id: thread_id.to_string(), run_id })
    }

    async fn get_run(&self, _api_key: &str, thread_id: &str, run_id: &str) -> Result<Run> {
        self.enter("get_run")?;
        let mut state = self.state.lock().unwrap();
        let raw = match state.statuses.get_mut(run_id) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| "queued".to_string()),
            None => "queued".to_string(),
        };
        let status = RunStatus::from(raw.as_str());
        if status == RunStatus::Completed && state.replied.insert(run_id.to_string()) {
            let thread = state.run_threads.get(run_id).cloned().unwrap_or_else(|| thread_id.to_string());
            Self::push_message(
                &mut state,
                &thread,
                MessageRole::Assistant,
                &format!("reply to {}", run_id),
                Some(run_id.to_string())
            );
        }
        Ok(Run {
            id: run_id.to_string(),
            thread_id: thread_id.to_string(),
            assistant_id: None,
            status,
            last_error: None,
        })
    }

    async fn list_messages(&self, _api_key: &str, thread_id: &str) -> Result<Vec<Message>> {
        self.enter("list_messages")?;
        let now = self.lists_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_lists_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut messages = self.state
            .lock()
            .unwrap()
            .threads.get(thread_id)
            .cloned()
            .unwrap_or_default();
        messages.reverse();
        self.lists_in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(messages)
    }

    async fn list_vector_store_files(
        &self,
        _api_key: &str,
        vector_store_id: &str
    ) -> Result<Vec<VectorStoreFile>> {
        self.enter("list_vector_store_files")?;
        Ok(
            vec![VectorStoreFile {
                id: format!("file_in_{}", vector_store_id),
                status: Some("completed".to_string()),
                created_at: 0,
                usage_bytes: 42,
            }]
        )
    }
}
