use log::{ debug, error, info };
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{ mpsc, Mutex };
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::AssistantsApi;
use crate::error::{ AssistantError, Result };
use crate::models::assistant::{ Assistant, Message, ThreadRun, VectorStoreFile };
use crate::models::chat::{ ChatEvent, SessionView };
use crate::poller::{ PollOutcome, RunPoller, DEFAULT_POLL_INTERVAL };
use crate::session::Session;

#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub poll_interval: Duration,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self { poll_interval: DEFAULT_POLL_INTERVAL }
    }
}

struct Shared<A: AssistantsApi + ?Sized> {
    api: Arc<A>,
    session: Mutex<Session>,
    // One transcript fetch at a time, so listings never interleave.
    fetch_lock: Mutex<()>,
    events: mpsc::Sender<ChatEvent>,
    settings: ChatSettings,
}

/// Drives a session: post, run, poll, refresh.
///
/// Every operation is a no-op while no credential is configured, so calls
/// made after [`ChatController::reset_all`] never reach the service. Errors
/// are logged, stored on the session and emitted as [`ChatEvent`]s, as well
/// as returned to the caller.
pub struct ChatController<A: AssistantsApi + ?Sized + 'static> {
    shared: Arc<Shared<A>>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl<A: AssistantsApi + ?Sized + 'static> ChatController<A> {
    pub fn new(api: Arc<A>, settings: ChatSettings, events: mpsc::Sender<ChatEvent>) -> Self {
        Self {
            shared: Arc::new(Shared {
                api,
                session: Mutex::new(Session::new()),
                fetch_lock: Mutex::new(()),
                events,
                settings,
            }),
            poll_task: Mutex::new(None),
        }
    }

    pub async fn configure(
        &self,
        api_key: &str,
        assistant_id: &str,
        thread_id: Option<&str>
    ) -> Result<()> {
        let has_thread = {
            let mut session = self.shared.session.lock().await;
            session.configure(api_key, assistant_id, thread_id);
            session.has_thread()
        };
        info!(
            "Session configured: assistant={}, thread={}",
            if assistant_id.trim().is_empty() { "<none>" } else { assistant_id.trim() },
            thread_id.unwrap_or("<new>")
        );
        if has_thread {
            self.refresh_transcript().await?;
        }
        Ok(())
    }

    pub async fn select_assistant(&self, assistant_id: &str) {
        let mut session = self.shared.session.lock().await;
        let api_key = session.api_key().to_string();
        let thread_id = session.thread_id().map(str::to_string);
        session.configure(&api_key, assistant_id, thread_id.as_deref());
    }

    pub async fn list_assistants(&self) -> Result<Vec<Assistant>> {
        let api_key = match self.credential().await {
            Some(key) => key,
            None => {
                return Ok(Vec::new());
            }
        };
        match self.shared.api.list_assistants(&api_key).await {
            Ok(assistants) => {
                debug!("Fetched {} assistants", assistants.len());
                Ok(assistants)
            }
            Err(e) => Err(self.shared.report("list assistants", e).await),
        }
    }

    pub async fn list_vector_store_files(&self, vector_store_id: &str) -> Result<Vec<VectorStoreFile>> {
        let api_key = match self.credential().await {
            Some(key) => key,
            None => {
                return Ok(Vec::new());
            }
        };
        match self.shared.api.list_vector_store_files(&api_key, vector_store_id).await {
            Ok(files) => Ok(files),
            Err(e) => Err(self.shared.report("list vector store files", e).await),
        }
    }

    /// Submits a user message and starts a run for it.
    ///
    /// The message is appended to the transcript immediately. Without a
    /// thread, one is created together with the run; otherwise the message
    /// is posted and the run started afterwards. Polling happens on a
    /// background task; `Ok(None)` means the call was skipped.
    pub async fn send_message(&self, text: &str) -> Result<Option<ThreadRun>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let (api_key, assistant_id, thread_id, local) = {
            let mut session = self.shared.session.lock().await;
            if !session.can_call() {
                debug!("send_message skipped: no credential configured");
                return Ok(None);
            }
            if session.assistant_id().is_empty() {
                drop(session);
                return Err(self.shared.report("send message", AssistantError::missing("assistant_id")).await);
            }
            let local = session.push_optimistic(text);
            (
                session.api_key().to_string(),
                session.assistant_id().to_string(),
                session.thread_id().map(str::to_string),
                local,
            )
        };

        let api = &self.shared.api;
        let posted = thread_id.is_some();
        let started = match thread_id {
            Some(thread_id) => {
                if let Err(e) = api.post_message(&api_key, &thread_id, text).await {
                    self.shared.session.lock().await.discard_optimistic(&local.id);
                    return Err(self.shared.report("post message", e).await);
                }
                api.start_run(&api_key, &thread_id, &assistant_id).await
            }
            None => api.create_thread_and_run(&api_key, &assistant_id, text).await,
        };

        let started = match started {
            Ok(started) => started,
            Err(e) => {
                let mut session = self.shared.session.lock().await;
                if posted {
                    // The message is on the thread even though no run answers it.
                    session.confirm_optimistic(&local.id);
                } else {
                    session.discard_optimistic(&local.id);
                }
                drop(session);
                return Err(self.shared.report("start run", e).await);
            }
        };

        let token = {
            let mut session = self.shared.session.lock().await;
            if session.api_key() != api_key {
                debug!("Session reset while starting run {}; not polling", started.run_id);
                return Ok(None);
            }
            session.set_thread_id(&started.thread_id);
            session.begin_run(&started.run_id)
        };
        info!("Started run {} on thread {}", started.run_id, started.thread_id);
        self.shared.emit(ChatEvent::RunStarted {
            thread_id: started.thread_id.clone(),
            run_id: started.run_id.clone(),
        });

        let shared = Arc::clone(&self.shared);
        let run = started.clone();
        let handle = tokio::spawn(async move {
            shared.poll_and_refresh(api_key, run, token).await;
        });
        *self.poll_task.lock().await = Some(handle);

        Ok(Some(started))
    }

    /// Waits for the most recently started poll task to finish.
    pub async fn wait_for_run(&self) {
        let handle = self.poll_task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Run polling task failed: {}", e);
            }
        }
    }

    /// Fetches the whole transcript of the active thread.
    pub async fn refresh_transcript(&self) -> Result<()> {
        let (api_key, thread_id) = {
            let session = self.shared.session.lock().await;
            if !session.has_thread() {
                debug!("refresh_transcript skipped: no credential or thread");
                return Ok(());
            }
            (session.api_key().to_string(), session.thread_id().unwrap_or_default().to_string())
        };
        match self.shared.fetch_transcript(&api_key, &thread_id, None).await {
            Ok(Some(messages)) => {
                self.shared.emit(ChatEvent::TranscriptUpdated { messages });
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(self.shared.report("fetch messages", e).await),
        }
    }

    pub async fn reset_all(&self) {
        self.shared.session.lock().await.reset_all();
        // The task exits on its own once it sees the cancelled token.
        self.poll_task.lock().await.take();
        info!("Session reset");
    }

    pub async fn snapshot(&self) -> SessionView {
        self.shared.session.lock().await.view()
    }

    async fn credential(&self) -> Option<String> {
        let session = self.shared.session.lock().await;
        if session.can_call() {
            Some(session.api_key().to_string())
        } else {
            debug!("Call skipped: no credential configured");
            None
        }
    }
}

impl<A: AssistantsApi + ?Sized + 'static> Shared<A> {
    /// Never waits on the listener; a full or closed channel drops the event.
    fn emit(&self, event: ChatEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => debug!("Chat event dropped, channel full: {:?}", event),
            Err(TrySendError::Closed(_)) => debug!("Chat event dropped: no listener"),
        }
    }

    async fn report(&self, action: &str, e: AssistantError) -> AssistantError {
        error!("Failed to {}: {}", action, e);
        self.session.lock().await.record_error(e.clone());
        self.emit(ChatEvent::Error { error: e.clone() });
        e
    }

    async fn poll_and_refresh(&self, api_key: String, run: ThreadRun, token: CancellationToken) {
        let outcome = RunPoller::new(self.api.as_ref(), &api_key, self.settings.poll_interval)
            .with_events(&self.events)
            .poll(&run.thread_id, &run.run_id, &token).await;

        match outcome {
            PollOutcome::Completed(_) => {
                match self.fetch_transcript(&api_key, &run.thread_id, Some(&run.run_id)).await {
                    Ok(Some(messages)) => {
                        self.emit(ChatEvent::TranscriptUpdated { messages });
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!("Failed to fetch messages after run {}: {}", run.run_id, e);
                        let current = self.session.lock().await.finish_run(&run.run_id, Some(e.clone()));
                        if current {
                            self.emit(ChatEvent::Error { error: e });
                        }
                    }
                }
            }
            PollOutcome::Failed { status, reason } => {
                let e = AssistantError::RunFailure {
                    run_id: run.run_id.clone(),
                    status,
                    message: reason,
                };
                error!("{}", e);
                let current = self.session.lock().await.finish_run(&run.run_id, Some(e.clone()));
                if current {
                    self.emit(ChatEvent::RunFailed { error: e });
                }
            }
            PollOutcome::Superseded => {
                debug!("Run {} superseded; result ignored", run.run_id);
            }
        }
    }

    /// Lists the thread and applies it to the session. `Ok(None)` when the
    /// result no longer belongs to the session (reset, other thread, or a
    /// newer run).
    async fn fetch_transcript(
        &self,
        api_key: &str,
        thread_id: &str,
        for_run: Option<&str>
    ) -> Result<Option<Vec<Message>>> {
        let _guard = self.fetch_lock.lock().await;

        if !self.still_current(api_key, thread_id, for_run).await {
            return Ok(None);
        }
        let fetched = self.api.list_messages(api_key, thread_id).await?;

        let mut session = self.session.lock().await;
        if session.api_key() != api_key || session.thread_id() != Some(thread_id) {
            return Ok(None);
        }
        if !session.apply_transcript(for_run, fetched) {
            return Ok(None);
        }
        if let Some(run_id) = for_run {
            session.finish_run(run_id, None);
        }
        debug!("Transcript now holds {} messages", session.transcript().len());
        Ok(Some(session.transcript().to_vec()))
    }

    async fn still_current(&self, api_key: &str, thread_id: &str, for_run: Option<&str>) -> bool {
        let session = self.session.lock().await;
        session.api_key() == api_key &&
            session.thread_id() == Some(thread_id) &&
            for_run.map_or(true, |run_id| session.is_current_run(run_id))
    }
}
