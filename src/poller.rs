use log::{ debug, error, warn };
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::AssistantsApi;
use crate::models::assistant::{ Run, RunStatus };
use crate::models::chat::ChatEvent;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(Run),
    Failed {
        status: RunStatus,
        reason: Option<String>,
    },
    /// The run was replaced by a newer one or the session was reset.
    Superseded,
}

/// Polls a run every `interval` until it reaches a terminal status or
/// `cancel` fires. At most one status request is in flight at a time.
pub struct RunPoller<'a, A: AssistantsApi + ?Sized> {
    api: &'a A,
    api_key: &'a str,
    interval: Duration,
    events: Option<&'a mpsc::Sender<ChatEvent>>,
}

impl<'a, A: AssistantsApi + ?Sized> RunPoller<'a, A> {
    pub fn new(api: &'a A, api_key: &'a str, interval: Duration) -> Self {
        Self {
            api,
            api_key,
            interval,
            events: None,
        }
    }

    /// Reports every observed status change on `events`.
    pub fn with_events(mut self, events: &'a mpsc::Sender<ChatEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn poll(&self, thread_id: &str, run_id: &str, cancel: &CancellationToken) -> PollOutcome {
        let mut last_status: Option<RunStatus> = None;
        let mut warned_unknown = false;

        loop {
            if cancel.is_cancelled() {
                debug!("Polling for run {} stopped: superseded", run_id);
                return PollOutcome::Superseded;
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Polling for run {} cancelled while waiting", run_id);
                    return PollOutcome::Superseded;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }

            let run = tokio::select! {
                _ = cancel.cancelled() => {
                    return PollOutcome::Superseded;
                }
                res = self.api.get_run(self.api_key, thread_id, run_id) => res,
            };

            let run = match run {
                Ok(run) => run,
                Err(e) => {
                    error!("Failed to fetch status of run {}: {}", run_id, e);
                    continue;
                }
            };

            if last_status.as_ref() != Some(&run.status) {
                debug!("Run {} status: {}", run_id, run.status);
                if let Some(tx) = self.events {
                    let event = ChatEvent::RunStatus {
                        run_id: run_id.to_string(),
                        status: run.status.clone(),
                    };
                    if tx.try_send(event).is_err() {
                        debug!("Status event for run {} dropped", run_id);
                    }
                }
                last_status = Some(run.status.clone());
            }

            if let RunStatus::Unknown(raw) = &run.status {
                if !warned_unknown {
                    warn!("Run {} reported unrecognised status '{}'; still polling", run_id, raw);
                    warned_unknown = true;
                }
            }

            if !run.status.is_terminal() {
                continue;
            }
            if run.status == RunStatus::Completed {
                return PollOutcome::Completed(run);
            }
            let reason = run.failure_reason();
            return PollOutcome::Failed { status: run.status, reason };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedApi;
    use std::sync::Arc;

    const INTERVAL: Duration = Duration::from_millis(1000);

    #[tokio::test(start_paused = true)]
    async fn pending_statuses_loop_until_completed() {
        let api = ScriptedApi::new();
        api.script_run("run_1", &["queued", "in_progress", "completed"]);
        let cancel = CancellationToken::new();

        let outcome = RunPoller::new(&api, "sk-test", INTERVAL).poll("thread_1", "run_1", &cancel).await;

        assert!(matches!(outcome, PollOutcome::Completed(ref run) if run.id == "run_1"));
        assert_eq!(api.calls("get_run"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_status_stops_immediately() {
        let api = ScriptedApi::new();
        api.script_run("run_1", &["queued", "failed", "completed"]);
        let cancel = CancellationToken::new();

        let outcome = RunPoller::new(&api, "sk-test", INTERVAL).poll("thread_1", "run_1", &cancel).await;

        assert_eq!(outcome, PollOutcome::Failed { status: RunStatus::Failed, reason: None });
        assert_eq!(api.calls("get_run"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_is_terminal() {
        let api = ScriptedApi::new();
        api.script_run("run_1", &["expired"]);
        let outcome = RunPoller::new(&api, "sk-test", INTERVAL).poll(
            "thread_1",
            "run_1",
            &CancellationToken::new()
        ).await;
        assert!(matches!(outcome, PollOutcome::Failed { status: RunStatus::Expired, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_waits_and_requires_action_fails() {
        let api = ScriptedApi::new();
        api.script_run("run_1", &["cancelling", "requires_action"]);
        let outcome = RunPoller::new(&api, "sk-test", INTERVAL).poll(
            "thread_1",
            "run_1",
            &CancellationToken::new()
        ).await;
        assert!(matches!(outcome, PollOutcome::Failed { status: RunStatus::RequiresAction, .. }));
        assert_eq!(api.calls("get_run"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn full_event_channel_does_not_stall_polling() {
        let api = ScriptedApi::new();
        api.script_run("run_1", &["queued", "in_progress", "completed"]);
        let (tx, _rx) = mpsc::channel(1);

        let outcome = RunPoller::new(&api, "sk-test", INTERVAL)
            .with_events(&tx)
            .poll("thread_1", "run_1", &CancellationToken::new()).await;

        assert!(matches!(outcome, PollOutcome::Completed(_)));
        assert_eq!(api.calls("get_run"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_status_keeps_polling() {
        let api = ScriptedApi::new();
        api.script_run("run_1", &["warming_up", "warming_up", "completed"]);
        let outcome = RunPoller::new(&api, "sk-test", INTERVAL).poll(
            "thread_1",
            "run_1",
            &CancellationToken::new()
        ).await;
        assert!(matches!(outcome, PollOutcome::Completed(_)));
        assert_eq!(api.calls("get_run"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_status_error_does_not_stop_polling() {
        let api = ScriptedApi::new();
        api.script_run("run_1", &["in_progress", "completed"]);
        api.fail_next("get_run");
        let outcome = RunPoller::new(&api, "sk-test", INTERVAL).poll(
            "thread_1",
            "run_1",
            &CancellationToken::new()
        ).await;
        assert!(matches!(outcome, PollOutcome::Completed(_)));
        assert_eq!(api.calls("get_run"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_token_makes_no_calls() {
        let api = ScriptedApi::new();
        api.script_run("run_1", &["completed"]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = RunPoller::new(&api, "sk-test", INTERVAL).poll("thread_1", "run_1", &cancel).await;

        assert_eq!(outcome, PollOutcome::Superseded);
        assert_eq!(api.calls("get_run"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_wait_stops_the_loop() {
        let api = Arc::new(ScriptedApi::new());
        api.script_run("run_1", &["in_progress"]);
        let cancel = CancellationToken::new();

        let task = {
            let api = api.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                RunPoller::new(api.as_ref(), "sk-test", INTERVAL).poll("thread_1", "run_1", &cancel).await
            })
        };

        tokio::time::sleep(INTERVAL * 3 + INTERVAL / 2).await;
        cancel.cancel();
        let outcome = task.await.unwrap();

        assert_eq!(outcome, PollOutcome::Superseded);
        assert_eq!(api.calls("get_run"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn status_changes_are_reported_once() {
        let api = ScriptedApi::new();
        api.script_run("run_1", &["queued", "queued", "in_progress", "completed"]);
        let (tx, mut rx) = mpsc::channel(16);

        RunPoller::new(&api, "sk-test", INTERVAL)
            .with_events(&tx)
            .poll("thread_1", "run_1", &CancellationToken::new()).await;
        drop(tx);

        let mut statuses = Vec::new();
        while let Some(ChatEvent::RunStatus { status, .. }) = rx.recv().await {
            statuses.push(status);
        }
        assert_eq!(statuses, vec![RunStatus::Queued, RunStatus::InProgress, RunStatus::Completed]);
    }
}
