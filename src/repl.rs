use chrono::{ DateTime, Local, Utc };
use futures::StreamExt;
use log::{ debug, warn };
use std::collections::HashSet;
use std::error::Error;
use tokio::io::{ AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt };
use tokio::sync::mpsc;
use tokio_stream::wrappers::LinesStream;

use crate::api::AssistantsApi;
use crate::chat::ChatController;
use crate::cli::Args;
use crate::models::assistant::{ Message, MessageRole };
use crate::models::chat::ChatEvent;

type BoxError = Box<dyn Error + Send + Sync>;

const HELP: &str =
    "Commands: /assistants, /files <vector_store_id>, /history, /reset, /help, /quit. Anything else is sent as a message.";

/// Values taken from the command line for the first configuration step only.
/// After a reset the user is always asked again.
#[derive(Debug, Clone, Default)]
pub struct InitialConfig {
    pub api_key: Option<String>,
    pub assistant_id: Option<String>,
    pub thread_id: Option<String>,
}

impl From<&Args> for InitialConfig {
    fn from(args: &Args) -> Self {
        let given = |v: &str| {
            let v = v.trim();
            if v.is_empty() { None } else { Some(v.to_string()) }
        };
        Self {
            api_key: given(&args.api_key),
            assistant_id: args.assistant_id.as_deref().and_then(given),
            thread_id: args.thread_id.as_deref().and_then(given),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Reset,
    Quit,
}

/// Line-oriented front end: a configuration step followed by the chat view.
pub struct Repl<A, R, W> where A: AssistantsApi + ?Sized + 'static, R: AsyncBufRead + Unpin, W: AsyncWrite + Unpin {
    chat: ChatController<A>,
    events: mpsc::Receiver<ChatEvent>,
    lines: LinesStream<R>,
    out: W,
    initial: Option<InitialConfig>,
    rendered: HashSet<String>,
}

impl<A, R, W> Repl<A, R, W>
    where A: AssistantsApi + ?Sized + 'static, R: AsyncBufRead + Unpin, W: AsyncWrite + Unpin
{
    pub fn new(
        chat: ChatController<A>,
        events: mpsc::Receiver<ChatEvent>,
        input: R,
        out: W,
        initial: InitialConfig
    ) -> Self {
        Self {
            chat,
            events,
            lines: LinesStream::new(input.lines()),
            out,
            initial: Some(initial),
            rendered: HashSet::new(),
        }
    }

    pub async fn run(mut self) -> Result<(), BoxError> {
        loop {
            if self.configure_step().await? == Step::Quit {
                break;
            }
            match self.chat_step().await? {
                Step::Reset => {
                    continue;
                }
                _ => {
                    break;
                }
            }
        }
        self.out.flush().await?;
        Ok(())
    }

    async fn say(&mut self, text: &str) -> Result<(), BoxError> {
        self.out.write_all(text.as_bytes()).await?;
        self.out.write_all(b"\n").await?;
        self.out.flush().await?;
        Ok(())
    }

    async fn ask(&mut self, prompt: &str) -> Result<Option<String>, BoxError> {
        self.out.write_all(prompt.as_bytes()).await?;
        self.out.flush().await?;
        match self.lines.next().await {
            Some(line) => Ok(Some(line?.trim().to_string())),
            None => Ok(None),
        }
    }

    async fn configure_step(&mut self) -> Result<Step, BoxError> {
        let initial = self.initial.take().unwrap_or_default();
        self.rendered.clear();

        loop {
            self.discard_pending_events();
            let api_key = match initial.api_key.clone() {
                Some(key) => key,
                None => {
                    match self.ask("API key: ").await? {
                        Some(key) if !key.is_empty() => key,
                        Some(_) => {
                            continue;
                        }
                        None => {
                            return Ok(Step::Quit);
                        }
                    }
                }
            };

            let assistant_id = match initial.assistant_id.clone() {
                Some(id) => id,
                None => {
                    self.chat.configure(&api_key, "", None).await?;
                    match self.choose_assistant().await? {
                        Some(id) => id,
                        None => {
                            return Ok(Step::Quit);
                        }
                    }
                }
            };
            if assistant_id.is_empty() {
                // Listing failed; the key was likely wrong.
                if initial.api_key.is_some() {
                    return Ok(Step::Quit);
                }
                continue;
            }

            if let Err(e) = self.chat.configure(&api_key, &assistant_id, initial.thread_id.as_deref()).await {
                self.say(&format!("Could not load the thread: {}", e)).await?;
            }
            let view = self.chat.snapshot().await;
            self.render_transcript(&view.transcript).await?;
            self.say(HELP).await?;
            return Ok(Step::Continue);
        }
    }

    /// Lists assistants and reads a choice. `Some("")` when listing failed.
    async fn choose_assistant(&mut self) -> Result<Option<String>, BoxError> {
        let assistants = match self.chat.list_assistants().await {
            Ok(list) => list,
            Err(e) => {
                self.say(&format!("Could not list assistants: {}", e)).await?;
                return Ok(Some(String::new()));
            }
        };

        if assistants.is_empty() {
            self.say("No assistants found for this key.").await?;
            return self.ask("Assistant ID: ").await;
        }

        self.say("Assistants:").await?;
        for (i, assistant) in assistants.iter().enumerate() {
            let line = match &assistant.model {
                Some(model) => format!("  {}. {} ({}, {})", i + 1, assistant.display_name(), assistant.id, model),
                None => format!("  {}. {} ({})", i + 1, assistant.display_name(), assistant.id),
            };
            self.say(&line).await?;
        }

        loop {
            let answer = match self.ask(&format!("Select assistant [1-{}] or enter an ID: ", assistants.len())).await? {
                Some(answer) => answer,
                None => {
                    return Ok(None);
                }
            };
            if let Ok(n) = answer.parse::<usize>() {
                if n >= 1 && n <= assistants.len() {
                    return Ok(Some(assistants[n - 1].id.clone()));
                }
                self.say("No assistant with that number.").await?;
                continue;
            }
            if !answer.is_empty() {
                return Ok(Some(answer));
            }
        }
    }

    // Events raised while configuring are shown inline, not replayed.
    fn discard_pending_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            debug!("Discarding configuration-time event: {:?}", event);
        }
    }

    async fn chat_step(&mut self) -> Result<Step, BoxError> {
        self.discard_pending_events();

        loop {
            tokio::select! {
                line = self.lines.next() => {
                    let line = match line {
                        Some(line) => line?,
                        None => {
                            // Input closed: let the pending reply arrive before leaving.
                            if self.chat.snapshot().await.loading {
                                self.chat.wait_for_run().await;
                            }
                            while let Ok(event) = self.events.try_recv() {
                                self.render_event(event).await?;
                            }
                            return Ok(Step::Quit);
                        }
                    };
                    let step = self.handle_line(line.trim()).await?;
                    if step != Step::Continue {
                        return Ok(step);
                    }
                }
                Some(event) = self.events.recv() => {
                    self.render_event(event).await?;
                }
            }
        }
    }

    async fn handle_line(&mut self, line: &str) -> Result<Step, BoxError> {
        if line.is_empty() {
            return Ok(Step::Continue);
        }
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((c, r)) => (c, r.trim()),
            None => (line, ""),
        };

        match command {
            "/quit" | "/exit" => {
                return Ok(Step::Quit);
            }
            "/reset" => {
                self.chat.reset_all().await;
                self.say("Session cleared.").await?;
                return Ok(Step::Reset);
            }
            "/help" => self.say(HELP).await?,
            "/history" => {
                let view = self.chat.snapshot().await;
                self.rendered.clear();
                self.render_transcript(&view.transcript).await?;
            }
            "/assistants" => {
                match self.chat.list_assistants().await {
                    Ok(list) => {
                        for assistant in list {
                            let line = format!("  {} ({})", assistant.display_name(), assistant.id);
                            self.say(&line).await?;
                        }
                    }
                    Err(e) => warn!("Listing assistants failed: {}", e),
                }
            }
            "/files" => {
                if rest.is_empty() {
                    self.say("Usage: /files <vector_store_id>").await?;
                    return Ok(Step::Continue);
                }
                match self.chat.list_vector_store_files(rest).await {
                    Ok(files) if files.is_empty() => self.say("No files.").await?,
                    Ok(files) => {
                        for file in files {
                            let line = format!(
                                "  {} [{}] {} bytes",
                                file.id,
                                file.status.as_deref().unwrap_or("unknown"),
                                file.usage_bytes
                            );
                            self.say(&line).await?;
                        }
                    }
                    Err(e) => warn!("Listing vector store files failed: {}", e),
                }
            }
            _ if command.starts_with('/') => {
                self.say(&format!("Unknown command {}. {}", command, HELP)).await?;
            }
            _ => {
                // Failures are reported through the event channel.
                if let Ok(Some(_)) = self.chat.send_message(line).await {
                    self.say("Assistant is thinking…").await?;
                }
            }
        }
        Ok(Step::Continue)
    }

    async fn render_event(&mut self, event: ChatEvent) -> Result<(), BoxError> {
        match event {
            ChatEvent::RunStarted { run_id, .. } => debug!("Run {} started", run_id),
            ChatEvent::RunStatus { run_id, status } => debug!("Run {} is {}", run_id, status),
            ChatEvent::TranscriptUpdated { messages } => {
                // Only replies are printed; the user's own lines are already on screen.
                for message in messages {
                    if self.rendered.insert(message.id.clone()) && message.role == MessageRole::Assistant {
                        self.render_message(&message, false).await?;
                    }
                }
            }
            ChatEvent::RunFailed { error } => {
                self.say(&format!("The assistant could not answer: {}", error)).await?;
            }
            ChatEvent::Error { error } => {
                self.say(&format!("Error: {}", error)).await?;
                if error.is_auth() {
                    self.say("Use /reset to enter another API key.").await?;
                }
            }
        }
        Ok(())
    }

    async fn render_transcript(&mut self, transcript: &[Message]) -> Result<(), BoxError> {
        for message in transcript {
            self.rendered.insert(message.id.clone());
            self.render_message(message, true).await?;
        }
        Ok(())
    }

    async fn render_message(&mut self, message: &Message, with_time: bool) -> Result<(), BoxError> {
        let time = DateTime::<Utc>::from_timestamp(message.created_at, 0)
            .filter(|_| with_time && message.created_at > 0)
            .map(|t| format!("[{}] ", t.with_timezone(&Local).format("%H:%M")))
            .unwrap_or_default();
        let text = format!("{}{}: {}", time, message.role.label(), message.content);
        self.say(&text).await
    }
}
