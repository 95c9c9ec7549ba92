//! Runs the slow side of session commands.
//!
//! Every command becomes a task in a `JoinSet` owned by the session. Each task
//! posts exactly one completion back on the session's event channel. Dropping
//! the executor aborts whatever is still running.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::future::BoxFuture;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::app::Command;
use crate::events::{Completion, FeedbackKind, SessionEvent};
use crate::generation::{GenerateError, GenerationRequest, Generator, Interviewer, TaskType};

/// Upper bound for clipboard content, marker included.
pub const MAX_CLIPBOARD_BYTES: usize = 100 * 1024;
pub const TRUNCATION_MARKER: &str = "\n\n[... truncated for clipboard]";

pub struct Executor {
    tasks: JoinSet<()>,
    events: mpsc::Sender<SessionEvent>,
    generator: Arc<Generator>,
    export_dir: PathBuf,
    generation: Option<AbortHandle>,
}

impl Executor {
    pub fn new(
        generator: Arc<Generator>,
        export_dir: PathBuf,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            tasks: JoinSet::new(),
            events,
            generator,
            export_dir,
            generation: None,
        }
    }

    /// Start the work for `command`. Terminal output and exit are the session's
    /// business and are ignored here.
    pub fn execute(&mut self, command: Command) {
        match command {
            Command::Generate { id, request } => self.generate(id, request),
            Command::CancelGeneration => {
                if let Some(handle) = self.generation.take() {
                    handle.abort();
                    info!("generation_cancelled");
                }
            }
            Command::Copy(content) => {
                let events = self.events.clone();
                self.tasks.spawn(async move {
                    let sequence = clipboard_sequence(&content);
                    debug!(bytes = sequence.len(), "clipboard_sequence_ready");
                    let _ = events.send(Completion::Copied { sequence }.into()).await;
                });
            }
            Command::Save(content) => {
                let events = self.events.clone();
                let dir = self.export_dir.clone();
                self.tasks.spawn(async move {
                    let result = save_prompt(&dir, &content).await;
                    match &result {
                        Ok(path) => info!(path = %path.display(), "prompt_saved"),
                        Err(err) => warn!(dir = %dir.display(), error = %err, "prompt_save_failed"),
                    }
                    let result = result.map_err(|err| err.to_string());
                    let _ = events.send(Completion::Saved(result).into()).await;
                });
            }
            Command::ExpireFeedback { kind, token, after } => {
                let events = self.events.clone();
                self.tasks.spawn(async move {
                    tokio::time::sleep(after).await;
                    let _ = events
                        .send(Completion::FeedbackExpired { kind, token }.into())
                        .await;
                });
            }
            Command::Write(_) | Command::Exit { .. } => {}
        }
    }

    fn generate(&mut self, id: u64, request: GenerationRequest) {
        let events = self.events.clone();
        let generator = Arc::clone(&self.generator);
        let handle = self.tasks.spawn(async move {
            let started = tokio::time::Instant::now();
            info!(
                generation_id = id,
                strategy = generator.strategy_name(),
                "generation_started"
            );
            let interviewer = ChannelInterviewer {
                id,
                events: events.clone(),
            };
            let result = generator.generate(&request, &interviewer).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            match &result {
                Ok(generated) => info!(
                    generation_id = id,
                    elapsed_ms,
                    prompt_chars = generated.prompt.chars().count(),
                    "generation_completed"
                ),
                Err(err) => warn!(generation_id = id, elapsed_ms, error = %err, "generation_failed"),
            }
            let _ = events
                .send(Completion::Generated { id, result }.into())
                .await;
        });
        if let Some(previous) = self.generation.replace(handle) {
            previous.abort();
        }
    }

    /// Collect finished tasks so the set does not grow without bound.
    pub fn reap(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            if let Err(err) = joined
                && err.is_panic()
            {
                warn!(error = %err, "executor_task_panicked");
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.tasks.len()
    }
}

/// Puts questions to the session through its event channel and waits for the
/// answers. A dropped reply means the user cancelled.
struct ChannelInterviewer {
    id: u64,
    events: mpsc::Sender<SessionEvent>,
}

impl Interviewer for ChannelInterviewer {
    fn interview<'a>(
        &'a self,
        task_type: TaskType,
        questions: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<String>, GenerateError>> {
        Box::pin(async move {
            let (reply, answers) = oneshot::channel();
            let completion = Completion::Questions {
                id: self.id,
                task_type,
                questions: questions.to_vec(),
                reply,
            };
            self.events
                .send(completion.into())
                .await
                .map_err(|_| GenerateError::Cancelled)?;
            answers.await.map_err(|_| GenerateError::Cancelled)
        })
    }
}

/// Cut `content` so that it plus the truncation marker fits the clipboard
/// bound. Content already within the bound is returned unchanged.
pub fn truncate_for_clipboard(content: &str) -> Cow<'_, str> {
    if content.len() <= MAX_CLIPBOARD_BYTES {
        return Cow::Borrowed(content);
    }
    let mut cut = MAX_CLIPBOARD_BYTES - TRUNCATION_MARKER.len();
    while !content.is_char_boundary(cut) {
        cut -= 1;
    }
    Cow::Owned(format!("{}{}", &content[..cut], TRUNCATION_MARKER))
}

/// OSC 52 sequence asking the terminal to place `content` on the clipboard.
pub fn clipboard_sequence(content: &str) -> String {
    let payload = STANDARD.encode(truncate_for_clipboard(content).as_bytes());
    format!("\x1b]52;c;{}\x1b\\", payload)
}

pub fn export_file_name(at: SystemTime) -> String {
    let secs = at
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs();
    format!("prompt_{}.txt", secs)
}

/// Write the prompt to a timestamped file in `dir` with mode 0644.
pub async fn save_prompt(dir: &Path, content: &str) -> std::io::Result<PathBuf> {
    let path = dir.join(export_file_name(SystemTime::now()));

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o644);

    let mut file = options.open(&path).await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await?;
    Ok(path)
}
