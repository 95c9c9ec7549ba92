//! One connected user.
//!
//! A reader task decodes client bytes into events; the session loop feeds
//! them, together with executor completions, through the state machine one
//! at a time and writes the resulting frame back to the client.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::app::{App, Command};
use crate::events::SessionEvent;
use crate::executor::Executor;
use crate::generation::Generator;
use crate::terminal::{Input, InputDecoder, Screen, negotiation};
use crate::theme::Theme;
use crate::ui;

const EVENT_CHANNEL_CAPACITY: usize = 64;
const READ_BUFFER_SIZE: usize = 1024;
const SHUTDOWN_NOTICE: &str = "\r\nServer is shutting down. Goodbye.\r\n";
/// How long the shutdown notice may take to reach a client.
const GOODBYE_TIMEOUT: Duration = Duration::from_secs(1);
/// How long a trailing ESC waits for the rest of its sequence.
const ESCAPE_TIMEOUT: Duration = Duration::from_millis(50);

/// Process-wide, read-only state every session works from.
pub struct SessionContext {
    pub generator: Arc<Generator>,
    pub theme: Theme,
    pub export_dir: PathBuf,
}

/// Why a session loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The user quit, printed, or pressed Ctrl+C.
    Exited,
    /// The client went away.
    Disconnected,
    /// The server cancelled the session during shutdown.
    Cancelled,
}

impl SessionEnd {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEnd::Exited => "exited",
            SessionEnd::Disconnected => "disconnected",
            SessionEnd::Cancelled => "cancelled",
        }
    }
}

/// Drive a session over `stream` until the user leaves, the client
/// disconnects, or `cancel` fires.
pub async fn run_session<S>(
    stream: S,
    context: Arc<SessionContext>,
    cancel: CancellationToken,
) -> io::Result<SessionEnd>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let app = App::new();
    let screen = Screen::new(app.viewport.width, app.viewport.height)?;

    let (reader, writer) = tokio::io::split(stream);
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let reader_task = tokio::spawn(read_input(reader, tx.clone()));

    let executor = Executor::new(
        Arc::clone(&context.generator),
        context.export_dir.clone(),
        tx,
    );
    let mut session = Session {
        app,
        executor,
        screen,
        writer,
        context,
    };

    let result = session.run(rx, cancel).await;
    reader_task.abort();
    session.executor.reap();
    if session.executor.pending() > 0 {
        debug!(pending = session.executor.pending(), "session_tasks_aborted");
    }
    result
}

struct Session<W> {
    app: App,
    executor: Executor,
    screen: Screen,
    writer: W,
    context: Arc<SessionContext>,
}

impl<W: AsyncWrite + Unpin> Session<W> {
    /// Serve until the session ends on its own or `cancel` fires. Cancellation
    /// also interrupts a write to a client that stopped reading.
    async fn run(
        &mut self,
        mut events: mpsc::Receiver<SessionEvent>,
        cancel: CancellationToken,
    ) -> io::Result<SessionEnd> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {}
            end = self.serve(&mut events) => return end,
        }

        let mut out = self.screen.leave()?;
        out.extend_from_slice(SHUTDOWN_NOTICE.as_bytes());
        // The client may be gone or not reading; the session ends either way.
        let _ = tokio::time::timeout(GOODBYE_TIMEOUT, self.send(&out)).await;
        Ok(SessionEnd::Cancelled)
    }

    async fn serve(&mut self, events: &mut mpsc::Receiver<SessionEvent>) -> io::Result<SessionEnd> {
        let mut out = negotiation().to_vec();
        out.extend(self.screen.enter()?);
        self.draw_into(&mut out)?;
        self.send(&out).await?;

        while let Some(event) = events.recv().await {
            if matches!(event, SessionEvent::Closed) {
                break;
            }
            let resized = matches!(event, SessionEvent::Resize { .. });

            let commands = self.app.handle_event(event, Instant::now());
            let mut out = Vec::new();
            let mut farewell = None;
            for command in commands {
                match command {
                    Command::Write(text) => out.extend_from_slice(text.as_bytes()),
                    Command::Exit { farewell: text } => farewell = Some(text),
                    command => self.executor.execute(command),
                }
            }
            self.executor.reap();

            if let Some(text) = farewell {
                out.extend(self.screen.leave()?);
                if let Some(text) = text {
                    out.extend_from_slice(text.as_bytes());
                }
                self.send(&out).await?;
                return Ok(SessionEnd::Exited);
            }

            if resized {
                self.screen
                    .resize(self.app.viewport.width, self.app.viewport.height)?;
            }
            self.draw_into(&mut out)?;
            self.send(&out).await?;
        }
        Ok(SessionEnd::Disconnected)
    }

    fn draw_into(&mut self, out: &mut Vec<u8>) -> io::Result<()> {
        let frame = self
            .screen
            .draw(|frame| ui::render(frame, &self.app, &self.context.theme))?;
        out.extend(frame);
        Ok(())
    }

    async fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.writer.write_all(bytes).await?;
        self.writer.flush().await
    }
}

async fn read_input<S: AsyncRead>(mut reader: ReadHalf<S>, events: mpsc::Sender<SessionEvent>) {
    let mut decoder = InputDecoder::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let mut awaiting_more = false;
    loop {
        let read = if awaiting_more {
            match tokio::time::timeout(ESCAPE_TIMEOUT, reader.read(&mut buf)).await {
                Ok(read) => read,
                Err(_) => {
                    // The line went quiet; settle any sequence held back.
                    awaiting_more = false;
                    if !forward(decoder.flush(), &events).await {
                        return;
                    }
                    continue;
                }
            }
        } else {
            reader.read(&mut buf).await
        };

        let n = match read {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                debug!(error = %err, "session_read_failed");
                break;
            }
        };
        awaiting_more = true;
        if !forward(decoder.feed(&buf[..n]), &events).await {
            return;
        }
    }
    let _ = events.send(SessionEvent::Closed).await;
}

/// Returns false once the session loop has gone away.
async fn forward(inputs: Vec<Input>, events: &mpsc::Sender<SessionEvent>) -> bool {
    for input in inputs {
        let event = match input {
            Input::Key(key) => SessionEvent::Key(key),
            Input::Resize { width, height } => {
                info!(width, height, "session_resized");
                SessionEvent::Resize { width, height }
            }
        };
        if events.send(event).await.is_err() {
            return false;
        }
    }
    true
}
