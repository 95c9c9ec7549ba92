//! Events delivered to a session's loop.
//!
//! Everything a session reacts to arrives on one channel: decoded terminal
//! input, window size changes, and completions posted by executor tasks.

use std::path::PathBuf;

use crossterm::event::KeyEvent;
use tokio::sync::oneshot;

use crate::generation::{GenerateError, Generated, TaskType};

/// Which transient feedback slot an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackKind {
    Copy,
    Save,
}

#[derive(Debug)]
pub enum SessionEvent {
    Key(KeyEvent),
    Resize { width: u16, height: u16 },
    Completion(Completion),
    /// The peer closed the connection or the input stream failed.
    Closed,
}

/// Result of work started by a command.
#[derive(Debug)]
pub enum Completion {
    Generated {
        id: u64,
        result: Result<Generated, GenerateError>,
    },
    /// The running generation needs answers before it can continue.
    /// Dropping `reply` cancels the generation.
    Questions {
        id: u64,
        task_type: TaskType,
        questions: Vec<String>,
        reply: oneshot::Sender<Vec<String>>,
    },
    /// Clipboard escape sequence ready to be written to the terminal.
    Copied { sequence: String },
    Saved(Result<PathBuf, String>),
    FeedbackExpired { kind: FeedbackKind, token: u64 },
}

impl From<Completion> for SessionEvent {
    fn from(completion: Completion) -> Self {
        SessionEvent::Completion(completion)
    }
}
