//! Per-session state machine.
//!
//! `App` owns everything one connected user sees and edits. It never performs
//! I/O: every event returns the commands the session loop must carry out.

use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::widgets::{Paragraph, Wrap};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::events::{Completion, FeedbackKind, SessionEvent};
use crate::generation::{GenerateError, Generated, GenerationRequest, TaskType};
use crate::text_input::TextInput;
use crate::validators::validate_generation_form;

pub const TASK_LIMIT: usize = 5000;
pub const DETAILS_LIMIT: usize = 5000;
pub const SECRET_LIMIT: usize = 50;
pub const ANSWER_LIMIT: usize = 500;

pub const COPY_FEEDBACK_DELAY: Duration = Duration::from_secs(2);
pub const SAVE_FEEDBACK_DELAY: Duration = Duration::from_secs(3);

/// Widest the form and result panes ever get.
pub const MAX_CONTENT_WIDTH: u16 = 80;
/// Rows of the result screen not available to the prompt itself.
pub const RESULT_CHROME_HEIGHT: u16 = 15;
/// Largest terminal a client may report; bigger sizes are clamped.
pub const MAX_VIEWPORT_WIDTH: u16 = 1000;
pub const MAX_VIEWPORT_HEIGHT: u16 = 500;

pub const IN_PROGRESS_MESSAGE: &str = "Generation already in progress";
pub const COPIED_MESSAGE: &str = "Copied to clipboard!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Input,
    Result,
}

/// Which form field receives edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    Task,
    Details,
    Secret,
}

impl Focus {
    pub const ALL: [Focus; 3] = [Focus::Task, Focus::Details, Focus::Secret];

    pub fn next(self) -> Self {
        match self {
            Focus::Task => Focus::Details,
            Focus::Details => Focus::Secret,
            Focus::Secret => Focus::Task,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Focus::Task => Focus::Secret,
            Focus::Details => Focus::Task,
            Focus::Secret => Focus::Details,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Focus::Task => "Task",
            Focus::Details => "Details (optional)",
            Focus::Secret => "Secret word",
        }
    }
}

/// Terminal size in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u16,
    pub height: u16,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 80,
            height: 24,
        }
    }
}

/// A transient status line. Only the expiry carrying the same token clears it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub text: String,
    pub expires_at: Instant,
    pub token: u64,
}

/// Questions the user is answering before the prompt can be composed.
#[derive(Debug)]
pub struct Interview {
    pub task_type: TaskType,
    pub questions: Vec<String>,
    pub answers: Vec<String>,
    pub input: TextInput,
    reply: Option<oneshot::Sender<Vec<String>>>,
}

impl Interview {
    fn new(
        task_type: TaskType,
        questions: Vec<String>,
        reply: oneshot::Sender<Vec<String>>,
    ) -> Self {
        Self {
            task_type,
            questions,
            answers: Vec::new(),
            input: TextInput::single_line(ANSWER_LIMIT),
            reply: Some(reply),
        }
    }

    /// Zero-based index of the question being answered.
    pub fn current(&self) -> usize {
        self.answers.len()
    }

    pub fn current_question(&self) -> Option<&str> {
        self.questions.get(self.current()).map(String::as_str)
    }

    /// Record the typed answer. Returns true once every question is answered,
    /// at which point the answers have been handed back to the generator.
    fn submit(&mut self) -> bool {
        self.answers.push(self.input.value().trim().to_string());
        self.input.clear();
        if self.answers.len() < self.questions.len() {
            return false;
        }
        if let Some(reply) = self.reply.take() {
            // The generator may have been aborted already; nothing to do then.
            let _ = reply.send(std::mem::take(&mut self.answers));
        }
        true
    }
}

/// The single outstanding generation, if any.
#[derive(Debug, Default)]
pub enum GenerationState {
    #[default]
    Idle,
    Running {
        id: u64,
    },
    Interviewing {
        id: u64,
        interview: Interview,
    },
}

impl GenerationState {
    fn id(&self) -> Option<u64> {
        match self {
            GenerationState::Idle => None,
            GenerationState::Running { id } | GenerationState::Interviewing { id, .. } => Some(*id),
        }
    }
}

/// Side effects requested by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Generate { id: u64, request: GenerationRequest },
    CancelGeneration,
    Copy(String),
    Save(String),
    ExpireFeedback {
        kind: FeedbackKind,
        token: u64,
        after: Duration,
    },
    /// Raw terminal output outside the rendered frame.
    Write(String),
    /// End the session, optionally printing text after leaving the UI.
    Exit { farewell: Option<String> },
}

/// Session state.
#[derive(Debug)]
pub struct App {
    pub mode: Mode,
    pub focus: Focus,
    pub task: TextInput,
    pub details: TextInput,
    pub secret: TextInput,
    pub generated_prompt: Option<String>,
    pub tip: Option<String>,
    pub scroll_offset: u16,
    pub error: Option<String>,
    pub copy_feedback: Option<Feedback>,
    pub save_feedback: Option<Feedback>,
    pub viewport: Viewport,
    pub generation: GenerationState,
    next_generation_id: u64,
    next_feedback_token: u64,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    pub fn new() -> Self {
        Self {
            mode: Mode::Input,
            focus: Focus::Task,
            task: TextInput::multi_line(TASK_LIMIT),
            details: TextInput::multi_line(DETAILS_LIMIT),
            secret: TextInput::single_line(SECRET_LIMIT),
            generated_prompt: None,
            tip: None,
            scroll_offset: 0,
            error: None,
            copy_feedback: None,
            save_feedback: None,
            viewport: Viewport::default(),
            generation: GenerationState::Idle,
            next_generation_id: 0,
            next_feedback_token: 0,
        }
    }

    pub fn field(&self, focus: Focus) -> &TextInput {
        match focus {
            Focus::Task => &self.task,
            Focus::Details => &self.details,
            Focus::Secret => &self.secret,
        }
    }

    fn field_mut(&mut self, focus: Focus) -> &mut TextInput {
        match focus {
            Focus::Task => &mut self.task,
            Focus::Details => &mut self.details,
            Focus::Secret => &mut self.secret,
        }
    }

    pub fn is_generating(&self) -> bool {
        !matches!(self.generation, GenerationState::Idle)
    }

    pub fn interview(&self) -> Option<&Interview> {
        match &self.generation {
            GenerationState::Interviewing { interview, .. } => Some(interview),
            _ => None,
        }
    }

    /// Width of the form fields and result panes.
    pub fn content_width(&self) -> u16 {
        self.viewport.width.saturating_sub(4).min(MAX_CONTENT_WIDTH)
    }

    /// Rows available to the generated prompt on the result screen.
    pub fn result_height(&self) -> u16 {
        self.viewport
            .height
            .saturating_sub(RESULT_CHROME_HEIGHT)
            .max(1)
    }

    /// Text width inside the prompt box (border plus one column of padding
    /// on each side).
    pub fn result_text_width(&self) -> u16 {
        self.content_width().saturating_sub(4)
    }

    pub fn visual_line_count(&self) -> u16 {
        let width = self.result_text_width();
        let Some(prompt) = &self.generated_prompt else {
            return 0;
        };
        if width == 0 {
            return 0;
        }
        let paragraph = Paragraph::new(prompt.as_str()).wrap(Wrap { trim: false });
        paragraph.line_count(width).min(u16::MAX as usize) as u16
    }

    pub fn max_scroll(&self) -> u16 {
        self.visual_line_count()
            .saturating_sub(self.result_height())
    }

    pub fn scroll_up(&mut self, amount: u16) {
        self.scroll_offset = self.scroll_offset.saturating_sub(amount);
    }

    pub fn scroll_down(&mut self, amount: u16) {
        self.scroll_offset = self
            .scroll_offset
            .saturating_add(amount)
            .min(self.max_scroll());
    }

    pub fn scroll_to_top(&mut self) {
        self.scroll_offset = 0;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_offset = self.max_scroll();
    }

    /// Back to an empty form. The viewport is the only state kept.
    pub fn reset(&mut self) {
        let viewport = self.viewport;
        let next_generation_id = self.next_generation_id;
        let next_feedback_token = self.next_feedback_token;
        *self = Self {
            viewport,
            next_generation_id,
            next_feedback_token,
            ..Self::new()
        };
    }

    pub fn handle_event(&mut self, event: SessionEvent, now: Instant) -> Vec<Command> {
        match event {
            SessionEvent::Key(key) => self.handle_key(key),
            SessionEvent::Resize { width, height } => {
                self.resize(width, height);
                Vec::new()
            }
            SessionEvent::Completion(completion) => self.handle_completion(completion, now),
            SessionEvent::Closed => vec![Command::Exit { farewell: None }],
        }
    }

    pub fn resize(&mut self, width: u16, height: u16) {
        self.viewport = Viewport {
            width: width.min(MAX_VIEWPORT_WIDTH),
            height: height.min(MAX_VIEWPORT_HEIGHT),
        };
        self.scroll_offset = self.scroll_offset.min(self.max_scroll());
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Vec<Command> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return vec![Command::Exit { farewell: None }];
        }
        match self.mode {
            Mode::Input => self.handle_input_key(key),
            Mode::Result => self.handle_result_key(key),
        }
    }

    fn handle_input_key(&mut self, key: KeyEvent) -> Vec<Command> {
        if let GenerationState::Interviewing { interview, .. } = &mut self.generation {
            match key.code {
                KeyCode::Esc => return self.cancel_generation(),
                KeyCode::Enter => {
                    if interview.submit() {
                        if let Some(id) = self.generation.id() {
                            self.generation = GenerationState::Running { id };
                        }
                    }
                }
                _ => {
                    interview.input.handle_key(key);
                }
            }
            return Vec::new();
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc if self.is_generating() => self.cancel_generation(),
            KeyCode::Tab => {
                self.focus = self.focus.next();
                self.error = None;
                Vec::new()
            }
            KeyCode::BackTab => {
                self.focus = self.focus.prev();
                self.error = None;
                Vec::new()
            }
            KeyCode::Char('e') if ctrl => self.trigger_generation(),
            _ => {
                if self.field_mut(self.focus).handle_key(key) {
                    self.error = None;
                }
                Vec::new()
            }
        }
    }

    fn trigger_generation(&mut self) -> Vec<Command> {
        if self.is_generating() {
            self.error = Some(IN_PROGRESS_MESSAGE.to_string());
            return Vec::new();
        }
        if let Some(message) = validate_generation_form(&self.task.value(), &self.secret.value()) {
            self.error = Some(message);
            return Vec::new();
        }

        self.error = None;
        self.next_generation_id += 1;
        let id = self.next_generation_id;
        self.generation = GenerationState::Running { id };
        vec![Command::Generate {
            id,
            request: GenerationRequest {
                task: self.task.value(),
                details: self.details.value(),
                secret: self.secret.value(),
            },
        }]
    }

    fn cancel_generation(&mut self) -> Vec<Command> {
        // Dropping an interview's reply sender unblocks the generator with a
        // cancellation even if the abort has not landed yet.
        self.generation = GenerationState::Idle;
        vec![Command::CancelGeneration]
    }

    fn handle_result_key(&mut self, key: KeyEvent) -> Vec<Command> {
        let page = self.result_height();
        let half_page = (page / 2).max(1);

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('u') => self.scroll_up(half_page),
                KeyCode::Char('d') => self.scroll_down(half_page),
                _ => {}
            }
            return Vec::new();
        }

        let prompt = self.generated_prompt.clone().unwrap_or_default();
        match key.code {
            KeyCode::Char('c') => return vec![Command::Copy(prompt)],
            KeyCode::Char('s') => return vec![Command::Save(prompt)],
            KeyCode::Char('p') => {
                return vec![Command::Exit {
                    farewell: Some(framed_prompt(&prompt)),
                }];
            }
            KeyCode::Char('q') => return vec![Command::Exit { farewell: None }],
            KeyCode::Char('r') => self.reset(),
            KeyCode::Up | KeyCode::Char('k') => self.scroll_up(1),
            KeyCode::Down | KeyCode::Char('j') => self.scroll_down(1),
            KeyCode::PageUp | KeyCode::Char('b') => self.scroll_up(page),
            KeyCode::PageDown | KeyCode::Char(' ') => self.scroll_down(page),
            KeyCode::Home | KeyCode::Char('g') => self.scroll_to_top(),
            KeyCode::End | KeyCode::Char('G') => self.scroll_to_bottom(),
            _ => {}
        }
        Vec::new()
    }

    pub fn handle_completion(&mut self, completion: Completion, now: Instant) -> Vec<Command> {
        match completion {
            Completion::Generated { id, result } => {
                if self.generation.id() == Some(id) {
                    self.generation = GenerationState::Idle;
                    self.finish_generation(result);
                }
                Vec::new()
            }
            Completion::Questions {
                id,
                task_type,
                questions,
                reply,
            } => {
                if matches!(self.generation, GenerationState::Running { id: running } if running == id)
                {
                    self.generation = GenerationState::Interviewing {
                        id,
                        interview: Interview::new(task_type, questions, reply),
                    };
                }
                Vec::new()
            }
            Completion::Copied { sequence } => {
                let token = self.show_feedback(
                    FeedbackKind::Copy,
                    COPIED_MESSAGE.to_string(),
                    now + COPY_FEEDBACK_DELAY,
                );
                vec![
                    Command::Write(sequence),
                    Command::ExpireFeedback {
                        kind: FeedbackKind::Copy,
                        token,
                        after: COPY_FEEDBACK_DELAY,
                    },
                ]
            }
            Completion::Saved(result) => {
                let text = match result {
                    Ok(path) => format!("Saved to {}", path.display()),
                    Err(err) => format!("Error: {}", err),
                };
                let token = self.show_feedback(FeedbackKind::Save, text, now + SAVE_FEEDBACK_DELAY);
                vec![Command::ExpireFeedback {
                    kind: FeedbackKind::Save,
                    token,
                    after: SAVE_FEEDBACK_DELAY,
                }]
            }
            Completion::FeedbackExpired { kind, token } => {
                let slot = self.feedback_slot(kind);
                if slot.as_ref().is_some_and(|f| f.token == token) {
                    *slot = None;
                }
                Vec::new()
            }
        }
    }

    fn finish_generation(&mut self, result: Result<Generated, GenerateError>) {
        match result {
            Ok(generated) => {
                self.generated_prompt = Some(generated.prompt);
                self.tip = Some(generated.tip);
                self.error = None;
                self.scroll_offset = 0;
                self.mode = Mode::Result;
            }
            Err(err) => {
                self.error = Some(err.to_string());
            }
        }
    }

    fn feedback_slot(&mut self, kind: FeedbackKind) -> &mut Option<Feedback> {
        match kind {
            FeedbackKind::Copy => &mut self.copy_feedback,
            FeedbackKind::Save => &mut self.save_feedback,
        }
    }

    fn show_feedback(&mut self, kind: FeedbackKind, text: String, expires_at: Instant) -> u64 {
        self.next_feedback_token += 1;
        let token = self.next_feedback_token;
        *self.feedback_slot(kind) = Some(Feedback {
            text,
            expires_at,
            token,
        });
        token
    }
}

/// The prompt framed by `=` banners, with CRLF line endings for a raw terminal.
pub fn framed_prompt(prompt: &str) -> String {
    let rule = "=".repeat(80);
    let body = prompt.replace("\r\n", "\n").replace('\n', "\r\n");
    format!("\r\n{rule}\r\nENHANCED PROMPT\r\n{rule}\r\n\r\n{body}\r\n\r\n{rule}\r\n")
}
