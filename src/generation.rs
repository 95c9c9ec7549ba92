//! Prompt generation strategies behind a single contract.
//!
//! A [`Generator`] is chosen once at startup and shared by every session.
//! Both strategies take the same three inputs and produce a prompt and a tip;
//! the remote one may additionally ask the user questions through an
//! [`Interviewer`] between its two phases.

pub mod anthropic;
pub mod local;
pub mod remote;

use std::fmt;

use futures::future::BoxFuture;
use serde::Deserialize;
use thiserror::Error;

pub use local::LocalGenerator;
pub use remote::{CompletionClient, RemoteGenerator};

/// The three form values a generation works from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub task: String,
    pub details: String,
    pub secret: String,
}

/// A finished prompt and the tip displayed next to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub prompt: String,
    pub tip: String,
}

/// Why a generation attempt failed. Every variant is final for that attempt.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("service returned an empty prompt")]
    EmptyPrompt,
    #[error("generation cancelled")]
    Cancelled,
}

/// Task classification produced by the analysis phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Feature,
    Bugfix,
    Testing,
    Refactoring,
    Documentation,
    Other,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Feature => "feature",
            TaskType::Bugfix => "bugfix",
            TaskType::Testing => "testing",
            TaskType::Refactoring => "refactoring",
            TaskType::Documentation => "documentation",
            TaskType::Other => "other",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collects answers to context questions from whoever started the generation.
///
/// Returning fewer answers than questions is allowed; missing answers are
/// treated as skipped.
pub trait Interviewer: Send + Sync {
    fn interview<'a>(
        &'a self,
        task_type: TaskType,
        questions: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<String>, GenerateError>>;
}

/// The configured generation strategy.
pub enum Generator {
    Local(LocalGenerator),
    Remote(RemoteGenerator),
}

impl Generator {
    pub fn strategy_name(&self) -> &'static str {
        match self {
            Generator::Local(_) => "local",
            Generator::Remote(_) => "remote",
        }
    }

    /// Produce a prompt for `request`. The local strategy never fails and never
    /// consults the interviewer.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        interviewer: &dyn Interviewer,
    ) -> Result<Generated, GenerateError> {
        match self {
            Generator::Local(local) => Ok(local.generate(request)),
            Generator::Remote(remote) => remote.generate(request, interviewer).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fakes shared by generation and session tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use futures::FutureExt;

    use super::*;

    /// Answers every question with a fixed list.
    pub struct FixedAnswers(pub Vec<String>);

    impl Interviewer for FixedAnswers {
        fn interview<'a>(
            &'a self,
            _task_type: TaskType,
            _questions: &'a [String],
        ) -> BoxFuture<'a, Result<Vec<String>, GenerateError>> {
            let answers = self.0.clone();
            async move { Ok(answers) }.boxed()
        }
    }

    /// Replays scripted responses in order and records what was sent.
    #[derive(Default)]
    pub struct ScriptedClient {
        responses: Mutex<VecDeque<Result<String, GenerateError>>>,
        pub requests: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedClient {
        pub fn new(responses: Vec<Result<String, GenerateError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl CompletionClient for ScriptedClient {
        fn complete<'a>(
            &'a self,
            system: &'a str,
            user: &'a str,
        ) -> BoxFuture<'a, Result<String, GenerateError>> {
            self.requests
                .lock()
                .unwrap()
                .push((system.to_string(), user.to_string()));
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GenerateError::Request("no scripted response".into())));
            async move { next }.boxed()
        }
    }
}
