//! Two-phase generator backed by a language model.
//!
//! Phase A classifies the task and proposes questions, the interviewer
//! collects answers, and phase B turns everything into a tailored prompt.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use crate::templates::{
    ANALYSIS_SYSTEM, FALLBACK_QUESTIONS, GENERATION_SYSTEM, REMOTE_TIP, SECRET_WORD_PLACEHOLDER,
};

use super::{GenerateError, Generated, GenerationRequest, Interviewer, TaskType};

/// A single-turn text completion service.
pub trait CompletionClient: Send + Sync {
    fn complete<'a>(
        &'a self,
        system: &'a str,
        user: &'a str,
    ) -> BoxFuture<'a, Result<String, GenerateError>>;
}

/// Result of the analysis phase.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Analysis {
    pub task_type: TaskType,
    pub questions: Vec<String>,
}

pub struct RemoteGenerator {
    client: Arc<dyn CompletionClient>,
}

impl RemoteGenerator {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    pub async fn generate(
        &self,
        request: &GenerationRequest,
        interviewer: &dyn Interviewer,
    ) -> Result<Generated, GenerateError> {
        let analysis = self.analyze(&request.task, &request.details).await?;
        debug!(
            task_type = %analysis.task_type,
            questions = analysis.questions.len(),
            "task_analyzed"
        );

        let answers = interviewer
            .interview(analysis.task_type, &analysis.questions)
            .await?;
        let qa: Vec<(String, String)> = analysis
            .questions
            .iter()
            .enumerate()
            .map(|(i, q)| (q.clone(), answers.get(i).cloned().unwrap_or_default()))
            .collect();

        let prompt = self.compose(request, analysis.task_type, &qa).await?;
        Ok(Generated {
            prompt,
            tip: REMOTE_TIP.to_string(),
        })
    }

    /// Phase A: classify the task and collect follow-up questions.
    pub async fn analyze(&self, task: &str, details: &str) -> Result<Analysis, GenerateError> {
        let user = format!("Task: {}\n\nDetails: {}", task, details);
        let reply = self.client.complete(ANALYSIS_SYSTEM, &user).await?;
        parse_analysis(&reply)
    }

    /// Phase B: produce the final prompt from the task and the interview.
    pub async fn compose(
        &self,
        request: &GenerationRequest,
        task_type: TaskType,
        qa: &[(String, String)],
    ) -> Result<String, GenerateError> {
        let user = generation_message(request, task_type, qa);
        let reply = self.client.complete(GENERATION_SYSTEM, &user).await?;
        finish_prompt(&reply, &request.secret)
    }
}

/// Parse the analysis reply. Zero questions fall back to generic ones.
pub fn parse_analysis(reply: &str) -> Result<Analysis, GenerateError> {
    let mut analysis: Analysis = serde_json::from_str(strip_code_fence(reply))
        .map_err(|e| GenerateError::Malformed(format!("task analysis: {}", e)))?;
    analysis.questions.retain(|q| !q.trim().is_empty());
    if analysis.questions.is_empty() {
        analysis.questions = FALLBACK_QUESTIONS.iter().map(|q| q.to_string()).collect();
    }
    Ok(analysis)
}

/// Models sometimes wrap JSON in a markdown fence even when told not to.
fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn generation_message(
    request: &GenerationRequest,
    task_type: TaskType,
    qa: &[(String, String)],
) -> String {
    let mut message = format!(
        "Task Type: {}\nTask: {}\nDetails: {}\n\nContext from the developer's answers:\n",
        task_type, request.task, request.details
    );
    for (question, answer) in qa {
        let answer = if answer.trim().is_empty() {
            "(skipped)"
        } else {
            answer.as_str()
        };
        message.push_str(&format!("- {} -> {}\n", question, answer));
    }
    message.push_str(&format!(
        "\nSecret Word: {}\n\nGenerate the enhanced prompt now.",
        request.secret
    ));
    message
}

fn finish_prompt(reply: &str, secret: &str) -> Result<String, GenerateError> {
    let mut prompt = reply.replace(SECRET_WORD_PLACEHOLDER, secret).trim().to_string();
    if prompt.is_empty() {
        return Err(GenerateError::EmptyPrompt);
    }
    if !secret.is_empty() && !prompt.contains(secret) {
        prompt.push_str(&format!(
            "\n\n**Do not write implementation code until I say the secret word: \"{}\"**",
            secret
        ));
    }
    Ok(prompt)
}
