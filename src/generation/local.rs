//! Offline generator that fills the fixed methodology template.

use crate::templates::{
    DETAILS_HEADING, LOCAL_TIP, METHODOLOGY, SECRET_WORD_PLACEHOLDER, TASK_HEADING,
};

use super::{Generated, GenerationRequest};

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalGenerator;

impl LocalGenerator {
    /// Deterministic: identical requests produce byte-identical prompts.
    pub fn generate(&self, request: &GenerationRequest) -> Generated {
        Generated {
            prompt: build_prompt(request),
            tip: LOCAL_TIP.to_string(),
        }
    }
}

fn build_prompt(request: &GenerationRequest) -> String {
    let mut prompt = METHODOLOGY.replace(SECRET_WORD_PLACEHOLDER, &request.secret);
    prompt.push_str("\n\n---\n\n");
    prompt.push_str(TASK_HEADING);
    prompt.push_str("\n\n");
    prompt.push_str(&request.task);

    if !request.details.trim().is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(DETAILS_HEADING);
        prompt.push_str("\n\n");
        prompt.push_str(&request.details);
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(task: &str, details: &str, secret: &str) -> GenerationRequest {
        GenerationRequest {
            task: task.into(),
            details: details.into(),
            secret: secret.into(),
        }
    }

    #[test]
    fn test_banana_scenario() {
        let generated = LocalGenerator.generate(&request("add retry logic", "", "banana"));
        let prompt = &generated.prompt;

        assert!(prompt.contains("add retry logic"));
        assert!(prompt.contains("banana"));
        assert!(prompt.contains("## MY TASK\n\nadd retry logic"));
        assert!(!prompt.contains(DETAILS_HEADING));
        assert!(!prompt.contains(SECRET_WORD_PLACEHOLDER));
        assert_eq!(generated.tip, LOCAL_TIP);
    }

    #[test]
    fn test_every_placeholder_replaced() {
        let prompt = LocalGenerator.generate(&request("t", "", "kiwi")).prompt;
        let expected = METHODOLOGY.matches(SECRET_WORD_PLACEHOLDER).count();
        assert_eq!(prompt.matches("kiwi").count(), expected);
    }

    #[test]
    fn test_details_section_only_when_not_blank() {
        let blank = LocalGenerator.generate(&request("t", "  \n ", "s")).prompt;
        assert!(!blank.contains(DETAILS_HEADING));

        let with = LocalGenerator
            .generate(&request("t", "uses postgres", "s"))
            .prompt;
        assert!(with.ends_with("## ADDITIONAL CONTEXT\n\nuses postgres"));
    }

    #[test]
    fn test_task_kept_verbatim() {
        let task = "  first line\n\n  indented second  ";
        let prompt = LocalGenerator.generate(&request(task, "", "s")).prompt;
        assert!(prompt.ends_with(task));
    }

    #[test]
    fn test_deterministic() {
        let req = request("task", "details", "secret");
        assert_eq!(
            LocalGenerator.generate(&req),
            LocalGenerator.generate(&req)
        );
    }

    #[test]
    fn test_secrets_differ_only_at_secret_positions() {
        // Same-length secrets keep every other byte aligned.
        let a = LocalGenerator.generate(&request("task", "ctx", "aaaa")).prompt;
        let b = LocalGenerator.generate(&request("task", "ctx", "bbbb")).prompt;
        assert_eq!(a.len(), b.len());
        assert_ne!(a, b);

        let template = build_prompt(&request("task", "ctx", SECRET_WORD_PLACEHOLDER));
        assert_eq!(template.replace(SECRET_WORD_PLACEHOLDER, "aaaa"), a);
        assert_eq!(template.replace(SECRET_WORD_PLACEHOLDER, "bbbb"), b);

        for (x, y) in a.bytes().zip(b.bytes()) {
            if x != y {
                assert_eq!((x, y), (b'a', b'b'));
            }
        }
    }
}
