//! Form validation run before a generation is triggered.

/// Check that a field has non-whitespace content.
/// Returns an error message if validation fails, None if valid.
pub fn validate_required(value: &str, label: &str) -> Option<String> {
    if value.trim().is_empty() {
        Some(format!("{} is required", label))
    } else {
        None
    }
}

/// Validate the generation form. Task is checked before the secret word so
/// the user fixes fields in the order they appear.
pub fn validate_generation_form(task: &str, secret: &str) -> Option<String> {
    validate_required(task, "Task").or_else(|| validate_required(secret, "Secret word"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_required_empty() {
        assert_eq!(
            validate_required("", "Task"),
            Some("Task is required".to_string())
        );
    }

    #[test]
    fn test_validate_required_whitespace_only() {
        assert_eq!(
            validate_required(" \n\t ", "Secret word"),
            Some("Secret word is required".to_string())
        );
    }

    #[test]
    fn test_validate_required_ok() {
        assert_eq!(validate_required(" x ", "Task"), None);
    }

    #[test]
    fn test_validate_form_task_first() {
        assert_eq!(
            validate_generation_form("", ""),
            Some("Task is required".to_string())
        );
        assert_eq!(
            validate_generation_form("build it", "  "),
            Some("Secret word is required".to_string())
        );
        assert_eq!(validate_generation_form("build it", "banana"), None);
    }
}
