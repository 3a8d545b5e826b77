//! Chat admission checks
//!
//! Cheap rejections applied before any upstream call is attempted

use thiserror::Error;

/// Longest accepted message, in characters, after trimming
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Reasons a chat request is turned away before reaching the model
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("Message is required.")]
    EmptyMessage,

    #[error("Message is too long (max {max} characters).")]
    MessageTooLong { length: usize, max: usize },

    #[error("Too many chat requests. Please try again later.")]
    RateLimited,
}

/// Trim and bound a user message
///
/// Returns the trimmed text on success.
pub fn validate_message(message: Option<&str>) -> Result<String, AdmissionError> {
    let trimmed = message.unwrap_or_default().trim();

    if trimmed.is_empty() {
        return Err(AdmissionError::EmptyMessage);
    }

    let length = trimmed.chars().count();
    if length > MAX_MESSAGE_CHARS {
        return Err(AdmissionError::MessageTooLong {
            length,
            max: MAX_MESSAGE_CHARS,
        });
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trims_surrounding_whitespace() {
        assert_eq!(validate_message(Some("  hi there \n")).unwrap(), "hi there");
    }

    #[test]
    fn test_empty_inputs() {
        for input in [None, Some(""), Some("   "), Some("\t\r\n"), Some("\u{3000}")] {
            assert_eq!(validate_message(input), Err(AdmissionError::EmptyMessage));
        }
    }

    #[test]
    fn test_length_boundary() {
        let exact = "a".repeat(MAX_MESSAGE_CHARS);
        assert_eq!(validate_message(Some(&exact)).unwrap().len(), MAX_MESSAGE_CHARS);

        let over = "a".repeat(MAX_MESSAGE_CHARS + 1);
        assert_eq!(
            validate_message(Some(&over)),
            Err(AdmissionError::MessageTooLong { length: 2001, max: 2000 })
        );
    }

    #[test]
    fn test_length_counts_characters_after_trim() {
        let padded = format!("   {}   ", "é".repeat(MAX_MESSAGE_CHARS));
        assert!(validate_message(Some(&padded)).is_ok());
    }

    #[test]
    fn test_messages() {
        assert_eq!(AdmissionError::EmptyMessage.to_string(), "Message is required.");
        assert_eq!(
            AdmissionError::MessageTooLong { length: 2001, max: 2000 }.to_string(),
            "Message is too long (max 2000 characters)."
        );
    }
}
