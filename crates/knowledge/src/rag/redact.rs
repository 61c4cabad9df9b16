//! Personal-data redaction for generated answers.
//!
//! Runs on the selected answer before citations are attached, so citation
//! spans point into the text the caller actually receives.

use lexrag_core::{AppError, AppResult};
use regex::Regex;

const EMAIL: &str = r"[a-zA-Z0-9_.+\-]+@[a-zA-Z0-9\-]+\.[a-zA-Z0-9\-.]+";
const PHONE: &str = r"(?:\+66|\b0)[\s\-]?(?:\d[\s\-]?){7,9}\d\b";
const THAI_ID: &str = r"\b\d-?\d{4}-?\d{5}-?\d{2}-?\d\b";

pub const EMAIL_PLACEHOLDER: &str = "[REDACTED_EMAIL]";
pub const PHONE_PLACEHOLDER: &str = "[REDACTED_PHONE]";
pub const THAI_ID_PLACEHOLDER: &str = "[REDACTED_THAI_ID]";

/// Replacements made by one `redact` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedactionCounts {
    pub emails: usize,
    pub phones: usize,
    pub national_ids: usize,
}

impl RedactionCounts {
    pub fn total(&self) -> usize {
        self.emails + self.phones + self.national_ids
    }
}

pub struct PiiRedactor {
    email: Regex,
    phone: Regex,
    thai_id: Regex,
}

impl PiiRedactor {
    pub fn new() -> AppResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| AppError::Config(format!("Invalid redaction pattern: {}", e)))
        };
        Ok(Self {
            email: compile(EMAIL)?,
            phone: compile(PHONE)?,
            thai_id: compile(THAI_ID)?,
        })
    }

    /// Replace e-mail addresses, Thai phone numbers and 13-digit national ids.
    ///
    /// National ids go first so their digits are not mistaken for a phone number.
    pub fn redact(&self, text: &str) -> (String, RedactionCounts) {
        let mut counts = RedactionCounts::default();

        counts.national_ids = self.thai_id.find_iter(text).count();
        let text = self.thai_id.replace_all(text, THAI_ID_PLACEHOLDER);

        counts.emails = self.email.find_iter(&text).count();
        let text = self.email.replace_all(&text, EMAIL_PLACEHOLDER);

        counts.phones = self.phone.find_iter(&text).count();
        let text = self.phone.replace_all(&text, PHONE_PLACEHOLDER);

        (text.into_owned(), counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redactor() -> PiiRedactor {
        PiiRedactor::new().unwrap()
    }

    #[test]
    fn test_redacts_email_phone_and_id() {
        let (text, counts) = redactor().redact(
            "Contact the DPO at dpo@example.co.th or 02-123-4567. Citizen id 1-2345-67890-12-3.",
        );
        assert_eq!(
            text,
            "Contact the DPO at [REDACTED_EMAIL] or [REDACTED_PHONE]. Citizen id [REDACTED_THAI_ID]."
        );
        assert_eq!(
            counts,
            RedactionCounts {
                emails: 1,
                phones: 1,
                national_ids: 1,
            }
        );
    }

    #[test]
    fn test_international_mobile_number() {
        let (text, counts) = redactor().redact("Call +66 81 234 5678 today");
        assert_eq!(text, "Call [REDACTED_PHONE] today");
        assert_eq!(counts.total(), 1);
    }

    #[test]
    fn test_legal_numbers_are_kept() {
        let text = "Records are kept for 7 years under Section 26 of B.E. 2562.";
        let (redacted, counts) = redactor().redact(text);
        assert_eq!(redacted, text);
        assert_eq!(counts.total(), 0);
    }
}
