//! Input validation rules for user-management requests.
//!
//! Request types implement [`validator::Validate`] by feeding their fields
//! through [`Rules`], which collects one [`ValidationError`] per failing
//! field with a human-readable message.

use std::borrow::Cow;

use serde::Serialize;
use unicode_normalization::UnicodeNormalization;
use validator::{ValidateEmail, ValidationError, ValidationErrors};

/// Minimum length of a strong password.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Message for passwords failing [`is_strong_password`].
pub const WEAK_PASSWORD_MESSAGE: &str = "password must have at least 8 characters, \
     with a lowercase letter, an uppercase letter, a number, and a symbol";

/// Collects field errors for a single request.
#[derive(Debug, Default)]
pub struct Rules {
    errors: ValidationErrors,
}

impl Rules {
    /// Start an empty rule set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for `field`.
    pub fn fail(&mut self, field: &'static str, code: &'static str, message: &'static str) {
        let mut error = ValidationError::new(code);
        error.message = Some(Cow::Borrowed(message));
        self.errors.add(field, error);
    }

    /// Require a value to be present, returning it when it is.
    pub fn required<'a>(
        &mut self,
        field: &'static str,
        value: Option<&'a str>,
        message: &'static str,
    ) -> Option<&'a str> {
        if value.is_none() {
            self.fail(field, "required", message);
        }
        value
    }

    /// Require a present value to be non-empty after trimming.
    pub fn not_empty(&mut self, field: &'static str, value: Option<&str>, message: &'static str) {
        if value.is_some_and(|v| v.trim().is_empty()) {
            self.fail(field, "empty", message);
        }
    }

    /// Check email format when a value is present.
    pub fn email(&mut self, field: &'static str, value: Option<&str>, message: &'static str) {
        if value.is_some_and(|v| !is_email(v)) {
            self.fail(field, "email", message);
        }
    }

    /// Check password strength when a value is present.
    pub fn strong_password(&mut self, field: &'static str, value: Option<&str>) {
        if value.is_some_and(|v| !is_strong_password(v)) {
            self.fail(field, "strong_password", WEAK_PASSWORD_MESSAGE);
        }
    }

    /// Check that a present value only holds letters and spaces.
    pub fn letters(&mut self, field: &'static str, value: Option<&str>, message: &'static str) {
        if value.is_some_and(|v| !is_letters_and_spaces(v)) {
            self.fail(field, "letters", message);
        }
    }

    /// Check that a present value is hexadecimal.
    pub fn hex(&mut self, field: &'static str, value: Option<&str>, message: &'static str) {
        if value.is_some_and(|v| !is_hex(v)) {
            self.fail(field, "hex", message);
        }
    }

    /// Check that a present value is one of `allowed`.
    pub fn one_of(
        &mut self,
        field: &'static str,
        value: Option<&str>,
        allowed: &[&str],
        message: &'static str,
    ) {
        if value.is_some_and(|v| !allowed.contains(&v)) {
            self.fail(field, "one_of", message);
        }
    }

    /// Finish, returning the collected errors if any field failed.
    ///
    /// # Errors
    ///
    /// Returns the collected `ValidationErrors` when at least one rule failed.
    pub fn finish(self) -> Result<(), ValidationErrors> {
        if self.errors.errors().is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// A single field failure as exposed to API callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMessage {
    /// Field name as it appears in the request body.
    pub field: String,
    /// Human-readable message.
    pub message: String,
}

/// Flatten validation errors into per-field messages, ordered by field.
#[must_use]
pub fn field_messages(errors: &ValidationErrors) -> Vec<FieldMessage> {
    let mut messages: Vec<FieldMessage> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let field = field.to_string();
            errs.iter().map(move |e| FieldMessage {
                field: field.clone(),
                message: e
                    .message
                    .as_ref()
                    .map_or_else(|| e.code.to_string(), ToString::to_string),
            })
        })
        .collect();
    messages.sort_by(|a, b| a.field.cmp(&b.field));
    messages
}

/// Check email format.
#[must_use]
pub fn is_email(value: &str) -> bool {
    value.validate_email()
}

/// At least [`MIN_PASSWORD_LENGTH`] characters with a lowercase letter, an
/// uppercase letter, a digit, and a symbol.
#[must_use]
pub fn is_strong_password(value: &str) -> bool {
    value.chars().count() >= MIN_PASSWORD_LENGTH
        && value.chars().any(char::is_lowercase)
        && value.chars().any(char::is_uppercase)
        && value.chars().any(|c| c.is_ascii_digit())
        && value.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace())
}

/// Letters (any script) and spaces, with at least one letter.
#[must_use]
pub fn is_letters_and_spaces(value: &str) -> bool {
    value.chars().any(char::is_alphabetic)
        && value.chars().all(|c| c.is_alphabetic() || c == ' ')
}

/// Non-empty hexadecimal string.
#[must_use]
pub fn is_hex(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Canonical form of an email address for storage and lookup.
#[must_use]
pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Canonical form of a display name (NFKC, trimmed, single spaces).
#[must_use]
pub fn normalize_name(value: &str) -> String {
    let normalized: String = value.nfkc().collect();
    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_email() {
        assert!(is_email("john@doe.com"));
        assert!(!is_email("invalidemail"));
        assert!(!is_email(""));
    }

    #[test]
    fn test_strong_password() {
        assert!(is_strong_password("Secure#Pass1"));
        assert!(!is_strong_password("S#1a"));
        assert!(!is_strong_password("securepass#1"));
        assert!(!is_strong_password("SECUREPASS#1"));
        assert!(!is_strong_password("SecurePass1"));
        assert!(!is_strong_password("Secure#Pass"));
    }

    #[test]
    fn test_letters_and_spaces() {
        assert!(is_letters_and_spaces("João da Silva"));
        assert!(!is_letters_and_spaces("R2D2"));
        assert!(!is_letters_and_spaces("   "));
    }

    #[test]
    fn test_hex() {
        assert!(is_hex("deadBEEF09"));
        assert!(!is_hex("xyz"));
        assert!(!is_hex(""));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_email("  John@Doe.COM "), "john@doe.com");
        assert_eq!(normalize_name("  Ada   Lovelace "), "Ada Lovelace");
    }

    #[test]
    fn test_rules_collect_messages() {
        let mut rules = Rules::new();
        let email = rules.required("email", Some("nope"), "email is required");
        rules.email("email", email, "email is invalid");
        rules.required("password", None, "password is required");
        rules.strong_password("newPassword", Some("weak"));

        let errors = rules.finish().unwrap_err();
        let messages = field_messages(&errors);

        assert_eq!(
            messages,
            vec![
                FieldMessage {
                    field: "email".to_string(),
                    message: "email is invalid".to_string(),
                },
                FieldMessage {
                    field: "newPassword".to_string(),
                    message: WEAK_PASSWORD_MESSAGE.to_string(),
                },
                FieldMessage {
                    field: "password".to_string(),
                    message: "password is required".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_rules_pass() {
        let mut rules = Rules::new();
        rules.one_of("role", Some("admin"), &["admin", "user"], "invalid role");
        rules.letters("name", None, "letters only");
        assert!(rules.finish().is_ok());
    }
}
