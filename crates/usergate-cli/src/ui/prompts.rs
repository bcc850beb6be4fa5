//! Interactive prompt utilities.

use dialoguer::{Password, theme::ColorfulTheme};
use usergate_core::validation::{WEAK_PASSWORD_MESSAGE, is_strong_password};

/// Get the default colorful theme.
fn theme() -> ColorfulTheme {
    ColorfulTheme::default()
}

/// Prompt twice for a new password that passes the strength rules.
pub fn new_password(prompt: &str) -> Result<String, dialoguer::Error> {
    Password::with_theme(&theme())
        .with_prompt(prompt)
        .with_confirmation("Repeat password", "Passwords do not match")
        .validate_with(|input: &String| {
            if is_strong_password(input) {
                Ok(())
            } else {
                Err(WEAK_PASSWORD_MESSAGE)
            }
        })
        .interact()
}
