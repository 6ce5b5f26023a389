//! User-input validation and formatting.
//!
//! Pure, deterministic checks for the string inputs the game server
//! accepts. Validation answers whether an input is acceptable at all;
//! formatting produces the canonical form that is stored (mail addresses
//! lowercased, names trimmed with collapsed whitespace and a capitalized
//! first letter).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{EngineError, EngineResult};

static MAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap()
});

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Kinds of user-supplied string input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Mail address
    Mail,
    /// Plaintext password
    Password,
    /// Given name
    FirstName,
    /// Family name
    LastName,
    /// Optional display nickname
    Nickname,
    /// Team display name
    TeamName,
    /// Factory display name
    FactoryName,
    /// Game display name
    GameName,
}

impl InputKind {
    /// Human-readable kind name, used in validation errors
    pub fn name(&self) -> &'static str {
        match self {
            InputKind::Mail => "mail address",
            InputKind::Password => "password",
            InputKind::FirstName => "first name",
            InputKind::LastName => "last name",
            InputKind::Nickname => "nickname",
            InputKind::TeamName => "team name",
            InputKind::FactoryName => "factory name",
            InputKind::GameName => "game name",
        }
    }
}

/// Whether the input is acceptable for its kind
pub fn is_valid(kind: InputKind, input: &str) -> bool {
    let trimmed = input.trim();
    match kind {
        InputKind::Mail => MAIL_RE.is_match(trimmed),
        // Passwords are taken verbatim, surrounding whitespace included
        InputKind::Password => (4..=128).contains(&input.chars().count()),
        InputKind::FirstName | InputKind::LastName => {
            (1..=64).contains(&trimmed.chars().count())
        }
        // Nicknames may be empty
        InputKind::Nickname => trimmed.chars().count() <= 32,
        InputKind::TeamName => (1..=64).contains(&trimmed.chars().count()),
        InputKind::FactoryName | InputKind::GameName => {
            (1..=32).contains(&trimmed.chars().count())
        }
    }
}

/// Canonical stored form of the input
pub fn format(kind: InputKind, input: &str) -> String {
    let trimmed = input.trim();
    match kind {
        InputKind::Mail => trimmed.to_lowercase(),
        InputKind::Password => input.to_string(),
        InputKind::FirstName | InputKind::LastName => {
            capitalize(&WHITESPACE_RE.replace_all(trimmed, " "))
        }
        InputKind::Nickname => trimmed.to_string(),
        InputKind::TeamName | InputKind::FactoryName | InputKind::GameName => {
            WHITESPACE_RE.replace_all(trimmed, " ").to_string()
        }
    }
}

/// Validate the input and return its canonical form, or a validation error
/// naming the kind
pub fn validate(kind: InputKind, input: &str) -> EngineResult<String> {
    if !is_valid(kind, input) {
        return Err(EngineError::Validation {
            kind: kind.name().to_string(),
            message: format_rejection(kind),
        });
    }
    Ok(format(kind, input))
}

fn format_rejection(kind: InputKind) -> String {
    match kind {
        InputKind::Mail => "not a well-formed address".to_string(),
        InputKind::Password => "must be 4 to 128 characters".to_string(),
        InputKind::FirstName | InputKind::LastName => "must be 1 to 64 characters".to_string(),
        InputKind::Nickname => "must be at most 32 characters".to_string(),
        InputKind::TeamName => "must be 1 to 64 characters".to_string(),
        InputKind::FactoryName | InputKind::GameName => "must be 1 to 32 characters".to_string(),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
