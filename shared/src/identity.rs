//! Identity service: session identifiers, lobby codes and content filtering.
//!
//! Generated identifiers are screened against the same disallowed-word list
//! that is used to sanitize usernames. A collision triggers a re-roll, bounded
//! by [`MAX_GENERATION_ATTEMPTS`] so a misconfigured filter cannot spin forever.

use crate::error::IdentityError;
use log::{trace, warn};
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use rand::RngCore;
use regex::Regex;
use std::sync::Arc;
use uuid::Uuid;

/// Symbols a lobby code may be drawn from. Excludes I, O, 0 and 1.
pub const LOBBY_ID_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const LOBBY_ID_LENGTH: usize = 6;
pub const MAX_GENERATION_ATTEMPTS: usize = 32;
pub const DEFAULT_REPLACEMENT: &str = "***";

const DEFAULT_FILTER_WORDS: &[&str] = &[
    "fuck", "shit", "cunt", "bitch", "dick", "cock", "piss", "twat", "wank", "slut", "whore",
    "nazi", "fag", "ass",
];

static SESSION_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("session id pattern compiles")
});

static LOBBY_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]{6}$").expect("lobby id pattern compiles"));

static USERNAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_\-.!?*]{3,20}$").expect("username pattern compiles")
});

/// Disallowed-word list, matched case-insensitively as substrings.
#[derive(Debug, Clone)]
pub struct ContentFilter {
    words: Vec<String>,
}

impl ContentFilter {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        Self { words }
    }

    pub fn needs_sanitizing(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.words.iter().any(|w| lowered.contains(w.as_str()))
    }

    /// Replaces every disallowed word with `replacement`.
    pub fn sanitize(&self, text: &str, replacement: &str) -> String {
        let mut result = text.to_string();
        for word in &self.words {
            result = replace_case_insensitive(&result, word, replacement);
        }
        result
    }
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new(DEFAULT_FILTER_WORDS)
    }
}

// `needle` is already lowercase
fn replace_case_insensitive(haystack: &str, needle: &str, replacement: &str) -> String {
    let lowered = haystack.to_lowercase();
    // Offsets only line up when lowercasing keeps byte lengths
    if lowered.len() != haystack.len() {
        return lowered.replace(needle, replacement);
    }

    let mut result = String::with_capacity(haystack.len());
    let mut cursor = 0;
    for (start, matched) in lowered.match_indices(needle) {
        result.push_str(&haystack[cursor..start]);
        result.push_str(replacement);
        cursor = start + matched.len();
    }
    result.push_str(&haystack[cursor..]);
    result
}

/// Issues and validates identifiers for both actors.
#[derive(Debug, Clone, Default)]
pub struct IdentityService {
    filter: Arc<ContentFilter>,
}

impl IdentityService {
    pub fn new(filter: ContentFilter) -> Self {
        Self {
            filter: Arc::new(filter),
        }
    }

    pub fn filter(&self) -> &ContentFilter {
        &self.filter
    }

    /// Random RFC 4122 v4 identifier that passes the content filter.
    pub fn generate_session_id(&self) -> Result<String, IdentityError> {
        self.generate("session id", || Uuid::new_v4().hyphenated().to_string())
    }

    pub fn is_valid_session_id(&self, value: &str) -> bool {
        SESSION_ID_PATTERN.is_match(value)
    }

    /// Six symbols from [`LOBBY_ID_ALPHABET`], drawn from the OS RNG.
    pub fn generate_lobby_id(&self) -> Result<String, IdentityError> {
        self.generate("lobby id", || {
            let mut bytes = [0u8; LOBBY_ID_LENGTH];
            OsRng.fill_bytes(&mut bytes);
            bytes
                .iter()
                .map(|b| LOBBY_ID_ALPHABET[*b as usize % LOBBY_ID_ALPHABET.len()] as char)
                .collect()
        })
    }

    pub fn is_valid_lobby_id(&self, value: &str) -> bool {
        LOBBY_ID_PATTERN.is_match(value)
    }

    /// Canonical form of a user-typed lobby code.
    pub fn normalize_lobby_id(&self, value: &str) -> String {
        value.trim().to_ascii_uppercase()
    }

    pub fn sanitize_text(&self, text: &str, replacement: &str) -> String {
        self.filter.sanitize(text, replacement)
    }

    pub fn username_valid(&self, username: &str) -> bool {
        USERNAME_PATTERN.is_match(username)
    }

    fn generate<F>(&self, what: &'static str, mut make: F) -> Result<String, IdentityError>
    where
        F: FnMut() -> String,
    {
        for attempt in 1..=MAX_GENERATION_ATTEMPTS {
            let candidate = make();
            if !self.filter.needs_sanitizing(&candidate) {
                return Ok(candidate);
            }
            trace!("Discarding filtered {} on attempt {}", what, attempt);
        }

        warn!(
            "Content filter rejected {} candidates for a {}",
            MAX_GENERATION_ATTEMPTS, what
        );
        Err(IdentityError::FilterExhausted(what, MAX_GENERATION_ATTEMPTS))
    }
}
