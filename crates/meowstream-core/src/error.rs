//! Error types for the meowstream pipeline.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during record validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Emotion contains a character from the blocklist.
    #[error("blocked character {ch:?} in emotion")]
    BlockedCharacter {
        /// The offending character.
        ch: char,
    },

    /// Emotion contains a blocked term (case-insensitive match).
    #[error("blocked term {term:?} in emotion")]
    BlockedTerm {
        /// The offending term.
        term: &'static str,
    },

    /// Identifier has an invalid format.
    #[error("invalid {field}: {reason}")]
    InvalidIdentifier {
        /// The name of the invalid field.
        field: &'static str,
        /// Description of what's wrong.
        reason: String,
    },
}
