use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GpaError {
    #[error("invalid grade '{0}' (expected one of O, E, A, B, C, D, F)")]
    InvalidGrade(String),

    #[error("invalid credits {credits} for subject '{subject}' (credits must be positive)")]
    InvalidCredits { subject: String, credits: i32 },

    #[error("unknown grading scale '{0}' (expected 10 or 4.0)")]
    UnknownScale(String),
}
