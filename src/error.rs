use serde::Serialize;
use thiserror::Error;

/// Failures returned by session operations.
///
/// None of these are fatal to the session: an operation that fails leaves
/// the session exactly as it found it.
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionError {
    #[error("session not found")]
    SessionNotFound,
    #[error("session is full")]
    SessionFull,
    #[error("transition not allowed from the current phase")]
    InvalidTransition,
    #[error("operation not allowed in the current phase")]
    PhaseMismatch,
    #[error("a meme was already submitted this round")]
    AlreadySubmitted,
    #[error("players cannot vote on their own meme")]
    SelfVote,
    #[error("player is already in an active session")]
    DuplicatePlayer,
    #[error("player not found")]
    PlayerNotFound,
    #[error("no submission for that player this round")]
    SubmissionNotFound,
    #[error("only the host can do that")]
    NotHost,
    #[error("name must be between 1 and 20 characters")]
    InvalidName,
    #[error("meme captions or template are empty or too long")]
    InvalidCaption,
    #[error("an identical meme was already submitted this round")]
    DuplicateMeme,
}
