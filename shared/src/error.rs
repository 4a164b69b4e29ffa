use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::validation::ValidationError;

/// Every way an election operation can be refused.
///
/// All variants are terminal: the call that produced one had no effect on the
/// election.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ElectionError {
    #[error("Only the election owner can do this")]
    NotOwner,
    #[error("This identity has already voted")]
    AlreadyVoted,
    #[error("Candidate {0} does not exist")]
    InvalidCandidate(usize),
    #[error("The election has ended")]
    ElectionEnded,
    #[error("The election is still ongoing")]
    ElectionStillOngoing,
    #[error("No vote has been cast")]
    NoVoteCast,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

#[derive(Debug, Clone, Copy, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    #[error("Not the election owner")]
    NotOwner,
    #[error("Already voted")]
    AlreadyVoted,
    #[error("Invalid candidate")]
    InvalidCandidate,
    #[error("Election ended")]
    ElectionEnded,
    #[error("Election still ongoing")]
    ElectionStillOngoing,
    #[error("No vote cast")]
    NoVoteCast,
    #[error("Validation failed")]
    ValidationFailed,
    #[error("Forbidden")]
    Forbidden,
    #[error("Resource not found")]
    NotFound,
    #[error("Conflict")]
    Conflict,
    #[error("Invalid input provided")]
    InvalidInput,
    #[error("Internal system error")]
    SystemError,
}

impl From<&ElectionError> for ErrorCode {
    fn from(err: &ElectionError) -> Self {
        match err {
            ElectionError::NotOwner => ErrorCode::NotOwner,
            ElectionError::AlreadyVoted => ErrorCode::AlreadyVoted,
            ElectionError::InvalidCandidate(_) => ErrorCode::InvalidCandidate,
            ElectionError::ElectionEnded => ErrorCode::ElectionEnded,
            ElectionError::ElectionStillOngoing => ErrorCode::ElectionStillOngoing,
            ElectionError::NoVoteCast => ErrorCode::NoVoteCast,
            ElectionError::Invalid(_) => ErrorCode::ValidationFailed,
        }
    }
}

/// JSON body returned with every rejected request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, error: impl Into<String>) -> Self {
        Self { code, error: error.into() }
    }
}

impl From<&ElectionError> for ErrorResponse {
    fn from(err: &ElectionError) -> Self {
        Self::new(ErrorCode::from(err), err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ElectionError>;
