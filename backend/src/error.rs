use rocket::http::Status;
use rocket::response::Responder;
use rocket::serde::json::Json;
use shared::{ElectionError, ErrorCode, ErrorResponse};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Election(#[from] ElectionError),
    #[error("Election not found")]
    NotFound,
    #[error("Invalid election ID")]
    InvalidId,
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Storage(e.to_string())
    }
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            ApiError::Election(e) => match e {
                ElectionError::NotOwner => Status::Forbidden,
                ElectionError::AlreadyVoted => Status::Conflict,
                ElectionError::InvalidCandidate(_) => Status::BadRequest,
                ElectionError::ElectionEnded => Status::Forbidden,
                ElectionError::ElectionStillOngoing => Status::Conflict,
                ElectionError::NoVoteCast => Status::Conflict,
                ElectionError::Invalid(_) => Status::BadRequest,
            },
            ApiError::NotFound => Status::NotFound,
            ApiError::InvalidId => Status::BadRequest,
            ApiError::Storage(_) => Status::InternalServerError,
        }
    }

    pub fn body(&self) -> ErrorResponse {
        match self {
            ApiError::Election(e) => ErrorResponse::from(e),
            ApiError::NotFound => ErrorResponse::new(ErrorCode::NotFound, self.to_string()),
            ApiError::InvalidId => ErrorResponse::new(ErrorCode::InvalidInput, self.to_string()),
            // storage details stay in the logs
            ApiError::Storage(_) => ErrorResponse::new(ErrorCode::SystemError, "Internal system error"),
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for ApiError {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        if let ApiError::Storage(detail) = &self {
            tracing::error!("Storage failure on {}: {}", req.uri(), detail);
        }
        let status = self.status();
        rocket::Response::build_from(Json(self.body()).respond_to(req)?)
            .status(status)
            .ok()
    }
}
