pub const MAX_NAME_LENGTH: usize = 64;
pub const MIN_DURATION_MINUTES: i64 = 1;
pub const MAX_DURATION_MINUTES: i64 = 366 * 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("An election needs at least one candidate")]
    NoCandidates,
    #[error("Candidate name must not be empty")]
    EmptyName,
    #[error("Candidate name exceeds maximum length of {MAX_NAME_LENGTH}")]
    NameTooLong,
    #[error("Duration must be at least {MIN_DURATION_MINUTES} minute")]
    DurationTooShort,
    #[error("Duration cannot exceed {MAX_DURATION_MINUTES} minutes")]
    DurationTooLong,
}

pub fn validate_candidate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() { return Err(ValidationError::EmptyName); }
    if name.chars().count() > MAX_NAME_LENGTH { return Err(ValidationError::NameTooLong); }
    Ok(())
}

pub fn validate_duration(duration_minutes: i64) -> Result<(), ValidationError> {
    if duration_minutes < MIN_DURATION_MINUTES { return Err(ValidationError::DurationTooShort); }
    if duration_minutes > MAX_DURATION_MINUTES { return Err(ValidationError::DurationTooLong); }
    Ok(())
}

/// Checks everything an election needs before it is created. Names are
/// checked in order, so the first offending name decides the error.
pub fn validate_setup(names: &[String], duration_minutes: i64) -> Result<(), ValidationError> {
    if names.is_empty() { return Err(ValidationError::NoCandidates); }
    names.iter().try_for_each(|name| validate_candidate_name(name))?;
    validate_duration(duration_minutes)
}
