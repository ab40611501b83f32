use crate::error::{AppError, AppResult};

/// Trims a caller-supplied user id. Every service entry point runs ids
/// through here so stored and queried ids always agree.
pub fn normalize_user_id(user_id: &str) -> AppResult<&str> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("user id cannot be empty"));
    }
    Ok(trimmed)
}
