//! CSRF token bootstrap.

use tracing::debug;

use crate::error::SessionError;
use crate::session::Session;

/// Session key holding the CSRF token.
pub const CSRF_TOKEN_KEY: &str = "csrf_token";

/// Fresh token: a time-ordered UUIDv7 (16 bytes) in simple hex form.
pub fn generate_token() -> String {
    uuid::Uuid::now_v7().simple().to_string()
}

/// Start `session` and make sure it carries a CSRF token under `key`.
///
/// An existing non-empty token is never replaced; an absent, empty or
/// non-string value is. Returns the token now in the session.
pub async fn ensure_csrf_token(session: &mut Session, key: &str) -> Result<String, SessionError> {
    session.start().await?;

    if let Some(token) = session.get_str(key).filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }

    let token = generate_token();
    session.set(key, token.clone())?;
    debug!("CSRF token issued for session {:?}", session.id());
    Ok(token)
}
