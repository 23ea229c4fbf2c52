//! Login redirect computation
//!
//! When the refresh request itself comes back 401, the session is gone
//! and the UI should send the user to the login screen with a `next`
//! parameter pointing back at where they were. Both functions here are
//! pure; the actual navigation is the calling environment's side
//! effect.

use api_client::ApiError;

/// Compute the login redirect for the current location.
///
/// The full path (including query and hash) is preserved in the `next`
/// parameter. Returns `None` when the user is already on the login or
/// signup route.
pub fn login_redirect_target(current_path: &str) -> Option<String> {
    let normalized = if current_path.trim().is_empty() {
        "/"
    } else {
        current_path
    };

    let pathname_end = normalized.find(['?', '#']).unwrap_or(normalized.len());
    let pathname = &normalized[..pathname_end];
    let pathname = if pathname.starts_with('/') {
        pathname.to_owned()
    } else {
        format!("/{pathname}")
    };

    if pathname == "/login" || pathname == "/signup" {
        return None;
    }

    Some(format!("/login?next={}", urlencoding::encode(normalized)))
}

/// Whether a failure means the session is unrecoverable: a 401 from the
/// refresh endpoint itself.
pub fn should_redirect_to_login(error: &ApiError, refresh_path: &str) -> bool {
    error.status == 401 && error.context.path == refresh_path
}
