//! Principal echo endpoint

use axum::Json;

use crate::api::auth::Auth;
use crate::domain::Principal;

/// The caller as resolved by the authentication middleware
pub async fn me(Auth(principal): Auth) -> Json<Principal> {
    Json(principal)
}
