//! # Auth Commands
//!
//! Login, registration and logout against `/auth`. The token goes to the
//! `ApiClient`; the decoded claims stay in [`SessionState`].

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::state::{SessionState, SyncState};
use ecopila_core::validation::{
    validate_password, validate_password_confirmation, validate_username,
};
use ecopila_core::Role;
use ecopila_sync::{Session, SyncError};

/// What the frontend knows about the logged-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub username: Option<String>,
    pub role: Role,
    pub is_admin: bool,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        SessionInfo {
            username: session.username.clone(),
            role: session.role,
            is_admin: session.is_admin(),
        }
    }
}

pub async fn login(
    session: &SessionState,
    sync: &SyncState,
    username: String,
    password: String,
) -> ApiResult<SessionInfo> {
    let username = validate_username(&username)?;
    if password.is_empty() {
        return Err(ApiError::validation("La contraseña es obligatoria"));
    }

    let logged_in = sync.api().login(&username, &password).await.map_err(|e| match e {
        SyncError::Unauthorized { .. } => {
            ApiError::new(ErrorCode::Unauthorized, "Usuario o contraseña incorrectos")
        }
        other => other.into(),
    })?;

    let info = SessionInfo::from(&logged_in);
    session.set(logged_in).await;
    info!(username = %username, role = %info.role, "Logged in");
    Ok(info)
}

/// Creates an account. Does not log in.
pub async fn register(
    sync: &SyncState,
    username: String,
    password: String,
    confirm: String,
) -> ApiResult<()> {
    let username = validate_username(&username)?;
    validate_password(&password)?;
    validate_password_confirmation(&password, &confirm)?;

    sync.api()
        .register(&username, &password)
        .await
        .map_err(|e| match e {
            SyncError::Server { ref message, .. } if message.contains("already exists") => {
                warn!(username = %username, "Username taken");
                ApiError::new(ErrorCode::UsernameTaken, "El nombre de usuario ya existe")
            }
            other => other.into(),
        })?;

    info!(username = %username, "Registered");
    Ok(())
}

pub async fn logout(session: &SessionState, sync: &SyncState) {
    sync.api().set_token(None).await;
    session.clear().await;
    info!("Logged out");
}

pub async fn session_info(session: &SessionState) -> Option<SessionInfo> {
    session.current().await.as_ref().map(SessionInfo::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{harness, serve};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    // {"sub":"tomas","role":"ADMIN"}, signature not checked
    const TOKEN: &str = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.\
                         eyJzdWIiOiJ0b21hcyIsInJvbGUiOiJBRE1JTiJ9.\
                         c2lnbmF0dXJl";

    fn auth_server() -> Router {
        Router::new()
            .route(
                "/api/auth/login",
                post(|Json(body): Json<Value>| async move {
                    if body["password"] == "secreto" {
                        Ok(Json(json!({ "idToken": TOKEN })))
                    } else {
                        Err(StatusCode::UNAUTHORIZED)
                    }
                }),
            )
            .route(
                "/api/auth/register",
                post(|Json(body): Json<Value>| async move {
                    if body["username"] == "tomasg" {
                        (
                            StatusCode::BAD_REQUEST,
                            Json(json!({ "message": "User already exists" })),
                        )
                    } else {
                        (StatusCode::CREATED, Json(json!({})))
                    }
                }),
            )
    }

    #[tokio::test]
    async fn test_login_and_logout() {
        let h = harness(serve(auth_server()).await).await;
        logout(&h.session, &h.sync).await;
        assert_eq!(session_info(&h.session).await, None);

        let err = login(&h.session, &h.sync, "tomasg".into(), "mal".into())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthorized);

        let info = login(&h.session, &h.sync, "tomasg".into(), "secreto".into())
            .await
            .unwrap();
        assert!(info.is_admin);
        assert_eq!(info.username.as_deref(), Some("tomas"));
        assert_eq!(h.sync.api().token().await.as_deref(), Some(TOKEN));

        logout(&h.session, &h.sync).await;
        assert_eq!(h.sync.api().token().await, None);
        assert!(h.session.require().await.is_err());
    }

    #[tokio::test]
    async fn test_register() {
        let h = harness(serve(auth_server()).await).await;

        let err = register(&h.sync, "tomasg".into(), "secreto1".into(), "secreto1".into())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UsernameTaken);

        let err = register(&h.sync, "mariana".into(), "secreto1".into(), "otro".into())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        register(&h.sync, "mariana".into(), "secreto1".into(), "secreto1".into())
            .await
            .unwrap();
    }
}
