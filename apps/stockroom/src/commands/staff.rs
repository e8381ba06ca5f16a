//! # Account Commands
//!
//! Local accounts are the source of truth for login. When the remote is
//! enabled each account is mirrored at `/users/{uid}` as `{username, role,
//! email?}`; passwords never leave the machine.
//!
//! ```text
//! staff add ────► users.create ─────► push_user
//! staff role ───► users.set_role ───► update_user_role (role field only)
//! staff remove ─► users.delete ─────► remove_user
//! staff passwd / admin passwd ──────► local hash only
//! ```

use stockroom_core::{Role, User};
use stockroom_db::pool::DEFAULT_ADMIN_PASSWORD;
use stockroom_sync::SyncError;
use tracing::warn;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const ADMIN_USERNAME: &str = "admin";

pub async fn login(state: &AppState, username: &str, password: &str) -> ApiResult<String> {
    let user = state
        .db()
        .users()
        .authenticate(username, password)
        .await?
        .ok_or_else(|| ApiError::auth("Invalid username or password."))?;

    let mut lines = vec![format!("Logged in as {} ({}).", user.username, user.role)];
    if user.role == Role::Admin && password == DEFAULT_ADMIN_PASSWORD {
        warn!(username = %user.username, "Default admin password in use");
        lines.push(
            "Warning: the default admin password is still in use. \
             Change it with `stockroom admin passwd`."
                .to_string(),
        );
    }
    Ok(lines.join("\n"))
}

pub async fn add(state: &AppState, username: &str, password: &str, role: Role) -> ApiResult<String> {
    let user = state.db().users().create(username, password, role).await?;
    let mut out = format!("Account created: {} ({}).", user.username, user.role);

    if let Some(sync) = state.synchronizer() {
        let email = user.username.contains('@').then(|| user.username.clone());
        if let Err(e) = sync.push_user(&user, email).await {
            out.push_str(&mirror_failed(&user, e));
        }
    }
    Ok(out)
}

pub async fn passwd(state: &AppState, username: &str, password: &str) -> ApiResult<String> {
    state.db().users().change_password(username, password).await?;
    Ok(format!("Password updated for {username}."))
}

pub async fn remove(state: &AppState, username: &str) -> ApiResult<String> {
    let users = state.db().users();
    let target = users
        .get_by_username(username)
        .await?
        .ok_or_else(|| ApiError::not_found("User", username))?;

    if target.role == Role::Admin && admin_count(state).await? <= 1 {
        return Err(ApiError::validation("Cannot remove the last admin account."));
    }

    let user = users
        .delete(username)
        .await?
        .ok_or_else(|| ApiError::not_found("User", username))?;
    let mut out = format!("Account removed: {}.", user.username);

    if let Some(sync) = state.synchronizer() {
        if let Err(e) = sync.remove_user(&user).await {
            out.push_str(&mirror_failed(&user, e));
        }
    }
    Ok(out)
}

pub async fn set_role(state: &AppState, username: &str, role: Role) -> ApiResult<String> {
    let users = state.db().users();
    let current = users
        .get_by_username(username)
        .await?
        .ok_or_else(|| ApiError::not_found("User", username))?;

    if current.role == Role::Admin && role != Role::Admin && admin_count(state).await? <= 1 {
        return Err(ApiError::validation("Cannot demote the last admin account."));
    }

    let user = users.set_role(username, role).await?;
    let mut out = format!("{} is now {}.", user.username, user.role);

    if let Some(sync) = state.synchronizer() {
        if let Err(e) = sync.update_user_role(&user).await {
            out.push_str(&mirror_failed(&user, e));
        }
    }
    Ok(out)
}

pub async fn list(state: &AppState) -> ApiResult<String> {
    let users = state.db().users().list().await?;
    Ok(users
        .iter()
        .map(|u| format!("{:<32} {}", u.username, u.role))
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Changes the `admin` password after checking the current one.
pub async fn admin_passwd(
    state: &AppState,
    current: &str,
    new: &str,
    confirm: &str,
) -> ApiResult<String> {
    let users = state.db().users();
    if users.authenticate(ADMIN_USERNAME, current).await?.is_none() {
        return Err(ApiError::auth("Current admin password is incorrect."));
    }
    if new != confirm {
        return Err(ApiError::validation("New passwords do not match."));
    }

    users.change_password(ADMIN_USERNAME, new).await?;
    Ok("Admin password updated.".to_string())
}

async fn admin_count(state: &AppState) -> ApiResult<usize> {
    let users = state.db().users().list().await?;
    Ok(users.iter().filter(|u| u.role == Role::Admin).count())
}

fn mirror_failed(user: &User, e: SyncError) -> String {
    warn!(username = %user.username, error = %e, "Remote account mirror failed");
    format!(" Remote copy not updated: {e}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{mirrored_state, offline_state};
    use crate::error::ErrorCode;
    use stockroom_sync::RemoteStore;

    #[tokio::test]
    async fn test_bootstrap_admin_login_warns() {
        let state = offline_state().await;
        let out = login(&state, "admin", DEFAULT_ADMIN_PASSWORD).await.unwrap();
        assert!(out.starts_with("Logged in as admin (admin)."));
        assert!(out.contains("default admin password"));

        let err = login(&state, "admin", "wrong-password").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthFailed);
    }

    #[tokio::test]
    async fn test_staff_lifecycle_is_mirrored() {
        let (state, remote) = mirrored_state().await;

        let out = add(&state, "till@shop.example", "pa55word", Role::Staff)
            .await
            .unwrap();
        assert_eq!(out, "Account created: till@shop.example (staff).");

        let uid = state
            .db()
            .users()
            .get_by_username("till@shop.example")
            .await
            .unwrap()
            .unwrap()
            .uid;
        let path = format!("/users/{uid}");
        let stored = remote.get(&path).await.unwrap().unwrap();
        assert_eq!(stored["role"], "staff");
        assert_eq!(stored["email"], "till@shop.example");
        assert!(stored.get("password").is_none());

        set_role(&state, "till@shop.example", Role::Admin).await.unwrap();
        assert_eq!(remote.get(&path).await.unwrap().unwrap()["role"], "admin");

        passwd(&state, "till@shop.example", "n3wpass").await.unwrap();
        let out = login(&state, "till@shop.example", "n3wpass").await.unwrap();
        assert_eq!(out, "Logged in as till@shop.example (admin).");

        remove(&state, "till@shop.example").await.unwrap();
        assert!(remote.get(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_and_missing_accounts() {
        let state = offline_state().await;
        add(&state, "cashier", "pa55word", Role::Staff).await.unwrap();

        let err = add(&state, "cashier", "pa55word", Role::Staff).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        let err = remove(&state, "ghost").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);

        let err = passwd(&state, "cashier", "123").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        let out = list(&state).await.unwrap();
        assert_eq!(out.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_last_admin_is_protected() {
        let state = offline_state().await;
        assert!(remove(&state, "admin").await.is_err());
        assert!(set_role(&state, "admin", Role::Staff).await.is_err());

        add(&state, "owner", "pa55word", Role::Admin).await.unwrap();
        set_role(&state, "admin", Role::Staff).await.unwrap();
    }

    #[tokio::test]
    async fn test_admin_password_change() {
        let state = offline_state().await;

        let err = admin_passwd(&state, "nope", "s3cret!", "s3cret!").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthFailed);

        let err = admin_passwd(&state, DEFAULT_ADMIN_PASSWORD, "s3cret!", "s3cret?")
            .await
            .unwrap_err();
        assert_eq!(err.message, "New passwords do not match.");

        admin_passwd(&state, DEFAULT_ADMIN_PASSWORD, "s3cret!", "s3cret!")
            .await
            .unwrap();
        let out = login(&state, "admin", "s3cret!").await.unwrap();
        assert_eq!(out, "Logged in as admin (admin).");
    }
}
