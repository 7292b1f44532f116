//! Account lifecycle: signup, login, password change.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use dreamlib_core::config::AuthConfig;
use dreamlib_core::store::{NewUser, Store, User};

use super::password;
use crate::error::{ApiError, ApiResult};

pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 6;

const INVALID_CREDENTIALS: &str = "Invalid username or password";

pub fn validate_username(username: &str) -> ApiResult<()> {
    if username.chars().count() < MIN_USERNAME_LEN {
        return Err(ApiError::bad_request(format!(
            "Username must be at least {MIN_USERNAME_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> ApiResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Create an account. Configured admin emails skip the approval queue.
pub fn create_user(
    store: &Store,
    auth: &AuthConfig,
    username: &str,
    password: &str,
    email: Option<&str>,
    now: DateTime<Utc>,
) -> ApiResult<User> {
    let username = username.trim();
    validate_username(username)?;
    validate_password(password)?;

    let email = email.map(str::trim).filter(|e| !e.is_empty());
    let hash = password::hash_password(password)?;
    let user = store.users.insert(
        NewUser {
            username: username.to_string(),
            password_hash: hash,
            email: email.map(ToString::to_string),
        },
        &auth.admin_emails,
        now,
    )?;

    info!(
        user_id = %user.id,
        username = %user.username,
        approved = user.approved,
        "User registered"
    );
    Ok(user)
}

/// Check credentials and record the login.
///
/// Unknown users and wrong passwords are indistinguishable (401); correct
/// credentials on an unapproved account give 403.
pub fn authenticate(
    store: &Store,
    username: &str,
    password: &str,
    now: DateTime<Utc>,
) -> ApiResult<User> {
    let Some(mut user) = store.users.find_by_username(username.trim())? else {
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    };

    let valid = password::verify_password(password, &user.password_hash).unwrap_or_else(|e| {
        warn!(user_id = %user.id, error = %e, "Stored password hash is unreadable");
        false
    });
    if !valid {
        warn!(username = %user.username, "Failed login attempt");
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    }

    if !user.approved {
        return Err(ApiError::forbidden("Your account is pending admin approval"));
    }

    if password::is_legacy_hash(&user.password_hash) {
        upgrade_hash(store, &mut user, password);
    }

    store.users.update_last_login(&user.id, now)?;
    user.last_login = Some(now);
    info!(user_id = %user.id, username = %user.username, "User logged in");
    Ok(user)
}

/// Re-hash a bcrypt password with argon2 after a successful login. A failed
/// upgrade keeps the old hash and does not block the login.
fn upgrade_hash(store: &Store, user: &mut User, password: &str) {
    let hash = match password::hash_password(password) {
        Ok(hash) => hash,
        Err(e) => {
            warn!(user_id = %user.id, error = %e, "Could not re-hash legacy password");
            return;
        }
    };
    match store.users.set_password_hash(&user.id, hash.clone()) {
        Ok(_) => {
            info!(user_id = %user.id, "Upgraded legacy bcrypt hash to argon2");
            user.password_hash = hash;
        }
        Err(e) => warn!(user_id = %user.id, error = %e, "Could not store upgraded password hash"),
    }
}

/// Replace a password after verifying the current one.
pub fn change_password(
    store: &Store,
    user_id: &str,
    current: &str,
    new: &str,
) -> ApiResult<()> {
    validate_password(new)?;

    let user = store
        .users
        .find_by_id(user_id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let valid = password::verify_password(current, &user.password_hash).unwrap_or(false);
    if !valid {
        return Err(ApiError::bad_request("Current password is incorrect"));
    }

    let hash = password::hash_password(new)?;
    store.users.set_password_hash(user_id, hash)?;
    info!(user_id, "Password changed");
    Ok(())
}

pub fn username_available(store: &Store, username: &str) -> ApiResult<bool> {
    Ok(store.users.find_by_username(username.trim())?.is_none())
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use dreamlib_core::store::Role;
    use tempfile::TempDir;

    fn setup() -> (Store, AuthConfig, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), 300).unwrap();
        let auth = AuthConfig {
            admin_emails: vec!["boss@example.com".into()],
            ..AuthConfig::default()
        };
        (store, auth, dir)
    }

    #[test]
    fn signup_is_pending_until_approved() {
        let (store, auth, _dir) = setup();
        let user = create_user(&store, &auth, "reader", "secret1", None, Utc::now()).unwrap();
        assert!(!user.approved);
        assert_eq!(user.role, Role::User);

        let err = authenticate(&store, "reader", "secret1", Utc::now()).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        store.users.approve(&user.id, &auth.admin_emails).unwrap();
        let logged_in = authenticate(&store, "reader", "secret1", Utc::now()).unwrap();
        assert!(logged_in.last_login.is_some());
        let stored = store.users.find_by_id(&user.id).unwrap().unwrap();
        assert_eq!(stored.last_login, logged_in.last_login);
    }

    #[test]
    fn admin_email_is_approved_immediately() {
        let (store, auth, _dir) = setup();
        let user = create_user(
            &store,
            &auth,
            "boss",
            "secret1",
            Some(" Boss@Example.com "),
            Utc::now(),
        )
        .unwrap();
        assert!(user.approved);
        assert_eq!(user.role, Role::Admin);
        assert_eq!(user.email.as_deref(), Some("Boss@Example.com"));
    }

    #[test]
    fn short_fields_are_rejected() {
        let (store, auth, _dir) = setup();
        let err = create_user(&store, &auth, "ab", "secret1", None, Utc::now()).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let err = create_user(&store, &auth, "abc", "12345", None, Utc::now()).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(store.users.all().unwrap().is_empty());
    }

    #[test]
    fn duplicate_username_is_bad_request() {
        let (store, auth, _dir) = setup();
        create_user(&store, &auth, "reader", "secret1", None, Utc::now()).unwrap();
        let err = create_user(&store, &auth, "reader", "secret2", None, Utc::now()).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Username already exists");
        assert!(!username_available(&store, "reader").unwrap());
        assert!(username_available(&store, "other").unwrap());
    }

    #[test]
    fn wrong_password_and_unknown_user_look_the_same() {
        let (store, auth, _dir) = setup();
        create_user(&store, &auth, "reader", "secret1", None, Utc::now()).unwrap();
        let wrong = authenticate(&store, "reader", "nope!!", Utc::now()).unwrap_err();
        let unknown = authenticate(&store, "ghost", "secret1", Utc::now()).unwrap_err();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    /// Store a row the way the bcrypt-based account store wrote them.
    fn insert_legacy_user(store: &Store, username: &str, password: &str) -> User {
        let user = store
            .users
            .insert(
                NewUser {
                    username: username.into(),
                    password_hash: bcrypt::hash(password, 4).unwrap().replacen("$2b$", "$2a$", 1),
                    email: None,
                },
                &[],
                Utc::now(),
            )
            .unwrap();
        store.users.approve(&user.id, &[]).unwrap();
        user
    }

    #[test]
    fn legacy_bcrypt_account_logs_in_and_is_upgraded() {
        let (store, _auth, _dir) = setup();
        let user = insert_legacy_user(&store, "oldtimer", "secret1");
        assert!(user.password_hash.starts_with("$2a$"));

        let err = authenticate(&store, "oldtimer", "wrong!!", Utc::now()).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        let still_legacy = store.users.find_by_id(&user.id).unwrap().unwrap();
        assert!(password::is_legacy_hash(&still_legacy.password_hash));

        let logged_in = authenticate(&store, "oldtimer", "secret1", Utc::now()).unwrap();
        assert!(logged_in.password_hash.starts_with("$argon2id$"));
        let stored = store.users.find_by_id(&user.id).unwrap().unwrap();
        assert!(stored.password_hash.starts_with("$argon2id$"));

        assert!(authenticate(&store, "oldtimer", "secret1", Utc::now()).is_ok());
    }

    #[test]
    fn legacy_bcrypt_account_can_change_password() {
        let (store, _auth, _dir) = setup();
        let user = insert_legacy_user(&store, "oldtimer", "secret1");
        change_password(&store, &user.id, "secret1", "newsecret").unwrap();
        assert!(authenticate(&store, "oldtimer", "newsecret", Utc::now()).is_ok());
    }

    #[test]
    fn change_password_requires_current() {
        let (store, auth, _dir) = setup();
        let user = create_user(&store, &auth, "boss", "secret1", Some("boss@example.com"), Utc::now())
            .unwrap();

        let err = change_password(&store, &user.id, "wrong!", "newsecret").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Current password is incorrect");
        let err = change_password(&store, &user.id, "secret1", "123").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        change_password(&store, &user.id, "secret1", "newsecret").unwrap();
        assert!(authenticate(&store, "boss", "secret1", Utc::now()).is_err());
        assert!(authenticate(&store, "boss", "newsecret", Utc::now()).is_ok());
    }
}
