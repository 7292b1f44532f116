//! `users.json` table.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use super::file::{Edit, JsonFile};
use super::models::{NewUser, Role, User};
use super::StoreError;

pub struct UserStore {
    pub(super) file: JsonFile<Vec<User>>,
}

fn is_admin_email(email: Option<&str>, admin_emails: &[String]) -> bool {
    email.is_some_and(|e| admin_emails.iter().any(|a| a.eq_ignore_ascii_case(e.trim())))
}

impl UserStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path),
        }
    }

    pub fn all(&self) -> Result<Vec<User>, StoreError> {
        self.file.read()
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.all()?.into_iter().find(|u| u.id == id))
    }

    pub fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.all()?.into_iter().find(|u| u.username == username))
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .all()?
            .into_iter()
            .find(|u| u.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(email))))
    }

    /// Users still waiting for admin approval.
    pub fn pending(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.all()?.into_iter().filter(|u| !u.approved).collect())
    }

    /// Insert a new account.
    ///
    /// Usernames are checked before emails. Accounts whose email is listed in
    /// `admin_emails` are created approved with the admin role.
    pub fn insert(
        &self,
        new: NewUser,
        admin_emails: &[String],
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        self.file.update(|users| {
            if users.iter().any(|u| u.username == new.username) {
                return Edit::Keep(Err(StoreError::Conflict("Username already exists".into())));
            }
            if let Some(email) = new.email.as_deref() {
                let taken = users
                    .iter()
                    .any(|u| u.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(email)));
                if taken {
                    return Edit::Keep(Err(StoreError::Conflict("Email already exists".into())));
                }
            }

            let admin = is_admin_email(new.email.as_deref(), admin_emails);
            let user = User {
                id: uuid::Uuid::new_v4().to_string(),
                username: new.username,
                password_hash: new.password_hash,
                email: new.email,
                approved: admin,
                role: if admin { Role::Admin } else { Role::User },
                created_at: now,
                last_login: None,
                total_session_duration: None,
            };
            users.push(user.clone());
            Edit::Write(Ok(user))
        })?
    }

    /// Mark a user approved, promoting configured admin emails.
    ///
    /// Returns `false` when the id is unknown.
    pub fn approve(&self, id: &str, admin_emails: &[String]) -> Result<bool, StoreError> {
        self.file.update(|users| match users.iter_mut().find(|u| u.id == id) {
            Some(user) => {
                user.approved = true;
                if is_admin_email(user.email.as_deref(), admin_emails) {
                    user.role = Role::Admin;
                }
                Edit::Write(true)
            }
            None => Edit::Keep(false),
        })
    }

    /// Delete a user row. Returns `false` when the id is unknown.
    pub fn remove(&self, id: &str) -> Result<bool, StoreError> {
        self.file.update(|users| {
            let before = users.len();
            users.retain(|u| u.id != id);
            if users.len() == before {
                Edit::Keep(false)
            } else {
                Edit::Write(true)
            }
        })
    }

    pub fn update_last_login(&self, id: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        self.modify(id, |user| user.last_login = Some(now))
    }

    pub fn set_password_hash(&self, id: &str, hash: String) -> Result<bool, StoreError> {
        self.modify(id, |user| user.password_hash = hash)
    }

    fn modify(&self, id: &str, f: impl FnOnce(&mut User)) -> Result<bool, StoreError> {
        self.file.update(|users| match users.iter_mut().find(|u| u.id == id) {
            Some(user) => {
                f(user);
                Edit::Write(true)
            }
            None => Edit::Keep(false),
        })
    }
}
