//! Session tokens, password hashing and account operations.

pub mod accounts;
pub mod claims;
pub mod jwt;
pub mod password;
pub mod session;

pub use claims::Claims;
pub use jwt::JwtManager;
pub use session::{AdminSession, MaybeSession, Session};
