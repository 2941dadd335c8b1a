//! Authentication primitives: password hashing, JWT sessions, API keys.
//!
//! Role semantics live on [`crate::model::UserRole`]; this module only
//! produces and validates credentials.

pub mod apikey;
pub mod jwt;
pub mod password;

pub use apikey::{generate_api_key, generate_secret_key, hash_api_key};
pub use jwt::{Claims, JwtCodec};
pub use password::{hash_password, verify_password};
