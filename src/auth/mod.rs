//! Credential and input handling: Argon2id password hashing and the pure
//! validator/formatter for user-supplied strings.

pub mod password;
pub mod validate;

pub use validate::InputKind;
