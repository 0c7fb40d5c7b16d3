//! Signing identities for the two hedge sides
//!
//! Key material is loaded once at startup and stays read-only afterwards.

mod account;

pub use account::{load_private_keys, parse_private_keys, Account};
