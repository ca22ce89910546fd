//! Email normalization.
//!
//! Allow-list entries are stored with a normalized address and lookups
//! normalize the caller's address the same way, so `" Foo@Bar.COM "` and
//! `"foo@bar.com"` always resolve to the same entry.

/// Normalizes an email address for storage and lookup.
///
/// Lower-cases the address and trims surrounding whitespace. No other
/// validation is performed; the identity provider owns address validity.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
