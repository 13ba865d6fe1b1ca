//! Candidate identity syntax.
//!
//! An identity is the leftmost label of a tunnel hostname, so it follows DNS
//! label rules with a stricter alphabet: lower-case ASCII letters, digits and
//! internal hyphens, 4 to 63 characters.

/// Shortest accepted identity.
pub const MIN_IDENTITY_LEN: usize = 4;

/// Longest accepted identity (one DNS label).
pub const MAX_IDENTITY_LEN: usize = 63;

/// Message returned to clients that request an invalid name.
pub const INVALID_IDENTITY_MESSAGE: &str = "Invalid subdomain. Subdomains must be lowercase and between 4 and 63 alphanumeric characters.";

/// Returns true if `candidate` may be registered as a tenant identity.
pub fn is_valid_identity(candidate: &str) -> bool {
    let bytes = candidate.as_bytes();
    if !(MIN_IDENTITY_LEN..=MAX_IDENTITY_LEN).contains(&bytes.len()) {
        return false;
    }

    let alnum = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let first_last_ok = bytes.first().is_some_and(alnum) && bytes.last().is_some_and(alnum);

    first_last_ok && bytes.iter().all(|b| alnum(b) || *b == b'-')
}
