//! Visitor identifiers.
//!
//! A visitor id is an opaque token issued once per browser and kept in a first-party cookie. It is
//! the only per-visitor state the allocation depends on.

use rand::{thread_rng, Rng};

/// Cookie holding the visitor id.
pub const VISITOR_COOKIE_NAME: &str = "hyp_uid";

/// Cookie lifetime in seconds (one year).
pub const VISITOR_COOKIE_MAX_AGE: u64 = 31_536_000;

const VISITOR_ID_PREFIX: &str = "u_";
const VISITOR_ID_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Issue a new random visitor id, e.g. `u_k3j9x0a1b`.
pub fn generate_visitor_id() -> String {
    let mut rng = thread_rng();
    let mut id = String::with_capacity(VISITOR_ID_PREFIX.len() + VISITOR_ID_LEN);
    id.push_str(VISITOR_ID_PREFIX);
    for _ in 0..VISITOR_ID_LEN {
        id.push(BASE36[rng.gen_range(0..BASE36.len())] as char);
    }
    id
}

/// Extract the visitor id from a `Cookie` request header.
pub fn visitor_id_from_cookie(header: &str) -> Option<&str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == VISITOR_COOKIE_NAME)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value that stores `visitor_id` for a year.
pub fn visitor_cookie(visitor_id: &str) -> String {
    format!(
        "{}={}; Path=/; Max-Age={}; SameSite=Lax",
        VISITOR_COOKIE_NAME, visitor_id, VISITOR_COOKIE_MAX_AGE
    )
}
