//! Generators for order numbers and invite codes.
use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use regex::Regex;

const INVITE_CODE_LENGTH: usize = 8;

/// Order numbers are a UTC timestamp down to the millisecond followed by six random digits,
/// e.g. `20241001123045123004711`.
pub fn new_order_no(now: DateTime<Utc>) -> String {
    let suffix: u32 = thread_rng().gen_range(0..1_000_000);
    format!("{}{suffix:06}", now.format("%Y%m%d%H%M%S%3f"))
}

/// A random upper-case alphanumeric invite code.
pub fn new_invite_code() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(INVITE_CODE_LENGTH)
        .map(|c| char::from(c).to_ascii_uppercase())
        .collect()
}

/// Permanent-code redemptions materialise an invite link whose code must still be unique, so it is derived from the
/// personal code and the invitee.
pub fn permanent_link_code(personal_code: &str, invitee_id: i64) -> String {
    format!("{personal_code}-{invitee_id}")
}

/// Invite codes are 4 to 64 characters of letters, digits, `-` and `_`.
pub fn is_valid_invite_code(code: &str) -> bool {
    // Compiling this pattern cannot fail
    Regex::new(r"^[A-Za-z0-9_-]{4,64}$").map(|re| re.is_match(code)).unwrap_or(false)
}
