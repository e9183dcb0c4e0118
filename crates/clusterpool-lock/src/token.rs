//! Lock token generation.
//!
//! A token is written as the lock label's value so a human can tell when a
//! cluster was claimed. Tokens never take part in mutual exclusion; that is
//! the conditional write's job.

use chrono::Utc;
use uuid::Uuid;

/// New token: UTC claim time plus a random v4 UUID.
///
/// Lowercase `[0-9a-f-]` only and 52 characters long, so it is a valid
/// label value for common cloud label schemes.
pub fn new_lock_token() -> String {
    format!(
        "{}-{}",
        Utc::now().format("%Y-%m-%d-%H-%M-%S"),
        Uuid::new_v4().simple()
    )
}
