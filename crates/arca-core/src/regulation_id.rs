//! Content-derived regulation identifiers.
//!
//! The identifier is the first 16 hex characters of the MD5 digest of the
//! regulation text followed by the law date (empty when absent), the same id
//! earlier report artifacts carry. No clock or randomness goes into the
//! digest, so stored reports can be looked up without a database.

use md5::{Digest, Md5};

/// Length of the hex identifier.
pub const REGULATION_ID_LEN: usize = 16;

/// Derive the regulation identifier for `(regulation_text, law_date)`.
pub fn regulation_id(regulation_text: &str, law_date: Option<&str>) -> String {
    let mut hasher = Md5::new();
    hasher.update(regulation_text.as_bytes());
    hasher.update(law_date.unwrap_or("").as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..REGULATION_ID_LEN / 2])
}
