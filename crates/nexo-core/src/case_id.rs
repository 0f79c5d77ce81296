//! Case identifier generation

use chrono::{DateTime, Datelike, Utc};
use rand::Rng;

const CASE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const RANDOM_PART_LEN: usize = 7;

/// `{prefix}-{year}-{7 random [0-9A-Z]}{last 6 digits of epoch millis}`
pub fn generate_case_id(prefix: &str, now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let random: String = (0..RANDOM_PART_LEN)
        .map(|_| CASE_ALPHABET[rng.gen_range(0..CASE_ALPHABET.len())] as char)
        .collect();
    let millis = now.timestamp_millis().rem_euclid(1_000_000);
    format!("{prefix}-{}-{random}{millis:06}", now.year())
}
