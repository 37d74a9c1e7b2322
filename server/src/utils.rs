use rand::Rng;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Alphabet for client and session ids; drops look-alike letters.
const ID_ALPHABET: &[u8] = b"abcdefghjkmnopqrstwxyz0123456789";
pub const ID_LENGTH: usize = 6;

// Get current timestamp in milliseconds
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

// Generate a short random id from the id alphabet
pub fn create_id<R: Rng>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}
