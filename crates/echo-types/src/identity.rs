//! Anonymous identity derivation.
//!
//! A device token never reaches the store. It is reduced to a participant
//! key, which scopes reactions and votes, and every anon hash maps to a
//! stable "Mood Animal" display name.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const ANIMALS: [&str; 10] = [
    "Panda", "Fox", "Cat", "Tiger", "Koala", "Sloth", "Penguin", "Raccoon", "Otter", "Wolf",
];

const MOODS: [&str; 10] = [
    "Sad", "Sassy", "Chaotic", "Sleepy", "Angry", "Crying", "Evil", "Drunk", "High", "Horny",
];

/// Hex characters kept from the token digest.
const PARTICIPANT_KEY_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnonIdentity {
    pub participant_key: String,
    pub display_name: String,
}

/// Derive the participant key and display name for a device token.
pub fn derive_identity(device_token: &str) -> AnonIdentity {
    let participant_key = participant_key(device_token);
    let display_name = display_name(&participant_key);
    AnonIdentity {
        participant_key,
        display_name,
    }
}

/// Stable pseudonym for a device token. One vote per poll and one reaction
/// per message are keyed on this value.
pub fn participant_key(device_token: &str) -> String {
    let digest = hex::encode(Sha256::digest(device_token.as_bytes()));
    digest[..PARTICIPANT_KEY_LEN].to_string()
}

/// "Mood Animal" label for an anon hash.
pub fn display_name(anon_hash: &str) -> String {
    let digest = Sha256::digest(anon_hash.as_bytes());
    // First 8 hex characters of the digest as an integer.
    let n = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize;
    let animal = ANIMALS[n % ANIMALS.len()];
    let mood = MOODS[(n / 100_000_000) % MOODS.len()];
    format!("{} {}", mood, animal)
}
