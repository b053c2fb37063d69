//! Mission identifier generation
//!
//! Injected into the control service as a trait so tests can pin ids
//! deterministically instead of relying on process-global randomness.

use rand::Rng;

pub trait MissionIdGen: Send + Sync {
    /// Produce a fresh, opaque mission identifier
    fn mission_id(&self) -> String;
}

/// Default generator: `m_` plus 8 random lowercase-alphanumeric characters
pub struct RandMissionIds;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

impl MissionIdGen for RandMissionIds {
    fn mission_id(&self) -> String {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..8)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        format!("m_{suffix}")
    }
}
