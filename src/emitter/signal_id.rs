use sha2::{Digest, Sha256};

const ID_LEN: usize = 8;

/// Short human-readable id derived from token and emission time
pub fn signal_id(token: &str, timestamp: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.update(b":");
    hasher.update(timestamp.to_be_bytes());
    let digest = hasher.finalize();

    digest
        .iter()
        .take(ID_LEN / 2)
        .map(|b| format!("{:02X}", b))
        .collect()
}
