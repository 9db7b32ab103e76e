use sha1::{Digest, Sha1};

/// Hex-encoded SHA-1 of the raw command text
pub fn content_hash(command: &[u8]) -> String {
    hex::encode(Sha1::digest(command))
}

/// Log file name for a command: `<content hash>.log`
pub fn log_file_name(command: &[u8]) -> String {
    format!("{}.log", content_hash(command))
}
