use std::path::Path;

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Reads a local file fully into memory, returning its bytes and checksum.
pub async fn read_with_checksum(path: &Path) -> std::io::Result<(Vec<u8>, String)> {
    let content = tokio::fs::read(path).await?;
    let checksum = sha256_hex(&content);
    Ok((content, checksum))
}
