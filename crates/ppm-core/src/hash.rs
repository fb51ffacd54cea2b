//! Content fingerprinting
//!
//! Plugin jars are identified by the SHA-1 of their raw bytes, independent
//! of filename. Registries use the same digest to address artifacts.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha1::{Digest, Sha1};

use crate::error::Result;

const CHUNK_SIZE: usize = 256 * 1024;

/// Compute the lowercase hex SHA-1 of a file, streaming in chunks.
pub fn sha1_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
