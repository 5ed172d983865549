//! Resumable SHA-512
//!
//! `sha2` does not expose the internal state of its hasher, so this module
//! drives the raw SHA-512 compression function itself and keeps the three
//! pieces of state it needs in plain fields:
//!
//! - the eight 64-bit chaining words
//! - the number of bytes processed so far
//! - the pending partial block (always shorter than 128 bytes)
//!
//! [`IncrementalDigest::export`] encodes exactly those fields, so an upload can
//! persist its hash state after every chunk and continue after a restart
//! without re-reading the bytes already written to its scratch file.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use sha2::digest::consts::{U128, U64};
use sha2::digest::generic_array::GenericArray;
use std::io;

const BLOCK_LEN: usize = 128;
const LENGTH_OFFSET: usize = BLOCK_LEN - 16;
const STATE_VERSION: u8 = 1;

/// FIPS 180-4 initial hash value for SHA-512.
const SHA512_IV: [u64; 8] = [
    0x6a09e667f3bcc908,
    0xbb67ae8584caa73b,
    0x3c6ef372fe94f82b,
    0xa54ff53a5f1d36f1,
    0x510e527fade682d1,
    0x9b05688c2b3e6c1f,
    0x1f83d9abfb41bd6b,
    0x5be0cd19137e2179,
];

/// Serialized form of the hash state
#[derive(Debug, Serialize, Deserialize)]
struct DigestSnapshot {
    version: u8,
    state: [u64; 8],
    length: u64,
    buffer: Vec<u8>,
}

/// Incremental SHA-512 whose state can be exported and restored
#[derive(Clone)]
pub struct IncrementalDigest {
    state: [u64; 8],
    length: u64,
    buffer: [u8; BLOCK_LEN],
    buffered: usize,
}

impl std::fmt::Debug for IncrementalDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalDigest")
            .field("length", &self.length)
            .field("buffered", &self.buffered)
            .finish()
    }
}

impl Default for IncrementalDigest {
    fn default() -> Self {
        Self::new()
    }
}

impl IncrementalDigest {
    /// Create a digest with no input processed
    pub fn new() -> Self {
        Self {
            state: SHA512_IV,
            length: 0,
            buffer: [0u8; BLOCK_LEN],
            buffered: 0,
        }
    }

    /// Number of bytes fed into the digest so far
    pub fn bytes_processed(&self) -> u64 {
        self.length
    }

    /// Feed more bytes into the digest
    pub fn update(&mut self, mut data: &[u8]) {
        self.length += data.len() as u64;

        if self.buffered > 0 {
            let take = (BLOCK_LEN - self.buffered).min(data.len());
            self.buffer[self.buffered..self.buffered + take].copy_from_slice(&data[..take]);
            self.buffered += take;
            data = &data[take..];

            if self.buffered < BLOCK_LEN {
                return;
            }
            let block = self.buffer;
            self.compress(&block);
            self.buffered = 0;
        }

        let mut blocks = data.chunks_exact(BLOCK_LEN);
        for block in &mut blocks {
            self.compress(block);
        }

        let rest = blocks.remainder();
        self.buffer[..rest.len()].copy_from_slice(rest);
        self.buffered = rest.len();
    }

    /// Export the internal state as a self-contained byte string
    ///
    /// The encoding is versioned so that a state written by an older build is
    /// either restored faithfully or rejected, never misread.
    pub fn export(&self) -> Result<Vec<u8>> {
        let snapshot = DigestSnapshot {
            version: STATE_VERSION,
            state: self.state,
            length: self.length,
            buffer: self.buffer[..self.buffered].to_vec(),
        };

        bincode::serialize(&snapshot)
            .map_err(|e| StoreError::CorruptDigestState(format!("failed to encode state: {}", e)))
    }

    /// Rebuild a digest from the output of [`export`](Self::export)
    ///
    /// # Errors
    ///
    /// Returns `CorruptDigestState` if the bytes cannot be decoded, carry an
    /// unknown version, or describe an impossible partial block.
    pub fn restore(encoded: &[u8]) -> Result<Self> {
        let snapshot: DigestSnapshot = bincode::deserialize(encoded)
            .map_err(|e| StoreError::CorruptDigestState(format!("undecodable state: {}", e)))?;

        if snapshot.version != STATE_VERSION {
            return Err(StoreError::CorruptDigestState(format!(
                "unsupported state version {}",
                snapshot.version
            )));
        }

        let buffered = snapshot.buffer.len();
        if buffered >= BLOCK_LEN || (snapshot.length % BLOCK_LEN as u64) as usize != buffered {
            return Err(StoreError::CorruptDigestState(format!(
                "partial block of {} bytes does not match length {}",
                buffered, snapshot.length
            )));
        }

        let mut buffer = [0u8; BLOCK_LEN];
        buffer[..buffered].copy_from_slice(&snapshot.buffer);

        Ok(Self {
            state: snapshot.state,
            length: snapshot.length,
            buffer,
            buffered,
        })
    }

    /// Apply SHA-512 padding and return the 64-byte digest
    pub fn finalize(mut self) -> GenericArray<u8, U64> {
        let bit_length = u128::from(self.length) * 8;

        let mut block = [0u8; BLOCK_LEN];
        block[..self.buffered].copy_from_slice(&self.buffer[..self.buffered]);
        block[self.buffered] = 0x80;

        if self.buffered >= LENGTH_OFFSET {
            self.compress(&block);
            block = [0u8; BLOCK_LEN];
        }
        block[LENGTH_OFFSET..].copy_from_slice(&bit_length.to_be_bytes());
        self.compress(&block);

        let mut output = GenericArray::<u8, U64>::default();
        for (chunk, word) in output.chunks_exact_mut(8).zip(self.state.iter()) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        output
    }

    /// Finalize and render the digest as 128 lowercase hex characters
    pub fn finalize_hex(self) -> String {
        format!("{:x}", self.finalize())
    }

    fn compress(&mut self, block: &[u8]) {
        let block = GenericArray::<u8, U128>::from_slice(block);
        sha2::compress512(&mut self.state, std::slice::from_ref(block));
    }
}

impl io::Write for IncrementalDigest {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha512};

    fn reference_hex(data: &[u8]) -> String {
        format!("{:x}", Sha512::digest(data))
    }

    #[test]
    fn test_empty_input_matches_known_digest() {
        let hex = IncrementalDigest::new().finalize_hex();
        assert_eq!(
            hex,
            "cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce\
             47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3e"
        );
    }

    #[test]
    fn test_padding_boundaries_match_sha2() {
        // Lengths around the 112-byte length field and the 128-byte block edge
        for len in [1usize, 55, 111, 112, 113, 127, 128, 129, 239, 240, 256, 1000] {
            let data: Vec<u8> = (0..len).map(|i| (i * 7 % 251) as u8).collect();
            let mut digest = IncrementalDigest::new();
            digest.update(&data);
            assert_eq!(digest.finalize_hex(), reference_hex(&data), "length {}", len);
        }
    }

    #[test]
    fn test_byte_at_a_time_matches_single_update() {
        let data = b"The quick brown fox jumps over the lazy dog, repeatedly and at length.";
        let mut digest = IncrementalDigest::new();
        for byte in data.iter() {
            digest.update(std::slice::from_ref(byte));
        }
        assert_eq!(digest.bytes_processed(), data.len() as u64);
        assert_eq!(digest.finalize_hex(), reference_hex(data));
    }

    #[test]
    fn test_export_restore_continues_hash() {
        let mut digest = IncrementalDigest::new();
        digest.update(&[0xAB; 300]);

        let exported = digest.export().unwrap();
        let mut restored = IncrementalDigest::restore(&exported).unwrap();

        digest.update(b"tail");
        restored.update(b"tail");
        assert_eq!(digest.finalize_hex(), restored.finalize_hex());
    }

    #[test]
    fn test_restore_rejects_garbage() {
        let result = IncrementalDigest::restore(b"not a digest");
        assert!(matches!(result, Err(StoreError::CorruptDigestState(_))));

        let result = IncrementalDigest::restore(&[]);
        assert!(matches!(result, Err(StoreError::CorruptDigestState(_))));
    }

    #[test]
    fn test_restore_rejects_inconsistent_partial_block() {
        let snapshot = DigestSnapshot {
            version: STATE_VERSION,
            state: SHA512_IV,
            length: 10,
            buffer: vec![0u8; 3],
        };
        let encoded = bincode::serialize(&snapshot).unwrap();
        let result = IncrementalDigest::restore(&encoded);
        assert!(matches!(result, Err(StoreError::CorruptDigestState(_))));
    }

    #[test]
    fn test_restore_rejects_unknown_version() {
        let snapshot = DigestSnapshot {
            version: 9,
            state: SHA512_IV,
            length: 0,
            buffer: Vec::new(),
        };
        let encoded = bincode::serialize(&snapshot).unwrap();
        let result = IncrementalDigest::restore(&encoded);
        assert!(matches!(result, Err(StoreError::CorruptDigestState(_))));
    }

    #[test]
    fn test_io_copy_into_digest() {
        let data = vec![7u8; 70_000];
        let mut digest = IncrementalDigest::new();
        io::copy(&mut data.as_slice(), &mut digest).unwrap();
        assert_eq!(digest.finalize_hex(), reference_hex(&data));
    }

    // Property-based tests
    #[cfg(test)]
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn prop_resume_at_any_boundary(
                content in prop::collection::vec(any::<u8>(), 0..4096),
                cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..6),
            ) {
                let mut offsets: Vec<usize> = cuts.iter().map(|c| c.index(content.len() + 1)).collect();
                offsets.sort_unstable();

                let mut digest = IncrementalDigest::new();
                let mut start = 0;
                for end in offsets.into_iter().chain(std::iter::once(content.len())) {
                    digest.update(&content[start..end]);
                    // simulate a process restart at every chunk boundary
                    let exported = digest.export().unwrap();
                    digest = IncrementalDigest::restore(&exported).unwrap();
                    start = end;
                }

                prop_assert_eq!(digest.finalize_hex(), reference_hex(&content));
            }
        }
    }
}
