//! Content-addressed hash of an upload payload

use std::fmt::{Display, Formatter, Result as FmtResult};

use multihash::Multihash;

use crate::error::AppError;

/// Multihash table code for SHA2-256
pub const SHA2_256_CODE: u64 = 0x12;
/// Digest length of SHA2-256 in bytes
pub const SHA2_256_LEN: usize = 32;

/// Largest digest a `ContentHash` can wrap
const MAX_DIGEST_LEN: usize = 64;

/// Hash algorithms understood by the intake pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha2_256,
}

impl HashAlgorithm {
    pub fn multihash_code(&self) -> u64 {
        match self {
            HashAlgorithm::Sha2_256 => SHA2_256_CODE,
        }
    }

    pub fn digest_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha2_256 => SHA2_256_LEN,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            SHA2_256_CODE => Some(HashAlgorithm::Sha2_256),
            _ => None,
        }
    }
}

/// Identifier derived from an upload's bytes: algorithm, digest and byte count.
///
/// Equal content always produces equal hashes. The canonical textual form is the
/// base58btc encoding of the multihash (`<code><len><digest>`), which is also the
/// name used for objects in permanent storage. Only [`ContentHash::new`] and the
/// parsers build one, so the digest always matches its algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash {
    algorithm: HashAlgorithm,
    multihash: Multihash<MAX_DIGEST_LEN>,
    size: u64,
}

impl ContentHash {
    pub fn new(algorithm: HashAlgorithm, digest: Vec<u8>, size: u64) -> Result<Self, AppError> {
        if digest.len() != algorithm.digest_len() {
            return Err(AppError::InvalidInput(format!(
                "Digest length {} does not match {:?} ({} bytes)",
                digest.len(),
                algorithm,
                algorithm.digest_len()
            )));
        }
        let multihash = Multihash::<MAX_DIGEST_LEN>::wrap(algorithm.multihash_code(), &digest)
            .map_err(|e| AppError::InvalidInput(format!("Invalid multihash: {}", e)))?;
        Ok(Self {
            algorithm,
            multihash,
            size,
        })
    }

    pub fn sha2_256(digest: Vec<u8>, size: u64) -> Result<Self, AppError> {
        Self::new(HashAlgorithm::Sha2_256, digest, size)
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn digest(&self) -> &[u8] {
        self.multihash.digest()
    }

    /// Number of payload bytes that produced the digest
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Self-describing multihash bytes, as persisted with the upload request
    pub fn to_multihash_bytes(&self) -> Vec<u8> {
        self.multihash.to_bytes()
    }

    /// Parse multihash bytes back into a hash for a payload of `size` bytes
    pub fn from_multihash_bytes(bytes: &[u8], size: u64) -> Result<Self, AppError> {
        let mh = Multihash::<MAX_DIGEST_LEN>::from_bytes(bytes)
            .map_err(|e| AppError::InvalidInput(format!("Invalid multihash: {}", e)))?;
        let algorithm = HashAlgorithm::from_code(mh.code()).ok_or_else(|| {
            AppError::InvalidInput(format!("Unsupported multihash code 0x{:x}", mh.code()))
        })?;
        Self::new(algorithm, mh.digest().to_vec(), size)
    }

    /// Base58btc rendering of the multihash
    pub fn to_base58(&self) -> String {
        bs58::encode(self.to_multihash_bytes()).into_string()
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.to_base58())
    }
}
