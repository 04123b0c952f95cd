use std::fmt;
use std::io::Read;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use crate::error::{Error, Result};

/// read buffer for streaming content through a hasher
pub(crate) const CHUNK_SIZE: usize = 64 * 1024;

/// hash function used to derive content ids
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Algorithm {
    Sha224,
    #[default]
    Sha256,
    Sha384,
    Sha512,
    Blake3,
}

impl Algorithm {
    /// every algorithm a store can be configured with
    pub const ALL: [Algorithm; 5] = [
        Algorithm::Sha224,
        Algorithm::Sha256,
        Algorithm::Sha384,
        Algorithm::Sha512,
        Algorithm::Blake3,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Sha224 => "sha224",
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha384 => "sha384",
            Algorithm::Sha512 => "sha512",
            Algorithm::Blake3 => "blake3",
        }
    }

    /// length of a hex digest produced by this algorithm
    pub fn hex_len(&self) -> usize {
        let bytes = match self {
            Algorithm::Sha224 => 28,
            Algorithm::Sha256 => 32,
            Algorithm::Sha384 => 48,
            Algorithm::Sha512 => 64,
            Algorithm::Blake3 => blake3::OUT_LEN,
        };
        bytes * 2
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    /// accepts "sha256", "SHA256" and "sha-256" spellings
    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();

        Algorithm::ALL
            .into_iter()
            .find(|a| a.name() == normalized)
            .ok_or_else(|| Error::UnsupportedAlgorithm(s.to_string()))
    }
}

impl TryFrom<String> for Algorithm {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Algorithm> for String {
    fn from(a: Algorithm) -> Self {
        a.name().to_string()
    }
}

/// incremental hash context, fed one chunk at a time
pub struct Hasher {
    inner: Inner,
}

enum Inner {
    Sha224(Sha224),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    pub fn new(algorithm: Algorithm) -> Self {
        let inner = match algorithm {
            Algorithm::Sha224 => Inner::Sha224(Sha224::new()),
            Algorithm::Sha256 => Inner::Sha256(Sha256::new()),
            Algorithm::Sha384 => Inner::Sha384(Sha384::new()),
            Algorithm::Sha512 => Inner::Sha512(Sha512::new()),
            Algorithm::Blake3 => Inner::Blake3(Box::new(blake3::Hasher::new())),
        };
        Self { inner }
    }

    /// feed content bytes
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.inner {
            Inner::Sha224(h) => h.update(data),
            Inner::Sha256(h) => h.update(data),
            Inner::Sha384(h) => h.update(data),
            Inner::Sha512(h) => h.update(data),
            Inner::Blake3(h) => {
                h.update(data);
            }
        }
    }

    /// finalize and return the lowercase hex digest
    pub fn finalize_hex(self) -> String {
        match self.inner {
            Inner::Sha224(h) => hex::encode(h.finalize()),
            Inner::Sha256(h) => hex::encode(h.finalize()),
            Inner::Sha384(h) => hex::encode(h.finalize()),
            Inner::Sha512(h) => hex::encode(h.finalize()),
            Inner::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// hash everything `reader` yields, without holding more than one chunk in memory
pub fn compute_hash<R: Read + ?Sized>(reader: &mut R, algorithm: Algorithm) -> Result<String> {
    let mut hasher = Hasher::new(algorithm);
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Read(e)),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize_hex())
}

/// hash an in-memory buffer
pub fn hash_bytes(data: &[u8], algorithm: Algorithm) -> String {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize_hex()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// reader that hands out at most `step` bytes per read call
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_sha256_known_vectors() {
        assert_eq!(
            hash_bytes(b"", Algorithm::Sha256),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            hash_bytes(b"abc", Algorithm::Sha256),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_content_digest_prefix() {
        let id = hash_bytes(b"content", Algorithm::Sha256);
        assert_eq!(id.len(), 64);
        assert!(id.starts_with("ed7"));
    }

    #[test]
    fn test_hex_len_matches_output() {
        for algorithm in Algorithm::ALL {
            let id = hash_bytes(b"length check", algorithm);
            assert_eq!(id.len(), algorithm.hex_len(), "{algorithm}");
            assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let data: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        for algorithm in Algorithm::ALL {
            let direct = hash_bytes(&data, algorithm);
            let mut trickle = Trickle {
                data: &data,
                step: 1000,
            };
            let streamed = compute_hash(&mut trickle, algorithm).unwrap();
            assert_eq!(direct, streamed, "{algorithm}");
        }
    }

    #[test]
    fn test_different_content_different_digest() {
        let a = compute_hash(&mut Cursor::new(b"data a"), Algorithm::Sha256).unwrap();
        let b = compute_hash(&mut Cursor::new(b"data b"), Algorithm::Sha256).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!("sha256".parse::<Algorithm>().unwrap(), Algorithm::Sha256);
        assert_eq!("SHA-512".parse::<Algorithm>().unwrap(), Algorithm::Sha512);
        assert_eq!("blake3".parse::<Algorithm>().unwrap(), Algorithm::Blake3);
        assert!(matches!(
            "md4".parse::<Algorithm>(),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_algorithm_serde() {
        let json = serde_json::to_string(&Algorithm::Sha384).unwrap();
        assert_eq!(json, "\"sha384\"");
        let parsed: Algorithm = serde_json::from_str("\"sha224\"").unwrap();
        assert_eq!(parsed, Algorithm::Sha224);
        assert!(serde_json::from_str::<Algorithm>("\"whirlpool\"").is_err());
    }
}
