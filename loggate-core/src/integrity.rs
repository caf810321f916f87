//! Payload integrity checks against the client's `Digest` header.

use md5::Md5;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Md5,
    Sha256,
}

impl DigestAlgorithm {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "md5" => Some(Self::Md5),
            "sha-256" | "sha256" => Some(Self::Sha256),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha-256",
        }
    }

    /// Lowercase hex digest of `data`.
    pub fn compute(&self, data: &[u8]) -> String {
        match self {
            Self::Md5 => hex::encode(Md5::digest(data)),
            Self::Sha256 => hex::encode(Sha256::digest(data)),
        }
    }
}

/// A parsed `algorithm=digest` header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedDigest {
    pub algorithm: DigestAlgorithm,
    pub value: String,
}

impl ClaimedDigest {
    /// Everything after the first `=` is the digest value.
    pub fn parse(header: &str) -> Result<Self, String> {
        let (algorithm, value) = header
            .split_once('=')
            .ok_or_else(|| format!("digest header has no '=': {}", header))?;

        let algorithm = DigestAlgorithm::from_name(algorithm)
            .ok_or_else(|| format!("unsupported digest algorithm: {}", algorithm.trim()))?;

        let value = value.trim();
        if value.is_empty() {
            return Err("digest header carries an empty digest".to_string());
        }

        Ok(Self {
            algorithm,
            value: value.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferVerdict {
    Verified,
    Corrupt { expected: String, actual: String },
    Malformed(String),
}

/// Recompute the payload digest and classify the transfer.
pub fn verify_transfer(body: &[u8], digest_header: Option<&str>) -> TransferVerdict {
    let Some(header) = digest_header else {
        return TransferVerdict::Malformed("no digest header on transfer".to_string());
    };

    let claimed = match ClaimedDigest::parse(header) {
        Ok(claimed) => claimed,
        Err(reason) => return TransferVerdict::Malformed(reason),
    };

    let actual = claimed.algorithm.compute(body);
    if actual.eq_ignore_ascii_case(&claimed.value) {
        TransferVerdict::Verified
    } else {
        TransferVerdict::Corrupt {
            expected: claimed.value,
            actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn md5_header(data: &[u8]) -> String {
        format!("md5={}", DigestAlgorithm::Md5.compute(data).to_uppercase())
    }

    #[test]
    fn test_known_md5() {
        assert_eq!(
            DigestAlgorithm::Md5.compute(b"hello"),
            "5d41402abc4b2a76b9719d911017c592"
        );
    }

    #[test]
    fn test_verified_with_uppercase_hex() {
        let header = md5_header(b"hello");
        assert_eq!(
            verify_transfer(b"hello", Some(&header)),
            TransferVerdict::Verified
        );
    }

    #[test]
    fn test_verified_with_sha256() {
        let header = format!("SHA-256={}", DigestAlgorithm::Sha256.compute(b"hello"));
        assert_eq!(
            verify_transfer(b"hello", Some(&header)),
            TransferVerdict::Verified
        );
    }

    #[test]
    fn test_digest_of_other_payload_is_corrupt() {
        let header = md5_header(b"world");
        assert!(matches!(
            verify_transfer(b"hello", Some(&header)),
            TransferVerdict::Corrupt { .. }
        ));
    }

    #[test]
    fn test_any_single_byte_flip_is_corrupt() {
        let payload: Vec<u8> = (0u8..=255).collect();
        let header = md5_header(&payload);
        assert_eq!(
            verify_transfer(&payload, Some(&header)),
            TransferVerdict::Verified
        );

        for index in 0..payload.len() {
            let mut flipped = payload.clone();
            flipped[index] ^= 0x01;
            assert!(
                matches!(
                    verify_transfer(&flipped, Some(&header)),
                    TransferVerdict::Corrupt { .. }
                ),
                "flip at {} was not detected",
                index
            );
        }
    }

    #[test]
    fn test_malformed_headers() {
        assert!(matches!(
            verify_transfer(b"hello", None),
            TransferVerdict::Malformed(_)
        ));
        assert!(matches!(
            verify_transfer(b"hello", Some("md5")),
            TransferVerdict::Malformed(_)
        ));
        assert!(matches!(
            verify_transfer(b"hello", Some("md5=")),
            TransferVerdict::Malformed(_)
        ));
        assert!(matches!(
            verify_transfer(b"hello", Some("crc32=abcd")),
            TransferVerdict::Malformed(_)
        ));
    }

    #[test]
    fn test_value_is_everything_after_first_equals() {
        let claimed = ClaimedDigest::parse("md5=abc=def").unwrap();
        assert_eq!(claimed.algorithm, DigestAlgorithm::Md5);
        assert_eq!(claimed.value, "abc=def");
    }

    #[test]
    fn test_empty_payload() {
        let header = md5_header(b"");
        assert_eq!(verify_transfer(b"", Some(&header)), TransferVerdict::Verified);
    }
}
