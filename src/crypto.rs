//! Cryptogragic logics.

use k256::PublicKey;
use sha2::{Digest, Sha256};

/// Digest data into hex-encoded SHA256.
///
/// Used for password hashes, which bridge clients already send digested on
/// registration.
pub fn digest(data: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let hash = hasher.finalize();

    hex::encode(hash)
}

/// Length of a compressed SEC1 point.
const COMPRESSED_KEY_LENGTH: usize = 33;

/// Error related to public keys.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("public key is not hex encoded")]
    Hex(#[from] hex::FromHexError),
    #[error("public key is not a compressed SEC1 point")]
    Format,
    #[error("public key is not a secp256k1 point")]
    Curve(#[from] k256::elliptic_curve::Error),
}

/// Check if a hex key is a well-formatted secp256k1 public key.
///
/// Only the compressed SEC1 encoding is accepted: 33 bytes starting with
/// `0x02` or `0x03`.
pub fn check_key(key: &str) -> Result<(), KeyError> {
    let bytes = hex::decode(key)?;
    if bytes.len() != COMPRESSED_KEY_LENGTH || !matches!(bytes[0], 0x02 | 0x03) {
        return Err(KeyError::Format);
    }

    PublicKey::from_sec1_bytes(&bytes)?;

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Generator point of secp256k1, compressed.
    pub(crate) const PUBLIC_KEY: &str =
        "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    #[test]
    fn test_sha2() {
        assert_eq!(
            digest("password"),
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
        );
    }

    #[test]
    fn test_secp256k1() {
        assert!(check_key(PUBLIC_KEY).is_ok());

        // Odd y coordinate, same x.
        let odd = format!("03{}", &PUBLIC_KEY[2..]);
        assert!(check_key(&odd).is_ok());
    }

    #[test]
    fn test_invalid_keys() {
        assert!(matches!(check_key("not hex"), Err(KeyError::Hex(_))));
        assert!(matches!(check_key("0400"), Err(KeyError::Format)));
        assert!(matches!(check_key(""), Err(KeyError::Format)));

        // Uncompressed form of the generator point.
        const UNCOMPRESSED: &str = "0479be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8";
        assert!(matches!(check_key(UNCOMPRESSED), Err(KeyError::Format)));

        // Valid length, compact or unknown SEC1 tags.
        for tag in ["00", "04", "05"] {
            let key = format!("{tag}{}", &PUBLIC_KEY[2..]);
            assert!(matches!(check_key(&key), Err(KeyError::Format)));
        }

        // x = 0 has no matching y on secp256k1.
        let off_curve = format!("02{}", "00".repeat(32));
        assert!(matches!(check_key(&off_curve), Err(KeyError::Curve(_))));
    }
}
