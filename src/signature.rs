use secp256k1::{Secp256k1, SecretKey, PublicKey, Message};
use secp256k1::ecdsa::Signature;
use sha2::{Sha256, Digest};
use crate::error::{EndorserError, Result};

const DOMAIN_SEPARATOR: &str = "LedgerEndorserSignature:";

/// Plain SHA-256 digest.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut result = [0u8; 32];
    result.copy_from_slice(&Sha256::digest(data));
    result
}

/// Hashes a byte string with the signature domain separator
pub fn hash_bytes(message: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_SEPARATOR.as_bytes());
    hasher.update(message);
    let hash = hasher.finalize();

    let mut result = [0u8; 32];
    result.copy_from_slice(&hash);
    result
}

/// Signs a byte string, returning the 64-byte compact (low-S) signature
pub fn sign_bytes(private_key: &SecretKey, message: &[u8]) -> Result<Vec<u8>> {
    let secp = Secp256k1::new();

    let hash = hash_bytes(message);
    let msg = Message::from_digest_slice(&hash)
        .map_err(|e| EndorserError::Crypto(format!("Invalid message hash: {}", e)))?;

    // sign_ecdsa already produces low-S signatures
    let signature = secp.sign_ecdsa(&msg, private_key);
    Ok(signature.serialize_compact().to_vec())
}

/// Verifies a signature produced by [`sign_bytes`].
///
/// `identity` is a serialized secp256k1 public key. Both compact and DER
/// signatures are accepted. Malformed keys or signatures are errors; a
/// well-formed signature that does not match yields `Ok(false)`.
pub fn verify_bytes(identity: &[u8], message: &[u8], signature: &[u8]) -> Result<bool> {
    let secp = Secp256k1::new();

    let hash = hash_bytes(message);
    let msg = Message::from_digest_slice(&hash)
        .map_err(|e| EndorserError::Crypto(format!("Invalid message hash: {}", e)))?;

    let signature = if signature.len() == 64 {
        Signature::from_compact(signature)
            .map_err(|e| EndorserError::Crypto(format!("Invalid compact signature: {}", e)))?
    } else {
        Signature::from_der(signature)
            .map_err(|e| EndorserError::Crypto(format!("Invalid DER signature: {}", e)))?
    };

    let pub_key = PublicKey::from_slice(identity)
        .map_err(|e| EndorserError::Crypto(format!("Invalid public key: {}", e)))?;

    Ok(secp.verify_ecdsa(&msg, &signature, &pub_key).is_ok())
}
