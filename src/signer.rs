use secp256k1::{PublicKey, Secp256k1, SecretKey};
use sha2::Sha256;
use hkdf::Hkdf;
use crate::error::{EndorserError, Result};
use crate::signature::{sign_bytes, verify_bytes};

/// Default HKDF salt for seeded signing identities
pub const HKDF_SALT: &[u8] = b"LedgerEndorserIdentitySalt";

/// Derives a 32-byte key from seed material using HKDF
fn derive_hkdf_key(seed: &[u8], info: &[u8]) -> Result<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), seed);
    let mut okm = [0u8; 32];
    hk.expand(info, &mut okm)
        .map_err(|e| EndorserError::Crypto(format!("HKDF expansion failed: {}", e)))?;
    Ok(okm)
}

/// A local signing identity. Peers use it to sign endorsements, clients to
/// sign proposals. The identity bytes are the compressed public key.
#[derive(Clone)]
pub struct LocalSigner {
    secret: SecretKey,
    public: PublicKey,
}

impl LocalSigner {
    fn from_secret(secret: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public = PublicKey::from_secret_key(&secp, &secret);
        Self { secret, public }
    }

    /// Generates a fresh random identity.
    pub fn generate() -> Self {
        let secret = SecretKey::new(&mut rand::thread_rng());
        Self::from_secret(secret)
    }

    /// Deterministically derives an identity from seed material. The label
    /// separates identities derived from the same seed.
    pub fn from_seed(seed: &[u8], label: &str) -> Result<Self> {
        if seed.is_empty() {
            return Err(EndorserError::Crypto("seed must be non-empty".to_string()));
        }
        let info = format!("endorserKey-{}", label);
        let key_bytes = derive_hkdf_key(seed, info.as_bytes())?;
        let secret = SecretKey::from_slice(&key_bytes)
            .map_err(|e| EndorserError::Crypto(format!("Invalid derived private key: {}", e)))?;
        Ok(Self::from_secret(secret))
    }

    /// Loads an identity from a hex-encoded 32-byte secret key.
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self> {
        let bytes = hex::decode(secret_hex.trim())
            .map_err(|e| EndorserError::Crypto(format!("Invalid secret key hex: {}", e)))?;
        let secret = SecretKey::from_slice(&bytes)?;
        Ok(Self::from_secret(secret))
    }

    /// Serialized identity (33-byte compressed public key).
    pub fn identity(&self) -> Vec<u8> {
        self.public.serialize().to_vec()
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret.secret_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        sign_bytes(&self.secret, message)
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<bool> {
        verify_bytes(&self.identity(), message, signature)
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("identity", &hex::encode(self.identity()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_identity_is_deterministic() {
        let a = LocalSigner::from_seed(b"peer0 seed", "peer0").unwrap();
        let b = LocalSigner::from_seed(b"peer0 seed", "peer0").unwrap();
        let c = LocalSigner::from_seed(b"peer0 seed", "peer1").unwrap();
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), c.identity());
        assert_eq!(a.identity().len(), 33);
    }

    #[test]
    fn test_empty_seed_rejected() {
        assert!(LocalSigner::from_seed(b"", "peer0").is_err());
    }

    #[test]
    fn test_secret_hex_round_trip_signs_identically() {
        let signer = LocalSigner::generate();
        let restored = LocalSigner::from_secret_hex(&signer.secret_hex()).unwrap();
        assert_eq!(signer.identity(), restored.identity());

        let sig = restored.sign(b"payload").unwrap();
        assert!(signer.verify(b"payload", &sig).unwrap());
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        let signer = LocalSigner::generate();
        let rendered = format!("{:?}", signer);
        assert!(!rendered.contains(&signer.secret_hex()));
    }
}
