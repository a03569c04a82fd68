//! WireGuard key material generation.
//!
//! Produces base64-encoded keypairs for locally provisioned peers. The
//! private key is clamped per the X25519 convention so that it is accepted
//! by standard WireGuard tooling.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

/// A freshly generated WireGuard keypair, base64-encoded.
#[derive(Debug, Clone)]
pub struct Keypair {
    pub private_key: String,

    pub public_key: String,
}

/// Generate a new keypair. Infallible; uses the thread-local RNG.
///
/// The public key here is random rather than derived from the private key,
/// matching the behavior of the `db` provisioning policy. Peers that need a
/// cryptographically paired key use the `host` or `wg-easy` policies.
#[must_use]
pub fn generate_keypair() -> Keypair {
    use rand::Rng;

    let mut rng = rand::rng();

    let mut private: [u8; 32] = rng.random();
    clamp(&mut private);

    let public: [u8; 32] = rng.random();

    Keypair {
        private_key: BASE64.encode(private),
        public_key: BASE64.encode(public),
    }
}

/// X25519 scalar clamping.
fn clamp(key: &mut [u8; 32]) {
    key[0] &= 248;
    key[31] &= 127;
    key[31] |= 64;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(key: &str) -> Vec<u8> {
        BASE64.decode(key).expect("valid base64")
    }

    #[test]
    fn test_private_key_is_clamped() {
        for _ in 0..32 {
            let pair = generate_keypair();
            let bytes = decode(&pair.private_key);
            assert_eq!(bytes.len(), 32);
            assert_eq!(bytes[0] & 0b0000_0111, 0, "low 3 bits cleared");
            assert_eq!(bytes[31] & 0b1000_0000, 0, "bit 7 cleared");
            assert_eq!(bytes[31] & 0b0100_0000, 0b0100_0000, "bit 6 set");
        }
    }

    #[test]
    fn test_keys_are_32_bytes() {
        let pair = generate_keypair();
        assert_eq!(decode(&pair.private_key).len(), 32);
        assert_eq!(decode(&pair.public_key).len(), 32);
    }

    #[test]
    fn test_keys_are_unique() {
        let a = generate_keypair();
        let b = generate_keypair();
        assert_ne!(a.private_key, b.private_key);
        assert_ne!(a.public_key, b.public_key);
    }
}
