//! Diffie-Hellman key agreement over the fixed 1024-bit modulus used by
//! encrypted handshakes.

use num_bigint::BigUint;
use rand::Rng;

use crate::define::PUBLIC_KEY_SIZE;

/// The 1024-bit prime modulus (second Oakley group). The generator is 2.
const DH_MODULUS_BYTES: [u8; 128] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xC9, 0x0F, 0xDA, 0xA2, 0x21, 0x68, 0xC2, 0x34,
    0xC4, 0xC6, 0x62, 0x8B, 0x80, 0xDC, 0x1C, 0xD1, 0x29, 0x02, 0x4E, 0x08, 0x8A, 0x67, 0xCC, 0x74,
    0x02, 0x0B, 0xBE, 0xA6, 0x3B, 0x13, 0x9B, 0x22, 0x51, 0x4A, 0x08, 0x79, 0x8E, 0x34, 0x04, 0xDD,
    0xEF, 0x95, 0x19, 0xB3, 0xCD, 0x3A, 0x43, 0x1B, 0x30, 0x2B, 0x0A, 0x6D, 0xF2, 0x5F, 0x14, 0x37,
    0x4F, 0xE1, 0x35, 0x6D, 0x6D, 0x51, 0xC2, 0x45, 0xE4, 0x85, 0xB5, 0x76, 0x62, 0x5E, 0x7E, 0xC6,
    0xF4, 0x4C, 0x42, 0xE9, 0xA6, 0x37, 0xED, 0x6B, 0x0B, 0xFF, 0x5C, 0xB6, 0xF4, 0x06, 0xB7, 0xED,
    0xEE, 0x38, 0x6B, 0xFB, 0x5A, 0x89, 0x9F, 0xA5, 0xAE, 0x9F, 0x24, 0x11, 0x7C, 0x4B, 0x1F, 0xE6,
    0x49, 0x28, 0x66, 0x51, 0xEC, 0xE6, 0x53, 0x81, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
];

const DH_BASE: u32 = 2;

/// A Diffie-Hellman key pair over the fixed modulus.
pub(crate) struct DhKeyExchange {
    private_key: BigUint,
    public_key: [u8; PUBLIC_KEY_SIZE],
}

impl DhKeyExchange {
    /// Generate a key pair with a random 1024-bit private exponent.
    pub(crate) fn generate() -> Self {
        let mut exponent = [0u8; PUBLIC_KEY_SIZE];
        rand::rng().fill(&mut exponent[..]);
        let private_key = BigUint::from_bytes_be(&exponent);
        let public_key = BigUint::from(DH_BASE).modpow(&private_key, &modulus());
        Self {
            private_key,
            public_key: to_fixed_width(&public_key),
        }
    }

    /// Our public key, normalized to exactly 128 big-endian bytes.
    pub(crate) fn public_key_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.public_key
    }

    /// Combine our private exponent with the peer's raw public key bytes.
    ///
    /// The big-endian encoding of the shared secret is returned verbatim
    /// and used unchanged as HMAC key material.
    pub(crate) fn compute_shared_secret(&self, peer_public_key: &[u8]) -> Vec<u8> {
        let peer = BigUint::from_bytes_be(peer_public_key);
        peer.modpow(&self.private_key, &modulus()).to_bytes_be()
    }
}

fn modulus() -> BigUint {
    BigUint::from_bytes_be(&DH_MODULUS_BYTES)
}

/// Normalize to exactly 128 bytes by left-padding with zeros.
/// `BigUint::to_bytes_be` never emits a sign byte, so the encoding can
/// only be short, never long.
fn to_fixed_width(value: &BigUint) -> [u8; PUBLIC_KEY_SIZE] {
    let bytes = value.to_bytes_be();
    let mut out = [0u8; PUBLIC_KEY_SIZE];
    out[PUBLIC_KEY_SIZE - bytes.len()..].copy_from_slice(&bytes);
    out
}
