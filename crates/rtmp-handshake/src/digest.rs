//! Digest slot location and the packet-with-hole HMAC used to produce and
//! validate handshake digests.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::define::{DIGEST_SIZE, HANDSHAKE_SIZE, ValidationType};

/// Offset-from-fingerprint rule: the four bytes at `pointer` are summed as
/// unsigned values, reduced modulo `modulus` and shifted by `increment`.
/// The result always lies in `[increment, increment + modulus)`.
fn fingerprint_offset(packet: &[u8], pointer: usize, modulus: usize, increment: usize) -> usize {
    let sum: usize = packet[pointer..pointer + 4].iter().map(|&b| b as usize).sum();
    sum % modulus + increment
}

/// Locate the 32-byte digest slot of a part-one packet.
pub(crate) fn digest_offset(packet: &[u8], validation: ValidationType) -> usize {
    match validation {
        ValidationType::Digest1 => fingerprint_offset(packet, 8, 728, 12),
        ValidationType::Digest2 => fingerprint_offset(packet, 772, 728, 776),
        ValidationType::Echo => unreachable!("echo packets carry no digest slot"),
    }
}

/// Locate the 128-byte public-key slot of a part-one packet.
pub(crate) fn public_key_offset(packet: &[u8], validation: ValidationType) -> usize {
    match validation {
        ValidationType::Digest1 => fingerprint_offset(packet, 1532, 632, 772),
        ValidationType::Digest2 => fingerprint_offset(packet, 768, 632, 8),
        ValidationType::Echo => unreachable!("echo packets carry no public-key slot"),
    }
}

/// HMAC-SHA-256 over `packet` with the 32-byte window at `offset` excised.
///
/// The same construction produces one's own digest (computed before the
/// slot is filled) and the expected value for the peer's (computed around
/// the slot after extraction).
pub(crate) fn digest_excluding(packet: &[u8], offset: usize, key: &[u8]) -> [u8; DIGEST_SIZE] {
    let mut mac = hmac(key);
    mac.update(&packet[..offset]);
    mac.update(&packet[offset + DIGEST_SIZE..]);
    mac.finalize().into_bytes().into()
}

/// Plain HMAC-SHA-256 of `message` under `key`.
pub(crate) fn keyed_digest(key: &[u8], message: &[u8]) -> [u8; DIGEST_SIZE] {
    let mut mac = hmac(key);
    mac.update(message);
    mac.finalize().into_bytes().into()
}

/// Check the in-packet digest of a part-one packet under `validation`,
/// returning it on success.
pub(crate) fn verify_part_one(
    packet: &[u8],
    validation: ValidationType,
    key: &[u8],
) -> Option<[u8; DIGEST_SIZE]> {
    let offset = digest_offset(packet, validation);
    let expected = digest_excluding(packet, offset, key);
    if packet[offset..offset + DIGEST_SIZE] == expected {
        Some(expected)
    } else {
        None
    }
}

/// Digest of a part-two packet: the trailing 32 bytes, keyed on the
/// part-one digest it answers combined with the role's CRUD constant.
pub(crate) fn part_two_digest(
    packet: &[u8],
    part_one_digest: &[u8],
    const_crud: &[u8],
) -> [u8; DIGEST_SIZE] {
    let key = keyed_digest(const_crud, part_one_digest);
    digest_excluding(packet, HANDSHAKE_SIZE - DIGEST_SIZE, &key)
}

fn hmac(key: &[u8]) -> Hmac<Sha256> {
    Hmac::<Sha256>::new_from_slice(key).expect("hmac accepts any key length")
}
