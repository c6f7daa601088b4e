//! SWF verification response.

use crate::digest::keyed_digest;

/// Length of the verification pong payload.
pub(crate) const SWF_VERIFICATION_SIZE: usize = 42;

/// Build the 42-byte pong bound to a pre-shared SWF hash: two marker
/// bytes, the SWF size twice, then the hash digested under the trailing
/// 32 bytes of S1.
///
/// The engine only computes the payload; the surrounding pipeline sends
/// it in reply to the server's SWF verification control message.
pub(crate) fn verification_response(
    swf_hash: &[u8; 32],
    swf_size: u32,
    key: &[u8],
) -> [u8; SWF_VERIFICATION_SIZE] {
    let digest = keyed_digest(key, swf_hash);

    let mut out = [0u8; SWF_VERIFICATION_SIZE];
    out[0] = 0x01;
    out[1] = 0x01;
    out[2..6].copy_from_slice(&swf_size.to_be_bytes());
    out[6..10].copy_from_slice(&swf_size.to_be_bytes());
    out[10..].copy_from_slice(&digest);
    out
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_verification_response_layout() {
        let swf_hash = [0xAB; 32];
        let key = [0x42; 32];
        let response = verification_response(&swf_hash, 12345, &key);

        assert_eq!(response[..2], [0x01, 0x01]);
        assert_eq!(response[2..6], 12345u32.to_be_bytes());
        assert_eq!(response[6..10], 12345u32.to_be_bytes());
        assert_eq!(response[10..], keyed_digest(&key, &swf_hash));
    }
}
