//! RTMP/RTMPE handshake engine.
//!
//! Implements the negotiation that runs on a fresh connection before any
//! message-stream traffic flows: the version markers and three 1536-byte
//! packets each side exchanges, the digest-validated schemes selected by
//! the peer's version bytes, Diffie-Hellman key agreement with the
//! derived RC4 cipher pair for encrypted (RTMPE) sessions, and the
//! optional SWF verification response.
//!
//! The engine does no I/O of its own. Each role is a stateful session
//! driven by the connection's I/O loop through a fixed sequence of
//! encode/decode calls; reads consume from an [`std::io::Cursor`] and
//! writes append to a caller-supplied buffer.
//!
//! # Examples
//!
//! ```rust
//! # fn test() -> Result<(), rtmp_handshake::HandshakeError> {
//! use bytes::Bytes;
//! use rtmp_handshake::{HandshakeClient, HandshakeOptions, HandshakeServer};
//!
//! let mut client = HandshakeClient::new(HandshakeOptions::default());
//! let mut server = HandshakeServer::default();
//!
//! let mut c0_c1 = Vec::new();
//! client.write_c0(&mut c0_c1)?;
//! client.write_c1(&mut c0_c1)?;
//!
//! let mut response = Vec::new();
//! server.read_c0_c1(&mut std::io::Cursor::new(Bytes::from(c0_c1)))?;
//! server.write_s0(&mut response)?;
//! server.write_s1(&mut response)?;
//! server.write_s2(&mut response)?;
//!
//! let mut c2 = Vec::new();
//! client.read_s0_s1_s2(&mut std::io::Cursor::new(Bytes::from(response)))?;
//! client.write_c2(&mut c2)?;
//! server.read_c2(&mut std::io::Cursor::new(Bytes::from(c2)))?;
//!
//! assert!(client.is_finished());
//! assert!(server.is_finished());
//! # Ok(())
//! # }
//! # test().expect("handshake failed");
//! ```
#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(unsafe_code)]
#![deny(unreachable_pub)]

use rand::Rng;

mod client;
mod define;
mod dh;
mod digest;
mod error;
mod rc4;
mod server;
mod swf;

pub use client::{HandshakeClient, HandshakeOptions};
pub use define::{DEFAULT_CLIENT_VERSION, DEFAULT_SERVER_VERSION, HANDSHAKE_SIZE, ValidationType};
pub use error::HandshakeError;
pub use server::HandshakeServer;

/// A full handshake packet of cryptographic-quality random bytes.
///
/// Even the bytes the peer never inspects are randomized to avoid
/// leaking patterns onto the wire.
pub(crate) fn random_packet() -> [u8; HANDSHAKE_SIZE] {
    let mut packet = [0u8; HANDSHAKE_SIZE];
    rand::rng().fill(&mut packet[..]);
    packet
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use std::io;

    use bytes::Bytes;

    use super::*;
    use crate::define::{CLIENT_CONST_CRUD, DIGEST_SIZE, PUBLIC_KEY_SIZE, SERVER_CONST, SERVER_CONST_CRUD};
    use crate::digest::{digest_excluding, digest_offset, keyed_digest, part_two_digest, public_key_offset};

    fn cursor(data: Vec<u8>) -> io::Cursor<Bytes> {
        io::Cursor::new(Bytes::from(data))
    }

    /// Drive both roles through the six-packet exchange, returning the
    /// raw C0+C1, S0+S1+S2 and C2 buffers.
    fn run_handshake(
        client: &mut HandshakeClient,
        server: &mut HandshakeServer,
    ) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        let mut c0_c1 = Vec::new();
        client.write_c0(&mut c0_c1).unwrap();
        client.write_c1(&mut c0_c1).unwrap();

        let mut response = Vec::new();
        server.read_c0_c1(&mut cursor(c0_c1.clone())).unwrap();
        server.write_s0(&mut response).unwrap();
        server.write_s1(&mut response).unwrap();
        server.write_s2(&mut response).unwrap();

        let mut c2 = Vec::new();
        client.read_s0_s1_s2(&mut cursor(response.clone())).unwrap();
        client.write_c2(&mut c2).unwrap();
        server.read_c2(&mut cursor(c2.clone())).unwrap();

        (c0_c1, response, c2)
    }

    #[test]
    fn test_echo_round_trip() {
        let mut client = HandshakeClient::new(HandshakeOptions {
            client_version: Some([0, 0, 0, 0]),
            ..Default::default()
        });
        let mut server = HandshakeServer::default();

        let (c0_c1, response, c2) = run_handshake(&mut client, &mut server);

        assert!(client.is_finished());
        assert!(server.is_finished());
        assert_eq!(client.validation_type(), ValidationType::Echo);
        assert_eq!(server.validation_type(), ValidationType::Echo);

        // C2 echoes S1 with the peer time restored and the version field
        // zeroed; S2 echoes C1 the same way.
        let c1 = &c0_c1[1..];
        let s1 = &response[1..1 + HANDSHAKE_SIZE];
        let s2 = &response[1 + HANDSHAKE_SIZE..];
        assert_eq!(c2[0..4], s1[0..4]);
        assert_eq!(c2[4..8], [0; 4]);
        assert_eq!(c2[8..], s1[8..]);
        assert_eq!(s2[0..4], c1[0..4]);
        assert_eq!(s2[4..8], [0; 4]);
        assert_eq!(s2[8..], c1[8..]);

        // No ciphers for a plain echo session.
        let mut data = *b"hello world";
        client.cipher_update_out(&mut data);
        server.cipher_update_in(&mut data);
        assert_eq!(&data, b"hello world");
    }

    #[test]
    fn test_digest1_plain_round_trip() {
        let mut client = HandshakeClient::new(HandshakeOptions::default());
        let mut server = HandshakeServer::default();

        run_handshake(&mut client, &mut server);

        assert!(client.is_finished());
        assert!(server.is_finished());
        assert_eq!(client.validation_type(), ValidationType::Digest1);
        assert_eq!(server.validation_type(), ValidationType::Digest1);
        assert_eq!(server.peer_version(), DEFAULT_CLIENT_VERSION);
        assert_eq!(client.peer_version(), DEFAULT_SERVER_VERSION);
        assert!(!server.c2_validation_failed());

        // Plain session: no ciphers even though digests were validated.
        let mut data = *b"hello world";
        client.cipher_update_out(&mut data);
        assert_eq!(&data, b"hello world");
    }

    #[test]
    fn test_digest2_rtmpe_round_trip() {
        let mut client = HandshakeClient::new(HandshakeOptions {
            rtmpe: true,
            client_version: Some([0x0A, 0x00, 0x20, 0x02]),
            ..Default::default()
        });
        let mut server = HandshakeServer::default();

        let (c0_c1, response, _) = run_handshake(&mut client, &mut server);

        assert_eq!(c0_c1[0], 0x06);
        assert_eq!(response[0], 0x06);
        assert!(client.is_rtmpe());
        assert!(server.is_rtmpe());
        assert_eq!(client.validation_type(), ValidationType::Digest2);
        assert_eq!(server.validation_type(), ValidationType::Digest2);

        let mut data = *b"hello world";
        client.cipher_update_out(&mut data);
        assert_ne!(&data, b"hello world");
        server.cipher_update_in(&mut data);
        assert_eq!(&data, b"hello world");

        let mut data = *b"downstream bytes";
        server.cipher_update_out(&mut data);
        assert_ne!(&data, b"downstream bytes");
        client.cipher_update_in(&mut data);
        assert_eq!(&data, b"downstream bytes");
    }

    #[test]
    fn test_rtmpe_downgrade() {
        let mut client = HandshakeClient::new(HandshakeOptions {
            rtmpe: true,
            ..Default::default()
        });
        let mut server = HandshakeServer::default();

        let mut c0_c1 = Vec::new();
        client.write_c0(&mut c0_c1).unwrap();
        client.write_c1(&mut c0_c1).unwrap();
        assert_eq!(c0_c1[0], 0x06);

        // A server that does not speak rtmpe sees a plain marker and
        // replies with one.
        let mut plain = c0_c1.clone();
        plain[0] = 0x03;
        server.read_c0_c1(&mut cursor(plain)).unwrap();

        let mut response = Vec::new();
        server.write_s0(&mut response).unwrap();
        server.write_s1(&mut response).unwrap();
        server.write_s2(&mut response).unwrap();
        assert_eq!(response[0], 0x03);

        client.read_s0_s1_s2(&mut cursor(response)).unwrap();
        assert!(!client.is_rtmpe());

        let mut c2 = Vec::new();
        client.write_c2(&mut c2).unwrap();
        server.read_c2(&mut cursor(c2)).unwrap();
        assert!(client.is_finished());

        // The downgraded session stays unencrypted.
        let mut data = *b"hello world";
        client.cipher_update_out(&mut data);
        assert_eq!(&data, b"hello world");
    }

    #[test]
    fn test_scheme_fallback() {
        let mut client = HandshakeClient::new(HandshakeOptions::default());

        let mut c0_c1 = Vec::new();
        client.write_c0(&mut c0_c1).unwrap();
        client.write_c1(&mut c0_c1).unwrap();
        let c1 = &c0_c1[1..];

        // Hand-build a server response laid out under the *other* digest
        // scheme than the one the client's version selects.
        let mut s1 = random_packet();
        s1[0..4].copy_from_slice(&[0; 4]);
        s1[4..8].copy_from_slice(&DEFAULT_SERVER_VERSION);
        let key_offset = public_key_offset(&s1, ValidationType::Digest2);
        s1[key_offset..key_offset + PUBLIC_KEY_SIZE].copy_from_slice(&[0x5A; PUBLIC_KEY_SIZE]);
        let offset = digest_offset(&s1, ValidationType::Digest2);
        let s1_digest = digest_excluding(&s1, offset, SERVER_CONST);
        s1[offset..offset + DIGEST_SIZE].copy_from_slice(&s1_digest);

        // S2 answers the digest the client embedded in C1.
        let c1_offset = digest_offset(c1, ValidationType::Digest1);
        let c1_digest = &c1[c1_offset..c1_offset + DIGEST_SIZE];
        let mut s2 = random_packet();
        let s2_digest = part_two_digest(&s2, c1_digest, &SERVER_CONST_CRUD);
        s2[HANDSHAKE_SIZE - DIGEST_SIZE..].copy_from_slice(&s2_digest);

        let mut response = vec![0x03];
        response.extend_from_slice(&s1);
        response.extend_from_slice(&s2);

        client.read_s0_s1_s2(&mut cursor(response)).unwrap();
        assert_eq!(client.validation_type(), ValidationType::Digest2);

        // C2 is keyed on the server part-one digest found after fallback.
        let mut c2 = Vec::new();
        client.write_c2(&mut c2).unwrap();
        let expected = part_two_digest(&c2, &s1_digest, &CLIENT_CONST_CRUD);
        assert_eq!(c2[HANDSHAKE_SIZE - DIGEST_SIZE..], expected);
    }

    #[test]
    fn test_part_one_failure_after_both_schemes() {
        let mut client = HandshakeClient::new(HandshakeOptions::default());

        let mut c0_c1 = Vec::new();
        client.write_c0(&mut c0_c1).unwrap();
        client.write_c1(&mut c0_c1).unwrap();

        // Random S1 carries no valid digest under either scheme.
        let mut response = vec![0x03];
        response.extend_from_slice(&random_packet());
        response.extend_from_slice(&random_packet());

        let err = client.read_s0_s1_s2(&mut cursor(response)).unwrap_err();
        assert!(matches!(err, HandshakeError::PartOneValidation));
    }

    #[test]
    fn test_server_rejects_bad_client_digest() {
        let mut client = HandshakeClient::new(HandshakeOptions::default());
        let mut server = HandshakeServer::default();

        let mut c0_c1 = Vec::new();
        client.write_c0(&mut c0_c1).unwrap();
        client.write_c1(&mut c0_c1).unwrap();

        // Flip a fingerprint byte of C1: the version bytes still select a
        // digest scheme, so the server has no fallback and must abort.
        c0_c1[9] ^= 0xFF;
        let err = server.read_c0_c1(&mut cursor(c0_c1)).unwrap_err();
        assert!(matches!(err, HandshakeError::PartOneValidation));
    }

    #[test]
    fn test_client_rejects_bad_part_two() {
        let mut client = HandshakeClient::new(HandshakeOptions::default());
        let mut server = HandshakeServer::default();

        let mut c0_c1 = Vec::new();
        client.write_c0(&mut c0_c1).unwrap();
        client.write_c1(&mut c0_c1).unwrap();
        server.read_c0_c1(&mut cursor(c0_c1)).unwrap();

        let mut response = Vec::new();
        server.write_s0(&mut response).unwrap();
        server.write_s1(&mut response).unwrap();
        server.write_s2(&mut response).unwrap();

        // Corrupt the S2 trailing digest.
        let last = response.len() - 1;
        response[last] ^= 0xFF;

        let err = client.read_s0_s1_s2(&mut cursor(response)).unwrap_err();
        assert!(matches!(err, HandshakeError::PartTwoValidation));
    }

    #[test]
    fn test_server_tolerates_bad_part_two() {
        let mut client = HandshakeClient::new(HandshakeOptions::default());
        let mut server = HandshakeServer::default();

        let mut c0_c1 = Vec::new();
        client.write_c0(&mut c0_c1).unwrap();
        client.write_c1(&mut c0_c1).unwrap();
        server.read_c0_c1(&mut cursor(c0_c1)).unwrap();

        let mut response = Vec::new();
        server.write_s0(&mut response).unwrap();
        server.write_s1(&mut response).unwrap();
        server.write_s2(&mut response).unwrap();
        client.read_s0_s1_s2(&mut cursor(response)).unwrap();

        let mut c2 = Vec::new();
        client.write_c2(&mut c2).unwrap();
        let last = c2.len() - 1;
        c2[last] ^= 0xFF;

        // Interop tolerance: the handshake completes, but the failure is
        // observable.
        server.read_c2(&mut cursor(c2)).unwrap();
        assert!(server.is_finished());
        assert!(server.c2_validation_failed());
    }

    #[test]
    fn test_out_of_order_calls() {
        let mut client = HandshakeClient::new(HandshakeOptions::default());
        let mut out = Vec::new();
        assert!(matches!(client.write_c1(&mut out), Err(HandshakeError::OutOfOrder)));
        assert!(matches!(client.write_c2(&mut out), Err(HandshakeError::OutOfOrder)));

        let mut server = HandshakeServer::default();
        assert!(matches!(server.write_s0(&mut out), Err(HandshakeError::OutOfOrder)));
        assert!(matches!(
            server.read_c2(&mut cursor(vec![0; HANDSHAKE_SIZE])),
            Err(HandshakeError::OutOfOrder)
        ));
    }

    #[test]
    fn test_c1_layout() {
        let mut client = HandshakeClient::new(HandshakeOptions::default());
        let mut c0_c1 = Vec::new();
        client.write_c0(&mut c0_c1).unwrap();
        client.write_c1(&mut c0_c1).unwrap();

        assert_eq!(c0_c1.len(), 1 + HANDSHAKE_SIZE);
        let c1 = &c0_c1[1..];
        assert_eq!(c1[0..4], [0; 4]);
        assert_eq!(c1[4..8], DEFAULT_CLIENT_VERSION);

        // The embedded digest verifies under the client constant.
        use crate::define::CLIENT_CONST;
        use crate::digest::verify_part_one;
        assert!(verify_part_one(c1, ValidationType::Digest1, CLIENT_CONST).is_some());
    }

    #[test]
    fn test_swf_verification() {
        let swf_hash = [0x07; 32];
        let mut client = HandshakeClient::new(HandshakeOptions {
            swf_hash: Some(swf_hash),
            swf_size: 12345,
            ..Default::default()
        });
        let mut server = HandshakeServer::default();

        let (_, response, _) = run_handshake(&mut client, &mut server);

        let s1 = &response[1..1 + HANDSHAKE_SIZE];
        let key = &s1[HANDSHAKE_SIZE - DIGEST_SIZE..];

        let swfv = client.swfv_bytes().expect("swf response should be computed");
        assert_eq!(swfv[0..2], [0x01, 0x01]);
        assert_eq!(swfv[2..6], 12345u32.to_be_bytes());
        assert_eq!(swfv[6..10], 12345u32.to_be_bytes());
        assert_eq!(swfv[10..], keyed_digest(key, &swf_hash));
    }

    #[test]
    fn test_no_swf_response_without_hash() {
        let mut client = HandshakeClient::new(HandshakeOptions::default());
        let mut server = HandshakeServer::default();
        run_handshake(&mut client, &mut server);
        assert!(client.swfv_bytes().is_none());
    }
}
