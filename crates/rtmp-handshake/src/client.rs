//! Client side of the handshake.

use std::io::{self, Read};

use byteorder::{ReadBytesExt, WriteBytesExt};
use bytes::Bytes;

use crate::define::{
    CLIENT_CONST, CLIENT_CONST_CRUD, ClientHandshakeState, DEFAULT_CLIENT_VERSION, DIGEST_SIZE,
    HANDSHAKE_SIZE, PUBLIC_KEY_SIZE, SERVER_CONST, SERVER_CONST_CRUD, VERSION_MARKER_ENCRYPTED,
    VERSION_MARKER_PLAIN, ValidationType,
};
use crate::dh::DhKeyExchange;
use crate::digest::{digest_excluding, digest_offset, part_two_digest, public_key_offset, verify_part_one};
use crate::error::HandshakeError;
use crate::random_packet;
use crate::rc4::CipherPair;
use crate::swf::{SWF_VERIFICATION_SIZE, verification_response};

/// Options the client handshake consumes from the enclosing connection
/// configuration.
#[derive(Debug, Clone, Default)]
pub struct HandshakeOptions {
    /// Request an encrypted (RTMPE) session.
    pub rtmpe: bool,
    /// Version bytes to advertise in C1; these pick the validation scheme.
    /// Defaults to a Flash Player version selecting the first digest scheme.
    pub client_version: Option<[u8; 4]>,
    /// Pre-shared SWF hash for SWF verification.
    pub swf_hash: Option<[u8; 32]>,
    /// Size of the SWF the hash was computed over.
    pub swf_size: u32,
}

/// Client handshake session.
///
/// Driven by the connection's I/O loop in a fixed sequence: `write_c0`,
/// `write_c1`, `read_s0_s1_s2`, `write_c2`. Calls outside that sequence
/// fail with [`HandshakeError::OutOfOrder`].
pub struct HandshakeClient {
    state: ClientHandshakeState,
    rtmpe: bool,
    validation: ValidationType,
    own_version: [u8; 4],
    peer_version: [u8; 4],
    peer_time: [u8; 4],

    key_exchange: Option<DhKeyExchange>,
    peer_public_key: Option<[u8; PUBLIC_KEY_SIZE]>,
    own_part_one_digest: [u8; DIGEST_SIZE],
    peer_part_one_digest: [u8; DIGEST_SIZE],
    ciphers: Option<CipherPair>,

    // The peer's part one, retained only for echo sessions to build C2.
    peer_part_one: Option<[u8; HANDSHAKE_SIZE]>,

    swf_hash: Option<[u8; 32]>,
    swf_size: u32,
    swfv_bytes: Option<[u8; SWF_VERIFICATION_SIZE]>,
}

impl HandshakeClient {
    /// Create a client session.
    pub fn new(options: HandshakeOptions) -> Self {
        Self {
            state: ClientHandshakeState::WriteC0,
            rtmpe: options.rtmpe,
            validation: ValidationType::Echo,
            own_version: options.client_version.unwrap_or(DEFAULT_CLIENT_VERSION),
            peer_version: [0; 4],
            peer_time: [0; 4],
            key_exchange: None,
            peer_public_key: None,
            own_part_one_digest: [0; DIGEST_SIZE],
            peer_part_one_digest: [0; DIGEST_SIZE],
            ciphers: None,
            peer_part_one: None,
            swf_hash: options.swf_hash,
            swf_size: options.swf_size,
            swfv_bytes: None,
        }
    }

    /// C0 is a single byte requesting a plain or encrypted session.
    pub fn write_c0(&mut self, output: &mut Vec<u8>) -> Result<(), HandshakeError> {
        self.expect_state(ClientHandshakeState::WriteC0)?;

        output.write_u8(if self.rtmpe {
            VERSION_MARKER_ENCRYPTED
        } else {
            VERSION_MARKER_PLAIN
        })?;

        self.state = ClientHandshakeState::WriteC1;
        Ok(())
    }

    /// Build part one: 1536 random bytes with a zero timestamp and our
    /// version bytes up front, and for digest schemes the DH public key
    /// and digest written into their fingerprint-derived slots.
    pub fn write_c1(&mut self, output: &mut Vec<u8>) -> Result<(), HandshakeError> {
        self.expect_state(ClientHandshakeState::WriteC1)?;

        let mut packet = random_packet();
        packet[0..4].copy_from_slice(&[0; 4]);
        packet[4..8].copy_from_slice(&self.own_version);

        self.validation = ValidationType::from_version(self.own_version);
        tracing::debug!(
            "creating client part one, version {:02x?}, validation {:?}",
            self.own_version,
            self.validation
        );

        if self.validation.is_digest() {
            let key_exchange = DhKeyExchange::generate();
            let key_offset = public_key_offset(&packet, self.validation);
            packet[key_offset..key_offset + PUBLIC_KEY_SIZE]
                .copy_from_slice(key_exchange.public_key_bytes());

            let offset = digest_offset(&packet, self.validation);
            let digest = digest_excluding(&packet, offset, CLIENT_CONST);
            packet[offset..offset + DIGEST_SIZE].copy_from_slice(&digest);

            self.own_part_one_digest = digest;
            self.key_exchange = Some(key_exchange);
        }

        output.extend_from_slice(&packet);
        self.state = ClientHandshakeState::ReadS0S1S2;
        Ok(())
    }

    /// Consume the server's full response: S0, S1 and S2
    /// (1 + 1536 + 1536 bytes).
    pub fn read_s0_s1_s2(&mut self, input: &mut io::Cursor<Bytes>) -> Result<(), HandshakeError> {
        self.expect_state(ClientHandshakeState::ReadS0S1S2)?;

        self.read_s0(input)?;
        self.read_s1(input)?;
        self.read_s2(input)?;

        self.state = ClientHandshakeState::WriteC2;
        Ok(())
    }

    fn read_s0(&mut self, input: &mut io::Cursor<Bytes>) -> Result<(), HandshakeError> {
        let marker = input.read_u8()?;
        if self.rtmpe && marker != VERSION_MARKER_ENCRYPTED {
            tracing::warn!("server does not support rtmpe, falling back to plain rtmp");
            self.rtmpe = false;
        }
        Ok(())
    }

    fn read_s1(&mut self, input: &mut io::Cursor<Bytes>) -> Result<(), HandshakeError> {
        let mut packet = [0u8; HANDSHAKE_SIZE];
        input.read_exact(&mut packet)?;

        self.peer_time.copy_from_slice(&packet[0..4]);
        self.peer_version.copy_from_slice(&packet[4..8]);
        tracing::debug!(
            "server time {:02x?}, version {:02x?}",
            self.peer_time,
            self.peer_version
        );

        if let Some(swf_hash) = &self.swf_hash {
            let key = &packet[HANDSHAKE_SIZE - DIGEST_SIZE..];
            self.swfv_bytes = Some(verification_response(swf_hash, self.swf_size, key));
            tracing::debug!("computed swf verification response");
        }

        if !self.validation.is_digest() {
            self.peer_part_one = Some(packet);
            return Ok(());
        }

        let digest = match verify_part_one(&packet, self.validation, SERVER_CONST) {
            Some(digest) => digest,
            None => {
                // The server may have answered with the other digest
                // scheme; retry once before giving up.
                let alternate = self.validation.alternate();
                tracing::warn!(
                    "server part one failed to validate as {:?}, retrying as {:?}",
                    self.validation,
                    alternate
                );
                match verify_part_one(&packet, alternate, SERVER_CONST) {
                    Some(digest) => {
                        self.validation = alternate;
                        digest
                    }
                    None => return Err(HandshakeError::PartOneValidation),
                }
            }
        };
        tracing::debug!("server part one validated");
        self.peer_part_one_digest = digest;

        let key_offset = public_key_offset(&packet, self.validation);
        let mut peer_public_key = [0u8; PUBLIC_KEY_SIZE];
        peer_public_key.copy_from_slice(&packet[key_offset..key_offset + PUBLIC_KEY_SIZE]);
        self.peer_public_key = Some(peer_public_key);

        if self.rtmpe {
            self.init_ciphers();
        }

        Ok(())
    }

    fn read_s2(&mut self, input: &mut io::Cursor<Bytes>) -> Result<(), HandshakeError> {
        let mut packet = [0u8; HANDSHAKE_SIZE];
        input.read_exact(&mut packet)?;

        if !self.validation.is_digest() {
            return Ok(());
        }

        let expected = part_two_digest(&packet, &self.own_part_one_digest, &SERVER_CONST_CRUD);
        if packet[HANDSHAKE_SIZE - DIGEST_SIZE..] != expected {
            return Err(HandshakeError::PartTwoValidation);
        }
        tracing::debug!("server part two validated");

        Ok(())
    }

    /// Part two: an echo of S1 for the legacy scheme, otherwise a fresh
    /// random packet whose trailing digest is keyed on the server's
    /// part-one digest.
    pub fn write_c2(&mut self, output: &mut Vec<u8>) -> Result<(), HandshakeError> {
        self.expect_state(ClientHandshakeState::WriteC2)?;

        if self.validation.is_digest() {
            let mut packet = random_packet();
            let digest = part_two_digest(&packet, &self.peer_part_one_digest, &CLIENT_CONST_CRUD);
            packet[HANDSHAKE_SIZE - DIGEST_SIZE..].copy_from_slice(&digest);
            output.extend_from_slice(&packet);
        } else {
            let mut packet = self.peer_part_one.take().ok_or(HandshakeError::OutOfOrder)?;
            packet[0..4].copy_from_slice(&self.peer_time);
            packet[4..8].copy_from_slice(&[0; 4]);
            output.extend_from_slice(&packet);
        }

        self.state = ClientHandshakeState::Finish;
        Ok(())
    }

    fn init_ciphers(&mut self) {
        let (Some(key_exchange), Some(peer_public_key)) = (&self.key_exchange, &self.peer_public_key)
        else {
            return;
        };

        let shared_secret = key_exchange.compute_shared_secret(peer_public_key);
        self.ciphers = Some(CipherPair::derive(
            key_exchange.public_key_bytes(),
            peer_public_key,
            &shared_secret,
        ));
        tracing::debug!("initialized session ciphers");
    }

    /// Decrypt incoming wire bytes in place. No-op until the session is
    /// encrypted and the ciphers are initialized.
    pub fn cipher_update_in(&mut self, data: &mut [u8]) {
        if let Some(ciphers) = &mut self.ciphers {
            ciphers.update_in(data);
        }
    }

    /// Encrypt outgoing wire bytes in place. No-op until the session is
    /// encrypted and the ciphers are initialized.
    pub fn cipher_update_out(&mut self, data: &mut [u8]) {
        if let Some(ciphers) = &mut self.ciphers {
            ciphers.update_out(data);
        }
    }

    /// Whether the session ends up encrypted. Starts out as the requested
    /// value and drops to `false` if the server replies with a plain
    /// version marker.
    pub fn is_rtmpe(&self) -> bool {
        self.rtmpe
    }

    /// The validation scheme the handshake settled on.
    pub fn validation_type(&self) -> ValidationType {
        self.validation
    }

    /// Version bytes the server advertised in S1.
    pub fn peer_version(&self) -> [u8; 4] {
        self.peer_version
    }

    /// The 42-byte SWF verification response, once a SWF hash was
    /// configured and S1 has been read.
    pub fn swfv_bytes(&self) -> Option<&[u8; SWF_VERIFICATION_SIZE]> {
        self.swfv_bytes.as_ref()
    }

    /// Returns true once C2 has been written.
    pub fn is_finished(&self) -> bool {
        self.state == ClientHandshakeState::Finish
    }

    fn expect_state(&self, expected: ClientHandshakeState) -> Result<(), HandshakeError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(HandshakeError::OutOfOrder)
        }
    }
}
