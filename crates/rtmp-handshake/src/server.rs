//! Server side of the handshake.

use std::io::{self, Read};

use byteorder::{ReadBytesExt, WriteBytesExt};
use bytes::Bytes;

use crate::define::{
    CLIENT_CONST, CLIENT_CONST_CRUD, DEFAULT_SERVER_VERSION, DIGEST_SIZE, HANDSHAKE_SIZE,
    PUBLIC_KEY_SIZE, SERVER_CONST, SERVER_CONST_CRUD, ServerHandshakeState,
    VERSION_MARKER_ENCRYPTED, VERSION_MARKER_PLAIN, ValidationType,
};
use crate::dh::DhKeyExchange;
use crate::digest::{digest_excluding, digest_offset, part_two_digest, public_key_offset, verify_part_one};
use crate::error::HandshakeError;
use crate::random_packet;
use crate::rc4::CipherPair;

/// Server handshake session.
///
/// Driven by the connection's I/O loop in a fixed sequence: `read_c0_c1`,
/// `write_s0`, `write_s1`, `write_s2`, `read_c2`. Calls outside that
/// sequence fail with [`HandshakeError::OutOfOrder`].
///
/// The server takes no options: whether the session is encrypted is
/// learned from C0, and the validation scheme from the client's version
/// bytes in C1.
pub struct HandshakeServer {
    state: ServerHandshakeState,
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

    // The client's part one, retained only for echo sessions to build S2.
    peer_part_one: Option<[u8; HANDSHAKE_SIZE]>,

    c2_validation_failed: bool,
}

impl Default for HandshakeServer {
    fn default() -> Self {
        Self {
            state: ServerHandshakeState::ReadC0C1,
            rtmpe: false,
            validation: ValidationType::Echo,
            own_version: DEFAULT_SERVER_VERSION,
            peer_version: [0; 4],
            peer_time: [0; 4],
            key_exchange: None,
            peer_public_key: None,
            own_part_one_digest: [0; DIGEST_SIZE],
            peer_part_one_digest: [0; DIGEST_SIZE],
            ciphers: None,
            peer_part_one: None,
            c2_validation_failed: false,
        }
    }
}

impl HandshakeServer {
    /// Consume C0 and C1 (1 + 1536 bytes).
    pub fn read_c0_c1(&mut self, input: &mut io::Cursor<Bytes>) -> Result<(), HandshakeError> {
        self.expect_state(ServerHandshakeState::ReadC0C1)?;

        self.read_c0(input)?;
        self.read_c1(input)?;

        self.state = ServerHandshakeState::WriteS0;
        Ok(())
    }

    fn read_c0(&mut self, input: &mut io::Cursor<Bytes>) -> Result<(), HandshakeError> {
        // The client requests encryption through the version marker.
        let marker = input.read_u8()?;
        self.rtmpe = marker == VERSION_MARKER_ENCRYPTED;
        tracing::debug!("client marker {:#04x}, rtmpe {}", marker, self.rtmpe);
        Ok(())
    }

    fn read_c1(&mut self, input: &mut io::Cursor<Bytes>) -> Result<(), HandshakeError> {
        let mut packet = [0u8; HANDSHAKE_SIZE];
        input.read_exact(&mut packet)?;

        self.peer_time.copy_from_slice(&packet[0..4]);
        self.peer_version.copy_from_slice(&packet[4..8]);
        tracing::debug!(
            "client time {:02x?}, version {:02x?}",
            self.peer_time,
            self.peer_version
        );

        self.validation = ValidationType::from_version(self.peer_version);
        if !self.validation.is_digest() {
            self.peer_part_one = Some(packet);
            return Ok(());
        }

        // The client's version bytes already determined the scheme, so
        // there is no alternate to fall back to.
        let digest = verify_part_one(&packet, self.validation, CLIENT_CONST)
            .ok_or(HandshakeError::PartOneValidation)?;
        tracing::debug!("client part one validated, validation {:?}", self.validation);
        self.peer_part_one_digest = digest;

        let key_offset = public_key_offset(&packet, self.validation);
        let mut peer_public_key = [0u8; PUBLIC_KEY_SIZE];
        peer_public_key.copy_from_slice(&packet[key_offset..key_offset + PUBLIC_KEY_SIZE]);
        self.peer_public_key = Some(peer_public_key);

        self.key_exchange = Some(DhKeyExchange::generate());
        if self.rtmpe {
            self.init_ciphers();
        }

        Ok(())
    }

    /// S0 is a single byte echoing whether the session is encrypted.
    pub fn write_s0(&mut self, output: &mut Vec<u8>) -> Result<(), HandshakeError> {
        self.expect_state(ServerHandshakeState::WriteS0)?;

        output.write_u8(if self.rtmpe {
            VERSION_MARKER_ENCRYPTED
        } else {
            VERSION_MARKER_PLAIN
        })?;

        self.state = ServerHandshakeState::WriteS1;
        Ok(())
    }

    /// Build part one, mirroring the client's C1 with the server constant
    /// and version bytes.
    pub fn write_s1(&mut self, output: &mut Vec<u8>) -> Result<(), HandshakeError> {
        self.expect_state(ServerHandshakeState::WriteS1)?;

        let mut packet = random_packet();
        packet[0..4].copy_from_slice(&[0; 4]);
        packet[4..8].copy_from_slice(&self.own_version);

        if self.validation.is_digest() {
            tracing::debug!("creating server part one, validation {:?}", self.validation);
            let key_exchange = self.key_exchange.as_ref().ok_or(HandshakeError::OutOfOrder)?;
            let key_offset = public_key_offset(&packet, self.validation);
            packet[key_offset..key_offset + PUBLIC_KEY_SIZE]
                .copy_from_slice(key_exchange.public_key_bytes());

            let offset = digest_offset(&packet, self.validation);
            let digest = digest_excluding(&packet, offset, SERVER_CONST);
            packet[offset..offset + DIGEST_SIZE].copy_from_slice(&digest);

            self.own_part_one_digest = digest;
        }

        output.extend_from_slice(&packet);
        self.state = ServerHandshakeState::WriteS2;
        Ok(())
    }

    /// Part two: an echo of C1 for the legacy scheme, otherwise a fresh
    /// random packet whose trailing digest is keyed on the client's
    /// part-one digest.
    pub fn write_s2(&mut self, output: &mut Vec<u8>) -> Result<(), HandshakeError> {
        self.expect_state(ServerHandshakeState::WriteS2)?;

        if self.validation.is_digest() {
            let mut packet = random_packet();
            let digest = part_two_digest(&packet, &self.peer_part_one_digest, &SERVER_CONST_CRUD);
            packet[HANDSHAKE_SIZE - DIGEST_SIZE..].copy_from_slice(&digest);
            output.extend_from_slice(&packet);
        } else {
            let mut packet = self.peer_part_one.take().ok_or(HandshakeError::OutOfOrder)?;
            packet[0..4].copy_from_slice(&self.peer_time);
            packet[4..8].copy_from_slice(&[0; 4]);
            output.extend_from_slice(&packet);
        }

        self.state = ServerHandshakeState::ReadC2;
        Ok(())
    }

    /// Consume C2 (1536 bytes).
    ///
    /// A digest mismatch is tolerated for interoperability (some clients
    /// are not strict about part two), but is logged and exposed through
    /// [`c2_validation_failed`](Self::c2_validation_failed).
    pub fn read_c2(&mut self, input: &mut io::Cursor<Bytes>) -> Result<(), HandshakeError> {
        self.expect_state(ServerHandshakeState::ReadC2)?;

        let mut packet = [0u8; HANDSHAKE_SIZE];
        input.read_exact(&mut packet)?;

        if self.validation.is_digest() {
            let expected = part_two_digest(&packet, &self.own_part_one_digest, &CLIENT_CONST_CRUD);
            if packet[HANDSHAKE_SIZE - DIGEST_SIZE..] != expected {
                tracing::warn!("client part two failed to validate, continuing anyway");
                self.c2_validation_failed = true;
            } else {
                tracing::debug!("client part two validated");
            }
        }

        self.state = ServerHandshakeState::Finish;
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

    /// Decrypt incoming wire bytes in place. No-op unless the session is
    /// encrypted and the ciphers are initialized.
    pub fn cipher_update_in(&mut self, data: &mut [u8]) {
        if let Some(ciphers) = &mut self.ciphers {
            ciphers.update_in(data);
        }
    }

    /// Encrypt outgoing wire bytes in place. No-op unless the session is
    /// encrypted and the ciphers are initialized.
    pub fn cipher_update_out(&mut self, data: &mut [u8]) {
        if let Some(ciphers) = &mut self.ciphers {
            ciphers.update_out(data);
        }
    }

    /// Whether the client requested an encrypted session.
    pub fn is_rtmpe(&self) -> bool {
        self.rtmpe
    }

    /// The validation scheme selected by the client's version bytes.
    pub fn validation_type(&self) -> ValidationType {
        self.validation
    }

    /// Version bytes the client advertised in C1.
    pub fn peer_version(&self) -> [u8; 4] {
        self.peer_version
    }

    /// Whether the client's part two failed to validate. The handshake
    /// still completes; this is informational.
    pub fn c2_validation_failed(&self) -> bool {
        self.c2_validation_failed
    }

    /// Returns true once C2 has been read.
    pub fn is_finished(&self) -> bool {
        self.state == ServerHandshakeState::Finish
    }

    fn expect_state(&self, expected: ServerHandshakeState) -> Result<(), HandshakeError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(HandshakeError::OutOfOrder)
        }
    }
}
