//! Constants and version handling shared by both handshake roles.

/// Size of the C1/C2/S1/S2 handshake packets.
pub const HANDSHAKE_SIZE: usize = 1536;

/// SHA-256 digest length.
pub(crate) const DIGEST_SIZE: usize = 32;

/// Size of a Diffie-Hellman public key on the wire.
pub(crate) const PUBLIC_KEY_SIZE: usize = 128;

/// First byte of C0/S0 for a plain RTMP session.
pub(crate) const VERSION_MARKER_PLAIN: u8 = 0x03;

/// First byte of C0/S0 for an encrypted (RTMPE) session.
pub(crate) const VERSION_MARKER_ENCRYPTED: u8 = 0x06;

/// Version bytes advertised in C1 when the caller does not override them.
pub const DEFAULT_CLIENT_VERSION: [u8; 4] = [0x09, 0x00, 0x7C, 0x02];

/// Version bytes advertised in S1.
pub const DEFAULT_SERVER_VERSION: [u8; 4] = [0x03, 0x05, 0x01, 0x01];

/// HMAC key for client part-one digests.
pub(crate) const CLIENT_CONST: &[u8] = b"Genuine Adobe Flash Player 001";

/// HMAC key for server part-one digests.
pub(crate) const SERVER_CONST: &[u8] = b"Genuine Adobe Flash Media Server 001";

/// Fixed suffix appended to the role constants when deriving part-two keys.
pub(crate) const RANDOM_CRUD: [u8; 32] = [
    0xF0, 0xEE, 0xC2, 0x4A, 0x80, 0x68, 0xBE, 0xE8, 0x2E, 0x00, 0xD0, 0xD1, 0x02, 0x9E, 0x7E, 0x57,
    0x6E, 0xEC, 0x5D, 0x2D, 0x29, 0x80, 0x6F, 0xAB, 0x93, 0xB8, 0xE6, 0x36, 0xCF, 0xEB, 0x31, 0xAE,
];

pub(crate) const CLIENT_CONST_CRUD: [u8; 62] = concat_crud(CLIENT_CONST);
pub(crate) const SERVER_CONST_CRUD: [u8; 68] = concat_crud(SERVER_CONST);

const fn concat_crud<const N: usize>(role_const: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    let mut i = 0;
    while i < role_const.len() {
        out[i] = role_const[i];
        i += 1;
    }
    let mut j = 0;
    while j < RANDOM_CRUD.len() {
        out[role_const.len() + j] = RANDOM_CRUD[j];
        j += 1;
    }
    out
}

/// Which of the three Adobe handshake schemes is in force.
///
/// `Echo` is the legacy scheme where part two is a byte echo of the peer's
/// part one. `Digest1` and `Digest2` carry an HMAC-validated digest and a
/// DH public key, and differ only in the byte offsets used to locate them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationType {
    #[default]
    Echo,
    Digest1,
    Digest2,
}

impl ValidationType {
    /// Map the version bytes of a part-one packet to the scheme they select.
    ///
    /// Versions not in the table get the legacy echo scheme.
    pub fn from_version(version: [u8; 4]) -> Self {
        match u32::from_be_bytes(version) {
            0x0900_7C02 | 0x0900_9702 | 0x0900_9F02 | 0x0900_F602 | 0x0A00_0202 | 0x0A00_0C02
            | 0x8000_0102 => Self::Digest1,
            0x8000_0302 | 0x0A00_2002 => Self::Digest2,
            _ => Self::Echo,
        }
    }

    /// The other digest scheme, tried by the client when the server's part
    /// one fails to validate under the first candidate.
    pub(crate) fn alternate(self) -> Self {
        match self {
            Self::Digest1 => Self::Digest2,
            Self::Digest2 => Self::Digest1,
            Self::Echo => Self::Echo,
        }
    }

    pub(crate) fn is_digest(self) -> bool {
        self != Self::Echo
    }
}

/// Fixed call sequence of the client role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClientHandshakeState {
    WriteC0,
    WriteC1,
    ReadS0S1S2,
    WriteC2,
    Finish,
}

/// Fixed call sequence of the server role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ServerHandshakeState {
    ReadC0C1,
    WriteS0,
    WriteS1,
    WriteS2,
    ReadC2,
    Finish,
}
