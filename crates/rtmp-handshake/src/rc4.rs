//! RC4 stream cipher and the derived inbound/outbound cipher pair.
//!
//! Modern crypto crates gate or drop RC4 entirely, but the encrypted
//! handshake wire format mandates it, so the primitive is carried here.

use crate::define::HANDSHAKE_SIZE;
use crate::digest::keyed_digest;

/// Number of bytes of each derived digest actually used as RC4 key.
const RC4_KEY_SIZE: usize = 16;

pub(crate) struct Rc4 {
    state: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    pub(crate) fn new(key: &[u8]) -> Self {
        let mut state = [0u8; 256];
        for (i, value) in state.iter_mut().enumerate() {
            *value = i as u8;
        }

        let mut j = 0u8;
        for i in 0..256 {
            j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
            state.swap(i, j as usize);
        }

        Self { state, i: 0, j: 0 }
    }

    /// Transform `data` in place with the next bytes of keystream.
    pub(crate) fn apply_keystream(&mut self, data: &mut [u8]) {
        for byte in data {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.state[self.i as usize]);
            self.state.swap(self.i as usize, self.j as usize);
            let index = self.state[self.i as usize].wrapping_add(self.state[self.j as usize]);
            *byte ^= self.state[index as usize];
        }
    }
}

/// The two RC4 states of an encrypted session.
pub(crate) struct CipherPair {
    cipher_in: Rc4,
    cipher_out: Rc4,
}

impl CipherPair {
    /// Derive both directions from the completed key agreement.
    ///
    /// The outbound key is bound to the peer's public key and the inbound
    /// key to our own, so the identical derivation on the other side
    /// yields the matching pair.
    pub(crate) fn derive(own_public_key: &[u8], peer_public_key: &[u8], shared_secret: &[u8]) -> Self {
        let key_out = keyed_digest(shared_secret, peer_public_key);
        let key_in = keyed_digest(shared_secret, own_public_key);

        let mut cipher_out = Rc4::new(&key_out[..RC4_KEY_SIZE]);
        let mut cipher_in = Rc4::new(&key_in[..RC4_KEY_SIZE]);

        // Both parties proceed as if part two (1536 bytes) had been
        // encrypted, discarding the weakest early keystream. RC4 state is
        // a function of how many bytes have been processed, so running
        // arbitrary bytes through suffices.
        let mut warm_up = [0u8; HANDSHAKE_SIZE];
        cipher_in.apply_keystream(&mut warm_up);
        let mut warm_up = [0u8; HANDSHAKE_SIZE];
        cipher_out.apply_keystream(&mut warm_up);

        Self { cipher_in, cipher_out }
    }

    pub(crate) fn update_in(&mut self, data: &mut [u8]) {
        self.cipher_in.apply_keystream(data);
    }

    pub(crate) fn update_out(&mut self, data: &mut [u8]) {
        self.cipher_out.apply_keystream(data);
    }
}
