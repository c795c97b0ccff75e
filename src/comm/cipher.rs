//! 32-byte XOR key stream.
//!
//! Each encrypted byte is XORed with `key[index]` and the index advances
//! by one, wrapping after 32.  Both ends advance in lockstep; the only
//! resynchronisation is an explicit reset of the index to 0.

use rand_core::RngCore;

/// Key length in bytes.
pub const KEY_LEN: usize = 32;

/// XOR `byte` with key position `index` (taken mod [`KEY_LEN`]).
pub fn encrypt(byte: u8, key: &[u8; KEY_LEN], index: u8) -> u8 {
    byte ^ key[index as usize % KEY_LEN]
}

/// Inverse of [`encrypt`]; XOR is its own inverse.
pub fn decrypt(byte: u8, key: &[u8; KEY_LEN], index: u8) -> u8 {
    encrypt(byte, key, index)
}

/// Session key plus the position of the next byte to use.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyStream {
    key: [u8; KEY_LEN],
    index: u8,
}

impl KeyStream {
    /// An all-zero key; used before the first pairing.
    pub const fn empty() -> Self {
        Self {
            key: [0; KEY_LEN],
            index: 0,
        }
    }

    pub const fn from_key(key: [u8; KEY_LEN]) -> Self {
        Self { key, index: 0 }
    }

    /// Draw a fresh key from `rng` and rewind the index.
    pub fn generate<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut key = [0u8; KEY_LEN];
        rng.fill_bytes(&mut key);
        Self::from_key(key)
    }

    /// Encrypt (or decrypt) one byte and advance the index.
    pub fn apply(&mut self, byte: u8) -> u8 {
        let out = encrypt(byte, &self.key, self.index);
        self.index = (self.index + 1) % KEY_LEN as u8;
        out
    }

    /// Resynchronise to key position 0.
    pub fn reset_index(&mut self) {
        self.index = 0;
    }

    /// Forget the key material.
    pub fn clear(&mut self) {
        self.key = [0; KEY_LEN];
        self.index = 0;
    }

    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    pub fn index(&self) -> u8 {
        self.index
    }
}

impl Default for KeyStream {
    fn default() -> Self {
        Self::empty()
    }
}

impl core::fmt::Debug for KeyStream {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KeyStream")
            .field("key", &"<redacted>")
            .field("index", &self.index)
            .finish()
    }
}
