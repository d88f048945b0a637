//! Traditional PKWARE encryption ("ZipCrypto").
//!
//! Encrypted ZIP entries start with a 12-byte header. After feeding the
//! password through the key schedule, decrypting the header yields a check
//! byte that must match the high byte of the entry's CRC-32 (or of its DOS
//! modification time when sizes follow in a data descriptor).

use std::fmt;

use zeroize::Zeroizing;

/// Size of the encryption header preceding each encrypted payload.
pub const ENCRYPTION_HEADER_SIZE: usize = 12;

/// A password for encrypted entries.
///
/// The bytes are wiped from memory when the password is dropped and are
/// never printed.
#[derive(Clone)]
pub struct Password(Zeroizing<Vec<u8>>);

impl Password {
    /// Creates a password from text.
    pub fn new(password: impl AsRef<str>) -> Self {
        Self::from_bytes(password.as_ref().as_bytes())
    }

    /// Creates a password from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(Zeroizing::new(bytes.to_vec()))
    }

    /// Returns the password bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns true if the password is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

impl From<&str> for Password {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Password {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// The running key state of the ZipCrypto stream cipher.
#[derive(Clone)]
pub struct ZipCryptoKeys {
    keys: [u32; 3],
}

impl fmt::Debug for ZipCryptoKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZipCryptoKeys").finish_non_exhaustive()
    }
}

impl ZipCryptoKeys {
    /// Initializes the keys from a password.
    pub fn new(password: &Password) -> Self {
        let mut keys = Self {
            keys: [0x1234_5678, 0x2345_6789, 0x3456_7890],
        };
        for &b in password.as_bytes() {
            keys.update(b);
        }
        keys
    }

    fn update(&mut self, plain: u8) {
        self.keys[0] = crc32_byte(self.keys[0], plain);
        self.keys[1] = self.keys[1]
            .wrapping_add(self.keys[0] & 0xff)
            .wrapping_mul(134_775_813)
            .wrapping_add(1);
        self.keys[2] = crc32_byte(self.keys[2], (self.keys[1] >> 24) as u8);
    }

    fn stream_byte(&self) -> u8 {
        let temp = (self.keys[2] | 2) as u16;
        (temp.wrapping_mul(temp ^ 1) >> 8) as u8
    }

    /// Decrypts one byte and advances the keys.
    pub fn decrypt_byte(&mut self, cipher: u8) -> u8 {
        let plain = cipher ^ self.stream_byte();
        self.update(plain);
        plain
    }

    /// Encrypts one byte and advances the keys.
    pub fn encrypt_byte(&mut self, plain: u8) -> u8 {
        let cipher = plain ^ self.stream_byte();
        self.update(plain);
        cipher
    }

    /// Decrypts a buffer in place.
    pub fn decrypt_in_place(&mut self, buf: &mut [u8]) {
        for b in buf {
            *b = self.decrypt_byte(*b);
        }
    }

    /// Decrypts the 12-byte encryption header and returns its check byte.
    pub fn decrypt_header(&mut self, header: &[u8; ENCRYPTION_HEADER_SIZE]) -> u8 {
        let mut plain = *header;
        self.decrypt_in_place(&mut plain);
        plain[ENCRYPTION_HEADER_SIZE - 1]
    }
}

/// One step of the reflected CRC-32 used by the key schedule.
fn crc32_byte(crc: u32, b: u8) -> u32 {
    let mut c = (crc ^ u32::from(b)) & 0xff;
    for _ in 0..8 {
        c = if c & 1 != 0 { 0xedb8_8320 ^ (c >> 1) } else { c >> 1 };
    }
    (crc >> 8) ^ c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc_step_matches_crc32fast() {
        // Feeding bytes through the raw step with pre/post inversion is a
        // plain CRC-32.
        let data = b"The quick brown fox";
        let mut crc = 0xffff_ffffu32;
        for &b in data {
            crc = crc32_byte(crc, b);
        }
        assert_eq!(!crc, crc32fast::hash(data));
    }

    #[test]
    fn test_encrypt_then_decrypt() {
        let password = Password::new("secret");
        let mut enc = ZipCryptoKeys::new(&password);
        let mut dec = ZipCryptoKeys::new(&password);

        let plain = b"attack at dawn".to_vec();
        let cipher: Vec<u8> = plain.iter().map(|&b| enc.encrypt_byte(b)).collect();
        assert_ne!(cipher, plain);

        let mut buf = cipher;
        dec.decrypt_in_place(&mut buf);
        assert_eq!(buf, plain);
    }

    #[test]
    fn test_header_check_byte() {
        let password = Password::new("pw");
        let mut enc = ZipCryptoKeys::new(&password);
        let mut header = [0x11u8; ENCRYPTION_HEADER_SIZE];
        header[11] = 0xab;
        let encrypted: Vec<u8> = header.iter().map(|&b| enc.encrypt_byte(b)).collect();
        let encrypted: [u8; ENCRYPTION_HEADER_SIZE] = encrypted.try_into().unwrap();

        let mut right = ZipCryptoKeys::new(&password);
        assert_eq!(right.decrypt_header(&encrypted), 0xab);

        let mut wrong = ZipCryptoKeys::new(&Password::new("nope"));
        let mut garbled = encrypted;
        wrong.decrypt_in_place(&mut garbled);
        assert_ne!(garbled, header);
    }

    #[test]
    fn test_password_debug_is_redacted() {
        let password = Password::from("hunter2");
        assert_eq!(format!("{:?}", password), "Password(***)");
        assert_eq!(password.as_bytes(), b"hunter2");
        assert!(!password.is_empty());
    }
}
