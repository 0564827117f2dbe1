//! Password obfuscation for journal files
//!
//! Type `1` adds the bytes of a key (the entry's timestamp string) to the
//! UTF-8 password bytes, wrapping, and base64-encodes the result. This keeps
//! passwords out of plain sight in journal files; it is not encryption.
//! A `<password>` element without a type is legacy plaintext.

use crate::error::{JournalError, JournalResult};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Cipher type attribute value written by this crate
pub const CIPHER_TYPE: &str = "1";

fn shift(data: &mut [u8], key: &[u8], forward: bool) {
    if key.is_empty() {
        return;
    }
    for (byte, k) in data.iter_mut().zip(key.iter().cycle()) {
        *byte = if forward {
            byte.wrapping_add(*k)
        } else {
            byte.wrapping_sub(*k)
        };
    }
}

/// Encipher `password` with `key` using cipher type `1`
#[must_use]
pub fn encipher(key: &str, password: &str) -> String {
    let mut data = password.as_bytes().to_vec();
    shift(&mut data, key.as_bytes(), true);
    STANDARD.encode(data)
}

/// Recover a password written with cipher type `cipher_type`
///
/// `None` or an empty type is the legacy plaintext form.
pub fn decipher(key: &str, text: &str, cipher_type: Option<&str>) -> JournalResult<String> {
    match cipher_type.map(str::trim) {
        None | Some("") => Ok(text.to_string()),
        Some(CIPHER_TYPE) => {
            let mut data = STANDARD
                .decode(text.trim())
                .map_err(|e| JournalError::malformed(format!("password is not base64: {e}")))?;
            shift(&mut data, key.as_bytes(), false);
            String::from_utf8(data)
                .map_err(|_| JournalError::malformed("password does not decipher to UTF-8"))
        }
        Some(other) => Err(JournalError::malformed(format!(
            "unknown password cipher type {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "2026-10-18T10:00:00.000Z";

    #[test]
    fn test_round_trip() {
        for password in ["", "fedoraAdmin", "pässwörd with spaces", "x"] {
            let enciphered = encipher(KEY, password);
            assert_eq!(decipher(KEY, &enciphered, Some(CIPHER_TYPE)).unwrap(), password);
        }
    }

    #[test]
    fn test_enciphered_differs_from_plaintext() {
        let enciphered = encipher(KEY, "fedoraAdmin");
        assert_ne!(enciphered, "fedoraAdmin");
        assert!(!enciphered.contains("fedora"));
    }

    #[test]
    fn test_legacy_plaintext() {
        assert_eq!(decipher(KEY, "fedoraAdmin", None).unwrap(), "fedoraAdmin");
        assert_eq!(decipher(KEY, "fedoraAdmin", Some("")).unwrap(), "fedoraAdmin");
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = decipher(KEY, "abc", Some("2")).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn test_wrong_key_does_not_match() {
        let enciphered = encipher(KEY, "fedoraAdmin");
        let other = decipher("2020-01-01T00:00:00.000Z", &enciphered, Some(CIPHER_TYPE));
        assert!(other.map_or(true, |p| p != "fedoraAdmin"));
    }

    #[test]
    fn test_random_passwords_round_trip() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let len = rng.gen_range(0..40);
            let password: String = (0..len).map(|_| rng.gen_range(' '..='~')).collect();
            let enciphered = encipher(KEY, &password);
            assert_eq!(decipher(KEY, &enciphered, Some(CIPHER_TYPE)).unwrap(), password);
        }
    }
}
