//! Human-speakable confirmation codes (`RES-AB12CD`).

use rand::Rng;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LEN: usize = 6;

#[derive(Debug, Clone)]
pub struct ConfirmationCodeGenerator {
    prefix: String,
}

impl ConfirmationCodeGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into().trim().to_ascii_uppercase(),
        }
    }

    pub fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        let body: String = (0..CODE_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        if self.prefix.is_empty() {
            body
        } else {
            format!("{}-{}", self.prefix, body)
        }
    }
}

impl Default for ConfirmationCodeGenerator {
    fn default() -> Self {
        Self::new("RES")
    }
}

/// Codes are read back over the phone; accept any casing and stray spaces.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_code_has_prefix_and_body() {
        let code = ConfirmationCodeGenerator::default().generate();
        let (prefix, body) = code.split_once('-').unwrap();
        assert_eq!(prefix, "RES");
        assert_eq!(body.len(), CODE_LEN);
        assert!(body.bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn empty_prefix_yields_bare_code() {
        let code = ConfirmationCodeGenerator::new("").generate();
        assert_eq!(code.len(), CODE_LEN);
    }

    #[test]
    fn normalize_uppercases_and_trims() {
        assert_eq!(normalize_code(" res-ab12cd "), "RES-AB12CD");
    }
}
