//! Single-byte text encodings for record exchange
//!
//! The peer reads either plain ASCII or EBCDIC (code page 037). The choice is
//! made once in configuration and threaded through the codec; it is never
//! guessed from the data.

use std::fmt;
use std::str::FromStr;

/// Substitute for characters the target encoding cannot carry
const SUBSTITUTE: char = '?';

/// Text <-> bytes conversion used by the record codec
pub trait TextEncoding {
    fn to_bytes(&self, text: &str) -> Vec<u8>;
    fn from_bytes(&self, bytes: &[u8]) -> String;
}

/// Encodings the bridge can speak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    Ascii,
    /// EBCDIC code page 037
    #[default]
    Ebcdic,
}

impl Encoding {
    pub fn name(self) -> &'static str {
        match self {
            Self::Ascii => "ascii",
            Self::Ebcdic => "ebcdic",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown record encoding: {0}")]
pub struct UnknownEncoding(pub String);

impl FromStr for Encoding {
    type Err = UnknownEncoding;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ascii" => Ok(Self::Ascii),
            "ebcdic" | "cp037" => Ok(Self::Ebcdic),
            other => Err(UnknownEncoding(other.to_string())),
        }
    }
}

impl TextEncoding for Encoding {
    fn to_bytes(&self, text: &str) -> Vec<u8> {
        match self {
            Self::Ascii => text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { SUBSTITUTE as u8 })
                .collect(),
            Self::Ebcdic => text
                .chars()
                .map(|c| {
                    let latin1 = u8::try_from(u32::from(c)).unwrap_or(SUBSTITUTE as u8);
                    CP037_ENCODE[usize::from(latin1)]
                })
                .collect(),
        }
    }

    fn from_bytes(&self, bytes: &[u8]) -> String {
        match self {
            Self::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { char::from(b) } else { SUBSTITUTE })
                .collect(),
            Self::Ebcdic => bytes
                .iter()
                .map(|&b| char::from(CP037_DECODE[usize::from(b)]))
                .collect(),
        }
    }
}

/// EBCDIC byte -> Latin-1 code point
const CP037_DECODE: [u8; 256] = [
    0x00, 0x01, 0x02, 0x03, 0x9C, 0x09, 0x86, 0x7F, 0x97, 0x8D, 0x8E, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
    0x10, 0x11, 0x12, 0x13, 0x9D, 0x85, 0x08, 0x87, 0x18, 0x19, 0x92, 0x8F, 0x1C, 0x1D, 0x1E, 0x1F,
    0x80, 0x81, 0x82, 0x83, 0x84, 0x0A, 0x17, 0x1B, 0x88, 0x89, 0x8A, 0x8B, 0x8C, 0x05, 0x06, 0x07,
    0x90, 0x91, 0x16, 0x93, 0x94, 0x95, 0x96, 0x04, 0x98, 0x99, 0x9A, 0x9B, 0x14, 0x15, 0x9E, 0x1A,
    0x20, 0xA0, 0xE2, 0xE4, 0xE0, 0xE1, 0xE3, 0xE5, 0xE7, 0xF1, 0xA2, 0x2E, 0x3C, 0x28, 0x2B, 0x7C,
    0x26, 0xE9, 0xEA, 0xEB, 0xE8, 0xED, 0xEE, 0xEF, 0xEC, 0xDF, 0x21, 0x24, 0x2A, 0x29, 0x3B, 0xAC,
    0x2D, 0x2F, 0xC2, 0xC4, 0xC0, 0xC1, 0xC3, 0xC5, 0xC7, 0xD1, 0xA6, 0x2C, 0x25, 0x5F, 0x3E, 0x3F,
    0xF8, 0xC9, 0xCA, 0xCB, 0xC8, 0xCD, 0xCE, 0xCF, 0xCC, 0x60, 0x3A, 0x23, 0x40, 0x27, 0x3D, 0x22,
    0xD8, 0x61, 0x62, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0xAB, 0xBB, 0xF0, 0xFD, 0xFE, 0xB1,
    0xB0, 0x6A, 0x6B, 0x6C, 0x6D, 0x6E, 0x6F, 0x70, 0x71, 0x72, 0xAA, 0xBA, 0xE6, 0xB8, 0xC6, 0xA4,
    0xB5, 0x7E, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7A, 0xA1, 0xBF, 0xD0, 0xDD, 0xDE, 0xAE,
    0x5E, 0xA3, 0xA5, 0xB7, 0xA9, 0xA7, 0xB6, 0xBC, 0xBD, 0xBE, 0x5B, 0x5D, 0xAF, 0xA8, 0xB4, 0xD7,
    0x7B, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0xAD, 0xF4, 0xF6, 0xF2, 0xF3, 0xF5,
    0x7D, 0x4A, 0x4B, 0x4C, 0x4D, 0x4E, 0x4F, 0x50, 0x51, 0x52, 0xB9, 0xFB, 0xFC, 0xF9, 0xFA, 0xFF,
    0x5C, 0xF7, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5A, 0xB2, 0xD4, 0xD6, 0xD2, 0xD3, 0xD5,
    0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0xB3, 0xDB, 0xDC, 0xD9, 0xDA, 0x9F,
];

/// Latin-1 code point -> EBCDIC byte
const CP037_ENCODE: [u8; 256] = invert(&CP037_DECODE);

const fn invert(table: &[u8; 256]) -> [u8; 256] {
    let mut out = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        out[table[i] as usize] = i as u8;
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_page_is_a_bijection() {
        let mut seen = [false; 256];
        for &cp in CP037_DECODE.iter() {
            assert!(!seen[usize::from(cp)], "duplicate code point {cp:#04x}");
            seen[usize::from(cp)] = true;
        }
    }

    #[test]
    fn ebcdic_matches_known_code_points() {
        let bytes = Encoding::Ebcdic.to_bytes("COMMAND 0 +-");
        assert_eq!(
            bytes,
            vec![0xC3, 0xD6, 0xD4, 0xD4, 0xC1, 0xD5, 0xC4, 0x40, 0xF0, 0x40, 0x4E, 0x60]
        );
        assert_eq!(Encoding::Ebcdic.from_bytes(&bytes), "COMMAND 0 +-");
    }

    #[test]
    fn ascii_substitutes_non_ascii() {
        assert_eq!(Encoding::Ascii.to_bytes("caf\u{e9}"), b"caf?".to_vec());
        assert_eq!(Encoding::Ascii.from_bytes(&[b'O', b'K', 0xC1]), "OK?");
    }

    #[test]
    fn ebcdic_substitutes_outside_latin1() {
        assert_eq!(
            Encoding::Ebcdic.from_bytes(&Encoding::Ebcdic.to_bytes("\u{263A}")),
            "?"
        );
    }

    #[test]
    fn parses_configuration_names() {
        assert_eq!("ASCII".parse::<Encoding>(), Ok(Encoding::Ascii));
        assert_eq!("cp037".parse::<Encoding>(), Ok(Encoding::Ebcdic));
        assert!("utf8".parse::<Encoding>().is_err());
    }
}
