//! Base-85 text encoding of compressed payloads
//!
//! Uses the alphabet and unpadded layout of Python's `base64.b85encode`, so
//! artifacts produced by older tools decode unchanged. Every 4 input bytes
//! become 5 characters; a short final group of `n` bytes becomes `n + 1`
//! characters.

use crate::error::{Result, SnapshotError};

const ALPHABET: &[u8; 85] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz!#$%&()*+-;<=>?@^_`{|}~";

const INVALID: u8 = 0xFF;

const fn build_decode_table() -> [u8; 256] {
    let mut table = [INVALID; 256];
    let mut i = 0;
    while i < ALPHABET.len() {
        table[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
}

static DECODE: [u8; 256] = build_decode_table();

/// Encode bytes as base-85 text
pub fn encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(4) * 5);
    for chunk in data.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        let mut value = u32::from_be_bytes(word);

        let mut digits = [0u8; 5];
        for slot in digits.iter_mut().rev() {
            *slot = ALPHABET[(value % 85) as usize];
            value /= 85;
        }
        for &d in &digits[..chunk.len() + 1] {
            out.push(d as char);
        }
    }
    out
}

/// Decode base-85 text, rejecting any malformed input
pub fn decode(text: &str) -> Result<Vec<u8>> {
    let (bytes, problem) = decode_prefix(text.as_bytes());
    match problem {
        None => Ok(bytes),
        Some(msg) => Err(SnapshotError::decompression(msg)),
    }
}

/// Decode the longest well-formed prefix of `text`
///
/// Returns the bytes recovered and, when the input did not decode completely,
/// a description of where decoding stopped. Used to salvage truncated
/// artifacts.
pub fn decode_lenient(text: &str) -> (Vec<u8>, Option<String>) {
    decode_prefix(text.as_bytes())
}

fn decode_prefix(input: &[u8]) -> (Vec<u8>, Option<String>) {
    let mut out = Vec::with_capacity(input.len() / 5 * 4 + 4);

    for (index, chunk) in input.chunks(5).enumerate() {
        let offset = index * 5;
        if chunk.len() == 1 {
            return (
                out,
                Some(format!("dangling base-85 character at offset {}", offset)),
            );
        }

        let mut acc: u64 = 0;
        for i in 0..5 {
            let digit = match chunk.get(i) {
                Some(&c) => {
                    let d = DECODE[c as usize];
                    if d == INVALID {
                        return (
                            out,
                            Some(format!(
                                "invalid base-85 character {:?} at offset {}",
                                c as char,
                                offset + i
                            )),
                        );
                    }
                    d
                }
                // Short final group is padded with the highest digit
                None => 84,
            };
            acc = acc * 85 + u64::from(digit);
        }

        if acc > u64::from(u32::MAX) {
            return (
                out,
                Some(format!("base-85 group overflows at offset {}", offset)),
            );
        }

        let word = (acc as u32).to_be_bytes();
        out.extend_from_slice(&word[..chunk.len() - 1]);
    }

    (out, None)
}
