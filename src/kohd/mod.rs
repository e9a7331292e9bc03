//! Kohd - the in-fiction substitution cipher
//!
//! Every plaintext symbol (`A`-`Z`, `0`-`9`) maps to a two-character code built
//! from a nine-symbol alphabet. The first character is always one of the five
//! group symbols. A doubled symbol (`<<`, `%%`, ...) stands for a space and is
//! never assigned to a letter or digit.
//!
//! - [`cipher`]: table generation, the built-in default table, grid display
//! - [`codec`]: message encoding and noise generation
//! - [`burst`]: datastream burst wire format
//! - [`decode`]: player-side reverse mapping gated by the key-gate

pub mod burst;
pub mod cipher;
pub mod codec;
pub mod decode;

pub use burst::{Burst, DELIM_END, DELIM_START};
pub use cipher::CipherTable;
pub use codec::{encode, generate_noise, scramble};
pub use decode::{decode, render, Glyph};

/// The nine symbols every code and every noise character is drawn from.
pub const SYMBOLS: [char; 9] = ['<', '>', '%', '^', '&', '*', '-', '+', '@'];

/// Symbols allowed in the first position of a code.
pub const GROUPS: [char; 5] = ['<', '>', '%', '^', '&'];

/// Plaintext symbols in canonical assignment order.
pub const PLAINTEXT: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Whether `code` is one of the nine doubled space markers.
pub fn is_space_code(code: &str) -> bool {
    let mut chars = code.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (Some(a), Some(b), None) => a == b && SYMBOLS.contains(&a),
        _ => false,
    }
}
