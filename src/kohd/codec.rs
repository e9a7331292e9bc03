//! Message encoding and transmission noise

use rand::seq::SliceRandom;
use rand::Rng;

use super::{CipherTable, SYMBOLS};

/// Encode a message with `table`.
///
/// The message is uppercased first. Spaces become a random doubled symbol,
/// symbols without a code are dropped.
pub fn encode(message: &str, table: &CipherTable) -> String {
    encode_with(message, table, &mut rand::thread_rng())
}

pub fn encode_with<R: Rng + ?Sized>(message: &str, table: &CipherTable, rng: &mut R) -> String {
    let mut encoded = String::with_capacity(message.len() * 2);
    for c in message.to_uppercase().chars() {
        if c == ' ' {
            let s = SYMBOLS[rng.gen_range(0..SYMBOLS.len())];
            encoded.push(s);
            encoded.push(s);
        } else if let Some(code) = table.code_for(c) {
            encoded.push_str(code);
        }
    }
    encoded
}

/// `length` symbols drawn uniformly from the nine-symbol alphabet.
pub fn generate_noise(length: usize) -> String {
    generate_noise_with(length, &mut rand::thread_rng())
}

pub fn generate_noise_with<R: Rng + ?Sized>(length: usize, rng: &mut R) -> String {
    (0..length)
        .map(|_| SYMBOLS[rng.gen_range(0..SYMBOLS.len())])
        .collect()
}

/// Shuffle the two-character codes of an encoded payload.
///
/// Used when the `scramble_next` glitch is armed: the burst still decodes
/// symbol by symbol, but the symbols arrive out of order.
pub fn scramble(encoded: &str) -> String {
    let mut codes: Vec<String> = encoded
        .chars()
        .collect::<Vec<_>>()
        .chunks(2)
        .map(|pair| pair.iter().collect())
        .collect();
    codes.shuffle(&mut rand::thread_rng());
    codes.concat()
}
