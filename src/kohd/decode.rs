//! Player-side decoding
//!
//! The console never decodes its own bursts; the player terminal does. This is
//! the reverse mapping that terminal has to apply to stay compatible: the exact
//! inverse of [`super::encode`] with every symbol gated by the [`KeyGate`].

use super::{is_space_code, CipherTable};
use crate::keygate::KeyGate;

/// One decoded position of a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Glyph {
    Plain(char),
    Space,
    /// Known symbol the player has not unlocked yet. Keeps the raw code.
    Locked(String),
    /// Code absent from the table.
    Unknown(String),
}

impl Glyph {
    pub fn render(&self) -> String {
        match self {
            Glyph::Plain(c) => c.to_string(),
            Glyph::Space => " ".to_string(),
            Glyph::Locked(code) | Glyph::Unknown(code) => code.clone(),
        }
    }
}

/// Decode an encoded payload (delimiters already stripped).
pub fn decode(payload: &str, table: &CipherTable, gate: &KeyGate) -> Vec<Glyph> {
    let reversed = table.reversed();
    let chars: Vec<char> = payload.chars().collect();

    chars
        .chunks(2)
        .map(|pair| {
            let code: String = pair.iter().collect();
            if is_space_code(&code) {
                return Glyph::Space;
            }
            match reversed.get(code.as_str()) {
                Some(&symbol) if gate.is_unlocked(symbol) => Glyph::Plain(symbol),
                Some(_) => Glyph::Locked(code),
                None => Glyph::Unknown(code),
            }
        })
        .collect()
}

/// Plaintext of a fully unlocked decode. Locked and unknown glyphs render as
/// their raw codes.
pub fn render(glyphs: &[Glyph]) -> String {
    glyphs.iter().map(Glyph::render).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kohd::encode;

    #[test]
    fn test_round_trip_fully_unlocked() {
        let table = CipherTable::generate();
        let gate = KeyGate::all_unlocked(&table);

        for message in ["hi there", "Trace detected: sector 7!", "", "  double  space "] {
            let payload = encode(message, &table);
            let expected: String = message
                .to_uppercase()
                .chars()
                .filter(|c| *c == ' ' || table.code_for(*c).is_some())
                .collect();
            assert_eq!(render(&decode(&payload, &table, &gate)), expected);
        }
    }

    #[test]
    fn test_locked_symbols_keep_code() {
        let table = CipherTable::default_table();
        let mut gate = KeyGate::default();
        gate.set('H', true);

        let glyphs = decode(&encode("HI", &table), &table, &gate);
        assert_eq!(glyphs, vec![Glyph::Plain('H'), Glyph::Locked("><".into())]);
    }

    #[test]
    fn test_unknown_code() {
        let table = CipherTable::default_table();
        let gate = KeyGate::all_unlocked(&table);
        // "&*" is a legal code the default table never assigns
        assert_eq!(decode("&*", &table, &gate), vec![Glyph::Unknown("&*".into())]);
    }
}
