//! Datastream burst wire format
//!
//! ```text
//! <leading-noise>$:<payload>:#<trailing-noise>
//! SVG::<raw-svg-markup>
//! GIF::<url>
//! ```
//!
//! Noise is split `floor(n/2)` leading and `ceil(n/2)` trailing. SVG and GIF
//! bursts skip the noise wrapper entirely.

use super::codec::generate_noise;

pub const DELIM_START: &str = "$:";
pub const DELIM_END: &str = ":#";
pub const SVG_PREFIX: &str = "SVG::";
pub const GIF_PREFIX: &str = "GIF::";

/// One transmitted unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Burst {
    /// Delimited payload, either cipher-encoded or passed through as-is.
    Datastream(String),
    Svg(String),
    Gif(String),
}

impl Burst {
    /// Render for the wire. `noise` only applies to [`Burst::Datastream`].
    pub fn to_wire(&self, noise: usize) -> String {
        match self {
            Burst::Datastream(payload) => wrap(payload, noise),
            Burst::Svg(markup) => format!("{SVG_PREFIX}{markup}"),
            Burst::Gif(url) => format!("{GIF_PREFIX}{url}"),
        }
    }

    /// Recover a burst from its wire form. Returns `None` when a datastream
    /// is missing either delimiter.
    pub fn parse(wire: &str) -> Option<Self> {
        if let Some(markup) = wire.strip_prefix(SVG_PREFIX) {
            return Some(Burst::Svg(markup.to_string()));
        }
        if let Some(url) = wire.strip_prefix(GIF_PREFIX) {
            return Some(Burst::Gif(url.to_string()));
        }
        // Noise never contains '$', ':' or '#', so the first start delimiter
        // and the last end delimiter bound the payload.
        let start = wire.find(DELIM_START)? + DELIM_START.len();
        let end = wire.rfind(DELIM_END)?;
        if end < start {
            return None;
        }
        Some(Burst::Datastream(wire[start..end].to_string()))
    }
}

/// Wrap `payload` in delimiters and `noise` symbols of padding.
pub fn wrap(payload: &str, noise: usize) -> String {
    let leading = generate_noise(noise / 2);
    let trailing = generate_noise(noise - noise / 2);
    format!("{leading}{DELIM_START}{payload}{DELIM_END}{trailing}")
}
