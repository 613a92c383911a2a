//! Playlist parsing
//!
//! Pure text parsers with no network access.

pub mod m3u8_parser;

pub use m3u8_parser::*;
