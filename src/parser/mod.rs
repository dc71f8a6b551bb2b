//! Email parsing: `.eml` reading, header decoding, and MIME part extraction.

pub mod eml;
pub mod header;
pub mod mime;
