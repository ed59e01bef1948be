//! Email parsing: header decoding, lenient dates, bare messages, and the streaming MBOX parser.

pub mod date;
pub mod eml;
pub mod header;
pub mod mbox;
