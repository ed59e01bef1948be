//! `mboxArchive`: move aging mail from a maildir into an MBOX backup.
//!
//! This crate provides the core library: opening the maildir source and the
//! locked MBOX backup as a scoped session, and copying every message that is
//! old enough and not yet archived.

pub mod archive;
pub mod config;
pub mod error;
pub mod hook;
pub mod model;
pub mod parser;
pub mod store;
