//! Core data model types.

pub mod message;
