//! Mailbox stores: the maildir source, the MBOX backup, and the scoped
//! session that pairs them.

pub mod compress;
pub mod maildir;
pub mod mbox;
pub mod session;
