//! A single message fetched from a mailbox.

use chrono::{DateTime, Utc};

/// One email message as read from a mailbox.
///
/// The raw bytes are kept untouched so that appending to the backup copies
/// the message verbatim. Only the two headers the archiver looks at are
/// extracted.
#[derive(Debug, Clone)]
pub struct Message {
    /// Full RFC 5322 message: headers, blank line, body.
    pub raw: Vec<u8>,

    /// Normalized `Message-ID` (`<local@domain>`), if present and non-empty.
    pub message_id: Option<String>,

    /// Raw `Date` header value, unparsed.
    pub date: Option<String>,

    /// Delivery time of the message file; used for the MBOX `From ` line.
    pub delivered: Option<DateTime<Utc>>,
}
