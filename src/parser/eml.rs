//! Parser for individual message files (RFC 5322 messages without MBOX framing).

use chrono::{DateTime, Utc};
use mail_parser::MessageParser;

use crate::error::MessageError;
use crate::model::message::Message;
use crate::parser::header;

/// Build a [`Message`] from the bytes of a bare RFC 5322 message.
///
/// Fails when the bytes are empty, rejected by `mail-parser`, or carry no
/// header field at all.
pub fn parse_message(
    data: Vec<u8>,
    delivered: Option<DateTime<Utc>>,
) -> Result<Message, MessageError> {
    if data.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(MessageError::fetch("empty message"));
    }

    if MessageParser::default().parse(data.as_slice()).is_none() {
        return Err(MessageError::fetch("unparseable message"));
    }

    let header_end = header::find_header_end(&data).unwrap_or(data.len());
    let headers = header::parse_header_block(&data[..header_end]);
    if headers.is_empty() {
        return Err(MessageError::fetch("no header fields"));
    }

    Ok(Message {
        message_id: header::message_id(&headers),
        date: header::get_header(&headers, "date"),
        raw: data,
        delivered,
    })
}
