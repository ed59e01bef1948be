//! RFC 5322 header block handling: byte decoding, folding, lookup.

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
pub fn decode_header_bytes(bytes: &[u8]) -> String {
    // Strip BOM if present
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Unfold headers: join continuation lines (starting with space or tab) with the previous header.
///
/// Returns a list of `(lowercase_name, raw_value)` pairs. An MBOX `From `
/// separator line has no colon before its first space and is skipped.
pub fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some(colon_pos) = line.find(':') {
            let name = &line[..colon_pos];
            // Field names are printable ASCII without spaces (RFC 5322 §2.2)
            if name.is_empty() || name.contains(' ') || name.contains('\t') {
                continue;
            }
            let value = line[colon_pos + 1..].trim().to_string();
            result.push((name.to_lowercase(), value));
        }
    }

    result
}

/// Decode and unfold a raw header block in one step.
pub fn parse_header_block(raw_headers: &[u8]) -> Vec<(String, String)> {
    unfold_headers(&decode_header_bytes(raw_headers))
}

/// Get the first value for a header name (lowercase).
pub fn get_header(headers: &[(String, String)], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
}

/// Normalized `Message-ID` of a header block, `None` when missing or blank.
pub fn message_id(headers: &[(String, String)]) -> Option<String> {
    get_header(headers, "message-id")
        .map(|s| extract_angle_bracket(&s))
        .filter(|id| !id.is_empty())
}

/// Extract content between `<` and `>` (inclusive) for Message-ID.
///
/// Values without brackets are returned trimmed.
pub fn extract_angle_bracket(s: &str) -> String {
    let trimmed = s.trim();
    if let Some(start) = trimmed.find('<') {
        if let Some(end) = trimmed[start..].find('>') {
            return trimmed[start..start + end + 1].to_string();
        }
    }
    trimmed.to_string()
}

/// Byte offset where the header block ends (position of the first blank line).
pub fn find_header_end(data: &[u8]) -> Option<usize> {
    for i in 0..data.len().saturating_sub(1) {
        if data[i] == b'\n' && data[i + 1] == b'\n' {
            return Some(i);
        }
        if i + 3 < data.len()
            && data[i] == b'\r'
            && data[i + 1] == b'\n'
            && data[i + 2] == b'\r'
            && data[i + 3] == b'\n'
        {
            return Some(i);
        }
    }
    None
}
