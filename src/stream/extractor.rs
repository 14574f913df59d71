//! Incremental extraction of top-level JSON objects from an unframed stream.
//!
//! The upstream response body is a concatenation of JSON objects with no
//! delimiters, and network reads split them arbitrarily. Objects are framed
//! by brace-depth counting: scan to the first `{`, then track nesting until
//! depth returns to zero. The counter is deliberately not string-aware (a
//! brace inside a JSON string literal would desynchronize it) because that
//! matches the framing the live payloads are parsed with today.

use memchr::memchr;

/// Pull the next complete top-level JSON object off the front of `buffer`.
///
/// - No `{` in the buffer: the buffer is discarded and `None` is returned.
/// - An opening `{` without its matching close: everything before the `{` is
///   dropped, the rest is retained for the next read, `None` is returned.
/// - A balanced span: it is removed from the buffer (along with any prefix
///   garbage) and returned. The returned text is a candidate only; callers
///   decide whether it decodes.
pub fn extract_json_candidate(buffer: &mut String) -> Option<String> {
    let bytes = buffer.as_bytes();
    let Some(start) = memchr(b'{', bytes) else {
        buffer.clear();
        return None;
    };

    let mut depth = 0usize;
    for (offset, &byte) in bytes[start..].iter().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    let candidate = buffer[start..end].to_string();
                    buffer.drain(..end);
                    return Some(candidate);
                }
            }
            _ => {}
        }
    }

    if start > 0 {
        buffer.drain(..start);
    }
    None
}
