//! Excel `_xHHHH_` escape decoding
//!
//! Strings in SpreadsheetML encode characters that are awkward in XML as
//! `_xHHHH_` sequences: `_x000d_` is CR, `_x000a_` is LF, `_x0009_` is tab,
//! and `_x005f_` is a literal underscore. Shared strings, inline strings and
//! formula-result strings all use this encoding.

use std::borrow::Cow;

/// Decode `_xHHHH_` sequences. Input without any candidate sequence is
/// returned as-is without allocating.
pub fn decode_escapes(input: &str) -> Cow<'_, str> {
    if !input.contains("_x") {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find("_x") {
        let (head, tail) = rest.split_at(pos);
        out.push_str(head);

        // tail starts with "_x"; a valid escape is 4 hex digits and a
        // closing underscore
        let candidate = &tail[2..];
        if candidate.len() >= 5
            && candidate.as_bytes()[4] == b'_'
            && candidate[..4].bytes().all(|b| b.is_ascii_hexdigit())
        {
            let decoded = u32::from_str_radix(&candidate[..4], 16)
                .ok()
                .and_then(char::from_u32);
            if let Some(c) = decoded {
                out.push(c);
                rest = &candidate[5..];
                continue;
            }
        }

        // Not an escape; emit the underscore and rescan from the 'x'
        out.push('_');
        rest = &tail[1..];
    }

    out.push_str(rest);
    Cow::Owned(out)
}
