//! Percent-encoding helpers.

/// Characters `encodeURIComponent` leaves alone besides ASCII alphanumerics.
const UNRESERVED_MARKS: &[u8] = b"-_.!~*'()";

/// Percent-encode `input` byte-wise as UTF-8, keeping alphanumerics and
/// `-_.!~*'()`. Used for query strings and `Content-Disposition` names.
pub fn encode_uri_component(input: &str) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        if byte.is_ascii_alphanumeric() || UNRESERVED_MARKS.contains(&byte) {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}
