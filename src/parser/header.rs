//! RFC 5322 header unfolding and RFC 2047 encoded-word decoding.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use tracing::warn;

/// Decode a header value that may be an RFC 2047 encoded word.
///
/// Anything that does not look like an encoded word (must start with `=?`,
/// contain a `?=` terminator and a `?B?` or `?Q?` marker) is returned
/// unchanged, as is anything with fewer than five `?`-separated components.
///
/// Base64 payloads are normalized first: some senders use the URL-safe
/// alphabet and drop the padding, so the first payload is re-encoded as
/// standard padded base64 before decoding. Charsets are looked up in the
/// `encoding_rs` registry; unknown ones fall back to lossy UTF-8.
///
/// Example: `"=?UTF-8?B?SGVsbG8=?="` → `"Hello"`
pub fn decode_rfc2047(text: &str) -> String {
    if !looks_encoded(text) {
        return text.to_string();
    }

    let mut comps: Vec<String> = text.split('?').map(String::from).collect();
    if comps.len() < 5 {
        return text.to_string();
    }

    if comps[2].eq_ignore_ascii_case("B") {
        if let Some(normalized) = normalize_base64(&comps[3]) {
            comps[3] = normalized;
        }
    }

    decode_encoded_words(&comps.join("?"))
}

fn looks_encoded(text: &str) -> bool {
    if !text.starts_with("=?") || !text.contains("?=") {
        return false;
    }
    let upper = text.to_ascii_uppercase();
    upper.contains("?Q?") || upper.contains("?B?")
}

/// Re-encode a possibly URL-safe, unpadded base64 payload as standard padded base64.
fn normalize_base64(payload: &str) -> Option<String> {
    let bytes = decode_base64_lenient(payload)?;
    Some(STANDARD.encode(bytes))
}

/// Decode base64 in either alphabet, with or without padding.
fn decode_base64_lenient(payload: &str) -> Option<Vec<u8>> {
    let cleaned: String = payload
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();
    STANDARD_NO_PAD.decode(cleaned.as_bytes()).ok()
}

/// Decode every RFC 2047 encoded word inside a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// If decoding fails for any token, the original text is preserved.
pub fn decode_encoded_words(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        // Whitespace between two adjacent encoded words is dropped (RFC 2047 §6.2)
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];

        if let Some(decoded) = try_decode_one_word(after_start) {
            result.push_str(&decoded.text);
            remaining = &remaining[start + 2 + decoded.consumed..];
            last_was_encoded = true;
        } else {
            result.push_str("=?");
            remaining = after_start;
            last_was_encoded = false;
        }
    }

    result.push_str(remaining);
    result
}

struct DecodedWord {
    text: String,
    consumed: usize, // bytes consumed from the string *after* the initial "=?"
}

fn try_decode_one_word(s: &str) -> Option<DecodedWord> {
    // Format: charset?encoding?encoded_text?=
    let first_q = s.find('?')?;
    let charset = &s[..first_q];

    let rest = &s[first_q + 1..];
    let second_q = rest.find('?')?;
    let encoding = &rest[..second_q];

    let rest2 = &rest[second_q + 1..];
    let end = rest2.find("?=")?;
    let encoded_text = &rest2[..end];

    let total_consumed = first_q + 1 + second_q + 1 + end + 2;

    let bytes = match encoding.to_uppercase().as_str() {
        "B" => decode_base64_lenient(encoded_text)?,
        "Q" => decode_q_encoding(encoded_text),
        _ => return None,
    };

    Some(DecodedWord {
        text: decode_charset(charset, &bytes),
        consumed: total_consumed,
    })
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
                match u8::from_str_radix(hex, 16) {
                    Ok(byte) => {
                        result.push(byte);
                        i += 3;
                    }
                    Err(_) => {
                        result.push(b'=');
                        i += 1;
                    }
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

/// Decode bytes using a named charset.
///
/// An RFC 2231 language suffix (`UTF-8*en`) is ignored.
fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    let charset = charset.split('*').next().unwrap_or(charset);
    match charset.to_lowercase().as_str() {
        "utf-8" | "utf8" => String::from_utf8_lossy(bytes).into_owned(),
        _ => {
            if let Some(encoding) = encoding_rs::Encoding::for_label(charset.as_bytes()) {
                let (decoded, _, _) = encoding.decode(bytes);
                decoded.into_owned()
            } else {
                warn!(
                    charset = charset,
                    "Unknown charset, falling back to UTF-8 lossy"
                );
                String::from_utf8_lossy(bytes).into_owned()
            }
        }
    }
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
pub fn decode_header_bytes(bytes: &[u8]) -> String {
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
/// Returns a list of `(lowercase_name, raw_value)` pairs in file order.
pub fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim().to_lowercase();
            let value = line[colon_pos + 1..].trim().to_string();
            result.push((name, value));
        }
    }

    result
}
