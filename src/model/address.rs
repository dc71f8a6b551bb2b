//! Splitting address-list headers (RFC 5322 §3.4) into individual entries.

/// Split a comma-separated address list into its entries.
///
/// Commas inside double quotes or angle brackets do not split:
/// `"Last, First" <a@b.com>, other@c.com` yields two entries. Entries are
/// trimmed and empty ones dropped; nothing is decoded, so encoded words
/// survive intact for the header decoder.
pub fn split_address_list(raw: &str) -> Vec<String> {
    let mut results = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_angle = false;

    for ch in raw.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '<' if !in_quotes => {
                in_angle = true;
                current.push(ch);
            }
            '>' if !in_quotes => {
                in_angle = false;
                current.push(ch);
            }
            ',' if !in_quotes && !in_angle => {
                push_entry(&mut results, &current);
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    push_entry(&mut results, &current);

    results
}

fn push_entry(results: &mut Vec<String>, entry: &str) {
    let trimmed = entry.trim();
    if !trimmed.is_empty() {
        results.push(trimmed.to_string());
    }
}
