/// Derive a URL slug: lowercased, `[a-z0-9_]` kept, every other run of
/// characters becomes a single dash. Uniqueness per tenant is the caller's
/// concern (collision suffixes `-2`, `-3`, ...).
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = false;
    for c in name.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
            out.push(c);
            last_dash = false;
        } else if !last_dash && !out.is_empty() {
            out.push('-');
            last_dash = true;
        }
    }
    let out = out.trim_end_matches('-').to_string();
    if out.is_empty() { "tournament".to_string() } else { out }
}
