/// Normalize whitespace by:
/// - mapping all Unicode whitespace (incl. tabs/newlines) to a single ASCII space
/// - collapsing runs of spaces to a single space
/// - trimming leading/trailing spaces
pub fn normalize_ws(input: impl Into<String>) -> String {
    // Map all whitespace chars to ' ' and keep others unchanged
    let mapped: String = input
        .into()
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();

    // Collapse runs of ' ' to a single space
    let mut out = String::with_capacity(mapped.len());
    let mut last_space = false;
    for ch in mapped.chars() {
        if ch == ' ' {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
        } else {
            out.push(ch);
            last_space = false;
        }
    }

    out.trim().to_string()
}

/// Normalize an optional string:
/// - apply whitespace normalization to Some
/// - convert empty result to None
pub fn normalize_opt(input: Option<impl Into<String>>) -> Option<String> {
    match input {
        None => None,
        Some(s) => {
            let n = normalize_ws(s);
            if n.is_empty() { None } else { Some(n) }
        }
    }
}
