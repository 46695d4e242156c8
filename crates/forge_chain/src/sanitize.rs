use chrono::Utc;

const FALLBACK_PREFIX: &str = "token_";

/// Turn a display name into a valid Move module identifier.
///
/// The result always matches `^[a-z][a-z0-9_]*$`. Identical input yields
/// identical output, except when nothing usable survives sanitization: then a
/// four-digit suffix taken from the wall clock is appended.
pub fn sanitize_module_name(raw: &str) -> String {
    sanitize_with_suffix(raw, || {
        format!("{:04}", Utc::now().timestamp_millis().rem_euclid(10_000))
    })
}

fn sanitize_with_suffix(raw: &str, suffix: impl FnOnce() -> String) -> String {
    let lowered = raw.to_lowercase();

    let mut collapsed = String::with_capacity(lowered.len());
    let mut in_whitespace = false;
    for c in lowered.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                collapsed.push('_');
            }
            in_whitespace = true;
        } else {
            collapsed.push(c);
            in_whitespace = false;
        }
    }

    let stripped: String = collapsed
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect();
    let trimmed = stripped.trim_matches('_');

    if trimmed.is_empty() {
        return format!("{FALLBACK_PREFIX}{}", suffix());
    }
    if !trimmed.starts_with(|c: char| c.is_ascii_lowercase()) {
        return format!("{FALLBACK_PREFIX}{trimmed}");
    }
    trimmed.to_string()
}

/// Whether `name` already satisfies the module identifier rules.
pub fn is_valid_module_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
