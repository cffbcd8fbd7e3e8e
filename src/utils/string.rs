//! String helpers for model output handling.
//!
//! Model text is logged in truncated form and frequently arrives wrapped in
//! markdown code fences, so both helpers here are UTF-8 safe and never slice
//! by byte index.

/// Return a preview of `s` up to `n` characters, with a trailing `...` when cut.
pub fn preview(s: &str, n: usize) -> String {
    let mut prefix: String = s.chars().take(n).collect();
    if s.chars().count() > n {
        prefix.push_str("...");
    }
    prefix
}

/// Strip a surrounding markdown code fence (```` ``` ```` or ```` ```json ````).
///
/// Text without a leading fence is returned trimmed and otherwise unchanged.
pub fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json", "JSON", ...) up to the first newline.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Turn an arbitrary key (agent id, session key) into a safe file stem.
///
/// ASCII alphanumerics, `-` and `_` are kept; everything else becomes `_`.
pub fn sanitize_file_stem(key: &str) -> String {
    let stem: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "_".to_string()
    } else {
        stem
    }
}
