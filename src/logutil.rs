//! Helpers that keep log lines single-line and free of credentials.

use std::fmt::Write;

/// Render a settings-file value or a client-supplied name for a log line:
/// control characters are escaped and anything past 160 chars (more than a
/// stored value can hold) is replaced by an ellipsis.
pub fn escape_log(s: &str) -> String {
    const MAX_PREVIEW: usize = 160;
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 4);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Show only the first few characters of a token or hash, e.g. `8d969e…`.
pub fn mask_secret(secret: &str) -> String {
    const VISIBLE: usize = 6;
    if secret.is_empty() {
        return "<empty>".to_string();
    }
    let prefix: String = secret.chars().take(VISIBLE).collect();
    if secret.chars().count() > VISIBLE {
        format!("{prefix}…")
    } else {
        "…".to_string()
    }
}
