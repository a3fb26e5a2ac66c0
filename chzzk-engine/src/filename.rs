//! Filesystem-safe name sanitization, specified by explicit Unicode allow-list rather
//! than locale-dependent character classes.

/// Keep letters, digits, Hangul syllables/jamo, space, underscore and hyphen; trim the
/// result; fall back to `"unknown"` if nothing survives. Idempotent.
pub fn sanitize(input: &str) -> String {
    let filtered: String = input.chars().filter(|c| is_allowed(*c)).collect();
    let trimmed = filtered.trim();
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

fn is_allowed(c: char) -> bool {
    matches!(c,
        '0'..='9'
        | 'a'..='z'
        | 'A'..='Z'
        | ' ' | '_' | '-'
        // Hangul syllables
        | '\u{AC00}'..='\u{D7A3}'
        // Hangul jamo
        | '\u{1100}'..='\u{11FF}'
        | '\u{3130}'..='\u{318F}'
    )
}
