//! Free-text sanitation for ledger writes.
//!
//! The ledger call has no notion of these fields' original encoding or
//! length, so validity decisions are string operations made here, before
//! submission — never on-chain.

/// Max description length accepted by the registration call.
pub const MAX_DESCRIPTION_CHARS: usize = 100;

/// Strip control characters, keeping tab/newline/carriage-return.
pub fn sanitize_text(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

/// Clamp a description to the ledger-accepted length, on a char boundary.
pub fn clamp_description(s: &str) -> String {
    s.chars().take(MAX_DESCRIPTION_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_characters_are_stripped() {
        assert_eq!(sanitize_text("dry\u{0} cold\u{7} storage"), "dry cold storage");
        assert_eq!(sanitize_text("line1\nline2\tend\r"), "line1\nline2\tend\r");
        assert_eq!(sanitize_text("\u{1b}[31mred\u{1b}[0m"), "[31mred[0m");
    }

    #[test]
    fn description_clamped_to_limit() {
        let long = "x".repeat(250);
        assert_eq!(clamp_description(&long).chars().count(), MAX_DESCRIPTION_CHARS);
        assert_eq!(clamp_description("short"), "short");
    }

    #[test]
    fn clamp_respects_multibyte_boundaries() {
        let s = "kho hàng ở Hà Nội ".repeat(10);
        let clamped = clamp_description(&s);
        assert!(clamped.chars().count() <= MAX_DESCRIPTION_CHARS);
        assert!(s.starts_with(&clamped));
    }
}
