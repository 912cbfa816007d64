//! Transcript text normalization shared by transcription and translation.

use once_cell::sync::Lazy;
use regex::Regex;

static PARA_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());
static SPACE_COLLAPSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Normalise whitespace and paragraph spacing for readability.
///
/// Blank-line separated blocks survive as paragraphs; everything inside a
/// block collapses onto one line with single spaces.
pub fn format_structured_text(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let mut paragraphs = Vec::new();
    for block in PARA_SPLIT.split(trimmed) {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }
        let mut lines = Vec::new();
        for line in block.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let collapsed = SPACE_COLLAPSE.replace_all(line, " ");
            lines.push(collapsed);
        }
        if lines.is_empty() {
            continue;
        }
        paragraphs.push(lines.join(" "));
    }

    paragraphs.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert_eq!(format_structured_text(""), "");
        assert_eq!(format_structured_text("   \n  \n"), "");
    }

    #[test]
    fn test_collapses_inner_whitespace() {
        assert_eq!(
            format_structured_text("hello   world\nsecond  line"),
            "hello world second line"
        );
    }

    #[test]
    fn test_preserves_paragraph_breaks() {
        let input = "first paragraph\nstill first\n\n  second   paragraph  ";
        assert_eq!(
            format_structured_text(input),
            "first paragraph still first\n\nsecond paragraph"
        );
    }
}
