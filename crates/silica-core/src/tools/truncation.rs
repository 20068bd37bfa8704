//! Tool-output truncation.
//!
//! Whatever a handler produces, the model sees at most `MAX_TOOL_OUTPUT`
//! characters, tail-biased because the end of EDA output carries the verdict.

pub const MAX_TOOL_OUTPUT: usize = 30_000;

/// Keep the tail of `text`, marking the cut point.
pub fn truncate_for_model(text: &str) -> String {
    if text.len() <= MAX_TOOL_OUTPUT {
        return text.to_string();
    }
    let mut start = text.len() - MAX_TOOL_OUTPUT;
    while start < text.len() && !text.is_char_boundary(start) {
        start += 1;
    }
    // Prefer resuming at a line boundary.
    let start = text[start..]
        .find('\n')
        .map(|pos| start + pos + 1)
        .unwrap_or(start);
    format!(
        "[... output truncated, showing last {} of {} bytes ...]\n{}",
        text.len() - start,
        text.len(),
        &text[start..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_output_untouched() {
        assert_eq!(truncate_for_model("hello"), "hello");
    }

    #[test]
    fn long_output_keeps_tail_with_marker() {
        let mut text = "x\n".repeat(MAX_TOOL_OUTPUT);
        text.push_str("the verdict line");
        let out = truncate_for_model(&text);
        assert!(out.starts_with("[... output truncated"));
        assert!(out.ends_with("the verdict line"));
        assert!(out.len() < text.len());
    }
}
