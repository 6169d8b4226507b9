//! Tail-biased output truncation for execution results.
//!
//! Sandboxed runs can emit unbounded output. The tail is kept because
//! errors appear last. Truncation respects line boundaries except when a
//! single line alone exceeds the cap.

#[derive(Debug)]
pub struct TruncateResult {
    pub output: String,
    pub was_truncated: bool,
    pub total_bytes: usize,
}

/// Truncate keeping the TAIL (end) of output, at most `max_bytes` bytes.
pub fn truncate_tail(input: &str, max_bytes: usize) -> TruncateResult {
    let total_bytes = input.len();

    if total_bytes <= max_bytes {
        return TruncateResult {
            output: input.to_owned(),
            was_truncated: false,
            total_bytes,
        };
    }

    let lines: Vec<&str> = input.lines().collect();
    let mut byte_count = 0;
    let mut kept = 0;

    for line in lines.iter().rev() {
        let line_bytes = line.len() + 1; // +1 for newline
        if byte_count + line_bytes > max_bytes {
            break;
        }
        byte_count += line_bytes;
        kept += 1;
    }

    if kept == 0 {
        // A single line exceeds the cap; slice it on a char boundary.
        let start = input.ceil_char_boundary(total_bytes - max_bytes);
        return TruncateResult {
            output: input[start..].to_owned(),
            was_truncated: true,
            total_bytes,
        };
    }

    TruncateResult {
        output: lines[lines.len() - kept..].join("\n"),
        was_truncated: true,
        total_bytes,
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_output_passes_through() {
        let result = truncate_tail("hello\nworld", 100);
        assert!(!result.was_truncated);
        assert_eq!(result.output, "hello\nworld");
        assert_eq!(result.total_bytes, 11);
    }

    #[test]
    fn keeps_tail_lines() {
        let input = "first\nsecond\nthird\nfourth";
        let result = truncate_tail(input, 13);
        assert!(result.was_truncated);
        assert_eq!(result.output, "third\nfourth");
    }

    #[test]
    fn never_breaks_mid_line_when_lines_fit() {
        let input = "aaaa\nbbbb\ncccc";
        let result = truncate_tail(input, 11);
        // 11 bytes fit "bbbb\ncccc" (10) but not all three lines.
        assert!(result.was_truncated);
        assert_eq!(result.output, "bbbb\ncccc");
    }

    #[test]
    fn oversized_single_line_is_sliced_on_char_boundary() {
        // Each '🦀' is 4 bytes; a cap of 10 cannot hold whole lines.
        let input = "🦀".repeat(100);
        let result = truncate_tail(&input, 10);
        assert!(result.was_truncated);
        assert!(result.output.len() <= 10);
        assert!(result.output.chars().all(|c| c == '🦀'));
    }

    #[test]
    fn exact_fit_is_not_truncated() {
        let input = "12345";
        let result = truncate_tail(input, 5);
        assert!(!result.was_truncated);
        assert_eq!(result.output, "12345");
    }
}
