//! The "anchored wrapper" pattern for preserving a `line_number:` prefix
//! across a chain of substring-engine stages.
//!
//! A pipeline stage that reads the first `N:content` form off stdin must
//! match its pattern against `content` only, while re-emitting the same
//! `N:` prefix untouched. Encapsulating that split/rejoin here means no
//! layer or engine implementation needs to special-case the prefix.

/// Splits a wire-format line `"<line_number>:<content>"` into its parts.
/// Returns `None` if the line has no parseable leading line number.
pub fn split_prefixed(line: &str) -> Option<(u64, &str)> {
    let (num, rest) = line.split_once(':')?;
    let n: u64 = num.parse().ok()?;
    Some((n, rest))
}

/// Reassembles a wire-format line from a line number and content.
pub fn join_prefixed(line_number: u64, content: &str) -> String {
    let mut s = String::with_capacity(content.len() + 12);
    s.push_str(&line_number.to_string());
    s.push(':');
    s.push_str(content);
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_prefix() {
        let wrapped = join_prefixed(42, "hello world");
        assert_eq!(split_prefixed(&wrapped), Some((42, "hello world")));
    }

    #[test]
    fn rejects_missing_prefix() {
        assert_eq!(split_prefixed("no colon here"), None);
    }

    #[test]
    fn content_may_contain_colons() {
        let wrapped = join_prefixed(7, "12:34:56 connected");
        assert_eq!(split_prefixed(&wrapped), Some((7, "12:34:56 connected")));
    }
}
