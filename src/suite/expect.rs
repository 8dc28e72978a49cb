//! Matching snippet output against expected patterns.

use regex::Regex;

use crate::suite::{ResultCode, TestFailure};

/// Standard output lines followed by standard error lines.
#[must_use]
pub fn output_lines(stdout: &str, stderr: &str) -> Vec<String> {
    stdout
        .split('\n')
        .chain(stderr.split('\n'))
        .map(str::to_owned)
        .collect()
}

/// A pattern that does not compile as a regex is matched as literal text.
enum Matcher<'a> {
    Regex(Regex),
    Literal(&'a str),
}

impl<'a> Matcher<'a> {
    fn new(pattern: &'a str) -> Self {
        Regex::new(pattern).map_or(Matcher::Literal(pattern), Matcher::Regex)
    }

    fn is_match(&self, line: &str) -> bool {
        match self {
            Matcher::Regex(re) => re.is_match(line),
            Matcher::Literal(text) => line.contains(text),
        }
    }
}

/// Check that every pattern matches a line, in order.
///
/// Each pattern is searched from the line after the previous match. A
/// pattern found only earlier than that is an `ERR_ORDER`; a pattern found
/// nowhere is an `ERR_ASSERTION`.
///
/// # Errors
///
/// The first failing pattern, as described above.
pub fn check(lines: &[String], expected: &[String]) -> Result<(), TestFailure> {
    let mut next = 0;
    let mut previous: Option<&str> = None;

    for pattern in expected {
        let re = Matcher::new(pattern);

        if let Some(found) = lines[next.min(lines.len())..]
            .iter()
            .position(|line| re.is_match(line))
        {
            next += found + 1;
            previous = Some(pattern);
            continue;
        }

        let actual = serde_json::to_value(lines).unwrap_or_default();
        if let Some(previous) = previous {
            if lines[..next].iter().any(|line| re.is_match(line)) {
                return Err(
                    TestFailure::new(ResultCode::ErrOrder, actual).with_order(previous, pattern)
                );
            }
        }
        return Err(TestFailure::new(ResultCode::ErrAssertion, actual).with_expected(pattern));
    }
    Ok(())
}
