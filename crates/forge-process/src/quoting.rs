// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

/// Quotes a single argument following the `CommandLineToArgvW` convention
/// used by MSVC-built programs (and `std::process::Command` internally) to
/// parse a Windows command line back into an argv vector: a run of
/// backslashes is doubled only when it precedes a `"`, and a literal `"`
/// is itself escaped as `\"`.
///
/// `std::process::Command` already does this for arguments passed through
/// [`Command::arg`](crate::Command::arg); this is exposed for callers who
/// assemble a raw command-line string by hand instead of going through
/// `CreateProcess`'s own argv construction.
pub fn quote_windows_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t', '"']) {
        return arg.to_string();
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    let mut backslashes = 0usize;
    for ch in arg.chars() {
        match ch {
            '\\' => backslashes += 1,
            '"' => {
                quoted.extend(std::iter::repeat('\\').take(backslashes * 2 + 1));
                quoted.push('"');
                backslashes = 0;
            }
            _ => {
                quoted.extend(std::iter::repeat('\\').take(backslashes));
                quoted.push(ch);
                backslashes = 0;
            }
        }
    }
    // Trailing backslashes must be doubled since they immediately precede
    // the closing quote we're about to append.
    quoted.extend(std::iter::repeat('\\').take(backslashes * 2));
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::quote_windows_arg;

    #[test]
    fn plain_argument_is_left_unquoted() {
        assert_eq!(quote_windows_arg("hello"), "hello");
    }

    #[test]
    fn argument_with_space_is_quoted() {
        assert_eq!(quote_windows_arg("hello world"), "\"hello world\"");
    }

    #[test]
    fn embedded_quote_is_escaped() {
        assert_eq!(quote_windows_arg("say \"hi\""), "\"say \\\"hi\\\"\"");
    }

    #[test]
    fn backslashes_before_quote_are_doubled() {
        assert_eq!(quote_windows_arg("a\\\"b"), "\"a\\\\\\\"b\"");
    }

    #[test]
    fn trailing_backslashes_are_doubled() {
        assert_eq!(quote_windows_arg("path\\"), "path\\");
        assert_eq!(quote_windows_arg("path with space\\"), "\"path with space\\\\\"");
    }

    #[test]
    fn empty_argument_is_quoted() {
        assert_eq!(quote_windows_arg(""), "\"\"");
    }
}
