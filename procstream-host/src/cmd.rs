//! Argument string splitting for process invocations.

use crate::error::HostError;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

/// Splits a single argument string into an argument vector.
///
/// Words are separated by unquoted whitespace. Single quotes group text
/// literally; double quotes group text and honour `\"` and `\\`. Outside of
/// quotes a backslash escapes the next character. An empty pair of quotes
/// yields an empty argument.
///
/// # Errors
///
/// Returns `HostError::InvalidArguments` for an unterminated quote or a
/// trailing backslash.
pub fn split_args(args: &str) -> Result<Vec<String>, HostError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote = Quote::None;
    let mut chars = args.chars();

    while let Some(c) = chars.next() {
        match quote {
            Quote::Single => {
                if c == '\'' {
                    quote = Quote::None;
                } else {
                    current.push(c);
                }
            }
            Quote::Double => match c {
                '"' => quote = Quote::None,
                '\\' => match chars.next() {
                    Some(next @ ('"' | '\\')) => current.push(next),
                    Some(next) => {
                        current.push('\\');
                        current.push(next);
                    }
                    None => {
                        return Err(HostError::InvalidArguments(format!(
                            "unterminated double quote in `{args}`"
                        )))
                    }
                },
                _ => current.push(c),
            },
            Quote::None => match c {
                '\'' => {
                    quote = Quote::Single;
                    in_word = true;
                }
                '"' => {
                    quote = Quote::Double;
                    in_word = true;
                }
                '\\' => {
                    let next = chars.next().ok_or_else(|| {
                        HostError::InvalidArguments(format!("trailing backslash in `{args}`"))
                    })?;
                    current.push(next);
                    in_word = true;
                }
                c if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                c => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }

    match quote {
        Quote::None => {}
        Quote::Single => {
            return Err(HostError::InvalidArguments(format!(
                "unterminated single quote in `{args}`"
            )))
        }
        Quote::Double => {
            return Err(HostError::InvalidArguments(format!(
                "unterminated double quote in `{args}`"
            )))
        }
    }

    if in_word {
        words.push(current);
    }

    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(args: &str) -> Vec<String> {
        split_args(args).expect("valid argument string")
    }

    #[test]
    fn test_empty_string_has_no_args() {
        assert!(split("").is_empty());
        assert!(split("   \t ").is_empty());
    }

    #[test]
    fn test_whitespace_separates_words() {
        assert_eq!(split("-a  --flag\tvalue"), vec!["-a", "--flag", "value"]);
    }

    #[test]
    fn test_single_quotes_are_literal() {
        assert_eq!(
            split(r#"-c 'echo "hi" \n; exit 1'"#),
            vec!["-c", r#"echo "hi" \n; exit 1"#]
        );
    }

    #[test]
    fn test_double_quotes_with_escapes() {
        assert_eq!(
            split(r#"--msg "say \"hi\" \\ now" \d"#),
            vec!["--msg", r#"say "hi" \ now"#, "d"]
        );
    }

    #[test]
    fn test_adjacent_quoted_parts_join() {
        assert_eq!(split(r#"a'b c'"d e"f"#), vec!["ab cd ef"]);
    }

    #[test]
    fn test_empty_quotes_yield_empty_arg() {
        let args = split(r#"--tools "" x"#);
        assert!(
            args.windows(2).any(|w| w[0] == "--tools" && w[1].is_empty()),
            "Expected '--tools \"\"' but got: {args:?}"
        );
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn test_unterminated_quote_is_rejected() {
        assert!(matches!(
            split_args("'open"),
            Err(HostError::InvalidArguments(_))
        ));
        assert!(matches!(
            split_args("\"open"),
            Err(HostError::InvalidArguments(_))
        ));
        assert!(matches!(
            split_args("dangling\\"),
            Err(HostError::InvalidArguments(_))
        ));
    }
}
