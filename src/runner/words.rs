//! Shell-word splitting for command strings.
//!
//! Whitespace separates words; single quotes are literal; double quotes
//! allow `\"` and `\\`; a backslash outside quotes escapes the next
//! character. No expansion of any kind is performed.

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SplitError {
    #[error("unterminated quote in command: {0:?}")]
    UnterminatedQuote(String),
    #[error("trailing backslash in command: {0:?}")]
    TrailingEscape(String),
}

pub fn split(line: &str) -> Result<Vec<String>, SplitError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some('\'') => {
                if c == '\'' {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            Some('"') => match c {
                '"' => quote = None,
                '\\' => match chars.next() {
                    Some(e @ ('"' | '\\')) => current.push(e),
                    Some(e) => {
                        current.push('\\');
                        current.push(e);
                    }
                    None => return Err(SplitError::TrailingEscape(line.to_string())),
                },
                _ => current.push(c),
            },
            _ => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    in_word = true;
                }
                '\\' => match chars.next() {
                    Some(e) => {
                        current.push(e);
                        in_word = true;
                    }
                    None => return Err(SplitError::TrailingEscape(line.to_string())),
                },
                c if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                _ => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }

    if quote.is_some() {
        return Err(SplitError::UnterminatedQuote(line.to_string()));
    }
    if in_word {
        words.push(current);
    }

    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain_words() {
        assert_eq!(
            split("echo hello world").unwrap(),
            vec!["echo", "hello", "world"]
        );
    }

    #[test]
    fn test_split_collapses_whitespace() {
        assert_eq!(split("  ls   -la  ").unwrap(), vec!["ls", "-la"]);
    }

    #[test]
    fn test_split_single_quotes_are_literal() {
        assert_eq!(
            split(r#"echo 'two words' 'a "b"'"#).unwrap(),
            vec!["echo", "two words", r#"a "b""#]
        );
    }

    #[test]
    fn test_split_double_quotes_with_escapes() {
        assert_eq!(
            split(r#"echo "say \"hi\" now""#).unwrap(),
            vec!["echo", r#"say "hi" now"#]
        );
    }

    #[test]
    fn test_split_backslash_outside_quotes() {
        assert_eq!(split(r"echo a\ b").unwrap(), vec!["echo", "a b"]);
    }

    #[test]
    fn test_split_empty_quoted_word() {
        assert_eq!(split(r#"echo """#).unwrap(), vec!["echo", ""]);
    }

    #[test]
    fn test_split_unterminated_quote() {
        assert_eq!(
            split("echo 'oops"),
            Err(SplitError::UnterminatedQuote("echo 'oops".to_string()))
        );
    }

    #[test]
    fn test_split_trailing_backslash() {
        assert!(matches!(
            split("echo oops\\"),
            Err(SplitError::TrailingEscape(_))
        ));
    }

    #[test]
    fn test_split_empty_line() {
        assert_eq!(split("").unwrap(), Vec::<String>::new());
        assert_eq!(split("   ").unwrap(), Vec::<String>::new());
    }
}
