use anyhow::{Result, anyhow};

/// Split a single command-line string into tokens, honoring shell-style
/// quoting.
///
/// This is the explicit home for "I have one pre-joined string" callers:
/// [`crate::ArgsBuilder::add`] deliberately accepts only pre-split tokens, so
/// the quote-aware tokenizing lives here, where it can be tested on its own.
///
/// Errors on unbalanced quotes or a trailing backslash, since silently
/// guessing a token boundary there would change the command being built.
pub fn split_tokens(line: &str) -> Result<Vec<String>> {
    shlex::split(line).ok_or_else(|| anyhow!("unbalanced quoting in command line: {line:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_whitespace() {
        let tokens = split_tokens("convert -resize 100x75! out.png").unwrap();
        assert_eq!(tokens, vec!["convert", "-resize", "100x75!", "out.png"]);
    }

    #[test]
    fn quoted_spans_stay_one_token() {
        let tokens = split_tokens("convert -label 'my picture' out.png").unwrap();
        assert_eq!(tokens, vec!["convert", "-label", "my picture", "out.png"]);

        let tokens = split_tokens(r#"convert -label "my picture" out.png"#).unwrap();
        assert_eq!(tokens[2], "my picture");
    }

    #[test]
    fn escaped_quote_inside_double_quotes() {
        let tokens = split_tokens(r#"echo "she said \"hi\"""#).unwrap();
        assert_eq!(tokens, vec!["echo", r#"she said "hi""#]);
    }

    #[test]
    fn empty_line_yields_no_tokens() {
        assert!(split_tokens("").unwrap().is_empty());
        assert!(split_tokens("   ").unwrap().is_empty());
    }

    #[test]
    fn unbalanced_quote_is_an_error() {
        let err = split_tokens("convert 'oops").unwrap_err();
        assert!(err.to_string().contains("unbalanced"));
    }
}
