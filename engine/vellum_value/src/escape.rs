//! HTML escaping for variable output.

/// Escape the five HTML-significant characters.
///
/// The renderer applies this to non-safe string output when autoescaping
/// is enabled; values already flagged safe pass through untouched.
pub fn html_escape(input: &str) -> String {
    // Fast path: most output contains nothing to escape.
    if !input
        .bytes()
        .any(|b| matches!(b, b'&' | b'<' | b'>' | b'"' | b'\''))
    {
        return input.to_owned();
    }
    let mut out = String::with_capacity(input.len() + 8);
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn escapes_all_significant_characters() {
        assert_eq!(
            html_escape(r#"<a href="x">&'"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#x27;"
        );
    }

    #[test]
    fn clean_input_is_unchanged() {
        assert_eq!(html_escape("nothing special"), "nothing special");
    }
}
