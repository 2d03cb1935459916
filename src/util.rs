/// Keeps alphanumerics, spaces, `-` and `_`, then turns spaces into underscores.
///
/// `"06/2025"` becomes `"062025"`, `"High Master"` becomes `"High_Master"`.
#[must_use]
pub fn file_component(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim()
        .replace(' ', "_")
}

/// Trimmed, non-empty text pieces of a DOM fragment, in document order.
pub fn text_tokens<'a, I>(texts: I) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    texts
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_component_strips_separators() {
        assert_eq!(file_component("06/2025"), "062025");
        assert_eq!(file_component(" High Master "), "High_Master");
        assert_eq!(file_component("a.k.i."), "aki");
    }

    #[test]
    fn tokens_drop_blank_pieces() {
        let pieces = ["\n  3 ", "", "KEN", "  ", "5.855", "%"];
        assert_eq!(text_tokens(pieces), ["3", "KEN", "5.855", "%"]);
    }
}
