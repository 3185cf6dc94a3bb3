/// Escape text for inclusion in an HTML body
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<p a=\"b\">Tom & 'Jerry'</p>"),
            "&lt;p a=&quot;b&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/p&gt;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }
}
