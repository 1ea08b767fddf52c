//! XML escaping and scanning helpers for metadata documents.
//!
//! The documents this crate reads are the ones it (or createrepo) writes,
//! so parsing scans for known elements and attributes rather than running
//! a full XML parser.

/// Escape a string for use as XML element text.
pub fn escape_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Escape a string for use as an XML attribute value.
pub fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Unescape XML entities back into plain text.
pub fn unescape(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find('&') {
        result.push_str(&rest[..pos]);
        rest = &rest[pos..];
        if let Some(semi) = rest.find(';') {
            match &rest[..=semi] {
                "&amp;" => result.push('&'),
                "&lt;" => result.push('<'),
                "&gt;" => result.push('>'),
                "&quot;" => result.push('"'),
                "&apos;" => result.push('\''),
                entity => result.push_str(entity),
            }
            rest = &rest[semi + 1..];
        } else {
            result.push_str(rest);
            rest = "";
        }
    }
    result.push_str(rest);
    result
}

/// The name-and-attributes text of the first `<element ...` occurrence,
/// up to but not including the closing `>`.
pub(crate) fn tag_body<'a>(content: &'a str, element: &str) -> Option<&'a str> {
    let open = format!("<{} ", element);
    let start = content.find(&open)?;
    let end = content[start..].find('>')?;
    Some(&content[start..start + end])
}

/// The text content of the first `<element ...>text</element>` occurrence,
/// entities unescaped.
pub(crate) fn element_text(content: &str, element: &str) -> Option<String> {
    for open in [format!("<{}>", element), format!("<{} ", element)] {
        if let Some(start) = content.find(&open) {
            let text_start = start + content[start..].find('>')? + 1;
            let close = format!("</{}>", element);
            let text_end = text_start + content[text_start..].find(&close)?;
            return Some(unescape(&content[text_start..text_end]));
        }
    }
    None
}

/// The value of `attr="..."` within a tag's text, entities unescaped.
pub(crate) fn attr_value(tag: &str, attr: &str) -> Option<String> {
    let needle = format!("{}=\"", attr);
    let start = tag.find(&needle)? + needle.len();
    let end = tag[start..].find('"')?;
    Some(unescape(&tag[start..start + end]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("a < b & c > d"), "a &lt; b &amp; c &gt; d");
        assert_eq!(escape_text("plain"), "plain");
    }

    #[test]
    fn test_escape_attr() {
        assert_eq!(escape_attr(r#"say "hi""#), "say &quot;hi&quot;");
        assert_eq!(escape_attr("it's"), "it&apos;s");
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("a &lt; b &amp; c &gt; d"), "a < b & c > d");
        assert_eq!(unescape("say &quot;hi&quot;"), r#"say "hi""#);
        assert_eq!(unescape("no entities"), "no entities");
    }

    #[test]
    fn test_escape_unescape_roundtrip() {
        let original = r#"<rpm user="root"> & 'friends'"#;
        assert_eq!(unescape(&escape_attr(original)), original);
    }

    #[test]
    fn test_tag_body() {
        let content = r#"<a><version epoch="0" ver="1.2"/></a>"#;
        assert_eq!(tag_body(content, "version"), Some(r#"<version epoch="0" ver="1.2"/"#));
        assert_eq!(tag_body(content, "missing"), None);
    }

    #[test]
    fn test_element_text() {
        assert_eq!(element_text("<x><name>abc</name></x>", "name"), Some("abc".to_string()));
        assert_eq!(
            element_text(r#"<checksum type="sha256">ff</checksum>"#, "checksum"),
            Some("ff".to_string())
        );
        assert_eq!(element_text("<x/>", "name"), None);
    }

    #[test]
    fn test_attr_value() {
        let tag = r#"<package pkgid="abc" name="t &amp; u""#;
        assert_eq!(attr_value(tag, "pkgid"), Some("abc".to_string()));
        assert_eq!(attr_value(tag, "name"), Some("t & u".to_string()));
        assert_eq!(attr_value(tag, "arch"), None);
    }
}
