//! HTML-to-text extraction.
//!
//! Strips tags with a small state machine, decodes common entities,
//! drops script/style bodies, and collapses whitespace. Title and
//! published-time metadata are pulled before stripping.

use regex_lite::Regex;

/// Strip HTML down to readable text. `with_images` keeps `alt` text as
/// `[alt]` markers.
pub fn strip_html(html: &str, with_images: bool) -> String {
    let html = drop_invisible_elements(html);

    let mut result = String::with_capacity(html.len() / 2);
    let mut in_tag = false;
    let mut tag = String::new();
    let mut chars = html.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '<' {
            in_tag = true;
            tag.clear();
        } else if c == '>' && in_tag {
            in_tag = false;
            if with_images && tag.trim_start().to_lowercase().starts_with("img") {
                if let Some(alt) = attr_value(&tag, "alt") {
                    if !alt.is_empty() {
                        result.push_str(&format!("[{alt}]"));
                    }
                }
            }
            // Separate words across tag boundaries.
            result.push(' ');
        } else if in_tag {
            tag.push(c);
        } else {
            result.push(c);
        }
    }

    collapse_whitespace(&decode_entities(&result))
}

/// Remove script, style, and noscript elements wholesale.
fn drop_invisible_elements(html: &str) -> String {
    let mut out = html.to_string();
    for element in ["script", "style", "noscript"] {
        let re = Regex::new(&format!(r"(?is)<{element}[^>]*>.*?</{element}>")).expect("static regex");
        out = re.replace_all(&out, " ").into_owned();
    }
    out
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn collapse_whitespace(s: &str) -> String {
    let re = Regex::new(r"\s+").expect("static regex");
    re.replace_all(s, " ").trim().to_string()
}

fn attr_value(tag: &str, name: &str) -> Option<String> {
    let re = Regex::new(&format!(r#"(?i){name}\s*=\s*"([^"]*)""#)).ok()?;
    re.captures(tag).map(|c| c[1].to_string())
}

/// The document `<title>`, entity-decoded.
pub fn extract_title(html: &str) -> Option<String> {
    let re = Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static regex");
    re.captures(html)
        .map(|c| collapse_whitespace(&decode_entities(&c[1])))
        .filter(|t| !t.is_empty())
}

/// Publication time from common meta tags.
pub fn extract_published(html: &str) -> Option<String> {
    for property in ["article:published_time", "datePublished", "date"] {
        let re = Regex::new(&format!(
            r#"(?is)<meta[^>]+(?:property|name)\s*=\s*"{property}"[^>]+content\s*=\s*"([^"]+)""#
        ))
        .expect("static regex");
        if let Some(c) = re.captures(html) {
            return Some(c[1].to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_collapses_whitespace() {
        let html = "<html><body><h1>Hello</h1>\n\n<p>world   of <b>Rust</b></p></body></html>";
        assert_eq!(strip_html(html, false), "Hello world of Rust");
    }

    #[test]
    fn drops_script_and_style_bodies() {
        let html = "<p>visible</p><script>var hidden = '<p>nope</p>';</script><style>p{}</style>";
        let text = strip_html(html, false);
        assert_eq!(text, "visible");
    }

    #[test]
    fn decodes_entities() {
        let html = "<p>Klabnik &amp; Nichols &mdash; &quot;the book&quot;</p>";
        let text = strip_html(html, false);
        assert!(text.contains("Klabnik & Nichols"));
        assert!(text.contains("\"the book\""));
    }

    #[test]
    fn image_alt_text_kept_when_requested() {
        let html = r#"<p>before</p><img src="x.png" alt="a chart of releases"><p>after</p>"#;
        assert!(strip_html(html, true).contains("[a chart of releases]"));
        assert!(!strip_html(html, false).contains("a chart of releases"));
    }

    #[test]
    fn title_extraction() {
        let html = "<head><title>The Rust Book &amp; friends</title></head>";
        assert_eq!(extract_title(html).as_deref(), Some("The Rust Book & friends"));
        assert!(extract_title("<p>no title</p>").is_none());
    }

    #[test]
    fn published_time_from_meta() {
        let html = r#"<meta property="article:published_time" content="2024-06-01T10:00:00Z">"#;
        assert_eq!(extract_published(html).as_deref(), Some("2024-06-01T10:00:00Z"));
    }
}
