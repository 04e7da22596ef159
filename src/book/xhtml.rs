//! XHTML content documents.

use crate::util::escape_xml;

/// Shared stylesheet every content document links to.
pub const STYLESHEET_HREF: &str = "stylesheet.css";

pub const STYLESHEET: &str = "\
body { margin: 0; padding: 0; }
div.body { margin: 0 1em; }
p { text-indent: 1.5em; margin: 0 0 0.3em 0; text-align: justify; }
img.leaf { display: block; max-width: 100%; max-height: 100%; margin: 0 auto; }
";

const GENERATOR: &str = concat!("leafpress ", env!("CARGO_PKG_VERSION"));

/// Wrap body markup in a complete XHTML document.
///
/// `body` is inserted verbatim inside `<div class="body">`; callers escape.
pub fn document(title: &str, body: &str) -> String {
    let mut html = String::new();
    html.push_str(
        r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.1//EN" "http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd">
<html xmlns="http://www.w3.org/1999/xhtml">
  <head>
"#,
    );
    html.push_str(&format!("    <title>{}</title>\n", escape_xml(title)));
    html.push_str(&format!(
        "    <meta name=\"generator\" content=\"{GENERATOR}\"/>\n"
    ));
    html.push_str(&format!(
        "    <link rel=\"stylesheet\" href=\"{STYLESHEET_HREF}\" type=\"text/css\"/>\n"
    ));
    html.push_str(
        "    <meta http-equiv=\"Content-Type\" content=\"application/xhtml+xml; charset=utf-8\"/>\n",
    );
    html.push_str("  </head>\n  <body>\n    <div class=\"body\">\n");
    html.push_str(body);
    html.push_str("    </div>\n  </body>\n</html>\n");
    html
}

/// A document holding paragraphs of plain text.
pub fn paragraphs_document<S: AsRef<str>>(title: &str, paragraphs: &[S]) -> String {
    let mut body = String::new();
    for paragraph in paragraphs {
        body.push_str(&format!(
            "      <p>{}</p>\n",
            escape_xml(paragraph.as_ref())
        ));
    }
    document(title, &body)
}

/// A document showing one page image.
pub fn image_document(title: &str, src: &str, alt: &str) -> String {
    let body = format!(
        "      <img class=\"leaf\" src=\"{}\" alt=\"{}\"/>\n",
        escape_xml(src),
        escape_xml(alt)
    );
    document(title, &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraphs_escaped_in_order() {
        let doc = paragraphs_document("Book", &["first <one>", "second & last"]);
        let first = doc.find("<p>first &lt;one&gt;</p>").unwrap();
        let second = doc.find("<p>second &amp; last</p>").unwrap();
        assert!(first < second);
        assert!(doc.contains("<title>Book</title>"));
        assert!(doc.contains("href=\"stylesheet.css\""));
    }

    #[test]
    fn test_image_document() {
        let doc = image_document("leaf 0003", "images/leaf0003.jpg", "leaf 3");
        assert!(doc.contains("<img class=\"leaf\" src=\"images/leaf0003.jpg\" alt=\"leaf 3\"/>"));
        assert!(doc.contains("<div class=\"body\">"));
    }
}
