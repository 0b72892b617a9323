//! HTML pretty printer.
//!
//! Reformats rendered markup with stable two-space indentation: one element
//! per line, text-only elements inlined, `pre`/`script`/`style`/`textarea`
//! content untouched. Works on the raw event stream, so attributes, entities
//! and comments pass through byte-for-byte.
//!
//! Returns an error for markup the parser cannot digest; the caller writes
//! the unformatted render in that case.

use anyhow::{Result, bail};
use quick_xml::{Reader, events::Event};

const INDENT: &str = "  ";

/// Elements that never take content and never produce an end tag
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose content is whitespace-sensitive and must not be reflowed
const PRESERVE_ELEMENTS: &[&str] = &["pre", "script", "style", "textarea"];

fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag.to_ascii_lowercase().as_str())
}

fn is_preserved(tag: &str) -> bool {
    PRESERVE_ELEMENTS.contains(&tag.to_ascii_lowercase().as_str())
}

// ============================================================================
// Tokenization
// ============================================================================

/// Flat markup token with the original byte content kept verbatim.
#[derive(Debug)]
enum Tok {
    DocType(String),
    /// `raw` is the tag name plus raw attributes, without angle brackets
    Open {
        tag: String,
        raw: String,
    },
    /// Self-closing form (`<x/>`), same raw content as `Open`
    Empty {
        tag: String,
        raw: String,
    },
    Close(String),
    Text(String),
    Comment(String),
    /// Declarations, processing instructions, CDATA - passed through
    Raw(String),
}

fn tokenize(html: &str) -> Result<Vec<Tok>> {
    let mut reader = Reader::from_str(html);
    reader.config_mut().enable_all_checks(false);

    let mut toks = Vec::new();
    let mut text = String::new();

    macro_rules! flush_text {
        () => {
            if !text.is_empty() {
                toks.push(Tok::Text(std::mem::take(&mut text)));
            }
        };
    }

    loop {
        match reader.read_event() {
            Ok(Event::Text(t)) => text.push_str(&String::from_utf8_lossy(&t)),
            Ok(Event::GeneralRef(r)) => {
                text.push('&');
                text.push_str(&String::from_utf8_lossy(&r));
                text.push(';');
            }
            Ok(event) => {
                flush_text!();
                match event {
                    Event::Start(e) => toks.push(Tok::Open {
                        tag: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                        raw: String::from_utf8_lossy(&e).into_owned(),
                    }),
                    Event::Empty(e) => toks.push(Tok::Empty {
                        tag: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                        raw: String::from_utf8_lossy(&e).into_owned(),
                    }),
                    Event::End(e) => {
                        toks.push(Tok::Close(String::from_utf8_lossy(e.name().as_ref()).into_owned()));
                    }
                    Event::DocType(t) => {
                        toks.push(Tok::DocType(String::from_utf8_lossy(&t).into_owned()));
                    }
                    Event::Comment(t) => {
                        toks.push(Tok::Comment(String::from_utf8_lossy(&t).into_owned()));
                    }
                    Event::CData(t) => toks.push(Tok::Raw(format!(
                        "<![CDATA[{}]]>",
                        String::from_utf8_lossy(&t)
                    ))),
                    Event::Decl(d) => {
                        toks.push(Tok::Raw(format!("<?{}?>", String::from_utf8_lossy(&d))));
                    }
                    Event::PI(p) => {
                        toks.push(Tok::Raw(format!("<?{}?>", String::from_utf8_lossy(&p))));
                    }
                    Event::Eof => break,
                    Event::Text(_) | Event::GeneralRef(_) => unreachable!(),
                }
            }
            Err(e) => bail!("markup parse error at position {}: {e}", reader.error_position()),
        }
    }
    flush_text!();

    Ok(toks)
}

// ============================================================================
// Rendering
// ============================================================================

/// Pretty-print rendered markup. Errors on unparseable input.
pub fn pretty_print(html: &str) -> Result<String> {
    let toks = tokenize(html)?;

    let mut out = String::with_capacity(html.len() + html.len() / 4);
    let mut depth = 0usize;
    let mut i = 0;

    while i < toks.len() {
        match &toks[i] {
            Tok::DocType(d) => push_line(&mut out, depth, &format!("<!DOCTYPE {d}>")),
            Tok::Comment(c) => push_line(&mut out, depth, &format!("<!--{c}-->")),
            Tok::Raw(r) => push_line(&mut out, depth, r),
            Tok::Text(t) => {
                let collapsed = collapse_whitespace(t);
                if !collapsed.is_empty() {
                    push_line(&mut out, depth, &collapsed);
                }
            }
            Tok::Empty { tag, raw } => {
                if is_void(tag) {
                    push_line(&mut out, depth, &format!("<{raw}>"));
                } else {
                    // HTML has no self-closing syntax for normal elements
                    push_line(&mut out, depth, &format!("<{raw}></{tag}>"));
                }
            }
            Tok::Close(tag) => {
                depth = depth.saturating_sub(1);
                push_line(&mut out, depth, &format!("</{tag}>"));
            }
            Tok::Open { tag, raw } if is_void(tag) => {
                push_line(&mut out, depth, &format!("<{raw}>"));
            }
            Tok::Open { tag, raw } if is_preserved(tag) => {
                i = render_preserved(&mut out, depth, &toks, i, tag, raw);
            }
            Tok::Open { tag, raw } => {
                // Inline elements whose entire content is a single text run
                match (toks.get(i + 1), toks.get(i + 2)) {
                    (Some(Tok::Close(c)), _) if c == tag => {
                        push_line(&mut out, depth, &format!("<{raw}></{tag}>"));
                        i += 2;
                        continue;
                    }
                    (Some(Tok::Text(t)), Some(Tok::Close(c))) if c == tag => {
                        let collapsed = collapse_whitespace(t);
                        push_line(&mut out, depth, &format!("<{raw}>{collapsed}</{tag}>"));
                        i += 3;
                        continue;
                    }
                    _ => {
                        push_line(&mut out, depth, &format!("<{raw}>"));
                        depth += 1;
                    }
                }
            }
        }
        i += 1;
    }

    out.push('\n');
    Ok(out)
}

/// Emit a preserved element (`pre`, `script`, ...) without reflowing its
/// content. Returns the index of the element's closing token.
fn render_preserved(
    out: &mut String,
    depth: usize,
    toks: &[Tok],
    open_idx: usize,
    tag: &str,
    raw: &str,
) -> usize {
    let mut buf = String::new();
    let mut nesting = 1usize;
    let mut i = open_idx + 1;

    while i < toks.len() {
        match &toks[i] {
            Tok::Open { tag: t, raw: r } => {
                if t == tag {
                    nesting += 1;
                }
                buf.push_str(&format!("<{r}>"));
            }
            Tok::Empty { raw: r, .. } => buf.push_str(&format!("<{r}>")),
            Tok::Close(t) => {
                if t == tag {
                    nesting -= 1;
                    if nesting == 0 {
                        break;
                    }
                }
                buf.push_str(&format!("</{t}>"));
            }
            Tok::Text(t) => buf.push_str(t),
            Tok::Comment(c) => buf.push_str(&format!("<!--{c}-->")),
            Tok::DocType(d) => buf.push_str(&format!("<!DOCTYPE {d}>")),
            Tok::Raw(r) => buf.push_str(r),
        }
        i += 1;
    }

    if buf.contains('\n') {
        push_line(out, depth, &format!("<{raw}>"));
        // Content goes through verbatim, indentation and all
        out.push('\n');
        out.push_str(buf.trim_matches('\n'));
        push_line(out, depth, &format!("</{tag}>"));
    } else {
        push_line(out, depth, &format!("<{raw}>{buf}</{tag}>"));
    }

    i
}

fn push_line(out: &mut String, depth: usize, content: &str) {
    if !out.is_empty() {
        out.push('\n');
    }
    for _ in 0..depth {
        out.push_str(INDENT);
    }
    out.push_str(content);
}

/// Collapse runs of whitespace into single spaces and trim the edges.
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_elements_indented() {
        let html = "<html><body><div><p>hi</p></div></body></html>";
        let pretty = pretty_print(html).unwrap();

        assert_eq!(
            pretty,
            "<html>\n  <body>\n    <div>\n      <p>hi</p>\n    </div>\n  </body>\n</html>\n"
        );
    }

    #[test]
    fn test_text_only_element_inlined() {
        let html = "<head><title>Demo</title></head>";
        let pretty = pretty_print(html).unwrap();

        assert!(pretty.contains("  <title>Demo</title>\n"));
    }

    #[test]
    fn test_doctype_on_own_line() {
        let html = "<!DOCTYPE html><html><body></body></html>";
        let pretty = pretty_print(html).unwrap();

        assert!(pretty.starts_with("<!DOCTYPE html>\n<html>"));
    }

    #[test]
    fn test_void_elements_do_not_nest() {
        let html = "<div><br><img src=\"a.png\"><p>after</p></div>";
        let pretty = pretty_print(html).unwrap();

        assert_eq!(
            pretty,
            "<div>\n  <br>\n  <img src=\"a.png\">\n  <p>after</p>\n</div>\n"
        );
    }

    #[test]
    fn test_attributes_preserved_verbatim() {
        let html = "<a href=\"/x?a=1&amp;b=2\" class=\"btn primary\">go</a>";
        let pretty = pretty_print(html).unwrap();

        assert!(pretty.contains("href=\"/x?a=1&amp;b=2\""));
        assert!(pretty.contains("class=\"btn primary\""));
    }

    #[test]
    fn test_entities_in_text_preserved() {
        let html = "<p>a &amp; b</p>";
        let pretty = pretty_print(html).unwrap();

        assert!(pretty.contains("<p>a &amp; b</p>"));
    }

    #[test]
    fn test_pre_content_untouched() {
        let html = "<div><pre>line1\n    line2\nline3</pre></div>";
        let pretty = pretty_print(html).unwrap();

        assert!(pretty.contains("line1\n    line2\nline3"));
    }

    #[test]
    fn test_empty_element_expanded() {
        let html = "<div><span/></div>";
        let pretty = pretty_print(html).unwrap();

        assert!(pretty.contains("<span></span>"));
    }

    #[test]
    fn test_whitespace_between_elements_dropped() {
        let html = "<ul>\n    <li>one</li>\n    <li>two</li>\n</ul>";
        let pretty = pretty_print(html).unwrap();

        assert_eq!(pretty, "<ul>\n  <li>one</li>\n  <li>two</li>\n</ul>\n");
    }

    #[test]
    fn test_comments_kept() {
        let html = "<div><!-- note --><p>x</p></div>";
        let pretty = pretty_print(html).unwrap();

        assert!(pretty.contains("<!-- note -->"));
    }

    #[test]
    fn test_malformed_markup_errors() {
        assert!(pretty_print("<div").is_err());
    }
}
