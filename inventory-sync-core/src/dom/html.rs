//! Lenient HTML reader/writer
//!
//! Enough HTML to load a catalog page, annotate it and write it back:
//! elements and attributes, text with the common entities, comments,
//! doctype, void elements and raw-text `script`/`style` bodies. Optional end
//! tags (`li`, `p`, `dt`/`dd`, `option`, table rows and cells) are implied
//! the way browsers imply them. Stray close tags are ignored; unclosed
//! elements are closed at end of input. Nesting deeper than [`MAX_DEPTH`]
//! is flattened.

use super::document::{Document, NodeId, NodeKind};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Open elements beyond this depth are attached to the deepest allowed parent
pub const MAX_DEPTH: usize = 512;

/// Start tags that close an open `p`
const CLOSES_P: &[&str] = &[
    "address", "article", "aside", "blockquote", "center", "details", "dialog", "dir", "div",
    "dl", "dd", "dt", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3",
    "h4", "h5", "h6", "header", "hgroup", "hr", "li", "main", "menu", "nav", "ol", "p", "pre",
    "search", "section", "summary", "table", "ul",
];

/// Elements that stop the search for an open `li`, `dt` or `dd`
const LIST_ITEM_BARRIERS: &[&str] = &[
    "applet", "article", "aside", "blockquote", "body", "button", "caption", "center",
    "details", "dir", "dl", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2",
    "h3", "h4", "h5", "h6", "header", "html", "main", "marquee", "menu", "nav", "object", "ol",
    "section", "select", "table", "td", "template", "th", "ul",
];

const BUTTON_SCOPE: &[&str] = &[
    "applet", "button", "caption", "html", "marquee", "object", "table", "td", "template", "th",
];

const TABLE_SCOPE: &[&str] = &["html", "table", "template"];

/// Parse an HTML string into a [`Document`]
pub fn parse_html(input: &str) -> Document {
    let mut doc = Document::new();
    let mut stack: Vec<NodeId> = vec![doc.root()];
    let mut pos = 0;

    while pos < input.len() {
        let rest = &input[pos..];
        let parent = *stack.last().unwrap_or(&doc.root());

        if let Some(body) = rest.strip_prefix("<!--") {
            let (comment, consumed) = match body.find("-->") {
                Some(end) => (&body[..end], 4 + end + 3),
                None => (body, rest.len()),
            };
            let node = doc.push(NodeKind::Comment(comment.to_string()));
            doc.attach(parent, node);
            pos += consumed;
            continue;
        }

        if rest.starts_with("<!") || rest.starts_with("<?") {
            let end = rest.find('>').unwrap_or(rest.len());
            let node = doc.push(NodeKind::Doctype(rest[1..end].to_string()));
            doc.attach(parent, node);
            pos += (end + 1).min(rest.len());
            continue;
        }

        if let Some(body) = rest.strip_prefix("</") {
            if let Some(end) = body.find('>') {
                let name = body[..end].trim().to_ascii_lowercase();
                close_element(&doc, &mut stack, &name);
                pos += 2 + end + 1;
                continue;
            }
        }

        if rest.starts_with('<') && rest.as_bytes().get(1).is_some_and(u8::is_ascii_alphabetic) {
            if let Some(tag) = parse_open_tag(rest) {
                close_implied(&doc, &mut stack, &tag.name);
                let parent = *stack.last().unwrap_or(&doc.root());
                let element = doc.push(NodeKind::Element {
                    tag: tag.name.clone(),
                    attrs: tag.attrs,
                });
                doc.attach(parent, element);
                pos += tag.consumed;

                if RAW_TEXT_ELEMENTS.contains(&tag.name.as_str()) {
                    pos += read_raw_text(&mut doc, element, &input[pos..], &tag.name);
                } else if !tag.self_closing
                    && !VOID_ELEMENTS.contains(&tag.name.as_str())
                    && stack.len() <= MAX_DEPTH
                {
                    stack.push(element);
                }
                continue;
            }
        }

        // Plain text up to the next '<' (a lone '<' is text too)
        let first = rest.chars().next().map(char::len_utf8).unwrap_or(1);
        let next = rest[first..].find('<').map(|i| i + first).unwrap_or(rest.len());
        let node = doc.push(NodeKind::Text(decode_entities(&rest[..next])));
        doc.attach(parent, node);
        pos += next;
    }

    doc
}

/// Pop the open-element stack back to the nearest element named `name`
fn close_element(doc: &Document, stack: &mut Vec<NodeId>, name: &str) {
    if let Some(idx) = stack.iter().rposition(|id| doc.tag(*id) == Some(name)) {
        if idx > 0 {
            stack.truncate(idx);
        }
    }
}

/// Close the elements whose end tag is implied by a `name` start tag
fn close_implied(doc: &Document, stack: &mut Vec<NodeId>, name: &str) {
    match name {
        "li" => close_list_item(doc, stack, &["li"]),
        "dt" | "dd" => close_list_item(doc, stack, &["dt", "dd"]),
        "option" => close_current(doc, stack, "option"),
        "optgroup" => {
            close_current(doc, stack, "option");
            close_current(doc, stack, "optgroup");
        }
        "thead" | "tbody" | "tfoot" => {
            close_in_scope(doc, stack, &["thead", "tbody", "tfoot"], TABLE_SCOPE)
        }
        "tr" => close_in_scope(doc, stack, &["tr"], TABLE_SCOPE),
        "td" | "th" => close_in_scope(doc, stack, &["td", "th"], TABLE_SCOPE),
        _ => {}
    }
    if CLOSES_P.contains(&name) {
        close_in_scope(doc, stack, &["p"], BUTTON_SCOPE);
    }
}

fn close_list_item(doc: &Document, stack: &mut Vec<NodeId>, targets: &[&str]) {
    for idx in (1..stack.len()).rev() {
        let Some(tag) = doc.tag(stack[idx]) else { return };
        if targets.contains(&tag) {
            stack.truncate(idx);
            return;
        }
        if LIST_ITEM_BARRIERS.contains(&tag) {
            return;
        }
    }
}

fn close_in_scope(doc: &Document, stack: &mut Vec<NodeId>, targets: &[&str], scope: &[&str]) {
    for idx in (1..stack.len()).rev() {
        let Some(tag) = doc.tag(stack[idx]) else { return };
        if targets.contains(&tag) {
            stack.truncate(idx);
            return;
        }
        if scope.contains(&tag) {
            return;
        }
    }
}

fn close_current(doc: &Document, stack: &mut Vec<NodeId>, name: &str) {
    if stack.len() > 1 && stack.last().and_then(|id| doc.tag(*id)) == Some(name) {
        stack.pop();
    }
}

/// Offset of the first `</name` in `rest`, ASCII case-insensitive
fn find_close_tag(rest: &str, name: &str) -> Option<usize> {
    let bytes = rest.as_bytes();
    let mut from = 0;
    while let Some(i) = rest[from..].find("</") {
        let at = from + i;
        let candidate = bytes.get(at + 2..at + 2 + name.len());
        if candidate.is_some_and(|c| c.eq_ignore_ascii_case(name.as_bytes())) {
            return Some(at);
        }
        from = at + 2;
    }
    None
}

/// Read a script/style body; returns bytes consumed including the close tag
fn read_raw_text(doc: &mut Document, element: NodeId, rest: &str, name: &str) -> usize {
    let (body, consumed) = match find_close_tag(rest, name) {
        Some(start) => {
            let after = rest[start..].find('>').map(|i| start + i + 1).unwrap_or(rest.len());
            (&rest[..start], after)
        }
        None => (rest, rest.len()),
    };
    if !body.is_empty() {
        let node = doc.push(NodeKind::RawText(body.to_string()));
        doc.attach(element, node);
    }
    consumed
}

struct OpenTag {
    name: String,
    attrs: Vec<(String, String)>,
    self_closing: bool,
    consumed: usize,
}

/// Parse `<name attr=value ...>`; `None` when the tag never closes
fn parse_open_tag(s: &str) -> Option<OpenTag> {
    let bytes = s.as_bytes();
    let mut i = 1;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'-' || bytes[i] == b':') {
        i += 1;
    }
    let name = s[1..i].to_ascii_lowercase();
    let mut attrs = Vec::new();

    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        match bytes.get(i)? {
            b'>' => {
                return Some(OpenTag { name, attrs, self_closing: false, consumed: i + 1 });
            }
            b'/' if bytes.get(i + 1) == Some(&b'>') => {
                return Some(OpenTag { name, attrs, self_closing: true, consumed: i + 2 });
            }
            b'/' => {
                i += 1;
                continue;
            }
            _ => {}
        }

        let start = i;
        while i < bytes.len() && !matches!(bytes[i], b'=' | b'>' | b'/') && !bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let attr_name = s[start..i].to_ascii_lowercase();

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let mut value = String::new();
        if bytes.get(i) == Some(&b'=') {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            match bytes.get(i)? {
                quote @ (b'"' | b'\'') => {
                    let end = s[i + 1..].find(*quote as char)? + i + 1;
                    value = decode_entities(&s[i + 1..end]);
                    i = end + 1;
                }
                _ => {
                    let start = i;
                    while i < bytes.len() && bytes[i] != b'>' && !bytes[i].is_ascii_whitespace() {
                        i += 1;
                    }
                    value = decode_entities(&s[start..i]);
                }
            }
        }
        if !attr_name.is_empty() {
            attrs.push((attr_name, value));
        }
    }
}

/// Decode named and numeric character references
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .char_indices()
            .take(12)
            .find(|(_, c)| *c == ';')
            .and_then(|(semi, _)| decode_reference(&tail[1..semi]).map(|c| (c, semi + 1)));
        match decoded {
            Some((c, len)) => {
                out.push(c);
                rest = &tail[len..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_reference(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(&['x', 'X'][..]) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Serialize a [`Document`] back to HTML
pub fn to_html(doc: &Document) -> String {
    let mut out = String::new();
    write_node(doc, doc.root(), &mut out);
    out
}

fn write_node(doc: &Document, id: NodeId, out: &mut String) {
    match &doc.node(id).kind {
        NodeKind::Root => {
            for child in doc.children(id) {
                write_node(doc, *child, out);
            }
        }
        NodeKind::Element { tag, attrs } => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in attrs {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                escape_into(value, true, out);
                out.push('"');
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&tag.as_str()) {
                return;
            }
            for child in doc.children(id) {
                write_node(doc, *child, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        NodeKind::Text(text) => escape_into(text, false, out),
        NodeKind::RawText(text) => out.push_str(text),
        NodeKind::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        NodeKind::Doctype(raw) => {
            out.push('<');
            out.push_str(raw);
            out.push('>');
        }
    }
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_preserves_markup() {
        let html = r#"<!DOCTYPE html><html><body><div class="vehicle-card" data-vin="JM3"><img src="a.png"><p>Stock&nbsp;#A100</p><!-- note --></div></body></html>"#;
        let doc = parse_html(html);
        assert_eq!(to_html(&doc), html);
    }

    #[test]
    fn test_entities() {
        assert_eq!(decode_entities("a &amp; b &lt;c&gt; &#65;&#x42;"), "a & b <c> AB");
        assert_eq!(decode_entities("AT&T &bogus; &"), "AT&T &bogus; &");
    }

    #[test]
    fn test_unclosed_and_stray_tags() {
        let doc = parse_html("<div><p>one<p>two</div></span>tail");
        assert_eq!(doc.text_content(doc.root()), "onetwotail");
        let div = doc.children(doc.root())[0];
        assert_eq!(doc.tag(div), Some("div"));
    }

    #[test]
    fn test_script_body_is_raw() {
        let doc = parse_html("<div><script>if (a < b) { x = '</div>'; }</script>Stock 1234</div>");
        let div = doc.children(doc.root())[0];
        assert_eq!(doc.text_content(div), "Stock 1234");
    }

    #[test]
    fn test_attributes() {
        let doc = parse_html(r#"<input disabled value='a "b"' data-x=1/2 CLASS="Card">"#);
        let input = doc.children(doc.root())[0];
        assert_eq!(doc.attr(input, "disabled"), Some(""));
        assert_eq!(doc.attr(input, "value"), Some("a \"b\""));
        assert_eq!(doc.attr(input, "data-x"), Some("1/2"));
        assert_eq!(doc.attr(input, "class"), Some("Card"));
        assert!(doc.children(input).is_empty());
    }

    fn tags(doc: &Document, id: NodeId) -> Vec<&str> {
        doc.children(id).iter().filter_map(|c| doc.tag(*c)).collect()
    }

    #[test]
    fn test_list_items_without_end_tags_are_siblings() {
        let doc = parse_html("<ul><li>one<li>two<ul><li>inner</ul><li>three</ul>");
        let ul = doc.children(doc.root())[0];
        assert_eq!(tags(&doc, ul), ["li", "li", "li"]);
        let items = doc.children(ul);
        assert_eq!(doc.text_content(items[0]), "one");
        assert_eq!(doc.text_content(items[1]), "twoinner");
        assert_eq!(doc.text_content(items[2]), "three");
    }

    #[test]
    fn test_paragraph_closed_by_block() {
        let doc = parse_html("<div><p>one<p>two<div>block</div><span>x</span></div>");
        let div = doc.children(doc.root())[0];
        assert_eq!(tags(&doc, div), ["p", "p", "div", "span"]);
        // Inline content stays inside the paragraph
        let doc = parse_html("<p>Stock <b>A100</b> ok</p>");
        let p = doc.children(doc.root())[0];
        assert_eq!(tags(&doc, p), ["b"]);
    }

    #[test]
    fn test_table_cells_and_definitions() {
        let doc = parse_html("<table><tr><td>a<td>b<tr><th>c</table>");
        let table = doc.children(doc.root())[0];
        assert_eq!(tags(&doc, table), ["tr", "tr"]);
        let rows = doc.children(table);
        assert_eq!(tags(&doc, rows[0]), ["td", "td"]);
        assert_eq!(tags(&doc, rows[1]), ["th"]);

        let doc = parse_html("<dl><dt>Stock<dd>A100<dt>VIN<dd>-</dl>");
        let dl = doc.children(doc.root())[0];
        assert_eq!(tags(&doc, dl), ["dt", "dd", "dt", "dd"]);

        let doc = parse_html("<select><option>a<option>b<optgroup><option>c</select>");
        let select = doc.children(doc.root())[0];
        assert_eq!(tags(&doc, select), ["option", "option", "optgroup"]);
    }

    #[test]
    fn test_deep_nesting_is_flattened() {
        let depth = 200_000;
        let html = format!("{}x{}", "<div>".repeat(depth), "</div>".repeat(depth));
        let doc = parse_html(&html);
        assert_eq!(doc.text_content(doc.root()), "x");
        assert!(to_html(&doc).contains('x'));

        let mut levels = 0;
        let mut node = doc.root();
        while let Some(child) = doc.children(node).first().copied().filter(|c| doc.is_element(*c)) {
            levels += 1;
            node = child;
        }
        assert!(levels <= MAX_DEPTH + 1);
    }

    #[test]
    fn test_raw_text_close_tag_any_case() {
        let doc = parse_html("<script>a</b></SCRIPT ><p>Stock A100</p>");
        assert_eq!(tags(&doc, doc.root()), ["script", "p"]);
        assert_eq!(doc.text_content(doc.root()), "Stock A100");
        // Unterminated body runs to the end
        let doc = parse_html("<style>p { color: red }");
        assert_eq!(doc.children(doc.root()).len(), 1);
    }

    #[test]
    fn test_lone_angle_bracket_is_text() {
        let doc = parse_html("<p>a < b</p>");
        assert_eq!(doc.text_content(doc.root()), "a < b");
    }
}
