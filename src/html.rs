use crate::dom::{Dom, NodeId, NodeLocation, ParsingMode, SourceSpan};
use crate::{Error, Result};

/// Receives tree construction events while the parser runs.
pub(crate) trait ParseSink {
    /// An element entered the tree.
    fn element_inserted(&mut self, dom: &mut Dom, element: NodeId) -> Result<()>;

    /// A repeated `<html>`/`<body>` tag added `name` to the existing element.
    fn attribute_merged(
        &mut self,
        dom: &mut Dom,
        element: NodeId,
        name: &str,
        value: &str,
    ) -> Result<()>;

    /// Called once for every executable script element, right after its end
    /// tag has been consumed and before any later markup is inserted.
    fn script_inserted(&mut self, dom: &mut Dom, script: NodeId) -> Result<()>;
}

struct StartTag {
    name: String,
    attrs: Vec<(String, String)>,
    attr_spans: Vec<(String, SourceSpan)>,
    self_closing: bool,
    span: SourceSpan,
}

struct TreeBuilder<'a> {
    dom: &'a mut Dom,
    src: &'a str,
    stack: Vec<NodeId>,
    html: Option<NodeId>,
    head: Option<NodeId>,
    body: Option<NodeId>,
    sink: &'a mut dyn ParseSink,
}

pub(crate) fn parse_document(
    dom: &mut Dom,
    markup: &str,
    sink: &mut dyn ParseSink,
) -> Result<()> {
    let root = dom.root();
    let mode = dom.mode();
    let mut builder = TreeBuilder {
        dom,
        src: markup,
        stack: vec![root],
        html: None,
        head: None,
        body: None,
        sink,
    };
    builder.run()?;
    match mode {
        ParsingMode::Html => {
            builder.ensure_body();
        }
        ParsingMode::Xml => {
            if builder.stack.len() > 1 {
                let open = builder.stack[builder.stack.len() - 1];
                let tag = builder.dom.tag_name(open).unwrap_or_default().to_string();
                return Err(Error::MarkupParse(format!("unclosed element <{tag}>")));
            }
        }
    }
    let end = markup.len();
    while builder.stack.len() > 1 {
        if let Some(open) = builder.stack.pop() {
            builder.close_implicitly(open, end);
        }
    }
    Ok(())
}

impl TreeBuilder<'_> {
    fn mode(&self) -> ParsingMode {
        self.dom.mode()
    }

    fn current(&self) -> NodeId {
        self.stack[self.stack.len() - 1]
    }

    fn run(&mut self) -> Result<()> {
        let src = self.src;
        let bytes = src.as_bytes();
        let mut i = 0usize;

        while i < bytes.len() {
            if starts_with_at(bytes, i, b"<!--") {
                let (text_end, next) = match find_subslice(bytes, i + 4, b"-->") {
                    Some(end) => (end, end + 3),
                    None => {
                        self.unterminated("unclosed comment")?;
                        (bytes.len(), bytes.len())
                    }
                };
                let text = self.src[i + 4..text_end].to_string();
                let node = self.dom.create_comment(text);
                let parent = self.current();
                self.dom.append_parsed(parent, node);
                self.dom.record_location(node, NodeLocation::text(i, next));
                i = next;
                continue;
            }

            if self.mode() == ParsingMode::Xml && starts_with_at(bytes, i, b"<![CDATA[") {
                let end = find_subslice(bytes, i + 9, b"]]>")
                    .ok_or_else(|| Error::MarkupParse("unclosed CDATA section".into()))?;
                let text = self.src[i + 9..end].to_string();
                self.insert_text(text, i, end + 3)?;
                i = end + 3;
                continue;
            }

            if starts_with_at(bytes, i, b"<?") {
                i = match find_subslice(bytes, i + 2, b">") {
                    Some(end) => end + 1,
                    None => {
                        self.unterminated("unclosed processing instruction")?;
                        bytes.len()
                    }
                };
                continue;
            }

            if starts_with_at(bytes, i, b"<!") {
                i = self.parse_declaration(i)?;
                continue;
            }

            if starts_with_at(bytes, i, b"</") {
                i = match parse_end_tag(self.src, i, self.mode()) {
                    Some((tag, next)) => {
                        self.close_element(&tag, SourceSpan { start: i, end: next })?;
                        next
                    }
                    None => {
                        self.unterminated("unclosed end tag")?;
                        bytes.len()
                    }
                };
                continue;
            }

            if bytes[i] == b'<' && bytes.get(i + 1).is_some_and(|b| b.is_ascii_alphabetic()) {
                i = match parse_start_tag(self.src, i, self.mode())? {
                    Some(start_tag) => self.insert_start_tag(start_tag)?,
                    None => {
                        self.unterminated("unclosed start tag")?;
                        bytes.len()
                    }
                };
                continue;
            }

            let text_start = i;
            i += 1;
            while i < bytes.len() && bytes[i] != b'<' {
                i += 1;
            }
            let text = decode_character_references(&self.src[text_start..i]);
            self.insert_text(text, text_start, i)?;
        }
        Ok(())
    }

    /// Input ended inside a construct. XML documents reject it; HTML drops
    /// the construct or runs it to the end of input, as browsers do.
    fn unterminated(&self, what: &str) -> Result<()> {
        match self.mode() {
            ParsingMode::Xml => Err(Error::MarkupParse(what.into())),
            ParsingMode::Html => Ok(()),
        }
    }

    fn parse_declaration(&mut self, at: usize) -> Result<usize> {
        let (inner_end, next) = match skip_declaration(self.src, at) {
            Some(next) => (next - 1, next),
            None => {
                self.unterminated("unclosed declaration")?;
                (self.src.len(), self.src.len())
            }
        };
        let inner = self.src[at + 2..inner_end].trim();
        let is_doctype = inner
            .as_bytes()
            .get(..7)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(b"doctype"));
        if is_doctype {
            let name = inner[7..].split_ascii_whitespace().next().unwrap_or("html");
            let name = match self.mode() {
                ParsingMode::Html => name.to_ascii_lowercase(),
                ParsingMode::Xml => name.to_string(),
            };
            if self.stack.len() == 1 && self.dom.document_element().is_none() {
                let node = self.dom.create_doctype(name);
                let root = self.dom.root();
                self.dom.append_parsed(root, node);
                self.dom.record_location(node, NodeLocation::text(at, next));
            }
        }
        Ok(next)
    }

    fn insert_text(&mut self, text: String, start: usize, end: usize) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let whitespace_only = text.chars().all(|ch| ch.is_ascii_whitespace());
        let parent = match self.mode() {
            ParsingMode::Xml => {
                if self.stack.len() == 1 {
                    if whitespace_only {
                        return Ok(());
                    }
                    return Err(Error::MarkupParse(
                        "text content outside the document element".into(),
                    ));
                }
                self.current()
            }
            ParsingMode::Html => {
                let current = self.current();
                let at_skeleton = current == self.dom.root()
                    || Some(current) == self.html
                    || Some(current) == self.head;
                if !at_skeleton {
                    current
                } else if whitespace_only {
                    if Some(current) != self.head {
                        return Ok(());
                    }
                    current
                } else {
                    self.ensure_body()
                }
            }
        };
        let node = self.dom.create_text(text);
        self.dom.append_parsed(parent, node);
        self.dom.record_location(node, NodeLocation::text(start, end));
        Ok(())
    }

    fn insert_start_tag(&mut self, tag: StartTag) -> Result<usize> {
        let next = tag.span.end;
        let parent = match self.mode() {
            ParsingMode::Html => match self.html_insertion_parent(&tag)? {
                Some(parent) => parent,
                None => return Ok(next),
            },
            ParsingMode::Xml => {
                if self.stack.len() == 1 && self.dom.document_element().is_some() {
                    return Err(Error::MarkupParse(format!(
                        "second document element <{}>",
                        tag.name
                    )));
                }
                self.current()
            }
        };

        let StartTag {
            name,
            attrs,
            attr_spans,
            self_closing,
            span,
        } = tag;
        let node = self.dom.create_element(name.clone(), attrs);
        self.dom.append_parsed(parent, node);
        self.dom.record_location(
            node,
            NodeLocation {
                start: span.start,
                end: span.end,
                start_tag: Some(span),
                end_tag: None,
                attrs: attr_spans,
            },
        );
        self.sink.element_inserted(self.dom, node)?;

        match name.as_str() {
            "html" if self.mode() == ParsingMode::Html => self.html = Some(node),
            "head" if self.mode() == ParsingMode::Html => self.head = Some(node),
            "body" if self.mode() == ParsingMode::Html => self.body = Some(node),
            _ => {}
        }

        let is_script = name.eq_ignore_ascii_case("script");
        if self.mode() == ParsingMode::Html {
            if let Some(raw_kind) = raw_text_kind(&name) {
                let src = self.src;
                let end_tag = find_case_insensitive_raw_end_tag(src.as_bytes(), next, name.as_bytes())
                    .and_then(|close| {
                        parse_end_tag(src, close, ParsingMode::Html)
                            .map(|(_, after)| SourceSpan { start: close, end: after })
                    });
                let close = end_tag.map_or(src.len(), |span| span.start);
                let body = &src[next..close];
                if !body.is_empty() {
                    let text = match raw_kind {
                        RawText::Raw => body.to_string(),
                        RawText::Escapable => decode_character_references(body),
                    };
                    let text_node = self.dom.create_text(text);
                    self.dom.append_parsed(node, text_node);
                    self.dom
                        .record_location(text_node, NodeLocation::text(next, close));
                }
                // Raw text cut off by the end of input keeps what it has;
                // such a script never runs.
                let Some(span) = end_tag else {
                    self.close_implicitly(node, src.len());
                    return Ok(src.len());
                };
                self.finish_location(node, Some(span));
                if is_script {
                    self.script_inserted(node)?;
                }
                return Ok(span.end);
            }
            if self_closing || is_void_tag(&name) {
                return Ok(next);
            }
        } else if self_closing {
            if is_script {
                self.script_inserted(node)?;
            }
            return Ok(next);
        }

        self.stack.push(node);
        Ok(next)
    }

    fn script_inserted(&mut self, script: NodeId) -> Result<()> {
        if is_executable_script_type(self.dom.attr(script, "type")) {
            self.sink.script_inserted(self.dom, script)?;
        }
        Ok(())
    }

    /// Picks where an HTML start tag goes, creating the implied
    /// `html`/`head`/`body` skeleton on the way. `None` means the tag only
    /// merged attributes into an existing skeleton element.
    fn html_insertion_parent(&mut self, tag: &StartTag) -> Result<Option<NodeId>> {
        match tag.name.as_str() {
            "html" => {
                if let Some(html) = self.html {
                    self.merge_attrs(html, &tag.attrs)?;
                    return Ok(None);
                }
                Ok(Some(self.dom.root()))
            }
            "head" => {
                if self.head.is_some() || self.body.is_some() {
                    return Ok(None);
                }
                Ok(Some(self.ensure_html()))
            }
            "body" => {
                if let Some(body) = self.body {
                    self.merge_attrs(body, &tag.attrs)?;
                    return Ok(None);
                }
                let html = self.ensure_html();
                if self.head.is_none() {
                    self.ensure_head();
                }
                self.pop_to(html);
                Ok(Some(html))
            }
            name if is_head_content_tag(name) && self.body.is_none() => Ok(Some(self.ensure_head())),
            name => {
                self.ensure_body();
                self.close_implied_start_tags(name);
                Ok(Some(self.current()))
            }
        }
    }

    /// Copies attributes the element lacks; existing ones win.
    fn merge_attrs(&mut self, node: NodeId, attrs: &[(String, String)]) -> Result<()> {
        for (name, value) in attrs {
            if self.dom.attr(node, name).is_none() {
                self.dom.set_attr(node, name, value)?;
                self.sink.attribute_merged(self.dom, node, name, value)?;
            }
        }
        Ok(())
    }

    fn ensure_html(&mut self) -> NodeId {
        if let Some(html) = self.html {
            return html;
        }
        let html = self.dom.create_element("html".into(), Vec::new());
        let root = self.dom.root();
        self.dom.append_parsed(root, html);
        self.stack.truncate(1);
        self.stack.push(html);
        self.html = Some(html);
        html
    }

    fn ensure_head(&mut self) -> NodeId {
        if let Some(head) = self.head {
            if !self.stack.contains(&head) && self.body.is_none() {
                self.stack.push(head);
            }
            return head;
        }
        let html = self.ensure_html();
        let head = self.dom.create_element("head".into(), Vec::new());
        self.dom.append_parsed(html, head);
        self.pop_to(html);
        self.stack.push(head);
        self.head = Some(head);
        head
    }

    fn ensure_body(&mut self) -> NodeId {
        if let Some(body) = self.body {
            if !self.stack.contains(&body) {
                if let Some(html) = self.html {
                    self.pop_to(html);
                }
                self.stack.push(body);
            }
            return body;
        }
        let html = self.ensure_html();
        if self.head.is_none() {
            self.ensure_head();
        }
        self.pop_to(html);
        let body = self.dom.create_element("body".into(), Vec::new());
        self.dom.append_parsed(html, body);
        self.stack.push(body);
        self.body = Some(body);
        body
    }

    /// Pops open elements above `node`, leaving it current.
    fn pop_to(&mut self, node: NodeId) {
        let Some(index) = self.stack.iter().position(|open| *open == node) else {
            return;
        };
        let closed_at = self.stack_close_offset();
        while self.stack.len() > index + 1 {
            if let Some(open) = self.stack.pop() {
                self.close_implicitly(open, closed_at);
            }
        }
    }

    fn stack_close_offset(&self) -> usize {
        self.dom
            .descendants(self.current())
            .last()
            .and_then(|last| self.dom.location(*last))
            .map(|location| location.end)
            .or_else(|| self.dom.location(self.current()).map(|location| location.end))
            .unwrap_or(0)
    }

    fn close_implied_start_tags(&mut self, tag: &str) {
        let Some((closes, boundaries)) = implied_close_rule(tag) else {
            return;
        };
        let mut close_index = None;
        for index in (1..self.stack.len()).rev() {
            let Some(open_tag) = self.dom.tag_name(self.stack[index]) else {
                continue;
            };
            if closes.contains(&open_tag) {
                close_index = Some(index);
                break;
            }
            if boundaries.contains(&open_tag) || open_tag == "body" {
                break;
            }
        }
        if let Some(index) = close_index {
            let closed_at = self.stack_close_offset();
            while self.stack.len() > index {
                if let Some(open) = self.stack.pop() {
                    self.close_implicitly(open, closed_at);
                }
            }
        }
    }

    fn close_element(&mut self, tag: &str, span: SourceSpan) -> Result<()> {
        if self.mode() == ParsingMode::Xml {
            let current = self.current();
            if self.stack.len() == 1 || self.dom.tag_name(current) != Some(tag) {
                return Err(Error::MarkupParse(format!("unexpected end tag </{tag}>")));
            }
            self.stack.pop();
            self.finish_location(current, Some(span));
            if tag == "script" {
                self.script_inserted(current)?;
            }
            return Ok(());
        }

        match tag {
            "head" => {
                if let (Some(head), Some(html)) = (self.head, self.html) {
                    if self.stack.contains(&head) {
                        self.pop_to(head);
                        self.stack.pop();
                        self.finish_location(head, Some(span));
                        self.pop_to(html);
                    }
                }
                return Ok(());
            }
            "body" | "html" => {
                let node = if tag == "body" { self.body } else { self.html };
                if let Some(node) = node {
                    if let Some(location) = self.dom.location_mut(node) {
                        location.end_tag = Some(span);
                        location.end = span.end;
                    }
                }
                return Ok(());
            }
            _ => {}
        }

        let Some(index) = (1..self.stack.len())
            .rev()
            .find(|index| self.dom.tag_name(self.stack[*index]) == Some(tag))
        else {
            return Ok(());
        };
        let closed_at = span.start;
        while self.stack.len() > index + 1 {
            if let Some(open) = self.stack.pop() {
                self.close_implicitly(open, closed_at);
            }
        }
        if let Some(node) = self.stack.pop() {
            self.finish_location(node, Some(span));
        }
        Ok(())
    }

    fn finish_location(&mut self, node: NodeId, end_tag: Option<SourceSpan>) {
        if let Some(location) = self.dom.location_mut(node) {
            if let Some(span) = end_tag {
                location.end = span.end;
            }
            location.end_tag = end_tag;
        }
    }

    fn close_implicitly(&mut self, node: NodeId, at: usize) {
        if let Some(location) = self.dom.location_mut(node) {
            if location.end_tag.is_none() && at > location.end {
                location.end = at;
            }
        }
    }
}

#[derive(Clone, Copy)]
enum RawText {
    Raw,
    Escapable,
}

fn raw_text_kind(tag: &str) -> Option<RawText> {
    match tag {
        "script" | "style" | "xmp" | "iframe" | "noembed" | "noframes" => Some(RawText::Raw),
        "textarea" | "title" => Some(RawText::Escapable),
        _ => None,
    }
}

fn is_head_content_tag(tag: &str) -> bool {
    matches!(
        tag,
        "base" | "link" | "meta" | "noscript" | "script" | "style" | "template" | "title"
    )
}

fn implied_close_rule(tag: &str) -> Option<(&'static [&'static str], &'static [&'static str])> {
    match tag {
        "li" => Some((&["li"], &["ol", "ul", "menu"])),
        "dt" | "dd" => Some((&["dt", "dd"], &["dl"])),
        "option" => Some((&["option"], &["select", "datalist", "optgroup"])),
        "optgroup" => Some((&["optgroup", "option"], &["select"])),
        "tr" => Some((&["tr"], &["table", "tbody", "thead", "tfoot"])),
        "td" | "th" => Some((&["td", "th"], &["tr", "table"])),
        tag if is_paragraph_terminator_tag(tag) => Some((&["p"], &["button"])),
        _ => None,
    }
}

fn is_paragraph_terminator_tag(tag: &str) -> bool {
    matches!(
        tag,
        "address"
            | "article"
            | "aside"
            | "blockquote"
            | "details"
            | "div"
            | "dl"
            | "fieldset"
            | "figcaption"
            | "figure"
            | "footer"
            | "form"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "header"
            | "hgroup"
            | "hr"
            | "main"
            | "menu"
            | "nav"
            | "ol"
            | "p"
            | "pre"
            | "section"
            | "table"
            | "ul"
    )
}

fn is_executable_script_type(raw_type: Option<&str>) -> bool {
    let Some(raw_type) = raw_type else {
        return true;
    };
    let media_type = raw_type
        .split(';')
        .next()
        .map(str::trim)
        .unwrap_or_default()
        .to_ascii_lowercase();
    media_type.is_empty()
        || matches!(
            media_type.as_str(),
            "text/javascript" | "application/javascript" | "application/ecmascript" | "text/ecmascript"
        )
}

/// `Ok(None)` when the input ends before the tag does.
fn parse_start_tag(src: &str, at: usize, mode: ParsingMode) -> Result<Option<StartTag>> {
    let bytes = src.as_bytes();
    let mut i = at + 1;
    let tag_start = i;
    while i < bytes.len() && is_tag_char(bytes[i]) {
        i += 1;
    }
    let name = normalize_name(&src[tag_start..i], mode);
    if name.is_empty() {
        return Err(Error::MarkupParse("empty tag name".into()));
    }

    let mut attrs: Vec<(String, String)> = Vec::new();
    let mut attr_spans = Vec::new();
    let mut self_closing = false;

    loop {
        skip_ws(bytes, &mut i);
        if i >= bytes.len() {
            return Ok(None);
        }
        if bytes[i] == b'>' {
            i += 1;
            break;
        }
        if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'>') {
            self_closing = true;
            i += 2;
            break;
        }
        if !is_attr_name_char(bytes[i]) {
            // Stray bytes inside a tag are skipped the way browsers recover.
            i += 1;
            continue;
        }

        let name_start = i;
        while i < bytes.len() && is_attr_name_char(bytes[i]) {
            i += 1;
        }
        let attr_name = normalize_name(&src[name_start..i], mode);

        let mut probe = i;
        skip_ws(bytes, &mut probe);
        let value = if bytes.get(probe) == Some(&b'=') {
            i = probe + 1;
            skip_ws(bytes, &mut i);
            match parse_attr_value(src, &mut i) {
                Some(value) => value,
                None => return Ok(None),
            }
        } else {
            String::new()
        };

        if attrs.iter().any(|(existing, _)| *existing == attr_name) {
            if mode == ParsingMode::Xml {
                return Err(Error::MarkupParse(format!(
                    "duplicate attribute \"{attr_name}\""
                )));
            }
            continue;
        }
        attr_spans.push((
            attr_name.clone(),
            SourceSpan {
                start: name_start,
                end: i,
            },
        ));
        attrs.push((attr_name, value));
    }

    Ok(Some(StartTag {
        name,
        attrs,
        attr_spans,
        self_closing,
        span: SourceSpan { start: at, end: i },
    }))
}

fn parse_end_tag(src: &str, at: usize, mode: ParsingMode) -> Option<(String, usize)> {
    let bytes = src.as_bytes();
    let mut i = at + 2;
    skip_ws(bytes, &mut i);
    let tag_start = i;
    while i < bytes.len() && is_tag_char(bytes[i]) {
        i += 1;
    }
    let tag = normalize_name(&src[tag_start..i], mode);
    while i < bytes.len() && bytes[i] != b'>' {
        i += 1;
    }
    if i >= bytes.len() {
        return None;
    }
    Some((tag, i + 1))
}

fn parse_attr_value(src: &str, i: &mut usize) -> Option<String> {
    let bytes = src.as_bytes();
    if *i >= bytes.len() {
        return None;
    }
    if bytes[*i] == b'\'' || bytes[*i] == b'"' {
        let quote = bytes[*i];
        *i += 1;
        let start = *i;
        while *i < bytes.len() && bytes[*i] != quote {
            *i += 1;
        }
        if *i >= bytes.len() {
            return None;
        }
        let raw = &src[start..*i];
        *i += 1;
        return Some(decode_character_references(raw));
    }

    let start = *i;
    while *i < bytes.len()
        && !bytes[*i].is_ascii_whitespace()
        && bytes[*i] != b'>'
        && !(bytes[*i] == b'/' && bytes.get(*i + 1) == Some(&b'>'))
    {
        *i += 1;
    }
    Some(decode_character_references(&src[start..*i]))
}

fn skip_declaration(src: &str, at: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut i = at + 2;
    let mut quote = None;
    let mut bracket_depth = 0usize;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'[' => bracket_depth += 1,
                b']' if bracket_depth > 0 => bracket_depth -= 1,
                b'>' if bracket_depth == 0 => return Some(i + 1),
                _ => {}
            },
        }
        i += 1;
    }
    None
}

fn normalize_name(raw: &str, mode: ParsingMode) -> String {
    match mode {
        ParsingMode::Html => raw.to_ascii_lowercase(),
        ParsingMode::Xml => raw.to_string(),
    }
}

fn skip_ws(bytes: &[u8], i: &mut usize) {
    while *i < bytes.len() && bytes[*i].is_ascii_whitespace() {
        *i += 1;
    }
}

fn is_tag_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b':' || b == b'.'
}

fn is_attr_name_char(b: u8) -> bool {
    !(b.is_ascii_whitespace() || matches!(b, b'"' | b'\'' | b'>' | b'/' | b'=' | b'<'))
}

pub(crate) fn is_void_tag(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

fn starts_with_at(bytes: &[u8], at: usize, needle: &[u8]) -> bool {
    at + needle.len() <= bytes.len() && &bytes[at..at + needle.len()] == needle
}

fn find_subslice(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || from > bytes.len() {
        return None;
    }
    let mut i = from;
    while i + needle.len() <= bytes.len() {
        if &bytes[i..i + needle.len()] == needle {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn find_case_insensitive_raw_end_tag(bytes: &[u8], from: usize, tag: &[u8]) -> Option<usize> {
    let mut i = from;
    while i < bytes.len() {
        if bytes[i] == b'<' && bytes.get(i + 1) == Some(&b'/') {
            let j = i + 2;
            let tag_end = j + tag.len();
            if tag_end <= bytes.len()
                && bytes[j..tag_end].eq_ignore_ascii_case(tag)
                && bytes
                    .get(tag_end)
                    .is_none_or(|after| !after.is_ascii_alphanumeric())
            {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

fn decode_character_references(src: &str) -> String {
    if !src.contains('&') {
        return src.to_string();
    }

    fn decode_numeric(value: &str) -> Option<char> {
        let codepoint = if let Some(hex) = value.strip_prefix(['x', 'X']) {
            u32::from_str_radix(hex, 16).ok()?
        } else {
            value.parse::<u32>().ok()?
        };
        char::from_u32(codepoint)
    }

    fn decode_named(value: &str) -> Option<char> {
        match value {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{00A0}'),
            "copy" => Some('©'),
            "reg" => Some('®'),
            "hellip" => Some('…'),
            "mdash" => Some('—'),
            "ndash" => Some('–'),
            _ => None,
        }
    }

    let mut out = String::with_capacity(src.len());
    let mut rest = src;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp + 1..];
        let decoded = tail.find(';').and_then(|semi| {
            let name = &tail[..semi];
            let ch = match name.strip_prefix('#') {
                Some(numeric) => decode_numeric(numeric),
                None => decode_named(name),
            }?;
            Some((ch, semi + 1))
        });
        match decoded {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}
