use std::collections::HashMap;

use crate::handlers::HandlerTable;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParsingMode {
    #[default]
    Html,
    Xml,
}

impl ParsingMode {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "html" => Ok(Self::Html),
            "xml" => Ok(Self::Xml),
            other => Err(Error::InvalidParsingMode(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Xml => "xml",
        }
    }

    pub fn default_content_type(self) -> &'static str {
        match self {
            Self::Html => "text/html",
            Self::Xml => "application/xml",
        }
    }
}

/// Byte offsets into the markup a session was constructed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

/// Parse-time location of a node. Tag spans are only present for elements;
/// `end_tag` is absent for void, self-closing and implicitly closed elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLocation {
    pub start: usize,
    pub end: usize,
    pub start_tag: Option<SourceSpan>,
    pub end_tag: Option<SourceSpan>,
    pub attrs: Vec<(String, SourceSpan)>,
}

impl NodeLocation {
    pub(crate) fn text(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            start_tag: None,
            end_tag: None,
            attrs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum NodeType {
    Document,
    Doctype(String),
    Element(Element),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Element {
    pub(crate) tag_name: String,
    pub(crate) attrs: Vec<(String, String)>,
}

impl Element {
    pub(crate) fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) node_type: NodeType,
    pub(crate) handlers: Option<HandlerTable>,
}

#[derive(Debug)]
pub(crate) struct Dom {
    nodes: Vec<Node>,
    root: NodeId,
    mode: ParsingMode,
    locations: HashMap<NodeId, NodeLocation>,
}

const FORM_ASSOCIATED_TAGS: &[&str] = &[
    "button", "fieldset", "input", "object", "output", "select", "textarea",
];

const RAW_TEXT_TAGS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "plaintext",
];

impl Dom {
    pub(crate) fn new(mode: ParsingMode) -> Self {
        let root = Node {
            parent: None,
            children: Vec::new(),
            node_type: NodeType::Document,
            handlers: Some(HandlerTable::new()),
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
            mode,
            locations: HashMap::new(),
        }
    }

    pub(crate) fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn mode(&self) -> ParsingMode {
        self.mode
    }

    pub(crate) fn contains(&self, node_id: NodeId) -> bool {
        node_id.0 < self.nodes.len()
    }

    pub(crate) fn check(&self, node_id: NodeId) -> Result<()> {
        if self.contains(node_id) {
            Ok(())
        } else {
            Err(Error::UnknownNode(node_id.0))
        }
    }

    fn create_node(&mut self, node_type: NodeType) -> NodeId {
        let handlers = match node_type {
            NodeType::Document | NodeType::Element(_) => Some(HandlerTable::new()),
            _ => None,
        };
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            node_type,
            handlers,
        });
        id
    }

    pub(crate) fn create_element(&mut self, tag_name: String, attrs: Vec<(String, String)>) -> NodeId {
        self.create_node(NodeType::Element(Element { tag_name, attrs }))
    }

    pub(crate) fn create_text(&mut self, text: String) -> NodeId {
        self.create_node(NodeType::Text(text))
    }

    pub(crate) fn create_comment(&mut self, text: String) -> NodeId {
        self.create_node(NodeType::Comment(text))
    }

    pub(crate) fn create_doctype(&mut self, name: String) -> NodeId {
        self.create_node(NodeType::Doctype(name))
    }

    pub(crate) fn node(&self, node_id: NodeId) -> &Node {
        &self.nodes[node_id.0]
    }

    pub(crate) fn handlers_mut(&mut self, node_id: NodeId) -> Option<&mut HandlerTable> {
        self.nodes
            .get_mut(node_id.0)
            .and_then(|node| node.handlers.as_mut())
    }

    pub(crate) fn element(&self, node_id: NodeId) -> Option<&Element> {
        match &self.nodes.get(node_id.0)?.node_type {
            NodeType::Element(element) => Some(element),
            _ => None,
        }
    }

    pub(crate) fn element_mut(&mut self, node_id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes.get_mut(node_id.0)?.node_type {
            NodeType::Element(element) => Some(element),
            _ => None,
        }
    }

    pub(crate) fn is_element(&self, node_id: NodeId) -> bool {
        self.element(node_id).is_some()
    }

    pub(crate) fn tag_name(&self, node_id: NodeId) -> Option<&str> {
        self.element(node_id).map(|e| e.tag_name.as_str())
    }

    fn has_tag(&self, node_id: NodeId, tag: &str) -> bool {
        self.tag_name(node_id)
            .is_some_and(|name| name.eq_ignore_ascii_case(tag))
    }

    /// `tagName` as scripts see it: upper-cased for HTML documents.
    pub(crate) fn qualified_tag_name(&self, node_id: NodeId) -> Option<String> {
        self.tag_name(node_id).map(|name| match self.mode {
            ParsingMode::Html => name.to_ascii_uppercase(),
            ParsingMode::Xml => name.to_string(),
        })
    }

    pub(crate) fn parent(&self, node_id: NodeId) -> Option<NodeId> {
        self.nodes.get(node_id.0).and_then(|node| node.parent)
    }

    pub(crate) fn children(&self, node_id: NodeId) -> &[NodeId] {
        &self.nodes[node_id.0].children
    }

    pub(crate) fn attr(&self, node_id: NodeId, name: &str) -> Option<&str> {
        self.element(node_id)?.attr(name)
    }

    /// Returns the previous value, if any.
    pub(crate) fn set_attr(&mut self, node_id: NodeId, name: &str, value: &str) -> Result<Option<String>> {
        let element = self
            .element_mut(node_id)
            .ok_or(Error::UnknownNode(node_id.0))?;
        if let Some(slot) = element.attrs.iter_mut().find(|(key, _)| key == name) {
            let previous = std::mem::replace(&mut slot.1, value.to_string());
            return Ok(Some(previous));
        }
        element.attrs.push((name.to_string(), value.to_string()));
        Ok(None)
    }

    pub(crate) fn remove_attr(&mut self, node_id: NodeId, name: &str) -> Result<Option<String>> {
        let element = self
            .element_mut(node_id)
            .ok_or(Error::UnknownNode(node_id.0))?;
        let position = element.attrs.iter().position(|(key, _)| key == name);
        Ok(position.map(|index| element.attrs.remove(index).1))
    }

    /// Normalizes an attribute name the way the document's parser would.
    pub(crate) fn normalize_attr_name(&self, name: &str) -> String {
        match self.mode {
            ParsingMode::Html => name.to_ascii_lowercase(),
            ParsingMode::Xml => name.to_string(),
        }
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, node_id: NodeId) -> bool {
        let mut cursor = Some(node_id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Parser insertion: keeps whatever location the parser records.
    pub(crate) fn append_parsed(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Programmatic insertion. A moved node loses its parse-time location.
    pub(crate) fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.check(parent)?;
        self.check(child)?;
        if self.is_inclusive_ancestor(child, parent) {
            return Err(Error::ScriptRuntime(
                "HierarchyRequestError: the new child is an ancestor of the parent".into(),
            ));
        }
        if matches!(
            self.nodes[parent.0].node_type,
            NodeType::Text(_) | NodeType::Comment(_) | NodeType::Doctype(_)
        ) {
            return Err(Error::ScriptRuntime(
                "HierarchyRequestError: this node type does not accept children".into(),
            ));
        }
        self.detach(child);
        self.locations.remove(&child);
        self.append_parsed(parent, child);
        Ok(())
    }

    pub(crate) fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.check(parent)?;
        self.check(child)?;
        if self.parent(child) != Some(parent) {
            return Err(Error::ScriptRuntime(
                "NotFoundError: the node is not a child of this node".into(),
            ));
        }
        self.detach(child);
        Ok(())
    }

    fn detach(&mut self, child: NodeId) {
        if let Some(old_parent) = self.nodes[child.0].parent.take() {
            self.nodes[old_parent.0].children.retain(|id| *id != child);
        }
    }

    pub(crate) fn record_location(&mut self, node_id: NodeId, location: NodeLocation) {
        self.locations.insert(node_id, location);
    }

    pub(crate) fn location(&self, node_id: NodeId) -> Option<&NodeLocation> {
        self.locations.get(&node_id)
    }

    pub(crate) fn location_mut(&mut self, node_id: NodeId) -> Option<&mut NodeLocation> {
        self.locations.get_mut(&node_id)
    }

    pub(crate) fn descendants(&self, node_id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = self.children(node_id).iter().rev().copied().collect::<Vec<_>>();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    pub(crate) fn document_element(&self) -> Option<NodeId> {
        self.children(self.root)
            .iter()
            .copied()
            .find(|id| self.is_element(*id))
    }

    fn html_child(&self, tag: &str) -> Option<NodeId> {
        if self.mode != ParsingMode::Html {
            return None;
        }
        let html = self.document_element()?;
        self.children(html)
            .iter()
            .copied()
            .find(|id| self.has_tag(*id, tag))
    }

    pub(crate) fn head(&self) -> Option<NodeId> {
        self.html_child("head")
    }

    pub(crate) fn body(&self) -> Option<NodeId> {
        self.html_child("body")
    }

    pub(crate) fn title(&self) -> String {
        let title = self
            .descendants(self.root)
            .into_iter()
            .find(|id| self.has_tag(*id, "title"));
        title
            .map(|id| {
                self.text_content(id)
                    .split_ascii_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default()
    }

    pub(crate) fn set_title(&mut self, value: &str) -> Result<()> {
        let existing = self
            .descendants(self.root)
            .into_iter()
            .find(|id| self.has_tag(*id, "title"));
        let title = match existing {
            Some(title) => title,
            None => {
                let Some(parent) = self.head().or_else(|| self.document_element()) else {
                    return Ok(());
                };
                let title = self.create_element("title".into(), Vec::new());
                self.append_child(parent, title)?;
                title
            }
        };
        self.set_text_content(title, value)
    }

    pub(crate) fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        if id.is_empty() {
            return None;
        }
        self.descendants(self.root)
            .into_iter()
            .find(|node| self.attr(*node, "id") == Some(id))
    }

    pub(crate) fn text_content(&self, node_id: NodeId) -> String {
        match &self.nodes[node_id.0].node_type {
            NodeType::Text(text) | NodeType::Comment(text) => text.clone(),
            NodeType::Doctype(_) => String::new(),
            NodeType::Document | NodeType::Element(_) => {
                let mut out = String::new();
                for id in self.descendants(node_id) {
                    if let NodeType::Text(text) = &self.nodes[id.0].node_type {
                        out.push_str(text);
                    }
                }
                out
            }
        }
    }

    pub(crate) fn set_text_content(&mut self, node_id: NodeId, value: &str) -> Result<()> {
        self.check(node_id)?;
        match &mut self.nodes[node_id.0].node_type {
            NodeType::Text(text) | NodeType::Comment(text) => {
                *text = value.to_string();
                return Ok(());
            }
            NodeType::Doctype(_) | NodeType::Document => return Ok(()),
            NodeType::Element(_) => {}
        }
        for child in self.nodes[node_id.0].children.clone() {
            self.detach(child);
        }
        if !value.is_empty() {
            let text = self.create_text(value.to_string());
            self.append_parsed(node_id, text);
        }
        Ok(())
    }

    pub(crate) fn is_form_associated(&self, node_id: NodeId) -> bool {
        self.tag_name(node_id).is_some_and(|tag| {
            FORM_ASSOCIATED_TAGS
                .iter()
                .any(|candidate| tag.eq_ignore_ascii_case(candidate))
        })
    }

    /// The `form` an element submits with: an explicit `form="id"` reference
    /// wins over the nearest ancestor form.
    pub(crate) fn form_owner(&self, node_id: NodeId) -> Option<NodeId> {
        if !self.is_form_associated(node_id) {
            return None;
        }
        if let Some(form_id) = self.attr(node_id, "form") {
            return self
                .get_element_by_id(form_id)
                .filter(|candidate| self.has_tag(*candidate, "form"));
        }
        let mut cursor = self.parent(node_id);
        while let Some(current) = cursor {
            if self.has_tag(current, "form") {
                return Some(current);
            }
            cursor = self.parent(current);
        }
        None
    }

    pub(crate) fn form_controls(&self, form: NodeId) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|node| self.form_owner(*node) == Some(form))
            .filter(|node| {
                !(self.has_tag(*node, "input")
                    && self
                        .attr(*node, "type")
                        .is_some_and(|ty| ty.eq_ignore_ascii_case("image")))
            })
            .collect()
    }

    /// Named-property lookup on a form: controls by `id` first, then `name`.
    pub(crate) fn form_named_control(&self, form: NodeId, name: &str) -> Option<NodeId> {
        let controls = self.form_controls(form);
        controls
            .iter()
            .copied()
            .find(|node| self.attr(*node, "id") == Some(name))
            .or_else(|| {
                controls
                    .iter()
                    .copied()
                    .find(|node| self.attr(*node, "name") == Some(name))
            })
    }

    pub(crate) fn serialize_document(&self) -> String {
        let mut out = String::new();
        for child in self.children(self.root) {
            self.serialize_node(*child, &mut out);
        }
        out
    }

    pub(crate) fn outer_html(&self, node_id: NodeId) -> String {
        let mut out = String::new();
        self.serialize_node(node_id, &mut out);
        out
    }

    pub(crate) fn inner_html(&self, node_id: NodeId) -> String {
        let mut out = String::new();
        for child in self.children(node_id) {
            self.serialize_node(*child, &mut out);
        }
        out
    }

    fn serialize_node(&self, node_id: NodeId, out: &mut String) {
        let node = &self.nodes[node_id.0];
        match &node.node_type {
            NodeType::Document => {
                for child in &node.children {
                    self.serialize_node(*child, out);
                }
            }
            NodeType::Doctype(name) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(name);
                out.push('>');
            }
            NodeType::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeType::Text(text) => {
                let raw_parent = self.mode == ParsingMode::Html
                    && node.parent.is_some_and(|parent| {
                        RAW_TEXT_TAGS.iter().any(|tag| self.has_tag(parent, tag))
                    });
                if raw_parent {
                    out.push_str(text);
                } else {
                    out.push_str(&escape_text(text, self.mode));
                }
            }
            NodeType::Element(element) => {
                out.push('<');
                out.push_str(&element.tag_name);
                for (name, value) in &element.attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_attr(value, self.mode));
                    out.push('"');
                }
                match self.mode {
                    ParsingMode::Html => {
                        out.push('>');
                        if crate::html::is_void_tag(&element.tag_name) {
                            return;
                        }
                    }
                    ParsingMode::Xml => {
                        if node.children.is_empty() {
                            out.push_str("/>");
                            return;
                        }
                        out.push('>');
                    }
                }
                for child in &node.children {
                    self.serialize_node(*child, out);
                }
                out.push_str("</");
                out.push_str(&element.tag_name);
                out.push('>');
            }
        }
    }
}

fn escape_text(text: &str, mode: ParsingMode) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{00A0}' if mode == ParsingMode::Html => out.push_str("&nbsp;"),
            other => out.push(other),
        }
    }
    out
}

fn escape_attr(value: &str, mode: ParsingMode) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' if mode == ParsingMode::Xml => out.push_str("&lt;"),
            '\u{00A0}' if mode == ParsingMode::Html => out.push_str("&nbsp;"),
            other => out.push(other),
        }
    }
    out
}
