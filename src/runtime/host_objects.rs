use super::{Exception, Host, ScriptResult};
use crate::console::ConsoleLevel;
use crate::dom::{NodeId, NodeType, ParsingMode};
use crate::events::{Event, EventTarget, Listener, ListenerCallback};
use crate::handlers::handler_accessor;
use crate::script::value::{strict_equals, string_to_number};
use crate::script::{ArrayRef, FunctionRef, FunctionValue, ObjectRef, Value, parse_program};

/// Host functions reachable from script. Each one is bound to the value it
/// was read from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum HostMethod {
    ConsoleLog(ConsoleLevel),
    GetElementById,
    CreateElement,
    CreateTextNode,
    GetAttribute,
    SetAttribute,
    RemoveAttribute,
    HasAttribute,
    AppendChild,
    RemoveChild,
    AddEventListener,
    RemoveEventListener,
    DispatchEvent,
    Click,
    PreventDefault,
    StopPropagation,
    StopImmediatePropagation,
    ArrayPush,
    ArrayJoin,
    ArrayIndexOf,
    StringIndexOf,
    StringIncludes,
    StringToUpperCase,
    StringToLowerCase,
    StringTrim,
    StringSlice,
    FunctionCall,
    ParseInt,
    ParseFloat,
    IsNaN,
    StringCtor,
    NumberCtor,
    BooleanCtor,
    ErrorCtor(&'static str),
    EventCtor,
    Eval,
}

impl HostMethod {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::ConsoleLog(level) => match level {
                ConsoleLevel::Info => "info",
                ConsoleLevel::Warn => "warn",
                ConsoleLevel::Error => "error",
                _ => "log",
            },
            Self::GetElementById => "getElementById",
            Self::CreateElement => "createElement",
            Self::CreateTextNode => "createTextNode",
            Self::GetAttribute => "getAttribute",
            Self::SetAttribute => "setAttribute",
            Self::RemoveAttribute => "removeAttribute",
            Self::HasAttribute => "hasAttribute",
            Self::AppendChild => "appendChild",
            Self::RemoveChild => "removeChild",
            Self::AddEventListener => "addEventListener",
            Self::RemoveEventListener => "removeEventListener",
            Self::DispatchEvent => "dispatchEvent",
            Self::Click => "click",
            Self::PreventDefault => "preventDefault",
            Self::StopPropagation => "stopPropagation",
            Self::StopImmediatePropagation => "stopImmediatePropagation",
            Self::ArrayPush => "push",
            Self::ArrayJoin => "join",
            Self::ArrayIndexOf | Self::StringIndexOf => "indexOf",
            Self::StringIncludes => "includes",
            Self::StringToUpperCase => "toUpperCase",
            Self::StringToLowerCase => "toLowerCase",
            Self::StringTrim => "trim",
            Self::StringSlice => "slice",
            Self::FunctionCall => "call",
            Self::ParseInt => "parseInt",
            Self::ParseFloat => "parseFloat",
            Self::IsNaN => "isNaN",
            Self::StringCtor => "String",
            Self::NumberCtor => "Number",
            Self::BooleanCtor => "Boolean",
            Self::ErrorCtor(name) => name,
            Self::EventCtor => "Event",
            Self::Eval => "eval",
        }
    }
}

const WINDOW_PROPERTIES: &[&str] = &[
    "window",
    "self",
    "top",
    "document",
    "console",
    "eval",
    "parseInt",
    "parseFloat",
    "isNaN",
    "String",
    "Number",
    "Boolean",
    "Error",
    "TypeError",
    "RangeError",
    "Event",
    "addEventListener",
    "removeEventListener",
    "dispatchEvent",
    "NaN",
    "Infinity",
    "undefined",
];

const EVENT_TARGET_METHODS: &[&str] = &["addEventListener", "removeEventListener", "dispatchEvent"];

const DOCUMENT_PROPERTIES: &[&str] = &[
    "documentElement",
    "head",
    "body",
    "title",
    "URL",
    "documentURI",
    "referrer",
    "contentType",
    "cookie",
    "readyState",
    "defaultView",
    "getElementById",
    "createElement",
    "createTextNode",
    "nodeName",
    "nodeType",
    "appendChild",
    "removeChild",
];

const ELEMENT_PROPERTIES: &[&str] = &[
    "id",
    "className",
    "title",
    "tagName",
    "nodeName",
    "nodeType",
    "textContent",
    "innerHTML",
    "outerHTML",
    "parentNode",
    "parentElement",
    "children",
    "ownerDocument",
    "getAttribute",
    "setAttribute",
    "removeAttribute",
    "hasAttribute",
    "appendChild",
    "removeChild",
    "click",
];

const FORM_CONTROL_PROPERTIES: &[&str] = &["form", "name", "value", "type", "disabled"];

const FORM_PROPERTIES: &[&str] = &["name", "action", "method", "elements", "length"];

const CHARACTER_DATA_PROPERTIES: &[&str] =
    &["nodeName", "nodeType", "textContent", "data", "parentNode"];

const EVENT_PROPERTIES: &[&str] = &[
    "type",
    "target",
    "currentTarget",
    "eventPhase",
    "bubbles",
    "cancelable",
    "defaultPrevented",
    "returnValue",
    "cancelBubble",
    "preventDefault",
    "stopPropagation",
    "stopImmediatePropagation",
    "message",
    "filename",
    "lineno",
    "colno",
    "error",
];

fn is_hyperlink_tag(tag: &str) -> bool {
    ["a", "area", "link", "base"]
        .iter()
        .any(|candidate| tag.eq_ignore_ascii_case(candidate))
}

fn native(method: HostMethod, receiver: Value) -> Value {
    Value::Function(FunctionRef::native(method, receiver))
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

impl Host {
    fn node_or_null(node: Option<NodeId>) -> Value {
        node.map_or(Value::Null, Value::Node)
    }

    fn resolve_url(&self, raw: &str) -> String {
        self.document
            .url
            .join(raw)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| raw.to_string())
    }

    /// `ToString` with access to the document, for values whose string form
    /// depends on it.
    pub(crate) fn stringify(&self, value: &Value) -> String {
        match value {
            Value::Node(node) if self.dom.contains(*node) => match &self.dom.node(*node).node_type {
                NodeType::Document => match self.dom.mode() {
                    ParsingMode::Html => "[object HTMLDocument]".into(),
                    ParsingMode::Xml => "[object XMLDocument]".into(),
                },
                NodeType::Element(element) => {
                    match element.attr("href") {
                        Some(href) if is_hyperlink_tag(&element.tag_name) => self.resolve_url(href),
                        _ if self.dom.mode() == ParsingMode::Html => "[object HTMLElement]".into(),
                        _ => "[object Element]".into(),
                    }
                }
                NodeType::Text(_) => "[object Text]".into(),
                NodeType::Comment(_) => "[object Comment]".into(),
                NodeType::Doctype(_) => "[object DocumentType]".into(),
            },
            Value::Array(items) => items
                .borrow()
                .iter()
                .map(|item| match item {
                    Value::Undefined | Value::Null => String::new(),
                    other => self.stringify(other),
                })
                .collect::<Vec<_>>()
                .join(","),
            other => other.to_string(),
        }
    }

    pub(crate) fn describe(&self, value: &Value) -> String {
        match value {
            Value::String(text) => format!("\"{text}\""),
            other => self.stringify(other),
        }
    }

    pub(crate) fn has_property(&self, target: &Value, name: &str) -> bool {
        match target {
            Value::Window => {
                WINDOW_PROPERTIES.contains(&name)
                    || handler_accessor(name).is_some()
                    || self.sandbox.realm().globals.get(name).is_some()
            }
            Value::Node(node) => self.node_has_property(*node, name),
            Value::Object(object) => object.borrow().has_entry(name),
            Value::Array(items) => {
                matches!(name, "length" | "push" | "join" | "indexOf")
                    || name
                        .parse::<usize>()
                        .is_ok_and(|index| index < items.len())
            }
            Value::String(_) => matches!(
                name,
                "length" | "indexOf" | "includes" | "toUpperCase" | "toLowerCase" | "trim" | "slice"
            ),
            Value::Event(_) => EVENT_PROPERTIES.contains(&name),
            Value::Function(_) => matches!(name, "call" | "name"),
            _ => false,
        }
    }

    fn node_has_property(&self, node: NodeId, name: &str) -> bool {
        if !self.dom.contains(node) {
            return false;
        }
        if self.expando(node).is_some_and(|expando| expando.borrow().has_entry(name)) {
            return true;
        }
        match &self.dom.node(node).node_type {
            NodeType::Document => {
                handler_accessor(name).is_some()
                    || DOCUMENT_PROPERTIES.contains(&name)
                    || EVENT_TARGET_METHODS.contains(&name)
            }
            NodeType::Element(element) => {
                handler_accessor(name).is_some()
                    || ELEMENT_PROPERTIES.contains(&name)
                    || EVENT_TARGET_METHODS.contains(&name)
                    || (self.dom.is_form_associated(node) && FORM_CONTROL_PROPERTIES.contains(&name))
                    || (is_hyperlink_tag(&element.tag_name) && name == "href")
                    || (element.tag_name.eq_ignore_ascii_case("form")
                        && (FORM_PROPERTIES.contains(&name)
                            || self.dom.form_named_control(node, name).is_some()))
            }
            NodeType::Text(_) | NodeType::Comment(_) => CHARACTER_DATA_PROPERTIES.contains(&name),
            NodeType::Doctype(_) => matches!(name, "nodeName" | "nodeType" | "name"),
        }
    }

    pub(crate) fn get_property(&mut self, target: &Value, name: &str) -> ScriptResult<Value> {
        match target {
            Value::Undefined | Value::Null => Err(Exception::type_error(format!(
                "Cannot read properties of {target} (reading '{name}')"
            ))),
            Value::Window => Ok(self.window_get(name)),
            Value::Node(node) => self.node_get(*node, name),
            Value::Object(object) => Ok(object.get(name).unwrap_or_default()),
            Value::Array(items) => Ok(match name {
                "length" => Value::Number(items.len() as f64),
                "push" => native(HostMethod::ArrayPush, target.clone()),
                "join" => native(HostMethod::ArrayJoin, target.clone()),
                "indexOf" => native(HostMethod::ArrayIndexOf, target.clone()),
                index => index
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| items.borrow().get(index).cloned())
                    .unwrap_or_default(),
            }),
            Value::String(text) => Ok(match name {
                "length" => Value::Number(text.encode_utf16().count() as f64),
                "indexOf" => native(HostMethod::StringIndexOf, target.clone()),
                "includes" => native(HostMethod::StringIncludes, target.clone()),
                "toUpperCase" => native(HostMethod::StringToUpperCase, target.clone()),
                "toLowerCase" => native(HostMethod::StringToLowerCase, target.clone()),
                "trim" => native(HostMethod::StringTrim, target.clone()),
                "slice" => native(HostMethod::StringSlice, target.clone()),
                index => index
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| text.chars().nth(index))
                    .map(|ch| Value::String(ch.to_string()))
                    .unwrap_or_default(),
            }),
            Value::Event(event) => Ok(self.event_get(event, name)),
            Value::Function(function) => Ok(match name {
                "call" => native(HostMethod::FunctionCall, target.clone()),
                "name" => Value::String(match function.as_ref() {
                    FunctionValue::Script { def, .. } => def.name.clone().unwrap_or_default(),
                    FunctionValue::Native { method, .. } => method.name().to_string(),
                }),
                _ => Value::Undefined,
            }),
            Value::Bool(_) | Value::Number(_) => Ok(Value::Undefined),
        }
    }

    pub(crate) fn set_property(&mut self, target: &Value, name: &str, value: Value) -> ScriptResult<()> {
        match target {
            Value::Undefined | Value::Null => Err(Exception::type_error(format!(
                "Cannot set properties of {target} (setting '{name}')"
            ))),
            Value::Window => {
                if let Some(accessor) = handler_accessor(name) {
                    (accessor.set)(self, EventTarget::Window, accessor.event, value);
                } else if !WINDOW_PROPERTIES.contains(&name) {
                    self.sandbox.realm().globals.set(name, value);
                }
                Ok(())
            }
            Value::Node(node) => self.node_set(*node, name, value),
            Value::Object(object) => {
                object.set(name, value);
                Ok(())
            }
            Value::Array(items) => {
                if let Ok(index) = name.parse::<usize>() {
                    let mut items = items.borrow_mut();
                    if index >= items.len() {
                        items.resize(index + 1, Value::Undefined);
                    }
                    items[index] = value;
                }
                Ok(())
            }
            Value::Event(event) => {
                match name {
                    "returnValue" if !value.truthy() => event.prevent_default(),
                    "cancelBubble" if value.truthy() => {
                        event.state_mut().propagation_stopped = true;
                    }
                    _ => {}
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn window_get(&mut self, name: &str) -> Value {
        match name {
            "window" | "self" => Value::Window,
            "top" => self.sandbox.realm().top.clone(),
            "document" => Value::Node(self.dom.root()),
            "console" => Value::Object(self.sandbox.realm().console.clone()),
            "eval" => native(HostMethod::Eval, Value::Undefined),
            "parseInt" => native(HostMethod::ParseInt, Value::Undefined),
            "parseFloat" => native(HostMethod::ParseFloat, Value::Undefined),
            "isNaN" => native(HostMethod::IsNaN, Value::Undefined),
            "String" => native(HostMethod::StringCtor, Value::Undefined),
            "Number" => native(HostMethod::NumberCtor, Value::Undefined),
            "Boolean" => native(HostMethod::BooleanCtor, Value::Undefined),
            "Error" => native(HostMethod::ErrorCtor("Error"), Value::Undefined),
            "TypeError" => native(HostMethod::ErrorCtor("TypeError"), Value::Undefined),
            "RangeError" => native(HostMethod::ErrorCtor("RangeError"), Value::Undefined),
            "Event" => native(HostMethod::EventCtor, Value::Undefined),
            "addEventListener" => native(HostMethod::AddEventListener, Value::Window),
            "removeEventListener" => native(HostMethod::RemoveEventListener, Value::Window),
            "dispatchEvent" => native(HostMethod::DispatchEvent, Value::Window),
            "NaN" => Value::Number(f64::NAN),
            "Infinity" => Value::Number(f64::INFINITY),
            "undefined" => Value::Undefined,
            _ => {
                if let Some(accessor) = handler_accessor(name) {
                    return (accessor.get)(self, EventTarget::Window, accessor.event);
                }
                self.sandbox.realm().globals.get(name).unwrap_or_default()
            }
        }
    }

    fn node_get(&mut self, node: NodeId, name: &str) -> ScriptResult<Value> {
        self.dom.check(node)?;
        let receiver = Value::Node(node);
        if EVENT_TARGET_METHODS.contains(&name) {
            let method = match name {
                "addEventListener" => HostMethod::AddEventListener,
                "removeEventListener" => HostMethod::RemoveEventListener,
                _ => HostMethod::DispatchEvent,
            };
            return Ok(native(method, receiver));
        }

        let node_type = self.dom.node(node).node_type.clone();
        if matches!(node_type, NodeType::Document | NodeType::Element(_)) {
            if let Some(accessor) = handler_accessor(name) {
                return Ok((accessor.get)(self, EventTarget::Node(node), accessor.event));
            }
        }
        let known = match node_type {
            NodeType::Document => self.document_get(name),
            NodeType::Element(_) => self.element_get(node, name),
            NodeType::Text(text) | NodeType::Comment(text) => {
                let is_text = matches!(self.dom.node(node).node_type, NodeType::Text(_));
                match name {
                    "textContent" | "data" => Some(Value::String(text)),
                    "parentNode" => Some(Self::node_or_null(self.dom.parent(node))),
                    "nodeType" => Some(Value::Number(if is_text { 3.0 } else { 8.0 })),
                    "nodeName" => Some(Value::String(
                        if is_text { "#text" } else { "#comment" }.to_string(),
                    )),
                    _ => None,
                }
            }
            NodeType::Doctype(doctype) => match name {
                "nodeName" | "name" => Some(Value::String(doctype)),
                "nodeType" => Some(Value::Number(10.0)),
                _ => None,
            },
        };
        if let Some(value) = known {
            return Ok(value);
        }
        Ok(self
            .expando(node)
            .and_then(|expando| expando.get(name))
            .unwrap_or_default())
    }

    fn document_get(&self, name: &str) -> Option<Value> {
        let root = self.dom.root();
        Some(match name {
            "documentElement" => Self::node_or_null(self.dom.document_element()),
            "head" => Self::node_or_null(self.dom.head()),
            "body" => Self::node_or_null(self.dom.body()),
            "title" => Value::String(self.dom.title()),
            "URL" | "documentURI" => Value::String(self.document.url.to_string()),
            "referrer" => Value::String(self.document.referrer.clone()),
            "contentType" => Value::String(self.document.content_type.clone()),
            "cookie" => Value::String(
                self.document
                    .cookie_jar
                    .cookie_string_for(&self.document.url, false),
            ),
            "readyState" => Value::String(self.document.ready_state.as_str().to_string()),
            "defaultView" => Value::Window,
            "nodeName" => Value::String("#document".into()),
            "nodeType" => Value::Number(9.0),
            "getElementById" => native(HostMethod::GetElementById, Value::Node(root)),
            "createElement" => native(HostMethod::CreateElement, Value::Node(root)),
            "createTextNode" => native(HostMethod::CreateTextNode, Value::Node(root)),
            "appendChild" => native(HostMethod::AppendChild, Value::Node(root)),
            "removeChild" => native(HostMethod::RemoveChild, Value::Node(root)),
            _ => return None,
        })
    }

    fn element_get(&self, node: NodeId, name: &str) -> Option<Value> {
        let receiver = Value::Node(node);
        let tag = self.dom.tag_name(node).unwrap_or_default().to_ascii_lowercase();
        let attr_or_empty =
            |host: &Self, attr: &str| Value::String(host.dom.attr(node, attr).unwrap_or_default().to_string());

        let value = match name {
            "id" => attr_or_empty(self, "id"),
            "className" => attr_or_empty(self, "class"),
            "title" => attr_or_empty(self, "title"),
            "tagName" | "nodeName" => {
                Value::String(self.dom.qualified_tag_name(node).unwrap_or_default())
            }
            "nodeType" => Value::Number(1.0),
            "textContent" => Value::String(self.dom.text_content(node)),
            "innerHTML" => Value::String(self.dom.inner_html(node)),
            "outerHTML" => Value::String(self.dom.outer_html(node)),
            "parentNode" => Self::node_or_null(self.dom.parent(node)),
            "parentElement" => {
                Self::node_or_null(self.dom.parent(node).filter(|parent| self.dom.is_element(*parent)))
            }
            "children" => Value::Array(ArrayRef::new(
                self.dom
                    .children(node)
                    .iter()
                    .copied()
                    .filter(|child| self.dom.is_element(*child))
                    .map(Value::Node)
                    .collect(),
            )),
            "ownerDocument" => Value::Node(self.dom.root()),
            "getAttribute" => native(HostMethod::GetAttribute, receiver),
            "setAttribute" => native(HostMethod::SetAttribute, receiver),
            "removeAttribute" => native(HostMethod::RemoveAttribute, receiver),
            "hasAttribute" => native(HostMethod::HasAttribute, receiver),
            "appendChild" => native(HostMethod::AppendChild, receiver),
            "removeChild" => native(HostMethod::RemoveChild, receiver),
            "click" => native(HostMethod::Click, receiver),
            "href" if is_hyperlink_tag(&tag) => Value::String(
                self.dom
                    .attr(node, "href")
                    .map(|href| self.resolve_url(href))
                    .unwrap_or_default(),
            ),
            "form" if self.dom.is_form_associated(node) => {
                Self::node_or_null(self.dom.form_owner(node))
            }
            "name" if self.dom.is_form_associated(node) || tag == "form" => attr_or_empty(self, "name"),
            "value" if self.dom.is_form_associated(node) => {
                if tag == "textarea" {
                    Value::String(self.dom.text_content(node))
                } else {
                    attr_or_empty(self, "value")
                }
            }
            "type" if self.dom.is_form_associated(node) => {
                let default = match tag.as_str() {
                    "input" => "text",
                    "button" => "submit",
                    _ => "",
                };
                Value::String(
                    self.dom
                        .attr(node, "type")
                        .map(str::to_ascii_lowercase)
                        .unwrap_or_else(|| default.to_string()),
                )
            }
            "disabled" if self.dom.is_form_associated(node) => {
                Value::Bool(self.dom.attr(node, "disabled").is_some())
            }
            "action" if tag == "form" => Value::String(match self.dom.attr(node, "action") {
                Some(action) if !action.is_empty() => self.resolve_url(action),
                _ => self.document.url.to_string(),
            }),
            "method" if tag == "form" => {
                let method = self
                    .dom
                    .attr(node, "method")
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                Value::String(match method.as_str() {
                    "post" | "dialog" => method,
                    _ => "get".to_string(),
                })
            }
            "elements" if tag == "form" => Value::Array(ArrayRef::new(
                self.dom.form_controls(node).into_iter().map(Value::Node).collect(),
            )),
            "length" if tag == "form" => Value::Number(self.dom.form_controls(node).len() as f64),
            other if tag == "form" => {
                return self.dom.form_named_control(node, other).map(Value::Node);
            }
            _ => return None,
        };
        Some(value)
    }

    fn node_set(&mut self, node: NodeId, name: &str, value: Value) -> ScriptResult<()> {
        self.dom.check(node)?;
        let is_document = node == self.dom.root();
        let is_element = self.dom.is_element(node);
        if let Some(accessor) = handler_accessor(name).filter(|_| is_document || is_element) {
            (accessor.set)(self, EventTarget::Node(node), accessor.event, value);
            return Ok(());
        }

        if is_document {
            match name {
                "title" => {
                    let title = self.stringify(&value);
                    self.dom.set_title(&title)?;
                    return Ok(());
                }
                "cookie" => {
                    let cookie = self.stringify(&value);
                    // Unparsable cookies are ignored, as in browsers.
                    let _ = self
                        .document
                        .cookie_jar
                        .set_cookie_for(&cookie, &self.document.url, false);
                    return Ok(());
                }
                _ if DOCUMENT_PROPERTIES.contains(&name) => return Ok(()),
                _ => {}
            }
        } else if is_element {
            let tag = self.dom.tag_name(node).unwrap_or_default().to_ascii_lowercase();
            let reflected = match name {
                "id" => Some("id"),
                "className" => Some("class"),
                "title" => Some("title"),
                "href" if is_hyperlink_tag(&tag) => Some("href"),
                "name" | "value" | "type" if self.dom.is_form_associated(node) || tag == "form" => {
                    Some(name)
                }
                "action" | "method" if tag == "form" => Some(name),
                _ => None,
            };
            if let Some(attr) = reflected {
                let text = self.stringify(&value);
                self.set_attribute(node, attr, &text)?;
                return Ok(());
            }
            match name {
                "textContent" => {
                    let text = match value {
                        Value::Null => String::new(),
                        other => self.stringify(&other),
                    };
                    self.dom.set_text_content(node, &text)?;
                    return Ok(());
                }
                "disabled" if self.dom.is_form_associated(node) => {
                    if value.truthy() {
                        self.set_attribute(node, "disabled", "")?;
                    } else {
                        self.remove_attribute(node, "disabled")?;
                    }
                    return Ok(());
                }
                _ if ELEMENT_PROPERTIES.contains(&name) => return Ok(()),
                _ => {}
            }
        } else if matches!(name, "textContent" | "data") {
            let text = self.stringify(&value);
            self.dom.set_text_content(node, &text)?;
            return Ok(());
        }

        self.expando_or_insert(node).set(name, value);
        Ok(())
    }

    fn event_get(&self, event: &Event, name: &str) -> Value {
        let receiver = Value::Event(event.clone());
        let state = event.state();
        let error = state.error.as_ref();
        match name {
            "type" => Value::String(state.event_type.clone()),
            "target" => state.target.map_or(Value::Null, EventTarget::to_value),
            "currentTarget" => state.current_target.map_or(Value::Null, EventTarget::to_value),
            "eventPhase" => Value::Number(state.phase.as_number()),
            "bubbles" => Value::Bool(state.bubbles),
            "cancelable" => Value::Bool(state.cancelable),
            "defaultPrevented" => Value::Bool(state.canceled),
            "returnValue" => Value::Bool(!state.canceled),
            "cancelBubble" => Value::Bool(state.propagation_stopped),
            "preventDefault" => native(HostMethod::PreventDefault, receiver),
            "stopPropagation" => native(HostMethod::StopPropagation, receiver),
            "stopImmediatePropagation" => native(HostMethod::StopImmediatePropagation, receiver),
            "message" => error.map_or(Value::Undefined, |e| Value::String(e.message.clone())),
            "filename" => error.map_or(Value::Undefined, |e| Value::String(e.filename.clone())),
            "lineno" => error.map_or(Value::Undefined, |e| Value::Number(f64::from(e.lineno))),
            "colno" => error.map_or(Value::Undefined, |e| Value::Number(f64::from(e.colno))),
            "error" => error.map_or(Value::Undefined, |e| e.error.clone()),
            _ => Value::Undefined,
        }
    }

    fn event_target_of(&self, receiver: &Value) -> ScriptResult<EventTarget> {
        match receiver {
            Value::Window => Ok(EventTarget::Window),
            Value::Node(node) if self.dom.contains(*node) => Ok(EventTarget::Node(*node)),
            other => Err(Exception::type_error(format!(
                "{} is not an event target",
                self.describe(other)
            ))),
        }
    }

    fn node_of(&self, value: &Value, what: &str) -> ScriptResult<NodeId> {
        match value {
            Value::Node(node) if self.dom.contains(*node) => Ok(*node),
            other => Err(Exception::type_error(format!(
                "{what}: {} is not a node",
                self.describe(other)
            ))),
        }
    }

    pub(crate) fn call_native(
        &mut self,
        method: HostMethod,
        receiver: Value,
        args: Vec<Value>,
    ) -> ScriptResult<Value> {
        match method {
            HostMethod::ConsoleLog(level) => {
                let message = args
                    .iter()
                    .map(|value| self.stringify(value))
                    .collect::<Vec<_>>()
                    .join(" ");
                self.console.emit(level, message);
                Ok(Value::Undefined)
            }
            HostMethod::GetElementById => {
                let id = self.stringify(&arg(&args, 0));
                Ok(Self::node_or_null(self.dom.get_element_by_id(&id)))
            }
            HostMethod::CreateElement => {
                let tag = self.stringify(&arg(&args, 0));
                let tag = self.dom.normalize_attr_name(&tag);
                Ok(Value::Node(self.dom.create_element(tag, Vec::new())))
            }
            HostMethod::CreateTextNode => {
                let text = self.stringify(&arg(&args, 0));
                Ok(Value::Node(self.dom.create_text(text)))
            }
            HostMethod::GetAttribute => {
                let node = self.node_of(&receiver, "getAttribute")?;
                let name = self.dom.normalize_attr_name(&self.stringify(&arg(&args, 0)));
                Ok(self
                    .dom
                    .attr(node, &name)
                    .map_or(Value::Null, |value| Value::String(value.to_string())))
            }
            HostMethod::SetAttribute => {
                let node = self.node_of(&receiver, "setAttribute")?;
                let name = self.dom.normalize_attr_name(&self.stringify(&arg(&args, 0)));
                let value = self.stringify(&arg(&args, 1));
                self.set_attribute(node, &name, &value)?;
                Ok(Value::Undefined)
            }
            HostMethod::RemoveAttribute => {
                let node = self.node_of(&receiver, "removeAttribute")?;
                let name = self.dom.normalize_attr_name(&self.stringify(&arg(&args, 0)));
                self.remove_attribute(node, &name)?;
                Ok(Value::Undefined)
            }
            HostMethod::HasAttribute => {
                let node = self.node_of(&receiver, "hasAttribute")?;
                let name = self.dom.normalize_attr_name(&self.stringify(&arg(&args, 0)));
                Ok(Value::Bool(self.dom.attr(node, &name).is_some()))
            }
            HostMethod::AppendChild => {
                let parent = self.node_of(&receiver, "appendChild")?;
                let child = self.node_of(&arg(&args, 0), "appendChild")?;
                self.dom.append_child(parent, child)?;
                Ok(Value::Node(child))
            }
            HostMethod::RemoveChild => {
                let parent = self.node_of(&receiver, "removeChild")?;
                let child = self.node_of(&arg(&args, 0), "removeChild")?;
                self.dom.remove_child(parent, child)?;
                Ok(Value::Node(child))
            }
            HostMethod::AddEventListener | HostMethod::RemoveEventListener => {
                let target = self.event_target_of(&receiver)?;
                let event_type = self.stringify(&arg(&args, 0));
                let Value::Function(callback) = arg(&args, 1) else {
                    return Ok(Value::Undefined);
                };
                let capture = match arg(&args, 2) {
                    Value::Object(options) => options.get("capture").is_some_and(|v| v.truthy()),
                    other => other.truthy(),
                };
                let callback = ListenerCallback::Script(callback);
                if method == HostMethod::AddEventListener {
                    self.listeners
                        .add(target, event_type, Listener { capture, callback });
                } else {
                    self.listeners.remove(target, &event_type, capture, &callback);
                }
                Ok(Value::Undefined)
            }
            HostMethod::DispatchEvent => {
                let target = self.event_target_of(&receiver)?;
                let Value::Event(event) = arg(&args, 0) else {
                    return Err(Exception::type_error(
                        "dispatchEvent: parameter 1 is not of type 'Event'",
                    ));
                };
                let not_canceled = self.dispatch_event(target, &event)?;
                Ok(Value::Bool(not_canceled))
            }
            HostMethod::Click => {
                let node = self.node_of(&receiver, "click")?;
                self.click_node(node)?;
                Ok(Value::Undefined)
            }
            HostMethod::PreventDefault
            | HostMethod::StopPropagation
            | HostMethod::StopImmediatePropagation => {
                let Value::Event(event) = receiver else {
                    return Err(Exception::type_error("Illegal invocation"));
                };
                match method {
                    HostMethod::PreventDefault => event.prevent_default(),
                    HostMethod::StopPropagation => event.state_mut().propagation_stopped = true,
                    _ => {
                        let mut state = event.state_mut();
                        state.propagation_stopped = true;
                        state.immediate_propagation_stopped = true;
                    }
                }
                Ok(Value::Undefined)
            }
            HostMethod::ArrayPush | HostMethod::ArrayJoin | HostMethod::ArrayIndexOf => {
                let Value::Array(items) = receiver else {
                    return Err(Exception::type_error("Illegal invocation"));
                };
                match method {
                    HostMethod::ArrayPush => {
                        items.borrow_mut().extend(args);
                        Ok(Value::Number(items.len() as f64))
                    }
                    HostMethod::ArrayJoin => {
                        let separator = match arg(&args, 0) {
                            Value::Undefined => ",".to_string(),
                            other => self.stringify(&other),
                        };
                        let parts = items
                            .borrow()
                            .iter()
                            .map(|item| match item {
                                Value::Undefined | Value::Null => String::new(),
                                other => self.stringify(other),
                            })
                            .collect::<Vec<_>>();
                        Ok(Value::String(parts.join(&separator)))
                    }
                    _ => {
                        let needle = arg(&args, 0);
                        let position = items
                            .borrow()
                            .iter()
                            .position(|item| strict_equals(item, &needle));
                        Ok(Value::Number(position.map_or(-1.0, |index| index as f64)))
                    }
                }
            }
            HostMethod::StringIndexOf
            | HostMethod::StringIncludes
            | HostMethod::StringToUpperCase
            | HostMethod::StringToLowerCase
            | HostMethod::StringTrim
            | HostMethod::StringSlice => {
                let Value::String(text) = receiver else {
                    return Err(Exception::type_error("Illegal invocation"));
                };
                Ok(self.call_string_method(method, &text, &args))
            }
            HostMethod::FunctionCall => {
                let Value::Function(function) = receiver else {
                    return Err(Exception::type_error("Illegal invocation"));
                };
                let mut args = args.into_iter();
                let this = args.next().unwrap_or_default();
                self.call_function(&function, this, args.collect())
            }
            HostMethod::ParseInt => {
                let text = self.stringify(&arg(&args, 0));
                let radix = match arg(&args, 1) {
                    Value::Undefined => 0,
                    other => self.to_number(&other) as u32,
                };
                Ok(Value::Number(parse_int(&text, radix)))
            }
            HostMethod::ParseFloat => {
                let text = self.stringify(&arg(&args, 0));
                Ok(Value::Number(parse_float(&text)))
            }
            HostMethod::IsNaN => Ok(Value::Bool(self.to_number(&arg(&args, 0)).is_nan())),
            HostMethod::StringCtor => Ok(Value::String(match args.first() {
                Some(value) => self.stringify(value),
                None => String::new(),
            })),
            HostMethod::NumberCtor => Ok(Value::Number(match args.first() {
                Some(value) => self.to_number(value),
                None => 0.0,
            })),
            HostMethod::BooleanCtor => Ok(Value::Bool(arg(&args, 0).truthy())),
            HostMethod::ErrorCtor(name) => {
                let message = match arg(&args, 0) {
                    Value::Undefined => String::new(),
                    other => self.stringify(&other),
                };
                Ok(Value::Object(ObjectRef::error(name, &message)))
            }
            HostMethod::EventCtor => {
                let event_type = self.stringify(&arg(&args, 0));
                let mut event = Event::new(event_type);
                if let Value::Object(init) = arg(&args, 1) {
                    event = event
                        .bubbles(init.get("bubbles").is_some_and(|v| v.truthy()))
                        .cancelable(init.get("cancelable").is_some_and(|v| v.truthy()));
                }
                Ok(Value::Event(event))
            }
            HostMethod::Eval => {
                let Value::String(source) = arg(&args, 0) else {
                    return Ok(arg(&args, 0));
                };
                let program = parse_program(&source)?;
                self.exec_program(&program)
            }
        }
    }

    fn call_string_method(&self, method: HostMethod, text: &str, args: &[Value]) -> Value {
        let chars = text.chars().collect::<Vec<_>>();
        match method {
            HostMethod::StringIndexOf | HostMethod::StringIncludes => {
                let needle = self.stringify(&arg(args, 0));
                let found = text
                    .find(&needle)
                    .map(|byte_index| text[..byte_index].chars().count());
                if method == HostMethod::StringIncludes {
                    Value::Bool(found.is_some())
                } else {
                    Value::Number(found.map_or(-1.0, |index| index as f64))
                }
            }
            HostMethod::StringToUpperCase => Value::String(text.to_uppercase()),
            HostMethod::StringToLowerCase => Value::String(text.to_lowercase()),
            HostMethod::StringTrim => Value::String(text.trim().to_string()),
            _ => {
                let len = chars.len() as f64;
                let clamp = |value: Value, default: f64| {
                    let raw = match value {
                        Value::Undefined => default,
                        other => self.to_number(&other),
                    };
                    let raw = if raw.is_nan() { 0.0 } else { raw.trunc() };
                    let index = if raw < 0.0 { (len + raw).max(0.0) } else { raw.min(len) };
                    index as usize
                };
                let start = clamp(arg(args, 0), 0.0);
                let end = clamp(arg(args, 1), len);
                if start >= end {
                    Value::String(String::new())
                } else {
                    Value::String(chars[start..end].iter().collect())
                }
            }
        }
    }
}

fn parse_int(text: &str, radix: u32) -> f64 {
    let trimmed = text.trim();
    let (negative, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let (radix, digits) = match radix {
        0 | 16
            if rest.starts_with("0x") || rest.starts_with("0X") =>
        {
            (16, &rest[2..])
        }
        0 => (10, rest),
        2..=36 => (radix, rest),
        _ => return f64::NAN,
    };
    let mut value: Option<f64> = None;
    for ch in digits.chars() {
        let Some(digit) = ch.to_digit(radix) else {
            break;
        };
        value = Some(value.unwrap_or(0.0) * f64::from(radix) + f64::from(digit));
    }
    match value {
        Some(value) if negative => -value,
        Some(value) => value,
        None => f64::NAN,
    }
}

fn parse_float(text: &str) -> f64 {
    let trimmed = text.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_exp = false;
    let bytes = trimmed.as_bytes();
    while end < bytes.len() {
        let b = bytes[end];
        let accepted = match b {
            b'0'..=b'9' => true,
            b'+' | b'-' => end == 0 || matches!(bytes[end - 1], b'e' | b'E'),
            b'.' if !seen_dot && !seen_exp => {
                seen_dot = true;
                true
            }
            b'e' | b'E' if !seen_exp && end > 0 => {
                seen_exp = true;
                true
            }
            _ => false,
        };
        if !accepted {
            break;
        }
        end += 1;
    }
    let mut candidate = &trimmed[..end];
    while !candidate.is_empty() {
        let value = string_to_number(candidate);
        if !value.is_nan() && !candidate.ends_with(['e', 'E', '+', '-']) {
            return value;
        }
        candidate = &candidate[..candidate.len() - 1];
    }
    if trimmed.starts_with("Infinity") || trimmed.starts_with("+Infinity") {
        return f64::INFINITY;
    }
    if trimmed.starts_with("-Infinity") {
        return f64::NEG_INFINITY;
    }
    f64::NAN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_int_stops_at_first_invalid_digit() {
        assert_eq!(parse_int("42px", 0), 42.0);
        assert_eq!(parse_int("  -0x1A", 0), -26.0);
        assert_eq!(parse_int("101", 2), 5.0);
        assert!(parse_int("px", 0).is_nan());
    }

    #[test]
    fn parse_float_reads_leading_number() {
        assert_eq!(parse_float("3.5em"), 3.5);
        assert_eq!(parse_float("1e3x"), 1000.0);
        assert_eq!(parse_float("-Infinity"), f64::NEG_INFINITY);
        assert!(parse_float(".").is_nan());
    }

    #[test]
    fn method_names_are_script_visible_names() {
        assert_eq!(HostMethod::ArrayIndexOf.name(), "indexOf");
        assert_eq!(HostMethod::ErrorCtor("TypeError").name(), "TypeError");
        assert_eq!(HostMethod::ConsoleLog(ConsoleLevel::Warn).name(), "warn");
    }
}
