use url::Url;

use crate::console::VirtualConsole;
use crate::cookies::CookieJar;
use crate::dom::{Dom, NodeId, NodeLocation, ParsingMode};
use crate::events::{Event, EventTarget};
use crate::handlers::{HandlerAccessor, canonical_event_name, handler_accessor};
use crate::html::{ParseSink, parse_document};
use crate::runtime::{DocumentState, Host, ReadyState, STACK_SIZE};
use crate::sandbox::{GlobalProxy, ScriptSandbox, ScriptingMode};
use crate::script::Value;
use crate::{Error, Result};

const ABOUT_BLANK: &str = "about:blank";

/// Construction options. Every field is optional and validated on its own
/// when the session is built.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    parsing_mode: Option<String>,
    content_type: Option<String>,
    url: Option<String>,
    referrer: Option<String>,
    cookie_jar: Option<CookieJar>,
    run_scripts: Option<String>,
    virtual_console: Option<VirtualConsole>,
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// `"html"` (default) or `"xml"`.
    pub fn parsing_mode(mut self, mode: impl Into<String>) -> Self {
        self.parsing_mode = Some(mode.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn cookie_jar(mut self, jar: CookieJar) -> Self {
        self.cookie_jar = Some(jar);
        self
    }

    /// `"outside-only"` or `"dangerously"`; absent leaves scripting disabled.
    pub fn run_scripts(mut self, mode: impl Into<String>) -> Self {
        self.run_scripts = Some(mode.into());
        self
    }

    pub fn virtual_console(mut self, console: VirtualConsole) -> Self {
        self.virtual_console = Some(console);
        self
    }
}

/// Session-level overrides applied without rebuilding the session. `None`
/// leaves a field untouched; `Some(Value::Undefined)` sets it to undefined.
#[derive(Debug, Clone, Default)]
pub struct WindowReconfiguration {
    pub top: Option<Value>,
}

fn parse_url(what: &'static str, input: &str) -> Result<Url> {
    Url::parse(input).map_err(|_| Error::InvalidUrl {
        what,
        input: input.to_string(),
    })
}

/// Feeds parse-time events into the session's host. The parser owns the
/// tree while it runs, so the host borrows it back for each callback.
struct SessionSink<'h> {
    host: &'h mut Host,
}

impl SessionSink<'_> {
    fn with_dom<T>(&mut self, dom: &mut Dom, f: impl FnOnce(&mut Host) -> T) -> T {
        std::mem::swap(&mut self.host.dom, dom);
        let out = f(self.host);
        std::mem::swap(&mut self.host.dom, dom);
        out
    }
}

impl ParseSink for SessionSink<'_> {
    fn element_inserted(&mut self, dom: &mut Dom, element: NodeId) -> Result<()> {
        let handler_attrs = dom
            .element(element)
            .map(|e| {
                e.attrs
                    .iter()
                    .filter(|(name, _)| name.starts_with("on"))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        if handler_attrs.is_empty() {
            return Ok(());
        }
        self.with_dom(dom, |host| {
            for (name, value) in &handler_attrs {
                host.attribute_changed(element, name, Some(value));
            }
        });
        Ok(())
    }

    fn attribute_merged(
        &mut self,
        dom: &mut Dom,
        element: NodeId,
        name: &str,
        value: &str,
    ) -> Result<()> {
        if name.starts_with("on") {
            self.with_dom(dom, |host| host.attribute_changed(element, name, Some(value)));
        }
        Ok(())
    }

    fn script_inserted(&mut self, dom: &mut Dom, script: NodeId) -> Result<()> {
        if !self.host.sandbox.mode().runs_parser_inserted_scripts() {
            return Ok(());
        }
        self.with_dom(dom, |host| host.run_script_element(script))
    }
}

/// One parsed document with its own scripting realm.
///
/// Handler attributes found in the markup compile lazily, the first time
/// their event fires or their `on<event>` property is read.
#[derive(Debug)]
pub struct Session {
    host: Host,
    parsing_mode: ParsingMode,
}

impl Session {
    pub fn new(markup: &str, options: SessionOptions) -> Result<Self> {
        stacker::grow(STACK_SIZE, || Self::build(markup, options))
    }

    fn build(markup: &str, options: SessionOptions) -> Result<Self> {
        let parsing_mode = match options.parsing_mode.as_deref() {
            Some(raw) => ParsingMode::parse(raw)?,
            None => ParsingMode::default(),
        };
        let scripting_mode = ScriptingMode::from_run_scripts(options.run_scripts.as_deref())?;
        let url = parse_url("url", options.url.as_deref().unwrap_or(ABOUT_BLANK))?;
        let referrer = parse_url("referrer", options.referrer.as_deref().unwrap_or(ABOUT_BLANK))?;
        let content_type = options
            .content_type
            .unwrap_or_else(|| parsing_mode.default_content_type().to_string());
        let cookie_jar = options.cookie_jar.unwrap_or_default();
        let console = options
            .virtual_console
            .unwrap_or_else(|| VirtualConsole::new().send_to_stderr());

        let document = DocumentState::new(url, referrer.to_string(), content_type, cookie_jar);
        let sandbox = ScriptSandbox::create_realm(scripting_mode);
        let mut host = Host::new(Dom::new(parsing_mode), document, sandbox, console);

        let mut dom = Dom::new(parsing_mode);
        parse_document(&mut dom, markup, &mut SessionSink { host: &mut host })?;
        host.dom = dom;

        host.document.ready_state = ReadyState::Complete;
        host.fire_event(EventTarget::Window, "load", false, false)?;

        Ok(Self { host, parsing_mode })
    }

    /// Canonical markup for the current tree.
    pub fn serialize(&self) -> String {
        self.host.dom.serialize_document()
    }

    /// Where `node` came from in the original markup. Nodes created or
    /// moved after parsing have no location.
    pub fn node_location(&self, node: NodeId) -> Option<NodeLocation> {
        self.host.dom.location(node).cloned()
    }

    pub fn reconfigure_window(&mut self, changes: WindowReconfiguration) {
        if let Some(top) = changes.top {
            self.host.sandbox.realm_mut().top = top;
        }
    }

    pub fn window_top(&self) -> Value {
        self.host.sandbox.realm().top.clone()
    }

    /// Replaces the document URL. The URL and origin are unchanged when
    /// `input` does not parse.
    pub fn change_url(&mut self, input: &str) -> Result<()> {
        let url = parse_url("url", input)?;
        self.host.document.set_url(url);
        Ok(())
    }

    pub fn url(&self) -> &str {
        self.host.document.url.as_str()
    }

    pub fn document_uri(&self) -> &str {
        self.url()
    }

    pub fn referrer(&self) -> &str {
        &self.host.document.referrer
    }

    pub fn origin(&self) -> &str {
        &self.host.document.origin
    }

    pub fn content_type(&self) -> &str {
        &self.host.document.content_type
    }

    pub fn parsing_mode(&self) -> ParsingMode {
        self.parsing_mode
    }

    pub fn ready_state(&self) -> &'static str {
        self.host.document.ready_state.as_str()
    }

    pub fn cookie_jar(&self) -> &CookieJar {
        &self.host.document.cookie_jar
    }

    pub fn virtual_console(&self) -> &VirtualConsole {
        &self.host.console
    }

    pub fn scripting_mode(&self) -> ScriptingMode {
        self.host.sandbox.mode()
    }

    /// The realm's global proxy; `None` when scripting is disabled.
    pub fn global_proxy(&mut self) -> Option<GlobalProxy<'_>> {
        if self.host.sandbox.mode().exposes_global_proxy() {
            Some(GlobalProxy::new(&mut self.host))
        } else {
            None
        }
    }

    /// Evaluates `source` in the session's realm.
    pub fn eval(&mut self, source: &str) -> Result<Value> {
        let Some(mut proxy) = self.global_proxy() else {
            return Err(Error::ScriptingDisabled);
        };
        stacker::grow(STACK_SIZE, || proxy.eval(source))
    }

    pub fn document(&self) -> NodeId {
        self.host.dom.root()
    }

    pub fn document_element(&self) -> Option<NodeId> {
        self.host.dom.document_element()
    }

    pub fn head(&self) -> Option<NodeId> {
        self.host.dom.head()
    }

    pub fn body(&self) -> Option<NodeId> {
        self.host.dom.body()
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.host.dom.get_element_by_id(id)
    }

    pub fn get_attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.host.dom.attr(node, name).map(ToOwned::to_owned)
    }

    /// Sets an attribute. Handler attributes replace the element's handler
    /// source; a previously compiled handler is dropped.
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<()> {
        self.host.dom.check(node)?;
        let name = self.host.dom.normalize_attr_name(name);
        self.host.set_attribute(node, &name, value)
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> Result<()> {
        self.host.dom.check(node)?;
        let name = self.host.dom.normalize_attr_name(name);
        self.host.remove_attribute(node, &name)
    }

    /// Creates a detached element.
    pub fn create_element(&mut self, tag_name: &str) -> NodeId {
        let tag_name = self.host.dom.normalize_attr_name(tag_name);
        self.host.dom.create_element(tag_name, Vec::new())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.host.dom.append_child(parent, child)
    }

    pub fn text_content(&self, node: NodeId) -> Result<String> {
        self.host.dom.check(node)?;
        Ok(self.host.dom.text_content(node))
    }

    pub fn inner_html(&self, node: NodeId) -> Result<String> {
        self.host.dom.check(node)?;
        Ok(self.host.dom.inner_html(node))
    }

    pub fn title(&self) -> String {
        self.host.dom.title()
    }

    /// Reads `on<event>` on `target`, compiling attribute source if needed.
    /// Yields `Value::Null` for an empty slot.
    pub fn event_handler(&mut self, target: impl Into<EventTarget>, event: &str) -> Result<Value> {
        let target = target.into();
        let accessor = self.accessor(target, event)?;
        Ok((accessor.get)(&mut self.host, target, accessor.event))
    }

    /// Assigns `on<event>` on `target`. Non-callable values are ignored.
    pub fn set_event_handler(
        &mut self,
        target: impl Into<EventTarget>,
        event: &str,
        value: Value,
    ) -> Result<()> {
        let target = target.into();
        let accessor = self.accessor(target, event)?;
        (accessor.set)(&mut self.host, target, accessor.event, value);
        Ok(())
    }

    fn accessor(&self, target: EventTarget, event: &str) -> Result<&'static HandlerAccessor> {
        if let EventTarget::Node(node) = target {
            self.host.dom.check(node)?;
        }
        canonical_event_name(event)
            .and_then(|event| handler_accessor(&format!("on{event}")))
            .ok_or_else(|| Error::ScriptRuntime(format!("no handler slot for \"{event}\"")))
    }

    /// Dispatches `event`. Returns `false` if it was canceled.
    pub fn dispatch_event(&mut self, target: impl Into<EventTarget>, event: &Event) -> Result<bool> {
        let target = target.into();
        stacker::grow(STACK_SIZE, || self.host.dispatch_event(target, event))
    }

    /// Fires a non-cancelable event of the given type.
    pub fn fire_event(&mut self, target: impl Into<EventTarget>, event_type: &str, bubbles: bool) -> Result<bool> {
        let target = target.into();
        stacker::grow(STACK_SIZE, || {
            self.host.fire_event(target, event_type, bubbles, false)
        })
    }

    /// Fires a bubbling, cancelable `click`. Returns `false` if it was
    /// canceled.
    pub fn click(&mut self, node: NodeId) -> Result<bool> {
        stacker::grow(STACK_SIZE, || self.host.click_node(node))
    }
}
