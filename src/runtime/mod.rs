//! Script execution against one session's document and realm.

use std::collections::HashMap;

use url::Url;

use crate::console::{ConsoleLevel, VirtualConsole};
use crate::cookies::CookieJar;
use crate::dom::{Dom, NodeId};
use crate::events::{Event, EventTarget, ListenerStore};
use crate::sandbox::ScriptSandbox;
use crate::script::{ObjectRef, Value, parse_program};
use crate::{Error, Result};

pub(crate) mod dispatch;
mod host_objects;
mod interpreter;

pub(crate) use host_objects::HostMethod;

/// Stack reserved by `stacker::grow` at session entry points.
pub(crate) const STACK_SIZE: usize = 32 * 1024 * 1024;
/// Remaining stack below which the interpreter grows another segment.
const STACK_RED_ZONE: usize = 256 * 1024;
const MAX_CALL_DEPTH: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadyState {
    Loading,
    Complete,
}

impl ReadyState {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Complete => "complete",
        }
    }
}

/// Document-level state the tree itself does not carry.
#[derive(Debug)]
pub(crate) struct DocumentState {
    pub(crate) url: Url,
    pub(crate) origin: String,
    pub(crate) referrer: String,
    pub(crate) content_type: String,
    pub(crate) ready_state: ReadyState,
    pub(crate) cookie_jar: CookieJar,
}

impl DocumentState {
    pub(crate) fn new(url: Url, referrer: String, content_type: String, cookie_jar: CookieJar) -> Self {
        let origin = serialize_origin(&url);
        Self {
            url,
            origin,
            referrer,
            content_type,
            ready_state: ReadyState::Loading,
            cookie_jar,
        }
    }

    pub(crate) fn set_url(&mut self, url: Url) {
        self.origin = serialize_origin(&url);
        self.url = url;
    }
}

pub(crate) fn serialize_origin(url: &Url) -> String {
    url.origin().unicode_serialization()
}

/// A thrown script value.
#[derive(Debug, Clone)]
pub(crate) struct Exception {
    pub(crate) value: Value,
}

impl Exception {
    pub(crate) fn error(name: &str, message: impl AsRef<str>) -> Self {
        Self {
            value: Value::Object(ObjectRef::error(name, message.as_ref())),
        }
    }

    pub(crate) fn type_error(message: impl AsRef<str>) -> Self {
        Self::error("TypeError", message)
    }

    pub(crate) fn reference_error(name: &str) -> Self {
        Self::error("ReferenceError", format!("{name} is not defined"))
    }

    pub(crate) fn message(&self) -> String {
        self.value.to_string()
    }
}

impl From<Error> for Exception {
    fn from(err: Error) -> Self {
        match err {
            Error::ScriptParse(msg) => Self::error("SyntaxError", msg),
            other => Self::type_error(other.to_string()),
        }
    }
}

pub(crate) type ScriptResult<T> = std::result::Result<T, Exception>;

/// Everything script code can observe: the tree, the document state, the
/// realm and the diagnostic sink.
#[derive(Debug)]
pub(crate) struct Host {
    pub(crate) dom: Dom,
    pub(crate) document: DocumentState,
    pub(crate) sandbox: ScriptSandbox,
    pub(crate) listeners: ListenerStore,
    pub(crate) console: VirtualConsole,
    expandos: HashMap<NodeId, ObjectRef>,
    call_depth: usize,
}

impl Host {
    pub(crate) fn new(
        dom: Dom,
        document: DocumentState,
        sandbox: ScriptSandbox,
        console: VirtualConsole,
    ) -> Self {
        Self {
            dom,
            document,
            sandbox,
            listeners: ListenerStore::default(),
            console,
            expandos: HashMap::new(),
            call_depth: 0,
        }
    }

    pub(crate) fn expando(&self, node: NodeId) -> Option<&ObjectRef> {
        self.expandos.get(&node)
    }

    pub(crate) fn expando_or_insert(&mut self, node: NodeId) -> ObjectRef {
        self.expandos.entry(node).or_default().clone()
    }

    /// Evaluates a classic script for the embedder. Exceptions come back as
    /// errors instead of being reported.
    pub(crate) fn eval_global(&mut self, source: &str) -> Result<Value> {
        let program = parse_program(source)?;
        self.exec_program(&program).map_err(dispatch::uncaught)
    }

    /// Runs a parser-inserted script element. Only inline scripts run; there
    /// is no resource loading.
    pub(crate) fn run_script_element(&mut self, script: NodeId) -> Result<()> {
        if self.dom.attr(script, "src").is_some() {
            self.console.trace_event(format!(
                "[script] skipped external script node={}",
                script.index()
            ));
            return Ok(());
        }
        let source = self.dom.text_content(script);
        let outcome = match parse_program(&source) {
            Ok(program) => self.exec_program(&program).map(|_| ()),
            Err(err) => Err(Exception::from(err)),
        };
        if let Err(exception) = outcome {
            self.report_exception(exception)?;
        }
        Ok(())
    }

    /// Reports an uncaught exception: an `ErrorEvent` goes to the window
    /// first, and the console gets the report unless a handler canceled it.
    pub(crate) fn report_exception(&mut self, exception: Exception) -> Result<()> {
        let message = exception.message();
        if self.sandbox.realm().reporting_error {
            self.console
                .emit(ConsoleLevel::JsdomError, format!("Uncaught {message}"));
            return Ok(());
        }

        let event = Event::error_event(
            message.clone(),
            self.document.url.as_str(),
            0,
            0,
            exception.value,
        );
        self.sandbox.realm_mut().reporting_error = true;
        let dispatched = self.dispatch_event(EventTarget::Window, &event);
        self.sandbox.realm_mut().reporting_error = false;
        dispatched?;

        if !event.default_prevented() {
            self.console
                .emit(ConsoleLevel::JsdomError, format!("Uncaught {message}"));
        }
        Ok(())
    }

    pub(crate) fn window_property(&mut self, name: &str) -> Result<Value> {
        self.get_property(&Value::Window, name)
            .map_err(|exception| Error::ScriptRuntime(exception.message()))
    }

    pub(crate) fn set_window_property(&mut self, name: &str, value: Value) -> Result<()> {
        self.set_property(&Value::Window, name, value)
            .map_err(|exception| Error::ScriptRuntime(exception.message()))
    }

    pub(crate) fn enter_call(&mut self) -> ScriptResult<()> {
        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(Exception::error(
                "RangeError",
                "Maximum call stack size exceeded",
            ));
        }
        self.call_depth += 1;
        Ok(())
    }

    pub(crate) fn leave_call(&mut self) {
        self.call_depth = self.call_depth.saturating_sub(1);
    }
}
