//! Event dispatch, and the single listener each `on<event>` slot installs.

use super::{Exception, Host};
use crate::console::ConsoleLevel;
use crate::dom::{NodeId, ParsingMode};
use crate::events::{Event, EventPhase, EventTarget, Listener, ListenerCallback};
use crate::handlers::{
    HandlerSlot, HandlerTable, ScopeChain, WINDOW_REFLECTING_BODY_EVENTS, canonical_event_name,
    compile_handler,
};
use crate::script::{FunctionRef, Value};
use crate::Result;

/// Whether a handler's return value cancels the event. `mouseover`, and
/// `error` fired with an `ErrorEvent`, cancel on a truthy return; every
/// other event cancels unless the return value is truthy.
pub(crate) fn cancels(event: &str, is_error_event: bool, returned: &Value) -> bool {
    if event == "mouseover" || (event == "error" && is_error_event) {
        returned.truthy()
    } else {
        !returned.truthy()
    }
}

impl Host {
    pub(crate) fn trace_label(&self, target: Option<EventTarget>) -> String {
        match target {
            None => "none".into(),
            Some(EventTarget::Window) => "window".into(),
            Some(EventTarget::Node(node)) if node == self.dom.root() => "document".into(),
            Some(EventTarget::Node(node)) => match self.dom.attr(node, "id") {
                Some(id) if !id.is_empty() => format!("#{id}"),
                _ => self
                    .dom
                    .tag_name(node)
                    .map(ToOwned::to_owned)
                    .unwrap_or_else(|| format!("node-{}", node.index())),
            },
        }
    }

    /// The element whose slot an attribute on `node` feeds: `<body>` handler
    /// attributes for window events land on the window.
    fn handler_owner(&self, target: EventTarget, event: &str) -> EventTarget {
        match target {
            EventTarget::Node(node)
                if self.dom.mode() == ParsingMode::Html
                    && self.dom.tag_name(node) == Some("body")
                    && WINDOW_REFLECTING_BODY_EVENTS.contains(&event) =>
            {
                EventTarget::Window
            }
            other => other,
        }
    }

    fn handler_table(&mut self, target: EventTarget) -> Option<&mut HandlerTable> {
        match target {
            EventTarget::Window => Some(&mut self.sandbox.realm_mut().window_handlers),
            EventTarget::Node(node) => self.dom.handlers_mut(node),
        }
    }

    /// Installs the slot's listener the first time the slot gets a value.
    pub(crate) fn ensure_installed(&mut self, target: EventTarget, event: &'static str) {
        let first = self
            .handler_table(target)
            .is_some_and(|table| table.mark_installed(event));
        if first {
            self.listeners.add(
                target,
                event.to_string(),
                Listener {
                    capture: false,
                    callback: ListenerCallback::HandlerSlot(event),
                },
            );
        }
    }

    /// Compiles a slot holding attribute text. A failed compile leaves the
    /// slot empty and is reported to the console.
    fn compile_slot(&mut self, target: EventTarget, event: &'static str, source: &str) -> Option<FunctionRef> {
        let chain = ScopeChain::for_target(&self.dom, target);
        self.console.trace_event(format!(
            "[handler] compile on{event} target={} scope={}",
            self.trace_label(Some(target)),
            chain.lookup_order().join(">")
        ));
        let global = self.sandbox.realm().global_env.clone();
        let (slot, compiled) = match compile_handler(source, &chain, event, &global) {
            Ok(function) => (HandlerSlot::Compiled(function.clone()), Some(function)),
            Err(err) => {
                self.console.emit(
                    ConsoleLevel::JsdomError,
                    format!("failed to compile on{event} handler: {err}"),
                );
                (HandlerSlot::Empty, None)
            }
        };
        if let Some(table) = self.handler_table(target) {
            table.replace_slot(event, slot);
        }
        compiled
    }

    /// The slot's current callable, compiling attribute text on the way.
    fn current_handler(&mut self, target: EventTarget, event: &'static str) -> Option<FunctionRef> {
        let slot = self.handler_table(target)?.slot(event)?.clone();
        match slot {
            HandlerSlot::Empty => None,
            HandlerSlot::SourceAttribute(source) => self.compile_slot(target, event, &source),
            HandlerSlot::Compiled(function) => Some(function),
        }
    }

    fn run_handler_slot(&mut self, current: EventTarget, event_name: &'static str, event: &Event) -> Result<()> {
        let Some(function) = self.current_handler(current, event_name) else {
            return Ok(());
        };
        let is_error_event = event.is_error_event();
        let details = event.state().error.clone();
        let args = match (current, event_name, details) {
            (EventTarget::Window, "error", Some(details)) => vec![
                Value::String(details.message),
                Value::String(details.filename),
                Value::Number(f64::from(details.lineno)),
                Value::Number(f64::from(details.colno)),
                details.error,
            ],
            _ => vec![Value::Event(event.clone())],
        };
        match self.call_function(&function, current.to_value(), args) {
            Ok(returned) => {
                if cancels(event_name, is_error_event, &returned) {
                    event.set_canceled();
                }
            }
            Err(exception) => self.report_exception(exception)?,
        }
        Ok(())
    }

    fn event_path(&self, target: EventTarget, event_type: &str) -> Vec<EventTarget> {
        let EventTarget::Node(node) = target else {
            return vec![EventTarget::Window];
        };
        let mut path = Vec::new();
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            path.push(EventTarget::Node(current));
            cursor = self.dom.parent(current);
        }
        if path.last() == Some(&EventTarget::Node(self.dom.root())) && event_type != "load" {
            path.push(EventTarget::Window);
        }
        path.reverse();
        path
    }

    fn invoke_listeners(
        &mut self,
        current: EventTarget,
        event: &Event,
        phase: EventPhase,
        capture: bool,
    ) -> Result<()> {
        let event_type = event.event_type();
        let listeners = self.listeners.get(current, &event_type, capture);
        if listeners.is_empty() {
            return Ok(());
        }
        {
            let mut state = event.state_mut();
            state.current_target = Some(current);
            state.phase = phase;
        }
        for listener in listeners {
            self.console.trace_event(format!(
                "[event] {} target={} current={} phase={} default_prevented={}",
                event_type,
                self.trace_label(event.target()),
                self.trace_label(Some(current)),
                if capture { "capture" } else { "bubble" },
                event.default_prevented()
            ));
            match listener.callback {
                ListenerCallback::Script(function) => {
                    let outcome =
                        self.call_function(&function, current.to_value(), vec![Value::Event(event.clone())]);
                    if let Err(exception) = outcome {
                        self.report_exception(exception)?;
                    }
                }
                ListenerCallback::HandlerSlot(name) => self.run_handler_slot(current, name, event)?,
            }
            if event.state().immediate_propagation_stopped {
                break;
            }
        }
        Ok(())
    }

    /// Dispatches `event` at `target` through capture, target and bubble
    /// phases. Returns `false` when the event ended up canceled.
    pub(crate) fn dispatch_event(&mut self, target: EventTarget, event: &Event) -> Result<bool> {
        if let EventTarget::Node(node) = target {
            self.dom.check(node)?;
        }
        let event_type = event.event_type();
        let path = self.event_path(target, &event_type);
        event.state_mut().target = Some(target);

        let ancestors = &path[..path.len().saturating_sub(1)];
        let stopped = |event: &Event| event.state().propagation_stopped;

        for current in ancestors {
            if stopped(event) {
                break;
            }
            self.invoke_listeners(*current, event, EventPhase::Capturing, true)?;
        }
        if !stopped(event) {
            self.invoke_listeners(target, event, EventPhase::AtTarget, true)?;
        }
        if !stopped(event) {
            self.invoke_listeners(target, event, EventPhase::AtTarget, false)?;
        }
        let bubbles = event.state().bubbles;
        if bubbles {
            for current in ancestors.iter().rev() {
                if stopped(event) {
                    break;
                }
                self.invoke_listeners(*current, event, EventPhase::Bubbling, false)?;
            }
        }

        let outcome = if event.default_prevented() {
            "canceled"
        } else {
            "completed"
        };
        self.console.trace_event(format!(
            "[event] done {} target={} outcome={} default_prevented={} propagation_stopped={} immediate_stopped={}",
            event_type,
            self.trace_label(Some(target)),
            outcome,
            event.default_prevented(),
            event.state().propagation_stopped,
            event.state().immediate_propagation_stopped
        ));

        let mut state = event.state_mut();
        state.current_target = None;
        state.phase = EventPhase::None;
        state.propagation_stopped = false;
        state.immediate_propagation_stopped = false;
        let not_canceled = !state.canceled;
        Ok(not_canceled)
    }

    /// Fires a plain event by name.
    pub(crate) fn fire_event(&mut self, target: EventTarget, event_type: &str, bubbles: bool, cancelable: bool) -> Result<bool> {
        let event = Event::new(event_type).bubbles(bubbles).cancelable(cancelable);
        self.dispatch_event(target, &event)
    }

    pub(crate) fn click_node(&mut self, node: NodeId) -> Result<bool> {
        self.fire_event(EventTarget::Node(node), "click", true, true)
    }

    /// Keeps the handler slot in step with an `on<event>` attribute.
    pub(crate) fn attribute_changed(&mut self, node: NodeId, name: &str, value: Option<&str>) {
        let Some(event) = name.strip_prefix("on").and_then(canonical_event_name) else {
            return;
        };
        let owner = self.handler_owner(EventTarget::Node(node), event);
        let slot = match value {
            Some(source) => HandlerSlot::SourceAttribute(source.to_string()),
            None => HandlerSlot::Empty,
        };
        let replaced = self
            .handler_table(owner)
            .and_then(|table| table.replace_slot(event, slot))
            .is_some();
        if replaced && value.is_some() {
            self.ensure_installed(owner, event);
        }
    }

    pub(crate) fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<()> {
        self.dom.set_attr(node, name, value)?;
        self.attribute_changed(node, name, Some(value));
        Ok(())
    }

    pub(crate) fn remove_attribute(&mut self, node: NodeId, name: &str) -> Result<()> {
        if self.dom.remove_attr(node, name)?.is_some() {
            self.attribute_changed(node, name, None);
        }
        Ok(())
    }
}

/// Getter behind every `on<event>` property.
pub(crate) fn read_handler(host: &mut Host, target: EventTarget, event: &'static str) -> Value {
    let owner = host.handler_owner(target, event);
    host.current_handler(owner, event)
        .map_or(Value::Null, Value::Function)
}

/// Setter behind every `on<event>` property. Non-callable values leave the
/// slot alone.
pub(crate) fn write_handler(host: &mut Host, target: EventTarget, event: &'static str, value: Value) {
    let Value::Function(function) = value else {
        return;
    };
    let owner = host.handler_owner(target, event);
    let replaced = host
        .handler_table(owner)
        .and_then(|table| table.replace_slot(event, HandlerSlot::Compiled(function)))
        .is_some();
    if replaced {
        host.ensure_installed(owner, event);
    }
}

/// Converts an uncaught exception into the embedder-facing error.
pub(crate) fn uncaught(exception: Exception) -> crate::Error {
    crate::Error::ScriptRuntime(format!("Uncaught {}", exception.message()))
}
