use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;

use crate::dom::NodeId;
use crate::script::{FunctionRef, Value};

/// Anything that can hold handler slots and listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTarget {
    Window,
    Node(NodeId),
}

impl From<NodeId> for EventTarget {
    fn from(node: NodeId) -> Self {
        Self::Node(node)
    }
}

impl EventTarget {
    pub(crate) fn to_value(self) -> Value {
        match self {
            Self::Window => Value::Window,
            Self::Node(node) => Value::Node(node),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventPhase {
    None,
    Capturing,
    AtTarget,
    Bubbling,
}

impl EventPhase {
    pub(crate) fn as_number(self) -> f64 {
        match self {
            Self::None => 0.0,
            Self::Capturing => 1.0,
            Self::AtTarget => 2.0,
            Self::Bubbling => 3.0,
        }
    }
}

/// The extra fields carried by an `ErrorEvent`.
#[derive(Debug, Clone)]
pub(crate) struct ErrorDetails {
    pub(crate) message: String,
    pub(crate) filename: String,
    pub(crate) lineno: u32,
    pub(crate) colno: u32,
    pub(crate) error: Value,
}

#[derive(Debug)]
pub(crate) struct EventState {
    pub(crate) event_type: String,
    pub(crate) bubbles: bool,
    pub(crate) cancelable: bool,
    pub(crate) canceled: bool,
    pub(crate) target: Option<EventTarget>,
    pub(crate) current_target: Option<EventTarget>,
    pub(crate) phase: EventPhase,
    pub(crate) propagation_stopped: bool,
    pub(crate) immediate_propagation_stopped: bool,
    pub(crate) error: Option<ErrorDetails>,
}

/// An event object. Clones share state, so the caller keeps seeing the
/// canceled flag and targets that dispatch recorded.
#[derive(Debug, Clone)]
pub struct Event {
    state: Rc<RefCell<EventState>>,
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            state: Rc::new(RefCell::new(EventState {
                event_type: event_type.into(),
                bubbles: false,
                cancelable: false,
                canceled: false,
                target: None,
                current_target: None,
                phase: EventPhase::None,
                propagation_stopped: false,
                immediate_propagation_stopped: false,
                error: None,
            })),
        }
    }

    pub fn bubbles(self, bubbles: bool) -> Self {
        self.state.borrow_mut().bubbles = bubbles;
        self
    }

    pub fn cancelable(self, cancelable: bool) -> Self {
        self.state.borrow_mut().cancelable = cancelable;
        self
    }

    /// An `ErrorEvent` of type `error`, as raised for uncaught exceptions.
    pub fn error_event(
        message: impl Into<String>,
        filename: impl Into<String>,
        lineno: u32,
        colno: u32,
        error: Value,
    ) -> Self {
        let event = Self::new("error").cancelable(true);
        event.state.borrow_mut().error = Some(ErrorDetails {
            message: message.into(),
            filename: filename.into(),
            lineno,
            colno,
            error,
        });
        event
    }

    pub fn event_type(&self) -> String {
        self.state.borrow().event_type.clone()
    }

    pub fn is_error_event(&self) -> bool {
        self.state.borrow().error.is_some()
    }

    pub fn default_prevented(&self) -> bool {
        self.state.borrow().canceled
    }

    pub fn target(&self) -> Option<EventTarget> {
        self.state.borrow().target
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    pub(crate) fn state(&self) -> Ref<'_, EventState> {
        self.state.borrow()
    }

    pub(crate) fn state_mut(&self) -> RefMut<'_, EventState> {
        self.state.borrow_mut()
    }

    /// `preventDefault()`: only honoured for cancelable events.
    pub(crate) fn prevent_default(&self) {
        let mut state = self.state.borrow_mut();
        if state.cancelable {
            state.canceled = true;
        }
    }

    /// Sets the canceled flag regardless of `cancelable`, the way handler
    /// return values do.
    pub(crate) fn set_canceled(&self) {
        self.state.borrow_mut().canceled = true;
    }
}

#[derive(Debug, Clone)]
pub(crate) enum ListenerCallback {
    Script(FunctionRef),
    /// The single listener an `on<event>` handler slot installs.
    HandlerSlot(&'static str),
}

impl ListenerCallback {
    fn same_callback(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Script(a), Self::Script(b)) => a.ptr_eq(b),
            (Self::HandlerSlot(a), Self::HandlerSlot(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Listener {
    pub(crate) capture: bool,
    pub(crate) callback: ListenerCallback,
}

#[derive(Debug, Default)]
pub(crate) struct ListenerStore {
    map: HashMap<EventTarget, HashMap<String, Vec<Listener>>>,
}

impl ListenerStore {
    /// Returns `false` when the same callback is already registered for the
    /// same type and phase.
    pub(crate) fn add(&mut self, target: EventTarget, event: String, listener: Listener) -> bool {
        let listeners = self
            .map
            .entry(target)
            .or_default()
            .entry(event)
            .or_default();

        if listeners.iter().any(|existing| {
            existing.capture == listener.capture
                && existing.callback.same_callback(&listener.callback)
        }) {
            return false;
        }

        listeners.push(listener);
        true
    }

    pub(crate) fn remove(
        &mut self,
        target: EventTarget,
        event: &str,
        capture: bool,
        callback: &ListenerCallback,
    ) -> bool {
        let Some(events) = self.map.get_mut(&target) else {
            return false;
        };
        let Some(listeners) = events.get_mut(event) else {
            return false;
        };

        if let Some(pos) = listeners
            .iter()
            .position(|listener| listener.capture == capture && listener.callback.same_callback(callback))
        {
            listeners.remove(pos);
            if listeners.is_empty() {
                events.remove(event);
            }
            if events.is_empty() {
                self.map.remove(&target);
            }
            return true;
        }

        false
    }

    pub(crate) fn get(&self, target: EventTarget, event: &str, capture: bool) -> Vec<Listener> {
        self.map
            .get(&target)
            .and_then(|events| events.get(event))
            .map(|listeners| {
                listeners
                    .iter()
                    .filter(|listener| listener.capture == capture)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn count(&self, target: EventTarget, event: &str) -> usize {
        self.map
            .get(&target)
            .and_then(|events| events.get(event))
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_handler_slot_listener_is_added_once() {
        let mut store = ListenerStore::default();
        let listener = Listener {
            capture: false,
            callback: ListenerCallback::HandlerSlot("click"),
        };
        assert!(store.add(EventTarget::Window, "click".into(), listener.clone()));
        assert!(!store.add(EventTarget::Window, "click".into(), listener));
        assert_eq!(store.count(EventTarget::Window, "click"), 1);
    }

    #[test]
    fn listeners_are_filtered_by_phase() {
        let mut store = ListenerStore::default();
        let target = EventTarget::Node(NodeId(3));
        store.add(
            target,
            "click".into(),
            Listener {
                capture: true,
                callback: ListenerCallback::HandlerSlot("click"),
            },
        );
        assert_eq!(store.get(target, "click", true).len(), 1);
        assert!(store.get(target, "click", false).is_empty());
        assert!(store.remove(
            target,
            "click",
            true,
            &ListenerCallback::HandlerSlot("click")
        ));
        assert_eq!(store.count(target, "click"), 0);
    }

    #[test]
    fn prevent_default_respects_cancelable() {
        let plain = Event::new("click");
        plain.prevent_default();
        assert!(!plain.default_prevented());

        let cancelable = Event::new("click").cancelable(true);
        cancelable.prevent_default();
        assert!(cancelable.default_prevented());

        plain.set_canceled();
        assert!(plain.default_prevented());
    }
}
