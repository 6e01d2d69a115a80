use std::collections::HashMap;
use std::rc::Rc;
use std::sync::OnceLock;

use crate::dom::Dom;
use crate::events::EventTarget;
use crate::runtime::{Host, dispatch};
use crate::script::ast::FunctionDef;
use crate::script::{Env, FunctionRef, Value, parse_function_body};
use crate::Result;

/// Every event that has an `on<event>` handler slot on windows, documents
/// and elements. The set is fixed; slots are never added at runtime.
pub const EVENT_HANDLER_NAMES: &[&str] = &[
    "abort",
    "autocomplete",
    "autocompleteerror",
    "blur",
    "cancel",
    "canplay",
    "canplaythrough",
    "change",
    "click",
    "close",
    "contextmenu",
    "cuechange",
    "dblclick",
    "drag",
    "dragend",
    "dragenter",
    "dragexit",
    "dragleave",
    "dragover",
    "dragstart",
    "drop",
    "durationchange",
    "emptied",
    "ended",
    "error",
    "focus",
    "input",
    "invalid",
    "keydown",
    "keypress",
    "keyup",
    "load",
    "loadeddata",
    "loadedmetadata",
    "loadstart",
    "mousedown",
    "mouseenter",
    "mouseleave",
    "mousemove",
    "mouseout",
    "mouseover",
    "mouseup",
    "wheel",
    "pause",
    "play",
    "playing",
    "progress",
    "ratechange",
    "reset",
    "resize",
    "scroll",
    "seeked",
    "seeking",
    "select",
    "show",
    "sort",
    "stalled",
    "submit",
    "suspend",
    "timeupdate",
    "toggle",
    "volumechange",
    "waiting",
];

/// `<body>` handler attributes for these events set the window's slot.
pub(crate) const WINDOW_REFLECTING_BODY_EVENTS: &[&str] =
    &["blur", "error", "focus", "load", "resize", "scroll"];

/// Whether `event` (without the `on` prefix) has a handler slot.
pub fn is_event_handler_name(event: &str) -> bool {
    canonical_event_name(event).is_some()
}

pub(crate) fn canonical_event_name(event: &str) -> Option<&'static str> {
    event_index(event).map(|index| EVENT_HANDLER_NAMES[index])
}

/// Position of `event` in [`EVENT_HANDLER_NAMES`], which is also its slot
/// index in every [`HandlerTable`].
fn event_index(event: &str) -> Option<usize> {
    static INDEX: OnceLock<HashMap<&'static str, usize>> = OnceLock::new();
    INDEX
        .get_or_init(|| {
            EVENT_HANDLER_NAMES
                .iter()
                .enumerate()
                .map(|(index, name)| (*name, index))
                .collect()
        })
        .get(event)
        .copied()
}

#[derive(Debug, Clone, Default)]
pub(crate) enum HandlerSlot {
    #[default]
    Empty,
    SourceAttribute(String),
    Compiled(FunctionRef),
}

#[derive(Debug, Clone, Default)]
struct HandlerEntry {
    slot: HandlerSlot,
    installed: bool,
}

/// One slot per entry of [`EVENT_HANDLER_NAMES`], created with its target.
#[derive(Debug, Clone)]
pub(crate) struct HandlerTable {
    entries: Vec<HandlerEntry>,
}

impl HandlerTable {
    pub(crate) fn new() -> Self {
        Self {
            entries: vec![HandlerEntry::default(); EVENT_HANDLER_NAMES.len()],
        }
    }

    fn entry(&self, event: &str) -> Option<&HandlerEntry> {
        self.entries.get(event_index(event)?)
    }

    fn entry_mut(&mut self, event: &str) -> Option<&mut HandlerEntry> {
        self.entries.get_mut(event_index(event)?)
    }

    pub(crate) fn slot(&self, event: &str) -> Option<&HandlerSlot> {
        self.entry(event).map(|entry| &entry.slot)
    }

    /// Returns the previous state, or `None` for events without a slot.
    pub(crate) fn replace_slot(&mut self, event: &str, slot: HandlerSlot) -> Option<HandlerSlot> {
        self.entry_mut(event)
            .map(|entry| std::mem::replace(&mut entry.slot, slot))
    }

    #[cfg(test)]
    pub(crate) fn is_installed(&self, event: &str) -> bool {
        self.entry(event).is_some_and(|entry| entry.installed)
    }

    /// Returns `true` only the first time.
    pub(crate) fn mark_installed(&mut self, event: &str) -> bool {
        match self.entry_mut(event) {
            Some(entry) if !entry.installed => {
                entry.installed = true;
                true
            }
            _ => false,
        }
    }
}

pub(crate) type HandlerGetter = fn(&mut Host, EventTarget, &'static str) -> Value;
pub(crate) type HandlerSetter = fn(&mut Host, EventTarget, &'static str, Value);

pub(crate) struct HandlerAccessor {
    pub(crate) event: &'static str,
    pub(crate) get: HandlerGetter,
    pub(crate) set: HandlerSetter,
}

/// Accessor pair for an `on<event>` property name, shared by scripts and
/// the session API.
pub(crate) fn handler_accessor(property: &str) -> Option<&'static HandlerAccessor> {
    static ACCESSORS: OnceLock<HashMap<String, HandlerAccessor>> = OnceLock::new();
    ACCESSORS
        .get_or_init(|| {
            let mut map = HashMap::with_capacity(EVENT_HANDLER_NAMES.len());
            for event in EVENT_HANDLER_NAMES.iter().copied() {
                map.insert(
                    format!("on{event}"),
                    HandlerAccessor {
                        event,
                        get: dispatch::read_handler,
                        set: dispatch::write_handler,
                    },
                );
            }
            map
        })
        .get(property)
}

/// Bindings consulted for free identifiers in a handler body, in
/// construction order `[document, formOwner?, element?]`.
#[derive(Debug, Clone)]
pub(crate) struct ScopeChain {
    bindings: Vec<(&'static str, Value)>,
    window_level: bool,
}

impl ScopeChain {
    pub(crate) fn for_target(dom: &Dom, target: EventTarget) -> Self {
        let mut bindings = vec![("document", Value::Node(dom.root()))];
        let mut window_level = true;
        if let EventTarget::Node(node) = target {
            window_level = false;
            if dom.is_element(node) {
                if let Some(form) = dom.form_owner(node) {
                    bindings.push(("formOwner", Value::Node(form)));
                }
                bindings.push(("element", Value::Node(node)));
            }
        }
        Self {
            bindings,
            window_level,
        }
    }

    /// False for handlers that live on the window itself.
    pub(crate) fn has_owning_element(&self) -> bool {
        !self.window_level
    }

    /// Bindings from the first consulted to the last: form owner, element,
    /// document.
    fn lookup_bindings(&self) -> Vec<&(&'static str, Value)> {
        const PRIORITY: [&str; 3] = ["formOwner", "element", "document"];
        PRIORITY
            .iter()
            .filter_map(|name| self.bindings.iter().find(|(bound, _)| bound == name))
            .collect()
    }

    pub(crate) fn lookup_order(&self) -> Vec<&'static str> {
        self.lookup_bindings()
            .into_iter()
            .map(|(name, _)| *name)
            .collect()
    }

    /// Nests one object frame per binding, last consulted outermost.
    pub(crate) fn environment(&self, global: &Env) -> Env {
        self.lookup_bindings()
            .into_iter()
            .rev()
            .fold(global.clone(), |env, (_, value)| Env::object(value.clone(), &env))
    }
}

/// Compiles handler source text into a callable. The text is checked as a
/// function body on its own before any wrapping happens.
pub(crate) fn compile_handler(
    source: &str,
    chain: &ScopeChain,
    event: &str,
    global: &Env,
) -> Result<FunctionRef> {
    let body = parse_function_body(source)?;
    let params = if event == "error" && !chain.has_owning_element() {
        ["event", "source", "lineno", "colno", "error"]
            .iter()
            .map(|name| name.to_string())
            .collect()
    } else {
        vec!["event".to_string()]
    };
    let def = FunctionDef {
        name: Some(format!("on{event}")),
        params,
        body,
    };
    Ok(FunctionRef::script(Rc::new(def), chain.environment(global)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{NodeId, ParsingMode};
    use crate::html::{ParseSink, parse_document};
    use crate::Error;

    struct NoScripts;

    impl ParseSink for NoScripts {
        fn element_inserted(&mut self, _dom: &mut Dom, _element: NodeId) -> Result<()> {
            Ok(())
        }

        fn attribute_merged(
            &mut self,
            _dom: &mut Dom,
            _element: NodeId,
            _name: &str,
            _value: &str,
        ) -> Result<()> {
            Ok(())
        }

        fn script_inserted(&mut self, _dom: &mut Dom, _script: NodeId) -> Result<()> {
            Ok(())
        }
    }

    fn parse(markup: &str) -> Result<Dom> {
        let mut dom = Dom::new(ParsingMode::Html);
        parse_document(&mut dom, markup, &mut NoScripts)?;
        Ok(dom)
    }

    fn by_id(dom: &Dom, id: &str) -> Result<NodeId> {
        dom.get_element_by_id(id)
            .ok_or_else(|| Error::MarkupParse(format!("missing #{id}")))
    }

    #[test]
    fn event_table_is_fixed_and_includes_error() {
        assert_eq!(EVENT_HANDLER_NAMES.len(), 63);
        assert!(is_event_handler_name("error"));
        assert!(is_event_handler_name("mouseover"));
        assert!(!is_event_handler_name("onclick"));
        assert!(!is_event_handler_name("beforeunload"));
    }

    #[test]
    fn slot_indices_follow_table_order() {
        for (index, event) in EVENT_HANDLER_NAMES.iter().enumerate() {
            assert_eq!(event_index(event), Some(index));
            assert_eq!(canonical_event_name(event), Some(*event));
        }
        assert_eq!(event_index("onclick"), None);
    }

    #[test]
    fn accessor_map_covers_every_event() {
        for event in EVENT_HANDLER_NAMES {
            let accessor = handler_accessor(&format!("on{event}"));
            assert_eq!(accessor.map(|a| a.event), Some(*event));
        }
        assert!(handler_accessor("click").is_none());
    }

    #[test]
    fn slots_start_empty_and_install_once() {
        let mut table = HandlerTable::new();
        assert!(matches!(table.slot("click"), Some(HandlerSlot::Empty)));
        assert!(table.slot("nope").is_none());
        assert!(table.mark_installed("click"));
        assert!(!table.mark_installed("click"));
        assert!(table.is_installed("click"));
        assert!(!table.is_installed("keyup"));

        let previous = table.replace_slot("click", HandlerSlot::SourceAttribute("x()".into()));
        assert!(matches!(previous, Some(HandlerSlot::Empty)));
    }

    #[test]
    fn scope_chain_puts_form_owner_first() -> Result<()> {
        let dom = parse(r#"<form id="f"><input id="i"></form><p id="p"></p>"#)?;
        let input = ScopeChain::for_target(&dom, EventTarget::Node(by_id(&dom, "i")?));
        assert_eq!(input.lookup_order(), vec!["formOwner", "element", "document"]);
        assert!(input.has_owning_element());

        let paragraph = ScopeChain::for_target(&dom, EventTarget::Node(by_id(&dom, "p")?));
        assert_eq!(paragraph.lookup_order(), vec!["element", "document"]);

        let window = ScopeChain::for_target(&dom, EventTarget::Window);
        assert_eq!(window.lookup_order(), vec!["document"]);
        assert!(!window.has_owning_element());
        Ok(())
    }

    #[test]
    fn window_error_handlers_take_five_arguments() -> Result<()> {
        let dom = parse("<p id=\"p\"></p>")?;
        let global = Env::global();
        let window = ScopeChain::for_target(&dom, EventTarget::Window);
        let element = ScopeChain::for_target(&dom, EventTarget::Node(by_id(&dom, "p")?));

        let on_error = compile_handler("return true", &window, "error", &global)?;
        assert_eq!(
            on_error.params(),
            vec!["event", "source", "lineno", "colno", "error"]
        );
        let element_error = compile_handler("return true", &element, "error", &global)?;
        assert_eq!(element_error.params(), vec!["event"]);
        let window_load = compile_handler("", &window, "load", &global)?;
        assert_eq!(window_load.params(), vec!["event"]);
        Ok(())
    }

    #[test]
    fn syntax_errors_fail_compilation() -> Result<()> {
        let dom = parse("")?;
        let chain = ScopeChain::for_target(&dom, EventTarget::Node(dom.root()));
        let outcome = compile_handler("return (", &chain, "click", &Env::global());
        assert!(matches!(outcome, Err(Error::ScriptParse(_))));
        Ok(())
    }
}
