use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    Log,
    Info,
    Warn,
    Error,
    /// Reports raised by the runtime itself rather than by script code:
    /// handler compile failures and uncaught exceptions.
    JsdomError,
    Trace,
}

impl ConsoleLevel {
    fn label(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::JsdomError => "jsdomError",
            Self::Trace => "trace",
        }
    }
}

impl fmt::Display for ConsoleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleEntry {
    pub level: ConsoleLevel,
    pub message: String,
}

#[derive(Debug)]
struct ConsoleState {
    entries: VecDeque<ConsoleEntry>,
    entry_limit: usize,
    to_stderr: bool,
    trace_events: bool,
}

impl Default for ConsoleState {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
            entry_limit: 10_000,
            to_stderr: false,
            trace_events: false,
        }
    }
}

/// Diagnostic sink shared between a session and its creator.
///
/// Cloning yields another handle to the same sink, so a console passed in
/// through the session options is the very one the session reports to.
#[derive(Debug, Clone, Default)]
pub struct VirtualConsole {
    state: Rc<RefCell<ConsoleState>>,
}

impl VirtualConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror every entry to the process's stderr.
    pub fn send_to_stderr(self) -> Self {
        self.state.borrow_mut().to_stderr = true;
        self
    }

    pub fn set_stderr(&self, enabled: bool) {
        self.state.borrow_mut().to_stderr = enabled;
    }

    /// Record one `[event]` line per listener invocation and dispatch outcome.
    pub fn set_trace_events(&self, enabled: bool) {
        self.state.borrow_mut().trace_events = enabled;
    }

    pub fn set_entry_limit(&self, max_entries: usize) -> crate::Result<()> {
        if max_entries == 0 {
            return Err(crate::Error::ScriptRuntime(
                "set_entry_limit requires at least 1 entry".into(),
            ));
        }
        let mut state = self.state.borrow_mut();
        state.entry_limit = max_entries;
        while state.entries.len() > state.entry_limit {
            state.entries.pop_front();
        }
        Ok(())
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    pub fn entries(&self) -> Vec<ConsoleEntry> {
        self.state.borrow().entries.iter().cloned().collect()
    }

    pub fn take_entries(&self) -> Vec<ConsoleEntry> {
        self.state.borrow_mut().entries.drain(..).collect()
    }

    pub fn messages(&self, level: ConsoleLevel) -> Vec<String> {
        self.state
            .borrow()
            .entries
            .iter()
            .filter(|entry| entry.level == level)
            .map(|entry| entry.message.clone())
            .collect()
    }

    pub(crate) fn emit(&self, level: ConsoleLevel, message: impl Into<String>) {
        let message = message.into();
        let mut state = self.state.borrow_mut();
        if state.to_stderr {
            eprintln!("[{level}] {message}");
        }
        if state.entries.len() >= state.entry_limit {
            state.entries.pop_front();
        }
        state.entries.push_back(ConsoleEntry { level, message });
    }

    pub(crate) fn trace_event(&self, line: String) {
        if self.state.borrow().trace_events {
            self.emit(ConsoleLevel::Trace, line);
        }
    }
}
