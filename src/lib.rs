//! Document sessions whose markup-declared event handlers (`onclick="…"`) are
//! compiled into scoped callables, with one scripting realm per session.
//!
//! ```
//! use scripted_dom::{Session, SessionOptions};
//!
//! let mut session = Session::new(
//!     r#"<button id="b" onclick="document.title = 'clicked'; return true">go</button>"#,
//!     SessionOptions::default(),
//! )?;
//! let button = session.get_element_by_id("b").expect("button");
//! assert!(session.click(button)?);
//! assert_eq!(session.title(), "clicked");
//! # Ok::<(), scripted_dom::Error>(())
//! ```

use std::error::Error as StdError;
use std::fmt;

mod console;
mod cookies;
mod dom;
mod events;
mod handlers;
mod html;
mod runtime;
mod sandbox;
mod script;
mod session;

pub use console::{ConsoleEntry, ConsoleLevel, VirtualConsole};
pub use cookies::{CookieJar, CookieJarOptions};
pub use dom::{NodeId, NodeLocation, ParsingMode, SourceSpan};
pub use events::{Event, EventTarget};
pub use handlers::{EVENT_HANDLER_NAMES, is_event_handler_name};
pub use sandbox::{GlobalProxy, ScriptingMode};
pub use script::{ArrayRef, FunctionRef, ObjectRef, Value};
pub use session::{Session, SessionOptions, WindowReconfiguration};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    InvalidParsingMode(String),
    InvalidScriptingMode(String),
    InvalidUrl { what: &'static str, input: String },
    MarkupParse(String),
    ScriptParse(String),
    ScriptRuntime(String),
    ScriptingDisabled,
    UnknownNode(usize),
    InvalidCookie(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParsingMode(mode) => {
                write!(f, "parsing mode must be \"html\" or \"xml\", got \"{mode}\"")
            }
            Self::InvalidScriptingMode(mode) => write!(
                f,
                "run_scripts must be \"outside-only\" or \"dangerously\", got \"{mode}\""
            ),
            Self::InvalidUrl { what, input } => {
                write!(f, "could not parse \"{input}\" as a URL for {what}")
            }
            Self::MarkupParse(msg) => write!(f, "markup parse error: {msg}"),
            Self::ScriptParse(msg) => write!(f, "script parse error: {msg}"),
            Self::ScriptRuntime(msg) => write!(f, "script runtime error: {msg}"),
            Self::ScriptingDisabled => write!(f, "scripting is disabled for this session"),
            Self::UnknownNode(id) => write!(f, "unknown node: {id}"),
            Self::InvalidCookie(msg) => write!(f, "invalid cookie: {msg}"),
        }
    }
}

impl StdError for Error {}

#[cfg(test)]
mod tests;
