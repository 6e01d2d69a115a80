use std::sync::atomic::{AtomicU64, Ordering};

use crate::console::ConsoleLevel;
use crate::handlers::HandlerTable;
use crate::runtime::{Host, HostMethod};
use crate::script::{Env, FunctionRef, ObjectRef, ObjectValue, Value};
use crate::{Error, Result};

/// How much script a session may run. Fixed when the session is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptingMode {
    /// Only handler attributes run; script elements never execute and the
    /// realm is not reachable from outside.
    #[default]
    Disabled,
    /// The realm is reachable through a [`GlobalProxy`], but script
    /// elements still do not execute during parsing.
    SandboxedGlobalOnly,
    /// Script elements execute as the parser inserts them.
    FullyEnabled,
}

impl ScriptingMode {
    /// Maps the `run_scripts` option: absent, `"outside-only"` or
    /// `"dangerously"`.
    pub fn from_run_scripts(raw: Option<&str>) -> Result<Self> {
        match raw {
            None => Ok(Self::Disabled),
            Some("outside-only") => Ok(Self::SandboxedGlobalOnly),
            Some("dangerously") => Ok(Self::FullyEnabled),
            Some(other) => Err(Error::InvalidScriptingMode(other.to_string())),
        }
    }

    pub fn run_scripts(self) -> Option<&'static str> {
        match self {
            Self::Disabled => None,
            Self::SandboxedGlobalOnly => Some("outside-only"),
            Self::FullyEnabled => Some("dangerously"),
        }
    }

    pub(crate) fn runs_parser_inserted_scripts(self) -> bool {
        self == Self::FullyEnabled
    }

    pub(crate) fn exposes_global_proxy(self) -> bool {
        self != Self::Disabled
    }
}

static NEXT_REALM_ID: AtomicU64 = AtomicU64::new(1);

/// An execution realm: the global object, the window's handler slots and
/// the intrinsic objects scripts reach through the window.
#[derive(Debug)]
pub(crate) struct Realm {
    id: u64,
    pub(crate) globals: ObjectRef,
    pub(crate) global_env: Env,
    pub(crate) window_handlers: HandlerTable,
    pub(crate) top: Value,
    pub(crate) console: ObjectRef,
    /// Set while an uncaught exception is being reported, so an error raised
    /// by the window's error handler is only logged.
    pub(crate) reporting_error: bool,
}

impl Realm {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

fn console_object() -> ObjectRef {
    let methods = [
        ("log", ConsoleLevel::Log),
        ("info", ConsoleLevel::Info),
        ("warn", ConsoleLevel::Warn),
        ("error", ConsoleLevel::Error),
    ];
    let entries = methods
        .into_iter()
        .map(|(name, level)| {
            (
                name.to_string(),
                Value::Function(FunctionRef::native(
                    HostMethod::ConsoleLog(level),
                    Value::Undefined,
                )),
            )
        })
        .collect();
    ObjectRef::new(ObjectValue::new(entries))
}

#[derive(Debug)]
pub(crate) struct ScriptSandbox {
    mode: ScriptingMode,
    realm: Realm,
}

impl ScriptSandbox {
    /// Called once per session; realms are never shared.
    pub(crate) fn create_realm(mode: ScriptingMode) -> Self {
        let realm = Realm {
            id: NEXT_REALM_ID.fetch_add(1, Ordering::Relaxed),
            globals: ObjectRef::default(),
            global_env: Env::global(),
            window_handlers: HandlerTable::new(),
            top: Value::Window,
            console: console_object(),
            reporting_error: false,
        };
        Self { mode, realm }
    }

    pub(crate) fn mode(&self) -> ScriptingMode {
        self.mode
    }

    pub(crate) fn realm(&self) -> &Realm {
        &self.realm
    }

    pub(crate) fn realm_mut(&mut self) -> &mut Realm {
        &mut self.realm
    }
}

/// The session's scripting view of its realm, handed out when the scripting
/// mode allows access from outside.
pub struct GlobalProxy<'a> {
    host: &'a mut Host,
}

impl<'a> GlobalProxy<'a> {
    pub(crate) fn new(host: &'a mut Host) -> Self {
        Self { host }
    }

    pub fn realm_id(&self) -> u64 {
        self.host.sandbox.realm().id()
    }

    /// Runs `source` as a classic script in the global scope and returns the
    /// value of its last expression statement.
    pub fn eval(&mut self, source: &str) -> Result<Value> {
        self.host.eval_global(source)
    }

    /// Reads a global binding the way an unqualified identifier would.
    pub fn get(&mut self, name: &str) -> Result<Value> {
        self.host.window_property(name)
    }

    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        self.host.set_window_property(name, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_scripts_option_maps_to_modes() -> Result<()> {
        assert_eq!(ScriptingMode::from_run_scripts(None)?, ScriptingMode::Disabled);
        assert_eq!(
            ScriptingMode::from_run_scripts(Some("outside-only"))?,
            ScriptingMode::SandboxedGlobalOnly
        );
        assert_eq!(
            ScriptingMode::from_run_scripts(Some("dangerously"))?,
            ScriptingMode::FullyEnabled
        );
        assert_eq!(
            ScriptingMode::from_run_scripts(Some("yes")),
            Err(Error::InvalidScriptingMode("yes".into()))
        );
        Ok(())
    }

    #[test]
    fn mode_round_trips_through_option_string() -> Result<()> {
        for mode in [
            ScriptingMode::Disabled,
            ScriptingMode::SandboxedGlobalOnly,
            ScriptingMode::FullyEnabled,
        ] {
            assert_eq!(ScriptingMode::from_run_scripts(mode.run_scripts())?, mode);
        }
        Ok(())
    }

    #[test]
    fn every_realm_gets_its_own_id_and_globals() {
        let a = ScriptSandbox::create_realm(ScriptingMode::FullyEnabled);
        let b = ScriptSandbox::create_realm(ScriptingMode::FullyEnabled);
        assert_ne!(a.realm().id(), b.realm().id());
        assert!(!a.realm().globals.ptr_eq(&b.realm().globals));
        assert_eq!(a.realm().top, Value::Window);
    }
}
