use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use num_traits::ToPrimitive;

use super::ast::FunctionDef;
use crate::dom::NodeId;
use crate::events::Event;
use crate::runtime::HostMethod;

/// A script value as seen from the embedding API.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Object(ObjectRef),
    Array(ArrayRef),
    Function(FunctionRef),
    Node(NodeId),
    Window,
    Event(Event),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        strict_equals(self, other)
    }
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(value) => *value,
            Self::Number(value) => *value != 0.0 && !value.is_nan(),
            Self::String(value) => !value.is_empty(),
            _ => true,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Function(_) => "function",
            _ => "object",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Function(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Self::Node(node) => Some(*node),
            _ => None,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Self::Undefined => f64::NAN,
            Self::Null => 0.0,
            Self::Bool(value) => {
                if *value {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Number(value) => *value,
            Self::String(value) => string_to_number(value),
            Self::Array(_) => string_to_number(&self.to_string()),
            _ => f64::NAN,
        }
    }
}

/// JavaScript `ToString` for values that need no document access.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(value) => f.write_str(&format_number(*value)),
            Self::String(value) => f.write_str(value),
            Self::Object(object) => {
                let object = object.borrow();
                if object.class == ObjectClass::Error {
                    let name = object
                        .get_entry("name")
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "Error".to_string());
                    let message = object
                        .get_entry("message")
                        .map(|v| v.to_string())
                        .unwrap_or_default();
                    if message.is_empty() {
                        f.write_str(&name)
                    } else {
                        write!(f, "{name}: {message}")
                    }
                } else {
                    f.write_str("[object Object]")
                }
            }
            Self::Array(items) => {
                let items = items.borrow();
                let parts = items
                    .iter()
                    .map(|item| match item {
                        Self::Undefined | Self::Null => String::new(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>();
                f.write_str(&parts.join(","))
            }
            Self::Function(function) => match function.as_ref() {
                FunctionValue::Script { def, .. } => write!(
                    f,
                    "function {}({}) {{ [code] }}",
                    def.name.as_deref().unwrap_or(""),
                    def.params.join(", ")
                ),
                FunctionValue::Native { method, .. } => {
                    write!(f, "function {}() {{ [native code] }}", method.name())
                }
            },
            Self::Node(_) => f.write_str("[object Node]"),
            Self::Window => f.write_str("[object Window]"),
            Self::Event(_) => f.write_str("[object Event]"),
        }
    }
}

pub(crate) fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e21 {
        if let Some(integer) = value.to_i64() {
            return integer.to_string();
        }
    }
    let abs = value.abs();
    if (1e-6..1e21).contains(&abs) {
        return format!("{value}");
    }

    let raw = format!("{value:e}");
    match raw.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent = exponent.parse::<i32>().unwrap_or(0);
            format!("{mantissa}e{exponent:+}")
        }
        None => raw,
    }
}

pub(crate) fn string_to_number(src: &str) -> f64 {
    let trimmed = src.trim_matches(|c: char| c.is_whitespace() || c == '\u{FEFF}');
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16)
            .ok()
            .and_then(|value| value.to_f64())
            .unwrap_or(f64::NAN);
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    // Rust accepts spellings such as `inf` and `nan` that scripts do not.
    if trimmed
        .bytes()
        .any(|b| !(b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-')))
    {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

pub(crate) fn strict_equals(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
        (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
        (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
        (Value::Node(a), Value::Node(b)) => a == b,
        (Value::Window, Value::Window) => true,
        (Value::Event(a), Value::Event(b)) => a.ptr_eq(b),
        _ => false,
    }
}

pub(crate) fn loose_equals(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            lhs.to_number() == rhs.to_number()
        }
        (Value::Bool(_), _) => loose_equals(&Value::Number(lhs.to_number()), rhs),
        (_, Value::Bool(_)) => loose_equals(lhs, &Value::Number(rhs.to_number())),
        (Value::Object(_) | Value::Array(_), Value::Number(_) | Value::String(_)) => {
            loose_equals(&Value::String(lhs.to_string()), rhs)
        }
        (Value::Number(_) | Value::String(_), Value::Object(_) | Value::Array(_)) => {
            loose_equals(lhs, &Value::String(rhs.to_string()))
        }
        _ => strict_equals(lhs, rhs),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum ObjectClass {
    #[default]
    Plain,
    Error,
}

#[derive(Debug, Default)]
pub(crate) struct ObjectValue {
    pub(crate) class: ObjectClass,
    entries: Vec<(String, Value)>,
    index_by_key: HashMap<String, usize>,
}

impl ObjectValue {
    pub(crate) fn new(entries: Vec<(String, Value)>) -> Self {
        let mut value = Self::default();
        for (key, entry_value) in entries {
            value.set_entry(key, entry_value);
        }
        value
    }

    pub(crate) fn set_entry(&mut self, key: String, value: Value) {
        if let Some(index) = self.index_by_key.get(&key).copied() {
            if let Some((_, existing)) = self.entries.get_mut(index) {
                *existing = value;
                return;
            }
        }
        let index = self.entries.len();
        self.entries.push((key.clone(), value));
        self.index_by_key.insert(key, index);
    }

    pub(crate) fn get_entry(&self, key: &str) -> Option<Value> {
        self.index_by_key
            .get(key)
            .and_then(|index| self.entries.get(*index))
            .map(|(_, value)| value.clone())
    }

    pub(crate) fn has_entry(&self, key: &str) -> bool {
        self.index_by_key.contains_key(key)
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }
}

/// Shared handle to a script object.
#[derive(Debug, Clone, Default)]
pub struct ObjectRef(Rc<RefCell<ObjectValue>>);

impl ObjectRef {
    pub(crate) fn new(value: ObjectValue) -> Self {
        Self(Rc::new(RefCell::new(value)))
    }

    pub(crate) fn error(name: &str, message: &str) -> Self {
        let mut value = ObjectValue::new(vec![
            ("name".to_string(), Value::String(name.to_string())),
            ("message".to_string(), Value::String(message.to_string())),
        ]);
        value.class = ObjectClass::Error;
        Self::new(value)
    }

    pub(crate) fn borrow(&self) -> std::cell::Ref<'_, ObjectValue> {
        self.0.borrow()
    }

    pub(crate) fn borrow_mut(&self) -> std::cell::RefMut<'_, ObjectValue> {
        self.0.borrow_mut()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.borrow().get_entry(key)
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.0.borrow_mut().set_entry(key.into(), value);
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().keys().map(str::to_string).collect()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArrayRef(Rc<RefCell<Vec<Value>>>);

impl ArrayRef {
    pub(crate) fn new(items: Vec<Value>) -> Self {
        Self(Rc::new(RefCell::new(items)))
    }

    pub(crate) fn borrow(&self) -> std::cell::Ref<'_, Vec<Value>> {
        self.0.borrow()
    }

    pub(crate) fn borrow_mut(&self) -> std::cell::RefMut<'_, Vec<Value>> {
        self.0.borrow_mut()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

pub(crate) enum FunctionValue {
    Script {
        def: Rc<FunctionDef>,
        env: Env,
    },
    /// A host method bound to the value it was read from.
    Native {
        method: HostMethod,
        receiver: Value,
    },
}

impl fmt::Debug for FunctionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Script { def, .. } => f
                .debug_struct("Script")
                .field("name", &def.name)
                .field("params", &def.params)
                .finish(),
            Self::Native { method, .. } => f.debug_tuple("Native").field(method).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionRef(Rc<FunctionValue>);

impl FunctionRef {
    pub(crate) fn script(def: Rc<FunctionDef>, env: Env) -> Self {
        Self(Rc::new(FunctionValue::Script { def, env }))
    }

    pub(crate) fn native(method: HostMethod, receiver: Value) -> Self {
        Self(Rc::new(FunctionValue::Native { method, receiver }))
    }

    pub(crate) fn as_ref(&self) -> &FunctionValue {
        &self.0
    }

    /// Parameter names of a script function; host methods report none.
    pub fn params(&self) -> Vec<String> {
        match self.0.as_ref() {
            FunctionValue::Script { def, .. } => def.params.clone(),
            FunctionValue::Native { .. } => Vec::new(),
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub(crate) value: Value,
    pub(crate) mutable: bool,
}

/// Lexical environment frames. `Object` frames resolve names against the
/// properties of a host or script object, which is how handler scope chains
/// are built.
#[derive(Debug)]
pub(crate) enum Scope {
    Global,
    Declarative {
        vars: RefCell<HashMap<String, Binding>>,
        parent: Env,
    },
    Object {
        binding: Value,
        parent: Env,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct Env(Rc<Scope>);

impl Env {
    pub(crate) fn global() -> Self {
        Self(Rc::new(Scope::Global))
    }

    pub(crate) fn declarative(parent: &Env) -> Self {
        Self(Rc::new(Scope::Declarative {
            vars: RefCell::new(HashMap::new()),
            parent: parent.clone(),
        }))
    }

    pub(crate) fn object(binding: Value, parent: &Env) -> Self {
        Self(Rc::new(Scope::Object {
            binding,
            parent: parent.clone(),
        }))
    }

    pub(crate) fn scope(&self) -> &Scope {
        &self.0
    }

    pub(crate) fn declare(&self, name: &str, value: Value, mutable: bool) -> bool {
        match self.0.as_ref() {
            Scope::Declarative { vars, .. } => {
                vars.borrow_mut()
                    .insert(name.to_string(), Binding { value, mutable });
                true
            }
            _ => false,
        }
    }

    /// Nearest declarative frame, where `var` bindings land.
    pub(crate) fn function_scope(&self) -> Option<Env> {
        let mut current = self.clone();
        loop {
            let next = match current.0.as_ref() {
                Scope::Declarative { .. } => return Some(current),
                Scope::Object { parent, .. } => parent.clone(),
                Scope::Global => return None,
            };
            current = next;
        }
    }
}
