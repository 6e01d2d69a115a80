//! The small script dialect used by handler attributes and `<script>`
//! elements: a tokenizer, a recursive descent parser and the value model.
//! Evaluation lives in `crate::runtime`, next to the host objects it needs.

pub(crate) mod ast;
mod lexer;
mod parser;
pub(crate) mod value;

pub(crate) use parser::{parse_function_body, parse_program};
pub use value::{ArrayRef, FunctionRef, ObjectRef, Value};
pub(crate) use value::{Env, FunctionValue, ObjectValue, Scope};
