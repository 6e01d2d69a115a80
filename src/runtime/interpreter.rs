use std::rc::Rc;

use super::{Exception, Host, STACK_RED_ZONE, STACK_SIZE, ScriptResult};
use crate::script::ast::{
    BinaryOp, DeclKind, Expr, FunctionDef, LogicalOp, Stmt, UnaryOp,
};
use crate::script::value::{format_number, loose_equals, strict_equals};
use crate::script::{ArrayRef, Env, FunctionRef, FunctionValue, ObjectRef, ObjectValue, Scope, Value};

enum Flow {
    Normal,
    Return(Value),
}

struct Frame {
    env: Env,
    this: Value,
}

impl Host {
    /// Runs top-level script code in the global scope. The result is the
    /// value of the last expression statement.
    pub(crate) fn exec_program(&mut self, program: &[Stmt]) -> ScriptResult<Value> {
        let frame = Frame {
            env: self.sandbox.realm().global_env.clone(),
            this: Value::Window,
        };
        self.hoist(program, &frame.env);
        let mut completion = Value::Undefined;
        for stmt in program {
            if let Stmt::Expr(expr) = stmt {
                completion = self.eval(expr, &frame)?;
                continue;
            }
            if let Flow::Return(value) = self.exec(stmt, &frame)? {
                return Ok(value);
            }
        }
        Ok(completion)
    }

    pub(crate) fn call_function(
        &mut self,
        function: &FunctionRef,
        this: Value,
        args: Vec<Value>,
    ) -> ScriptResult<Value> {
        match function.as_ref() {
            FunctionValue::Script { def, env } => {
                self.enter_call()?;
                let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_SIZE, || {
                    self.call_script(def, env, this, args)
                });
                self.leave_call();
                result
            }
            FunctionValue::Native { method, receiver } => {
                self.call_native(*method, receiver.clone(), args)
            }
        }
    }

    pub(crate) fn call_value(
        &mut self,
        callee: &Value,
        this: Value,
        args: Vec<Value>,
    ) -> ScriptResult<Value> {
        match callee {
            Value::Function(function) => self.call_function(function, this, args),
            other => Err(Exception::type_error(format!(
                "{} is not a function",
                self.describe(other)
            ))),
        }
    }

    fn call_script(
        &mut self,
        def: &Rc<FunctionDef>,
        env: &Env,
        this: Value,
        args: Vec<Value>,
    ) -> ScriptResult<Value> {
        let scope = Env::declarative(env);
        for (index, param) in def.params.iter().enumerate() {
            let value = args.get(index).cloned().unwrap_or_default();
            scope.declare(param, value, true);
        }
        scope.declare("arguments", Value::Array(ArrayRef::new(args)), true);
        let this = match this {
            Value::Undefined | Value::Null => Value::Window,
            other => other,
        };
        let frame = Frame { env: scope, this };
        self.hoist(&def.body, &frame.env);
        for stmt in &def.body {
            if let Flow::Return(value) = self.exec(stmt, &frame)? {
                return Ok(value);
            }
        }
        Ok(Value::Undefined)
    }

    /// Declares `var` names and function declarations ahead of execution.
    fn hoist(&mut self, stmts: &[Stmt], env: &Env) {
        for stmt in stmts {
            match stmt {
                Stmt::FunctionDecl(def) => {
                    if let Some(name) = &def.name {
                        let function = FunctionRef::script(def.clone(), env.clone());
                        self.declare_var(env, name, Some(Value::Function(function)));
                    }
                }
                Stmt::VarDecl {
                    kind: DeclKind::Var,
                    decls,
                } => {
                    for (name, _) in decls {
                        self.declare_var(env, name, None);
                    }
                }
                Stmt::If {
                    then, otherwise, ..
                } => {
                    self.hoist(std::slice::from_ref(then.as_ref()), env);
                    if let Some(otherwise) = otherwise {
                        self.hoist(std::slice::from_ref(otherwise.as_ref()), env);
                    }
                }
                Stmt::While { body, .. } => {
                    self.hoist(std::slice::from_ref(body.as_ref()), env);
                }
                Stmt::Block(body) => self.hoist(body, env),
                _ => {}
            }
        }
    }

    /// `None` declares without clobbering an existing binding.
    fn declare_var(&mut self, env: &Env, name: &str, value: Option<Value>) {
        match env.function_scope() {
            Some(scope) => {
                let exists = matches!(
                    scope.scope(),
                    Scope::Declarative { vars, .. } if vars.borrow().contains_key(name)
                );
                if value.is_some() || !exists {
                    scope.declare(name, value.unwrap_or_default(), true);
                }
            }
            None => {
                let globals = self.sandbox.realm().globals.clone();
                if value.is_some() || globals.get(name).is_none() {
                    globals.set(name, value.unwrap_or_default());
                }
            }
        }
    }

    fn exec(&mut self, stmt: &Stmt, frame: &Frame) -> ScriptResult<Flow> {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr, frame)?;
            }
            Stmt::VarDecl { kind, decls } => {
                for (name, init) in decls {
                    let value = match init {
                        Some(init) => self.eval(init, frame)?,
                        None if *kind == DeclKind::Var => continue,
                        None => Value::Undefined,
                    };
                    match kind {
                        DeclKind::Var => self.declare_var(&frame.env, name, Some(value)),
                        DeclKind::Let | DeclKind::Const => {
                            let mutable = *kind == DeclKind::Let;
                            match frame.env.function_scope() {
                                Some(scope) => {
                                    scope.declare(name, value, mutable);
                                }
                                None => self.sandbox.realm().globals.set(name.clone(), value),
                            }
                        }
                    }
                }
            }
            Stmt::FunctionDecl(_) | Stmt::Empty => {}
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, frame)?,
                    None => Value::Undefined,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond, frame)?.truthy() {
                    return self.exec(then, frame);
                }
                if let Some(otherwise) = otherwise {
                    return self.exec(otherwise, frame);
                }
            }
            Stmt::While { cond, body } => {
                while self.eval(cond, frame)?.truthy() {
                    if let Flow::Return(value) = self.exec(body, frame)? {
                        return Ok(Flow::Return(value));
                    }
                }
            }
            Stmt::Block(stmts) => {
                for stmt in stmts {
                    if let Flow::Return(value) = self.exec(stmt, frame)? {
                        return Ok(Flow::Return(value));
                    }
                }
            }
            Stmt::Throw(expr) => {
                let value = self.eval(expr, frame)?;
                return Err(Exception { value });
            }
        }
        Ok(Flow::Normal)
    }

    fn eval(&mut self, expr: &Expr, frame: &Frame) -> ScriptResult<Value> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_SIZE, || self.eval_inner(expr, frame))
    }

    fn eval_inner(&mut self, expr: &Expr, frame: &Frame) -> ScriptResult<Value> {
        match expr {
            Expr::Number(value) => Ok(Value::Number(*value)),
            Expr::String(value) => Ok(Value::String(value.clone())),
            Expr::Bool(value) => Ok(Value::Bool(*value)),
            Expr::Null => Ok(Value::Null),
            Expr::This => Ok(frame.this.clone()),
            Expr::Ident(name) => self.lookup(&frame.env, name),
            Expr::Member { object, property } => {
                let object = self.eval(object, frame)?;
                self.get_property(&object, property)
            }
            Expr::Index { object, index } => {
                let object = self.eval(object, frame)?;
                let key = self.eval(index, frame)?;
                self.get_property(&object, &property_key(&key))
            }
            Expr::Call { callee, args } => {
                let (function, this) = match callee.as_ref() {
                    Expr::Member { object, property } => {
                        let object = self.eval(object, frame)?;
                        (self.get_property(&object, property)?, object)
                    }
                    Expr::Index { object, index } => {
                        let object = self.eval(object, frame)?;
                        let key = self.eval(index, frame)?;
                        (self.get_property(&object, &property_key(&key))?, object)
                    }
                    other => (self.eval(other, frame)?, Value::Undefined),
                };
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, frame)?);
                }
                self.call_value(&function, this, values)
            }
            Expr::Unary { op, expr } => {
                if *op == UnaryOp::Typeof {
                    if let Expr::Ident(name) = expr.as_ref() {
                        return match self.lookup(&frame.env, name) {
                            Ok(value) => Ok(Value::String(value.type_of().to_string())),
                            Err(_) => Ok(Value::String("undefined".into())),
                        };
                    }
                }
                let value = self.eval(expr, frame)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::Neg => Value::Number(-self.to_number(&value)),
                    UnaryOp::Plus => Value::Number(self.to_number(&value)),
                    UnaryOp::Typeof => Value::String(value.type_of().to_string()),
                    UnaryOp::Void => Value::Undefined,
                })
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs, frame)?;
                let rhs = self.eval(rhs, frame)?;
                Ok(self.binary(*op, &lhs, &rhs))
            }
            Expr::Logical { op, lhs, rhs } => {
                let lhs = self.eval(lhs, frame)?;
                match (op, lhs.truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(lhs),
                    _ => self.eval(rhs, frame),
                }
            }
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond, frame)?.truthy() {
                    self.eval(then, frame)
                } else {
                    self.eval(otherwise, frame)
                }
            }
            Expr::Assign { op, target, value } => {
                let value = match op {
                    Some(op) => {
                        let current = self.eval(target, frame)?;
                        let rhs = self.eval(value, frame)?;
                        self.binary(*op, &current, &rhs)
                    }
                    None => self.eval(value, frame)?,
                };
                self.assign(target, value.clone(), frame)?;
                Ok(value)
            }
            Expr::Update {
                delta,
                prefix,
                target,
            } => {
                let current = self.eval(target, frame)?;
                let old = self.to_number(&current);
                let new = old + delta;
                self.assign(target, Value::Number(new), frame)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, frame)?);
                }
                Ok(Value::Array(ArrayRef::new(values)))
            }
            Expr::Object(props) => {
                let mut entries = Vec::with_capacity(props.len());
                for (key, value) in props {
                    entries.push((key.clone(), self.eval(value, frame)?));
                }
                Ok(Value::Object(ObjectRef::new(ObjectValue::new(entries))))
            }
            Expr::Function(def) => Ok(Value::Function(FunctionRef::script(
                def.clone(),
                frame.env.clone(),
            ))),
        }
    }

    fn assign(&mut self, target: &Expr, value: Value, frame: &Frame) -> ScriptResult<()> {
        match target {
            Expr::Ident(name) => self.assign_ident(&frame.env, name, value),
            Expr::Member { object, property } => {
                let object = self.eval(object, frame)?;
                self.set_property(&object, property, value)
            }
            Expr::Index { object, index } => {
                let object = self.eval(object, frame)?;
                let key = self.eval(index, frame)?;
                self.set_property(&object, &property_key(&key), value)
            }
            _ => Err(Exception::error(
                "SyntaxError",
                "Invalid left-hand side in assignment",
            )),
        }
    }

    /// Resolves an identifier: locals, then object frames (the handler scope
    /// chain), then the realm's globals and the window.
    fn lookup(&mut self, env: &Env, name: &str) -> ScriptResult<Value> {
        let mut current = env.clone();
        loop {
            let next = match current.scope() {
                Scope::Declarative { vars, parent } => {
                    if let Some(binding) = vars.borrow().get(name) {
                        return Ok(binding.value.clone());
                    }
                    parent.clone()
                }
                Scope::Object { binding, parent } => {
                    if self.has_property(binding, name) {
                        return self.get_property(binding, name);
                    }
                    parent.clone()
                }
                Scope::Global => {
                    if let Some(value) = self.sandbox.realm().globals.get(name) {
                        return Ok(value);
                    }
                    if self.has_property(&Value::Window, name) {
                        return self.get_property(&Value::Window, name);
                    }
                    return Err(Exception::reference_error(name));
                }
            };
            current = next;
        }
    }

    fn assign_ident(&mut self, env: &Env, name: &str, value: Value) -> ScriptResult<()> {
        let mut current = env.clone();
        loop {
            let next = match current.scope() {
                Scope::Declarative { vars, parent } => {
                    if let Some(binding) = vars.borrow_mut().get_mut(name) {
                        if !binding.mutable {
                            return Err(Exception::type_error(
                                "Assignment to constant variable.",
                            ));
                        }
                        binding.value = value;
                        return Ok(());
                    }
                    parent.clone()
                }
                Scope::Object { binding, parent } => {
                    if self.has_property(binding, name) {
                        return self.set_property(binding, name, value);
                    }
                    parent.clone()
                }
                Scope::Global => return self.set_property(&Value::Window, name, value),
            };
            current = next;
        }
    }

    pub(crate) fn to_number(&self, value: &Value) -> f64 {
        match value {
            Value::Object(_) | Value::Node(_) | Value::Window | Value::Event(_) => {
                crate::script::value::string_to_number(&self.stringify(value))
            }
            other => other.to_number(),
        }
    }

    fn binary(&mut self, op: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
        match op {
            BinaryOp::Add => {
                if is_string_like(lhs) || is_string_like(rhs) {
                    let mut out = self.stringify(lhs);
                    out.push_str(&self.stringify(rhs));
                    Value::String(out)
                } else {
                    Value::Number(self.to_number(lhs) + self.to_number(rhs))
                }
            }
            BinaryOp::Sub => Value::Number(self.to_number(lhs) - self.to_number(rhs)),
            BinaryOp::Mul => Value::Number(self.to_number(lhs) * self.to_number(rhs)),
            BinaryOp::Div => Value::Number(self.to_number(lhs) / self.to_number(rhs)),
            BinaryOp::Rem => Value::Number(self.to_number(lhs) % self.to_number(rhs)),
            BinaryOp::StrictEq => Value::Bool(strict_equals(lhs, rhs)),
            BinaryOp::StrictNe => Value::Bool(!strict_equals(lhs, rhs)),
            BinaryOp::LooseEq => Value::Bool(loose_equals(lhs, rhs)),
            BinaryOp::LooseNe => Value::Bool(!loose_equals(lhs, rhs)),
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
                let ordering = match (lhs, rhs) {
                    (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                    _ => self.to_number(lhs).partial_cmp(&self.to_number(rhs)),
                };
                let Some(ordering) = ordering else {
                    return Value::Bool(false);
                };
                Value::Bool(match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Gt => ordering.is_gt(),
                    BinaryOp::Le => ordering.is_le(),
                    _ => ordering.is_ge(),
                })
            }
        }
    }
}

fn is_string_like(value: &Value) -> bool {
    !matches!(
        value,
        Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_)
    )
}

fn property_key(key: &Value) -> String {
    match key {
        Value::Number(value) => format_number(*value),
        Value::String(value) => value.clone(),
        other => other.to_string(),
    }
}
