//! The tree-walking evaluator: statement executor, expression evaluator,
//! and the class/instance/destructuring machinery that sits on top of the
//! environment chain and value model.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use tracing::trace;

use crate::ast::*;
use crate::class::{ClassValue, InstanceValue};
use crate::environment::Environment;
use crate::exception::{Exception, ExceptionKind};
use crate::function::{Function, NativeFunction, ScriptFunction};
use crate::module::PackageRegistry;
use crate::promise::EventLoop;
use crate::value::Value;
use crate::module::FileImportCache;

/// Non-local control transfer. `Return`/`Break`/`Continue` unwind a single
/// function body or loop; `Throw` unwinds until a `try` catches it or it
/// escapes the top-level `execute` call.
#[derive(Debug)]
pub enum Flow {
    Return(Value),
    Break,
    Continue,
    Throw(Exception),
}

pub type EvalResult<T> = Result<T, Flow>;

#[derive(Clone, Copy)]
enum BindMode {
    Declare,
    Assign,
}

/// One entry in the call-descriptor stack used to build a thrown
/// exception's `stack` trace. `current_line` tracks the statement this
/// frame is currently executing, so an exception thrown several calls
/// deep picks up each ancestor's call site as it unwinds.
struct CallFrame {
    name: String,
    current_line: Cell<u32>,
}

impl CallFrame {
    fn new(name: String, line: u32) -> Self {
        Self { name, current_line: Cell::new(line) }
    }
}

/// The tree-walking evaluator. Owns the global environment and holds
/// shared handles to the module system and event loop so that `import`,
/// `go`, async calls, and `await` can all reach them without threading
/// extra parameters through every evaluation method.
pub struct Interpreter {
    pub globals: Environment,
    packages: Rc<PackageRegistry>,
    file_cache: Rc<FileImportCache>,
    event_loop: Rc<EventLoop>,
    call_stack: Vec<CallFrame>,
    signal_handlers: HashMap<i32, Value>,
    pending_signals: Arc<Mutex<VecDeque<i32>>>,
}

impl Interpreter {
    pub fn new(packages: Rc<PackageRegistry>, file_cache: Rc<FileImportCache>, event_loop: Rc<EventLoop>) -> Self {
        Self {
            globals: Environment::root(),
            packages,
            file_cache,
            event_loop,
            call_stack: Vec::new(),
            signal_handlers: HashMap::new(),
            pending_signals: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn event_loop(&self) -> Rc<EventLoop> {
        self.event_loop.clone()
    }

    pub fn packages(&self) -> Rc<PackageRegistry> {
        self.packages.clone()
    }

    pub fn file_cache(&self) -> Rc<FileImportCache> {
        self.file_cache.clone()
    }

    pub fn register_signal_handler(&mut self, signal: i32, handler: Value) {
        self.signal_handlers.insert(signal, handler);
    }

    /// A clonable handle a host thread can push signal numbers onto
    /// without touching the interpreter directly.
    pub fn signal_queue(&self) -> Arc<Mutex<VecDeque<i32>>> {
        self.pending_signals.clone()
    }

    pub fn raise_signal(&self, signal: i32) {
        self.pending_signals.lock().unwrap().push_back(signal);
    }

    /// Checked once per statement boundary, never mid-expression, so a
    /// handler can't reenter the evaluator partway through evaluating one.
    fn poll_signals(&mut self) {
        let pending = self.pending_signals.lock().unwrap().pop_front();
        if let Some(signal) = pending {
            if let Some(handler) = self.signal_handlers.get(&signal).cloned() {
                let _ = self.call_value(handler, Value::Null, vec![Value::Number(f64::from(signal))]);
            }
        }
    }

    /// Runs a parsed top-level statement list directly in the global
    /// environment.
    pub fn execute(&mut self, statements: &[Stmt]) -> EvalResult<()> {
        let env = self.globals.clone();
        self.exec_block(statements, &env)
    }

    /// Converts a non-`Throw` `Flow` that escaped a function body into a
    /// reportable exception. Used by the event loop when an async body's
    /// execution ends in something other than `Return`/`Throw`.
    pub fn flow_into_exception(&mut self, flow: Flow) -> Exception {
        match flow {
            Flow::Throw(exc) => exc,
            Flow::Return(_) | Flow::Break | Flow::Continue => {
                Exception::new(ExceptionKind::Error, "control flow escaped a function body")
            }
        }
    }

    /// Runs a function body to completion, collapsing `Return`/fall-through
    /// into an `Ok` value. Does not push a call frame: callers that need a
    /// stack-trace entry (ordinary script calls) wrap this themselves;
    /// deferred async bodies, which have no live call site to annotate,
    /// call this directly.
    pub fn run_function_body(&mut self, body: &[Stmt], env: &Environment) -> EvalResult<Value> {
        match self.exec_block(body, env) {
            Ok(()) => Ok(Value::Null),
            Err(Flow::Return(v)) => Ok(v),
            Err(Flow::Throw(e)) => Err(Flow::Throw(e)),
            Err(Flow::Break | Flow::Continue) => {
                Err(Flow::Throw(Exception::new(ExceptionKind::Error, "break/continue escaped a function body")))
            }
        }
    }

    /// Calls any callable value with an explicit receiver. The entry point
    /// promise dispatch and native code use to invoke a script callback
    /// without going through a call expression's span bookkeeping.
    pub fn call_value(&mut self, callee: Value, this: Value, args: Vec<Value>) -> EvalResult<Value> {
        match callee {
            Value::Function(f) => self.invoke_function(f, this, args, Span::default()),
            other => Err(Flow::Throw(Exception::new(ExceptionKind::TypeError, format!("'{}' is not callable", other.type_name())))),
        }
    }

    pub fn eval_expr(&mut self, expr: &Expr, env: &Environment) -> EvalResult<Value> {
        match expr {
            Expr::Literal { value, .. } => Ok(literal_value(value)),
            Expr::Interpolated { parts, .. } => {
                let mut out = String::new();
                for part in parts {
                    out.push_str(&self.eval_expr(part, env)?.to_display_string());
                }
                Ok(Value::string(out))
            }
            Expr::Variable { name, span } => {
                env.get(name).ok_or_else(|| self.throw(ExceptionKind::NameError, format!("undefined variable '{name}'"), *span))
            }
            Expr::Assign { name, op, value, span } => self.eval_assign(name, *op, value, env, *span),
            Expr::DestructuringAssign { pattern, value, span } => {
                let v = self.eval_expr(value, env)?;
                self.bind_pattern(pattern, v.clone(), env, BindMode::Assign, *span)?;
                Ok(v)
            }
            Expr::Unary { op, expr, .. } => {
                let v = self.eval_expr(expr, env)?;
                Ok(match op {
                    UnaryOp::Neg => Value::Number(-v.to_number()),
                    UnaryOp::Not => Value::Boolean(!v.is_truthy()),
                    UnaryOp::BitNot => Value::Number(!(truncate(v.to_number())) as f64),
                })
            }
            Expr::Update { op, target, prefix, span } => {
                let old = self.read_target(target, env, *span)?.to_number();
                let new_num = match op {
                    UpdateOp::Increment => old + 1.0,
                    UpdateOp::Decrement => old - 1.0,
                };
                self.write_target(target, env, Value::Number(new_num), *span)?;
                Ok(Value::Number(if *prefix { new_num } else { old }))
            }
            Expr::Binary { op, left, right, span } => {
                let l = self.eval_expr(left, env)?;
                let r = self.eval_expr(right, env)?;
                self.apply_binary(*op, l, r, *span)
            }
            Expr::Logical { op, left, right, .. } => {
                let l = self.eval_expr(left, env)?;
                match op {
                    LogicalOp::And => {
                        if l.is_truthy() {
                            self.eval_expr(right, env)
                        } else {
                            Ok(l)
                        }
                    }
                    LogicalOp::Or => {
                        if l.is_truthy() {
                            Ok(l)
                        } else {
                            self.eval_expr(right, env)
                        }
                    }
                    LogicalOp::NullishCoalesce => {
                        if matches!(l, Value::Null) {
                            self.eval_expr(right, env)
                        } else {
                            Ok(l)
                        }
                    }
                }
            }
            Expr::Conditional { cond, then_branch, else_branch, .. } => {
                if self.eval_expr(cond, env)?.is_truthy() {
                    self.eval_expr(then_branch, env)
                } else {
                    self.eval_expr(else_branch, env)
                }
            }
            Expr::Call { callee, args, span } => {
                let callee_val = self.eval_expr(callee, env)?;
                let evaluated = self.eval_array_elements(args, env)?;
                match callee_val {
                    Value::Function(f) => self.invoke_function(f, Value::Null, evaluated, *span),
                    other => Err(self.throw(ExceptionKind::TypeError, format!("'{}' is not callable", other.type_name()), *span)),
                }
            }
            Expr::New { class_expr, args, span } => {
                let class_val = self.eval_expr(class_expr, env)?;
                let Value::Class(cls) = class_val else {
                    return Err(self.throw(ExceptionKind::TypeError, format!("cannot 'new' a {}", class_val.type_name()), *span));
                };
                let evaluated = self.eval_array_elements(args, env)?;
                let instance = Rc::new(RefCell::new(InstanceValue::new(cls.clone())));
                let ctor = cls.borrow().lookup_method("constructor");
                if let Some(Value::Function(f)) = ctor {
                    self.invoke_function(f, Value::Instance(instance.clone()), evaluated, *span)?;
                }
                Ok(Value::Instance(instance))
            }
            Expr::Get { object, name, span } => {
                let obj = self.eval_expr(object, env)?;
                self.get_property(obj, name, *span)
            }
            Expr::OptionalGet { object, name, span } => {
                let obj = self.eval_expr(object, env)?;
                if matches!(obj, Value::Null) {
                    Ok(Value::Null)
                } else {
                    self.get_property(obj, name, *span)
                }
            }
            Expr::Index { object, index, span } => {
                let obj = self.eval_expr(object, env)?;
                let idx = self.eval_expr(index, env)?;
                self.index_get(obj, &idx, *span)
            }
            Expr::SetProperty { object, name, value, span } => {
                let obj = self.eval_expr(object, env)?;
                let v = self.eval_expr(value, env)?;
                self.set_property(obj, name, v.clone(), *span)?;
                Ok(v)
            }
            Expr::SetIndex { object, index, value, span } => {
                let obj = self.eval_expr(object, env)?;
                let idx = self.eval_expr(index, env)?;
                let v = self.eval_expr(value, env)?;
                self.set_index(obj, &idx, v.clone(), *span)?;
                Ok(v)
            }
            Expr::ArrayLiteral { elements, .. } => Ok(Value::array(self.eval_array_elements(elements, env)?)),
            Expr::ObjectLiteral { properties, .. } => self.eval_object_literal(properties, env),
            Expr::Await { expr, span } => {
                let v = self.eval_expr(expr, env)?;
                let Value::Promise(promise) = v else {
                    return Err(self.throw(ExceptionKind::TypeError, "cannot await a non-promise value", *span));
                };
                let event_loop = self.event_loop.clone();
                let (result, rejected) = event_loop.await_promise(self, &promise);
                if rejected {
                    Err(Flow::Throw(self.reify_exception(result, *span)))
                } else {
                    Ok(result)
                }
            }
            Expr::Yield { span, .. } => {
                Err(self.throw(ExceptionKind::Error, "generators are not executable in this build", *span))
            }
            Expr::FunctionExpr { decl, .. } => {
                Ok(Value::Function(Function::Script(Rc::new(ScriptFunction::from_decl(decl, env.clone())))))
            }
        }
    }

    fn eval_assign(&mut self, name: &str, op: AssignOp, value: &Expr, env: &Environment, span: Span) -> EvalResult<Value> {
        if matches!(op, AssignOp::Assign) {
            let v = self.eval_expr(value, env)?;
            if !env.assign(name, v.clone()) {
                return Err(self.throw(ExceptionKind::NameError, format!("undefined variable '{name}'"), span));
            }
            return Ok(v);
        }
        let current = env.get(name).ok_or_else(|| self.throw(ExceptionKind::NameError, format!("undefined variable '{name}'"), span))?;
        let result = match op {
            AssignOp::NullishAssign => {
                if matches!(current, Value::Null) {
                    self.eval_expr(value, env)?
                } else {
                    return Ok(current);
                }
            }
            AssignOp::AndAssign => {
                if current.is_truthy() {
                    self.eval_expr(value, env)?
                } else {
                    return Ok(current);
                }
            }
            AssignOp::OrAssign => {
                if !current.is_truthy() {
                    self.eval_expr(value, env)?
                } else {
                    return Ok(current);
                }
            }
            AssignOp::AddAssign | AssignOp::SubAssign | AssignOp::MulAssign | AssignOp::DivAssign | AssignOp::RemAssign => {
                let rhs = self.eval_expr(value, env)?;
                let bin_op = match op {
                    AssignOp::AddAssign => BinaryOp::Add,
                    AssignOp::SubAssign => BinaryOp::Sub,
                    AssignOp::MulAssign => BinaryOp::Mul,
                    AssignOp::DivAssign => BinaryOp::Div,
                    AssignOp::RemAssign => BinaryOp::Rem,
                    _ => unreachable!(),
                };
                self.apply_binary(bin_op, current, rhs, span)?
            }
            AssignOp::Assign => unreachable!("handled above"),
        };
        env.assign(name, result.clone());
        Ok(result)
    }

    fn eval_array_elements(&mut self, elements: &[ArrayElement], env: &Environment) -> EvalResult<Vec<Value>> {
        let mut out = Vec::with_capacity(elements.len());
        for el in elements {
            match el {
                ArrayElement::Item(e) => out.push(self.eval_expr(e, env)?),
                ArrayElement::Spread(e) => {
                    let v = self.eval_expr(e, env)?;
                    match v {
                        Value::Array(items) => out.extend(items.borrow().iter().cloned()),
                        other => return Err(self.throw(ExceptionKind::TypeError, format!("cannot spread a {}", other.type_name()), e.span())),
                    }
                }
            }
        }
        Ok(out)
    }

    fn eval_object_literal(&mut self, properties: &[ObjectProperty], env: &Environment) -> EvalResult<Value> {
        let mut map = IndexMap::new();
        for prop in properties {
            match prop {
                ObjectProperty::KeyValue { key, value, .. } => {
                    let v = self.eval_expr(value, env)?;
                    map.insert(Rc::from(key.as_str()), v);
                }
                ObjectProperty::Spread(expr) => {
                    let v = self.eval_expr(expr, env)?;
                    match v {
                        Value::Object(src) => {
                            for (k, val) in src.borrow().iter() {
                                map.insert(k.clone(), val.clone());
                            }
                        }
                        other => return Err(self.throw(ExceptionKind::TypeError, format!("cannot spread a {}", other.type_name()), expr.span())),
                    }
                }
            }
        }
        Ok(Value::object(map))
    }

    // ---- assignment/update targets ----

    fn read_target(&mut self, target: &Expr, env: &Environment, span: Span) -> EvalResult<Value> {
        match target {
            Expr::Variable { name, span } => {
                env.get(name).ok_or_else(|| self.throw(ExceptionKind::NameError, format!("undefined variable '{name}'"), *span))
            }
            Expr::Get { object, name, span } => {
                let obj = self.eval_expr(object, env)?;
                self.get_property(obj, name, *span)
            }
            Expr::Index { object, index, span } => {
                let obj = self.eval_expr(object, env)?;
                let idx = self.eval_expr(index, env)?;
                self.index_get(obj, &idx, *span)
            }
            _ => Err(self.throw(ExceptionKind::TypeError, "invalid assignment target", span)),
        }
    }

    fn write_target(&mut self, target: &Expr, env: &Environment, value: Value, span: Span) -> EvalResult<()> {
        match target {
            Expr::Variable { name, span } => {
                if env.assign(name, value) {
                    Ok(())
                } else {
                    Err(self.throw(ExceptionKind::NameError, format!("undefined variable '{name}'"), *span))
                }
            }
            Expr::Get { object, name, span } => {
                let obj = self.eval_expr(object, env)?;
                self.set_property(obj, name, value, *span)
            }
            Expr::Index { object, index, span } => {
                let obj = self.eval_expr(object, env)?;
                let idx = self.eval_expr(index, env)?;
                self.set_index(obj, &idx, value, *span)
            }
            _ => Err(self.throw(ExceptionKind::TypeError, "invalid assignment target", span)),
        }
    }

    // ---- property/index access ----

    /// Missing-property reads resolve to `Null` everywhere except on an
    /// `Instance`, where a field or method is expected to exist.
    fn get_property(&mut self, object: Value, name: &str, span: Span) -> EvalResult<Value> {
        match object {
            Value::Null | Value::Number(_) | Value::Boolean(_) | Value::Function(_) => Ok(Value::Null),
            Value::String(s) => Ok(string_method(&s, name).unwrap_or(Value::Null)),
            Value::Array(arr) => Ok(array_method(&arr, name, span).unwrap_or(Value::Null)),
            Value::Object(map) => {
                if let Some(v) = map.borrow().get(name) {
                    return Ok(v.clone());
                }
                if name == "len" {
                    return Ok(Value::Number(map.borrow().len() as f64));
                }
                Ok(Value::Null)
            }
            Value::Instance(inst) => {
                let field = inst.borrow().fields.get(name).cloned();
                if let Some(v) = field {
                    return Ok(v);
                }
                let method = inst.borrow().class.borrow().lookup_method(name);
                match method {
                    Some(Value::Function(f)) => Ok(Value::Function(f.bind(Value::Instance(inst.clone())))),
                    Some(other) => Ok(other),
                    None => {
                        let class_name = inst.borrow().class_name();
                        Err(self.throw(ExceptionKind::NameError, format!("'{class_name}' has no field or method named '{name}'"), span))
                    }
                }
            }
            Value::Class(cls) => Ok(cls.borrow().lookup_static_method(name).unwrap_or(Value::Null)),
            Value::Promise(p) => match name {
                "then" | "catch" => Ok(promise_method(&self.event_loop, &p, name)),
                _ => Ok(Value::Null),
            },
        }
    }

    fn set_property(&mut self, object: Value, name: &str, value: Value, span: Span) -> EvalResult<()> {
        match object {
            Value::Object(map) => {
                map.borrow_mut().insert(Rc::from(name), value);
                Ok(())
            }
            Value::Instance(inst) => {
                inst.borrow_mut().fields.insert(Rc::from(name), value);
                Ok(())
            }
            other => Err(self.throw(ExceptionKind::TypeError, format!("cannot set property '{name}' on a {}", other.type_name()), span)),
        }
    }

    fn index_get(&mut self, object: Value, index: &Value, span: Span) -> EvalResult<Value> {
        match object {
            Value::Array(arr) => {
                let i = index.to_number();
                if i.fract() != 0.0 || i < 0.0 {
                    return Err(self.throw(ExceptionKind::RangeError, format!("array index {i} out of range"), span));
                }
                let i = i as usize;
                let items = arr.borrow();
                items
                    .get(i)
                    .cloned()
                    .ok_or_else(|| self.throw(ExceptionKind::RangeError, format!("array index {i} out of range (len {})", items.len()), span))
            }
            Value::Object(map) => Ok(map.borrow().get(index.to_display_string().as_str()).cloned().unwrap_or(Value::Null)),
            Value::Instance(inst) => Ok(inst.borrow().fields.get(index.to_display_string().as_str()).cloned().unwrap_or(Value::Null)),
            Value::String(s) => {
                let i = index.to_number();
                if i.fract() != 0.0 || i < 0.0 {
                    return Err(self.throw(ExceptionKind::RangeError, "string index out of range", span));
                }
                let bytes = s.as_bytes();
                bytes
                    .get(i as usize)
                    .map(|b| Value::string(String::from_utf8_lossy(std::slice::from_ref(b)).into_owned()))
                    .ok_or_else(|| self.throw(ExceptionKind::RangeError, "string index out of range", span))
            }
            other => Err(self.throw(ExceptionKind::TypeError, format!("cannot index a {}", other.type_name()), span)),
        }
    }

    fn set_index(&mut self, object: Value, index: &Value, value: Value, span: Span) -> EvalResult<()> {
        match object {
            Value::Array(arr) => {
                let i = index.to_number();
                if i.fract() != 0.0 || i < 0.0 {
                    return Err(self.throw(ExceptionKind::RangeError, "array index out of range", span));
                }
                let i = i as usize;
                let mut items = arr.borrow_mut();
                if i < items.len() {
                    items[i] = value;
                    Ok(())
                } else if i == items.len() {
                    items.push(value);
                    Ok(())
                } else {
                    Err(self.throw(ExceptionKind::RangeError, format!("array index {i} out of range (len {})", items.len()), span))
                }
            }
            Value::Object(map) => {
                map.borrow_mut().insert(Rc::from(index.to_display_string().as_str()), value);
                Ok(())
            }
            Value::Instance(inst) => {
                inst.borrow_mut().fields.insert(Rc::from(index.to_display_string().as_str()), value);
                Ok(())
            }
            other => Err(self.throw(ExceptionKind::TypeError, format!("cannot index-assign on a {}", other.type_name()), span)),
        }
    }

    // ---- binary operators ----

    fn apply_binary(&mut self, op: BinaryOp, l: Value, r: Value, span: Span) -> EvalResult<Value> {
        match op {
            BinaryOp::Add => self.apply_add(l, r, span),
            BinaryOp::Sub => self.apply_overloadable(l, r, span, "__sub__", |a, b| a - b),
            BinaryOp::Mul => Ok(Value::Number(l.to_number() * r.to_number())),
            BinaryOp::Div => Ok(Value::Number(l.to_number() / r.to_number())),
            BinaryOp::Rem => Ok(Value::Number(l.to_number() % r.to_number())),
            BinaryOp::Eq => Ok(Value::Boolean(l.loose_eq(&r))),
            BinaryOp::NotEq => Ok(Value::Boolean(!l.loose_eq(&r))),
            BinaryOp::StrictEq => Ok(Value::Boolean(l.strict_eq(&r))),
            BinaryOp::StrictNotEq => Ok(Value::Boolean(!l.strict_eq(&r))),
            BinaryOp::Lt => Ok(Value::Boolean(l.partial_compare(&r) == Some(Ordering::Less))),
            BinaryOp::LtEq => Ok(Value::Boolean(matches!(l.partial_compare(&r), Some(Ordering::Less | Ordering::Equal)))),
            BinaryOp::Gt => Ok(Value::Boolean(l.partial_compare(&r) == Some(Ordering::Greater))),
            BinaryOp::GtEq => Ok(Value::Boolean(matches!(l.partial_compare(&r), Some(Ordering::Greater | Ordering::Equal)))),
            BinaryOp::InterfaceMatch => self.apply_interface_match(&l, &r, span),
            BinaryOp::Shl => self.apply_shift(l, r, span, "__shl__", true),
            BinaryOp::Shr => self.apply_shift(l, r, span, "__shr__", false),
            BinaryOp::BitAnd => Ok(Value::Number((truncate(l.to_number()) & truncate(r.to_number())) as f64)),
            BinaryOp::BitOr => Ok(Value::Number((truncate(l.to_number()) | truncate(r.to_number())) as f64)),
            BinaryOp::BitXor => Ok(Value::Number((truncate(l.to_number()) ^ truncate(r.to_number())) as f64)),
        }
    }

    /// `+`: numeric addition, string concatenation if either side is a
    /// string, otherwise `__add__` dispatch on a left-hand instance.
    fn apply_add(&mut self, l: Value, r: Value, span: Span) -> EvalResult<Value> {
        if let (Value::Number(a), Value::Number(b)) = (&l, &r) {
            return Ok(Value::Number(a + b));
        }
        if matches!(l, Value::String(_)) || matches!(r, Value::String(_)) {
            return Ok(Value::string(format!("{}{}", l.to_display_string(), r.to_display_string())));
        }
        self.dispatch_operator_overload(l, r, span, "__add__", "add")
    }

    /// `-` and any numeric operator whose fallback is an instance method:
    /// numeric case handled by `numeric`, otherwise dispatch `method` on a
    /// left-hand instance.
    fn apply_overloadable(&mut self, l: Value, r: Value, span: Span, method: &str, numeric: impl Fn(f64, f64) -> f64) -> EvalResult<Value> {
        if let (Value::Number(a), Value::Number(b)) = (&l, &r) {
            return Ok(Value::Number(numeric(*a, *b)));
        }
        self.dispatch_operator_overload(l, r, span, method, "subtract")
    }

    fn apply_shift(&mut self, l: Value, r: Value, span: Span, method: &str, is_left: bool) -> EvalResult<Value> {
        if let (Value::Number(_), Value::Number(_)) = (&l, &r) {
            let a = truncate(l.to_number());
            let b = truncate(r.to_number()) & 63;
            let result = if is_left { a.wrapping_shl(b as u32) } else { a.wrapping_shr(b as u32) };
            return Ok(Value::Number(result as f64));
        }
        self.dispatch_operator_overload(l, r, span, method, "shift")
    }

    fn dispatch_operator_overload(&mut self, l: Value, r: Value, span: Span, method_name: &str, verb: &str) -> EvalResult<Value> {
        if let Value::Instance(inst) = &l {
            let method = inst.borrow().class.borrow().lookup_method(method_name);
            if let Some(Value::Function(f)) = method {
                return self.invoke_function(f.bind(l.clone()), Value::Null, vec![r], span);
            }
        }
        Err(self.throw(ExceptionKind::TypeError, format!("cannot {verb} {} and {}", l.type_name(), r.type_name()), span))
    }

    /// Right-hand side must be a class (plain or interface-as-class).
    /// Left satisfies it iff it exposes every method name *directly
    /// declared* on the right.
    fn apply_interface_match(&mut self, l: &Value, r: &Value, span: Span) -> EvalResult<Value> {
        let Value::Class(cls) = r else {
            return Err(self.throw(ExceptionKind::TypeError, "right-hand side of '=~=' must be a class or interface", span));
        };
        let required: Vec<Rc<str>> = cls.borrow().methods.keys().cloned().collect();
        let satisfied = required.iter().all(|m| match l {
            Value::Instance(inst) => inst.borrow().class.borrow().implements(m),
            Value::Object(map) => map.borrow().contains_key(m.as_ref()),
            _ => false,
        });
        Ok(Value::Boolean(satisfied))
    }

    // ---- calls ----

    fn check_arity(&self, arity: (usize, Option<usize>), got: usize, span: Span) -> EvalResult<()> {
        let (min, max) = arity;
        if got < min || max.is_some_and(|m| got > m) {
            let max_text = max.map_or_else(|| "unbounded".to_string(), |m| m.to_string());
            return Err(self.throw(
                ExceptionKind::ArityError,
                format!("expected between {min} and {max_text} arguments, got {got}"),
                span,
            ));
        }
        Ok(())
    }

    fn invoke_function(&mut self, func: Function, this: Value, args: Vec<Value>, span: Span) -> EvalResult<Value> {
        match func {
            Function::Bound(inner, bound_this) => self.invoke_function(*inner, bound_this, args, span),
            Function::Native(nf) => {
                self.check_arity((nf.min_arity, nf.max_arity), args.len(), span)?;
                nf.invoke(self, this, args)
            }
            Function::Script(sf) => self.invoke_script(sf, this, args, span),
        }
    }

    fn invoke_script(&mut self, sf: Rc<ScriptFunction>, this: Value, args: Vec<Value>, span: Span) -> EvalResult<Value> {
        self.check_arity(sf.arity(), args.len(), span)?;
        if sf.is_generator && !sf.is_async {
            return Err(self.throw(ExceptionKind::Error, "generators are not executable in this build", span));
        }
        let call_env = Environment::child_of(&sf.closure);
        call_env.define("this", this);
        self.bind_params(&sf.params, sf.rest_index, &args, &call_env, span)?;
        if sf.is_async {
            let promise = self.event_loop.new_promise();
            self.event_loop.schedule_async_body(sf.body.clone(), call_env, promise.clone());
            return Ok(Value::Promise(promise));
        }
        let frame_name = sf.name.clone().unwrap_or_else(|| "<anonymous>".to_string());
        trace!(function = frame_name.as_str(), "entering call");
        self.call_stack.push(CallFrame::new(frame_name.clone(), span.line));
        let result = self.run_function_body(&sf.body, &call_env);
        self.call_stack.pop();
        match result {
            Ok(v) => Ok(v),
            Err(Flow::Throw(mut exc)) => {
                exc.push_frame(frame_name, span.line);
                Err(Flow::Throw(exc))
            }
            Err(other) => Err(other),
        }
    }

    fn bind_params(&mut self, params: &[Param], rest_index: Option<usize>, args: &[Value], env: &Environment, span: Span) -> EvalResult<()> {
        for (i, param) in params.iter().enumerate() {
            if Some(i) == rest_index {
                let rest_args = if i < args.len() { args[i..].to_vec() } else { Vec::new() };
                self.bind_pattern(&param.pattern, Value::array(rest_args), env, BindMode::Declare, span)?;
                continue;
            }
            let value = args.get(i).cloned().unwrap_or(Value::Null);
            self.bind_pattern(&param.pattern, value, env, BindMode::Declare, span)?;
        }
        Ok(())
    }

    // ---- destructuring ----

    fn bind_pattern(&mut self, pattern: &Pattern, value: Value, env: &Environment, mode: BindMode, span: Span) -> EvalResult<()> {
        match pattern {
            Pattern::Identifier { name, default } => {
                let resolved = if matches!(value, Value::Null) {
                    match default {
                        Some(expr) => self.eval_expr(expr, env)?,
                        None => value,
                    }
                } else {
                    value
                };
                match mode {
                    BindMode::Declare => {
                        env.define(name.clone(), resolved);
                        Ok(())
                    }
                    BindMode::Assign => {
                        if env.assign(name, resolved) {
                            Ok(())
                        } else {
                            Err(self.throw(ExceptionKind::NameError, format!("undefined variable '{name}'"), span))
                        }
                    }
                }
            }
            Pattern::Array { elements, rest } => {
                let items = match &value {
                    Value::Array(a) => a.borrow().clone(),
                    _ => return Err(self.throw(ExceptionKind::TypeError, "cannot destructure a non-array value", span)),
                };
                for (i, elem) in elements.iter().enumerate() {
                    let item = items.get(i).cloned().unwrap_or(Value::Null);
                    self.bind_pattern(elem, item, env, mode, span)?;
                }
                if let Some(rest_pattern) = rest {
                    let remaining = if items.len() > elements.len() { items[elements.len()..].to_vec() } else { Vec::new() };
                    self.bind_pattern(rest_pattern, Value::array(remaining), env, mode, span)?;
                }
                Ok(())
            }
            Pattern::Object { properties, rest } => {
                let map = match &value {
                    Value::Object(m) => m.clone(),
                    _ => return Err(self.throw(ExceptionKind::TypeError, "cannot destructure a non-object value", span)),
                };
                let mut used: HashSet<String> = HashSet::new();
                for (key, sub) in properties {
                    let v = map.borrow().get(key.as_str()).cloned().unwrap_or(Value::Null);
                    used.insert(key.clone());
                    self.bind_pattern(sub, v, env, mode, span)?;
                }
                if let Some(rest_name) = rest {
                    let mut leftover = IndexMap::new();
                    for (k, v) in map.borrow().iter() {
                        if !used.contains(k.as_ref()) {
                            leftover.insert(k.clone(), v.clone());
                        }
                    }
                    let rest_value = Value::object(leftover);
                    match mode {
                        BindMode::Declare => env.define(rest_name.clone(), rest_value),
                        BindMode::Assign => {
                            env.assign(rest_name, rest_value);
                        }
                    }
                }
                Ok(())
            }
        }
    }

    fn mark_pattern_exported(&self, pattern: &Pattern, env: &Environment) {
        match pattern {
            Pattern::Identifier { name, .. } => env.mark_exported(name.clone()),
            Pattern::Array { elements, rest } => {
                for e in elements {
                    self.mark_pattern_exported(e, env);
                }
                if let Some(r) = rest {
                    self.mark_pattern_exported(r, env);
                }
            }
            Pattern::Object { properties, rest } => {
                for (_, p) in properties {
                    self.mark_pattern_exported(p, env);
                }
                if let Some(r) = rest {
                    env.mark_exported(r.clone());
                }
            }
        }
    }

    // ---- statements ----

    fn exec_block(&mut self, statements: &[Stmt], env: &Environment) -> EvalResult<()> {
        for stmt in statements {
            self.exec_stmt(stmt, env)?;
        }
        Ok(())
    }

    pub(crate) fn exec_stmt(&mut self, stmt: &Stmt, env: &Environment) -> EvalResult<()> {
        self.poll_signals();
        if let Some(frame) = self.call_stack.last() {
            frame.current_line.set(stmt.line());
        }
        match stmt {
            Stmt::Expression { expr, .. } => {
                self.eval_expr(expr, env)?;
                Ok(())
            }
            Stmt::VariableDecl { name, initializer, exported, .. } => {
                let value = match initializer {
                    Some(e) => self.eval_expr(e, env)?,
                    None => Value::Null,
                };
                env.define(name.clone(), value);
                if *exported {
                    env.mark_exported(name.clone());
                }
                Ok(())
            }
            Stmt::DestructuringVariableDecl { pattern, initializer, exported, line } => {
                let value = self.eval_expr(initializer, env)?;
                self.bind_pattern(pattern, value, env, BindMode::Declare, Span::new(*line, 1, 1))?;
                if *exported {
                    self.mark_pattern_exported(pattern, env);
                }
                Ok(())
            }
            Stmt::Block { statements, .. } => {
                let child = Environment::child_of(env);
                self.exec_block(statements, &child)
            }
            Stmt::If { condition, then_branch, else_branch, .. } => {
                if self.eval_expr(condition, env)?.is_truthy() {
                    self.exec_stmt(then_branch, env)
                } else if let Some(e) = else_branch {
                    self.exec_stmt(e, env)
                } else {
                    Ok(())
                }
            }
            Stmt::While { condition, body, .. } => {
                while self.eval_expr(condition, env)?.is_truthy() {
                    match self.exec_stmt(body, env) {
                        Ok(()) | Err(Flow::Continue) => {}
                        Err(Flow::Break) => break,
                        Err(other) => return Err(other),
                    }
                }
                Ok(())
            }
            Stmt::DoWhile { body, condition, .. } => {
                loop {
                    match self.exec_stmt(body, env) {
                        Ok(()) | Err(Flow::Continue) => {}
                        Err(Flow::Break) => break,
                        Err(other) => return Err(other),
                    }
                    if !self.eval_expr(condition, env)?.is_truthy() {
                        break;
                    }
                }
                Ok(())
            }
            Stmt::For { init, condition, update, body, .. } => {
                let loop_env = Environment::child_of(env);
                if let Some(init) = init {
                    self.exec_stmt(init, &loop_env)?;
                }
                loop {
                    if let Some(cond) = condition {
                        if !self.eval_expr(cond, &loop_env)?.is_truthy() {
                            break;
                        }
                    }
                    match self.exec_stmt(body, &loop_env) {
                        Ok(()) | Err(Flow::Continue) => {}
                        Err(Flow::Break) => break,
                        Err(other) => return Err(other),
                    }
                    if let Some(update) = update {
                        self.eval_expr(update, &loop_env)?;
                    }
                }
                Ok(())
            }
            Stmt::Foreach { binding, iterable, body, line } => {
                let iterable_val = self.eval_expr(iterable, env)?;
                let items: Vec<Value> = match &iterable_val {
                    Value::Array(arr) => arr.borrow().clone(),
                    Value::Object(map) => map.borrow().keys().map(|k| Value::string(k.clone())).collect(),
                    Value::String(s) => s.as_bytes().iter().map(|b| Value::string(String::from_utf8_lossy(std::slice::from_ref(b)).into_owned())).collect(),
                    other => return Err(self.throw(ExceptionKind::TypeError, format!("cannot iterate a {}", other.type_name()), Span::new(*line, 1, 1))),
                };
                for item in items {
                    let iter_env = Environment::child_of(env);
                    iter_env.define(binding.clone(), item);
                    match self.exec_stmt(body, &iter_env) {
                        Ok(()) | Err(Flow::Continue) => {}
                        Err(Flow::Break) => break,
                        Err(other) => return Err(other),
                    }
                }
                Ok(())
            }
            Stmt::Switch { discriminant, cases, .. } => self.exec_switch(discriminant, cases, env),
            Stmt::Match { discriminant, arms, .. } => self.exec_match(discriminant, arms, env),
            Stmt::Return { value, .. } => {
                let v = match value {
                    Some(e) => self.eval_expr(e, env)?,
                    None => Value::Null,
                };
                Err(Flow::Return(v))
            }
            Stmt::Throw { value, line } => {
                let v = self.eval_expr(value, env)?;
                Err(Flow::Throw(self.reify_exception(v, Span::new(*line, 1, 1))))
            }
            Stmt::TryCatchFinally { try_block, catch_name, catch_block, finally_block, .. } => {
                self.exec_try(try_block, catch_name.as_deref(), catch_block.as_deref(), finally_block.as_deref(), env)
            }
            Stmt::Break { .. } => Err(Flow::Break),
            Stmt::Continue { .. } => Err(Flow::Continue),
            Stmt::Function { decl, exported, decorators, .. } => self.exec_function_decl(decl, *exported, decorators, env),
            Stmt::Class { decl, exported, .. } => self.exec_class_decl(decl, *exported, env),
            Stmt::ExtendsBlock { name, members, line } => self.exec_extends_block(name, members, env, *line),
            Stmt::Interface { decl, exported, .. } => {
                self.exec_interface_decl(decl, *exported, env);
                Ok(())
            }
            Stmt::Go { expr, .. } => {
                self.event_loop.schedule_go(expr.clone(), env.clone());
                Ok(())
            }
            Stmt::Import { decl, .. } => self.exec_import(&decl.kind, decl.line, env),
            Stmt::Empty { .. } => Ok(()),
        }
    }

    fn exec_switch(&mut self, discriminant: &Expr, cases: &[SwitchCase], env: &Environment) -> EvalResult<()> {
        let disc = self.eval_expr(discriminant, env)?;
        let mut start_index = None;
        for (i, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test {
                let test_val = self.eval_expr(test, env)?;
                if disc.strict_eq(&test_val) {
                    start_index = Some(i);
                    break;
                }
            }
        }
        if start_index.is_none() {
            start_index = cases.iter().position(|c| c.test.is_none());
        }
        let Some(start) = start_index else { return Ok(()) };
        let switch_env = Environment::child_of(env);
        // switch falls through case boundaries until `break`, unlike `match`.
        for case in &cases[start..] {
            for stmt in &case.body {
                match self.exec_stmt(stmt, &switch_env) {
                    Ok(()) => {}
                    Err(Flow::Break) => return Ok(()),
                    Err(other) => return Err(other),
                }
            }
        }
        Ok(())
    }

    fn exec_match(&mut self, discriminant: &Expr, arms: &[MatchArm], env: &Environment) -> EvalResult<()> {
        let disc = self.eval_expr(discriminant, env)?;
        for arm in arms {
            let pattern_val = self.eval_expr(&arm.pattern, env)?;
            if disc.strict_eq(&pattern_val) {
                let arm_env = Environment::child_of(env);
                return self.exec_block(&arm.body, &arm_env);
            }
        }
        Ok(())
    }

    fn exec_try(
        &mut self,
        try_block: &[Stmt],
        catch_name: Option<&str>,
        catch_block: Option<&[Stmt]>,
        finally_block: Option<&[Stmt]>,
        env: &Environment,
    ) -> EvalResult<()> {
        let try_env = Environment::child_of(env);
        let mut result = self.exec_block(try_block, &try_env);
        if let Err(Flow::Throw(exc)) = result {
            if let Some(catch_stmts) = catch_block {
                let catch_env = Environment::child_of(env);
                if let Some(name) = catch_name {
                    catch_env.define(name, Value::exception_to_value(exc));
                }
                result = self.exec_block(catch_stmts, &catch_env);
            } else {
                result = Err(Flow::Throw(exc));
            }
        }
        if let Some(finally_stmts) = finally_block {
            let finally_env = Environment::child_of(env);
            let finally_result = self.exec_block(finally_stmts, &finally_env);
            if finally_result.is_err() {
                return finally_result;
            }
        }
        result
    }

    // ---- declarations ----

    fn exec_function_decl(&mut self, decl: &Rc<FunctionDecl>, exported: bool, decorators: &[Decorator], env: &Environment) -> EvalResult<()> {
        let func = Value::Function(Function::Script(Rc::new(ScriptFunction::from_decl(decl, env.clone()))));
        let decorated = self.apply_decorators(decorators, func, env)?;
        let name = decl.name.clone().unwrap_or_else(|| "<anonymous>".to_string());
        env.define(name.clone(), decorated);
        if exported {
            env.mark_exported(name);
        }
        Ok(())
    }

    fn apply_decorators(&mut self, decorators: &[Decorator], mut target: Value, env: &Environment) -> EvalResult<Value> {
        // `target = dec_n(...dec_1(target))`, applied innermost-first.
        for dec in decorators {
            let callee = self.eval_expr(&dec.expr, env)?;
            target = self.call_value(callee, Value::Null, vec![target])?;
        }
        Ok(target)
    }

    fn exec_class_decl(&mut self, decl: &Rc<ClassDecl>, exported: bool, env: &Environment) -> EvalResult<()> {
        let mut supers = Vec::with_capacity(decl.supers.len());
        for name in &decl.supers {
            match env.get(name) {
                Some(Value::Class(c)) => supers.push(c),
                _ => return Err(self.throw(ExceptionKind::NameError, format!("undefined super class '{name}'"), Span::new(decl.line, 1, 1))),
            }
        }
        let mut class_value = ClassValue::new(decl.name.as_str());
        class_value.supers = supers.clone();
        for member in &decl.members {
            let func = Function::Script(Rc::new(ScriptFunction::from_decl(&member.function, env.clone())));
            let value = Value::Function(func);
            if member.is_static {
                class_value.static_methods.insert(Rc::from(member.name.as_str()), value);
            } else {
                class_value.methods.insert(Rc::from(member.name.as_str()), value);
            }
        }
        let class_rc = Rc::new(RefCell::new(class_value));
        for sup in &supers {
            if sup.borrow().is_interface {
                let method_names: Vec<Rc<str>> = sup.borrow().methods.keys().cloned().collect();
                for method_name in method_names {
                    if !class_rc.borrow().implements(&method_name) {
                        return Err(self.throw(
                            ExceptionKind::TypeError,
                            format!("class '{}' does not implement interface method '{method_name}'", decl.name),
                            Span::new(decl.line, 1, 1),
                        ));
                    }
                }
            }
        }
        let class_value = self.apply_decorators(&decl.decorators, Value::Class(class_rc), env)?;
        env.define(decl.name.clone(), class_value);
        if exported {
            env.mark_exported(decl.name.clone());
        }
        Ok(())
    }

    fn exec_interface_decl(&mut self, decl: &Rc<InterfaceDecl>, exported: bool, env: &Environment) {
        let mut cv = ClassValue::new(decl.name.as_str());
        cv.is_interface = true;
        for m in &decl.method_names {
            cv.methods.insert(Rc::from(m.as_str()), Value::Null);
        }
        env.define(decl.name.clone(), Value::Class(Rc::new(RefCell::new(cv))));
        if exported {
            env.mark_exported(decl.name.clone());
        }
    }

    fn exec_extends_block(&mut self, name: &str, members: &[ClassMember], env: &Environment, line: u32) -> EvalResult<()> {
        let class_val = match env.get(name) {
            Some(Value::Class(c)) => c,
            _ => return Err(self.throw(ExceptionKind::NameError, format!("undefined class '{name}'"), Span::new(line, 1, 1))),
        };
        for member in members {
            let func = Function::Script(Rc::new(ScriptFunction::from_decl(&member.function, env.clone())));
            let value = Value::Function(func);
            let mut cls = class_val.borrow_mut();
            if member.is_static {
                cls.static_methods.insert(Rc::from(member.name.as_str()), value);
            } else {
                cls.methods.insert(Rc::from(member.name.as_str()), value);
            }
        }
        Ok(())
    }

    // ---- imports ----

    fn exec_import(&mut self, kind: &ImportKind, line: u32, env: &Environment) -> EvalResult<()> {
        match kind {
            ImportKind::PackageWildcard { path } => {
                let name = path.join(".");
                for sub in self.packages.names_under(&name) {
                    self.packages.resolve(&sub);
                }
                let pkg = self.packages.resolve(&name).ok_or_else(|| self.import_error(&name, line))?;
                if let Value::Object(map) = &pkg {
                    let entries: Vec<(Rc<str>, Value)> = map.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                    for (k, v) in entries {
                        env.define(k, v);
                    }
                }
                Ok(())
            }
            ImportKind::PackageNames { path, names } => {
                let pkg_name = path.join(".");
                let pkg = self.packages.resolve(&pkg_name).ok_or_else(|| self.import_error(&pkg_name, line))?;
                let Value::Object(map) = &pkg else {
                    return Err(self.throw(ExceptionKind::ImportError, format!("package '{pkg_name}' is not an object"), Span::new(line, 1, 1)));
                };
                for (symbol, alias) in names {
                    let value = map.borrow().get(symbol.as_str()).cloned().ok_or_else(|| {
                        self.throw(
                            ExceptionKind::ImportError,
                            format!("package '{pkg_name}' has no exported symbol '{symbol}'"),
                            Span::new(line, 1, 1),
                        )
                    })?;
                    env.define(alias.clone().unwrap_or_else(|| symbol.clone()), value);
                }
                Ok(())
            }
            ImportKind::PackageWhole { path } => {
                let pkg_name = path.join(".");
                let pkg = self.packages.resolve(&pkg_name).ok_or_else(|| self.import_error(&pkg_name, line))?;
                let local = path.last().cloned().unwrap_or(pkg_name);
                env.define(local, pkg);
                Ok(())
            }
            ImportKind::FileWhole { path, alias } => {
                let mut chain = Vec::new();
                let module = self.load_file(path, line, &mut chain)?;
                let local = alias.clone().unwrap_or_else(|| module_local_name(path));
                env.define(local, module);
                Ok(())
            }
            ImportKind::FileNames { path, names } => {
                let mut chain = Vec::new();
                let module = self.load_file(path, line, &mut chain)?;
                let Value::Object(map) = &module else {
                    return Err(self.throw(ExceptionKind::ImportError, format!("module '{path}' produced no bindings"), Span::new(line, 1, 1)));
                };
                for (symbol, alias) in names {
                    let value = map.borrow().get(symbol.as_str()).cloned().ok_or_else(|| {
                        self.throw(ExceptionKind::ImportError, format!("module '{path}' has no exported symbol '{symbol}'"), Span::new(line, 1, 1))
                    })?;
                    env.define(alias.clone().unwrap_or_else(|| symbol.clone()), value);
                }
                Ok(())
            }
        }
    }

    fn import_error(&self, name: &str, line: u32) -> Flow {
        self.throw(ExceptionKind::ImportError, format!("unknown package '{name}'"), Span::new(line, 1, 1))
    }

    /// Reads, parses, and executes a file import, caching the module
    /// object by canonical path. The cache entry is reserved *before* the
    /// file runs so a cyclic import sees the same (still-filling-in)
    /// object rather than recursing forever.
    fn load_file(&mut self, path: &str, line: u32, chain: &mut Vec<String>) -> EvalResult<Value> {
        let canonical = self
            .file_cache
            .resolve_path(path)
            .map_err(|e| self.throw(ExceptionKind::ImportError, e.to_string(), Span::new(line, 1, 1)))?;
        if let Some(existing) = self.file_cache.lookup(&canonical) {
            return Ok(existing);
        }
        let display_name = canonical.file_name().map_or_else(|| path.to_string(), |n| n.to_string_lossy().into_owned());
        chain.push(display_name);
        let module_object = Value::object(IndexMap::new());
        self.file_cache.reserve(canonical.clone(), module_object.clone());
        let source = std::fs::read_to_string(&canonical)
            .map_err(|e| self.throw(ExceptionKind::ImportError, format!("cannot read '{}': {e}", canonical.display()), Span::new(line, 1, 1)))?;
        let statements = crate::parser::Parser::parse_program(&source).map_err(|errs| {
            let msg = errs.first().map(ToString::to_string).unwrap_or_else(|| "parse error".to_string());
            self.throw(ExceptionKind::ImportError, msg, Span::new(line, 1, 1))
        })?;
        let module_env = Environment::child_of(&self.globals);
        if let Err(flow) = self.exec_block(&statements, &module_env) {
            let mut exc = self.flow_into_exception(flow);
            exc.annotate_import_chain(chain);
            return Err(Flow::Throw(exc));
        }
        if let Value::Object(map) = &module_object {
            let mut map = map.borrow_mut();
            for name in module_env.own_names() {
                if name.as_ref() == "this" {
                    continue;
                }
                let is_exported = module_env.is_exported(&name) || name.chars().next().is_some_and(char::is_uppercase);
                if is_exported {
                    if let Some(v) = module_env.get(&name) {
                        map.insert(name, v);
                    }
                }
            }
        }
        chain.pop();
        Ok(module_object)
    }

    fn throw(&self, kind: ExceptionKind, message: impl Into<String>, span: Span) -> Flow {
        Flow::Throw(Exception::new(kind, message).with_span(span.line, span.column, span.length))
    }

    /// Turns a thrown script value into a structured exception. An
    /// object carrying a `message` field is treated as already-structured
    /// (e.g. a rethrown `catch` binding); everything else is reified from
    /// its display form (`spec.md`'s shape for `throw "oops"`).
    fn reify_exception(&self, value: Value, span: Span) -> Exception {
        if let Value::Object(map) = &value {
            let map = map.borrow();
            if let Some(message_val) = map.get("message") {
                let message = message_val.to_display_string();
                let mut exc = Exception::new(ExceptionKind::UserException, message);
                if let Some(t) = map.get("type") {
                    exc = exc.with_type_name(t.to_display_string());
                }
                let line = map.get("line").map(|v| v.to_number() as u32);
                let column = map.get("column").map(|v| v.to_number() as u32);
                let length = map.get("length").map(|v| v.to_number() as u32);
                return match (line, column, length) {
                    (Some(l), Some(c), Some(len)) => exc.with_span(l, c, len),
                    _ => exc.with_span(span.line, span.column, span.length),
                };
            }
        }
        Exception::new(ExceptionKind::UserException, value.to_display_string()).with_span(span.line, span.column, span.length)
    }
}

fn module_local_name(path: &str) -> String {
    std::path::Path::new(path).file_stem().map_or_else(|| path.to_string(), |s| s.to_string_lossy().into_owned())
}

fn literal_value(value: &LiteralValue) -> Value {
    match value {
        LiteralValue::Null => Value::Null,
        LiteralValue::Boolean(b) => Value::Boolean(*b),
        LiteralValue::Number(n) => Value::Number(*n),
        LiteralValue::String(s) => Value::string(s.clone()),
    }
}

fn truncate(n: f64) -> i64 {
    if n.is_finite() {
        n as i64
    } else {
        0
    }
}

// ---- synthetic Array/String/Promise method suites ----

const ARRAY_METHODS: &[&str] =
    &["len", "push", "pop", "shift", "unshift", "slice", "indexOf", "join", "reverse", "sort", "splice", "map", "filter", "reduce", "find", "some", "every", "includes"];

const STRING_METHODS: &[&str] = &[
    "len", "trim", "trimLeft", "trimRight", "toLowerCase", "toUpperCase", "startsWith", "endsWith", "includes", "indexOf", "lastIndexOf", "split", "substring",
    "slice", "replace", "padStart", "padEnd",
];

fn array_method(arr: &Rc<RefCell<Vec<Value>>>, name: &str, span: Span) -> Option<Value> {
    if !ARRAY_METHODS.contains(&name) {
        return None;
    }
    let arr = arr.clone();
    let method = name.to_string();
    Some(Value::Function(Function::Native(Rc::new(NativeFunction::new(format!("Array.{method}"), 0, None, move |interp, _this, args| {
        run_array_method(interp, &arr, &method, args, span)
    })))))
}

fn run_array_method(interp: &mut Interpreter, arr: &Rc<RefCell<Vec<Value>>>, name: &str, args: Vec<Value>, span: Span) -> EvalResult<Value> {
    match name {
        "len" => Ok(Value::Number(arr.borrow().len() as f64)),
        "push" => {
            arr.borrow_mut().extend(args);
            Ok(Value::Number(arr.borrow().len() as f64))
        }
        "pop" => Ok(arr.borrow_mut().pop().unwrap_or(Value::Null)),
        "shift" => {
            let mut items = arr.borrow_mut();
            if items.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(items.remove(0))
            }
        }
        "unshift" => {
            let mut items = arr.borrow_mut();
            for (i, v) in args.into_iter().enumerate() {
                items.insert(i, v);
            }
            Ok(Value::Number(items.len() as f64))
        }
        "slice" => {
            let items = arr.borrow();
            let (start, end) = slice_bounds(items.len(), args.first(), args.get(1));
            Ok(Value::array(items[start..end].to_vec()))
        }
        "indexOf" => {
            let needle = args.first().cloned().unwrap_or(Value::Null);
            let items = arr.borrow();
            Ok(Value::Number(items.iter().position(|v| v.strict_eq(&needle)).map_or(-1.0, |i| i as f64)))
        }
        "join" => {
            let sep = args.first().map_or(",".to_string(), |v| v.to_display_string());
            let items = arr.borrow();
            let parts: Vec<String> = items.iter().map(Value::to_display_string).collect();
            Ok(Value::string(parts.join(&sep)))
        }
        "reverse" => {
            arr.borrow_mut().reverse();
            Ok(Value::Array(arr.clone()))
        }
        "sort" => {
            let comparator = args.first().cloned();
            let mut items = arr.borrow().clone();
            if let Some(Value::Function(f)) = comparator {
                let mut error = None;
                items.sort_by(|a, b| {
                    if error.is_some() {
                        return Ordering::Equal;
                    }
                    match interp.call_value(Value::Function(f.clone()), Value::Null, vec![a.clone(), b.clone()]) {
                        Ok(v) => v.to_number().partial_cmp(&0.0).unwrap_or(Ordering::Equal),
                        Err(flow) => {
                            error = Some(flow);
                            Ordering::Equal
                        }
                    }
                });
                if let Some(flow) = error {
                    return Err(flow);
                }
            } else {
                items.sort_by(|a, b| a.partial_compare(b).unwrap_or(Ordering::Equal));
            }
            *arr.borrow_mut() = items;
            Ok(Value::Array(arr.clone()))
        }
        "splice" => {
            let mut items = arr.borrow_mut();
            let len = items.len();
            let start = args.first().map_or(0, |v| clamp_index(v.to_number(), len));
            let delete_count = args.get(1).map_or(len - start, |v| (v.to_number().max(0.0) as usize).min(len - start));
            let removed: Vec<Value> = items.splice(start..start + delete_count, args.iter().skip(2).cloned()).collect();
            Ok(Value::array(removed))
        }
        "map" => {
            let f = args.first().cloned();
            let items = arr.borrow().clone();
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                out.push(call_callback(interp, &f, vec![item, Value::Number(i as f64)], span)?);
            }
            Ok(Value::array(out))
        }
        "filter" => {
            let f = args.first().cloned();
            let items = arr.borrow().clone();
            let mut out = Vec::new();
            for (i, item) in items.into_iter().enumerate() {
                if call_callback(interp, &f, vec![item.clone(), Value::Number(i as f64)], span)?.is_truthy() {
                    out.push(item);
                }
            }
            Ok(Value::array(out))
        }
        "reduce" => {
            let f = args.first().cloned();
            let items = arr.borrow().clone();
            let mut iter = items.into_iter().enumerate();
            let mut acc = if let Some(init) = args.get(1).cloned() {
                init
            } else {
                match iter.next() {
                    Some((_, first)) => first,
                    None => return Err(interp.throw(ExceptionKind::TypeError, "reduce of empty array with no initial value", span)),
                }
            };
            for (i, item) in iter {
                acc = call_callback(interp, &f, vec![acc, item, Value::Number(i as f64)], span)?;
            }
            Ok(acc)
        }
        "find" => {
            let f = args.first().cloned();
            let items = arr.borrow().clone();
            for (i, item) in items.into_iter().enumerate() {
                if call_callback(interp, &f, vec![item.clone(), Value::Number(i as f64)], span)?.is_truthy() {
                    return Ok(item);
                }
            }
            Ok(Value::Null)
        }
        "some" => {
            let f = args.first().cloned();
            let items = arr.borrow().clone();
            for (i, item) in items.into_iter().enumerate() {
                if call_callback(interp, &f, vec![item, Value::Number(i as f64)], span)?.is_truthy() {
                    return Ok(Value::Boolean(true));
                }
            }
            Ok(Value::Boolean(false))
        }
        "every" => {
            let f = args.first().cloned();
            let items = arr.borrow().clone();
            for (i, item) in items.into_iter().enumerate() {
                if !call_callback(interp, &f, vec![item, Value::Number(i as f64)], span)?.is_truthy() {
                    return Ok(Value::Boolean(false));
                }
            }
            Ok(Value::Boolean(true))
        }
        "includes" => {
            let needle = args.first().cloned().unwrap_or(Value::Null);
            Ok(Value::Boolean(arr.borrow().iter().any(|v| v.strict_eq(&needle))))
        }
        _ => unreachable!("caller filters by ARRAY_METHODS"),
    }
}

fn call_callback(interp: &mut Interpreter, f: &Option<Value>, args: Vec<Value>, span: Span) -> EvalResult<Value> {
    match f {
        Some(Value::Function(func)) => interp.invoke_function(func.clone(), Value::Null, args, span),
        _ => Err(interp.throw(ExceptionKind::TypeError, "expected a function argument", span)),
    }
}

fn clamp_index(n: f64, len: usize) -> usize {
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        (n as usize).min(len)
    }
}

fn slice_bounds(len: usize, start: Option<&Value>, end: Option<&Value>) -> (usize, usize) {
    let start = start.map_or(0, |v| clamp_index(v.to_number(), len));
    let end = end.map_or(len, |v| clamp_index(v.to_number(), len));
    if start > end {
        (start, start)
    } else {
        (start, end)
    }
}

fn string_method(s: &Rc<str>, name: &str) -> Option<Value> {
    if !STRING_METHODS.contains(&name) {
        return None;
    }
    let s = s.clone();
    let method = name.to_string();
    Some(Value::Function(Function::Native(Rc::new(NativeFunction::new(format!("String.{method}"), 0, None, move |_interp, _this, args| {
        run_string_method(&s, &method, &args)
    })))))
}

fn run_string_method(s: &Rc<str>, name: &str, args: &[Value]) -> EvalResult<Value> {
    let bytes = s.as_bytes();
    Ok(match name {
        "len" => Value::Number(bytes.len() as f64),
        "trim" => Value::string(s.trim().to_string()),
        "trimLeft" => Value::string(s.trim_start().to_string()),
        "trimRight" => Value::string(s.trim_end().to_string()),
        "toLowerCase" => Value::string(s.to_lowercase()),
        "toUpperCase" => Value::string(s.to_uppercase()),
        "startsWith" => Value::Boolean(s.starts_with(arg_str(args, 0).as_str())),
        "endsWith" => Value::Boolean(s.ends_with(arg_str(args, 0).as_str())),
        "includes" => Value::Boolean(s.contains(arg_str(args, 0).as_str())),
        "indexOf" => Value::Number(s.find(arg_str(args, 0).as_str()).map_or(-1.0, |i| i as f64)),
        "lastIndexOf" => Value::Number(s.rfind(arg_str(args, 0).as_str()).map_or(-1.0, |i| i as f64)),
        "split" => {
            let sep = arg_str(args, 0);
            let parts: Vec<Value> = if sep.is_empty() {
                s.chars().map(|c| Value::string(c.to_string())).collect()
            } else {
                s.split(sep.as_str()).map(Value::string).collect()
            };
            Value::array(parts)
        }
        "substring" | "slice" => {
            let (start, end) = slice_bounds(bytes.len(), args.first(), args.get(1));
            Value::string(String::from_utf8_lossy(&bytes[start..end]).into_owned())
        }
        "replace" => {
            let from = arg_str(args, 0);
            let to = arg_str(args, 1);
            Value::string(s.replacen(from.as_str(), &to, 1))
        }
        "padStart" => pad(s, args, true),
        "padEnd" => pad(s, args, false),
        _ => unreachable!("caller filters by STRING_METHODS"),
    })
}

fn arg_str(args: &[Value], i: usize) -> String {
    args.get(i).map_or_else(String::new, Value::to_display_string)
}

fn pad(s: &str, args: &[Value], start: bool) -> Value {
    let target_len = args.first().map_or(0, |v| v.to_number().max(0.0) as usize);
    let fill = args.get(1).map_or(" ".to_string(), Value::to_display_string);
    if fill.is_empty() || s.len() >= target_len {
        return Value::string(s.to_string());
    }
    let mut padding = String::new();
    while padding.len() < target_len - s.len() {
        padding.push_str(&fill);
    }
    padding.truncate(target_len - s.len());
    Value::string(if start { format!("{padding}{s}") } else { format!("{s}{padding}") })
}

fn promise_method(event_loop: &Rc<EventLoop>, promise: &Rc<crate::promise::PromiseValue>, name: &str) -> Value {
    let event_loop = event_loop.clone();
    let promise = promise.clone();
    let is_then = name == "then";
    Some(Value::Function(Function::Native(Rc::new(NativeFunction::new(name, 1, Some(1), move |_interp, _this, mut args| {
        let callback = args.remove(0);
        let downstream = event_loop.new_promise();
        if is_then {
            event_loop.register_then(&promise, callback, downstream.clone());
        } else {
            event_loop.register_catch(&promise, callback, downstream.clone());
        }
        Ok(Value::Promise(downstream))
    })))))
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::FileImportCache;

    fn fresh() -> Interpreter {
        Interpreter::new(Rc::new(PackageRegistry::new()), Rc::new(FileImportCache::new()), Rc::new(EventLoop::new()))
    }

    fn run(source: &str) -> Value {
        let statements = crate::parser::Parser::parse_program(source).expect("parse");
        let mut interp = fresh();
        let last_expr_env = interp.globals.clone();
        let mut result = Value::Null;
        for stmt in &statements {
            if let Stmt::Expression { expr, .. } = stmt {
                result = interp.eval_expr(expr, &last_expr_env).expect("eval");
            } else {
                interp.exec_stmt(stmt, &last_expr_env).expect("exec");
            }
        }
        result
    }

    #[test]
    fn arithmetic_coercion_concatenates_left_to_right() {
        let v = run(r#"1 + "2" + 3;"#);
        assert_eq!(v.to_display_string(), "123");
    }

    #[test]
    fn destructuring_with_defaults_and_rest() {
        run("let [a, b = 10, ...rest] = [1];");
        // re-run through a persistent interpreter to inspect bindings directly
        let statements = crate::parser::Parser::parse_program("let [a, b = 10, ...rest] = [1];").unwrap();
        let mut interp = fresh();
        let env = interp.globals.clone();
        interp.execute(&statements).unwrap();
        assert!(matches!(env.get("a"), Some(Value::Number(n)) if n == 1.0));
        assert!(matches!(env.get("b"), Some(Value::Number(n)) if n == 10.0));
        assert!(matches!(env.get("rest"), Some(Value::Array(a)) if a.borrow().is_empty()));
    }

    #[test]
    fn interface_match_succeeds_when_method_present() {
        let source = r"
            interface Shape { function area(); }
            class Circle { function area() { return 3.14; } }
            let c = new Circle();
            c =~= Shape;
        ";
        let v = run(source);
        assert!(matches!(v, Value::Boolean(true)));
    }

    #[test]
    fn exception_stack_grows_with_call_depth() {
        let source = r#"
            function g() { throw "oops"; }
            function f() { g(); }
            let result = null;
            try { f(); } catch (e) { result = e; }
            result;
        "#;
        let v = run(source);
        let Value::Object(map) = v else { panic!("expected exception object") };
        let map = map.borrow();
        assert_eq!(map.get("message").unwrap().to_display_string(), "oops");
        let Some(Value::Array(stack)) = map.get("stack") else { panic!("expected stack array") };
        assert!(stack.borrow().len() >= 2);
    }

    #[test]
    fn array_method_suite_mutates_in_place() {
        let source = "let a = [1, 2]; a.push(3); a.len();";
        assert!(matches!(run(source), Value::Number(n) if n == 3.0));
    }

    #[test]
    fn switch_falls_through_until_break() {
        let source = r"
            let out = 0;
            switch (1) {
                case 1: out = out + 1;
                case 2: out = out + 10; break;
                case 3: out = out + 100;
            }
            out;
        ";
        assert!(matches!(run(source), Value::Number(n) if n == 11.0));
    }

    #[test]
    fn match_statement_does_not_fall_through() {
        let source = r"
            let out = 0;
            match (2) {
                1 -> { out = out + 1; }
                2 -> { out = out + 10; }
                3 -> { out = out + 100; }
            }
            out;
        ";
        assert!(matches!(run(source), Value::Number(n) if n == 10.0));
    }
}
