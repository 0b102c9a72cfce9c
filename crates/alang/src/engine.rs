//! The host-facing embedding surface (`spec.md` §4.9).
//!
//! `Engine` owns everything a host needs to run ALang scripts: the
//! interpreter, the package registry, the file-import cache, and the event
//! loop. It is the single entry point a host constructs, grounded in
//! `ouros::Runner`/`ReplSession`'s shape of a struct that owns parsed state
//! and exposes `run`/`call`-style methods (`run.rs`, `repl.rs`), generalized
//! here to a tree-walking interpreter that needs no bytecode snapshot.

use std::path::PathBuf;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::class::ClassValue;
use crate::exception::{Exception, ExceptionKind};
use crate::function::{Function, NativeFunction};
use crate::interpreter::{EvalResult, Flow, Interpreter};
use crate::module::{FileImportCache, PackageRegistry};
use crate::parser::Parser;
use crate::promise::EventLoop;
use crate::value::Value;

/// Configuration collected at `Engine` construction time, following the
/// teacher's `ResourceLimits` pattern (`resource.rs`) of gathering
/// otherwise-scattered knobs into one struct a host fills in up front.
pub struct EngineConfig {
    /// Base directory file imports resolve relative paths against.
    pub import_base_dir: PathBuf,
    /// Cosmetic-only hook for a host's error-printing collaborator
    /// (`spec.md` §4.9 `set_error_color_map`). The core never reads this;
    /// it is stored so a host can retrieve it alongside the engine.
    pub error_color_map: IndexMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { import_base_dir: PathBuf::from("."), error_color_map: IndexMap::new() }
    }
}

/// The narrow host/script value bridge (`spec.md` §4.9: "intentionally
/// narrow... no script references leak except via the opaque handle").
///
/// `Opaque` is an index into `Engine`'s own table of values that don't fit
/// the narrow primitive set (arrays, objects, instances, functions,
/// promises, classes). A host can pass an `Opaque` back into
/// `call_function` unchanged but must not interpret its contents.
#[derive(Debug, Clone)]
pub enum HostValue {
    Null,
    Number(f64),
    String(String),
    Bool(bool),
    Opaque(usize),
}

/// A host-provided callable, used for `register_function`,
/// class-constructor, and class-method registration.
pub type HostFn = Rc<dyn Fn(Vec<HostValue>) -> Result<HostValue, String>>;

pub struct Engine {
    interpreter: Interpreter,
    file_cache: Rc<FileImportCache>,
    packages: Rc<PackageRegistry>,
    config: EngineConfig,
    opaque_slots: Vec<Value>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let packages = Rc::new(PackageRegistry::new());
        let file_cache = Rc::new(FileImportCache::new());
        file_cache.set_base_dir(config.import_base_dir.clone());
        let event_loop = Rc::new(EventLoop::new());
        let interpreter = Interpreter::new(packages.clone(), file_cache.clone(), event_loop);
        Self { interpreter, file_cache, packages, config, opaque_slots: Vec::new() }
    }

    /// Installs standard packages registered ahead of time and any other
    /// one-time setup. Built-in package *contents* are a host concern
    /// (`spec.md` §1 non-goal); this only finalizes engine-owned state, so
    /// hosts that register packages via `packages()` before calling this
    /// see them exactly as registered.
    pub fn initialize(&mut self) {
        self.file_cache.set_base_dir(self.config.import_base_dir.clone());
    }

    pub fn set_import_base_dir(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        self.config.import_base_dir = dir.clone();
        self.file_cache.set_base_dir(dir);
    }

    pub fn set_error_color_map(&mut self, map: IndexMap<String, String>) {
        self.config.error_color_map = map;
    }

    pub fn error_color_map(&self) -> &IndexMap<String, String> {
        &self.config.error_color_map
    }

    /// Direct access to the package registry, so a host can
    /// `register_eager`/`register_lazy` its own collaborator packages
    /// before or after `initialize()`.
    pub fn packages(&self) -> &Rc<PackageRegistry> {
        &self.packages
    }

    /// Parses and runs `code` as top-level statements against the engine's
    /// persistent global environment. Returns the last bare expression
    /// statement's value, or `Null` if the program ended on a non-expression
    /// statement.
    pub fn execute(&mut self, code: &str) -> Result<Value, Exception> {
        let statements = Parser::parse_program(code).map_err(|errors| {
            let first = errors.into_iter().next().expect("parse_program reports at least one error on Err");
            Exception::new(ExceptionKind::Error, first.message)
                .with_span(first.line, first.column, 1)
                .with_type_name("ParseError")
        })?;
        let mut last = Value::Null;
        let env = self.interpreter.globals.clone();
        for stmt in &statements {
            if let crate::ast::Stmt::Expression { expr, .. } = stmt {
                last = self.interpreter.eval_expr(expr, &env).map_err(|flow| self.flow_to_exception(flow))?;
            } else {
                self.interpreter.exec_stmt(stmt, &env).map_err(|flow| self.flow_to_exception(flow))?;
            }
        }
        Ok(last)
    }

    fn flow_to_exception(&mut self, flow: Flow) -> Exception {
        self.interpreter.flow_into_exception(flow)
    }

    /// Defines a global bound to a host function (`spec.md` §4.9
    /// `register_function`).
    pub fn register_function(&mut self, name: impl Into<String>, min_arity: usize, max_arity: Option<usize>, f: HostFn) {
        let name = name.into();
        let native = NativeFunction::new(name.clone(), min_arity, max_arity, move |_interp, _this, args| {
            Self::invoke_host_fn(&f, args)
        });
        self.interpreter.globals.define(name, Value::Function(Function::Native(Rc::new(native))));
    }

    /// Defines a class whose constructor and methods are host callables
    /// (`spec.md` §4.9 `register_class`). `super_names` are resolved against
    /// already-registered globals at registration time.
    pub fn register_class(
        &mut self,
        name: impl Into<String>,
        ctor: HostFn,
        methods: Vec<(String, HostFn)>,
        super_names: &[&str],
    ) {
        let name = name.into();
        let mut class = ClassValue::new(name.clone());
        class.is_native = true;
        for sup_name in super_names {
            if let Some(Value::Class(sup)) = self.interpreter.globals.get(sup_name) {
                class.supers.push(sup);
            }
        }
        class.methods.insert(
            Rc::from("constructor"),
            Value::Function(Function::Native(Rc::new(NativeFunction::new("constructor", 0, None, move |_interp, _this, args| {
                Self::invoke_host_fn(&ctor, args)
            })))),
        );
        for (method_name, f) in methods {
            let native = NativeFunction::new(method_name.clone(), 0, None, move |_interp, _this, args| Self::invoke_host_fn(&f, args));
            class.methods.insert(Rc::from(method_name), Value::Function(Function::Native(Rc::new(native))));
        }
        let class = std::rc::Rc::new(std::cell::RefCell::new(class));
        self.interpreter.globals.define(name, Value::Class(class));
    }

    /// Defines a structural interface (`spec.md` §4.9 `register_interface`):
    /// a class descriptor whose methods carry `Value::Null` stand-in
    /// bodies, matched against via `=~=` (`class.rs`'s `implements`/
    /// `has_method` split).
    pub fn register_interface(&mut self, name: impl Into<String>, method_names: &[&str]) {
        let name = name.into();
        let mut class = ClassValue::new(name.clone());
        class.is_interface = true;
        for m in method_names {
            class.methods.insert(Rc::from(*m), Value::Null);
        }
        let class = std::rc::Rc::new(std::cell::RefCell::new(class));
        self.interpreter.globals.define(name, Value::Class(class));
    }

    /// Publishes a host value at global scope (`spec.md` §4.9 `set_global`).
    pub fn set_global(&mut self, name: impl Into<String>, value: HostValue) {
        let value = self.host_to_value(value);
        self.interpreter.globals.define(name.into(), value);
    }

    /// Invokes a script function by name, marshaling arguments and the
    /// return value through the narrow `HostValue` bridge (`spec.md` §4.9
    /// `call_function`).
    pub fn call_function(&mut self, name: &str, args: Vec<HostValue>) -> Result<HostValue, Exception> {
        let callee = self
            .interpreter
            .globals
            .get(name)
            .ok_or_else(|| Exception::new(ExceptionKind::NameError, format!("undefined function '{name}'")))?;
        let args: Vec<Value> = args.into_iter().map(|a| self.host_to_value(a)).collect();
        let result = self
            .interpreter
            .call_value(callee, Value::Null, args)
            .map_err(|flow| self.flow_to_exception(flow))?;
        Ok(self.value_to_host(result))
    }

    /// Drains the task queue (`spec.md` §4.9 `run_event_loop_until_idle`,
    /// §5 ordering guarantees).
    pub fn run_event_loop_until_idle(&mut self) {
        let event_loop = self.interpreter.event_loop();
        event_loop.run_until_idle(&mut self.interpreter);
    }

    fn invoke_host_fn(f: &HostFn, args: Vec<Value>) -> EvalResult<Value> {
        // Host functions never see reference-type values directly; any
        // argument outside the narrow bridge is reported as a call error
        // rather than silently dropped.
        let mut bridged = Vec::with_capacity(args.len());
        for arg in args {
            bridged.push(match &arg {
                Value::Null => HostValue::Null,
                Value::Number(n) => HostValue::Number(*n),
                Value::String(s) => HostValue::String(s.to_string()),
                Value::Boolean(b) => HostValue::Bool(*b),
                _ => return Err(Flow::Throw(Exception::new(ExceptionKind::TypeError, "registered function received a non-primitive argument"))),
            });
        }
        match f(bridged) {
            Ok(HostValue::Null) => Ok(Value::Null),
            Ok(HostValue::Number(n)) => Ok(Value::Number(n)),
            Ok(HostValue::String(s)) => Ok(Value::string(s)),
            Ok(HostValue::Bool(b)) => Ok(Value::Boolean(b)),
            Ok(HostValue::Opaque(_)) => Err(Flow::Throw(Exception::new(ExceptionKind::TypeError, "registered function cannot return an opaque handle"))),
            Err(message) => Err(Flow::Throw(Exception::new(ExceptionKind::Error, message))),
        }
    }

    fn host_to_value(&mut self, value: HostValue) -> Value {
        match value {
            HostValue::Null => Value::Null,
            HostValue::Number(n) => Value::Number(n),
            HostValue::String(s) => Value::string(s),
            HostValue::Bool(b) => Value::Boolean(b),
            HostValue::Opaque(slot) => self.opaque_slots.get(slot).cloned().unwrap_or(Value::Null),
        }
    }

    fn value_to_host(&mut self, value: Value) -> HostValue {
        match value {
            Value::Null => HostValue::Null,
            Value::Number(n) => HostValue::Number(n),
            Value::String(s) => HostValue::String(s.to_string()),
            Value::Boolean(b) => HostValue::Bool(b),
            other => {
                let slot = self.opaque_slots.len();
                self.opaque_slots.push(other);
                HostValue::Opaque(slot)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_function_is_callable_from_script() {
        let mut engine = Engine::new(EngineConfig::default());
        engine.initialize();
        engine.register_function(
            "double",
            1,
            Some(1),
            Rc::new(|args| match args.first() {
                Some(HostValue::Number(n)) => Ok(HostValue::Number(n * 2.0)),
                _ => Err("expected a number".to_string()),
            }),
        );
        let result = engine.execute("double(21);").unwrap();
        assert!(matches!(result, Value::Number(n) if n == 42.0));
    }

    #[test]
    fn set_global_is_visible_to_script() {
        let mut engine = Engine::new(EngineConfig::default());
        engine.set_global("GREETING", HostValue::String("hi".to_string()));
        let result = engine.execute("GREETING;").unwrap();
        assert!(matches!(result, Value::String(s) if &*s == "hi"));
    }

    #[test]
    fn call_function_round_trips_primitive_arguments() {
        let mut engine = Engine::new(EngineConfig::default());
        engine.execute("function add(a, b) { return a + b; }").unwrap();
        let result = engine.call_function("add", vec![HostValue::Number(1.0), HostValue::Number(2.0)]).unwrap();
        assert!(matches!(result, HostValue::Number(n) if n == 3.0));
    }

    #[test]
    fn register_interface_matches_conforming_instance() {
        let mut engine = Engine::new(EngineConfig::default());
        engine.register_interface("Shape", &["area"]);
        engine
            .execute(
                r"
                class Circle { function area() { return 3.14; } }
                let c = new Circle();
                c =~= Shape;
            ",
            )
            .unwrap();
    }
}
