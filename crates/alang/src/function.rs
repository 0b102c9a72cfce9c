//! The two function shapes a `Value::Function` can hold: a script function
//! (AST body plus captured closure) and a builtin (native Rust callable).

use std::fmt;
use std::rc::Rc;

use crate::ast::{FunctionDecl, Param};
use crate::environment::Environment;
use crate::interpreter::{EvalResult, Interpreter};
use crate::value::Value;

/// A function defined in script source, closing over the environment in
/// which it was created (`spec.md` §3.1, §9 "Environment chain").
pub struct ScriptFunction {
    pub name: Option<String>,
    pub params: Vec<Param>,
    pub rest_index: Option<usize>,
    pub body: Rc<Vec<crate::ast::Stmt>>,
    pub closure: Environment,
    pub is_async: bool,
    pub is_generator: bool,
}

impl ScriptFunction {
    pub fn from_decl(decl: &FunctionDecl, closure: Environment) -> Self {
        Self {
            name: decl.name.clone(),
            params: decl.params.clone(),
            rest_index: decl.rest_index,
            body: decl.body.clone(),
            closure,
            is_async: decl.is_async,
            is_generator: decl.is_generator,
        }
    }

    /// Minimum and maximum argument counts accepted, per the parameter
    /// rules in `spec.md` §4.2 (a trailing rest parameter makes the
    /// function unbounded above).
    pub fn arity(&self) -> (usize, Option<usize>) {
        let non_rest = match self.rest_index {
            Some(idx) => idx,
            None => self.params.len(),
        };
        let min = self.params[..non_rest]
            .iter()
            .take_while(|p| !matches!(&p.pattern, crate::ast::Pattern::Identifier { default: Some(_), .. }))
            .count();
        let max = if self.rest_index.is_some() { None } else { Some(self.params.len()) };
        (min, max)
    }
}

type NativeFn = dyn Fn(&mut Interpreter, Value, Vec<Value>) -> EvalResult<Value>;

/// A function implemented in Rust and exposed to scripts through
/// `register_function`/`register_class` (`spec.md` §4.9). `this` is `Null`
/// for free functions and the bound receiver for class methods.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub min_arity: usize,
    pub max_arity: Option<usize>,
    pub is_async: bool,
    call: Rc<NativeFn>,
}

impl NativeFunction {
    pub fn new(
        name: impl Into<String>,
        min_arity: usize,
        max_arity: Option<usize>,
        call: impl Fn(&mut Interpreter, Value, Vec<Value>) -> EvalResult<Value> + 'static,
    ) -> Self {
        Self { name: name.into(), min_arity, max_arity, is_async: false, call: Rc::new(call) }
    }

    pub fn invoke(&self, interpreter: &mut Interpreter, this: Value, args: Vec<Value>) -> EvalResult<Value> {
        (self.call)(interpreter, this, args)
    }
}

/// The `Value::Function` payload: either shape, plus a `this` binding
/// captured when a method is read off an instance
/// (`spec.md` §4.4 "Method binding on property read").
///
/// `Bound` wraps a script or native function with the receiver it was
/// read off; it is created only at property-read time (never at
/// definition time), so mutating a class's method table at runtime
/// (`extends` augmentation, `spec.md` §4.4) is visible to instances that
/// already exist.
#[derive(Clone)]
pub enum Function {
    Script(Rc<ScriptFunction>),
    Native(Rc<NativeFunction>),
    Bound(Box<Function>, Value),
}

impl Function {
    pub fn name(&self) -> Option<&str> {
        match self {
            Function::Script(f) => f.name.as_deref(),
            Function::Native(f) => Some(&f.name),
            Function::Bound(inner, _) => inner.name(),
        }
    }

    pub fn is_async(&self) -> bool {
        match self {
            Function::Script(f) => f.is_async,
            Function::Native(f) => f.is_async,
            Function::Bound(inner, _) => inner.is_async(),
        }
    }

    pub fn is_generator(&self) -> bool {
        match self {
            Function::Script(f) => f.is_generator,
            Function::Native(_) => false,
            Function::Bound(inner, _) => inner.is_generator(),
        }
    }

    pub fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Function::Script(f) => f.arity(),
            Function::Native(f) => (f.min_arity, f.max_arity),
            Function::Bound(inner, _) => inner.arity(),
        }
    }

    /// Binds `this` onto a callable read off an instance.
    pub fn bind(self, this: Value) -> Function {
        Function::Bound(Box::new(self), this)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({})", self.name().unwrap_or("<anonymous>"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Pattern;

    fn param(name: &str, default: Option<crate::ast::Expr>) -> Param {
        Param { pattern: Pattern::Identifier { name: name.to_string(), default } }
    }

    #[test]
    fn arity_counts_required_params_before_first_default() {
        let closure = Environment::root();
        let func = ScriptFunction {
            name: None,
            params: vec![param("a", None), param("b", None)],
            rest_index: None,
            body: Rc::new(Vec::new()),
            closure,
            is_async: false,
            is_generator: false,
        };
        assert_eq!(func.arity(), (2, Some(2)));
    }

    #[test]
    fn rest_parameter_makes_arity_unbounded() {
        let closure = Environment::root();
        let func = ScriptFunction {
            name: None,
            params: vec![param("a", None), param("rest", None)],
            rest_index: Some(1),
            body: Rc::new(Vec::new()),
            closure,
            is_async: false,
            is_generator: false,
        };
        assert_eq!(func.arity(), (1, None));
    }
}
