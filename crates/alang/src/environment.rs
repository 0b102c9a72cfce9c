//! The lexically nested name environment a closure captures
//! (`spec.md` §3.3 equivalent: frame chain, declared-type map, export set).

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::value::Value;

/// A single environment frame: a name table plus a link to the enclosing
/// frame. Frames are reference-counted and mutated in place through
/// `RefCell`, so a closure that captures a frame observes later mutations
/// made through any other binding to the same frame.
pub struct Frame {
    values: RefCell<IndexMap<Rc<str>, Value>>,
    declared_types: RefCell<IndexMap<Rc<str>, Rc<str>>>,
    exported: RefCell<Vec<Rc<str>>>,
    parent: Option<Environment>,
}

/// A handle to an environment frame. Cloning an `Environment` clones the
/// `Rc`, not the frame: two `Environment`s from the same `clone()` call
/// observe each other's `define`/`assign` calls.
#[derive(Clone)]
pub struct Environment(Rc<Frame>);

impl Environment {
    pub fn root() -> Self {
        Self(Rc::new(Frame {
            values: RefCell::new(IndexMap::new()),
            declared_types: RefCell::new(IndexMap::new()),
            exported: RefCell::new(Vec::new()),
            parent: None,
        }))
    }

    pub fn child_of(parent: &Environment) -> Self {
        Self(Rc::new(Frame {
            values: RefCell::new(IndexMap::new()),
            declared_types: RefCell::new(IndexMap::new()),
            exported: RefCell::new(Vec::new()),
            parent: Some(parent.clone()),
        }))
    }

    /// Defines `name` in the current frame, shadowing any binding of the
    /// same name in an enclosing frame.
    pub fn define(&self, name: impl Into<Rc<str>>, value: Value) {
        self.0.values.borrow_mut().insert(name.into(), value);
    }

    pub fn define_typed(&self, name: impl Into<Rc<str>>, declared_type: impl Into<Rc<str>>, value: Value) {
        let name = name.into();
        self.0.declared_types.borrow_mut().insert(name.clone(), declared_type.into());
        self.0.values.borrow_mut().insert(name, value);
    }

    pub fn mark_exported(&self, name: impl Into<Rc<str>>) {
        self.0.exported.borrow_mut().push(name.into());
    }

    pub fn is_exported(&self, name: &str) -> bool {
        self.0.exported.borrow().iter().any(|n| n.as_ref() == name)
    }

    /// Walks the chain looking for `name`, returning its current value.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.0.values.borrow().get(name) {
            return Some(v.clone());
        }
        self.0.parent.as_ref().and_then(|p| p.get(name))
    }

    /// Walks to the frame where `name` is already defined and overwrites
    /// it there. Returns `false` if `name` is not defined anywhere in the
    /// chain (the caller raises a `NameError`).
    pub fn assign(&self, name: &str, value: Value) -> bool {
        if self.0.values.borrow().contains_key(name) {
            self.0.values.borrow_mut().insert(Rc::from(name), value);
            return true;
        }
        match &self.0.parent {
            Some(p) => p.assign(name, value),
            None => false,
        }
    }

    pub fn contains_own(&self, name: &str) -> bool {
        self.0.values.borrow().contains_key(name)
    }

    /// Names in this frame only, in insertion order. Used by the module
    /// loader to build a file's export surface.
    pub fn own_names(&self) -> Vec<Rc<str>> {
        self.0.values.borrow().keys().cloned().collect()
    }

    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_frame_sees_parent_bindings() {
        let root = Environment::root();
        root.define("x", Value::Number(1.0));
        let child = Environment::child_of(&root);
        assert!(matches!(child.get("x"), Some(Value::Number(n)) if n == 1.0));
    }

    #[test]
    fn assign_writes_through_to_defining_frame() {
        let root = Environment::root();
        root.define("x", Value::Number(1.0));
        let child = Environment::child_of(&root);
        assert!(child.assign("x", Value::Number(2.0)));
        assert!(matches!(root.get("x"), Some(Value::Number(n)) if n == 2.0));
    }

    #[test]
    fn assign_to_undefined_name_fails() {
        let root = Environment::root();
        assert!(!root.assign("missing", Value::Null));
    }

    #[test]
    fn shared_frame_clones_observe_each_others_mutations() {
        let root = Environment::root();
        let alias = root.clone();
        root.define("x", Value::Number(1.0));
        assert!(alias.contains_own("x"));
    }
}
