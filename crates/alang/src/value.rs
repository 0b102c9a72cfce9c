//! The runtime value representation: a tagged union of copy-by-value
//! primitives and `Rc`-shared reference types (`spec.md` §3.1, §3.2, §4.3).

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::class::{ClassValue, InstanceValue};
use crate::exception::Exception;
use crate::function::Function;
use crate::promise::PromiseValue;

/// Every value a script expression can produce. Primitives (`Null`,
/// `Number`, `Boolean`) are copied on assignment; everything else is an
/// `Rc` handle shared by reference, so mutating an array or object through
/// one binding is visible through any other binding to the same value.
#[derive(Clone)]
pub enum Value {
    Null,
    Number(f64),
    String(Rc<str>),
    Boolean(bool),
    Function(Function),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<IndexMap<Rc<str>, Value>>>),
    Class(Rc<RefCell<ClassValue>>),
    Instance(Rc<RefCell<InstanceValue>>),
    Promise(Rc<PromiseValue>),
}

impl Value {
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(entries: IndexMap<Rc<str>, Value>) -> Self {
        Value::Object(Rc::new(RefCell::new(entries)))
    }

    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    /// Reifies a caught/uncaught exception into the plain object shape a
    /// `catch` binding sees: `{message, type, line, column, length, stack}`
    /// (`spec.md` §7 "Catch binding shape").
    pub fn exception_to_value(exc: Exception) -> Value {
        let mut fields = IndexMap::new();
        fields.insert(Rc::from("message"), Value::string(exc.message));
        fields.insert(Rc::from("type"), Value::string(exc.type_name));
        fields.insert(Rc::from("line"), exc.line.map_or(Value::Null, |l| Value::Number(l as f64)));
        fields.insert(Rc::from("column"), exc.column.map_or(Value::Null, |c| Value::Number(c as f64)));
        fields.insert(Rc::from("length"), exc.length.map_or(Value::Null, |l| Value::Number(l as f64)));
        let stack = exc.stack.into_iter().map(|f| Value::string(f.to_string())).collect();
        fields.insert(Rc::from("stack"), Value::array(stack));
        Value::object(fields)
    }

    /// Truthiness for `if`/`while`/`&&`/`||`: only `null`, `false`, `0`, and
    /// `""` are falsy; every reference type is truthy even when empty
    /// (`spec.md` §4.3 "Truthiness").
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0, // NaN != 0.0 is true, so NaN is truthy; only exact 0 is falsy.
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// `ToNumber` coercion: `null` -> 0, booleans -> 0/1, strings parse as
    /// a double or yield `NaN`, references coerce through their string form
    /// (`spec.md` §4.3 "Numeric coercion").
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Number(n) => *n,
            Value::Boolean(b) => if *b { 1.0 } else { 0.0 },
            Value::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
            other => other.to_display_string().trim().parse::<f64>().unwrap_or(f64::NAN),
        }
    }

    /// `ToString` conversion used by string concatenation, interpolation,
    /// and implicit printing (`spec.md` §4.3 "String coercion").
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Number(n) => format_number(*n),
            Value::Boolean(b) => b.to_string(),
            Value::String(s) => s.to_string(),
            Value::Function(f) => format!("[Function {}]", f.name().unwrap_or("anonymous")),
            Value::Array(items) => {
                let rendered: Vec<String> = items.borrow().iter().map(Value::to_display_string).collect();
                format!("[{}]", rendered.join(", "))
            }
            Value::Object(entries) => {
                let rendered: Vec<String> = entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{k}: {}", v.to_display_string()))
                    .collect();
                format!("{{{}}}", rendered.join(", "))
            }
            Value::Class(_) => "[Class]".to_string(),
            Value::Instance(inst) => instance_to_display_string(inst),
            Value::Promise(_) => "[Promise]".to_string(),
        }
    }

    /// `===`/`!==`: same variant and, for references, the same underlying
    /// allocation (pointer identity), not structural equality
    /// (`spec.md` §4.3 "Strict equality").
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Promise(a), Value::Promise(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => function_ptr_eq(a, b),
            _ => false,
        }
    }

    /// True for the reference types (Array, Object, Class, Instance,
    /// Promise, Function); false for the primitives (Null, Number, String,
    /// Boolean) (`spec.md` §3.1 "Sharing semantics").
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Value::Array(_) | Value::Object(_) | Value::Class(_) | Value::Instance(_) | Value::Promise(_) | Value::Function(_)
        )
    }

    /// `==`/`!=`: strict equality widened with `Number`<->`String`/`Boolean`
    /// coercion, and a reference type against a primitive compared through
    /// the reference's string form (`spec.md` §3.2 "Loose equality").
    pub fn loose_eq(&self, other: &Value) -> bool {
        if self.is_reference() != other.is_reference() {
            return self.to_display_string() == other.to_display_string();
        }
        match (self, other) {
            (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => self.to_number() == other.to_number(),
            (Value::Boolean(_), _) | (_, Value::Boolean(_)) => self.to_number() == other.to_number(),
            _ => self.strict_eq(other),
        }
    }

    /// Ordering for `<`/`<=`/`>`/`>=`: numeric after coercion, except two
    /// strings compare lexicographically (`spec.md` §4.3 "Comparison").
    pub fn partial_compare(&self, other: &Value) -> Option<Ordering> {
        if let (Value::String(a), Value::String(b)) = (self, other) {
            return Some(a.as_ref().cmp(b.as_ref()));
        }
        let (a, b) = (self.to_number(), other.to_number());
        a.partial_cmp(&b)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Number(_) => "Number",
            Value::String(_) => "String",
            Value::Boolean(_) => "Boolean",
            Value::Function(_) => "Function",
            Value::Array(_) => "Array",
            Value::Object(_) => "Object",
            Value::Class(_) => "Class",
            Value::Instance(inst) => return leak_class_name(inst),
            Value::Promise(_) => "Promise",
        }
    }
}

fn leak_class_name(inst: &Rc<RefCell<InstanceValue>>) -> &'static str {
    // Instance type names are dynamic (the class name); callers that need
    // the owned string should use `InstanceValue::class_name` directly
    // instead of this fallback used only for diagnostics that accept a
    // generic label.
    let _ = inst;
    "Instance"
}

fn instance_to_display_string(inst: &Rc<RefCell<InstanceValue>>) -> String {
    let borrowed = inst.borrow();
    let class_name = borrowed.class_name();
    match class_name.as_ref() {
        "Date" => borrowed
            .fields
            .get("iso")
            .map(Value::to_display_string)
            .unwrap_or_else(|| "[Object]".to_string()),
        "Duration" => borrowed
            .fields
            .get("milliseconds")
            .map(|v| format!("Duration({}ms)", format_number(v.to_number())))
            .unwrap_or_else(|| "[Object]".to_string()),
        _ => "[Object]".to_string(),
    }
}

fn function_ptr_eq(a: &Function, b: &Function) -> bool {
    match (a, b) {
        (Function::Script(a), Function::Script(b)) => Rc::ptr_eq(a, b),
        (Function::Native(a), Function::Native(b)) => Rc::ptr_eq(a, b),
        (Function::Bound(a, at), Function::Bound(b, bt)) => function_ptr_eq(a, b) && at.strict_eq(bt),
        _ => false,
    }
}

/// Renders a number the way scripts see it printed: integral values with
/// no trailing `.0`, everything else via the shortest round-tripping form.
fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() };
    }
    if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.type_name(), self.to_display_string())
    }
}

/// Hashing for values used as native `Map`/`Set` keys: primitives hash by
/// value, references hash by pointer identity so two distinct arrays with
/// equal contents are distinct keys, matching strict-equality semantics
/// (`spec.md` §4.3, §6 "Map/Set keys").
impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Number(n) => n.to_bits().hash(state),
            Value::Boolean(b) => b.hash(state),
            Value::String(s) => s.hash(state),
            Value::Function(func) => match func {
                Function::Script(f) => (Rc::as_ptr(f) as usize).hash(state),
                Function::Native(f) => (Rc::as_ptr(f) as usize).hash(state),
                Function::Bound(inner, this) => {
                    1u8.hash(state);
                    Value::Function((**inner).clone()).hash(state);
                    this.hash(state);
                }
            },
            Value::Array(a) => (Rc::as_ptr(a) as usize).hash(state),
            Value::Object(o) => (Rc::as_ptr(o) as usize).hash(state),
            Value::Class(c) => (Rc::as_ptr(c) as usize).hash(state),
            Value::Instance(i) => (Rc::as_ptr(i) as usize).hash(state),
            Value::Promise(p) => (Rc::as_ptr(p) as usize).hash(state),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_eq(other)
    }
}

impl Eq for Value {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_falsy_set() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::string("").is_truthy());
        assert!(Value::Number(f64::NAN).is_truthy());
        assert!(Value::array(Vec::new()).is_truthy());
    }

    #[test]
    fn strict_eq_distinguishes_distinct_arrays_with_equal_contents() {
        let a = Value::array(vec![Value::Number(1.0)]);
        let b = Value::array(vec![Value::Number(1.0)]);
        assert!(!a.strict_eq(&b));
        assert!(a.strict_eq(&a.clone()));
    }

    #[test]
    fn loose_eq_coerces_number_and_string() {
        assert!(Value::Number(1.0).loose_eq(&Value::string("1")));
        assert!(!Value::Number(1.0).strict_eq(&Value::string("1")));
    }

    #[test]
    fn loose_eq_coerces_booleans_through_numbers() {
        assert!(Value::Boolean(true).loose_eq(&Value::Number(1.0)));
        assert!(Value::Boolean(false).loose_eq(&Value::string("")));
    }

    #[test]
    fn loose_eq_coerces_reference_types_through_their_string_form() {
        let arr = Value::array(vec![Value::Number(1.0), Value::Number(2.0)]);
        assert!(arr.loose_eq(&Value::string("[1, 2]")));
        assert!(Value::string("[1, 2]").loose_eq(&arr));
        assert!(!arr.loose_eq(&Value::string("nope")));
    }

    #[test]
    fn comparison_is_lexicographic_for_strings_but_numeric_otherwise() {
        assert_eq!(Value::string("a").partial_compare(&Value::string("b")), Some(Ordering::Less));
        assert_eq!(Value::string("10").partial_compare(&Value::Number(9.0)), Some(Ordering::Greater));
    }

    #[test]
    fn number_formatting_drops_trailing_zero_for_integers() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(3.5), "3.5");
    }

    #[test]
    fn array_to_display_string_is_recursive() {
        let inner = Value::array(vec![Value::Number(1.0), Value::Number(2.0)]);
        let outer = Value::array(vec![inner, Value::string("x")]);
        assert_eq!(outer.to_display_string(), "[[1, 2], x]");
    }
}
