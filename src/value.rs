//! The tagged value (spec.md §3 "Variant") and the host-facing variable
//! resolver contract (spec.md §1 "variable resolver").
//!
//! The C++ source represents the host store through an opaque handle
//! dereferenced via a vtable of function pointers. In idiomatic Rust the
//! same "core never interprets host memory" contract is better expressed as
//! a trait operating on owned snapshots of [`Value`] plus a key/index path,
//! rather than round-tripping raw handles through `unsafe` — see
//! `DESIGN.md` for the open-question rationale.
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::rc::Rc;

bitflags::bitflags! {
    /// Which [`Value`]s are treated as false inside `{% if %}`/`{% unless %}`
    /// (spec.md §3 "falsiness policy").
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Falsiness: u8 {
        const FALSE = 0b0001;
        const NIL = 0b0010;
        const ZERO = 0b0100;
        const EMPTY_STRING = 0b1000;
    }
}

impl Default for Falsiness {
    /// The permissive policy: `false`, `nil`, `0` and `""` are all falsy
    /// (spec.md §8 "with the permissive policy").
    fn default() -> Self {
        Falsiness::FALSE | Falsiness::NIL | Falsiness::ZERO | Falsiness::EMPTY_STRING
    }
}

impl Falsiness {
    /// `false` and `nil` only (spec.md §8 "with the strict policy").
    pub fn strict() -> Self {
        Falsiness::FALSE | Falsiness::NIL
    }
    /// `false`, `nil`, `0` and `""` (the engine's default).
    pub fn permissive() -> Self {
        Falsiness::FALSE | Falsiness::NIL | Falsiness::ZERO | Falsiness::EMPTY_STRING
    }
}

/// One step of a variable path: `.b` or `["b"]`/`[0]` (spec.md §3 invariant 4).
#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    Key(String),
    Index(i64),
}

/// The tagged union every expression evaluates to (spec.md §3 "Variant").
/// A raw-pointer / opaque-handle case is intentionally not modeled here:
/// the resolver returns owned `Value`s, so the core never needs to carry an
/// un-interpreted host pointer through the AST.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Array(Rc<Vec<Value>>),
    Map(Rc<BTreeMap<String, Value>>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(Rc::from(s.into()))
    }
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(items))
    }
    pub fn map(entries: BTreeMap<String, Value>) -> Self {
        Value::Map(Rc::new(entries))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    /// Falsy/truthy under `policy` (spec.md §3/§8).
    pub fn is_truthy(&self, policy: Falsiness) -> bool {
        match self {
            Value::Bool(false) => !policy.contains(Falsiness::FALSE),
            Value::Nil => !policy.contains(Falsiness::NIL),
            Value::Int(0) => !policy.contains(Falsiness::ZERO),
            Value::Float(f) if *f == 0.0 => !policy.contains(Falsiness::ZERO),
            Value::Str(s) if s.is_empty() => !policy.contains(Falsiness::EMPTY_STRING),
            _ => true,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            Value::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_str_view(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Str(s) => Some(s.chars().count()),
            Value::Array(a) => Some(a.len()),
            Value::Map(m) => Some(m.len()),
            _ => None,
        }
    }

    pub fn get_index(&self, segment: &PathSegment) -> Option<Value> {
        match (self, segment) {
            (Value::Map(m), PathSegment::Key(k)) => m.get(k).cloned(),
            (Value::Array(a), PathSegment::Index(i)) => {
                let len = a.len() as i64;
                let idx = if *i < 0 { len + i } else { *i };
                if idx < 0 || idx >= len {
                    None
                } else {
                    a.get(idx as usize).cloned()
                }
            }
            (Value::Array(a), PathSegment::Key(k)) => k.parse::<i64>().ok().and_then(|i| {
                let len = a.len() as i64;
                let idx = if i < 0 { len + i } else { i };
                if idx < 0 || idx >= len {
                    None
                } else {
                    a.get(idx as usize).cloned()
                }
            }),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Nil
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => {
                if v.fract() == 0.0 && v.is_finite() {
                    write!(f, "{:.1}", v)
                } else {
                    write!(f, "{}", v)
                }
            }
            Value::Str(s) => write!(f, "{}", s),
            Value::Array(a) => {
                for (i, item) in a.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            Value::Map(_) => Ok(()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Value {
    /// Total ordering only within the same numeric family or between
    /// strings (spec.md §3 invariant on `Variant` ordering).
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// The host-supplied capability object the renderer and VM call through to
/// read and write the caller's native variable store (spec.md §1, §4.3
/// "Store access"). The core never interprets host memory directly; every
/// dereference and assignment is funneled through this trait.
pub trait VariableResolver {
    /// Resolve a top-level name, e.g. the `a` in `a.b.c`.
    fn get_root(&self, name: &str) -> Option<Value>;

    /// Step into `base` along one path segment.
    fn get_index(&self, base: &Value, segment: &PathSegment) -> Option<Value> {
        base.get_index(segment)
    }

    /// Assign `value` at `name` followed by `path` (possibly empty, meaning
    /// assign the root itself), creating intermediate containers as needed.
    fn assign(&mut self, name: &str, path: &[PathSegment], value: Value);

    /// Enumerate `value`'s elements for a `for` loop, in source order. A
    /// `Map`'s entries enumerate as `[key, value]` pairs.
    fn enumerate(&self, value: &Value) -> Option<Vec<Value>> {
        match value {
            Value::Array(a) => Some((**a).clone()),
            Value::Map(m) => Some(
                m.iter()
                    .map(|(k, v)| Value::array(vec![Value::str(k.clone()), v.clone()]))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Bytes a resolver wants accounted toward `maximumMemoryUsage`
    /// (spec.md §4.3 "Resource limits"). Default: untracked.
    fn memory_hint(&mut self, _delta: i64) {}
}

/// The crate's own default [`VariableResolver`], backed by an in-memory
/// [`Value::Map`]. Exercised by the test suite and suitable for any host
/// that doesn't need to project its own native data structures.
#[derive(Debug, Default, Clone)]
pub struct MapResolver {
    root: BTreeMap<String, Value>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(root: BTreeMap<String, Value>) -> Self {
        Self { root }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.root.insert(key.into(), value);
    }

    fn assign_recursive(target: &mut Value, path: &[PathSegment], value: Value) {
        match path.split_first() {
            None => *target = value,
            Some((PathSegment::Key(k), rest)) => {
                let map = match target {
                    Value::Map(m) => Rc::make_mut(m),
                    _ => {
                        *target = Value::map(BTreeMap::new());
                        match target {
                            Value::Map(m) => Rc::make_mut(m),
                            _ => unreachable!(),
                        }
                    }
                };
                let entry = map.entry(k.clone()).or_insert(Value::Nil);
                Self::assign_recursive(entry, rest, value);
            }
            Some((PathSegment::Index(i), rest)) => {
                let arr = match target {
                    Value::Array(a) => Rc::make_mut(a),
                    _ => {
                        *target = Value::array(Vec::new());
                        match target {
                            Value::Array(a) => Rc::make_mut(a),
                            _ => unreachable!(),
                        }
                    }
                };
                let len = arr.len() as i64;
                let idx = if *i < 0 { len + i } else { *i };
                if idx < 0 {
                    return;
                }
                while (arr.len() as i64) <= idx {
                    arr.push(Value::Nil);
                }
                Self::assign_recursive(&mut arr[idx as usize], rest, value);
            }
        }
    }
}

impl VariableResolver for MapResolver {
    fn get_root(&self, name: &str) -> Option<Value> {
        self.root.get(name).cloned()
    }

    fn assign(&mut self, name: &str, path: &[PathSegment], value: Value) {
        let entry = self.root.entry(name.to_string()).or_insert(Value::Nil);
        Self::assign_recursive(entry, path, value);
    }
}
