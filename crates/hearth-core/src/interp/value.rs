//! Runtime values.
//!
//! Containers are shared (`Rc<RefCell<..>>`) so aliasing behaves like
//! reference semantics: `b = a; b.append(1)` is visible through `a`.

use super::ast::FunctionDef;
use super::builtins::Builtin;
use super::error::{ExcKind, ExceptionObj, Fault};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<[Value]>),
    Dict(Rc<RefCell<Dict>>),
    Range(RangeValue),
    Function(Rc<Function>),
    Builtin(Builtin),
    Method(Rc<BoundMethod>),
    Module(ModuleKind),
    Type(TypeKind),
    Exception(Rc<ExceptionObj>),
    Stream(StreamKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeValue {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl RangeValue {
    pub fn len(&self) -> usize {
        let span = if self.step > 0 {
            (self.stop as i128) - (self.start as i128)
        } else {
            (self.start as i128) - (self.stop as i128)
        };
        if span <= 0 {
            return 0;
        }
        let step = (self.step as i128).abs();
        ((span + step - 1) / step) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<i64> {
        if index >= self.len() {
            return None;
        }
        Some((self.start as i128 + self.step as i128 * index as i128) as i64)
    }

    pub fn contains(&self, n: i64) -> bool {
        let in_bounds = if self.step > 0 {
            n >= self.start && n < self.stop
        } else {
            n <= self.start && n > self.stop
        };
        in_bounds && (n - self.start) % self.step == 0
    }
}

/// A user-defined function. Defaults are evaluated once, at definition.
#[derive(Debug)]
pub struct Function {
    pub def: Rc<FunctionDef>,
    pub defaults: Vec<Option<Value>>,
}

impl Function {
    pub fn name(&self) -> &Rc<str> {
        &self.def.name
    }
}

#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub name: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Math,
    Sys,
    Time,
}

impl ModuleKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "math" => Some(ModuleKind::Math),
            "sys" => Some(ModuleKind::Sys),
            "time" => Some(ModuleKind::Time),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModuleKind::Math => "math",
            ModuleKind::Sys => "sys",
            ModuleKind::Time => "time",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Runtime type of a value; also the value of names like `int` or `ValueError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    NoneType,
    Bool,
    Int,
    Float,
    Str,
    List,
    Tuple,
    Dict,
    Range,
    Function,
    BuiltinFunction,
    Method,
    Module,
    Type,
    Stream,
    Exception(ExcKind),
}

impl TypeKind {
    pub fn name(&self) -> &'static str {
        match self {
            TypeKind::NoneType => "NoneType",
            TypeKind::Bool => "bool",
            TypeKind::Int => "int",
            TypeKind::Float => "float",
            TypeKind::Str => "str",
            TypeKind::List => "list",
            TypeKind::Tuple => "tuple",
            TypeKind::Dict => "dict",
            TypeKind::Range => "range",
            TypeKind::Function => "function",
            TypeKind::BuiltinFunction => "builtin_function_or_method",
            TypeKind::Method => "method",
            TypeKind::Module => "module",
            TypeKind::Type => "type",
            TypeKind::Stream => "TextIOWrapper",
            TypeKind::Exception(kind) => kind.name(),
        }
    }

    /// `isinstance` relation between runtime types.
    pub fn is_subtype_of(&self, other: TypeKind) -> bool {
        match (self, other) {
            (a, b) if *a == b => true,
            (TypeKind::Bool, TypeKind::Int) => true,
            (TypeKind::Exception(a), TypeKind::Exception(b)) => a.is_subclass_of(b),
            _ => false,
        }
    }
}

/// Insertion-ordered dictionary.
///
/// Deleted slots become tombstones so indices in `index` stay valid; the
/// table compacts once tombstones outnumber live entries.
#[derive(Debug, Clone, Default)]
pub struct Dict {
    entries: Vec<Option<(Value, Value)>>,
    index: HashMap<HashKey, usize>,
    live: usize,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn get(&self, key: &Value) -> Result<Option<Value>, Fault> {
        let hk = HashKey::from_value(key)?;
        Ok(self
            .index
            .get(&hk)
            .and_then(|&slot| self.entries[slot].as_ref())
            .map(|(_, v)| v.clone()))
    }

    pub fn contains_key(&self, key: &Value) -> Result<bool, Fault> {
        let hk = HashKey::from_value(key)?;
        Ok(self.index.contains_key(&hk))
    }

    pub fn insert(&mut self, key: Value, value: Value) -> Result<(), Fault> {
        let hk = HashKey::from_value(&key)?;
        match self.index.get(&hk) {
            Some(&slot) => {
                if let Some(entry) = self.entries[slot].as_mut() {
                    entry.1 = value;
                }
            }
            None => {
                self.index.insert(hk, self.entries.len());
                self.entries.push(Some((key, value)));
                self.live += 1;
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &Value) -> Result<Option<Value>, Fault> {
        let hk = HashKey::from_value(key)?;
        let removed = match self.index.remove(&hk) {
            Some(slot) => self.entries[slot].take().map(|(_, v)| v),
            None => None,
        };
        if removed.is_some() {
            self.live -= 1;
            if self.entries.len() > 16 && self.live * 2 < self.entries.len() {
                self.compact();
            }
        }
        Ok(removed)
    }

    fn compact(&mut self) {
        self.entries.retain(Option::is_some);
        self.index.clear();
        for (slot, entry) in self.entries.iter().enumerate() {
            if let Some((k, _)) = entry {
                if let Ok(hk) = HashKey::from_value(k) {
                    self.index.insert(hk, slot);
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().flatten().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> Vec<Value> {
        self.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn items(&self) -> Vec<Value> {
        self.iter()
            .map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()]))
            .collect()
    }
}

/// Hashable projection of a value. Numbers that compare equal hash equal,
/// so `d[1]`, `d[1.0]` and `d[True]` address the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum HashKey {
    None,
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Tuple(Vec<HashKey>),
}

impl HashKey {
    fn from_value(value: &Value) -> Result<Self, Fault> {
        Ok(match value {
            Value::None => HashKey::None,
            Value::Bool(b) => HashKey::Int(*b as i64),
            Value::Int(i) => HashKey::Int(*i),
            Value::Float(f) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                    HashKey::Int(*f as i64)
                } else {
                    HashKey::Float(f.to_bits())
                }
            }
            Value::Str(s) => HashKey::Str(Rc::clone(s)),
            Value::Tuple(items) => HashKey::Tuple(
                items
                    .iter()
                    .map(HashKey::from_value)
                    .collect::<Result<_, _>>()?,
            ),
            other => {
                return Err(Fault::type_error(format!(
                    "unhashable type: '{}'",
                    other.type_name()
                )))
            }
        })
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

/// Containers nested deeper than this render as `...`.
const MAX_RENDER_DEPTH: usize = 64;

/// Containers nested deeper than this fail `==` and `<` with `RecursionError`.
const MAX_COMPARE_DEPTH: usize = 500;

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Rc::from(items))
    }

    pub fn dict(dict: Dict) -> Self {
        Value::Dict(Rc::new(RefCell::new(dict)))
    }

    pub fn type_kind(&self) -> TypeKind {
        match self {
            Value::None => TypeKind::NoneType,
            Value::Bool(_) => TypeKind::Bool,
            Value::Int(_) => TypeKind::Int,
            Value::Float(_) => TypeKind::Float,
            Value::Str(_) => TypeKind::Str,
            Value::List(_) => TypeKind::List,
            Value::Tuple(_) => TypeKind::Tuple,
            Value::Dict(_) => TypeKind::Dict,
            Value::Range(_) => TypeKind::Range,
            Value::Function(_) => TypeKind::Function,
            Value::Builtin(_) => TypeKind::BuiltinFunction,
            Value::Method(_) => TypeKind::Method,
            Value::Module(_) => TypeKind::Module,
            Value::Type(_) => TypeKind::Type,
            Value::Stream(_) => TypeKind::Stream,
            Value::Exception(e) => TypeKind::Exception(e.kind),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_kind().name()
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(d) => !d.borrow().is_empty(),
            Value::Range(r) => !r.is_empty(),
            _ => true,
        }
    }

    /// Numeric view used by arithmetic and comparisons.
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Bool(b) => Some(Number::Int(*b as i64)),
            Value::Int(i) => Some(Number::Int(*i)),
            Value::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Identity comparison (`is`).
    pub fn is_same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Exception(a), Value::Exception(b)) => Rc::ptr_eq(a, b),
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Module(a), Value::Module(b)) => a == b,
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Stream(a), Value::Stream(b)) => a == b,
            _ => false,
        }
    }

    /// Structural equality (`==`).
    pub fn equals(&self, other: &Value) -> Result<bool, Fault> {
        self.equals_at(other, 0)
    }

    fn equals_at(&self, other: &Value, depth: usize) -> Result<bool, Fault> {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return Ok(a.equals(b));
        }
        match (self, other) {
            (Value::None, Value::None) => Ok(true),
            (Value::Str(a), Value::Str(b)) => Ok(a == b),
            (Value::List(a), Value::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                sequences_equal(&a.borrow(), &b.borrow(), depth)
            }
            (Value::Tuple(a), Value::Tuple(b)) => sequences_equal(a, b, depth),
            (Value::Dict(a), Value::Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return Ok(false);
                }
                let depth = nested(depth)?;
                for (k, v) in a.iter() {
                    match b.get(k)? {
                        Some(other) if other.equals_at(v, depth)? => {}
                        _ => return Ok(false),
                    }
                }
                Ok(true)
            }
            (Value::Range(a), Value::Range(b)) => Ok((a.is_empty() && b.is_empty())
                || (a.len() == b.len() && a.start == b.start && (a.len() == 1 || a.step == b.step))),
            (Value::Exception(a), Value::Exception(b)) => Ok(Rc::ptr_eq(a, b)),
            _ => Ok(self.is_same(other)),
        }
    }

    /// Ordering for `<`, `sorted` and friends.
    pub fn compare(&self, other: &Value) -> Result<std::cmp::Ordering, Fault> {
        self.compare_at(other, 0)
    }

    fn compare_at(&self, other: &Value, depth: usize) -> Result<std::cmp::Ordering, Fault> {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return a.partial_cmp(b).ok_or_else(|| {
                Fault::value_error("cannot order NaN values")
            });
        }
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                let (a, b) = (a.borrow().clone(), b.borrow().clone());
                compare_sequences(&a, &b, depth)
            }
            (Value::Tuple(a), Value::Tuple(b)) => compare_sequences(a, b, depth),
            _ => Err(Fault::type_error(format!(
                "'<' not supported between instances of '{}' and '{}'",
                self.type_name(),
                other.type_name()
            ))),
        }
    }

    /// `str(value)`
    pub fn to_str(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            Value::Exception(e) => e.message.clone(),
            _ => self.repr(),
        }
    }

    /// `repr(value)`
    pub fn repr(&self) -> String {
        let mut out = String::new();
        let mut seen = Vec::new();
        self.write_repr(&mut out, &mut seen, usize::MAX);
        out
    }

    /// Like [`Value::repr`] but stops once `limit` bytes have been produced.
    /// The result may exceed `limit` by at most one element's worth of text.
    pub fn repr_bounded(&self, limit: usize) -> String {
        let mut out = String::new();
        let mut seen = Vec::new();
        self.write_repr(&mut out, &mut seen, limit);
        out
    }

    fn write_repr(&self, out: &mut String, seen: &mut Vec<*const ()>, limit: usize) {
        if out.len() > limit {
            return;
        }
        match self {
            Value::None => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Int(i) => {
                let _ = write!(out, "{}", i);
            }
            Value::Float(f) => out.push_str(&format_float(*f)),
            Value::Str(s) => out.push_str(&quote_str(s)),
            Value::List(items) => {
                let ptr = Rc::as_ptr(items) as *const ();
                if seen.contains(&ptr) || seen.len() >= MAX_RENDER_DEPTH {
                    out.push_str("[...]");
                    return;
                }
                seen.push(ptr);
                out.push('[');
                write_items(&items.borrow(), out, seen, limit);
                out.push(']');
                seen.pop();
            }
            Value::Tuple(items) => {
                if seen.len() >= MAX_RENDER_DEPTH {
                    out.push_str("(...)");
                    return;
                }
                seen.push(std::ptr::null());
                out.push('(');
                write_items(items, out, seen, limit);
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
                seen.pop();
            }
            Value::Dict(dict) => {
                let ptr = Rc::as_ptr(dict) as *const ();
                if seen.contains(&ptr) || seen.len() >= MAX_RENDER_DEPTH {
                    out.push_str("{...}");
                    return;
                }
                seen.push(ptr);
                out.push('{');
                for (i, (k, v)) in dict.borrow().iter().enumerate() {
                    if out.len() > limit {
                        break;
                    }
                    if i > 0 {
                        out.push_str(", ");
                    }
                    k.write_repr(out, seen, limit);
                    out.push_str(": ");
                    v.write_repr(out, seen, limit);
                }
                out.push('}');
                seen.pop();
            }
            Value::Range(r) => {
                if r.step == 1 {
                    let _ = write!(out, "range({}, {})", r.start, r.stop);
                } else {
                    let _ = write!(out, "range({}, {}, {})", r.start, r.stop, r.step);
                }
            }
            Value::Function(f) => {
                let _ = write!(out, "<function {}>", f.name());
            }
            Value::Builtin(b) => {
                let _ = write!(out, "<built-in function {}>", b.name());
            }
            Value::Method(m) => {
                let _ = write!(
                    out,
                    "<built-in method {} of {} object>",
                    m.name,
                    m.receiver.type_name()
                );
            }
            Value::Module(m) => {
                let _ = write!(out, "<module '{}'>", m.name());
            }
            Value::Type(t) => {
                let _ = write!(out, "<class '{}'>", t.name());
            }
            Value::Exception(e) if e.message.is_empty() => {
                let _ = write!(out, "{}()", e.kind.name());
            }
            Value::Exception(e) => {
                let _ = write!(out, "{}({})", e.kind.name(), quote_str(&e.message));
            }
            Value::Stream(StreamKind::Stdout) => out.push_str("<stdout>"),
            Value::Stream(StreamKind::Stderr) => out.push_str("<stderr>"),
        }
    }

    /// Deterministic estimate of the value's own footprint in bytes.
    /// Contents of containers are not included.
    pub fn approximate_size(&self) -> u64 {
        match self {
            Value::None => 16,
            Value::Bool(_) | Value::Int(_) => 28,
            Value::Float(_) => 24,
            Value::Str(s) => 49 + s.len() as u64,
            Value::List(items) => 56 + 8 * items.borrow().len() as u64,
            Value::Tuple(items) => 40 + 8 * items.len() as u64,
            Value::Dict(d) => 64 + 24 * d.borrow().len() as u64,
            Value::Range(_) => 48,
            Value::Function(_) => 136,
            Value::Builtin(_) | Value::Method(_) => 72,
            Value::Module(_) => 72,
            Value::Type(_) => 400,
            Value::Exception(e) => 64 + e.message.len() as u64,
            Value::Stream(_) => 200,
        }
    }

    /// Materialize an iterable into a vector of items.
    pub fn iter_values(&self) -> Result<Vec<Value>, Fault> {
        match self {
            Value::List(items) => Ok(items.borrow().clone()),
            Value::Tuple(items) => Ok(items.to_vec()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::from(c.to_string())).collect()),
            Value::Dict(d) => Ok(d.borrow().keys()),
            Value::Range(r) => {
                let len = r.len();
                Ok((0..len).filter_map(|i| r.get(i)).map(Value::Int).collect())
            }
            other => Err(Fault::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        }
    }
}

fn write_items(items: &[Value], out: &mut String, seen: &mut Vec<*const ()>, limit: usize) {
    for (i, item) in items.iter().enumerate() {
        if out.len() > limit {
            break;
        }
        if i > 0 {
            out.push_str(", ");
        }
        item.write_repr(out, seen, limit);
    }
}

/// Empty every list and dict reachable from `roots`.
///
/// Reference cycles among containers never reach a zero count on their own;
/// clearing them lets the whole graph drop. Only call this once nothing else
/// will observe the values.
pub fn release_cycles(roots: impl IntoIterator<Item = Value>) {
    let mut pending: Vec<Value> = roots.into_iter().collect();
    let mut visited: HashSet<*const ()> = HashSet::new();
    while let Some(value) = pending.pop() {
        match value {
            Value::List(items) => {
                if let Ok(mut items) = items.try_borrow_mut() {
                    pending.extend(std::mem::take(&mut *items));
                }
            }
            Value::Dict(dict) => {
                if let Ok(mut dict) = dict.try_borrow_mut() {
                    let dict = std::mem::take(&mut *dict);
                    for (k, v) in dict.iter() {
                        pending.push(k.clone());
                        pending.push(v.clone());
                    }
                }
            }
            Value::Tuple(items) => {
                if visited.insert(Rc::as_ptr(&items) as *const ()) {
                    pending.extend(items.iter().cloned());
                }
            }
            Value::Function(function) => {
                if visited.insert(Rc::as_ptr(&function) as *const ()) {
                    pending.extend(function.defaults.iter().flatten().cloned());
                }
            }
            Value::Method(method) => {
                if visited.insert(Rc::as_ptr(&method) as *const ()) {
                    pending.push(method.receiver.clone());
                }
            }
            _ => {}
        }
    }
}

/// Index of the first item equal to `target`.
pub fn position_of(items: &[Value], target: &Value) -> Result<Option<usize>, Fault> {
    for (i, item) in items.iter().enumerate() {
        if item.equals(target)? {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

/// Step one container level deeper during a comparison. Self-referencing
/// containers would otherwise recurse until the stack overflows.
fn nested(depth: usize) -> Result<usize, Fault> {
    if depth >= MAX_COMPARE_DEPTH {
        return Err(Fault::new(
            ExcKind::RecursionError,
            "maximum recursion depth exceeded in comparison",
        ));
    }
    Ok(depth + 1)
}

fn sequences_equal(a: &[Value], b: &[Value], depth: usize) -> Result<bool, Fault> {
    if a.len() != b.len() {
        return Ok(false);
    }
    let depth = nested(depth)?;
    for (x, y) in a.iter().zip(b.iter()) {
        if !x.equals_at(y, depth)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn compare_sequences(a: &[Value], b: &[Value], depth: usize) -> Result<std::cmp::Ordering, Fault> {
    let depth = nested(depth)?;
    for (x, y) in a.iter().zip(b.iter()) {
        if !x.equals_at(y, depth)? {
            return x.compare_at(y, depth);
        }
    }
    Ok(a.len().cmp(&b.len()))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    fn equals(self, other: Number) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }

    fn partial_cmp(self, other: Number) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

/// Shortest round-tripping float text, with a trailing `.0` for integral
/// values and `e+XX` exponents for very large or small magnitudes.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let abs = f.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        let text = format!("{:e}", f);
        return match text.split_once('e') {
            Some((mantissa, exp)) => {
                let (sign, digits) = match exp.strip_prefix('-') {
                    Some(d) => ('-', d),
                    None => ('+', exp),
                };
                format!("{}e{}{:0>2}", mantissa, sign, digits)
            }
            None => text,
        };
    }
    if f.fract() == 0.0 {
        return format!("{:.1}", f);
    }
    format!("{}", f)
}

/// Quote a string the way `repr` does: single quotes unless the text
/// contains a single quote and no double quote.
pub fn quote_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

pub fn exception_value(kind: ExcKind, message: impl Into<String>) -> Value {
    Value::Exception(Rc::new(ExceptionObj::new(kind, message)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_formatting() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(-2.5), "-2.5");
        assert_eq!(format_float(1e20), "1e+20");
        assert_eq!(format_float(1.5e-5), "1.5e-05");
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(0.0), "0.0");
    }

    #[test]
    fn test_repr_of_containers() {
        let list = Value::list(vec![Value::Int(1), Value::from("a"), Value::None]);
        assert_eq!(list.repr(), "[1, 'a', None]");
        assert_eq!(Value::tuple(vec![Value::Int(1)]).repr(), "(1,)");

        let mut dict = Dict::new();
        dict.insert(Value::from("k"), Value::Float(2.0)).unwrap();
        assert_eq!(Value::dict(dict).repr(), "{'k': 2.0}");
    }

    #[test]
    fn test_self_referential_list() {
        let list = Value::list(vec![Value::Int(1)]);
        if let Value::List(items) = &list {
            items.borrow_mut().push(list.clone());
        }
        assert_eq!(list.repr(), "[1, [...]]");
    }

    #[test]
    fn test_quote_selection() {
        assert_eq!(quote_str("it's"), "\"it's\"");
        assert_eq!(quote_str("a\nb"), "'a\\nb'");
        assert_eq!(quote_str("say \"hi\" 'x'"), "'say \"hi\" \\'x\\''");
    }

    #[test]
    fn test_numeric_equality_and_hashing() {
        assert!(Value::Int(1).equals(&Value::Float(1.0)).unwrap());
        assert!(Value::Bool(true).equals(&Value::Int(1)).unwrap());

        let mut dict = Dict::new();
        dict.insert(Value::Int(1), Value::from("int")).unwrap();
        dict.insert(Value::Float(1.0), Value::from("float")).unwrap();
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.get(&Value::Bool(true)).unwrap().unwrap().to_str(), "float");
    }

    #[test]
    fn test_unhashable_key() {
        let mut dict = Dict::new();
        let err = dict.insert(Value::list(vec![]), Value::None).unwrap_err();
        assert!(err.message().contains("unhashable type: 'list'"));
    }

    #[test]
    fn test_dict_preserves_order_across_removal() {
        let mut dict = Dict::new();
        for i in 0..40 {
            dict.insert(Value::Int(i), Value::Int(i * i)).unwrap();
        }
        for i in 0..30 {
            dict.remove(&Value::Int(i)).unwrap();
        }
        let keys: Vec<i64> = dict.keys().iter().filter_map(Value::as_int).collect();
        assert_eq!(keys, (30..40).collect::<Vec<_>>());
        assert_eq!(dict.get(&Value::Int(35)).unwrap().unwrap().as_int(), Some(1225));
    }

    #[test]
    fn test_range_len_and_contains() {
        let r = RangeValue { start: 0, stop: 10, step: 3 };
        assert_eq!(r.len(), 4);
        assert!(r.contains(9));
        assert!(!r.contains(10));

        let down = RangeValue { start: 5, stop: 0, step: -2 };
        assert_eq!(down.len(), 3);
        assert_eq!(down.get(2), Some(1));
    }

    #[test]
    fn test_compare_mixed_types_fails() {
        let err = Value::Int(1).compare(&Value::from("a")).unwrap_err();
        assert_eq!(err.kind(), ExcKind::TypeError);
    }

    #[test]
    fn test_repr_bounded_stops_early() {
        let big = Value::list((0..100_000).map(Value::Int).collect());
        let text = big.repr_bounded(60);
        assert!(text.len() < 200);
        assert!(text.starts_with("[0, 1, 2"));
    }

    #[test]
    fn test_sizes_are_deterministic() {
        assert_eq!(Value::Int(5).approximate_size(), 28);
        assert_eq!(Value::from("abc").approximate_size(), 52);
        assert_eq!(Value::list(vec![Value::None; 3]).approximate_size(), 80);
    }
}
