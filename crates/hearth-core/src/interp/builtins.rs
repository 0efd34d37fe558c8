//! Built-in functions, container methods and the importable modules.

use super::ast::BinOp;
use super::error::{ExcKind, Fault};
use super::eval::Interpreter;
use super::format::format_spec;
use super::ops;
use super::value::{
    exception_value, position_of, BoundMethod, Dict, ModuleKind, RangeValue, StreamKind, TypeKind,
    Value,
};
use std::cmp::Ordering;
use std::rc::Rc;
use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub type Kwargs = Vec<(String, Value)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Len,
    Repr,
    TypeOf,
    Abs,
    Min,
    Max,
    Sum,
    Sorted,
    Reversed,
    Round,
    Isinstance,
    Enumerate,
    Zip,
    Any,
    All,
    Chr,
    Ord,
    Divmod,
    Format,
    MathSqrt,
    MathFloor,
    MathCeil,
    MathLog,
    MathExp,
    MathSin,
    MathCos,
    MathFabs,
    TimeTime,
    TimeSleep,
    TimeMonotonic,
}

impl Builtin {
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Len => "len",
            Builtin::Repr => "repr",
            Builtin::TypeOf => "type",
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Sum => "sum",
            Builtin::Sorted => "sorted",
            Builtin::Reversed => "reversed",
            Builtin::Round => "round",
            Builtin::Isinstance => "isinstance",
            Builtin::Enumerate => "enumerate",
            Builtin::Zip => "zip",
            Builtin::Any => "any",
            Builtin::All => "all",
            Builtin::Chr => "chr",
            Builtin::Ord => "ord",
            Builtin::Divmod => "divmod",
            Builtin::Format => "format",
            Builtin::MathSqrt => "sqrt",
            Builtin::MathFloor => "floor",
            Builtin::MathCeil => "ceil",
            Builtin::MathLog => "log",
            Builtin::MathExp => "exp",
            Builtin::MathSin => "sin",
            Builtin::MathCos => "cos",
            Builtin::MathFabs => "fabs",
            Builtin::TimeTime => "time",
            Builtin::TimeSleep => "sleep",
            Builtin::TimeMonotonic => "monotonic",
        }
    }
}

const GLOBAL_FUNCTIONS: &[Builtin] = &[
    Builtin::Print,
    Builtin::Len,
    Builtin::Repr,
    Builtin::TypeOf,
    Builtin::Abs,
    Builtin::Min,
    Builtin::Max,
    Builtin::Sum,
    Builtin::Sorted,
    Builtin::Reversed,
    Builtin::Round,
    Builtin::Isinstance,
    Builtin::Enumerate,
    Builtin::Zip,
    Builtin::Any,
    Builtin::All,
    Builtin::Chr,
    Builtin::Ord,
    Builtin::Divmod,
    Builtin::Format,
];

/// Value of a name that is neither local nor global.
pub fn lookup_builtin(name: &str) -> Option<Value> {
    if let Some(b) = GLOBAL_FUNCTIONS.iter().find(|b| b.name() == name) {
        return Some(Value::Builtin(*b));
    }
    let kind = match name {
        "int" => TypeKind::Int,
        "float" => TypeKind::Float,
        "str" => TypeKind::Str,
        "bool" => TypeKind::Bool,
        "list" => TypeKind::List,
        "tuple" => TypeKind::Tuple,
        "dict" => TypeKind::Dict,
        "range" => TypeKind::Range,
        other => TypeKind::Exception(ExcKind::from_name(other)?),
    };
    Some(Value::Type(kind))
}

/// Attribute of an imported module.
pub fn module_attr(module: ModuleKind, attr: &str) -> Option<Value> {
    let builtin = |b| Some(Value::Builtin(b));
    match (module, attr) {
        (ModuleKind::Math, "pi") => Some(Value::Float(std::f64::consts::PI)),
        (ModuleKind::Math, "e") => Some(Value::Float(std::f64::consts::E)),
        (ModuleKind::Math, "tau") => Some(Value::Float(std::f64::consts::TAU)),
        (ModuleKind::Math, "inf") => Some(Value::Float(f64::INFINITY)),
        (ModuleKind::Math, "nan") => Some(Value::Float(f64::NAN)),
        (ModuleKind::Math, "sqrt") => builtin(Builtin::MathSqrt),
        (ModuleKind::Math, "floor") => builtin(Builtin::MathFloor),
        (ModuleKind::Math, "ceil") => builtin(Builtin::MathCeil),
        (ModuleKind::Math, "log") => builtin(Builtin::MathLog),
        (ModuleKind::Math, "exp") => builtin(Builtin::MathExp),
        (ModuleKind::Math, "sin") => builtin(Builtin::MathSin),
        (ModuleKind::Math, "cos") => builtin(Builtin::MathCos),
        (ModuleKind::Math, "fabs") => builtin(Builtin::MathFabs),
        (ModuleKind::Sys, "stdout") => Some(Value::Stream(StreamKind::Stdout)),
        (ModuleKind::Sys, "stderr") => Some(Value::Stream(StreamKind::Stderr)),
        (ModuleKind::Sys, "maxsize") => Some(Value::Int(i64::MAX)),
        (ModuleKind::Sys, "platform") => Some(Value::from(std::env::consts::OS)),
        (ModuleKind::Sys, "version") => Some(Value::from(env!("CARGO_PKG_VERSION"))),
        (ModuleKind::Time, "time") => builtin(Builtin::TimeTime),
        (ModuleKind::Time, "sleep") => builtin(Builtin::TimeSleep),
        (ModuleKind::Time, "monotonic") | (ModuleKind::Time, "perf_counter") => {
            builtin(Builtin::TimeMonotonic)
        }
        _ => None,
    }
}

/// Method names available on a receiver type.
pub fn method_names(kind: TypeKind) -> &'static [&'static str] {
    match kind {
        TypeKind::List => &[
            "append", "pop", "extend", "insert", "index", "count", "remove", "reverse", "sort",
            "copy", "clear",
        ],
        TypeKind::Dict => &[
            "get", "keys", "values", "items", "pop", "update", "setdefault", "copy", "clear",
        ],
        TypeKind::Str => &[
            "upper", "lower", "strip", "lstrip", "rstrip", "split", "join", "replace",
            "startswith", "endswith", "find", "count", "isdigit", "isalpha", "format",
            "splitlines", "title", "capitalize",
        ],
        TypeKind::Tuple => &["index", "count"],
        TypeKind::Stream => &["write", "flush"],
        _ => &[],
    }
}

/// Bind `receiver.name` if the method exists.
pub fn bind_method(receiver: &Value, name: &str) -> Option<Value> {
    let method = method_names(receiver.type_kind())
        .iter()
        .find(|m| **m == name)?;
    Some(Value::Method(Rc::new(BoundMethod {
        receiver: receiver.clone(),
        name: *method,
    })))
}

fn monotonic_origin() -> Instant {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    *ORIGIN.get_or_init(Instant::now)
}

// ---- argument helpers ----

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), Fault> {
    let given = args.len();
    if given >= min && given <= max {
        return Ok(());
    }
    let expected = if min == max {
        format!("exactly {}", min)
    } else if given < min {
        format!("at least {}", min)
    } else {
        format!("at most {}", max)
    };
    let noun = if (min == max && min == 1) || (given > max && max == 1) {
        "argument"
    } else {
        "arguments"
    };
    Err(Fault::type_error(format!(
        "{}() takes {} {} ({} given)",
        name, expected, noun, given
    )))
}

/// Remove and return the named keyword argument.
fn take_kwarg(kwargs: &mut Kwargs, name: &str) -> Option<Value> {
    let pos = kwargs.iter().position(|(k, _)| k == name)?;
    Some(kwargs.remove(pos).1)
}

fn no_more_kwargs(func: &str, kwargs: &Kwargs) -> Result<(), Fault> {
    match kwargs.first() {
        None => Ok(()),
        Some((k, _)) => Err(Fault::type_error(format!(
            "{}() got an unexpected keyword argument '{}'",
            func, k
        ))),
    }
}

fn int_arg(func: &str, value: &Value) -> Result<i64, Fault> {
    value.as_int().ok_or_else(|| {
        Fault::type_error(format!(
            "{}() argument must be int, not '{}'",
            func,
            value.type_name()
        ))
    })
}

fn float_arg(func: &str, value: &Value) -> Result<f64, Fault> {
    value.as_number().map(|n| n.as_f64()).ok_or_else(|| {
        Fault::type_error(format!(
            "must be real number, not {} (in {}())",
            value.type_name(),
            func
        ))
    })
}

fn str_arg<'a>(func: &str, value: &'a Value) -> Result<&'a str, Fault> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(Fault::type_error(format!(
            "{}() argument must be str, not {}",
            func,
            other.type_name()
        ))),
    }
}

fn domain_error() -> Fault {
    Fault::value_error("math domain error")
}

fn float_to_int(f: f64) -> Result<i64, Fault> {
    if f.is_nan() {
        return Err(Fault::value_error("cannot convert float NaN to integer"));
    }
    if f.is_infinite() || f >= i64::MAX as f64 || f < i64::MIN as f64 {
        return Err(Fault::new(
            ExcKind::OverflowError,
            "cannot convert float to integer (integers are 64-bit)",
        ));
    }
    Ok(f as i64)
}

/// Sort with a fallible comparator; the first comparison error wins.
fn sort_values(items: &mut [(Value, Value)], reverse: bool) -> Result<(), Fault> {
    let mut failure = None;
    items.sort_by(|(ka, _), (kb, _)| match ka.compare(kb) {
        Ok(ord) if reverse => ord.reverse(),
        Ok(ord) => ord,
        Err(e) => {
            failure.get_or_insert(e);
            Ordering::Equal
        }
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn sorted_with_key(
    interp: &mut Interpreter<'_>,
    items: Vec<Value>,
    key: Option<Value>,
    reverse: bool,
) -> Result<Vec<Value>, Fault> {
    let mut decorated = Vec::with_capacity(items.len());
    for item in items {
        let k = match &key {
            Some(f) if !matches!(f, Value::None) => interp.call_value(f, vec![item.clone()], Vec::new())?,
            _ => item.clone(),
        };
        decorated.push((k, item));
    }
    sort_values(&mut decorated, reverse)?;
    Ok(decorated.into_iter().map(|(_, v)| v).collect())
}

// ---- global functions ----

pub fn call_builtin(
    interp: &mut Interpreter<'_>,
    builtin: Builtin,
    args: Vec<Value>,
    mut kwargs: Kwargs,
) -> Result<Value, Fault> {
    let name = builtin.name();
    match builtin {
        Builtin::Print => {
            let sep = match take_kwarg(&mut kwargs, "sep") {
                None | Some(Value::None) => " ".to_string(),
                Some(v) => str_arg(name, &v)?.to_string(),
            };
            let end = match take_kwarg(&mut kwargs, "end") {
                None | Some(Value::None) => "\n".to_string(),
                Some(v) => str_arg(name, &v)?.to_string(),
            };
            let stream = match take_kwarg(&mut kwargs, "file") {
                None | Some(Value::None) => StreamKind::Stdout,
                Some(Value::Stream(kind)) => kind,
                Some(other) => {
                    return Err(Fault::new(
                        ExcKind::AttributeError,
                        format!("'{}' object has no attribute 'write'", other.type_name()),
                    ))
                }
            };
            take_kwarg(&mut kwargs, "flush");
            no_more_kwargs(name, &kwargs)?;

            let mut text = args.iter().map(Value::to_str).collect::<Vec<_>>().join(&sep);
            text.push_str(&end);
            interp.write_stream(stream, &text);
            Ok(Value::None)
        }
        Builtin::Len => {
            no_more_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            let len = match &args[0] {
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.borrow().len(),
                Value::Tuple(items) => items.len(),
                Value::Dict(d) => d.borrow().len(),
                Value::Range(r) => r.len(),
                other => {
                    return Err(Fault::type_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )))
                }
            };
            Ok(Value::Int(len as i64))
        }
        Builtin::Repr => {
            no_more_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            Ok(Value::from(args[0].repr()))
        }
        Builtin::TypeOf => {
            no_more_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            Ok(Value::Type(args[0].type_kind()))
        }
        Builtin::Abs => {
            no_more_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            match &args[0] {
                Value::Float(f) => Ok(Value::Float(f.abs())),
                v => match v.as_int() {
                    Some(i) => i
                        .checked_abs()
                        .map(Value::Int)
                        .ok_or_else(|| Fault::new(ExcKind::OverflowError, "integer overflow")),
                    None => Err(Fault::type_error(format!(
                        "bad operand type for abs(): '{}'",
                        v.type_name()
                    ))),
                },
            }
        }
        Builtin::Min | Builtin::Max => {
            let key = take_kwarg(&mut kwargs, "key");
            let default = take_kwarg(&mut kwargs, "default");
            no_more_kwargs(name, &kwargs)?;
            arity(name, &args, 1, usize::MAX)?;
            let items = if args.len() == 1 {
                args[0].iter_values()?
            } else {
                args
            };
            if items.is_empty() {
                return default.ok_or_else(|| {
                    Fault::value_error(format!("{}() arg is an empty sequence", name))
                });
            }
            let want = if builtin == Builtin::Min {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut best: Option<(Value, Value)> = None;
            for item in items {
                let k = match &key {
                    Some(f) if !matches!(f, Value::None) => {
                        interp.call_value(f, vec![item.clone()], Vec::new())?
                    }
                    _ => item.clone(),
                };
                let replace = match &best {
                    None => true,
                    Some((best_key, _)) => k.compare(best_key)? == want,
                };
                if replace {
                    best = Some((k, item));
                }
            }
            Ok(best.map(|(_, v)| v).unwrap_or(Value::None))
        }
        Builtin::Sum => {
            let start = take_kwarg(&mut kwargs, "start");
            no_more_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 2)?;
            let mut total = args
                .get(1)
                .cloned()
                .or(start)
                .unwrap_or(Value::Int(0));
            if matches!(total, Value::Str(_)) {
                return Err(Fault::type_error(
                    "sum() can't sum strings [use ''.join(seq) instead]",
                ));
            }
            for item in args[0].iter_values()? {
                total = ops::binary(BinOp::Add, &total, &item)?;
            }
            Ok(total)
        }
        Builtin::Sorted => {
            let key = take_kwarg(&mut kwargs, "key");
            let reverse = take_kwarg(&mut kwargs, "reverse")
                .map(|v| v.is_truthy())
                .unwrap_or(false);
            no_more_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            let items = args[0].iter_values()?;
            Ok(Value::list(sorted_with_key(interp, items, key, reverse)?))
        }
        Builtin::Reversed => {
            no_more_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            let mut items = args[0].iter_values()?;
            items.reverse();
            Ok(Value::list(items))
        }
        Builtin::Round => {
            no_more_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 2)?;
            let digits = match args.get(1) {
                None | Some(Value::None) => None,
                Some(v) => Some(int_arg(name, v)?),
            };
            match (&args[0], digits) {
                (Value::Float(f), None) => Ok(Value::Int(float_to_int(f.round_ties_even())?)),
                (Value::Float(f), Some(d)) => {
                    let factor = 10f64.powi(d.clamp(-308, 308) as i32);
                    Ok(Value::Float((f * factor).round_ties_even() / factor))
                }
                (v, _) => match v.as_int() {
                    Some(i) => Ok(Value::Int(i)),
                    None => Err(Fault::type_error(format!(
                        "type {} doesn't define __round__ method",
                        v.type_name()
                    ))),
                },
            }
        }
        Builtin::Isinstance => {
            no_more_kwargs(name, &kwargs)?;
            arity(name, &args, 2, 2)?;
            let actual = args[0].type_kind();
            let classes = match &args[1] {
                Value::Tuple(items) => items.to_vec(),
                other => vec![other.clone()],
            };
            for class in classes {
                match class {
                    Value::Type(kind) => {
                        if actual.is_subtype_of(kind) {
                            return Ok(Value::Bool(true));
                        }
                    }
                    other => {
                        return Err(Fault::type_error(format!(
                            "isinstance() arg 2 must be a type or tuple of types, not {}",
                            other.type_name()
                        )))
                    }
                }
            }
            Ok(Value::Bool(false))
        }
        Builtin::Enumerate => {
            let start = match take_kwarg(&mut kwargs, "start") {
                Some(v) => int_arg(name, &v)?,
                None => 0,
            };
            no_more_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 2)?;
            let start = match args.get(1) {
                Some(v) => int_arg(name, v)?,
                None => start,
            };
            let items = args[0].iter_values()?;
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                let index = start
                    .checked_add(i as i64)
                    .ok_or_else(|| Fault::new(ExcKind::OverflowError, "integer overflow"))?;
                out.push(Value::tuple(vec![Value::Int(index), item]));
            }
            Ok(Value::list(out))
        }
        Builtin::Zip => {
            no_more_kwargs(name, &kwargs)?;
            let columns = args
                .iter()
                .map(Value::iter_values)
                .collect::<Result<Vec<_>, _>>()?;
            let len = columns.iter().map(Vec::len).min().unwrap_or(0);
            let rows = (0..len)
                .map(|i| Value::tuple(columns.iter().map(|c| c[i].clone()).collect()))
                .collect();
            Ok(Value::list(rows))
        }
        Builtin::Any | Builtin::All => {
            no_more_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            let items = args[0].iter_values()?;
            let result = if builtin == Builtin::Any {
                items.iter().any(Value::is_truthy)
            } else {
                items.iter().all(Value::is_truthy)
            };
            Ok(Value::Bool(result))
        }
        Builtin::Chr => {
            no_more_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            let code = int_arg(name, &args[0])?;
            u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .map(|c| Value::from(c.to_string()))
                .ok_or_else(|| Fault::value_error("chr() arg not in range(0x110000)"))
        }
        Builtin::Ord => {
            no_more_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            let s = str_arg(name, &args[0])?;
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Int(c as i64)),
                _ => Err(Fault::type_error(format!(
                    "ord() expected a character, but string of length {} found",
                    s.chars().count()
                ))),
            }
        }
        Builtin::Divmod => {
            no_more_kwargs(name, &kwargs)?;
            arity(name, &args, 2, 2)?;
            let q = ops::binary(BinOp::FloorDiv, &args[0], &args[1])?;
            let r = ops::binary(BinOp::Mod, &args[0], &args[1])?;
            Ok(Value::tuple(vec![q, r]))
        }
        Builtin::Format => {
            no_more_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 2)?;
            let spec = match args.get(1) {
                Some(v) => str_arg(name, v)?.to_string(),
                None => String::new(),
            };
            Ok(Value::from(format_spec(&args[0], &spec)?))
        }
        Builtin::MathSqrt => {
            arity(name, &args, 1, 1)?;
            let x = float_arg(name, &args[0])?;
            if x < 0.0 {
                return Err(domain_error());
            }
            Ok(Value::Float(x.sqrt()))
        }
        Builtin::MathFloor | Builtin::MathCeil => {
            arity(name, &args, 1, 1)?;
            if let Some(i) = args[0].as_int() {
                return Ok(Value::Int(i));
            }
            let x = float_arg(name, &args[0])?;
            let rounded = if builtin == Builtin::MathFloor {
                x.floor()
            } else {
                x.ceil()
            };
            Ok(Value::Int(float_to_int(rounded)?))
        }
        Builtin::MathLog => {
            arity(name, &args, 1, 2)?;
            let x = float_arg(name, &args[0])?;
            if x <= 0.0 {
                return Err(domain_error());
            }
            match args.get(1) {
                None => Ok(Value::Float(x.ln())),
                Some(b) => {
                    let base = float_arg(name, b)?;
                    if base <= 0.0 || base == 1.0 {
                        return Err(domain_error());
                    }
                    Ok(Value::Float(x.ln() / base.ln()))
                }
            }
        }
        Builtin::MathExp => {
            arity(name, &args, 1, 1)?;
            let y = float_arg(name, &args[0])?.exp();
            if y.is_infinite() {
                return Err(Fault::new(ExcKind::OverflowError, "math range error"));
            }
            Ok(Value::Float(y))
        }
        Builtin::MathSin => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Float(float_arg(name, &args[0])?.sin()))
        }
        Builtin::MathCos => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Float(float_arg(name, &args[0])?.cos()))
        }
        Builtin::MathFabs => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Float(float_arg(name, &args[0])?.abs()))
        }
        Builtin::TimeTime => {
            arity(name, &args, 0, 0)?;
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default();
            Ok(Value::Float(now.as_secs_f64()))
        }
        Builtin::TimeSleep => {
            arity(name, &args, 1, 1)?;
            let secs = float_arg(name, &args[0])?;
            if !secs.is_finite() || secs < 0.0 {
                return Err(Fault::value_error("sleep length must be non-negative"));
            }
            std::thread::sleep(Duration::from_secs_f64(secs));
            Ok(Value::None)
        }
        Builtin::TimeMonotonic => {
            arity(name, &args, 0, 0)?;
            Ok(Value::Float(monotonic_origin().elapsed().as_secs_f64()))
        }
    }
}

// ---- type constructors ----

pub fn construct(kind: TypeKind, args: Vec<Value>, mut kwargs: Kwargs) -> Result<Value, Fault> {
    let name = kind.name();
    match kind {
        TypeKind::Int => {
            let base = take_kwarg(&mut kwargs, "base");
            no_more_kwargs(name, &kwargs)?;
            arity(name, &args, 0, 2)?;
            let base = match args.get(1).cloned().or(base) {
                Some(v) => Some(int_arg(name, &v)?),
                None => None,
            };
            match (args.first(), base) {
                (None, _) => Ok(Value::Int(0)),
                (Some(Value::Str(s)), base) => parse_int(s, base.unwrap_or(10)),
                (Some(_), Some(_)) => Err(Fault::type_error(
                    "int() can't convert non-string with explicit base",
                )),
                (Some(Value::Float(f)), None) => Ok(Value::Int(float_to_int(f.trunc())?)),
                (Some(v), None) => v.as_int().map(Value::Int).ok_or_else(|| {
                    Fault::type_error(format!(
                        "int() argument must be a string or a number, not '{}'",
                        v.type_name()
                    ))
                }),
            }
        }
        TypeKind::Float => {
            no_more_kwargs(name, &kwargs)?;
            arity(name, &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Float(0.0)),
                Some(Value::Str(s)) => parse_float(s),
                Some(v) => v
                    .as_number()
                    .map(|n| Value::Float(n.as_f64()))
                    .ok_or_else(|| {
                        Fault::type_error(format!(
                            "float() argument must be a string or a real number, not '{}'",
                            v.type_name()
                        ))
                    }),
            }
        }
        TypeKind::Str => {
            no_more_kwargs(name, &kwargs)?;
            arity(name, &args, 0, 1)?;
            Ok(Value::from(args.first().map(Value::to_str).unwrap_or_default()))
        }
        TypeKind::Bool => {
            no_more_kwargs(name, &kwargs)?;
            arity(name, &args, 0, 1)?;
            Ok(Value::Bool(args.first().is_some_and(Value::is_truthy)))
        }
        TypeKind::List => {
            no_more_kwargs(name, &kwargs)?;
            arity(name, &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::list(Vec::new())),
                Some(v) => Ok(Value::list(v.iter_values()?)),
            }
        }
        TypeKind::Tuple => {
            no_more_kwargs(name, &kwargs)?;
            arity(name, &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::tuple(Vec::new())),
                Some(Value::Tuple(t)) => Ok(Value::Tuple(Rc::clone(t))),
                Some(v) => Ok(Value::tuple(v.iter_values()?)),
            }
        }
        TypeKind::Dict => {
            arity(name, &args, 0, 1)?;
            let mut dict = Dict::new();
            if let Some(source) = args.first() {
                match source {
                    Value::Dict(d) => {
                        for (k, v) in d.borrow().iter() {
                            dict.insert(k.clone(), v.clone())?;
                        }
                    }
                    other => {
                        for (i, pair) in other.iter_values()?.into_iter().enumerate() {
                            let pair = pair.iter_values()?;
                            if pair.len() != 2 {
                                return Err(Fault::value_error(format!(
                                    "dictionary update sequence element #{} has length {}; 2 is required",
                                    i,
                                    pair.len()
                                )));
                            }
                            dict.insert(pair[0].clone(), pair[1].clone())?;
                        }
                    }
                }
            }
            for (k, v) in kwargs {
                dict.insert(Value::from(k), v)?;
            }
            Ok(Value::dict(dict))
        }
        TypeKind::Range => {
            no_more_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 3)?;
            let ints = args
                .iter()
                .map(|v| {
                    v.as_int().ok_or_else(|| {
                        Fault::type_error(format!(
                            "'{}' object cannot be interpreted as an integer",
                            v.type_name()
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let (start, stop, step) = match ints.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => return Err(Fault::type_error("range expected at most 3 arguments")),
            };
            if step == 0 {
                return Err(Fault::value_error("range() arg 3 must not be zero"));
            }
            Ok(Value::Range(RangeValue { start, stop, step }))
        }
        TypeKind::Exception(exc) => {
            no_more_kwargs(name, &kwargs)?;
            let message = match args.as_slice() {
                [] => String::new(),
                [single] => single.to_str(),
                many => Value::tuple(many.to_vec()).repr(),
            };
            Ok(exception_value(exc, message))
        }
        other => Err(Fault::type_error(format!(
            "cannot create '{}' instances",
            other.name()
        ))),
    }
}

fn parse_int(text: &str, base: i64) -> Result<Value, Fault> {
    let invalid = || {
        Fault::value_error(format!(
            "invalid literal for int() with base {}: {}",
            base,
            super::value::quote_str(text)
        ))
    };
    if !(base == 0 || (2..=36).contains(&base)) {
        return Err(Fault::value_error("int() base must be >= 2 and <= 36, or 0"));
    }
    let trimmed = text.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let (radix, digits) = match base {
        0 | 16 if digits.starts_with("0x") || digits.starts_with("0X") => (16, &digits[2..]),
        0 | 8 if digits.starts_with("0o") || digits.starts_with("0O") => (8, &digits[2..]),
        0 | 2 if digits.starts_with("0b") || digits.starts_with("0B") => (2, &digits[2..]),
        0 => (10, digits),
        b => (b as u32, digits),
    };
    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    if cleaned.is_empty() || digits.starts_with('_') || digits.ends_with('_') {
        return Err(invalid());
    }
    let magnitude = i128::from_str_radix(&cleaned, radix).map_err(|_| invalid())?;
    let value = if negative { -magnitude } else { magnitude };
    i64::try_from(value)
        .map(Value::Int)
        .map_err(|_| Fault::new(ExcKind::OverflowError, "int too large (integers are 64-bit)"))
}

fn parse_float(text: &str) -> Result<Value, Fault> {
    let trimmed = text.trim();
    let lowered = trimmed.to_ascii_lowercase();
    let parsed = match lowered.trim_start_matches(['+', '-']) {
        "inf" | "infinity" | "nan" => lowered.parse::<f64>().ok(),
        _ => trimmed.replace('_', "").parse::<f64>().ok(),
    };
    parsed.map(Value::Float).ok_or_else(|| {
        Fault::value_error(format!(
            "could not convert string to float: {}",
            super::value::quote_str(text)
        ))
    })
}

// ---- methods ----

pub fn call_method(
    interp: &mut Interpreter<'_>,
    method: &BoundMethod,
    args: Vec<Value>,
    kwargs: Kwargs,
) -> Result<Value, Fault> {
    match &method.receiver {
        Value::List(_) => list_method(interp, &method.receiver, method.name, args, kwargs),
        Value::Dict(_) => dict_method(&method.receiver, method.name, args, kwargs),
        Value::Str(s) => str_method(s, method.name, args, kwargs),
        Value::Tuple(items) => {
            no_more_kwargs(method.name, &kwargs)?;
            sequence_method(items, "tuple", method.name, args)
        }
        Value::Stream(kind) => {
            no_more_kwargs(method.name, &kwargs)?;
            match method.name {
                "write" => {
                    arity("write", &args, 1, 1)?;
                    let text = match &args[0] {
                        Value::Str(s) => s.to_string(),
                        other => {
                            return Err(Fault::type_error(format!(
                                "write() argument must be str, not {}",
                                other.type_name()
                            )))
                        }
                    };
                    interp.write_stream(*kind, &text);
                    Ok(Value::Int(text.chars().count() as i64))
                }
                _ => Ok(Value::None),
            }
        }
        other => Err(Fault::new(
            ExcKind::AttributeError,
            format!(
                "'{}' object has no attribute '{}'",
                other.type_name(),
                method.name
            ),
        )),
    }
}

fn sequence_method(items: &[Value], type_name: &str, name: &str, args: Vec<Value>) -> Result<Value, Fault> {
    match name {
        "index" => {
            arity(name, &args, 1, 1)?;
            position_of(items, &args[0])?
                .map(|i| Value::Int(i as i64))
                .ok_or_else(|| {
                    Fault::value_error(format!("{}.index(x): x not in {}", type_name, type_name))
                })
        }
        "count" => {
            arity(name, &args, 1, 1)?;
            let mut count = 0;
            for item in items {
                if item.equals(&args[0])? {
                    count += 1;
                }
            }
            Ok(Value::Int(count))
        }
        _ => Err(Fault::new(
            ExcKind::AttributeError,
            format!("'{}' object has no attribute '{}'", type_name, name),
        )),
    }
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let i = if index < 0 { index + len } else { index };
    (0..len).contains(&i).then_some(i as usize)
}

fn list_method(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    mut kwargs: Kwargs,
) -> Result<Value, Fault> {
    let Value::List(list) = receiver else {
        return Err(Fault::type_error("descriptor requires a 'list' object"));
    };
    if name == "sort" {
        let key = take_kwarg(&mut kwargs, "key");
        let reverse = take_kwarg(&mut kwargs, "reverse")
            .map(|v| v.is_truthy())
            .unwrap_or(false);
        no_more_kwargs(name, &kwargs)?;
        arity(name, &args, 0, 0)?;
        // Sort a snapshot so key functions may read the list.
        let items = list.borrow().clone();
        let sorted = sorted_with_key(interp, items, key, reverse)?;
        *list.borrow_mut() = sorted;
        return Ok(Value::None);
    }
    no_more_kwargs(name, &kwargs)?;

    match name {
        "append" => {
            arity(name, &args, 1, 1)?;
            let item = args.into_iter().next().unwrap_or(Value::None);
            list.borrow_mut().push(item);
            Ok(Value::None)
        }
        "extend" => {
            arity(name, &args, 1, 1)?;
            let items = args[0].iter_values()?;
            list.borrow_mut().extend(items);
            Ok(Value::None)
        }
        "insert" => {
            arity(name, &args, 2, 2)?;
            let index = int_arg(name, &args[0])?;
            let mut items = list.borrow_mut();
            let len = items.len() as i64;
            let at = if index < 0 { (index + len).max(0) } else { index.min(len) };
            items.insert(at as usize, args[1].clone());
            Ok(Value::None)
        }
        "pop" => {
            arity(name, &args, 0, 1)?;
            let mut items = list.borrow_mut();
            if items.is_empty() {
                return Err(Fault::new(ExcKind::IndexError, "pop from empty list"));
            }
            let index = match args.first() {
                Some(v) => int_arg(name, v)?,
                None => -1,
            };
            let at = normalize_index(index, items.len())
                .ok_or_else(|| Fault::new(ExcKind::IndexError, "pop index out of range"))?;
            Ok(items.remove(at))
        }
        "remove" => {
            arity(name, &args, 1, 1)?;
            let position = position_of(&list.borrow(), &args[0])?;
            match position {
                Some(at) => {
                    list.borrow_mut().remove(at);
                    Ok(Value::None)
                }
                None => Err(Fault::value_error("list.remove(x): x not in list")),
            }
        }
        "reverse" => {
            arity(name, &args, 0, 0)?;
            list.borrow_mut().reverse();
            Ok(Value::None)
        }
        "copy" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::list(list.borrow().clone()))
        }
        "clear" => {
            arity(name, &args, 0, 0)?;
            list.borrow_mut().clear();
            Ok(Value::None)
        }
        _ => {
            let items = list.borrow().clone();
            sequence_method(&items, "list", name, args)
        }
    }
}

fn dict_method(receiver: &Value, name: &str, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, Fault> {
    let Value::Dict(dict) = receiver else {
        return Err(Fault::type_error("descriptor requires a 'dict' object"));
    };
    if name != "update" {
        no_more_kwargs(name, &kwargs)?;
    }

    match name {
        "get" => {
            arity(name, &args, 1, 2)?;
            let found = dict.borrow().get(&args[0])?;
            Ok(found.unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
        "keys" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::list(dict.borrow().keys()))
        }
        "values" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::list(dict.borrow().values()))
        }
        "items" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::list(dict.borrow().items()))
        }
        "pop" => {
            arity(name, &args, 1, 2)?;
            let removed = dict.borrow_mut().remove(&args[0])?;
            match (removed, args.get(1)) {
                (Some(v), _) => Ok(v),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(Fault::new(ExcKind::KeyError, args[0].repr())),
            }
        }
        "setdefault" => {
            arity(name, &args, 1, 2)?;
            let existing = dict.borrow().get(&args[0])?;
            match existing {
                Some(v) => Ok(v),
                None => {
                    let default = args.get(1).cloned().unwrap_or(Value::None);
                    dict.borrow_mut().insert(args[0].clone(), default.clone())?;
                    Ok(default)
                }
            }
        }
        "update" => {
            arity(name, &args, 0, 1)?;
            let mut pairs: Vec<(Value, Value)> = Vec::new();
            if let Some(source) = args.first() {
                match source {
                    Value::Dict(other) => {
                        pairs.extend(other.borrow().iter().map(|(k, v)| (k.clone(), v.clone())))
                    }
                    other => {
                        for pair in other.iter_values()? {
                            let pair = pair.iter_values()?;
                            if pair.len() != 2 {
                                return Err(Fault::value_error(
                                    "dictionary update sequence element has wrong length",
                                ));
                            }
                            pairs.push((pair[0].clone(), pair[1].clone()));
                        }
                    }
                }
            }
            pairs.extend(kwargs.into_iter().map(|(k, v)| (Value::from(k), v)));
            let mut target = dict.borrow_mut();
            for (k, v) in pairs {
                target.insert(k, v)?;
            }
            Ok(Value::None)
        }
        "copy" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::dict(dict.borrow().clone()))
        }
        "clear" => {
            arity(name, &args, 0, 0)?;
            *dict.borrow_mut() = Dict::new();
            Ok(Value::None)
        }
        _ => Err(Fault::new(
            ExcKind::AttributeError,
            format!("'dict' object has no attribute '{}'", name),
        )),
    }
}

fn str_method(s: &str, name: &str, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, Fault> {
    if name == "format" {
        return Ok(Value::from(str_format(s, &args, &kwargs)?));
    }
    no_more_kwargs(name, &kwargs)?;

    let chars_arg = |args: &[Value]| -> Result<Option<String>, Fault> {
        match args.first() {
            None | Some(Value::None) => Ok(None),
            Some(v) => Ok(Some(str_arg(name, v)?.to_string())),
        }
    };

    match name {
        "upper" => Ok(Value::from(s.to_uppercase())),
        "lower" => Ok(Value::from(s.to_lowercase())),
        "title" => {
            let mut out = String::with_capacity(s.len());
            let mut at_word_start = true;
            for c in s.chars() {
                if c.is_alphabetic() {
                    if at_word_start {
                        out.extend(c.to_uppercase());
                    } else {
                        out.extend(c.to_lowercase());
                    }
                    at_word_start = false;
                } else {
                    out.push(c);
                    at_word_start = true;
                }
            }
            Ok(Value::from(out))
        }
        "capitalize" => {
            let mut chars = s.chars();
            let out = match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            };
            Ok(Value::from(out))
        }
        "strip" | "lstrip" | "rstrip" => {
            arity(name, &args, 0, 1)?;
            let set = chars_arg(&args)?;
            let matcher = |c: char| match &set {
                Some(set) => set.contains(c),
                None => c.is_whitespace(),
            };
            let out = match name {
                "strip" => s.trim_matches(matcher),
                "lstrip" => s.trim_start_matches(matcher),
                _ => s.trim_end_matches(matcher),
            };
            Ok(Value::from(out))
        }
        "split" => {
            arity(name, &args, 0, 2)?;
            let sep = chars_arg(&args)?;
            let maxsplit = match args.get(1) {
                Some(v) => int_arg(name, v)?,
                None => -1,
            };
            let parts: Vec<Value> = match sep {
                Some(sep) if sep.is_empty() => return Err(Fault::value_error("empty separator")),
                Some(sep) if maxsplit >= 0 => s
                    .splitn(maxsplit as usize + 1, sep.as_str())
                    .map(Value::from)
                    .collect(),
                Some(sep) => s.split(sep.as_str()).map(Value::from).collect(),
                None => split_whitespace(s, maxsplit),
            };
            Ok(Value::list(parts))
        }
        "splitlines" => Ok(Value::list(s.lines().map(Value::from).collect())),
        "join" => {
            arity(name, &args, 1, 1)?;
            let items = args[0].iter_values()?;
            let mut parts = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::Str(p) => parts.push(p.to_string()),
                    other => {
                        return Err(Fault::type_error(format!(
                            "sequence item {}: expected str instance, {} found",
                            i,
                            other.type_name()
                        )))
                    }
                }
            }
            Ok(Value::from(parts.join(s)))
        }
        "replace" => {
            arity(name, &args, 2, 3)?;
            let old = str_arg(name, &args[0])?;
            let new = str_arg(name, &args[1])?;
            let out = match args.get(2) {
                Some(count) => {
                    let count = int_arg(name, count)?;
                    if count < 0 {
                        s.replace(old, new)
                    } else {
                        s.replacen(old, new, count as usize)
                    }
                }
                None => s.replace(old, new),
            };
            Ok(Value::from(out))
        }
        "startswith" | "endswith" => {
            arity(name, &args, 1, 1)?;
            let candidates = match &args[0] {
                Value::Tuple(items) => items.to_vec(),
                other => vec![other.clone()],
            };
            for candidate in &candidates {
                let affix = str_arg(name, candidate)?;
                let hit = if name == "startswith" {
                    s.starts_with(affix)
                } else {
                    s.ends_with(affix)
                };
                if hit {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "find" => {
            arity(name, &args, 1, 1)?;
            let needle = str_arg(name, &args[0])?;
            Ok(Value::Int(match s.find(needle) {
                Some(byte) => s[..byte].chars().count() as i64,
                None => -1,
            }))
        }
        "count" => {
            arity(name, &args, 1, 1)?;
            let needle = str_arg(name, &args[0])?;
            let count = if needle.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(needle).count()
            };
            Ok(Value::Int(count as i64))
        }
        "isdigit" => Ok(Value::Bool(
            !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()),
        )),
        "isalpha" => Ok(Value::Bool(!s.is_empty() && s.chars().all(char::is_alphabetic))),
        _ => Err(Fault::new(
            ExcKind::AttributeError,
            format!("'str' object has no attribute '{}'", name),
        )),
    }
}

fn split_whitespace(s: &str, maxsplit: i64) -> Vec<Value> {
    if maxsplit < 0 {
        return s.split_whitespace().map(Value::from).collect();
    }
    let mut parts = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if parts.len() as i64 == maxsplit {
            parts.push(Value::from(rest));
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                parts.push(Value::from(&rest[..end]));
                rest = rest[end..].trim_start();
            }
            None => {
                parts.push(Value::from(rest));
                break;
            }
        }
    }
    parts
}

/// `"{} and {name:>5}".format(...)`
fn str_format(template: &str, args: &[Value], kwargs: &Kwargs) -> Result<String, Fault> {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    let mut auto_index = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(Fault::value_error("Single '}' encountered in format string")),
            '{' => {
                let mut field = String::new();
                let mut closed = false;
                for f in chars.by_ref() {
                    if f == '}' {
                        closed = true;
                        break;
                    }
                    field.push(f);
                }
                if !closed {
                    return Err(Fault::value_error("Single '{' encountered in format string"));
                }
                let (name, spec) = match field.split_once(':') {
                    Some((n, s)) => (n.to_string(), s.to_string()),
                    None => (field.clone(), String::new()),
                };
                let (name, repr) = match name.strip_suffix("!r") {
                    Some(n) => (n.to_string(), true),
                    None => (name.strip_suffix("!s").unwrap_or(&name).to_string(), false),
                };
                let value = if name.is_empty() {
                    let v = args.get(auto_index).cloned().ok_or_else(|| {
                        Fault::new(
                            ExcKind::IndexError,
                            format!("Replacement index {} out of range for positional args tuple", auto_index),
                        )
                    })?;
                    auto_index += 1;
                    v
                } else if let Ok(i) = name.parse::<usize>() {
                    args.get(i).cloned().ok_or_else(|| {
                        Fault::new(
                            ExcKind::IndexError,
                            format!("Replacement index {} out of range for positional args tuple", i),
                        )
                    })?
                } else {
                    kwargs
                        .iter()
                        .find(|(k, _)| *k == name)
                        .map(|(_, v)| v.clone())
                        .ok_or_else(|| Fault::new(ExcKind::KeyError, super::value::quote_str(&name)))?
                };
                let value = if repr { Value::from(value.repr()) } else { value };
                out.push_str(&format_spec(&value, &spec)?);
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_builtin() {
        assert!(matches!(lookup_builtin("print"), Some(Value::Builtin(Builtin::Print))));
        assert!(matches!(lookup_builtin("int"), Some(Value::Type(TypeKind::Int))));
        assert!(matches!(
            lookup_builtin("KeyError"),
            Some(Value::Type(TypeKind::Exception(ExcKind::KeyError)))
        ));
        assert!(lookup_builtin("nope").is_none());
    }

    #[test]
    fn test_int_parsing() {
        assert_eq!(parse_int(" 42 ", 10).unwrap().as_int(), Some(42));
        assert_eq!(parse_int("-0x1f", 0).unwrap().as_int(), Some(-31));
        assert_eq!(parse_int("ff", 16).unwrap().as_int(), Some(255));
        let err = parse_int("abc", 10).unwrap_err();
        assert_eq!(err.message(), "invalid literal for int() with base 10: 'abc'");
    }

    #[test]
    fn test_float_parsing() {
        assert!(matches!(parse_float("2.5"), Ok(Value::Float(f)) if f == 2.5));
        assert!(matches!(parse_float("-inf"), Ok(Value::Float(f)) if f == f64::NEG_INFINITY));
        assert!(parse_float("x1").is_err());
    }

    #[test]
    fn test_constructors() {
        let v = construct(TypeKind::Int, vec![Value::Float(-2.7)], Vec::new()).unwrap();
        assert_eq!(v.as_int(), Some(-2));

        let v = construct(
            TypeKind::Range,
            vec![Value::Int(1), Value::Int(10), Value::Int(0)],
            Vec::new(),
        );
        assert!(v.unwrap_err().message().contains("must not be zero"));

        let v = construct(
            TypeKind::Exception(ExcKind::ValueError),
            vec![Value::from("bad")],
            Vec::new(),
        )
        .unwrap();
        assert_eq!(v.repr(), "ValueError('bad')");
    }

    #[test]
    fn test_dict_constructor_with_kwargs() {
        let v = construct(
            TypeKind::Dict,
            Vec::new(),
            vec![("a".to_string(), Value::Int(1))],
        )
        .unwrap();
        assert_eq!(v.repr(), "{'a': 1}");
    }

    #[test]
    fn test_str_methods() {
        let call = |s: &str, name: &str, args: Vec<Value>| str_method(s, name, args, Vec::new()).unwrap();
        assert_eq!(call("a,b,,c", "split", vec![Value::from(",")]).repr(), "['a', 'b', '', 'c']");
        assert_eq!(call("  a  b ", "split", vec![]).repr(), "['a', 'b']");
        assert_eq!(
            call("-", "join", vec![Value::list(vec![Value::from("x"), Value::from("y")])]).to_str(),
            "x-y"
        );
        assert_eq!(call("xxhixx", "strip", vec![Value::from("x")]).to_str(), "hi");
        assert_eq!(call("hello world", "title", vec![]).to_str(), "Hello World");
        assert_eq!(call("héllo", "find", vec![Value::from("l")]).as_int(), Some(2));
    }

    #[test]
    fn test_join_rejects_non_strings() {
        let err = str_method(",", "join", vec![Value::list(vec![Value::Int(1)])], Vec::new()).unwrap_err();
        assert!(err.message().contains("expected str instance, int found"));
    }

    #[test]
    fn test_str_format() {
        let out = str_format(
            "{} + {1} = {total:>4}",
            &[Value::Int(1), Value::Int(2)],
            &vec![("total".to_string(), Value::Int(3))],
        )
        .unwrap();
        assert_eq!(out, "1 + 2 =    3");
    }

    #[test]
    fn test_dict_methods() {
        let d = Value::dict(Dict::new());
        dict_method(&d, "setdefault", vec![Value::from("k"), Value::Int(1)], Vec::new()).unwrap();
        let got = dict_method(&d, "get", vec![Value::from("k")], Vec::new()).unwrap();
        assert_eq!(got.as_int(), Some(1));
        let err = dict_method(&d, "pop", vec![Value::from("missing")], Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ExcKind::KeyError);
        assert_eq!(err.message(), "'missing'");
    }

    #[test]
    fn test_bind_method_unknown_name() {
        assert!(bind_method(&Value::list(vec![]), "append").is_some());
        assert!(bind_method(&Value::list(vec![]), "push").is_none());
        assert!(bind_method(&Value::Int(1), "append").is_none());
    }
}
