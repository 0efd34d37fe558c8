//! Operators and subscripting.
//!
//! Integers are 64-bit; results that do not fit raise `OverflowError`
//! rather than wrapping.

use super::ast::{BinOp, CmpOp, UnaryOp};
use super::error::{ExcKind, Fault};
use super::value::{position_of, Number, RangeValue, Value};
use std::cmp::Ordering;

/// Upper bound on the length of sequences built by `*` repetition.
const MAX_REPEAT_LEN: usize = 64 * 1024 * 1024;

fn overflow() -> Fault {
    Fault::new(
        ExcKind::OverflowError,
        "integer overflow (integers are 64-bit)",
    )
}

fn zero_division(message: &str) -> Fault {
    Fault::new(ExcKind::ZeroDivisionError, message)
}

fn unsupported(op: BinOp, a: &Value, b: &Value) -> Fault {
    Fault::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        a.type_name(),
        b.type_name()
    ))
}

pub fn binary(op: BinOp, a: &Value, b: &Value) -> Result<Value, Fault> {
    if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
        return numeric(op, x, y);
    }

    match (op, a, b) {
        (BinOp::Add, Value::Str(x), Value::Str(y)) => {
            let mut s = String::with_capacity(x.len() + y.len());
            s.push_str(x);
            s.push_str(y);
            Ok(Value::from(s))
        }
        (BinOp::Add, Value::List(x), Value::List(y)) => {
            let mut items = x.borrow().clone();
            items.extend(y.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (BinOp::Add, Value::Tuple(x), Value::Tuple(y)) => {
            Ok(Value::tuple(x.iter().chain(y.iter()).cloned().collect()))
        }
        (BinOp::Mul, seq, n) | (BinOp::Mul, n, seq)
            if matches!(seq, Value::Str(_) | Value::List(_) | Value::Tuple(_))
                && n.as_int().is_some() =>
        {
            repeat(seq, n.as_int().unwrap_or(0))
        }
        (BinOp::Mod, Value::Str(_), _) => Err(Fault::type_error(
            "printf-style '%' formatting is not supported; use f-strings or str.format",
        )),
        _ => Err(unsupported(op, a, b)),
    }
}

fn repeat(seq: &Value, times: i64) -> Result<Value, Fault> {
    let times = times.max(0) as usize;
    let unit_len = match seq {
        Value::Str(s) => s.len(),
        Value::List(items) => items.borrow().len(),
        Value::Tuple(items) => items.len(),
        _ => 0,
    };
    if unit_len.saturating_mul(times) > MAX_REPEAT_LEN {
        return Err(Fault::new(ExcKind::OverflowError, "repeated sequence is too long"));
    }
    Ok(match seq {
        Value::Str(s) => Value::from(s.repeat(times)),
        Value::List(items) => {
            let items = items.borrow();
            let mut out = Vec::with_capacity(items.len() * times);
            for _ in 0..times {
                out.extend(items.iter().cloned());
            }
            Value::list(out)
        }
        Value::Tuple(items) => {
            let mut out = Vec::with_capacity(items.len() * times);
            for _ in 0..times {
                out.extend(items.iter().cloned());
            }
            Value::tuple(out)
        }
        other => other.clone(),
    })
}

fn numeric(op: BinOp, x: Number, y: Number) -> Result<Value, Fault> {
    if let (Number::Int(a), Number::Int(b)) = (x, y) {
        return integer(op, a, b);
    }
    let (a, b) = (x.as_f64(), y.as_f64());
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(zero_division("float division by zero"));
            }
            a / b
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(zero_division("float floor division by zero"));
            }
            (a / b).floor()
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(zero_division("float modulo"));
            }
            python_fmod(a, b)
        }
        BinOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(zero_division("0.0 cannot be raised to a negative power"));
            }
            let r = a.powf(b);
            if r.is_nan() && !a.is_nan() && !b.is_nan() {
                return Err(Fault::value_error(
                    "negative number cannot be raised to a fractional power",
                ));
            }
            if r.is_infinite() && a.is_finite() && b.is_finite() {
                return Err(Fault::new(ExcKind::OverflowError, "numerical result out of range"));
            }
            r
        }
    };
    Ok(Value::Float(result))
}

fn python_fmod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}

fn integer(op: BinOp, a: i64, b: i64) -> Result<Value, Fault> {
    let result = match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div => {
            if b == 0 {
                return Err(zero_division("division by zero"));
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            let q = a.checked_div(b).ok_or_else(overflow)?;
            Some(if (a % b != 0) && ((a < 0) != (b < 0)) { q - 1 } else { q })
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            let r = a.checked_rem(b).ok_or_else(overflow)?;
            Some(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
        }
        BinOp::Pow => {
            if b < 0 {
                if a == 0 {
                    return Err(zero_division("0.0 cannot be raised to a negative power"));
                }
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            u32::try_from(b).ok().and_then(|e| a.checked_pow(e))
        }
    };
    result.map(Value::Int).ok_or_else(overflow)
}

pub fn unary(op: UnaryOp, v: &Value) -> Result<Value, Fault> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
        UnaryOp::Neg => match v.as_number() {
            Some(Number::Int(i)) => i.checked_neg().map(Value::Int).ok_or_else(overflow),
            Some(Number::Float(f)) => Ok(Value::Float(-f)),
            None => Err(Fault::type_error(format!(
                "bad operand type for unary -: '{}'",
                v.type_name()
            ))),
        },
        UnaryOp::Pos => match v.as_number() {
            Some(Number::Int(i)) => Ok(Value::Int(i)),
            Some(Number::Float(f)) => Ok(Value::Float(f)),
            None => Err(Fault::type_error(format!(
                "bad operand type for unary +: '{}'",
                v.type_name()
            ))),
        },
    }
}

pub fn compare(op: CmpOp, a: &Value, b: &Value) -> Result<bool, Fault> {
    let ordered = |want: fn(Ordering) -> bool| -> Result<bool, Fault> {
        match a.compare(b) {
            Ok(ord) => Ok(want(ord)),
            Err(e) if e.kind() == ExcKind::ValueError => Ok(false),
            Err(e) if e.kind() == ExcKind::RecursionError => Err(e),
            Err(_) => Err(Fault::type_error(format!(
                "'{}' not supported between instances of '{}' and '{}'",
                cmp_symbol(op),
                a.type_name(),
                b.type_name()
            ))),
        }
    };
    match op {
        CmpOp::Eq => a.equals(b),
        CmpOp::NotEq => Ok(!a.equals(b)?),
        CmpOp::Lt => ordered(Ordering::is_lt),
        CmpOp::LtE => ordered(Ordering::is_le),
        CmpOp::Gt => ordered(Ordering::is_gt),
        CmpOp::GtE => ordered(Ordering::is_ge),
        CmpOp::In => contains(b, a),
        CmpOp::NotIn => contains(b, a).map(|r| !r),
        CmpOp::Is => Ok(a.is_same(b)),
        CmpOp::IsNot => Ok(!a.is_same(b)),
    }
}

fn cmp_symbol(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Lt => "<",
        CmpOp::LtE => "<=",
        CmpOp::Gt => ">",
        CmpOp::GtE => ">=",
        _ => "==",
    }
}

/// `item in container`
pub fn contains(container: &Value, item: &Value) -> Result<bool, Fault> {
    match container {
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(&**needle)),
            other => Err(Fault::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => Ok(position_of(&items.borrow(), item)?.is_some()),
        Value::Tuple(items) => Ok(position_of(items, item)?.is_some()),
        Value::Dict(d) => d.borrow().contains_key(item),
        Value::Range(r) => Ok(match item.as_number() {
            Some(Number::Int(i)) => r.contains(i),
            Some(Number::Float(f)) => f.fract() == 0.0 && r.contains(f as i64),
            None => false,
        }),
        other => Err(Fault::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn index_error(type_name: &str) -> Fault {
    Fault::new(
        ExcKind::IndexError,
        format!("{} index out of range", type_name),
    )
}

fn resolve_index(index: &Value, len: usize, type_name: &str) -> Result<usize, Fault> {
    let i = index.as_int().ok_or_else(|| {
        Fault::type_error(format!(
            "{} indices must be integers or slices, not {}",
            type_name,
            index.type_name()
        ))
    })?;
    let len = len as i64;
    let i = if i < 0 { i + len } else { i };
    if (0..len).contains(&i) {
        Ok(i as usize)
    } else {
        Err(index_error(type_name))
    }
}

/// Evaluated slice bounds; `None` means omitted.
#[derive(Debug, Clone, Copy)]
pub struct SliceBounds {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl SliceBounds {
    /// First index, step and item count selected from `len` items.
    ///
    /// Computed in `i128` so extreme steps cannot overflow.
    fn resolve(&self, len: usize) -> Result<(i128, i128, usize), Fault> {
        let len = len as i128;
        let step = self.step.unwrap_or(1) as i128;
        if step == 0 {
            return Err(Fault::value_error("slice step cannot be zero"));
        }
        let clamp = |v: i128, low: i128, high: i128| v.max(low).min(high);
        let adjust = |v: i64| {
            let v = v as i128;
            if v < 0 { v + len } else { v }
        };

        let (start, span) = if step > 0 {
            let start = clamp(self.start.map(adjust).unwrap_or(0), 0, len);
            let stop = clamp(self.stop.map(adjust).unwrap_or(len), 0, len);
            (start, stop - start)
        } else {
            let start = clamp(self.start.map(adjust).unwrap_or(len - 1), -1, len - 1);
            let stop = clamp(self.stop.map(adjust).unwrap_or(-1), -1, len - 1);
            (start, start - stop)
        };
        let count = if span > 0 {
            (span - 1) / step.abs() + 1
        } else {
            0
        };
        Ok((start, step, count as usize))
    }

    /// Concrete indices selected from a sequence of `len` items.
    pub fn indices(&self, len: usize) -> Result<Vec<usize>, Fault> {
        let (start, step, count) = self.resolve(len)?;
        Ok((0..count)
            .map(|k| (start + step * k as i128) as usize)
            .collect())
    }
}

/// Slice a range without materialising it.
fn slice_range(r: &RangeValue, bounds: SliceBounds) -> Result<RangeValue, Fault> {
    let (first, step, count) = bounds.resolve(r.len())?;
    if count == 0 {
        return Ok(RangeValue {
            start: 0,
            stop: 0,
            step: 1,
        });
    }
    let overflow = || Fault::new(ExcKind::OverflowError, "range slice out of bounds");
    let start = r.start as i128 + r.step as i128 * first;
    let step = r.step as i128 * step;
    let last = start + step * (count as i128 - 1);
    let stop = last + step.signum();
    Ok(RangeValue {
        start: i64::try_from(start).map_err(|_| overflow())?,
        stop: i64::try_from(stop).map_err(|_| overflow())?,
        step: i64::try_from(step).map_err(|_| overflow())?,
    })
}

pub fn get_slice(value: &Value, bounds: SliceBounds) -> Result<Value, Fault> {
    match value {
        Value::List(items) => {
            let items = items.borrow();
            let picked = bounds.indices(items.len())?;
            Ok(Value::list(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Tuple(items) => {
            let picked = bounds.indices(items.len())?;
            Ok(Value::tuple(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let picked = bounds.indices(chars.len())?;
            Ok(Value::from(picked.into_iter().map(|i| chars[i]).collect::<String>()))
        }
        Value::Range(r) => slice_range(r, bounds).map(Value::Range),
        other => Err(Fault::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// `value[index]`
pub fn get_item(value: &Value, index: &Value) -> Result<Value, Fault> {
    match value {
        Value::List(items) => {
            let items = items.borrow();
            let i = resolve_index(index, items.len(), "list")?;
            Ok(items[i].clone())
        }
        Value::Tuple(items) => {
            let i = resolve_index(index, items.len(), "tuple")?;
            Ok(items[i].clone())
        }
        Value::Str(s) => {
            let len = s.chars().count();
            let i = resolve_index(index, len, "string")?;
            Ok(s.chars().nth(i).map(|c| Value::from(c.to_string())).unwrap_or(Value::None))
        }
        Value::Range(r) => {
            let i = resolve_index(index, r.len(), "range object")?;
            r.get(i).map(Value::Int).ok_or_else(|| index_error("range object"))
        }
        Value::Dict(d) => {
            let found = d.borrow().get(index)?;
            found.ok_or_else(|| Fault::new(ExcKind::KeyError, index.repr()))
        }
        Value::Type(kind) => Err(Fault::type_error(format!(
            "type '{}' is not subscriptable",
            kind.name()
        ))),
        other => Err(Fault::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// `value[index] = item`
pub fn set_item(value: &Value, index: &Value, item: Value) -> Result<(), Fault> {
    match value {
        Value::List(items) => {
            let len = items.borrow().len();
            let i = resolve_index(index, len, "list")?;
            items.borrow_mut()[i] = item;
            Ok(())
        }
        Value::Dict(d) => d.borrow_mut().insert(index.clone(), item),
        other => Err(Fault::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

/// `value[a:b] = items`; only contiguous slices may change length.
pub fn set_slice(value: &Value, bounds: SliceBounds, item: &Value) -> Result<(), Fault> {
    let Value::List(list) = value else {
        return Err(Fault::type_error(format!(
            "'{}' object does not support item assignment",
            value.type_name()
        )));
    };
    let replacement = item.iter_values()?;
    let len = list.borrow().len();
    let picked = bounds.indices(len)?;

    if bounds.step.unwrap_or(1) == 1 {
        let start = match picked.first() {
            Some(&s) => s,
            None => {
                let adjust = |v: i64| if v < 0 { v + len as i64 } else { v };
                bounds.start.map(adjust).unwrap_or(0).clamp(0, len as i64) as usize
            }
        };
        let end = start + picked.len();
        list.borrow_mut().splice(start..end, replacement);
        return Ok(());
    }

    if picked.len() != replacement.len() {
        return Err(Fault::value_error(format!(
            "attempt to assign sequence of size {} to extended slice of size {}",
            replacement.len(),
            picked.len()
        )));
    }
    let mut items = list.borrow_mut();
    for (i, v) in picked.into_iter().zip(replacement) {
        items[i] = v;
    }
    Ok(())
}

/// `del value[index]`
pub fn del_item(value: &Value, index: &Value) -> Result<(), Fault> {
    match value {
        Value::List(items) => {
            let len = items.borrow().len();
            let i = resolve_index(index, len, "list")?;
            items.borrow_mut().remove(i);
            Ok(())
        }
        Value::Dict(d) => match d.borrow_mut().remove(index)? {
            Some(_) => Ok(()),
            None => Err(Fault::new(ExcKind::KeyError, index.repr())),
        },
        other => Err(Fault::type_error(format!(
            "'{}' object does not support item deletion",
            other.type_name()
        ))),
    }
}

pub fn del_slice(value: &Value, bounds: SliceBounds) -> Result<(), Fault> {
    let Value::List(list) = value else {
        return Err(Fault::type_error(format!(
            "'{}' object does not support item deletion",
            value.type_name()
        )));
    };
    let len = list.borrow().len();
    let mut picked = bounds.indices(len)?;
    picked.sort_unstable();
    let mut items = list.borrow_mut();
    for i in picked.into_iter().rev() {
        items.remove(i);
    }
    Ok(())
}

pub fn attr_error(value: &Value, name: &str) -> Fault {
    Fault::new(
        ExcKind::AttributeError,
        format!("'{}' object has no attribute '{}'", value.type_name(), name),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> Value {
        Value::Int(i)
    }

    #[test]
    fn test_floor_division_and_modulo_follow_divisor_sign() {
        assert_eq!(binary(BinOp::FloorDiv, &int(-7), &int(2)).unwrap().as_int(), Some(-4));
        assert_eq!(binary(BinOp::Mod, &int(-7), &int(2)).unwrap().as_int(), Some(1));
        assert_eq!(binary(BinOp::Mod, &int(7), &int(-2)).unwrap().as_int(), Some(-1));
        assert!(matches!(
            binary(BinOp::Mod, &Value::Float(-7.0), &int(2)).unwrap(),
            Value::Float(f) if f == 1.0
        ));
    }

    #[test]
    fn test_true_division_is_float() {
        assert!(matches!(binary(BinOp::Div, &int(7), &int(2)).unwrap(), Value::Float(f) if f == 3.5));
    }

    #[test]
    fn test_division_by_zero() {
        let err = binary(BinOp::Div, &int(1), &int(0)).unwrap_err();
        assert_eq!(err.kind(), ExcKind::ZeroDivisionError);
        assert_eq!(err.message(), "division by zero");
    }

    #[test]
    fn test_overflow_is_reported() {
        let err = binary(BinOp::Mul, &int(i64::MAX), &int(2)).unwrap_err();
        assert_eq!(err.kind(), ExcKind::OverflowError);
        let err = binary(BinOp::Pow, &int(10), &int(40)).unwrap_err();
        assert_eq!(err.kind(), ExcKind::OverflowError);
    }

    #[test]
    fn test_power() {
        assert_eq!(binary(BinOp::Pow, &int(2), &int(10)).unwrap().as_int(), Some(1024));
        assert!(matches!(binary(BinOp::Pow, &int(2), &int(-1)).unwrap(), Value::Float(f) if f == 0.5));
    }

    #[test]
    fn test_sequence_ops() {
        let s = binary(BinOp::Mul, &Value::from("ab"), &int(3)).unwrap();
        assert_eq!(s.to_str(), "ababab");
        let l = binary(BinOp::Add, &Value::list(vec![int(1)]), &Value::list(vec![int(2)])).unwrap();
        assert_eq!(l.repr(), "[1, 2]");
        let err = binary(BinOp::Add, &Value::from("a"), &int(1)).unwrap_err();
        assert!(err.message().contains("unsupported operand type(s) for +: 'str' and 'int'"));
    }

    #[test]
    fn test_comparisons() {
        assert!(compare(CmpOp::Lt, &int(1), &Value::Float(1.5)).unwrap());
        assert!(compare(CmpOp::In, &Value::from("ell"), &Value::from("hello")).unwrap());
        assert!(compare(CmpOp::NotIn, &int(5), &Value::list(vec![int(1)])).unwrap());
        assert!(compare(CmpOp::Lt, &int(1), &Value::from("x")).is_err());
    }

    #[test]
    fn test_indexing() {
        let list = Value::list(vec![int(1), int(2), int(3)]);
        assert_eq!(get_item(&list, &int(-1)).unwrap().as_int(), Some(3));
        let err = get_item(&list, &int(3)).unwrap_err();
        assert_eq!(err.message(), "list index out of range");
        assert_eq!(get_item(&Value::from("héllo"), &int(1)).unwrap().to_str(), "é");
    }

    #[test]
    fn test_slicing() {
        let list = Value::list((0..6).map(int).collect());
        let bounds = |start, stop, step| SliceBounds { start, stop, step };
        assert_eq!(get_slice(&list, bounds(Some(1), Some(4), None)).unwrap().repr(), "[1, 2, 3]");
        assert_eq!(get_slice(&list, bounds(None, None, Some(-2))).unwrap().repr(), "[5, 3, 1]");
        assert_eq!(get_slice(&list, bounds(Some(-2), None, None)).unwrap().repr(), "[4, 5]");
        assert_eq!(get_slice(&Value::from("abc"), bounds(None, None, Some(-1))).unwrap().to_str(), "cba");
    }

    #[test]
    fn test_extreme_slice_steps() {
        let bounds = |start, stop, step| SliceBounds { start, stop, step };
        let abc = Value::from("abc");
        assert_eq!(get_slice(&abc, bounds(Some(1), None, Some(i64::MAX))).unwrap().to_str(), "b");
        assert_eq!(get_slice(&abc, bounds(None, None, Some(i64::MIN))).unwrap().to_str(), "c");
        assert_eq!(get_slice(&abc, bounds(Some(i64::MIN), Some(i64::MAX), None)).unwrap().to_str(), "abc");
        let list = Value::list((0..3).map(int).collect());
        del_slice(&list, bounds(None, None, Some(i64::MAX))).unwrap();
        assert_eq!(list.repr(), "[1, 2]");
    }

    #[test]
    fn test_range_slice_is_arithmetic() {
        let bounds = |start, stop, step| SliceBounds { start, stop, step };
        let huge = Value::Range(RangeValue { start: 0, stop: 1_000_000_000_000_000, step: 1 });
        match get_slice(&huge, bounds(Some(1), None, None)).unwrap() {
            Value::Range(r) => {
                assert_eq!(r.start, 1);
                assert_eq!(r.len(), 999_999_999_999_999);
            }
            other => panic!("unexpected slice {:?}", other),
        }

        let ten = Value::Range(RangeValue { start: 0, stop: 10, step: 1 });
        let reversed = get_slice(&ten, bounds(None, None, Some(-2))).unwrap();
        let picked: Vec<_> = reversed.iter_values().unwrap().iter().filter_map(Value::as_int).collect();
        assert_eq!(picked, vec![9, 7, 5, 3, 1]);

        let empty = get_slice(&ten, bounds(Some(20), None, None)).unwrap();
        assert!(matches!(empty, Value::Range(r) if r.is_empty()));
    }

    #[test]
    fn test_slice_assignment_and_deletion() {
        let list = Value::list((0..5).map(int).collect());
        let whole = SliceBounds { start: Some(1), stop: Some(3), step: None };
        set_slice(&list, whole, &Value::list(vec![int(9)])).unwrap();
        assert_eq!(list.repr(), "[0, 9, 3, 4]");
        del_slice(&list, SliceBounds { start: None, stop: None, step: Some(2) }).unwrap();
        assert_eq!(list.repr(), "[9, 4]");
    }

    #[test]
    fn test_dict_missing_key() {
        let d = Value::dict(super::super::value::Dict::new());
        let err = get_item(&d, &Value::from("a")).unwrap_err();
        assert_eq!(err.kind(), ExcKind::KeyError);
        assert_eq!(err.message(), "'a'");
    }
}
