//! Format-spec mini-language used by f-strings, `format()` and `str.format`.
//!
//! ```text
//! [[fill]align][sign][0][width][,|_][.precision][type]
//! ```

use super::error::Fault;
use super::value::{format_float, Value};

#[derive(Debug, Default, PartialEq)]
struct Spec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    zero: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

fn parse(spec: &str) -> Result<Spec, Fault> {
    let chars: Vec<char> = spec.chars().collect();
    let mut out = Spec::default();
    let mut i = 0;
    let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');

    if chars.len() >= 2 && is_align(chars[1]) {
        out.fill = Some(chars[0]);
        out.align = Some(chars[1]);
        i = 2;
    } else if chars.first().copied().is_some_and(is_align) {
        out.align = Some(chars[0]);
        i = 1;
    }

    if let Some(&c) = chars.get(i) {
        if matches!(c, '+' | '-' | ' ') {
            out.sign = Some(c);
            i += 1;
        }
    }
    if chars.get(i) == Some(&'#') {
        i += 1;
    }
    if chars.get(i) == Some(&'0') {
        out.zero = true;
        i += 1;
    }

    let width_start = i;
    while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        i += 1;
    }
    if i > width_start {
        let digits: String = chars[width_start..i].iter().collect();
        out.width = digits.parse().map_err(|_| invalid(spec))?;
    }

    if let Some(&c) = chars.get(i) {
        if c == ',' || c == '_' {
            out.grouping = Some(c);
            i += 1;
        }
    }

    if chars.get(i) == Some(&'.') {
        i += 1;
        let start = i;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
        if i == start {
            return Err(Fault::value_error("Format specifier missing precision"));
        }
        let digits: String = chars[start..i].iter().collect();
        out.precision = Some(digits.parse().map_err(|_| invalid(spec))?);
    }

    if let Some(&c) = chars.get(i) {
        out.kind = Some(c);
        i += 1;
    }
    if i != chars.len() {
        return Err(invalid(spec));
    }
    Ok(out)
}

fn invalid(spec: &str) -> Fault {
    Fault::value_error(format!("Invalid format specifier '{}'", spec))
}

fn unknown_code(code: char, value: &Value) -> Fault {
    Fault::value_error(format!(
        "Unknown format code '{}' for object of type '{}'",
        code,
        value.type_name()
    ))
}

/// Render `value` according to `spec`.
pub fn format_spec(value: &Value, spec: &str) -> Result<String, Fault> {
    if spec.is_empty() {
        return Ok(value.to_str());
    }
    let spec = parse(spec)?;

    let (body, numeric) = match (value, spec.kind) {
        (Value::Str(s), None | Some('s')) => (truncate(s, spec.precision), false),
        (v, Some('s')) => return Err(unknown_code('s', v)),
        (Value::Float(_) | Value::Int(_) | Value::Bool(_), _) => (format_number(value, &spec)?, true),
        (v, None) => (truncate(&v.to_str(), spec.precision), false),
        (v, Some(code)) => return Err(unknown_code(code, v)),
    };

    Ok(pad(body, &spec, numeric))
}

fn truncate(s: &str, precision: Option<usize>) -> String {
    match precision {
        Some(p) => s.chars().take(p).collect(),
        None => s.to_string(),
    }
}

fn format_number(value: &Value, spec: &Spec) -> Result<String, Fault> {
    let int = match value {
        Value::Float(_) => None,
        other => other.as_int(),
    };
    let float = value.as_number().map(|n| n.as_f64()).unwrap_or_default();

    let (negative, digits) = match (spec.kind, int) {
        (Some('d') | None, Some(i)) => (i < 0, group(&i.unsigned_abs().to_string(), spec.grouping)),
        (Some('d'), None) => return Err(unknown_code('d', value)),
        (Some('x'), Some(i)) => (i < 0, format!("{:x}", i.unsigned_abs())),
        (Some('X'), Some(i)) => (i < 0, format!("{:X}", i.unsigned_abs())),
        (Some('o'), Some(i)) => (i < 0, format!("{:o}", i.unsigned_abs())),
        (Some('b'), Some(i)) => (i < 0, format!("{:b}", i.unsigned_abs())),
        (Some(c @ ('x' | 'X' | 'o' | 'b' | 'c')), None) => return Err(unknown_code(c, value)),
        (Some('c'), Some(i)) => {
            let c = u32::try_from(i)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| Fault::new(super::error::ExcKind::OverflowError, "%c arg not in range(0x110000)"))?;
            (false, c.to_string())
        }
        (Some('f' | 'F'), _) => {
            let p = spec.precision.unwrap_or(6);
            (float.is_sign_negative() && float != 0.0, fixed(float.abs(), p, spec.grouping))
        }
        (Some('e' | 'E'), _) => {
            let p = spec.precision.unwrap_or(6);
            let text = scientific(float.abs(), p);
            let text = if spec.kind == Some('E') { text.to_uppercase() } else { text };
            (float < 0.0, text)
        }
        (Some('%'), _) => {
            let p = spec.precision.unwrap_or(6);
            (float < 0.0, format!("{}%", fixed(float.abs() * 100.0, p, spec.grouping)))
        }
        (Some('g' | 'G'), _) => (float < 0.0, general(float.abs(), spec.precision.unwrap_or(6))),
        (None, None) => match spec.precision {
            Some(p) => (float < 0.0, general(float.abs(), p)),
            None => {
                let text = format_float(float.abs());
                let text = if spec.grouping.is_some() {
                    match text.split_once('.') {
                        Some((int_part, frac)) => format!("{}.{}", group(int_part, spec.grouping), frac),
                        None => text,
                    }
                } else {
                    text
                };
                (float.is_sign_negative() && !float.is_nan(), text)
            }
        },
        (Some(code), _) => return Err(unknown_code(code, value)),
    };

    let sign = if negative {
        "-"
    } else {
        match spec.sign {
            Some('+') => "+",
            Some(' ') => " ",
            _ => "",
        }
    };
    Ok(format!("{}{}", sign, digits))
}

fn fixed(f: f64, precision: usize, grouping: Option<char>) -> String {
    if !f.is_finite() {
        return format_float(f);
    }
    let text = format!("{:.*}", precision, f);
    match text.split_once('.') {
        Some((int_part, frac)) => format!("{}.{}", group(int_part, grouping), frac),
        None => group(&text, grouping),
    }
}

fn scientific(f: f64, precision: usize) -> String {
    if !f.is_finite() {
        return format_float(f);
    }
    let text = format!("{:.*e}", precision, f);
    match text.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => text,
    }
}

fn general(f: f64, precision: usize) -> String {
    if !f.is_finite() {
        return format_float(f);
    }
    let p = precision.max(1);
    if f == 0.0 {
        return "0".to_string();
    }
    let exponent = f.abs().log10().floor() as i64;
    if exponent < -4 || exponent >= p as i64 {
        let text = scientific(f, p - 1);
        match text.split_once('e') {
            Some((mantissa, exp)) => format!("{}e{}", strip_zeros(mantissa), exp),
            None => text,
        }
    } else {
        let decimals = (p as i64 - 1 - exponent).max(0) as usize;
        strip_zeros(&format!("{:.*}", decimals, f)).to_string()
    }
}

fn strip_zeros(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

fn group(digits: &str, separator: Option<char>) -> String {
    let Some(sep) = separator else {
        return digits.to_string();
    };
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(c);
    }
    out
}

fn pad(body: String, spec: &Spec, numeric: bool) -> String {
    let len = body.chars().count();
    if len >= spec.width {
        return body;
    }
    let missing = spec.width - len;
    let (fill, align) = match (spec.fill, spec.align, spec.zero) {
        (fill, Some(align), _) => (fill.unwrap_or(' '), align),
        (None, None, true) => ('0', '='),
        _ => (' ', if numeric { '>' } else { '<' }),
    };
    let filler = |n: usize| std::iter::repeat(fill).take(n).collect::<String>();

    match align {
        '<' => format!("{}{}", body, filler(missing)),
        '^' => format!("{}{}{}", filler(missing / 2), body, filler(missing - missing / 2)),
        '=' => {
            let split = body
                .char_indices()
                .find(|(_, c)| !matches!(c, '+' | '-' | ' '))
                .map(|(i, _)| i)
                .unwrap_or(0);
            format!("{}{}{}", &body[..split], filler(missing), &body[split..])
        }
        _ => format!("{}{}", filler(missing), body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(value: Value, spec: &str) -> String {
        format_spec(&value, spec).unwrap()
    }

    #[test]
    fn test_fixed_point() {
        assert_eq!(fmt(Value::Float(3.14159), ".2f"), "3.14");
        assert_eq!(fmt(Value::Int(2), ".1f"), "2.0");
        assert_eq!(fmt(Value::Float(-0.5), "+.1f"), "-0.5");
        assert_eq!(fmt(Value::Float(1234567.891), ",.2f"), "1,234,567.89");
    }

    #[test]
    fn test_width_and_alignment() {
        assert_eq!(fmt(Value::Int(42), "5"), "   42");
        assert_eq!(fmt(Value::from("ab"), "5"), "ab   ");
        assert_eq!(fmt(Value::from("ab"), "^6"), "  ab  ");
        assert_eq!(fmt(Value::from("ab"), "*>4"), "**ab");
        assert_eq!(fmt(Value::Int(-42), "06"), "-00042");
    }

    #[test]
    fn test_integer_codes() {
        assert_eq!(fmt(Value::Int(255), "x"), "ff");
        assert_eq!(fmt(Value::Int(5), "b"), "101");
        assert_eq!(fmt(Value::Int(1234567), ","), "1,234,567");
        assert!(format_spec(&Value::Float(1.5), "d").is_err());
    }

    #[test]
    fn test_general_and_percent() {
        assert_eq!(fmt(Value::Float(0.25), ".1%"), "25.0%");
        assert_eq!(fmt(Value::Float(1234.5678), ".3g"), "1.23e+03");
        assert_eq!(fmt(Value::Float(0.000123456), ".2e"), "1.23e-04");
        assert_eq!(fmt(Value::Float(2.5), ".3"), "2.5");
    }

    #[test]
    fn test_string_precision_truncates() {
        assert_eq!(fmt(Value::from("abcdef"), ".3"), "abc");
    }

    #[test]
    fn test_invalid_spec() {
        assert!(format_spec(&Value::Int(1), "5q7").is_err());
        assert!(format_spec(&Value::list(vec![]), "d").is_err());
    }
}
