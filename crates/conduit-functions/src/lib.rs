//! Custom function registry and the built-in transformation set.
//!
//! Custom-function steps name their transformation by string. The registry is
//! a closed mapping from name to a plain function over the step's resolved
//! parameter map and fixed arguments; it is checked at configuration-load
//! time so unknown names fail before any step executes. Additional functions
//! can be registered programmatically.

use std::collections::HashMap;

use base64::Engine;
use serde_json::{Map, Value};

use conduit_types::{ConduitError, Result};

/// Signature of a custom function: the step's resolved parameters plus its
/// fixed arguments, in declaration order.
pub type CustomFn = fn(&Map<String, Value>, &[Value]) -> Result<Value>;

// ---------------------------------------------------------------------------
// FunctionRegistry
// ---------------------------------------------------------------------------

pub struct FunctionRegistry {
    functions: HashMap<String, CustomFn>,
}

impl FunctionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Create a registry pre-loaded with the built-in function set.
    pub fn builtin() -> Self {
        let mut reg = Self::new();
        reg.register("double", double);
        reg.register("add", add);
        reg.register("concat", concat);
        reg.register("uppercase", uppercase);
        reg.register("lowercase", lowercase);
        reg.register("addFixed", add_fixed);
        reg.register("subtractFixed", subtract_fixed);
        reg.register("multiplyByFixed", multiply_by_fixed);
        reg.register("divideByFixed", divide_by_fixed);
        reg.register("parseInt", parse_int);
        reg.register("parseFloat", parse_float);
        reg.register("round", round);
        reg.register("length", length);
        reg.register("slice", slice);
        reg.register("mapValues", map_values);
        reg.register("replace", replace);
        reg.register("extract", extract);
        reg.register("hexToBase64UrlSafe", hex_to_base64_url_safe);
        reg
    }

    pub fn register(&mut self, name: impl Into<String>, function: CustomFn) {
        self.functions.insert(name.into(), function);
    }

    pub fn get(&self, name: &str) -> Option<CustomFn> {
        self.functions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Invoke `name` with the resolved parameters and fixed arguments.
    pub fn call(&self, name: &str, params: &Map<String, Value>, args: &[Value]) -> Result<Value> {
        let function = self
            .get(name)
            .ok_or_else(|| ConduitError::UnknownFunction { name: name.into() })?;
        function(params, args).map_err(|e| ConduitError::Function {
            name: name.to_string(),
            message: e.to_string(),
        })
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

// ---------------------------------------------------------------------------
// Parameter access helpers
// ---------------------------------------------------------------------------

fn require<'a>(params: &'a Map<String, Value>, key: &str) -> Result<&'a Value> {
    params
        .get(key)
        .ok_or_else(|| ConduitError::Other(format!("missing parameter '{key}'")))
}

fn number(params: &Map<String, Value>, key: &str) -> Result<f64> {
    require(params, key)?
        .as_f64()
        .ok_or_else(|| ConduitError::Other(format!("parameter '{key}' is not a number")))
}

fn text(params: &Map<String, Value>, key: &str) -> Result<String> {
    require(params, key)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ConduitError::Other(format!("parameter '{key}' is not a string")))
}

fn fixed_arg<'a>(args: &'a [Value], index: usize) -> Result<&'a Value> {
    args.get(index)
        .ok_or_else(|| ConduitError::Other(format!("missing fixed argument {index}")))
}

fn fixed_number(args: &[Value], index: usize) -> Result<f64> {
    fixed_arg(args, index)?
        .as_f64()
        .ok_or_else(|| ConduitError::Other(format!("fixed argument {index} is not a number")))
}

fn fixed_text<'a>(args: &'a [Value], index: usize) -> Result<&'a str> {
    fixed_arg(args, index)?
        .as_str()
        .ok_or_else(|| ConduitError::Other(format!("fixed argument {index} is not a string")))
}

/// JSON number from an f64, preferring integer form when exact.
fn num_value(n: f64) -> Value {
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

// ---------------------------------------------------------------------------
// Built-in functions
// ---------------------------------------------------------------------------

fn double(params: &Map<String, Value>, _args: &[Value]) -> Result<Value> {
    Ok(num_value(number(params, "value")? * 2.0))
}

fn add(params: &Map<String, Value>, _args: &[Value]) -> Result<Value> {
    Ok(num_value(number(params, "value1")? + number(params, "value2")?))
}

fn concat(params: &Map<String, Value>, _args: &[Value]) -> Result<Value> {
    Ok(Value::String(format!(
        "{}{}",
        text(params, "key1")?,
        text(params, "key2")?
    )))
}

fn uppercase(params: &Map<String, Value>, _args: &[Value]) -> Result<Value> {
    Ok(Value::String(text(params, "key")?.to_uppercase()))
}

fn lowercase(params: &Map<String, Value>, _args: &[Value]) -> Result<Value> {
    Ok(Value::String(text(params, "key")?.to_lowercase()))
}

fn add_fixed(params: &Map<String, Value>, args: &[Value]) -> Result<Value> {
    Ok(num_value(number(params, "value")? + fixed_number(args, 0)?))
}

fn subtract_fixed(params: &Map<String, Value>, args: &[Value]) -> Result<Value> {
    Ok(num_value(number(params, "value")? - fixed_number(args, 0)?))
}

fn multiply_by_fixed(params: &Map<String, Value>, args: &[Value]) -> Result<Value> {
    Ok(num_value(number(params, "value")? * fixed_number(args, 0)?))
}

fn divide_by_fixed(params: &Map<String, Value>, args: &[Value]) -> Result<Value> {
    let divisor = fixed_number(args, 0)?;
    if divisor == 0.0 {
        return Err(ConduitError::Other("division by zero".into()));
    }
    Ok(num_value(number(params, "value")? / divisor))
}

fn parse_int(params: &Map<String, Value>, _args: &[Value]) -> Result<Value> {
    let raw = text(params, "key")?;
    leading_integer(raw.trim())
        .map(Value::from)
        .ok_or_else(|| ConduitError::Other(format!("'{raw}' has no leading integer")))
}

/// Parse the leading optionally-signed integer of `s`, ignoring any trailing
/// non-digit text.
fn leading_integer(s: &str) -> Option<i64> {
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse::<i64>().ok().map(|n| n * sign)
}

fn parse_float(params: &Map<String, Value>, _args: &[Value]) -> Result<Value> {
    let raw = text(params, "key")?;
    raw.trim()
        .parse::<f64>()
        .map(num_value)
        .map_err(|_| ConduitError::Other(format!("'{raw}' is not a number")))
}

fn round(params: &Map<String, Value>, _args: &[Value]) -> Result<Value> {
    Ok(num_value(number(params, "value")?.round()))
}

fn length(params: &Map<String, Value>, _args: &[Value]) -> Result<Value> {
    Ok(Value::from(text(params, "key")?.chars().count() as i64))
}

fn slice(params: &Map<String, Value>, args: &[Value]) -> Result<Value> {
    let source: Vec<char> = text(params, "key")?.chars().collect();
    let len = source.len() as i64;
    let start = fixed_number(args, 0)? as i64;
    let end = match args.get(1) {
        Some(v) => v
            .as_f64()
            .ok_or_else(|| ConduitError::Other("fixed argument 1 is not a number".into()))?
            as i64,
        None => len,
    };
    let clamp = |i: i64| -> usize {
        let i = if i < 0 { len + i } else { i };
        i.clamp(0, len) as usize
    };
    let (start, end) = (clamp(start), clamp(end));
    let sliced: String = if start < end {
        source[start..end].iter().collect()
    } else {
        String::new()
    };
    Ok(Value::String(sliced))
}

fn map_values(params: &Map<String, Value>, args: &[Value]) -> Result<Value> {
    let value = require(params, "value")?;
    let mapping = fixed_arg(args, 0)?
        .as_object()
        .ok_or_else(|| ConduitError::Other("fixed argument 0 is not an object".into()))?;
    let key = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Ok(mapping.get(&key).cloned().unwrap_or_else(|| value.clone()))
}

fn replace(params: &Map<String, Value>, args: &[Value]) -> Result<Value> {
    let source = text(params, "key")?;
    let search = fixed_text(args, 0)?;
    let replacement = fixed_text(args, 1)?;
    Ok(Value::String(source.replacen(search, replacement, 1)))
}

fn extract(params: &Map<String, Value>, args: &[Value]) -> Result<Value> {
    let source = text(params, "key")?;
    let pattern = fixed_text(args, 0)?;
    let re = regex::Regex::new(pattern)
        .map_err(|e| ConduitError::Other(format!("invalid pattern '{pattern}': {e}")))?;
    let matched = re.find(&source).map(|m| m.as_str()).unwrap_or("");
    Ok(Value::String(matched.to_string()))
}

fn hex_to_base64_url_safe(params: &Map<String, Value>, _args: &[Value]) -> Result<Value> {
    let hex = text(params, "key")?;
    let bytes = decode_hex(hex.trim())?;
    Ok(Value::String(
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes),
    ))
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        return Err(ConduitError::Other("hex string has odd length".into()));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .map_err(|_| ConduitError::Other(format!("invalid hex byte '{}'", &s[i..i + 2])))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn call(name: &str, p: &[(&str, Value)], args: &[Value]) -> Result<Value> {
        FunctionRegistry::builtin().call(name, &params(p), args)
    }

    #[test]
    fn double_doubles() {
        assert_eq!(call("double", &[("value", json!(21))], &[]).unwrap(), json!(42));
    }

    #[test]
    fn add_sums_two_values() {
        assert_eq!(
            call("add", &[("value1", json!(2)), ("value2", json!(3))], &[]).unwrap(),
            json!(5)
        );
    }

    #[test]
    fn concat_joins_strings() {
        assert_eq!(
            call("concat", &[("key1", json!("foo")), ("key2", json!("bar"))], &[]).unwrap(),
            json!("foobar")
        );
    }

    #[test]
    fn case_functions() {
        assert_eq!(call("uppercase", &[("key", json!("abc"))], &[]).unwrap(), json!("ABC"));
        assert_eq!(call("lowercase", &[("key", json!("AbC"))], &[]).unwrap(), json!("abc"));
    }

    #[test]
    fn fixed_arithmetic() {
        assert_eq!(
            call("addFixed", &[("value", json!(7))], &[json!(10)]).unwrap(),
            json!(17)
        );
        assert_eq!(
            call("subtractFixed", &[("value", json!(7))], &[json!(2)]).unwrap(),
            json!(5)
        );
        assert_eq!(
            call("multiplyByFixed", &[("value", json!(6))], &[json!(7)]).unwrap(),
            json!(42)
        );
        assert_eq!(
            call("divideByFixed", &[("value", json!(10))], &[json!(4)]).unwrap(),
            json!(2.5)
        );
    }

    #[test]
    fn divide_by_zero_fails() {
        let err = call("divideByFixed", &[("value", json!(1))], &[json!(0)]).unwrap_err();
        assert!(err.to_string().contains("division by zero"));
    }

    #[test]
    fn parse_int_takes_leading_digits() {
        assert_eq!(call("parseInt", &[("key", json!("42px"))], &[]).unwrap(), json!(42));
        assert_eq!(call("parseInt", &[("key", json!(" -7 "))], &[]).unwrap(), json!(-7));
        assert!(call("parseInt", &[("key", json!("px"))], &[]).is_err());
    }

    #[test]
    fn parse_float_parses() {
        assert_eq!(
            call("parseFloat", &[("key", json!("2.5"))], &[]).unwrap(),
            json!(2.5)
        );
        assert_eq!(call("parseFloat", &[("key", json!("3"))], &[]).unwrap(), json!(3));
    }

    #[test]
    fn round_rounds_half_up() {
        assert_eq!(call("round", &[("value", json!(2.5))], &[]).unwrap(), json!(3));
        assert_eq!(call("round", &[("value", json!(2.4))], &[]).unwrap(), json!(2));
    }

    #[test]
    fn length_counts_chars() {
        assert_eq!(call("length", &[("key", json!("hello"))], &[]).unwrap(), json!(5));
    }

    #[test]
    fn slice_supports_negative_indices() {
        assert_eq!(
            call("slice", &[("key", json!("pipeline"))], &[json!(0), json!(4)]).unwrap(),
            json!("pipe")
        );
        assert_eq!(
            call("slice", &[("key", json!("pipeline"))], &[json!(-4)]).unwrap(),
            json!("line")
        );
        assert_eq!(
            call("slice", &[("key", json!("abc"))], &[json!(2), json!(1)]).unwrap(),
            json!("")
        );
    }

    #[test]
    fn map_values_translates_or_passes_through() {
        let mapping = json!({"a": "alpha", "1": "one"});
        assert_eq!(
            call("mapValues", &[("value", json!("a"))], &[mapping.clone()]).unwrap(),
            json!("alpha")
        );
        assert_eq!(
            call("mapValues", &[("value", json!(1))], &[mapping.clone()]).unwrap(),
            json!("one")
        );
        assert_eq!(
            call("mapValues", &[("value", json!("z"))], &[mapping]).unwrap(),
            json!("z")
        );
    }

    #[test]
    fn replace_first_occurrence_only() {
        assert_eq!(
            call(
                "replace",
                &[("key", json!("a-b-c"))],
                &[json!("-"), json!("+")]
            )
            .unwrap(),
            json!("a+b-c")
        );
    }

    #[test]
    fn extract_returns_match_or_empty() {
        assert_eq!(
            call("extract", &[("key", json!("order-1234"))], &[json!(r"\d+")]).unwrap(),
            json!("1234")
        );
        assert_eq!(
            call("extract", &[("key", json!("no digits"))], &[json!(r"\d+")]).unwrap(),
            json!("")
        );
    }

    #[test]
    fn extract_rejects_bad_pattern() {
        assert!(call("extract", &[("key", json!("x"))], &[json!("(")]).is_err());
    }

    #[test]
    fn hex_to_base64_url_safe_round() {
        assert_eq!(
            call("hexToBase64UrlSafe", &[("key", json!("48656c6c6f"))], &[]).unwrap(),
            json!("SGVsbG8")
        );
        assert!(call("hexToBase64UrlSafe", &[("key", json!("abc"))], &[]).is_err());
        assert!(call("hexToBase64UrlSafe", &[("key", json!("zz"))], &[]).is_err());
    }

    #[test]
    fn unknown_function_is_an_error() {
        let err = call("nope", &[], &[]).unwrap_err();
        assert!(matches!(err, ConduitError::UnknownFunction { .. }));
    }

    #[test]
    fn missing_parameter_reports_function_name() {
        let err = call("double", &[], &[]).unwrap_err();
        match err {
            ConduitError::Function { name, message } => {
                assert_eq!(name, "double");
                assert!(message.contains("missing parameter 'value'"));
            }
            other => panic!("expected Function error, got: {other:?}"),
        }
    }

    #[test]
    fn register_custom_function() {
        fn negate(params: &Map<String, Value>, _args: &[Value]) -> Result<Value> {
            Ok(num_value(-number(params, "value")?))
        }
        let mut reg = FunctionRegistry::builtin();
        reg.register("negate", negate);
        assert!(reg.contains("negate"));
        assert_eq!(
            reg.call("negate", &params(&[("value", json!(5))]), &[]).unwrap(),
            json!(-5)
        );
    }

    #[test]
    fn builtin_roster_is_complete() {
        let reg = FunctionRegistry::builtin();
        for name in [
            "double",
            "add",
            "concat",
            "uppercase",
            "lowercase",
            "addFixed",
            "subtractFixed",
            "multiplyByFixed",
            "divideByFixed",
            "parseInt",
            "parseFloat",
            "round",
            "length",
            "slice",
            "mapValues",
            "replace",
            "extract",
            "hexToBase64UrlSafe",
        ] {
            assert!(reg.contains(name), "missing builtin '{name}'");
        }
    }
}
