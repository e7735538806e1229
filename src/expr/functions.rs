//! Custom condition functions registered on every evaluation context
//!
//! Everything here is pure: no I/O, no side effects. Bad argument types
//! produce an evaluation failure, never a panic, so a malformed policy
//! condition degrades to DENY instead of taking down the request.

use cel_interpreter::{Context, ExecutionError, ResolveResult, Value};
use chrono::DateTime;
use ipnet::IpNet;
use std::net::IpAddr;
use std::sync::Arc;

/// Register the custom functions on a CEL context
///
/// String matching (`startsWith`, `endsWith`, `contains`, `matches`) and
/// collection quantifiers (`size`, `exists`, `all`) come with the
/// interpreter; only the additions live here.
pub fn register(context: &mut Context) {
    context.add_function("typeName", type_name);
    context.add_function("matchesRegex", matches_regex);
    context.add_function("durationMillis", duration_millis);
    context.add_function("timestampOf", timestamp_of);
    context.add_function("ipInRange", ip_in_range);
}

/// `typeName(x)` - dynamic type introspection
fn type_name(value: Value) -> String {
    let name = match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Int(_) => "int",
        Value::UInt(_) => "uint",
        Value::Float(_) => "double",
        Value::String(_) => "string",
        Value::Bytes(_) => "bytes",
        Value::List(_) => "list",
        Value::Map(_) => "map",
        Value::Duration(_) => "duration",
        Value::Timestamp(_) => "timestamp",
        _ => "unknown",
    };
    name.to_string()
}

/// `matchesRegex(s, pattern)` - anchored-where-written regex match
fn matches_regex(value: Arc<String>, pattern: Arc<String>) -> ResolveResult {
    regex::Regex::new(&pattern)
        .map(|re| Value::Bool(re.is_match(&value)))
        .map_err(|e| ExecutionError::function_error("matchesRegex", e))
}

/// `durationMillis("1h30m")` - human duration string to milliseconds
fn duration_millis(spec: Arc<String>) -> ResolveResult {
    parse_duration_millis(&spec)
        .map(Value::Int)
        .map_err(|e| ExecutionError::function_error("durationMillis", e))
}

/// `timestampOf(x)` - RFC 3339 string or epoch-millis number to epoch millis
fn timestamp_of(value: Value) -> ResolveResult {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(&s)
            .map(|ts| Value::Int(ts.timestamp_millis()))
            .map_err(|e| ExecutionError::function_error("timestampOf", e)),
        Value::Int(i) => Ok(Value::Int(i)),
        Value::UInt(u) => i64::try_from(u)
            .map(Value::Int)
            .map_err(|e| ExecutionError::function_error("timestampOf", e)),
        Value::Timestamp(ts) => Ok(Value::Int(ts.timestamp_millis())),
        other => Err(ExecutionError::function_error(
            "timestampOf",
            format!("expected string or number, got {}", type_name(other)),
        )),
    }
}

/// `ipInRange("10.0.0.5", "10.0.0.0/24")` - CIDR membership test
fn ip_in_range(ip: Arc<String>, cidr: Arc<String>) -> ResolveResult {
    let net = cidr
        .parse::<IpNet>()
        .map_err(|e| ExecutionError::function_error("ipInRange", e))?;
    let addr = ip
        .parse::<IpAddr>()
        .map_err(|e| ExecutionError::function_error("ipInRange", e))?;
    Ok(Value::Bool(net.contains(&addr)))
}

/// Parse a duration of the form `<n><unit>[<n><unit>...]`
///
/// Units: ms, s, m, h, d. Compound terms accumulate ("1h30m").
fn parse_duration_millis(spec: &str) -> Result<i64, String> {
    if spec.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total: i64 = 0;
    let mut rest = spec;

    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("missing unit in duration '{}'", spec))?;
        if digits_end == 0 {
            return Err(format!("expected number in duration '{}'", spec));
        }

        let (digits, tail) = rest.split_at(digits_end);
        let amount: i64 = digits
            .parse()
            .map_err(|_| format!("invalid number in duration '{}'", spec))?;

        let (unit, tail) = match tail.as_bytes() {
            [b'm', b's', ..] => (&tail[..2], &tail[2..]),
            [b's', ..] => (&tail[..1], &tail[1..]),
            [b'm', ..] => (&tail[..1], &tail[1..]),
            [b'h', ..] => (&tail[..1], &tail[1..]),
            [b'd', ..] => (&tail[..1], &tail[1..]),
            _ => return Err(format!("unknown unit in duration '{}'", spec)),
        };

        let factor: i64 = match unit {
            "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            "d" => 86_400_000,
            _ => unreachable!(),
        };

        total = amount
            .checked_mul(factor)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| format!("duration '{}' overflows", spec))?;
        rest = tail;
    }

    Ok(total)
}
