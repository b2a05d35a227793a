//! Core function library
//!
//! String, random, date, encoding and arithmetic helpers available under the
//! configured prefix (`quince:` by default).

use std::fmt::Write as _;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use uuid::Uuid;

use super::{Function, FunctionLibrary};
use crate::context::TestContext;
use crate::error::{EngineError, Result};

/// Default `currentDate` pattern, e.g. `24.12.2025`
pub const DEFAULT_DATE_FORMAT: &str = "%d.%m.%Y";

/// Build the core library under the given prefix
pub fn library(prefix: &str) -> FunctionLibrary {
    let mut lib = FunctionLibrary::new("core", prefix);

    // Strings
    lib.register(Function::new("concat", 0, None, |args, _| Ok(args.concat())));
    lib.register(Function::new("upperCase", 1, Some(1), |args, _| Ok(args[0].to_uppercase())));
    lib.register(Function::new("lowerCase", 1, Some(1), |args, _| Ok(args[0].to_lowercase())));
    lib.register(Function::new("substring", 2, Some(3), substring));
    lib.register(Function::new("stringLength", 1, Some(1), |args, _| {
        Ok(args[0].chars().count().to_string())
    }));
    lib.register(Function::new("translate", 3, Some(3), translate));
    lib.register(Function::new("escapeXml", 1, Some(1), |args, _| Ok(escape_xml(&args[0]))));

    // Random values
    lib.register(Function::new("randomNumber", 1, Some(2), random_number));
    lib.register(Function::new("randomString", 1, Some(3), random_string));
    lib.register(Function::new("randomUUID", 0, Some(0), |_, _| Ok(Uuid::new_v4().to_string())));

    // Dates
    lib.register(Function::new("currentDate", 0, Some(2), current_date));

    // Encoding
    lib.register(Function::new("encodeBase64", 1, Some(1), |args, _| {
        Ok(STANDARD.encode(args[0].as_bytes()))
    }));
    lib.register(Function::new("decodeBase64", 1, Some(1), decode_base64));
    lib.register(Function::new("urlEncode", 1, Some(1), |args, _| {
        Ok(urlencoding::encode(&args[0]).into_owned())
    }));
    lib.register(Function::new("urlDecode", 1, Some(1), url_decode));

    // Arithmetic
    lib.register(Function::new("sum", 1, None, |args, _| {
        let numbers = parse_numbers("sum", args)?;
        Ok(format_number(numbers.iter().sum()))
    }));
    lib.register(Function::new("maximum", 1, None, |args, _| {
        let numbers = parse_numbers("maximum", args)?;
        Ok(format_number(numbers.into_iter().fold(f64::NEG_INFINITY, f64::max)))
    }));
    lib.register(Function::new("minimum", 1, None, |args, _| {
        let numbers = parse_numbers("minimum", args)?;
        Ok(format_number(numbers.into_iter().fold(f64::INFINITY, f64::min)))
    }));
    lib.register(Function::new("average", 1, None, |args, _| {
        let numbers = parse_numbers("average", args)?;
        Ok(format_number(numbers.iter().sum::<f64>() / numbers.len() as f64))
    }));
    lib.register(Function::new("absolute", 1, Some(1), |args, _| {
        let numbers = parse_numbers("absolute", args)?;
        Ok(format_number(numbers[0].abs()))
    }));

    // Environment
    lib.register(Function::new("env", 1, Some(2), env));

    lib
}

fn argument_error(function: &str, message: impl Into<String>) -> EngineError {
    EngineError::FunctionArguments {
        function: function.to_string(),
        message: message.into(),
    }
}

fn parse_index(function: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| argument_error(function, format!("'{}' is not a valid index", raw)))
}

fn parse_bool(function: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(argument_error(function, format!("'{}' is not a boolean", raw))),
    }
}

fn parse_numbers(function: &str, args: &[String]) -> Result<Vec<f64>> {
    args.iter()
        .map(|raw| {
            raw.trim()
                .parse::<f64>()
                .map_err(|_| argument_error(function, format!("'{}' is not a number", raw)))
        })
        .collect()
}

/// Integral results keep one decimal place (`6.0`), others print as is.
fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 {
        format!("{:.1}", n)
    } else {
        n.to_string()
    }
}

fn substring(args: &[String], _context: &TestContext) -> Result<String> {
    let chars: Vec<char> = args[0].chars().collect();
    let begin = parse_index("substring", &args[1])?;
    let end = match args.get(2) {
        Some(raw) => parse_index("substring", raw)?,
        None => chars.len(),
    };
    if begin > end || end > chars.len() {
        return Err(argument_error(
            "substring",
            format!("range {}..{} out of bounds for length {}", begin, end, chars.len()),
        ));
    }
    Ok(chars[begin..end].iter().collect())
}

fn translate(args: &[String], _context: &TestContext) -> Result<String> {
    let pattern = Regex::new(&args[1])
        .map_err(|e| argument_error("translate", format!("invalid pattern '{}': {}", args[1], e)))?;
    Ok(pattern.replace_all(&args[0], args[2].as_str()).into_owned())
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

/// `randomNumber(length[, padding])`, padding allows a leading zero
fn random_number(args: &[String], _context: &TestContext) -> Result<String> {
    let length = parse_index("randomNumber", &args[0])?;
    if length == 0 {
        return Err(argument_error("randomNumber", "length must be greater than zero"));
    }
    let padding = match args.get(1) {
        Some(raw) => parse_bool("randomNumber", raw)?,
        None => true,
    };

    let mut rng = rand::thread_rng();
    let mut digits = String::with_capacity(length);
    for i in 0..length {
        let digit = if i == 0 && !padding {
            rng.gen_range(1..=9)
        } else {
            rng.gen_range(0..=9)
        };
        digits.push(char::from(b'0' + digit as u8));
    }
    Ok(digits)
}

/// `randomString(length[, UPPERCASE|LOWERCASE|MIXED[, includeNumbers]])`
fn random_string(args: &[String], _context: &TestContext) -> Result<String> {
    let length = parse_index("randomString", &args[0])?;
    let mode = args.get(1).map(|m| m.trim().to_uppercase()).unwrap_or_else(|| "MIXED".to_string());
    let include_numbers = match args.get(2) {
        Some(raw) => parse_bool("randomString", raw)?,
        None => false,
    };

    let rng = rand::thread_rng();
    let text: String = rng
        .sample_iter(&Alphanumeric)
        .map(char::from)
        .filter(|c| include_numbers || c.is_ascii_alphabetic())
        .take(length)
        .collect();

    match mode.as_str() {
        "MIXED" => Ok(text),
        "UPPERCASE" => Ok(text.to_uppercase()),
        "LOWERCASE" => Ok(text.to_lowercase()),
        other => Err(argument_error(
            "randomString",
            format!("unknown mode '{}', expected UPPERCASE, LOWERCASE or MIXED", other),
        )),
    }
}

/// `currentDate([format[, offset]])` with a chrono pattern and an offset such as `+1d`
fn current_date(args: &[String], _context: &TestContext) -> Result<String> {
    let format = args
        .first()
        .map(|f| f.as_str())
        .filter(|f| !f.trim().is_empty())
        .unwrap_or(DEFAULT_DATE_FORMAT);
    let mut now = chrono::Local::now();
    if let Some(offset) = args.get(1) {
        now += parse_offset(offset)?;
    }

    // Unknown specifiers surface as fmt errors, to_string() would panic on them
    let mut out = String::new();
    write!(out, "{}", now.format(format))
        .map_err(|_| argument_error("currentDate", format!("invalid date format '{}'", format)))?;
    Ok(out)
}

fn parse_offset(raw: &str) -> Result<chrono::Duration> {
    let raw = raw.trim();
    let (sign, body) = match raw.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, raw.strip_prefix('+').unwrap_or(raw)),
    };
    let split = body.find(|c: char| !c.is_ascii_digit()).unwrap_or(body.len());
    let amount: i64 = body[..split]
        .parse()
        .map_err(|_| argument_error("currentDate", format!("invalid offset '{}'", raw)))?;
    let amount = sign * amount;

    match &body[split..] {
        "s" => Ok(chrono::Duration::seconds(amount)),
        "m" => Ok(chrono::Duration::minutes(amount)),
        "h" => Ok(chrono::Duration::hours(amount)),
        "d" | "" => Ok(chrono::Duration::days(amount)),
        "w" => Ok(chrono::Duration::weeks(amount)),
        unit => Err(argument_error(
            "currentDate",
            format!("unknown offset unit '{}' in '{}'", unit, raw),
        )),
    }
}

fn decode_base64(args: &[String], _context: &TestContext) -> Result<String> {
    let bytes = STANDARD
        .decode(args[0].trim())
        .map_err(|e| argument_error("decodeBase64", format!("invalid base64: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| argument_error("decodeBase64", format!("not UTF-8: {}", e)))
}

fn url_decode(args: &[String], _context: &TestContext) -> Result<String> {
    urlencoding::decode(&args[0])
        .map(|s| s.into_owned())
        .map_err(|e| argument_error("urlDecode", e.to_string()))
}

/// `env(name[, default])`
fn env(args: &[String], _context: &TestContext) -> Result<String> {
    match std::env::var(&args[0]) {
        Ok(value) => Ok(value),
        Err(_) => args.get(1).cloned().ok_or_else(|| {
            argument_error("env", format!("environment variable '{}' is not set", args[0]))
        }),
    }
}
