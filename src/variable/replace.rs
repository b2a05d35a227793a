//! `${...}` variable references inside strings.

use crate::context::TestContext;
use crate::error::{EngineError, Result};

pub const VARIABLE_PREFIX: &str = "${";
pub const VARIABLE_SUFFIX: &str = "}";
/// `${//name//}` is left in the output as the literal `${name}`
pub const VARIABLE_ESCAPE: &str = "//";

/// Whether the whole string is a single `${...}` reference
pub fn is_variable_name(expression: &str) -> bool {
    expression.starts_with(VARIABLE_PREFIX)
        && expression.ends_with(VARIABLE_SUFFIX)
        && expression.len() > VARIABLE_PREFIX.len() + VARIABLE_SUFFIX.len() - 1
}

/// Strip `${` and `}` from a variable reference, leaving plain names untouched
pub fn cut_off_variables_prefix(expression: &str) -> &str {
    if is_variable_name(expression) {
        &expression[VARIABLE_PREFIX.len()..expression.len() - VARIABLE_SUFFIX.len()]
    } else {
        expression
    }
}

pub fn is_escaped(name: &str) -> bool {
    name.len() >= 2 * VARIABLE_ESCAPE.len()
        && name.starts_with(VARIABLE_ESCAPE)
        && name.ends_with(VARIABLE_ESCAPE)
}

/// Strip the escape markers from `//name//`
pub fn cut_off_escaping(name: &str) -> &str {
    if is_escaped(name) {
        &name[VARIABLE_ESCAPE.len()..name.len() - VARIABLE_ESCAPE.len()]
    } else {
        name
    }
}

/// Byte offset of the `}` closing a reference whose body starts at `body_start`.
fn find_closing(text: &str, body_start: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, c) in text[body_start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' if depth == 0 => return Some(body_start + offset),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Replace every `${...}` reference in `text` with the variable's value.
///
/// With `quote` set, substituted values are wrapped in single quotes so they can be
/// passed on as function arguments.
pub fn replace_variables_in_string(text: &str, context: &TestContext, quote: bool) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(VARIABLE_PREFIX) {
        out.push_str(&rest[..start]);
        let body_start = start + VARIABLE_PREFIX.len();
        let end = find_closing(rest, body_start).ok_or_else(|| {
            EngineError::InvalidExpression {
                expression: text.to_string(),
                message: format!("missing '{}' after '{}'", VARIABLE_SUFFIX, &rest[start..]),
            }
        })?;

        let name = &rest[body_start..end];
        if is_escaped(name) {
            out.push_str(VARIABLE_PREFIX);
            out.push_str(cut_off_escaping(name));
            out.push_str(VARIABLE_SUFFIX);
        } else {
            let value = context.get_variable(name)?;
            if quote {
                out.push('\'');
                out.push_str(&value);
                out.push('\'');
            } else {
                out.push_str(&value);
            }
        }

        rest = &rest[end + VARIABLE_SUFFIX.len()..];
    }

    out.push_str(rest);
    Ok(out)
}
