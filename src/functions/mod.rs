//! Inline function calls inside test strings
//!
//! Strings handed to the context may contain calls such as
//! `quince:concat('Hello ', quince:upperCase(${name}))`. Calls are resolved innermost
//! first; results of nested calls are quoted so they stay a single argument of the
//! enclosing call.
//!
//! Functions are grouped in [`FunctionLibrary`]s, each owning a prefix. The
//! [`FunctionRegistry`] held by the context consults the libraries in registration
//! order.

pub mod core;

use std::collections::HashMap;
use std::fmt;

use crate::context::TestContext;
use crate::error::{EngineError, Result};

/// Native function signature: already resolved arguments in, text out
pub type NativeFn = fn(&[String], &TestContext) -> Result<String>;

/// A function callable from test strings
#[derive(Clone)]
pub struct Function {
    pub name: String,
    pub min_args: usize,
    /// `None` for variadic functions
    pub max_args: Option<usize>,
    pub func: NativeFn,
}

impl Function {
    pub fn new(name: impl Into<String>, min_args: usize, max_args: Option<usize>, func: NativeFn) -> Self {
        Self {
            name: name.into(),
            min_args,
            max_args,
            func,
        }
    }

    /// Check arity, then run the function
    pub fn call(&self, args: &[String], context: &TestContext) -> Result<String> {
        let count = args.len();
        let too_many = self.max_args.map_or(false, |max| count > max);
        if count < self.min_args || too_many {
            let expected = match self.max_args {
                Some(max) if max == self.min_args => format!("{}", max),
                Some(max) => format!("{} to {}", self.min_args, max),
                None => format!("at least {}", self.min_args),
            };
            return Err(EngineError::FunctionArguments {
                function: self.name.clone(),
                message: format!("expected {} argument(s), got {}", expected, count),
            });
        }
        (self.func)(args, context)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .finish()
    }
}

/// Named set of functions sharing a call prefix
#[derive(Debug, Clone)]
pub struct FunctionLibrary {
    pub name: String,
    pub prefix: String,
    functions: HashMap<String, Function>,
}

impl FunctionLibrary {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
            functions: HashMap::new(),
        }
    }

    pub fn register(&mut self, function: Function) {
        self.functions.insert(function.name.clone(), function);
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Sorted function names, for diagnostics
    pub fn function_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// All function libraries known to a context
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    libraries: Vec<FunctionLibrary>,
}

impl FunctionRegistry {
    /// Registry holding the core library under the given prefix
    pub fn with_core_library(prefix: &str) -> Self {
        let mut registry = Self::default();
        registry.add_library(core::library(prefix));
        registry
    }

    pub fn add_library(&mut self, library: FunctionLibrary) {
        tracing::debug!(
            library = %library.name,
            prefix = %library.prefix,
            functions = library.functions.len(),
            "Registered function library"
        );
        self.libraries.push(library);
    }

    pub fn libraries(&self) -> &[FunctionLibrary] {
        &self.libraries
    }

    /// Whether the text is a call, that is starts with the prefix of a library
    pub fn is_function(&self, text: &str) -> bool {
        let text = text.trim_start();
        self.libraries.iter().any(|lib| text.starts_with(lib.prefix.as_str()))
    }

    fn find_call(&self, text: &str) -> Option<(usize, &FunctionLibrary)> {
        self.libraries
            .iter()
            .filter_map(|lib| text.find(lib.prefix.as_str()).map(|pos| (pos, lib)))
            .min_by_key(|(pos, _)| *pos)
    }

    /// Resolve a single call expression such as `quince:upperCase('a')`.
    pub fn resolve_function(&self, call: &str, context: &TestContext) -> Result<String> {
        let call = call.trim();
        let library = self
            .libraries
            .iter()
            .find(|lib| call.starts_with(lib.prefix.as_str()))
            .ok_or_else(|| EngineError::NoSuchFunction(call.to_string()))?;

        let body = &call[library.prefix.len()..];
        let open = body.find('(').ok_or_else(|| EngineError::InvalidExpression {
            expression: call.to_string(),
            message: "missing '(' in function call".to_string(),
        })?;
        if !body.ends_with(')') {
            return Err(EngineError::InvalidExpression {
                expression: call.to_string(),
                message: "missing ')' in function call".to_string(),
            });
        }

        let name = &body[..open];
        let function = library
            .get(name)
            .ok_or_else(|| EngineError::NoSuchFunction(format!("{}{}", library.prefix, name)))?;

        let raw_args = self.replace_functions_in_string(&body[open + 1..body.len() - 1], context, true)?;
        let args = split_parameters(&raw_args);

        tracing::trace!(function = %name, ?args, "Calling function");
        function.call(&args, context)
    }

    /// Replace every function call in `text` with its result.
    ///
    /// With `quote` set, results are wrapped in single quotes.
    pub fn replace_functions_in_string(&self, text: &str, context: &TestContext, quote: bool) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some((start, library)) = self.find_call(rest) {
            let name_start = start + library.prefix.len();
            let name_len = rest[name_start..]
                .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
                .unwrap_or(rest.len() - name_start);
            let open = name_start + name_len;

            if name_len == 0 || !rest[open..].starts_with('(') {
                // Prefix without a call, keep it as plain text
                out.push_str(&rest[..name_start]);
                rest = &rest[name_start..];
                continue;
            }

            let close = find_closing_paren(rest, open).ok_or_else(|| EngineError::InvalidExpression {
                expression: text.to_string(),
                message: format!("missing ')' for function call '{}'", &rest[start..]),
            })?;

            out.push_str(&rest[..start]);
            let value = self.resolve_function(&rest[start..=close], context)?;
            if quote {
                out.push('\'');
                out.push_str(&value);
                out.push('\'');
            } else {
                out.push_str(&value);
            }
            rest = &rest[close + 1..];
        }

        out.push_str(rest);
        Ok(out)
    }
}

/// Byte offset of the `)` matching the `(` at `open`, ignoring parens inside quotes.
fn find_closing_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quoted = false;
    for (offset, c) in text[open..].char_indices() {
        match c {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split a function argument list on top level commas.
///
/// Surrounding single quotes are removed; commas inside quotes or nested parentheses
/// do not split. An empty list yields no arguments.
pub fn split_parameters(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }

    let mut params = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut depth = 0usize;

    for c in raw.chars() {
        match c {
            '\'' => {
                quoted = !quoted;
                current.push(c);
            }
            '(' if !quoted => {
                depth += 1;
                current.push(c);
            }
            ')' if !quoted => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if !quoted && depth == 0 => {
                params.push(unquote(&current));
                current.clear();
            }
            _ => current.push(c),
        }
    }
    params.push(unquote(&current));
    params
}

fn unquote(param: &str) -> String {
    let trimmed = param.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('\'') && trimmed.ends_with('\'') {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> FunctionRegistry {
        FunctionRegistry::with_core_library("quince:")
    }

    #[test]
    fn test_split_parameters() {
        assert_eq!(split_parameters("'a', 'b'"), vec!["a", "b"]);
        assert_eq!(split_parameters("'a, b', c"), vec!["a, b", "c"]);
        assert_eq!(split_parameters("x(1,2), 3"), vec!["x(1,2)", "3"]);
        assert!(split_parameters("  ").is_empty());
    }

    #[test]
    fn test_is_function() {
        let registry = registry();
        assert!(registry.is_function("quince:upperCase('a')"));
        assert!(!registry.is_function("upperCase('a')"));
        assert!(!registry.is_function("see quince:upperCase('a')"));
    }

    #[test]
    fn test_resolve_function() {
        let ctx = TestContext::new();
        assert_eq!(
            registry().resolve_function("quince:concat('Hello', ' ', 'World')", &ctx).unwrap(),
            "Hello World"
        );
    }

    #[test]
    fn test_nested_functions() {
        let ctx = TestContext::new();
        assert_eq!(
            registry()
                .resolve_function("quince:concat('Hello ', quince:upperCase('quince'))", &ctx)
                .unwrap(),
            "Hello QUINCE"
        );
    }

    #[test]
    fn test_replace_functions_in_string() {
        let ctx = TestContext::new();
        let registry = registry();
        assert_eq!(
            registry
                .replace_functions_in_string("Name: quince:upperCase('abc')!", &ctx, false)
                .unwrap(),
            "Name: ABC!"
        );
        assert_eq!(
            registry
                .replace_functions_in_string("quince:lowerCase('ABC')", &ctx, true)
                .unwrap(),
            "'abc'"
        );
        assert_eq!(
            registry
                .replace_functions_in_string("see quince: docs", &ctx, false)
                .unwrap(),
            "see quince: docs"
        );
    }

    #[test]
    fn test_unknown_function() {
        let ctx = TestContext::new();
        assert_eq!(
            registry().resolve_function("quince:doesNotExist()", &ctx),
            Err(EngineError::NoSuchFunction("quince:doesNotExist".to_string()))
        );
    }

    #[test]
    fn test_unterminated_call() {
        let ctx = TestContext::new();
        assert!(matches!(
            registry().replace_functions_in_string("quince:upperCase('a'", &ctx, false),
            Err(EngineError::InvalidExpression { .. })
        ));
    }

    #[test]
    fn test_arity_check() {
        let ctx = TestContext::new();
        match registry().resolve_function("quince:upperCase()", &ctx) {
            Err(EngineError::FunctionArguments { function, message }) => {
                assert_eq!(function, "upperCase");
                assert_eq!(message, "expected 1 argument(s), got 0");
            }
            other => panic!("Expected FunctionArguments, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_library() {
        fn shout(args: &[String], _ctx: &TestContext) -> Result<String> {
            Ok(format!("{}!", args[0]))
        }

        let mut library = FunctionLibrary::new("custom", "my:");
        library.register(Function::new("shout", 1, Some(1), shout));
        let mut registry = registry();
        registry.add_library(library);

        let ctx = TestContext::new();
        assert_eq!(
            registry
                .replace_functions_in_string("my:shout(quince:upperCase('hi'))", &ctx, false)
                .unwrap(),
            "HI!"
        );
    }
}
