//! Minimal JSONPath evaluation for `jsonPath(...)` expression segments.
//!
//! Supported steps: `$`, `.key`, `['key']`, `[n]`, `[*]`, `.*` and recursive `..key`.

use serde_json::Value as Json;

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Child(String),
    Index(usize),
    Wildcard,
    Descendant(String),
}

fn parse(path: &str) -> Result<Vec<Step>, String> {
    let path = path.trim();
    let mut chars = path.char_indices().peekable();

    match chars.next() {
        Some((_, '$')) => {}
        _ => return Err(format!("JSONPath '{}' must start with '$'", path)),
    }

    let mut steps = Vec::new();
    while let Some((pos, c)) = chars.next() {
        match c {
            '.' => {
                let recursive = matches!(chars.peek(), Some((_, '.')));
                if recursive {
                    chars.next();
                }
                let mut name = String::new();
                while let Some(&(_, next)) = chars.peek() {
                    if next == '.' || next == '[' {
                        break;
                    }
                    name.push(next);
                    chars.next();
                }
                if name.is_empty() {
                    return Err(format!("empty property name at position {} in '{}'", pos, path));
                }
                steps.push(match (recursive, name.as_str()) {
                    (true, _) => Step::Descendant(name),
                    (false, "*") => Step::Wildcard,
                    (false, _) => Step::Child(name),
                });
            }
            '[' => {
                let mut inner = String::new();
                let mut closed = false;
                for (_, next) in chars.by_ref() {
                    if next == ']' {
                        closed = true;
                        break;
                    }
                    inner.push(next);
                }
                if !closed {
                    return Err(format!("unclosed '[' at position {} in '{}'", pos, path));
                }
                let inner = inner.trim();
                let quoted = (inner.starts_with('\'') && inner.ends_with('\''))
                    || (inner.starts_with('"') && inner.ends_with('"'));
                if inner == "*" {
                    steps.push(Step::Wildcard);
                } else if quoted && inner.len() >= 2 {
                    steps.push(Step::Child(inner[1..inner.len() - 1].to_string()));
                } else {
                    let index = inner
                        .parse::<usize>()
                        .map_err(|_| format!("invalid index '[{}]' in '{}'", inner, path))?;
                    steps.push(Step::Index(index));
                }
            }
            other => {
                return Err(format!(
                    "unexpected '{}' at position {} in '{}'",
                    other, pos, path
                ))
            }
        }
    }

    Ok(steps)
}

fn collect_descendants<'a>(node: &'a Json, name: &str, out: &mut Vec<&'a Json>) {
    match node {
        Json::Object(map) => {
            if let Some(found) = map.get(name) {
                out.push(found);
            }
            for child in map.values() {
                collect_descendants(child, name, out);
            }
        }
        Json::Array(items) => {
            for child in items {
                collect_descendants(child, name, out);
            }
        }
        _ => {}
    }
}

/// Evaluate a JSONPath expression, returning every matching node in document order.
pub fn evaluate(document: &Json, path: &str) -> Result<Vec<Json>, String> {
    let steps = parse(path)?;
    let mut current: Vec<&Json> = vec![document];

    for step in &steps {
        let mut next = Vec::new();
        for node in current {
            match (step, node) {
                (Step::Child(name), Json::Object(map)) => next.extend(map.get(name)),
                (Step::Index(index), Json::Array(items)) => next.extend(items.get(*index)),
                (Step::Wildcard, Json::Object(map)) => next.extend(map.values()),
                (Step::Wildcard, Json::Array(items)) => next.extend(items.iter()),
                (Step::Descendant(name), _) => collect_descendants(node, name, &mut next),
                _ => {}
            }
        }
        current = next;
    }

    Ok(current.into_iter().cloned().collect())
}
