//! Segment variable extractors.
//!
//! An extractor reads the child value named by one expression segment out of a parent
//! value. The registry keeps an ordered chain; the first extractor whose
//! [`SegmentVariableExtractor::can_extract`] holds is used for a segment.

use std::sync::Arc;

use super::json_path;
use super::matcher::{SegmentKind, SegmentMatch};
use crate::context::TestContext;
use crate::value::Value;

/// Why an extractor could not produce a value
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentEvaluationError {
    /// The named or indexed child does not exist
    Missing { reason: String },
    /// The parent could not be navigated (bad index, wrong type, unparsable content)
    Invalid { reason: String, rendered: String },
}

impl SegmentEvaluationError {
    pub fn missing(reason: impl Into<String>) -> Self {
        SegmentEvaluationError::Missing {
            reason: reason.into(),
        }
    }

    pub fn invalid(reason: impl Into<String>, parent: &Value) -> Self {
        SegmentEvaluationError::Invalid {
            reason: reason.into(),
            rendered: parent.render_minimal(),
        }
    }
}

/// Strategy reading a child value from a parent value
pub trait SegmentVariableExtractor: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    fn can_extract(&self, context: &TestContext, parent: &Value, segment: &SegmentMatch) -> bool;

    fn extract_value(
        &self,
        context: &TestContext,
        parent: &Value,
        segment: &SegmentMatch,
    ) -> Result<Value, SegmentEvaluationError>;
}

/// Apply the segment's optional index to an already extracted value.
pub fn apply_index(
    parent: &Value,
    segment: &SegmentMatch,
    value: Value,
) -> Result<Value, SegmentEvaluationError> {
    let Some(index) = segment.index else {
        return Ok(value);
    };

    match value {
        Value::Array(mut items) => {
            let length = items.len();
            if index >= length {
                return Err(SegmentEvaluationError::invalid(
                    format!(
                        "Index {} out of bounds (array length {}) for segment '{}'",
                        index, length, segment.text
                    ),
                    parent,
                ));
            }
            Ok(items.swap_remove(index))
        }
        Value::Null => Err(SegmentEvaluationError::invalid(
            format!(
                "Cannot index into null for segment '{}' (index {})",
                segment.text, index
            ),
            parent,
        )),
        other => Err(SegmentEvaluationError::invalid(
            format!(
                "Expected array for indexed access, but was {} (segment '{}')",
                other.type_name(),
                segment.text
            ),
            parent,
        )),
    }
}

/// Looks the segment name up as key of a [`Value::Map`]
#[derive(Debug, Default, Clone, Copy)]
pub struct MapVariableExtractor;

impl SegmentVariableExtractor for MapVariableExtractor {
    fn name(&self) -> &str {
        "map"
    }

    fn can_extract(&self, _context: &TestContext, parent: &Value, segment: &SegmentMatch) -> bool {
        segment.kind == SegmentKind::Property && matches!(parent, Value::Map(_))
    }

    fn extract_value(
        &self,
        _context: &TestContext,
        parent: &Value,
        segment: &SegmentMatch,
    ) -> Result<Value, SegmentEvaluationError> {
        let Value::Map(map) = parent else {
            return Err(SegmentEvaluationError::invalid(
                format!(
                    "Expected Map for segment '{}' but was {}",
                    segment.text,
                    parent.type_name()
                ),
                parent,
            ));
        };

        let value = map.get(&segment.name).cloned().ok_or_else(|| {
            SegmentEvaluationError::missing(format!("Unknown key '{}' in Map", segment.name))
        })?;
        apply_index(parent, segment, value)
    }
}

/// Reads named fields of struct-like values.
///
/// Claims every non-string, non-null parent so that it reports unknown fields for
/// values nothing else in the chain understands.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectFieldValueExtractor;

impl SegmentVariableExtractor for ObjectFieldValueExtractor {
    fn name(&self) -> &str {
        "object-field"
    }

    fn can_extract(&self, _context: &TestContext, parent: &Value, segment: &SegmentMatch) -> bool {
        segment.kind == SegmentKind::Property && !matches!(parent, Value::String(_) | Value::Null)
    }

    fn extract_value(
        &self,
        _context: &TestContext,
        parent: &Value,
        segment: &SegmentMatch,
    ) -> Result<Value, SegmentEvaluationError> {
        let field = match parent {
            Value::Struct { fields, .. } => fields.get(&segment.name).cloned(),
            _ => None,
        };

        let value = field.ok_or_else(|| {
            SegmentEvaluationError::missing(format!(
                "Unknown field '{}' on type {}",
                segment.name,
                parent.type_name()
            ))
        })?;
        apply_index(parent, segment, value)
    }
}

/// Evaluates terminal `jsonPath(...)` segments against JSON text or structured values
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonPathVariableExtractor;

impl SegmentVariableExtractor for JsonPathVariableExtractor {
    fn name(&self) -> &str {
        "json-path"
    }

    fn can_extract(&self, _context: &TestContext, parent: &Value, segment: &SegmentMatch) -> bool {
        segment.kind == SegmentKind::JsonPath
            && matches!(
                parent,
                Value::String(_) | Value::Map(_) | Value::Array(_) | Value::Struct { .. }
            )
    }

    fn extract_value(
        &self,
        _context: &TestContext,
        parent: &Value,
        segment: &SegmentMatch,
    ) -> Result<Value, SegmentEvaluationError> {
        let document = match parent {
            Value::String(text) => serde_json::from_str::<serde_json::Value>(text).map_err(|e| {
                SegmentEvaluationError::invalid(format!("Failed to parse JSON: {}", e), parent)
            })?,
            other => serde_json::Value::from(other),
        };

        let mut matches = json_path::evaluate(&document, &segment.name)
            .map_err(|reason| SegmentEvaluationError::invalid(reason, parent))?;

        match matches.len() {
            0 => Err(SegmentEvaluationError::missing(format!(
                "No result for JSONPath expression '{}'",
                segment.name
            ))),
            1 => Ok(Value::from(matches.remove(0))),
            _ => Ok(Value::Array(matches.into_iter().map(Value::from).collect())),
        }
    }
}

/// Ordered chain of segment extractors
#[derive(Clone)]
pub struct SegmentVariableExtractorRegistry {
    extractors: Vec<Arc<dyn SegmentVariableExtractor>>,
}

impl SegmentVariableExtractorRegistry {
    /// Registry without any extractor, only root lookups will resolve
    pub fn empty() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// Append an extractor; it is consulted after the ones already registered
    pub fn register(&mut self, extractor: Arc<dyn SegmentVariableExtractor>) {
        self.extractors.push(extractor);
    }

    pub fn extractors(&self) -> &[Arc<dyn SegmentVariableExtractor>] {
        &self.extractors
    }

    pub fn names(&self) -> Vec<&str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }
}

impl Default for SegmentVariableExtractorRegistry {
    fn default() -> Self {
        Self {
            extractors: vec![
                Arc::new(MapVariableExtractor),
                Arc::new(ObjectFieldValueExtractor),
                Arc::new(JsonPathVariableExtractor),
            ],
        }
    }
}

impl std::fmt::Debug for SegmentVariableExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentVariableExtractorRegistry")
            .field("extractors", &self.names())
            .finish()
    }
}
