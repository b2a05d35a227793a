//! Walks a variable expression from the variable store down to its leaf value.

use std::sync::Arc;

use super::extractor::{apply_index, SegmentEvaluationError, SegmentVariableExtractor};
use super::matcher::{SegmentMatch, VariableExpressionSegmentMatcher};
use crate::context::TestContext;
use crate::error::{EngineError, Result};
use crate::value::Value;

/// A resolved hop of a variable expression
#[derive(Debug, Clone, PartialEq)]
pub struct VariableExpressionSegment {
    pub name: String,
    pub index: Option<usize>,
    pub value: Value,
}

/// Yields one resolved value per expression segment.
///
/// The root segment is always looked up directly in the context's variable store; every
/// later segment is read from its parent by the first capable extractor. Iteration stops
/// after the first error.
pub struct VariableExpressionIterator<'a> {
    matcher: VariableExpressionSegmentMatcher,
    context: &'a TestContext,
    extractors: &'a [Arc<dyn SegmentVariableExtractor>],
    current: Option<Value>,
    failed: bool,
}

impl<'a> VariableExpressionIterator<'a> {
    pub fn new(
        expression: &str,
        context: &'a TestContext,
        extractors: &'a [Arc<dyn SegmentVariableExtractor>],
    ) -> Result<Self> {
        Ok(Self {
            matcher: VariableExpressionSegmentMatcher::new(expression)?,
            context,
            extractors,
            current: None,
            failed: false,
        })
    }

    fn expression(&self) -> &str {
        self.matcher.variable_expression()
    }

    fn resolve_root(&self, segment: &SegmentMatch) -> Result<Value> {
        let value = self
            .context
            .find_variable(&segment.name)
            .ok_or_else(|| EngineError::NoSuchVariable {
                name: segment.name.clone(),
                expression: self.expression().to_string(),
            })?;

        apply_index(&value, segment, value.clone())
            .map_err(|err| self.evaluation_error(segment, &value, err))
    }

    fn resolve_child(&self, segment: &SegmentMatch, parent: &Value) -> Result<Value> {
        let extractor = self
            .extractors
            .iter()
            .find(|e| e.can_extract(self.context, parent, segment));

        let Some(extractor) = extractor else {
            if segment.is_query() {
                return Err(EngineError::NoExtractor {
                    segment: segment.text.clone(),
                    object_type: parent.type_name().to_string(),
                    expression: self.expression().to_string(),
                });
            }
            return Err(self.unknown_segment(segment));
        };

        tracing::trace!(
            extractor = extractor.name(),
            segment = %segment,
            "Extracting segment value"
        );

        extractor
            .extract_value(self.context, parent, segment)
            .map_err(|err| self.evaluation_error(segment, parent, err))
    }

    fn unknown_segment(&self, segment: &SegmentMatch) -> EngineError {
        let expression = self.expression().to_string();
        if segment.position <= 2 {
            EngineError::UnknownProperty {
                segment: segment.text.clone(),
                expression,
            }
        } else {
            EngineError::UnknownSegment {
                segment: segment.text.clone(),
                expression,
            }
        }
    }

    fn evaluation_error(
        &self,
        segment: &SegmentMatch,
        parent: &Value,
        err: SegmentEvaluationError,
    ) -> EngineError {
        match err {
            SegmentEvaluationError::Missing { .. } => self.unknown_segment(segment),
            SegmentEvaluationError::Invalid { reason, rendered } => EngineError::SegmentExtraction {
                expression: self.expression().to_string(),
                segment: segment.text.clone(),
                position: segment.position,
                total: self.matcher.total_segment_count(),
                reason,
                object_type: parent.type_name().to_string(),
                rendered,
            },
        }
    }
}

impl Iterator for VariableExpressionIterator<'_> {
    type Item = Result<VariableExpressionSegment>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let segment = self.matcher.next()?;

        let resolved = match self.current.as_ref() {
            None => self.resolve_root(&segment),
            Some(parent) => self.resolve_child(&segment, parent),
        };

        match resolved {
            Ok(value) => {
                self.current = Some(value.clone());
                Some(Ok(VariableExpressionSegment {
                    name: segment.name,
                    index: segment.index,
                    value,
                }))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Resolve an expression and return only the value of its last segment.
///
/// Returns `Ok(None)` for an empty expression.
pub fn get_last_expression_value(
    expression: &str,
    context: &TestContext,
    extractors: &[Arc<dyn SegmentVariableExtractor>],
) -> Result<Option<Value>> {
    let mut last = None;
    for segment in VariableExpressionIterator::new(expression, context, extractors)? {
        last = Some(segment?.value);
    }
    Ok(last)
}
