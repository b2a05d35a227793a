//! Variable expression resolution
//!
//! # Architecture
//!
//! 1. **matcher** - split `root.items[0].jsonPath($.id)` into segments
//! 2. **extractor** - ordered strategies reading a child value out of a parent value
//! 3. **iterator** - walk the segments from the variable store to the leaf value
//! 4. **replace** - expand `${...}` references inside strings
//!
//! The root segment is always a direct variable store lookup. Every later hop is
//! delegated to the first extractor in the chain that can handle the parent value, so
//! new value kinds only need a new extractor.

pub mod extractor;
pub mod iterator;
pub mod json_path;
pub mod matcher;
pub mod replace;

pub use extractor::{
    apply_index, JsonPathVariableExtractor, MapVariableExtractor, ObjectFieldValueExtractor,
    SegmentEvaluationError, SegmentVariableExtractor, SegmentVariableExtractorRegistry,
};
pub use iterator::{get_last_expression_value, VariableExpressionIterator, VariableExpressionSegment};
pub use matcher::{tokenize, SegmentKind, SegmentMatch, VariableExpressionSegmentMatcher};
pub use replace::{cut_off_variables_prefix, is_variable_name, replace_variables_in_string};
