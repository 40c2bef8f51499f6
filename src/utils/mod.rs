//! Shared utility functions for polyplex.
//!
//! Tolerant JSON extraction from LLM responses, plus lenient field
//! deserializers for the structured replies.

pub mod json_extraction;
pub mod lenient;

pub use json_extraction::{
    decode_structured, find_matching_brace, strip_code_fences, try_extract_json_from_response,
    Decoded, JsonExtractionError, JsonExtractionResult,
};
