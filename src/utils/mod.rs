//! Shared utility functions for dedup-forge.

pub mod json_extraction;

pub use json_extraction::{
    extract_json_object, find_matching_brace, unclosed_delimiters, JsonExtractionError,
};
