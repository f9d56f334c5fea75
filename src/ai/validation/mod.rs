//! Model response validation
//!
//! Model replies are salvaged into JSON and checked against the step schema
//! before executors map them onto their typed results.

mod structured;

pub use structured::{parse_structured, schema_instructions};
