pub mod validation;

pub use validation::{file_extension, validate_extension};
