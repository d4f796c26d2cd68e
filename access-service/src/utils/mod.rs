pub mod validation;

pub use validation::{is_valid_name, ValidatedJson};
