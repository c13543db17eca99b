pub mod format;

pub use format::{fixed_decimals, with_comma};
