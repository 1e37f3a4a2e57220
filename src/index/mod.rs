pub mod line_index;

pub use line_index::{build_line_index, LineIndex};
