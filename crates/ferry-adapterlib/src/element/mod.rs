//! In-memory representation of the data moved from readers to writers.

mod column;
mod record;

pub use column::{Column, ColumnKind, DateType};
pub use record::Record;
