//! Task statistics: the [`Communication`] aggregate, functions that roll
//! communications up the task → task group → job hierarchy, and
//! dirty-record accounting.

mod communication;
pub mod dirty;
pub mod tool;

pub use communication::{Communication, Counter, DirtyRecord};
