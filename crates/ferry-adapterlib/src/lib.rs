use bytemuck::NoUninit;
use serde::{Deserialize, Serialize};

pub mod element;
pub mod errors;
pub mod transport;

pub use element::{Column, ColumnKind, DateType, Record};
pub use errors::{ConversionError, ConversionTarget};

/// Identifier of a task within a job.
pub type TaskId = u32;

/// Lifecycle state of a task, task group or job.
///
/// A finished state ([`State::Succeeded`], [`State::Failed`],
/// [`State::Killed`]) is never left once entered.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, NoUninit)]
#[repr(u8)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    /// The task has been created but has not started running yet.
    #[default]
    NotStarted,

    /// The task is running.
    Running,

    /// The task completed successfully.
    Succeeded,

    /// The task failed.  The captured error explains why.
    Failed,

    /// The task was killed before completion.
    Killed,
}

impl State {
    /// True for states that are never left once entered.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Killed)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Precedence of the state when merging the states of several tasks:
    /// `Killed > Failed > Running > NotStarted > Succeeded`.
    pub fn severity(&self) -> u8 {
        match self {
            Self::Succeeded => 0,
            Self::NotStarted => 1,
            Self::Running => 2,
            Self::Failed => 3,
            Self::Killed => 4,
        }
    }
}
