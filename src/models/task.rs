// src/models/task.rs
//! Lifecycle of one asynchronous generation.

use serde::{Deserialize, Serialize};

/// Identifies one issued generation call. A completion is only accepted while
/// the slot it targets is still pending with the same ticket, so a late
/// answer to a superseded call can never overwrite a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(pub u64);

/// `value` exists only on success and `message` only on error; the enum makes
/// any other combination unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState<T> {
    Pending(Ticket),
    Success(T),
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Success,
    Error,
}

impl<T> TaskState<T> {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskState::Pending(_) => TaskStatus::Pending,
            TaskState::Success(_) => TaskStatus::Success,
            TaskState::Error(_) => TaskStatus::Error,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, TaskState::Pending(_))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskState::Success(_))
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            TaskState::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            TaskState::Error(message) => Some(message),
            _ => None,
        }
    }

    pub fn is_pending_for(&self, ticket: Ticket) -> bool {
        matches!(self, TaskState::Pending(current) if *current == ticket)
    }
}

/// Success value of an optional slot (absent slots count as "not attempted").
pub fn success_value<T>(slot: &Option<TaskState<T>>) -> Option<&T> {
    slot.as_ref().and_then(TaskState::value)
}
