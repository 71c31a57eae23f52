//! `QueuedTaskMessage` auxiliary FIFO (spec.md §3), capped at N=10 per
//! session. Used while a session is paused, so inbound messages are not
//! lost before the session resumes.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::error::{BridgeError, Result};

/// Also governs the live per-session waiter queue in
/// [`crate::concurrency::ConcurrencyManager`] -- the bounded FIFO this
/// type models and the one FIFO that actually exists at runtime share the
/// same capacity.
pub const CAPACITY: usize = 10;

#[derive(Debug, Clone)]
pub struct QueuedTaskMessage {
    pub content: String,
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Default)]
pub struct TaskQueue {
    items: VecDeque<QueuedTaskMessage>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a message onto the queue, rejecting it once `CAPACITY` items
    /// are already queued rather than growing unbounded.
    pub fn push(&mut self, message_id: String, content: String) -> Result<()> {
        if self.items.len() >= CAPACITY {
            return Err(BridgeError::Validation {
                message: format!("task queue at capacity ({CAPACITY})"),
            });
        }
        self.items.push_back(QueuedTaskMessage {
            content,
            message_id,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    pub fn pop(&mut self) -> Option<QueuedTaskMessage> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
