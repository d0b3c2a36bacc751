//! Injectable time source
//!
//! The restorer names its backup directory after the current local time. Going
//! through [`Clock`] lets tests pin that time.

use chrono::{Local, NaiveDateTime};
use std::fmt::Debug;

/// Format of backup directory names, e.g. `20240102_030405_123`
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

/// Source of wall-clock time
pub trait Clock: Debug + Send + Sync {
    /// Current local time
    fn now(&self) -> NaiveDateTime;

    /// Current time rendered as a backup directory name
    fn backup_timestamp(&self) -> String {
        self.now().format(BACKUP_TIMESTAMP_FORMAT).to_string()
    }
}

/// The real system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock stuck at one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}
