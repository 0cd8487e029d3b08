//! First-error-wins aggregation for the two parallel phases (relocation and
//! CU indexing). Workers race to fill the slot; whoever gets there first
//! wins and everyone else's failures are dropped on the floor, matching the
//! upstream indexer's `set_error_if_none` behavior.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::{Error, Result};

pub struct ErrorSlot {
    set: AtomicBool,
    error: Mutex<Option<Error>>,
}

impl ErrorSlot {
    pub fn new() -> Self {
        ErrorSlot {
            set: AtomicBool::new(false),
            error: Mutex::new(None),
        }
    }

    /// Cheap fast-path check so workers on the happy path never touch the
    /// mutex.
    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::Relaxed)
    }

    pub fn set(&self, err: Error) {
        if self.set.swap(true, Ordering::AcqRel) {
            return;
        }
        *self.error.lock().unwrap() = Some(err);
    }

    pub fn into_result(self) -> Result<()> {
        match self.error.into_inner().unwrap() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Default for ErrorSlot {
    fn default() -> Self {
        Self::new()
    }
}
