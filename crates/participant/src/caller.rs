//! Business-logic capabilities and their registry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::ErrorCode;
use serde_json::Value;

use crate::error::{ParticipantError, Result};

/// Undoes the effect of a completed call.
#[async_trait]
pub trait Rollbacker: Send + Sync {
    async fn rollback(&self);
}

/// Rollbacker for calls that failed before touching anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRollbacker;

#[async_trait]
impl Rollbacker for NoopRollbacker {
    async fn rollback(&self) {}
}

/// What a caller returns: an error code and, when the call may need
/// undoing, a rollbacker.
pub struct CallOutcome {
    pub err_code: ErrorCode,
    pub rollbacker: Option<Box<dyn Rollbacker>>,
}

impl CallOutcome {
    pub fn new(err_code: ErrorCode, rollbacker: Option<Box<dyn Rollbacker>>) -> Self {
        Self {
            err_code,
            rollbacker,
        }
    }

    /// A successful call that `rollbacker` can undo.
    pub fn ok(rollbacker: impl Rollbacker + 'static) -> Self {
        Self::new(ErrorCode::OK, Some(Box::new(rollbacker)))
    }

    /// A failed call whose partial effects `rollbacker` undoes.
    pub fn failed(err_code: ErrorCode, rollbacker: impl Rollbacker + 'static) -> Self {
        Self::new(err_code, Some(Box::new(rollbacker)))
    }
}

impl std::fmt::Debug for CallOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallOutcome")
            .field("err_code", &self.err_code)
            .field("has_rollbacker", &self.rollbacker.is_some())
            .finish()
    }
}

/// Business logic executed for a transaction part.
///
/// Implementations that can fail after making externally visible changes
/// must always return a rollbacker: aborting a part whose caller returned
/// none is a protocol violation.
#[async_trait]
pub trait Caller: Send + Sync {
    async fn call(&self, input: &Value) -> CallOutcome;
}

/// Maps operation names to callers. Each name can be registered once.
#[derive(Clone, Default)]
pub struct CallerRegistry {
    callers: Arc<RwLock<HashMap<String, Arc<dyn Caller>>>>,
}

impl CallerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `caller` under `name`.
    pub fn register(&self, name: impl Into<String>, caller: Arc<dyn Caller>) -> Result<()> {
        let name = name.into();
        let mut callers = self.callers.write().expect("caller registry lock poisoned");
        if callers.contains_key(&name) {
            return Err(ParticipantError::DuplicateCaller(name));
        }
        tracing::debug!(caller = %name, "caller registered");
        callers.insert(name, caller);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Caller>> {
        self.callers
            .read()
            .expect("caller registry lock poisoned")
            .get(name)
            .cloned()
    }

    /// Returns all registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let callers = self.callers.read().expect("caller registry lock poisoned");
        let mut names: Vec<String> = callers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.callers.read().expect("caller registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
