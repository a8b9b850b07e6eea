//! Compiled template cache
//!
//! Entries are keyed by `(template key, model type)`. The first caller for a
//! key becomes the leader and compiles; concurrent callers for the same key
//! block on that key's in-flight slot until the leader publishes. The map
//! lock is only held to look up or register slots and entries, so different
//! keys compile in parallel.
//!
//! Failures are handed to the leader and every waiter but never stored.

use crate::compile::CompiledTemplate;
use crate::error::TemplateError;
use crate::runtime::{ExecutionCause, ExecutionError};
use crate::types::{ModelType, ModelTypeId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[cfg(test)]
mod tests;

/// `(template key, model type)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    template: String,
    model_type: ModelTypeId,
}

impl CacheKey {
    pub fn new(template: impl Into<String>, model_type: &ModelType) -> Self {
        Self {
            template: template.into(),
            model_type: model_type.id(),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn model_type(&self) -> &ModelTypeId {
        &self.model_type
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.template, self.model_type)
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub compiled: Arc<CompiledTemplate>,
    pub created_at: DateTime<Utc>,
}

type Outcome = Result<Arc<CompiledTemplate>, TemplateError>;

/// Rendezvous for one running compilation
#[derive(Default)]
struct InFlight {
    outcome: Mutex<Option<Outcome>>,
    ready: Condvar,
}

impl InFlight {
    fn publish(&self, outcome: Outcome) {
        let mut slot = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(outcome);
        self.ready.notify_all();
    }

    fn wait(&self) -> Outcome {
        let mut slot = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            slot = self
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    in_flight: HashMap<CacheKey, Arc<InFlight>>,
}

enum Role {
    Leader(Arc<InFlight>),
    Waiter(Arc<InFlight>),
}

#[derive(Default)]
pub struct TemplateCache {
    state: Mutex<CacheState>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached template for `key`, compiling it with `compile`
    /// when no entry exists.
    ///
    /// At most one `compile` runs per key at a time. Callers that arrive
    /// while it runs wait for its outcome instead of compiling again.
    pub fn get_or_compile<F>(&self, key: &CacheKey, compile: F) -> Outcome
    where
        F: FnOnce() -> Result<CompiledTemplate, TemplateError>,
    {
        let role = {
            let mut state = self.state();
            if let Some(entry) = state.entries.get(key) {
                debug!(key = %key, "template cache hit");
                return Ok(Arc::clone(&entry.compiled));
            }
            match state.in_flight.get(key) {
                Some(slot) => Role::Waiter(Arc::clone(slot)),
                None => {
                    let slot = Arc::new(InFlight::default());
                    state.in_flight.insert(key.clone(), Arc::clone(&slot));
                    Role::Leader(slot)
                }
            }
        };

        match role {
            Role::Waiter(slot) => {
                debug!(key = %key, "waiting for in-flight compilation");
                slot.wait()
            }
            Role::Leader(slot) => {
                debug!(key = %key, "template cache miss");
                let mut leader = Leader {
                    cache: self,
                    key,
                    slot,
                    finished: false,
                };
                let outcome = compile().map(Arc::new);
                leader.finish(outcome.clone());
                outcome
            }
        }
    }

    /// Stores the outcome if the slot is still registered, then wakes
    /// waiters.
    fn complete(&self, key: &CacheKey, slot: &Arc<InFlight>, outcome: Outcome) {
        {
            let mut state = self.state();
            let registered = state
                .in_flight
                .get(key)
                .is_some_and(|current| Arc::ptr_eq(current, slot));
            if registered {
                state.in_flight.remove(key);
                if let Ok(compiled) = &outcome {
                    state.entries.insert(
                        key.clone(),
                        CacheEntry {
                            key: key.clone(),
                            compiled: Arc::clone(compiled),
                            created_at: Utc::now(),
                        },
                    );
                }
            } else {
                debug!(key = %key, "compilation finished for an invalidated key");
            }
        }
        slot.publish(outcome);
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state().entries.contains_key(key)
    }

    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.state().entries.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().entries.is_empty()
    }

    /// Removes every entry for `template`, whatever its model type.
    ///
    /// In-flight compilations of the template are detached: their outcome
    /// still reaches their waiters but is not stored. Returns the number of
    /// entries removed.
    pub fn invalidate(&self, template: &str) -> usize {
        let mut state = self.state();
        let before = state.entries.len();
        state.entries.retain(|key, _| key.template != template);
        state.in_flight.retain(|key, _| key.template != template);
        let removed = before - state.entries.len();
        debug!(template, removed, "invalidated template");
        removed
    }

    /// Drops every entry and detaches every in-flight compilation
    pub fn clear(&self) {
        let mut state = self.state();
        state.entries.clear();
        state.in_flight.clear();
    }
}

impl fmt::Debug for TemplateCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("TemplateCache")
            .field("entries", &state.entries.len())
            .field("in_flight", &state.in_flight.len())
            .finish()
    }
}

/// Publishes `CompilationAborted` if the leader unwinds before finishing
struct Leader<'a> {
    cache: &'a TemplateCache,
    key: &'a CacheKey,
    slot: Arc<InFlight>,
    finished: bool,
}

impl Leader<'_> {
    fn finish(&mut self, outcome: Outcome) {
        self.finished = true;
        self.cache.complete(self.key, &self.slot, outcome);
    }
}

impl Drop for Leader<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let aborted = TemplateError::Execution(ExecutionError::new(
                self.key.template(),
                None,
                ExecutionCause::CompilationAborted,
            ));
            self.cache.complete(self.key, &self.slot, Err(aborted));
        }
    }
}
