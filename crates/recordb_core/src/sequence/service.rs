//! Block-reserving id allocator and type registry.

use crate::codec::{from_cbor, to_cbor};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::key::{validate_type_name, Key, ResolvedKey};
use crate::sequence::counter::Counter;
use crate::table::{table_name, ScanOptions, Table, TableCatalog};
use crate::types::TypeId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

const SEQUENCE_STORE: &str = "sequence";

/// Registry row: type name (row key) to tag.
#[derive(Debug, Serialize, Deserialize)]
struct TypeRow {
    id: u32,
}

/// Counter row: type tag (row key) to the highest reserved or issued id.
#[derive(Debug, Serialize, Deserialize)]
struct CounterRow {
    type_name: String,
    high_water: u64,
}

#[derive(Debug, Default)]
struct SequenceState {
    type_ids: HashMap<Arc<str>, TypeId>,
    type_names: HashMap<TypeId, Arc<str>>,
    next_type_id: u32,
    counters: HashMap<TypeId, Counter>,
    shut_down: bool,
}

/// Hands out strictly increasing ids per logical type.
///
/// Ids are reserved from storage a block at a time: the first allocation
/// for a type advances its persisted high-water mark by `block_size` and
/// later allocations are served from memory until the block runs out.
/// [`shutdown`](Self::shutdown) writes back the last issued id so a clean
/// restart loses nothing; a crash loses at most the unused remainder of one
/// block per type.
///
/// All operations serialize on one mutex.
pub struct SequenceService {
    block_size: u64,
    strict_types: bool,
    registry: Arc<Table>,
    counters: Arc<Table>,
    state: Mutex<SequenceState>,
}

impl SequenceService {
    /// Opens (creating if needed) the registry and counter tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the tables cannot be opened or a row is undecodable.
    pub fn open(catalog: &TableCatalog, config: &Config) -> CoreResult<Self> {
        let registry = catalog.open(&table_name(&config.group, SEQUENCE_STORE, "registry"))?;
        let counters = catalog.open(&table_name(&config.group, SEQUENCE_STORE, "counters"))?;

        let mut state = SequenceState {
            next_type_id: 1,
            ..SequenceState::default()
        };
        for row in registry.scan(ScanOptions::default()) {
            let (name, row) = row?;
            let name = String::from_utf8(name)
                .map_err(|_| CoreError::table_corruption(registry.name(), "type name is not UTF-8"))?;
            let type_id = TypeId::new(from_cbor::<TypeRow>(&row.value)?.id);
            let name: Arc<str> = Arc::from(name);
            state.next_type_id = state.next_type_id.max(type_id.as_u32() + 1);
            state.type_ids.insert(Arc::clone(&name), type_id);
            state.type_names.insert(type_id, name);
        }
        tracing::debug!(types = state.type_ids.len(), "loaded type registry");

        Ok(Self {
            block_size: config.block_size,
            strict_types: config.strict_types,
            registry,
            counters,
            state: Mutex::new(state),
        })
    }

    /// Returns the tag for `name`, creating the registry row if allowed.
    ///
    /// Rows are created on demand unless the store runs in strict mode and
    /// `create` is false.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for an invalid name and
    /// [`CoreError::UnknownType`] when strict mode refuses to create it.
    pub fn get_type_id(&self, name: &str, create: bool) -> CoreResult<TypeId> {
        validate_type_name(name)?;
        let mut state = self.state.lock();
        self.type_id_locked(&mut state, name, create)
    }

    /// Registers `name` (creating its row even in strict mode).
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid name or if the row cannot be written.
    pub fn register_type(&self, name: &str) -> CoreResult<TypeId> {
        self.get_type_id(name, true)
    }

    /// Returns the tag of `name` without ever creating a registry row.
    #[must_use]
    pub fn find_type_id(&self, name: &str) -> Option<TypeId> {
        self.state.lock().type_ids.get(name).copied()
    }

    /// Returns the type name registered for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownTypeId`] if no row exists.
    pub fn get_type_name(&self, id: TypeId) -> CoreResult<String> {
        self.state
            .lock()
            .type_names
            .get(&id)
            .map(|name| name.to_string())
            .ok_or(CoreError::UnknownTypeId { id: id.as_u32() })
    }

    fn type_id_locked(&self, state: &mut SequenceState, name: &str, create: bool) -> CoreResult<TypeId> {
        if let Some(&id) = state.type_ids.get(name) {
            return Ok(id);
        }
        if self.strict_types && !create {
            return Err(CoreError::UnknownType {
                name: name.to_string(),
            });
        }

        let id = TypeId::new(state.next_type_id);
        self.registry
            .insert(name.as_bytes(), &to_cbor(&TypeRow { id: id.as_u32() })?)?;
        state.next_type_id += 1;

        let name: Arc<str> = Arc::from(name);
        state.type_ids.insert(Arc::clone(&name), id);
        state.type_names.insert(id, name);
        tracing::debug!(type_name = name_of(state, id), %id, "registered type");
        Ok(id)
    }

    fn read_high_water(&self, type_id: TypeId) -> CoreResult<u64> {
        match self.counters.get(&type_id.as_u32().to_be_bytes())? {
            Some(row) => Ok(from_cbor::<CounterRow>(&row.value)?.high_water),
            None => Ok(0),
        }
    }

    fn write_high_water(&self, type_id: TypeId, type_name: &str, high_water: u64) -> CoreResult<()> {
        let row = to_cbor(&CounterRow {
            type_name: type_name.to_string(),
            high_water,
        })?;
        self.counters.put(&type_id.as_u32().to_be_bytes(), &row)?;
        Ok(())
    }

    /// Ensures `state.counters[type_id]` exists and is not exhausted.
    fn live_counter<'s>(
        &self,
        state: &'s mut SequenceState,
        type_id: TypeId,
    ) -> CoreResult<&'s mut Counter> {
        let needs_block = state
            .counters
            .get(&type_id)
            .map_or(true, Counter::is_exhausted);

        if needs_block {
            let type_name = name_of(state, type_id).to_string();
            let (counter, high_water) = self
                .read_high_water(type_id)
                .and_then(|current| Counter::reserve(type_id, current, self.block_size))
                .and_then(|(counter, high_water)| {
                    self.write_high_water(type_id, &type_name, high_water)?;
                    Ok((counter, high_water))
                })
                .map_err(|e| match e {
                    CoreError::Allocation { .. } => e,
                    other => CoreError::allocation(format!(
                        "failed to reserve ids for {type_name}: {other}"
                    )),
                })?;
            tracing::debug!(
                type_name = %type_name,
                first = counter.peek(),
                high_water,
                "reserved id block"
            );
            state.counters.insert(type_id, counter);
        }

        state
            .counters
            .get_mut(&type_id)
            .ok_or_else(|| CoreError::allocation("counter vanished during reservation"))
    }

    fn ensure_running(state: &SequenceState) -> CoreResult<()> {
        if state.shut_down {
            return Err(CoreError::illegal_state("sequence service is shut down"));
        }
        Ok(())
    }

    /// Issues the next id for `type_name`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for an invalid name,
    /// [`CoreError::UnknownType`] in strict mode for unregistered types, and
    /// [`CoreError::Allocation`] if a new block cannot be reserved. No id is
    /// issued on error.
    pub fn next_key(&self, type_name: &str) -> CoreResult<Key> {
        validate_type_name(type_name)?;
        let mut state = self.state.lock();
        Self::ensure_running(&state)?;

        let type_id = self.type_id_locked(&mut state, type_name, false)?;
        let id = self
            .live_counter(&mut state, type_id)?
            .take()
            .ok_or_else(|| CoreError::allocation("fresh block is empty"))?;
        Ok(Key::from_parts(shared_name(&state, type_id), id))
    }

    /// Returns the key the next [`next_key`](Self::next_key) call would
    /// produce, without consuming it.
    ///
    /// Returns `None` if no counter has been created for the type in this
    /// process yet.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for an invalid name.
    pub fn peek_key(&self, type_name: &str) -> CoreResult<Option<Key>> {
        validate_type_name(type_name)?;
        let state = self.state.lock();
        let Some(&type_id) = state.type_ids.get(type_name) else {
            return Ok(None);
        };
        Ok(state
            .counters
            .get(&type_id)
            .map(|counter| Key::from_parts(shared_name(&state, type_id), counter.peek())))
    }

    /// Forces the counter forward so the next issued id is greater than `id`.
    ///
    /// Used when a key is injected from outside normal allocation.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Allocation`] if `id` lies beyond the reserved
    /// block ceiling.
    pub fn bump_key(&self, type_name: &str, id: u64) -> CoreResult<()> {
        validate_type_name(type_name)?;
        let mut state = self.state.lock();
        Self::ensure_running(&state)?;

        let type_id = self.type_id_locked(&mut state, type_name, false)?;
        self.live_counter(&mut state, type_id)?.bump_past(id)
    }

    /// Converts a logical key to its internal form.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownType`] if the type was never registered.
    pub fn resolve_key(&self, key: &Key) -> CoreResult<ResolvedKey> {
        let state = self.state.lock();
        let type_id = state
            .type_ids
            .get(key.type_name())
            .copied()
            .ok_or_else(|| CoreError::UnknownType {
                name: key.type_name().to_string(),
            })?;
        Ok(ResolvedKey::new(type_id, key.id()))
    }

    /// Converts an internal key back to its logical form.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownTypeId`] for an unregistered tag and
    /// [`CoreError::InvalidArgument`] if the id does not fit in 64 bits.
    pub fn unresolve_key(&self, resolved: ResolvedKey) -> CoreResult<Key> {
        let id = resolved
            .id()
            .ok_or_else(|| CoreError::invalid_argument("resolved id exceeds 64 bits"))?;
        let state = self.state.lock();
        if !state.type_names.contains_key(&resolved.type_id) {
            return Err(CoreError::UnknownTypeId {
                id: resolved.type_id.as_u32(),
            });
        }
        Ok(Key::from_parts(shared_name(&state, resolved.type_id), id))
    }

    /// Forgets the type's counter and rewrites its high-water mark to zero.
    ///
    /// The next allocation starts again at id 1. Unknown types are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter row cannot be written.
    pub fn reset_counter(&self, type_name: &str) -> CoreResult<()> {
        validate_type_name(type_name)?;
        let mut state = self.state.lock();
        let Some(&type_id) = state.type_ids.get(type_name) else {
            return Ok(());
        };
        state.counters.remove(&type_id);
        self.write_high_water(type_id, type_name, 0)?;
        tracing::debug!(type_name, "reset sequence counter");
        Ok(())
    }

    /// Returns the persisted high-water mark of a type (0 if none).
    ///
    /// # Errors
    ///
    /// Returns an error if the counter row cannot be read.
    pub fn persisted_high_water(&self, type_name: &str) -> CoreResult<u64> {
        let type_id = {
            let state = self.state.lock();
            match state.type_ids.get(type_name) {
                Some(&id) => id,
                None => return Ok(0),
            }
        };
        self.read_high_water(type_id)
    }

    /// Writes every live counter's position and retires the counters.
    ///
    /// The next allocation for each type reserves a fresh block that starts
    /// right after the last issued id.
    ///
    /// # Errors
    ///
    /// Returns an error if a counter row cannot be written; counters not yet
    /// written stay live.
    pub fn persist(&self) -> CoreResult<()> {
        let mut state = self.state.lock();
        self.persist_locked(&mut state)
    }

    fn persist_locked(&self, state: &mut SequenceState) -> CoreResult<()> {
        let type_ids: Vec<TypeId> = state.counters.keys().copied().collect();
        for type_id in type_ids {
            if let Some(counter) = state.counters.get(&type_id) {
                let position = counter.position();
                self.write_high_water(counter.type_id(), name_of(state, type_id), position)?;
            }
            state.counters.remove(&type_id);
        }
        self.counters.sync()?;
        Ok(())
    }

    /// Persists all counters and refuses further allocation.
    ///
    /// Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if counter positions cannot be written.
    pub fn shutdown(&self) -> CoreResult<()> {
        let mut state = self.state.lock();
        if state.shut_down {
            return Ok(());
        }
        let live = state.counters.len();
        self.persist_locked(&mut state)?;
        state.shut_down = true;
        tracing::info!(counters = live, "sequence service shut down");
        Ok(())
    }
}

impl std::fmt::Debug for SequenceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SequenceService")
            .field("block_size", &self.block_size)
            .field("strict_types", &self.strict_types)
            .field("types", &state.type_ids.len())
            .field("live_counters", &state.counters.len())
            .finish_non_exhaustive()
    }
}

fn name_of(state: &SequenceState, type_id: TypeId) -> &str {
    state.type_names.get(&type_id).map_or("", |name| name)
}

fn shared_name(state: &SequenceState, type_id: TypeId) -> Arc<str> {
    state
        .type_names
        .get(&type_id)
        .cloned()
        .unwrap_or_else(|| Arc::from(""))
}
