use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use uuid::Uuid;

use crate::{PoolError, PoolResult};

/// In-memory entity table with per-entity serialization.
///
/// The index lock is held only long enough to find a row; transitions run
/// under the row's own lock, so different entities never wait on each other
/// while writes to the same entity are applied one at a time.
///
/// A row is only overwritten after its transition returns `Ok`, so a lock
/// poisoned by a panicking transition still guards the last committed value
/// and is recovered rather than reported.
pub struct EntityTable<T> {
    entity: &'static str,
    rows: RwLock<HashMap<Uuid, Arc<Mutex<T>>>>,
}

impl<T: Clone> EntityTable<T> {
    pub fn new(entity: &'static str) -> Self {
        Self {
            entity,
            rows: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a new row. Ids are never reused.
    pub fn insert(&self, id: Uuid, value: T) -> PoolResult<()> {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        if rows.contains_key(&id) {
            return Err(PoolError::Conflict(format!("{} {} already exists", self.entity, id)));
        }
        rows.insert(id, Arc::new(Mutex::new(value)));
        Ok(())
    }

    pub fn get(&self, id: &Uuid) -> PoolResult<Option<T>> {
        let Some(row) = self.row(id)? else {
            return Ok(None);
        };
        let value = lock_row(&row);
        Ok(Some(value.clone()))
    }

    /// Snapshot every row matching the predicate.
    pub fn filter<F>(&self, predicate: F) -> PoolResult<Vec<T>>
    where
        F: Fn(&T) -> bool,
    {
        let rows: Vec<Arc<Mutex<T>>> = {
            let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
            rows.values().cloned().collect()
        };

        let mut out = Vec::new();
        for row in rows {
            let value = lock_row(&row);
            if predicate(&value) {
                out.push(value.clone());
            }
        }
        Ok(out)
    }

    /// Apply a transition atomically. The row is only changed if the
    /// transition succeeds; the updated row is returned.
    pub fn apply<F>(&self, id: &Uuid, transition: F) -> PoolResult<T>
    where
        F: FnOnce(&mut T) -> PoolResult<()>,
    {
        let row = self
            .row(id)?
            .ok_or_else(|| PoolError::not_found(self.entity, id))?;
        let mut current = lock_row(&row);

        let mut draft = current.clone();
        transition(&mut draft)?;
        *current = draft;
        Ok(current.clone())
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn row(&self, id: &Uuid) -> PoolResult<Option<Arc<Mutex<T>>>> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        Ok(rows.get(id).cloned())
    }
}

fn lock_row<T>(row: &Mutex<T>) -> MutexGuard<'_, T> {
    row.lock().unwrap_or_else(PoisonError::into_inner)
}
