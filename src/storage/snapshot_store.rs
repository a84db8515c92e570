use crate::error::RefreshError;
use crate::types::{
    unix_now_ms, ControllerPhase, NetworkSnapshot, SnapshotStatus, ValidatorMetadata,
};
use crate::utils::hex::address_key;
use alloy::primitives::Address;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

struct StatusState {
    phase: ControllerPhase,
    last_update_ms: Option<u64>,
    degraded_since_ms: Option<u64>,
    last_error: Option<String>,
}

/// The single shared cache: published snapshot, controller status and the
/// metadata cache. Readers clone the `Arc` and never see a half-built snapshot.
pub struct SnapshotStore {
    current: RwLock<Option<Arc<NetworkSnapshot>>>,
    status: Mutex<StatusState>,
    metadata: DashMap<String, ValidatorMetadata>,
    generation_seq: AtomicU64,
    stale_after: Duration,
}

impl SnapshotStore {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            current: RwLock::new(None),
            status: Mutex::new(StatusState {
                phase: ControllerPhase::Initializing,
                last_update_ms: None,
                degraded_since_ms: None,
                last_error: None,
            }),
            metadata: DashMap::new(),
            generation_seq: AtomicU64::new(0),
            stale_after,
        }
    }

    fn status_guard(&self) -> std::sync::MutexGuard<'_, StatusState> {
        match self.status.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }

    /// Reserve the generation id for a new build cycle.
    pub fn next_generation(&self) -> u64 {
        self.generation_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn snapshot(&self) -> Option<Arc<NetworkSnapshot>> {
        match self.current.read() {
            Ok(g) => g.clone(),
            Err(p) => p.into_inner().clone(),
        }
    }

    pub fn current_generation(&self) -> u64 {
        self.snapshot().map(|s| s.generation).unwrap_or(0)
    }

    /// Swap in `snapshot` unless an equal or newer generation is already live.
    pub fn publish(&self, snapshot: NetworkSnapshot) -> Result<Arc<NetworkSnapshot>, RefreshError> {
        let next = Arc::new(snapshot);
        {
            let mut slot = match self.current.write() {
                Ok(g) => g,
                Err(p) => p.into_inner(),
            };
            if let Some(live) = slot.as_ref() {
                if live.generation >= next.generation {
                    return Err(RefreshError::Superseded {
                        generation: next.generation,
                        current: live.generation,
                    });
                }
            }
            *slot = Some(Arc::clone(&next));
        }
        let mut status = self.status_guard();
        status.phase = ControllerPhase::Ready;
        status.last_update_ms = Some(next.built_at_ms.max(1));
        status.degraded_since_ms = None;
        status.last_error = None;
        Ok(next)
    }

    pub fn set_phase(&self, phase: ControllerPhase) {
        self.status_guard().phase = phase;
    }

    pub fn phase(&self) -> ControllerPhase {
        self.status_guard().phase
    }

    /// Keep the last snapshot and record why the refresh failed.
    pub fn mark_degraded(&self, error: impl Into<String>) {
        let mut status = self.status_guard();
        status.phase = ControllerPhase::Degraded;
        if status.degraded_since_ms.is_none() {
            status.degraded_since_ms = Some(unix_now_ms());
        }
        status.last_error = Some(error.into());
    }

    pub fn status(&self) -> SnapshotStatus {
        let snapshot = self.snapshot();
        let status = self.status_guard();
        // Only `publish` clears degradation; a cycle in progress does not.
        let degraded = status.degraded_since_ms.is_some();
        let aged_out = status.last_update_ms.map_or(false, |at| {
            unix_now_ms().saturating_sub(at) > self.stale_after.as_millis() as u64
        });
        SnapshotStatus {
            ready: snapshot.is_some(),
            stale: degraded || aged_out,
            degraded,
            phase: status.phase,
            generation: snapshot.as_ref().map(|s| s.generation).unwrap_or(0),
            validator_count: snapshot.as_ref().map(|s| s.validators.len()).unwrap_or(0),
            last_update_ms: status.last_update_ms,
            degraded_since_ms: status.degraded_since_ms,
            last_error: status.last_error.clone(),
        }
    }

    pub fn metadata(&self, address: &Address) -> Option<ValidatorMetadata> {
        self.metadata
            .get(&address_key(address))
            .map(|entry| entry.value().clone())
    }

    /// Store `candidate` if nothing is cached, if it ranks strictly higher, or
    /// if `force` is set. Returns whether the cache changed.
    pub fn offer_metadata(&self, address: &Address, candidate: ValidatorMetadata, force: bool) -> bool {
        use dashmap::mapref::entry::Entry;
        match self.metadata.entry(address_key(address)) {
            Entry::Vacant(slot) => {
                slot.insert(candidate);
                true
            }
            Entry::Occupied(mut slot) => {
                if force || candidate.provenance > slot.get().provenance {
                    slot.insert(candidate);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn metadata_len(&self) -> usize {
        self.metadata.len()
    }
}
