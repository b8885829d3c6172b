//! Active-space context: selection, validity tracking, persistence.
//!
//! Only the active space id survives a restart; the name is a
//! placeholder until the next space listing resolves it. An `Invalid`
//! context is never silently retried with the same identity: getting
//! back to a usable state requires a fresh listing plus a new
//! `set_active`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use anymd_core::types::Space;
use anymd_core::AnymdResult;

use crate::events::{EngineEvent, EventBus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// Selected but not yet probed against the remote store.
    Unchecked,
    Valid,
    Invalid,
}

#[derive(Debug, Clone)]
struct ActiveSpace {
    space: Space,
    validity: Validity,
}

/// Persisted slice of the context (state file contents).
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    current_space_id: Option<String>,
}

pub struct SpaceContext {
    state_file: PathBuf,
    active: Mutex<Option<ActiveSpace>>,
    events: EventBus,
}

impl SpaceContext {
    pub fn new(state_file: impl Into<PathBuf>, events: EventBus) -> Self {
        Self {
            state_file: state_file.into(),
            active: Mutex::new(None),
            events,
        }
    }

    /// Restore the persisted space id from the state file, if any.
    /// The restored context starts `Unchecked`.
    pub fn restore(&self) {
        let Some(id) = read_state(&self.state_file).current_space_id else {
            return;
        };
        info!(space_id = %id, "restored active space from state file");
        let mut active = self.active.lock().unwrap();
        *active = Some(ActiveSpace {
            // Placeholder name until the next listing resolves it
            space: Space::new(id, "(loading)"),
            validity: Validity::Unchecked,
        });
    }

    /// Pure local check; no I/O.
    pub fn has_active(&self) -> bool {
        self.active.lock().unwrap().is_some()
    }

    pub fn active(&self) -> Option<Space> {
        self.active.lock().unwrap().as_ref().map(|a| a.space.clone())
    }

    pub fn active_id(&self) -> Option<String> {
        self.active
            .lock()
            .unwrap()
            .as_ref()
            .map(|a| a.space.id.clone())
    }

    pub fn validity(&self) -> Option<Validity> {
        self.active.lock().unwrap().as_ref().map(|a| a.validity)
    }

    /// Make `space` the active context, persist its id, and announce
    /// the change. Consumers invalidate their caches on the event.
    pub fn set_active(&self, space: Space) -> AnymdResult<()> {
        let space_id = space.id.clone();
        {
            let mut active = self.active.lock().unwrap();
            *active = Some(ActiveSpace {
                space,
                validity: Validity::Unchecked,
            });
        }
        self.persist(Some(&space_id))?;
        self.events.emit(EngineEvent::ContextChanged { space_id });
        Ok(())
    }

    /// Drop the active context (recovery declined, pending
    /// re-selection).
    pub fn clear_active(&self) -> AnymdResult<()> {
        *self.active.lock().unwrap() = None;
        self.persist(None)
    }

    /// Flag the active context as stale. Listing and sync operations
    /// call this when classification says the space is gone.
    pub fn mark_invalid(&self) {
        if let Some(active) = self.active.lock().unwrap().as_mut() {
            active.validity = Validity::Invalid;
        }
    }

    pub fn mark_valid(&self) {
        if let Some(active) = self.active.lock().unwrap().as_mut() {
            active.validity = Validity::Valid;
        }
    }

    /// Resolve the placeholder name for a restored context from a
    /// fresh listing.
    pub fn resolve_name(&self, spaces: &[Space]) {
        let mut active = self.active.lock().unwrap();
        if let Some(a) = active.as_mut() {
            if let Some(known) = spaces.iter().find(|s| s.id == a.space.id) {
                a.space = known.clone();
            }
        }
    }

    fn persist(&self, space_id: Option<&str>) -> AnymdResult<()> {
        let state = PersistedState {
            current_space_id: space_id.map(str::to_string),
        };
        if let Some(parent) = self.state_file.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&state)
            .map_err(|e| anyhow::anyhow!("encoding state file: {e}"))?;
        fs::write(&self.state_file, json)?;
        Ok(())
    }
}

fn read_state(path: &Path) -> PersistedState {
    if !path.exists() {
        return PersistedState::default();
    }
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %path.display(), "state file unreadable: {e} (starting unselected)");
            PersistedState::default()
        }),
        Err(e) => {
            warn!(path = %path.display(), "state file unreadable: {e} (starting unselected)");
            PersistedState::default()
        }
    }
}
