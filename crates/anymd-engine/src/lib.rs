//! Sync engine: mirrors a remote object store (spaces → types →
//! objects) into a local markdown cache and pushes local edits back.
//!
//! All service objects are constructed explicitly by [`Engine::new`]
//! and shared by reference; nothing here is a process-global. No
//! operation is fatal: failures degrade to an empty result, a logged
//! warning, or a recovery signal on the event bus.

pub mod cache;
pub mod context;
pub mod events;
pub mod mapping;
pub mod recovery;
pub mod store;
pub mod sync;
pub mod tree;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use anymd_client::RemoteStore;
use anymd_core::config::{AnymdConfig, CacheConfig};
use anymd_core::types::{CreateObject, ObjectDetail, ObjectSummary, Space};
use anymd_core::{classify, AnymdError, AnymdResult, ErrorClass};

pub use cache::ListingCache;
pub use context::{SpaceContext, Validity};
pub use events::{EngineEvent, EventBus};
pub use mapping::{FileObjectMapping, MappingTable};
pub use recovery::{RecoveryFlow, SpacePicker};
pub use store::{FileMetadata, FileStore};
pub use sync::{SaveOutcome, SyncPropagator};
pub use tree::{CategoryNode, TreeMaterializer};

pub struct Engine {
    remote: Arc<dyn RemoteStore>,
    events: EventBus,
    context: Arc<SpaceContext>,
    cache: Arc<ListingCache>,
    files: Arc<FileStore>,
    mappings: Arc<MappingTable>,
    tree: TreeMaterializer,
    sync: SyncPropagator,
    recovery: RecoveryFlow,
}

impl Engine {
    pub fn new(config: &AnymdConfig, remote: Arc<dyn RemoteStore>) -> Self {
        let events = EventBus::new();
        let context = Arc::new(SpaceContext::new(
            config.storage.state_file.clone(),
            events.clone(),
        ));
        let cache = Arc::new(ListingCache::new(Duration::from_millis(
            config.effective_ttl_ms(),
        )));
        let files = Arc::new(FileStore::new(config.storage.cache_dir.clone()));
        let mappings = Arc::new(MappingTable::new());

        let tree = TreeMaterializer::new(
            remote.clone(),
            context.clone(),
            cache.clone(),
            events.clone(),
        );
        let sync = SyncPropagator::new(
            remote.clone(),
            context.clone(),
            mappings.clone(),
            events.clone(),
        );
        let recovery = RecoveryFlow::new(remote.clone(), context.clone(), cache.clone());

        Self {
            remote,
            events,
            context,
            cache,
            files,
            mappings,
            tree,
            sync,
            recovery,
        }
    }

    /// Restore the persisted active space id, if any.
    pub fn restore_context(&self) {
        self.context.restore();
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    // ── Space context ────────────────────────────────────────────────

    /// All spaces visible to the credential. Failures are surfaced as
    /// a warning and an empty list; they never propagate past this
    /// boundary. A restored context gets its placeholder name resolved
    /// from the listing.
    pub async fn list_spaces(&self) -> Vec<Space> {
        match self.remote.list_spaces().await {
            Ok(spaces) => {
                self.context.resolve_name(&spaces);
                spaces
            }
            Err(err) => {
                warn!("fetching spaces failed: {err}");
                Vec::new()
            }
        }
    }

    pub fn active_space(&self) -> Option<Space> {
        self.context.active()
    }

    pub fn has_active_space(&self) -> bool {
        self.context.has_active()
    }

    /// Validity of the active context, if one is selected. `Invalid`
    /// means a recent operation found the space gone and a
    /// re-selection is pending.
    pub fn active_validity(&self) -> Option<Validity> {
        self.context.validity()
    }

    /// Switch the active space. Listing caches are invalidated before
    /// the change is announced, so the first post-change read fetches
    /// fresh data.
    pub fn switch_space(&self, space: Space) -> AnymdResult<()> {
        self.tree.refresh();
        self.context.set_active(space)
    }

    /// Existence probe for the active space. `Ok(false)` means the
    /// space is gone (recovery was signalled); transient failures
    /// propagate as errors without settling validity either way.
    pub async fn validate_active(&self) -> AnymdResult<bool> {
        let Some(space_id) = self.context.active_id() else {
            return Ok(false);
        };
        match self.remote.get_space(&space_id).await {
            Ok(_) => {
                self.context.mark_valid();
                Ok(true)
            }
            Err(err) => match classify(&err) {
                ErrorClass::SpaceInvalid => {
                    self.route_invalid(&space_id);
                    Ok(false)
                }
                _ => Err(err),
            },
        }
    }

    /// Run one recovery round with the given picker. Listing state is
    /// dropped through the same path as [`Engine::switch_space`], so
    /// the old space's category set does not linger.
    pub async fn recover(&self, picker: &dyn SpacePicker) -> AnymdResult<Option<Space>> {
        let chosen = self.recovery.recover(picker).await?;
        self.tree.refresh();
        Ok(chosen)
    }

    // ── Tree materialization ─────────────────────────────────────────

    pub async fn root_entries(&self) -> Vec<CategoryNode> {
        self.tree.root_entries().await
    }

    pub async fn category_entries(&self, category_id: &str) -> Vec<ObjectSummary> {
        self.tree.category_entries(category_id).await
    }

    pub fn is_category(&self, id: &str) -> bool {
        self.tree.is_category(id)
    }

    pub async fn trash_entries(&self) -> Vec<ObjectSummary> {
        self.tree.trash_entries().await
    }

    pub async fn pinned_entries(&self) -> Vec<ObjectSummary> {
        self.tree.pinned_entries().await
    }

    /// Drop all listing state; consumers re-fetch from root.
    pub fn refresh(&self) {
        self.tree.refresh();
    }

    // ── Objects ──────────────────────────────────────────────────────

    /// Materialize an object into the local cache: fetch the detail,
    /// write the body under the display label, and register the
    /// file↔object mapping so saves sync back.
    pub async fn open_object(&self, object_id: &str) -> AnymdResult<PathBuf> {
        let space_id = self.require_active()?;

        let detail = match self.remote.get_object(&space_id, object_id).await {
            Ok(detail) => detail,
            Err(err) => {
                if classify(&err) == ErrorClass::SpaceInvalid {
                    self.route_invalid(&space_id);
                }
                return Err(err);
            }
        };

        if self.context.active_id().as_deref() != Some(space_id.as_str()) {
            return Err(AnymdError::Other(anyhow::anyhow!(
                "active space changed while opening object {object_id}"
            )));
        }

        let label = detail.label().to_string();
        let path = self.files.write(&label, &detail.markdown)?;
        self.mappings.register(FileObjectMapping {
            object_id: detail.id,
            object_name: label,
            file_path: path.clone(),
            space_id,
        });
        Ok(path)
    }

    /// Create a new object under a type and drop listing state so the
    /// next render shows it.
    pub async fn create_object(
        &self,
        type_id: &str,
        name: &str,
        markdown: &str,
    ) -> AnymdResult<ObjectDetail> {
        let space_id = self.require_active()?;
        let req = CreateObject {
            type_id: type_id.to_string(),
            name: name.trim().to_string(),
            markdown: markdown.to_string(),
        };
        if req.name.is_empty() {
            return Err(AnymdError::ValidationFailed("object name is required".into()));
        }
        match self.remote.create_object(&space_id, &req).await {
            Ok(detail) => {
                info!(object_id = %detail.id, "object created");
                self.tree.refresh();
                Ok(detail)
            }
            Err(err) => {
                if classify(&err) == ErrorClass::SpaceInvalid {
                    self.route_invalid(&space_id);
                }
                Err(err)
            }
        }
    }

    /// Delete (archive) an object remotely. Mappings for the object
    /// are dropped; the local file stays for the user to keep or
    /// discard.
    pub async fn delete_object(&self, object_id: &str) -> AnymdResult<()> {
        let space_id = self.require_active()?;
        match self.remote.delete_object(&space_id, object_id).await {
            Ok(()) => {
                for path in self.mappings.paths_for_object(object_id) {
                    self.mappings.unregister(&path);
                }
                self.tree.refresh();
                Ok(())
            }
            Err(err) => {
                if classify(&err) == ErrorClass::SpaceInvalid {
                    self.route_invalid(&space_id);
                }
                Err(err)
            }
        }
    }

    // ── Sync ─────────────────────────────────────────────────────────

    /// Entry point for local-file-save notifications.
    pub async fn on_save(&self, path: &std::path::Path, content: &str) -> SaveOutcome {
        self.sync.on_save(path, content).await
    }

    /// Re-associate a cache file with its remote object by display
    /// label. Mappings do not survive restarts; a new process rebuilds
    /// them on demand from the active space's object listing, so saves
    /// of files materialized by an earlier process still sync.
    pub async fn adopt_file(&self, path: &std::path::Path) -> Option<FileObjectMapping> {
        if let Some(existing) = self.mappings.lookup(path) {
            return Some(existing);
        }
        let space_id = self.context.active_id()?;
        let stem = path.file_stem()?.to_str()?.to_string();

        let objects = match self.remote.list_objects(&space_id).await {
            Ok(objects) => objects,
            Err(err) => {
                if classify(&err) == ErrorClass::SpaceInvalid {
                    self.route_invalid(&space_id);
                } else {
                    warn!(path = %path.display(), "listing objects for adoption failed: {err}");
                }
                return None;
            }
        };
        if self.context.active_id().as_deref() != Some(space_id.as_str()) {
            return None;
        }

        let object = objects
            .iter()
            .find(|o| !o.archived && FileStore::sanitize(o.label()) == stem)?;
        let mapping = FileObjectMapping {
            object_id: object.id.clone(),
            object_name: object.label().to_string(),
            file_path: path.to_path_buf(),
            space_id,
        };
        self.mappings.register(mapping.clone());
        Some(mapping)
    }

    // ── Mappings & files ─────────────────────────────────────────────

    pub fn mappings(&self) -> &MappingTable {
        &self.mappings
    }

    pub fn files(&self) -> &FileStore {
        &self.files
    }

    // ── Configuration ────────────────────────────────────────────────

    /// Apply a changed cache configuration at runtime.
    pub fn apply_cache_config(&self, cache: &CacheConfig) {
        let ttl = if cache.enabled { cache.ttl_ms } else { 0 };
        self.cache.set_ttl(Duration::from_millis(ttl));
    }

    fn require_active(&self) -> AnymdResult<String> {
        self.context.active_id().ok_or_else(|| {
            self.events.emit(EngineEvent::NoActiveSpace);
            AnymdError::Config("no active space selected".into())
        })
    }

    fn route_invalid(&self, space_id: &str) {
        self.context.mark_invalid();
        self.events.emit(EngineEvent::ContextInvalidated {
            space_id: space_id.to_string(),
        });
    }
}
