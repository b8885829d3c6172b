//! Save-triggered propagation of local edits to the remote store.
//!
//! Sync is invisible while things work: a successful push produces no
//! user-visible output. Failures never roll back the local file and
//! never drop the mapping, so the next save retries. An invalid-space
//! failure routes to context recovery instead of an error banner.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use anymd_client::RemoteStore;
use anymd_core::types::UpdateObject;
use anymd_core::{classify, ErrorClass};

use crate::context::SpaceContext;
use crate::events::{EngineEvent, EventBus};
use crate::mapping::MappingTable;

/// What happened to one save notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The path has no mapping; the file is not sync-managed.
    NotManaged,
    /// Pushed to the remote store.
    Synced,
    /// The active space turned out to be invalid; recovery was
    /// signalled and the mapping kept so the edit syncs after
    /// re-selection.
    ContextLost,
    /// Push failed for a reason other than an invalid space. Mapping
    /// kept; the next save retries.
    Failed(String),
}

pub struct SyncPropagator {
    remote: Arc<dyn RemoteStore>,
    context: Arc<SpaceContext>,
    mappings: Arc<MappingTable>,
    events: EventBus,
}

impl SyncPropagator {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        context: Arc<SpaceContext>,
        mappings: Arc<MappingTable>,
        events: EventBus,
    ) -> Self {
        Self {
            remote,
            context,
            mappings,
            events,
        }
    }

    /// Handle one local-file-save notification.
    pub async fn on_save(&self, path: &Path, content: &str) -> SaveOutcome {
        let Some(mapping) = self.mappings.lookup(path) else {
            return SaveOutcome::NotManaged;
        };

        let update = UpdateObject::markdown(content);
        match self
            .remote
            .update_object(&mapping.space_id, &mapping.object_id, &update)
            .await
        {
            Ok(()) => {
                debug!(
                    path = %path.display(),
                    object_id = %mapping.object_id,
                    "synced"
                );
                SaveOutcome::Synced
            }
            Err(err) => match classify(&err) {
                ErrorClass::SpaceInvalid => {
                    self.context.mark_invalid();
                    self.events.emit(EngineEvent::ContextInvalidated {
                        space_id: mapping.space_id.clone(),
                    });
                    SaveOutcome::ContextLost
                }
                ErrorClass::Transient | ErrorClass::Unknown => {
                    warn!(path = %path.display(), "sync failed: {err}");
                    SaveOutcome::Failed(err.to_string())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::FileObjectMapping;
    use anymd_core::types::{CreateObject, ObjectDetail, ObjectSummary, Space, TypeInfo};
    use anymd_core::{AnymdError, AnymdResult, ApiError};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRemote {
        updates: Mutex<Vec<(String, String, String)>>,
        update_calls: AtomicUsize,
        fail_with: Mutex<Option<AnymdError>>,
    }

    #[async_trait]
    impl RemoteStore for RecordingRemote {
        async fn list_spaces(&self) -> AnymdResult<Vec<Space>> {
            Ok(Vec::new())
        }
        async fn get_space(&self, space_id: &str) -> AnymdResult<Space> {
            Ok(Space::new(space_id, ""))
        }
        async fn list_types(&self, _: &str) -> AnymdResult<Vec<TypeInfo>> {
            Ok(Vec::new())
        }
        async fn search_objects(&self, _: &str, _: &str) -> AnymdResult<Vec<ObjectSummary>> {
            Ok(Vec::new())
        }
        async fn list_objects(&self, _: &str) -> AnymdResult<Vec<ObjectSummary>> {
            Ok(Vec::new())
        }
        async fn get_object(&self, _: &str, object_id: &str) -> AnymdResult<ObjectDetail> {
            Ok(ObjectDetail {
                id: object_id.into(),
                name: String::new(),
                markdown: String::new(),
            })
        }
        async fn update_object(
            &self,
            space_id: &str,
            object_id: &str,
            update: &UpdateObject,
        ) -> AnymdResult<()> {
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.fail_with.lock().unwrap().take() {
                return Err(err);
            }
            self.updates.lock().unwrap().push((
                space_id.into(),
                object_id.into(),
                update.markdown.clone().unwrap_or_default(),
            ));
            Ok(())
        }
        async fn create_object(&self, _: &str, _: &CreateObject) -> AnymdResult<ObjectDetail> {
            unimplemented!()
        }
        async fn delete_object(&self, _: &str, _: &str) -> AnymdResult<()> {
            Ok(())
        }
    }

    fn propagator(
        remote: Arc<RecordingRemote>,
    ) -> (
        tempfile::TempDir,
        SyncPropagator,
        Arc<MappingTable>,
        Arc<SpaceContext>,
        EventBus,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let events = EventBus::new();
        let context = Arc::new(SpaceContext::new(
            dir.path().join("state.json"),
            events.clone(),
        ));
        let mappings = Arc::new(MappingTable::new());
        let sync = SyncPropagator::new(remote, context.clone(), mappings.clone(), events.clone());
        (dir, sync, mappings, context, events)
    }

    fn mapping(path: &str) -> FileObjectMapping {
        FileObjectMapping {
            object_id: "O1".into(),
            object_name: "Note A".into(),
            file_path: PathBuf::from(path),
            space_id: "s1".into(),
        }
    }

    #[tokio::test]
    async fn unmapped_path_is_a_noop() {
        let remote = Arc::new(RecordingRemote::default());
        let (_dir, sync, _mappings, _ctx, _events) = propagator(remote.clone());

        let outcome = sync.on_save(Path::new("/not-ours.md"), "body").await;
        assert_eq!(outcome, SaveOutcome::NotManaged);
        assert_eq!(remote.update_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn mapped_save_pushes_content() {
        let remote = Arc::new(RecordingRemote::default());
        let (_dir, sync, mappings, _ctx, _events) = propagator(remote.clone());
        mappings.register(mapping("/cache/Note A.md"));

        let outcome = sync.on_save(Path::new("/cache/Note A.md"), "# v2").await;
        assert_eq!(outcome, SaveOutcome::Synced);
        let updates = remote.updates.lock().unwrap();
        assert_eq!(
            updates.as_slice(),
            &[("s1".to_string(), "O1".to_string(), "# v2".to_string())]
        );
    }

    #[tokio::test]
    async fn repeated_saves_do_not_duplicate_mappings() {
        let remote = Arc::new(RecordingRemote::default());
        let (_dir, sync, mappings, _ctx, _events) = propagator(remote.clone());
        mappings.register(mapping("/cache/Note A.md"));

        sync.on_save(Path::new("/cache/Note A.md"), "same").await;
        sync.on_save(Path::new("/cache/Note A.md"), "same").await;

        assert_eq!(remote.update_calls.load(Ordering::SeqCst), 2);
        assert_eq!(mappings.len(), 1);
        let kept = mappings.lookup(Path::new("/cache/Note A.md")).unwrap();
        assert_eq!(kept.object_id, "O1");
    }

    #[tokio::test]
    async fn invalid_space_keeps_mapping_and_signals_recovery() {
        let remote = Arc::new(RecordingRemote::default());
        let (_dir, sync, mappings, ctx, events) = propagator(remote.clone());
        ctx.set_active(Space::new("s1", "Work")).unwrap();
        mappings.register(mapping("/cache/Note A.md"));
        let mut rx = events.subscribe();

        *remote.fail_with.lock().unwrap() = Some(AnymdError::Api(ApiError::new(
            404,
            "space_not_found",
            "space not found",
        )));
        let outcome = sync.on_save(Path::new("/cache/Note A.md"), "edit").await;

        assert_eq!(outcome, SaveOutcome::ContextLost);
        assert!(mappings.lookup(Path::new("/cache/Note A.md")).is_some());
        assert_eq!(
            rx.try_recv().unwrap(),
            EngineEvent::ContextInvalidated {
                space_id: "s1".into()
            }
        );
    }

    #[tokio::test]
    async fn other_failures_keep_mapping_for_retry() {
        let remote = Arc::new(RecordingRemote::default());
        let (_dir, sync, mappings, _ctx, _events) = propagator(remote.clone());
        mappings.register(mapping("/cache/Note A.md"));

        *remote.fail_with.lock().unwrap() =
            Some(AnymdError::RemoteUnavailable("connection refused".into()));
        let outcome = sync.on_save(Path::new("/cache/Note A.md"), "edit").await;
        assert!(matches!(outcome, SaveOutcome::Failed(_)));

        // Next save retries and succeeds
        let outcome = sync.on_save(Path::new("/cache/Note A.md"), "edit").await;
        assert_eq!(outcome, SaveOutcome::Synced);
    }
}
