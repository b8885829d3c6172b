//! On-demand tree materialization: space → types → objects.
//!
//! Listings come from the remote store through the TTL cache. Results
//! of a fetch are stamped with the space id captured before the await
//! and discarded if a context switch happened underneath; a late fetch
//! must neither populate the cache for the new space nor be rendered.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use anymd_client::RemoteStore;
use anymd_core::types::ObjectSummary;
use anymd_core::{classify, AnymdError, ErrorClass};

use crate::cache::ListingCache;
use crate::context::SpaceContext;
use crate::events::{EngineEvent, EventBus};

/// Cache key for the archived-objects listing; `~` keeps it out of the
/// real type-id namespace.
const TRASH_CATEGORY: &str = "~trash";

/// One root-level node, mirroring a remote object type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryNode {
    pub id: String,
    pub name: String,
    /// Best-effort child count from the listing cache; never
    /// authoritative.
    pub child_hint: Option<usize>,
}

pub struct TreeMaterializer {
    remote: Arc<dyn RemoteStore>,
    context: Arc<SpaceContext>,
    cache: Arc<ListingCache>,
    events: EventBus,
    categories: Mutex<HashSet<String>>,
}

impl TreeMaterializer {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        context: Arc<SpaceContext>,
        cache: Arc<ListingCache>,
        events: EventBus,
    ) -> Self {
        Self {
            remote,
            context,
            cache,
            events,
            categories: Mutex::new(HashSet::new()),
        }
    }

    /// Root-level category nodes, in the order the remote store
    /// returns types. No active space is a recoverable condition, not
    /// an error: the `NoActiveSpace` event asks for a selection and
    /// the result is empty.
    pub async fn root_entries(&self) -> Vec<CategoryNode> {
        let Some(space_id) = self.context.active_id() else {
            self.events.emit(EngineEvent::NoActiveSpace);
            return Vec::new();
        };

        match self.remote.list_types(&space_id).await {
            Ok(types) => {
                if self.context.active_id().as_deref() != Some(space_id.as_str()) {
                    debug!(space_id, "discarding type listing for superseded space");
                    return Vec::new();
                }
                {
                    let mut categories = self.categories.lock().unwrap();
                    categories.clear();
                    categories.extend(types.iter().map(|t| t.id.clone()));
                }
                types
                    .into_iter()
                    .map(|t| CategoryNode {
                        child_hint: self.cache.peek_len(&space_id, &t.id),
                        id: t.id,
                        name: t.name,
                    })
                    .collect()
            }
            Err(err) => {
                self.route_failure(&space_id, &err, "listing types");
                Vec::new()
            }
        }
    }

    /// Whether an id belongs to the category set from the last root
    /// fetch.
    pub fn is_category(&self, id: &str) -> bool {
        self.categories.lock().unwrap().contains(id)
    }

    /// Objects under a category, cache first. Entries keep remote
    /// order; empty display names fall back to the object id at the
    /// presentation accessor.
    pub async fn category_entries(&self, category_id: &str) -> Vec<ObjectSummary> {
        let Some(space_id) = self.context.active_id() else {
            self.events.emit(EngineEvent::NoActiveSpace);
            return Vec::new();
        };

        if let Some(hit) = self.cache.get(&space_id, category_id) {
            return hit;
        }

        match self.remote.search_objects(&space_id, category_id).await {
            Ok(objects) => self.admit(&space_id, category_id, objects),
            Err(err) => {
                self.route_failure(&space_id, &err, "listing objects");
                Vec::new()
            }
        }
    }

    /// Archived objects for the active space.
    pub async fn trash_entries(&self) -> Vec<ObjectSummary> {
        let Some(space_id) = self.context.active_id() else {
            self.events.emit(EngineEvent::NoActiveSpace);
            return Vec::new();
        };

        if let Some(hit) = self.cache.get(&space_id, TRASH_CATEGORY) {
            return hit;
        }

        match self.remote.list_objects(&space_id).await {
            Ok(objects) => {
                let archived: Vec<_> = objects.into_iter().filter(|o| o.archived).collect();
                self.admit(&space_id, TRASH_CATEGORY, archived)
            }
            Err(err) => {
                self.route_failure(&space_id, &err, "listing trash");
                Vec::new()
            }
        }
    }

    /// Pinned objects. The upstream API does not yet expose a pin
    /// predicate, so this extension point resolves to an empty list.
    pub async fn pinned_entries(&self) -> Vec<ObjectSummary> {
        Vec::new()
    }

    /// Clear the listing cache and the derived category set; callers
    /// re-fetch from root.
    pub fn refresh(&self) {
        self.cache.invalidate_all();
        self.categories.lock().unwrap().clear();
    }

    /// Cache and return a fetched listing, unless the active space
    /// moved on while the fetch was in flight.
    fn admit(
        &self,
        stamped_space: &str,
        category_id: &str,
        entries: Vec<ObjectSummary>,
    ) -> Vec<ObjectSummary> {
        if self.context.active_id().as_deref() != Some(stamped_space) {
            debug!(
                space_id = stamped_space,
                category_id, "discarding listing for superseded space"
            );
            return Vec::new();
        }
        self.cache.put(stamped_space, category_id, entries.clone());
        entries
    }

    fn route_failure(&self, space_id: &str, err: &AnymdError, what: &str) {
        match classify(err) {
            ErrorClass::SpaceInvalid => {
                self.context.mark_invalid();
                self.events.emit(EngineEvent::ContextInvalidated {
                    space_id: space_id.to_string(),
                });
            }
            ErrorClass::Transient | ErrorClass::Unknown => {
                warn!(space_id, "{what} failed: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anymd_core::types::{CreateObject, ObjectDetail, Space, TypeInfo, UpdateObject};
    use anymd_core::{AnymdResult, ApiError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Fake remote store with a poisonable space.
    struct FakeRemote {
        types: Vec<TypeInfo>,
        objects: Vec<ObjectSummary>,
        space_gone: std::sync::atomic::AtomicBool,
        search_calls: AtomicUsize,
    }

    impl FakeRemote {
        fn new() -> Self {
            Self {
                types: vec![
                    TypeInfo {
                        id: "t1".into(),
                        name: "Note".into(),
                    },
                    TypeInfo {
                        id: "t2".into(),
                        name: "Task".into(),
                    },
                ],
                objects: vec![ObjectSummary {
                    id: "o1".into(),
                    name: "Note A".into(),
                    archived: false,
                }],
                space_gone: std::sync::atomic::AtomicBool::new(false),
                search_calls: AtomicUsize::new(0),
            }
        }

        fn gate(&self) -> AnymdResult<()> {
            if self.space_gone.load(Ordering::SeqCst) {
                Err(AnymdError::Api(ApiError::new(
                    404,
                    "space_not_found",
                    "space not found",
                )))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl RemoteStore for FakeRemote {
        async fn list_spaces(&self) -> AnymdResult<Vec<Space>> {
            Ok(vec![Space::new("s1", "Work")])
        }
        async fn get_space(&self, space_id: &str) -> AnymdResult<Space> {
            self.gate()?;
            Ok(Space::new(space_id, "Work"))
        }
        async fn list_types(&self, _space_id: &str) -> AnymdResult<Vec<TypeInfo>> {
            self.gate()?;
            Ok(self.types.clone())
        }
        async fn search_objects(
            &self,
            _space_id: &str,
            _type_id: &str,
        ) -> AnymdResult<Vec<ObjectSummary>> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            self.gate()?;
            Ok(self.objects.clone())
        }
        async fn list_objects(&self, _space_id: &str) -> AnymdResult<Vec<ObjectSummary>> {
            self.gate()?;
            let mut all = self.objects.clone();
            all.push(ObjectSummary {
                id: "o9".into(),
                name: "Old".into(),
                archived: true,
            });
            Ok(all)
        }
        async fn get_object(&self, _space_id: &str, object_id: &str) -> AnymdResult<ObjectDetail> {
            self.gate()?;
            Ok(ObjectDetail {
                id: object_id.into(),
                name: "Note A".into(),
                markdown: "# body".into(),
            })
        }
        async fn update_object(
            &self,
            _space_id: &str,
            _object_id: &str,
            _update: &UpdateObject,
        ) -> AnymdResult<()> {
            self.gate()
        }
        async fn create_object(
            &self,
            _space_id: &str,
            req: &CreateObject,
        ) -> AnymdResult<ObjectDetail> {
            self.gate()?;
            Ok(ObjectDetail {
                id: "new".into(),
                name: req.name.clone(),
                markdown: req.markdown.clone(),
            })
        }
        async fn delete_object(&self, _space_id: &str, _object_id: &str) -> AnymdResult<()> {
            self.gate()
        }
    }

    fn materializer(
        remote: Arc<FakeRemote>,
    ) -> (tempfile::TempDir, TreeMaterializer, Arc<SpaceContext>, EventBus) {
        let dir = tempfile::tempdir().unwrap();
        let events = EventBus::new();
        let context = Arc::new(SpaceContext::new(
            dir.path().join("state.json"),
            events.clone(),
        ));
        let cache = Arc::new(ListingCache::new(Duration::from_secs(300)));
        let tree = TreeMaterializer::new(remote, context.clone(), cache, events.clone());
        (dir, tree, context, events)
    }

    #[tokio::test]
    async fn no_active_space_emits_and_returns_empty() {
        let (_dir, tree, _ctx, events) = materializer(Arc::new(FakeRemote::new()));
        let mut rx = events.subscribe();
        assert!(tree.root_entries().await.is_empty());
        assert_eq!(rx.try_recv().unwrap(), EngineEvent::NoActiveSpace);
    }

    #[tokio::test]
    async fn root_preserves_remote_order_and_tracks_categories() {
        let (_dir, tree, ctx, _events) = materializer(Arc::new(FakeRemote::new()));
        ctx.set_active(Space::new("s1", "Work")).unwrap();

        let roots = tree.root_entries().await;
        assert_eq!(
            roots.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            vec!["t1", "t2"]
        );
        assert!(tree.is_category("t1"));
        assert!(!tree.is_category("o1"));
    }

    #[tokio::test]
    async fn category_entries_cached_within_ttl() {
        let remote = Arc::new(FakeRemote::new());
        let (_dir, tree, ctx, _events) = materializer(remote.clone());
        ctx.set_active(Space::new("s1", "Work")).unwrap();

        let first = tree.category_entries("t1").await;
        let second = tree.category_entries("t1").await;
        assert_eq!(first, second);
        assert_eq!(remote.search_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_forces_refetch() {
        let remote = Arc::new(FakeRemote::new());
        let (_dir, tree, ctx, _events) = materializer(remote.clone());
        ctx.set_active(Space::new("s1", "Work")).unwrap();

        tree.root_entries().await;
        tree.category_entries("t1").await;
        tree.refresh();
        assert!(!tree.is_category("t1"));
        tree.category_entries("t1").await;
        assert_eq!(remote.search_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalid_space_routes_to_context_invalidated() {
        let remote = Arc::new(FakeRemote::new());
        let (_dir, tree, ctx, events) = materializer(remote.clone());
        ctx.set_active(Space::new("s1", "Work")).unwrap();
        let mut rx = events.subscribe();

        remote.space_gone.store(true, Ordering::SeqCst);
        assert!(tree.category_entries("t1").await.is_empty());
        assert_eq!(
            rx.try_recv().unwrap(),
            EngineEvent::ContextInvalidated {
                space_id: "s1".into()
            }
        );
        assert_eq!(ctx.validity(), Some(crate::context::Validity::Invalid));
    }

    #[tokio::test]
    async fn trash_filters_archived() {
        let (_dir, tree, ctx, _events) = materializer(Arc::new(FakeRemote::new()));
        ctx.set_active(Space::new("s1", "Work")).unwrap();

        let trash = tree.trash_entries().await;
        assert_eq!(trash.len(), 1);
        assert_eq!(trash[0].id, "o9");
    }

    #[tokio::test]
    async fn pinned_is_an_empty_placeholder() {
        let (_dir, tree, ctx, _events) = materializer(Arc::new(FakeRemote::new()));
        ctx.set_active(Space::new("s1", "Work")).unwrap();
        assert!(tree.pinned_entries().await.is_empty());
    }
}
