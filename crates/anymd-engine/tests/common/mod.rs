//! Shared test fixtures: a scripted in-memory remote store and an
//! engine wired against it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use anymd_client::RemoteStore;
use anymd_core::config::AnymdConfig;
use anymd_core::types::{CreateObject, ObjectDetail, ObjectSummary, Space, TypeInfo, UpdateObject};
use anymd_core::{AnymdError, AnymdResult, ApiError};
use anymd_engine::{Engine, SpacePicker};

#[derive(Default)]
pub struct RemoteState {
    pub spaces: Vec<Space>,
    /// space id → types, in remote order
    pub types: HashMap<String, Vec<TypeInfo>>,
    /// (space id, type id) → objects, in remote order
    pub objects: HashMap<(String, String), Vec<ObjectDetail>>,
}

pub struct InMemoryRemote {
    pub state: Mutex<RemoteState>,
    pub search_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    /// When set, `search_objects` waits for a permit before returning;
    /// lets tests interleave a context switch under an in-flight fetch.
    pub search_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl InMemoryRemote {
    /// One space "s1" with types t1/t2 and one note under t1.
    pub fn seeded() -> Arc<Self> {
        let mut state = RemoteState::default();
        state.spaces = vec![Space::new("s1", "Work"), Space::new("s2", "Play")];
        state.types.insert(
            "s1".into(),
            vec![
                TypeInfo {
                    id: "t1".into(),
                    name: "Note".into(),
                },
                TypeInfo {
                    id: "t2".into(),
                    name: "Task".into(),
                },
            ],
        );
        state.types.insert(
            "s2".into(),
            vec![TypeInfo {
                id: "t9".into(),
                name: "Idea".into(),
            }],
        );
        state.objects.insert(
            ("s1".into(), "t1".into()),
            vec![ObjectDetail {
                id: "o1".into(),
                name: "Note A".into(),
                markdown: "# Note A\n\noriginal body\n".into(),
            }],
        );
        Arc::new(Self {
            state: Mutex::new(state),
            search_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            search_gate: Mutex::new(None),
        })
    }

    pub fn delete_space_out_of_band(&self, space_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.spaces.retain(|s| s.id != space_id);
    }

    fn check_space(&self, space_id: &str) -> AnymdResult<()> {
        let state = self.state.lock().unwrap();
        if state.spaces.iter().any(|s| s.id == space_id) {
            Ok(())
        } else {
            Err(AnymdError::Api(ApiError::new(
                404,
                "space_not_found",
                format!("space {space_id} not found"),
            )))
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn list_spaces(&self) -> AnymdResult<Vec<Space>> {
        Ok(self.state.lock().unwrap().spaces.clone())
    }

    async fn get_space(&self, space_id: &str) -> AnymdResult<Space> {
        self.check_space(space_id)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .spaces
            .iter()
            .find(|s| s.id == space_id)
            .cloned()
            .expect("checked above"))
    }

    async fn list_types(&self, space_id: &str) -> AnymdResult<Vec<TypeInfo>> {
        self.check_space(space_id)?;
        let state = self.state.lock().unwrap();
        Ok(state.types.get(space_id).cloned().unwrap_or_default())
    }

    async fn search_objects(
        &self,
        space_id: &str,
        type_id: &str,
    ) -> AnymdResult<Vec<ObjectSummary>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.search_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.expect("gate closed");
        }
        self.check_space(space_id)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .objects
            .get(&(space_id.to_string(), type_id.to_string()))
            .map(|objs| {
                objs.iter()
                    .map(|o| ObjectSummary {
                        id: o.id.clone(),
                        name: o.name.clone(),
                        archived: false,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_objects(&self, space_id: &str) -> AnymdResult<Vec<ObjectSummary>> {
        self.check_space(space_id)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .objects
            .iter()
            .filter(|((sid, _), _)| sid.as_str() == space_id)
            .flat_map(|(_, objs)| objs.iter())
            .map(|o| ObjectSummary {
                id: o.id.clone(),
                name: o.name.clone(),
                archived: false,
            })
            .collect())
    }

    async fn get_object(&self, space_id: &str, object_id: &str) -> AnymdResult<ObjectDetail> {
        self.check_space(space_id)?;
        let state = self.state.lock().unwrap();
        state
            .objects
            .values()
            .flatten()
            .find(|o| o.id == object_id)
            .cloned()
            .ok_or_else(|| AnymdError::NotFound(format!("object {object_id}")))
    }

    async fn update_object(
        &self,
        space_id: &str,
        object_id: &str,
        update: &UpdateObject,
    ) -> AnymdResult<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check_space(space_id)?;
        let mut state = self.state.lock().unwrap();
        let obj = state
            .objects
            .values_mut()
            .flatten()
            .find(|o| o.id == object_id)
            .ok_or_else(|| AnymdError::NotFound(format!("object {object_id}")))?;
        if let Some(markdown) = &update.markdown {
            obj.markdown = markdown.clone();
        }
        if let Some(name) = &update.name {
            obj.name = name.clone();
        }
        Ok(())
    }

    async fn create_object(&self, space_id: &str, req: &CreateObject) -> AnymdResult<ObjectDetail> {
        self.check_space(space_id)?;
        let detail = ObjectDetail {
            id: format!("new-{}", req.name),
            name: req.name.clone(),
            markdown: req.markdown.clone(),
        };
        let mut state = self.state.lock().unwrap();
        state
            .objects
            .entry((space_id.to_string(), req.type_id.clone()))
            .or_default()
            .push(detail.clone());
        Ok(detail)
    }

    async fn delete_object(&self, space_id: &str, object_id: &str) -> AnymdResult<()> {
        self.check_space(space_id)?;
        let mut state = self.state.lock().unwrap();
        for objs in state.objects.values_mut() {
            objs.retain(|o| o.id != object_id);
        }
        Ok(())
    }
}

/// Picker scripted to always choose a fixed space id.
pub struct PickById(pub String);

#[async_trait]
impl SpacePicker for PickById {
    async fn pick(&self, spaces: &[Space], _current: Option<&str>) -> Option<Space> {
        spaces.iter().find(|s| s.id == self.0).cloned()
    }
}

/// Engine rooted in an existing directory; lets a test model separate
/// processes by building two engines over the same paths.
pub fn engine_in(dir: &tempfile::TempDir, remote: Arc<InMemoryRemote>) -> Arc<Engine> {
    let mut config = AnymdConfig::default();
    config.api.token = "test-token".into();
    config.storage.cache_dir = dir.path().join("markdown-cache");
    config.storage.state_file = dir.path().join("state.json");
    Arc::new(Engine::new(&config, remote))
}

/// Engine over a temp directory; the `TempDir` must outlive the engine.
pub fn engine(remote: Arc<InMemoryRemote>) -> (tempfile::TempDir, Arc<Engine>) {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(&dir, remote);
    (dir, engine)
}
