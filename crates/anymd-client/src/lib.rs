//! Remote store contract and HTTP implementation.
//!
//! The engine talks to the remote object store only through the
//! [`RemoteStore`] trait; [`http::HttpRemoteStore`] is the production
//! implementation. Tests script their own implementations.

pub mod http;

use anymd_core::types::{CreateObject, ObjectDetail, ObjectSummary, Space, TypeInfo, UpdateObject};
use anymd_core::AnymdResult;
use async_trait::async_trait;

/// Operations the engine needs from the remote object store.
///
/// Every call either returns a success payload or an `AnymdError`
/// carrying a structured `{status, code, message}` where the server
/// supplied one.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// All spaces visible to the credential in use.
    async fn list_spaces(&self) -> AnymdResult<Vec<Space>>;

    /// Lightweight existence probe for a single space.
    async fn get_space(&self, space_id: &str) -> AnymdResult<Space>;

    /// Object types ("categories") within a space, in remote order.
    async fn list_types(&self, space_id: &str) -> AnymdResult<Vec<TypeInfo>>;

    /// Objects within a space filtered by type, in remote order.
    async fn search_objects(&self, space_id: &str, type_id: &str)
        -> AnymdResult<Vec<ObjectSummary>>;

    /// Unfiltered object listing (includes archived objects).
    async fn list_objects(&self, space_id: &str) -> AnymdResult<Vec<ObjectSummary>>;

    /// Single object detail including the markdown body.
    async fn get_object(&self, space_id: &str, object_id: &str) -> AnymdResult<ObjectDetail>;

    /// Update an object's body and/or name.
    async fn update_object(
        &self,
        space_id: &str,
        object_id: &str,
        update: &UpdateObject,
    ) -> AnymdResult<()>;

    /// Create a new object under a type.
    async fn create_object(&self, space_id: &str, req: &CreateObject) -> AnymdResult<ObjectDetail>;

    /// Delete an object. The upstream store treats deletion as moving
    /// the object to the archive.
    async fn delete_object(&self, space_id: &str, object_id: &str) -> AnymdResult<()>;
}
