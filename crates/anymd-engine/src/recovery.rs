//! Context recovery: re-selecting a space after invalidation.
//!
//! The operation that detected the invalid space is never replayed
//! here. Recovery re-establishes a usable context (fresh listing, new
//! selection, cache invalidation); the caller re-renders from root on
//! the `ContextChanged` event.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use anymd_client::RemoteStore;
use anymd_core::types::Space;
use anymd_core::AnymdResult;

use crate::cache::ListingCache;
use crate::context::SpaceContext;

/// Selection seam: an interactive prompt in the CLI, scripted in
/// tests. Returning `None` declines the selection.
#[async_trait]
pub trait SpacePicker: Send + Sync {
    async fn pick(&self, spaces: &[Space], current: Option<&str>) -> Option<Space>;
}

pub struct RecoveryFlow {
    remote: Arc<dyn RemoteStore>,
    context: Arc<SpaceContext>,
    cache: Arc<ListingCache>,
}

impl RecoveryFlow {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        context: Arc<SpaceContext>,
        cache: Arc<ListingCache>,
    ) -> Self {
        Self {
            remote,
            context,
            cache,
        }
    }

    /// Run one recovery round. Returns the newly selected space, or
    /// `None` when no selection was made (context drops to
    /// unselected, pending a later choice).
    pub async fn recover(&self, picker: &dyn SpacePicker) -> AnymdResult<Option<Space>> {
        let invalid_id = self.context.active_id();

        let spaces = match self.remote.list_spaces().await {
            Ok(spaces) => spaces,
            Err(err) => {
                warn!("fetching spaces for recovery failed: {err}");
                Vec::new()
            }
        };

        if spaces.is_empty() {
            warn!("no spaces available; dropping to unselected");
            self.context.clear_active()?;
            return Ok(None);
        }

        match picker.pick(&spaces, invalid_id.as_deref()).await {
            Some(space) => {
                info!(space_id = %space.id, name = %space.name, "recovered to new space");
                self.context.set_active(space.clone())?;
                self.cache.invalidate_all();
                Ok(Some(space))
            }
            None => {
                self.context.clear_active()?;
                Ok(None)
            }
        }
    }
}
