//! Controllers: one per object kind, each reconciling a single object by
//! name against what it owns.

mod operation;
mod runtime_task;
mod taskgroup;

use std::sync::Arc;

use async_trait::async_trait;
use operator_api::{Object, ObjectKind};
use operator_store::{ObjectStore, Store, WatchEvent};
use tracing::debug;

use crate::clock::Clock;
use crate::error::Result;
use crate::recorder::EventRecorder;

pub use operation::OperationController;
pub use runtime_task::RuntimeTaskController;
pub use taskgroup::TaskGroupController;

/// A level-triggered reconciler keyed by object name.
#[async_trait]
pub trait Controller: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Kinds whose notifications this controller listens to.
    fn watches(&self) -> Vec<ObjectKind>;

    /// Keys to reconcile in response to a notification.
    async fn keys_for(&self, event: &WatchEvent) -> Result<Vec<String>>;

    /// Every key this controller is responsible for.
    async fn resync_keys(&self) -> Result<Vec<String>>;

    /// Bring one object in line with what it owns.
    async fn reconcile(&self, key: &str) -> Result<()>;
}

/// Dependencies shared by every controller.
#[derive(Clone)]
pub struct ControllerContext {
    pub store: Store,
    pub clock: Arc<dyn Clock>,
    pub recorder: Arc<dyn EventRecorder>,
}

impl ControllerContext {
    pub fn new(store: Store, clock: Arc<dyn Clock>, recorder: Arc<dyn EventRecorder>) -> Self {
        Self {
            store,
            clock,
            recorder,
        }
    }
}

/// Fetch an object, treating not-found as absent.
async fn get_optional<T: Object>(store: &dyn ObjectStore<T>, name: &str) -> Result<Option<T>> {
    match store.get(name).await {
        Ok(object) => Ok(Some(object)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write `after` back unless reconciling left it untouched.
async fn write_if_changed<T: Object>(store: &dyn ObjectStore<T>, before: &T, after: T) -> Result<T> {
    if *before == after {
        return Ok(after);
    }
    debug!(kind = %T::KIND, name = %after.name(), "Writing back reconciled object");
    Ok(store.update(after).await?)
}

/// Counter value for a status field.
fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
