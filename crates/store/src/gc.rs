//! Owner-reference garbage collector.
//!
//! Deletion cascades down the ownership tree Operation > RuntimeTaskGroup >
//! RuntimeTask. A marked object is removed once nothing it owns is left;
//! an object whose owner is gone is marked.

use std::collections::BTreeSet;

use operator_api::{LabelSelector, Object, ObjectKind, Uid};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::store::{ObjectStore, Store};
use crate::watch::WatchPattern;

/// Cascading deletion for a [`Store`].
#[derive(Clone)]
pub struct GarbageCollector {
    store: Store,
}

impl GarbageCollector {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Run one collection pass over every kind.
    ///
    /// Returns the number of objects marked or removed.
    ///
    /// # Errors
    ///
    /// Returns the first store error other than a not-found race.
    pub async fn collect(&self) -> Result<usize> {
        let everything = LabelSelector::default();
        let operations = self.store.operations().list(&everything).await?;
        let groups = self.store.task_groups().list(&everything).await?;
        let tasks = self.store.tasks().list(&everything).await?;

        let operation_uids = live_uids(&operations);
        let group_uids = live_uids(&groups);
        let mut actions = 0_usize;

        actions = actions.saturating_add(
            sweep(
                self.store.operations().as_ref(),
                &operations,
                |_| true,
                |op| owns_any(op.metadata.uid, &groups),
            )
            .await?,
        );
        actions = actions.saturating_add(
            sweep(
                self.store.task_groups().as_ref(),
                &groups,
                |group| owner_alive(group, ObjectKind::Operation, &operation_uids),
                |group| owns_any(group.metadata.uid, &tasks),
            )
            .await?,
        );
        actions = actions.saturating_add(
            sweep(
                self.store.tasks().as_ref(),
                &tasks,
                |task| owner_alive(task, ObjectKind::RuntimeTaskGroup, &group_uids),
                |_| false,
            )
            .await?,
        );

        if actions > 0 {
            debug!(actions, "Garbage collection pass");
        }
        Ok(actions)
    }

    /// Collect on every change until `shutdown` flips to `true`.
    ///
    /// # Errors
    ///
    /// Returns when the watch bus closes.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut changes = self.store.bus().subscribe(WatchPattern::All);
        info!("Garbage collector started");
        loop {
            if *shutdown.borrow() {
                info!("Garbage collector stopped");
                return Ok(());
            }
            if let Err(e) = self.collect().await {
                warn!(error = %e, "Garbage collection failed");
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Garbage collector stopped");
                        return Ok(());
                    }
                }
                event = changes.recv() => match event {
                    Ok(_) | Err(Error::Lagged { .. }) => {}
                    Err(e) => return Err(e),
                },
            }
        }
    }
}

/// Uids of the objects that exist and are not marked for deletion.
fn live_uids<T: Object>(objects: &[T]) -> BTreeSet<Uid> {
    objects
        .iter()
        .filter(|o| !o.metadata().is_deleted())
        .map(|o| o.metadata().uid)
        .collect()
}

fn owns_any<T: Object>(owner: Uid, objects: &[T]) -> bool {
    objects
        .iter()
        .any(|o| o.metadata().owner_references.iter().any(|r| r.uid == owner))
}

/// Whether the object has an owner of `kind` that is still live. Objects
/// without such an owner reference are left alone.
fn owner_alive<T: Object>(object: &T, kind: ObjectKind, live: &BTreeSet<Uid>) -> bool {
    object
        .metadata()
        .owner(kind)
        .is_none_or(|owner| live.contains(&owner.uid))
}

/// Mark orphans and remove marked objects that no longer own anything.
async fn sweep<T: Object>(
    store: &dyn ObjectStore<T>,
    objects: &[T],
    has_owner: impl Fn(&T) -> bool + Send,
    has_dependents: impl Fn(&T) -> bool + Send,
) -> Result<usize> {
    let mut actions = 0_usize;
    for object in objects {
        let name = object.name();
        let result = if object.metadata().is_deleted() {
            if has_dependents(object) {
                continue;
            }
            debug!(kind = %T::KIND, name, "Removing deleted object");
            store.remove(name).await
        } else if has_owner(object) {
            continue;
        } else {
            debug!(kind = %T::KIND, name, "Deleting orphan");
            store.delete(name).await
        };
        match result {
            Ok(()) => actions = actions.saturating_add(1),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(actions)
}
