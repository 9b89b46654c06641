//! Object store trait and the in-memory implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use operator_api::{LabelSelector, Node, Object, Operation, RuntimeTask, RuntimeTaskGroup};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::watch::{ChangeKind, WatchBus, WatchEvent};

/// Storage for one object kind.
///
/// Writes are optimistic: `update` fails with [`Error::Conflict`] when the
/// object's `resourceVersion` no longer matches the stored one.
#[async_trait]
pub trait ObjectStore<T: Object>: Send + Sync {
    /// Get an object by name.
    async fn get(&self, name: &str) -> Result<T>;

    /// List the objects whose labels match the selector, sorted by name.
    async fn list(&self, selector: &LabelSelector) -> Result<Vec<T>>;

    /// Store a new object; returns it with its resource version set.
    async fn create(&self, object: T) -> Result<T>;

    /// Replace an object read earlier; returns it with the new resource version.
    async fn update(&self, object: T) -> Result<T>;

    /// Set the deletion marker. Dependents are collected by the garbage
    /// collector, which then removes the object.
    async fn delete(&self, name: &str) -> Result<()>;

    /// Drop an object for good.
    async fn remove(&self, name: &str) -> Result<()>;
}

/// In-memory object store.
pub struct InMemoryObjectStore<T: Object> {
    objects: RwLock<BTreeMap<String, T>>,
    bus: WatchBus,
}

impl<T: Object> InMemoryObjectStore<T> {
    /// Create a store publishing its changes on `bus`.
    pub fn new(bus: WatchBus) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            bus,
        }
    }

    /// Create a store wrapped in an Arc.
    pub fn new_arc(bus: WatchBus) -> Arc<Self> {
        Arc::new(Self::new(bus))
    }
}

#[async_trait]
impl<T: Object> ObjectStore<T> for InMemoryObjectStore<T> {
    async fn get(&self, name: &str) -> Result<T> {
        let objects = self.objects.read().await;
        objects
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(T::KIND, name))
    }

    async fn list(&self, selector: &LabelSelector) -> Result<Vec<T>> {
        let objects = self.objects.read().await;
        Ok(objects
            .values()
            .filter(|o| selector.matches(&o.metadata().labels))
            .cloned()
            .collect())
    }

    async fn create(&self, mut object: T) -> Result<T> {
        let mut objects = self.objects.write().await;
        let name = object.name().to_string();
        if objects.contains_key(&name) {
            return Err(Error::already_exists(T::KIND, name));
        }

        let meta = object.metadata_mut();
        meta.resource_version = 1;
        meta.creation_timestamp.get_or_insert_with(Utc::now);

        debug!(kind = %T::KIND, name = %name, "Created object");
        objects.insert(name, object.clone());
        self.bus
            .publish(WatchEvent::for_object(&object, ChangeKind::Added));
        Ok(object)
    }

    async fn update(&self, mut object: T) -> Result<T> {
        let mut objects = self.objects.write().await;
        let name = object.name().to_string();
        let stored = objects
            .get(&name)
            .ok_or_else(|| Error::not_found(T::KIND, name.as_str()))?;

        let expected = object.metadata().resource_version;
        let actual = stored.metadata().resource_version;
        if expected != actual {
            return Err(Error::conflict(T::KIND, name, expected, actual));
        }

        object.metadata_mut().resource_version = actual.saturating_add(1);
        debug!(
            kind = %T::KIND,
            name = %name,
            resource_version = actual.saturating_add(1),
            "Updated object"
        );
        objects.insert(name, object.clone());
        self.bus
            .publish(WatchEvent::for_object(&object, ChangeKind::Modified));
        Ok(object)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let mut objects = self.objects.write().await;
        let object = objects
            .get_mut(name)
            .ok_or_else(|| Error::not_found(T::KIND, name))?;
        if object.metadata().is_deleted() {
            return Ok(());
        }

        let meta = object.metadata_mut();
        meta.deletion_timestamp = Some(Utc::now());
        meta.resource_version = meta.resource_version.saturating_add(1);

        debug!(kind = %T::KIND, name = %name, "Marked object for deletion");
        self.bus
            .publish(WatchEvent::for_object(&*object, ChangeKind::Modified));
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let mut objects = self.objects.write().await;
        let object = objects
            .remove(name)
            .ok_or_else(|| Error::not_found(T::KIND, name))?;

        debug!(kind = %T::KIND, name = %name, "Removed object");
        self.bus
            .publish(WatchEvent::for_object(&object, ChangeKind::Deleted));
        Ok(())
    }
}

/// The stores of one cluster, sharing a single watch bus.
#[derive(Clone)]
pub struct Store {
    operations: Arc<dyn ObjectStore<Operation>>,
    task_groups: Arc<dyn ObjectStore<RuntimeTaskGroup>>,
    tasks: Arc<dyn ObjectStore<RuntimeTask>>,
    nodes: Arc<dyn ObjectStore<Node>>,
    bus: WatchBus,
}

impl Store {
    /// A cluster held entirely in memory.
    pub fn in_memory() -> Self {
        let bus = WatchBus::new();
        Self {
            operations: InMemoryObjectStore::new_arc(bus.clone()),
            task_groups: InMemoryObjectStore::new_arc(bus.clone()),
            tasks: InMemoryObjectStore::new_arc(bus.clone()),
            nodes: InMemoryObjectStore::new_arc(bus.clone()),
            bus,
        }
    }

    pub fn operations(&self) -> &Arc<dyn ObjectStore<Operation>> {
        &self.operations
    }

    pub fn task_groups(&self) -> &Arc<dyn ObjectStore<RuntimeTaskGroup>> {
        &self.task_groups
    }

    pub fn tasks(&self) -> &Arc<dyn ObjectStore<RuntimeTask>> {
        &self.tasks
    }

    pub fn nodes(&self) -> &Arc<dyn ObjectStore<Node>> {
        &self.nodes
    }

    /// The watch bus every store publishes on.
    pub fn bus(&self) -> &WatchBus {
        &self.bus
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::in_memory()
    }
}
