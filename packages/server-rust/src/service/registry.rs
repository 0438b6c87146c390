use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;
use mediator_core::{ClockSource, SystemClock};
use parking_lot::RwLock;
use tracing::{info, warn};

use super::config::ServerConfig;
use super::operation::OperationDescriptor;
use crate::storage::{engines::HashMapStorage, StorageEngine};

// ---------------------------------------------------------------------------
// UnitDeps
// ---------------------------------------------------------------------------

/// Dependency bundle handed to every unit factory.
///
/// Units that need no dependencies simply ignore it.
#[derive(Clone)]
pub struct UnitDeps {
    pub store: Arc<dyn StorageEngine>,
    pub clock: Arc<dyn ClockSource>,
    pub config: Arc<ServerConfig>,
}

impl UnitDeps {
    #[must_use]
    pub fn new(store: Arc<dyn StorageEngine>, config: Arc<ServerConfig>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Fresh in-memory store, system clock, default configuration.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(HashMapStorage::new()),
            Arc::new(ServerConfig::default()),
        )
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }
}

// ---------------------------------------------------------------------------
// Unit trait
// ---------------------------------------------------------------------------

/// An independently authored component exposing named operations over its
/// own state.
///
/// Each unit publishes an explicit registration table: one
/// [`OperationDescriptor`] per operation, with the handle already bound to
/// the unit instance. The `Any` bound enables typed lookup via
/// [`UnitRegistry::get`].
pub trait Unit: Send + Sync + Any {
    /// Name the unit's operations are addressed by (e.g. `"Following"`).
    fn name(&self) -> &'static str;

    /// The unit's registration table.
    fn operations(self: Arc<Self>) -> Vec<OperationDescriptor>;
}

// ---------------------------------------------------------------------------
// UnitRegistry
// ---------------------------------------------------------------------------

/// Registry of unit instances and their operation descriptors.
///
/// Provides two lookup mechanisms:
/// - **By operation** (`operation`): `"Unit/operation"` key to descriptor
/// - **By type** (`get::<T>`): uses `TypeId` to recover the concrete unit
///
/// Populated at startup and read-only afterwards.
pub struct UnitRegistry {
    /// `"Unit/operation"` -> descriptor.
    operations: DashMap<String, OperationDescriptor>,
    /// `TypeId` -> unit instance.
    by_type: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    /// Registration order of units, and of operations within each unit.
    order: RwLock<Vec<(&'static str, Vec<String>)>>,
}

impl UnitRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            operations: DashMap::new(),
            by_type: DashMap::new(),
            order: RwLock::new(Vec::new()),
        }
    }

    /// Registers a unit and all operations in its registration table.
    ///
    /// Returns the number of operations registered. A unit whose name is
    /// already taken, or that exposes no operations, is skipped with a warning
    /// and yields 0.
    pub fn register<T: Unit>(&self, unit: Arc<T>) -> usize {
        let name = unit.name();
        if self.order.read().iter().any(|(n, _)| *n == name) {
            warn!(unit = name, "unit name already registered, skipping");
            return 0;
        }

        let descriptors = Arc::clone(&unit).operations();
        if descriptors.is_empty() {
            warn!(unit = name, "unit exposes no operations, skipping");
            return 0;
        }

        let mut keys = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let key = descriptor.key();
            info!(operation = %key, arity = descriptor.arity, "registered operation");
            keys.push(key.clone());
            self.operations.insert(key, descriptor);
        }
        let count = keys.len();
        self.by_type.insert(TypeId::of::<T>(), unit);
        self.order.write().push((name, keys));
        count
    }

    /// Retrieve a unit by its concrete type.
    pub fn get<T: Unit>(&self) -> Option<Arc<T>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.value().clone().downcast::<T>().ok())
    }

    /// Retrieve the descriptor for `unit`/`operation`.
    pub fn operation(&self, unit: &str, operation: &str) -> Option<OperationDescriptor> {
        self.operations
            .get(&format!("{unit}/{operation}"))
            .map(|entry| entry.value().clone())
    }

    /// All descriptors in registration order.
    pub fn descriptors(&self) -> Vec<OperationDescriptor> {
        let order = self.order.read();
        order
            .iter()
            .flat_map(|(_, keys)| keys.iter())
            .filter_map(|key| self.operations.get(key).map(|e| e.value().clone()))
            .collect()
    }

    /// Registered unit names in registration order.
    pub fn unit_names(&self) -> Vec<&'static str> {
        self.order.read().iter().map(|(name, _)| *name).collect()
    }
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// UnitLoader
// ---------------------------------------------------------------------------

type Factory = Box<dyn Fn(&UnitDeps, &UnitRegistry) -> anyhow::Result<usize> + Send + Sync>;

/// Outcome of [`UnitLoader::load`].
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Units registered, with their operation counts.
    pub loaded: Vec<(&'static str, usize)>,
    /// Units skipped, with the reason.
    pub skipped: Vec<(&'static str, String)>,
}

/// Ordered table of unit factories.
///
/// Replaces directory scanning: every available unit is listed explicitly,
/// and every factory receives the same [`UnitDeps`] bundle.
#[derive(Default)]
pub struct UnitLoader {
    factories: Vec<(&'static str, Factory)>,
}

impl UnitLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a factory for a unit of type `T`.
    #[must_use]
    pub fn with<T, F>(mut self, name: &'static str, factory: F) -> Self
    where
        T: Unit,
        F: Fn(&UnitDeps) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let build: Factory = Box::new(move |deps, registry| {
            let unit = factory(deps)?;
            Ok(registry.register(Arc::new(unit)))
        });
        self.factories.push((name, build));
        self
    }

    /// Instantiates every unit and registers its operations.
    ///
    /// A factory that fails, or a unit that registers no operations, is
    /// skipped with a warning; the remaining units still load.
    pub fn load(&self, deps: &UnitDeps, registry: &UnitRegistry) -> LoadReport {
        let mut report = LoadReport::default();
        for (name, factory) in &self.factories {
            let name = *name;
            match factory(deps, registry) {
                Ok(0) => {
                    warn!(unit = name, "unit exposes no operations, skipping");
                    report.skipped.push((name, "no operations registered".to_string()));
                }
                Ok(count) => {
                    info!(unit = name, operations = count, "registered unit");
                    report.loaded.push((name, count));
                }
                Err(e) => {
                    warn!(unit = name, error = %e, "could not instantiate unit, skipping");
                    report.skipped.push((name, e.to_string()));
                }
            }
        }
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
