//! # Pool Registry
//!
//! One place that owns the pools an application shares, keyed by element or
//! payload type. Build it once at startup and pass it by reference; there is
//! no global instance.
//!
//! ```text
//!   main()
//!     └─ PoolRegistry::from_toml_file("cistern.toml")
//!          ├─ array_pool::<u8>()      ──> Arc<ConcurrentArrayPool<u8>>
//!          ├─ array_pool::<f32>()     ──> Arc<ConcurrentArrayPool<f32>>
//!          ├─ object_pool::<Packet>() ──> ConcurrentObjectPool<Packet>
//!          └─ text()                  ──> &TextBuilderPool
//! ```

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use cistern_core::{ConcurrentArrayPool, ConcurrentObjectPool};
use parking_lot::RwLock;

use crate::config::RegistryConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::text::TextBuilderPool;

/// A pool whose idle instances can be dropped on demand.
pub trait Trimmable: Send + Sync {
    /// Drops idle instances. Returns how many were dropped.
    fn trim(&self) -> usize;
}

impl<T: Default + Send + 'static> Trimmable for ConcurrentArrayPool<T> {
    fn trim(&self) -> usize {
        ConcurrentArrayPool::trim(self)
    }
}

impl<T: Send + 'static> Trimmable for ConcurrentObjectPool<T> {
    fn trim(&self) -> usize {
        self.clear()
    }
}

impl Trimmable for TextBuilderPool {
    fn trim(&self) -> usize {
        self.clear()
    }
}

struct Entry {
    pool: Arc<dyn Any + Send + Sync>,
    trim: Arc<dyn Trimmable>,
    type_name: &'static str,
}

impl Entry {
    fn new<P: Trimmable + 'static>(pool: Arc<P>, type_name: &'static str) -> Self {
        Self {
            pool: Arc::clone(&pool) as Arc<dyn Any + Send + Sync>,
            trim: pool,
            type_name,
        }
    }

    fn downcast<P: Send + Sync + 'static>(&self) -> Arc<P> {
        match Arc::clone(&self.pool).downcast::<P>() {
            Ok(pool) => pool,
            Err(_) => unreachable!("registry entry for {} holds another type", self.type_name),
        }
    }
}

type Entries = RwLock<HashMap<TypeId, Entry>>;

/// Shared pools keyed by type.
///
/// # Example
///
/// ```rust
/// use cistern::PoolRegistry;
///
/// let registry = PoolRegistry::default();
///
/// let bytes = registry.array_pool::<u8>()?;
/// let again = registry.array_pool::<u8>()?;
/// assert!(std::sync::Arc::ptr_eq(&bytes, &again));
///
/// let scratch = registry.object_pool_or_create(Vec::<u32>::new);
/// drop(scratch.get());
/// assert_eq!(registry.trim(), 1);
/// # Ok::<(), cistern::RegistryError>(())
/// ```
pub struct PoolRegistry {
    config: RegistryConfig,
    arrays: Entries,
    objects: Entries,
    text: TextBuilderPool,
}

impl PoolRegistry {
    /// Creates an empty registry.
    ///
    /// # Errors
    ///
    /// Returns an invalid-config error if `config` does not validate.
    pub fn new(config: RegistryConfig) -> RegistryResult<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: RegistryConfig) -> Self {
        let text = TextBuilderPool::new(&config.text);
        Self {
            config,
            arrays: RwLock::new(HashMap::new()),
            objects: RwLock::new(HashMap::new()),
            text,
        }
    }

    /// Creates a registry from a TOML document.
    ///
    /// # Errors
    ///
    /// See [`RegistryConfig::from_toml_str`].
    pub fn from_toml_str(source: &str) -> RegistryResult<Self> {
        RegistryConfig::from_toml_str(source).map(Self::from_valid_config)
    }

    /// Creates a registry from a TOML file.
    ///
    /// # Errors
    ///
    /// See [`RegistryConfig::from_toml_file`].
    pub fn from_toml_file(path: impl AsRef<Path>) -> RegistryResult<Self> {
        RegistryConfig::from_toml_file(path).map(Self::from_valid_config)
    }

    /// The configuration this registry was built with.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// The shared array pool for `T`, created on first use from the
    /// `[array]` settings.
    ///
    /// # Errors
    ///
    /// Returns an invalid-config error if the pool cannot be built.
    pub fn array_pool<T: Default + Send + 'static>(
        &self,
    ) -> RegistryResult<Arc<ConcurrentArrayPool<T>>> {
        let key = TypeId::of::<T>();
        if let Some(entry) = self.arrays.read().get(&key) {
            return Ok(entry.downcast());
        }

        let mut arrays = self.arrays.write();
        // Another thread may have won the race.
        if let Some(entry) = arrays.get(&key) {
            return Ok(entry.downcast());
        }

        let pool = Arc::new(ConcurrentArrayPool::<T>::with_config(&self.config.pools.array)?);
        tracing::debug!(element = type_name::<T>(), "created array pool");
        arrays.insert(key, Entry::new(Arc::clone(&pool), type_name::<T>()));
        Ok(pool)
    }

    /// Registers a custom object pool for `T`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyRegistered`] if `T` already has a pool.
    pub fn register_object_pool<T: Send + 'static>(
        &self,
        pool: ConcurrentObjectPool<T>,
    ) -> RegistryResult<()> {
        let mut objects = self.objects.write();
        let key = TypeId::of::<T>();
        if objects.contains_key(&key) {
            return Err(RegistryError::AlreadyRegistered(type_name::<T>()));
        }
        objects.insert(key, Entry::new(Arc::new(pool), type_name::<T>()));
        Ok(())
    }

    /// The object pool registered for `T`, if any.
    #[must_use]
    pub fn object_pool<T: Send + 'static>(&self) -> Option<ConcurrentObjectPool<T>> {
        self.objects
            .read()
            .get(&TypeId::of::<T>())
            .map(|entry| ConcurrentObjectPool::clone(&entry.downcast::<ConcurrentObjectPool<T>>()))
    }

    /// The object pool for `T`, building one from `factory` and the
    /// `[object]` settings if none is registered.
    pub fn object_pool_or_create<T: Send + 'static>(
        &self,
        factory: impl Fn() -> T + Send + Sync + 'static,
    ) -> ConcurrentObjectPool<T> {
        if let Some(pool) = self.object_pool::<T>() {
            return pool;
        }

        let mut objects = self.objects.write();
        let entry = objects.entry(TypeId::of::<T>()).or_insert_with(|| {
            tracing::debug!(payload = type_name::<T>(), "created object pool");
            let pool = ConcurrentObjectPool::builder(factory)
                .config(&self.config.pools.object)
                .build();
            Entry::new(Arc::new(pool), type_name::<T>())
        });
        ConcurrentObjectPool::clone(&entry.downcast::<ConcurrentObjectPool<T>>())
    }

    /// The pooled text builders.
    #[inline]
    #[must_use]
    pub fn text(&self) -> &TextBuilderPool {
        &self.text
    }

    /// Number of array pools created so far.
    #[must_use]
    pub fn array_pool_count(&self) -> usize {
        self.arrays.read().len()
    }

    /// Number of object pools registered so far.
    #[must_use]
    pub fn object_pool_count(&self) -> usize {
        self.objects.read().len()
    }

    /// Drops every idle buffer, object and text builder in every pool.
    /// Returns how many instances were dropped.
    pub fn trim(&self) -> usize {
        let pools: Vec<Arc<dyn Trimmable>> = self
            .arrays
            .read()
            .values()
            .chain(self.objects.read().values())
            .map(|entry| Arc::clone(&entry.trim))
            .collect();

        let dropped = pools.iter().map(|pool| pool.trim()).sum::<usize>() + self.text.trim();
        tracing::debug!(pools = pools.len() + 1, dropped, "trimmed registry");
        dropped
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::from_valid_config(RegistryConfig::default())
    }
}

impl fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |entries: &Entries| -> Vec<&'static str> {
            entries.read().values().map(|entry| entry.type_name).collect()
        };
        f.debug_struct("PoolRegistry")
            .field("arrays", &names(&self.arrays))
            .field("objects", &names(&self.objects))
            .field("text", &self.text)
            .finish_non_exhaustive()
    }
}
