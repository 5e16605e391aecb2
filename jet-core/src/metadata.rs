//! Metadata store
//!
//! Associative storage keyed by (concern, scope) used in place of runtime
//! reflection. Declarations write into it during bootstrap; route
//! installation and dependency resolution read from it afterwards.
//! Entries are never removed.

use crate::logging::{debug, trace};
use crate::{Error, Result};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// One key per concern, so unrelated concerns never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKey {
    BasePath,
    Routes,
    ParamBindings,
    InjectableProperties,
    DesignType,
}

/// Identity of a declared type.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path.
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        match base.rfind("::") {
            Some(pos) => &self.name[pos + 2..],
            None => self.name,
        }
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// What a metadata entry is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Type(TypeKey),
    Member(TypeKey, Cow<'static, str>),
    Parameter(TypeKey, Cow<'static, str>, usize),
}

impl Scope {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Scope::Type(TypeKey::of::<T>())
    }

    pub fn member(owner: TypeKey, member: impl Into<Cow<'static, str>>) -> Self {
        Scope::Member(owner, member.into())
    }

    pub fn parameter(owner: TypeKey, member: impl Into<Cow<'static, str>>, index: usize) -> Self {
        Scope::Parameter(owner, member.into(), index)
    }

    pub fn owner(&self) -> TypeKey {
        match self {
            Scope::Type(owner) | Scope::Member(owner, _) | Scope::Parameter(owner, _, _) => *owner,
        }
    }
}

type Entry = Arc<dyn Any + Send + Sync>;

static GLOBAL: Lazy<Arc<MetadataStore>> = Lazy::new(|| Arc::new(MetadataStore::new()));

/// Metadata storage shared by declarations and their consumers.
pub struct MetadataStore {
    entries: RwLock<HashMap<(MetadataKey, Scope), Entry>>,
    frozen: AtomicBool,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            frozen: AtomicBool::new(false),
        }
    }

    /// The process-wide store.
    pub fn global() -> Arc<MetadataStore> {
        GLOBAL.clone()
    }

    /// Overwrite the value stored for (key, scope).
    pub fn define<V: Send + Sync + 'static>(
        &self,
        key: MetadataKey,
        scope: Scope,
        value: V,
    ) -> Result<()> {
        self.ensure_writable(key, &scope)?;
        trace!(key = ?key, scope = ?scope, "Defining metadata");
        self.entries.write().insert((key, scope), Arc::new(value));
        Ok(())
    }

    /// Stored value, or `default` when absent or of a different type.
    pub fn get<V: Clone + Send + Sync + 'static>(
        &self,
        key: MetadataKey,
        scope: &Scope,
        default: V,
    ) -> V {
        self.get_opt(key, scope).unwrap_or(default)
    }

    pub fn get_opt<V: Clone + Send + Sync + 'static>(
        &self,
        key: MetadataKey,
        scope: &Scope,
    ) -> Option<V> {
        let entries = self.entries.read();
        entries
            .get(&(key, scope.clone()))
            .and_then(|entry| entry.downcast_ref::<V>())
            .cloned()
    }

    pub fn contains(&self, key: MetadataKey, scope: &Scope) -> bool {
        self.entries.read().contains_key(&(key, scope.clone()))
    }

    /// Read-modify-write of one entry under a single write lock.
    pub fn update<V, F>(&self, key: MetadataKey, scope: Scope, default: V, f: F) -> Result<()>
    where
        V: Clone + Send + Sync + 'static,
        F: FnOnce(&mut V),
    {
        self.ensure_writable(key, &scope)?;
        let mut entries = self.entries.write();
        let mut value = entries
            .get(&(key, scope.clone()))
            .and_then(|entry| entry.downcast_ref::<V>())
            .cloned()
            .unwrap_or(default);
        f(&mut value);
        trace!(key = ?key, scope = ?scope, "Updated metadata");
        entries.insert((key, scope), Arc::new(value));
        Ok(())
    }

    /// End the declaration phase; the store is read-only afterwards.
    pub fn freeze(&self) {
        if !self.frozen.swap(true, Ordering::AcqRel) {
            debug!(entries = self.len(), "Metadata store frozen");
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn ensure_writable(&self, key: MetadataKey, scope: &Scope) -> Result<()> {
        if self.is_frozen() {
            return Err(Error::Configuration(format!(
                "metadata store is frozen; cannot write {:?} for {:?}",
                key, scope
            )));
        }
        Ok(())
    }
}

impl Default for MetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget;
    struct Gadget;

    #[test]
    fn test_get_returns_default_when_missing() {
        let store = MetadataStore::new();
        let value: String = store.get(MetadataKey::BasePath, &Scope::of::<Widget>(), "none".into());
        assert_eq!(value, "none");
    }

    #[test]
    fn test_define_overwrites() {
        let store = MetadataStore::new();
        let scope = Scope::of::<Widget>();
        store
            .define(MetadataKey::BasePath, scope.clone(), "/a".to_string())
            .unwrap();
        store
            .define(MetadataKey::BasePath, scope.clone(), "/b".to_string())
            .unwrap();
        assert_eq!(
            store.get_opt::<String>(MetadataKey::BasePath, &scope).as_deref(),
            Some("/b")
        );
    }

    #[test]
    fn test_keys_and_scopes_are_namespaced() {
        let store = MetadataStore::new();
        store
            .define(MetadataKey::BasePath, Scope::of::<Widget>(), 1u32)
            .unwrap();

        assert!(!store.contains(MetadataKey::Routes, &Scope::of::<Widget>()));
        assert!(!store.contains(MetadataKey::BasePath, &Scope::of::<Gadget>()));
        assert!(!store.contains(
            MetadataKey::BasePath,
            &Scope::member(TypeKey::of::<Widget>(), "handler")
        ));
    }

    #[test]
    fn test_update_appends() {
        let store = MetadataStore::new();
        let scope = Scope::member(TypeKey::of::<Widget>(), "list");
        for i in 0..3u32 {
            store
                .update(MetadataKey::ParamBindings, scope.clone(), Vec::new(), |v: &mut Vec<u32>| {
                    v.push(i)
                })
                .unwrap();
        }
        assert_eq!(
            store.get(MetadataKey::ParamBindings, &scope, Vec::<u32>::new()),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_frozen_store_rejects_writes() {
        let store = MetadataStore::new();
        store
            .define(MetadataKey::DesignType, Scope::of::<Widget>(), 1u8)
            .unwrap();
        store.freeze();

        let err = store
            .define(MetadataKey::DesignType, Scope::of::<Gadget>(), 2u8)
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(
            store.get_opt::<u8>(MetadataKey::DesignType, &Scope::of::<Widget>()),
            Some(1)
        );
    }

    #[test]
    fn test_type_key_names() {
        let key = TypeKey::of::<Widget>();
        assert_eq!(key.short_name(), "Widget");
        assert_eq!(key, TypeKey::of::<Widget>());
        assert_ne!(key, TypeKey::of::<Gadget>());
    }
}
