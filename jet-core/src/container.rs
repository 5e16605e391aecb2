// Dependency registry: one lazily constructed singleton per type

use crate::logging::{debug, trace};
use crate::metadata::{MetadataKey, MetadataStore, Scope, TypeKey};
use crate::{Error, Result};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

type Instance = Arc<dyn Any + Send + Sync>;
type Constructor = Arc<dyn Fn(&DependencyRegistry) -> Result<Instance> + Send + Sync>;
type Builder = fn(&DependencyRegistry) -> Result<Instance>;

/// Types the registry knows how to build.
///
/// `construct` receives the already-resolved values of every field listed by
/// `required_fields`, so an instance is complete the moment it exists.
pub trait Injectable: Send + Sync + Sized + 'static {
    /// Fields resolved from the registry before construction.
    fn required_fields() -> Vec<InjectableField> {
        Vec::new()
    }

    fn construct(fields: &mut ResolvedFields) -> Result<Self>;
}

/// A field whose value is resolved from the registry.
///
/// Fields created with [`InjectableField::of`] carry their type's builder, so
/// an injectable dependency that was never declared is still built on first
/// use. [`InjectableField::registered`] fields only accept an existing
/// singleton or a declared provider.
#[derive(Clone)]
pub struct InjectableField {
    pub field_name: String,
    pub declared_type: TypeKey,
    builder: Option<Builder>,
}

impl InjectableField {
    pub fn of<T: Injectable>(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            declared_type: TypeKey::of::<T>(),
            builder: Some(build_undeclared::<T>),
        }
    }

    /// A field satisfied only by a registered singleton or declared provider.
    pub fn registered<T: Send + Sync + 'static>(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            declared_type: TypeKey::of::<T>(),
            builder: None,
        }
    }

    /// Whether the field's type can be built without a declaration.
    pub fn is_buildable(&self) -> bool {
        self.builder.is_some()
    }
}

impl std::fmt::Debug for InjectableField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InjectableField")
            .field("field_name", &self.field_name)
            .field("declared_type", &self.declared_type)
            .field("buildable", &self.is_buildable())
            .finish()
    }
}

impl PartialEq for InjectableField {
    fn eq(&self, other: &Self) -> bool {
        self.field_name == other.field_name && self.declared_type == other.declared_type
    }
}

impl Eq for InjectableField {}

// Builds `T` from its own field list. Writes no metadata, so it also works
// once the store is frozen.
fn build_undeclared<T: Injectable>(registry: &DependencyRegistry) -> Result<Instance> {
    let key = TypeKey::of::<T>();
    let mut resolved = registry.inject_required_fields(key, &T::required_fields())?;
    let instance = T::construct(&mut resolved)?;
    Ok(Arc::new(instance) as Instance)
}

/// Resolved values of an owner's injectable fields.
pub struct ResolvedFields {
    owner: TypeKey,
    values: HashMap<String, Instance>,
}

impl ResolvedFields {
    pub fn empty(owner: TypeKey) -> Self {
        Self {
            owner,
            values: HashMap::new(),
        }
    }

    /// Take the value of `field_name` as `T`.
    pub fn take<T: Send + Sync + 'static>(&mut self, field_name: &str) -> Result<Arc<T>> {
        let value = self.values.remove(field_name).ok_or_else(|| {
            Error::DependencyResolution(format!(
                "{} has no resolved field `{}`",
                self.owner, field_name
            ))
        })?;
        value.downcast::<T>().map_err(|_| {
            Error::DependencyResolution(format!(
                "field `{}` of {} is not a {}",
                field_name,
                self.owner,
                std::any::type_name::<T>()
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

thread_local! {
    static RESOLVING: RefCell<Vec<TypeKey>> = const { RefCell::new(Vec::new()) };
}

/// Marks a type as under construction on this thread until dropped.
struct ResolutionGuard;

impl ResolutionGuard {
    fn enter(key: TypeKey) -> Result<Self> {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(start) = stack.iter().position(|k| *k == key) {
                let mut path: Vec<&str> = stack[start..].iter().map(|k| k.name()).collect();
                path.push(key.name());
                return Err(Error::DependencyResolution(format!(
                    "circular dependency: {}",
                    path.join(" -> ")
                )));
            }
            stack.push(key);
            Ok(ResolutionGuard)
        })
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// The dependency injection registry.
///
/// Every type maps to at most one live instance. Instances are built on first
/// resolution from the constructor recorded by [`DependencyRegistry::declare`]
/// and kept for the life of the registry.
#[derive(Clone)]
pub struct DependencyRegistry {
    store: Arc<MetadataStore>,
    slots: Arc<RwLock<HashMap<TypeId, Arc<OnceCell<Instance>>>>>,
}

impl DependencyRegistry {
    pub fn new(store: Arc<MetadataStore>) -> Self {
        debug!("Creating dependency registry");
        Self {
            store,
            slots: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<MetadataStore> {
        &self.store
    }

    /// Record how to build `T` and which of its fields need injection.
    pub fn declare<T: Injectable>(&self) -> Result<()> {
        let key = TypeKey::of::<T>();
        let fields = T::required_fields();
        debug!(
            provider = key.name(),
            fields = fields.len(),
            "Declaring injectable"
        );

        let constructor: Constructor = Arc::new(move |registry: &DependencyRegistry| {
            let fields = registry.injectable_fields(key);
            let mut resolved = registry.inject_required_fields(key, &fields)?;
            let instance = T::construct(&mut resolved)?;
            Ok(Arc::new(instance) as Instance)
        });

        self.store
            .define(MetadataKey::InjectableProperties, Scope::Type(key), fields)?;
        self.store
            .define(MetadataKey::DesignType, Scope::Type(key), constructor)
    }

    /// Declare `T` and build it right away.
    pub fn register_service<T: Injectable>(&self) -> Result<Arc<T>> {
        self.declare::<T>()?;
        self.resolve::<T>()
    }

    /// Install `instance` as the singleton for `T`, replacing any previous one.
    pub fn register_singleton<T: Send + Sync + 'static>(&self, instance: T) {
        self.register_arc(Arc::new(instance));
    }

    pub fn register_arc<T: Send + Sync + 'static>(&self, instance: Arc<T>) {
        let key = TypeKey::of::<T>();
        let slot = OnceCell::with_value(instance as Instance);
        let previous = self.slots.write().insert(key.id(), Arc::new(slot));
        debug!(
            provider = key.name(),
            replaced = previous.is_some(),
            "Singleton registered"
        );
    }

    /// Singleton for `T`, built on first use.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let key = TypeKey::of::<T>();
        self.resolve_key(key, None)?.downcast::<T>().map_err(|_| {
            Error::DependencyResolution(format!("registered instance is not a {}", key))
        })
    }

    /// Whether a live instance of `T` exists.
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.slots
            .read()
            .get(&TypeId::of::<T>())
            .is_some_and(|slot| slot.get().is_some())
    }

    /// Resolve each declared field of `owner`.
    pub fn inject_required_fields(
        &self,
        owner: TypeKey,
        fields: &[InjectableField],
    ) -> Result<ResolvedFields> {
        let mut resolved = ResolvedFields::empty(owner);
        for field in fields {
            trace!(
                owner = owner.name(),
                field = %field.field_name,
                declared_type = field.declared_type.name(),
                "Injecting field"
            );
            let value = self
                .resolve_key(field.declared_type, field.builder)
                .map_err(|e| match e {
                    Error::DependencyResolution(msg) => Error::DependencyResolution(format!(
                        "{}.{}: {}",
                        owner.short_name(),
                        field.field_name,
                        msg
                    )),
                    other => other,
                })?;
            resolved.values.insert(field.field_name.clone(), value);
        }
        Ok(resolved)
    }

    /// Fields recorded for `owner` at declaration.
    pub fn injectable_fields(&self, owner: TypeKey) -> Vec<InjectableField> {
        self.store.get(
            MetadataKey::InjectableProperties,
            &Scope::Type(owner),
            Vec::new(),
        )
    }

    fn slot(&self, key: TypeKey) -> Arc<OnceCell<Instance>> {
        if let Some(slot) = self.slots.read().get(&key.id()) {
            return slot.clone();
        }
        self.slots
            .write()
            .entry(key.id())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    fn resolve_key(&self, key: TypeKey, fallback: Option<Builder>) -> Result<Instance> {
        let slot = self.slot(key);
        if let Some(instance) = slot.get() {
            trace!(provider = key.name(), "Resolved cached singleton");
            return Ok(instance.clone());
        }

        // Checked before claiming the slot: re-entering the same OnceCell on
        // this thread would never complete.
        let _guard = ResolutionGuard::enter(key)?;
        slot.get_or_try_init(|| self.construct(key, fallback)).cloned()
    }

    fn construct(&self, key: TypeKey, fallback: Option<Builder>) -> Result<Instance> {
        if let Some(constructor) = self
            .store
            .get_opt::<Constructor>(MetadataKey::DesignType, &Scope::Type(key))
        {
            debug!(provider = key.name(), "Constructing singleton");
            return constructor(self);
        }

        match fallback {
            Some(build) => {
                debug!(provider = key.name(), "Constructing undeclared injectable");
                build(self)
            }
            None => Err(Error::DependencyResolution(format!(
                "{} was neither declared injectable nor registered",
                key
            ))),
        }
    }
}

impl Default for DependencyRegistry {
    fn default() -> Self {
        Self::new(Arc::new(MetadataStore::new()))
    }
}
