//! Providers are external entities published in a shared registry, which can satisfy
//! dependencies of components. The registry itself is not part of this crate - it only needs to
//! deliver [ProviderHandle]s and, at construction time, report which providers are currently
//! known via a [ProviderTracker] or a ready [ProviderSnapshot].
//!
//! Each handle is an immutable snapshot: when a provider changes its published properties, the
//! registry delivers a new handle with the same [ProviderId] (see
//! [ProviderHandle::with_properties]).

use crate::descriptor::DependencyDescriptor;
use derivative::Derivative;
use fxhash::FxHashMap;
#[cfg(test)]
use mockall::automock;
use serde_json::{Map, Value};
use std::any::{type_name, Any};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::sync::Arc;

/// Name of the property carrying the ranking of a provider.
pub const SERVICE_RANKING: &str = "service.ranking";

/// Published provider properties, in the order the provider declared them.
pub type Properties = Map<String, Value>;

/// The object exposed by a provider.
pub type ProviderObject = Arc<dyn Any + Send + Sync>;

/// Registry-assigned provider identity. Identifiers grow with registration order, so a lower
/// identifier means an earlier registration.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct ProviderId(pub u64);

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Read-only snapshot of provider properties.
#[derive(Clone, Debug, Default)]
pub struct PropertiesView(Arc<Properties>);

impl PropertiesView {
    pub fn new(properties: Properties) -> Self {
        Self(Arc::new(properties))
    }

    /// Checks if both views point to the same snapshot.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for PropertiesView {
    type Target = Properties;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq for PropertiesView {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl From<Properties> for PropertiesView {
    fn from(value: Properties) -> Self {
        Self::new(value)
    }
}

#[derive(Derivative)]
#[derivative(Debug)]
struct HandleData {
    id: ProviderId,
    interface: String,
    ranking: i32,
    properties: PropertiesView,
    #[derivative(Debug = "ignore")]
    object: ProviderObject,
}

/// Cheaply cloneable handle to a provider, as delivered by the registry.
#[derive(Clone, Debug)]
pub struct ProviderHandle {
    data: Arc<HandleData>,
}

impl ProviderHandle {
    /// Creates a handle for a provider registered under given interface name.
    pub fn new<I: Into<String>>(
        id: u64,
        interface: I,
        object: ProviderObject,
        properties: Properties,
    ) -> Self {
        Self {
            data: Arc::new(HandleData {
                id: ProviderId(id),
                interface: interface.into(),
                ranking: ranking_of(&properties),
                properties: PropertiesView::new(properties),
                object,
            }),
        }
    }

    /// Creates a handle for a typed service. The interface name is the type name of `S`, which
    /// matches [Capability::of](crate::descriptor::Capability::of).
    pub fn for_service<S: Any + Send + Sync>(
        id: u64,
        service: Arc<S>,
        properties: Properties,
    ) -> Self {
        Self::new(id, type_name::<S>(), service as ProviderObject, properties)
    }

    /// Returns a new snapshot of the same provider with changed properties.
    pub fn with_properties(&self, properties: Properties) -> Self {
        Self {
            data: Arc::new(HandleData {
                id: self.data.id,
                interface: self.data.interface.clone(),
                ranking: ranking_of(&properties),
                properties: PropertiesView::new(properties),
                object: self.data.object.clone(),
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> ProviderId {
        self.data.id
    }

    #[inline]
    pub fn interface(&self) -> &str {
        &self.data.interface
    }

    #[inline]
    pub fn ranking(&self) -> i32 {
        self.data.ranking
    }

    #[inline]
    pub fn properties(&self) -> &PropertiesView {
        &self.data.properties
    }

    #[inline]
    pub fn object(&self) -> &ProviderObject {
        &self.data.object
    }

    /// Tries to get the provider object as a concrete service type.
    pub fn service<S: Any + Send + Sync>(&self) -> Option<Arc<S>> {
        self.data.object.clone().downcast::<S>().ok()
    }

    /// Checks if both handles are the same snapshot.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Total precedence order between providers: [Ordering::Greater] means `self` takes
    /// precedence. Higher ranking wins; on equal ranking the earlier registration wins.
    pub fn precedence(&self, other: &Self) -> Ordering {
        self.ranking()
            .cmp(&other.ranking())
            .then_with(|| other.id().cmp(&self.id()))
    }
}

fn ranking_of(properties: &Properties) -> i32 {
    properties
        .get(SERVICE_RANKING)
        .and_then(Value::as_i64)
        .map(|ranking| ranking.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
        .unwrap_or(0)
}

/// Source of currently known providers, consulted only while constructing an instance.
#[cfg_attr(test, automock)]
pub trait ProviderTracker {
    /// Returns providers which could satisfy given dependency, in registration order.
    fn candidates(&self, descriptor: &DependencyDescriptor) -> Vec<ProviderHandle>;
}

/// Providers known at construction time, grouped by dependency name.
#[derive(Clone, Debug, Default)]
pub struct ProviderSnapshot {
    providers: FxHashMap<String, Vec<ProviderHandle>>,
}

impl ProviderSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the tracker for the candidates of each given dependency.
    pub fn collect<'a, I>(tracker: &dyn ProviderTracker, descriptors: I) -> Self
    where
        I: IntoIterator<Item = &'a DependencyDescriptor>,
    {
        Self {
            providers: descriptors
                .into_iter()
                .map(|descriptor| (descriptor.name().to_string(), tracker.candidates(descriptor)))
                .collect(),
        }
    }

    /// Adds a provider for given dependency, after any already present.
    pub fn with_provider<T: ToString>(mut self, dependency: T, handle: ProviderHandle) -> Self {
        self.providers
            .entry(dependency.to_string())
            .or_default()
            .push(handle);
        self
    }

    /// Returns providers for a dependency in the order they were added.
    pub fn providers(&self, dependency: &str) -> &[ProviderHandle] {
        self.providers
            .get(dependency)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}
