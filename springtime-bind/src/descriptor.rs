//! Immutable description of dependencies declared by a component type. A [DependencyDescriptor]
//! is created once, when component metadata is known, and shared read-only by all instances.

use crate::provider::{Properties, ProviderHandle};
use derivative::Derivative;
use serde::Deserialize;
use serde_json::Value;
use std::any::{type_name, Any, TypeId};
use std::sync::Arc;

/// How many providers a dependency requires and accepts.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    OptionalUnary,
    MandatoryUnary,
    OptionalMultiple,
    MandatoryMultiple,
}

impl Cardinality {
    #[inline]
    pub fn is_optional(self) -> bool {
        matches!(self, Self::OptionalUnary | Self::OptionalMultiple)
    }

    #[inline]
    pub fn is_multiple(self) -> bool {
        matches!(self, Self::OptionalMultiple | Self::MandatoryMultiple)
    }
}

/// Whether the bound provider set may change while an instance is alive.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferencePolicy {
    /// The provider set is fixed for the lifetime of an instance - changes require reactivation.
    Static,
    Dynamic,
}

/// Tie-break rule for unary dependencies with more than one candidate.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyOption {
    /// Keep the bound provider until it departs, even if a better one appears.
    Sticky,
    /// Switch to a better provider as soon as it appears.
    Preemptive,
}

/// How a multiple-cardinality field is kept up to date.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldUpdate {
    /// Each change installs a fresh immutable snapshot.
    Replace,
    /// Changes are applied to the existing container.
    UpdateInPlace,
}

/// What an `updated` event does to a static dependency of a live instance.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StaticUpdatePolicy {
    /// Property changes of a bound provider require reactivation.
    Reactivate,
    /// Property changes are injected into the live instance; only membership changes require
    /// reactivation.
    InPlace,
}

/// Identity of the capability required by a dependency.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Capability {
    name: String,
    service_type: Option<TypeId>,
}

impl Capability {
    /// A capability provided by services of type `S`, named after the type.
    pub fn of<S: Any + Send + Sync>() -> Self {
        Self {
            name: type_name::<S>().to_string(),
            service_type: Some(TypeId::of::<S>()),
        }
    }

    /// An untyped capability. Targets requesting the provider object are not type-checked.
    pub fn named<T: Into<String>>(name: T) -> Self {
        Self {
            name: name.into(),
            service_type: None,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn service_type(&self) -> Option<TypeId> {
        self.service_type
    }
}

/// Predicate narrowing which providers qualify for a dependency.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct TargetFilter {
    description: String,
    #[derivative(Debug = "ignore")]
    predicate: Arc<dyn Fn(&Properties) -> bool + Send + Sync>,
}

impl TargetFilter {
    pub fn new<D, F>(description: D, predicate: F) -> Self
    where
        D: Into<String>,
        F: Fn(&Properties) -> bool + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Matches providers publishing given property value.
    pub fn property_equals<K: Into<String>>(key: K, value: Value) -> Self {
        let key = key.into();
        Self::new(format!("({key}={value})"), move |properties| {
            properties.get(&key) == Some(&value)
        })
    }

    #[inline]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[inline]
    pub fn matches(&self, properties: &Properties) -> bool {
        (self.predicate)(properties)
    }
}

/// Names of the callback methods invoked for provider events.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct CallbackNames {
    pub bind: Option<String>,
    pub unbind: Option<String>,
    pub updated: Option<String>,
}

impl CallbackNames {
    /// All named methods, in bind/unbind/updated order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        [&self.bind, &self.unbind, &self.updated]
            .into_iter()
            .filter_map(|name| name.as_deref())
    }
}

/// Where a dependency's providers are injected.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum InjectionTarget {
    /// A field slot, by name, in the component type's field table.
    Field(String),
    /// A constructor parameter, by index.
    Parameter(usize),
    /// Methods from the component type's callback table.
    Callbacks(CallbackNames),
}

/// Description of a single declared dependency.
#[derive(Clone, Debug)]
pub struct DependencyDescriptor {
    name: String,
    capability: Capability,
    cardinality: Cardinality,
    policy: ReferencePolicy,
    policy_option: PolicyOption,
    field_update: FieldUpdate,
    static_update: Option<StaticUpdatePolicy>,
    target: Option<TargetFilter>,
    injection_targets: Vec<InjectionTarget>,
}

impl DependencyDescriptor {
    /// Starts describing a mandatory unary, static, sticky dependency with no targets.
    pub fn builder<T: Into<String>>(name: T, capability: Capability) -> DependencyDescriptorBuilder {
        DependencyDescriptorBuilder {
            descriptor: Self {
                name: name.into(),
                capability,
                cardinality: Cardinality::MandatoryUnary,
                policy: ReferencePolicy::Static,
                policy_option: PolicyOption::Sticky,
                field_update: FieldUpdate::Replace,
                static_update: None,
                target: None,
                injection_targets: vec![],
            },
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    #[inline]
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    #[inline]
    pub fn policy(&self) -> ReferencePolicy {
        self.policy
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.policy == ReferencePolicy::Static
    }

    #[inline]
    pub fn policy_option(&self) -> PolicyOption {
        self.policy_option
    }

    #[inline]
    pub fn field_update(&self) -> FieldUpdate {
        self.field_update
    }

    /// Explicit static update policy, if chosen for this dependency.
    #[inline]
    pub fn static_update(&self) -> Option<StaticUpdatePolicy> {
        self.static_update
    }

    #[inline]
    pub fn target(&self) -> Option<&TargetFilter> {
        self.target.as_ref()
    }

    #[inline]
    pub fn injection_targets(&self) -> &[InjectionTarget] {
        &self.injection_targets
    }

    /// Checks if given provider qualifies for this dependency.
    pub fn accepts(&self, handle: &ProviderHandle) -> bool {
        handle.interface() == self.capability.name()
            && self
                .target
                .as_ref()
                .map(|filter| filter.matches(handle.properties()))
                .unwrap_or(true)
    }
}

/// Builder for [DependencyDescriptor].
#[derive(Clone, Debug)]
pub struct DependencyDescriptorBuilder {
    descriptor: DependencyDescriptor,
}

impl DependencyDescriptorBuilder {
    pub fn cardinality(mut self, cardinality: Cardinality) -> Self {
        self.descriptor.cardinality = cardinality;
        self
    }

    pub fn policy(mut self, policy: ReferencePolicy) -> Self {
        self.descriptor.policy = policy;
        self
    }

    pub fn policy_option(mut self, policy_option: PolicyOption) -> Self {
        self.descriptor.policy_option = policy_option;
        self
    }

    pub fn field_update(mut self, field_update: FieldUpdate) -> Self {
        self.descriptor.field_update = field_update;
        self
    }

    pub fn static_update(mut self, static_update: StaticUpdatePolicy) -> Self {
        self.descriptor.static_update = Some(static_update);
        self
    }

    pub fn target(mut self, target: TargetFilter) -> Self {
        self.descriptor.target = Some(target);
        self
    }

    /// Injects into the named field slot.
    pub fn field<T: Into<String>>(mut self, name: T) -> Self {
        self.descriptor
            .injection_targets
            .push(InjectionTarget::Field(name.into()));
        self
    }

    /// Injects into the constructor parameter at given index.
    pub fn parameter(mut self, index: usize) -> Self {
        self.descriptor
            .injection_targets
            .push(InjectionTarget::Parameter(index));
        self
    }

    /// Invokes the named callbacks.
    pub fn callbacks(mut self, callbacks: CallbackNames) -> Self {
        self.descriptor
            .injection_targets
            .push(InjectionTarget::Callbacks(callbacks));
        self
    }

    pub fn build(self) -> DependencyDescriptor {
        self.descriptor
    }
}
