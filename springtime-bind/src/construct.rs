//! Creating component instances and delivering provider events to them.
//!
//! [ComponentType::construct] resolves all constructor parameters from the providers handed in
//! by the container, calls the constructor, assigns activation fields and binds the initial
//! providers into field and callback targets. Only then the resulting [ComponentInstance] becomes
//! visible to the caller, which forwards subsequent provider events to it.

use crate::binding::{BindOutcome, DependencyBinding, TargetState};
use crate::component_type::{ComponentType, ConstructorArguments, ConstructorParameter};
use crate::context::ComponentContext;
use crate::error::{BindingError, ConstructionError};
use crate::provider::{ProviderHandle, ProviderSnapshot, ProviderTracker};
use fxhash::FxHashMap;
use itertools::Itertools;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use tracing::debug;

/// Receiver of provider events for the dependencies of a component instance.
pub trait DependencyEvents {
    fn provider_bound(
        &self,
        dependency: &str,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError>;

    fn provider_unbound(
        &self,
        dependency: &str,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError>;

    fn provider_updated(
        &self,
        dependency: &str,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError>;
}

impl<C: Send + Sync + 'static> ComponentType<C> {
    /// Creates a new instance using given providers. No instance is returned on failure.
    pub fn construct(
        self: &Arc<Self>,
        providers: &ProviderSnapshot,
        context: ComponentContext,
    ) -> Result<ComponentInstance<C>, ConstructionError> {
        debug!(component = self.name(), "Constructing component instance.");

        for descriptor in self.dependencies() {
            if !descriptor.cardinality().is_optional()
                && !providers
                    .providers(descriptor.name())
                    .iter()
                    .any(|handle| descriptor.accepts(handle))
            {
                return Err(ConstructionError::UnsatisfiedDependency {
                    component: self.name().to_string(),
                    dependency: descriptor.name().to_string(),
                });
            }
        }

        let mut arguments = self.prepare_arguments(providers, &context)?;
        let instance = self
            .constructor()
            .call(&mut arguments)
            .map(Arc::new)
            .map_err(|error| ConstructionError::ConstructorFailed {
                component: self.name().to_string(),
                error,
            })?;

        for (field, activation_field) in self.activation_fields() {
            let activation_field =
                activation_field.ok_or_else(|| ConstructionError::ActivationTargetNotFound {
                    component: self.name().to_string(),
                    field: field.to_string(),
                })?;

            let assigned = activation_field
                .assign(&instance, &context)
                .map_err(|error| ConstructionError::ActivationValue {
                    component: self.name().to_string(),
                    target: field.to_string(),
                    error,
                })?;

            if !assigned {
                debug!(component = self.name(), field, "Activation field was already assigned.");
            }
        }

        let bindings = self
            .dependencies()
            .iter()
            .map(|descriptor| {
                let binding = DependencyBinding::new(self, descriptor);
                binding
                    .initialize(&instance, providers.providers(descriptor.name()))
                    .map(|_| (descriptor.name().to_string(), binding))
            })
            .collect::<Result<FxHashMap<_, _>, _>>()?;

        Ok(ComponentInstance {
            component_type: self.clone(),
            instance,
            bindings,
        })
    }

    /// Collects current providers through the tracker and constructs a new instance.
    pub fn construct_with_tracker(
        self: &Arc<Self>,
        tracker: &dyn ProviderTracker,
        context: ComponentContext,
    ) -> Result<ComponentInstance<C>, ConstructionError> {
        let providers =
            ProviderSnapshot::collect(tracker, self.dependencies().iter().map(Arc::as_ref));
        self.construct(&providers, context)
    }

    fn prepare_arguments(
        &self,
        providers: &ProviderSnapshot,
        context: &ComponentContext,
    ) -> Result<ConstructorArguments, ConstructionError> {
        let plan = self.parameter_plan()?;

        self.constructor()
            .parameters()
            .iter()
            .zip(plan)
            .enumerate()
            .map(|(index, (parameter, dependency))| match (parameter, dependency) {
                (ConstructorParameter::Reference(parameter), Some(dependency)) => {
                    let descriptor = &self.dependencies()[*dependency];
                    let candidates = providers
                        .providers(descriptor.name())
                        .iter()
                        .filter(|handle| descriptor.accepts(handle))
                        .sorted_by(|first, second| second.precedence(first))
                        .cloned()
                        .collect_vec();

                    parameter.produce(self.name(), descriptor, &candidates)
                }
                (ConstructorParameter::Activation(produce), _) => {
                    produce(context).map_err(|error| ConstructionError::ActivationValue {
                        component: self.name().to_string(),
                        target: format!("parameter {index}"),
                        error,
                    })
                }
                (ConstructorParameter::Reference(_), None) => {
                    Err(ConstructionError::UnboundParameter {
                        component: self.name().to_string(),
                        index,
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()
            .map(ConstructorArguments::new)
    }
}

/// A constructed component together with the binding state of its dependencies.
pub struct ComponentInstance<C> {
    component_type: Arc<ComponentType<C>>,
    instance: Arc<C>,
    bindings: FxHashMap<String, DependencyBinding<C>>,
}

impl<C: Send + Sync + 'static> ComponentInstance<C> {
    #[inline]
    pub fn instance(&self) -> &Arc<C> {
        &self.instance
    }

    #[inline]
    pub fn component_type(&self) -> &Arc<ComponentType<C>> {
        &self.component_type
    }

    /// Delivers a provider which started qualifying for given dependency.
    pub fn on_bind(
        &self,
        dependency: &str,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError> {
        self.binding(dependency)?.on_bind(&self.instance, handle)
    }

    /// Delivers a provider which no longer qualifies for given dependency.
    pub fn on_unbind(
        &self,
        dependency: &str,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError> {
        self.binding(dependency)?.on_unbind(&self.instance, handle)
    }

    /// Delivers a provider which changed its properties.
    pub fn on_updated(
        &self,
        dependency: &str,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError> {
        self.binding(dependency)?.on_updated(&self.instance, handle)
    }

    /// Checks if every mandatory dependency currently has a bound provider.
    pub fn is_satisfied(&self) -> bool {
        self.bindings.values().all(DependencyBinding::is_satisfied)
    }

    /// Returns providers currently bound to given dependency, best first.
    pub fn bound_providers(&self, dependency: &str) -> Option<Vec<ProviderHandle>> {
        self.bindings
            .get(dependency)
            .map(DependencyBinding::bound_providers)
    }

    /// Returns the resolution state of field and callback targets of given dependency. Returns
    /// [None] for unknown dependencies and for dependencies without such targets.
    pub fn target_state(&self, dependency: &str) -> Option<TargetState> {
        self.bindings
            .get(dependency)
            .and_then(DependencyBinding::target_state)
    }

    /// Releases all binding state and clears injected field values.
    pub fn dispose(self) {
        for binding in self.bindings.values() {
            binding.dispose(&self.instance);
        }

        debug!(
            component = self.component_type.name(),
            "Disposed component instance."
        );
    }

    fn binding(&self, dependency: &str) -> Result<&DependencyBinding<C>, BindingError> {
        self.bindings
            .get(dependency)
            .ok_or_else(|| BindingError::UnknownDependency {
                component: self.component_type.name().to_string(),
                dependency: dependency.to_string(),
            })
    }
}

impl<C: Send + Sync + 'static> DependencyEvents for ComponentInstance<C> {
    fn provider_bound(
        &self,
        dependency: &str,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError> {
        self.on_bind(dependency, handle)
    }

    fn provider_unbound(
        &self,
        dependency: &str,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError> {
        self.on_unbind(dependency, handle)
    }

    fn provider_updated(
        &self,
        dependency: &str,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError> {
        self.on_updated(dependency, handle)
    }
}

impl<C> Debug for ComponentInstance<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("component", &self.component_type.name())
            .field(
                "dependencies",
                &self.bindings.keys().sorted().collect_vec(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::binding::BindOutcome;
    use crate::component_type::{ComponentType, Constructor, FieldTarget};
    use crate::construct::DependencyEvents;
    use crate::context::ComponentContext;
    use crate::descriptor::{Capability, Cardinality, DependencyDescriptor, ReferencePolicy};
    use crate::error::{BindingError, ConstructionError};
    use crate::provider::{MockProviderTracker, Properties, ProviderHandle, ProviderSnapshot};
    use crate::slot::{Reference, ReferenceList};
    use std::sync::Arc;

    struct Cache(u64);

    struct Index {
        primary: Arc<Cache>,
        caches: ReferenceList<Arc<Cache>>,
        fallback: Reference<Arc<Cache>>,
    }

    fn cache(id: u64) -> ProviderHandle {
        ProviderHandle::for_service(id, Arc::new(Cache(id)), Properties::new())
    }

    fn create_type() -> Arc<ComponentType<Index>> {
        let constructor = Constructor::new(|arguments| {
            Ok(Index {
                primary: arguments.take::<Arc<Cache>>(0)?,
                caches: ReferenceList::new(),
                fallback: Reference::new(),
            })
        })
        .reference::<Arc<Cache>>();

        ComponentType::builder("index", constructor)
            .with_field(FieldTarget::list("caches", |index: &Index| &index.caches))
            .with_field(FieldTarget::unary("fallback", |index: &Index| {
                &index.fallback
            }))
            .with_dependency(
                DependencyDescriptor::builder("primary", Capability::of::<Cache>())
                    .parameter(0)
                    .build(),
            )
            .with_dependency(
                DependencyDescriptor::builder("caches", Capability::of::<Cache>())
                    .cardinality(Cardinality::OptionalMultiple)
                    .policy(ReferencePolicy::Dynamic)
                    .field("caches")
                    .build(),
            )
            .with_dependency(
                DependencyDescriptor::builder("fallback", Capability::of::<Cache>())
                    .cardinality(Cardinality::OptionalUnary)
                    .policy(ReferencePolicy::Dynamic)
                    .field("fallback")
                    .build(),
            )
            .build()
            .unwrap()
    }

    fn context() -> ComponentContext {
        ComponentContext::new("index", Properties::new())
    }

    #[test]
    fn should_construct_with_initial_providers() {
        let providers = ProviderSnapshot::new()
            .with_provider("primary", cache(1))
            .with_provider("caches", cache(2))
            .with_provider("caches", cache(3));

        let instance = create_type().construct(&providers, context()).unwrap();

        assert_eq!(instance.instance().primary.0, 1);
        assert_eq!(instance.instance().caches.len(), 2);
        assert!(instance.instance().fallback.get().is_none());
        assert!(instance.is_satisfied());
    }

    #[test]
    fn should_fail_without_mandatory_provider() {
        let result = create_type().construct(&ProviderSnapshot::new(), context());

        assert!(matches!(
            result,
            Err(ConstructionError::UnsatisfiedDependency { dependency, .. }) if dependency == "primary"
        ));
    }

    #[test]
    fn should_reject_unknown_dependency() {
        let providers = ProviderSnapshot::new().with_provider("primary", cache(1));
        let instance = create_type().construct(&providers, context()).unwrap();

        assert!(matches!(
            instance.on_bind("missing", &cache(2)),
            Err(BindingError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn should_construct_with_tracker() {
        let mut tracker = MockProviderTracker::new();
        tracker
            .expect_candidates()
            .returning(|descriptor| match descriptor.name() {
                "primary" => vec![cache(1)],
                "fallback" => vec![cache(4)],
                _ => vec![],
            });

        let instance = create_type()
            .construct_with_tracker(&tracker, context())
            .unwrap();

        assert_eq!(instance.instance().fallback.get().unwrap().0, 4);
        assert!(instance.instance().caches.is_empty());
    }

    #[test]
    fn should_clear_fields_on_dispose() {
        let providers = ProviderSnapshot::new()
            .with_provider("primary", cache(1))
            .with_provider("fallback", cache(2));

        let instance = create_type().construct(&providers, context()).unwrap();
        let component = instance.instance().clone();
        assert!(component.fallback.is_set());

        instance.dispose();
        assert!(!component.fallback.is_set());
    }

    #[test]
    fn should_deliver_events_through_trait() {
        let providers = ProviderSnapshot::new().with_provider("primary", cache(1));
        let instance = create_type().construct(&providers, context()).unwrap();
        let events: &dyn DependencyEvents = &instance;

        assert_eq!(
            events.provider_bound("caches", &cache(5)).unwrap(),
            BindOutcome::Applied
        );
        assert_eq!(instance.instance().caches.len(), 1);
        assert_eq!(
            events.provider_unbound("caches", &cache(5)).unwrap(),
            BindOutcome::Applied
        );
        assert!(instance.instance().caches.is_empty());
    }

    #[test]
    fn should_query_tracker_once_per_dependency_and_filter_candidates() {
        let mut tracker = MockProviderTracker::new();
        tracker
            .expect_candidates()
            .times(3)
            .returning(|descriptor| match descriptor.name() {
                "primary" => vec![cache(1)],
                "fallback" => vec![ProviderHandle::for_service(
                    9,
                    Arc::new(9u8),
                    Properties::new(),
                )],
                _ => vec![],
            });

        let instance = create_type()
            .construct_with_tracker(&tracker, context())
            .unwrap();

        assert!(instance.instance().fallback.get().is_none());
        assert!(instance.bound_providers("fallback").unwrap().is_empty());
        assert_eq!(instance.bound_providers("primary").unwrap().len(), 1);
    }
}
