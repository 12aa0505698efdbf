use crate::binding::callback::CallbackHandler;
use crate::binding::field::FieldHandler;
use crate::binding::{BindOutcome, TargetState};
use crate::component_type::ComponentType;
use crate::descriptor::{DependencyDescriptor, InjectionTarget};
use crate::error::{BindingError, ResolutionError};
use crate::provider::ProviderHandle;
use std::sync::Arc;

/// The way providers of a dependency reach the component. Several mechanisms configured for
/// the same dependency form a composite, invoked in declaration order as a single unit.
pub(crate) enum InjectionMechanism<C> {
    Field(FieldHandler<C>),
    Callback(CallbackHandler<C>),
    Composite(Vec<InjectionMechanism<C>>),
}

impl<C: Send + Sync + 'static> InjectionMechanism<C> {
    /// Creates mechanisms for field and callback targets. Constructor parameters are injected
    /// only at construction and have no mechanism.
    pub(crate) fn for_dependency(
        component_type: &Arc<ComponentType<C>>,
        descriptor: &Arc<DependencyDescriptor>,
    ) -> Option<Self> {
        let mut mechanisms: Vec<_> = descriptor
            .injection_targets()
            .iter()
            .filter_map(|target| match target {
                InjectionTarget::Field(field) => Some(Self::Field(FieldHandler::new(
                    component_type.clone(),
                    descriptor.clone(),
                    field.clone(),
                ))),
                InjectionTarget::Callbacks(names) => Some(Self::Callback(CallbackHandler::new(
                    component_type.clone(),
                    descriptor.clone(),
                    names.clone(),
                ))),
                InjectionTarget::Parameter(_) => None,
            })
            .collect();

        match mechanisms.len() {
            0 => None,
            1 => mechanisms.pop(),
            _ => Some(Self::Composite(mechanisms)),
        }
    }

    /// Prepares the instance. A composite succeeds only if every mechanism does.
    pub(crate) fn init(&self, component: &C) -> Result<(), ResolutionError> {
        match self {
            Self::Field(handler) => handler.init(component),
            Self::Callback(handler) => handler.init(),
            Self::Composite(mechanisms) => mechanisms
                .iter()
                .try_for_each(|mechanism| mechanism.init(component)),
        }
    }

    pub(crate) fn bind(
        &self,
        component: &C,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError> {
        match self {
            Self::Field(handler) => handler.bind(component, handle),
            Self::Callback(handler) => handler.bind(component, handle),
            Self::Composite(mechanisms) => {
                Self::invoke_all(mechanisms, |mechanism| mechanism.bind(component, handle))
            }
        }
    }

    pub(crate) fn unbind(
        &self,
        component: &C,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError> {
        match self {
            Self::Field(handler) => Ok(handler.unbind(component, handle)),
            Self::Callback(handler) => handler.unbind(component, handle),
            Self::Composite(mechanisms) => {
                Self::invoke_all(mechanisms, |mechanism| mechanism.unbind(component, handle))
            }
        }
    }

    pub(crate) fn updated(
        &self,
        component: &C,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError> {
        match self {
            Self::Field(handler) => handler.updated(component, handle),
            Self::Callback(handler) => handler.updated(component, handle),
            Self::Composite(mechanisms) => {
                Self::invoke_all(mechanisms, |mechanism| mechanism.updated(component, handle))
            }
        }
    }

    pub(crate) fn is_property_sensitive(&self) -> bool {
        match self {
            Self::Field(handler) => handler.is_property_sensitive(),
            Self::Callback(handler) => handler.is_property_sensitive(),
            Self::Composite(mechanisms) => mechanisms
                .iter()
                .any(InjectionMechanism::is_property_sensitive),
        }
    }

    pub(crate) fn state(&self) -> TargetState {
        match self {
            Self::Field(handler) => handler.state(),
            Self::Callback(handler) => handler.state(),
            Self::Composite(mechanisms) => mechanisms
                .iter()
                .map(InjectionMechanism::state)
                .fold(TargetState::Resolved, TargetState::combine),
        }
    }

    pub(crate) fn release(&self, component: &C) {
        match self {
            Self::Field(handler) => handler.release(component),
            Self::Callback(_) => {}
            Self::Composite(mechanisms) => {
                for mechanism in mechanisms {
                    mechanism.release(component);
                }
            }
        }
    }

    /// Runs the operation for each mechanism in order, stopping at the first failure. Mechanisms
    /// which already ran are not rolled back.
    fn invoke_all<F>(mechanisms: &[Self], mut operation: F) -> Result<BindOutcome, BindingError>
    where
        F: FnMut(&Self) -> Result<BindOutcome, BindingError>,
    {
        mechanisms
            .iter()
            .try_fold(BindOutcome::Ignored, |outcome, mechanism| {
                operation(mechanism).map(|next| outcome.merge(next))
            })
    }
}
