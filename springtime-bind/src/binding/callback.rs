use crate::binding::{BindOutcome, ResolveOnce, TargetState};
use crate::component_type::{CallbackError, CallbackMethod, ComponentType};
use crate::descriptor::{CallbackNames, DependencyDescriptor};
use crate::error::{BindingError, ResolutionError};
use crate::provider::ProviderHandle;
use std::sync::Arc;
use tracing::{debug, warn};

type Method<C> = ResolveOnce<Option<CallbackMethod<C>>>;

/// Invokes named component methods for provider events. Each method is looked up once and
/// receives the provider converted to the value type it was registered with.
pub(crate) struct CallbackHandler<C> {
    component_type: Arc<ComponentType<C>>,
    descriptor: Arc<DependencyDescriptor>,
    names: CallbackNames,
    bind: Method<C>,
    unbind: Method<C>,
    updated: Method<C>,
}

impl<C: Send + Sync + 'static> CallbackHandler<C> {
    pub(crate) fn new(
        component_type: Arc<ComponentType<C>>,
        descriptor: Arc<DependencyDescriptor>,
        names: CallbackNames,
    ) -> Self {
        Self {
            component_type,
            descriptor,
            names,
            bind: ResolveOnce::default(),
            unbind: ResolveOnce::default(),
            updated: ResolveOnce::default(),
        }
    }

    /// Resolves all named methods. Fails on the first one which cannot be found.
    pub(crate) fn init(&self) -> Result<(), ResolutionError> {
        self.method(&self.bind, &self.names.bind)
            .and_then(|_| self.method(&self.unbind, &self.names.unbind))
            .and_then(|_| self.method(&self.updated, &self.names.updated))
            .map(|_| ())
            .map_err(Clone::clone)
    }

    pub(crate) fn bind(
        &self,
        component: &C,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError> {
        self.invoke(&self.bind, &self.names.bind, component, handle)
    }

    pub(crate) fn unbind(
        &self,
        component: &C,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError> {
        self.invoke(&self.unbind, &self.names.unbind, component, handle)
    }

    pub(crate) fn updated(
        &self,
        component: &C,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError> {
        self.invoke(&self.updated, &self.names.updated, component, handle)
    }

    /// Checks if the bind or updated method receives values derived from provider properties.
    pub(crate) fn is_property_sensitive(&self) -> bool {
        [
            (&self.bind, &self.names.bind),
            (&self.updated, &self.names.updated),
        ]
        .into_iter()
        .any(|(method, name)| match self.method(method, name) {
            Ok(Some(callback)) => callback.shape().is_property_sensitive(),
            _ => false,
        })
    }

    pub(crate) fn state(&self) -> TargetState {
        self.bind
            .state()
            .combine(self.unbind.state())
            .combine(self.updated.state())
    }

    fn method<'a>(
        &'a self,
        method: &'a Method<C>,
        name: &Option<String>,
    ) -> Result<&'a Option<CallbackMethod<C>>, &'a ResolutionError> {
        method.get_or_resolve(|| {
            name.as_deref()
                .map(|name| {
                    self.component_type
                        .resolve_callback(&self.descriptor, name)
                })
                .transpose()
        })
    }

    fn invoke(
        &self,
        method: &Method<C>,
        name: &Option<String>,
        component: &C,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError> {
        let callback = match self.method(method, name) {
            Ok(Some(callback)) => callback,
            Ok(None) => return Ok(BindOutcome::Ignored),
            Err(_) => {
                debug!(dependency = self.descriptor.name(), provider = %handle.id(), "Ignoring event for unresolved callback.");
                return Ok(BindOutcome::Ignored);
            }
        };

        let method = name.as_deref().unwrap_or_default();
        match callback.invoke(component, handle) {
            Ok(()) => Ok(BindOutcome::Applied),
            Err(CallbackError::Conversion(error)) => {
                warn!(dependency = self.descriptor.name(), method, provider = %handle.id(), %error, "Cannot convert provider for callback; ignoring event.");

                Err(BindingError::ConversionFailed {
                    dependency: self.descriptor.name().to_string(),
                    error,
                })
            }
            Err(CallbackError::Failed(error)) => {
                warn!(dependency = self.descriptor.name(), method, provider = %handle.id(), %error, "Callback failed.");

                Err(BindingError::CallbackFailed {
                    dependency: self.descriptor.name().to_string(),
                    method: method.to_string(),
                    error,
                })
            }
        }
    }
}
