//! Activation values - non-dependency values injected into constructor parameters and activation
//! fields when an instance is created.

use crate::error::ErrorPtr;
use crate::provider::{Properties, PropertiesView, ProviderObject};
use derivative::Derivative;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Context of a single component instance, supplied by the container at construction.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct ComponentContext {
    component_name: String,
    properties: PropertiesView,
    #[derivative(Debug = "ignore")]
    system_handle: Option<ProviderObject>,
}

impl ComponentContext {
    pub fn new<T: Into<String>>(component_name: T, properties: Properties) -> Self {
        Self {
            component_name: component_name.into(),
            properties: PropertiesView::new(properties),
            system_handle: None,
        }
    }

    /// Attaches a raw handle to the hosting system, opaque to this crate.
    pub fn with_system_handle(mut self, system_handle: ProviderObject) -> Self {
        self.system_handle = Some(system_handle);
        self
    }

    #[inline]
    pub fn component_name(&self) -> &str {
        &self.component_name
    }

    /// Configuration properties of the instance.
    #[inline]
    pub fn properties(&self) -> &PropertiesView {
        &self.properties
    }

    #[inline]
    pub fn system_handle(&self) -> Option<&ProviderObject> {
        self.system_handle.as_ref()
    }
}

/// A value derived from the [ComponentContext] at activation.
pub trait ActivationValue: Send + Sync + Sized + 'static {
    fn from_context(context: &ComponentContext) -> Result<Self, ErrorPtr>;
}

impl ActivationValue for ComponentContext {
    fn from_context(context: &ComponentContext) -> Result<Self, ErrorPtr> {
        Ok(context.clone())
    }
}

impl ActivationValue for PropertiesView {
    fn from_context(context: &ComponentContext) -> Result<Self, ErrorPtr> {
        Ok(context.properties.clone())
    }
}

/// Typed configuration deserialized from instance configuration properties.
#[derive(Clone, Debug)]
pub struct Configuration<T>(Arc<T>);

impl<T> Configuration<T> {
    #[inline]
    pub fn get(&self) -> &T {
        &self.0
    }
}

impl<T> std::ops::Deref for Configuration<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: DeserializeOwned + Send + Sync + 'static> ActivationValue for Configuration<T> {
    fn from_context(context: &ComponentContext) -> Result<Self, ErrorPtr> {
        serde_json::from_value(Value::Object(Properties::clone(&context.properties)))
            .map(|config| Self(Arc::new(config)))
            .map_err(|error| Arc::new(error) as ErrorPtr)
    }
}
