//! Conversion of provider handles into values of the shape requested by an injection target.
//!
//! The erased form is [convert], which produces a [ConvertedValue] for a [ValueShape]. Typed
//! targets use [InjectedValue], implemented for:
//!
//! * `Arc<S>` - the raw provider object as service `S`
//! * [PropertiesView] - a snapshot of the provider properties at conversion time
//! * [ProviderTuple] - both of the above as a single unit
//! * [ProviderHandle] - the handle itself
//!
//! Collections of any of these are composed by multiple-cardinality targets from repeated
//! single conversions.

use crate::error::ConversionError;
use crate::provider::{PropertiesView, ProviderHandle, ProviderObject};
use std::any::{type_name, Any, TypeId};
use std::sync::Arc;

/// The form in which a provider is presented to an injection target.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ValueShape {
    Provider,
    Properties,
    Tuple,
    Handle,
}

impl ValueShape {
    /// Checks if values of this shape change when provider properties change.
    #[inline]
    pub fn is_property_sensitive(self) -> bool {
        matches!(self, Self::Properties | Self::Tuple)
    }

    /// Checks if values of this shape contain the provider object.
    #[inline]
    pub fn requires_service(self) -> bool {
        matches!(self, Self::Provider | Self::Tuple)
    }
}

/// Shape-specific, type-erased value produced from a provider.
#[derive(Clone, Debug)]
pub enum ConvertedValue {
    Provider(ProviderObject),
    Properties(PropertiesView),
    Tuple(ProviderObject, PropertiesView),
    Handle(ProviderHandle),
}

/// Converts a provider handle into the given shape.
pub fn convert(shape: ValueShape, handle: &ProviderHandle) -> ConvertedValue {
    match shape {
        ValueShape::Provider => ConvertedValue::Provider(handle.object().clone()),
        ValueShape::Properties => ConvertedValue::Properties(handle.properties().clone()),
        ValueShape::Tuple => {
            ConvertedValue::Tuple(handle.object().clone(), handle.properties().clone())
        }
        ValueShape::Handle => ConvertedValue::Handle(handle.clone()),
    }
}

/// A value which can be injected for a single provider.
pub trait InjectedValue: Clone + Send + Sync + 'static {
    /// Shape used to convert providers into this value.
    fn shape() -> ValueShape;

    /// Type of the service contained in values of this type, if any.
    fn service_type() -> Option<TypeId>;

    /// Creates a typed value from an erased one, converted for [InjectedValue::shape].
    fn from_converted(
        value: ConvertedValue,
        handle: &ProviderHandle,
    ) -> Result<Self, ConversionError>;

    /// Checks value identity, used to remove exactly the value which was injected.
    fn is_same(&self, other: &Self) -> bool;

    fn convert(handle: &ProviderHandle) -> Result<Self, ConversionError> {
        Self::from_converted(convert(Self::shape(), handle), handle)
    }
}

fn downcast_service<S: Any + Send + Sync>(
    object: ProviderObject,
    handle: &ProviderHandle,
) -> Result<Arc<S>, ConversionError> {
    object
        .downcast::<S>()
        .map_err(|_| ConversionError::IncompatibleService {
            provider: handle.id(),
            expected: type_name::<S>(),
        })
}

impl<S: Any + Send + Sync> InjectedValue for Arc<S> {
    #[inline]
    fn shape() -> ValueShape {
        ValueShape::Provider
    }

    #[inline]
    fn service_type() -> Option<TypeId> {
        Some(TypeId::of::<S>())
    }

    fn from_converted(
        value: ConvertedValue,
        handle: &ProviderHandle,
    ) -> Result<Self, ConversionError> {
        match value {
            ConvertedValue::Provider(object) | ConvertedValue::Tuple(object, _) => {
                downcast_service(object, handle)
            }
            _ => downcast_service(handle.object().clone(), handle),
        }
    }

    #[inline]
    fn is_same(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl InjectedValue for PropertiesView {
    #[inline]
    fn shape() -> ValueShape {
        ValueShape::Properties
    }

    #[inline]
    fn service_type() -> Option<TypeId> {
        None
    }

    fn from_converted(
        value: ConvertedValue,
        handle: &ProviderHandle,
    ) -> Result<Self, ConversionError> {
        Ok(match value {
            ConvertedValue::Properties(properties) | ConvertedValue::Tuple(_, properties) => {
                properties
            }
            _ => handle.properties().clone(),
        })
    }

    #[inline]
    fn is_same(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl InjectedValue for ProviderHandle {
    #[inline]
    fn shape() -> ValueShape {
        ValueShape::Handle
    }

    #[inline]
    fn service_type() -> Option<TypeId> {
        None
    }

    fn from_converted(
        value: ConvertedValue,
        handle: &ProviderHandle,
    ) -> Result<Self, ConversionError> {
        Ok(match value {
            ConvertedValue::Handle(handle) => handle,
            _ => handle.clone(),
        })
    }

    #[inline]
    fn is_same(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

/// A provider service together with the properties it was published with.
#[derive(Debug)]
pub struct ProviderTuple<S: ?Sized> {
    service: Arc<S>,
    properties: PropertiesView,
}

impl<S: ?Sized> ProviderTuple<S> {
    pub fn new(service: Arc<S>, properties: PropertiesView) -> Self {
        Self {
            service,
            properties,
        }
    }

    #[inline]
    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    #[inline]
    pub fn properties(&self) -> &PropertiesView {
        &self.properties
    }
}

impl<S: ?Sized> Clone for ProviderTuple<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            properties: self.properties.clone(),
        }
    }
}

impl<S: Any + Send + Sync> InjectedValue for ProviderTuple<S> {
    #[inline]
    fn shape() -> ValueShape {
        ValueShape::Tuple
    }

    #[inline]
    fn service_type() -> Option<TypeId> {
        Some(TypeId::of::<S>())
    }

    fn from_converted(
        value: ConvertedValue,
        handle: &ProviderHandle,
    ) -> Result<Self, ConversionError> {
        let (object, properties) = match value {
            ConvertedValue::Tuple(object, properties) => (object, properties),
            _ => (handle.object().clone(), handle.properties().clone()),
        };

        downcast_service(object, handle).map(|service| Self::new(service, properties))
    }

    #[inline]
    fn is_same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.service, &other.service) && self.properties.ptr_eq(&other.properties)
    }
}
