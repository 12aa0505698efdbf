//! Field injection. A [FieldHandler] locates its slot lazily, on first use, and then delegates to
//! a strategy matching the slot kind:
//!
//! * [UnaryFieldStrategy] - holds the value of a single bound provider
//! * [MultipleFieldStrategy] - keeps a collection of values, either replaced with a fresh
//!   snapshot on every change, or updated in place

use crate::binding::{BindOutcome, ResolveOnce, TargetState};
use crate::component_type::ComponentType;
use crate::descriptor::{DependencyDescriptor, FieldUpdate};
use crate::error::{BindingError, ConversionError, ResolutionError};
use crate::provider::{ProviderHandle, ProviderId};
use crate::slot::{Reference, ReferenceList};
use crate::value::InjectedValue;
use fxhash::FxHashMap;
use itertools::Itertools;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Update algorithm for a resolved field slot.
pub(crate) trait FieldStrategy<C>: Send + Sync {
    /// Prepares the slot of a new instance. An error describes why the slot is unusable.
    fn init(&self, component: &C) -> Result<(), String>;

    /// Injects the provider. A provider which cannot be converted leaves the slot untouched.
    fn bind(
        &self,
        component: &C,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, ConversionError>;

    fn unbind(&self, component: &C, handle: &ProviderHandle) -> BindOutcome;

    fn updated(
        &self,
        component: &C,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, ConversionError>;

    fn is_property_sensitive(&self) -> bool;

    /// Removes everything this strategy injected.
    fn release(&self, component: &C);
}

fn convert<T: InjectedValue>(
    descriptor: &DependencyDescriptor,
    handle: &ProviderHandle,
) -> Result<T, ConversionError> {
    T::convert(handle).map_err(|error| {
        warn!(dependency = descriptor.name(), provider = %handle.id(), %error, "Cannot convert provider for injection; ignoring event.");
        error
    })
}

pub(crate) struct FieldHandler<C> {
    component_type: Arc<ComponentType<C>>,
    descriptor: Arc<DependencyDescriptor>,
    field: String,
    strategy: ResolveOnce<Box<dyn FieldStrategy<C>>>,
}

impl<C: Send + Sync + 'static> FieldHandler<C> {
    pub(crate) fn new(
        component_type: Arc<ComponentType<C>>,
        descriptor: Arc<DependencyDescriptor>,
        field: String,
    ) -> Self {
        Self {
            component_type,
            descriptor,
            field,
            strategy: ResolveOnce::default(),
        }
    }

    pub(crate) fn init(&self, component: &C) -> Result<(), ResolutionError> {
        let mut initialized = false;
        let strategy = self
            .strategy
            .get_or_resolve(|| {
                let strategy = self.resolve()?;
                strategy
                    .init(component)
                    .map_err(|reason| self.unusable(reason))?;

                initialized = true;
                Ok(strategy)
            })
            .map_err(Clone::clone)?;

        if initialized {
            return Ok(());
        }

        strategy.init(component).map_err(|reason| {
            let error = self.unusable(reason);
            error!(%error, "Cannot initialize injection target.");
            error
        })
    }

    pub(crate) fn bind(
        &self,
        component: &C,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError> {
        self.with_strategy(handle, |strategy| {
            strategy
                .bind(component, handle)
                .map_err(|error| self.conversion_failed(error))
        })
    }

    pub(crate) fn unbind(&self, component: &C, handle: &ProviderHandle) -> BindOutcome {
        self.with_strategy(handle, |strategy| Ok(strategy.unbind(component, handle)))
            .unwrap_or(BindOutcome::Ignored)
    }

    pub(crate) fn updated(
        &self,
        component: &C,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError> {
        self.with_strategy(handle, |strategy| {
            strategy
                .updated(component, handle)
                .map_err(|error| self.conversion_failed(error))
        })
    }

    pub(crate) fn is_property_sensitive(&self) -> bool {
        self.strategy
            .get_or_resolve(|| self.resolve())
            .map(|strategy| strategy.is_property_sensitive())
            .unwrap_or(false)
    }

    pub(crate) fn release(&self, component: &C) {
        if let Some(strategy) = self.strategy.get() {
            strategy.release(component);
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> TargetState {
        self.strategy.state()
    }

    fn with_strategy<F>(
        &self,
        handle: &ProviderHandle,
        operation: F,
    ) -> Result<BindOutcome, BindingError>
    where
        F: FnOnce(&dyn FieldStrategy<C>) -> Result<BindOutcome, BindingError>,
    {
        match self.strategy.get_or_resolve(|| self.resolve()) {
            Ok(strategy) => operation(strategy.as_ref()),
            Err(_) => {
                debug!(dependency = self.descriptor.name(), field = %self.field, provider = %handle.id(), "Ignoring event for unresolved field.");
                Ok(BindOutcome::Ignored)
            }
        }
    }

    fn conversion_failed(&self, error: ConversionError) -> BindingError {
        BindingError::ConversionFailed {
            dependency: self.descriptor.name().to_string(),
            error,
        }
    }

    fn resolve(&self) -> Result<Box<dyn FieldStrategy<C>>, ResolutionError> {
        self.component_type
            .resolve_field(&self.descriptor, &self.field)
            .map(|target| target.strategy(&self.descriptor))
    }

    fn unusable(&self, reason: String) -> ResolutionError {
        ResolutionError::TargetUnusable {
            component: self.component_type.name().to_string(),
            dependency: self.descriptor.name().to_string(),
            target: self.field.clone(),
            reason,
        }
    }
}

pub(crate) struct UnaryFieldStrategy<C, T> {
    accessor: fn(&C) -> &Reference<T>,
    descriptor: Arc<DependencyDescriptor>,
    bound: Mutex<Option<(ProviderId, T)>>,
}

impl<C, T: InjectedValue> UnaryFieldStrategy<C, T> {
    pub(crate) fn new(
        accessor: fn(&C) -> &Reference<T>,
        descriptor: Arc<DependencyDescriptor>,
    ) -> Self {
        Self {
            accessor,
            descriptor,
            bound: Mutex::new(None),
        }
    }

    fn is_recorded(bound: &Option<(ProviderId, T)>, handle: &ProviderHandle) -> bool {
        matches!(bound, Some((id, _)) if *id == handle.id())
    }
}

impl<C: Send + Sync, T: InjectedValue> FieldStrategy<C> for UnaryFieldStrategy<C, T> {
    fn init(&self, component: &C) -> Result<(), String> {
        if self.descriptor.cardinality().is_optional() {
            (self.accessor)(component).clear();
        }

        Ok(())
    }

    fn bind(
        &self,
        component: &C,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, ConversionError> {
        let value = convert::<T>(&self.descriptor, handle)?;

        let mut bound = self.bound.lock();
        (self.accessor)(component).set(value.clone());
        *bound = Some((handle.id(), value));

        Ok(BindOutcome::Applied)
    }

    fn unbind(&self, component: &C, handle: &ProviderHandle) -> BindOutcome {
        let mut bound = self.bound.lock();
        if !Self::is_recorded(&bound, handle) {
            return BindOutcome::Ignored;
        }

        *bound = None;

        // mandatory targets keep the last value until a replacement arrives
        if self.descriptor.cardinality().is_optional() {
            (self.accessor)(component).clear();
            BindOutcome::Applied
        } else {
            BindOutcome::Ignored
        }
    }

    fn updated(
        &self,
        component: &C,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, ConversionError> {
        if !self.is_property_sensitive() {
            return Ok(BindOutcome::Ignored);
        }

        let mut bound = self.bound.lock();
        if !Self::is_recorded(&bound, handle) {
            return Ok(BindOutcome::Ignored);
        }

        let value = convert::<T>(&self.descriptor, handle)?;
        (self.accessor)(component).set(value.clone());
        *bound = Some((handle.id(), value));

        Ok(BindOutcome::Applied)
    }

    #[inline]
    fn is_property_sensitive(&self) -> bool {
        T::shape().is_property_sensitive()
    }

    fn release(&self, component: &C) {
        let mut bound = self.bound.lock();
        (self.accessor)(component).clear();
        *bound = None;
    }
}

pub(crate) struct MultipleFieldStrategy<C, T> {
    accessor: fn(&C) -> &ReferenceList<T>,
    descriptor: Arc<DependencyDescriptor>,
    bound: Mutex<FxHashMap<ProviderId, (ProviderHandle, T)>>,
}

impl<C, T: InjectedValue> MultipleFieldStrategy<C, T> {
    pub(crate) fn new(
        accessor: fn(&C) -> &ReferenceList<T>,
        descriptor: Arc<DependencyDescriptor>,
    ) -> Self {
        Self {
            accessor,
            descriptor,
            bound: Mutex::new(FxHashMap::default()),
        }
    }

    #[inline]
    fn in_place(&self) -> bool {
        self.descriptor.field_update() == FieldUpdate::UpdateInPlace
    }

    /// Installs a snapshot derived from all bound values, best provider first.
    fn rebuild(list: &ReferenceList<T>, bound: &FxHashMap<ProviderId, (ProviderHandle, T)>) {
        list.install(
            bound
                .values()
                .sorted_by(|(first, _), (second, _)| second.precedence(first))
                .map(|(_, value)| value.clone())
                .collect(),
        );
    }
}

impl<C: Send + Sync, T: InjectedValue> FieldStrategy<C> for MultipleFieldStrategy<C, T> {
    fn init(&self, component: &C) -> Result<(), String> {
        let list = (self.accessor)(component);
        if !self.in_place() {
            Self::rebuild(list, &self.bound.lock());
            return Ok(());
        }

        if list.ensure_modifiable() {
            Ok(())
        } else {
            Err("field holds an unmodifiable collection".to_string())
        }
    }

    fn bind(
        &self,
        component: &C,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, ConversionError> {
        let value = convert::<T>(&self.descriptor, handle)?;

        let mut bound = self.bound.lock();
        bound.insert(handle.id(), (handle.clone(), value.clone()));

        let list = (self.accessor)(component);
        if self.in_place() {
            list.push(value);
        } else {
            Self::rebuild(list, &bound);
        }

        Ok(BindOutcome::Applied)
    }

    fn unbind(&self, component: &C, handle: &ProviderHandle) -> BindOutcome {
        let mut bound = self.bound.lock();
        let Some((_, value)) = bound.remove(&handle.id()) else {
            return BindOutcome::Ignored;
        };

        let list = (self.accessor)(component);
        if self.in_place() {
            list.remove_same(&value);
        } else {
            Self::rebuild(list, &bound);
        }

        BindOutcome::Applied
    }

    fn updated(
        &self,
        component: &C,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, ConversionError> {
        let mut bound = self.bound.lock();
        if !bound.contains_key(&handle.id()) {
            return Ok(BindOutcome::Ignored);
        }

        let list = (self.accessor)(component);
        if self.is_property_sensitive() {
            let value = convert::<T>(&self.descriptor, handle)?;
            let previous = bound.insert(handle.id(), (handle.clone(), value.clone()));
            if !self.in_place() {
                Self::rebuild(list, &bound);
            } else if let Some((_, previous)) = previous {
                list.replace_same(&previous, value);
            }

            return Ok(BindOutcome::Applied);
        }

        if let Some(entry) = bound.get_mut(&handle.id()) {
            entry.0 = handle.clone();
        }

        // ranking changes reorder snapshots
        if self.in_place() {
            Ok(BindOutcome::Ignored)
        } else {
            Self::rebuild(list, &bound);
            Ok(BindOutcome::Applied)
        }
    }

    #[inline]
    fn is_property_sensitive(&self) -> bool {
        T::shape().is_property_sensitive()
    }

    fn release(&self, component: &C) {
        let mut bound = self.bound.lock();
        let list = (self.accessor)(component);

        if self.in_place() {
            for (_, value) in bound.values() {
                list.remove_same(value);
            }
        } else {
            list.install(vec![]);
        }

        bound.clear();
    }
}

#[cfg(test)]
mod tests {
    use crate::binding::field::{FieldHandler, FieldStrategy, MultipleFieldStrategy};
    use crate::binding::{BindOutcome, TargetState};
    use crate::component_type::{ComponentType, Constructor, FieldTarget};
    use crate::descriptor::{
        Capability, Cardinality, DependencyDescriptor, FieldUpdate, ReferencePolicy,
    };
    use crate::error::{ConversionError, ResolutionError};
    use crate::provider::{Properties, PropertiesView, ProviderHandle, SERVICE_RANKING};
    use crate::slot::{Reference, ReferenceList};
    use serde_json::json;
    use std::sync::Arc;

    struct Listener(u64);

    #[derive(Default)]
    struct Bus {
        listeners: ReferenceList<Arc<Listener>>,
        properties: Reference<PropertiesView>,
    }

    fn listener(id: u64, ranking: i64) -> ProviderHandle {
        let mut properties = Properties::new();
        properties.insert(SERVICE_RANKING.to_string(), json!(ranking));
        ProviderHandle::for_service(id, Arc::new(Listener(id)), properties)
    }

    fn ids(bus: &Bus) -> Vec<u64> {
        bus.listeners
            .values()
            .iter()
            .map(|listener| listener.0)
            .collect()
    }

    fn create_strategy(field_update: FieldUpdate) -> MultipleFieldStrategy<Bus, Arc<Listener>> {
        MultipleFieldStrategy::new(
            |bus: &Bus| &bus.listeners,
            Arc::new(
                DependencyDescriptor::builder("listeners", Capability::of::<Listener>())
                    .cardinality(Cardinality::OptionalMultiple)
                    .policy(ReferencePolicy::Dynamic)
                    .field_update(field_update)
                    .build(),
            ),
        )
    }

    fn create_handler(field: &str, descriptor: DependencyDescriptor) -> FieldHandler<Bus> {
        let component_type = ComponentType::builder("bus", Constructor::from_default())
            .with_field(FieldTarget::list("listeners", |bus: &Bus| &bus.listeners))
            .with_field(FieldTarget::unary("properties", |bus: &Bus| &bus.properties))
            .build()
            .unwrap();

        FieldHandler::new(component_type, Arc::new(descriptor), field.to_string())
    }

    #[test]
    fn should_replace_snapshot_best_first() {
        let bus = Bus::default();
        let strategy = create_strategy(FieldUpdate::Replace);
        strategy.init(&bus).unwrap();

        strategy.bind(&bus, &listener(1, 0)).unwrap();
        strategy.bind(&bus, &listener(2, 5)).unwrap();
        strategy.bind(&bus, &listener(3, 0)).unwrap();
        assert_eq!(ids(&bus), vec![2, 1, 3]);

        assert_eq!(strategy.unbind(&bus, &listener(2, 5)), BindOutcome::Applied);
        assert_eq!(ids(&bus), vec![1, 3]);
    }

    #[test]
    fn should_update_in_place_in_bind_order() {
        let bus = Bus::default();
        let strategy = create_strategy(FieldUpdate::UpdateInPlace);
        strategy.init(&bus).unwrap();
        assert!(bus.listeners.has_container());

        strategy.bind(&bus, &listener(1, 0)).unwrap();
        strategy.bind(&bus, &listener(2, 5)).unwrap();
        assert_eq!(ids(&bus), vec![1, 2]);

        assert_eq!(strategy.unbind(&bus, &listener(1, 0)), BindOutcome::Applied);
        assert_eq!(strategy.unbind(&bus, &listener(1, 0)), BindOutcome::Ignored);
        assert_eq!(ids(&bus), vec![2]);
    }

    #[test]
    fn should_reject_frozen_container() {
        let bus = Bus {
            listeners: ReferenceList::frozen(vec![]),
            ..Bus::default()
        };

        assert!(create_strategy(FieldUpdate::UpdateInPlace)
            .init(&bus)
            .is_err());
    }

    #[test]
    fn should_ignore_missing_field() {
        let bus = Bus::default();
        let handler = create_handler(
            "missing",
            DependencyDescriptor::builder("listeners", Capability::of::<Listener>()).build(),
        );

        assert!(matches!(
            handler.init(&bus),
            Err(ResolutionError::TargetNotFound { .. })
        ));
        assert_eq!(
            handler.bind(&bus, &listener(1, 0)).unwrap(),
            BindOutcome::Ignored
        );
        assert_eq!(handler.state(), TargetState::NotFound);
    }

    #[test]
    fn should_overwrite_properties_on_update() {
        let bus = Bus::default();
        let handler = create_handler(
            "properties",
            DependencyDescriptor::builder("listeners", Capability::of::<Listener>())
                .policy(ReferencePolicy::Dynamic)
                .build(),
        );
        handler.init(&bus).unwrap();

        let handle = listener(1, 0);
        handler.bind(&bus, &handle).unwrap();

        let mut properties = Properties::new();
        properties.insert("topic".to_string(), json!("orders"));
        assert_eq!(
            handler
                .updated(&bus, &handle.with_properties(properties))
                .unwrap(),
            BindOutcome::Applied
        );
        assert_eq!(
            bus.properties.get().unwrap().get("topic"),
            Some(&json!("orders"))
        );
        assert!(handler.is_property_sensitive());
    }

    #[test]
    fn should_leave_field_untouched_on_conversion_failure() {
        let bus = Bus::default();
        let strategy = create_strategy(FieldUpdate::Replace);
        strategy.init(&bus).unwrap();
        strategy.bind(&bus, &listener(1, 0)).unwrap();

        let foreign = ProviderHandle::for_service(2, Arc::new(7u8), Properties::new());
        assert!(matches!(
            strategy.bind(&bus, &foreign),
            Err(ConversionError::IncompatibleService { .. })
        ));
        assert_eq!(strategy.unbind(&bus, &foreign), BindOutcome::Ignored);
        assert_eq!(ids(&bus), vec![1]);
    }
}
