//! A [ComponentType] holds everything known about a component before any instance exists:
//! declared dependencies, a table of field slots and callbacks which can receive providers, the
//! constructor and activation fields. It is built once and shared by all instances.
//!
//! Field slots are registered through typed accessors, so locating an injection target is a
//! table lookup rather than an inspection of the component at runtime. The table is usually
//! generated with `#[derive(FieldTable)]`:
//!
//! ```
//! use springtime_bind::component_type::{ComponentType, Constructor};
//! use springtime_bind::descriptor::{Capability, DependencyDescriptor, ReferencePolicy};
//! use springtime_bind::slot::Reference;
//! use springtime_bind::FieldTable;
//! use std::sync::Arc;
//!
//! struct Logger;
//!
//! #[derive(Default, FieldTable)]
//! struct Service {
//!     logger: Reference<Arc<Logger>>,
//! }
//!
//! let component_type = ComponentType::from_table(Constructor::<Service>::from_default())
//!     .with_dependency(
//!         DependencyDescriptor::builder("logger", Capability::of::<Logger>())
//!             .policy(ReferencePolicy::Dynamic)
//!             .field("logger")
//!             .build(),
//!     )
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(component_type.name(), "service");
//! ```

use crate::binding::field::{FieldStrategy, MultipleFieldStrategy, UnaryFieldStrategy};
use crate::config::BindingConfig;
use crate::context::{ActivationValue, ComponentContext};
use crate::descriptor::{DependencyDescriptor, FieldUpdate, InjectionTarget};
use crate::error::{
    ComponentTypeError, ConstructionError, ConversionError, ErrorPtr, ResolutionError,
};
use crate::provider::ProviderHandle;
use crate::slot::{ActivationSlot, Reference, ReferenceList};
use crate::value::{InjectedValue, ValueShape};
use fxhash::{FxHashMap, FxHashSet};
use itertools::Itertools;
use std::any::{type_name, Any, TypeId};
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, error, warn};

type CallbackFn<C> = dyn Fn(&C, &ProviderHandle) -> Result<(), CallbackError> + Send + Sync;

type ConstructorFn<C> = dyn Fn(&mut ConstructorArguments) -> Result<C, ErrorPtr> + Send + Sync;

type ActivationFn = dyn Fn(&ComponentContext) -> Result<Box<dyn Any + Send>, ErrorPtr> + Send + Sync;

/// Kind of slot receiving injected values.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum SlotKind {
    Unary,
    Collection,
}

/// Type-level information about a slot, used to validate it against a dependency.
#[derive(Copy, Clone, Debug)]
pub struct SlotInfo {
    pub kind: SlotKind,
    pub shape: ValueShape,
    pub service_type: Option<TypeId>,
    pub type_name: &'static str,
}

impl SlotInfo {
    fn of<T: InjectedValue>(kind: SlotKind) -> Self {
        Self {
            kind,
            shape: T::shape(),
            service_type: T::service_type(),
            type_name: type_name::<T>(),
        }
    }
}

/// Table of injectable fields of a component type.
pub trait FieldTable: Sized + Send + Sync + 'static {
    /// Default name of the component type.
    fn component_name() -> &'static str;

    fn field_targets() -> Vec<FieldTarget<Self>>;

    fn activation_fields() -> Vec<ActivationField<Self>>;
}

pub(crate) enum CallbackError {
    Conversion(ConversionError),
    Failed(ErrorPtr),
}

/// Named method receiving providers converted to the value type it accepts.
pub(crate) struct CallbackMethod<C> {
    info: SlotInfo,
    function: Arc<CallbackFn<C>>,
}

impl<C> Clone for CallbackMethod<C> {
    fn clone(&self) -> Self {
        Self {
            info: self.info,
            function: self.function.clone(),
        }
    }
}

impl<C: 'static> CallbackMethod<C> {
    fn new<T, F>(callback: F) -> Self
    where
        T: InjectedValue,
        F: Fn(&C, &T) -> Result<(), ErrorPtr> + Send + Sync + 'static,
    {
        Self {
            info: SlotInfo::of::<T>(SlotKind::Unary),
            function: Arc::new(
                move |component: &C, handle: &ProviderHandle| -> Result<(), CallbackError> {
                    let value = T::convert(handle).map_err(CallbackError::Conversion)?;
                    callback(component, &value).map_err(CallbackError::Failed)
                },
            ),
        }
    }
}

impl<C> CallbackMethod<C> {
    #[inline]
    pub(crate) fn shape(&self) -> ValueShape {
        self.info.shape
    }

    pub(crate) fn invoke(
        &self,
        component: &C,
        handle: &ProviderHandle,
    ) -> Result<(), CallbackError> {
        (self.function)(component, handle)
    }
}

pub(crate) trait FieldAccessor<C>: Send + Sync {
    fn info(&self) -> SlotInfo;

    fn strategy(&self, descriptor: &Arc<DependencyDescriptor>) -> Box<dyn FieldStrategy<C>>;
}

struct UnaryAccessor<C, T> {
    accessor: fn(&C) -> &Reference<T>,
}

impl<C: Send + Sync + 'static, T: InjectedValue> FieldAccessor<C> for UnaryAccessor<C, T> {
    fn info(&self) -> SlotInfo {
        SlotInfo::of::<T>(SlotKind::Unary)
    }

    fn strategy(&self, descriptor: &Arc<DependencyDescriptor>) -> Box<dyn FieldStrategy<C>> {
        Box::new(UnaryFieldStrategy::new(self.accessor, descriptor.clone()))
    }
}

struct ListAccessor<C, T> {
    accessor: fn(&C) -> &ReferenceList<T>,
}

impl<C: Send + Sync + 'static, T: InjectedValue> FieldAccessor<C> for ListAccessor<C, T> {
    fn info(&self) -> SlotInfo {
        SlotInfo::of::<T>(SlotKind::Collection)
    }

    fn strategy(&self, descriptor: &Arc<DependencyDescriptor>) -> Box<dyn FieldStrategy<C>> {
        Box::new(MultipleFieldStrategy::new(self.accessor, descriptor.clone()))
    }
}

/// Named field slot of a component.
pub struct FieldTarget<C> {
    name: String,
    accessor: Arc<dyn FieldAccessor<C>>,
}

impl<C: Send + Sync + 'static> FieldTarget<C> {
    pub fn unary<N: Into<String>, T: InjectedValue>(
        name: N,
        accessor: fn(&C) -> &Reference<T>,
    ) -> Self {
        Self {
            name: name.into(),
            accessor: Arc::new(UnaryAccessor { accessor }),
        }
    }

    pub fn list<N: Into<String>, T: InjectedValue>(
        name: N,
        accessor: fn(&C) -> &ReferenceList<T>,
    ) -> Self {
        Self {
            name: name.into(),
            accessor: Arc::new(ListAccessor { accessor }),
        }
    }
}

impl<C> FieldTarget<C> {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn info(&self) -> SlotInfo {
        self.accessor.info()
    }

    pub(crate) fn strategy(
        &self,
        descriptor: &Arc<DependencyDescriptor>,
    ) -> Box<dyn FieldStrategy<C>> {
        self.accessor.strategy(descriptor)
    }
}

impl<C> Debug for FieldTarget<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldTarget")
            .field("name", &self.name)
            .field("info", &self.accessor.info())
            .finish()
    }
}

/// Field assigned from the [ComponentContext] once the instance is constructed.
pub struct ActivationField<C> {
    name: String,
    assign: Arc<dyn Fn(&C, &ComponentContext) -> Result<bool, ErrorPtr> + Send + Sync>,
}

impl<C: 'static> ActivationField<C> {
    pub fn new<N: Into<String>, A: ActivationValue>(
        name: N,
        accessor: fn(&C) -> &ActivationSlot<A>,
    ) -> Self {
        Self {
            name: name.into(),
            assign: Arc::new(
                move |component: &C, context: &ComponentContext| -> Result<bool, ErrorPtr> {
                    let value = A::from_context(context)?;
                    Ok(accessor(component).assign(value))
                },
            ),
        }
    }
}

impl<C> ActivationField<C> {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns false if the slot was already assigned.
    pub(crate) fn assign(&self, component: &C, context: &ComponentContext) -> Result<bool, ErrorPtr> {
        (self.assign)(component, context)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum ParameterForm {
    Required,
    Optional,
    List,
}

/// Constructor parameter receiving providers of a dependency.
pub(crate) trait ReferenceParameter: Send + Sync {
    fn form(&self) -> ParameterForm;

    fn info(&self) -> SlotInfo;

    /// Converts candidates given best first into the parameter value.
    fn produce(
        &self,
        component: &str,
        descriptor: &DependencyDescriptor,
        candidates: &[ProviderHandle],
    ) -> Result<Box<dyn Any + Send>, ConstructionError>;
}

struct TypedReference<T> {
    form: ParameterForm,
    _value: PhantomData<fn() -> T>,
}

impl<T: InjectedValue> ReferenceParameter for TypedReference<T> {
    fn form(&self) -> ParameterForm {
        self.form
    }

    fn info(&self) -> SlotInfo {
        SlotInfo::of::<T>(if self.form == ParameterForm::List {
            SlotKind::Collection
        } else {
            SlotKind::Unary
        })
    }

    fn produce(
        &self,
        component: &str,
        descriptor: &DependencyDescriptor,
        candidates: &[ProviderHandle],
    ) -> Result<Box<dyn Any + Send>, ConstructionError> {
        let mut values = candidates
            .iter()
            .filter_map(|handle| match T::convert(handle) {
                Ok(value) => Some(value),
                Err(error) => {
                    warn!(component, dependency = descriptor.name(), provider = %handle.id(), %error, "Skipping provider which cannot be converted for a constructor parameter.");
                    None
                }
            });

        let mandatory = !descriptor.cardinality().is_optional();
        let unsatisfied = || ConstructionError::UnsatisfiedDependency {
            component: component.to_string(),
            dependency: descriptor.name().to_string(),
        };

        match self.form {
            ParameterForm::Required => values
                .next()
                .map(|value| Box::new(value) as Box<dyn Any + Send>)
                .ok_or_else(unsatisfied),
            ParameterForm::Optional => match values.next() {
                None if mandatory => Err(unsatisfied()),
                value => Ok(Box::new(value) as Box<dyn Any + Send>),
            },
            ParameterForm::List => {
                let values = values.collect_vec();
                if values.is_empty() && mandatory {
                    Err(unsatisfied())
                } else {
                    Ok(Box::new(values) as Box<dyn Any + Send>)
                }
            }
        }
    }
}

pub(crate) enum ConstructorParameter {
    Reference(Arc<dyn ReferenceParameter>),
    Activation(Arc<ActivationFn>),
}

/// Function creating component instances, together with a description of its parameters.
///
/// Parameters are declared in order and later taken by index from [ConstructorArguments]:
///
/// * [Constructor::reference] - `T`, a single provider
/// * [Constructor::optional_reference] - `Option<T>`
/// * [Constructor::references] - `Vec<T>`, all providers best first
/// * [Constructor::activation] - an [ActivationValue]
pub struct Constructor<C> {
    parameters: Vec<ConstructorParameter>,
    function: Arc<ConstructorFn<C>>,
}

impl<C: 'static> Constructor<C> {
    pub fn new<F>(function: F) -> Self
    where
        F: Fn(&mut ConstructorArguments) -> Result<C, ErrorPtr> + Send + Sync + 'static,
    {
        Self {
            parameters: vec![],
            function: Arc::new(function),
        }
    }

    /// Constructor taking no parameters.
    pub fn from_fn<F>(function: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
    {
        Self::new(move |_| Ok(function()))
    }

    pub fn from_default() -> Self
    where
        C: Default,
    {
        Self::from_fn(C::default)
    }

    pub fn reference<T: InjectedValue>(self) -> Self {
        self.with_reference::<T>(ParameterForm::Required)
    }

    pub fn optional_reference<T: InjectedValue>(self) -> Self {
        self.with_reference::<T>(ParameterForm::Optional)
    }

    pub fn references<T: InjectedValue>(self) -> Self {
        self.with_reference::<T>(ParameterForm::List)
    }

    pub fn activation<A: ActivationValue>(mut self) -> Self {
        self.parameters
            .push(ConstructorParameter::Activation(Arc::new(|context: &ComponentContext| {
                A::from_context(context).map(|value| Box::new(value) as Box<dyn Any + Send>)
            })));
        self
    }

    fn with_reference<T: InjectedValue>(mut self, form: ParameterForm) -> Self {
        self.parameters
            .push(ConstructorParameter::Reference(Arc::new(TypedReference::<T> {
                form,
                _value: PhantomData,
            })));
        self
    }
}

impl<C> Constructor<C> {
    #[inline]
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub(crate) fn parameters(&self) -> &[ConstructorParameter] {
        &self.parameters
    }

    pub(crate) fn call(&self, arguments: &mut ConstructorArguments) -> Result<C, ErrorPtr> {
        (self.function)(arguments)
    }
}

/// Values prepared for constructor parameters.
#[derive(Debug)]
pub struct ConstructorArguments {
    values: Vec<Option<Box<dyn Any + Send>>>,
}

impl ConstructorArguments {
    pub(crate) fn new(values: Vec<Box<dyn Any + Send>>) -> Self {
        Self {
            values: values.into_iter().map(Some).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Takes the value of the parameter at given index. Each value can be taken only once; a
    /// request for a wrong type leaves the value in place.
    pub fn take<T: 'static>(&mut self, index: usize) -> Result<T, ErrorPtr> {
        let slot = self
            .values
            .get_mut(index)
            .filter(|slot| slot.is_some())
            .ok_or_else(|| Arc::new(ConstructionError::MissingArgument { index }) as ErrorPtr)?;

        match slot.take().map(|value| value.downcast::<T>()) {
            Some(Ok(value)) => Ok(*value),
            Some(Err(value)) => {
                *slot = Some(value);
                Err(Arc::new(ConstructionError::ArgumentType {
                    index,
                    expected: type_name::<T>(),
                }) as ErrorPtr)
            }
            None => Err(Arc::new(ConstructionError::MissingArgument { index }) as ErrorPtr),
        }
    }
}

/// Metadata of a component type, shared by all its instances.
pub struct ComponentType<C> {
    name: String,
    dependencies: Vec<Arc<DependencyDescriptor>>,
    fields: FxHashMap<String, FieldTarget<C>>,
    callbacks: FxHashMap<String, CallbackMethod<C>>,
    activation_fields: FxHashMap<String, ActivationField<C>>,
    activation_order: Vec<String>,
    constructor: Constructor<C>,
    parameter_plan: Result<Vec<Option<usize>>, ConstructionError>,
    config: BindingConfig,
}

impl<C: Send + Sync + 'static> ComponentType<C> {
    pub fn builder<N: Into<String>>(name: N, constructor: Constructor<C>) -> ComponentTypeBuilder<C> {
        ComponentTypeBuilder {
            name: name.into(),
            constructor,
            dependencies: vec![],
            fields: vec![],
            callbacks: vec![],
            activation_fields: vec![],
            activation_order: vec![],
            config: BindingConfig::default(),
        }
    }

    /// Starts a builder with fields from the [FieldTable]. All activation fields of the table are
    /// assigned at construction, in table order.
    pub fn from_table(constructor: Constructor<C>) -> ComponentTypeBuilder<C>
    where
        C: FieldTable,
    {
        let mut builder = Self::builder(C::component_name(), constructor);
        for field in C::field_targets() {
            builder = builder.with_field(field);
        }

        for field in C::activation_fields() {
            let name = field.name().to_string();
            builder = builder.with_activation_field(field).activate_field(name);
        }

        builder
    }
}

impl<C> ComponentType<C> {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn dependencies(&self) -> &[Arc<DependencyDescriptor>] {
        &self.dependencies
    }

    pub fn dependency(&self, name: &str) -> Option<&Arc<DependencyDescriptor>> {
        self.dependencies
            .iter()
            .find(|descriptor| descriptor.name() == name)
    }

    #[inline]
    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    #[inline]
    pub(crate) fn constructor(&self) -> &Constructor<C> {
        &self.constructor
    }

    /// Dependency index for each constructor parameter, or [None] for activation values.
    #[inline]
    pub(crate) fn parameter_plan(&self) -> Result<&[Option<usize>], ConstructionError> {
        self.parameter_plan
            .as_ref()
            .map(Vec::as_slice)
            .map_err(Clone::clone)
    }

    pub(crate) fn activation_fields(
        &self,
    ) -> impl Iterator<Item = (&str, Option<&ActivationField<C>>)> {
        self.activation_order
            .iter()
            .map(|name| (name.as_str(), self.activation_fields.get(name)))
    }

    /// Locates and validates a field slot for given dependency.
    pub(crate) fn resolve_field(
        &self,
        descriptor: &DependencyDescriptor,
        field: &str,
    ) -> Result<&FieldTarget<C>, ResolutionError> {
        let target = self
            .fields
            .get(field)
            .ok_or_else(|| ResolutionError::TargetNotFound {
                component: self.name.clone(),
                dependency: descriptor.name().to_string(),
                target: field.to_string(),
            })?;

        let info = target.info();
        let multiple = descriptor.cardinality().is_multiple();
        let unusable = |reason: String| ResolutionError::TargetUnusable {
            component: self.name.clone(),
            dependency: descriptor.name().to_string(),
            target: field.to_string(),
            reason,
        };

        if multiple && info.kind == SlotKind::Unary {
            return Err(unusable(
                "a multiple dependency requires a collection field".to_string(),
            ));
        }

        if !multiple && info.kind == SlotKind::Collection {
            return Err(unusable(
                "a unary dependency cannot be injected into a collection field".to_string(),
            ));
        }

        if multiple && descriptor.is_static() && descriptor.field_update() == FieldUpdate::UpdateInPlace {
            return Err(unusable(
                "a static dependency can only replace its collection".to_string(),
            ));
        }

        check_service(descriptor, &info).map_err(unusable)?;
        Ok(target)
    }

    /// Locates a callback method for given dependency and checks if it accepts its service.
    pub(crate) fn resolve_callback(
        &self,
        descriptor: &DependencyDescriptor,
        method: &str,
    ) -> Result<CallbackMethod<C>, ResolutionError> {
        let callback =
            self.callbacks
                .get(method)
                .cloned()
                .ok_or_else(|| ResolutionError::TargetNotFound {
                    component: self.name.clone(),
                    dependency: descriptor.name().to_string(),
                    target: method.to_string(),
                })?;

        check_service(descriptor, &callback.info).map_err(|reason| {
            ResolutionError::TargetUnusable {
                component: self.name.clone(),
                dependency: descriptor.name().to_string(),
                target: method.to_string(),
                reason,
            }
        })?;

        Ok(callback)
    }

    fn plan_parameters(&self) -> Result<Vec<Option<usize>>, ConstructionError> {
        let parameters = self.constructor.parameters();
        let unusable = |index: usize, reason: String| ConstructionError::ParameterUnusable {
            component: self.name.clone(),
            index,
            reason,
        };

        for descriptor in &self.dependencies {
            for target in descriptor.injection_targets() {
                if let InjectionTarget::Parameter(index) = target {
                    if *index >= parameters.len() {
                        return Err(unusable(
                            *index,
                            format!(
                                "constructor takes {} parameters, but dependency '{}' targets it",
                                parameters.len(),
                                descriptor.name()
                            ),
                        ));
                    }
                }
            }
        }

        parameters
            .iter()
            .enumerate()
            .map(|(index, parameter)| {
                let target = InjectionTarget::Parameter(index);
                let bound = self
                    .dependencies
                    .iter()
                    .enumerate()
                    .filter(|(_, descriptor)| descriptor.injection_targets().contains(&target))
                    .collect_vec();

                if bound.len() > 1 {
                    error!(
                        component = %self.name,
                        parameter = index,
                        dependencies = %bound.iter().map(|(_, descriptor)| descriptor.name()).join(", "),
                        "Multiple dependencies target the same constructor parameter; using the first one."
                    );
                }

                match (parameter, bound.first()) {
                    (ConstructorParameter::Activation(_), None) => Ok(None),
                    (ConstructorParameter::Activation(_), Some((_, descriptor))) => Err(unusable(
                        index,
                        format!(
                            "parameter receives an activation value, but dependency '{}' targets it",
                            descriptor.name()
                        ),
                    )),
                    (ConstructorParameter::Reference(_), None) => {
                        Err(ConstructionError::UnboundParameter {
                            component: self.name.clone(),
                            index,
                        })
                    }
                    (ConstructorParameter::Reference(parameter), Some((position, descriptor))) => {
                        check_parameter(descriptor, parameter.as_ref())
                            .map(|_| Some(*position))
                            .map_err(|reason| unusable(index, reason))
                    }
                }
            })
            .collect()
    }
}

impl<C> Debug for ComponentType<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentType")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("fields", &self.fields.keys().sorted().collect_vec())
            .field("callbacks", &self.callbacks.keys().sorted().collect_vec())
            .field("activation_fields", &self.activation_order)
            .field("config", &self.config)
            .finish()
    }
}

fn check_service(descriptor: &DependencyDescriptor, info: &SlotInfo) -> Result<(), String> {
    match (
        info.shape.requires_service(),
        descriptor.capability().service_type(),
        info.service_type,
    ) {
        (true, Some(expected), Some(actual)) if expected != actual => Err(format!(
            "type {} does not match the service type {}",
            info.type_name,
            descriptor.capability().name()
        )),
        _ => Ok(()),
    }
}

fn check_parameter(
    descriptor: &DependencyDescriptor,
    parameter: &dyn ReferenceParameter,
) -> Result<(), String> {
    if !descriptor.is_static() {
        return Err("a dynamic dependency cannot be injected into a constructor".to_string());
    }

    let multiple = descriptor.cardinality().is_multiple();
    match parameter.form() {
        ParameterForm::List if !multiple => {
            return Err(
                "a unary dependency cannot be injected into a collection parameter".to_string(),
            )
        }
        ParameterForm::Required | ParameterForm::Optional if multiple => {
            return Err("a multiple dependency requires a collection parameter".to_string())
        }
        ParameterForm::Required if descriptor.cardinality().is_optional() => {
            return Err("an optional dependency requires an optional parameter".to_string())
        }
        _ => {}
    }

    check_service(descriptor, &parameter.info())
}

/// Builder for [ComponentType].
pub struct ComponentTypeBuilder<C> {
    name: String,
    constructor: Constructor<C>,
    dependencies: Vec<DependencyDescriptor>,
    fields: Vec<FieldTarget<C>>,
    callbacks: Vec<(String, CallbackMethod<C>)>,
    activation_fields: Vec<ActivationField<C>>,
    activation_order: Vec<String>,
    config: BindingConfig,
}

impl<C: Send + Sync + 'static> ComponentTypeBuilder<C> {
    pub fn with_dependency(mut self, descriptor: DependencyDescriptor) -> Self {
        self.dependencies.push(descriptor);
        self
    }

    pub fn with_field(mut self, field: FieldTarget<C>) -> Self {
        self.fields.push(field);
        self
    }

    /// Registers a named method. Providers are converted to `T` before the method is invoked,
    /// e.g. `Arc<S>` for the service, [PropertiesView](crate::provider::PropertiesView) for
    /// properties or [ProviderHandle] for the handle itself.
    pub fn with_callback<N, T, F>(mut self, name: N, callback: F) -> Self
    where
        N: Into<String>,
        T: InjectedValue,
        F: Fn(&C, &T) -> Result<(), ErrorPtr> + Send + Sync + 'static,
    {
        self.callbacks
            .push((name.into(), CallbackMethod::new(callback)));
        self
    }

    pub fn with_activation_field(mut self, field: ActivationField<C>) -> Self {
        self.activation_fields.push(field);
        self
    }

    /// Declares an activation field to assign at construction, after previously declared ones.
    pub fn activate_field<N: Into<String>>(mut self, name: N) -> Self {
        self.activation_order.push(name.into());
        self
    }

    pub fn with_config(mut self, config: BindingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Arc<ComponentType<C>>, ComponentTypeError> {
        let mut dependency_names = FxHashSet::default();
        for descriptor in &self.dependencies {
            if !dependency_names.insert(descriptor.name()) {
                return Err(ComponentTypeError::DuplicateDependency(
                    descriptor.name().to_string(),
                ));
            }
        }

        let mut fields = FxHashMap::default();
        for field in self.fields {
            let name = field.name().to_string();
            if fields.insert(name.clone(), field).is_some() {
                return Err(ComponentTypeError::DuplicateField(name));
            }
        }

        let mut callbacks = FxHashMap::default();
        for (name, callback) in self.callbacks {
            if callbacks.insert(name.clone(), callback).is_some() {
                return Err(ComponentTypeError::DuplicateCallback(name));
            }
        }

        let mut activation_fields = FxHashMap::default();
        for field in self.activation_fields {
            let name = field.name().to_string();
            if activation_fields.insert(name.clone(), field).is_some() {
                return Err(ComponentTypeError::DuplicateActivationField(name));
            }
        }

        let mut component_type = ComponentType {
            name: self.name,
            dependencies: self.dependencies.into_iter().map(Arc::new).collect(),
            fields,
            callbacks,
            activation_fields,
            activation_order: self.activation_order,
            constructor: self.constructor,
            parameter_plan: Ok(vec![]),
            config: self.config,
        };

        component_type.parameter_plan = component_type.plan_parameters();
        if let Err(error) = &component_type.parameter_plan {
            debug!(component = %component_type.name, %error, "Component type cannot be constructed.");
        }

        if component_type.config.strict_targets {
            component_type
                .validate_targets()
                .map_err(ComponentTypeError::InvalidTarget)?;
        }

        Ok(Arc::new(component_type))
    }
}

impl<C> ComponentType<C> {
    fn validate_targets(&self) -> Result<(), ResolutionError> {
        for descriptor in &self.dependencies {
            for target in descriptor.injection_targets() {
                match target {
                    InjectionTarget::Field(field) => {
                        self.resolve_field(descriptor, field)?;
                    }
                    InjectionTarget::Callbacks(names) => {
                        for method in names.names() {
                            self.resolve_callback(descriptor, method)?;
                        }
                    }
                    InjectionTarget::Parameter(_) => {}
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::component_type::{ComponentType, Constructor, ConstructorArguments, FieldTarget};
    use crate::config::BindingConfig;
    use crate::context::ComponentContext;
    use crate::descriptor::{
        Capability, Cardinality, DependencyDescriptor, FieldUpdate, ReferencePolicy,
    };
    use crate::error::{ComponentTypeError, ConstructionError, ResolutionError};
    use crate::provider::PropertiesView;
    use crate::slot::{Reference, ReferenceList};
    use std::any::Any;
    use std::sync::Arc;

    struct Logger;

    #[derive(Default)]
    struct Service {
        logger: Reference<Arc<Logger>>,
        loggers: ReferenceList<Arc<Logger>>,
        names: Reference<Arc<String>>,
    }

    fn builder() -> crate::component_type::ComponentTypeBuilder<Service> {
        ComponentType::builder("service", Constructor::from_default())
            .with_field(FieldTarget::unary("logger", |service: &Service| &service.logger))
            .with_field(FieldTarget::list("loggers", |service: &Service| {
                &service.loggers
            }))
            .with_field(FieldTarget::unary("names", |service: &Service| &service.names))
    }

    fn logger_dependency() -> crate::descriptor::DependencyDescriptorBuilder {
        DependencyDescriptor::builder("logger", Capability::of::<Logger>())
    }

    #[test]
    fn should_reject_duplicate_dependency() {
        let result = builder()
            .with_dependency(logger_dependency().build())
            .with_dependency(logger_dependency().build())
            .build();

        assert_eq!(
            result.unwrap_err(),
            ComponentTypeError::DuplicateDependency("logger".to_string())
        );
    }

    #[test]
    fn should_reject_duplicate_field() {
        let result = builder()
            .with_field(FieldTarget::unary("logger", |service: &Service| &service.logger))
            .build();

        assert_eq!(
            result.unwrap_err(),
            ComponentTypeError::DuplicateField("logger".to_string())
        );
    }

    #[test]
    fn should_resolve_matching_field() {
        let component_type = builder().build().unwrap();
        let descriptor = logger_dependency().field("logger").build();

        assert!(component_type.resolve_field(&descriptor, "logger").is_ok());
    }

    #[test]
    fn should_report_missing_field() {
        let component_type = builder().build().unwrap();
        let descriptor = logger_dependency().build();

        assert!(matches!(
            component_type.resolve_field(&descriptor, "missing"),
            Err(ResolutionError::TargetNotFound { .. })
        ));
    }

    #[test]
    fn should_reject_mismatched_fields() {
        let component_type = builder().build().unwrap();
        let unary = logger_dependency().build();
        let multiple = logger_dependency()
            .cardinality(Cardinality::OptionalMultiple)
            .build();
        let static_in_place = logger_dependency()
            .cardinality(Cardinality::OptionalMultiple)
            .field_update(FieldUpdate::UpdateInPlace)
            .build();

        for (descriptor, field) in [
            (&unary, "loggers"),
            (&multiple, "logger"),
            (&unary, "names"),
            (&static_in_place, "loggers"),
        ] {
            assert!(matches!(
                component_type.resolve_field(descriptor, field),
                Err(ResolutionError::TargetUnusable { .. })
            ));
        }
    }

    #[test]
    fn should_reject_invalid_targets_when_strict() {
        let mut config = BindingConfig::default();
        config.strict_targets = true;

        let result = builder()
            .with_config(config)
            .with_dependency(logger_dependency().field("missing").build())
            .build();

        assert!(matches!(
            result.unwrap_err(),
            ComponentTypeError::InvalidTarget(ResolutionError::TargetNotFound { .. })
        ));
    }

    #[test]
    fn should_plan_parameters() {
        let constructor = Constructor::new(|arguments| {
            let _logger = arguments.take::<Arc<Logger>>(1)?;
            Ok(Service::default())
        })
        .activation::<PropertiesView>()
        .reference::<Arc<Logger>>();

        let component_type = ComponentType::builder("service", constructor)
            .with_dependency(logger_dependency().parameter(1).build())
            .build()
            .unwrap();

        assert_eq!(component_type.parameter_plan().unwrap(), &[None, Some(0)]);
    }

    #[test]
    fn should_reject_dynamic_parameter() {
        let component_type = ComponentType::builder(
            "service",
            Constructor::new(|_| Ok(Service::default())).reference::<Arc<Logger>>(),
        )
        .with_dependency(
            logger_dependency()
                .policy(ReferencePolicy::Dynamic)
                .parameter(0)
                .build(),
        )
        .build()
        .unwrap();

        assert!(matches!(
            component_type.parameter_plan(),
            Err(ConstructionError::ParameterUnusable { index: 0, .. })
        ));
    }

    #[test]
    fn should_reject_unbound_parameter() {
        let component_type = ComponentType::builder(
            "service",
            Constructor::new(|_| Ok(Service::default())).references::<Arc<Logger>>(),
        )
        .build()
        .unwrap();

        assert!(matches!(
            component_type.parameter_plan(),
            Err(ConstructionError::UnboundParameter { index: 0, .. })
        ));
    }

    #[test]
    fn should_require_optional_parameter_for_optional_dependency() {
        let component_type = ComponentType::builder(
            "service",
            Constructor::new(|_| Ok(Service::default())).reference::<Arc<Logger>>(),
        )
        .with_dependency(
            logger_dependency()
                .cardinality(Cardinality::OptionalUnary)
                .parameter(0)
                .build(),
        )
        .build()
        .unwrap();

        assert!(component_type.parameter_plan().is_err());
    }

    #[test]
    fn should_take_arguments_once_and_keep_mismatched() {
        let mut arguments = ConstructorArguments::new(vec![
            Box::new(5u32) as Box<dyn Any + Send>,
            Box::new(ComponentContext::new("service", Default::default())),
        ]);

        assert!(matches!(
            arguments.take::<String>(0),
            Err(error) if error.to_string().contains("unexpected type")
        ));
        assert_eq!(arguments.take::<u32>(0).unwrap(), 5);
        assert!(arguments.take::<u32>(0).is_err());
        assert_eq!(
            arguments.take::<ComponentContext>(1).unwrap().component_name(),
            "service"
        );
        assert!(arguments.take::<u32>(7).is_err());
    }
}
