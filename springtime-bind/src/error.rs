use crate::provider::ProviderId;
use std::error::Error;
use std::sync::Arc;
use thiserror::Error;

/// Type-erased error produced by user code: constructors, callbacks or activation values.
pub type ErrorPtr = Arc<dyn Error + Send + Sync>;

/// Terminal failure to locate or validate an injection target. Recorded once per binding state;
/// every later event for the affected mechanism is ignored.
#[derive(Error, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum ResolutionError {
    #[error("Injection target '{target}' for dependency '{dependency}' not found in component '{component}'")]
    TargetNotFound {
        component: String,
        dependency: String,
        target: String,
    },
    #[error("Injection target '{target}' for dependency '{dependency}' in component '{component}' is unusable: {reason}")]
    TargetUnusable {
        component: String,
        dependency: String,
        target: String,
        reason: String,
    },
}

/// Failure to produce a value of the requested shape from a specific provider.
#[derive(Error, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum ConversionError {
    #[error("Provider {provider} does not expose a service of type {expected}")]
    IncompatibleService {
        provider: ProviderId,
        expected: &'static str,
    },
}

/// Errors reported while delivering provider events to a component instance.
#[derive(Error, Clone, Debug)]
pub enum BindingError {
    #[error("Component '{component}' has no dependency named '{dependency}'")]
    UnknownDependency {
        component: String,
        dependency: String,
    },
    /// Reported by injection mechanisms for a single provider. Delivered events answer it with
    /// [BindOutcome::Ignored](crate::BindOutcome::Ignored) and leave the binding state as it was.
    #[error("Cannot convert provider for dependency '{dependency}': {error}")]
    ConversionFailed {
        dependency: String,
        error: ConversionError,
    },
    #[error("Callback '{method}' for dependency '{dependency}' failed: {error}")]
    CallbackFailed {
        dependency: String,
        method: String,
        error: ErrorPtr,
    },
}

/// Errors related to creating a component instance. No instance is exposed when one occurs.
#[derive(Error, Clone, Debug)]
pub enum ConstructionError {
    #[error("Mandatory dependency '{dependency}' of component '{component}' has no usable provider")]
    UnsatisfiedDependency {
        component: String,
        dependency: String,
    },
    #[error("Dependency '{dependency}' cannot be injected: {error}")]
    UnresolvedTarget {
        dependency: String,
        error: ResolutionError,
    },
    #[error("Constructor parameter {index} of component '{component}' is unusable: {reason}")]
    ParameterUnusable {
        component: String,
        index: usize,
        reason: String,
    },
    #[error("Constructor parameter {index} of component '{component}' is not bound to any dependency")]
    UnboundParameter { component: String, index: usize },
    #[error("Constructor argument {index} is missing or was already taken")]
    MissingArgument { index: usize },
    #[error("Constructor argument {index} has an unexpected type; expected {expected}")]
    ArgumentType {
        index: usize,
        expected: &'static str,
    },
    #[error("Activation field '{field}' not found in component '{component}'")]
    ActivationTargetNotFound { component: String, field: String },
    #[error("Cannot assign activation value '{target}' in component '{component}': {error}")]
    ActivationValue {
        component: String,
        target: String,
        error: ErrorPtr,
    },
    #[error("Constructor of component '{component}' failed: {error}")]
    ConstructorFailed { component: String, error: ErrorPtr },
    #[error("Initial binding failed: {0}")]
    InitialBinding(BindingError),
}

/// Errors detected while building a [ComponentType](crate::component_type::ComponentType).
#[derive(Error, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum ComponentTypeError {
    #[error("Attempted to register a duplicated dependency with name: {0}")]
    DuplicateDependency(String),
    #[error("Attempted to register a duplicated field target with name: {0}")]
    DuplicateField(String),
    #[error("Attempted to register a duplicated callback with name: {0}")]
    DuplicateCallback(String),
    #[error("Attempted to register a duplicated activation field with name: {0}")]
    DuplicateActivationField(String),
    #[error("Invalid injection target: {0}")]
    InvalidTarget(ResolutionError),
}
