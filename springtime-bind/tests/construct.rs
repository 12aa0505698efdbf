use serde::Deserialize;
use serde_json::json;
use springtime_bind::component_type::{ActivationField, ComponentType, Constructor, FieldTarget};
use springtime_bind::context::{ComponentContext, Configuration};
use springtime_bind::descriptor::{Capability, Cardinality, DependencyDescriptor, ReferencePolicy};
use springtime_bind::error::{ConstructionError, ErrorPtr};
use springtime_bind::provider::{Properties, ProviderHandle, ProviderSnapshot, SERVICE_RANKING};
use springtime_bind::slot::{ActivationSlot, Reference};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

struct Logger(&'static str);

struct Store(u64);

#[derive(Deserialize)]
struct WorkerConfig {
    threads: u32,
}

struct Worker {
    logger: Reference<Arc<Logger>>,
    store: Option<Arc<Store>>,
    replicas: Vec<Arc<Store>>,
    threads: u32,
    context: ActivationSlot<ComponentContext>,
}

#[derive(Debug)]
struct Refused;

impl Display for Refused {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "refused")
    }
}

impl std::error::Error for Refused {}

fn logger_dependency() -> DependencyDescriptor {
    DependencyDescriptor::builder("logger", Capability::of::<Logger>())
        .policy(ReferencePolicy::Dynamic)
        .field("logger")
        .build()
}

fn worker_type() -> Arc<ComponentType<Worker>> {
    let constructor = Constructor::new(|arguments| {
        let config = arguments.take::<Configuration<WorkerConfig>>(2)?;
        Ok(Worker {
            logger: Reference::new(),
            store: arguments.take(0)?,
            replicas: arguments.take(1)?,
            threads: config.threads,
            context: ActivationSlot::new(),
        })
    })
    .optional_reference::<Arc<Store>>()
    .references::<Arc<Store>>()
    .activation::<Configuration<WorkerConfig>>();

    ComponentType::builder("worker", constructor)
        .with_field(FieldTarget::unary("logger", |worker: &Worker| &worker.logger))
        .with_activation_field(ActivationField::new("context", |worker: &Worker| {
            &worker.context
        }))
        .activate_field("context")
        .with_dependency(logger_dependency())
        .with_dependency(
            DependencyDescriptor::builder("store", Capability::of::<Store>())
                .cardinality(Cardinality::OptionalUnary)
                .parameter(0)
                .build(),
        )
        .with_dependency(
            DependencyDescriptor::builder("replicas", Capability::of::<Store>())
                .cardinality(Cardinality::OptionalMultiple)
                .parameter(1)
                .build(),
        )
        .build()
        .unwrap()
}

fn context() -> ComponentContext {
    let mut properties = Properties::new();
    properties.insert("threads".to_string(), json!(4));
    ComponentContext::new("worker", properties)
}

fn logger(id: u64, name: &'static str) -> ProviderHandle {
    ProviderHandle::for_service(id, Arc::new(Logger(name)), Properties::new())
}

fn store(id: u64, ranking: i32) -> ProviderHandle {
    let mut properties = Properties::new();
    properties.insert(SERVICE_RANKING.to_string(), json!(ranking));
    ProviderHandle::for_service(id, Arc::new(Store(id)), properties)
}

#[test]
fn should_construct_only_when_mandatory_dependency_is_satisfied() {
    let component_type = worker_type();

    assert!(matches!(
        component_type.construct(&ProviderSnapshot::new(), context()),
        Err(ConstructionError::UnsatisfiedDependency { dependency, .. }) if dependency == "logger"
    ));

    let instance = component_type
        .construct(
            &ProviderSnapshot::new().with_provider("logger", logger(1, "l1")),
            context(),
        )
        .unwrap();

    assert_eq!(instance.instance().logger.get().unwrap().0, "l1");
    assert!(instance.is_satisfied());
}

#[test]
fn should_pass_providers_to_constructor_parameters() {
    let providers = ProviderSnapshot::new()
        .with_provider("logger", logger(1, "l1"))
        .with_provider("store", store(2, 0))
        .with_provider("store", store(3, 10))
        .with_provider("replicas", store(4, 0))
        .with_provider("replicas", store(5, 1));

    let instance = worker_type().construct(&providers, context()).unwrap();
    let worker = instance.instance();

    assert_eq!(worker.store.as_ref().unwrap().0, 3);
    assert_eq!(
        worker.replicas.iter().map(|store| store.0).collect::<Vec<_>>(),
        vec![5, 4]
    );
    assert_eq!(worker.threads, 4);
    assert_eq!(worker.context.get().unwrap().component_name(), "worker");
}

#[test]
fn should_pass_empty_values_for_missing_optional_parameters() {
    let instance = worker_type()
        .construct(
            &ProviderSnapshot::new().with_provider("logger", logger(1, "l1")),
            context(),
        )
        .unwrap();

    assert!(instance.instance().store.is_none());
    assert!(instance.instance().replicas.is_empty());
}

#[test]
fn should_fail_on_invalid_activation_value() {
    let result = worker_type().construct(
        &ProviderSnapshot::new().with_provider("logger", logger(1, "l1")),
        ComponentContext::new("worker", Properties::new()),
    );

    assert!(matches!(
        result,
        Err(ConstructionError::ActivationValue { target, .. }) if target == "parameter 2"
    ));
}

#[test]
fn should_reject_dynamic_dependency_for_parameter() {
    let component_type = ComponentType::builder(
        "worker",
        Constructor::new(|arguments| arguments.take::<Arc<Logger>>(0).map(|_| ()))
            .reference::<Arc<Logger>>(),
    )
    .with_dependency(
        DependencyDescriptor::builder("logger", Capability::of::<Logger>())
            .policy(ReferencePolicy::Dynamic)
            .parameter(0)
            .build(),
    )
    .build()
    .unwrap();

    assert!(matches!(
        component_type.construct(
            &ProviderSnapshot::new().with_provider("logger", logger(1, "l1")),
            context()
        ),
        Err(ConstructionError::ParameterUnusable { index: 0, .. })
    ));
}

#[test]
fn should_reject_parameter_without_dependency() {
    let component_type = ComponentType::builder(
        "worker",
        Constructor::new(|arguments| arguments.take::<Arc<Logger>>(0).map(|_| ()))
            .reference::<Arc<Logger>>(),
    )
    .build()
    .unwrap();

    assert!(matches!(
        component_type.construct(&ProviderSnapshot::new(), context()),
        Err(ConstructionError::UnboundParameter { index: 0, .. })
    ));
}

#[test]
fn should_report_constructor_failure() {
    let component_type = ComponentType::builder(
        "worker",
        Constructor::new(|_| Err::<(), _>(Arc::new(Refused) as ErrorPtr)),
    )
    .build()
    .unwrap();

    assert!(matches!(
        component_type.construct(&ProviderSnapshot::new(), context()),
        Err(ConstructionError::ConstructorFailed { .. })
    ));
}

#[test]
fn should_fail_on_missing_activation_field() {
    let component_type = ComponentType::builder("worker", Constructor::from_fn(|| ()))
        .activate_field("context")
        .build()
        .unwrap();

    assert!(matches!(
        component_type.construct(&ProviderSnapshot::new(), context()),
        Err(ConstructionError::ActivationTargetNotFound { field, .. }) if field == "context"
    ));
}

#[test]
fn should_fail_on_unresolved_mandatory_field() {
    #[derive(Default)]
    struct Empty;

    let component_type = ComponentType::builder("empty", Constructor::<Empty>::from_default())
        .with_dependency(logger_dependency())
        .build()
        .unwrap();

    assert!(matches!(
        component_type.construct(
            &ProviderSnapshot::new().with_provider("logger", logger(1, "l1")),
            context()
        ),
        Err(ConstructionError::UnresolvedTarget { dependency, .. }) if dependency == "logger"
    ));
}

#[test]
fn should_release_fields_on_dispose() {
    let instance = worker_type()
        .construct(
            &ProviderSnapshot::new().with_provider("logger", logger(1, "l1")),
            context(),
        )
        .unwrap();
    let worker = instance.instance().clone();

    instance.dispose();
    assert!(worker.logger.get().is_none());
}
