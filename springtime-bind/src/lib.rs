//! Dynamic dependency binding and injection for components consuming external providers.
//!
//! Components declare dependencies on capabilities offered by providers which can appear,
//! disappear or change their properties at any time. This crate keeps a constructed component
//! instance consistent with such changes: it picks providers according to cardinality and
//! ranking, converts them into the shape a target expects and injects them into constructor
//! parameters, field slots ([Reference](slot::Reference) and [ReferenceList](slot::ReferenceList))
//! or named callbacks. Changes which cannot be absorbed by a live instance are reported as
//! [BindOutcome::ReactivateRequired], leaving re-creation to the caller.
//!
//! The general flow is:
//!
//! 1. Describe the component with a [ComponentType](component_type::ComponentType), usually
//!    starting from a table generated by `#[derive(FieldTable)]`.
//! 2. Create an instance with
//!    [ComponentType::construct](component_type::ComponentType::construct), passing providers
//!    known at that time.
//! 3. Deliver provider events through the returned
//!    [ComponentInstance](construct::ComponentInstance) and act on the returned [BindOutcome].
//!
//! ```
//! use springtime_bind::component_type::{ComponentType, Constructor};
//! use springtime_bind::context::ComponentContext;
//! use springtime_bind::descriptor::{Capability, Cardinality, DependencyDescriptor, ReferencePolicy};
//! use springtime_bind::provider::{Properties, ProviderHandle, ProviderSnapshot};
//! use springtime_bind::slot::ReferenceList;
//! use springtime_bind::{BindOutcome, FieldTable};
//! use std::sync::Arc;
//!
//! struct Listener(&'static str);
//!
//! #[derive(Default, FieldTable)]
//! struct Dispatcher {
//!     listeners: ReferenceList<Arc<Listener>>,
//! }
//!
//! let component_type = ComponentType::from_table(Constructor::<Dispatcher>::from_default())
//!     .with_dependency(
//!         DependencyDescriptor::builder("listeners", Capability::of::<Listener>())
//!             .cardinality(Cardinality::OptionalMultiple)
//!             .policy(ReferencePolicy::Dynamic)
//!             .field("listeners")
//!             .build(),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let instance = component_type
//!     .construct(
//!         &ProviderSnapshot::new(),
//!         ComponentContext::new("dispatcher", Properties::new()),
//!     )
//!     .unwrap();
//!
//! let audit = ProviderHandle::for_service(1, Arc::new(Listener("audit")), Properties::new());
//! assert_eq!(instance.on_bind("listeners", &audit).unwrap(), BindOutcome::Applied);
//! assert_eq!(instance.instance().listeners.values()[0].0, "audit");
//! ```
//!
//! ### Features
//!
//! * `derive` - `#[derive(FieldTable)]` support (enabled by default)

pub mod binding;
pub mod component_type;
pub mod config;
pub mod construct;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod provider;
pub mod slot;
pub mod value;

pub use binding::{BindOutcome, TargetState};
pub use construct::{ComponentInstance, DependencyEvents};

#[cfg(feature = "derive")]
pub use springtime_bind_derive::FieldTable;
