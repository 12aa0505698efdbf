//! Binding state of a single dependency of a single component instance.
//!
//! Each [DependencyBinding] tracks which providers are candidates for the dependency and which
//! are bound, and decides how a provider event affects the instance, according to the dependency
//! policy:
//!
//! * dynamic dependencies forward bound provider changes to their injection mechanism
//! * static dependencies never mutate the live instance after construction (apart from property
//!   updates allowed by [StaticUpdatePolicy::InPlace]) and answer with
//!   [BindOutcome::ReactivateRequired] instead
//!
//! Events for a single dependency are serialized by a per-dependency lock. Events for different
//! dependencies of the same instance run in parallel.

pub(crate) mod callback;
pub(crate) mod field;
pub(crate) mod mechanism;

use crate::binding::mechanism::InjectionMechanism;
use crate::component_type::ComponentType;
use crate::descriptor::{DependencyDescriptor, PolicyOption, StaticUpdatePolicy};
use crate::error::{BindingError, ConstructionError, ResolutionError};
use crate::provider::{ProviderHandle, ProviderId};
use fxhash::FxHashMap;
use itertools::Itertools;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Result of delivering a provider event to a dependency.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum BindOutcome {
    /// The instance state was updated.
    Applied,
    /// The instance cannot absorb the change and must be destroyed and constructed again.
    ReactivateRequired,
    /// Nothing observable changed.
    Ignored,
}

impl BindOutcome {
    /// Combines outcomes of multiple operations performed for a single event.
    pub fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::ReactivateRequired, _) | (_, Self::ReactivateRequired) => {
                Self::ReactivateRequired
            }
            (Self::Applied, _) | (_, Self::Applied) => Self::Applied,
            _ => Self::Ignored,
        }
    }
}

/// Resolution state of an injection target.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum TargetState {
    NotResolved,
    Resolved,
    /// Resolution failed permanently; events for the target are ignored.
    NotFound,
}

impl TargetState {
    pub(crate) fn combine(self, other: Self) -> Self {
        match (self, other) {
            (Self::NotFound, _) | (_, Self::NotFound) => Self::NotFound,
            (Self::NotResolved, _) | (_, Self::NotResolved) => Self::NotResolved,
            _ => Self::Resolved,
        }
    }
}

/// Value resolved at most once, even when first requested concurrently. Losing callers wait
/// for and reuse the result of the winner.
pub(crate) struct ResolveOnce<T> {
    cell: OnceCell<Result<T, ResolutionError>>,
}

impl<T> Default for ResolveOnce<T> {
    fn default() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }
}

impl<T> ResolveOnce<T> {
    pub(crate) fn get_or_resolve<F>(&self, resolve: F) -> Result<&T, &ResolutionError>
    where
        F: FnOnce() -> Result<T, ResolutionError>,
    {
        self.cell
            .get_or_init(|| {
                let result = resolve();
                if let Err(error) = &result {
                    error!(%error, "Cannot resolve injection target; its events will be ignored.");
                }

                result
            })
            .as_ref()
    }

    /// Returns the value if it was already resolved successfully.
    pub(crate) fn get(&self) -> Option<&T> {
        self.cell.get().and_then(|result| result.as_ref().ok())
    }

    pub(crate) fn state(&self) -> TargetState {
        match self.cell.get() {
            None => TargetState::NotResolved,
            Some(Ok(_)) => TargetState::Resolved,
            Some(Err(_)) => TargetState::NotFound,
        }
    }
}

#[derive(Default)]
struct BindingTracker {
    candidates: FxHashMap<ProviderId, ProviderHandle>,
    bound: FxHashMap<ProviderId, ProviderHandle>,
    disabled: bool,
}

impl BindingTracker {
    fn bound_unary(&self) -> Option<ProviderHandle> {
        self.bound.values().next().cloned()
    }

    fn best_candidate(&self) -> Option<ProviderHandle> {
        best(self.candidates.values())
    }
}

fn best<'a, I: IntoIterator<Item = &'a ProviderHandle>>(handles: I) -> Option<ProviderHandle> {
    handles
        .into_iter()
        .max_by(|first, second| first.precedence(second))
        .cloned()
}

pub(crate) struct DependencyBinding<C> {
    component: String,
    descriptor: Arc<DependencyDescriptor>,
    static_update: StaticUpdatePolicy,
    mechanism: Option<InjectionMechanism<C>>,
    tracker: Mutex<BindingTracker>,
}

impl<C: Send + Sync + 'static> DependencyBinding<C> {
    pub(crate) fn new(
        component_type: &Arc<ComponentType<C>>,
        descriptor: &Arc<DependencyDescriptor>,
    ) -> Self {
        Self {
            component: component_type.name().to_string(),
            descriptor: descriptor.clone(),
            static_update: descriptor
                .static_update()
                .unwrap_or(component_type.config().static_update),
            mechanism: InjectionMechanism::for_dependency(component_type, descriptor),
            tracker: Mutex::new(BindingTracker::default()),
        }
    }

    /// Binds providers known at construction time. Runs before the instance is reachable by any
    /// event.
    pub(crate) fn initialize(
        &self,
        component: &C,
        providers: &[ProviderHandle],
    ) -> Result<(), ConstructionError> {
        let mut tracker = self.tracker.lock();

        let accepted = providers
            .iter()
            .filter(|handle| self.descriptor.accepts(handle))
            .cloned()
            .collect_vec();

        tracker.candidates = accepted
            .iter()
            .map(|handle| (handle.id(), handle.clone()))
            .collect();

        let Some(mechanism) = &self.mechanism else {
            let initial = if self.is_multiple() {
                accepted
            } else {
                tracker.best_candidate().into_iter().collect_vec()
            };

            tracker.bound = initial
                .into_iter()
                .map(|handle| (handle.id(), handle))
                .collect();

            return Ok(());
        };

        if let Err(error) = mechanism.init(component) {
            tracker.disabled = true;

            if self.descriptor.cardinality().is_optional() {
                debug!(component = %self.component, dependency = self.descriptor.name(), "Optional dependency cannot be injected and will stay unbound.");
                return Ok(());
            }

            return Err(ConstructionError::UnresolvedTarget {
                dependency: self.descriptor.name().to_string(),
                error,
            });
        }

        if self.is_multiple() {
            for handle in &accepted {
                self.try_bind(&mut tracker, component, handle)
                    .map_err(ConstructionError::InitialBinding)?;
            }
        } else {
            self.bind_best(&mut tracker, component)
                .map_err(ConstructionError::InitialBinding)?;
        }

        if !self.descriptor.cardinality().is_optional() && tracker.bound.is_empty() {
            return Err(ConstructionError::UnsatisfiedDependency {
                component: self.component.clone(),
                dependency: self.descriptor.name().to_string(),
            });
        }

        Ok(())
    }

    pub(crate) fn on_bind(
        &self,
        component: &C,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError> {
        if !self.descriptor.accepts(handle) {
            debug!(component = %self.component, dependency = self.descriptor.name(), provider = %handle.id(), "Ignoring provider which does not qualify for the dependency.");
            return Ok(BindOutcome::Ignored);
        }

        let mut tracker = self.tracker.lock();
        self.bind_locked(&mut tracker, component, handle)
    }

    pub(crate) fn on_unbind(
        &self,
        component: &C,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError> {
        let mut tracker = self.tracker.lock();
        self.unbind_locked(&mut tracker, component, handle)
    }

    pub(crate) fn on_updated(
        &self,
        component: &C,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError> {
        let mut tracker = self.tracker.lock();
        let known = tracker.candidates.contains_key(&handle.id());

        match (known, self.descriptor.accepts(handle)) {
            (false, false) => Ok(BindOutcome::Ignored),
            (false, true) => self.bind_locked(&mut tracker, component, handle),
            (true, false) => self.unbind_locked(&mut tracker, component, handle),
            (true, true) => self.update_locked(&mut tracker, component, handle),
        }
    }

    /// Checks if the dependency currently has enough bound providers.
    pub(crate) fn is_satisfied(&self) -> bool {
        if self.descriptor.cardinality().is_optional() {
            return true;
        }

        let tracker = self.tracker.lock();
        !tracker.disabled && !tracker.bound.is_empty()
    }

    /// Returns bound providers, best first.
    pub(crate) fn bound_providers(&self) -> Vec<ProviderHandle> {
        self.tracker
            .lock()
            .bound
            .values()
            .sorted_by(|first, second| second.precedence(first))
            .cloned()
            .collect()
    }

    pub(crate) fn target_state(&self) -> Option<TargetState> {
        self.mechanism.as_ref().map(InjectionMechanism::state)
    }

    /// Unbinds all bound providers, best one last, and releases injected values.
    pub(crate) fn dispose(&self, component: &C) {
        let mut tracker = self.tracker.lock();
        if let Some(mechanism) = &self.mechanism {
            if !tracker.disabled {
                for handle in tracker
                    .bound
                    .values()
                    .sorted_by(|first, second| first.precedence(second))
                {
                    if let Err(error) = ignore_conversion(mechanism.unbind(component, handle)) {
                        warn!(component = %self.component, dependency = self.descriptor.name(), provider = %handle.id(), %error, "Cannot unbind provider from disposed instance.");
                    }
                }
            }

            mechanism.release(component);
        }

        tracker.candidates.clear();
        tracker.bound.clear();
    }

    fn bind_locked(
        &self,
        tracker: &mut BindingTracker,
        component: &C,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError> {
        let id = handle.id();
        if tracker.disabled || tracker.bound.contains_key(&id) {
            return Ok(BindOutcome::Ignored);
        }

        tracker.candidates.insert(id, handle.clone());

        if self.descriptor.is_static() {
            return Ok(self.static_arrival(tracker, handle));
        }

        match tracker.bound_unary() {
            Some(current) if !self.is_multiple() => {
                if self.preempts(handle, &current) {
                    self.swap(tracker, component, &current, handle)
                } else {
                    Ok(BindOutcome::Ignored)
                }
            }
            _ => self
                .try_bind(tracker, component, handle)
                .map(|outcome| outcome.unwrap_or(BindOutcome::Ignored)),
        }
    }

    fn unbind_locked(
        &self,
        tracker: &mut BindingTracker,
        component: &C,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError> {
        let id = handle.id();
        tracker.candidates.remove(&id);

        if tracker.disabled || tracker.bound.remove(&id).is_none() {
            return Ok(BindOutcome::Ignored);
        }

        if self.descriptor.is_static() {
            return Ok(self.reactivate("a bound provider departed"));
        }

        if self.is_multiple() {
            return self.forward_unbind(component, handle);
        }

        match self.bind_best(tracker, component)? {
            Some(outcome) => Ok(outcome.merge(self.forward_unbind(component, handle)?)),
            None => self.forward_unbind(component, handle),
        }
    }

    fn update_locked(
        &self,
        tracker: &mut BindingTracker,
        component: &C,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError> {
        if tracker.disabled {
            return Ok(BindOutcome::Ignored);
        }

        let id = handle.id();
        tracker.candidates.insert(id, handle.clone());

        let is_bound = tracker.bound.contains_key(&id);
        if is_bound {
            tracker.bound.insert(id, handle.clone());
        }

        if self.descriptor.is_static() {
            if !is_bound {
                return Ok(self.static_arrival(tracker, handle));
            }

            return match self.static_update {
                StaticUpdatePolicy::InPlace => self.forward_updated(component, handle),
                StaticUpdatePolicy::Reactivate if self.is_property_sensitive() => {
                    Ok(self.reactivate("bound provider properties changed"))
                }
                StaticUpdatePolicy::Reactivate => Ok(BindOutcome::Ignored),
            };
        }

        if !self.is_multiple() && self.descriptor.policy_option() == PolicyOption::Preemptive {
            if let (Some(current), Some(best)) = (tracker.bound_unary(), tracker.best_candidate())
            {
                if best.id() != current.id() {
                    let outcome = self.swap(tracker, component, &current, &best)?;
                    if !tracker.bound.contains_key(&current.id()) {
                        return Ok(outcome);
                    }
                }
            }
        }

        if is_bound {
            self.forward_updated(component, handle)
        } else {
            Ok(BindOutcome::Ignored)
        }
    }

    /// Decides what a newly qualifying provider means for a static dependency.
    fn static_arrival(&self, tracker: &BindingTracker, handle: &ProviderHandle) -> BindOutcome {
        let reactivate = self.is_multiple()
            || match tracker.bound_unary() {
                Some(current) => self.preempts(handle, &current),
                None => self.descriptor.policy_option() == PolicyOption::Preemptive,
            };

        if reactivate {
            self.reactivate("a better provider arrived")
        } else {
            debug!(component = %self.component, dependency = self.descriptor.name(), provider = %handle.id(), "Keeping static binding.");
            BindOutcome::Ignored
        }
    }

    /// Binds a new provider in place of the current one - the new one is bound before the old one
    /// is unbound. The current provider stays bound if the new one cannot be converted.
    fn swap(
        &self,
        tracker: &mut BindingTracker,
        component: &C,
        current: &ProviderHandle,
        replacement: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError> {
        let result = self.try_bind(tracker, component, replacement);
        if !matches!(result, Ok(None)) {
            tracker.bound.remove(&current.id());
        }

        match result? {
            Some(outcome) => Ok(outcome.merge(self.forward_unbind(component, current)?)),
            None => Ok(BindOutcome::Ignored),
        }
    }

    /// Forwards a provider to the mechanism and records it as bound. A provider which cannot be
    /// converted stays unbound and yields [None].
    fn try_bind(
        &self,
        tracker: &mut BindingTracker,
        component: &C,
        handle: &ProviderHandle,
    ) -> Result<Option<BindOutcome>, BindingError> {
        match self.forward_bind(component, handle) {
            Err(BindingError::ConversionFailed { .. }) => {
                debug!(component = %self.component, dependency = self.descriptor.name(), provider = %handle.id(), "Provider cannot be injected and stays unbound.");
                Ok(None)
            }
            result => {
                tracker.bound.insert(handle.id(), handle.clone());
                result.map(Some)
            }
        }
    }

    /// Binds the best candidate which can be injected, falling back to worse ones.
    fn bind_best(
        &self,
        tracker: &mut BindingTracker,
        component: &C,
    ) -> Result<Option<BindOutcome>, BindingError> {
        let candidates = tracker
            .candidates
            .values()
            .sorted_by(|first, second| second.precedence(first))
            .cloned()
            .collect_vec();

        for candidate in &candidates {
            if let Some(outcome) = self.try_bind(tracker, component, candidate)? {
                return Ok(Some(outcome));
            }
        }

        Ok(None)
    }

    fn reactivate(&self, reason: &str) -> BindOutcome {
        debug!(component = %self.component, dependency = self.descriptor.name(), reason, "Static dependency changed; instance requires reactivation.");
        BindOutcome::ReactivateRequired
    }

    #[inline]
    fn preempts(&self, handle: &ProviderHandle, current: &ProviderHandle) -> bool {
        self.descriptor.policy_option() == PolicyOption::Preemptive
            && handle.precedence(current) == Ordering::Greater
    }

    #[inline]
    fn is_multiple(&self) -> bool {
        self.descriptor.cardinality().is_multiple()
    }

    fn is_property_sensitive(&self) -> bool {
        self.mechanism
            .as_ref()
            .map(InjectionMechanism::is_property_sensitive)
            .unwrap_or(false)
    }

    fn forward_bind(
        &self,
        component: &C,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError> {
        self.mechanism
            .as_ref()
            .map(|mechanism| mechanism.bind(component, handle))
            .unwrap_or(Ok(BindOutcome::Applied))
    }

    fn forward_unbind(
        &self,
        component: &C,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError> {
        self.mechanism
            .as_ref()
            .map(|mechanism| ignore_conversion(mechanism.unbind(component, handle)))
            .unwrap_or(Ok(BindOutcome::Applied))
    }

    fn forward_updated(
        &self,
        component: &C,
        handle: &ProviderHandle,
    ) -> Result<BindOutcome, BindingError> {
        self.mechanism
            .as_ref()
            .map(|mechanism| ignore_conversion(mechanism.updated(component, handle)))
            .unwrap_or(Ok(BindOutcome::Applied))
    }
}

#[inline]
fn ignore_conversion(
    result: Result<BindOutcome, BindingError>,
) -> Result<BindOutcome, BindingError> {
    match result {
        Err(BindingError::ConversionFailed { .. }) => Ok(BindOutcome::Ignored),
        result => result,
    }
}
