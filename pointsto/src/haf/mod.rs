//! Heap abstraction policies: how calling contexts and abstract objects are formed.
//!
//! A [`HeapAbstractionFactory`] decides the context sensitivity of the whole analysis. The
//! solver only ever talks to it through [`HeapAbstraction`], which can optionally check that
//! the policy behaves as a pure function.

mod call_site;
mod insensitive;
mod object;
mod recency;
mod registry;

pub use call_site::CallSiteSensitive;
pub use insensitive::Insensitive;
pub use object::ObjectSensitive;
pub use recency::RecencyHeapAbstraction;
pub use registry::{HafFactory, heap_abstraction, lookup_policy, policies};

use crate::context::{CallSiteLabel, Context};
use crate::error::AnalysisError;
use crate::heap::{AllocationSite, InstanceKey, Recency};
use std::fmt::{Debug, Display};
use std::sync::Arc;

/// A context-sensitivity policy.
///
/// Every method must be a pure function of its arguments: the node universe stays finite only
/// because equal inputs produce equal (and therefore shared) contexts and objects. A policy
/// that keeps inventing new contexts for a finite program will not terminate.
pub trait HeapAbstractionFactory: Send + Sync + Debug {
    /// Registered name of this policy.
    fn name(&self) -> &'static str;

    /// Context of the entry point, of class initializers, and of every singleton variable.
    fn initial_context(&self) -> Context {
        Context::empty()
    }

    /// The callee context for a call from `caller` at `site`. `receiver` is `None` for
    /// static calls.
    fn merge(&self, site: CallSiteLabel, receiver: Option<&InstanceKey>, caller: &Context)
    -> Context;

    /// The abstract object allocated at `site` while analyzing in `context`.
    fn record(&self, site: AllocationSite, context: &Context) -> InstanceKey;

    /// The object that summarizes every older allocation represented by `recent`, for
    /// policies that tell the two apart.
    fn summary_of(&self, _recent: &InstanceKey) -> Option<InstanceKey> {
        None
    }
}

impl<T: HeapAbstractionFactory + ?Sized> HeapAbstractionFactory for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn initial_context(&self) -> Context {
        (**self).initial_context()
    }

    fn merge(
        &self,
        site: CallSiteLabel,
        receiver: Option<&InstanceKey>,
        caller: &Context,
    ) -> Context {
        (**self).merge(site, receiver, caller)
    }

    fn record(&self, site: AllocationSite, context: &Context) -> InstanceKey {
        (**self).record(site, context)
    }

    fn summary_of(&self, recent: &InstanceKey) -> Option<InstanceKey> {
        (**self).summary_of(recent)
    }
}

/// The policy a solver runs with, plus whether its answers are double-checked.
#[derive(Debug, Clone)]
pub struct HeapAbstraction {
    policy: Arc<dyn HeapAbstractionFactory>,
    verify: bool,
}

impl HeapAbstraction {
    pub fn new(policy: Arc<dyn HeapAbstractionFactory>, verify: bool) -> Self {
        Self { policy, verify }
    }

    pub fn name(&self) -> &'static str {
        self.policy.name()
    }

    pub fn initial_context(&self) -> Context {
        self.policy.initial_context()
    }

    pub fn merge(
        &self,
        site: CallSiteLabel,
        receiver: Option<&InstanceKey>,
        caller: &Context,
        origin: &dyn Display,
    ) -> Result<Context, AnalysisError> {
        let context = self.policy.merge(site, receiver, caller);
        if self.verify {
            let again = self.policy.merge(site, receiver, caller);
            if again != context {
                return Err(self.impure(
                    format!("merge at {site} returned {context} then {again}"),
                    origin,
                    caller,
                ));
            }
        }
        Ok(context)
    }

    pub fn record(
        &self,
        site: AllocationSite,
        context: &Context,
        origin: &dyn Display,
    ) -> Result<InstanceKey, AnalysisError> {
        let object = self.policy.record(site, context);
        if self.verify {
            let again = self.policy.record(site, context);
            if again != object {
                return Err(self.impure(
                    format!("record of {site} returned {object} then {again}"),
                    origin,
                    context,
                ));
            }
        }
        Ok(object)
    }

    pub fn summary_of(&self, recent: &InstanceKey) -> Option<InstanceKey> {
        self.policy.summary_of(recent)
    }

    /// Whether running `object`'s allocation site again in `context` would produce `object`
    /// and so turn the current one into part of its summary.
    pub fn is_recent_in(&self, object: &InstanceKey, context: &Context) -> bool {
        object.recency == Recency::MostRecent && self.policy.record(object.site, context) == *object
    }

    fn impure(&self, detail: String, origin: &dyn Display, context: &Context) -> AnalysisError {
        AnalysisError::ImpurePolicy {
            policy: self.policy.name(),
            detail,
            statement: origin.to_string(),
            context: context.to_string(),
        }
    }
}
