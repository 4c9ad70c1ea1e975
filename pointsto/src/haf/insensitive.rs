use crate::config::AnalysisConfig;
use crate::context::{CallSiteLabel, Context};
use crate::haf::HeapAbstractionFactory;
use crate::heap::{AllocationSite, InstanceKey};
use crate::register_heap_abstraction;
use std::sync::Arc;

/// One context for everything: each allocation site is a single abstract object.
#[derive(Debug, Default, Copy, Clone)]
pub struct Insensitive;

impl HeapAbstractionFactory for Insensitive {
    fn name(&self) -> &'static str {
        "insensitive"
    }

    fn merge(&self, _: CallSiteLabel, _: Option<&InstanceKey>, _: &Context) -> Context {
        Context::empty()
    }

    fn record(&self, site: AllocationSite, _: &Context) -> InstanceKey {
        InstanceKey::new(site, Context::empty())
    }
}

fn build(_: &AnalysisConfig) -> Arc<dyn HeapAbstractionFactory> {
    Arc::new(Insensitive)
}

register_heap_abstraction!(
    "insensitive",
    "context-insensitive: one context, one object per allocation site",
    build
);
