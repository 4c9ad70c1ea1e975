use crate::config::AnalysisConfig;
use crate::context::{CallSiteLabel, Context, ContextElement};
use crate::haf::HeapAbstractionFactory;
use crate::heap::{AllocationSite, InstanceKey};
use crate::register_heap_abstraction;
use std::sync::Arc;

/// Object sensitivity: a method runs in the context of its receiver, i.e. the allocation site
/// of the receiver followed by the receiver's own heap context. Static calls stay in the
/// caller's context.
#[derive(Debug, Copy, Clone)]
pub struct ObjectSensitive {
    pub depth: usize,
    pub heap_depth: usize,
}

impl HeapAbstractionFactory for ObjectSensitive {
    fn name(&self) -> &'static str {
        "object"
    }

    fn merge(&self, _: CallSiteLabel, receiver: Option<&InstanceKey>, caller: &Context) -> Context {
        match receiver {
            Some(r) => r
                .context
                .push_truncated(ContextElement::Allocation(r.site), self.depth),
            None => caller.clone(),
        }
    }

    fn record(&self, site: AllocationSite, context: &Context) -> InstanceKey {
        InstanceKey::new(site, context.truncate(self.heap_depth))
    }
}

fn build(config: &AnalysisConfig) -> Arc<dyn HeapAbstractionFactory> {
    Arc::new(ObjectSensitive {
        depth: config.depth,
        heap_depth: config.heap_depth,
    })
}

register_heap_abstraction!(
    "object",
    "object sensitivity: receiver allocation-site chains",
    build
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::AllocationKind;
    use pointsto_ir::{MethodId, TypeId};

    #[test]
    fn test_receiver_chains() {
        let haf = ObjectSensitive {
            depth: 2,
            heap_depth: 1,
        };
        let label = CallSiteLabel {
            caller: MethodId(0),
            site: 4,
        };
        let outer_site = AllocationSite {
            method: MethodId(0),
            site: 1,
            ty: TypeId(10),
            kind: AllocationKind::New,
        };
        let outer = haf.record(outer_site, &haf.initial_context());
        let in_outer = haf.merge(label, Some(&outer), &Context::empty());
        assert_eq!(
            in_outer,
            Context::from_elements([ContextElement::Allocation(outer_site)])
        );

        let inner_site = AllocationSite {
            site: 2,
            ..outer_site
        };
        let inner = haf.record(inner_site, &in_outer);
        let in_inner = haf.merge(label, Some(&inner), &in_outer);
        assert_eq!(
            in_inner,
            Context::from_elements([
                ContextElement::Allocation(inner_site),
                ContextElement::Allocation(outer_site)
            ])
        );

        // static calls inherit
        assert_eq!(haf.merge(label, None, &in_inner), in_inner);
    }
}
