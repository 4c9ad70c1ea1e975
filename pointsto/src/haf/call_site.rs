use crate::config::AnalysisConfig;
use crate::context::{CallSiteLabel, Context, ContextElement};
use crate::haf::HeapAbstractionFactory;
use crate::heap::{AllocationSite, InstanceKey};
use crate::register_heap_abstraction;
use std::sync::Arc;

/// k-limited call strings (k-CFA). Objects are qualified by the allocating context cut down
/// to `heap_depth` call sites.
#[derive(Debug, Copy, Clone)]
pub struct CallSiteSensitive {
    pub depth: usize,
    pub heap_depth: usize,
}

impl HeapAbstractionFactory for CallSiteSensitive {
    fn name(&self) -> &'static str {
        "call-site"
    }

    fn merge(&self, site: CallSiteLabel, _: Option<&InstanceKey>, caller: &Context) -> Context {
        caller.push_truncated(ContextElement::CallSite(site), self.depth)
    }

    fn record(&self, site: AllocationSite, context: &Context) -> InstanceKey {
        InstanceKey::new(site, context.truncate(self.heap_depth))
    }
}

fn build(config: &AnalysisConfig) -> Arc<dyn HeapAbstractionFactory> {
    Arc::new(CallSiteSensitive {
        depth: config.depth,
        heap_depth: config.heap_depth,
    })
}

register_heap_abstraction!(
    "call-site",
    "k-limited call strings; objects keep the innermost call sites",
    build
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::AllocationKind;
    use pointsto_ir::{MethodId, TypeId};

    fn label(site: u32) -> CallSiteLabel {
        CallSiteLabel {
            caller: MethodId(1),
            site,
        }
    }

    #[test]
    fn test_call_strings_are_k_limited() {
        let haf = CallSiteSensitive {
            depth: 2,
            heap_depth: 1,
        };
        let c1 = haf.merge(label(1), None, &haf.initial_context());
        let c2 = haf.merge(label(2), None, &c1);
        let c3 = haf.merge(label(3), None, &c2);
        assert_eq!(c2.len(), 2);
        assert_eq!(
            c3,
            Context::from_elements([
                ContextElement::CallSite(label(3)),
                ContextElement::CallSite(label(2))
            ])
        );
        let site = AllocationSite {
            method: MethodId(1),
            site: 0,
            ty: TypeId(10),
            kind: AllocationKind::New,
        };
        let obj = haf.record(site, &c3);
        assert_eq!(obj.context, c3.truncate(1));
        assert_eq!(obj, haf.record(site, &c3));
    }
}
