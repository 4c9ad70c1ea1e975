use crate::context::{CallSiteLabel, Context};
use crate::haf::HeapAbstractionFactory;
use crate::heap::{AllocationSite, InstanceKey, Recency};

/// Wraps a policy so each allocation produces its site's most recent object.
///
/// A flow-sensitive read sees a most recent object as its summary when the value may have
/// been carried past another run of the same allocation in the same context. Allocation
/// statements fold every field of the most recent object into the summary, so the summary
/// describes all objects ever allocated at the site in that context. Flow-insensitive
/// variables keep the most recent tag for every object the site produced.
#[derive(Debug, Clone)]
pub struct RecencyHeapAbstraction<H> {
    inner: H,
}

impl<H: HeapAbstractionFactory> RecencyHeapAbstraction<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

impl<H: HeapAbstractionFactory> HeapAbstractionFactory for RecencyHeapAbstraction<H> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn initial_context(&self) -> Context {
        self.inner.initial_context()
    }

    fn merge(
        &self,
        site: CallSiteLabel,
        receiver: Option<&InstanceKey>,
        caller: &Context,
    ) -> Context {
        // contexts never depend on the recency tag
        let untagged = receiver.map(|r| r.with_recency(Recency::Plain));
        self.inner.merge(site, untagged.as_ref(), caller)
    }

    fn record(&self, site: AllocationSite, context: &Context) -> InstanceKey {
        self.inner
            .record(site, context)
            .with_recency(Recency::MostRecent)
    }

    fn summary_of(&self, recent: &InstanceKey) -> Option<InstanceKey> {
        (recent.recency == Recency::MostRecent).then(|| recent.with_recency(Recency::Summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::haf::ObjectSensitive;
    use crate::heap::AllocationKind;
    use pointsto_ir::{MethodId, TypeId};

    #[test]
    fn test_recent_and_summary() {
        let haf = RecencyHeapAbstraction::new(ObjectSensitive {
            depth: 2,
            heap_depth: 1,
        });
        let site = AllocationSite {
            method: MethodId(0),
            site: 0,
            ty: TypeId(10),
            kind: AllocationKind::New,
        };
        let recent = haf.record(site, &Context::empty());
        assert_eq!(recent.recency, Recency::MostRecent);
        let summary = haf.summary_of(&recent).unwrap();
        assert_eq!(summary.recency, Recency::Summary);
        assert_eq!(summary.site, recent.site);
        assert!(haf.summary_of(&summary).is_none());

        let label = CallSiteLabel {
            caller: MethodId(0),
            site: 3,
        };
        assert_eq!(
            haf.merge(label, Some(&recent), &Context::empty()),
            haf.merge(label, Some(&summary), &Context::empty())
        );
    }
}
