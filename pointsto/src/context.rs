use crate::heap::AllocationSite;
use internment::ArcIntern;
use pointsto_ir::{MethodId, TypeId};
use std::fmt::{Display, Formatter};

/// A call site: the calling method and the site index of the call inside it.
///
/// Used as the merge key handed to a [`HeapAbstractionFactory`](crate::haf::HeapAbstractionFactory)
/// and as the label on call-graph edges.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct CallSiteLabel {
    pub caller: MethodId,
    pub site: u32,
}

impl Display for CallSiteLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "m{}@{}", self.caller.0, self.site)
    }
}

/// One link of a context chain. Which kinds appear, and in what order, is entirely up to the
/// policy that built the context.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum ContextElement {
    CallSite(CallSiteLabel),
    Allocation(AllocationSite),
    Type(TypeId),
}

impl Display for ContextElement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextElement::CallSite(c) => write!(f, "{c}"),
            ContextElement::Allocation(a) => write!(f, "{a}"),
            ContextElement::Type(t) => write!(f, "t{}", t.0),
        }
    }
}

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
struct ContextData(Vec<ContextElement>);

/// An analysis context: an immutable, hash-consed chain of [`ContextElement`]s.
///
/// Equal chains share one allocation, so cloning, hashing and comparing are all O(1).
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct Context(ArcIntern<ContextData>);

impl Context {
    pub fn empty() -> Self {
        Self(ArcIntern::new(ContextData(Vec::new())))
    }

    pub fn from_elements<I: IntoIterator<Item = ContextElement>>(elements: I) -> Self {
        Self(ArcIntern::new(ContextData(elements.into_iter().collect())))
    }

    pub fn elements(&self) -> &[ContextElement] {
        &self.0.0
    }

    pub fn len(&self) -> usize {
        self.0.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.0.is_empty()
    }

    /// `element` followed by this chain, keeping at most `limit` elements.
    pub fn push_truncated(&self, element: ContextElement, limit: usize) -> Self {
        Self::from_elements(
            std::iter::once(element)
                .chain(self.elements().iter().copied())
                .take(limit),
        )
    }

    /// The first `limit` elements of this chain.
    pub fn truncate(&self, limit: usize) -> Self {
        if self.len() <= limit {
            return self.clone();
        }
        Self::from_elements(self.elements().iter().copied().take(limit))
    }
}

impl Display for Context {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, e) in self.elements().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{e}")?;
        }
        write!(f, "]")
    }
}
