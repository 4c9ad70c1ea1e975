use crate::context::Context;
use pointsto_ir::{MethodId, TypeId};
use std::fmt::{Display, Formatter};

/// How an allocation site came to exist.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum AllocationKind {
    /// An explicit `new` or the outermost array of a `newarray`
    New,
    /// The array allocated for dimension `n` (counted from 1) of a multi-dimensional `newarray`
    Dimension(u8),
    /// The copy made by a native `clone()` call at this site
    Clone,
}

/// A place in the program where objects are created.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub struct AllocationSite {
    pub method: MethodId,
    pub site: u32,
    /// Concrete type of every object allocated here
    pub ty: TypeId,
    pub kind: AllocationKind,
}

impl Display for AllocationSite {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            AllocationKind::New => write!(f, "new t{}@m{}:{}", self.ty.0, self.method.0, self.site),
            AllocationKind::Dimension(d) => {
                write!(f, "new t{}@m{}:{}#{}", self.ty.0, self.method.0, self.site, d)
            }
            AllocationKind::Clone => {
                write!(f, "clone t{}@m{}:{}", self.ty.0, self.method.0, self.site)
            }
        }
    }
}

/// Recency tag of an abstract object.
#[derive(Debug, Default, Copy, Clone, Hash, Eq, PartialEq)]
pub enum Recency {
    /// Recency refinement is off
    #[default]
    Plain,
    /// The object most recently allocated at its site in its context
    MostRecent,
    /// Every older object allocated at the site in the context
    Summary,
}

/// An abstract heap object: an allocation site qualified by a heap context.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct InstanceKey {
    pub site: AllocationSite,
    pub context: Context,
    pub recency: Recency,
}

impl InstanceKey {
    pub fn new(site: AllocationSite, context: Context) -> Self {
        Self {
            site,
            context,
            recency: Recency::Plain,
        }
    }

    pub fn ty(&self) -> TypeId {
        self.site.ty
    }

    pub fn with_recency(&self, recency: Recency) -> Self {
        Self {
            recency,
            ..self.clone()
        }
    }
}

impl Display for InstanceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} in {}", self.site, self.context)?;
        match self.recency {
            Recency::Plain => Ok(()),
            Recency::MostRecent => write!(f, " (recent)"),
            Recency::Summary => write!(f, " (summary)"),
        }
    }
}

/// Dense id of an interned [`InstanceKey`].
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ObjectId(pub u32);
