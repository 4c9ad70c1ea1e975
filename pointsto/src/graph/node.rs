use crate::heap::ObjectId;
use crate::program_point::ProgramPoint;
use crate::variable::ReferenceVariableReplica;
use pointsto_ir::{FieldId, TypeId};
use std::fmt::{Display, Formatter};

/// Which slot of an object a field node stands for.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum FieldKey {
    Named(FieldId),
    /// Every element of an array, merged
    ArrayContents,
}

/// `object.field`, qualified by the field's declared type.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub struct ObjectField {
    pub object: ObjectId,
    pub field: FieldKey,
    pub ty: TypeId,
}

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum GraphNode {
    Local(ReferenceVariableReplica),
    /// A flow-sensitive variable as written at one program point
    LocalAt(ReferenceVariableReplica, ProgramPoint),
    Field(ObjectField),
}

impl Display for GraphNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphNode::Local(r) => write!(f, "{r}"),
            GraphNode::LocalAt(r, p) => write!(f, "{r} at {p}"),
            GraphNode::Field(o) => match o.field {
                FieldKey::Named(id) => write!(f, "o{}.f{}", o.object.0, id.0),
                FieldKey::ArrayContents => write!(f, "o{}[]", o.object.0),
            },
        }
    }
}

/// Dense id of an interned [`GraphNode`].
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct NodeId(pub u32);
