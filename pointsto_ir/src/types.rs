use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Index of a type inside a [`ClassHierarchy`](crate::ClassHierarchy).
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TypeId(pub u32);

/// Index of a method inside a [`ClassHierarchy`](crate::ClassHierarchy).
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct MethodId(pub u32);

/// Index of a field inside a [`ClassHierarchy`](crate::ClassHierarchy).
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct FieldId(pub u32);

impl TypeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl MethodId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl FieldId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum PrimitiveType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveType {
    pub const ALL: [PrimitiveType; 8] = [
        PrimitiveType::Boolean,
        PrimitiveType::Byte,
        PrimitiveType::Char,
        PrimitiveType::Short,
        PrimitiveType::Int,
        PrimitiveType::Long,
        PrimitiveType::Float,
        PrimitiveType::Double,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Byte => "byte",
            PrimitiveType::Char => "char",
            PrimitiveType::Short => "short",
            PrimitiveType::Int => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
        }
    }
}

/// The structural part of a class or interface declaration.
#[derive(Debug, Clone, Default)]
pub struct ClassInfo {
    pub superclass: Option<TypeId>,
    pub interfaces: Vec<TypeId>,
    pub is_interface: bool,
    /// Fields declared directly on this class, static and instance alike
    pub fields: Vec<FieldId>,
    /// Methods declared directly on this class
    pub methods: Vec<MethodId>,
    pub class_initializer: Option<MethodId>,
}

#[derive(Debug, Clone)]
pub enum TypeKind {
    Primitive(PrimitiveType),
    Class(ClassInfo),
    Array { element: TypeId },
}

#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub name: String,
    pub kind: TypeKind,
}

impl TypeInfo {
    pub fn is_reference(&self) -> bool {
        !matches!(self.kind, TypeKind::Primitive(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, TypeKind::Array { .. })
    }

    pub fn class_info(&self) -> Option<&ClassInfo> {
        match &self.kind {
            TypeKind::Class(info) => Some(info),
            _ => None,
        }
    }

    pub fn element(&self) -> Option<TypeId> {
        match self.kind {
            TypeKind::Array { element } => Some(element),
            _ => None,
        }
    }
}

/// The part of a method signature that virtual dispatch matches on.
///
/// A class declares at most one method per name, so the name alone picks the method and
/// the arity only has to agree with it. Overloading is not supported: the program
/// description refers to methods as `Class.name` without parameter types.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Selector {
    pub name: String,
    pub arity: usize,
}

impl Selector {
    pub fn new<S: Into<String>>(name: S, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
        }
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}

#[derive(Debug, Clone)]
pub struct Method {
    pub id: MethodId,
    pub declaring: TypeId,
    pub name: String,
    /// Parameter types, not counting the receiver
    pub params: Vec<TypeId>,
    pub returns: Option<TypeId>,
    pub is_static: bool,
    pub is_native: bool,
    pub is_abstract: bool,
}

impl Method {
    pub fn selector(&self) -> Selector {
        Selector::new(self.name.clone(), self.params.len())
    }

    pub fn is_class_initializer(&self) -> bool {
        self.is_static && self.name == crate::CLASS_INITIALIZER
    }
}

#[derive(Debug, Clone)]
pub struct Field {
    pub id: FieldId,
    pub declaring: TypeId,
    pub name: String,
    pub ty: TypeId,
    pub is_static: bool,
}
