pub mod decl;
pub(crate) mod error;
pub(crate) mod hierarchy;
pub(crate) mod types;

pub use decl::ProgramDecl;
pub use error::IrError;
pub use hierarchy::{ClassHierarchy, ClassHierarchyBuilder, MethodFlags};
pub use types::{
    ClassInfo, Field, FieldId, Method, MethodId, PrimitiveType, Selector, TypeId, TypeInfo,
    TypeKind,
};

/// Name of the root class every reference type is assignable to.
pub const OBJECT: &str = "Object";
/// Name of the root of every exception type.
pub const THROWABLE: &str = "Throwable";
/// Method name reserved for static class initializers.
pub const CLASS_INITIALIZER: &str = "<clinit>";
