use crate::error::IrError;
use crate::hierarchy::{ClassHierarchy, ClassHierarchyBuilder, MethodFlags};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Root of an XML program description.
///
/// ```xml
/// <program entry="Main.main">
///   <class name="A">
///     <field name="f" type="Object"/>
///     <method name="main" static="true">
///       <local name="x" type="A"/>
///       <new target="x" type="A"/>
///     </method>
///   </class>
/// </program>
/// ```
///
/// Method names must be unique within a class. Overloads, even with differing parameter
/// lists, are rejected with [`IrError::DuplicateMethod`]; an override in a subclass reuses
/// the name with the same parameter count.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename = "program")]
pub struct ProgramDecl {
    /// Qualified `Class.method` name of the entry point
    pub entry: String,
    #[serde(rename = "$value", default)]
    pub classes: Vec<ClassDecl>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    #[serde(default)]
    pub extends: Option<String>,
    /// Comma separated interface names
    #[serde(default)]
    pub implements: Option<String>,
    #[serde(default)]
    pub interface: bool,
    #[serde(rename = "$value", default)]
    pub members: Vec<ClassMember>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassMember {
    Field(FieldDecl),
    Method(MethodDecl),
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(rename = "static", default)]
    pub is_static: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MethodDecl {
    /// Unique within the declaring class
    pub name: String,
    /// Return type name; absent means `void`
    #[serde(default)]
    pub returns: Option<String>,
    #[serde(rename = "static", default)]
    pub is_static: bool,
    #[serde(rename = "native", default)]
    pub is_native: bool,
    #[serde(rename = "abstract", default)]
    pub is_abstract: bool,
    #[serde(rename = "$value", default)]
    pub items: Vec<MethodItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodItem {
    Param(ParamDecl),
    Local(LocalDecl),
    Catch(CatchDecl),
    New(StatementDecl),
    NewArray(StatementDecl),
    Copy(StatementDecl),
    Phi(StatementDecl),
    Load(StatementDecl),
    Store(StatementDecl),
    GetStatic(StatementDecl),
    PutStatic(StatementDecl),
    ALoad(StatementDecl),
    AStore(StatementDecl),
    Call(StatementDecl),
    Return(StatementDecl),
    Throw(StatementDecl),
    ClInit(StatementDecl),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub flow_sensitive: bool,
}

/// An exception handler. Handlers are tried in declaration order for every exception raised
/// in the method body.
#[derive(Debug, Clone, Deserialize)]
pub struct CatchDecl {
    #[serde(rename = "type")]
    pub ty: String,
    pub var: String,
}

/// Attributes shared by every statement element. Which ones are required depends on the
/// element; the loader reports a [`IrError::MissingAttribute`] for absent ones.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatementDecl {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    /// Comma separated operands of a `phi`
    #[serde(default)]
    pub sources: Option<String>,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(rename = "type", default)]
    pub ty: Option<String>,
    /// Array dimensions allocated by a `newarray`
    #[serde(default)]
    pub dims: Option<u8>,
    /// Qualified `Class.method` callee of a `call`
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub receiver: Option<String>,
    /// Comma separated actual arguments of a `call`
    #[serde(default)]
    pub args: Option<String>,
    /// `virtual` (default), `special` or `static`
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    /// Transfer control to the labelled statement instead of falling through
    #[serde(default)]
    pub jump: Option<String>,
    /// Transfer control to the labelled statement in addition to falling through
    #[serde(default)]
    pub branch: Option<String>,
}

impl StatementDecl {
    pub fn require<'a>(
        value: &'a Option<String>,
        element: &'static str,
        attribute: &'static str,
    ) -> Result<&'a str, IrError> {
        value
            .as_deref()
            .ok_or(IrError::MissingAttribute { element, attribute })
    }
}

/// Split a comma separated attribute, dropping empty entries.
pub fn split_list(list: &Option<String>) -> Vec<&str> {
    list.as_deref()
        .map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

impl MethodItem {
    pub fn statement(&self) -> Option<(&'static str, &StatementDecl)> {
        match self {
            MethodItem::Param(_) | MethodItem::Local(_) | MethodItem::Catch(_) => None,
            MethodItem::New(s) => Some(("new", s)),
            MethodItem::NewArray(s) => Some(("newarray", s)),
            MethodItem::Copy(s) => Some(("copy", s)),
            MethodItem::Phi(s) => Some(("phi", s)),
            MethodItem::Load(s) => Some(("load", s)),
            MethodItem::Store(s) => Some(("store", s)),
            MethodItem::GetStatic(s) => Some(("getstatic", s)),
            MethodItem::PutStatic(s) => Some(("putstatic", s)),
            MethodItem::ALoad(s) => Some(("aload", s)),
            MethodItem::AStore(s) => Some(("astore", s)),
            MethodItem::Call(s) => Some(("call", s)),
            MethodItem::Return(s) => Some(("return", s)),
            MethodItem::Throw(s) => Some(("throw", s)),
            MethodItem::ClInit(s) => Some(("clinit", s)),
        }
    }
}

impl MethodDecl {
    pub fn params(&self) -> impl Iterator<Item = &ParamDecl> {
        self.items.iter().filter_map(|i| match i {
            MethodItem::Param(p) => Some(p),
            _ => None,
        })
    }

    pub fn locals(&self) -> impl Iterator<Item = &LocalDecl> {
        self.items.iter().filter_map(|i| match i {
            MethodItem::Local(l) => Some(l),
            _ => None,
        })
    }

    pub fn catches(&self) -> impl Iterator<Item = &CatchDecl> {
        self.items.iter().filter_map(|i| match i {
            MethodItem::Catch(c) => Some(c),
            _ => None,
        })
    }

    pub fn statements(&self) -> impl Iterator<Item = (&'static str, &StatementDecl)> {
        self.items.iter().filter_map(MethodItem::statement)
    }
}

impl ClassDecl {
    pub fn fields(&self) -> impl Iterator<Item = &FieldDecl> {
        self.members.iter().filter_map(|m| match m {
            ClassMember::Field(f) => Some(f),
            _ => None,
        })
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodDecl> {
        self.members.iter().filter_map(|m| match m {
            ClassMember::Method(m) => Some(m),
            _ => None,
        })
    }
}

impl ProgramDecl {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, IrError> {
        Ok(serde_xml_rs::from_reader(reader)?)
    }

    pub fn parse(xml: &str) -> Result<Self, IrError> {
        Ok(serde_xml_rs::from_str(xml)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, IrError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Build the class hierarchy this program declares.
    ///
    /// Runs in three passes (names, supertypes, members) so classes may be declared in any
    /// order. Every type a method body mentions is resolved here as well so that array types
    /// exist before the hierarchy is frozen.
    pub fn build_hierarchy(&self) -> Result<ClassHierarchy, IrError> {
        let mut builder = ClassHierarchyBuilder::new();
        let mut ids = Vec::with_capacity(self.classes.len());
        for class in &self.classes {
            ids.push(builder.declare_class(&class.name, class.interface)?);
        }
        for (class, id) in self.classes.iter().zip(&ids) {
            if let Some(sup) = &class.extends {
                let sup = builder.resolve_type(sup)?;
                builder.set_superclass(*id, sup)?;
            }
            for iface in split_list(&class.implements) {
                let iface = builder.resolve_type(iface)?;
                builder.add_interface(*id, iface)?;
            }
        }
        for (class, id) in self.classes.iter().zip(&ids) {
            for field in class.fields() {
                let ty = builder.resolve_type(&field.ty)?;
                builder.add_field(*id, &field.name, ty, field.is_static)?;
            }
            for method in class.methods() {
                let params = method
                    .params()
                    .map(|p| builder.resolve_type(&p.ty))
                    .collect::<Result<Vec<_>, _>>()?;
                let returns = match method.returns.as_deref() {
                    None | Some("void") => None,
                    Some(r) => Some(builder.resolve_type(r)?),
                };
                builder.add_method(
                    *id,
                    &method.name,
                    params,
                    returns,
                    MethodFlags {
                        is_static: method.is_static,
                        is_native: method.is_native,
                        is_abstract: method.is_abstract,
                    },
                )?;
                for local in method.locals() {
                    builder.resolve_type(&local.ty)?;
                }
                for catch in method.catches() {
                    builder.resolve_type(&catch.ty)?;
                }
                for (element, stmt) in method.statements() {
                    if let Some(ty) = &stmt.ty {
                        let dims = match element {
                            "newarray" => stmt.dims.unwrap_or(1),
                            _ => 0,
                        };
                        resolve_with_dims(&mut builder, ty, dims)?;
                    }
                }
            }
        }
        tracing::debug!(classes = self.classes.len(), "built class hierarchy");
        Ok(builder.build())
    }
}

/// Resolve `ty` and, for a `newarray` of `dims` dimensions, every array type in between.
fn resolve_with_dims(
    builder: &mut ClassHierarchyBuilder,
    ty: &str,
    dims: u8,
) -> Result<(), IrError> {
    let mut name = ty.to_string();
    builder.resolve_type(&name)?;
    for _ in 0..dims {
        name.push_str("[]");
        builder.resolve_type(&name)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRAM: &str = r#"
<program entry="Main.main">
  <class name="A">
    <field name="f" type="Object"/>
    <method name="get" returns="Object">
      <local name="r" type="Object"/>
      <load target="r" base="this" field="f"/>
      <return source="r"/>
    </method>
  </class>
  <class name="B" extends="A"/>
  <class name="Main">
    <method name="main" static="true">
      <local name="a" type="A"/>
      <new target="a" type="B"/>
      <newarray target="arr" type="A" dims="2"/>
    </method>
  </class>
</program>
"#;

    #[test]
    fn test_parse_program() {
        let decl = ProgramDecl::parse(PROGRAM).unwrap();
        assert_eq!(decl.entry, "Main.main");
        assert_eq!(decl.classes.len(), 3);
        assert_eq!(decl.classes[1].extends.as_deref(), Some("A"));
        let get = decl.classes[0].methods().next().unwrap();
        assert_eq!(get.statements().count(), 2);
        assert_eq!(get.locals().count(), 1);
    }

    #[test]
    fn test_build_hierarchy_from_decl() {
        let decl = ProgramDecl::parse(PROGRAM).unwrap();
        let h = decl.build_hierarchy().unwrap();
        let a = h.lookup_type("A").unwrap();
        let b = h.lookup_type("B").unwrap();
        assert!(h.is_subtype(b, a));
        assert!(h.lookup_type("A[][]").is_some());
        assert!(h.lookup_type("A[]").is_some());
        let main = h.lookup_method("Main.main").unwrap();
        assert!(h.method(main).is_static);
    }

    #[test]
    fn test_overloaded_method_rejected() {
        let xml = r#"
<program entry="A.m">
  <class name="A">
    <method name="m" static="true"/>
    <method name="m" static="true">
      <param name="p" type="Object"/>
    </method>
  </class>
</program>
"#;
        let decl = ProgramDecl::parse(xml).unwrap();
        assert!(matches!(
            decl.build_hierarchy(),
            Err(IrError::DuplicateMethod(name)) if name == "A.m"
        ));
    }

    #[test]
    fn test_unknown_superclass() {
        let decl = ProgramDecl {
            entry: "A.main".to_string(),
            classes: vec![ClassDecl {
                name: "A".to_string(),
                extends: Some("Missing".to_string()),
                implements: None,
                interface: false,
                members: vec![],
            }],
        };
        assert!(matches!(
            decl.build_hierarchy(),
            Err(IrError::UnknownType(_))
        ));
    }
}
