use crate::error::IrError;
use crate::types::{
    ClassInfo, Field, FieldId, Method, MethodId, PrimitiveType, Selector, TypeId, TypeInfo,
    TypeKind,
};
use crate::{CLASS_INITIALIZER, OBJECT, THROWABLE};
use std::collections::{HashMap, HashSet, VecDeque};

/// Flags for [`ClassHierarchyBuilder::add_method`].
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct MethodFlags {
    pub is_static: bool,
    pub is_native: bool,
    pub is_abstract: bool,
}

/// Mutable, build-phase view of a class hierarchy.
///
/// Every builder starts out with the primitive types, the root class `Object`
/// (which declares the native `clone()`), and `Throwable`. Calling
/// [`build`](ClassHierarchyBuilder::build) consumes the builder; the resulting
/// [`ClassHierarchy`] can no longer change.
#[derive(Debug)]
pub struct ClassHierarchyBuilder {
    types: Vec<TypeInfo>,
    by_name: HashMap<String, TypeId>,
    methods: Vec<Method>,
    fields: Vec<Field>,
    object: TypeId,
    throwable: TypeId,
    clone: MethodId,
}

impl Default for ClassHierarchyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassHierarchyBuilder {
    pub fn new() -> Self {
        let mut builder = Self {
            types: Vec::new(),
            by_name: HashMap::new(),
            methods: Vec::new(),
            fields: Vec::new(),
            object: TypeId(0),
            throwable: TypeId(0),
            clone: MethodId(0),
        };
        for p in PrimitiveType::ALL {
            builder.push_type(p.name().to_string(), TypeKind::Primitive(p));
        }
        builder.object =
            builder.push_type(OBJECT.to_string(), TypeKind::Class(ClassInfo::default()));
        builder.throwable = builder.push_type(
            THROWABLE.to_string(),
            TypeKind::Class(ClassInfo {
                superclass: Some(builder.object),
                ..Default::default()
            }),
        );
        let object = builder.object;
        builder.clone = builder.push_method(Method {
            id: MethodId(0),
            declaring: object,
            name: "clone".to_string(),
            params: vec![],
            returns: Some(object),
            is_static: false,
            is_native: true,
            is_abstract: false,
        });
        builder
    }

    pub fn object(&self) -> TypeId {
        self.object
    }

    pub fn throwable(&self) -> TypeId {
        self.throwable
    }

    fn push_type(&mut self, name: String, kind: TypeKind) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.types.push(TypeInfo { name, kind });
        id
    }

    fn push_method(&mut self, mut method: Method) -> MethodId {
        let id = MethodId(self.methods.len() as u32);
        method.id = id;
        if let TypeKind::Class(info) = &mut self.types[method.declaring.index()].kind {
            info.methods.push(id);
            if method.is_class_initializer() {
                info.class_initializer = Some(id);
            }
        }
        self.methods.push(method);
        id
    }

    fn class_info_mut(&mut self, ty: TypeId) -> Result<&mut ClassInfo, IrError> {
        let info = &mut self.types[ty.index()];
        match &mut info.kind {
            TypeKind::Class(c) => Ok(c),
            _ => Err(IrError::UnknownType(info.name.clone())),
        }
    }

    /// Declare a new class or interface. Its supertypes are attached separately so that
    /// declarations may reference classes that appear later in the program description.
    pub fn declare_class(&mut self, name: &str, is_interface: bool) -> Result<TypeId, IrError> {
        if self.by_name.contains_key(name) {
            return Err(IrError::DuplicateClass(name.to_string()));
        }
        if name.ends_with("[]") || name.is_empty() {
            return Err(IrError::MalformedType(name.to_string()));
        }
        Ok(self.push_type(
            name.to_string(),
            TypeKind::Class(ClassInfo {
                is_interface,
                ..Default::default()
            }),
        ))
    }

    pub fn set_superclass(&mut self, ty: TypeId, superclass: TypeId) -> Result<(), IrError> {
        let valid = self.types[superclass.index()]
            .class_info()
            .is_some_and(|c| !c.is_interface);
        if !valid {
            return Err(IrError::InvalidSuperclass(
                self.types[superclass.index()].name.clone(),
            ));
        }
        self.class_info_mut(ty)?.superclass = Some(superclass);
        Ok(())
    }

    pub fn add_interface(&mut self, ty: TypeId, interface: TypeId) -> Result<(), IrError> {
        if self.types[interface.index()].class_info().is_none() {
            return Err(IrError::InvalidSuperclass(
                self.types[interface.index()].name.clone(),
            ));
        }
        self.class_info_mut(ty)?.interfaces.push(interface);
        Ok(())
    }

    pub fn add_field(
        &mut self,
        class: TypeId,
        name: &str,
        ty: TypeId,
        is_static: bool,
    ) -> Result<FieldId, IrError> {
        let id = FieldId(self.fields.len() as u32);
        let duplicate = self.class_info_mut(class)?.fields.clone();
        if duplicate.iter().any(|f| self.fields[f.index()].name == name) {
            return Err(IrError::DuplicateField {
                class: self.types[class.index()].name.clone(),
                field: name.to_string(),
            });
        }
        self.class_info_mut(class)?.fields.push(id);
        self.fields.push(Field {
            id,
            declaring: class,
            name: name.to_string(),
            ty,
            is_static,
        });
        Ok(id)
    }

    pub fn add_method(
        &mut self,
        class: TypeId,
        name: &str,
        params: Vec<TypeId>,
        returns: Option<TypeId>,
        flags: MethodFlags,
    ) -> Result<MethodId, IrError> {
        let existing = self.class_info_mut(class)?.methods.clone();
        if existing.iter().any(|m| self.methods[m.index()].name == name) {
            return Err(IrError::DuplicateMethod(format!(
                "{}.{}",
                self.types[class.index()].name,
                name
            )));
        }
        Ok(self.push_method(Method {
            id: MethodId(0),
            declaring: class,
            name: name.to_string(),
            params,
            returns,
            is_static: flags.is_static || name == CLASS_INITIALIZER,
            is_native: flags.is_native,
            is_abstract: flags.is_abstract,
        }))
    }

    /// Resolve a type by name, creating array types on demand.
    ///
    /// `A[][]` resolves `A` and then wraps it twice. Class names must already be declared.
    pub fn resolve_type(&mut self, name: &str) -> Result<TypeId, IrError> {
        let name = name.trim();
        if let Some(id) = self.by_name.get(name) {
            return Ok(*id);
        }
        if let Some(inner) = name.strip_suffix("[]") {
            if inner.is_empty() {
                return Err(IrError::MalformedType(name.to_string()));
            }
            let element = self.resolve_type(inner)?;
            return Ok(self.push_type(name.to_string(), TypeKind::Array { element }));
        }
        if name.contains('[') || name.contains(']') || name.is_empty() {
            return Err(IrError::MalformedType(name.to_string()));
        }
        Err(IrError::UnknownType(name.to_string()))
    }

    pub fn lookup_type(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    /// Freeze the hierarchy. Classes without an explicit superclass extend `Object`.
    pub fn build(mut self) -> ClassHierarchy {
        let object = self.object;
        for (idx, info) in self.types.iter_mut().enumerate() {
            if let TypeKind::Class(c) = &mut info.kind {
                if idx != object.index() && c.superclass.is_none() {
                    c.superclass = Some(object);
                }
            }
        }
        let supertypes = (0..self.types.len())
            .map(|idx| compute_supertypes(&self.types, TypeId(idx as u32), object))
            .collect();
        ClassHierarchy {
            types: self.types,
            by_name: self.by_name,
            methods: self.methods,
            fields: self.fields,
            supertypes,
            object,
            throwable: self.throwable,
            clone: self.clone,
        }
    }
}

/// Reflexive-transitive class supertypes. Arrays are handled structurally in
/// [`ClassHierarchy::is_subtype`] and only record `Object` here.
fn compute_supertypes(types: &[TypeInfo], ty: TypeId, object: TypeId) -> HashSet<TypeId> {
    let mut seen = HashSet::new();
    seen.insert(ty);
    match &types[ty.index()].kind {
        TypeKind::Primitive(_) => {}
        TypeKind::Array { .. } => {
            seen.insert(object);
        }
        TypeKind::Class(_) => {
            let mut queue = VecDeque::from([ty]);
            while let Some(next) = queue.pop_front() {
                if let TypeKind::Class(c) = &types[next.index()].kind {
                    for sup in c.superclass.iter().chain(c.interfaces.iter()) {
                        if seen.insert(*sup) {
                            queue.push_back(*sup);
                        }
                    }
                }
            }
            seen.insert(object);
        }
    }
    seen
}

/// An immutable class hierarchy: the type universe the solver dispatches and filters against.
#[derive(Debug)]
pub struct ClassHierarchy {
    types: Vec<TypeInfo>,
    by_name: HashMap<String, TypeId>,
    methods: Vec<Method>,
    fields: Vec<Field>,
    supertypes: Vec<HashSet<TypeId>>,
    object: TypeId,
    throwable: TypeId,
    clone: MethodId,
}

impl ClassHierarchy {
    pub fn object(&self) -> TypeId {
        self.object
    }

    pub fn throwable(&self) -> TypeId {
        self.throwable
    }

    /// The native `Object.clone()` method, which has no body to analyze.
    pub fn clone_method(&self) -> MethodId {
        self.clone
    }

    pub fn is_native_clone(&self, method: MethodId) -> bool {
        method == self.clone
    }

    pub fn type_info(&self, ty: TypeId) -> &TypeInfo {
        &self.types[ty.index()]
    }

    pub fn type_name(&self, ty: TypeId) -> &str {
        &self.types[ty.index()].name
    }

    pub fn lookup_type(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name.trim()).copied()
    }

    pub fn types(&self) -> impl Iterator<Item = TypeId> + '_ {
        (0..self.types.len()).map(|i| TypeId(i as u32))
    }

    pub fn is_reference(&self, ty: TypeId) -> bool {
        self.types[ty.index()].is_reference()
    }

    pub fn is_array(&self, ty: TypeId) -> bool {
        self.types[ty.index()].is_array()
    }

    pub fn element_type(&self, ty: TypeId) -> Option<TypeId> {
        self.types[ty.index()].element()
    }

    pub fn method(&self, id: MethodId) -> &Method {
        &self.methods[id.index()]
    }

    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.methods.iter()
    }

    pub fn field(&self, id: FieldId) -> &Field {
        &self.fields[id.index()]
    }

    /// Look a method up by its qualified `Class.name` form.
    pub fn lookup_method(&self, qualified: &str) -> Result<MethodId, IrError> {
        let (class, name) = qualified
            .rsplit_once('.')
            .ok_or_else(|| IrError::UnknownMethod(qualified.to_string()))?;
        let ty = self
            .lookup_type(class)
            .ok_or_else(|| IrError::UnknownMethod(qualified.to_string()))?;
        self.types[ty.index()]
            .class_info()
            .and_then(|c| {
                c.methods
                    .iter()
                    .copied()
                    .find(|m| self.methods[m.index()].name == name)
            })
            .ok_or_else(|| IrError::UnknownMethod(qualified.to_string()))
    }

    /// Find the field `name` visible from `class`, searching superclasses.
    pub fn lookup_field(&self, class: TypeId, name: &str) -> Result<FieldId, IrError> {
        let mut current = Some(class);
        while let Some(ty) = current {
            let Some(info) = self.types[ty.index()].class_info() else {
                break;
            };
            if let Some(f) = info
                .fields
                .iter()
                .copied()
                .find(|f| self.fields[f.index()].name == name)
            {
                return Ok(f);
            }
            current = info.superclass;
        }
        Err(IrError::UnknownField {
            class: self.type_name(class).to_string(),
            field: name.to_string(),
        })
    }

    /// Is `sub` assignable to `sup`?
    pub fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        if sub == sup {
            return true;
        }
        match (&self.types[sub.index()].kind, &self.types[sup.index()].kind) {
            (TypeKind::Primitive(_), _) | (_, TypeKind::Primitive(_)) => false,
            (TypeKind::Array { element: a }, TypeKind::Array { element: b }) => {
                self.is_reference(*a) && self.is_reference(*b) && self.is_subtype(*a, *b)
            }
            _ => self.supertypes[sub.index()].contains(&sup),
        }
    }

    /// Virtual dispatch: the concrete method a receiver of runtime type `receiver` runs for
    /// `selector`. Arrays dispatch through `Object`.
    pub fn resolve_method(&self, receiver: TypeId, selector: &Selector) -> Option<MethodId> {
        let mut current = match self.types[receiver.index()].kind {
            TypeKind::Array { .. } => Some(self.object),
            TypeKind::Class(_) => Some(receiver),
            TypeKind::Primitive(_) => None,
        };
        while let Some(ty) = current {
            let info = self.types[ty.index()].class_info()?;
            let found = info.methods.iter().copied().find(|m| {
                let m = &self.methods[m.index()];
                !m.is_static
                    && !m.is_abstract
                    && m.name == selector.name
                    && m.params.len() == selector.arity
            });
            if found.is_some() {
                return found;
            }
            current = info.superclass;
        }
        None
    }

    /// Every non-static field an object of type `ty` carries, inherited ones included.
    pub fn instance_fields(&self, ty: TypeId) -> Vec<FieldId> {
        let mut out = Vec::new();
        let mut current = Some(ty);
        while let Some(t) = current {
            let Some(info) = self.types[t.index()].class_info() else {
                break;
            };
            out.extend(
                info.fields
                    .iter()
                    .copied()
                    .filter(|f| !self.fields[f.index()].is_static),
            );
            current = info.superclass;
        }
        out
    }

    pub fn class_initializer(&self, ty: TypeId) -> Option<MethodId> {
        self.types[ty.index()]
            .class_info()
            .and_then(|c| c.class_initializer)
    }

    /// Class initializers that must have run before `ty` is used: its own and those of every
    /// superclass, outermost first.
    pub fn class_initializers_for(&self, ty: TypeId) -> Vec<MethodId> {
        let mut chain = Vec::new();
        let mut current = Some(ty);
        while let Some(t) = current {
            let Some(info) = self.types[t.index()].class_info() else {
                break;
            };
            chain.extend(info.class_initializer);
            current = info.superclass;
        }
        chain.reverse();
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (ClassHierarchy, TypeId, TypeId, TypeId) {
        let mut b = ClassHierarchyBuilder::new();
        let a = b.declare_class("A", false).unwrap();
        let bb = b.declare_class("B", false).unwrap();
        let i = b.declare_class("I", true).unwrap();
        b.set_superclass(bb, a).unwrap();
        b.add_interface(bb, i).unwrap();
        let object = b.object();
        b.add_method(a, "m", vec![], Some(object), MethodFlags::default())
            .unwrap();
        b.add_method(bb, "m", vec![], Some(object), MethodFlags::default())
            .unwrap();
        b.add_field(a, "f", object, false).unwrap();
        b.add_field(bb, "g", object, false).unwrap();
        b.add_field(bb, "s", object, true).unwrap();
        b.resolve_type("B[]").unwrap();
        b.resolve_type("A[]").unwrap();
        (b.build(), a, bb, i)
    }

    #[test]
    fn test_subtyping() {
        let (h, a, b, i) = sample();
        assert!(h.is_subtype(b, a));
        assert!(h.is_subtype(b, i));
        assert!(h.is_subtype(b, h.object()));
        assert!(!h.is_subtype(a, b));
        let a_arr = h.lookup_type("A[]").unwrap();
        let b_arr = h.lookup_type("B[]").unwrap();
        assert!(h.is_subtype(b_arr, a_arr));
        assert!(!h.is_subtype(a_arr, b_arr));
        assert!(h.is_subtype(a_arr, h.object()));
        let int = h.lookup_type("int").unwrap();
        assert!(!h.is_subtype(int, h.object()));
    }

    #[test]
    fn test_dispatch() {
        let (h, a, b, _) = sample();
        let sel = Selector::new("m", 0);
        let am = h.resolve_method(a, &sel).unwrap();
        let bm = h.resolve_method(b, &sel).unwrap();
        assert_ne!(am, bm);
        assert_eq!(h.method(bm).declaring, b);
        let arr = h.lookup_type("A[]").unwrap();
        assert_eq!(
            h.resolve_method(arr, &Selector::new("clone", 0)),
            Some(h.clone_method())
        );
        assert!(h.resolve_method(a, &Selector::new("m", 1)).is_none());
    }

    #[test]
    fn test_fields() {
        let (h, a, b, _) = sample();
        assert_eq!(h.instance_fields(b).len(), 2);
        assert_eq!(h.instance_fields(a).len(), 1);
        let f = h.lookup_field(b, "f").unwrap();
        assert_eq!(h.field(f).declaring, a);
        assert!(h.lookup_field(a, "g").is_err());
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut b = ClassHierarchyBuilder::new();
        b.declare_class("A", false).unwrap();
        assert!(matches!(
            b.declare_class("A", false),
            Err(IrError::DuplicateClass(_))
        ));
        assert!(matches!(
            b.resolve_type("[]"),
            Err(IrError::MalformedType(_))
        ));
    }
}
