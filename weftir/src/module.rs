//! The module under construction.
//!
//! A [`Module`] owns four arenas — types, methods, properties and fields —
//! addressed by stable slotmap handles. Declarations only ever add to the
//! arenas; method bodies only ever grow at the tail. The module also
//! carries an assembly identity so weaving can be restricted to members
//! defined locally, with imported types carrying a foreign identity.
use bitflags::bitflags;
use log::debug;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;
use strum::EnumIs;
use uuid::Uuid;

use crate::{
    error::{IrError, IrResult},
    instr::Instr,
    typeref::TypeRef,
};

new_key_type! {
    /// Stable handle of a [`TypeDef`] within a [`Module`].
    pub struct TypeKey;
    /// Stable handle of a [`MethodDef`] within a [`Module`].
    pub struct MethodKey;
    /// Stable handle of a [`PropertyDef`] within a [`Module`].
    pub struct PropertyKey;
    /// Stable handle of a [`FieldDef`] within a [`Module`].
    pub struct FieldKey;
}

/// Member visibility, checked whenever a woven call site crosses a type
/// boundary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, EnumIs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Visibility {
    /// Accessible only from the declaring type.
    Private,
    /// Accessible from every type of the same assembly.
    #[default]
    Assembly,
    /// Accessible from everywhere.
    Public,
}

bitflags! {
    /// Method modifiers.
    ///
    /// `ABSTRACT` implies polymorphic dispatch and the absence of a body;
    /// `VIRTUAL` implies polymorphic dispatch with a body.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodFlags: u8 {
        const VIRTUAL = 1 << 0;
        const ABSTRACT = 1 << 1;
        const CTOR = 1 << 2;
    }
}

#[cfg(feature = "serde")]
impl Serialize for MethodFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.bits().serialize(serializer)
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for MethodFlags {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_bits_retain(u8::deserialize(deserializer)?))
    }
}

/// Whether a type is a class or an interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TypeKind {
    Class,
    Interface,
}

/// A declared type.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TypeDef {
    pub name: String,
    pub kind: TypeKind,

    /// An abstract class cannot be instantiated; its abstract members are
    /// woven through their concrete overrides.
    pub is_abstract: bool,

    /// Base class, if any. Interfaces never have one.
    pub base: Option<TypeKey>,

    /// Directly implemented interfaces.
    pub interfaces: SmallVec<TypeKey, 2>,

    /// Names of the type's generic parameters, by position. Non-empty for
    /// generic type definitions only.
    pub generic_params: SmallVec<String, 2>,

    /// Assembly the type is defined in. Differs from the module's own
    /// identity for imported types.
    pub assembly: Uuid,

    pub properties: Vec<PropertyKey>,
    pub methods: Vec<MethodKey>,
    pub fields: Vec<FieldKey>,
}

/// One formal parameter of a method.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParamDef {
    pub name: String,
    pub ty: TypeRef,
}

impl ParamDef {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A declared method.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MethodDef {
    pub name: String,
    pub declaring: TypeKey,
    pub params: SmallVec<ParamDef, 2>,

    /// `None` means the method returns nothing.
    pub return_type: Option<TypeRef>,

    pub flags: MethodFlags,
    pub visibility: Visibility,

    /// The ordered instruction list. Always empty for abstract methods.
    pub body: Vec<Instr>,
}

impl MethodDef {
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(MethodFlags::ABSTRACT)
    }

    /// True when call sites must dispatch on the receiver's runtime type.
    pub fn is_polymorphic(&self) -> bool {
        self.flags.intersects(MethodFlags::VIRTUAL | MethodFlags::ABSTRACT)
    }

    pub fn is_ctor(&self) -> bool {
        self.flags.contains(MethodFlags::CTOR)
    }
}

/// A declared property: a value type plus optional accessor methods.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PropertyDef {
    pub name: String,
    pub declaring: TypeKey,
    pub value_type: TypeRef,
    pub getter: Option<MethodKey>,
    pub setter: Option<MethodKey>,
}

/// A declared field.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FieldDef {
    pub name: String,
    pub declaring: TypeKey,
    pub value_type: TypeRef,
    pub visibility: Visibility,
}

/// Reference to a member that can yield a value: a field or a method with
/// a return type. Used for pass-through binding targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MemberRef {
    Field(FieldKey),
    Method(MethodKey),
}

/// A single assembly's worth of declarations.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Module {
    pub name: String,

    /// Identity of the assembly this module defines. Members whose
    /// declaring type carries a different identity are never woven into.
    pub assembly: Uuid,

    pub types: SlotMap<TypeKey, TypeDef>,
    pub methods: SlotMap<MethodKey, MethodDef>,
    pub properties: SlotMap<PropertyKey, PropertyDef>,
    pub fields: SlotMap<FieldKey, FieldDef>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            assembly: Uuid::new_v4(),
            types: SlotMap::with_key(),
            methods: SlotMap::with_key(),
            properties: SlotMap::with_key(),
            fields: SlotMap::with_key(),
        }
    }

    fn declare_type(&mut self, name: &str, kind: TypeKind, assembly: Uuid) -> TypeKey {
        self.types.insert(TypeDef {
            name: name.to_owned(),
            kind,
            is_abstract: matches!(kind, TypeKind::Interface),
            base: None,
            interfaces: SmallVec::new(),
            generic_params: SmallVec::new(),
            assembly,
            properties: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
        })
    }

    /// Declare a concrete class in this module's assembly.
    pub fn declare_class(&mut self, name: &str) -> TypeKey {
        self.declare_type(name, TypeKind::Class, self.assembly)
    }

    /// Declare a class deriving from `base`.
    pub fn declare_subclass(&mut self, name: &str, base: TypeKey) -> TypeKey {
        let key = self.declare_type(name, TypeKind::Class, self.assembly);
        self.types[key].base = Some(base);
        key
    }

    pub fn declare_interface(&mut self, name: &str) -> TypeKey {
        self.declare_type(name, TypeKind::Interface, self.assembly)
    }

    /// Declare a type imported from another assembly. Its members are
    /// visible to lookups but are never woven into.
    pub fn declare_external_type(&mut self, name: &str) -> TypeKey {
        self.declare_type(name, TypeKind::Class, Uuid::new_v4())
    }

    /// Record that `ty` implements `interface`.
    pub fn add_interface(&mut self, ty: TypeKey, interface: TypeKey) {
        self.types[ty].interfaces.push(interface);
    }

    fn check_member_name(&self, ty: TypeKey, name: &str) -> IrResult<()> {
        let def = &self.types[ty];
        let clash = def
            .fields
            .iter()
            .any(|&field| self.fields[field].name == name)
            || def
                .methods
                .iter()
                .any(|&method| self.methods[method].name == name)
            || def
                .properties
                .iter()
                .any(|&property| self.properties[property].name == name);
        if clash {
            return Err(IrError::DuplicateMember {
                ty: def.name.clone(),
                member: name.to_owned(),
            });
        }
        Ok(())
    }

    pub fn declare_field(
        &mut self,
        ty: TypeKey,
        name: &str,
        value_type: TypeRef,
        visibility: Visibility,
    ) -> IrResult<FieldKey> {
        self.check_member_name(ty, name)?;
        let key = self.fields.insert(FieldDef {
            name: name.to_owned(),
            declaring: ty,
            value_type,
            visibility,
        });
        self.types[ty].fields.push(key);
        Ok(key)
    }

    pub fn declare_method(
        &mut self,
        ty: TypeKey,
        name: &str,
        params: impl IntoIterator<Item = ParamDef>,
        return_type: Option<TypeRef>,
        flags: MethodFlags,
        visibility: Visibility,
    ) -> IrResult<MethodKey> {
        self.check_member_name(ty, name)?;
        let key = self.methods.insert(MethodDef {
            name: name.to_owned(),
            declaring: ty,
            params: params.into_iter().collect(),
            return_type,
            flags,
            visibility,
            body: Vec::new(),
        });
        self.types[ty].methods.push(key);
        Ok(key)
    }

    pub fn declare_property(
        &mut self,
        ty: TypeKey,
        name: &str,
        value_type: TypeRef,
        getter: Option<MethodKey>,
        setter: Option<MethodKey>,
    ) -> IrResult<PropertyKey> {
        self.check_member_name(ty, name)?;
        let key = self.properties.insert(PropertyDef {
            name: name.to_owned(),
            declaring: ty,
            value_type,
            getter,
            setter,
        });
        self.types[ty].properties.push(key);
        Ok(key)
    }

    /// Declare a property with a backing field and trivial accessor bodies.
    ///
    /// With `MethodFlags::ABSTRACT` the backing field and the bodies are
    /// omitted, leaving a pair of abstract accessors (the interface and
    /// abstract-class shape).
    pub fn declare_auto_property(
        &mut self,
        ty: TypeKey,
        name: &str,
        value_type: TypeRef,
        flags: MethodFlags,
    ) -> IrResult<PropertyKey> {
        let getter_name = format!("get_{name}");
        let setter_name = format!("set_{name}");

        if flags.contains(MethodFlags::ABSTRACT) {
            let getter = self.declare_method(
                ty,
                &getter_name,
                [],
                Some(value_type.clone()),
                flags,
                Visibility::Public,
            )?;
            let setter = self.declare_method(
                ty,
                &setter_name,
                [ParamDef::new("value", value_type.clone())],
                None,
                flags,
                Visibility::Public,
            )?;
            return self.declare_property(ty, name, value_type, Some(getter), Some(setter));
        }

        let field = self.declare_field(
            ty,
            &format!("_{name}"),
            value_type.clone(),
            Visibility::Private,
        )?;
        let getter = self.declare_method(
            ty,
            &getter_name,
            [],
            Some(value_type.clone()),
            flags,
            Visibility::Public,
        )?;
        self.methods[getter].body = vec![Instr::LoadSelf, Instr::LoadField(field)];
        let setter = self.declare_method(
            ty,
            &setter_name,
            [ParamDef::new("value", value_type.clone())],
            None,
            flags,
            Visibility::Public,
        )?;
        self.methods[setter].body =
            vec![Instr::LoadSelf, Instr::LoadParam(0), Instr::StoreField(field)];
        self.declare_property(ty, name, value_type, Some(getter), Some(setter))
    }

    /// Append instructions at the tail of a method body.
    ///
    /// This is the only body mutation the model offers; existing
    /// instructions are never rewritten or removed.
    pub fn append(
        &mut self,
        method: MethodKey,
        instrs: impl IntoIterator<Item = Instr>,
    ) -> IrResult<()> {
        if self.methods[method].is_abstract() {
            return Err(IrError::AppendToAbstract {
                method: self.methods[method].name.clone(),
            });
        }
        let before = self.methods[method].body.len();
        self.methods[method].body.extend(instrs);
        debug!(
            "appended {} instruction(s) to `{}`",
            self.methods[method].body.len() - before,
            self.methods[method].name
        );
        Ok(())
    }

    pub fn body(&self, method: MethodKey) -> &[Instr] {
        &self.methods[method].body
    }

    /// The type itself followed by its base classes, root last.
    pub fn base_chain(&self, ty: TypeKey) -> impl Iterator<Item = TypeKey> + '_ {
        std::iter::successors(Some(ty), move |&current| self.types[current].base)
    }

    /// All properties declared on the type or any of its base classes.
    pub fn properties_in_base_hierarchy(
        &self,
        ty: TypeKey,
    ) -> impl Iterator<Item = PropertyKey> + '_ {
        self.base_chain(ty)
            .flat_map(move |current| self.types[current].properties.iter().copied())
    }

    /// All methods declared on the type or any of its base classes.
    pub fn methods_in_base_hierarchy(&self, ty: TypeKey) -> impl Iterator<Item = MethodKey> + '_ {
        self.base_chain(ty)
            .flat_map(move |current| self.types[current].methods.iter().copied())
    }

    /// A type declared in this module, found by name.
    pub fn type_named(&self, name: &str) -> Option<TypeKey> {
        self.types.iter().find(|(_, def)| def.name == name).map(|(key, _)| key)
    }

    /// A method declared directly on `ty`, found by name.
    pub fn method_named(&self, ty: TypeKey, name: &str) -> Option<MethodKey> {
        self.types[ty]
            .methods
            .iter()
            .copied()
            .find(|&method| self.methods[method].name == name)
    }

    /// A property declared directly on `ty`, found by name.
    pub fn property_named(&self, ty: TypeKey, name: &str) -> Option<PropertyKey> {
        self.types[ty]
            .properties
            .iter()
            .copied()
            .find(|&property| self.properties[property].name == name)
    }

    /// The nearest property with the given name on `ty` or a base class.
    pub fn property_in_base_hierarchy_named(
        &self,
        ty: TypeKey,
        name: &str,
    ) -> Option<PropertyKey> {
        self.properties_in_base_hierarchy(ty)
            .find(|&property| self.properties[property].name == name)
    }

    /// The property whose setter shares the method's name on its declaring
    /// type, if any. Distinguishes real property setters (which must be
    /// routed through a set helper) from plain callback methods.
    pub fn property_of_setter(&self, method: MethodKey) -> Option<PropertyKey> {
        let def = &self.methods[method];
        self.types[def.declaring]
            .properties
            .iter()
            .copied()
            .find(|&property| {
                self.properties[property]
                    .setter
                    .is_some_and(|setter| self.methods[setter].name == def.name)
            })
    }

    pub fn is_method_accessible(&self, method: MethodKey, from: TypeKey) -> bool {
        let def = &self.methods[method];
        match def.visibility {
            Visibility::Public => true,
            Visibility::Assembly => {
                self.types[def.declaring].assembly == self.types[from].assembly
            }
            Visibility::Private => def.declaring == from,
        }
    }

    pub fn is_field_accessible(&self, field: FieldKey, from: TypeKey) -> bool {
        let def = &self.fields[field];
        match def.visibility {
            Visibility::Public => true,
            Visibility::Assembly => {
                self.types[def.declaring].assembly == self.types[from].assembly
            }
            Visibility::Private => def.declaring == from,
        }
    }

    pub fn is_member_accessible(&self, member: MemberRef, from: TypeKey) -> bool {
        match member {
            MemberRef::Field(field) => self.is_field_accessible(field, from),
            MemberRef::Method(method) => self.is_method_accessible(method, from),
        }
    }

    /// The type of the value a member yields: a field's value type or a
    /// method's return type.
    pub fn member_return_type(&self, member: MemberRef) -> Option<TypeRef> {
        match member {
            MemberRef::Field(field) => Some(self.fields[field].value_type.clone()),
            MemberRef::Method(method) => self.methods[method].return_type.clone(),
        }
    }

    pub fn member_name(&self, member: MemberRef) -> &str {
        match member {
            MemberRef::Field(field) => &self.fields[field].name,
            MemberRef::Method(method) => &self.methods[method].name,
        }
    }

    /// Fully qualified `Type::member` name for diagnostics.
    pub fn qualified_method_name(&self, method: MethodKey) -> String {
        let def = &self.methods[method];
        format!("{}::{}", self.types[def.declaring].name, def.name)
    }

    /// Check that every parameter slot a body loads actually exists.
    pub fn verify_method(&self, method: MethodKey) -> IrResult<()> {
        let def = &self.methods[method];
        for instr in Instr::flatten(&def.body) {
            if let Instr::LoadParam(index) = instr {
                if *index as usize >= def.params.len() {
                    return Err(IrError::ParamOutOfRange {
                        method: def.name.clone(),
                        index: *index,
                        count: def.params.len(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_property_gets_field_and_accessor_bodies() {
        let mut module = Module::new("fixture");
        let view = module.declare_class("View");
        let property = module
            .declare_auto_property(view, "text", TypeRef::Str, MethodFlags::empty())
            .unwrap();

        let def = &module.properties[property];
        let getter = def.getter.unwrap();
        let setter = def.setter.unwrap();
        assert_eq!(module.body(getter).len(), 2);
        assert_eq!(module.body(setter).len(), 3);
        assert!(module.property_of_setter(setter).is_some());
    }

    #[test]
    fn abstract_auto_property_has_no_bodies() {
        let mut module = Module::new("fixture");
        let base = module.declare_class("ViewBase");
        module.types[base].is_abstract = true;
        let property = module
            .declare_auto_property(base, "text", TypeRef::Str, MethodFlags::ABSTRACT)
            .unwrap();

        let setter = module.properties[property].setter.unwrap();
        assert!(module.methods[setter].is_abstract());
        assert!(module.body(setter).is_empty());
        assert!(module.append(setter, [Instr::LoadSelf]).is_err());
    }

    #[test]
    fn duplicate_member_names_are_rejected() {
        let mut module = Module::new("fixture");
        let view = module.declare_class("View");
        module
            .declare_field(view, "_text", TypeRef::Str, Visibility::Private)
            .unwrap();
        let clash = module.declare_field(view, "_text", TypeRef::Str, Visibility::Private);
        assert!(matches!(clash, Err(IrError::DuplicateMember { .. })));
    }

    #[test]
    fn assembly_visibility_stops_at_foreign_types() {
        let mut module = Module::new("fixture");
        let local = module.declare_class("Local");
        let foreign = module.declare_external_type("Foreign");
        let method = module
            .declare_method(
                local,
                "refresh",
                [],
                None,
                MethodFlags::empty(),
                Visibility::Assembly,
            )
            .unwrap();

        assert!(module.is_method_accessible(method, local));
        assert!(!module.is_method_accessible(method, foreign));
    }

    #[test]
    fn verify_method_rejects_out_of_range_parameter_loads() {
        let mut module = Module::new("fixture");
        let view = module.declare_class("View");
        let method = module
            .declare_method(
                view,
                "apply",
                [ParamDef::new("value", TypeRef::Str)],
                None,
                MethodFlags::empty(),
                Visibility::Public,
            )
            .unwrap();
        module.append(method, [Instr::LoadParam(0)]).unwrap();
        assert!(module.verify_method(method).is_ok());

        module.append(method, [Instr::LoadParam(2)]).unwrap();
        assert!(matches!(
            module.verify_method(method),
            Err(IrError::ParamOutOfRange { index: 2, .. })
        ));
    }

    #[test]
    fn base_chain_walks_towards_the_root() {
        let mut module = Module::new("fixture");
        let base = module.declare_class("Base");
        let mid = module.declare_subclass("Mid", base);
        let leaf = module.declare_subclass("Leaf", mid);

        let chain: Vec<TypeKey> = module.base_chain(leaf).collect();
        assert_eq!(chain, vec![leaf, mid, base]);
    }
}
