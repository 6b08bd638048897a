//! Binding declarations and their translation into weave requests.
//!
//! A declaration names a source property, a direction and one or more
//! target members; the translator resolves every symbol, then drives the
//! engine with fully resolved low-level requests — one per declared edge,
//! in declaration order. Direction is a closed variant consumed here; the
//! engine itself never sees it.
use either::Either;
use strum::EnumIs;
use weftir::{
    module::{MemberRef, MethodKey, Module, PropertyKey, TypeKey},
    typeref::TypeRef,
};

use crate::{
    hierarchy::HierarchyResolver,
    utils::error::{WeaveError, WeaveResult},
    weaver::{AccessorRequest, WeaveRequest, Weaver},
};

/// Direction of a declared property binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIs)]
pub enum Direction {
    /// The source property writes into the target property.
    OneWay,
    /// Both directions. The engine's helper exclusion keeps the pair from
    /// echoing.
    TwoWay,
    /// The target property writes back into the source property, routed
    /// through a generated accessor on the target type.
    FromTarget,
}

/// One declared property-to-property binding.
#[derive(Clone, Debug)]
pub struct BindingDeclaration {
    pub source_property: PropertyKey,
    pub direction: Direction,

    /// Target property name; `None` means the source property's own name.
    pub target_property: Option<String>,

    /// Members on the source type yielding the bound target objects.
    pub targets: Vec<MemberRef>,

    /// Name of the binding initializer on the source type. Required for
    /// `TwoWay` and `FromTarget`, which must populate an accessor.
    pub initializer: Option<String>,

    pub null_check: bool,

    /// Fail at runtime when an accessor target is unresolved, instead of
    /// silently skipping the store.
    pub throw_on_failure: bool,

    pub converter: Option<TypeRef>,
}

impl BindingDeclaration {
    pub fn new(source_property: PropertyKey, direction: Direction, target: MemberRef) -> Self {
        Self {
            source_property,
            direction,
            target_property: None,
            targets: vec![target],
            initializer: None,
            null_check: false,
            throw_on_failure: true,
            converter: None,
        }
    }
}

/// One declared property-to-method binding: the target is an arbitrary
/// callback invoked with the written value. Callbacks cannot re-trigger
/// the propagation graph, so no helper is involved.
#[derive(Clone, Debug)]
pub struct MethodBindingDeclaration {
    pub source_property: PropertyKey,
    pub target_method: String,
    pub targets: Vec<MemberRef>,
    pub null_check: bool,
}

/// Translate one declaration into engine requests, in declaration order.
pub fn bind<R: HierarchyResolver>(
    weaver: &mut Weaver<R>,
    declaration: &BindingDeclaration,
) -> WeaveResult<()> {
    for &target in &declaration.targets {
        match declaration.direction {
            Direction::OneWay => bind_one_way(weaver, declaration, target)?,
            Direction::TwoWay => {
                bind_one_way(weaver, declaration, target)?;
                bind_from_target(weaver, declaration, target)?;
            }
            Direction::FromTarget => bind_from_target(weaver, declaration, target)?,
        }
    }
    Ok(())
}

/// Translate one property-to-method declaration.
pub fn bind_method<R: HierarchyResolver>(
    weaver: &mut Weaver<R>,
    declaration: &MethodBindingDeclaration,
) -> WeaveResult<()> {
    for &target in &declaration.targets {
        let request = {
            let module = weaver.module();
            let from_setter = setter_of(module, declaration.source_property)?;
            let target_type = target_type_of(module, target)?;
            let callback = module
                .methods_in_base_hierarchy(target_type)
                .find(|&method| module.methods[method].name == declaration.target_method)
                .ok_or_else(|| WeaveError::MissingTargetMethod {
                    ty: module.types[target_type].name.clone(),
                    method: declaration.target_method.clone(),
                })?;
            WeaveRequest {
                // the written value is the setter's own parameter
                source: Either::Left(0),
                from_setter,
                to_setter: callback,
                target: Some(target),
                null_check: declaration.null_check,
                converter: None,
            }
        };
        weaver.weave(&request)?;
    }
    Ok(())
}

fn bind_one_way<R: HierarchyResolver>(
    weaver: &mut Weaver<R>,
    declaration: &BindingDeclaration,
    target: MemberRef,
) -> WeaveResult<()> {
    let request = {
        let module = weaver.module();
        let target_property = resolve_target_property(module, declaration, target)?;
        WeaveRequest {
            source: Either::Right(getter_of(module, declaration.source_property)?),
            from_setter: setter_of(module, declaration.source_property)?,
            to_setter: setter_of(module, target_property)?,
            target: Some(target),
            null_check: declaration.null_check,
            converter: declaration.converter.clone(),
        }
    };
    weaver.weave(&request)
}

fn bind_from_target<R: HierarchyResolver>(
    weaver: &mut Weaver<R>,
    declaration: &BindingDeclaration,
    target: MemberRef,
) -> WeaveResult<()> {
    let (accessor_request, target_property) = {
        let module = weaver.module();
        let target_property = resolve_target_property(module, declaration, target)?;
        let source_type = module.properties[declaration.source_property].declaring;
        let target_type = module.properties[target_property].declaring;
        let initializer = declaration
            .initializer
            .as_deref()
            .and_then(|name| {
                module
                    .methods_in_base_hierarchy(source_type)
                    .find(|&method| module.methods[method].name == name)
            })
            .ok_or_else(|| WeaveError::MissingBindingInitializer {
                ty: module.types[source_type].name.clone(),
            })?;
        (
            AccessorRequest {
                source_type,
                target_type,
                binding_target: target,
                binding_initializer: initializer,
                throw_on_failure: declaration.throw_on_failure,
            },
            target_property,
        )
    };

    let accessor = weaver.weave_accessor(&accessor_request)?;

    let request = {
        let module = weaver.module();
        WeaveRequest {
            source: Either::Right(getter_of(module, target_property)?),
            from_setter: setter_of(module, target_property)?,
            to_setter: setter_of(module, declaration.source_property)?,
            target: Some(MemberRef::Method(getter_of(module, accessor)?)),
            null_check: declaration.null_check,
            converter: None,
        }
    };
    weaver.weave(&request)
}

/// The declared type of the object a pass-through member yields.
fn target_type_of(module: &Module, target: MemberRef) -> WeaveResult<TypeKey> {
    module
        .member_return_type(target)
        .and_then(|ty| ty.definition())
        .ok_or_else(|| WeaveError::MemberHasNoValue {
            member: module.member_name(target).to_owned(),
        })
}

fn resolve_target_property(
    module: &Module,
    declaration: &BindingDeclaration,
    target: MemberRef,
) -> WeaveResult<PropertyKey> {
    let name = declaration
        .target_property
        .as_deref()
        .unwrap_or(&module.properties[declaration.source_property].name)
        .to_owned();
    let target_type = target_type_of(module, target)?;
    module
        .property_in_base_hierarchy_named(target_type, &name)
        .ok_or_else(|| WeaveError::MissingTargetProperty {
            ty: module.types[target_type].name.clone(),
            property: name,
        })
}

fn setter_of(module: &Module, property: PropertyKey) -> WeaveResult<MethodKey> {
    module.properties[property]
        .setter
        .ok_or_else(|| WeaveError::MissingSetter {
            property: module.properties[property].name.clone(),
        })
}

fn getter_of(module: &Module, property: PropertyKey) -> WeaveResult<MethodKey> {
    module.properties[property]
        .getter
        .ok_or_else(|| WeaveError::MissingGetter {
            property: module.properties[property].name.clone(),
        })
}
