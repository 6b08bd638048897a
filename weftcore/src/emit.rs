//! Instruction emission primitives.
//!
//! These functions physically create methods, fields and properties and
//! build the instruction sequences the weaving engine appends into method
//! bodies. They hold no cross-edge state of their own; every decision
//! about *what* to emit and *where* belongs to [`crate::weaver`].
use either::Either;
use log::debug;
use weftir::{
    error::IrResult,
    instr::{Call, Dispatch, FieldOrNew, Instr},
    module::{
        FieldKey, MemberRef, MethodFlags, MethodKey, Module, ParamDef, PropertyKey, TypeKey,
        Visibility,
    },
    typeref::TypeRef,
};

use crate::utils::{error::WeaveResult, names};

/// An immutable snapshot of a setter's original instruction sequence,
/// captured once before any rewriting.
///
/// Every generated helper body is derived from a memento, never from
/// another helper's already-modified body, so helpers cannot accumulate
/// each other's propagation calls.
#[derive(Clone, Debug)]
pub struct MethodMemento {
    method: MethodKey,
    instructions: Vec<Instr>,
}

impl MethodMemento {
    pub fn method(&self) -> MethodKey {
        self.method
    }

    pub fn instructions(&self) -> &[Instr] {
        &self.instructions
    }
}

/// Snapshot the current body of a method.
pub fn method_memento(module: &Module, method: MethodKey) -> MethodMemento {
    MethodMemento {
        method,
        instructions: module.body(method).to_vec(),
    }
}

/// Call or callvirt, depending on the callee.
fn call_instr(module: &Module, method: MethodKey) -> Instr {
    let dispatch = if module.methods[method].is_polymorphic() {
        Dispatch::Virtual
    } else {
        Dispatch::Static
    };
    Instr::Call(Call { method, dispatch })
}

/// Read the value a pass-through member yields. The receiver must already
/// be on the stack.
fn member_read(module: &Module, member: MemberRef) -> Instr {
    match member {
        MemberRef::Field(field) => Instr::LoadField(field),
        MemberRef::Method(method) => call_instr(module, method),
    }
}

/// Synthesize an alternate entry point into a setter's logic.
///
/// The helper shares the destination setter's signature, is non-virtual
/// and assembly-visible, and starts out as a copy of the memento body —
/// or empty when the destination is abstract and no memento can exist.
pub fn set_helper(
    module: &mut Module,
    name: &str,
    to_setter: MethodKey,
    memento: Option<&MethodMemento>,
) -> WeaveResult<MethodKey> {
    let declaring = module.methods[to_setter].declaring;
    let params: Vec<ParamDef> = module.methods[to_setter].params.iter().cloned().collect();
    debug!(
        "emitting set helper `{name}` for `{}`",
        module.qualified_method_name(to_setter)
    );
    let helper = module.declare_method(
        declaring,
        name,
        params,
        None,
        MethodFlags::empty(),
        Visibility::Assembly,
    )?;
    if let Some(memento) = memento {
        module.append(helper, memento.instructions().iter().cloned())?;
    }
    Ok(helper)
}

/// Create the accessor property caching a `source`-typed instance on
/// `host`, with a backing field and trivial accessor bodies.
///
/// An interface host gets an abstract accessor pair instead;
/// `interface_impl` marks an injection into a concrete implementer, whose
/// accessors are made virtual so the interface slot dispatches to them.
pub fn accessor(
    module: &mut Module,
    host: TypeKey,
    source: TypeKey,
    interface_impl: bool,
) -> WeaveResult<PropertyKey> {
    let name = names::accessor_property(&module.types[source].name);
    let value = TypeRef::Named(source);
    debug!(
        "emitting accessor `{name}` on `{}` (interface implementer: {interface_impl})",
        module.types[host].name
    );

    if module.types[host].kind.is_interface() {
        return Ok(module.declare_auto_property(host, &name, value, MethodFlags::ABSTRACT)?);
    }

    let flags = if interface_impl {
        MethodFlags::VIRTUAL
    } else {
        MethodFlags::empty()
    };
    let field = module.declare_field(
        host,
        &names::accessor_backing_field(&name),
        value.clone(),
        Visibility::Private,
    )?;
    let getter = module.declare_method(
        host,
        &format!("get_{name}"),
        [],
        Some(value.clone()),
        flags,
        Visibility::Public,
    )?;
    module.append(getter, [Instr::LoadSelf, Instr::LoadField(field)])?;
    let setter = module.declare_method(
        host,
        &format!("set_{name}"),
        [ParamDef::new("value", value.clone())],
        None,
        flags,
        Visibility::Public,
    )?;
    module.append(
        setter,
        [Instr::LoadSelf, Instr::LoadParam(0), Instr::StoreField(field)],
    )?;
    Ok(module.declare_property(host, &name, value, Some(getter), Some(setter))?)
}

/// Append accessor population code into a binding initializer body.
///
/// Emits `target_member.set_accessor(self)`; with `throw_on_failure`
/// disabled the store is wrapped in a null guard so an unresolved target
/// is silently skipped instead of failing at runtime.
pub fn accessor_initialization(
    module: &mut Module,
    accessor_setter: MethodKey,
    initializer: MethodKey,
    target: MemberRef,
    throw_on_failure: bool,
) -> WeaveResult<()> {
    let mut sequence = vec![Instr::LoadSelf, member_read(module, target)];
    let store = vec![Instr::LoadSelf, call_instr(module, accessor_setter)];
    if throw_on_failure {
        sequence.extend(store);
    } else {
        sequence.push(Instr::IfNotNull(store));
    }
    debug!(
        "emitting accessor initialization into `{}`",
        module.qualified_method_name(initializer)
    );
    Ok(module.append(initializer, sequence)?)
}

/// Create the cached converter instance field on the weaved type.
pub fn converter_field(
    module: &mut Module,
    host: TypeKey,
    converter: &TypeRef,
    name: &str,
) -> WeaveResult<FieldKey> {
    Ok(module.declare_field(host, name, converter.clone(), Visibility::Private)?)
}

/// A validated converter, resolved against one edge.
#[derive(Clone, Copy, Debug)]
pub struct Converter {
    /// Cached instance field on the origin's declaring type.
    pub field: FieldKey,
    /// The conversion method matching the edge's property types.
    pub method: MethodKey,
    /// Public parameterless constructor used for lazy instantiation.
    pub ctor: MethodKey,
}

/// How the propagated value is read inside the origin setter: the
/// parameter at an index, or a getter call on the origin object.
pub type SourceRead = Either<u16, MethodKey>;

/// Inputs of [`binding_command`].
pub struct EmitParameters {
    /// Pass-through member on the origin type yielding the destination
    /// object; `None` binds two members of the same object.
    pub target: Option<MemberRef>,
    /// Destination entry point: property setter, set helper, or callback.
    pub to: MethodKey,
    pub null_check: bool,
    pub converter: Option<Converter>,
}

/// One emitted propagation sequence.
///
/// The command is retained by the engine's bookkeeping after its first
/// emission so that later-declared edges can re-append it into the set
/// helpers they retroactively extend.
#[derive(Clone, Debug)]
pub struct BindingCommand {
    instructions: Vec<Instr>,
}

impl BindingCommand {
    pub fn instructions(&self) -> &[Instr] {
        &self.instructions
    }

    /// Append a fresh copy of the sequence at the tail of a method body.
    pub fn append_to(&self, module: &mut Module, method: MethodKey) -> IrResult<()> {
        module.append(method, self.instructions.iter().cloned())
    }
}

/// Build the propagation sequence for one edge: read the pass-through
/// target (if any), optionally guard against null, read the source value,
/// optionally convert it, and call the destination entry point.
pub fn binding_command(
    module: &Module,
    parameters: &EmitParameters,
    source: SourceRead,
) -> BindingCommand {
    let mut tail = Vec::new();
    if let Some(converter) = &parameters.converter {
        tail.push(Instr::LoadSelf);
        tail.push(Instr::FieldOrNew(FieldOrNew {
            field: converter.field,
            ctor: converter.ctor,
        }));
    }
    match source {
        Either::Left(index) => tail.push(Instr::LoadParam(index)),
        Either::Right(getter) => {
            tail.push(Instr::LoadSelf);
            tail.push(call_instr(module, getter));
        }
    }
    if let Some(converter) = &parameters.converter {
        tail.push(call_instr(module, converter.method));
    }
    tail.push(call_instr(module, parameters.to));

    let mut instructions = vec![Instr::LoadSelf];
    match parameters.target {
        Some(member) => {
            instructions.push(member_read(module, member));
            if parameters.null_check {
                instructions.push(Instr::IfNotNull(tail));
            } else {
                instructions.extend(tail);
            }
        }
        None => instructions.extend(tail),
    }
    BindingCommand { instructions }
}
