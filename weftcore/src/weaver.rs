//! The weaving engine.
//!
//! One [`Weaver`] owns all state of a single module-compilation pass. It
//! consumes low-level weave requests one at a time, in declaration order,
//! and mutates the module through [`crate::emit`].
//!
//! The central mechanism is the *set helper*: a generated alternate entry
//! point into a destination setter, keyed by the directed pair
//! (origin setter, destination setter). A helper contains the
//! destination's original logic plus every propagation already woven for
//! the destination — except the one whose target is the origin. Routing
//! cross-object propagation through helpers instead of the real setters
//! keeps a two-way pair `A <-> B` from echoing: the helper `B` exposes to
//! `A` never calls back into `A`. Because a helper omits exactly one
//! edge, multi-hop chains such as `View -> ViewModel -> Model` still flow
//! end to end; edges declared after a helper already exists are
//! retroactively appended into it (the back-patch step), so declaration
//! order never breaks a chain.
//!
//! Edge processing order is semantically significant and the session is
//! strictly single-threaded; a failed edge fails the whole session.
//! [`Weaver::finish`] consumes the engine, so a second pass over the same
//! session state is unrepresentable.
use std::collections::{BTreeMap, BTreeSet, HashSet};

use either::Either;
use log::{debug, info};
use slotmap::SecondaryMap;
use weftir::{
    module::{FieldKey, MemberRef, MethodKey, Module, PropertyKey, TypeKey},
    typeref::TypeRef,
};

use crate::{
    emit::{self, BindingCommand, Converter, EmitParameters, MethodMemento, SourceRead},
    hierarchy::{HierarchyResolver, ModuleHierarchy},
    utils::{
        error::{WeaveError, WeaveResult},
        names,
    },
};

/// One low-level weave request, as produced by the declaration translator.
#[derive(Clone, Debug)]
pub struct WeaveRequest {
    /// How the propagated value is read inside the origin setter.
    pub source: SourceRead,
    /// Origin setter the propagation is appended into.
    pub from_setter: MethodKey,
    /// Destination entry: a property setter or an arbitrary callback.
    pub to_setter: MethodKey,
    /// Pass-through member on the origin type yielding the destination
    /// object; `None` binds two members of the same object.
    pub target: Option<MemberRef>,
    pub null_check: bool,
    pub converter: Option<TypeRef>,
}

/// Request to route a target-to-source accessor for a from-target binding.
#[derive(Clone, Debug)]
pub struct AccessorRequest {
    pub source_type: TypeKey,
    pub target_type: TypeKey,
    /// Member on the source type yielding the target object.
    pub binding_target: MemberRef,
    /// Initializer on the source type that will populate the accessor.
    pub binding_initializer: MethodKey,
    /// Fail at runtime when the target is unresolved instead of skipping.
    pub throw_on_failure: bool,
}

/// Identity of a woven edge; an edge is woven at most once.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
struct EdgeId {
    source: SourceRead,
    from: MethodKey,
    to: MethodKey,
    target: Option<MemberRef>,
}

/// A propagation already emitted for a setter, kept for re-emission into
/// helpers that later edges retroactively extend.
#[derive(Clone, Debug)]
struct RecordedBinding {
    command: BindingCommand,
    to_setter: MethodKey,
}

/// The weaving engine. Owns the module and all session state for one pass.
pub struct Weaver<R = ModuleHierarchy> {
    module: Module,
    resolver: R,

    /// Deterministic counter feeding generated member names.
    seq: u32,

    /// Identities of edges already woven.
    woven: HashSet<EdgeId>,

    /// Setter -> propagations it already performs.
    bindings_for_setter: SecondaryMap<MethodKey, Vec<RecordedBinding>>,

    /// Setter -> setters it already writes into.
    writes_into: SecondaryMap<MethodKey, BTreeSet<MethodKey>>,

    /// Types whose relevant setters have been snapshotted.
    memento_complete: BTreeSet<TypeKey>,

    /// Original bodies, captured once per setter before any rewriting.
    mementos: SecondaryMap<MethodKey, MethodMemento>,

    /// (origin setter, destination setter) -> generated helper.
    set_helpers: BTreeMap<(MethodKey, MethodKey), MethodKey>,

    /// (host type, converter type) -> cached instance field.
    converter_fields: BTreeMap<(TypeKey, TypeRef), FieldKey>,
}

impl Weaver<ModuleHierarchy> {
    /// Start a session resolving hierarchy from the module's own edges.
    pub fn new(module: Module) -> Self {
        let resolver = ModuleHierarchy::of(&module);
        Self::with_resolver(module, resolver)
    }
}

impl<R: HierarchyResolver> Weaver<R> {
    pub fn with_resolver(module: Module, resolver: R) -> Self {
        Self {
            module,
            resolver,
            seq: 0,
            woven: HashSet::new(),
            bindings_for_setter: SecondaryMap::new(),
            writes_into: SecondaryMap::new(),
            memento_complete: BTreeSet::new(),
            mementos: SecondaryMap::new(),
            set_helpers: BTreeMap::new(),
            converter_fields: BTreeMap::new(),
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    /// End the session and release the woven module.
    pub fn finish(self) -> Module {
        info!(
            "weaving session finished: {} edge(s) woven, {} helper(s) generated",
            self.woven.len(),
            self.set_helpers.len()
        );
        self.module
    }

    fn next_seq(&mut self) -> u32 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }

    /// Weave one property-to-property edge described at the property level.
    pub fn weave_property(
        &mut self,
        from_property: PropertyKey,
        to_property: PropertyKey,
        target: Option<MemberRef>,
        null_check: bool,
        converter: Option<TypeRef>,
    ) -> WeaveResult<()> {
        let from_setter = self.setter_of(from_property)?;
        let from_getter = self.getter_of(from_property)?;
        let to_setter = self.setter_of(to_property)?;
        self.weave(&WeaveRequest {
            source: Either::Right(from_getter),
            from_setter,
            to_setter,
            target,
            null_check,
            converter,
        })
    }

    /// Weave one edge.
    ///
    /// The destination and any pass-through member must be accessible from
    /// the origin's declaring type. Mementos for both endpoint types are
    /// captured lazily and idempotently before any mutation. A concrete
    /// origin is woven directly; a virtual or abstract origin fans out to
    /// every concrete override in the subtype tree and fails when none
    /// exists.
    pub fn weave(&mut self, request: &WeaveRequest) -> WeaveResult<()> {
        let from_declaring = self.module.methods[request.from_setter].declaring;
        if !self.module.is_method_accessible(request.to_setter, from_declaring) {
            return Err(WeaveError::Inaccessible {
                member: self.module.qualified_method_name(request.to_setter),
                from: self.module.types[from_declaring].name.clone(),
            });
        }
        if let Some(member) = request.target {
            if !self.module.is_member_accessible(member, from_declaring) {
                return Err(WeaveError::Inaccessible {
                    member: self.module.member_name(member).to_owned(),
                    from: self.module.types[from_declaring].name.clone(),
                });
            }
        }

        let to_declaring = self.module.methods[request.to_setter].declaring;
        self.ensure_mementos(to_declaring);
        self.ensure_mementos(from_declaring);

        if self.module.methods[request.from_setter].is_polymorphic() {
            self.weave_in_hierarchy(request)
        } else {
            self.weave_direct(request)
        }
    }

    /// Snapshot every rewritable setter reachable from `ty` once.
    ///
    /// Covers the base hierarchy and all derived types, restricted to
    /// setters defined in this assembly; abstract setters have no body to
    /// snapshot. Idempotent per type.
    fn ensure_mementos(&mut self, ty: TypeKey) {
        if !self.memento_complete.insert(ty) {
            return;
        }

        let mut setters: Vec<MethodKey> = Vec::new();
        for derived in self.resolver.derived_types(ty) {
            for &property in &self.module.types[derived].properties {
                setters.extend(self.module.properties[property].setter);
            }
        }
        for property in self.module.properties_in_base_hierarchy(ty).collect::<Vec<_>>() {
            setters.extend(self.module.properties[property].setter);
        }

        for setter in setters {
            if self.mementos.contains_key(setter) {
                continue;
            }
            let declaring = self.module.methods[setter].declaring;
            if self.module.methods[setter].is_abstract()
                || self.module.types[declaring].assembly != self.module.assembly
            {
                continue;
            }
            debug!(
                "capturing memento of `{}`",
                self.module.qualified_method_name(setter)
            );
            self.mementos
                .insert(setter, emit::method_memento(&self.module, setter));
        }
    }

    /// Fan a virtual/abstract origin out across every concrete override.
    fn weave_in_hierarchy(&mut self, request: &WeaveRequest) -> WeaveResult<()> {
        let declaring = self.module.methods[request.from_setter].declaring;
        let name = self.module.methods[request.from_setter].name.clone();
        debug!(
            "fanning `{}` out across the subtype tree",
            self.module.qualified_method_name(request.from_setter)
        );

        let mut found = false;
        for ty in self.resolver.derived_types(declaring) {
            let Some(method) = self.module.method_named(ty, &name) else {
                continue;
            };
            if self.module.methods[method].is_abstract() {
                continue;
            }
            let derived = WeaveRequest {
                from_setter: method,
                ..request.clone()
            };
            self.weave_direct(&derived)?;
            found = true;
        }

        if found {
            Ok(())
        } else {
            Err(WeaveError::MissingNonAbstractSymbol {
                symbol: self.module.qualified_method_name(request.from_setter),
            })
        }
    }

    /// Weave one edge whose origin is concrete.
    fn weave_direct(&mut self, request: &WeaveRequest) -> WeaveResult<()> {
        let edge = EdgeId {
            source: request.source,
            from: request.from_setter,
            to: request.to_setter,
            target: request.target,
        };
        if self.woven.contains(&edge) {
            debug!(
                "edge `{}` -> `{}` already woven, skipping",
                self.module.qualified_method_name(request.from_setter),
                self.module.qualified_method_name(request.to_setter)
            );
            return Ok(());
        }

        // A property setter can re-trigger the graph and must be entered
        // through its helper; an arbitrary callback cannot, so it is
        // called directly.
        let destination = if self.module.property_of_setter(request.to_setter).is_some() {
            self.resolve_set_helper(request.from_setter, request.to_setter)?
        } else {
            request.to_setter
        };

        self.woven.insert(edge);

        let converter = match &request.converter {
            Some(converter) => {
                Some(self.resolve_converter(converter, request.from_setter, request.to_setter)?)
            }
            None => None,
        };

        let command = emit::binding_command(
            &self.module,
            &EmitParameters {
                target: request.target,
                to: destination,
                null_check: request.null_check,
                converter,
            },
            request.source,
        );
        command.append_to(&mut self.module, request.from_setter)?;

        let recorded = RecordedBinding {
            command: command.clone(),
            to_setter: request.to_setter,
        };
        if let Some(list) = self.bindings_for_setter.get_mut(request.from_setter) {
            list.push(recorded);
        } else {
            self.bindings_for_setter
                .insert(request.from_setter, vec![recorded]);
        }

        // Back-patch: every helper built for an earlier edge ending in the
        // current origin must also carry the new propagation, or a chain
        // declared in that order would stop one hop short. The helper
        // whose own origin is the new destination is excluded — patching
        // it would reintroduce the echo the helper exists to prevent.
        let mut patched = 0_usize;
        for (origin, destinations) in &self.writes_into {
            if destinations.contains(&request.from_setter) && request.to_setter != origin {
                let helper = self
                    .set_helpers
                    .get(&(origin, request.from_setter))
                    .copied()
                    .ok_or_else(|| WeaveError::MissingHelper {
                        from: self.module.qualified_method_name(origin),
                        to: self.module.qualified_method_name(request.from_setter),
                    })?;
                command.append_to(&mut self.module, helper)?;
                patched += 1;
            }
        }
        if patched > 0 {
            debug!(
                "back-patched {patched} helper(s) with the edge into `{}`",
                self.module.qualified_method_name(request.to_setter)
            );
        }

        if let Some(set) = self.writes_into.get_mut(request.from_setter) {
            set.insert(request.to_setter);
        } else {
            self.writes_into
                .insert(request.from_setter, BTreeSet::from([request.to_setter]));
        }

        Ok(())
    }

    /// Obtain the memoized set helper for (origin, destination), building
    /// it first when absent.
    ///
    /// A polymorphic destination gets one helper per same-named override
    /// in the assembly; all of them are registered, and the one matching
    /// the literal destination is returned.
    fn resolve_set_helper(&mut self, from: MethodKey, to: MethodKey) -> WeaveResult<MethodKey> {
        if let Some(&helper) = self.set_helpers.get(&(from, to)) {
            return Ok(helper);
        }

        let name = names::set_helper(
            &self.module.qualified_method_name(from),
            &self.module.qualified_method_name(to),
            self.next_seq(),
        );

        let resolved = if self.module.methods[to].is_polymorphic() {
            let mut resolved = None;
            for (override_setter, helper) in self.weave_set_helper_recursive(from, to, &name)? {
                self.set_helpers.insert((from, override_setter), helper);
                if override_setter == to {
                    resolved = Some(helper);
                }
            }
            resolved
        } else {
            let helper = self.build_set_helper(from, to, &name)?;
            self.set_helpers.insert((from, to), helper);
            Some(helper)
        };

        resolved.ok_or_else(|| WeaveError::HelperConstruction {
            from: self.module.qualified_method_name(from),
            to: self.module.qualified_method_name(to),
        })
    }

    /// Build a helper for every same-named, same-assembly override of the
    /// destination across the subtype tree and base hierarchy.
    fn weave_set_helper_recursive(
        &mut self,
        from: MethodKey,
        to: MethodKey,
        name: &str,
    ) -> WeaveResult<Vec<(MethodKey, MethodKey)>> {
        let to_declaring = self.module.methods[to].declaring;
        let to_name = self.module.methods[to].name.clone();
        let to_assembly = self.module.types[to_declaring].assembly;

        let mut seen = BTreeSet::new();
        let mut candidates: Vec<MethodKey> = Vec::new();
        for ty in self.resolver.derived_types(to_declaring) {
            if let Some(method) = self.module.method_named(ty, &to_name) {
                if seen.insert(method) {
                    candidates.push(method);
                }
            }
        }
        for method in self
            .module
            .methods_in_base_hierarchy(to_declaring)
            .collect::<Vec<_>>()
        {
            if self.module.methods[method].name == to_name && seen.insert(method) {
                candidates.push(method);
            }
        }

        let mut helpers = Vec::new();
        for candidate in candidates {
            let declaring = self.module.methods[candidate].declaring;
            if self.module.types[declaring].assembly != to_assembly {
                continue;
            }
            let helper = match self.set_helpers.get(&(from, candidate)) {
                Some(&existing) => existing,
                None => self.build_set_helper(from, candidate, name)?,
            };
            helpers.push((candidate, helper));
        }
        Ok(helpers)
    }

    /// Build one helper: the destination's memento plus every propagation
    /// already recorded for the destination, except the one pointing back
    /// at the requesting origin.
    fn build_set_helper(
        &mut self,
        from: MethodKey,
        to: MethodKey,
        name: &str,
    ) -> WeaveResult<MethodKey> {
        if !self.mementos.contains_key(to) {
            if self.module.methods[to].is_abstract() {
                // Abstract destination: no original body exists, so the
                // helper starts empty and only ever carries propagations.
                return emit::set_helper(&mut self.module, name, to, None);
            }
            return Err(WeaveError::MissingMemento {
                method: self.module.qualified_method_name(to),
            });
        }

        let helper = emit::set_helper(&mut self.module, name, to, self.mementos.get(to))?;
        if let Some(recorded) = self.bindings_for_setter.get(to) {
            for binding in recorded {
                if binding.to_setter != from {
                    binding.command.append_to(&mut self.module, helper)?;
                }
            }
        }
        Ok(helper)
    }

    /// Validate a declared converter against the edge and resolve its
    /// pieces, caching one instance field per (host type, converter type).
    fn resolve_converter(
        &mut self,
        converter: &TypeRef,
        from_setter: MethodKey,
        to_setter: MethodKey,
    ) -> WeaveResult<Converter> {
        let binding = self.module.qualified_method_name(from_setter);
        let Some(definition) = converter.definition() else {
            return Err(WeaveError::NotAConverter {
                converter: converter.display(&self.module).to_string(),
                binding,
            });
        };
        let converter_name = self.module.types[definition].name.clone();

        let implements = self.module.types[definition]
            .interfaces
            .iter()
            .any(|&interface| self.module.types[interface].name.starts_with("ValueConverter"));
        if !implements {
            return Err(WeaveError::NotAConverter {
                converter: converter_name,
                binding,
            });
        }
        if self.module.types[definition].is_abstract {
            return Err(WeaveError::AbstractConverter {
                converter: converter_name,
            });
        }
        if !converter.is_generic() && !self.module.types[definition].generic_params.is_empty() {
            return Err(WeaveError::OpenGenericConverter {
                converter: converter_name,
            });
        }

        let ctor = self.module.types[definition]
            .methods
            .iter()
            .copied()
            .find(|&method| {
                let def = &self.module.methods[method];
                def.is_ctor() && def.params.is_empty() && def.visibility.is_public()
            })
            .ok_or_else(|| WeaveError::MissingDefaultCtor {
                converter: converter_name.clone(),
            })?;

        let from_ty = self.module.methods[from_setter].params[0].ty.clone();
        let to_ty = self.module.methods[to_setter].params[0].ty.clone();
        let arguments: Vec<TypeRef> = match converter {
            TypeRef::Generic { arguments, .. } => arguments.clone(),
            _ => Vec::new(),
        };

        let method = self.module.types[definition]
            .methods
            .iter()
            .copied()
            .find(|&method| {
                let def = &self.module.methods[method];
                if def.is_ctor() || def.params.len() != 1 {
                    return false;
                }
                let Some(ret) = &def.return_type else {
                    return false;
                };
                def.params[0].ty.substitute(&arguments) == from_ty
                    && ret.substitute(&arguments) == to_ty
            })
            .ok_or_else(|| WeaveError::MismatchedConverter {
                converter: converter_name.clone(),
                from: from_ty.display(&self.module).to_string(),
                to: to_ty.display(&self.module).to_string(),
            })?;

        let host = self.module.methods[from_setter].declaring;
        let key = (host, converter.clone());
        let field = match self.converter_fields.get(&key) {
            Some(&field) => field,
            None => {
                let name = names::converter_field(&converter_name, self.next_seq());
                let field = emit::converter_field(&mut self.module, host, converter, &name)?;
                self.converter_fields.insert(key, field);
                field
            }
        };

        Ok(Converter { field, method, ctor })
    }

    /// Resolve (creating when absent) the accessor property that routes a
    /// from-target binding back to its source object, and weave its
    /// population into the binding initializer.
    pub fn weave_accessor(&mut self, request: &AccessorRequest) -> WeaveResult<PropertyKey> {
        let accessor = match self.accessor_in_hierarchy(request.source_type, request.target_type)? {
            Some(existing) => existing,
            None => {
                let created = emit::accessor(
                    &mut self.module,
                    request.target_type,
                    request.source_type,
                    false,
                )?;
                if self.module.types[request.target_type].kind.is_interface() {
                    for implementer in self.resolver.direct_subtypes(request.target_type) {
                        if self
                            .accessor_on_type(request.source_type, implementer)
                            .is_none()
                        {
                            emit::accessor(&mut self.module, implementer, request.source_type, true)?;
                        }
                    }
                }
                created
            }
        };

        let accessor_setter =
            self.module.properties[accessor]
                .setter
                .ok_or_else(|| WeaveError::MissingSetter {
                    property: self.module.properties[accessor].name.clone(),
                })?;

        if self.module.methods[request.binding_initializer].is_abstract() {
            self.weave_abstract_accessor_initialization(accessor_setter, request)?;
        } else {
            emit::accessor_initialization(
                &mut self.module,
                accessor_setter,
                request.binding_initializer,
                request.binding_target,
                request.throw_on_failure,
            )?;
        }
        Ok(accessor)
    }

    fn accessor_on_type(&self, source: TypeKey, target: TypeKey) -> Option<PropertyKey> {
        let name = names::accessor_property(&self.module.types[source].name);
        self.module.property_named(target, &name)
    }

    /// Look an accessor up across the target's interfaces and base
    /// hierarchy. More than one base-hierarchy match means the module is
    /// in a state the engine cannot have produced.
    fn accessor_in_hierarchy(
        &self,
        source: TypeKey,
        target: TypeKey,
    ) -> WeaveResult<Option<PropertyKey>> {
        let name = names::accessor_property(&self.module.types[source].name);
        for &interface in &self.module.types[target].interfaces {
            if let Some(property) = self.module.property_named(interface, &name) {
                return Ok(Some(property));
            }
        }
        let matches: Vec<PropertyKey> = self
            .module
            .properties_in_base_hierarchy(target)
            .filter(|&property| self.module.properties[property].name == name)
            .collect();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(matches[0])),
            _ => Err(WeaveError::AmbiguousAccessor {
                source_ty: self.module.types[source].name.clone(),
                target: self.module.types[target].name.clone(),
            }),
        }
    }

    /// Cascade accessor population into every concrete override of an
    /// abstract binding initializer.
    fn weave_abstract_accessor_initialization(
        &mut self,
        accessor_setter: MethodKey,
        request: &AccessorRequest,
    ) -> WeaveResult<()> {
        let name = self.module.methods[request.binding_initializer].name.clone();
        let declaring = self.module.methods[request.binding_initializer].declaring;
        let concretes = self.concrete_overrides(&name, declaring);
        if concretes.is_empty() {
            return Err(WeaveError::MissingConcreteInitializer {
                initializer: self.module.qualified_method_name(request.binding_initializer),
            });
        }
        for concrete in concretes {
            emit::accessor_initialization(
                &mut self.module,
                accessor_setter,
                concrete,
                request.binding_target,
                request.throw_on_failure,
            )?;
        }
        Ok(())
    }

    /// Depth-first search for concrete implementations of a named method:
    /// a concrete match on a type ends the descent into that branch.
    fn concrete_overrides(&self, name: &str, ty: TypeKey) -> Vec<MethodKey> {
        if let Some(method) = self.module.method_named(ty, name) {
            if !self.module.methods[method].is_abstract() {
                return vec![method];
            }
        }
        let mut found = Vec::new();
        for subtype in self.resolver.direct_subtypes(ty) {
            found.extend(self.concrete_overrides(name, subtype));
        }
        found
    }

    fn setter_of(&self, property: PropertyKey) -> WeaveResult<MethodKey> {
        self.module.properties[property]
            .setter
            .ok_or_else(|| WeaveError::MissingSetter {
                property: self.module.properties[property].name.clone(),
            })
    }

    fn getter_of(&self, property: PropertyKey) -> WeaveResult<MethodKey> {
        self.module.properties[property]
            .getter
            .ok_or_else(|| WeaveError::MissingGetter {
                property: self.module.properties[property].name.clone(),
            })
    }
}
