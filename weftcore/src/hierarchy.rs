//! Subtype lookup over the module's declared hierarchy.
//!
//! Polymorphic weaving decisions (virtual fan-out, helper generation per
//! override, abstract-initializer cascades) are modeled as explicit
//! traversals over this resolver's output rather than ad hoc runtime type
//! inspection. The resolver is built once per weaving session; weaving
//! adds members to existing types but never adds types, so the snapshot
//! stays valid for the whole session.
use petgraph::prelude::DiGraphMap;
use std::collections::BTreeSet;
use weftir::module::{Module, TypeKey};

/// The subtype capability the weaving engine depends on.
pub trait HierarchyResolver {
    /// The type itself plus every transitively known subtype and
    /// implementer within the module.
    ///
    /// The root is included so that a concrete virtual origin setter is
    /// itself woven during fan-out; abstract roots are skipped by their
    /// flag, not by absence.
    fn derived_types(&self, ty: TypeKey) -> Vec<TypeKey>;

    /// Immediate subtypes and implementers only.
    fn direct_subtypes(&self, ty: TypeKey) -> Vec<TypeKey>;
}

/// Resolver backed by the module's base-class and interface edges.
pub struct ModuleHierarchy {
    graph: DiGraphMap<TypeKey, ()>,
}

impl ModuleHierarchy {
    pub fn of(module: &Module) -> Self {
        let mut graph = DiGraphMap::new();
        for (key, def) in &module.types {
            graph.add_node(key);
            if let Some(base) = def.base {
                graph.add_edge(base, key, ());
            }
            for &interface in &def.interfaces {
                graph.add_edge(interface, key, ());
            }
        }
        Self { graph }
    }
}

impl HierarchyResolver for ModuleHierarchy {
    fn derived_types(&self, ty: TypeKey) -> Vec<TypeKey> {
        let mut seen = BTreeSet::new();
        let mut order = Vec::new();
        let mut stack = vec![ty];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            order.push(current);
            stack.extend(self.graph.neighbors(current));
        }
        order
    }

    fn direct_subtypes(&self, ty: TypeKey) -> Vec<TypeKey> {
        self.graph.neighbors(ty).collect()
    }
}
