//! References to value types.
//!
//! A [`TypeRef`] is how properties, parameters and fields name the type of
//! the values they carry. Scalar leaves exist so bindings between plain
//! values do not require registering primitive types in the module; the
//! `Generic`/`Param` pair carries just enough structure for converter
//! signature matching with generic substitution.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::EnumIs;

use crate::module::TypeKey;

/// Reference to the type of a value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TypeRef {
    /// 64-bit signed integer scalar.
    Int,
    /// 64-bit floating-point scalar.
    Float,
    /// Owned string scalar.
    Str,
    /// A declared type, referenced by handle.
    Named(TypeKey),
    /// An instantiation of a generic type definition.
    Generic {
        definition: TypeKey,
        arguments: Vec<TypeRef>,
    },
    /// A generic parameter of the enclosing type definition, by position.
    ///
    /// Only meaningful inside member signatures of a generic type; it is
    /// resolved against an instantiation's arguments via [`TypeRef::substitute`].
    Param(u16),
}

impl TypeRef {
    /// The declared type this reference resolves to, if any.
    ///
    /// Scalars and unresolved generic parameters have no definition.
    pub fn definition(&self) -> Option<TypeKey> {
        match self {
            TypeRef::Named(key) => Some(*key),
            TypeRef::Generic { definition, .. } => Some(*definition),
            _ => None,
        }
    }

    /// Replace generic parameters with the given instantiation arguments.
    ///
    /// Parameters without a matching argument are left untouched, which
    /// makes signature comparison against an open signature fail instead
    /// of silently matching.
    pub fn substitute(&self, arguments: &[TypeRef]) -> TypeRef {
        match self {
            TypeRef::Param(index) => arguments
                .get(*index as usize)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            TypeRef::Generic {
                definition,
                arguments: inner,
            } => TypeRef::Generic {
                definition: *definition,
                arguments: inner.iter().map(|arg| arg.substitute(arguments)).collect(),
            },
            other => other.clone(),
        }
    }
}
