//! Abstract method-body instructions.
//!
//! A method body is an ordered list of [`Instr`] values evaluated against
//! an implicit operand stack. The set is deliberately tiny: it is the
//! minimum needed to express setter logic and appended propagation
//! sequences, with no commitment to any binary instruction encoding.
//! Rewriting only ever appends at the tail of a body.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use auto_enums::auto_enum;
use strum::{EnumDiscriminants, EnumIs};

use crate::module::{FieldKey, MethodKey};

/// How a call site binds to its callee.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Dispatch {
    /// The named method is invoked exactly.
    Static,
    /// The most derived override for the receiver's runtime type is invoked.
    Virtual,
}

/// A call site: callee handle plus dispatch mode.
///
/// The receiver and arguments are taken from the operand stack, receiver
/// below arguments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Call {
    pub method: MethodKey,
    pub dispatch: Dispatch,
}

/// Push a field value, lazily constructing it first when unset.
///
/// Used for generated converter instance fields: the field starts out
/// null and is populated via the converter's parameterless constructor on
/// first use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FieldOrNew {
    pub field: FieldKey,
    pub ctor: MethodKey,
}

/// One element of a method body.
#[derive(Clone, Debug, PartialEq, Eq, Hash, EnumIs, EnumDiscriminants)]
#[strum_discriminants(name(InstrKind))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Instr {
    /// Push the receiver.
    LoadSelf,
    /// Push the argument at the given index (0 = first explicit parameter).
    LoadParam(u16),
    /// Pop an object reference, push the value of its field.
    LoadField(FieldKey),
    /// Pop a value, pop an object reference, store the value into its field.
    StoreField(FieldKey),
    /// Pop arguments and receiver, invoke, push the result if any.
    Call(Call),
    /// Pop an object reference, push its field, constructing the field
    /// value first when it is still unset.
    FieldOrNew(FieldOrNew),
    /// Pop a value; when null, skip the region. Otherwise push the value
    /// back and execute the region in place.
    IfNotNull(Vec<Instr>),
}

impl Instr {
    /// Methods this single instruction invokes (regions not included; use
    /// [`Instr::flatten`] first for region-transparent traversal).
    #[auto_enum(Iterator)]
    pub fn called_methods(&self) -> impl Iterator<Item = MethodKey> {
        match self {
            Instr::Call(call) => std::iter::once(call.method),
            Instr::FieldOrNew(init) => std::iter::once(init.ctor),
            _ => std::iter::empty(),
        }
    }

    /// Pre-order traversal of a body, descending into null-guard regions.
    pub fn flatten(body: &[Instr]) -> Flatten<'_> {
        Flatten {
            stack: vec![body.iter()],
        }
    }
}

/// Iterator state of [`Instr::flatten`].
pub struct Flatten<'a> {
    stack: Vec<std::slice::Iter<'a, Instr>>,
}

impl<'a> Iterator for Flatten<'a> {
    type Item = &'a Instr;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.last_mut()?;
            match top.next() {
                Some(instr) => {
                    if let Instr::IfNotNull(region) = instr {
                        self.stack.push(region.iter());
                    }
                    return Some(instr);
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

/// Count how often a body invokes the given method, including calls inside
/// null-guard regions.
pub fn count_calls(body: &[Instr], method: MethodKey) -> usize {
    Instr::flatten(body)
        .flat_map(Instr::called_methods)
        .filter(|&callee| callee == method)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(method: MethodKey) -> Instr {
        Instr::Call(Call {
            method,
            dispatch: Dispatch::Static,
        })
    }

    #[test]
    fn flatten_descends_into_guard_regions() {
        let body = vec![
            Instr::LoadSelf,
            Instr::IfNotNull(vec![Instr::LoadParam(0), call(MethodKey::default())]),
        ];

        let kinds: Vec<InstrKind> = Instr::flatten(&body).map(InstrKind::from).collect();
        assert_eq!(
            kinds,
            vec![
                InstrKind::LoadSelf,
                InstrKind::IfNotNull,
                InstrKind::LoadParam,
                InstrKind::Call,
            ]
        );
    }

    #[test]
    fn count_calls_sees_through_regions() {
        let method = MethodKey::default();
        let body = vec![
            call(method),
            Instr::IfNotNull(vec![call(method)]),
        ];
        assert_eq!(count_calls(&body, method), 2);
    }
}
