use strum::EnumIs;
use thiserror::Error;

#[derive(Debug, PartialEq, Eq, EnumIs, Error)]
pub enum IrError {
    /// The body of an abstract method does not exist, so nothing can be
    /// appended to it. Polymorphic callers must fan out to a concrete
    /// override before emitting.
    #[error(
        "Method `{method}` is abstract and therefore has no body. Instructions can only be appended to methods that carry a body."
    )]
    AppendToAbstract { method: String },

    /// A member with the same name already exists on the type.
    #[error(
        "Type `{ty}` already declares a member named `{member}`. Member names must be unique within their declaring type."
    )]
    DuplicateMember { ty: String, member: String },

    /// An instruction refers to a parameter slot the method does not declare.
    #[error(
        "Parameter index {index} is out of range for method `{method}`, which declares {count} parameter(s)."
    )]
    ParamOutOfRange {
        method: String,
        index: u16,
        count: usize,
    },
}

pub type IrResult<T> = Result<T, IrError>;
