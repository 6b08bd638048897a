use strum::EnumIs;
use thiserror::Error;
use weftir::error::IrError;

/// Everything that can go wrong during a weaving session.
///
/// All validation is synchronous and fail-fast at weave time; none of these
/// are recoverable by retrying, and a single failed edge fails the whole
/// session.
#[derive(Debug, PartialEq, Eq, EnumIs, Error)]
pub enum WeaveError {
    // --- symbol resolution ---
    #[error("Property `{property}` has no setter, so nothing can be bound to or from it.")]
    MissingSetter { property: String },

    #[error("Property `{property}` has no getter to read the propagated value from.")]
    MissingGetter { property: String },

    #[error("Cannot find property `{property}` on target type `{ty}`.")]
    MissingTargetProperty { ty: String, property: String },

    #[error(
        "No non-abstract override of `{symbol}` exists anywhere in the subtype tree. There is no method body to weave the binding into."
    )]
    MissingNonAbstractSymbol { symbol: String },

    #[error(
        "Cannot find a binding initializer on type `{ty}`. Declare one method that populates the binding targets and name it in the declaration."
    )]
    MissingBindingInitializer { ty: String },

    #[error("Cannot find method `{method}` on target type `{ty}`.")]
    MissingTargetMethod { ty: String, method: String },

    #[error(
        "Binding initializer `{initializer}` is abstract and no concrete override of it exists in any subtype."
    )]
    MissingConcreteInitializer { initializer: String },

    #[error("Member `{member}` does not yield a bindable object (it has no return type).")]
    MemberHasNoValue { member: String },

    // --- accessibility ---
    #[error("`{member}` is not accessible from `{from}`.")]
    Inaccessible { member: String, from: String },

    // --- structural invariant violations ---
    #[error(
        "Multiple accessor properties for `{source_ty}` were found on `{target}`. Cannot decide which one routes the binding."
    )]
    AmbiguousAccessor { source_ty: String, target: String },

    #[error("Weaving the set helper from `{from}` to `{to}` produced no helper for the requested destination.")]
    HelperConstruction { from: String, to: String },

    #[error(
        "No method memento exists for the non-abstract setter `{method}`. Mementos must be captured before any helper referencing the setter is built."
    )]
    MissingMemento { method: String },

    #[error(
        "No set helper is registered for the edge `{from}` -> `{to}` even though the edge is recorded as woven."
    )]
    MissingHelper { from: String, to: String },

    // --- converter shape ---
    #[error("`{converter}` does not implement a value-converter interface, but the binding on `{binding}` names it as one.")]
    NotAConverter { converter: String, binding: String },

    #[error("Converter `{converter}` is abstract and cannot be instantiated.")]
    AbstractConverter { converter: String },

    #[error(
        "Converter `{converter}` is an open generic type. Bindings must name a fully instantiated converter."
    )]
    OpenGenericConverter { converter: String },

    #[error("Converter `{converter}` has no public parameterless constructor.")]
    MissingDefaultCtor { converter: String },

    #[error("Converter `{converter}` has no conversion method accepting `{from}` and returning `{to}`.")]
    MismatchedConverter {
        converter: String,
        from: String,
        to: String,
    },

    #[error(transparent)]
    Ir(#[from] IrError),
}

pub type WeaveResult<T> = Result<T, WeaveError>;
