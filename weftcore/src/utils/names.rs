//! Names of generated members.
//!
//! Every synthesized member carries the reserved `__weft` prefix except
//! accessor properties, whose name doubles as the lookup key for reuse
//! across weaves and therefore stays the sanitized source type name.
//! Uniqueness of helper and converter-field names comes from the session's
//! deterministic sequence counter, so re-running the same declarations
//! yields identical output.

/// Replace everything outside `[A-Za-z0-9]` with underscores.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Name of the generated accessor property caching a `source`-typed
/// instance on a target type.
pub fn accessor_property(source_type: &str) -> String {
    sanitize(source_type)
}

/// Backing field of a generated accessor property.
pub fn accessor_backing_field(property: &str) -> String {
    format!("__weft_{property}_backing")
}

/// Name of a set helper for the directed pair (origin setter, destination
/// setter). Callers pass qualified setter names.
pub fn set_helper(from_setter: &str, to_setter: &str, seq: u32) -> String {
    format!(
        "__weft_from_{}_to_{}_{seq}",
        sanitize(from_setter),
        sanitize(to_setter)
    )
}

/// Name of a cached converter instance field.
pub fn converter_field(converter: &str, seq: u32) -> String {
    format!("__weft_converter_{}_{seq}", sanitize(converter))
}
