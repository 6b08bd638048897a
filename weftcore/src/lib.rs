//! Weaving engine for compile-time property bindings.
//!
//! The crate rewrites method bodies of a [`weftir::module::Module`] so that
//! writing one declared property propagates the value into other bound
//! properties, across object chains and type-hierarchy boundaries, without
//! any runtime observer machinery. Most consumers will interact with
//! [`weaver::Weaver`] through the declaration layer in [`binder`] and, in
//! tests, exercise the woven output through [`sandbox`].

pub mod binder;
pub mod emit;
pub mod hierarchy;
pub mod sandbox;
#[cfg(any(test, feature = "test-utils"))]
pub mod tests_utils;
pub mod utils;
pub mod weaver;
