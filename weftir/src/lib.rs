//! Module-under-construction IR for the weft binding weaver.
//!
//! The crate models a single assembly's types, properties, methods and
//! fields as arenas addressed by stable handles, and represents every
//! method body as an abstract ordered instruction list whose only mutation
//! is appending at the tail. The weaving engine and the instruction
//! emitter operate exclusively over these handles, never over live object
//! references, so snapshots of a body stay valid while the body itself is
//! being rewritten.

pub mod error;
pub mod fmt;
pub mod instr;
pub mod module;
pub mod typeref;
