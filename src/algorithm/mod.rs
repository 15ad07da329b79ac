//! Algorithm implementations for record linkage
//!
//! The linkage engine lives in [`linkage`]: blocking, comparison,
//! acceptance, pass orchestration and cardinality resolution.

pub mod linkage;
