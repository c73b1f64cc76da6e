//! Card compiler.
//!
//! Turns a [`RawCard`] (schema source, per-format templates, static data and
//! an optional parent reference) into a [`CompiledCard`]: fields merged
//! across the adoption chain, templates rewritten so field references become
//! inlined markup or component invocations, and every generated module
//! handed to the host's `define` capability.
//!
//! # Usage
//!
//! ```ignore
//! let compiled = Compiler::default().compile(&host, &raw).await?;
//! ```

#![warn(missing_docs)]

mod ancestry;
pub mod card;
pub mod codegen;
pub mod compiler;
pub mod error;
pub mod schema;

pub use card::{Arity, CompiledCard, ComponentInfo, FieldSpec, RawCard, ResolvedField};
pub use compiler::{
    CompileHost, Compiler, CompilerOptions, DEFAULT_INLINE_THRESHOLD, SCHEMA_MODULE,
};
pub use error::{CompileError, Cycle, RealmError};
