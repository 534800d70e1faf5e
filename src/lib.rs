//! Ahead-of-time compiler from Titan, a statically typed dialect of Lua, to
//! native extension modules loadable by the stock interpreter.
//!
//! The pipeline is strictly linear: source text is parsed into a raw tree,
//! scope analysis binds every name to its declaration, the checker annotates
//! every expression with its type, the coder lowers the tree to a C
//! translation unit against the Lua 5.3 internals, and the driver runs the
//! external C toolchain down to a shared object.

#![deny(clippy::allow_attributes_without_reason)]
#![deny(clippy::todo)]

pub mod ast;
pub mod c_compiler;
pub mod checker;
pub mod coder;
pub mod diagnostic;
pub mod driver;
pub mod emit_lua;
pub mod location;
pub mod parser;
pub mod pretty;
pub mod scope_analysis;
pub mod symtab;
pub mod template;
pub mod types;
