//! `liquid_pt` is a from-scratch implementation of the Liquid template
//! language: a streaming lexer, a precedence-climbing pushdown parser, a
//! tree-walking renderer, a constant-folding optimizer, and a register-based
//! bytecode compiler/VM, all sharing one [`Node`]/[`Value`] model.
//!
//! # Overview
//!
//! A template's lifecycle runs through up to four stages:
//!
//! 1. **Parse** — [`parser::parse_appropriate`] (or [`parser::Parser`]
//!    directly) turns source text into a [`Node`] tree, against a
//!    [`Context`] that supplies the registered tags/operators/filters.
//! 2. **Optimize** (optional) — [`optimize::Optimizer`] folds any subtree
//!    whose value doesn't depend on the current store into a literal.
//! 3. **Render**, by one of two paths:
//!    - tree-walking: [`render::Renderer`] walks the `Node` directly.
//!    - bytecode: [`compile::compile_program`] lowers the tree to a
//!      [`bytecode::Program`], then [`vm::run_program`] (or [`vm::Vm`]
//!      directly) executes it.
//!
//! # Example
//!
//! ```
//! use liquid_pt::dialect::standard_context;
//! use liquid_pt::parser::parse_appropriate;
//! use liquid_pt::render::Renderer;
//! use liquid_pt::value::{MapResolver, Value};
//! use std::rc::Rc;
//!
//! let context = Rc::new(standard_context().unwrap());
//! let node = parse_appropriate("Hello, {{ name | upcase }}!", &context).unwrap();
//!
//! let mut resolver = MapResolver::new();
//! resolver.insert("name", Value::str("world"));
//!
//! let renderer = Renderer::new(context);
//! let (output, _warnings) = renderer.render(&node, &mut resolver).unwrap();
//! assert_eq!(output, "Hello, WORLD!");
//! ```
//!
//! # License
//! `liquid_pt` is provided under the MIT OR Apache-2.0 license.
pub mod bytecode;
pub mod compile;
pub mod context;
pub mod dialect;
pub mod error;
pub mod field_tree;
pub mod lexer;
pub mod node;
pub mod optimize;
pub mod parser;
pub mod position;
pub mod render;
mod util;
pub mod value;
pub mod vm;

pub use context::Context;
pub use error::{CompileError, ImplementationError, LexError, ParseError, RenderError, Warning};
pub use node::Node;
pub use render::Renderer;
pub use value::{Value, VariableResolver};
