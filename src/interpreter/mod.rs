//! Script compilation and execution.
//!
//! Part scripts are written as S-expressions. The [`parser`] reads the text,
//! the [`builder`] turns the forms into the typed [`ir`], and [`exec`] runs
//! handlers against an [`Engine`](crate::runtime::engine::Engine). The
//! runtime only depends on the [`ScriptCompiler`] seam, so another front end
//! can be plugged in.

/// Abstract syntax tree definitions for script text.
pub mod ast;
/// Builders that translate parsed scripts into the IR.
pub mod builder;
/// Statement executor and expression evaluator.
pub mod exec;
/// Typed intermediate representation structures.
pub mod ir;
/// Parser for script text.
pub mod parser;

pub use ast::ScriptSource;
pub use builder::build_script;
pub use exec::{Executor, Flow};
pub use ir::{Handler, Script, Statement, StatementKind};
pub use parser::parse_script;

use crate::runtime::error::ScriptResult;

/// Turns script text into a compiled [`Script`].
pub trait ScriptCompiler: Send + Sync {
    /// Compile `source`; malformed text is a syntax error.
    fn compile(&self, source: &str) -> ScriptResult<Script>;
}

/// Compiler for the S-expression script language.
#[derive(Debug, Clone, Copy, Default)]
pub struct SexprCompiler;

impl ScriptCompiler for SexprCompiler {
    fn compile(&self, source: &str) -> ScriptResult<Script> {
        let parsed = parse_script(source)?;
        build_script(&parsed)
    }
}
