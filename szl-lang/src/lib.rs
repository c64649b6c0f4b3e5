//! Front-end AST transforms of the Sawzall language.
//!
//! The centerpiece is [`WhenAnalyzer`], which rewrites a declarative
//! `when (quantifiers; cond) body` statement into explicit bounded loops
//! with out-of-range protection, over an arena-allocated [`Program`].
//! [`eval`] hosts a small reference evaluator used to exercise the
//! lowered loops.

pub mod ast;
pub mod eval;
mod when;

pub use ast::{
    BinOp, DeclId, Expr, ExprId, Intrinsic, LoopSort, Program, QuantKind, Stmt, StmtId, Type,
    VarDecl,
};
pub use when::{AnalysisError, WhenAnalyzer};
