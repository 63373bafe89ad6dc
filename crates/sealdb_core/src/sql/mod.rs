//! SQL front end: tokenizer, syntax tree and parser.
//!
//! The accepted surface is deliberately small: single-table SELECT with
//! WHERE, ORDER BY and LIMIT; single-row INSERT; UPDATE; DELETE; CREATE and
//! DROP for tables and indexes. WHERE clauses are flat: AND binds tighter
//! than OR, and parentheses are not accepted.

pub mod ast;
pub mod lexer;
mod parser;

pub use ast::{
    Assignment, Comparison, Condition, CreateIndex, CreateTable, Delete, DropIndex, DropTable,
    Insert, OrderKey, Predicate, Projection, Select, Statement, Update,
};
pub use parser::parse;
