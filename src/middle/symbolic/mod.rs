//! Symbolic evaluation: executing the program over abstract values to learn
//! which facts hold on every path.

pub mod evaluator;
pub mod parser;
pub mod value;

pub use evaluator::{Flow, Issue, SymbolicEvaluator, ValueMap};
pub use parser::ParserAnalysis;
pub use value::{Abstract, Initial, StandardException, SymbolicValue};
