//! Mid-end passes for P4 programs: an immutable, shared IR with generic
//! traversals, name and type resolution, a symbolic evaluator, and the
//! rewriting passes built on top of them.

pub mod diagnostics;
pub mod index;
pub mod ir;
pub mod middle;
