//! Everything that runs between parsing and code generation: name
//! resolution, type inference, call resolution, symbolic evaluation and the
//! passes that rewrite the program with what they learn.

pub mod instance;
pub mod pass;
pub mod passes;
pub mod reference_map;
pub mod resolve;
pub mod substitution;
pub mod symbolic;
pub mod type_map;
