//! Passes and the pass manager that sequences them.
//!
//! A pass takes the program and returns the program it leaves behind, which
//! is the very same `Rc` when it changed nothing. Everything a pass needs
//! besides the tree (resolved names, types, the diagnostics sink and the
//! options) travels in the [`CompilationContext`].

use std::rc::Rc;

use thiserror::Error;

use super::{reference_map::ReferenceMap, type_map::TypeMap};
use crate::{
    diagnostics::{CompilerBug, Diagnostics},
    ir::Program,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Abort after any pass that reported an error
    pub stop_on_error: bool,
    /// Upper bound on the sweeps of the parser fixed-point analysis
    pub max_parser_iterations: usize,
    /// Names of the transformation passes to run; `None` runs all of them.
    /// Name resolution and type inference always run.
    pub passes: Option<Vec<String>>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            stop_on_error: false,
            max_parser_iterations: 16,
            passes: None,
        }
    }
}

impl PipelineOptions {
    pub fn is_enabled(&self, pass: &str) -> bool {
        match &self.passes {
            Some(passes) => passes.iter().any(|p| p.eq_ignore_ascii_case(pass)),
            None => true,
        }
    }
}

#[derive(Debug, Default)]
pub struct CompilationContext {
    pub reference_map: ReferenceMap,
    pub type_map: TypeMap,
    pub diagnostics: Diagnostics,
    pub options: PipelineOptions,
}

impl CompilationContext {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("compiler bug: {0}")]
    Bug(#[from] CompilerBug),
    #[error("aborting after {pass} due to {count} previous error(s)")]
    Errors { pass: String, count: usize },
}

pub trait Pass {
    fn name(&self) -> &str;

    fn run(
        &mut self,
        program: Rc<Program>,
        context: &mut CompilationContext,
    ) -> Result<Rc<Program>, PipelineError>;
}

/// A named sequence of passes, itself a pass so that sequences nest
pub struct PassManager {
    name: String,
    passes: Vec<Box<dyn Pass>>,
    stop_on_error: bool,
}

impl PassManager {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passes: Vec::new(),
            stop_on_error: false,
        }
    }

    /// Always abort after a pass of this sequence that reported an error,
    /// whatever the pipeline options say
    pub fn stop_on_error(mut self) -> Self {
        self.stop_on_error = true;
        self
    }

    pub fn with(mut self, pass: impl Pass + 'static) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn push(&mut self, pass: impl Pass + 'static) {
        self.passes.push(Box::new(pass));
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn pass_names(&self) -> impl Iterator<Item = &str> {
        self.passes.iter().map(|pass| pass.name())
    }
}

impl core::fmt::Debug for PassManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassManager")
            .field("name", &self.name)
            .field("passes", &self.pass_names().collect::<Vec<_>>())
            .field("stop_on_error", &self.stop_on_error)
            .finish()
    }
}

impl Pass for PassManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(
        &mut self,
        mut program: Rc<Program>,
        context: &mut CompilationContext,
    ) -> Result<Rc<Program>, PipelineError> {
        for pass in self.passes.iter_mut() {
            let errors_before = context.diagnostics.error_count();
            let bugs_before = context.diagnostics.bug_count();
            let before = program.clone();

            log::debug!("{} > running {}", self.name, pass.name());
            program = pass.run(program, context)?;
            log::debug!(
                "{} > {} {}",
                self.name,
                pass.name(),
                if Rc::ptr_eq(&before, &program) {
                    "left the program unchanged"
                } else {
                    "rewrote the program"
                }
            );

            if context.diagnostics.bug_count() > bugs_before {
                return Err(PipelineError::Bug(CompilerBug::Internal(format!(
                    "{} reported an internal error",
                    pass.name()
                ))));
            }

            let errors = context.diagnostics.error_count();
            if errors > errors_before && (self.stop_on_error || context.options.stop_on_error) {
                return Err(PipelineError::Errors {
                    pass: pass.name().to_owned(),
                    count: errors,
                });
            }
        }

        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        diagnostics::report_error,
        ir::{build::*, Span},
    };

    /// Replaces the program with an empty one and counts its runs
    struct Clear(Rc<std::cell::Cell<usize>>);

    impl Pass for Clear {
        fn name(&self) -> &str {
            "Clear"
        }

        fn run(
            &mut self,
            _program: Rc<Program>,
            _context: &mut CompilationContext,
        ) -> Result<Rc<Program>, PipelineError> {
            self.0.set(self.0.get() + 1);
            Ok(Program::new(Vec::new()))
        }
    }

    struct Complain;

    impl Pass for Complain {
        fn name(&self) -> &str {
            "Complain"
        }

        fn run(
            &mut self,
            program: Rc<Program>,
            context: &mut CompilationContext,
        ) -> Result<Rc<Program>, PipelineError> {
            report_error!(context.diagnostics, Span::dummy(), "bad input");
            Ok(program)
        }
    }

    struct Crash;

    impl Pass for Crash {
        fn name(&self) -> &str {
            "Crash"
        }

        fn run(
            &mut self,
            _program: Rc<Program>,
            _context: &mut CompilationContext,
        ) -> Result<Rc<Program>, PipelineError> {
            Err(CompilerBug::Internal("broken invariant".to_owned()).into())
        }
    }

    fn program() -> Rc<Program> {
        Program::new(vec![constant("k", bits(8), sized(1, 8))])
    }

    #[test]
    fn threads_the_program_through_nested_managers() {
        let runs = Rc::new(std::cell::Cell::new(0));
        let mut manager = PassManager::new("outer")
            .with(PassManager::new("inner").with(Clear(runs.clone())))
            .with(Clear(runs.clone()));

        let output = manager
            .run(program(), &mut CompilationContext::default())
            .unwrap();
        assert!(output.declarations.is_empty());
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn errors_stop_the_pipeline_only_when_asked() {
        let runs = Rc::new(std::cell::Cell::new(0));

        let mut lenient = PassManager::new("lenient")
            .with(Complain)
            .with(Clear(runs.clone()));
        let mut context = CompilationContext::default();
        assert!(lenient.run(program(), &mut context).is_ok());
        assert_eq!(runs.get(), 1);

        let mut strict = PassManager::new("strict")
            .stop_on_error()
            .with(Complain)
            .with(Clear(runs.clone()));
        assert_eq!(
            strict.run(program(), &mut context).unwrap_err(),
            PipelineError::Errors {
                pass: "Complain".to_owned(),
                count: 2
            }
        );
        assert_eq!(runs.get(), 1);

        let mut configured = PassManager::new("configured")
            .with(Complain)
            .with(Clear(runs.clone()));
        let mut context = CompilationContext::new(PipelineOptions {
            stop_on_error: true,
            ..Default::default()
        });
        assert!(configured.run(program(), &mut context).is_err());
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn bugs_always_abort() {
        let runs = Rc::new(std::cell::Cell::new(0));
        let mut manager = PassManager::new("p")
            .with(Crash)
            .with(Clear(runs.clone()));

        assert!(matches!(
            manager.run(program(), &mut CompilationContext::default()),
            Err(PipelineError::Bug(_))
        ));
        assert_eq!(runs.get(), 0);
    }
}
