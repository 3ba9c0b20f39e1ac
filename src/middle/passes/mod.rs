//! The rewriting and checking passes, and the pipelines built from them.

use super::{
    pass::{Pass, PassManager, PipelineOptions},
    resolve::ResolveReferences,
    type_map::TypeInference,
};

pub mod call_graph;
pub mod check_parsers;
pub mod constant_folding;
pub mod default_arguments;
pub mod eliminate_verify;
pub mod register_read_write;
pub mod remove_complex_expressions;
pub mod remove_returns;
pub mod simplify_conditionals;
pub mod stateful_alu;

pub use call_graph::{CalleeKind, CallGraph, CallGraphEdge};
pub use check_parsers::CheckParsers;
pub use constant_folding::ConstantFolding;
pub use default_arguments::DefaultArguments;
pub use eliminate_verify::EliminateVerify;
pub use register_read_write::RegisterReadWrite;
pub use remove_complex_expressions::RemoveComplexExpressions;
pub use remove_returns::RemoveReturns;
pub use simplify_conditionals::SimplifyConditionals;
pub use stateful_alu::SynthesizeStatefulAlu;

/// Name resolution followed by type inference. Nothing after it can work on
/// a program with unresolved names, so it always stops on error.
pub fn type_checking() -> PassManager {
    PassManager::new("TypeChecking")
        .stop_on_error()
        .with(ResolveReferences)
        .with(TypeInference)
}

/// Every pass in its standard order. Passes that rewrite the program are
/// each followed by a fresh round of type checking so that the next pass
/// sees resolved names and types for the nodes just created.
pub fn standard_pipeline(options: &PipelineOptions) -> PassManager {
    let mut pipeline = PassManager::new("MidEnd").with(type_checking());

    rewrite(&mut pipeline, options, DefaultArguments);
    rewrite(&mut pipeline, options, RemoveReturns);
    rewrite(&mut pipeline, options, SynthesizeStatefulAlu);
    rewrite(&mut pipeline, options, RegisterReadWrite);
    rewrite(&mut pipeline, options, EliminateVerify);
    rewrite(&mut pipeline, options, ConstantFolding);
    rewrite(&mut pipeline, options, SimplifyConditionals);
    rewrite(&mut pipeline, options, RemoveComplexExpressions);

    if options.is_enabled("CheckParsers") {
        pipeline.push(CheckParsers);
    }

    pipeline
}

fn rewrite(pipeline: &mut PassManager, options: &PipelineOptions, pass: impl Pass + 'static) {
    if options.is_enabled(pass.name()) {
        pipeline.push(pass);
        pipeline.push(type_checking());
    } else {
        log::debug!("skipping {}", pass.name());
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::rc::Rc;

    use crate::{
        ir::{prelude, DeclarationKind, Program, Statement},
        middle::pass::{CompilationContext, Pass},
    };

    /// The prelude plus `declarations`, resolved and typed
    pub fn compile(
        declarations: Vec<Rc<crate::ir::Declaration>>,
    ) -> (Rc<Program>, CompilationContext) {
        let mut all = prelude::standard_prelude();
        all.extend(declarations);

        let mut context = CompilationContext::default();
        let program = super::type_checking()
            .run(Program::new(all), &mut context)
            .unwrap();
        assert!(
            context.diagnostics.is_empty(),
            "{:?}",
            context.diagnostics.iter().map(|d| d.render_plain()).collect::<Vec<_>>()
        );

        (program, context)
    }

    /// Re-runs type checking on a rewritten program, asserting it stays clean
    pub fn recheck(program: Rc<Program>, context: &mut CompilationContext) -> Rc<Program> {
        let program = super::type_checking().run(program, context).unwrap();
        assert!(
            context.diagnostics.is_empty(),
            "{:?}",
            context.diagnostics.iter().map(|d| d.render_plain()).collect::<Vec<_>>()
        );
        program
    }

    /// The statements of the top-level action, control or function `name`,
    /// one rendered statement per entry
    pub fn body_of(program: &Program, name: &str) -> Vec<String> {
        let declaration = program
            .find(name)
            .unwrap_or_else(|| panic!("no declaration `{name}`"));

        let statements: &[Rc<Statement>] = match &declaration.kind {
            DeclarationKind::Action { body, .. }
            | DeclarationKind::Control { body, .. }
            | DeclarationKind::Function { body, .. } => &body.statements,
            _ => panic!("`{name}` has no body"),
        };

        statements.iter().map(|statement| statement.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_honours_the_pass_selection() {
        let all = standard_pipeline(&PipelineOptions::default());
        let names = all.pass_names().collect::<Vec<_>>();
        assert_eq!(names[0], "TypeChecking");
        assert!(names.contains(&"EliminateVerify"));
        assert_eq!(names.last(), Some(&"CheckParsers"));

        let options = PipelineOptions {
            passes: Some(vec!["eliminateverify".to_owned()]),
            ..Default::default()
        };
        let names = standard_pipeline(&options)
            .pass_names()
            .map(str::to_owned)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["TypeChecking", "EliminateVerify", "TypeChecking"]);
    }
}
