//! Runs the parser analysis over every parser and reports what it finds:
//! failures on some path (reading uninitialized values, extracting into an
//! already-valid header, ...), states no path reaches, and loops the
//! analysis could not settle within its sweep budget. All are warnings.

use std::rc::Rc;

use crate::{
    diagnostics::{report_warning, CompilerBug, Diagnostics},
    ir::{
        visit::{inspect_program, Context, Inspector},
        Declaration, DeclarationKind, Program,
    },
    middle::{
        pass::{CompilationContext, Pass, PipelineError},
        reference_map::ReferenceMap,
        symbolic::ParserAnalysis,
        type_map::TypeMap,
    },
};

#[derive(Debug, Default)]
pub struct CheckParsers;

impl Pass for CheckParsers {
    fn name(&self) -> &str {
        "CheckParsers"
    }

    fn run(
        &mut self,
        program: Rc<Program>,
        context: &mut CompilationContext,
    ) -> Result<Rc<Program>, PipelineError> {
        let mut check = Checker {
            reference_map: &context.reference_map,
            type_map: &mut context.type_map,
            diagnostics: &mut context.diagnostics,
            max_sweeps: context.options.max_parser_iterations,
            bug: None,
        };
        inspect_program(&mut check, &program);

        match check.bug {
            Some(bug) => Err(bug.into()),
            None => Ok(program),
        }
    }
}

struct Checker<'a> {
    reference_map: &'a ReferenceMap,
    type_map: &'a mut TypeMap,
    diagnostics: &'a mut Diagnostics,
    max_sweeps: usize,
    bug: Option<CompilerBug>,
}

impl Checker<'_> {
    fn check(&mut self, parser: &Rc<Declaration>) -> Result<(), CompilerBug> {
        let analysis =
            ParserAnalysis::analyze(parser, self.reference_map, self.type_map, self.max_sweeps)?;

        log::debug!(
            "parser `{}`: {} sweep(s), {} issue(s)",
            parser.name,
            analysis.sweeps,
            analysis.issues.len()
        );

        for issue in analysis.issues.iter() {
            report_warning!(
                self.diagnostics,
                issue.span,
                "parser `{}`: {}",
                parser.name,
                issue.message()
            );
        }

        for state in analysis.unreachable_states() {
            report_warning!(
                self.diagnostics,
                state.span,
                "parser `{}`: state `{}` is unreachable",
                parser.name,
                state.name
            );
        }

        if !analysis.converged {
            report_warning!(
                self.diagnostics,
                parser.span,
                "parser `{}`: analysis stopped after {} iterations without settling",
                parser.name,
                analysis.sweeps
            );
        }

        Ok(())
    }
}

impl Inspector for Checker<'_> {
    fn preorder_declaration(&mut self, declaration: &Rc<Declaration>, _context: &Context) -> bool {
        if let DeclarationKind::Parser { .. } = declaration.kind {
            if let Err(bug) = self.check(declaration) {
                self.bug.get_or_insert(bug);
            }
        }
        false
    }
}
