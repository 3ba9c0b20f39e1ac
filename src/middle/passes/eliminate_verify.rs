//! Turns `verify(condition, error)` in a parser state into a transition.
//!
//! The state is cut at the call: what precedes it stays in the state, whose
//! transition becomes `select (condition) { true: s_join; false: reject; }`,
//! and what follows moves to the fresh state `s_join` together with the
//! original transition. The error argument is dropped; the target rejects
//! without recording it.

use std::rc::Rc;

use crate::{
    diagnostics::CompilerBug,
    ir::{
        build,
        transform::{transform_program, Output, Transform, TransformContext},
        Declaration, DeclarationKind, Expression, Program, Statement, StatementKind, Symbol,
    },
    middle::{
        instance::{MethodInstance, MethodKind, ResolutionError},
        pass::{CompilationContext, Pass, PipelineError},
        reference_map::ReferenceMap,
        type_map::TypeMap,
    },
};

#[derive(Debug, Default)]
pub struct EliminateVerify;

impl Pass for EliminateVerify {
    fn name(&self) -> &str {
        "EliminateVerify"
    }

    fn run(
        &mut self,
        program: Rc<Program>,
        context: &mut CompilationContext,
    ) -> Result<Rc<Program>, PipelineError> {
        let mut eliminate = DoEliminateVerify {
            reference_map: &mut context.reference_map,
            type_map: &mut context.type_map,
            bug: None,
        };
        let program = transform_program(&mut eliminate, &program)?;

        match eliminate.bug {
            Some(bug) => Err(bug.into()),
            None => Ok(program),
        }
    }
}

struct DoEliminateVerify<'a> {
    reference_map: &'a mut ReferenceMap,
    type_map: &'a mut TypeMap,
    bug: Option<CompilerBug>,
}

impl DoEliminateVerify<'_> {
    /// The checked condition, when `statement` is a call to `verify`
    fn verified_condition(&mut self, statement: &Statement) -> Option<Rc<Expression>> {
        let StatementKind::MethodCall(call) = &statement.kind else {
            return None;
        };

        let instance = match MethodInstance::resolve(call, self.reference_map, self.type_map) {
            Ok(instance) => instance,
            Err(ResolutionError::Binding(_)) => return None,
            Err(ResolutionError::Bug(bug)) => {
                self.bug.get_or_insert(bug);
                return None;
            }
        };

        match &instance.kind {
            MethodKind::ExternFunction { method } if method.name() == "verify" => instance
                .substitution()
                .lookup_by_name(Symbol::new("check"))
                .map(|argument| argument.expression.clone()),
            _ => None,
        }
    }

    /// Splits `state` at each `verify`, returning the chain of states that
    /// replaces it; `None` when it contains no `verify`. Join states are
    /// named after `origin`, the state the chain started from.
    fn split(&mut self, state: &Rc<Declaration>, origin: &str) -> Option<Vec<Rc<Declaration>>> {
        let DeclarationKind::ParserState {
            components,
            selection,
        } = &state.kind
        else {
            return None;
        };

        let (position, condition) = components
            .iter()
            .enumerate()
            .find_map(|(i, component)| Some((i, self.verified_condition(component)?)))?;

        let join = self
            .reference_map
            .new_name(&format!("{origin}_join"));
        log::trace!("splitting state `{}` into `{join}` at a verify", state.name);

        let head = state.with_kind(DeclarationKind::ParserState {
            components: components[..position].into(),
            selection: Some(build::select(
                vec![condition],
                vec![
                    build::select_case(build::boolean(true), join.value()),
                    build::select_case(build::boolean(false), "reject"),
                ],
            )),
        });

        let tail = build::declaration(
            join.value(),
            DeclarationKind::ParserState {
                components: components[position + 1..].into(),
                selection: selection.clone(),
            },
        );

        let mut states = vec![head];
        match self.split(&tail, origin) {
            Some(rest) => states.extend(rest),
            None => states.push(tail),
        }
        Some(states)
    }
}

impl Transform for DoEliminateVerify<'_> {
    fn preorder_declaration(
        &mut self,
        declaration: Rc<Declaration>,
        context: &mut TransformContext,
    ) -> Rc<Declaration> {
        match declaration.kind {
            DeclarationKind::Parser { .. } => {}
            // States hold no nested states; the split happens on the way up
            DeclarationKind::ParserState { .. } => {}
            _ => context.prune(),
        }
        declaration
    }

    fn preorder_statement(
        &mut self,
        statement: Rc<Statement>,
        context: &mut TransformContext,
    ) -> Rc<Statement> {
        context.prune();
        statement
    }

    fn preorder_expression(
        &mut self,
        expression: Rc<Expression>,
        context: &mut TransformContext,
    ) -> Rc<Expression> {
        context.prune();
        expression
    }

    fn postorder_declaration(
        &mut self,
        declaration: Rc<Declaration>,
        _context: &mut TransformContext,
    ) -> Output<Declaration> {
        match self.split(&declaration, declaration.name()) {
            Some(states) => Output::Many(states),
            None => Output::One(declaration),
        }
    }
}
