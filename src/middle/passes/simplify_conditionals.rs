//! Replaces `if` statements whose condition the symbolic evaluator proves
//! constant by the branch that runs.
//!
//! Each control body and each action body is executed symbolically from
//! its parameters: `out` parameters start uninitialized, everything else
//! is unknown. Reads of uninitialized values and other failures found on
//! the way are reported as warnings.

use std::rc::Rc;

use crate::{
    diagnostics::{report_warning, CompilerBug, Diagnostics},
    ir::{
        build,
        transform::{transform_program, Transform, TransformContext},
        Block, Declaration, DeclarationKind, Program, Statement, StatementKind,
    },
    middle::{
        pass::{CompilationContext, Pass, PipelineError},
        reference_map::ReferenceMap,
        symbolic::{Flow, SymbolicEvaluator, ValueMap},
        type_map::TypeMap,
    },
};

#[derive(Debug, Default)]
pub struct SimplifyConditionals;

impl Pass for SimplifyConditionals {
    fn name(&self) -> &str {
        "SimplifyConditionals"
    }

    fn run(
        &mut self,
        program: Rc<Program>,
        context: &mut CompilationContext,
    ) -> Result<Rc<Program>, PipelineError> {
        let mut simplify = DoSimplifyConditionals {
            reference_map: &context.reference_map,
            type_map: &mut context.type_map,
            diagnostics: &mut context.diagnostics,
            simplified: 0,
            bug: None,
        };
        let program = transform_program(&mut simplify, &program)?;

        if let Some(bug) = simplify.bug {
            return Err(bug.into());
        }

        log::debug!("removed {} constant conditional(s)", simplify.simplified);
        Ok(program)
    }
}

struct DoSimplifyConditionals<'a> {
    reference_map: &'a ReferenceMap,
    type_map: &'a mut TypeMap,
    diagnostics: &'a mut Diagnostics,
    simplified: usize,
    bug: Option<CompilerBug>,
}

impl DoSimplifyConditionals<'_> {
    /// `body` with its constant conditionals resolved, executed from the
    /// given parameters and local declarations
    fn rewrite_body(
        &mut self,
        parameters: &[Rc<Declaration>],
        locals: &[Rc<Declaration>],
        body: &Rc<Block>,
    ) -> Result<Rc<Block>, CompilerBug> {
        let mut evaluator = SymbolicEvaluator::new(self.reference_map, self.type_map);
        let mut values = ValueMap::new();
        evaluator.bind_parameters(parameters, &mut values);
        for local in locals {
            evaluator.declare(local, &mut values)?;
        }

        let mut simplifier = Simplifier {
            evaluator: &mut evaluator,
            simplified: 0,
        };
        let (statements, _) = simplifier.statements(&body.statements, &mut values)?;
        let simplified = simplifier.simplified;

        for issue in evaluator.take_issues() {
            report_warning!(self.diagnostics, issue.span, "{}", issue.message());
        }

        if simplified == 0 {
            return Ok(body.clone());
        }
        self.simplified += simplified;
        Ok(body.with_statements(statements.into()))
    }

    fn rewrite(&mut self, declaration: &Rc<Declaration>) -> Result<Rc<Declaration>, CompilerBug> {
        let kind = match &declaration.kind {
            DeclarationKind::Action { parameters, body } => {
                let rewritten = self.rewrite_body(parameters, &[], body)?;
                if Rc::ptr_eq(&rewritten, body) {
                    return Ok(declaration.clone());
                }
                DeclarationKind::Action {
                    parameters: parameters.clone(),
                    body: rewritten,
                }
            }
            DeclarationKind::Control {
                type_parameters,
                apply_parameters,
                constructor_parameters,
                locals,
                body,
            } => {
                let rewritten = self.rewrite_body(apply_parameters, locals, body)?;
                if Rc::ptr_eq(&rewritten, body) {
                    return Ok(declaration.clone());
                }
                DeclarationKind::Control {
                    type_parameters: type_parameters.clone(),
                    apply_parameters: apply_parameters.clone(),
                    constructor_parameters: constructor_parameters.clone(),
                    locals: locals.clone(),
                    body: rewritten,
                }
            }
            _ => return Ok(declaration.clone()),
        };
        Ok(declaration.with_kind(kind))
    }
}

struct Simplifier<'e, 'a> {
    evaluator: &'e mut SymbolicEvaluator<'a>,
    simplified: usize,
}

impl Simplifier<'_, '_> {
    fn statements(
        &mut self,
        statements: &[Rc<Statement>],
        values: &mut ValueMap,
    ) -> Result<(Vec<Rc<Statement>>, Flow), CompilerBug> {
        let mut output = Vec::with_capacity(statements.len());

        for (position, statement) in statements.iter().enumerate() {
            let flow = self.statement(statement, values, &mut output)?;
            if flow == Flow::Stop {
                // Whatever follows never runs; later passes decide its fate
                output.extend(statements[position + 1..].iter().cloned());
                return Ok((output, Flow::Stop));
            }
        }

        Ok((output, Flow::Continue))
    }

    /// A single statement standing for whatever `statement` turned into
    fn single(
        &mut self,
        statement: &Rc<Statement>,
        values: &mut ValueMap,
    ) -> Result<(Rc<Statement>, Flow), CompilerBug> {
        let mut output = Vec::new();
        let flow = self.statement(statement, values, &mut output)?;

        let single = match output.len() {
            0 => build::empty_statement(),
            1 => output.remove(0),
            _ => build::block_statement(output),
        };
        Ok((single, flow))
    }

    fn statement(
        &mut self,
        statement: &Rc<Statement>,
        values: &mut ValueMap,
        output: &mut Vec<Rc<Statement>>,
    ) -> Result<Flow, CompilerBug> {
        match &statement.kind {
            StatementKind::Block(block) => {
                let (statements, flow) = self.statements(&block.statements, values)?;
                output.push(rebuild_block(statement, block, statements));
                Ok(flow)
            }
            StatementKind::If {
                condition,
                positive,
                negative,
            } => {
                let value = self.evaluator.evaluate(condition, values)?;
                if value.is_error() || value.is_uninitialized() {
                    // Executing it records the failure
                    output.push(statement.clone());
                    return self.evaluator.execute(statement, values);
                }

                match value.as_bool() {
                    Some(taken) => {
                        log::trace!("condition `{condition}` is always {taken}");
                        self.simplified += 1;
                        let live = if taken { Some(positive) } else { negative.as_ref() };
                        match live {
                            Some(live) => self.splice(live, values, output),
                            None => Ok(Flow::Continue),
                        }
                    }
                    None => {
                        let mut otherwise = values.clone();
                        let (new_positive, positive_flow) = self.single(positive, values)?;
                        let (new_negative, negative_flow) = match negative {
                            Some(negative) => {
                                let (negative, flow) = self.single(negative, &mut otherwise)?;
                                (Some(negative), flow)
                            }
                            None => (None, Flow::Continue),
                        };

                        let flow = match (positive_flow, negative_flow) {
                            (Flow::Stop, Flow::Stop) => Flow::Stop,
                            (Flow::Stop, Flow::Continue) => {
                                *values = otherwise;
                                Flow::Continue
                            }
                            (Flow::Continue, Flow::Stop) => Flow::Continue,
                            (Flow::Continue, Flow::Continue) => {
                                values.merge(&otherwise)?;
                                Flow::Continue
                            }
                        };

                        let unchanged = Rc::ptr_eq(&new_positive, positive)
                            && match (&new_negative, negative) {
                                (Some(a), Some(b)) => Rc::ptr_eq(a, b),
                                (None, None) => true,
                                _ => false,
                            };
                        output.push(if unchanged {
                            statement.clone()
                        } else {
                            statement.with_kind(StatementKind::If {
                                condition: condition.clone(),
                                positive: new_positive,
                                negative: new_negative,
                            })
                        });
                        Ok(flow)
                    }
                }
            }
            _ => {
                output.push(statement.clone());
                self.evaluator.execute(statement, values)
            }
        }
    }

    /// Puts the live arm of a resolved `if` in its place. A block arm that
    /// declares locals stays a block so that its names keep their scope.
    fn splice(
        &mut self,
        live: &Rc<Statement>,
        values: &mut ValueMap,
        output: &mut Vec<Rc<Statement>>,
    ) -> Result<Flow, CompilerBug> {
        match &live.kind {
            StatementKind::Block(block)
                if !block
                    .statements
                    .iter()
                    .any(|s| matches!(s.kind, StatementKind::Declaration(_))) =>
            {
                let (statements, flow) = self.statements(&block.statements, values)?;
                output.extend(statements);
                Ok(flow)
            }
            _ => self.statement(live, values, output),
        }
    }
}

fn rebuild_block(
    statement: &Rc<Statement>,
    block: &Rc<Block>,
    statements: Vec<Rc<Statement>>,
) -> Rc<Statement> {
    let unchanged = statements.len() == block.statements.len()
        && statements
            .iter()
            .zip(block.statements.iter())
            .all(|(a, b)| Rc::ptr_eq(a, b));
    if unchanged {
        return statement.clone();
    }
    statement.with_kind(StatementKind::Block(block.with_statements(statements.into())))
}

impl Transform for DoSimplifyConditionals<'_> {
    fn preorder_declaration(
        &mut self,
        declaration: Rc<Declaration>,
        context: &mut TransformContext,
    ) -> Rc<Declaration> {
        match &declaration.kind {
            // The actions among a control's locals are visited next
            DeclarationKind::Control { .. } => {}
            _ => context.prune(),
        }

        if !matches!(
            declaration.kind,
            DeclarationKind::Action { .. } | DeclarationKind::Control { .. }
        ) {
            return declaration;
        }

        match self.rewrite(&declaration) {
            Ok(rewritten) => rewritten,
            Err(bug) => {
                self.bug.get_or_insert(bug);
                declaration
            }
        }
    }

    fn preorder_statement(
        &mut self,
        statement: Rc<Statement>,
        context: &mut TransformContext,
    ) -> Rc<Statement> {
        context.prune();
        statement
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        diagnostics::Severity,
        ir::{build::*, BinaryOperatorKind, Direction},
        middle::passes::testing::{body_of, compile},
    };
    use pretty_assertions::assert_eq;

    fn equals(lhs: Rc<crate::ir::Expression>, rhs: Rc<crate::ir::Expression>) -> Rc<crate::ir::Expression> {
        binary(BinaryOperatorKind::Equals, lhs, rhs)
    }

    #[test]
    fn conditions_known_from_earlier_assignments_are_resolved() {
        let (program, mut context) = compile(vec![control(
            "c",
            vec![
                parameter(Direction::InOut, "x", bits(8)),
                parameter(Direction::In, "flag", bool_type()),
            ],
            vec![variable("y", bits(8), Some(sized(1, 8)))],
            vec![
                if_statement(
                    equals(path("y"), sized(1, 8)),
                    block_statement(vec![assign(path("x"), sized(2, 8))]),
                    Some(assign(path("x"), sized(3, 8))),
                ),
                if_statement(
                    path("flag"),
                    assign(path("y"), sized(4, 8)),
                    Some(assign(path("y"), sized(5, 8))),
                ),
                // `y` is 4 or 5 here
                if_statement(equals(path("y"), sized(4, 8)), assign(path("x"), sized(6, 8)), None),
                if_statement(
                    equals(path("x"), sized(2, 8)),
                    assign(path("x"), sized(7, 8)),
                    None,
                ),
            ],
        )]);

        let output = SimplifyConditionals.run(program, &mut context).unwrap();
        assert_eq!(
            body_of(&output, "c"),
            vec![
                "x = 8w2;",
                "if (flag) {\n    y = 8w4;\n} else {\n    y = 8w5;\n}",
                "if (y == 8w4) {\n    x = 8w6;\n}",
                "if (x == 8w2) {\n    x = 8w7;\n}",
            ]
        );
        assert!(context.diagnostics.is_empty());
    }

    #[test]
    fn exits_keep_the_other_arm_values() {
        let (program, mut context) = compile(vec![action(
            "a",
            vec![
                parameter(Direction::InOut, "x", bits(8)),
                parameter(Direction::In, "flag", bool_type()),
            ],
            vec![
                assign(path("x"), sized(3, 8)),
                if_statement(path("flag"), exit_statement(), None),
                if_statement(
                    equals(path("x"), sized(3, 8)),
                    assign(path("x"), sized(4, 8)),
                    None,
                ),
            ],
        )]);

        let output = SimplifyConditionals.run(program, &mut context).unwrap();
        assert_eq!(
            body_of(&output, "a"),
            vec!["x = 8w3;", "if (flag) {\n    exit;\n}", "x = 8w4;"]
        );
    }

    #[test]
    fn uninitialized_reads_are_warnings() {
        let (program, mut context) = compile(vec![action(
            "a",
            vec![parameter(Direction::Out, "o", bits(8))],
            vec![if_statement(
                equals(path("o"), sized(1, 8)),
                assign(path("o"), sized(2, 8)),
                None,
            )],
        )]);

        let output = SimplifyConditionals.run(program.clone(), &mut context).unwrap();
        assert!(Rc::ptr_eq(&output, &program));
        assert_eq!(
            context.diagnostics.messages(Severity::Warning),
            vec!["`o == 8w1` reads an uninitialized value"]
        );
    }
}
