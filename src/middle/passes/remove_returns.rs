//! Replaces `return` in action and control bodies by a flag.
//!
//! The body gets a fresh `bool hasReturned = false;`, each `return` becomes
//! `hasReturned = true;`, and whatever follows a statement that may have
//! returned runs under `if (!hasReturned)`. Statements after an
//! unconditional return are dropped. Bodies without a return are left
//! alone.

use std::rc::Rc;

use crate::{
    ir::{
        build,
        transform::{transform_program, Transform, TransformContext},
        Block, Declaration, DeclarationKind, Program, Statement, StatementKind, Symbol,
    },
    middle::{
        pass::{CompilationContext, Pass, PipelineError},
        reference_map::ReferenceMap,
    },
};

#[derive(Debug, Default)]
pub struct RemoveReturns;

impl Pass for RemoveReturns {
    fn name(&self) -> &str {
        "RemoveReturns"
    }

    fn run(
        &mut self,
        program: Rc<Program>,
        context: &mut CompilationContext,
    ) -> Result<Rc<Program>, PipelineError> {
        let mut remove = DoRemoveReturns {
            reference_map: &mut context.reference_map,
        };
        Ok(transform_program(&mut remove, &program)?)
    }
}

/// Whether a statement returns on no path, some paths or every path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Returns {
    No,
    Maybe,
    Yes,
}

fn contains_return(statements: &[Rc<Statement>]) -> bool {
    statements.iter().any(|statement| match &statement.kind {
        StatementKind::Return(_) => true,
        StatementKind::If {
            positive, negative, ..
        } => {
            contains_return(std::slice::from_ref(positive))
                || negative
                    .as_ref()
                    .is_some_and(|negative| contains_return(std::slice::from_ref(negative)))
        }
        StatementKind::Block(block) => contains_return(&block.statements),
        _ => false,
    })
}

struct DoRemoveReturns<'a> {
    reference_map: &'a mut ReferenceMap,
}

impl DoRemoveReturns<'_> {
    fn rewrite_body(&mut self, body: &Rc<Block>) -> Rc<Block> {
        let flag = self.reference_map.new_name("hasReturned");
        log::trace!("removing returns with flag `{flag}`");

        let mut statements = vec![build::declaration_statement(build::variable(
            flag.value(),
            build::bool_type(),
            Some(build::boolean(false)),
        ))];
        let (rewritten, _) = rewrite_statements(&body.statements, flag);
        statements.extend(rewritten);

        body.with_statements(statements.into())
    }
}

fn rewrite_statements(statements: &[Rc<Statement>], flag: Symbol) -> (Vec<Rc<Statement>>, Returns) {
    let mut output = Vec::with_capacity(statements.len());

    for (position, statement) in statements.iter().enumerate() {
        let (statement, returns) = rewrite_statement(statement, flag);
        output.push(statement);

        match returns {
            Returns::No => {}
            Returns::Yes => return (output, Returns::Yes),
            Returns::Maybe => {
                let (rest, _) = rewrite_statements(&statements[position + 1..], flag);
                if !rest.is_empty() {
                    output.push(build::if_statement(
                        build::not(build::path(flag.value())),
                        build::block_statement(rest),
                        None,
                    ));
                }
                return (output, Returns::Maybe);
            }
        }
    }

    (output, Returns::No)
}

fn rewrite_statement(statement: &Rc<Statement>, flag: Symbol) -> (Rc<Statement>, Returns) {
    match &statement.kind {
        StatementKind::Return(_) => (
            build::assign(build::path(flag.value()), build::boolean(true)),
            Returns::Yes,
        ),
        StatementKind::Block(block) => {
            let (statements, returns) = rewrite_statements(&block.statements, flag);
            if returns == Returns::No {
                return (statement.clone(), Returns::No);
            }
            (
                statement.with_kind(StatementKind::Block(block.with_statements(statements.into()))),
                returns,
            )
        }
        StatementKind::If {
            condition,
            positive,
            negative,
        } => {
            let (positive, positive_returns) = rewrite_statement(positive, flag);
            let (negative, negative_returns) = match negative {
                Some(negative) => {
                    let (negative, returns) = rewrite_statement(negative, flag);
                    (Some(negative), returns)
                }
                None => (None, Returns::No),
            };

            let returns = match (positive_returns, negative_returns) {
                (Returns::No, Returns::No) => return (statement.clone(), Returns::No),
                (Returns::Yes, Returns::Yes) => Returns::Yes,
                _ => Returns::Maybe,
            };

            (
                statement.with_kind(StatementKind::If {
                    condition: condition.clone(),
                    positive,
                    negative,
                }),
                returns,
            )
        }
        _ => (statement.clone(), Returns::No),
    }
}

impl Transform for DoRemoveReturns<'_> {
    fn preorder_declaration(
        &mut self,
        declaration: Rc<Declaration>,
        context: &mut TransformContext,
    ) -> Rc<Declaration> {
        match &declaration.kind {
            DeclarationKind::Action { parameters, body } => {
                context.prune();
                if !contains_return(&body.statements) {
                    return declaration;
                }
                declaration.with_kind(DeclarationKind::Action {
                    parameters: parameters.clone(),
                    body: self.rewrite_body(body),
                })
            }
            DeclarationKind::Control {
                type_parameters,
                apply_parameters,
                constructor_parameters,
                locals,
                body,
            } => {
                // Actions among the locals still need visiting
                if !contains_return(&body.statements) {
                    return declaration;
                }
                declaration.with_kind(DeclarationKind::Control {
                    type_parameters: type_parameters.clone(),
                    apply_parameters: apply_parameters.clone(),
                    constructor_parameters: constructor_parameters.clone(),
                    locals: locals.clone(),
                    body: self.rewrite_body(body),
                })
            }
            // Nothing else can hold an action or a control body
            DeclarationKind::Parser { .. }
            | DeclarationKind::Function { .. }
            | DeclarationKind::Extern { .. }
            | DeclarationKind::Header { .. }
            | DeclarationKind::Struct { .. }
            | DeclarationKind::HeaderUnion { .. } => {
                context.prune();
                declaration
            }
            _ => declaration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{build::*, print::render_declaration, Direction},
        middle::passes::testing::compile,
    };
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn returns_become_a_flag() {
        let (program, mut context) = compile(vec![control(
            "c",
            vec![
                parameter(Direction::InOut, "x", bits(8)),
                parameter(Direction::In, "flag", bool_type()),
            ],
            vec![action(
                "a",
                Vec::new(),
                vec![
                    assign(path("x"), sized(1, 8)),
                    if_statement(path("flag"), block_statement(vec![return_statement()]), None),
                    assign(path("x"), sized(2, 8)),
                ],
            )],
            vec![call_statement(call(path("a"), Vec::new()))],
        )]);

        let output = RemoveReturns.run(program, &mut context).unwrap();
        let c = output.find("c").unwrap();

        assert_eq!(
            render_declaration(c, false),
            indoc! {"
                control c(inout bit<8> x, in bool flag) {
                    action a() {
                        bool hasReturned = false;
                        x = 8w1;
                        if (flag) {
                            hasReturned = true;
                        }
                        if (!hasReturned) {
                            x = 8w2;
                        }
                    }
                    apply {
                        a();
                    }
                }
            "}
        );
    }

    #[test]
    fn unconditional_returns_drop_the_rest() {
        let (program, mut context) = compile(vec![action(
            "a",
            vec![parameter(Direction::InOut, "x", bits(8))],
            vec![
                return_statement(),
                assign(path("x"), sized(2, 8)),
            ],
        )]);

        let output = RemoveReturns.run(program, &mut context).unwrap();
        assert_eq!(
            render_declaration(output.find("a").unwrap(), false),
            indoc! {"
                action a(inout bit<8> x) {
                    bool hasReturned = false;
                    hasReturned = true;
                }
            "}
        );
    }

    #[test]
    fn bodies_without_returns_keep_their_identity() {
        let (program, mut context) = compile(vec![control(
            "c",
            vec![
                parameter(Direction::InOut, "x", bits(8)),
                parameter(Direction::In, "flag", bool_type()),
            ],
            vec![action("a", Vec::new(), vec![assign(path("x"), sized(1, 8))])],
            vec![
                call_statement(call(path("a"), Vec::new())),
                if_statement(path("flag"), exit_statement(), None),
            ],
        )]);

        let output = RemoveReturns.run(program.clone(), &mut context).unwrap();
        assert!(Rc::ptr_eq(&output, &program));
    }
}
