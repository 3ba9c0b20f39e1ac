//! Evaluates operators whose operands are literals, replaces references to
//! constants by their values and drops the dead arm of `if` statements and
//! `?:` expressions whose condition is a literal.

use std::rc::Rc;

use crate::{
    diagnostics::{report_error, Diagnostics},
    ir::{
        fold::{fold_binary, fold_cast, fold_unary, FoldError},
        transform::{transform_program, Output, Transform, TransformContext},
        BinaryOperatorKind, Declaration, DeclarationKind, Expression, ExpressionKind, Literal,
        Program, Statement, StatementKind,
    },
    middle::{
        pass::{CompilationContext, Pass, PipelineError},
        reference_map::ReferenceMap,
    },
};

#[derive(Debug, Default)]
pub struct ConstantFolding;

impl Pass for ConstantFolding {
    fn name(&self) -> &str {
        "ConstantFolding"
    }

    fn run(
        &mut self,
        program: Rc<Program>,
        context: &mut CompilationContext,
    ) -> Result<Rc<Program>, PipelineError> {
        let mut fold = Folder {
            reference_map: &context.reference_map,
            diagnostics: &mut context.diagnostics,
        };
        Ok(transform_program(&mut fold, &program)?)
    }
}

struct Folder<'a> {
    reference_map: &'a ReferenceMap,
    diagnostics: &'a mut Diagnostics,
}

impl Folder<'_> {
    fn literal(
        &mut self,
        expression: &Rc<Expression>,
        folded: Result<Literal, FoldError>,
    ) -> Rc<Expression> {
        match folded {
            Ok(literal) => expression.with_kind(ExpressionKind::Literal(literal)),
            Err(error) => {
                report_error!(self.diagnostics, expression.span, "{error} in `{expression}`");
                expression.clone()
            }
        }
    }

    /// The value of a constant declaration, converted to its declared type
    fn constant_value(&self, declaration: &Declaration) -> Option<Literal> {
        let DeclarationKind::Constant { ty, value } = &declaration.kind else {
            return None;
        };
        let literal = value.as_literal()?;
        match literal {
            Literal::Integer { width: None, .. } => fold_cast(ty, literal).ok(),
            _ => Some(literal.clone()),
        }
    }
}

impl Transform for Folder<'_> {
    fn preorder_declaration(
        &mut self,
        declaration: Rc<Declaration>,
        context: &mut TransformContext,
    ) -> Rc<Declaration> {
        if matches!(
            declaration.kind,
            DeclarationKind::Extern { .. } | DeclarationKind::Method { .. }
        ) {
            context.prune();
        }
        declaration
    }

    fn postorder_expression(
        &mut self,
        expression: Rc<Expression>,
        _context: &mut TransformContext,
    ) -> Rc<Expression> {
        match &expression.kind {
            ExpressionKind::Path(path) => {
                match self
                    .reference_map
                    .get_declaration(path)
                    .and_then(|declaration| self.constant_value(declaration))
                {
                    Some(literal) => expression.with_kind(ExpressionKind::Literal(literal)),
                    None => expression,
                }
            }
            ExpressionKind::Binary { operator, lhs, rhs } => {
                match (operator, lhs.as_literal(), rhs.as_literal()) {
                    (_, Some(a), Some(b)) => {
                        let folded = fold_binary(*operator, a, b);
                        self.literal(&expression, folded)
                    }
                    (BinaryOperatorKind::LogicalAnd, Some(Literal::Boolean(false)), _)
                    | (BinaryOperatorKind::LogicalOr, Some(Literal::Boolean(true)), _) => {
                        lhs.clone()
                    }
                    (BinaryOperatorKind::LogicalAnd, Some(Literal::Boolean(true)), _)
                    | (BinaryOperatorKind::LogicalOr, Some(Literal::Boolean(false)), _) => {
                        rhs.clone()
                    }
                    _ => expression,
                }
            }
            ExpressionKind::Unary { operator, operand } => match operand.as_literal() {
                Some(literal) => {
                    let folded = fold_unary(*operator, literal);
                    self.literal(&expression, folded)
                }
                None => expression,
            },
            ExpressionKind::Cast {
                ty,
                expression: inner,
            } => match inner.as_literal() {
                Some(literal) => {
                    let folded = fold_cast(ty, literal);
                    self.literal(&expression, folded)
                }
                None => expression,
            },
            ExpressionKind::Mux {
                condition,
                positive,
                negative,
            } => match condition.as_literal().and_then(Literal::as_bool) {
                Some(true) => positive.clone(),
                Some(false) => negative.clone(),
                None => expression,
            },
            _ => expression,
        }
    }

    fn postorder_statement(
        &mut self,
        statement: Rc<Statement>,
        _context: &mut TransformContext,
    ) -> Output<Statement> {
        let StatementKind::If {
            condition,
            positive,
            negative,
        } = &statement.kind
        else {
            return Output::One(statement);
        };

        let live = match condition.as_literal().and_then(Literal::as_bool) {
            Some(true) => Some(positive),
            Some(false) => negative.as_ref(),
            None => return Output::One(statement),
        };

        log::trace!("condition `{condition}` is constant");
        match live.map(|live| &live.kind) {
            Some(StatementKind::Block(block)) => Output::Many(block.statements.to_vec()),
            Some(_) => Output::Many(live.into_iter().cloned().collect()),
            None => Output::Many(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        diagnostics::Severity,
        ir::{build::*, Direction},
        middle::passes::testing::{body_of, compile},
    };
    use pretty_assertions::assert_eq;

    fn action_with(body: Vec<Rc<Statement>>) -> Vec<Rc<Declaration>> {
        vec![
            constant("K", bits(8), int(7)),
            action(
                "a",
                vec![
                    parameter(Direction::InOut, "x", bits(8)),
                    parameter(Direction::In, "flag", bool_type()),
                ],
                body,
            ),
        ]
    }

    #[test]
    fn folds_operators_and_constants() {
        let (program, mut context) = compile(action_with(vec![
            assign(path("x"), binary(BinaryOperatorKind::Add, sized(3, 8), sized(5, 8))),
            assign(path("x"), binary(BinaryOperatorKind::Add, path("K"), sized(250, 8))),
            assign(
                path("x"),
                cast(bits(8), binary(BinaryOperatorKind::Multiply, int(6), int(7))),
            ),
            if_statement(
                binary(BinaryOperatorKind::LogicalAnd, boolean(true), path("flag")),
                assign(path("x"), sized(1, 8)),
                None,
            ),
        ]));

        let output = ConstantFolding.run(program, &mut context).unwrap();
        assert_eq!(
            body_of(&output, "a"),
            vec![
                "x = 8w8;",
                "x = 8w1;",
                "x = 8w42;",
                "if (flag) {\n    x = 8w1;\n}",
            ]
        );
    }

    #[test]
    fn constant_conditions_keep_only_the_live_branch() {
        let (program, mut context) = compile(action_with(vec![
            if_statement(
                binary(BinaryOperatorKind::Equals, path("K"), sized(7, 8)),
                block_statement(vec![
                    assign(path("x"), sized(1, 8)),
                    assign(path("x"), sized(2, 8)),
                ]),
                Some(assign(path("x"), sized(3, 8))),
            ),
            if_statement(boolean(false), assign(path("x"), sized(4, 8)), None),
            assign(
                path("x"),
                mux(boolean(false), sized(5, 8), sized(6, 8)),
            ),
        ]));

        let output = ConstantFolding.run(program, &mut context).unwrap();
        assert_eq!(
            body_of(&output, "a"),
            vec!["x = 8w1;", "x = 8w2;", "x = 8w6;"]
        );
    }

    #[test]
    fn division_by_zero_is_reported_and_left_alone() {
        let (program, mut context) = compile(action_with(vec![assign(
            path("x"),
            binary(BinaryOperatorKind::Divide, sized(1, 8), sized(0, 8)),
        )]));

        let output = ConstantFolding.run(program, &mut context).unwrap();
        assert_eq!(body_of(&output, "a"), vec!["x = 8w1 / 8w0;"]);
        assert_eq!(
            context.diagnostics.messages(Severity::Error),
            vec!["division by zero in `8w1 / 8w0`"]
        );
    }

    #[test]
    fn programs_without_literals_keep_their_identity() {
        let (program, mut context) = compile(action_with(vec![assign(
            path("x"),
            binary(BinaryOperatorKind::Add, path("x"), path("x")),
        )]));

        let output = ConstantFolding.run(program.clone(), &mut context).unwrap();
        assert!(Rc::ptr_eq(&output, &program));
    }
}
