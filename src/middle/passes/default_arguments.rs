//! Makes default parameter values explicit: every call, constructor call and
//! instance that leaves a defaulted parameter unbound gets a named argument
//! carrying the default.

use std::rc::Rc;

use crate::{
    diagnostics::CompilerBug,
    ir::{
        transform::{transform_program, Output, Transform, TransformContext},
        visit::NodeRef,
        Argument, Declaration, DeclarationKind, Expression, ExpressionKind, NodeId, Program,
    },
    middle::{
        instance::{ConstructorCall, Instantiation, MethodInstance, ResolutionError},
        pass::{CompilationContext, Pass, PipelineError},
        reference_map::ReferenceMap,
        substitution::{default_value, ParameterSubstitution, TypeVariableSubstitution},
        type_map::TypeMap,
    },
};

#[derive(Debug, Default)]
pub struct DefaultArguments;

impl Pass for DefaultArguments {
    fn name(&self) -> &str {
        "DefaultArguments"
    }

    fn run(
        &mut self,
        program: Rc<Program>,
        context: &mut CompilationContext,
    ) -> Result<Rc<Program>, PipelineError> {
        let mut fill = FillDefaults {
            reference_map: &context.reference_map,
            type_map: &mut context.type_map,
            filled: 0,
            bug: None,
        };
        let program = transform_program(&mut fill, &program)?;

        if let Some(bug) = fill.bug {
            return Err(bug.into());
        }

        log::debug!("filled in {} default argument(s)", fill.filled);
        Ok(program)
    }
}

struct FillDefaults<'a> {
    reference_map: &'a ReferenceMap,
    type_map: &'a mut TypeMap,
    filled: usize,
    bug: Option<CompilerBug>,
}

impl FillDefaults<'_> {
    /// Binding errors were reported by type inference; only bugs matter here
    fn resolved<T>(&mut self, result: Result<T, ResolutionError>) -> Option<T> {
        match result {
            Ok(resolved) => Some(resolved),
            Err(ResolutionError::Binding(_)) => None,
            Err(ResolutionError::Bug(bug)) => {
                self.bug.get_or_insert(bug);
                None
            }
        }
    }

    /// `arguments` followed by a named argument for each unbound parameter
    /// that has a default; `None` when nothing is missing
    fn complete(
        &mut self,
        arguments: &Rc<[Rc<Argument>]>,
        substitution: &ParameterSubstitution,
        type_substitution: &TypeVariableSubstitution,
    ) -> Option<Rc<[Rc<Argument>]>> {
        let mut added = Vec::new();

        for (parameter, argument) in substitution.bindings() {
            if argument.is_some() {
                continue;
            }
            let Some(default) = default_value(parameter) else {
                continue;
            };

            match type_substitution.apply_to_expression(default, self.reference_map) {
                Ok(expression) => added.push(Rc::new(Argument {
                    id: NodeId::fresh(),
                    name: Some(parameter.name),
                    expression,
                })),
                Err(bug) => {
                    self.bug.get_or_insert(bug);
                    return None;
                }
            }
        }

        if added.is_empty() {
            return None;
        }

        self.filled += added.len();
        Some(arguments.iter().cloned().chain(added).collect())
    }
}

impl Transform for FillDefaults<'_> {
    fn postorder_expression(
        &mut self,
        expression: Rc<Expression>,
        context: &mut TransformContext,
    ) -> Rc<Expression> {
        match &expression.kind {
            // Action list entries only bind the arguments the table supplies
            ExpressionKind::MethodCall { .. }
                if matches!(context.parent(), Some(NodeRef::Property(_))) =>
            {
                expression
            }
            ExpressionKind::MethodCall {
                target,
                type_arguments,
                arguments,
            } => {
                let resolved = MethodInstance::resolve(&expression, self.reference_map, self.type_map);
                let Some(instance) = self.resolved(resolved) else {
                    return expression;
                };

                match self.complete(
                    arguments,
                    instance.substitution(),
                    instance.type_substitution(),
                ) {
                    Some(arguments) => expression.with_kind(ExpressionKind::MethodCall {
                        target: target.clone(),
                        type_arguments: type_arguments.clone(),
                        arguments,
                    }),
                    None => expression,
                }
            }
            ExpressionKind::ConstructorCall { ty, arguments } => {
                let resolved = ConstructorCall::resolve(&expression, self.reference_map);
                let Some(call) = self.resolved(resolved) else {
                    return expression;
                };

                match self.complete(
                    arguments,
                    &call.construction.substitution,
                    &call.construction.type_substitution,
                ) {
                    Some(arguments) => expression.with_kind(ExpressionKind::ConstructorCall {
                        ty: ty.clone(),
                        arguments,
                    }),
                    None => expression,
                }
            }
            _ => expression,
        }
    }

    fn postorder_declaration(
        &mut self,
        declaration: Rc<Declaration>,
        _context: &mut TransformContext,
    ) -> Output<Declaration> {
        let DeclarationKind::Instance {
            ty,
            arguments,
            initializer,
        } = &declaration.kind
        else {
            return Output::One(declaration);
        };

        let resolved = Instantiation::resolve(&declaration, self.reference_map);
        let Some(instantiation) = self.resolved(resolved) else {
            return Output::One(declaration);
        };

        match self.complete(
            arguments,
            instantiation.substitution(),
            &instantiation.construction.type_substitution,
        ) {
            Some(arguments) => Output::One(declaration.with_kind(DeclarationKind::Instance {
                ty: ty.clone(),
                arguments,
                initializer: initializer.clone(),
            })),
            None => Output::One(declaration),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{build::*, Direction},
        middle::passes::testing::{body_of, compile},
    };
    use pretty_assertions::assert_eq;

    #[test]
    fn appends_missing_defaults_as_named_arguments() {
        let (program, mut context) = compile(vec![
            function(
                "f",
                bits(8),
                vec![
                    parameter(Direction::In, "a", bits(8)),
                    parameter_with_default(Direction::In, "b", bits(8), sized(5, 8)),
                ],
                vec![crate::ir::Statement::new(crate::ir::StatementKind::Return(
                    Some(path("a")),
                ))],
            ),
            control(
                "c",
                vec![parameter(Direction::InOut, "x", bits(8))],
                vec![instance("m", specialized_type("Meter", vec![bits(8)]), vec![sized(16, 32)])],
                vec![
                    assign(path("x"), call(path("f"), vec![path("x")])),
                    assign(path("x"), call(path("f"), vec![path("x"), sized(1, 8)])),
                    call_statement(method_call(path("m"), "execute", vec![path("x")])),
                ],
            ),
        ]);

        let output = DefaultArguments.run(program, &mut context).unwrap();
        let body = body_of(&output, "c");

        assert_eq!(
            body,
            vec![
                "x = f(x, b = 8w5);",
                "x = f(x, 8w1);",
                "m.execute(x, color = 2w0);",
            ]
        );
    }

    #[test]
    fn programs_without_defaults_keep_their_identity() {
        let (program, mut context) = compile(vec![control(
            "c",
            vec![parameter(Direction::InOut, "x", bits(8))],
            vec![instance("m", specialized_type("Meter", vec![bits(8)]), vec![sized(16, 32)])],
            vec![call_statement(method_call(
                path("m"),
                "execute",
                vec![path("x"), sized(1, 2)],
            ))],
        )]);

        let output = DefaultArguments.run(program.clone(), &mut context).unwrap();
        assert!(Rc::ptr_eq(&output, &program));
    }
}
