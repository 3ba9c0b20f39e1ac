//! Hoists complex call arguments and select keys into temporaries.
//!
//! An argument is simple when it is a path, member access, array index,
//! type name or literal. Any other argument is assigned to a fresh
//! temporary just before the statement containing the call, and the
//! temporary takes its place. Lists and struct literals keep their shape;
//! only their elements are hoisted. Calls on `Hash` instances are left
//! untouched: the target reads their argument lists as written.
//!
//! Temporaries are declared among the locals of the enclosing control or
//! parser. Outside of one, the temporary is declared by the hoisting
//! statement itself. A control or parser local whose initializer needs
//! hoisting loses its initializer: the hoisted assignments and the
//! initialization move to the start of the `apply` body or `start` state.
//!
//! Operands that run on one branch only (the arms of `?:`, the right side of
//! `&&` and `||`) are left alone, since a temporary would evaluate them
//! unconditionally. Calls in them keep their arguments, with a warning.

use std::rc::Rc;

use hashbrown::HashMap;

use crate::{
    diagnostics::{report_warning, CompilerBug, Diagnostics},
    ir::{
        build,
        operator::BinaryOperatorKind,
        transform::{transform_program, Output, Transform, TransformContext},
        visit::{inspect_expression, Context, Inspector, NodeRef},
        Declaration, DeclarationKind, Expression, ExpressionKind, NamedExpression, NodeId,
        Program, Property, Statement,
    },
    middle::{
        instance::{MethodInstance, ResolutionError},
        pass::{CompilationContext, Pass, PipelineError},
        reference_map::ReferenceMap,
        type_map::TypeMap,
    },
};

/// Externs whose calls keep their arguments as written
const EXEMPT_EXTERNS: &[&str] = &["Hash"];

#[derive(Debug, Default)]
pub struct RemoveComplexExpressions;

impl Pass for RemoveComplexExpressions {
    fn name(&self) -> &str {
        "RemoveComplexExpressions"
    }

    fn run(
        &mut self,
        program: Rc<Program>,
        context: &mut CompilationContext,
    ) -> Result<Rc<Program>, PipelineError> {
        let mut remove = DoRemoveComplexExpressions {
            reference_map: &mut context.reference_map,
            type_map: &mut context.type_map,
            diagnostics: &mut context.diagnostics,
            pending: Vec::new(),
            temporaries: HashMap::new(),
            initializations: HashMap::new(),
            hoisted: 0,
            bug: None,
        };
        let program = transform_program(&mut remove, &program)?;

        if let Some(bug) = remove.bug {
            return Err(bug.into());
        }

        log::debug!("hoisted {} expression(s) into temporaries", remove.hoisted);
        Ok(program)
    }
}

fn is_simple(expression: &Expression) -> bool {
    matches!(
        expression.kind,
        ExpressionKind::Path(_)
            | ExpressionKind::Member { .. }
            | ExpressionKind::ArrayIndex { .. }
            | ExpressionKind::TypeName(_)
            | ExpressionKind::Literal(_)
    )
}

/// Whether `expression` is an operand its parent only evaluates on one branch
fn is_conditional_operand(expression: &Expression, context: &Context) -> bool {
    let Some(NodeRef::Expression(parent)) = context.parent() else {
        return false;
    };
    match &parent.kind {
        ExpressionKind::Mux { condition, .. } => condition.id != expression.id,
        ExpressionKind::Binary {
            operator: BinaryOperatorKind::LogicalAnd | BinaryOperatorKind::LogicalOr,
            rhs,
            ..
        } => rhs.id == expression.id,
        _ => false,
    }
}

/// An initialized variable among the locals of a control or parser
fn is_initialized_local(declaration: &Declaration, context: &Context) -> bool {
    matches!(
        declaration.kind,
        DeclarationKind::Variable {
            initializer: Some(_),
            ..
        }
    ) && matches!(
        context.parent(),
        Some(NodeRef::Declaration(parent))
            if matches!(parent.kind, DeclarationKind::Control { .. } | DeclarationKind::Parser { .. })
    )
}

/// Finds a call with an argument that would otherwise be hoisted
#[derive(Default)]
struct ComplexCall {
    found: bool,
}

impl Inspector for ComplexCall {
    fn preorder_expression(&mut self, expression: &Rc<Expression>, _context: &Context) -> bool {
        if let ExpressionKind::MethodCall { arguments, .. } = &expression.kind {
            self.found |= arguments.iter().any(|argument| !is_simple(&argument.expression));
        }
        !self.found
    }
}

fn has_complex_call(expression: &Rc<Expression>) -> bool {
    let mut finder = ComplexCall::default();
    inspect_expression(&mut finder, expression);
    finder.found
}

struct DoRemoveComplexExpressions<'a> {
    reference_map: &'a mut ReferenceMap,
    type_map: &'a mut TypeMap,
    diagnostics: &'a mut Diagnostics,
    /// Statements to emit before the statement (or at the end of the parser
    /// state) being visited, innermost last
    pending: Vec<Vec<Rc<Statement>>>,
    /// Temporaries to declare, by control or parser id
    temporaries: HashMap<NodeId, Vec<Rc<Declaration>>>,
    /// Initializations of locals moved to the start of the control or parser
    initializations: HashMap<NodeId, Vec<Rc<Statement>>>,
    hoisted: usize,
    bug: Option<CompilerBug>,
}

impl DoRemoveComplexExpressions<'_> {
    fn is_exempt(&mut self, call: &Rc<Expression>) -> bool {
        match MethodInstance::resolve(call, self.reference_map, self.type_map) {
            Ok(instance) => instance
                .extern_method_name()
                .is_some_and(|(extern_type, _)| EXEMPT_EXTERNS.contains(&extern_type)),
            Err(ResolutionError::Binding(_)) => false,
            Err(ResolutionError::Bug(bug)) => {
                self.bug.get_or_insert(bug);
                true
            }
        }
    }

    fn simplify(&mut self, expression: &Rc<Expression>, context: &TransformContext) -> Rc<Expression> {
        match &expression.kind {
            _ if is_simple(expression) => expression.clone(),
            ExpressionKind::List(items) => {
                let simplified = items
                    .iter()
                    .map(|item| self.simplify(item, context))
                    .collect::<Vec<_>>();
                if simplified.iter().zip(items.iter()).all(|(a, b)| Rc::ptr_eq(a, b)) {
                    return expression.clone();
                }
                expression.with_kind(ExpressionKind::List(simplified.into()))
            }
            ExpressionKind::StructLiteral(fields) => {
                let simplified = fields
                    .iter()
                    .map(|field| NamedExpression {
                        name: field.name,
                        expression: self.simplify(&field.expression, context),
                    })
                    .collect::<Vec<_>>();
                if simplified
                    .iter()
                    .zip(fields.iter())
                    .all(|(a, b)| Rc::ptr_eq(&a.expression, &b.expression))
                {
                    return expression.clone();
                }
                expression.with_kind(ExpressionKind::StructLiteral(simplified.into()))
            }
            _ => self.hoist(expression, context),
        }
    }

    fn hoist(&mut self, expression: &Rc<Expression>, context: &TransformContext) -> Rc<Expression> {
        let Some(ty) = self.type_map.type_of(expression, self.reference_map) else {
            report_warning!(
                self.diagnostics,
                expression.span,
                "cannot infer the type of `{expression}`; leaving it in place"
            );
            return expression.clone();
        };

        // `tmp`, then `tmp_0`, `tmp_1`, ...
        let name = self.reference_map.new_name("tmp");
        let container = context
            .enclosing_control()
            .or_else(|| context.enclosing_parser())
            .map(|container| container.id);

        let statement = match container {
            Some(container) => {
                self.temporaries
                    .entry(container)
                    .or_default()
                    .push(build::variable(name.value(), ty, None));
                build::assign(build::path(name.value()), expression.clone())
            }
            None => build::declaration_statement(build::variable(
                name.value(),
                ty,
                Some(expression.clone()),
            )),
        };

        log::trace!("hoisting `{expression}` into `{name}`");
        self.hoisted += 1;
        if let Some(pending) = self.pending.last_mut() {
            pending.push(statement);
        }
        build::path(name.value())
    }

    /// Strips the initializer of a control or parser local whose initializer
    /// had arguments hoisted, queueing the hoisted statements and the
    /// initialization for the start of the container
    fn move_initialization(
        &mut self,
        declaration: Rc<Declaration>,
        pending: Vec<Rc<Statement>>,
        context: &TransformContext,
    ) -> Rc<Declaration> {
        let DeclarationKind::Variable {
            ty,
            initializer: Some(initializer),
        } = &declaration.kind
        else {
            return declaration;
        };
        let Some(container) = context.parent().and_then(|parent| match parent {
            NodeRef::Declaration(container) => Some(container.id),
            _ => None,
        }) else {
            return declaration;
        };

        log::trace!("moving the initialization of `{}` into the body", declaration.name);
        let initializations = self.initializations.entry(container).or_default();
        initializations.extend(pending);
        initializations.push(build::assign(
            build::path(declaration.name()),
            initializer.clone(),
        ));

        declaration.with_kind(DeclarationKind::Variable {
            ty: ty.clone(),
            initializer: None,
        })
    }

    /// Declares the temporaries of a control or parser and prepends the moved
    /// initializations to its `apply` body or `start` state
    fn finish_container(&mut self, declaration: &Rc<Declaration>) -> Option<Rc<Declaration>> {
        let temporaries = self.temporaries.remove(&declaration.id).unwrap_or_default();
        let initializations = self
            .initializations
            .remove(&declaration.id)
            .unwrap_or_default();
        if temporaries.is_empty() && initializations.is_empty() {
            return None;
        }

        let kind = match &declaration.kind {
            DeclarationKind::Control {
                type_parameters,
                apply_parameters,
                constructor_parameters,
                locals,
                body,
            } => DeclarationKind::Control {
                type_parameters: type_parameters.clone(),
                apply_parameters: apply_parameters.clone(),
                constructor_parameters: constructor_parameters.clone(),
                locals: temporaries.into_iter().chain(locals.iter().cloned()).collect(),
                body: if initializations.is_empty() {
                    body.clone()
                } else {
                    body.with_statements(
                        initializations
                            .into_iter()
                            .chain(body.statements.iter().cloned())
                            .collect(),
                    )
                },
            },
            DeclarationKind::Parser {
                type_parameters,
                apply_parameters,
                constructor_parameters,
                locals,
                states,
            } => {
                let start = states
                    .iter()
                    .position(|state| state.name() == "start")
                    .unwrap_or(0);
                let mut states = states.to_vec();
                if !initializations.is_empty() {
                    if let Some(state) = states.get_mut(start) {
                        if let DeclarationKind::ParserState {
                            components,
                            selection,
                        } = &state.kind
                        {
                            let rewritten = state.with_kind(DeclarationKind::ParserState {
                                components: initializations
                                    .into_iter()
                                    .chain(components.iter().cloned())
                                    .collect(),
                                selection: selection.clone(),
                            });
                            *state = rewritten;
                        }
                    }
                }

                DeclarationKind::Parser {
                    type_parameters: type_parameters.clone(),
                    apply_parameters: apply_parameters.clone(),
                    constructor_parameters: constructor_parameters.clone(),
                    locals: temporaries.into_iter().chain(locals.iter().cloned()).collect(),
                    states: states.into(),
                }
            }
            _ => return None,
        };

        Some(declaration.with_kind(kind))
    }
}

impl Transform for DoRemoveComplexExpressions<'_> {
    fn preorder_declaration(
        &mut self,
        declaration: Rc<Declaration>,
        context: &mut TransformContext,
    ) -> Rc<Declaration> {
        match declaration.kind {
            DeclarationKind::ParserState { .. } => self.pending.push(Vec::new()),
            DeclarationKind::Variable { .. } if is_initialized_local(&declaration, context) => {
                self.pending.push(Vec::new())
            }
            DeclarationKind::Extern { .. }
            | DeclarationKind::Method { .. }
            | DeclarationKind::Table { .. }
            | DeclarationKind::StatefulAlu { .. }
            | DeclarationKind::Instance { .. }
            | DeclarationKind::Package { .. }
            | DeclarationKind::Struct { .. }
            | DeclarationKind::Header { .. }
            | DeclarationKind::HeaderUnion { .. } => context.prune(),
            _ => {}
        }
        declaration
    }

    fn postorder_declaration(
        &mut self,
        declaration: Rc<Declaration>,
        context: &mut TransformContext,
    ) -> Output<Declaration> {
        match &declaration.kind {
            DeclarationKind::Variable { .. } if is_initialized_local(&declaration, context) => {
                let pending = self.pending.pop().unwrap_or_default();
                if pending.is_empty() {
                    return Output::One(declaration);
                }
                Output::One(self.move_initialization(declaration, pending, context))
            }
            DeclarationKind::ParserState {
                components,
                selection,
            } => {
                let pending = self.pending.pop().unwrap_or_default();
                if pending.is_empty() {
                    return Output::One(declaration);
                }
                Output::One(declaration.with_kind(DeclarationKind::ParserState {
                    components: components.iter().cloned().chain(pending).collect(),
                    selection: selection.clone(),
                }))
            }
            DeclarationKind::Control { .. } | DeclarationKind::Parser { .. } => {
                match self.finish_container(&declaration) {
                    Some(declaration) => Output::One(declaration),
                    None => Output::One(declaration),
                }
            }
            _ => Output::One(declaration),
        }
    }

    fn preorder_statement(
        &mut self,
        statement: Rc<Statement>,
        _context: &mut TransformContext,
    ) -> Rc<Statement> {
        self.pending.push(Vec::new());
        statement
    }

    fn postorder_statement(
        &mut self,
        statement: Rc<Statement>,
        _context: &mut TransformContext,
    ) -> Output<Statement> {
        let mut pending = self.pending.pop().unwrap_or_default();
        if pending.is_empty() {
            return Output::One(statement);
        }
        pending.push(statement);
        Output::Many(pending)
    }

    fn preorder_expression(
        &mut self,
        expression: Rc<Expression>,
        context: &mut TransformContext,
    ) -> Rc<Expression> {
        if self.pending.is_empty() || (expression.is_method_call() && self.is_exempt(&expression)) {
            context.prune();
        } else if is_conditional_operand(&expression, context) {
            if has_complex_call(&expression) {
                report_warning!(
                    self.diagnostics,
                    expression.span,
                    "`{expression}` is only evaluated conditionally; its call arguments stay in place"
                );
            }
            context.prune();
        }
        expression
    }

    fn postorder_expression(
        &mut self,
        expression: Rc<Expression>,
        context: &mut TransformContext,
    ) -> Rc<Expression> {
        match &expression.kind {
            ExpressionKind::MethodCall {
                target,
                type_arguments,
                arguments,
            } => {
                let simplified = arguments
                    .iter()
                    .map(|argument| {
                        let simplified = self.simplify(&argument.expression, context);
                        if Rc::ptr_eq(&simplified, &argument.expression) {
                            argument.clone()
                        } else {
                            argument.with_expression(simplified)
                        }
                    })
                    .collect::<Vec<_>>();

                if simplified.iter().zip(arguments.iter()).all(|(a, b)| Rc::ptr_eq(a, b)) {
                    return expression;
                }
                expression.with_kind(ExpressionKind::MethodCall {
                    target: target.clone(),
                    type_arguments: type_arguments.clone(),
                    arguments: simplified.into(),
                })
            }
            ExpressionKind::Select { selectors, cases } => {
                let simplified = selectors
                    .iter()
                    .map(|selector| self.simplify(selector, context))
                    .collect::<Vec<_>>();

                if simplified.iter().zip(selectors.iter()).all(|(a, b)| Rc::ptr_eq(a, b)) {
                    return expression;
                }
                expression.with_kind(ExpressionKind::Select {
                    selectors: simplified.into(),
                    cases: cases.clone(),
                })
            }
            _ => expression,
        }
    }

    fn preorder_property(
        &mut self,
        property: Rc<Property>,
        context: &mut TransformContext,
    ) -> Rc<Property> {
        context.prune();
        property
    }

    /// A shared call must hoist its arguments before every statement using it
    fn visit_once(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        diagnostics::Severity,
        ir::{build::*, print::render_declaration, Direction, StatementKind},
        middle::passes::testing::{body_of, compile, recheck},
    };
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn declarations(body: Vec<Rc<Statement>>) -> Vec<Rc<Declaration>> {
        vec![
            structure("s_t", vec![("b", bits(8))]),
            method(
                "f",
                vec![type_variable("T")],
                void_type(),
                vec![
                    parameter(Direction::In, "first", bits(8)),
                    parameter(Direction::In, "second", bits(8)),
                    parameter(Direction::In, "third", named_type("T")),
                ],
            ),
            function(
                "g",
                bits(8),
                vec![parameter(Direction::In, "v", bits(8))],
                vec![returning(path("v"))],
            ),
            control(
                "c",
                vec![
                    parameter(Direction::InOut, "a", named_type("s_t")),
                    parameter(Direction::InOut, "x", bits(8)),
                ],
                Vec::new(),
                body,
            ),
        ]
    }

    fn returning(value: Rc<Expression>) -> Rc<Statement> {
        Statement::new(StatementKind::Return(Some(value)))
    }

    fn plus_one(operand: Rc<Expression>) -> Rc<Expression> {
        binary(BinaryOperatorKind::Add, operand, sized(1, 8))
    }

    fn is_zero(operand: Rc<Expression>) -> Rc<Expression> {
        binary(BinaryOperatorKind::Equals, operand, sized(0, 8))
    }

    fn g_plus_one() -> Rc<Expression> {
        binary(
            BinaryOperatorKind::Add,
            call(path("g"), vec![path("x")]),
            int(1),
        )
    }

    #[test]
    fn complex_arguments_move_into_temporaries() {
        let (program, mut context) = compile(declarations(vec![call_statement(call(
            path("f"),
            vec![
                member(path("a"), "b"),
                g_plus_one(),
                list(vec![int(1), int(2), int(3)]),
            ],
        ))]));

        let output = RemoveComplexExpressions.run(program, &mut context).unwrap();
        let output = recheck(output, &mut context);

        assert_eq!(
            render_declaration(output.find("c").unwrap(), false),
            indoc! {"
                control c(inout s_t a, inout bit<8> x) {
                    bit<8> tmp;
                    apply {
                        tmp = g(x) + 1;
                        f(a.b, tmp, { 1, 2, 3 });
                    }
                }
            "}
        );
    }

    #[test]
    fn list_elements_are_hoisted_one_by_one() {
        let (program, mut context) = compile(declarations(vec![
            assign(path("x"), sized(1, 8)),
            if_statement(
                binary(BinaryOperatorKind::Equals, path("x"), sized(1, 8)),
                call_statement(call(
                    path("f"),
                    vec![path("x"), path("x"), list(vec![path("x"), g_plus_one()])],
                )),
                None,
            ),
        ]));

        let output = RemoveComplexExpressions.run(program, &mut context).unwrap();
        assert_eq!(
            body_of(&output, "c"),
            vec![
                "x = 8w1;",
                indoc! {"
                    if (x == 8w1) {
                        tmp = g(x) + 1;
                        f(x, x, { x, tmp });
                    }"},
            ]
        );
    }

    #[test]
    fn hash_calls_keep_their_arguments() {
        let (program, mut context) = compile(vec![
            control(
                "c",
                vec![parameter(Direction::InOut, "x", bits(16))],
                vec![instance(
                    "h",
                    specialized_type("Hash", vec![bits(16)]),
                    vec![member(type_name(named_type("HashAlgorithm")), "crc16")],
                )],
                vec![assign(
                    path("x"),
                    method_call(
                        path("h"),
                        "get",
                        vec![list(vec![binary(
                            BinaryOperatorKind::Add,
                            path("x"),
                            sized(1, 16),
                        )])],
                    ),
                )],
            ),
        ]);

        let output = RemoveComplexExpressions.run(program.clone(), &mut context).unwrap();
        assert!(Rc::ptr_eq(&output, &program));
    }

    #[test]
    fn complex_select_keys_are_hoisted_into_the_state() {
        let (program, mut context) = compile(vec![
            header("h_t", vec![("f", bits(8))]),
            parser(
                "p",
                vec![
                    parameter(Direction::None, "pkt", named_type("packet_in")),
                    parameter(Direction::Out, "h", named_type("h_t")),
                ],
                Vec::new(),
                vec![parser_state(
                    "start",
                    vec![call_statement(method_call(path("pkt"), "extract", vec![path("h")]))],
                    select(
                        vec![binary(
                            BinaryOperatorKind::BitwiseAnd,
                            member(path("h"), "f"),
                            sized(15, 8),
                        )],
                        vec![
                            select_case(sized(1, 8), "accept"),
                            select_case(default_keyset(), "reject"),
                        ],
                    ),
                )],
            ),
        ]);

        let output = RemoveComplexExpressions.run(program, &mut context).unwrap();
        let output = recheck(output, &mut context);

        assert_eq!(
            render_declaration(output.find("p").unwrap(), false),
            indoc! {"
                parser p(packet_in pkt, out h_t h) {
                    bit<8> tmp;
                    state start {
                        pkt.extract(h);
                        tmp = h.f & 8w15;
                        transition select(tmp) {
                            8w1: accept;
                            default: reject;
                        }
                    }
                }
            "}
        );
    }

    #[test]
    fn conditionally_evaluated_calls_keep_their_arguments() {
        let (program, mut context) = compile(vec![
            function(
                "g",
                bits(8),
                vec![parameter(Direction::In, "v", bits(8))],
                vec![returning(path("v"))],
            ),
            function(
                "bump",
                bits(8),
                vec![parameter(Direction::InOut, "v", bits(8))],
                vec![assign(path("v"), plus_one(path("v"))), returning(path("v"))],
            ),
            function(
                "ok",
                bool_type(),
                vec![parameter(Direction::In, "v", bits(8))],
                vec![returning(is_zero(path("v")))],
            ),
            control(
                "c",
                vec![
                    parameter(Direction::InOut, "x", bits(8)),
                    parameter(Direction::InOut, "flag", bool_type()),
                ],
                Vec::new(),
                vec![
                    assign(
                        path("x"),
                        mux(
                            is_zero(path("x")),
                            path("x"),
                            call(path("g"), vec![call(path("bump"), vec![path("x")])]),
                        ),
                    ),
                    assign(
                        path("flag"),
                        binary(
                            BinaryOperatorKind::LogicalAnd,
                            is_zero(path("x")),
                            call(path("ok"), vec![plus_one(path("x"))]),
                        ),
                    ),
                    assign(
                        path("flag"),
                        binary(
                            BinaryOperatorKind::LogicalOr,
                            call(path("ok"), vec![plus_one(path("x"))]),
                            is_zero(path("x")),
                        ),
                    ),
                ],
            ),
        ]);

        let output = RemoveComplexExpressions.run(program, &mut context).unwrap();
        assert_eq!(
            body_of(&output, "c"),
            vec![
                "x = (x == 8w0) ? x : g(bump(x));",
                "flag = (x == 8w0) && ok(x + 8w1);",
                "tmp = x + 8w1;",
                "flag = ok(tmp) || (x == 8w0);",
            ]
        );
        assert_eq!(
            context.diagnostics.messages(Severity::Warning),
            vec![
                "`g(bump(x))` is only evaluated conditionally; its call arguments stay in place",
                "`ok(x + 8w1)` is only evaluated conditionally; its call arguments stay in place",
            ]
        );
    }

    #[test]
    fn local_initializers_move_into_the_body() {
        let (program, mut context) = compile(vec![
            function(
                "g",
                bits(8),
                vec![parameter(Direction::In, "v", bits(8))],
                vec![returning(path("v"))],
            ),
            control(
                "c",
                vec![parameter(Direction::InOut, "x", bits(8))],
                vec![
                    variable("y", bits(8), Some(call(path("g"), vec![plus_one(path("x"))]))),
                    variable("z", bits(8), Some(path("x"))),
                ],
                vec![assign(path("x"), path("y"))],
            ),
        ]);

        let output = RemoveComplexExpressions.run(program, &mut context).unwrap();
        let output = recheck(output, &mut context);

        assert_eq!(
            render_declaration(output.find("c").unwrap(), false),
            indoc! {"
                control c(inout bit<8> x) {
                    bit<8> tmp;
                    bit<8> y;
                    bit<8> z = x;
                    apply {
                        tmp = x + 8w1;
                        y = g(tmp);
                        x = y;
                    }
                }
            "}
        );
    }

    #[test]
    fn parser_local_initializers_move_into_the_start_state() {
        let (program, mut context) = compile(vec![
            function(
                "g",
                bits(8),
                vec![parameter(Direction::In, "v", bits(8))],
                vec![returning(path("v"))],
            ),
            parser(
                "p",
                vec![
                    parameter(Direction::None, "pkt", named_type("packet_in")),
                    parameter(Direction::In, "base", bits(8)),
                ],
                vec![variable(
                    "n",
                    bits(8),
                    Some(call(path("g"), vec![plus_one(path("base"))])),
                )],
                vec![parser_state("start", Vec::new(), path("accept"))],
            ),
        ]);

        let output = RemoveComplexExpressions.run(program, &mut context).unwrap();
        let output = recheck(output, &mut context);

        assert_eq!(
            render_declaration(output.find("p").unwrap(), false),
            indoc! {"
                parser p(packet_in pkt, in bit<8> base) {
                    bit<8> tmp;
                    bit<8> n;
                    state start {
                        tmp = base + 8w1;
                        n = g(tmp);
                        transition accept;
                    }
                }
            "}
        );
    }

    #[test]
    fn later_temporaries_get_numbered_names() {
        let (program, mut context) = compile(declarations(vec![
            call_statement(call(path("f"), vec![g_plus_one(), path("x"), path("x")])),
            call_statement(call(path("f"), vec![path("x"), g_plus_one(), path("x")])),
        ]));

        let output = RemoveComplexExpressions.run(program, &mut context).unwrap();
        assert_eq!(
            body_of(&output, "c"),
            vec![
                "tmp = g(x) + 1;",
                "f(tmp, x, x);",
                "tmp_0 = g(x) + 1;",
                "f(x, tmp_0, x);",
            ]
        );
    }
}
