//! Rewrites `stateful_alu` blocks into `RegisterAction` instances.
//!
//! A block names the register it works on (`reg`), up to two comparisons
//! (`condition_lo`, `condition_hi`), two guarded updates of the stored value
//! (`update_lo_1_*`, `update_lo_2_*`) and a guarded output (`output_*`).
//! The synthesized `apply` reads the stored value once into a local, which
//! replaces `register_lo`; `alu_lo` is the value being written back.
//! Guards that can never hold drop their update, guards that always hold
//! lose their `if`, and two updates guarded by complementary predicates
//! become one `if`/`else`.

use std::rc::Rc;

use crate::{
    diagnostics::{report_error, report_warning, CompilerBug, Diagnostics},
    ir::{
        build,
        equiv::equivalent_expressions,
        transform::{transform_expression, transform_program, Transform, TransformContext},
        Argument, BinaryOperatorKind, Declaration, DeclarationKind, Direction, Expression,
        ExpressionKind, Literal, Program, PropertyValue, Statement, Symbol, Type, TypeKind,
        UnaryOperatorKind,
    },
    middle::{
        pass::{CompilationContext, Pass, PipelineError},
        reference_map::ReferenceMap,
        type_map::{type_arguments, type_declaration},
    },
};

/// Guards over more distinct comparisons than this are kept as written
const MAX_ATOMS: usize = 16;

const KNOWN_PROPERTIES: &[&str] = &[
    "reg",
    "condition_lo",
    "condition_hi",
    "update_lo_1_predicate",
    "update_lo_1_value",
    "update_lo_2_predicate",
    "update_lo_2_value",
    "output_predicate",
    "output_value",
];

#[derive(Debug, Default)]
pub struct SynthesizeStatefulAlu;

impl Pass for SynthesizeStatefulAlu {
    fn name(&self) -> &str {
        "SynthesizeStatefulAlu"
    }

    fn run(
        &mut self,
        program: Rc<Program>,
        context: &mut CompilationContext,
    ) -> Result<Rc<Program>, PipelineError> {
        let mut synthesize = DoSynthesize {
            reference_map: &mut context.reference_map,
            diagnostics: &mut context.diagnostics,
            bug: None,
        };
        let program = transform_program(&mut synthesize, &program)?;

        match synthesize.bug {
            Some(bug) => Err(bug.into()),
            None => Ok(program),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Guard {
    Always,
    Never,
    Sometimes,
}

/// Decides whether a boolean guard is a tautology or a contradiction by
/// trying every truth assignment of its comparisons. Comparisons are
/// treated as independent, so some guards that always hold are reported
/// as `Sometimes`.
fn classify(guard: &Expression) -> Guard {
    let mut atoms = Vec::new();
    collect_atoms(guard, &mut atoms);
    if atoms.len() > MAX_ATOMS {
        log::debug!("guard `{guard}` has {} comparisons; keeping it", atoms.len());
        return Guard::Sometimes;
    }

    let (mut holds, mut fails) = (false, false);
    for assignment in 0u32..(1 << atoms.len()) {
        if evaluate(guard, &atoms, assignment) {
            holds = true;
        } else {
            fails = true;
        }
        if holds && fails {
            return Guard::Sometimes;
        }
    }

    if holds {
        Guard::Always
    } else {
        Guard::Never
    }
}

fn collect_atoms<'e>(expression: &'e Expression, atoms: &mut Vec<&'e Expression>) {
    match &expression.kind {
        ExpressionKind::Literal(Literal::Boolean(_)) => {}
        ExpressionKind::Unary {
            operator: UnaryOperatorKind::LogicalNot,
            operand,
        } => collect_atoms(operand, atoms),
        ExpressionKind::Binary {
            operator: BinaryOperatorKind::LogicalAnd | BinaryOperatorKind::LogicalOr,
            lhs,
            rhs,
        } => {
            collect_atoms(lhs, atoms);
            collect_atoms(rhs, atoms);
        }
        _ => {
            if !atoms
                .iter()
                .any(|atom| equivalent_expressions(atom, expression))
            {
                atoms.push(expression);
            }
        }
    }
}

fn evaluate(expression: &Expression, atoms: &[&Expression], assignment: u32) -> bool {
    match &expression.kind {
        ExpressionKind::Literal(Literal::Boolean(value)) => *value,
        ExpressionKind::Unary {
            operator: UnaryOperatorKind::LogicalNot,
            operand,
        } => !evaluate(operand, atoms, assignment),
        ExpressionKind::Binary {
            operator: BinaryOperatorKind::LogicalAnd,
            lhs,
            rhs,
        } => evaluate(lhs, atoms, assignment) && evaluate(rhs, atoms, assignment),
        ExpressionKind::Binary {
            operator: BinaryOperatorKind::LogicalOr,
            lhs,
            rhs,
        } => evaluate(lhs, atoms, assignment) || evaluate(rhs, atoms, assignment),
        _ => atoms
            .iter()
            .position(|atom| equivalent_expressions(atom, expression))
            .is_some_and(|i| assignment & (1 << i) != 0),
    }
}

/// Whether exactly one of `a` and `b` holds under every assignment
fn complementary(a: &Rc<Expression>, b: &Rc<Expression>) -> bool {
    let exclusive = build::binary(
        BinaryOperatorKind::LogicalOr,
        build::binary(BinaryOperatorKind::LogicalAnd, a.clone(), build::not(b.clone())),
        build::binary(BinaryOperatorKind::LogicalAnd, build::not(a.clone()), b.clone()),
    );
    classify(&exclusive) == Guard::Always
}

/// Replaces the names a stateful ALU block predefines by what they stand
/// for inside the synthesized `apply`
struct Rename {
    stored: Symbol,
    updated: Symbol,
    condition_lo: Option<Rc<Expression>>,
    condition_hi: Option<Rc<Expression>>,
    reads_stored: bool,
    problems: Vec<String>,
}

impl Transform for Rename {
    fn postorder_expression(
        &mut self,
        expression: Rc<Expression>,
        _context: &mut TransformContext,
    ) -> Rc<Expression> {
        let Some(path) = expression.as_path() else {
            return expression;
        };

        let name = path.name.name();
        match name {
            "register_lo" => {
                self.reads_stored = true;
                build::path(self.stored.value())
            }
            "alu_lo" => build::path(self.updated.value()),
            "condition_lo" | "condition_hi" => {
                let condition = match name {
                    "condition_lo" => &self.condition_lo,
                    _ => &self.condition_hi,
                };
                match condition {
                    Some(condition) => condition.clone(),
                    None => {
                        self.problems.push(format!("`{name}` is used but never defined"));
                        expression
                    }
                }
            }
            "register_hi" | "alu_hi" => {
                self.problems.push(format!(
                    "`{name}` is not supported; only the low half of a register can be used"
                ));
                expression
            }
            _ => expression,
        }
    }

    fn visit_once(&self) -> bool {
        false
    }
}

struct DoSynthesize<'a> {
    reference_map: &'a mut ReferenceMap,
    diagnostics: &'a mut Diagnostics,
    bug: Option<CompilerBug>,
}

impl DoSynthesize<'_> {
    /// The element and index types of the register a block works on
    fn register_types(&mut self, alu: &Declaration) -> Option<(Rc<Expression>, Rc<Type>, Rc<Type>)> {
        let Some(register) = expression_property(alu, "reg") else {
            report_error!(
                self.diagnostics,
                alu.span,
                "stateful ALU `{}` has no `reg` property",
                alu.name
            );
            return None;
        };

        let instance_type = register
            .as_path()
            .and_then(|path| self.reference_map.get_declaration(path))
            .and_then(|declaration| match &declaration.kind {
                DeclarationKind::Instance { ty, .. } => Some(ty.clone()),
                _ => None,
            });

        let types = instance_type.and_then(|ty| {
            let is_register = type_declaration(&ty, self.reference_map)
                .is_some_and(|declaration| declaration.name() == "Register");
            match type_arguments(&ty) {
                [element, index] if is_register => Some((element.clone(), index.clone())),
                _ => None,
            }
        });

        match types {
            Some((element, index)) => Some((register, element, index)),
            None => {
                report_error!(
                    self.diagnostics,
                    register.span,
                    "stateful ALU `{}`: `{register}` is not a register",
                    alu.name
                );
                None
            }
        }
    }

    fn rename(
        &mut self,
        rename: &mut Rename,
        expression: Option<Rc<Expression>>,
    ) -> Option<Rc<Expression>> {
        let expression = expression?;
        match transform_expression(rename, &expression) {
            Ok(renamed) => Some(renamed),
            Err(bug) => {
                self.bug.get_or_insert(bug);
                Some(expression)
            }
        }
    }

    fn synthesize(&mut self, alu: &Rc<Declaration>) -> Option<Rc<Declaration>> {
        let (register, element, index) = self.register_types(alu)?;

        for property in alu.properties().into_iter().flat_map(|p| p.iter()) {
            if !KNOWN_PROPERTIES.contains(&property.name.name()) {
                report_warning!(
                    self.diagnostics,
                    alu.span,
                    "stateful ALU `{}`: ignoring unknown property `{}`",
                    alu.name,
                    property.name
                );
            }
        }

        // The parameters of the synthesized `apply`; they shadow outer names
        let value = Symbol::new("value");
        let rv = Symbol::new("rv");
        let stored = self.reference_map.new_name("in_value");

        let mut rename = Rename {
            stored,
            updated: value,
            condition_lo: None,
            condition_hi: None,
            reads_stored: false,
            problems: Vec::new(),
        };
        rename.condition_lo = self.rename(&mut rename, expression_property(alu, "condition_lo"));
        rename.condition_hi = self.rename(&mut rename, expression_property(alu, "condition_hi"));

        let mut property = |name: &str| self.rename(&mut rename, expression_property(alu, name));
        let updates = [
            (property("update_lo_1_predicate"), property("update_lo_1_value")),
            (property("update_lo_2_predicate"), property("update_lo_2_value")),
        ];
        let output = (property("output_predicate"), property("output_value"));

        if !rename.problems.is_empty() {
            for problem in rename.problems.iter() {
                report_error!(
                    self.diagnostics,
                    alu.span,
                    "stateful ALU `{}`: {problem}",
                    alu.name
                );
            }
            return None;
        }

        let write = |expression: Rc<Expression>| build::assign(build::path(value.value()), expression);
        let mut body = Vec::new();
        if rename.reads_stored {
            body.push(build::declaration_statement(build::variable(
                stored.value(),
                element.clone(),
                Some(build::path(value.value())),
            )));
        }

        match updates {
            [(Some(first), Some(a)), (Some(second), Some(b))]
                if classify(&first) == Guard::Sometimes && complementary(&first, &second) =>
            {
                log::trace!("merging complementary updates of `{}`", alu.name);
                body.push(build::if_statement(
                    first,
                    build::block_statement(vec![write(a)]),
                    Some(build::block_statement(vec![write(b)])),
                ));
            }
            updates => {
                for (predicate, update) in updates {
                    if let Some(update) = update {
                        body.extend(guarded(predicate, write(update)));
                    }
                }
            }
        }

        if let (predicate, Some(result)) = output {
            body.extend(guarded(
                predicate,
                build::assign(build::path(rv.value()), result),
            ));
        }

        log::debug!("synthesized a register action for `{}`", alu.name);
        Some(alu.with_kind(register_action(register, element, index, body)))
    }
}

/// A `RegisterAction<T, I, T>` over `register` whose `apply` runs `body`
/// with the stored value as `value` and the result as `rv`
pub(super) fn register_action(
    register: Rc<Expression>,
    element: Rc<Type>,
    index: Rc<Type>,
    body: Vec<Rc<Statement>>,
) -> DeclarationKind {
    let apply = build::function(
        "apply",
        build::void_type(),
        vec![
            build::parameter(Direction::InOut, "value", element.clone()),
            build::parameter(Direction::Out, "rv", element.clone()),
        ],
        body,
    );

    DeclarationKind::Instance {
        ty: Type::new(TypeKind::Specialized {
            base: build::named_type("RegisterAction"),
            arguments: vec![element.clone(), index, element].into(),
        }),
        arguments: vec![Argument::positional(register)].into(),
        initializer: Some(vec![apply].into()),
    }
}

fn expression_property(declaration: &Declaration, name: &str) -> Option<Rc<Expression>> {
    match &declaration.property(name)?.value {
        PropertyValue::Expression(expression) => Some(expression.clone()),
        _ => None,
    }
}

/// `statement` under `predicate`; nothing when the predicate never holds
fn guarded(predicate: Option<Rc<Expression>>, statement: Rc<Statement>) -> Option<Rc<Statement>> {
    let Some(predicate) = predicate else {
        return Some(statement);
    };
    match classify(&predicate) {
        Guard::Always => Some(statement),
        Guard::Never => None,
        Guard::Sometimes => Some(build::if_statement(
            predicate,
            build::block_statement(vec![statement]),
            None,
        )),
    }
}

impl Transform for DoSynthesize<'_> {
    fn preorder_declaration(
        &mut self,
        declaration: Rc<Declaration>,
        context: &mut TransformContext,
    ) -> Rc<Declaration> {
        match declaration.kind {
            DeclarationKind::Control { .. } => declaration,
            DeclarationKind::StatefulAlu { .. } => {
                context.prune();
                self.synthesize(&declaration).unwrap_or(declaration)
            }
            _ => {
                context.prune();
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

    fn preorder_expression(
        &mut self,
        expression: Rc<Expression>,
        context: &mut TransformContext,
    ) -> Rc<Expression> {
        context.prune();
        expression
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        diagnostics::Severity,
        ir::{build::*, print::render_declaration, Property},
        middle::passes::testing::{compile, recheck},
    };
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn register_control(properties: Vec<Rc<Property>>) -> Vec<Rc<Declaration>> {
        vec![control(
            "c",
            vec![parameter(Direction::InOut, "x", bits(32))],
            vec![
                instance(
                    "r",
                    specialized_type("Register", vec![bits(32), bits(16)]),
                    vec![sized(1024, 32)],
                ),
                stateful_alu("s", properties),
            ],
            Vec::new(),
        )]
    }

    fn greater(lhs: Rc<Expression>, value: u64) -> Rc<Expression> {
        binary(BinaryOperatorKind::GreaterThan, lhs, sized(value.into(), 32))
    }

    #[test]
    fn complementary_updates_become_one_conditional() {
        let (program, mut context) = compile(register_control(vec![
            property("reg", path("r")),
            property("condition_lo", greater(path("register_lo"), 10)),
            property("update_lo_1_predicate", path("condition_lo")),
            property(
                "update_lo_1_value",
                binary(BinaryOperatorKind::Add, path("register_lo"), sized(1, 32)),
            ),
            property("update_lo_2_predicate", not(path("condition_lo"))),
            property("update_lo_2_value", sized(0, 32)),
            property("output_value", path("alu_lo")),
        ]));

        let output = SynthesizeStatefulAlu.run(program, &mut context).unwrap();
        let output = recheck(output, &mut context);

        assert_eq!(
            render_declaration(output.find("c").unwrap(), false),
            indoc! {"
                control c(inout bit<32> x) {
                    Register<bit<32>, bit<16>>(32w1024) r;
                    RegisterAction<bit<32>, bit<16>, bit<32>>(r) s = {
                        void apply(inout bit<32> value, out bit<32> rv) {
                            bit<32> in_value = value;
                            if (in_value > 32w10) {
                                value = in_value + 32w1;
                            } else {
                                value = 32w0;
                            }
                            rv = value;
                        }
                    };
                    apply {
                    }
                }
            "}
        );
    }

    #[test]
    fn decided_guards_lose_their_conditional() {
        let condition = || path("condition_lo");
        let (program, mut context) = compile(register_control(vec![
            property("reg", path("r")),
            property("condition_lo", greater(path("register_lo"), 3)),
            property(
                "update_lo_1_predicate",
                binary(BinaryOperatorKind::LogicalAnd, condition(), not(condition())),
            ),
            property("update_lo_1_value", sized(1, 32)),
            property(
                "update_lo_2_predicate",
                binary(BinaryOperatorKind::LogicalOr, condition(), not(condition())),
            ),
            property("update_lo_2_value", sized(2, 32)),
            property("output_predicate", condition()),
            property("output_value", path("register_lo")),
        ]));

        let output = SynthesizeStatefulAlu.run(program, &mut context).unwrap();
        let output = recheck(output, &mut context);

        let DeclarationKind::Control { locals, .. } = &output.find("c").unwrap().kind else {
            panic!("not a control");
        };
        assert_eq!(
            render_declaration(&locals[1], false),
            indoc! {"
                RegisterAction<bit<32>, bit<16>, bit<32>>(r) s = {
                    void apply(inout bit<32> value, out bit<32> rv) {
                        bit<32> in_value = value;
                        value = 32w2;
                        if (in_value > 32w3) {
                            rv = in_value;
                        }
                    }
                };
            "}
        );
    }

    #[test]
    fn guards_are_classified_by_their_comparisons() {
        let a = || greater(path("a"), 1);
        let b = || greater(path("b"), 1);

        assert_eq!(classify(&boolean(true)), Guard::Always);
        assert_eq!(classify(&a()), Guard::Sometimes);
        assert_eq!(
            classify(&binary(
                BinaryOperatorKind::LogicalOr,
                not(binary(BinaryOperatorKind::LogicalAnd, a(), b())),
                a(),
            )),
            Guard::Always
        );
        assert_eq!(
            classify(&binary(
                BinaryOperatorKind::LogicalAnd,
                binary(BinaryOperatorKind::LogicalOr, a(), b()),
                not(binary(BinaryOperatorKind::LogicalOr, b(), a())),
            )),
            Guard::Never
        );
    }

    #[test]
    fn wide_guards_are_kept_as_written() {
        let atoms = (0..=MAX_ATOMS as u64).map(|i| greater(path("a"), i));
        let contradiction = atoms
            .map(|atom| binary(BinaryOperatorKind::LogicalAnd, atom.clone(), not(atom)))
            .reduce(|lhs, rhs| binary(BinaryOperatorKind::LogicalOr, lhs, rhs))
            .unwrap();

        assert_eq!(classify(&contradiction), Guard::Sometimes);
    }

    #[test]
    fn high_halves_are_rejected() {
        let (program, mut context) = compile(register_control(vec![
            property("reg", path("r")),
            property("update_lo_1_value", path("register_hi")),
        ]));

        let output = SynthesizeStatefulAlu.run(program.clone(), &mut context).unwrap();
        assert!(Rc::ptr_eq(&output, &program));
        assert_eq!(
            context.diagnostics.messages(Severity::Error),
            vec![
                "stateful ALU `s`: `register_hi` is not supported; only the low half of a register can be used"
            ]
        );
    }

    #[test]
    fn the_register_must_be_a_register() {
        let (program, mut context) = compile(register_control(vec![property(
            "reg",
            path("x"),
        )]));

        SynthesizeStatefulAlu.run(program, &mut context).unwrap();
        assert_eq!(
            context.diagnostics.messages(Severity::Error),
            vec!["stateful ALU `s`: `x` is not a register"]
        );
    }
}
