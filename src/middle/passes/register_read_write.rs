//! Replaces `Register.read` and `Register.write` calls in the actions of a
//! control by `execute` calls on register actions synthesized next to the
//! register. Reads of one register share a single action; every write gets
//! its own, since the written value becomes part of its body.

use std::rc::Rc;

use hashbrown::{HashMap, HashSet};

use crate::{
    diagnostics::{report_error, CompilerBug, Diagnostics},
    ir::{
        build,
        transform::{transform_program, Output, Transform, TransformContext},
        visit::{inspect_expression, Context, Inspector},
        Declaration, DeclarationKind, Expression, NodeId, Program, Statement, StatementKind,
        Symbol, Type,
    },
    middle::{
        instance::{MethodInstance, MethodKind, ResolutionError},
        pass::{CompilationContext, Pass, PipelineError},
        reference_map::ReferenceMap,
        type_map::{type_arguments, TypeMap},
    },
};

use super::stateful_alu::register_action;

#[derive(Debug, Default)]
pub struct RegisterReadWrite;

impl Pass for RegisterReadWrite {
    fn name(&self) -> &str {
        "RegisterReadWrite"
    }

    fn run(
        &mut self,
        program: Rc<Program>,
        context: &mut CompilationContext,
    ) -> Result<Rc<Program>, PipelineError> {
        let mut rewrite = DoRegisterReadWrite {
            reference_map: &mut context.reference_map,
            type_map: &mut context.type_map,
            diagnostics: &mut context.diagnostics,
            globals: program.declarations.iter().map(|d| d.id).collect(),
            synthesized: Vec::new(),
            reads: HashMap::new(),
            bug: None,
        };
        let program = transform_program(&mut rewrite, &program)?;

        match rewrite.bug {
            Some(bug) => Err(bug.into()),
            None => Ok(program),
        }
    }
}

/// Collects the paths an expression reads
#[derive(Default)]
struct Paths(Vec<Rc<Expression>>);

impl Inspector for Paths {
    fn preorder_expression(&mut self, expression: &Rc<Expression>, _context: &Context) -> bool {
        if expression.as_path().is_some() {
            self.0.push(expression.clone());
        }
        true
    }
}

struct DoRegisterReadWrite<'a> {
    reference_map: &'a mut ReferenceMap,
    type_map: &'a mut TypeMap,
    diagnostics: &'a mut Diagnostics,
    globals: HashSet<NodeId>,
    /// Register actions made for the current control, with the register
    /// each works on
    synthesized: Vec<(NodeId, Rc<Declaration>)>,
    reads: HashMap<NodeId, Symbol>,
    bug: Option<CompilerBug>,
}

impl DoRegisterReadWrite<'_> {
    fn synthesize(
        &mut self,
        register: &Rc<Declaration>,
        suffix: &str,
        element: &Rc<Type>,
        index: &Rc<Type>,
        body: Vec<Rc<Statement>>,
    ) -> Symbol {
        let name = self
            .reference_map
            .new_name(&format!("{}_{suffix}", register.name));
        log::trace!("synthesized register action `{name}` for `{}`", register.name);

        let kind = register_action(
            build::path(register.name()),
            element.clone(),
            index.clone(),
            body,
        );
        self.synthesized
            .push((register.id, build::declaration(name.value(), kind)));
        name
    }

    /// Whether every name `value` reads is visible outside the action it
    /// appears in
    fn visible_in_control(&mut self, value: &Rc<Expression>, context: &TransformContext) -> bool {
        let control_scope = context
            .enclosing_control()
            .into_iter()
            .flat_map(|control| match &control.kind {
                DeclarationKind::Control {
                    apply_parameters,
                    constructor_parameters,
                    locals,
                    ..
                } => apply_parameters
                    .iter()
                    .chain(constructor_parameters.iter())
                    .chain(locals.iter())
                    .map(|d| d.id)
                    .collect::<Vec<_>>(),
                _ => Vec::new(),
            })
            .collect::<HashSet<_>>();

        let mut paths = Paths::default();
        inspect_expression(&mut paths, value);

        for path in paths.0.iter() {
            let visible = path
                .as_path()
                .and_then(|p| self.reference_map.get_declaration(p))
                .is_some_and(|declaration| {
                    matches!(declaration.kind, DeclarationKind::Constant { .. })
                        || self.globals.contains(&declaration.id)
                        || control_scope.contains(&declaration.id)
                });
            if !visible {
                let action = context.enclosing_action().map(|a| a.name()).unwrap_or_default();
                report_error!(
                    self.diagnostics,
                    path.span,
                    "cannot move the register write in action `{action}` out of it: `{path}` is local to the action"
                );
                return false;
            }
        }
        true
    }

    fn rewrite(&mut self, statement: &Statement, context: &TransformContext) -> Option<Rc<Statement>> {
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

        let MethodKind::ExternMethod {
            object: Some(register),
            extern_type,
            method,
        } = &instance.kind
        else {
            return None;
        };
        if extern_type.name() != "Register" {
            return None;
        }

        let DeclarationKind::Instance { ty, .. } = &register.kind else {
            report_error!(
                self.diagnostics,
                call.span,
                "register `{}` must be declared as an instance to be read or written",
                register.name
            );
            return None;
        };
        let [element, index_type] = type_arguments(ty) else {
            return None;
        };

        let argument = |name: &str| {
            instance
                .substitution()
                .lookup_by_name(Symbol::new(name))
                .map(|argument| argument.expression.clone())
        };
        let index = argument("index")?;

        match method.name() {
            "read" => {
                let result = argument("result")?;
                let action = match self.reads.get(&register.id) {
                    Some(action) => *action,
                    None => {
                        let body = vec![build::assign(build::path("rv"), build::path("value"))];
                        let action = self.synthesize(register, "read", element, index_type, body);
                        self.reads.insert(register.id, action);
                        action
                    }
                };
                Some(build::assign(
                    result,
                    build::method_call(build::path(action.value()), "execute", vec![index]),
                ))
            }
            "write" => {
                let value = argument("value")?;
                if !self.visible_in_control(&value, context) {
                    return None;
                }
                let body = vec![build::assign(build::path("value"), value)];
                let action = self.synthesize(register, "write", element, index_type, body);
                Some(build::call_statement(build::method_call(
                    build::path(action.value()),
                    "execute",
                    vec![index],
                )))
            }
            _ => None,
        }
    }
}

impl Transform for DoRegisterReadWrite<'_> {
    fn preorder_declaration(
        &mut self,
        declaration: Rc<Declaration>,
        context: &mut TransformContext,
    ) -> Rc<Declaration> {
        match declaration.kind {
            DeclarationKind::Control { .. } => {
                self.synthesized.clear();
                self.reads.clear();
            }
            DeclarationKind::Action { .. } if context.enclosing_control().is_some() => {}
            _ => context.prune(),
        }
        declaration
    }

    fn preorder_expression(
        &mut self,
        expression: Rc<Expression>,
        context: &mut TransformContext,
    ) -> Rc<Expression> {
        context.prune();
        expression
    }

    fn postorder_statement(
        &mut self,
        statement: Rc<Statement>,
        context: &mut TransformContext,
    ) -> Output<Statement> {
        if context.enclosing_action().is_none() {
            return Output::One(statement);
        }
        match self.rewrite(&statement, context) {
            Some(rewritten) => Output::One(rewritten),
            None => Output::One(statement),
        }
    }

    fn postorder_declaration(
        &mut self,
        declaration: Rc<Declaration>,
        _context: &mut TransformContext,
    ) -> Output<Declaration> {
        let DeclarationKind::Control {
            type_parameters,
            apply_parameters,
            constructor_parameters,
            locals,
            body,
        } = &declaration.kind
        else {
            return Output::One(declaration);
        };
        if self.synthesized.is_empty() {
            return Output::One(declaration);
        }

        // Each action goes right after its register; registers declared
        // outside the control get theirs first
        let synthesized = std::mem::take(&mut self.synthesized);
        let local_ids = locals.iter().map(|d| d.id).collect::<HashSet<_>>();
        let mut rewritten = synthesized
            .iter()
            .filter(|(register, _)| !local_ids.contains(register))
            .map(|(_, action)| action.clone())
            .collect::<Vec<_>>();
        for local in locals.iter() {
            rewritten.push(local.clone());
            rewritten.extend(
                synthesized
                    .iter()
                    .filter(|(register, _)| *register == local.id)
                    .map(|(_, action)| action.clone()),
            );
        }

        Output::One(declaration.with_kind(DeclarationKind::Control {
            type_parameters: type_parameters.clone(),
            apply_parameters: apply_parameters.clone(),
            constructor_parameters: constructor_parameters.clone(),
            locals: rewritten.into(),
            body: body.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        diagnostics::Severity,
        ir::{build::*, print::render_declaration, Direction},
        middle::passes::testing::{compile, recheck},
    };
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn register_control(actions: Vec<Rc<Declaration>>) -> Vec<Rc<Declaration>> {
        let mut locals = vec![instance(
            "r",
            specialized_type("Register", vec![bits(32), bits(16)]),
            vec![sized(1024, 32)],
        )];
        locals.extend(actions);
        vec![control(
            "c",
            vec![parameter(Direction::InOut, "x", bits(32))],
            locals,
            Vec::new(),
        )]
    }

    fn read(index: Rc<Expression>) -> Rc<Statement> {
        call_statement(method_call(path("r"), "read", vec![path("x"), index]))
    }

    #[test]
    fn reads_and_writes_become_register_actions() {
        let (program, mut context) = compile(register_control(vec![
            action(
                "get",
                vec![parameter(Direction::None, "i", bits(16))],
                vec![read(path("i"))],
            ),
            action(
                "again",
                vec![parameter(Direction::None, "j", bits(16))],
                vec![read(path("j"))],
            ),
            action(
                "put",
                Vec::new(),
                vec![call_statement(method_call(
                    path("r"),
                    "write",
                    vec![sized(3, 16), path("x")],
                ))],
            ),
        ]));

        let output = RegisterReadWrite.run(program, &mut context).unwrap();
        let output = recheck(output, &mut context);

        assert_eq!(
            render_declaration(output.find("c").unwrap(), false),
            indoc! {"
                control c(inout bit<32> x) {
                    Register<bit<32>, bit<16>>(32w1024) r;
                    RegisterAction<bit<32>, bit<16>, bit<32>>(r) r_read = {
                        void apply(inout bit<32> value, out bit<32> rv) {
                            rv = value;
                        }
                    };
                    RegisterAction<bit<32>, bit<16>, bit<32>>(r) r_write = {
                        void apply(inout bit<32> value, out bit<32> rv) {
                            value = x;
                        }
                    };
                    action get(bit<16> i) {
                        x = r_read.execute(i);
                    }
                    action again(bit<16> j) {
                        x = r_read.execute(j);
                    }
                    action put() {
                        r_write.execute(16w3);
                    }
                    apply {
                    }
                }
            "}
        );
    }

    #[test]
    fn writes_of_action_data_are_rejected() {
        let (program, mut context) = compile(register_control(vec![action(
            "put",
            vec![parameter(Direction::None, "v", bits(32))],
            vec![call_statement(method_call(
                path("r"),
                "write",
                vec![sized(0, 16), path("v")],
            ))],
        )]));

        let output = RegisterReadWrite.run(program.clone(), &mut context).unwrap();
        assert!(Rc::ptr_eq(&output, &program));
        assert_eq!(
            context.diagnostics.messages(Severity::Error),
            vec!["cannot move the register write in action `put` out of it: `v` is local to the action"]
        );
    }

    #[test]
    fn controls_without_register_calls_keep_their_identity() {
        let (program, mut context) = compile(register_control(vec![action(
            "set",
            Vec::new(),
            vec![assign(path("x"), sized(1, 32))],
        )]));

        let output = RegisterReadWrite.run(program.clone(), &mut context).unwrap();
        assert!(Rc::ptr_eq(&output, &program));
    }
}
