//! Name resolution.
//!
//! Walks the program with a stack of scopes and records, for every path in
//! expression or type position, the declaration it refers to. Every declared
//! name is registered as used so that generated names never collide with it.

use std::{collections::VecDeque, rc::Rc};

use hashbrown::HashMap;

use super::{
    pass::{CompilationContext, Pass, PipelineError},
    reference_map::ReferenceMap,
};
use crate::{
    diagnostics::{report_error, CompilerBug, Diagnostics},
    ir::{
        build, Argument, Block, Declaration, DeclarationKind, Expression, ExpressionKind, Path,
        Program, PropertyValue, Signature, Statement, StatementKind, Symbol, Type, TypeKind,
    },
};

/// Names a stateful ALU block may use for the register halves, its two
/// conditions and its two ALU outputs
pub const STATEFUL_ALU_NAMES: &[&str] = &[
    "register_lo",
    "register_hi",
    "condition_lo",
    "condition_hi",
    "alu_lo",
    "alu_hi",
];

#[derive(Debug, Default)]
pub struct ResolveReferences;

impl Pass for ResolveReferences {
    fn name(&self) -> &str {
        "ResolveReferences"
    }

    fn run(
        &mut self,
        program: Rc<Program>,
        context: &mut CompilationContext,
    ) -> Result<Rc<Program>, PipelineError> {
        context.reference_map.clear();
        Resolver::resolve_program(
            &program,
            &mut context.reference_map,
            &mut context.diagnostics,
        )?;
        Ok(program)
    }
}

struct Resolver<'a> {
    reference_map: &'a mut ReferenceMap,
    diagnostics: &'a mut Diagnostics,
    values: ScopeStack<Rc<Declaration>>,
    types: ScopeStack<Rc<Declaration>>,
    /// The instance whose initializer is being resolved, for `this`
    current_instance: Option<Rc<Declaration>>,
    stateful_alu_names: Vec<Rc<Declaration>>,
}

impl<'a> Resolver<'a> {
    /// Resolves a program in two steps, the way a module is resolved: first
    /// every top-level declaration is bound in the global scope so that
    /// references may precede declarations at the top level, then every
    /// declaration is traversed.
    fn resolve_program(
        program: &Program,
        reference_map: &'a mut ReferenceMap,
        diagnostics: &'a mut Diagnostics,
    ) -> Result<(), CompilerBug> {
        let mut resolver = Self {
            reference_map,
            diagnostics,
            values: ScopeStack::new(),
            types: ScopeStack::new(),
            current_instance: None,
            stateful_alu_names: STATEFUL_ALU_NAMES
                .iter()
                .map(|name| build::variable(name, build::bits(32), None))
                .collect(),
        };

        for declaration in program.declarations.iter() {
            resolver.bind_global(declaration);
        }

        for declaration in program.declarations.iter() {
            resolver.resolve_declaration(declaration)?;
        }

        log::debug!(
            "resolved {} paths",
            resolver.reference_map.len()
        );
        Ok(())
    }

    fn bind_global(&mut self, declaration: &Rc<Declaration>) {
        self.reference_map.use_name(declaration.name.symbol);

        let scope = if declaration.is_type() {
            &mut self.types
        } else {
            &mut self.values
        };

        if let Some(existing) = scope.get_global_binding(declaration.name.symbol) {
            // Extern functions may be overloaded, and every `error` declaration
            // extends the same type
            let overload = matches!(
                (&existing.kind, &declaration.kind),
                (DeclarationKind::Method { .. }, DeclarationKind::Method { .. })
                    | (DeclarationKind::Error { .. }, DeclarationKind::Error { .. })
            );

            if !overload {
                report_error!(
                    self.diagnostics,
                    declaration.span,
                    "conflicting definition for `{}`",
                    declaration.name
                );
            }
            return;
        }

        scope.add_global_binding(declaration.name.symbol, declaration.clone());
    }

    /// Binds a declaration in the innermost scope
    fn bind_local(&mut self, declaration: &Rc<Declaration>) {
        self.reference_map.use_name(declaration.name.symbol);

        let scope = if matches!(declaration.kind, DeclarationKind::TypeVariable) {
            &mut self.types
        } else {
            &mut self.values
        };

        if scope.get_shallow_binding(declaration.name.symbol).is_some() {
            report_error!(
                self.diagnostics,
                declaration.span,
                "conflicting definition for `{}`",
                declaration.name
            );
            return;
        }

        scope.add_shallow_binding(declaration.name.symbol, declaration.clone());
    }

    fn push_scope(&mut self) {
        self.values.push_shallow_scope();
        self.types.push_shallow_scope();
    }

    fn pop_scope(&mut self) {
        self.values.pop_shallow_scope();
        self.types.pop_shallow_scope();
    }

    fn bind_parameters(&mut self, parameters: &[Rc<Declaration>]) -> Result<(), CompilerBug> {
        for parameter in parameters {
            self.resolve_declaration(parameter)?;
            self.bind_local(parameter);
        }
        Ok(())
    }

    fn resolve_signature(&mut self, signature: &Signature) -> Result<(), CompilerBug> {
        for type_parameter in signature.type_parameters.iter() {
            self.bind_local(type_parameter);
        }
        self.resolve_type(&signature.return_type)?;
        self.bind_parameters(&signature.parameters)
    }

    fn resolve_declaration(&mut self, declaration: &Rc<Declaration>) -> Result<(), CompilerBug> {
        for annotation in declaration.annotations.iter() {
            for expression in annotation.expressions.iter() {
                self.resolve_expression(expression)?;
            }
        }

        match &declaration.kind {
            DeclarationKind::Constant { ty, value } => {
                self.resolve_type(ty)?;
                self.resolve_expression(value)?;
            }
            DeclarationKind::Variable { ty, initializer } => {
                self.resolve_type(ty)?;
                if let Some(initializer) = initializer {
                    self.resolve_expression(initializer)?;
                }
            }
            DeclarationKind::Parameter {
                ty, default_value, ..
            } => {
                self.resolve_type(ty)?;
                if let Some(default_value) = default_value {
                    self.resolve_expression(default_value)?;
                }
            }
            DeclarationKind::TypeVariable
            | DeclarationKind::Enum { .. }
            | DeclarationKind::Error { .. } => {}
            DeclarationKind::Struct { fields }
            | DeclarationKind::Header { fields }
            | DeclarationKind::HeaderUnion { fields } => {
                for field in fields.iter() {
                    self.resolve_type(&field.ty)?;
                }
            }
            DeclarationKind::Extern {
                type_parameters,
                methods,
            } => {
                self.push_scope();
                for type_parameter in type_parameters.iter() {
                    self.bind_local(type_parameter);
                }
                for method in methods.iter() {
                    self.reference_map.use_name(method.name.symbol);
                    self.resolve_declaration(method)?;
                }
                self.pop_scope();
            }
            DeclarationKind::Method { signature, .. } => {
                self.push_scope();
                self.resolve_signature(signature)?;
                self.pop_scope();
            }
            DeclarationKind::Function { signature, body } => {
                self.push_scope();
                self.resolve_signature(signature)?;
                self.resolve_block(body)?;
                self.pop_scope();
            }
            DeclarationKind::Action { parameters, body } => {
                self.push_scope();
                self.bind_parameters(parameters)?;
                self.resolve_block(body)?;
                self.pop_scope();
            }
            DeclarationKind::Table { properties } => {
                for property in properties.iter() {
                    self.resolve_property_value(&property.value)?;
                }
            }
            DeclarationKind::StatefulAlu { properties } => {
                self.push_scope();
                for name in self.stateful_alu_names.clone() {
                    self.bind_local(&name);
                }
                for property in properties.iter() {
                    self.resolve_property_value(&property.value)?;
                }
                self.pop_scope();
            }
            DeclarationKind::Instance {
                ty,
                arguments,
                initializer,
            } => {
                self.resolve_type(ty)?;
                self.resolve_arguments(arguments)?;

                if let Some(initializer) = initializer {
                    let outer = self.current_instance.replace(declaration.clone());
                    self.push_scope();
                    for declaration in initializer.iter() {
                        self.resolve_declaration(declaration)?;
                        self.bind_local(declaration);
                    }
                    self.pop_scope();
                    self.current_instance = outer;
                }
            }
            DeclarationKind::ParserState {
                components,
                selection,
            } => {
                self.push_scope();
                for component in components.iter() {
                    self.resolve_statement(component)?;
                }
                if let Some(selection) = selection {
                    self.resolve_expression(selection)?;
                }
                self.pop_scope();
            }
            DeclarationKind::Parser {
                type_parameters,
                apply_parameters,
                constructor_parameters,
                locals,
                states,
            } => {
                self.push_scope();
                for type_parameter in type_parameters.iter() {
                    self.bind_local(type_parameter);
                }
                self.bind_parameters(apply_parameters)?;
                self.bind_parameters(constructor_parameters)?;

                let accept = self.reference_map.accept_state().clone();
                let reject = self.reference_map.reject_state().clone();
                self.values.add_shallow_binding(accept.name.symbol, accept);
                self.values.add_shallow_binding(reject.name.symbol, reject);

                for local in locals.iter() {
                    self.resolve_declaration(local)?;
                    self.bind_local(local);
                }

                // States may transition to states declared after them
                for state in states.iter() {
                    self.bind_local(state);
                }
                for state in states.iter() {
                    self.resolve_declaration(state)?;
                }
                self.pop_scope();
            }
            DeclarationKind::Control {
                type_parameters,
                apply_parameters,
                constructor_parameters,
                locals,
                body,
            } => {
                self.push_scope();
                for type_parameter in type_parameters.iter() {
                    self.bind_local(type_parameter);
                }
                self.bind_parameters(apply_parameters)?;
                self.bind_parameters(constructor_parameters)?;
                for local in locals.iter() {
                    self.resolve_declaration(local)?;
                    self.bind_local(local);
                }
                self.resolve_block(body)?;
                self.pop_scope();
            }
            DeclarationKind::Package {
                type_parameters,
                constructor_parameters,
            } => {
                self.push_scope();
                for type_parameter in type_parameters.iter() {
                    self.bind_local(type_parameter);
                }
                self.bind_parameters(constructor_parameters)?;
                self.pop_scope();
            }
        }

        Ok(())
    }

    fn resolve_property_value(&mut self, value: &PropertyValue) -> Result<(), CompilerBug> {
        match value {
            PropertyValue::Expression(expression) => self.resolve_expression(expression),
            PropertyValue::ActionList(actions) => {
                for action in actions.iter() {
                    self.resolve_expression(action)?;
                }
                Ok(())
            }
            PropertyValue::Key(elements) => {
                for element in elements.iter() {
                    self.resolve_expression(&element.expression)?;
                }
                Ok(())
            }
        }
    }

    fn resolve_block(&mut self, block: &Block) -> Result<(), CompilerBug> {
        self.push_scope();
        for statement in block.statements.iter() {
            self.resolve_statement(statement)?;
        }
        self.pop_scope();
        Ok(())
    }

    fn resolve_statement(&mut self, statement: &Statement) -> Result<(), CompilerBug> {
        match &statement.kind {
            StatementKind::Assignment { lhs, rhs } => {
                self.resolve_expression(rhs)?;
                self.resolve_expression(lhs)
            }
            StatementKind::MethodCall(call) => self.resolve_expression(call),
            StatementKind::If {
                condition,
                positive,
                negative,
            } => {
                self.resolve_expression(condition)?;
                self.resolve_statement(positive)?;
                if let Some(negative) = negative {
                    self.resolve_statement(negative)?;
                }
                Ok(())
            }
            StatementKind::Block(block) => self.resolve_block(block),
            StatementKind::Return(value) => match value {
                Some(value) => self.resolve_expression(value),
                None => Ok(()),
            },
            StatementKind::Exit | StatementKind::Empty => Ok(()),
            StatementKind::Declaration(declaration) => {
                // The initializer cannot see the name being declared
                self.resolve_declaration(declaration)?;
                self.bind_local(declaration);
                Ok(())
            }
        }
    }

    fn resolve_arguments(&mut self, arguments: &[Rc<Argument>]) -> Result<(), CompilerBug> {
        for argument in arguments {
            self.resolve_expression(&argument.expression)?;
        }
        Ok(())
    }

    fn resolve_path(&mut self, path: &Path, namespace: Namespace) -> Result<(), CompilerBug> {
        let symbol = path.name.symbol;
        let declaration = match namespace {
            Namespace::Value => self
                .values
                .get_binding(symbol)
                .or_else(|| self.types.get_binding(symbol)),
            Namespace::Type => self.types.get_binding(symbol),
        }
        .cloned();

        match declaration {
            Some(declaration) => self.reference_map.set_declaration(path, &declaration),
            None => {
                let what = match namespace {
                    Namespace::Value => "name",
                    Namespace::Type => "type",
                };
                report_error!(
                    self.diagnostics,
                    path.name.span,
                    "cannot find {what} `{}` in this scope",
                    path.name
                );
                Ok(())
            }
        }
    }

    fn resolve_expression(&mut self, expression: &Expression) -> Result<(), CompilerBug> {
        match &expression.kind {
            ExpressionKind::Literal(_) | ExpressionKind::Default => {}
            ExpressionKind::Path(path) => self.resolve_path(path, Namespace::Value)?,
            ExpressionKind::This => match &self.current_instance {
                Some(instance) => self.reference_map.set_this(expression.id, instance),
                None => report_error!(
                    self.diagnostics,
                    expression.span,
                    "`this` can only be used inside an instance initializer"
                ),
            },
            ExpressionKind::Member { base, .. } => self.resolve_expression(base)?,
            ExpressionKind::ArrayIndex { base, index } => {
                self.resolve_expression(base)?;
                self.resolve_expression(index)?;
            }
            ExpressionKind::TypeName(ty) => self.resolve_type(ty)?,
            ExpressionKind::Binary { lhs, rhs, .. } => {
                self.resolve_expression(lhs)?;
                self.resolve_expression(rhs)?;
            }
            ExpressionKind::Unary { operand, .. } => self.resolve_expression(operand)?,
            ExpressionKind::Cast { ty, expression } => {
                self.resolve_type(ty)?;
                self.resolve_expression(expression)?;
            }
            ExpressionKind::MethodCall {
                target,
                type_arguments,
                arguments,
            } => {
                self.resolve_expression(target)?;
                for ty in type_arguments.iter() {
                    self.resolve_type(ty)?;
                }
                self.resolve_arguments(arguments)?;
            }
            ExpressionKind::ConstructorCall { ty, arguments } => {
                self.resolve_type(ty)?;
                self.resolve_arguments(arguments)?;
            }
            ExpressionKind::List(items) => {
                for item in items.iter() {
                    self.resolve_expression(item)?;
                }
            }
            ExpressionKind::StructLiteral(fields) => {
                for field in fields.iter() {
                    self.resolve_expression(&field.expression)?;
                }
            }
            ExpressionKind::Mux {
                condition,
                positive,
                negative,
            } => {
                self.resolve_expression(condition)?;
                self.resolve_expression(positive)?;
                self.resolve_expression(negative)?;
            }
            ExpressionKind::Select { selectors, cases } => {
                for selector in selectors.iter() {
                    self.resolve_expression(selector)?;
                }
                for case in cases.iter() {
                    self.resolve_expression(&case.keyset)?;
                    self.resolve_path(&case.state, Namespace::Value)?;
                }
            }
        }

        Ok(())
    }

    fn resolve_type(&mut self, ty: &Type) -> Result<(), CompilerBug> {
        match &ty.kind {
            TypeKind::Name(path) => self.resolve_path(path, Namespace::Type),
            TypeKind::Specialized { base, arguments } => {
                self.resolve_type(base)?;
                for argument in arguments.iter() {
                    self.resolve_type(argument)?;
                }
                Ok(())
            }
            TypeKind::Stack { element, .. } => self.resolve_type(element),
            TypeKind::Tuple(elements) => {
                for element in elements.iter() {
                    self.resolve_type(element)?;
                }
                Ok(())
            }
            // Nothing needs to be done to resolve these types
            TypeKind::Bool
            | TypeKind::Bits { .. }
            | TypeKind::Varbits { .. }
            | TypeKind::Void
            | TypeKind::Error
            | TypeKind::String => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Namespace {
    Value,
    Type,
}

/// A data structure to assist in traversing scopes within a specific
/// namespace (values or types)
#[derive(Debug)]
struct ScopeStack<R> {
    global_scope: HashMap<Symbol, R>,
    stack: VecDeque<HashMap<Symbol, R>>,
}

impl<R> ScopeStack<R> {
    fn new() -> Self {
        Self {
            global_scope: HashMap::new(),
            stack: VecDeque::new(),
        }
    }

    /// Creates a new block or declaration scope
    fn push_shallow_scope(&mut self) {
        self.stack.push_back(HashMap::new());
    }

    /// Destroys the current block or declaration scope
    fn pop_shallow_scope(&mut self) {
        debug_assert!(
            !self.stack.is_empty(),
            "Attempted to pop a shallow scope from the global context"
        );

        self.stack.pop_back();
    }

    /// Looks for a binding only within the current (most nested) scope
    fn get_shallow_binding(&self, symbol: Symbol) -> Option<&R> {
        self.stack.back()?.get(&symbol)
    }

    /// Adds a binding within the current (most nested) scope, or the global
    /// scope when no shallow scope is open
    fn add_shallow_binding(&mut self, symbol: Symbol, resolution: R) {
        match self.stack.back_mut() {
            Some(scope) => {
                scope.insert(symbol, resolution);
            }
            None => self.add_global_binding(symbol, resolution),
        }
    }

    /// Gets a binding from the global scope
    fn get_global_binding(&self, symbol: Symbol) -> Option<&R> {
        self.global_scope.get(&symbol)
    }

    /// Adds a binding into the global scope which is accessible from all
    /// shallow scopes
    fn add_global_binding(&mut self, symbol: Symbol, resolution: R) {
        self.global_scope.insert(symbol, resolution);
    }

    /// Traverses the scope stack from back to front looking for bindings before
    /// checking the global scope.
    fn get_binding(&self, symbol: Symbol) -> Option<&R> {
        for scope in self.stack.iter().rev() {
            if let Some(binding) = scope.get(&symbol) {
                return Some(binding);
            }
        }

        self.global_scope.get(&symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        diagnostics::Severity,
        ir::{build::*, prelude, Direction},
    };

    fn resolve(declarations: Vec<Rc<Declaration>>) -> (Rc<Program>, CompilationContext) {
        let mut all = prelude::standard_prelude();
        all.extend(declarations);
        let program = Program::new(all);
        let mut context = CompilationContext::default();
        let program = ResolveReferences.run(program, &mut context).unwrap();
        (program, context)
    }

    #[test]
    fn binds_parameters_locals_and_globals() {
        let x = path("x");
        let h = path("h");
        let Some(x_path) = x.as_path().cloned() else {
            unreachable!()
        };
        let Some(h_path) = h.as_path().cloned() else {
            unreachable!()
        };

        let parameter = parameter(Direction::In, "x", bits(8));
        let global = constant("h", bits(8), sized(1, 8));
        let local = variable("y", bits(8), None);

        let (_, context) = resolve(vec![
            global.clone(),
            action(
                "a",
                vec![parameter.clone()],
                vec![
                    declaration_statement(local),
                    assign(path("y"), binary(crate::ir::BinaryOperatorKind::Add, x, h)),
                ],
            ),
        ]);

        assert!(context.diagnostics.is_empty());
        let map = &context.reference_map;
        assert!(Rc::ptr_eq(map.get_declaration(&x_path).unwrap(), &parameter));
        assert!(Rc::ptr_eq(map.get_declaration(&h_path).unwrap(), &global));
        assert!(map.is_used(Symbol::new("y")));
    }

    #[test]
    fn unknown_names_and_duplicates_are_user_errors() {
        let (_, context) = resolve(vec![
            action("a", Vec::new(), vec![assign(path("nope"), int(1))]),
            action("a", Vec::new(), Vec::new()),
        ]);

        let errors = context.diagnostics.messages(Severity::Error);
        assert_eq!(
            errors,
            vec![
                "conflicting definition for `a`",
                "cannot find name `nope` in this scope"
            ]
        );
    }

    #[test]
    fn parser_states_resolve_forward_and_to_built_ins() {
        let to_next = select(
            vec![path("x")],
            vec![
                select_case(int(1), "next"),
                select_case(default_keyset(), "reject"),
            ],
        );
        let ExpressionKind::Select { cases, .. } = &to_next.kind else {
            unreachable!()
        };
        let next_path = cases[0].state.clone();
        let reject_path = cases[1].state.clone();

        let next = parser_state("next", Vec::new(), path("accept"));
        let (_, context) = resolve(vec![parser(
            "p",
            vec![parameter(Direction::In, "x", bits(8))],
            Vec::new(),
            vec![parser_state("start", Vec::new(), to_next), next.clone()],
        )]);

        assert!(context.diagnostics.is_empty());
        let map = &context.reference_map;
        assert!(Rc::ptr_eq(map.get_declaration(&next_path).unwrap(), &next));
        assert!(Rc::ptr_eq(
            map.get_declaration(&reject_path).unwrap(),
            map.reject_state()
        ));
    }

    #[test]
    fn type_names_resolve_to_type_declarations() {
        let ty = named_type("h_t");
        let TypeKind::Name(type_path) = &ty.kind else {
            unreachable!()
        };
        let type_path = type_path.clone();
        let header = header("h_t", vec![("a", bits(8))]);

        let (_, context) = resolve(vec![
            header.clone(),
            control(
                "c",
                vec![parameter(Direction::InOut, "h", ty)],
                Vec::new(),
                Vec::new(),
            ),
        ]);

        assert!(context.diagnostics.is_empty());
        assert!(Rc::ptr_eq(
            context.reference_map.get_declaration(&type_path).unwrap(),
            &header
        ));
    }
}
