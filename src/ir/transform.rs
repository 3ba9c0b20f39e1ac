//! Tree-to-tree rewriting.
//!
//! A [`Transform`] sees every node twice: the preorder hook may replace the
//! node before its children are visited (or call [`TransformContext::prune`]
//! to keep the engine out of them), and the postorder hook sees the node after
//! its children were rewritten. The engine rebuilds a parent only when one of
//! its children came back as a different `Rc`, so a pass that changes nothing
//! hands back the very tree it was given.
//!
//! Declaration and statement hooks may return several nodes. In a list (the
//! states of a parser, the statements of a block) they are spliced in place;
//! where exactly one statement is expected they are wrapped in a block.

use std::{ops::Deref, rc::Rc};

use hashbrown::HashMap;

use super::{
    visit::{Context, NodeRef},
    Annotation, Argument, Block, Declaration, DeclarationKind, Expression, ExpressionKind, Field,
    NamedExpression, Program, Property, PropertyValue, SelectCase, Signature, Statement,
    StatementKind, Type, TypeKind,
};
use crate::diagnostics::CompilerBug;

/// What a postorder hook puts in place of the node it was given
#[derive(Debug)]
pub enum Output<T> {
    One(Rc<T>),
    Many(Vec<Rc<T>>),
}

impl<T> Clone for Output<T> {
    fn clone(&self) -> Self {
        match self {
            Output::One(node) => Output::One(node.clone()),
            Output::Many(nodes) => Output::Many(nodes.clone()),
        }
    }
}

impl<T> From<Rc<T>> for Output<T> {
    fn from(node: Rc<T>) -> Self {
        Output::One(node)
    }
}

impl<T> Output<T> {
    pub fn into_vec(self) -> Vec<Rc<T>> {
        match self {
            Output::One(node) => vec![node],
            Output::Many(nodes) => nodes,
        }
    }

    /// Whether this is exactly `original`, untouched
    pub fn is_unchanged(&self, original: &Rc<T>) -> bool {
        matches!(self, Output::One(node) if Rc::ptr_eq(node, original))
    }
}

#[derive(Debug, Default)]
pub struct TransformContext {
    context: Context,
    pruned: bool,
}

impl TransformContext {
    /// Called from a preorder hook: do not visit the children of the node
    /// just returned, and skip its postorder hook
    pub fn prune(&mut self) {
        self.pruned = true;
    }

    fn take_pruned(&mut self) -> bool {
        core::mem::take(&mut self.pruned)
    }
}

impl Deref for TransformContext {
    type Target = Context;

    fn deref(&self) -> &Self::Target {
        &self.context
    }
}

pub trait Transform {
    fn preorder_declaration(
        &mut self,
        declaration: Rc<Declaration>,
        _context: &mut TransformContext,
    ) -> Rc<Declaration> {
        declaration
    }

    fn postorder_declaration(
        &mut self,
        declaration: Rc<Declaration>,
        _context: &mut TransformContext,
    ) -> Output<Declaration> {
        Output::One(declaration)
    }

    fn preorder_statement(
        &mut self,
        statement: Rc<Statement>,
        _context: &mut TransformContext,
    ) -> Rc<Statement> {
        statement
    }

    fn postorder_statement(
        &mut self,
        statement: Rc<Statement>,
        _context: &mut TransformContext,
    ) -> Output<Statement> {
        Output::One(statement)
    }

    fn preorder_expression(
        &mut self,
        expression: Rc<Expression>,
        _context: &mut TransformContext,
    ) -> Rc<Expression> {
        expression
    }

    fn postorder_expression(
        &mut self,
        expression: Rc<Expression>,
        _context: &mut TransformContext,
    ) -> Rc<Expression> {
        expression
    }

    fn preorder_type(&mut self, ty: Rc<Type>, _context: &mut TransformContext) -> Rc<Type> {
        ty
    }

    fn postorder_type(&mut self, ty: Rc<Type>, _context: &mut TransformContext) -> Rc<Type> {
        ty
    }

    fn preorder_property(
        &mut self,
        property: Rc<Property>,
        _context: &mut TransformContext,
    ) -> Rc<Property> {
        property
    }

    fn postorder_property(
        &mut self,
        property: Rc<Property>,
        _context: &mut TransformContext,
    ) -> Rc<Property> {
        property
    }

    /// Whether a subtree reachable through several parents is rewritten once,
    /// with every occurrence replaced by the same result
    fn visit_once(&self) -> bool {
        true
    }
}

pub fn transform_program<T: Transform>(
    transform: &mut T,
    program: &Rc<Program>,
) -> Result<Rc<Program>, CompilerBug> {
    let mut engine = Engine::new(transform);
    let declarations = engine.declarations(&program.declarations);
    engine.finish()?;

    if Rc::ptr_eq(&declarations, &program.declarations) {
        Ok(program.clone())
    } else {
        Ok(Rc::new(Program {
            id: program.id,
            declarations,
        }))
    }
}

pub fn transform_declaration<T: Transform>(
    transform: &mut T,
    declaration: &Rc<Declaration>,
) -> Result<Output<Declaration>, CompilerBug> {
    let mut engine = Engine::new(transform);
    let output = engine.declaration(declaration);
    engine.finish()?;
    Ok(output)
}

pub fn transform_statement<T: Transform>(
    transform: &mut T,
    statement: &Rc<Statement>,
) -> Result<Output<Statement>, CompilerBug> {
    let mut engine = Engine::new(transform);
    let output = engine.statement(statement);
    engine.finish()?;
    Ok(output)
}

pub fn transform_expression<T: Transform>(
    transform: &mut T,
    expression: &Rc<Expression>,
) -> Result<Rc<Expression>, CompilerBug> {
    let mut engine = Engine::new(transform);
    let output = engine.expression(expression);
    engine.finish()?;
    Ok(output)
}

pub fn transform_type<T: Transform>(
    transform: &mut T,
    ty: &Rc<Type>,
) -> Result<Rc<Type>, CompilerBug> {
    let mut engine = Engine::new(transform);
    let output = engine.ty(ty);
    engine.finish()?;
    Ok(output)
}

/// Records whether any child came back as a different node
#[derive(Default)]
struct Tracker {
    changed: bool,
}

impl Tracker {
    fn note<N: ?Sized>(&mut self, old: &Rc<N>, new: Rc<N>) -> Rc<N> {
        if !Rc::ptr_eq(old, &new) {
            self.changed = true;
        }
        new
    }

    fn note_option<N>(&mut self, old: &Option<Rc<N>>, new: Option<Rc<N>>) -> Option<Rc<N>> {
        match (old, &new) {
            (Some(old), Some(new)) if Rc::ptr_eq(old, new) => {}
            (None, None) => {}
            _ => self.changed = true,
        }
        new
    }
}

type Memo<N, O> = HashMap<*const N, (Rc<N>, O)>;

struct Engine<'t, T> {
    transform: &'t mut T,
    context: TransformContext,
    /* The original node is kept alive next to its result so that its address
     * cannot be reused by a node allocated later in the same traversal */
    declarations: Memo<Declaration, Output<Declaration>>,
    statements: Memo<Statement, Output<Statement>>,
    expressions: Memo<Expression, Rc<Expression>>,
    types: Memo<Type, Rc<Type>>,
    bug: Option<CompilerBug>,
}

impl<'t, T: Transform> Engine<'t, T> {
    fn new(transform: &'t mut T) -> Self {
        Self {
            transform,
            context: TransformContext::default(),
            declarations: HashMap::new(),
            statements: HashMap::new(),
            expressions: HashMap::new(),
            types: HashMap::new(),
            bug: None,
        }
    }

    fn finish(self) -> Result<(), CompilerBug> {
        match self.bug {
            Some(bug) => Err(bug),
            None => Ok(()),
        }
    }

    fn report_bug(&mut self, message: String) {
        if self.bug.is_none() {
            self.bug = Some(CompilerBug::Internal(message));
        }
    }

    /* Declarations */

    fn declaration(&mut self, original: &Rc<Declaration>) -> Output<Declaration> {
        let visit_once = self.transform.visit_once();
        if visit_once {
            if let Some((_, output)) = self.declarations.get(&Rc::as_ptr(original)) {
                return output.clone();
            }
        }

        let node = self
            .transform
            .preorder_declaration(original.clone(), &mut self.context);

        let output = if self.context.take_pruned() {
            Output::One(node)
        } else {
            self.context
                .context
                .push(NodeRef::Declaration(node.clone()));
            let node = self.declaration_children(&node).unwrap_or(node);
            self.context.context.pop();

            self.transform
                .postorder_declaration(node, &mut self.context)
        };

        if visit_once {
            self.declarations
                .insert(Rc::as_ptr(original), (original.clone(), output.clone()));
        }

        output
    }

    fn declarations(&mut self, list: &Rc<[Rc<Declaration>]>) -> Rc<[Rc<Declaration>]> {
        let mut changed = false;
        let mut result = Vec::with_capacity(list.len());

        for declaration in list.iter() {
            match self.declaration(declaration) {
                Output::One(node) => {
                    changed |= !Rc::ptr_eq(&node, declaration);
                    result.push(node);
                }
                Output::Many(nodes) => {
                    changed = true;
                    result.extend(nodes);
                }
            }
        }

        if changed {
            result.into()
        } else {
            list.clone()
        }
    }

    fn single_declaration(&mut self, declaration: &Rc<Declaration>) -> Rc<Declaration> {
        match self.declaration(declaration) {
            Output::One(node) => node,
            Output::Many(_) => {
                self.report_bug(format!(
                    "declaration `{}` was expanded into several declarations where only one fits",
                    declaration.name
                ));
                declaration.clone()
            }
        }
    }

    fn annotations(&mut self, list: &Rc<[Rc<Annotation>]>) -> Rc<[Rc<Annotation>]> {
        let mut tracker = Tracker::default();
        let mut result = Vec::with_capacity(list.len());

        for annotation in list.iter() {
            self.context
                .context
                .push(NodeRef::Annotation(annotation.clone()));
            let expressions = self.expressions(&annotation.expressions);
            self.context.context.pop();

            if Rc::ptr_eq(&expressions, &annotation.expressions) {
                result.push(annotation.clone());
            } else {
                tracker.changed = true;
                result.push(Rc::new(Annotation {
                    id: annotation.id,
                    name: annotation.name,
                    expressions,
                }));
            }
        }

        if tracker.changed {
            result.into()
        } else {
            list.clone()
        }
    }

    fn signature(&mut self, signature: &Rc<Signature>) -> Rc<Signature> {
        let mut tracker = Tracker::default();
        let type_parameters = tracker.note(
            &signature.type_parameters,
            self.declarations(&signature.type_parameters),
        );
        let return_type = tracker.note(&signature.return_type, self.ty(&signature.return_type));
        let parameters = tracker.note(&signature.parameters, self.declarations(&signature.parameters));

        if tracker.changed {
            Rc::new(Signature {
                type_parameters,
                return_type,
                parameters,
            })
        } else {
            signature.clone()
        }
    }

    fn fields(&mut self, fields: &Rc<[Field]>) -> Rc<[Field]> {
        let mut tracker = Tracker::default();
        let result = fields
            .iter()
            .map(|field| Field {
                name: field.name,
                ty: tracker.note(&field.ty, self.ty(&field.ty)),
            })
            .collect::<Vec<_>>();

        if tracker.changed {
            result.into()
        } else {
            fields.clone()
        }
    }

    /// The declaration rebuilt from rewritten children, or `None` when no
    /// child changed
    fn declaration_children(&mut self, declaration: &Rc<Declaration>) -> Option<Rc<Declaration>> {
        let annotations = self.annotations(&declaration.annotations);
        let kind = self.declaration_kind(&declaration.kind);

        if kind.is_none() && Rc::ptr_eq(&annotations, &declaration.annotations) {
            return None;
        }

        Some(Rc::new(Declaration {
            id: declaration.id,
            span: declaration.span,
            name: declaration.name,
            annotations,
            kind: kind.unwrap_or_else(|| declaration.kind.clone()),
        }))
    }

    fn declaration_kind(&mut self, kind: &DeclarationKind) -> Option<DeclarationKind> {
        let mut t = Tracker::default();

        let kind = match kind {
            DeclarationKind::Constant { ty, value } => DeclarationKind::Constant {
                ty: t.note(ty, self.ty(ty)),
                value: t.note(value, self.expression(value)),
            },
            DeclarationKind::Variable { ty, initializer } => DeclarationKind::Variable {
                ty: t.note(ty, self.ty(ty)),
                initializer: t.note_option(initializer, self.optional_expression(initializer)),
            },
            DeclarationKind::Parameter {
                direction,
                ty,
                default_value,
            } => DeclarationKind::Parameter {
                direction: *direction,
                ty: t.note(ty, self.ty(ty)),
                default_value: t.note_option(default_value, self.optional_expression(default_value)),
            },
            DeclarationKind::TypeVariable
            | DeclarationKind::Enum { .. }
            | DeclarationKind::Error { .. } => return None,
            DeclarationKind::Struct { fields } => DeclarationKind::Struct {
                fields: t.note(fields, self.fields(fields)),
            },
            DeclarationKind::Header { fields } => DeclarationKind::Header {
                fields: t.note(fields, self.fields(fields)),
            },
            DeclarationKind::HeaderUnion { fields } => DeclarationKind::HeaderUnion {
                fields: t.note(fields, self.fields(fields)),
            },
            DeclarationKind::Extern {
                type_parameters,
                methods,
            } => DeclarationKind::Extern {
                type_parameters: t.note(type_parameters, self.declarations(type_parameters)),
                methods: t.note(methods, self.declarations(methods)),
            },
            DeclarationKind::Method {
                signature,
                is_abstract,
            } => DeclarationKind::Method {
                signature: t.note(signature, self.signature(signature)),
                is_abstract: *is_abstract,
            },
            DeclarationKind::Function { signature, body } => DeclarationKind::Function {
                signature: t.note(signature, self.signature(signature)),
                body: t.note(body, self.block(body)),
            },
            DeclarationKind::Action { parameters, body } => DeclarationKind::Action {
                parameters: t.note(parameters, self.declarations(parameters)),
                body: t.note(body, self.block(body)),
            },
            DeclarationKind::Table { properties } => DeclarationKind::Table {
                properties: t.note(properties, self.properties(properties)),
            },
            DeclarationKind::StatefulAlu { properties } => DeclarationKind::StatefulAlu {
                properties: t.note(properties, self.properties(properties)),
            },
            DeclarationKind::Instance {
                ty,
                arguments,
                initializer,
            } => DeclarationKind::Instance {
                ty: t.note(ty, self.ty(ty)),
                arguments: t.note(arguments, self.arguments(arguments)),
                initializer: match initializer {
                    Some(initializer) => Some(t.note(initializer, self.declarations(initializer))),
                    None => None,
                },
            },
            DeclarationKind::ParserState {
                components,
                selection,
            } => DeclarationKind::ParserState {
                components: t.note(components, self.statements(components)),
                selection: t.note_option(selection, self.optional_expression(selection)),
            },
            DeclarationKind::Parser {
                type_parameters,
                apply_parameters,
                constructor_parameters,
                locals,
                states,
            } => DeclarationKind::Parser {
                type_parameters: t.note(type_parameters, self.declarations(type_parameters)),
                apply_parameters: t.note(apply_parameters, self.declarations(apply_parameters)),
                constructor_parameters: t.note(
                    constructor_parameters,
                    self.declarations(constructor_parameters),
                ),
                locals: t.note(locals, self.declarations(locals)),
                states: t.note(states, self.declarations(states)),
            },
            DeclarationKind::Control {
                type_parameters,
                apply_parameters,
                constructor_parameters,
                locals,
                body,
            } => DeclarationKind::Control {
                type_parameters: t.note(type_parameters, self.declarations(type_parameters)),
                apply_parameters: t.note(apply_parameters, self.declarations(apply_parameters)),
                constructor_parameters: t.note(
                    constructor_parameters,
                    self.declarations(constructor_parameters),
                ),
                locals: t.note(locals, self.declarations(locals)),
                body: t.note(body, self.block(body)),
            },
            DeclarationKind::Package {
                type_parameters,
                constructor_parameters,
            } => DeclarationKind::Package {
                type_parameters: t.note(type_parameters, self.declarations(type_parameters)),
                constructor_parameters: t.note(
                    constructor_parameters,
                    self.declarations(constructor_parameters),
                ),
            },
        };

        t.changed.then_some(kind)
    }

    /* Properties */

    fn properties(&mut self, list: &Rc<[Rc<Property>]>) -> Rc<[Rc<Property>]> {
        let mut tracker = Tracker::default();
        let result = list
            .iter()
            .map(|property| {
                let new = self.property(property);
                tracker.note(property, new)
            })
            .collect::<Vec<_>>();

        if tracker.changed {
            result.into()
        } else {
            list.clone()
        }
    }

    fn property(&mut self, original: &Rc<Property>) -> Rc<Property> {
        let node = self
            .transform
            .preorder_property(original.clone(), &mut self.context);

        if self.context.take_pruned() {
            return node;
        }

        self.context.context.push(NodeRef::Property(node.clone()));
        let mut t = Tracker::default();
        let value = match &node.value {
            PropertyValue::Expression(expression) => {
                PropertyValue::Expression(t.note(expression, self.expression(expression)))
            }
            PropertyValue::ActionList(actions) => {
                PropertyValue::ActionList(t.note(actions, self.expressions(actions)))
            }
            PropertyValue::Key(elements) => {
                let rewritten = elements
                    .iter()
                    .map(|element| super::KeyElement {
                        expression: t.note(&element.expression, self.expression(&element.expression)),
                        match_kind: element.match_kind,
                    })
                    .collect::<Vec<_>>();
                PropertyValue::Key(rewritten.into())
            }
        };
        self.context.context.pop();

        let node = if t.changed {
            Rc::new(Property {
                id: node.id,
                name: node.name,
                value,
            })
        } else {
            node
        };

        self.transform.postorder_property(node, &mut self.context)
    }

    /* Statements */

    fn block(&mut self, block: &Rc<Block>) -> Rc<Block> {
        let statements = self.statements(&block.statements);

        if Rc::ptr_eq(&statements, &block.statements) {
            block.clone()
        } else {
            block.with_statements(statements)
        }
    }

    fn statements(&mut self, list: &Rc<[Rc<Statement>]>) -> Rc<[Rc<Statement>]> {
        let mut changed = false;
        let mut result = Vec::with_capacity(list.len());

        for statement in list.iter() {
            match self.statement(statement) {
                Output::One(node) => {
                    changed |= !Rc::ptr_eq(&node, statement);
                    result.push(node);
                }
                Output::Many(nodes) => {
                    changed = true;
                    result.extend(nodes);
                }
            }
        }

        if changed {
            result.into()
        } else {
            list.clone()
        }
    }

    fn single_statement(&mut self, statement: &Rc<Statement>) -> Rc<Statement> {
        match self.statement(statement) {
            Output::One(node) => node,
            Output::Many(nodes) if nodes.is_empty() => Statement::new(StatementKind::Empty),
            Output::Many(nodes) => Statement::new(StatementKind::Block(Block::new(nodes))),
        }
    }

    fn statement(&mut self, original: &Rc<Statement>) -> Output<Statement> {
        let visit_once = self.transform.visit_once();
        if visit_once {
            if let Some((_, output)) = self.statements.get(&Rc::as_ptr(original)) {
                return output.clone();
            }
        }

        let node = self
            .transform
            .preorder_statement(original.clone(), &mut self.context);

        let output = if self.context.take_pruned() {
            Output::One(node)
        } else {
            self.context.context.push(NodeRef::Statement(node.clone()));
            let node = match self.statement_kind(&node.kind) {
                Some(kind) => node.with_kind(kind),
                None => node,
            };
            self.context.context.pop();

            self.transform.postorder_statement(node, &mut self.context)
        };

        if visit_once {
            self.statements
                .insert(Rc::as_ptr(original), (original.clone(), output.clone()));
        }

        output
    }

    fn statement_kind(&mut self, kind: &StatementKind) -> Option<StatementKind> {
        let mut t = Tracker::default();

        let kind = match kind {
            StatementKind::Assignment { lhs, rhs } => StatementKind::Assignment {
                lhs: t.note(lhs, self.expression(lhs)),
                rhs: t.note(rhs, self.expression(rhs)),
            },
            StatementKind::MethodCall(call) => {
                StatementKind::MethodCall(t.note(call, self.expression(call)))
            }
            StatementKind::If {
                condition,
                positive,
                negative,
            } => StatementKind::If {
                condition: t.note(condition, self.expression(condition)),
                positive: t.note(positive, self.single_statement(positive)),
                negative: match negative {
                    Some(negative) => Some(t.note(negative, self.single_statement(negative))),
                    None => None,
                },
            },
            StatementKind::Block(block) => StatementKind::Block(t.note(block, self.block(block))),
            StatementKind::Return(value) => {
                StatementKind::Return(t.note_option(value, self.optional_expression(value)))
            }
            StatementKind::Exit | StatementKind::Empty => return None,
            StatementKind::Declaration(declaration) => StatementKind::Declaration(
                t.note(declaration, self.single_declaration(declaration)),
            ),
        };

        t.changed.then_some(kind)
    }

    /* Expressions */

    fn optional_expression(&mut self, expression: &Option<Rc<Expression>>) -> Option<Rc<Expression>> {
        expression.as_ref().map(|e| self.expression(e))
    }

    fn expressions(&mut self, list: &Rc<[Rc<Expression>]>) -> Rc<[Rc<Expression>]> {
        let mut tracker = Tracker::default();
        let result = list
            .iter()
            .map(|expression| {
                let new = self.expression(expression);
                tracker.note(expression, new)
            })
            .collect::<Vec<_>>();

        if tracker.changed {
            result.into()
        } else {
            list.clone()
        }
    }

    fn arguments(&mut self, list: &Rc<[Rc<Argument>]>) -> Rc<[Rc<Argument>]> {
        let mut tracker = Tracker::default();
        let mut result = Vec::with_capacity(list.len());

        for argument in list.iter() {
            self.context
                .context
                .push(NodeRef::Argument(argument.clone()));
            let expression = self.expression(&argument.expression);
            self.context.context.pop();

            if Rc::ptr_eq(&expression, &argument.expression) {
                result.push(argument.clone());
            } else {
                tracker.changed = true;
                result.push(argument.with_expression(expression));
            }
        }

        if tracker.changed {
            result.into()
        } else {
            list.clone()
        }
    }

    fn select_cases(&mut self, list: &Rc<[Rc<SelectCase>]>) -> Rc<[Rc<SelectCase>]> {
        let mut tracker = Tracker::default();
        let mut result = Vec::with_capacity(list.len());

        for case in list.iter() {
            self.context.context.push(NodeRef::SelectCase(case.clone()));
            let keyset = self.expression(&case.keyset);
            self.context.context.pop();

            if Rc::ptr_eq(&keyset, &case.keyset) {
                result.push(case.clone());
            } else {
                tracker.changed = true;
                result.push(Rc::new(SelectCase {
                    id: case.id,
                    keyset,
                    state: case.state.clone(),
                }));
            }
        }

        if tracker.changed {
            result.into()
        } else {
            list.clone()
        }
    }

    fn expression(&mut self, original: &Rc<Expression>) -> Rc<Expression> {
        let visit_once = self.transform.visit_once();
        if visit_once {
            if let Some((_, output)) = self.expressions.get(&Rc::as_ptr(original)) {
                return output.clone();
            }
        }

        let node = self
            .transform
            .preorder_expression(original.clone(), &mut self.context);

        let output = if self.context.take_pruned() {
            node
        } else {
            self.context
                .context
                .push(NodeRef::Expression(node.clone()));
            let node = match self.expression_kind(&node.kind) {
                Some(kind) => node.with_kind(kind),
                None => node,
            };
            self.context.context.pop();

            self.transform
                .postorder_expression(node, &mut self.context)
        };

        if visit_once {
            self.expressions
                .insert(Rc::as_ptr(original), (original.clone(), output.clone()));
        }

        output
    }

    fn expression_kind(&mut self, kind: &ExpressionKind) -> Option<ExpressionKind> {
        let mut t = Tracker::default();

        let kind = match kind {
            ExpressionKind::Literal(_)
            | ExpressionKind::Path(_)
            | ExpressionKind::This
            | ExpressionKind::Default => return None,
            ExpressionKind::Member { base, member } => ExpressionKind::Member {
                base: t.note(base, self.expression(base)),
                member: *member,
            },
            ExpressionKind::ArrayIndex { base, index } => ExpressionKind::ArrayIndex {
                base: t.note(base, self.expression(base)),
                index: t.note(index, self.expression(index)),
            },
            ExpressionKind::TypeName(ty) => ExpressionKind::TypeName(t.note(ty, self.ty(ty))),
            ExpressionKind::Binary { operator, lhs, rhs } => ExpressionKind::Binary {
                operator: *operator,
                lhs: t.note(lhs, self.expression(lhs)),
                rhs: t.note(rhs, self.expression(rhs)),
            },
            ExpressionKind::Unary { operator, operand } => ExpressionKind::Unary {
                operator: *operator,
                operand: t.note(operand, self.expression(operand)),
            },
            ExpressionKind::Cast { ty, expression } => ExpressionKind::Cast {
                ty: t.note(ty, self.ty(ty)),
                expression: t.note(expression, self.expression(expression)),
            },
            ExpressionKind::MethodCall {
                target,
                type_arguments,
                arguments,
            } => ExpressionKind::MethodCall {
                target: t.note(target, self.expression(target)),
                type_arguments: t.note(type_arguments, self.types(type_arguments)),
                arguments: t.note(arguments, self.arguments(arguments)),
            },
            ExpressionKind::ConstructorCall { ty, arguments } => ExpressionKind::ConstructorCall {
                ty: t.note(ty, self.ty(ty)),
                arguments: t.note(arguments, self.arguments(arguments)),
            },
            ExpressionKind::List(items) => ExpressionKind::List(t.note(items, self.expressions(items))),
            ExpressionKind::StructLiteral(fields) => {
                let rewritten = fields
                    .iter()
                    .map(|field| NamedExpression {
                        name: field.name,
                        expression: t.note(&field.expression, self.expression(&field.expression)),
                    })
                    .collect::<Vec<_>>();
                ExpressionKind::StructLiteral(rewritten.into())
            }
            ExpressionKind::Mux {
                condition,
                positive,
                negative,
            } => ExpressionKind::Mux {
                condition: t.note(condition, self.expression(condition)),
                positive: t.note(positive, self.expression(positive)),
                negative: t.note(negative, self.expression(negative)),
            },
            ExpressionKind::Select { selectors, cases } => ExpressionKind::Select {
                selectors: t.note(selectors, self.expressions(selectors)),
                cases: t.note(cases, self.select_cases(cases)),
            },
        };

        t.changed.then_some(kind)
    }

    /* Types */

    fn types(&mut self, list: &Rc<[Rc<Type>]>) -> Rc<[Rc<Type>]> {
        let mut tracker = Tracker::default();
        let result = list
            .iter()
            .map(|ty| {
                let new = self.ty(ty);
                tracker.note(ty, new)
            })
            .collect::<Vec<_>>();

        if tracker.changed {
            result.into()
        } else {
            list.clone()
        }
    }

    fn ty(&mut self, original: &Rc<Type>) -> Rc<Type> {
        let visit_once = self.transform.visit_once();
        if visit_once {
            if let Some((_, output)) = self.types.get(&Rc::as_ptr(original)) {
                return output.clone();
            }
        }

        let node = self
            .transform
            .preorder_type(original.clone(), &mut self.context);

        let output = if self.context.take_pruned() {
            node
        } else {
            self.context.context.push(NodeRef::Type(node.clone()));
            let mut t = Tracker::default();
            let kind = match &node.kind {
                TypeKind::Specialized { base, arguments } => Some(TypeKind::Specialized {
                    base: t.note(base, self.ty(base)),
                    arguments: t.note(arguments, self.types(arguments)),
                }),
                TypeKind::Stack { element, size } => Some(TypeKind::Stack {
                    element: t.note(element, self.ty(element)),
                    size: *size,
                }),
                TypeKind::Tuple(elements) => {
                    Some(TypeKind::Tuple(t.note(elements, self.types(elements))))
                }
                _ => None,
            };
            self.context.context.pop();

            let node = match kind {
                Some(kind) if t.changed => node.with_kind(kind),
                _ => node,
            };

            self.transform.postorder_type(node, &mut self.context)
        };

        if visit_once {
            self.types
                .insert(Rc::as_ptr(original), (original.clone(), output.clone()));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{build::*, equiv::equivalent_statements, Literal};

    struct Nothing;

    impl Transform for Nothing {}

    #[test]
    fn unchanged_program_keeps_identity() {
        let program = Program::new(vec![
            header("h_t", vec![("a", bits(8))]),
            action(
                "a",
                vec![parameter(crate::ir::Direction::In, "x", bits(8))],
                vec![assign(path("y"), binary(crate::ir::BinaryOperatorKind::Add, path("x"), int(1)))],
            ),
        ]);

        let result = transform_program(&mut Nothing, &program).unwrap();
        assert!(Rc::ptr_eq(&result, &program));
    }

    /// Replaces the literal 1 by 2
    struct Bump;

    impl Transform for Bump {
        fn postorder_expression(
            &mut self,
            expression: Rc<Expression>,
            _context: &mut TransformContext,
        ) -> Rc<Expression> {
            match expression.as_literal() {
                Some(Literal::Integer { value: 1, .. }) => int(2),
                _ => expression,
            }
        }
    }

    #[test]
    fn changed_child_rebuilds_only_its_ancestors() {
        let untouched = assign(path("z"), int(5));
        let touched = assign(path("y"), int(1));
        let body = action("a", Vec::new(), vec![untouched.clone(), touched.clone()]);
        let program = Program::new(vec![body.clone()]);

        let result = transform_program(&mut Bump, &program).unwrap();
        assert!(!Rc::ptr_eq(&result, &program));

        let rewritten = &result.declarations[0];
        assert_eq!(rewritten.id, body.id);

        let DeclarationKind::Action { body: block, .. } = &rewritten.kind else {
            panic!("expected an action");
        };
        assert!(Rc::ptr_eq(&block.statements[0], &untouched));
        assert!(!Rc::ptr_eq(&block.statements[1], &touched));
        assert_eq!(block.statements[1].id, touched.id);
        assert!(equivalent_statements(
            &block.statements[1],
            &assign(path("y"), int(2))
        ));
    }

    /// Doubles every method call statement
    struct Duplicate;

    impl Transform for Duplicate {
        fn postorder_statement(
            &mut self,
            statement: Rc<Statement>,
            _context: &mut TransformContext,
        ) -> Output<Statement> {
            if matches!(statement.kind, StatementKind::MethodCall(_)) {
                Output::Many(vec![statement.clone(), statement])
            } else {
                Output::One(statement)
            }
        }
    }

    #[test]
    fn many_is_spliced_into_lists_and_wrapped_elsewhere() {
        let f = call_statement(call(path("f"), Vec::new()));
        let g = call_statement(call(path("g"), Vec::new()));
        let statement = block_statement(vec![f, if_statement(path("c"), g, None)]);

        let Output::One(result) = transform_statement(&mut Duplicate, &statement).unwrap() else {
            panic!("block statement should stay one statement");
        };

        let StatementKind::Block(block) = &result.kind else {
            panic!("expected a block");
        };
        assert_eq!(block.statements.len(), 3);

        let StatementKind::If { positive, .. } = &block.statements[2].kind else {
            panic!("expected an if");
        };
        let StatementKind::Block(arm) = &positive.kind else {
            panic!("expected the duplicated arm to be wrapped in a block");
        };
        assert_eq!(arm.statements.len(), 2);
    }

    /// Prunes `if` statements
    struct PruneIfs;

    impl Transform for PruneIfs {
        fn preorder_statement(
            &mut self,
            statement: Rc<Statement>,
            context: &mut TransformContext,
        ) -> Rc<Statement> {
            if matches!(statement.kind, StatementKind::If { .. }) {
                context.prune();
            }
            statement
        }

        fn postorder_expression(
            &mut self,
            expression: Rc<Expression>,
            context: &mut TransformContext,
        ) -> Rc<Expression> {
            Bump.postorder_expression(expression, context)
        }
    }

    #[test]
    fn prune_keeps_the_engine_out_of_a_subtree() {
        let guarded = if_statement(path("c"), assign(path("x"), int(1)), None);
        let statement = block_statement(vec![guarded.clone(), assign(path("y"), int(1))]);

        let result = transform_statement(&mut PruneIfs, &statement)
            .unwrap()
            .into_vec();

        let StatementKind::Block(block) = &result[0].kind else {
            panic!("expected a block");
        };
        assert!(Rc::ptr_eq(&block.statements[0], &guarded));
        assert!(equivalent_statements(
            &block.statements[1],
            &assign(path("y"), int(2))
        ));
    }

    #[derive(Default)]
    struct CountingBump {
        calls: usize,
    }

    impl Transform for CountingBump {
        fn postorder_expression(
            &mut self,
            expression: Rc<Expression>,
            context: &mut TransformContext,
        ) -> Rc<Expression> {
            if expression.as_literal().is_some() {
                self.calls += 1;
            }
            Bump.postorder_expression(expression, context)
        }
    }

    #[test]
    fn shared_subtree_is_rewritten_once() {
        let one = int(1);
        let statement = block_statement(vec![
            assign(path("x"), one.clone()),
            assign(path("y"), one),
        ]);

        let mut transform = CountingBump::default();
        let result = transform_statement(&mut transform, &statement)
            .unwrap()
            .into_vec();
        assert_eq!(transform.calls, 1);

        let StatementKind::Block(block) = &result[0].kind else {
            panic!("expected a block");
        };
        let rhs = |statement: &Statement| match &statement.kind {
            StatementKind::Assignment { rhs, .. } => rhs.clone(),
            _ => panic!("expected an assignment"),
        };
        assert!(Rc::ptr_eq(
            &rhs(&block.statements[0]),
            &rhs(&block.statements[1])
        ));
    }
}
