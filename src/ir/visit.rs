//! Read-only traversal of the IR in DFS order.
//!
//! An [`Inspector`] overrides the pre/postorder hooks for the node families it
//! cares about. Returning `false` from a preorder hook skips the node's
//! children (and its postorder hook). Every hook sees the chain of enclosing
//! nodes through a [`Context`].

use std::rc::Rc;

use hashbrown::HashSet;

use super::{
    Annotation, Argument, Block, Declaration, DeclarationKind, Expression, ExpressionKind,
    Program, Property, PropertyValue, SelectCase, Signature, Statement, StatementKind, Type,
    TypeKind,
};

/// One enclosing node on the ancestor stack
#[derive(Debug, Clone)]
pub enum NodeRef {
    Declaration(Rc<Declaration>),
    Statement(Rc<Statement>),
    Expression(Rc<Expression>),
    Type(Rc<Type>),
    Annotation(Rc<Annotation>),
    Property(Rc<Property>),
    Argument(Rc<Argument>),
    SelectCase(Rc<SelectCase>),
}

/// The ancestors of the node a hook is looking at, outermost first. The node
/// itself is not on the stack while its own hooks run.
#[derive(Debug, Default, Clone)]
pub struct Context {
    ancestors: Vec<NodeRef>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, node: NodeRef) {
        self.ancestors.push(node);
    }

    pub(crate) fn pop(&mut self) {
        self.ancestors.pop();
    }

    pub fn depth(&self) -> usize {
        self.ancestors.len()
    }

    pub fn parent(&self) -> Option<&NodeRef> {
        self.ancestors.last()
    }

    /// Ancestors, innermost first
    pub fn ancestors(&self) -> impl Iterator<Item = &NodeRef> {
        self.ancestors.iter().rev()
    }

    /// The nearest enclosing declaration satisfying `predicate`
    pub fn find_declaration(
        &self,
        predicate: impl Fn(&Declaration) -> bool,
    ) -> Option<&Rc<Declaration>> {
        self.ancestors().find_map(|node| match node {
            NodeRef::Declaration(declaration) if predicate(declaration) => Some(declaration),
            _ => None,
        })
    }

    pub fn enclosing_action(&self) -> Option<&Rc<Declaration>> {
        self.find_declaration(Declaration::is_action)
    }

    pub fn enclosing_control(&self) -> Option<&Rc<Declaration>> {
        self.find_declaration(|d| matches!(d.kind, DeclarationKind::Control { .. }))
    }

    pub fn enclosing_parser(&self) -> Option<&Rc<Declaration>> {
        self.find_declaration(|d| matches!(d.kind, DeclarationKind::Parser { .. }))
    }

    pub fn enclosing_parser_state(&self) -> Option<&Rc<Declaration>> {
        self.find_declaration(|d| matches!(d.kind, DeclarationKind::ParserState { .. }))
    }

    pub fn enclosing_table(&self) -> Option<&Rc<Declaration>> {
        self.find_declaration(|d| matches!(d.kind, DeclarationKind::Table { .. }))
    }

    pub fn enclosing_annotation(&self) -> Option<&Rc<Annotation>> {
        self.ancestors().find_map(|node| match node {
            NodeRef::Annotation(annotation) => Some(annotation),
            _ => None,
        })
    }

    pub fn enclosing_statement(&self) -> Option<&Rc<Statement>> {
        self.ancestors().find_map(|node| match node {
            NodeRef::Statement(statement) => Some(statement),
            _ => None,
        })
    }

    pub fn enclosing_argument(&self) -> Option<&Rc<Argument>> {
        self.ancestors().find_map(|node| match node {
            NodeRef::Argument(argument) => Some(argument),
            _ => None,
        })
    }
}

pub trait Inspector {
    fn preorder_declaration(&mut self, _declaration: &Rc<Declaration>, _context: &Context) -> bool {
        true
    }

    fn postorder_declaration(&mut self, _declaration: &Rc<Declaration>, _context: &Context) {}

    fn preorder_statement(&mut self, _statement: &Rc<Statement>, _context: &Context) -> bool {
        true
    }

    fn postorder_statement(&mut self, _statement: &Rc<Statement>, _context: &Context) {}

    fn preorder_expression(&mut self, _expression: &Rc<Expression>, _context: &Context) -> bool {
        true
    }

    fn postorder_expression(&mut self, _expression: &Rc<Expression>, _context: &Context) {}

    fn preorder_type(&mut self, _ty: &Rc<Type>, _context: &Context) -> bool {
        true
    }

    fn postorder_type(&mut self, _ty: &Rc<Type>, _context: &Context) {}

    fn preorder_property(&mut self, _property: &Rc<Property>, _context: &Context) -> bool {
        true
    }

    fn postorder_property(&mut self, _property: &Rc<Property>, _context: &Context) {}

    /// Whether a subtree reachable through several parents is inspected only
    /// the first time it is reached
    fn visit_once(&self) -> bool {
        true
    }
}

pub fn inspect_program<I: Inspector>(inspector: &mut I, program: &Program) {
    let mut walker = Walker::new(inspector);
    for declaration in program.declarations.iter() {
        walker.walk_declaration(declaration);
    }
}

pub fn inspect_declaration<I: Inspector>(inspector: &mut I, declaration: &Rc<Declaration>) {
    Walker::new(inspector).walk_declaration(declaration);
}

pub fn inspect_statement<I: Inspector>(inspector: &mut I, statement: &Rc<Statement>) {
    Walker::new(inspector).walk_statement(statement);
}

pub fn inspect_expression<I: Inspector>(inspector: &mut I, expression: &Rc<Expression>) {
    Walker::new(inspector).walk_expression(expression);
}

struct Walker<'i, I> {
    inspector: &'i mut I,
    context: Context,
    visited: HashSet<*const ()>,
}

impl<'i, I: Inspector> Walker<'i, I> {
    fn new(inspector: &'i mut I) -> Self {
        Self {
            inspector,
            context: Context::new(),
            visited: HashSet::new(),
        }
    }

    /// Records a visit; false when a shared node was already inspected
    fn first_visit<T>(&mut self, node: &Rc<T>) -> bool {
        if !self.inspector.visit_once() {
            return true;
        }

        self.visited.insert(Rc::as_ptr(node) as *const ())
    }

    fn walk_declaration(&mut self, declaration: &Rc<Declaration>) {
        if !self.first_visit(declaration) {
            return;
        }

        if !self
            .inspector
            .preorder_declaration(declaration, &self.context)
        {
            return;
        }

        self.context
            .push(NodeRef::Declaration(declaration.clone()));
        self.walk_annotations(&declaration.annotations);
        self.walk_declaration_kind(&declaration.kind);
        self.context.pop();

        self.inspector
            .postorder_declaration(declaration, &self.context);
    }

    fn walk_annotations(&mut self, annotations: &[Rc<Annotation>]) {
        for annotation in annotations {
            self.context.push(NodeRef::Annotation(annotation.clone()));
            for expression in annotation.expressions.iter() {
                self.walk_expression(expression);
            }
            self.context.pop();
        }
    }

    fn walk_declarations(&mut self, declarations: &[Rc<Declaration>]) {
        for declaration in declarations {
            self.walk_declaration(declaration);
        }
    }

    fn walk_signature(&mut self, signature: &Signature) {
        self.walk_declarations(&signature.type_parameters);
        self.walk_type(&signature.return_type);
        self.walk_declarations(&signature.parameters);
    }

    fn walk_declaration_kind(&mut self, kind: &DeclarationKind) {
        match kind {
            DeclarationKind::Constant { ty, value } => {
                self.walk_type(ty);
                self.walk_expression(value);
            }
            DeclarationKind::Variable { ty, initializer } => {
                self.walk_type(ty);
                if let Some(initializer) = initializer {
                    self.walk_expression(initializer);
                }
            }
            DeclarationKind::Parameter {
                ty, default_value, ..
            } => {
                self.walk_type(ty);
                if let Some(default_value) = default_value {
                    self.walk_expression(default_value);
                }
            }
            DeclarationKind::TypeVariable
            | DeclarationKind::Enum { .. }
            | DeclarationKind::Error { .. } => {}
            DeclarationKind::Struct { fields }
            | DeclarationKind::Header { fields }
            | DeclarationKind::HeaderUnion { fields } => {
                for field in fields.iter() {
                    self.walk_type(&field.ty);
                }
            }
            DeclarationKind::Extern {
                type_parameters,
                methods,
            } => {
                self.walk_declarations(type_parameters);
                self.walk_declarations(methods);
            }
            DeclarationKind::Method { signature, .. } => self.walk_signature(signature),
            DeclarationKind::Function { signature, body } => {
                self.walk_signature(signature);
                self.walk_block(body);
            }
            DeclarationKind::Action { parameters, body } => {
                self.walk_declarations(parameters);
                self.walk_block(body);
            }
            DeclarationKind::Table { properties } | DeclarationKind::StatefulAlu { properties } => {
                for property in properties.iter() {
                    self.walk_property(property);
                }
            }
            DeclarationKind::Instance {
                ty,
                arguments,
                initializer,
            } => {
                self.walk_type(ty);
                self.walk_arguments(arguments);
                if let Some(initializer) = initializer {
                    self.walk_declarations(initializer);
                }
            }
            DeclarationKind::ParserState {
                components,
                selection,
            } => {
                self.walk_statements(components);
                if let Some(selection) = selection {
                    self.walk_expression(selection);
                }
            }
            DeclarationKind::Parser {
                type_parameters,
                apply_parameters,
                constructor_parameters,
                locals,
                states,
            } => {
                self.walk_declarations(type_parameters);
                self.walk_declarations(apply_parameters);
                self.walk_declarations(constructor_parameters);
                self.walk_declarations(locals);
                self.walk_declarations(states);
            }
            DeclarationKind::Control {
                type_parameters,
                apply_parameters,
                constructor_parameters,
                locals,
                body,
            } => {
                self.walk_declarations(type_parameters);
                self.walk_declarations(apply_parameters);
                self.walk_declarations(constructor_parameters);
                self.walk_declarations(locals);
                self.walk_block(body);
            }
            DeclarationKind::Package {
                type_parameters,
                constructor_parameters,
            } => {
                self.walk_declarations(type_parameters);
                self.walk_declarations(constructor_parameters);
            }
        }
    }

    fn walk_property(&mut self, property: &Rc<Property>) {
        if !self.inspector.preorder_property(property, &self.context) {
            return;
        }

        self.context.push(NodeRef::Property(property.clone()));
        match &property.value {
            PropertyValue::Expression(expression) => self.walk_expression(expression),
            PropertyValue::ActionList(actions) => {
                for action in actions.iter() {
                    self.walk_expression(action);
                }
            }
            PropertyValue::Key(elements) => {
                for element in elements.iter() {
                    self.walk_expression(&element.expression);
                }
            }
        }
        self.context.pop();

        self.inspector.postorder_property(property, &self.context);
    }

    fn walk_block(&mut self, block: &Block) {
        self.walk_statements(&block.statements);
    }

    fn walk_statements(&mut self, statements: &[Rc<Statement>]) {
        for statement in statements {
            self.walk_statement(statement);
        }
    }

    fn walk_statement(&mut self, statement: &Rc<Statement>) {
        if !self.first_visit(statement) {
            return;
        }

        if !self.inspector.preorder_statement(statement, &self.context) {
            return;
        }

        self.context.push(NodeRef::Statement(statement.clone()));
        match &statement.kind {
            StatementKind::Assignment { lhs, rhs } => {
                self.walk_expression(lhs);
                self.walk_expression(rhs);
            }
            StatementKind::MethodCall(call) => self.walk_expression(call),
            StatementKind::If {
                condition,
                positive,
                negative,
            } => {
                self.walk_expression(condition);
                self.walk_statement(positive);
                if let Some(negative) = negative {
                    self.walk_statement(negative);
                }
            }
            StatementKind::Block(block) => self.walk_block(block),
            StatementKind::Return(Some(expression)) => self.walk_expression(expression),
            StatementKind::Return(None) | StatementKind::Exit | StatementKind::Empty => {}
            StatementKind::Declaration(declaration) => self.walk_declaration(declaration),
        }
        self.context.pop();

        self.inspector.postorder_statement(statement, &self.context);
    }

    fn walk_arguments(&mut self, arguments: &[Rc<Argument>]) {
        for argument in arguments {
            self.context.push(NodeRef::Argument(argument.clone()));
            self.walk_expression(&argument.expression);
            self.context.pop();
        }
    }

    fn walk_expressions(&mut self, expressions: &[Rc<Expression>]) {
        for expression in expressions {
            self.walk_expression(expression);
        }
    }

    fn walk_expression(&mut self, expression: &Rc<Expression>) {
        if !self.first_visit(expression) {
            return;
        }

        if !self
            .inspector
            .preorder_expression(expression, &self.context)
        {
            return;
        }

        self.context.push(NodeRef::Expression(expression.clone()));
        match &expression.kind {
            ExpressionKind::Literal(_)
            | ExpressionKind::Path(_)
            | ExpressionKind::This
            | ExpressionKind::Default => {}
            ExpressionKind::Member { base, .. } => self.walk_expression(base),
            ExpressionKind::ArrayIndex { base, index } => {
                self.walk_expression(base);
                self.walk_expression(index);
            }
            ExpressionKind::TypeName(ty) => self.walk_type(ty),
            ExpressionKind::Binary { lhs, rhs, .. } => {
                self.walk_expression(lhs);
                self.walk_expression(rhs);
            }
            ExpressionKind::Unary { operand, .. } => self.walk_expression(operand),
            ExpressionKind::Cast { ty, expression } => {
                self.walk_type(ty);
                self.walk_expression(expression);
            }
            ExpressionKind::MethodCall {
                target,
                type_arguments,
                arguments,
            } => {
                self.walk_expression(target);
                for ty in type_arguments.iter() {
                    self.walk_type(ty);
                }
                self.walk_arguments(arguments);
            }
            ExpressionKind::ConstructorCall { ty, arguments } => {
                self.walk_type(ty);
                self.walk_arguments(arguments);
            }
            ExpressionKind::List(items) => self.walk_expressions(items),
            ExpressionKind::StructLiteral(fields) => {
                for field in fields.iter() {
                    self.walk_expression(&field.expression);
                }
            }
            ExpressionKind::Mux {
                condition,
                positive,
                negative,
            } => {
                self.walk_expression(condition);
                self.walk_expression(positive);
                self.walk_expression(negative);
            }
            ExpressionKind::Select { selectors, cases } => {
                self.walk_expressions(selectors);
                for case in cases.iter() {
                    self.context.push(NodeRef::SelectCase(case.clone()));
                    self.walk_expression(&case.keyset);
                    self.context.pop();
                }
            }
        }
        self.context.pop();

        self.inspector
            .postorder_expression(expression, &self.context);
    }

    fn walk_type(&mut self, ty: &Rc<Type>) {
        if !self.first_visit(ty) {
            return;
        }

        if !self.inspector.preorder_type(ty, &self.context) {
            return;
        }

        self.context.push(NodeRef::Type(ty.clone()));
        match &ty.kind {
            TypeKind::Bool
            | TypeKind::Bits { .. }
            | TypeKind::Varbits { .. }
            | TypeKind::Void
            | TypeKind::Error
            | TypeKind::String
            | TypeKind::Name(_) => {}
            TypeKind::Specialized { base, arguments } => {
                self.walk_type(base);
                for argument in arguments.iter() {
                    self.walk_type(argument);
                }
            }
            TypeKind::Stack { element, .. } => self.walk_type(element),
            TypeKind::Tuple(elements) => {
                for element in elements.iter() {
                    self.walk_type(element);
                }
            }
        }
        self.context.pop();

        self.inspector.postorder_type(ty, &self.context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::build::*;

    #[derive(Default)]
    struct CallCollector {
        calls: Vec<(String, Option<String>)>,
    }

    impl Inspector for CallCollector {
        fn postorder_expression(&mut self, expression: &Rc<Expression>, context: &Context) {
            if let ExpressionKind::MethodCall { target, .. } = &expression.kind {
                if let Some(path) = target.as_path() {
                    self.calls.push((
                        path.name.name().to_owned(),
                        context.enclosing_action().map(|a| a.name().to_owned()),
                    ));
                }
            }
        }
    }

    #[test]
    fn hooks_see_enclosing_declarations() {
        let program = crate::ir::Program::new(vec![
            action("a", Vec::new(), vec![call_statement(call(path("f"), Vec::new()))]),
            control(
                "c",
                Vec::new(),
                Vec::new(),
                vec![call_statement(call(path("g"), Vec::new()))],
            ),
        ]);

        let mut collector = CallCollector::default();
        inspect_program(&mut collector, &program);

        assert_eq!(
            collector.calls,
            vec![("f".to_owned(), Some("a".to_owned())), ("g".to_owned(), None)]
        );
    }

    #[derive(Default)]
    struct Counter {
        literals: usize,
        skip_ifs: bool,
    }

    impl Inspector for Counter {
        fn preorder_statement(&mut self, statement: &Rc<Statement>, _context: &Context) -> bool {
            !(self.skip_ifs && matches!(statement.kind, StatementKind::If { .. }))
        }

        fn postorder_expression(&mut self, expression: &Rc<Expression>, _context: &Context) {
            if expression.as_literal().is_some() {
                self.literals += 1;
            }
        }
    }

    #[test]
    fn shared_subtrees_are_inspected_once() {
        let one = int(1);
        let statement = block_statement(vec![
            assign(path("x"), one.clone()),
            assign(path("y"), one),
        ]);

        let mut counter = Counter::default();
        inspect_statement(&mut counter, &statement);

        assert_eq!(counter.literals, 1);
    }

    #[test]
    fn preorder_false_skips_children() {
        let statement = block_statement(vec![
            assign(path("x"), int(1)),
            if_statement(boolean(true), assign(path("y"), int(2)), None),
        ]);

        let mut counter = Counter {
            skip_ifs: true,
            ..Counter::default()
        };
        inspect_statement(&mut counter, &statement);

        assert_eq!(counter.literals, 1);
    }

    #[derive(Default)]
    struct AnnotationPaths {
        inside: Vec<String>,
        outside: Vec<String>,
    }

    impl Inspector for AnnotationPaths {
        fn postorder_expression(&mut self, expression: &Rc<Expression>, context: &Context) {
            if let Some(path) = expression.as_path() {
                let name = path.name.name().to_owned();
                if context.enclosing_annotation().is_some() {
                    self.inside.push(name);
                } else {
                    self.outside.push(name);
                }
            }
        }
    }

    #[test]
    fn annotation_context_is_visible() {
        let field = variable("len", bits(8), Some(path("init")));
        let field = Rc::new(Declaration {
            annotations: vec![Rc::new(Annotation {
                id: crate::ir::NodeId::fresh(),
                name: crate::ir::Identifier::new("length"),
                expressions: vec![path("hdr_len")].into(),
            })]
            .into(),
            id: field.id,
            span: field.span,
            name: field.name,
            kind: field.kind.clone(),
        });

        let mut paths = AnnotationPaths::default();
        inspect_declaration(&mut paths, &field);

        assert_eq!(paths.inside, vec!["hdr_len".to_owned()]);
        assert_eq!(paths.outside, vec!["init".to_owned()]);
    }
}
