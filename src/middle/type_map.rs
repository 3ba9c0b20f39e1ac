//! Types of expressions, kept beside the tree.
//!
//! The tree never stores a computed type. [`TypeMap`] caches one per
//! expression id, computing it on first request from the declarations the
//! reference map binds paths to. Arbitrary-precision `int` expressions have
//! no type here: they take the type of whatever they are combined with.

use std::rc::Rc;

use hashbrown::HashMap;

use super::{
    instance::{ConstructorCall, Instantiation, MethodInstance, ResolutionError},
    pass::{CompilationContext, Pass, PipelineError},
    reference_map::ReferenceMap,
};
use crate::{
    diagnostics::{report_error, CompilerBug, Diagnostics},
    ir::{
        build,
        visit::{inspect_program, Context, Inspector, NodeRef},
        BinaryOperatorKind, Declaration, DeclarationKind, Expression, ExpressionKind, Literal,
        NodeId, Program, Type, TypeKind, UnaryOperatorKind,
    },
};

/// The declaration a named or specialized type refers to
pub fn type_declaration<'m>(ty: &Type, reference_map: &'m ReferenceMap) -> Option<&'m Rc<Declaration>> {
    match &ty.kind {
        TypeKind::Name(path) => reference_map.get_declaration(path),
        TypeKind::Specialized { base, .. } => type_declaration(base, reference_map),
        _ => None,
    }
}

/// The type arguments of a specialized type; empty for any other type
pub fn type_arguments(ty: &Type) -> &[Rc<Type>] {
    match &ty.kind {
        TypeKind::Specialized { arguments, .. } => arguments,
        _ => &[],
    }
}

/// Whether `ty` names a header (or header union) declaration
pub fn is_header(ty: &Type, reference_map: &ReferenceMap) -> bool {
    matches!(
        type_declaration(ty, reference_map).map(|d| &d.kind),
        Some(DeclarationKind::Header { .. } | DeclarationKind::HeaderUnion { .. })
    )
}

/// Width in bits of a type whose size is known statically: scalars, and
/// headers and structs made only of them
pub fn width_of(ty: &Type, reference_map: &ReferenceMap) -> Option<u32> {
    match &ty.kind {
        TypeKind::Bool => Some(1),
        TypeKind::Bits { width, .. } => Some(*width),
        TypeKind::Stack { element, size } => Some(width_of(element, reference_map)? * size),
        TypeKind::Name(_) | TypeKind::Specialized { .. } => {
            let fields = type_declaration(ty, reference_map)?.fields()?;
            fields
                .iter()
                .map(|field| width_of(&field.ty, reference_map))
                .sum()
        }
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct TypeMap {
    types: HashMap<NodeId, Rc<Type>>,
}

impl TypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.types.clear();
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn set_type(&mut self, expression: &Expression, ty: Rc<Type>) {
        self.types.insert(expression.id, ty);
    }

    /// The cached type of `expression`, without computing it
    pub fn get_type(&self, expression: &Expression) -> Option<&Rc<Type>> {
        self.types.get(&expression.id)
    }

    /// The type of `expression`, computed and cached on first request
    pub fn type_of(
        &mut self,
        expression: &Rc<Expression>,
        reference_map: &ReferenceMap,
    ) -> Option<Rc<Type>> {
        if let Some(ty) = self.types.get(&expression.id) {
            return Some(ty.clone());
        }

        let ty = self.compute(expression, reference_map)?;
        self.types.insert(expression.id, ty.clone());
        Some(ty)
    }

    fn compute(
        &mut self,
        expression: &Rc<Expression>,
        reference_map: &ReferenceMap,
    ) -> Option<Rc<Type>> {
        match &expression.kind {
            ExpressionKind::Literal(literal) => match literal {
                Literal::Boolean(_) => Some(build::bool_type()),
                Literal::Integer {
                    width: Some(width),
                    signed,
                    ..
                } => Some(Type::new(TypeKind::Bits {
                    width: *width,
                    signed: *signed,
                })),
                Literal::Integer { width: None, .. } => None,
                Literal::String(_) => Some(Type::new(TypeKind::String)),
            },
            ExpressionKind::Path(path) => {
                let declaration = reference_map.get_declaration(path)?;
                declaration.declared_type().cloned()
            }
            ExpressionKind::This | ExpressionKind::Default | ExpressionKind::Select { .. } => None,
            ExpressionKind::Member { base, member } => {
                if let ExpressionKind::TypeName(ty) = &base.kind {
                    // `error.NoError`, `HashAlgorithm.crc16`
                    return Some(ty.clone());
                }

                let base_type = self.type_of(base, reference_map)?;
                match &base_type.kind {
                    TypeKind::Stack { .. } => match member.name() {
                        "size" | "lastIndex" => Some(build::bits(32)),
                        _ => None,
                    },
                    _ => type_declaration(&base_type, reference_map)?
                        .fields()?
                        .iter()
                        .find(|field| field.name.symbol == member.symbol)
                        .map(|field| field.ty.clone()),
                }
            }
            ExpressionKind::ArrayIndex { base, .. } => {
                match &self.type_of(base, reference_map)?.kind {
                    TypeKind::Stack { element, .. } => Some(element.clone()),
                    _ => None,
                }
            }
            ExpressionKind::TypeName(ty) => Some(ty.clone()),
            ExpressionKind::Binary { operator, lhs, rhs } => {
                if operator.is_relational()
                    || matches!(
                        operator,
                        BinaryOperatorKind::LogicalAnd | BinaryOperatorKind::LogicalOr
                    )
                {
                    return Some(build::bool_type());
                }

                let lhs_type = self.type_of(lhs, reference_map);
                let rhs_type = self.type_of(rhs, reference_map);

                match operator {
                    BinaryOperatorKind::Concat => {
                        let (lhs_type, rhs_type) = (lhs_type?, rhs_type?);
                        let (
                            TypeKind::Bits {
                                width: lhs_width,
                                signed,
                            },
                            TypeKind::Bits {
                                width: rhs_width, ..
                            },
                        ) = (&lhs_type.kind, &rhs_type.kind)
                        else {
                            return None;
                        };
                        Some(Type::new(TypeKind::Bits {
                            width: lhs_width + rhs_width,
                            signed: *signed,
                        }))
                    }
                    BinaryOperatorKind::ShiftLeft | BinaryOperatorKind::ShiftRight => lhs_type,
                    _ => lhs_type.or(rhs_type),
                }
            }
            ExpressionKind::Unary { operator, operand } => match operator {
                UnaryOperatorKind::LogicalNot => Some(build::bool_type()),
                _ => self.type_of(operand, reference_map),
            },
            ExpressionKind::Cast { ty, .. } => Some(ty.clone()),
            ExpressionKind::MethodCall { .. } => {
                let instance = MethodInstance::resolve(expression, reference_map, self).ok()?;
                Some(instance.return_type().clone())
            }
            ExpressionKind::ConstructorCall { ty, .. } => Some(ty.clone()),
            ExpressionKind::List(items) => {
                let elements = items
                    .iter()
                    .map(|item| self.type_of(item, reference_map))
                    .collect::<Option<Vec<_>>>()?;
                Some(Type::new(TypeKind::Tuple(elements.into())))
            }
            ExpressionKind::StructLiteral(_) => None,
            ExpressionKind::Mux {
                positive, negative, ..
            } => self
                .type_of(positive, reference_map)
                .or_else(|| self.type_of(negative, reference_map)),
        }
    }
}

/// Fills the type map for every expression of the program and checks that
/// every call, constructor call and instance binds its arguments.
#[derive(Debug, Default)]
pub struct TypeInference;

impl Pass for TypeInference {
    fn name(&self) -> &str {
        "TypeInference"
    }

    fn run(
        &mut self,
        program: Rc<Program>,
        context: &mut CompilationContext,
    ) -> Result<Rc<Program>, PipelineError> {
        context.type_map.clear();

        let mut inference = Inference {
            reference_map: &context.reference_map,
            type_map: &mut context.type_map,
            diagnostics: &mut context.diagnostics,
            bug: None,
        };
        inspect_program(&mut inference, &program);

        if let Some(bug) = inference.bug {
            return Err(bug.into());
        }

        log::debug!("inferred {} expression types", context.type_map.len());
        Ok(program)
    }
}

struct Inference<'a> {
    reference_map: &'a ReferenceMap,
    type_map: &'a mut TypeMap,
    diagnostics: &'a mut Diagnostics,
    bug: Option<CompilerBug>,
}

impl Inference<'_> {
    fn check<T>(&mut self, result: Result<T, ResolutionError>, span: crate::ir::Span) {
        match result {
            Ok(_) => {}
            Err(ResolutionError::Binding(error)) => {
                report_error!(self.diagnostics, span, "{error}");
            }
            Err(ResolutionError::Bug(bug)) => {
                self.bug.get_or_insert(bug);
            }
        }
    }
}

impl Inspector for Inference<'_> {
    fn postorder_expression(&mut self, expression: &Rc<Expression>, context: &Context) {
        self.type_map.type_of(expression, self.reference_map);

        match &expression.kind {
            // Entries of an action list may leave the control-plane arguments
            // out
            ExpressionKind::MethodCall { .. }
                if !matches!(context.parent(), Some(NodeRef::Property(_))) =>
            {
                let result = MethodInstance::resolve(expression, self.reference_map, self.type_map);
                self.check(result, expression.span);
            }
            ExpressionKind::ConstructorCall { .. } => {
                let result = ConstructorCall::resolve(expression, self.reference_map);
                self.check(result, expression.span);
            }
            _ => {}
        }
    }

    fn postorder_declaration(&mut self, declaration: &Rc<Declaration>, _context: &Context) {
        if matches!(declaration.kind, DeclarationKind::Instance { .. }) {
            let result = Instantiation::resolve(declaration, self.reference_map);
            self.check(result, declaration.span);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        diagnostics::Severity,
        ir::{build::*, prelude, print::render_type, Direction},
        middle::resolve::ResolveReferences,
    };

    fn typed(declarations: Vec<Rc<Declaration>>) -> CompilationContext {
        let mut all = prelude::standard_prelude();
        all.extend(declarations);
        let mut context = CompilationContext::default();
        let program = ResolveReferences.run(Program::new(all), &mut context).unwrap();
        TypeInference.run(program, &mut context).unwrap();
        context
    }

    #[test]
    fn types_follow_declarations() {
        let ttl = member(member(path("hdr"), "ipv4"), "ttl");
        let sum = binary(BinaryOperatorKind::Add, ttl.clone(), int(1));
        let joined = binary(BinaryOperatorKind::Concat, ttl.clone(), sized(0, 8));
        let valid = method_call(member(path("hdr"), "ipv4"), "isValid", Vec::new());
        let size = member(path("stack"), "size");
        let element = index(path("stack"), int(0));

        let context = typed(vec![
            header("ipv4_t", vec![("ttl", bits(8))]),
            structure("headers_t", vec![("ipv4", named_type("ipv4_t"))]),
            control(
                "c",
                vec![
                    parameter(Direction::InOut, "hdr", named_type("headers_t")),
                    parameter(Direction::InOut, "stack", stack_type(named_type("ipv4_t"), 4)),
                ],
                Vec::new(),
                vec![
                    assign(ttl.clone(), sum.clone()),
                    assign(member(element.clone(), "ttl"), joined.clone()),
                    if_statement(valid.clone(), empty_statement(), None),
                    assign(member(path("hdr"), "ipv4"), element.clone()),
                    call_statement(method_call(path("stack"), "push_front", vec![size.clone()])),
                ],
            ),
        ]);

        let type_of = |expression: &Rc<Expression>| {
            render_type(context.type_map.get_type(expression).unwrap(), false)
        };
        assert_eq!(type_of(&ttl), "bit<8>");
        assert_eq!(type_of(&sum), "bit<8>");
        assert_eq!(type_of(&joined), "bit<16>");
        assert_eq!(type_of(&valid), "bool");
        assert_eq!(type_of(&size), "bit<32>");
        assert_eq!(type_of(&element), "ipv4_t");
        assert!(context.diagnostics.is_empty());
    }

    #[test]
    fn argument_binding_errors_are_reported() {
        let context = typed(vec![
            action("a", vec![parameter(Direction::In, "x", bits(8))], Vec::new()),
            control(
                "c",
                Vec::new(),
                vec![
                    instance("counter", specialized_type("Counter", vec![bits(32)]), Vec::new()),
                    table("t", vec![actions_property(vec![path("a")])]),
                ],
                vec![call_statement(call(path("a"), Vec::new()))],
            ),
        ]);

        assert_eq!(
            context.diagnostics.messages(Severity::Error),
            vec![
                "no constructor of `Counter` accepts 0 argument(s)",
                "no argument for parameter `x`"
            ]
        );
    }

    #[test]
    fn widths() {
        let ty = named_type("h_t");
        let context = typed(vec![
            header("h_t", vec![("a", bits(4)), ("b", bits(12))]),
            control(
                "c",
                vec![parameter(Direction::InOut, "h", ty.clone())],
                Vec::new(),
                Vec::new(),
            ),
        ]);

        assert_eq!(width_of(&bits(9), &context.reference_map), Some(9));
        assert_eq!(width_of(&ty, &context.reference_map), Some(16));
        assert_eq!(width_of(&varbits(8), &context.reference_map), None);
        assert!(is_header(&ty, &context.reference_map));
    }
}
