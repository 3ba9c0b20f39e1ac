//! Small constructors for IR nodes. Passes use these when they synthesize
//! code, and tests use them in place of a front end.

use std::rc::Rc;

use super::{
    Annotation, Argument, BinaryOperatorKind, Block, Declaration, DeclarationKind, Direction,
    Expression, ExpressionKind, Field, Identifier, KeyElement, Literal, NamedExpression, NodeId,
    Path, Property, PropertyValue, SelectCase, Signature, Span, Statement, StatementKind, Type,
    TypeKind, UnaryOperatorKind,
};

/* Types */

pub fn bits(width: u32) -> Rc<Type> {
    Type::new(TypeKind::Bits {
        width,
        signed: false,
    })
}

pub fn signed_bits(width: u32) -> Rc<Type> {
    Type::new(TypeKind::Bits {
        width,
        signed: true,
    })
}

pub fn varbits(max_width: u32) -> Rc<Type> {
    Type::new(TypeKind::Varbits { max_width })
}

pub fn bool_type() -> Rc<Type> {
    Type::new(TypeKind::Bool)
}

pub fn void_type() -> Rc<Type> {
    Type::new(TypeKind::Void)
}

pub fn error_type() -> Rc<Type> {
    Type::new(TypeKind::Error)
}

pub fn named_type(name: &str) -> Rc<Type> {
    Type::new(TypeKind::Name(Path::new(name)))
}

pub fn specialized_type(name: &str, arguments: Vec<Rc<Type>>) -> Rc<Type> {
    Type::new(TypeKind::Specialized {
        base: named_type(name),
        arguments: arguments.into(),
    })
}

pub fn stack_type(element: Rc<Type>, size: u32) -> Rc<Type> {
    Type::new(TypeKind::Stack { element, size })
}

/* Expressions */

pub fn path(name: &str) -> Rc<Expression> {
    Expression::new(ExpressionKind::Path(Path::new(name)))
}

pub fn path_from(path: Rc<Path>) -> Rc<Expression> {
    Expression::new(ExpressionKind::Path(path))
}

pub fn boolean(value: bool) -> Rc<Expression> {
    Expression::new(ExpressionKind::Literal(Literal::Boolean(value)))
}

/// An arbitrary-precision `int` literal
pub fn int(value: i128) -> Rc<Expression> {
    Expression::new(ExpressionKind::Literal(Literal::Integer {
        value,
        width: None,
        signed: true,
    }))
}

/// A `bit<width>` literal
pub fn sized(value: i128, width: u32) -> Rc<Expression> {
    Expression::new(ExpressionKind::Literal(Literal::Integer {
        value,
        width: Some(width),
        signed: false,
    }))
}

pub fn literal(literal: Literal) -> Rc<Expression> {
    Expression::new(ExpressionKind::Literal(literal))
}

pub fn member(base: Rc<Expression>, member: &str) -> Rc<Expression> {
    Expression::new(ExpressionKind::Member {
        base,
        member: Identifier::new(member),
    })
}

pub fn index(base: Rc<Expression>, index: Rc<Expression>) -> Rc<Expression> {
    Expression::new(ExpressionKind::ArrayIndex { base, index })
}

pub fn binary(
    operator: BinaryOperatorKind,
    lhs: Rc<Expression>,
    rhs: Rc<Expression>,
) -> Rc<Expression> {
    Expression::new(ExpressionKind::Binary { operator, lhs, rhs })
}

pub fn unary(operator: UnaryOperatorKind, operand: Rc<Expression>) -> Rc<Expression> {
    Expression::new(ExpressionKind::Unary { operator, operand })
}

pub fn not(operand: Rc<Expression>) -> Rc<Expression> {
    unary(UnaryOperatorKind::LogicalNot, operand)
}

pub fn cast(ty: Rc<Type>, expression: Rc<Expression>) -> Rc<Expression> {
    Expression::new(ExpressionKind::Cast { ty, expression })
}

pub fn type_name(ty: Rc<Type>) -> Rc<Expression> {
    Expression::new(ExpressionKind::TypeName(ty))
}

/// `error.<name>`
pub fn error_member(name: &str) -> Rc<Expression> {
    member(type_name(error_type()), name)
}

pub fn call(target: Rc<Expression>, arguments: Vec<Rc<Expression>>) -> Rc<Expression> {
    call_with(
        target,
        arguments.into_iter().map(Argument::positional).collect(),
    )
}

pub fn call_with(target: Rc<Expression>, arguments: Vec<Rc<Argument>>) -> Rc<Expression> {
    Expression::new(ExpressionKind::MethodCall {
        target,
        type_arguments: Rc::from(Vec::new()),
        arguments: arguments.into(),
    })
}

/// `base.method(arguments)`
pub fn method_call(
    base: Rc<Expression>,
    method: &str,
    arguments: Vec<Rc<Expression>>,
) -> Rc<Expression> {
    call(member(base, method), arguments)
}

pub fn constructor_call(ty: Rc<Type>, arguments: Vec<Rc<Expression>>) -> Rc<Expression> {
    Expression::new(ExpressionKind::ConstructorCall {
        ty,
        arguments: arguments
            .into_iter()
            .map(Argument::positional)
            .collect::<Vec<_>>()
            .into(),
    })
}

pub fn list(items: Vec<Rc<Expression>>) -> Rc<Expression> {
    Expression::new(ExpressionKind::List(items.into()))
}

pub fn struct_literal(fields: Vec<(&str, Rc<Expression>)>) -> Rc<Expression> {
    Expression::new(ExpressionKind::StructLiteral(
        fields
            .into_iter()
            .map(|(name, expression)| NamedExpression {
                name: Identifier::new(name),
                expression,
            })
            .collect::<Vec<_>>()
            .into(),
    ))
}

pub fn mux(
    condition: Rc<Expression>,
    positive: Rc<Expression>,
    negative: Rc<Expression>,
) -> Rc<Expression> {
    Expression::new(ExpressionKind::Mux {
        condition,
        positive,
        negative,
    })
}

pub fn default_keyset() -> Rc<Expression> {
    Expression::new(ExpressionKind::Default)
}

pub fn select_case(keyset: Rc<Expression>, state: &str) -> Rc<SelectCase> {
    select_case_to(keyset, Path::new(state))
}

pub fn select_case_to(keyset: Rc<Expression>, state: Rc<Path>) -> Rc<SelectCase> {
    Rc::new(SelectCase {
        id: NodeId::fresh(),
        keyset,
        state,
    })
}

pub fn select(selectors: Vec<Rc<Expression>>, cases: Vec<Rc<SelectCase>>) -> Rc<Expression> {
    Expression::new(ExpressionKind::Select {
        selectors: selectors.into(),
        cases: cases.into(),
    })
}

/* Statements */

pub fn assign(lhs: Rc<Expression>, rhs: Rc<Expression>) -> Rc<Statement> {
    Statement::new(StatementKind::Assignment { lhs, rhs })
}

pub fn call_statement(call: Rc<Expression>) -> Rc<Statement> {
    Statement::new(StatementKind::MethodCall(call))
}

pub fn if_statement(
    condition: Rc<Expression>,
    positive: Rc<Statement>,
    negative: Option<Rc<Statement>>,
) -> Rc<Statement> {
    Statement::new(StatementKind::If {
        condition,
        positive,
        negative,
    })
}

pub fn block(statements: Vec<Rc<Statement>>) -> Rc<Block> {
    Block::new(statements)
}

pub fn block_statement(statements: Vec<Rc<Statement>>) -> Rc<Statement> {
    Statement::new(StatementKind::Block(Block::new(statements)))
}

pub fn return_statement() -> Rc<Statement> {
    Statement::new(StatementKind::Return(None))
}

pub fn exit_statement() -> Rc<Statement> {
    Statement::new(StatementKind::Exit)
}

pub fn empty_statement() -> Rc<Statement> {
    Statement::new(StatementKind::Empty)
}

pub fn declaration_statement(declaration: Rc<Declaration>) -> Rc<Statement> {
    Statement::new(StatementKind::Declaration(declaration))
}

/* Declarations */

pub fn declaration(name: &str, kind: DeclarationKind) -> Rc<Declaration> {
    Rc::new(Declaration {
        id: NodeId::fresh(),
        span: Span::dummy(),
        name: Identifier::new(name),
        annotations: Rc::from(Vec::new()),
        kind,
    })
}

/// A copy of `declaration` carrying one more annotation
pub fn annotated(declaration: &Declaration, annotation: &str) -> Rc<Declaration> {
    let mut annotations = declaration.annotations.to_vec();
    annotations.push(Rc::new(Annotation {
        id: NodeId::fresh(),
        name: Identifier::new(annotation),
        expressions: Rc::from(Vec::new()),
    }));

    Rc::new(Declaration {
        id: declaration.id,
        span: declaration.span,
        name: declaration.name,
        annotations: annotations.into(),
        kind: declaration.kind.clone(),
    })
}

pub fn variable(name: &str, ty: Rc<Type>, initializer: Option<Rc<Expression>>) -> Rc<Declaration> {
    declaration(name, DeclarationKind::Variable { ty, initializer })
}

pub fn constant(name: &str, ty: Rc<Type>, value: Rc<Expression>) -> Rc<Declaration> {
    declaration(name, DeclarationKind::Constant { ty, value })
}

pub fn parameter(direction: Direction, name: &str, ty: Rc<Type>) -> Rc<Declaration> {
    declaration(
        name,
        DeclarationKind::Parameter {
            direction,
            ty,
            default_value: None,
        },
    )
}

pub fn parameter_with_default(
    direction: Direction,
    name: &str,
    ty: Rc<Type>,
    default_value: Rc<Expression>,
) -> Rc<Declaration> {
    declaration(
        name,
        DeclarationKind::Parameter {
            direction,
            ty,
            default_value: Some(default_value),
        },
    )
}

pub fn type_variable(name: &str) -> Rc<Declaration> {
    declaration(name, DeclarationKind::TypeVariable)
}

fn fields(fields: Vec<(&str, Rc<Type>)>) -> Rc<[Field]> {
    fields
        .into_iter()
        .map(|(name, ty)| Field {
            name: Identifier::new(name),
            ty,
        })
        .collect::<Vec<_>>()
        .into()
}

pub fn header(name: &str, members: Vec<(&str, Rc<Type>)>) -> Rc<Declaration> {
    declaration(
        name,
        DeclarationKind::Header {
            fields: fields(members),
        },
    )
}

pub fn structure(name: &str, members: Vec<(&str, Rc<Type>)>) -> Rc<Declaration> {
    declaration(
        name,
        DeclarationKind::Struct {
            fields: fields(members),
        },
    )
}

pub fn error_declaration(members: &[&str]) -> Rc<Declaration> {
    declaration(
        "error",
        DeclarationKind::Error {
            members: members
                .iter()
                .map(|m| Identifier::new(m))
                .collect::<Vec<_>>()
                .into(),
        },
    )
}

pub fn enumeration(name: &str, members: &[&str]) -> Rc<Declaration> {
    declaration(
        name,
        DeclarationKind::Enum {
            members: members
                .iter()
                .map(|m| Identifier::new(m))
                .collect::<Vec<_>>()
                .into(),
        },
    )
}

pub fn signature(
    type_parameters: Vec<Rc<Declaration>>,
    return_type: Rc<Type>,
    parameters: Vec<Rc<Declaration>>,
) -> Rc<Signature> {
    Rc::new(Signature {
        type_parameters: type_parameters.into(),
        return_type,
        parameters: parameters.into(),
    })
}

/// An extern method, constructor or free extern function
pub fn method(
    name: &str,
    type_parameters: Vec<Rc<Declaration>>,
    return_type: Rc<Type>,
    parameters: Vec<Rc<Declaration>>,
) -> Rc<Declaration> {
    declaration(
        name,
        DeclarationKind::Method {
            signature: signature(type_parameters, return_type, parameters),
            is_abstract: false,
        },
    )
}

pub fn abstract_method(
    name: &str,
    return_type: Rc<Type>,
    parameters: Vec<Rc<Declaration>>,
) -> Rc<Declaration> {
    declaration(
        name,
        DeclarationKind::Method {
            signature: signature(Vec::new(), return_type, parameters),
            is_abstract: true,
        },
    )
}

pub fn extern_type(
    name: &str,
    type_parameters: Vec<Rc<Declaration>>,
    methods: Vec<Rc<Declaration>>,
) -> Rc<Declaration> {
    declaration(
        name,
        DeclarationKind::Extern {
            type_parameters: type_parameters.into(),
            methods: methods.into(),
        },
    )
}

pub fn function(
    name: &str,
    return_type: Rc<Type>,
    parameters: Vec<Rc<Declaration>>,
    body: Vec<Rc<Statement>>,
) -> Rc<Declaration> {
    declaration(
        name,
        DeclarationKind::Function {
            signature: signature(Vec::new(), return_type, parameters),
            body: Block::new(body),
        },
    )
}

pub fn action(
    name: &str,
    parameters: Vec<Rc<Declaration>>,
    body: Vec<Rc<Statement>>,
) -> Rc<Declaration> {
    declaration(
        name,
        DeclarationKind::Action {
            parameters: parameters.into(),
            body: Block::new(body),
        },
    )
}

pub fn instance(name: &str, ty: Rc<Type>, arguments: Vec<Rc<Expression>>) -> Rc<Declaration> {
    declaration(
        name,
        DeclarationKind::Instance {
            ty,
            arguments: arguments
                .into_iter()
                .map(Argument::positional)
                .collect::<Vec<_>>()
                .into(),
            initializer: None,
        },
    )
}

pub fn property(name: &str, value: Rc<Expression>) -> Rc<Property> {
    Rc::new(Property {
        id: NodeId::fresh(),
        name: Identifier::new(name),
        value: PropertyValue::Expression(value),
    })
}

pub fn actions_property(actions: Vec<Rc<Expression>>) -> Rc<Property> {
    Rc::new(Property {
        id: NodeId::fresh(),
        name: Identifier::new("actions"),
        value: PropertyValue::ActionList(actions.into()),
    })
}

pub fn key_property(elements: Vec<(Rc<Expression>, &str)>) -> Rc<Property> {
    Rc::new(Property {
        id: NodeId::fresh(),
        name: Identifier::new("key"),
        value: PropertyValue::Key(
            elements
                .into_iter()
                .map(|(expression, match_kind)| KeyElement {
                    expression,
                    match_kind: Identifier::new(match_kind),
                })
                .collect::<Vec<_>>()
                .into(),
        ),
    })
}

pub fn table(name: &str, properties: Vec<Rc<Property>>) -> Rc<Declaration> {
    declaration(
        name,
        DeclarationKind::Table {
            properties: properties.into(),
        },
    )
}

pub fn stateful_alu(name: &str, properties: Vec<Rc<Property>>) -> Rc<Declaration> {
    declaration(
        name,
        DeclarationKind::StatefulAlu {
            properties: properties.into(),
        },
    )
}

pub fn parser_state(
    name: &str,
    components: Vec<Rc<Statement>>,
    selection: Rc<Expression>,
) -> Rc<Declaration> {
    declaration(
        name,
        DeclarationKind::ParserState {
            components: components.into(),
            selection: Some(selection),
        },
    )
}

pub fn parser(
    name: &str,
    apply_parameters: Vec<Rc<Declaration>>,
    locals: Vec<Rc<Declaration>>,
    states: Vec<Rc<Declaration>>,
) -> Rc<Declaration> {
    declaration(
        name,
        DeclarationKind::Parser {
            type_parameters: Rc::from(Vec::new()),
            apply_parameters: apply_parameters.into(),
            constructor_parameters: Rc::from(Vec::new()),
            locals: locals.into(),
            states: states.into(),
        },
    )
}

pub fn control(
    name: &str,
    apply_parameters: Vec<Rc<Declaration>>,
    locals: Vec<Rc<Declaration>>,
    body: Vec<Rc<Statement>>,
) -> Rc<Declaration> {
    declaration(
        name,
        DeclarationKind::Control {
            type_parameters: Rc::from(Vec::new()),
            apply_parameters: apply_parameters.into(),
            constructor_parameters: Rc::from(Vec::new()),
            locals: locals.into(),
            body: Block::new(body),
        },
    )
}

pub fn package(
    name: &str,
    type_parameters: Vec<Rc<Declaration>>,
    constructor_parameters: Vec<Rc<Declaration>>,
) -> Rc<Declaration> {
    declaration(
        name,
        DeclarationKind::Package {
            type_parameters: type_parameters.into(),
            constructor_parameters: constructor_parameters.into(),
        },
    )
}
