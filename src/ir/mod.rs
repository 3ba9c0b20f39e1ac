//! The intermediate representation every pass reads and rewrites.
//!
//! Nodes are immutable once built and are shared through `Rc`. A rewrite
//! never edits a node in place: it allocates a replacement that copies the
//! unchanged fields, and returns the original `Rc` untouched when nothing
//! below it changed. Callers rely on `Rc::ptr_eq` to detect "did this
//! subtree change" without comparing structure.
//!
//! Each node also carries a [`NodeId`]. A node rebuilt by the traversal engine
//! because one of its children changed keeps the id of the node it replaces,
//! so side tables keyed by id (resolved declarations, types, abstract values)
//! keep pointing at the same construct across versions. Nodes synthesized by
//! a pass get a fresh id.

use std::{
    rc::Rc,
    sync::atomic::{AtomicU32, Ordering},
};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub mod build;
pub mod equiv;
pub mod fold;
pub mod operator;
pub mod parser_graph;
pub mod prelude;
pub mod print;
pub mod symbol;
pub mod transform;
pub mod visit;

pub use operator::{BinaryOperatorKind, UnaryOperatorKind};
pub use symbol::Symbol;

static NEXT_NODE_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn fresh() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl core::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Byte range of the construct in the source the front end parsed. Purely
/// informational.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub const fn dummy() -> Self {
        Self { start: 0, end: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    pub symbol: Symbol,
    #[serde(default)]
    pub span: Span,
}

impl Identifier {
    pub fn new(name: &str) -> Self {
        Self {
            symbol: Symbol::new(name),
            span: Span::dummy(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.symbol.value()
    }
}

impl core::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Program {
    #[serde(skip, default = "NodeId::fresh")]
    pub id: NodeId,
    pub declarations: Rc<[Rc<Declaration>]>,
}

impl Program {
    pub fn new(declarations: Vec<Rc<Declaration>>) -> Rc<Self> {
        Rc::new(Self {
            id: NodeId::fresh(),
            declarations: declarations.into(),
        })
    }

    pub fn find(&self, name: &str) -> Option<&Rc<Declaration>> {
        self.declarations.iter().find(|d| d.name.symbol == name)
    }
}

/// A syntactic reference to a declaration. The declaration it denotes is
/// recorded in the `ReferenceMap` under this node's id.
#[derive(Debug, Serialize, Deserialize)]
pub struct Path {
    #[serde(skip, default = "NodeId::fresh")]
    pub id: NodeId,
    pub name: Identifier,
}

impl Path {
    pub fn new(name: &str) -> Rc<Self> {
        Rc::new(Self {
            id: NodeId::fresh(),
            name: Identifier::new(name),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(skip, default = "NodeId::fresh")]
    pub id: NodeId,
    pub name: Identifier,
    #[serde(default = "empty")]
    pub expressions: Rc<[Rc<Expression>]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    #[default]
    #[strum(serialize = "")]
    None,
    In,
    Out,
    InOut,
}

impl Direction {
    /// Whether a callee may write through a parameter with this direction
    pub fn is_written(self) -> bool {
        matches!(self, Direction::Out | Direction::InOut)
    }

    /// Whether the caller's value flows into the callee
    pub fn is_read(self) -> bool {
        !matches!(self, Direction::Out)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Declaration {
    #[serde(skip, default = "NodeId::fresh")]
    pub id: NodeId,
    #[serde(default)]
    pub span: Span,
    pub name: Identifier,
    #[serde(default = "empty")]
    pub annotations: Rc<[Rc<Annotation>]>,
    pub kind: DeclarationKind,
}

impl Declaration {
    /// A copy of this declaration with different contents. The copy keeps the
    /// id of the declaration it replaces.
    pub fn with_kind(&self, kind: DeclarationKind) -> Rc<Self> {
        Rc::new(Self {
            id: self.id,
            span: self.span,
            name: self.name,
            annotations: self.annotations.clone(),
            kind,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name.name()
    }

    pub fn has_annotation(&self, name: &str) -> bool {
        self.annotations.iter().any(|a| a.name.symbol == name)
    }

    /// Whether this declaration names a type
    pub fn is_type(&self) -> bool {
        matches!(
            self.kind,
            DeclarationKind::TypeVariable
                | DeclarationKind::Struct { .. }
                | DeclarationKind::Header { .. }
                | DeclarationKind::HeaderUnion { .. }
                | DeclarationKind::Enum { .. }
                | DeclarationKind::Error { .. }
                | DeclarationKind::Extern { .. }
                | DeclarationKind::Parser { .. }
                | DeclarationKind::Control { .. }
                | DeclarationKind::Package { .. }
        )
    }

    pub fn is_action(&self) -> bool {
        matches!(self.kind, DeclarationKind::Action { .. })
    }

    /// The type a value-carrying declaration was declared with
    pub fn declared_type(&self) -> Option<&Rc<Type>> {
        match &self.kind {
            DeclarationKind::Constant { ty, .. }
            | DeclarationKind::Variable { ty, .. }
            | DeclarationKind::Parameter { ty, .. }
            | DeclarationKind::Instance { ty, .. } => Some(ty),
            _ => None,
        }
    }

    pub fn direction(&self) -> Direction {
        match &self.kind {
            DeclarationKind::Parameter { direction, .. } => *direction,
            _ => Direction::None,
        }
    }

    pub fn fields(&self) -> Option<&Rc<[Field]>> {
        match &self.kind {
            DeclarationKind::Struct { fields }
            | DeclarationKind::Header { fields }
            | DeclarationKind::HeaderUnion { fields } => Some(fields),
            _ => None,
        }
    }

    pub fn properties(&self) -> Option<&Rc<[Rc<Property>]>> {
        match &self.kind {
            DeclarationKind::Table { properties } | DeclarationKind::StatefulAlu { properties } => {
                Some(properties)
            }
            _ => None,
        }
    }

    pub fn property(&self, name: &str) -> Option<&Rc<Property>> {
        self.properties()?.iter().find(|p| p.name.symbol == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub name: Identifier,
    pub ty: Rc<Type>,
}

/// The signature shared by extern methods, extern functions and functions.
/// A method whose name equals its extern's name is a constructor.
#[derive(Debug, Serialize, Deserialize)]
pub struct Signature {
    #[serde(default = "empty")]
    pub type_parameters: Rc<[Rc<Declaration>]>,
    pub return_type: Rc<Type>,
    pub parameters: Rc<[Rc<Declaration>]>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Property {
    #[serde(skip, default = "NodeId::fresh")]
    pub id: NodeId,
    pub name: Identifier,
    pub value: PropertyValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyValue {
    Expression(Rc<Expression>),
    /// `actions = { a; b(1); }`
    ActionList(Rc<[Rc<Expression>]>),
    Key(Rc<[KeyElement]>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyElement {
    pub expression: Rc<Expression>,
    pub match_kind: Identifier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationKind {
    Constant {
        ty: Rc<Type>,
        value: Rc<Expression>,
    },
    Variable {
        ty: Rc<Type>,
        #[serde(default)]
        initializer: Option<Rc<Expression>>,
    },
    Parameter {
        #[serde(default)]
        direction: Direction,
        ty: Rc<Type>,
        #[serde(default)]
        default_value: Option<Rc<Expression>>,
    },
    TypeVariable,
    Struct {
        fields: Rc<[Field]>,
    },
    Header {
        fields: Rc<[Field]>,
    },
    HeaderUnion {
        fields: Rc<[Field]>,
    },
    Enum {
        members: Rc<[Identifier]>,
    },
    /// `error { ... }`; all error declarations extend the single `error` type
    Error {
        members: Rc<[Identifier]>,
    },
    Extern {
        #[serde(default = "empty")]
        type_parameters: Rc<[Rc<Declaration>]>,
        methods: Rc<[Rc<Declaration>]>,
    },
    /// Extern method, constructor, free extern function or abstract method
    Method {
        signature: Rc<Signature>,
        #[serde(default)]
        is_abstract: bool,
    },
    Function {
        signature: Rc<Signature>,
        body: Rc<Block>,
    },
    Action {
        parameters: Rc<[Rc<Declaration>]>,
        body: Rc<Block>,
    },
    Table {
        properties: Rc<[Rc<Property>]>,
    },
    Instance {
        ty: Rc<Type>,
        #[serde(default = "empty")]
        arguments: Rc<[Rc<Argument>]>,
        /// Implementations of the extern's abstract methods
        #[serde(default)]
        initializer: Option<Rc<[Rc<Declaration>]>>,
    },
    ParserState {
        components: Rc<[Rc<Statement>]>,
        /// A path to the next state or a select expression; `None` only for
        /// the built-in `accept` and `reject` states
        #[serde(default)]
        selection: Option<Rc<Expression>>,
    },
    Parser {
        #[serde(default = "empty")]
        type_parameters: Rc<[Rc<Declaration>]>,
        apply_parameters: Rc<[Rc<Declaration>]>,
        #[serde(default = "empty")]
        constructor_parameters: Rc<[Rc<Declaration>]>,
        #[serde(default = "empty")]
        locals: Rc<[Rc<Declaration>]>,
        states: Rc<[Rc<Declaration>]>,
    },
    Control {
        #[serde(default = "empty")]
        type_parameters: Rc<[Rc<Declaration>]>,
        apply_parameters: Rc<[Rc<Declaration>]>,
        #[serde(default = "empty")]
        constructor_parameters: Rc<[Rc<Declaration>]>,
        #[serde(default = "empty")]
        locals: Rc<[Rc<Declaration>]>,
        body: Rc<Block>,
    },
    Package {
        #[serde(default = "empty")]
        type_parameters: Rc<[Rc<Declaration>]>,
        constructor_parameters: Rc<[Rc<Declaration>]>,
    },
    /// Declarative register ALU (`reg`, `condition_lo`, `update_lo_1_value`,
    /// ...), lowered into a `RegisterAction` instance
    StatefulAlu {
        properties: Rc<[Rc<Property>]>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Block {
    #[serde(skip, default = "NodeId::fresh")]
    pub id: NodeId,
    #[serde(default)]
    pub span: Span,
    pub statements: Rc<[Rc<Statement>]>,
}

impl Block {
    pub fn new(statements: Vec<Rc<Statement>>) -> Rc<Self> {
        Rc::new(Self {
            id: NodeId::fresh(),
            span: Span::dummy(),
            statements: statements.into(),
        })
    }

    pub fn with_statements(&self, statements: Rc<[Rc<Statement>]>) -> Rc<Self> {
        Rc::new(Self {
            id: self.id,
            span: self.span,
            statements,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Statement {
    #[serde(skip, default = "NodeId::fresh")]
    pub id: NodeId,
    #[serde(default)]
    pub span: Span,
    pub kind: StatementKind,
}

impl Statement {
    pub fn new(kind: StatementKind) -> Rc<Self> {
        Rc::new(Self {
            id: NodeId::fresh(),
            span: Span::dummy(),
            kind,
        })
    }

    pub fn with_kind(&self, kind: StatementKind) -> Rc<Self> {
        Rc::new(Self {
            id: self.id,
            span: self.span,
            kind,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Assignment {
        lhs: Rc<Expression>,
        rhs: Rc<Expression>,
    },
    MethodCall(Rc<Expression>),
    If {
        condition: Rc<Expression>,
        positive: Rc<Statement>,
        #[serde(default)]
        negative: Option<Rc<Statement>>,
    },
    Block(Rc<Block>),
    Return(Option<Rc<Expression>>),
    Exit,
    Empty,
    Declaration(Rc<Declaration>),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Expression {
    #[serde(skip, default = "NodeId::fresh")]
    pub id: NodeId,
    #[serde(default)]
    pub span: Span,
    pub kind: ExpressionKind,
}

impl Expression {
    pub fn new(kind: ExpressionKind) -> Rc<Self> {
        Rc::new(Self {
            id: NodeId::fresh(),
            span: Span::dummy(),
            kind,
        })
    }

    pub fn with_kind(&self, kind: ExpressionKind) -> Rc<Self> {
        Rc::new(Self {
            id: self.id,
            span: self.span,
            kind,
        })
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match &self.kind {
            ExpressionKind::Literal(literal) => Some(literal),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&Rc<Path>> {
        match &self.kind {
            ExpressionKind::Path(path) => Some(path),
            _ => None,
        }
    }

    pub fn is_method_call(&self) -> bool {
        matches!(self.kind, ExpressionKind::MethodCall { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionKind {
    Literal(Literal),
    Path(Rc<Path>),
    This,
    Member {
        base: Rc<Expression>,
        member: Identifier,
    },
    ArrayIndex {
        base: Rc<Expression>,
        index: Rc<Expression>,
    },
    /// A type used in expression position, e.g. the `error` in `error.NoError`
    TypeName(Rc<Type>),
    Binary {
        operator: BinaryOperatorKind,
        lhs: Rc<Expression>,
        rhs: Rc<Expression>,
    },
    Unary {
        operator: UnaryOperatorKind,
        operand: Rc<Expression>,
    },
    Cast {
        ty: Rc<Type>,
        expression: Rc<Expression>,
    },
    MethodCall {
        target: Rc<Expression>,
        #[serde(default = "empty")]
        type_arguments: Rc<[Rc<Type>]>,
        #[serde(default = "empty")]
        arguments: Rc<[Rc<Argument>]>,
    },
    ConstructorCall {
        ty: Rc<Type>,
        #[serde(default = "empty")]
        arguments: Rc<[Rc<Argument>]>,
    },
    List(Rc<[Rc<Expression>]>),
    StructLiteral(Rc<[NamedExpression]>),
    Mux {
        condition: Rc<Expression>,
        positive: Rc<Expression>,
        negative: Rc<Expression>,
    },
    Select {
        selectors: Rc<[Rc<Expression>]>,
        cases: Rc<[Rc<SelectCase>]>,
    },
    /// `default` / `_` in keysets
    Default,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedExpression {
    pub name: Identifier,
    pub expression: Rc<Expression>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SelectCase {
    #[serde(skip, default = "NodeId::fresh")]
    pub id: NodeId,
    pub keyset: Rc<Expression>,
    pub state: Rc<Path>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Argument {
    #[serde(skip, default = "NodeId::fresh")]
    pub id: NodeId,
    #[serde(default)]
    pub name: Option<Identifier>,
    pub expression: Rc<Expression>,
}

impl Argument {
    pub fn positional(expression: Rc<Expression>) -> Rc<Self> {
        Rc::new(Self {
            id: NodeId::fresh(),
            name: None,
            expression,
        })
    }

    pub fn named(name: &str, expression: Rc<Expression>) -> Rc<Self> {
        Rc::new(Self {
            id: NodeId::fresh(),
            name: Some(Identifier::new(name)),
            expression,
        })
    }

    pub fn with_expression(&self, expression: Rc<Expression>) -> Rc<Self> {
        Rc::new(Self {
            id: self.id,
            name: self.name,
            expression,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Boolean(bool),
    /// An integer constant. `width` is `None` for arbitrary-precision `int`
    /// literals.
    Integer {
        value: i128,
        #[serde(default)]
        width: Option<u32>,
        #[serde(default)]
        signed: bool,
    },
    String(Rc<str>),
}

impl Literal {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Literal::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Literal::Integer { value, .. } => Some(*value),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Type {
    #[serde(skip, default = "NodeId::fresh")]
    pub id: NodeId,
    pub kind: TypeKind,
}

impl Type {
    pub fn new(kind: TypeKind) -> Rc<Self> {
        Rc::new(Self {
            id: NodeId::fresh(),
            kind,
        })
    }

    pub fn with_kind(&self, kind: TypeKind) -> Rc<Self> {
        Rc::new(Self { id: self.id, kind })
    }

    /// The width in bits of a fixed-width scalar type
    pub fn bit_width(&self) -> Option<u32> {
        match &self.kind {
            TypeKind::Bits { width, .. } => Some(*width),
            TypeKind::Bool => Some(1),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Bool,
    Bits {
        width: u32,
        #[serde(default)]
        signed: bool,
    },
    Varbits {
        max_width: u32,
    },
    Void,
    Error,
    String,
    /// Reference to a declared type (header, struct, extern, type variable...)
    Name(Rc<Path>),
    Specialized {
        base: Rc<Type>,
        arguments: Rc<[Rc<Type>]>,
    },
    Stack {
        element: Rc<Type>,
        size: u32,
    },
    Tuple(Rc<[Rc<Type>]>),
}

fn empty<T>() -> Rc<[T]> {
    Rc::from(Vec::new())
}
