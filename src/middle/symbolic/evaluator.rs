//! Abstract execution of statements and expressions over [`ValueMap`]s.
//!
//! The evaluator never reports diagnostics itself. A failure it can prove
//! (an uninitialized read, an out-of-bounds index, re-extracting a valid
//! header) is a value; the statement that produced it stops its path and is
//! recorded as an [`Issue`] for the calling pass to judge.

use std::rc::Rc;

use hashbrown::HashMap;

use super::value::{
    Abstract, Initial, StandardException, SymbolicPacketIn, SymbolicStruct, SymbolicValue,
};
use crate::{
    diagnostics::CompilerBug,
    ir::{
        fold::{fold_binary, fold_cast, fold_unary},
        BinaryOperatorKind, Block, Declaration, DeclarationKind, Direction, Expression,
        ExpressionKind, NodeId, Span, Statement, StatementKind, Symbol, Type, TypeKind,
    },
    middle::{
        instance::{BuiltInMethod, MethodInstance, MethodKind, ResolutionError},
        reference_map::ReferenceMap,
        type_map::{is_header, type_declaration, width_of, TypeMap},
    },
};

/// Abstract values of the declarations in scope, by declaration id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueMap {
    values: HashMap<NodeId, SymbolicValue>,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, declaration: &Declaration) -> Option<&SymbolicValue> {
        self.values.get(&declaration.id)
    }

    pub fn get_mut(&mut self, declaration: &Declaration) -> Option<&mut SymbolicValue> {
        self.values.get_mut(&declaration.id)
    }

    pub fn insert(&mut self, declaration: &Declaration, value: SymbolicValue) {
        self.values.insert(declaration.id, value);
    }

    pub fn contains(&self, declaration: &Declaration) -> bool {
        self.values.contains_key(&declaration.id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Joins `other` into `self`; true when `self` changed. A declaration
    /// only one side knows (a local of one branch) is taken as is.
    pub fn merge(&mut self, other: &ValueMap) -> Result<bool, CompilerBug> {
        let mut changed = false;
        for (id, value) in other.values.iter() {
            match self.values.get_mut(id) {
                Some(existing) => changed |= existing.merge(value)?,
                None => {
                    self.values.insert(*id, value.clone());
                    changed = true;
                }
            }
        }
        Ok(changed)
    }

    /// Forgets everything known, as after a call that may write anything in
    /// scope
    pub fn set_unknown(&mut self) {
        for value in self.values.values_mut() {
            value.set_unknown();
        }
    }
}

/// A failure found while executing a statement
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub span: Span,
    pub statement: NodeId,
    pub value: SymbolicValue,
}

impl Issue {
    pub fn message(&self) -> String {
        match &self.value {
            SymbolicValue::StaticError(message) => message.clone(),
            SymbolicValue::Exception(exception) => exception.to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_exception(&self) -> bool {
        matches!(self.value, SymbolicValue::Exception(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The path ended: `exit`, `return`, or a failure
    Stop,
}

/// Why evaluation could not produce a value
enum Halt {
    Bug(CompilerBug),
    Error(SymbolicValue),
}

impl From<CompilerBug> for Halt {
    fn from(bug: CompilerBug) -> Self {
        Halt::Bug(bug)
    }
}

type Eval<T> = Result<T, Halt>;

fn static_error<T>(message: impl Into<String>) -> Eval<T> {
    Err(Halt::Error(SymbolicValue::StaticError(message.into())))
}

fn exception<T>(exception: StandardException) -> Eval<T> {
    Err(Halt::Error(SymbolicValue::Exception(exception)))
}

/// Fails when `value` is an error; errors stop evaluation wherever they
/// surface
fn check(value: SymbolicValue) -> Eval<SymbolicValue> {
    if value.is_error() {
        Err(Halt::Error(value))
    } else {
        Ok(value)
    }
}

enum Projection {
    Field(Symbol),
    Index(usize),
    /// An element whose index is not known at compile time
    AnyIndex,
}

/// A writable location: a declaration and a path into its value
struct Place {
    root: Rc<Declaration>,
    projections: Vec<Projection>,
}

pub struct SymbolicEvaluator<'a> {
    reference_map: &'a ReferenceMap,
    type_map: &'a mut TypeMap,
    issues: Vec<Issue>,
}

impl<'a> SymbolicEvaluator<'a> {
    pub fn new(reference_map: &'a ReferenceMap, type_map: &'a mut TypeMap) -> Self {
        Self {
            reference_map,
            type_map,
            issues: Vec::new(),
        }
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn take_issues(&mut self) -> Vec<Issue> {
        std::mem::take(&mut self.issues)
    }

    /// Seeds `values` with the parameters of a parser, control or action:
    /// `out` parameters start uninitialized, everything else unknown
    pub fn bind_parameters(&self, parameters: &[Rc<Declaration>], values: &mut ValueMap) {
        for parameter in parameters {
            let Some(ty) = parameter.declared_type() else {
                continue;
            };
            let initial = match parameter.direction() {
                Direction::Out => Initial::Uninitialized,
                _ => Initial::Unknown,
            };
            values.insert(
                parameter,
                SymbolicValue::create(ty, self.reference_map, initial),
            );
        }
    }

    /// Adds a local declaration to `values`, running its initializer
    pub fn declare(
        &mut self,
        declaration: &Rc<Declaration>,
        values: &mut ValueMap,
    ) -> Result<Flow, CompilerBug> {
        let result = self.declaration(declaration, values).map(|()| Flow::Continue);
        self.settle(result, declaration.span, declaration.id)
    }

    /// The value of `expression`. Failures come back as error values.
    pub fn evaluate(
        &mut self,
        expression: &Rc<Expression>,
        values: &mut ValueMap,
    ) -> Result<SymbolicValue, CompilerBug> {
        match self.rvalue(expression, values) {
            Ok(value) => Ok(value),
            Err(Halt::Error(value)) => Ok(value),
            Err(Halt::Bug(bug)) => Err(bug),
        }
    }

    pub fn execute(
        &mut self,
        statement: &Rc<Statement>,
        values: &mut ValueMap,
    ) -> Result<Flow, CompilerBug> {
        let result = self.statement(statement, values);
        self.settle(result, statement.span, statement.id)
    }

    pub fn execute_block(
        &mut self,
        block: &Block,
        values: &mut ValueMap,
    ) -> Result<Flow, CompilerBug> {
        for statement in block.statements.iter() {
            if self.execute(statement, values)? == Flow::Stop {
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }

    /// Records a failure of the construct at `span`; a failure stops the path
    fn settle(&mut self, result: Eval<Flow>, span: Span, statement: NodeId) -> Result<Flow, CompilerBug> {
        match result {
            Ok(flow) => Ok(flow),
            Err(Halt::Bug(bug)) => Err(bug),
            Err(Halt::Error(value)) => {
                log::trace!("statement {statement} fails: {value}");
                self.issues.push(Issue {
                    span,
                    statement,
                    value,
                });
                Ok(Flow::Stop)
            }
        }
    }

    fn declaration(&mut self, declaration: &Rc<Declaration>, values: &mut ValueMap) -> Eval<()> {
        match &declaration.kind {
            DeclarationKind::Variable { ty, initializer } => {
                let mut value = SymbolicValue::create(ty, self.reference_map, Initial::Uninitialized);
                if let Some(initializer) = initializer {
                    let initial = self.rvalue(initializer, values)?;
                    value.assign(&initial)?;
                }
                values.insert(declaration, value);
            }
            DeclarationKind::Constant { ty, value: expression } => {
                let mut value = SymbolicValue::create(ty, self.reference_map, Initial::Uninitialized);
                let constant = self.rvalue(expression, values)?;
                value.assign(&constant)?;
                values.insert(declaration, value);
            }
            DeclarationKind::Instance { ty, .. } => {
                values.insert(
                    declaration,
                    SymbolicValue::create(ty, self.reference_map, Initial::Unknown),
                );
            }
            _ => {}
        }
        Ok(())
    }

    fn statement(&mut self, statement: &Rc<Statement>, values: &mut ValueMap) -> Eval<Flow> {
        match &statement.kind {
            StatementKind::Assignment { lhs, rhs } => {
                let value = self.rvalue(rhs, values)?;
                let place = self.place(lhs, values)?;
                self.write(&place, values, |destination| {
                    destination.assign(&value).map_err(Halt::Bug)
                })?;
                Ok(Flow::Continue)
            }
            StatementKind::MethodCall(call) => {
                self.call(call, values)?;
                Ok(Flow::Continue)
            }
            StatementKind::If {
                condition,
                positive,
                negative,
            } => {
                let condition = self.rvalue(condition, values)?;
                if condition.is_uninitialized() {
                    return static_error("condition reads an uninitialized value");
                }

                match condition.as_bool() {
                    Some(true) => self.execute(positive, values).map_err(Halt::Bug),
                    Some(false) => match negative {
                        Some(negative) => self.execute(negative, values).map_err(Halt::Bug),
                        None => Ok(Flow::Continue),
                    },
                    None => {
                        let mut otherwise = values.clone();
                        let taken = self.execute(positive, values)?;
                        let not_taken = match negative {
                            Some(negative) => self.execute(negative, &mut otherwise)?,
                            None => Flow::Continue,
                        };

                        match (taken, not_taken) {
                            (Flow::Stop, Flow::Stop) => Ok(Flow::Stop),
                            (Flow::Continue, Flow::Stop) => Ok(Flow::Continue),
                            (Flow::Stop, Flow::Continue) => {
                                *values = otherwise;
                                Ok(Flow::Continue)
                            }
                            (Flow::Continue, Flow::Continue) => {
                                values.merge(&otherwise)?;
                                Ok(Flow::Continue)
                            }
                        }
                    }
                }
            }
            StatementKind::Block(block) => self.execute_block(block, values).map_err(Halt::Bug),
            StatementKind::Return(value) => {
                if let Some(value) = value {
                    self.rvalue(value, values)?;
                }
                Ok(Flow::Stop)
            }
            StatementKind::Exit => Ok(Flow::Stop),
            StatementKind::Empty => Ok(Flow::Continue),
            StatementKind::Declaration(declaration) => {
                self.declaration(declaration, values)?;
                Ok(Flow::Continue)
            }
        }
    }

    /// The value of `expression`, with unknown-index stack elements joined
    fn rvalue(&mut self, expression: &Rc<Expression>, values: &mut ValueMap) -> Eval<SymbolicValue> {
        match self.expression(expression, values)? {
            SymbolicValue::AnyElement(stack) => check(stack.collapse()?),
            value => Ok(value),
        }
    }

    fn expression(&mut self, expression: &Rc<Expression>, values: &mut ValueMap) -> Eval<SymbolicValue> {
        match &expression.kind {
            ExpressionKind::Literal(literal) => check(SymbolicValue::from_literal(literal)),
            ExpressionKind::Path(path) => {
                let declaration = self.reference_map.require_declaration(path)?.clone();
                self.read(&declaration, values)
            }
            ExpressionKind::This => static_error("`this` has no symbolic value"),
            ExpressionKind::Member { base, member } => {
                if let ExpressionKind::TypeName(ty) = &base.kind {
                    return Ok(self.type_member(ty, member.symbol));
                }
                let base = self.expression(base, values)?;
                self.member(base, member.symbol)
            }
            ExpressionKind::ArrayIndex { base, index } => {
                let SymbolicValue::Stack(stack) = self.rvalue(base, values)? else {
                    return static_error(format!("`{base}` is not a header stack"));
                };
                let index = self.rvalue(index, values)?;
                if index.is_uninitialized() {
                    return static_error("stack index reads an uninitialized value");
                }

                match index.as_literal().and_then(|literal| literal.as_integer()) {
                    Some(position) => match usize::try_from(position)
                        .ok()
                        .and_then(|position| stack.elements.get(position))
                    {
                        Some(element) => check(element.clone()),
                        None => exception(StandardException::StackOutOfBounds),
                    },
                    None => Ok(SymbolicValue::AnyElement(stack)),
                }
            }
            ExpressionKind::TypeName(_)
            | ExpressionKind::Select { .. }
            | ExpressionKind::Default => Ok(SymbolicValue::Void),
            ExpressionKind::Binary { operator, lhs, rhs } => {
                self.binary(expression, *operator, lhs, rhs, values)
            }
            ExpressionKind::Unary { operator, operand } => {
                let value = self.rvalue(operand, values)?;
                if value.is_uninitialized() {
                    return static_error(format!("`{expression}` reads an uninitialized value"));
                }
                match value.as_literal() {
                    Some(literal) => match fold_unary(*operator, &literal) {
                        Ok(folded) => check(SymbolicValue::from_literal(&folded)),
                        Err(error) => static_error(error.to_string()),
                    },
                    None => {
                        let mut value = value;
                        value.set_unknown();
                        Ok(value)
                    }
                }
            }
            ExpressionKind::Cast { ty, expression: operand } => {
                let value = self.rvalue(operand, values)?;
                if value.is_uninitialized() {
                    return static_error(format!("`{expression}` reads an uninitialized value"));
                }
                match value.as_literal() {
                    Some(literal) => match fold_cast(ty, &literal) {
                        Ok(folded) => check(SymbolicValue::from_literal(&folded)),
                        Err(error) => static_error(error.to_string()),
                    },
                    None => check(SymbolicValue::create(ty, self.reference_map, Initial::Unknown)),
                }
            }
            ExpressionKind::Mux {
                condition,
                positive,
                negative,
            } => {
                let condition = self.rvalue(condition, values)?;
                if condition.is_uninitialized() {
                    return static_error("condition reads an uninitialized value");
                }
                match condition.as_bool() {
                    Some(true) => self.rvalue(positive, values),
                    Some(false) => self.rvalue(negative, values),
                    None => {
                        let mut joined = self.rvalue(positive, values)?;
                        let other = self.rvalue(negative, values)?;
                        joined.merge(&other)?;
                        Ok(joined)
                    }
                }
            }
            ExpressionKind::MethodCall { .. } => self.call(expression, values),
            ExpressionKind::ConstructorCall { ty, .. } => Ok(SymbolicValue::Extern(
                type_declaration(ty, self.reference_map)
                    .map(|declaration| declaration.name.symbol)
                    .unwrap_or_else(|| Symbol::new("extern")),
            )),
            ExpressionKind::List(items) => Ok(SymbolicValue::Tuple(
                items
                    .iter()
                    .map(|item| self.rvalue(item, values))
                    .collect::<Eval<Vec<_>>>()?,
            )),
            ExpressionKind::StructLiteral(fields) => Ok(SymbolicValue::Struct(SymbolicStruct {
                type_name: Symbol::new("struct"),
                fields: fields
                    .iter()
                    .map(|field| Ok((field.name.symbol, self.rvalue(&field.expression, values)?)))
                    .collect::<Eval<Vec<_>>>()?,
            })),
        }
    }

    /// The current value of a declaration. Declarations outside the analyzed
    /// scope (a control's locals seen from an action) are unknown.
    fn read(&mut self, declaration: &Rc<Declaration>, values: &mut ValueMap) -> Eval<SymbolicValue> {
        if let Some(value) = values.get(declaration) {
            return Ok(value.clone());
        }

        match &declaration.kind {
            DeclarationKind::Constant { ty, value: expression } => {
                let mut value = SymbolicValue::create(ty, self.reference_map, Initial::Uninitialized);
                let constant = self.rvalue(expression, values)?;
                value.assign(&constant)?;
                Ok(value)
            }
            DeclarationKind::Variable { ty, .. }
            | DeclarationKind::Parameter { ty, .. }
            | DeclarationKind::Instance { ty, .. } => check(SymbolicValue::create(
                ty,
                self.reference_map,
                Initial::Unknown,
            )),
            _ => Ok(SymbolicValue::Void),
        }
    }

    fn type_member(&self, ty: &Type, member: Symbol) -> SymbolicValue {
        if let TypeKind::Error = ty.kind {
            return SymbolicValue::Error(Abstract::Constant(member));
        }

        match type_declaration(ty, self.reference_map) {
            Some(declaration) => match &declaration.kind {
                DeclarationKind::Error { .. } => SymbolicValue::Error(Abstract::Constant(member)),
                DeclarationKind::Enum { .. } => SymbolicValue::Enum {
                    type_name: declaration.name.symbol,
                    value: Abstract::Constant(member),
                },
                _ => SymbolicValue::Void,
            },
            None => SymbolicValue::Void,
        }
    }

    fn member(&mut self, base: SymbolicValue, member: Symbol) -> Eval<SymbolicValue> {
        match base {
            SymbolicValue::Struct(fields) => match fields.get(member) {
                Some(value) => check(value.clone()),
                None => static_error(format!("`{}` has no field `{member}`", fields.type_name)),
            },
            SymbolicValue::Header(header) => check(header.read_field(member)),
            SymbolicValue::Stack(stack) if member == "size" => Ok(SymbolicValue::Integer {
                width: Some(32),
                signed: false,
                value: Abstract::Constant(stack.size() as i128),
            }),
            SymbolicValue::Stack(_) if member == "lastIndex" => Ok(SymbolicValue::Integer {
                width: Some(32),
                signed: false,
                value: Abstract::Unknown,
            }),
            SymbolicValue::Stack(_) => {
                static_error(format!("header stack member `{member}` is not supported"))
            }
            SymbolicValue::AnyElement(stack) => {
                let element = check(stack.collapse()?)?;
                self.member(element, member)
            }
            other => static_error(format!("{other} has no member `{member}`")),
        }
    }

    fn binary(
        &mut self,
        expression: &Rc<Expression>,
        operator: BinaryOperatorKind,
        lhs: &Rc<Expression>,
        rhs: &Rc<Expression>,
        values: &mut ValueMap,
    ) -> Eval<SymbolicValue> {
        let left = self.rvalue(lhs, values)?;
        if left.is_uninitialized() {
            return static_error(format!("`{expression}` reads an uninitialized value"));
        }

        // `&&` and `||` do not evaluate their right operand once the left
        // one decides the result
        match (operator, left.as_bool()) {
            (BinaryOperatorKind::LogicalAnd, Some(false)) => {
                return Ok(SymbolicValue::Bool(Abstract::Constant(false)))
            }
            (BinaryOperatorKind::LogicalOr, Some(true)) => {
                return Ok(SymbolicValue::Bool(Abstract::Constant(true)))
            }
            _ => {}
        }

        let right = self.rvalue(rhs, values)?;
        if right.is_uninitialized() {
            return static_error(format!("`{expression}` reads an uninitialized value"));
        }

        if let (Some(a), Some(b)) = (left.as_literal(), right.as_literal()) {
            return match fold_binary(operator, &a, &b) {
                Ok(folded) => check(SymbolicValue::from_literal(&folded)),
                Err(error) => static_error(error.to_string()),
            };
        }

        if operator.is_relational()
            || matches!(
                operator,
                BinaryOperatorKind::LogicalAnd | BinaryOperatorKind::LogicalOr
            )
        {
            return Ok(SymbolicValue::Bool(Abstract::Unknown));
        }

        let width = |value: &SymbolicValue| match value {
            SymbolicValue::Integer { width, signed, .. } => (*width, *signed),
            _ => (None, false),
        };
        let ((left_width, signed), (right_width, _)) = (width(&left), width(&right));

        Ok(SymbolicValue::Integer {
            width: match operator {
                BinaryOperatorKind::Concat => left_width.zip(right_width).map(|(a, b)| a + b),
                BinaryOperatorKind::ShiftLeft | BinaryOperatorKind::ShiftRight => left_width,
                _ => left_width.or(right_width),
            },
            signed,
            value: Abstract::Unknown,
        })
    }

    /// Resolves an lvalue expression to the location it denotes
    fn place(&mut self, expression: &Rc<Expression>, values: &mut ValueMap) -> Eval<Place> {
        match &expression.kind {
            ExpressionKind::Path(path) => Ok(Place {
                root: self.reference_map.require_declaration(path)?.clone(),
                projections: Vec::new(),
            }),
            ExpressionKind::Member { base, member } => {
                let mut place = self.place(base, values)?;
                place.projections.push(Projection::Field(member.symbol));
                Ok(place)
            }
            ExpressionKind::ArrayIndex { base, index } => {
                let mut place = self.place(base, values)?;
                let index = self.rvalue(index, values)?;
                if index.is_uninitialized() {
                    return static_error("stack index reads an uninitialized value");
                }
                place.projections.push(
                    match index.as_literal().and_then(|literal| literal.as_integer()) {
                        Some(position) => match usize::try_from(position) {
                            Ok(position) => Projection::Index(position),
                            Err(_) => return exception(StandardException::StackOutOfBounds),
                        },
                        None => Projection::AnyIndex,
                    },
                );
                Ok(place)
            }
            _ => static_error(format!("`{expression}` cannot be written to")),
        }
    }

    /// Applies `update` to the value at `place`. Writing through an element
    /// of unknown index forgets the whole stack instead.
    fn write(
        &mut self,
        place: &Place,
        values: &mut ValueMap,
        update: impl FnOnce(&mut SymbolicValue) -> Eval<()>,
    ) -> Eval<()> {
        if !values.contains(&place.root) {
            let Some(ty) = place.root.declared_type() else {
                return static_error(format!("`{}` cannot be written to", place.root.name));
            };
            values.insert(
                &place.root,
                SymbolicValue::create(ty, self.reference_map, Initial::Unknown),
            );
        }

        let Some(mut current) = values.get_mut(&place.root) else {
            return Err(CompilerBug::Internal(format!("`{}` has no value", place.root.name)).into());
        };

        for projection in place.projections.iter() {
            current = match (current, projection) {
                (SymbolicValue::Struct(fields), Projection::Field(field)) => {
                    match fields.get_mut(*field) {
                        Some(value) => value,
                        None => return static_error(format!("no field `{field}`")),
                    }
                }
                (SymbolicValue::Header(header), Projection::Field(field)) => {
                    if header.is_known_invalid() {
                        return static_error(format!(
                            "writing field `{field}` of invalid header `{}`",
                            header.fields.type_name
                        ));
                    }
                    match header.fields.get_mut(*field) {
                        Some(value) => value,
                        None => return static_error(format!("no field `{field}`")),
                    }
                }
                (SymbolicValue::Stack(stack), Projection::Index(position)) => {
                    match stack.elements.get_mut(*position) {
                        Some(element) => element,
                        None => return exception(StandardException::StackOutOfBounds),
                    }
                }
                (stack, Projection::AnyIndex) if matches!(stack, SymbolicValue::Stack(_)) => {
                    stack.set_unknown();
                    return Ok(());
                }
                (value, _) => {
                    return static_error(format!("cannot write into {value}"));
                }
            };
        }

        update(current)
    }

    fn call(&mut self, call: &Rc<Expression>, values: &mut ValueMap) -> Eval<SymbolicValue> {
        let instance = match MethodInstance::resolve(call, self.reference_map, self.type_map) {
            Ok(instance) => instance,
            Err(ResolutionError::Bug(bug)) => return Err(bug.into()),
            Err(ResolutionError::Binding(error)) => return static_error(error.to_string()),
        };

        match &instance.kind {
            MethodKind::BuiltIn { method, base } => self.built_in(*method, base, &instance, values),
            MethodKind::ExternMethod {
                object: Some(object),
                extern_type,
                method,
            } if extern_type.name.symbol == "packet_in" => {
                self.packet_in(object, method.name(), &instance, values)
            }
            _ => self.opaque_call(&instance, values),
        }
    }

    fn built_in(
        &mut self,
        method: BuiltInMethod,
        base: &Rc<Expression>,
        instance: &MethodInstance,
        values: &mut ValueMap,
    ) -> Eval<SymbolicValue> {
        match method {
            BuiltInMethod::IsValid => Ok(match self.rvalue(base, values)? {
                SymbolicValue::Header(header) => SymbolicValue::Bool(header.valid),
                _ => SymbolicValue::Bool(Abstract::Unknown),
            }),
            BuiltInMethod::SetValid | BuiltInMethod::SetInvalid => {
                let valid = method == BuiltInMethod::SetValid;
                let place = self.place(base, values)?;
                self.write(&place, values, |value| {
                    if let SymbolicValue::Header(header) = value {
                        header.set_valid(valid);
                    }
                    Ok(())
                })?;
                Ok(SymbolicValue::Void)
            }
            BuiltInMethod::PushFront | BuiltInMethod::PopFront => {
                let count = match instance.substitution().lookup_by_name(Symbol::new("count")) {
                    Some(argument) => self
                        .rvalue(&argument.expression, values)?
                        .as_literal()
                        .and_then(|literal| literal.as_integer()),
                    None => None,
                };
                let place = self.place(base, values)?;
                self.write(&place, values, |value| {
                    match (value, count) {
                        (SymbolicValue::Stack(stack), Some(count)) => {
                            let count = i64::try_from(count).unwrap_or(i64::MAX);
                            stack.shift(if method == BuiltInMethod::PushFront {
                                count
                            } else {
                                -count
                            });
                        }
                        (value, _) => value.set_unknown(),
                    }
                    Ok(())
                })?;
                Ok(SymbolicValue::Void)
            }
        }
    }

    fn packet_in(
        &mut self,
        packet: &Rc<Declaration>,
        method: &str,
        instance: &MethodInstance,
        values: &mut ValueMap,
    ) -> Eval<SymbolicValue> {
        let arguments = instance.arguments_by_direction();

        let consumed = match method {
            "extract" => {
                let Some((_, header)) = arguments.first() else {
                    return static_error("extract needs a header argument");
                };
                let Some(ty) = self.type_map.type_of(&header.expression, self.reference_map) else {
                    return static_error(format!("cannot determine the type of `{}`", header.expression));
                };
                if !is_header(&ty, self.reference_map) {
                    return static_error(format!("extract expects a header, found `{ty}`"));
                }

                let fields = type_declaration(&ty, self.reference_map)
                    .and_then(|declaration| declaration.fields())
                    .cloned()
                    .unwrap_or_else(|| Rc::from(Vec::new()));
                let variable_sized = fields
                    .iter()
                    .any(|field| matches!(field.ty.kind, TypeKind::Varbits { .. }));
                let fixed_width = fields
                    .iter()
                    .filter_map(|field| width_of(&field.ty, self.reference_map))
                    .map(u64::from)
                    .sum::<u64>();

                let consumed = match (arguments.get(1), variable_sized) {
                    (None, false) => Some(fixed_width),
                    (None, true) => {
                        return static_error(format!(
                            "`{ty}` has a varbit field; extracting it needs a size argument"
                        ))
                    }
                    (Some(_), false) => {
                        return static_error(format!(
                            "`{ty}` is a fixed-width header; extract takes no size argument"
                        ))
                    }
                    (Some((_, size)), true) => self
                        .rvalue(&size.expression, values)?
                        .as_literal()
                        .and_then(|literal| literal.as_integer())
                        .and_then(|size| u64::try_from(size).ok())
                        .map(|size| fixed_width + size),
                };

                if let SymbolicValue::Header(current) = self.rvalue(&header.expression, values)? {
                    if current.is_known_valid() {
                        return exception(StandardException::OverwritingHeader);
                    }
                }

                let place = self.place(&header.expression, values)?;
                self.write(&place, values, |value| {
                    if let SymbolicValue::Header(header) = value {
                        header.set_valid(true);
                    }
                    Ok(())
                })?;
                consumed
            }
            "advance" => match arguments.first() {
                Some((_, bits)) => self
                    .rvalue(&bits.expression, values)?
                    .as_literal()
                    .and_then(|literal| literal.as_integer())
                    .and_then(|bits| u64::try_from(bits).ok()),
                None => None,
            },
            "lookahead" => {
                return check(SymbolicValue::create(
                    instance.return_type(),
                    self.reference_map,
                    Initial::Unknown,
                ))
            }
            _ => return self.opaque_call(instance, values),
        };

        match values.get_mut(packet) {
            Some(SymbolicValue::PacketIn(cursor)) => cursor.advance(consumed),
            _ => {
                let mut cursor = SymbolicPacketIn::default();
                cursor.advance(consumed);
                cursor.conservative = true;
                values.insert(packet, SymbolicValue::PacketIn(cursor));
            }
        }
        Ok(SymbolicValue::Void)
    }

    /// A call whose body is not analyzed: arguments are read, then whatever
    /// the callee may write is forgotten. Actions and applied blocks may also
    /// write anything in scope.
    fn opaque_call(&mut self, instance: &MethodInstance, values: &mut ValueMap) -> Eval<SymbolicValue> {
        let arguments = instance.arguments_by_direction();

        for (direction, argument) in arguments.iter() {
            if direction.is_read() {
                self.rvalue(&argument.expression, values)?;
            }
        }

        if matches!(
            instance.kind,
            MethodKind::ActionCall { .. } | MethodKind::Apply { .. }
        ) {
            values.set_unknown();
        }

        for (direction, argument) in arguments.iter() {
            if direction.is_written() {
                let place = self.place(&argument.expression, values)?;
                self.write(&place, values, |value| {
                    value.set_unknown();
                    Ok(())
                })?;
            }
        }

        check(SymbolicValue::create(
            instance.return_type(),
            self.reference_map,
            Initial::Unknown,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{build::*, prelude, Program},
        middle::{
            pass::{CompilationContext, Pass},
            resolve::ResolveReferences,
        },
    };
    use pretty_assertions::assert_eq;

    fn compile(declarations: Vec<Rc<Declaration>>) -> CompilationContext {
        let mut all = prelude::standard_prelude();
        all.extend(declarations);
        let mut context = CompilationContext::default();
        ResolveReferences
            .run(Program::new(all), &mut context)
            .unwrap();
        assert!(context.diagnostics.is_empty(), "{:?}", context.diagnostics);
        context
    }

    /// Runs `body` inside a control with a header `h`, a byte `x` and a
    /// packet `pkt`, starting from `x` unknown and `h` invalid
    fn run(body: Vec<Rc<Statement>>) -> (ValueMap, Vec<Issue>, Rc<Declaration>) {
        let parameters = vec![
            parameter(Direction::None, "pkt", named_type("packet_in")),
            parameter(Direction::In, "x", bits(8)),
        ];
        let h = variable("h", named_type("h_t"), None);
        let y = variable("y", bits(8), None);
        let c = control(
            "c",
            parameters.clone(),
            vec![h.clone(), y.clone()],
            body.clone(),
        );

        let mut context = compile(vec![
            header("h_t", vec![("f", bits(8)), ("g", bits(8))]),
            c.clone(),
        ]);

        let mut evaluator = SymbolicEvaluator::new(&context.reference_map, &mut context.type_map);
        let mut values = ValueMap::new();
        evaluator.bind_parameters(&parameters, &mut values);
        evaluator.declare(&h, &mut values).unwrap();
        evaluator.declare(&y, &mut values).unwrap();
        evaluator.execute_block(&block(body), &mut values).unwrap();

        let issues = evaluator.take_issues();
        (values, issues, y)
    }

    #[test]
    fn constants_flow_through_assignments_and_branches() {
        let (values, issues, y) = run(vec![
            assign(path("y"), sized(3, 8)),
            if_statement(
                binary(BinaryOperatorKind::Equals, path("y"), sized(3, 8)),
                assign(path("y"), binary(BinaryOperatorKind::Add, path("y"), sized(1, 8))),
                Some(assign(path("y"), sized(9, 8))),
            ),
        ]);

        assert!(issues.is_empty(), "{issues:?}");
        assert_eq!(values.get(&y).unwrap().to_string(), "8w4");
    }

    #[test]
    fn unknown_conditions_merge_both_branches() {
        let (values, _, y) = run(vec![
            assign(path("y"), sized(3, 8)),
            if_statement(
                binary(BinaryOperatorKind::Equals, path("x"), sized(0, 8)),
                assign(path("y"), sized(4, 8)),
                None,
            ),
        ]);
        assert_eq!(values.get(&y).unwrap().to_string(), "?");

        let (values, _, y) = run(vec![
            assign(path("y"), sized(3, 8)),
            if_statement(
                binary(BinaryOperatorKind::Equals, path("x"), sized(0, 8)),
                exit_statement(),
                None,
            ),
        ]);
        // The branch that changes nothing is the only one that continues
        assert_eq!(values.get(&y).unwrap().to_string(), "8w3");
    }

    #[test]
    fn uninitialized_reads_fail() {
        let (_, issues, _) = run(vec![assign(
            path("y"),
            binary(BinaryOperatorKind::Add, path("y"), sized(1, 8)),
        )]);

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].message(), "`y + 8w1` reads an uninitialized value");
    }

    #[test]
    fn header_validity_gates_field_access() {
        let (_, issues, _) = run(vec![assign(path("y"), member(path("h"), "f"))]);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message().contains("invalid header"));

        let (values, issues, y) = run(vec![
            call_statement(method_call(path("h"), "setValid", Vec::new())),
            assign(member(path("h"), "f"), sized(7, 8)),
            assign(path("y"), member(path("h"), "f")),
        ]);
        assert!(issues.is_empty(), "{issues:?}");
        assert_eq!(values.get(&y).unwrap().to_string(), "8w7");
    }

    #[test]
    fn extracting_a_valid_header_raises() {
        let (values, issues, _) = run(vec![
            call_statement(method_call(path("pkt"), "extract", vec![path("h")])),
            call_statement(method_call(path("pkt"), "extract", vec![path("h")])),
        ]);

        assert_eq!(issues.len(), 1);
        assert!(issues[0].is_exception());
        assert_eq!(issues[0].message(), "overwriting already-valid header");

        // Only the first extract went through
        let cursor = values
            .values
            .values()
            .find_map(|value| match value {
                SymbolicValue::PacketIn(cursor) => Some(*cursor),
                _ => None,
            })
            .unwrap();
        assert_eq!(cursor.minimum_offset, 16);
        assert!(!cursor.conservative);
    }

    #[test]
    fn folding_errors_become_issues() {
        let (_, issues, _) = run(vec![assign(
            path("y"),
            binary(BinaryOperatorKind::Divide, sized(1, 8), sized(0, 8)),
        )]);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].message(), "division by zero");
    }
}
