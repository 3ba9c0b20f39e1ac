//! Binding formal parameters to the arguments of a call or instantiation, and
//! type variables to the concrete types a use site supplies.

use std::rc::Rc;

use hashbrown::HashMap;
use thiserror::Error;

use super::reference_map::ReferenceMap;
use crate::{
    diagnostics::CompilerBug,
    ir::{
        transform::{transform_expression, transform_type, Transform, TransformContext},
        Argument, Declaration, Expression, NodeId, Symbol, Type, TypeKind,
    },
};

/// Parameters carrying this annotation may be left without an argument
pub const OPTIONAL_ANNOTATION: &str = "optional";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubstitutionError {
    #[error("too many arguments: expected at most {expected}, found {found}")]
    TooManyArguments { expected: usize, found: usize },
    #[error("positional argument {position} follows a named argument")]
    PositionalAfterNamed { position: usize },
    #[error("no parameter named `{0}`")]
    UnknownParameter(Symbol),
    #[error("parameter `{0}` is bound more than once")]
    DuplicateArgument(Symbol),
    #[error("no argument for parameter `{0}`")]
    MissingArgument(Symbol),
    #[error("no constructor of `{name}` accepts {arity} argument(s)")]
    NoMatchingConstructor { name: Symbol, arity: usize },
}

/// Formal parameters, in declaration order, and the argument bound to each.
/// Parameters are identified by their declaration's id, so the same
/// substitution serves a signature before and after its type variables were
/// replaced.
#[derive(Debug, Clone, Default)]
pub struct ParameterSubstitution {
    parameters: Vec<Rc<Declaration>>,
    bindings: HashMap<NodeId, Rc<Argument>>,
}

impl ParameterSubstitution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches `arguments` against `parameters`, positionally until the first
    /// named argument and by name afterwards. A parameter left without an
    /// argument is fine when it has a default value (filled in later by
    /// `DefaultArguments`) or is `@optional`; otherwise it is an error.
    pub fn populate(
        parameters: &[Rc<Declaration>],
        arguments: &[Rc<Argument>],
    ) -> Result<Self, SubstitutionError> {
        let mut substitution = Self {
            parameters: parameters.to_vec(),
            bindings: HashMap::new(),
        };

        let mut seen_named = false;
        for (position, argument) in arguments.iter().enumerate() {
            let parameter = match &argument.name {
                Some(name) => {
                    seen_named = true;
                    parameters
                        .iter()
                        .find(|p| p.name.symbol == name.symbol)
                        .ok_or(SubstitutionError::UnknownParameter(name.symbol))?
                }
                None if seen_named => {
                    return Err(SubstitutionError::PositionalAfterNamed { position })
                }
                None => parameters
                    .get(position)
                    .ok_or(SubstitutionError::TooManyArguments {
                        expected: parameters.len(),
                        found: arguments.len(),
                    })?,
            };

            if substitution
                .bindings
                .insert(parameter.id, argument.clone())
                .is_some()
            {
                return Err(SubstitutionError::DuplicateArgument(parameter.name.symbol));
            }
        }

        for parameter in parameters {
            if !substitution.bindings.contains_key(&parameter.id) && is_required(parameter) {
                return Err(SubstitutionError::MissingArgument(parameter.name.symbol));
            }
        }

        Ok(substitution)
    }

    pub fn lookup(&self, parameter: &Declaration) -> Option<&Rc<Argument>> {
        self.bindings.get(&parameter.id)
    }

    pub fn lookup_by_name(&self, name: Symbol) -> Option<&Rc<Argument>> {
        let parameter = self.parameters.iter().find(|p| p.name.symbol == name)?;
        self.lookup(parameter)
    }

    pub fn contains(&self, parameter: &Declaration) -> bool {
        self.bindings.contains_key(&parameter.id)
    }

    pub fn parameters_in_order(&self) -> impl Iterator<Item = &Rc<Declaration>> {
        self.parameters.iter()
    }

    /// Every parameter with the argument bound to it, if any, in order
    pub fn bindings(&self) -> impl Iterator<Item = (&Rc<Declaration>, Option<&Rc<Argument>>)> {
        self.parameters
            .iter()
            .map(|parameter| (parameter, self.bindings.get(&parameter.id)))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// A parameter that must receive an argument at every call
pub fn is_required(parameter: &Declaration) -> bool {
    !parameter.has_annotation(OPTIONAL_ANNOTATION) && default_value(parameter).is_none()
}

pub fn default_value(parameter: &Declaration) -> Option<&Rc<Expression>> {
    match &parameter.kind {
        crate::ir::DeclarationKind::Parameter { default_value, .. } => default_value.as_ref(),
        _ => None,
    }
}

/// Type variable declarations, by id, mapped to the types bound to them
#[derive(Debug, Clone, Default)]
pub struct TypeVariableSubstitution {
    bindings: HashMap<NodeId, Rc<Type>>,
}

impl TypeVariableSubstitution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `variables` to `arguments` pairwise. Missing arguments leave the
    /// remaining variables unbound.
    pub fn from_arguments(variables: &[Rc<Declaration>], arguments: &[Rc<Type>]) -> Self {
        let mut substitution = Self::new();
        for (variable, argument) in variables.iter().zip(arguments) {
            substitution.bind(variable, argument.clone());
        }
        substitution
    }

    /// Returns false when `variable` was already bound
    pub fn bind(&mut self, variable: &Declaration, ty: Rc<Type>) -> bool {
        if self.bindings.contains_key(&variable.id) {
            return false;
        }
        self.bindings.insert(variable.id, ty);
        true
    }

    pub fn lookup(&self, variable: &Declaration) -> Option<&Rc<Type>> {
        self.bindings.get(&variable.id)
    }

    pub fn is_bound(&self, variable: &Declaration) -> bool {
        self.bindings.contains_key(&variable.id)
    }

    pub fn extend(&mut self, other: &TypeVariableSubstitution) {
        for (id, ty) in other.bindings.iter() {
            self.bindings.entry(*id).or_insert_with(|| ty.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// `ty` with every bound type variable replaced
    pub fn apply_to_type(
        &self,
        ty: &Rc<Type>,
        reference_map: &ReferenceMap,
    ) -> Result<Rc<Type>, CompilerBug> {
        if self.is_empty() {
            return Ok(ty.clone());
        }
        transform_type(
            &mut SubstituteTypeVariables {
                substitution: self,
                reference_map,
            },
            ty,
        )
    }

    /// `expression` with every bound type variable inside it replaced, e.g. in
    /// the casts of a default argument value
    pub fn apply_to_expression(
        &self,
        expression: &Rc<Expression>,
        reference_map: &ReferenceMap,
    ) -> Result<Rc<Expression>, CompilerBug> {
        if self.is_empty() {
            return Ok(expression.clone());
        }
        transform_expression(
            &mut SubstituteTypeVariables {
                substitution: self,
                reference_map,
            },
            expression,
        )
    }

    /// A copy of `parameter` whose type has the bound variables replaced. The
    /// copy keeps the parameter's id.
    pub fn apply_to_parameter(
        &self,
        parameter: &Rc<Declaration>,
        reference_map: &ReferenceMap,
    ) -> Result<Rc<Declaration>, CompilerBug> {
        let crate::ir::DeclarationKind::Parameter {
            direction,
            ty,
            default_value,
        } = &parameter.kind
        else {
            return Ok(parameter.clone());
        };

        let substituted = self.apply_to_type(ty, reference_map)?;
        if Rc::ptr_eq(&substituted, ty) {
            return Ok(parameter.clone());
        }

        Ok(parameter.with_kind(crate::ir::DeclarationKind::Parameter {
            direction: *direction,
            ty: substituted,
            default_value: default_value.clone(),
        }))
    }
}

struct SubstituteTypeVariables<'a> {
    substitution: &'a TypeVariableSubstitution,
    reference_map: &'a ReferenceMap,
}

impl Transform for SubstituteTypeVariables<'_> {
    fn postorder_type(&mut self, ty: Rc<Type>, _context: &mut TransformContext) -> Rc<Type> {
        let TypeKind::Name(path) = &ty.kind else {
            return ty;
        };

        self.reference_map
            .get_declaration(path)
            .and_then(|declaration| self.substitution.lookup(declaration))
            .cloned()
            .unwrap_or(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{build::*, print::render_type, Direction, TypeKind};

    fn parameters() -> Vec<Rc<Declaration>> {
        vec![
            parameter(Direction::In, "a", bits(8)),
            parameter(Direction::In, "b", bits(8)),
            parameter_with_default(Direction::In, "c", bits(2), sized(0, 2)),
            annotated(&parameter(Direction::Out, "d", bits(8)), OPTIONAL_ANNOTATION),
        ]
    }

    #[test]
    fn positional_then_named() {
        let parameters = parameters();
        let arguments = vec![
            Argument::positional(int(1)),
            Argument::named("b", int(2)),
        ];

        let substitution = ParameterSubstitution::populate(&parameters, &arguments).unwrap();

        assert!(Rc::ptr_eq(
            substitution.lookup(&parameters[0]).unwrap(),
            &arguments[0]
        ));
        assert!(Rc::ptr_eq(
            substitution.lookup_by_name(Symbol::new("b")).unwrap(),
            &arguments[1]
        ));
        // Defaulted and optional parameters stay unbound
        assert!(!substitution.contains(&parameters[2]));
        assert!(!substitution.contains(&parameters[3]));
        assert_eq!(substitution.parameters_in_order().count(), 4);
    }

    #[test]
    fn binding_errors() {
        let parameters = parameters();

        assert_eq!(
            ParameterSubstitution::populate(&parameters, &[Argument::positional(int(1))])
                .unwrap_err(),
            SubstitutionError::MissingArgument(Symbol::new("b"))
        );
        assert_eq!(
            ParameterSubstitution::populate(
                &parameters,
                &[Argument::named("a", int(1)), Argument::positional(int(2))]
            )
            .unwrap_err(),
            SubstitutionError::PositionalAfterNamed { position: 1 }
        );
        assert_eq!(
            ParameterSubstitution::populate(
                &parameters,
                &[Argument::positional(int(1)), Argument::named("a", int(2))]
            )
            .unwrap_err(),
            SubstitutionError::DuplicateArgument(Symbol::new("a"))
        );
        assert_eq!(
            ParameterSubstitution::populate(
                &parameters,
                &[Argument::named("z", int(1))]
            )
            .unwrap_err(),
            SubstitutionError::UnknownParameter(Symbol::new("z"))
        );
        assert!(matches!(
            ParameterSubstitution::populate(
                &parameters,
                &(0..5).map(|i| Argument::positional(int(i))).collect::<Vec<_>>()
            ),
            Err(SubstitutionError::TooManyArguments {
                expected: 4,
                found: 5
            })
        ));
    }

    #[test]
    fn type_variables_are_replaced_inside_types() {
        let variable = type_variable("T");
        let ty = stack_type(named_type("T"), 4);
        let TypeKind::Stack { element, .. } = &ty.kind else {
            unreachable!()
        };
        let TypeKind::Name(path) = &element.kind else {
            unreachable!()
        };

        let mut reference_map = ReferenceMap::new();
        reference_map.set_declaration(path, &variable).unwrap();

        let substitution = TypeVariableSubstitution::from_arguments(&[variable], &[bits(16)]);
        let substituted = substitution.apply_to_type(&ty, &reference_map).unwrap();

        assert_eq!(render_type(&substituted, false), "bit<16>[4]");
        assert_eq!(substituted.id, ty.id);

        let unrelated = bits(8);
        assert!(Rc::ptr_eq(
            &substitution.apply_to_type(&unrelated, &reference_map).unwrap(),
            &unrelated
        ));
    }
}
