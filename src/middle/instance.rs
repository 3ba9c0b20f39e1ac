//! Classification of calls, constructor calls and instance declarations.
//!
//! Every call in a resolved, typed program is exactly one kind of
//! [`MethodInstance`]; a call that fits none of them means an earlier pass
//! produced something it should not have, and is reported as a compiler bug.
//! Each classification carries the callee's formal parameters, before and
//! after type variable substitution, and the binding of those parameters to
//! the call's arguments.

use std::{rc::Rc, str::FromStr};

use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

use super::{
    reference_map::ReferenceMap,
    substitution::{ParameterSubstitution, SubstitutionError, TypeVariableSubstitution},
    type_map::{type_arguments, type_declaration, TypeMap},
};
use crate::{
    diagnostics::CompilerBug,
    ir::{
        build, Argument, Declaration, DeclarationKind, Direction, Expression, ExpressionKind,
        Type, TypeKind,
    },
};

pub const APPLY_METHOD: &str = "apply";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error(transparent)]
    Bug(#[from] CompilerBug),
    #[error(transparent)]
    Binding(#[from] SubstitutionError),
}

/// Methods every header, header union and header stack has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum BuiltInMethod {
    #[strum(serialize = "setValid")]
    SetValid,
    #[strum(serialize = "setInvalid")]
    SetInvalid,
    #[strum(serialize = "isValid")]
    IsValid,
    #[strum(serialize = "push_front")]
    PushFront,
    #[strum(serialize = "pop_front")]
    PopFront,
}

impl BuiltInMethod {
    fn applies_to(self, ty: &Type, declaration: Option<&Rc<Declaration>>) -> bool {
        match self {
            BuiltInMethod::PushFront | BuiltInMethod::PopFront => {
                matches!(ty.kind, TypeKind::Stack { .. })
            }
            _ => matches!(
                declaration.map(|d| &d.kind),
                Some(DeclarationKind::Header { .. } | DeclarationKind::HeaderUnion { .. })
            ),
        }
    }

    fn parameters(self) -> Vec<Rc<Declaration>> {
        match self {
            BuiltInMethod::PushFront | BuiltInMethod::PopFront => {
                vec![build::parameter(Direction::In, "count", build::bits(32))]
            }
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum MethodKind {
    /// `t.apply()` on a table, or `apply` on a control or parser
    Apply {
        /// The declaration the call's target names: the table, or the
        /// control/parser instance or parameter
        object: Rc<Declaration>,
        /// The table, control or parser being applied
        applied: Rc<Declaration>,
    },
    ExternMethod {
        /// The instance or parameter the method is called on, when the target
        /// names one
        object: Option<Rc<Declaration>>,
        extern_type: Rc<Declaration>,
        method: Rc<Declaration>,
    },
    ExternFunction {
        method: Rc<Declaration>,
    },
    ActionCall {
        action: Rc<Declaration>,
    },
    FunctionCall {
        function: Rc<Declaration>,
    },
    BuiltIn {
        method: BuiltInMethod,
        /// The header or stack the method is called on
        base: Rc<Expression>,
    },
}

#[derive(Debug, Clone)]
pub struct MethodInstance {
    pub call: Rc<Expression>,
    pub kind: MethodKind,
    original_parameters: Rc<[Rc<Declaration>]>,
    actual_parameters: Rc<[Rc<Declaration>]>,
    return_type: Rc<Type>,
    substitution: ParameterSubstitution,
    type_substitution: TypeVariableSubstitution,
}

impl MethodInstance {
    pub fn resolve(
        call: &Rc<Expression>,
        reference_map: &ReferenceMap,
        type_map: &mut TypeMap,
    ) -> Result<Self, ResolutionError> {
        let ExpressionKind::MethodCall {
            target,
            type_arguments: explicit_type_arguments,
            arguments,
        } = &call.kind
        else {
            return Err(unclassified(call).into());
        };

        match &target.kind {
            ExpressionKind::Member { base, member } => {
                let base_type = type_map.type_of(base, reference_map);
                let base_declaration = base_type
                    .as_ref()
                    .and_then(|ty| type_declaration(ty, reference_map))
                    .cloned();
                let object = base
                    .as_path()
                    .and_then(|path| reference_map.get_declaration(path))
                    .cloned();

                if let (Ok(method), Some(ty)) =
                    (BuiltInMethod::from_str(member.name()), base_type.as_ref())
                {
                    if method.applies_to(ty, base_declaration.as_ref()) {
                        let parameters: Rc<[Rc<Declaration>]> = method.parameters().into();
                        let return_type = match method {
                            BuiltInMethod::IsValid => build::bool_type(),
                            _ => build::void_type(),
                        };
                        return Ok(Self {
                            call: call.clone(),
                            kind: MethodKind::BuiltIn {
                                method,
                                base: base.clone(),
                            },
                            substitution: ParameterSubstitution::populate(
                                &parameters,
                                arguments,
                            )?,
                            original_parameters: parameters.clone(),
                            actual_parameters: parameters,
                            return_type,
                            type_substitution: TypeVariableSubstitution::new(),
                        });
                    }
                }

                if member.symbol == APPLY_METHOD {
                    let applied = match (&object, &base_declaration) {
                        (Some(object), _)
                            if matches!(
                                object.kind,
                                DeclarationKind::Table { .. }
                                    | DeclarationKind::Control { .. }
                                    | DeclarationKind::Parser { .. }
                            ) =>
                        {
                            Some(object.clone())
                        }
                        (_, Some(declaration))
                            if matches!(
                                declaration.kind,
                                DeclarationKind::Control { .. } | DeclarationKind::Parser { .. }
                            ) =>
                        {
                            Some(declaration.clone())
                        }
                        _ => None,
                    };

                    if let (Some(object), Some(applied)) = (object.clone(), applied) {
                        let parameters = match &applied.kind {
                            DeclarationKind::Control {
                                apply_parameters, ..
                            }
                            | DeclarationKind::Parser {
                                apply_parameters, ..
                            } => apply_parameters.clone(),
                            _ => Rc::from(Vec::new()),
                        };
                        return Ok(Self {
                            call: call.clone(),
                            kind: MethodKind::Apply { object, applied },
                            substitution: ParameterSubstitution::populate(
                                &parameters,
                                arguments,
                            )?,
                            original_parameters: parameters.clone(),
                            actual_parameters: parameters,
                            return_type: build::void_type(),
                            type_substitution: TypeVariableSubstitution::new(),
                        });
                    }
                }

                if let Some(extern_type) = base_declaration.filter(|d| {
                    matches!(d.kind, DeclarationKind::Extern { .. })
                }) {
                    let DeclarationKind::Extern {
                        type_parameters, ..
                    } = &extern_type.kind
                    else {
                        return Err(unclassified(call).into());
                    };

                    let method = lookup_method(&extern_type, member.name(), arguments)?;
                    let mut type_substitution = base_type
                        .as_ref()
                        .map(|ty| {
                            TypeVariableSubstitution::from_arguments(
                                type_parameters,
                                type_arguments(ty),
                            )
                        })
                        .unwrap_or_default();

                    return Self::with_signature(
                        call,
                        MethodKind::ExternMethod {
                            object,
                            extern_type: extern_type.clone(),
                            method: method.clone(),
                        },
                        &method,
                        explicit_type_arguments,
                        arguments,
                        &mut type_substitution,
                        reference_map,
                        type_map,
                    );
                }

                Err(unclassified(call).into())
            }
            ExpressionKind::Path(path) => {
                let declaration = reference_map.require_declaration(path)?.clone();
                match &declaration.kind {
                    // Actions are never generic
                    DeclarationKind::Action { parameters, .. } => Ok(Self {
                        call: call.clone(),
                        kind: MethodKind::ActionCall {
                            action: declaration.clone(),
                        },
                        substitution: ParameterSubstitution::populate(parameters, arguments)?,
                        original_parameters: parameters.clone(),
                        actual_parameters: parameters.clone(),
                        return_type: build::void_type(),
                        type_substitution: TypeVariableSubstitution::new(),
                    }),
                    DeclarationKind::Function { .. } => Self::with_signature(
                        call,
                        MethodKind::FunctionCall {
                            function: declaration.clone(),
                        },
                        &declaration,
                        explicit_type_arguments,
                        arguments,
                        &mut TypeVariableSubstitution::new(),
                        reference_map,
                        type_map,
                    ),
                    DeclarationKind::Method { .. } => Self::with_signature(
                        call,
                        MethodKind::ExternFunction {
                            method: declaration.clone(),
                        },
                        &declaration,
                        explicit_type_arguments,
                        arguments,
                        &mut TypeVariableSubstitution::new(),
                        reference_map,
                        type_map,
                    ),
                    _ => Err(unclassified(call).into()),
                }
            }
            _ => Err(unclassified(call).into()),
        }
    }

    /// Builds an instance for a callee with a signature, binding its type
    /// variables from explicit type arguments first and from the types of
    /// the arguments second
    #[allow(clippy::too_many_arguments)]
    fn with_signature(
        call: &Rc<Expression>,
        kind: MethodKind,
        callee: &Rc<Declaration>,
        explicit_type_arguments: &[Rc<Type>],
        arguments: &[Rc<Argument>],
        type_substitution: &mut TypeVariableSubstitution,
        reference_map: &ReferenceMap,
        type_map: &mut TypeMap,
    ) -> Result<Self, ResolutionError> {
        let signature = match &callee.kind {
            DeclarationKind::Method { signature, .. }
            | DeclarationKind::Function { signature, .. } => signature.clone(),
            _ => return Err(unclassified(call).into()),
        };

        let substitution = ParameterSubstitution::populate(&signature.parameters, arguments)?;

        type_substitution.extend(&TypeVariableSubstitution::from_arguments(
            &signature.type_parameters,
            explicit_type_arguments,
        ));

        for (parameter, argument) in substitution.bindings() {
            let (Some(argument), Some(TypeKind::Name(path))) =
                (argument, parameter.declared_type().map(|ty| &ty.kind))
            else {
                continue;
            };
            let Some(variable) = reference_map.get_declaration(path) else {
                continue;
            };
            if signature
                .type_parameters
                .iter()
                .any(|p| Rc::ptr_eq(p, variable))
                && !type_substitution.is_bound(variable)
            {
                if let Some(ty) = type_map.type_of(&argument.expression, reference_map) {
                    type_substitution.bind(variable, ty);
                }
            }
        }

        let actual_parameters = signature
            .parameters
            .iter()
            .map(|parameter| type_substitution.apply_to_parameter(parameter, reference_map))
            .collect::<Result<Vec<_>, _>>()?;
        let return_type = type_substitution.apply_to_type(&signature.return_type, reference_map)?;

        Ok(Self {
            call: call.clone(),
            kind,
            original_parameters: signature.parameters.clone(),
            actual_parameters: actual_parameters.into(),
            return_type,
            substitution,
            type_substitution: type_substitution.clone(),
        })
    }

    /// The callee's parameters as declared
    pub fn original_parameters(&self) -> &Rc<[Rc<Declaration>]> {
        &self.original_parameters
    }

    /// The callee's parameters with this call's type arguments substituted
    pub fn actual_parameters(&self) -> &Rc<[Rc<Declaration>]> {
        &self.actual_parameters
    }

    pub fn return_type(&self) -> &Rc<Type> {
        &self.return_type
    }

    pub fn substitution(&self) -> &ParameterSubstitution {
        &self.substitution
    }

    pub fn type_substitution(&self) -> &TypeVariableSubstitution {
        &self.type_substitution
    }

    pub fn built_in(&self) -> Option<BuiltInMethod> {
        match &self.kind {
            MethodKind::BuiltIn { method, .. } => Some(*method),
            _ => None,
        }
    }

    /// For an extern method, the extern's and the method's names
    pub fn extern_method_name(&self) -> Option<(&'static str, &'static str)> {
        match &self.kind {
            MethodKind::ExternMethod {
                extern_type,
                method,
                ..
            } => Some((extern_type.name(), method.name())),
            _ => None,
        }
    }

    pub fn is_apply(&self) -> bool {
        matches!(self.kind, MethodKind::Apply { .. })
    }

    /// The argument bound to each parameter, with the parameter's direction
    pub fn arguments_by_direction(&self) -> Vec<(Direction, Rc<Argument>)> {
        self.actual_parameters
            .iter()
            .filter_map(|parameter| {
                self.substitution
                    .lookup(parameter)
                    .map(|argument| (parameter.direction(), argument.clone()))
            })
            .collect()
    }
}

/// Picks the method called `name` whose parameters accept `arguments`
fn lookup_method(
    extern_type: &Rc<Declaration>,
    name: &str,
    arguments: &[Rc<Argument>],
) -> Result<Rc<Declaration>, ResolutionError> {
    let DeclarationKind::Extern { methods, .. } = &extern_type.kind else {
        return Err(CompilerBug::Internal(format!("`{}` is not an extern", extern_type.name)).into());
    };

    let candidates = methods
        .iter()
        .filter(|method| method.name.symbol == name)
        .collect::<Vec<_>>();

    let mut last_error = None;
    for candidate in candidates.iter() {
        let DeclarationKind::Method { signature, .. } = &candidate.kind else {
            continue;
        };
        match ParameterSubstitution::populate(&signature.parameters, arguments) {
            Ok(_) => return Ok((*candidate).clone()),
            Err(error) => last_error = Some(error),
        }
    }

    match last_error {
        Some(error) => Err(error.into()),
        None => Err(CompilerBug::Internal(format!(
            "extern `{}` has no method `{name}`",
            extern_type.name
        ))
        .into()),
    }
}

/// The constructor of `extern_type` accepting `arguments`. An extern without
/// any declared constructor is built without arguments.
pub fn lookup_constructor(
    extern_type: &Declaration,
    arguments: &[Rc<Argument>],
) -> Result<Option<Rc<Declaration>>, SubstitutionError> {
    let DeclarationKind::Extern { methods, .. } = &extern_type.kind else {
        return Ok(None);
    };

    let mut constructors = methods
        .iter()
        .filter(|method| method.name.symbol == extern_type.name.symbol)
        .peekable();

    if constructors.peek().is_none() && arguments.is_empty() {
        return Ok(None);
    }

    constructors
        .find(|constructor| match &constructor.kind {
            DeclarationKind::Method { signature, .. } => {
                ParameterSubstitution::populate(&signature.parameters, arguments).is_ok()
            }
            _ => false,
        })
        .cloned()
        .map(Some)
        .ok_or(SubstitutionError::NoMatchingConstructor {
            name: extern_type.name.symbol,
            arity: arguments.len(),
        })
}

fn unclassified(call: &Expression) -> CompilerBug {
    CompilerBug::UnclassifiedCall {
        call: call.to_string(),
    }
}

/// What a constructor call or instance declaration builds
#[derive(Debug, Clone)]
pub enum Constructed {
    Extern {
        extern_type: Rc<Declaration>,
        /// `None` for an extern without declared constructors
        constructor: Option<Rc<Declaration>>,
    },
    Parser(Rc<Declaration>),
    Control(Rc<Declaration>),
    Package(Rc<Declaration>),
}

impl Constructed {
    pub fn declaration(&self) -> &Rc<Declaration> {
        match self {
            Constructed::Extern { extern_type, .. } => extern_type,
            Constructed::Parser(declaration)
            | Constructed::Control(declaration)
            | Constructed::Package(declaration) => declaration,
        }
    }
}

/// The parts shared by constructor calls and instantiations
#[derive(Debug, Clone)]
pub struct Construction {
    pub constructed: Constructed,
    pub type_arguments: Rc<[Rc<Type>]>,
    pub type_parameters: Rc<[Rc<Declaration>]>,
    pub constructor_parameters: Rc<[Rc<Declaration>]>,
    pub substitution: ParameterSubstitution,
    pub type_substitution: TypeVariableSubstitution,
}

impl Construction {
    fn resolve(
        ty: &Rc<Type>,
        arguments: &[Rc<Argument>],
        reference_map: &ReferenceMap,
    ) -> Result<Self, ResolutionError> {
        let Some(declaration) = type_declaration(ty, reference_map).cloned() else {
            return Err(CompilerBug::Internal(format!("`{ty}` does not name a constructible type")).into());
        };
        let type_arguments: Rc<[Rc<Type>]> = type_arguments(ty).to_vec().into();

        let (constructed, type_parameters, parameters) = match &declaration.kind {
            DeclarationKind::Extern {
                type_parameters, ..
            } => {
                let constructor = lookup_constructor(&declaration, arguments)?;
                let parameters = match constructor.as_ref().map(|c| &c.kind) {
                    Some(DeclarationKind::Method { signature, .. }) => {
                        signature.parameters.clone()
                    }
                    _ => Rc::from(Vec::new()),
                };
                (
                    Constructed::Extern {
                        extern_type: declaration.clone(),
                        constructor,
                    },
                    type_parameters.clone(),
                    parameters,
                )
            }
            DeclarationKind::Parser {
                type_parameters,
                constructor_parameters,
                ..
            } => (
                Constructed::Parser(declaration.clone()),
                type_parameters.clone(),
                constructor_parameters.clone(),
            ),
            DeclarationKind::Control {
                type_parameters,
                constructor_parameters,
                ..
            } => (
                Constructed::Control(declaration.clone()),
                type_parameters.clone(),
                constructor_parameters.clone(),
            ),
            DeclarationKind::Package {
                type_parameters,
                constructor_parameters,
            } => (
                Constructed::Package(declaration.clone()),
                type_parameters.clone(),
                constructor_parameters.clone(),
            ),
            _ => {
                return Err(CompilerBug::Internal(format!(
                    "`{}` cannot be instantiated",
                    declaration.name
                ))
                .into())
            }
        };

        let type_substitution =
            TypeVariableSubstitution::from_arguments(&type_parameters, &type_arguments);
        let constructor_parameters = parameters
            .iter()
            .map(|parameter| type_substitution.apply_to_parameter(parameter, reference_map))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            substitution: ParameterSubstitution::populate(&constructor_parameters, arguments)?,
            constructed,
            type_arguments,
            type_parameters,
            constructor_parameters: constructor_parameters.into(),
            type_substitution,
        })
    }
}

/// A constructor call expression, `Register<bit<32>, bit<16>>(1024)`
#[derive(Debug, Clone)]
pub struct ConstructorCall {
    pub call: Rc<Expression>,
    pub construction: Construction,
}

impl ConstructorCall {
    pub fn resolve(
        call: &Rc<Expression>,
        reference_map: &ReferenceMap,
    ) -> Result<Self, ResolutionError> {
        let ExpressionKind::ConstructorCall { ty, arguments } = &call.kind else {
            return Err(CompilerBug::Internal(format!("`{call}` is not a constructor call")).into());
        };

        Ok(Self {
            call: call.clone(),
            construction: Construction::resolve(ty, arguments, reference_map)?,
        })
    }

    pub fn is_extern(&self) -> bool {
        matches!(self.construction.constructed, Constructed::Extern { .. })
    }

    /// Parser, control and package constructor calls
    pub fn is_container(&self) -> bool {
        !self.is_extern()
    }
}

/// An instance declaration, `Register<bit<32>, bit<16>>(1024) reg;`
#[derive(Debug, Clone)]
pub struct Instantiation {
    pub instance: Rc<Declaration>,
    pub construction: Construction,
}

impl Instantiation {
    pub fn resolve(
        instance: &Rc<Declaration>,
        reference_map: &ReferenceMap,
    ) -> Result<Self, ResolutionError> {
        let DeclarationKind::Instance { ty, arguments, .. } = &instance.kind else {
            return Err(CompilerBug::Internal(format!(
                "`{}` is not an instance declaration",
                instance.name
            ))
            .into());
        };

        Ok(Self {
            instance: instance.clone(),
            construction: Construction::resolve(ty, arguments, reference_map)?,
        })
    }

    pub fn constructed(&self) -> &Constructed {
        &self.construction.constructed
    }

    pub fn constructor_parameters(&self) -> &Rc<[Rc<Declaration>]> {
        &self.construction.constructor_parameters
    }

    pub fn type_arguments(&self) -> &Rc<[Rc<Type>]> {
        &self.construction.type_arguments
    }

    pub fn substitution(&self) -> &ParameterSubstitution {
        &self.construction.substitution
    }

    /// The extern type's name, for extern instances
    pub fn extern_name(&self) -> Option<&'static str> {
        match &self.construction.constructed {
            Constructed::Extern { extern_type, .. } => Some(extern_type.name()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{build::*, prelude, print::render_type, Program},
        middle::{
            pass::{CompilationContext, Pass},
            resolve::ResolveReferences,
        },
    };

    /// Resolves names in `declarations` compiled against the prelude
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

    fn resolve(call: &Rc<Expression>, context: &mut CompilationContext) -> MethodInstance {
        MethodInstance::resolve(call, &context.reference_map, &mut context.type_map).unwrap()
    }

    #[test]
    fn classifies_every_kind_of_call() {
        let ipv4 = header("ipv4_t", vec![("ttl", bits(8))]);
        let extract = method_call(path("pkt"), "extract", vec![path("h")]);
        let is_valid = method_call(path("h"), "isValid", Vec::new());
        let verify = call(path("verify"), vec![boolean(true), error_member("NoMatch")]);
        let drop = call(path("drop"), Vec::new());
        let apply = method_call(path("t"), "apply", Vec::new());

        let mut context = compile(vec![
            ipv4,
            action("drop", Vec::new(), Vec::new()),
            control(
                "c",
                vec![
                    parameter(Direction::None, "pkt", named_type("packet_in")),
                    parameter(Direction::InOut, "h", named_type("ipv4_t")),
                ],
                vec![table("t", Vec::new())],
                vec![
                    call_statement(extract.clone()),
                    if_statement(is_valid.clone(), call_statement(drop.clone()), None),
                    call_statement(verify.clone()),
                    call_statement(apply.clone()),
                ],
            ),
        ]);

        let extract = resolve(&extract, &mut context);
        assert_eq!(extract.extern_method_name(), Some(("packet_in", "extract")));
        // `T` of `extract<T>` is inferred from the argument
        assert_eq!(
            render_type(&extract.actual_parameters()[0].declared_type().unwrap(), false),
            "ipv4_t"
        );
        assert_eq!(
            render_type(&extract.original_parameters()[0].declared_type().unwrap(), false),
            "T"
        );

        let is_valid = resolve(&is_valid, &mut context);
        assert_eq!(is_valid.built_in(), Some(BuiltInMethod::IsValid));
        assert_eq!(render_type(is_valid.return_type(), false), "bool");

        assert!(matches!(
            resolve(&drop, &mut context).kind,
            MethodKind::ActionCall { .. }
        ));
        assert!(matches!(
            resolve(&verify, &mut context).kind,
            MethodKind::ExternFunction { .. }
        ));
        assert!(resolve(&apply, &mut context).is_apply());
    }

    #[test]
    fn extern_type_arguments_reach_method_signatures() {
        let read = method_call(path("reg"), "read", vec![path("x"), int(3)]);
        let mut context = compile(vec![control(
            "c",
            vec![parameter(Direction::InOut, "x", bits(32))],
            vec![instance(
                "reg",
                specialized_type("Register", vec![bits(32), bits(16)]),
                vec![sized(1024, 32)],
            )],
            vec![call_statement(read.clone())],
        )]);

        let read = resolve(&read, &mut context);
        let types = read
            .actual_parameters()
            .iter()
            .map(|p| render_type(p.declared_type().unwrap(), false))
            .collect::<Vec<_>>();
        assert_eq!(types, vec!["bit<32>", "bit<16>"]);
        assert_eq!(read.arguments_by_direction()[0].0, Direction::Out);
    }

    #[test]
    fn unknown_call_shapes_are_bugs() {
        let bogus = call(path("k"), Vec::new());
        let mut context = compile(vec![
            constant("k", bits(8), sized(1, 8)),
            control("c", Vec::new(), Vec::new(), vec![call_statement(bogus.clone())]),
        ]);

        assert!(matches!(
            MethodInstance::resolve(&bogus, &context.reference_map, &mut context.type_map),
            Err(ResolutionError::Bug(CompilerBug::UnclassifiedCall { .. }))
        ));

        let unresolved = call(path("nowhere"), Vec::new());
        assert!(matches!(
            MethodInstance::resolve(&unresolved, &context.reference_map, &mut context.type_map),
            Err(ResolutionError::Bug(CompilerBug::Unresolved { .. }))
        ));
    }

    #[test]
    fn instantiations_pick_the_constructor_by_arity() {
        let register = instance(
            "reg",
            specialized_type("Register", vec![bits(32), bits(16)]),
            vec![sized(1024, 32)],
        );
        let context = compile(vec![register.clone()]);

        let instantiation = Instantiation::resolve(&register, &context.reference_map).unwrap();
        assert_eq!(instantiation.extern_name(), Some("Register"));
        assert_eq!(instantiation.constructor_parameters().len(), 1);
        assert_eq!(instantiation.type_arguments().len(), 2);

        let Some(extern_type) = prelude::switch_architecture()
            .into_iter()
            .find(|declaration| declaration.name() == "Register")
        else {
            unreachable!()
        };
        assert_eq!(
            lookup_constructor(&extern_type, &[]).unwrap_err(),
            SubstitutionError::NoMatchingConstructor {
                name: extern_type.name.symbol,
                arity: 0
            }
        );
    }
}
