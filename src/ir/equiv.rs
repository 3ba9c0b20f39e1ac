//! Structural equivalence. Ordinary node comparison is by identity; these
//! functions are for passes that explicitly ask whether two different nodes
//! spell the same thing, ignoring ids and spans.

use std::rc::Rc;

use itertools::Itertools;

use super::{Argument, Expression, ExpressionKind, Statement, StatementKind, Type, TypeKind};

fn all_equivalent<T>(a: &[Rc<T>], b: &[Rc<T>], f: impl Fn(&T, &T) -> bool) -> bool {
    a.len() == b.len() && a.iter().zip_eq(b.iter()).all(|(x, y)| f(x, y))
}

fn option_equivalent<T>(a: &Option<Rc<T>>, b: &Option<Rc<T>>, f: impl Fn(&T, &T) -> bool) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => f(a, b),
        (None, None) => true,
        _ => false,
    }
}

pub fn equivalent_types(a: &Type, b: &Type) -> bool {
    match (&a.kind, &b.kind) {
        (TypeKind::Bool, TypeKind::Bool)
        | (TypeKind::Void, TypeKind::Void)
        | (TypeKind::Error, TypeKind::Error)
        | (TypeKind::String, TypeKind::String) => true,
        (
            TypeKind::Bits { width, signed },
            TypeKind::Bits {
                width: other_width,
                signed: other_signed,
            },
        ) => width == other_width && signed == other_signed,
        (TypeKind::Varbits { max_width }, TypeKind::Varbits { max_width: other }) => {
            max_width == other
        }
        (TypeKind::Name(a), TypeKind::Name(b)) => a.name.symbol == b.name.symbol,
        (
            TypeKind::Specialized { base, arguments },
            TypeKind::Specialized {
                base: other_base,
                arguments: other_arguments,
            },
        ) => {
            equivalent_types(base, other_base)
                && all_equivalent(arguments, other_arguments, equivalent_types)
        }
        (
            TypeKind::Stack { element, size },
            TypeKind::Stack {
                element: other_element,
                size: other_size,
            },
        ) => size == other_size && equivalent_types(element, other_element),
        (TypeKind::Tuple(a), TypeKind::Tuple(b)) => all_equivalent(a, b, equivalent_types),
        _ => false,
    }
}

fn equivalent_arguments(a: &Argument, b: &Argument) -> bool {
    a.name.map(|n| n.symbol) == b.name.map(|n| n.symbol)
        && equivalent_expressions(&a.expression, &b.expression)
}

pub fn equivalent_expressions(a: &Expression, b: &Expression) -> bool {
    use ExpressionKind as E;

    match (&a.kind, &b.kind) {
        (E::Literal(a), E::Literal(b)) => a == b,
        (E::Path(a), E::Path(b)) => a.name.symbol == b.name.symbol,
        (E::This, E::This) | (E::Default, E::Default) => true,
        (
            E::Member { base, member },
            E::Member {
                base: other_base,
                member: other_member,
            },
        ) => member.symbol == other_member.symbol && equivalent_expressions(base, other_base),
        (
            E::ArrayIndex { base, index },
            E::ArrayIndex {
                base: other_base,
                index: other_index,
            },
        ) => equivalent_expressions(base, other_base) && equivalent_expressions(index, other_index),
        (E::TypeName(a), E::TypeName(b)) => equivalent_types(a, b),
        (
            E::Binary { operator, lhs, rhs },
            E::Binary {
                operator: other_operator,
                lhs: other_lhs,
                rhs: other_rhs,
            },
        ) => {
            operator == other_operator
                && equivalent_expressions(lhs, other_lhs)
                && equivalent_expressions(rhs, other_rhs)
        }
        (
            E::Unary { operator, operand },
            E::Unary {
                operator: other_operator,
                operand: other_operand,
            },
        ) => operator == other_operator && equivalent_expressions(operand, other_operand),
        (
            E::Cast { ty, expression },
            E::Cast {
                ty: other_ty,
                expression: other_expression,
            },
        ) => equivalent_types(ty, other_ty) && equivalent_expressions(expression, other_expression),
        (
            E::MethodCall {
                target,
                type_arguments,
                arguments,
            },
            E::MethodCall {
                target: other_target,
                type_arguments: other_type_arguments,
                arguments: other_arguments,
            },
        ) => {
            equivalent_expressions(target, other_target)
                && all_equivalent(type_arguments, other_type_arguments, equivalent_types)
                && all_equivalent(arguments, other_arguments, equivalent_arguments)
        }
        (
            E::ConstructorCall { ty, arguments },
            E::ConstructorCall {
                ty: other_ty,
                arguments: other_arguments,
            },
        ) => {
            equivalent_types(ty, other_ty)
                && all_equivalent(arguments, other_arguments, equivalent_arguments)
        }
        (E::List(a), E::List(b)) => all_equivalent(a, b, equivalent_expressions),
        (E::StructLiteral(a), E::StructLiteral(b)) => {
            a.len() == b.len()
                && a.iter().zip_eq(b.iter()).all(|(x, y)| {
                    x.name.symbol == y.name.symbol
                        && equivalent_expressions(&x.expression, &y.expression)
                })
        }
        (
            E::Mux {
                condition,
                positive,
                negative,
            },
            E::Mux {
                condition: other_condition,
                positive: other_positive,
                negative: other_negative,
            },
        ) => {
            equivalent_expressions(condition, other_condition)
                && equivalent_expressions(positive, other_positive)
                && equivalent_expressions(negative, other_negative)
        }
        (
            E::Select { selectors, cases },
            E::Select {
                selectors: other_selectors,
                cases: other_cases,
            },
        ) => {
            all_equivalent(selectors, other_selectors, equivalent_expressions)
                && all_equivalent(cases, other_cases, |x, y| {
                    x.state.name.symbol == y.state.name.symbol
                        && equivalent_expressions(&x.keyset, &y.keyset)
                })
        }
        _ => false,
    }
}

pub fn equivalent_statements(a: &Statement, b: &Statement) -> bool {
    use StatementKind as S;

    match (&a.kind, &b.kind) {
        (
            S::Assignment { lhs, rhs },
            S::Assignment {
                lhs: other_lhs,
                rhs: other_rhs,
            },
        ) => equivalent_expressions(lhs, other_lhs) && equivalent_expressions(rhs, other_rhs),
        (S::MethodCall(a), S::MethodCall(b)) => equivalent_expressions(a, b),
        (
            S::If {
                condition,
                positive,
                negative,
            },
            S::If {
                condition: other_condition,
                positive: other_positive,
                negative: other_negative,
            },
        ) => {
            equivalent_expressions(condition, other_condition)
                && equivalent_statements(positive, other_positive)
                && option_equivalent(negative, other_negative, equivalent_statements)
        }
        (S::Block(a), S::Block(b)) => {
            all_equivalent(&a.statements, &b.statements, equivalent_statements)
        }
        (S::Return(a), S::Return(b)) => option_equivalent(a, b, equivalent_expressions),
        (S::Exit, S::Exit) | (S::Empty, S::Empty) => true,
        (S::Declaration(a), S::Declaration(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{build::*, BinaryOperatorKind};

    #[test]
    fn distinct_nodes_with_the_same_spelling_are_equivalent() {
        let a = binary(BinaryOperatorKind::Add, member(path("hdr"), "ttl"), int(1));
        let b = binary(BinaryOperatorKind::Add, member(path("hdr"), "ttl"), int(1));

        assert!(!Rc::ptr_eq(&a, &b));
        assert!(equivalent_expressions(&a, &b));
    }

    #[test]
    fn operator_and_operand_order_matter() {
        let a = binary(BinaryOperatorKind::Subtract, path("x"), path("y"));
        let b = binary(BinaryOperatorKind::Subtract, path("y"), path("x"));

        assert!(!equivalent_expressions(&a, &b));
    }

    #[test]
    fn types_compare_by_shape() {
        assert!(equivalent_types(&bits(8), &bits(8)));
        assert!(!equivalent_types(&bits(8), &signed_bits(8)));
        assert!(equivalent_types(
            &specialized_type("Register", vec![bits(32), bits(16)]),
            &specialized_type("Register", vec![bits(32), bits(16)]),
        ));
    }
}
