//! Evaluation of operators over literal operands.
//!
//! Fixed-width integers wrap to their width the way the hardware does;
//! arbitrary-precision `int` values report overflow instead of wrapping.
//! An `int` operand combined with a fixed-width one takes the fixed width.

use thiserror::Error;

use super::{BinaryOperatorKind, Literal, Type, TypeKind, UnaryOperatorKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FoldError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow while evaluating `{0}`")]
    Overflow(String),
    #[error("operator `{operator}` cannot be applied to {operands}")]
    Mismatch { operator: String, operands: String },
    #[error("negative shift amount {0}")]
    NegativeShift(i128),
    #[error("cannot cast {literal} to {ty}")]
    InvalidCast { literal: String, ty: String },
}

/// Wraps `value` into the range of a `width`-bit integer
pub fn truncate(value: i128, width: u32, signed: bool) -> i128 {
    if width == 0 {
        return 0;
    }
    if width >= 128 {
        return value;
    }

    let mask = (1u128 << width) - 1;
    let bits = (value as u128) & mask;

    if signed && (bits >> (width - 1)) & 1 == 1 {
        bits as i128 - (1i128 << width)
    } else {
        bits as i128
    }
}

fn integer(value: i128, width: Option<u32>, signed: bool) -> Literal {
    Literal::Integer {
        value: match width {
            Some(width) => truncate(value, width, signed),
            None => value,
        },
        width,
        signed,
    }
}

fn mismatch(operator: impl ToString, operands: &[&Literal]) -> FoldError {
    FoldError::Mismatch {
        operator: operator.to_string(),
        operands: operands
            .iter()
            .map(|l| l.to_string())
            .collect::<Vec<_>>()
            .join(" and "),
    }
}

pub fn fold_binary(
    operator: BinaryOperatorKind,
    lhs: &Literal,
    rhs: &Literal,
) -> Result<Literal, FoldError> {
    use BinaryOperatorKind as B;

    match (lhs, rhs) {
        (Literal::Boolean(a), Literal::Boolean(b)) => match operator {
            B::LogicalAnd => Ok(Literal::Boolean(*a && *b)),
            B::LogicalOr => Ok(Literal::Boolean(*a || *b)),
            B::Equals => Ok(Literal::Boolean(a == b)),
            B::NotEquals => Ok(Literal::Boolean(a != b)),
            _ => Err(mismatch(operator, &[lhs, rhs])),
        },
        (
            Literal::Integer {
                value: a,
                width: a_width,
                signed: a_signed,
            },
            Literal::Integer {
                value: b,
                width: b_width,
                signed: b_signed,
            },
        ) => {
            let (a, b) = (*a, *b);

            match operator {
                B::ShiftLeft | B::ShiftRight => {
                    if b < 0 {
                        return Err(FoldError::NegativeShift(b));
                    }
                    let amount = u32::try_from(b).unwrap_or(u32::MAX);

                    let value = match (operator, a_width) {
                        (B::ShiftRight, _) => a.checked_shr(amount).unwrap_or(if a < 0 { -1 } else { 0 }),
                        (_, Some(_)) => a.checked_shl(amount).unwrap_or(0),
                        (_, None) => {
                            let headroom = a.unsigned_abs().leading_zeros().saturating_sub(1);
                            if a != 0 && amount > headroom {
                                return Err(FoldError::Overflow(format!("{lhs} << {rhs}")));
                            }
                            a.checked_shl(amount).unwrap_or(0)
                        }
                    };

                    return Ok(integer(value, *a_width, *a_signed));
                }
                B::Concat => {
                    let (Some(a_width), Some(b_width)) = (a_width, b_width) else {
                        return Err(mismatch(operator, &[lhs, rhs]));
                    };
                    let width = a_width + b_width;
                    let low = truncate(b, *b_width, false);
                    let value = a.checked_shl(*b_width).unwrap_or(0) | low;
                    return Ok(integer(value, Some(width), *a_signed));
                }
                _ => {}
            }

            let (width, signed) = match (a_width, b_width) {
                (Some(a_width), Some(b_width)) if a_width != b_width || a_signed != b_signed => {
                    return Err(mismatch(operator, &[lhs, rhs]));
                }
                (Some(width), _) => (Some(*width), *a_signed),
                (None, Some(width)) => (Some(*width), *b_signed),
                (None, None) => (None, true),
            };

            let overflow = || FoldError::Overflow(format!("{lhs} {operator} {rhs}"));

            let value = match operator {
                B::Add => a.checked_add(b).ok_or_else(overflow)?,
                B::Subtract => a.checked_sub(b).ok_or_else(overflow)?,
                B::Multiply => a.checked_mul(b).ok_or_else(overflow)?,
                B::Divide => {
                    if b == 0 {
                        return Err(FoldError::DivisionByZero);
                    }
                    a.checked_div(b).ok_or_else(overflow)?
                }
                B::Modulus => {
                    if b == 0 {
                        return Err(FoldError::DivisionByZero);
                    }
                    a.checked_rem(b).ok_or_else(overflow)?
                }
                B::BitwiseAnd => a & b,
                B::BitwiseOr => a | b,
                B::BitwiseXor => a ^ b,
                B::Equals => return Ok(Literal::Boolean(a == b)),
                B::NotEquals => return Ok(Literal::Boolean(a != b)),
                B::LessThan => return Ok(Literal::Boolean(a < b)),
                B::LessThanOrEqualTo => return Ok(Literal::Boolean(a <= b)),
                B::GreaterThan => return Ok(Literal::Boolean(a > b)),
                B::GreaterThanOrEqualTo => return Ok(Literal::Boolean(a >= b)),
                B::LogicalAnd | B::LogicalOr => return Err(mismatch(operator, &[lhs, rhs])),
                B::ShiftLeft | B::ShiftRight | B::Concat => unreachable!("handled above"),
            };

            Ok(integer(value, width, signed))
        }
        (Literal::String(a), Literal::String(b)) => match operator {
            B::Equals => Ok(Literal::Boolean(a == b)),
            B::NotEquals => Ok(Literal::Boolean(a != b)),
            _ => Err(mismatch(operator, &[lhs, rhs])),
        },
        _ => Err(mismatch(operator, &[lhs, rhs])),
    }
}

pub fn fold_unary(operator: UnaryOperatorKind, operand: &Literal) -> Result<Literal, FoldError> {
    match (operator, operand) {
        (UnaryOperatorKind::LogicalNot, Literal::Boolean(b)) => Ok(Literal::Boolean(!b)),
        (
            UnaryOperatorKind::BitwiseNot,
            Literal::Integer {
                value,
                width: Some(width),
                signed,
            },
        ) => Ok(integer(!value, Some(*width), *signed)),
        (
            UnaryOperatorKind::Negate,
            Literal::Integer {
                value,
                width,
                signed,
            },
        ) => {
            let negated = value
                .checked_neg()
                .ok_or_else(|| FoldError::Overflow(format!("-{operand}")))?;
            Ok(integer(negated, *width, *signed))
        }
        _ => Err(mismatch(operator, &[operand])),
    }
}

pub fn fold_cast(ty: &Type, literal: &Literal) -> Result<Literal, FoldError> {
    let invalid = || FoldError::InvalidCast {
        literal: literal.to_string(),
        ty: ty.to_string(),
    };

    match (&ty.kind, literal) {
        (TypeKind::Bool, Literal::Boolean(b)) => Ok(Literal::Boolean(*b)),
        (
            TypeKind::Bool,
            Literal::Integer {
                value,
                width: Some(1) | None,
                ..
            },
        ) if *value == 0 || *value == 1 => Ok(Literal::Boolean(*value == 1)),
        (TypeKind::Bits { width, signed }, Literal::Integer { value, .. }) => {
            Ok(integer(*value, Some(*width), *signed))
        }
        (TypeKind::Bits { width, signed }, Literal::Boolean(b)) if *width == 1 => {
            Ok(integer(i128::from(*b), Some(1), *signed))
        }
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::build::{bits, bool_type, signed_bits};

    fn bit(value: i128, width: u32) -> Literal {
        Literal::Integer {
            value,
            width: Some(width),
            signed: false,
        }
    }

    fn int(value: i128) -> Literal {
        Literal::Integer {
            value,
            width: None,
            signed: true,
        }
    }

    #[test]
    fn fixed_width_arithmetic_wraps() {
        assert_eq!(
            fold_binary(BinaryOperatorKind::Add, &bit(250, 8), &bit(10, 8)),
            Ok(bit(4, 8))
        );
        assert_eq!(
            fold_binary(BinaryOperatorKind::Subtract, &bit(0, 4), &int(1)),
            Ok(bit(15, 4))
        );
        assert_eq!(
            fold_unary(UnaryOperatorKind::BitwiseNot, &bit(0b1010, 4)),
            Ok(bit(0b0101, 4))
        );
    }

    #[test]
    fn signed_values_wrap_to_twos_complement() {
        assert_eq!(truncate(128, 8, true), -128);
        assert_eq!(truncate(-1, 8, false), 255);
        assert_eq!(truncate(-1, 8, true), -1);
    }

    #[test]
    fn mismatched_widths_are_rejected() {
        assert!(matches!(
            fold_binary(BinaryOperatorKind::Add, &bit(1, 8), &bit(1, 16)),
            Err(FoldError::Mismatch { .. })
        ));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(
            fold_binary(BinaryOperatorKind::Divide, &int(4), &int(0)),
            Err(FoldError::DivisionByZero)
        );
        assert_eq!(
            fold_binary(BinaryOperatorKind::Modulus, &bit(4, 8), &bit(0, 8)),
            Err(FoldError::DivisionByZero)
        );
    }

    #[test]
    fn relational_and_logical_operators_produce_booleans() {
        assert_eq!(
            fold_binary(BinaryOperatorKind::LessThan, &bit(3, 8), &bit(5, 8)),
            Ok(Literal::Boolean(true))
        );
        assert_eq!(
            fold_binary(
                BinaryOperatorKind::LogicalAnd,
                &Literal::Boolean(true),
                &Literal::Boolean(false)
            ),
            Ok(Literal::Boolean(false))
        );
    }

    #[test]
    fn concatenation_and_shifts() {
        assert_eq!(
            fold_binary(BinaryOperatorKind::Concat, &bit(0xA, 4), &bit(0x5, 4)),
            Ok(bit(0xA5, 8))
        );
        assert_eq!(
            fold_binary(BinaryOperatorKind::ShiftLeft, &bit(0x81, 8), &int(1)),
            Ok(bit(0x02, 8))
        );
        assert_eq!(
            fold_binary(BinaryOperatorKind::ShiftRight, &bit(0x80, 8), &int(7)),
            Ok(bit(1, 8))
        );
    }

    #[test]
    fn casts() {
        assert_eq!(fold_cast(&bits(4), &int(17)), Ok(bit(1, 4)));
        assert_eq!(fold_cast(&bool_type(), &bit(1, 1)), Ok(Literal::Boolean(true)));
        assert_eq!(
            fold_cast(&signed_bits(8), &bit(255, 8)),
            Ok(Literal::Integer {
                value: -1,
                width: Some(8),
                signed: true
            })
        );
        assert!(fold_cast(&bool_type(), &int(2)).is_err());
    }
}
