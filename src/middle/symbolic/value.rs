//! Abstract values tracked by the symbolic evaluator.
//!
//! Every scalar is in one of three states: never written, written with a
//! value unknown at compile time, or written with a known constant. Joining
//! two states keeps a constant only when both sides agree on it. Aggregates
//! join field by field, headers additionally join their validity bit.

use itertools::Itertools;
use strum::Display;

use crate::{
    diagnostics::CompilerBug,
    ir::{fold::truncate, DeclarationKind, Field, Literal, Symbol, Type, TypeKind},
    middle::{reference_map::ReferenceMap, type_map::type_declaration},
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Abstract<T> {
    Uninitialized,
    /// Written, but with a value only known at run time
    Unknown,
    Constant(T),
}

impl<T: Clone + PartialEq> Abstract<T> {
    /// Joins `other` into `self`; true when `self` changed
    pub fn merge(&mut self, other: &Self) -> bool {
        let merged = match (&*self, other) {
            (Abstract::Uninitialized, Abstract::Uninitialized) => Abstract::Uninitialized,
            (Abstract::Constant(a), Abstract::Constant(b)) if a == b => Abstract::Constant(a.clone()),
            _ => Abstract::Unknown,
        };

        let changed = merged != *self;
        *self = merged;
        changed
    }

    pub fn constant(&self) -> Option<&T> {
        match self {
            Abstract::Constant(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_uninitialized(&self) -> bool {
        matches!(self, Abstract::Uninitialized)
    }
}

/// How a freshly created value starts out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initial {
    /// A local variable or `out` parameter: nothing written yet, headers
    /// invalid
    Uninitialized,
    /// An `in`/`inout` parameter or the result of an opaque call
    Unknown,
}

/// Run-time failures the evaluator can prove will happen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum StandardException {
    #[strum(serialize = "stack out of bounds")]
    StackOutOfBounds,
    #[strum(serialize = "overwriting already-valid header")]
    OverwritingHeader,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolicStruct {
    pub type_name: Symbol,
    pub fields: Vec<(Symbol, SymbolicValue)>,
}

impl SymbolicStruct {
    pub fn get(&self, field: Symbol) -> Option<&SymbolicValue> {
        self.fields
            .iter()
            .find_map(|(name, value)| (*name == field).then_some(value))
    }

    pub fn get_mut(&mut self, field: Symbol) -> Option<&mut SymbolicValue> {
        self.fields
            .iter_mut()
            .find_map(|(name, value)| (*name == field).then_some(value))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolicHeader {
    pub fields: SymbolicStruct,
    pub valid: Abstract<bool>,
}

impl SymbolicHeader {
    pub fn is_known_invalid(&self) -> bool {
        self.valid == Abstract::Constant(false)
    }

    pub fn is_known_valid(&self) -> bool {
        self.valid == Abstract::Constant(true)
    }

    /// Reads a field; the fields of a header known to be invalid have no
    /// meaningful value
    pub fn read_field(&self, field: Symbol) -> SymbolicValue {
        if self.is_known_invalid() {
            return SymbolicValue::StaticError(format!(
                "reading field `{field}` of invalid header `{}`",
                self.fields.type_name
            ));
        }

        match self.fields.get(field) {
            Some(value) => value.clone(),
            None => SymbolicValue::StaticError(format!(
                "header `{}` has no field `{field}`",
                self.fields.type_name
            )),
        }
    }

    /// Changes validity. Either way the fields lose their values: an invalid
    /// header has none, and a newly valid one has unspecified contents.
    pub fn set_valid(&mut self, valid: bool) {
        self.valid = Abstract::Constant(valid);
        for (_, value) in self.fields.fields.iter_mut() {
            value.set_unknown();
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolicStack {
    pub elements: Vec<SymbolicValue>,
}

impl SymbolicStack {
    pub fn size(&self) -> usize {
        self.elements.len()
    }

    /// Moves elements `amount` slots towards the end (`push_front`) or, for a
    /// negative amount, towards the front (`pop_front`). Slots left behind
    /// become invalid.
    pub fn shift(&mut self, amount: i64) {
        let size = self.elements.len();
        let distance = amount.unsigned_abs() as usize;

        if amount > 0 {
            for i in 0..size.saturating_sub(distance) {
                self.elements[size - 1 - i] = self.elements[size - 1 - i - distance].clone();
            }
            for element in self.elements.iter_mut().take(distance.min(size)) {
                element.invalidate();
            }
        } else if amount < 0 {
            for i in 0..size.saturating_sub(distance) {
                self.elements[i] = self.elements[i + distance].clone();
            }
            for element in self.elements.iter_mut().skip(size.saturating_sub(distance)) {
                element.invalidate();
            }
        }
    }

    /// The join of every element: what reading an element at an index not
    /// known at compile time may yield
    pub fn collapse(&self) -> Result<SymbolicValue, CompilerBug> {
        let mut elements = self.elements.iter();
        let Some(first) = elements.next() else {
            return Ok(SymbolicValue::StaticError(
                "indexing an empty header stack".to_owned(),
            ));
        };

        let mut joined = first.clone();
        for element in elements {
            joined.merge(element)?;
        }
        Ok(joined)
    }
}

/// The cursor of a `packet_in`: how many bits were certainly consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SymbolicPacketIn {
    pub minimum_offset: u64,
    /// Set once a read of unknown size happened; the offset is then only a
    /// lower bound
    pub conservative: bool,
}

impl SymbolicPacketIn {
    pub fn advance(&mut self, bits: Option<u64>) {
        match bits {
            Some(bits) => self.minimum_offset += bits,
            None => self.conservative = true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SymbolicValue {
    Bool(Abstract<bool>),
    Integer {
        width: Option<u32>,
        signed: bool,
        value: Abstract<i128>,
    },
    Varbit {
        max_width: u32,
        initialized: bool,
    },
    Enum {
        type_name: Symbol,
        value: Abstract<Symbol>,
    },
    Error(Abstract<Symbol>),
    Struct(SymbolicStruct),
    Header(SymbolicHeader),
    Stack(SymbolicStack),
    /// The element of a stack at an index unknown at compile time
    AnyElement(SymbolicStack),
    Tuple(Vec<SymbolicValue>),
    Extern(Symbol),
    PacketIn(SymbolicPacketIn),
    Void,
    StaticError(String),
    Exception(StandardException),
}

impl SymbolicValue {
    /// A value shaped like `ty`
    pub fn create(ty: &Type, reference_map: &ReferenceMap, initial: Initial) -> Self {
        let uninitialized = initial == Initial::Uninitialized;

        fn abstract_of<T>(uninitialized: bool) -> Abstract<T> {
            if uninitialized {
                Abstract::Uninitialized
            } else {
                Abstract::Unknown
            }
        }

        match &ty.kind {
            TypeKind::Bool => SymbolicValue::Bool(abstract_of(uninitialized)),
            TypeKind::Bits { width, signed } => SymbolicValue::Integer {
                width: Some(*width),
                signed: *signed,
                value: abstract_of(uninitialized),
            },
            TypeKind::Varbits { max_width } => SymbolicValue::Varbit {
                max_width: *max_width,
                initialized: !uninitialized,
            },
            TypeKind::Void => SymbolicValue::Void,
            TypeKind::Error => SymbolicValue::Error(abstract_of(uninitialized)),
            TypeKind::String => {
                SymbolicValue::StaticError("strings have no symbolic value".to_owned())
            }
            TypeKind::Stack { element, size } => SymbolicValue::Stack(SymbolicStack {
                elements: (0..*size)
                    .map(|_| Self::create(element, reference_map, initial))
                    .collect(),
            }),
            TypeKind::Tuple(elements) => SymbolicValue::Tuple(
                elements
                    .iter()
                    .map(|element| Self::create(element, reference_map, initial))
                    .collect(),
            ),
            TypeKind::Name(_) | TypeKind::Specialized { .. } => {
                let Some(declaration) = type_declaration(ty, reference_map) else {
                    return SymbolicValue::StaticError(format!("unresolved type `{ty}`"));
                };

                let fields = |fields: &[Field]| SymbolicStruct {
                    type_name: declaration.name.symbol,
                    fields: fields
                        .iter()
                        .map(|field| {
                            (
                                field.name.symbol,
                                Self::create(&field.ty, reference_map, initial),
                            )
                        })
                        .collect(),
                };

                match &declaration.kind {
                    // Unions are tracked like structs of headers
                    DeclarationKind::Struct { fields: members }
                    | DeclarationKind::HeaderUnion { fields: members } => {
                        SymbolicValue::Struct(fields(members))
                    }
                    DeclarationKind::Header { fields: members } => {
                        SymbolicValue::Header(SymbolicHeader {
                            fields: fields(members),
                            valid: match initial {
                                Initial::Uninitialized => Abstract::Constant(false),
                                Initial::Unknown => Abstract::Unknown,
                            },
                        })
                    }
                    DeclarationKind::Enum { .. } => SymbolicValue::Enum {
                        type_name: declaration.name.symbol,
                        value: abstract_of(uninitialized),
                    },
                    DeclarationKind::Error { .. } => {
                        SymbolicValue::Error(abstract_of(uninitialized))
                    }
                    DeclarationKind::Extern { .. } if declaration.name.symbol == "packet_in" => {
                        SymbolicValue::PacketIn(SymbolicPacketIn::default())
                    }
                    DeclarationKind::Extern { .. }
                    | DeclarationKind::Parser { .. }
                    | DeclarationKind::Control { .. }
                    | DeclarationKind::Package { .. } => {
                        SymbolicValue::Extern(declaration.name.symbol)
                    }
                    _ => SymbolicValue::StaticError(format!(
                        "`{}` has no symbolic representation",
                        declaration.name
                    )),
                }
            }
        }
    }

    pub fn from_literal(literal: &Literal) -> Self {
        match literal {
            Literal::Boolean(value) => SymbolicValue::Bool(Abstract::Constant(*value)),
            Literal::Integer {
                value,
                width,
                signed,
            } => SymbolicValue::Integer {
                width: *width,
                signed: *signed,
                value: Abstract::Constant(*value),
            },
            Literal::String(_) => {
                SymbolicValue::StaticError("strings have no symbolic value".to_owned())
            }
        }
    }

    /// The constant this scalar is known to hold
    pub fn as_literal(&self) -> Option<Literal> {
        match self {
            SymbolicValue::Bool(Abstract::Constant(value)) => Some(Literal::Boolean(*value)),
            SymbolicValue::Integer {
                width,
                signed,
                value: Abstract::Constant(value),
            } => Some(Literal::Integer {
                value: *value,
                width: *width,
                signed: *signed,
            }),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SymbolicValue::Bool(Abstract::Constant(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            SymbolicValue::StaticError(_) | SymbolicValue::Exception(_)
        )
    }

    /// A scalar nothing was written to yet
    pub fn is_uninitialized(&self) -> bool {
        match self {
            SymbolicValue::Bool(value) => value.is_uninitialized(),
            SymbolicValue::Integer { value, .. } => value.is_uninitialized(),
            SymbolicValue::Enum { value, .. } | SymbolicValue::Error(value) => {
                value.is_uninitialized()
            }
            SymbolicValue::Varbit { initialized, .. } => !initialized,
            _ => false,
        }
    }

    /// Forgets everything known about this value, validity included
    pub fn set_unknown(&mut self) {
        match self {
            SymbolicValue::Bool(value) => *value = Abstract::Unknown,
            SymbolicValue::Integer { value, .. } => *value = Abstract::Unknown,
            SymbolicValue::Enum { value, .. } | SymbolicValue::Error(value) => {
                *value = Abstract::Unknown
            }
            SymbolicValue::Varbit { initialized, .. } => *initialized = true,
            SymbolicValue::Struct(fields) => {
                for (_, value) in fields.fields.iter_mut() {
                    value.set_unknown();
                }
            }
            SymbolicValue::Header(header) => {
                header.valid = Abstract::Unknown;
                for (_, value) in header.fields.fields.iter_mut() {
                    value.set_unknown();
                }
            }
            SymbolicValue::Stack(stack) | SymbolicValue::AnyElement(stack) => {
                for element in stack.elements.iter_mut() {
                    element.set_unknown();
                }
            }
            SymbolicValue::Tuple(elements) => {
                for element in elements.iter_mut() {
                    element.set_unknown();
                }
            }
            SymbolicValue::PacketIn(packet) => packet.conservative = true,
            SymbolicValue::Extern(_)
            | SymbolicValue::Void
            | SymbolicValue::StaticError(_)
            | SymbolicValue::Exception(_) => {}
        }
    }

    /// Marks a header invalid; values without validity are left alone
    pub fn invalidate(&mut self) {
        match self {
            SymbolicValue::Header(header) => header.set_valid(false),
            SymbolicValue::Struct(fields) => {
                for (_, value) in fields.fields.iter_mut() {
                    value.invalidate();
                }
            }
            _ => {}
        }
    }

    /// Joins `other` into `self`, as at a control-flow join; true when
    /// `self` changed. Both sides must have the same shape, and neither may
    /// be an error: a caller reaching a join with an error missed it.
    pub fn merge(&mut self, other: &SymbolicValue) -> Result<bool, CompilerBug> {
        let other = match other {
            SymbolicValue::AnyElement(stack) => &stack.collapse()?,
            other => other,
        };

        let changed = match (&mut *self, other) {
            (SymbolicValue::Bool(a), SymbolicValue::Bool(b)) => a.merge(b),
            (SymbolicValue::Integer { value: a, .. }, SymbolicValue::Integer { value: b, .. }) => {
                a.merge(b)
            }
            (
                SymbolicValue::Varbit { initialized: a, .. },
                SymbolicValue::Varbit { initialized: b, .. },
            ) => {
                let merged = *a && *b;
                let changed = merged != *a;
                *a = merged;
                changed
            }
            (SymbolicValue::Enum { value: a, .. }, SymbolicValue::Enum { value: b, .. })
            | (SymbolicValue::Error(a), SymbolicValue::Error(b)) => a.merge(b),
            (SymbolicValue::Struct(a), SymbolicValue::Struct(b)) => merge_fields(a, b)?,
            (SymbolicValue::Header(a), SymbolicValue::Header(b)) => {
                let valid = a.valid.merge(&b.valid);
                merge_fields(&mut a.fields, &b.fields)? | valid
            }
            (SymbolicValue::Stack(a), SymbolicValue::Stack(b))
                if a.elements.len() == b.elements.len() =>
            {
                let mut changed = false;
                for (a, b) in a.elements.iter_mut().zip(b.elements.iter()) {
                    changed |= a.merge(b)?;
                }
                changed
            }
            (SymbolicValue::Tuple(a), SymbolicValue::Tuple(b)) if a.len() == b.len() => {
                let mut changed = false;
                for (a, b) in a.iter_mut().zip(b.iter()) {
                    changed |= a.merge(b)?;
                }
                changed
            }
            (SymbolicValue::PacketIn(a), SymbolicValue::PacketIn(b)) => {
                let merged = SymbolicPacketIn {
                    minimum_offset: a.minimum_offset.min(b.minimum_offset),
                    conservative: a.conservative
                        || b.conservative
                        || a.minimum_offset != b.minimum_offset,
                };
                let changed = merged != *a;
                *a = merged;
                changed
            }
            (SymbolicValue::Extern(_), SymbolicValue::Extern(_))
            | (SymbolicValue::Void, SymbolicValue::Void) => false,
            (this, other) => {
                return Err(CompilerBug::Internal(format!(
                    "cannot merge symbolic values {this} and {other}"
                )))
            }
        };

        Ok(changed)
    }

    /// Overwrites `self` with `other`, field by field for aggregates
    pub fn assign(&mut self, other: &SymbolicValue) -> Result<(), CompilerBug> {
        let other = match other {
            SymbolicValue::AnyElement(stack) => &stack.collapse()?,
            other => other,
        };

        match (&mut *self, other) {
            (
                SymbolicValue::Integer {
                    width: Some(width),
                    signed,
                    value,
                },
                SymbolicValue::Integer { value: source, .. },
            ) => {
                // `int` constants take the width of their destination
                *value = match source {
                    Abstract::Constant(constant) => {
                        Abstract::Constant(truncate(*constant, *width, *signed))
                    }
                    other => other.clone(),
                };
            }
            (SymbolicValue::Struct(a), SymbolicValue::Struct(b)) => assign_fields(a, b)?,
            (SymbolicValue::Header(a), SymbolicValue::Header(b)) => {
                a.valid = b.valid.clone();
                assign_fields(&mut a.fields, &b.fields)?;
            }
            // A header assigned from a struct literal becomes valid
            (SymbolicValue::Header(a), SymbolicValue::Struct(b)) => {
                a.valid = Abstract::Constant(true);
                assign_fields(&mut a.fields, b)?;
            }
            (SymbolicValue::Struct(a), SymbolicValue::Tuple(b))
                if a.fields.len() == b.len() =>
            {
                for ((_, a), b) in a.fields.iter_mut().zip(b.iter()) {
                    a.assign(b)?;
                }
            }
            (SymbolicValue::Header(a), SymbolicValue::Tuple(b))
                if a.fields.fields.len() == b.len() =>
            {
                a.valid = Abstract::Constant(true);
                for ((_, a), b) in a.fields.fields.iter_mut().zip(b.iter()) {
                    a.assign(b)?;
                }
            }
            (SymbolicValue::Stack(a), SymbolicValue::Stack(b))
                if a.elements.len() == b.elements.len() =>
            {
                for (a, b) in a.elements.iter_mut().zip(b.elements.iter()) {
                    a.assign(b)?;
                }
            }
            (this, other) if other.is_error() || this.is_error() => {
                return Err(CompilerBug::Internal(format!(
                    "assigning error value {other} to {this}"
                )))
            }
            (this, other)
                if core::mem::discriminant(&*this) == core::mem::discriminant(other) =>
            {
                *this = other.clone();
            }
            (this, other) => {
                return Err(CompilerBug::Internal(format!(
                    "cannot assign symbolic value {other} to {this}"
                )))
            }
        }

        Ok(())
    }
}

fn merge_fields(a: &mut SymbolicStruct, b: &SymbolicStruct) -> Result<bool, CompilerBug> {
    let mut changed = false;
    for (name, value) in a.fields.iter_mut() {
        if let Some(other) = b.get(*name) {
            changed |= value.merge(other)?;
        }
    }
    Ok(changed)
}

fn assign_fields(a: &mut SymbolicStruct, b: &SymbolicStruct) -> Result<(), CompilerBug> {
    for (name, value) in a.fields.iter_mut() {
        if let Some(other) = b.get(*name) {
            value.assign(other)?;
        }
    }
    Ok(())
}

impl<T: core::fmt::Display> core::fmt::Display for Abstract<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Abstract::Uninitialized => f.write_str("uninitialized"),
            Abstract::Unknown => f.write_str("?"),
            Abstract::Constant(value) => write!(f, "{value}"),
        }
    }
}

impl core::fmt::Display for SymbolicValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SymbolicValue::Bool(value) => write!(f, "{value}"),
            SymbolicValue::Integer { width, signed, value } => match (value, width) {
                (Abstract::Constant(value), Some(width)) => {
                    write!(f, "{width}{}{value}", if *signed { "s" } else { "w" })
                }
                _ => write!(f, "{value}"),
            },
            SymbolicValue::Varbit { initialized, .. } => {
                f.write_str(if *initialized { "?" } else { "uninitialized" })
            }
            SymbolicValue::Enum { type_name, value } => write!(f, "{type_name}.{value}"),
            SymbolicValue::Error(value) => write!(f, "error.{value}"),
            SymbolicValue::Struct(fields) => write!(
                f,
                "{{ {} }}",
                fields
                    .fields
                    .iter()
                    .map(|(name, value)| format!("{name}: {value}"))
                    .join(", ")
            ),
            SymbolicValue::Header(header) => write!(
                f,
                "{{ {} }}{}",
                header
                    .fields
                    .fields
                    .iter()
                    .map(|(name, value)| format!("{name}: {value}"))
                    .join(", "),
                match header.valid {
                    Abstract::Constant(true) => "",
                    Abstract::Constant(false) => " invalid",
                    _ => " (validity ?)",
                }
            ),
            SymbolicValue::Stack(stack) => {
                write!(f, "[{}]", stack.elements.iter().join(", "))
            }
            SymbolicValue::AnyElement(stack) => {
                write!(f, "any of [{}]", stack.elements.iter().join(", "))
            }
            SymbolicValue::Tuple(elements) => write!(f, "({})", elements.iter().join(", ")),
            SymbolicValue::Extern(name) => write!(f, "extern {name}"),
            SymbolicValue::PacketIn(packet) => write!(
                f,
                "packet_in @ {}{}",
                packet.minimum_offset,
                if packet.conservative { "+" } else { "" }
            ),
            SymbolicValue::Void => f.write_str("void"),
            SymbolicValue::StaticError(message) => write!(f, "error: {message}"),
            SymbolicValue::Exception(exception) => write!(f, "exception: {exception}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn byte(value: Abstract<i128>) -> SymbolicValue {
        SymbolicValue::Integer {
            width: Some(8),
            signed: false,
            value,
        }
    }

    fn header(valid: bool) -> SymbolicValue {
        SymbolicValue::Header(SymbolicHeader {
            fields: SymbolicStruct {
                type_name: Symbol::new("h_t"),
                fields: vec![(Symbol::new("f"), byte(Abstract::Unknown))],
            },
            valid: Abstract::Constant(valid),
        })
    }

    fn validity(value: &SymbolicValue) -> Abstract<bool> {
        match value {
            SymbolicValue::Header(header) => header.valid.clone(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn merge_is_a_join() {
        let samples = [
            byte(Abstract::Uninitialized),
            byte(Abstract::Unknown),
            byte(Abstract::Constant(3)),
            byte(Abstract::Constant(4)),
        ];

        for a in samples.iter() {
            // Idempotent
            let mut same = a.clone();
            assert!(!same.merge(a).unwrap());
            assert_eq!(&same, a);

            for b in samples.iter() {
                // Commutative
                let mut ab = a.clone();
                ab.merge(b).unwrap();
                let mut ba = b.clone();
                ba.merge(a).unwrap();
                assert_eq!(ab, ba);
            }
        }

        let mut three = byte(Abstract::Constant(3));
        three.merge(&byte(Abstract::Constant(3))).unwrap();
        assert_eq!(three, byte(Abstract::Constant(3)));

        three.merge(&byte(Abstract::Constant(4))).unwrap();
        assert_eq!(three, byte(Abstract::Unknown));

        let mut uninitialized = byte(Abstract::Uninitialized);
        uninitialized.merge(&byte(Abstract::Uninitialized)).unwrap();
        assert_eq!(uninitialized, byte(Abstract::Uninitialized));
    }

    #[test]
    fn merging_errors_is_a_bug() {
        let mut value = byte(Abstract::Unknown);
        assert!(value
            .merge(&SymbolicValue::Exception(StandardException::StackOutOfBounds))
            .is_err());
        assert!(value.merge(&SymbolicValue::Bool(Abstract::Unknown)).is_err());
    }

    #[test]
    fn invalid_headers_deny_field_reads() {
        let SymbolicValue::Header(mut header) = header(true) else {
            unreachable!()
        };
        assert_eq!(header.read_field(Symbol::new("f")), byte(Abstract::Unknown));

        header.set_valid(false);
        assert!(matches!(
            header.read_field(Symbol::new("f")),
            SymbolicValue::StaticError(_)
        ));
        assert_eq!(header.fields.get(Symbol::new("f")), Some(&byte(Abstract::Unknown)));
    }

    #[test]
    fn push_front_shifts_towards_the_end() {
        let mut stack = SymbolicStack {
            elements: vec![header(true), header(true), header(false), header(false)],
        };
        stack.shift(1);

        let pattern = stack.elements.iter().map(validity).collect::<Vec<_>>();
        assert_eq!(
            pattern,
            vec![
                Abstract::Constant(false),
                Abstract::Constant(true),
                Abstract::Constant(true),
                Abstract::Constant(false),
            ]
        );

        stack.shift(-2);
        let pattern = stack.elements.iter().map(validity).collect::<Vec<_>>();
        assert_eq!(
            pattern,
            vec![
                Abstract::Constant(true),
                Abstract::Constant(false),
                Abstract::Constant(false),
                Abstract::Constant(false),
            ]
        );
    }

    #[test]
    fn assignment_truncates_int_constants() {
        let mut destination = byte(Abstract::Uninitialized);
        destination
            .assign(&SymbolicValue::from_literal(&Literal::Integer {
                value: 300,
                width: None,
                signed: true,
            }))
            .unwrap();
        assert_eq!(destination, byte(Abstract::Constant(44)));
        assert_eq!(destination.to_string(), "8w44");
    }

    #[test]
    fn collapsed_stacks_join_their_elements() {
        let stack = SymbolicStack {
            elements: vec![header(true), header(false)],
        };
        assert_eq!(validity(&stack.collapse().unwrap()), Abstract::Unknown);
    }
}
