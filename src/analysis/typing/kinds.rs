//! The per-value type lattice.

use bitflags::bitflags;

use crate::{
    bytecode::{ArrayKind, NumericKind},
    types::{JavaType, PrimitiveType},
};

bitflags! {
    /// The set of type kinds a value may still have.
    ///
    /// Inference starts every value at [`TypeKinds::all`] and only ever removes kinds, so
    /// each value can change at most ten times.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeKinds: u16 {
        /// `boolean`
        const BOOLEAN = 0x0001;
        /// `byte`
        const BYTE = 0x0002;
        /// `char`
        const CHAR = 0x0004;
        /// `short`
        const SHORT = 0x0008;
        /// `int`
        const INT = 0x0010;
        /// `long`
        const LONG = 0x0020;
        /// `float`
        const FLOAT = 0x0040;
        /// `double`
        const DOUBLE = 0x0080;
        /// Any class or interface type
        const OBJECT = 0x0100;
        /// Any array type
        const ARRAY = 0x0200;

        /// Types computed with as `int`
        const INT_LIKE = Self::BOOLEAN.bits() | Self::BYTE.bits() | Self::CHAR.bits()
            | Self::SHORT.bits() | Self::INT.bits();
        /// Integral types narrower than or equal to `int`
        const INTEGRAL = Self::BYTE.bits() | Self::CHAR.bits() | Self::SHORT.bits()
            | Self::INT.bits();
        /// 64-bit primitives
        const WIDE = Self::LONG.bits() | Self::DOUBLE.bits();
        /// References, `null` included
        const REFERENCE = Self::OBJECT.bits() | Self::ARRAY.bits();
    }
}

/// Resolution preference for sets with several primitive candidates.
const PREFERENCE: [(TypeKinds, PrimitiveType); 8] = [
    (TypeKinds::INT, PrimitiveType::Int),
    (TypeKinds::BOOLEAN, PrimitiveType::Boolean),
    (TypeKinds::LONG, PrimitiveType::Long),
    (TypeKinds::FLOAT, PrimitiveType::Float),
    (TypeKinds::DOUBLE, PrimitiveType::Double),
    (TypeKinds::SHORT, PrimitiveType::Short),
    (TypeKinds::CHAR, PrimitiveType::Char),
    (TypeKinds::BYTE, PrimitiveType::Byte),
];

impl TypeKinds {
    /// Returns the kind of a primitive type.
    #[must_use]
    pub fn of_primitive(ty: PrimitiveType) -> Self {
        match ty {
            PrimitiveType::Boolean => Self::BOOLEAN,
            PrimitiveType::Byte => Self::BYTE,
            PrimitiveType::Char => Self::CHAR,
            PrimitiveType::Short => Self::SHORT,
            PrimitiveType::Int => Self::INT,
            PrimitiveType::Long => Self::LONG,
            PrimitiveType::Float => Self::FLOAT,
            PrimitiveType::Double => Self::DOUBLE,
        }
    }

    /// Returns the kind a value of declared type `ty` has.
    #[must_use]
    pub fn of(ty: &JavaType) -> Self {
        match ty {
            JavaType::Void => Self::empty(),
            JavaType::Primitive(primitive) => Self::of_primitive(*primitive),
            JavaType::Class(_) => Self::OBJECT,
            JavaType::Array(_) => Self::ARRAY,
        }
    }

    /// Returns the kinds a value may have to be usable where `ty` is expected without a
    /// conversion.
    ///
    /// Primitive acceptance stays within one register family: an `int` slot accepts the
    /// narrower integral kinds, but never `float`, since a register's bits are only
    /// meaningful in one interpretation.
    #[must_use]
    pub fn accepted_by(ty: &JavaType) -> Self {
        match ty {
            JavaType::Void => Self::empty(),
            JavaType::Primitive(PrimitiveType::Int) => Self::INTEGRAL,
            JavaType::Primitive(PrimitiveType::Short) => Self::BYTE | Self::SHORT,
            JavaType::Primitive(primitive) => Self::of_primitive(*primitive),
            JavaType::Class(class) => match class.name() {
                "java.lang.Object" | "java.lang.Cloneable" | "java.io.Serializable" => {
                    Self::REFERENCE
                }
                _ => Self::OBJECT,
            },
            JavaType::Array(_) => Self::ARRAY,
        }
    }

    /// Returns the kinds of an operand of numeric kind `kind`.
    #[must_use]
    pub fn numeric_operand(kind: NumericKind) -> Self {
        match kind {
            NumericKind::Int => Self::INTEGRAL,
            NumericKind::Long => Self::LONG,
            NumericKind::Float => Self::FLOAT,
            NumericKind::Double => Self::DOUBLE,
        }
    }

    /// Returns the kinds an array element of width variant `kind` may have.
    #[must_use]
    pub fn array_element(kind: ArrayKind) -> Self {
        match kind {
            ArrayKind::Narrow => Self::INT | Self::FLOAT,
            ArrayKind::Wide => Self::WIDE,
            ArrayKind::Object => Self::REFERENCE,
            ArrayKind::Boolean => Self::BOOLEAN,
            ArrayKind::Byte => Self::BYTE,
            ArrayKind::Char => Self::CHAR,
            ArrayKind::Short => Self::SHORT,
        }
    }

    /// Returns the kinds a 32-bit literal may have.
    ///
    /// Every literal can be an `int` or a `float`; small values can also be a narrower
    /// integral type, `0` and `1` a `boolean`, and `0` a `null` reference.
    #[must_use]
    pub fn of_literal(value: i32) -> Self {
        let mut kinds = Self::INT | Self::FLOAT;
        if value == 0 || value == 1 {
            kinds |= Self::BOOLEAN;
        }
        if i8::try_from(value).is_ok() {
            kinds |= Self::BYTE;
        }
        if i16::try_from(value).is_ok() {
            kinds |= Self::SHORT;
        }
        if u16::try_from(value).is_ok() {
            kinds |= Self::CHAR;
        }
        if value == 0 {
            kinds |= Self::REFERENCE;
        }
        kinds
    }

    /// Returns the kinds a value of these kinds can be assigned to without a conversion.
    #[must_use]
    pub fn widened(self) -> Self {
        let mut kinds = self;
        if self.intersects(Self::BYTE) {
            kinds |= Self::SHORT | Self::INT;
        }
        if self.intersects(Self::SHORT | Self::CHAR) {
            kinds |= Self::INT;
        }
        if self.contains(Self::ARRAY) {
            kinds |= Self::OBJECT;
        }
        kinds
    }

    /// Returns the kinds that can be assigned to a slot of these kinds without a
    /// conversion.
    #[must_use]
    pub fn narrowed(self) -> Self {
        let mut kinds = self;
        if self.contains(Self::INT) {
            kinds |= Self::BYTE | Self::SHORT | Self::CHAR;
        }
        if self.contains(Self::SHORT) {
            kinds |= Self::BYTE;
        }
        if self.contains(Self::OBJECT) {
            kinds |= Self::ARRAY;
        }
        kinds
    }

    /// Picks the primitive type for a resolved set, following the preference order.
    ///
    /// Returns `None` if the set holds no primitive kind.
    #[must_use]
    pub fn preferred_primitive(self) -> Option<PrimitiveType> {
        PREFERENCE
            .iter()
            .find(|(kind, _)| self.contains(*kind))
            .map(|(_, primitive)| *primitive)
    }

    /// Returns `true` if the set allows a reference.
    #[must_use]
    pub fn is_reference(self) -> bool {
        self.intersects(Self::REFERENCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_kinds() {
        let zero = TypeKinds::of_literal(0);
        assert!(zero.contains(TypeKinds::BOOLEAN | TypeKinds::REFERENCE | TypeKinds::INT));
        let big = TypeKinds::of_literal(70_000);
        assert_eq!(big, TypeKinds::INT | TypeKinds::FLOAT);
        let char_only = TypeKinds::of_literal(40_000);
        assert!(char_only.contains(TypeKinds::CHAR));
        assert!(!char_only.contains(TypeKinds::SHORT));
        assert!(!TypeKinds::of_literal(-1).contains(TypeKinds::CHAR));
    }

    #[test]
    fn test_preference_order() {
        assert_eq!(
            TypeKinds::of_literal(1).preferred_primitive(),
            Some(PrimitiveType::Int)
        );
        assert_eq!(
            (TypeKinds::BOOLEAN | TypeKinds::FLOAT).preferred_primitive(),
            Some(PrimitiveType::Boolean)
        );
        assert_eq!(
            (TypeKinds::CHAR | TypeKinds::BYTE).preferred_primitive(),
            Some(PrimitiveType::Char)
        );
        assert_eq!(TypeKinds::REFERENCE.preferred_primitive(), None);
    }

    #[test]
    fn test_widening_stays_in_family() {
        assert_eq!(
            TypeKinds::BYTE.widened(),
            TypeKinds::BYTE | TypeKinds::SHORT | TypeKinds::INT
        );
        assert!(!TypeKinds::INT.widened().contains(TypeKinds::FLOAT));
        assert!(TypeKinds::INT.narrowed().contains(TypeKinds::CHAR));
        assert!(TypeKinds::OBJECT.narrowed().contains(TypeKinds::ARRAY));
        assert_eq!(
            TypeKinds::accepted_by(&JavaType::class("java.lang.String")),
            TypeKinds::OBJECT
        );
        assert_eq!(TypeKinds::accepted_by(&JavaType::INT), TypeKinds::INTEGRAL);
    }
}
