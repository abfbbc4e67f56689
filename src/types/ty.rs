//! Java type representation and descriptor parsing.
//!
//! Bytecode refers to types through descriptors (`I`, `[J`, `Ljava/lang/String;`). This
//! module parses them into [`JavaType`] values, which display in source syntax
//! (`int`, `long[]`, `java.lang.String`).

use std::{fmt, sync::Arc};

use strum::{Display, EnumIter};

use crate::Result;

/// A reference to a class by its binary name in dotted form (`java.lang.String`).
///
/// Cheap to clone; the name is shared.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef(Arc<str>);

impl TypeRef {
    /// Creates a type reference from a dotted or slash-separated binary name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        if name.contains('/') {
            TypeRef(Arc::from(name.replace('/', ".")))
        } else {
            TypeRef(Arc::from(name))
        }
    }

    /// `java.lang.Object`
    #[must_use]
    pub fn object() -> Self {
        TypeRef::new("java.lang.Object")
    }

    /// Returns the dotted binary name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Returns the simple name: the part after the last `.` and `$`.
    #[must_use]
    pub fn simple_name(&self) -> &str {
        let name = self.0.rsplit('.').next().unwrap_or(&self.0);
        name.rsplit('$').next().unwrap_or(name)
    }

    /// Returns `true` for `java.lang.Object`.
    #[must_use]
    pub fn is_object(&self) -> bool {
        &*self.0 == "java.lang.Object"
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({})", self.0)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The eight Java primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum PrimitiveType {
    /// `boolean`
    Boolean,
    /// `byte`
    Byte,
    /// `char`
    Char,
    /// `short`
    Short,
    /// `int`
    Int,
    /// `long`
    Long,
    /// `float`
    Float,
    /// `double`
    Double,
}

impl PrimitiveType {
    /// Returns the single-character descriptor.
    #[must_use]
    pub fn descriptor(self) -> char {
        match self {
            PrimitiveType::Boolean => 'Z',
            PrimitiveType::Byte => 'B',
            PrimitiveType::Char => 'C',
            PrimitiveType::Short => 'S',
            PrimitiveType::Int => 'I',
            PrimitiveType::Long => 'J',
            PrimitiveType::Float => 'F',
            PrimitiveType::Double => 'D',
        }
    }

    /// Returns `true` for `long` and `double`, which occupy a register pair.
    #[must_use]
    pub fn is_wide(self) -> bool {
        matches!(self, PrimitiveType::Long | PrimitiveType::Double)
    }

    /// Returns `true` for the types the JVM computes with as `int`.
    #[must_use]
    pub fn is_int_like(self) -> bool {
        matches!(
            self,
            PrimitiveType::Boolean
                | PrimitiveType::Byte
                | PrimitiveType::Char
                | PrimitiveType::Short
                | PrimitiveType::Int
        )
    }

    /// Returns `true` if a value of `self` converts to `target` by an implicit primitive
    /// widening conversion (JLS 5.1.2), or the types are equal.
    #[must_use]
    pub fn widens_to(self, target: PrimitiveType) -> bool {
        use PrimitiveType::{Boolean, Byte, Char, Double, Float, Int, Long, Short};
        if self == target {
            return true;
        }
        match self {
            Boolean => false,
            Byte => matches!(target, Short | Int | Long | Float | Double),
            Short | Char => matches!(target, Int | Long | Float | Double),
            Int => matches!(target, Long | Float | Double),
            Long => matches!(target, Float | Double),
            Float => target == Double,
            Double => false,
        }
    }

    fn from_descriptor(c: char) -> Option<Self> {
        Some(match c {
            'Z' => PrimitiveType::Boolean,
            'B' => PrimitiveType::Byte,
            'C' => PrimitiveType::Char,
            'S' => PrimitiveType::Short,
            'I' => PrimitiveType::Int,
            'J' => PrimitiveType::Long,
            'F' => PrimitiveType::Float,
            'D' => PrimitiveType::Double,
            _ => return None,
        })
    }
}

/// A Java type as it appears in declarations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JavaType {
    /// `void`, only valid as a return type
    Void,
    /// A primitive type
    Primitive(PrimitiveType),
    /// A class or interface type
    Class(TypeRef),
    /// An array with the given element type
    Array(Box<JavaType>),
}

impl JavaType {
    /// `int`
    pub const INT: JavaType = JavaType::Primitive(PrimitiveType::Int);
    /// `boolean`
    pub const BOOLEAN: JavaType = JavaType::Primitive(PrimitiveType::Boolean);
    /// `long`
    pub const LONG: JavaType = JavaType::Primitive(PrimitiveType::Long);
    /// `float`
    pub const FLOAT: JavaType = JavaType::Primitive(PrimitiveType::Float);
    /// `double`
    pub const DOUBLE: JavaType = JavaType::Primitive(PrimitiveType::Double);

    /// `java.lang.Object`
    #[must_use]
    pub fn object() -> Self {
        JavaType::Class(TypeRef::object())
    }

    /// A class type from its binary name.
    #[must_use]
    pub fn class(name: &str) -> Self {
        JavaType::Class(TypeRef::new(name))
    }

    /// An array of `self`.
    #[must_use]
    pub fn array_of(self) -> Self {
        JavaType::Array(Box::new(self))
    }

    /// Parses a complete field descriptor such as `[Ljava/lang/String;`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the descriptor is invalid or has trailing
    /// characters.
    pub fn from_descriptor(descriptor: &str) -> Result<Self> {
        let (ty, rest) = Self::parse_prefix(descriptor)?;
        if !rest.is_empty() {
            return Err(malformed_error!(
                "trailing characters '{}' in descriptor '{}'",
                rest,
                descriptor
            ));
        }
        Ok(ty)
    }

    /// Parses one type from the start of `input`, returning it with the unparsed rest.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] on an unknown tag or an unterminated class name.
    pub fn parse_prefix(input: &str) -> Result<(Self, &str)> {
        let mut chars = input.chars();
        let Some(tag) = chars.next() else {
            return Err(malformed_error!("empty type descriptor"));
        };
        match tag {
            'V' => Ok((JavaType::Void, chars.as_str())),
            '[' => {
                let (element, rest) = Self::parse_prefix(chars.as_str())?;
                if element == JavaType::Void {
                    return Err(malformed_error!("array of void in '{}'", input));
                }
                Ok((element.array_of(), rest))
            }
            'L' => {
                let body = chars.as_str();
                let Some(end) = body.find(';') else {
                    return Err(malformed_error!("unterminated class descriptor '{}'", input));
                };
                if end == 0 {
                    return Err(malformed_error!("empty class name in '{}'", input));
                }
                Ok((JavaType::class(&body[..end]), &body[end + 1..]))
            }
            other => PrimitiveType::from_descriptor(other)
                .map(|primitive| (JavaType::Primitive(primitive), chars.as_str()))
                .ok_or_else(|| malformed_error!("unknown type tag '{}' in '{}'", other, input)),
        }
    }

    /// Returns the descriptor form of this type.
    #[must_use]
    pub fn descriptor(&self) -> String {
        match self {
            JavaType::Void => "V".to_string(),
            JavaType::Primitive(primitive) => primitive.descriptor().to_string(),
            JavaType::Class(class) => format!("L{};", class.name().replace('.', "/")),
            JavaType::Array(element) => format!("[{}", element.descriptor()),
        }
    }

    /// Returns the primitive type, if this is one.
    #[must_use]
    pub fn as_primitive(&self) -> Option<PrimitiveType> {
        match self {
            JavaType::Primitive(primitive) => Some(*primitive),
            _ => None,
        }
    }

    /// Returns `true` for class and array types.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self, JavaType::Class(_) | JavaType::Array(_))
    }

    /// Returns `true` for `java.lang.Object`.
    #[must_use]
    pub fn is_object(&self) -> bool {
        matches!(self, JavaType::Class(class) if class.is_object())
    }

    /// Returns the element type of an array type.
    #[must_use]
    pub fn element_type(&self) -> Option<&JavaType> {
        match self {
            JavaType::Array(element) => Some(element),
            _ => None,
        }
    }

    /// Returns the innermost non-array type and the number of dimensions.
    #[must_use]
    pub fn base_type(&self) -> (&JavaType, usize) {
        let mut current = self;
        let mut dimensions = 0;
        while let JavaType::Array(element) = current {
            current = element;
            dimensions += 1;
        }
        (current, dimensions)
    }
}

impl fmt::Display for JavaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JavaType::Void => f.write_str("void"),
            JavaType::Primitive(primitive) => write!(f, "{primitive}"),
            JavaType::Class(class) => write!(f, "{class}"),
            JavaType::Array(element) => write!(f, "{element}[]"),
        }
    }
}

impl From<PrimitiveType> for JavaType {
    fn from(primitive: PrimitiveType) -> Self {
        JavaType::Primitive(primitive)
    }
}
