//! Method and class containers handed to the pipeline.

use std::{fmt, sync::Arc};

use crate::{
    bytecode::{Instruction, Register},
    types::{JavaType, TypeRef},
    Result,
};

/// A parsed method descriptor such as `(ILjava/lang/String;)V`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Parameter types, excluding the receiver
    pub params: Vec<JavaType>,
    /// Return type, [`JavaType::Void`] for `V`
    pub ret: JavaType,
}

impl MethodDescriptor {
    /// Creates a descriptor from its parts.
    #[must_use]
    pub fn new(params: Vec<JavaType>, ret: JavaType) -> Self {
        MethodDescriptor { params, ret }
    }

    /// Parses a descriptor string.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the string is not a valid method descriptor.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let Some(rest) = descriptor.strip_prefix('(') else {
            return Err(malformed_error!(
                "method descriptor '{}' does not start with '('",
                descriptor
            ));
        };

        let mut params = Vec::new();
        let mut rest = rest;
        loop {
            if let Some(after) = rest.strip_prefix(')') {
                rest = after;
                break;
            }
            let (param, after) = JavaType::parse_prefix(rest)?;
            if param == JavaType::Void {
                return Err(malformed_error!(
                    "void parameter in descriptor '{}'",
                    descriptor
                ));
            }
            params.push(param);
            rest = after;
        }

        let ret = JavaType::from_descriptor(rest)?;
        Ok(MethodDescriptor { params, ret })
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in &self.params {
            f.write_str(&param.descriptor())?;
        }
        write!(f, "){}", self.ret.descriptor())
    }
}

/// A symbolic reference to a method, as found in invoke instructions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Declaring class
    pub class: TypeRef,
    /// Method name (`<init>` for constructors)
    pub name: Arc<str>,
    /// Signature
    pub descriptor: MethodDescriptor,
}

impl MethodRef {
    /// Creates a method reference, parsing `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] on an invalid descriptor.
    pub fn new(class: &str, name: &str, descriptor: &str) -> Result<Self> {
        Ok(MethodRef {
            class: TypeRef::new(class),
            name: Arc::from(name),
            descriptor: MethodDescriptor::parse(descriptor)?,
        })
    }

    /// Returns `true` for instance initializers.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        &*self.name == "<init>"
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.class, self.name, self.descriptor)
    }
}

/// A symbolic reference to a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Declaring class
    pub class: TypeRef,
    /// Field name
    pub name: Arc<str>,
    /// Field type
    pub ty: JavaType,
}

impl FieldRef {
    /// Creates a field reference, parsing the type descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] on an invalid descriptor.
    pub fn new(class: &str, name: &str, descriptor: &str) -> Result<Self> {
        Ok(FieldRef {
            class: TypeRef::new(class),
            name: Arc::from(name),
            ty: JavaType::from_descriptor(descriptor)?,
        })
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.class, self.name, self.ty.descriptor())
    }
}

/// One entry of a method's exception table.
///
/// Covers the instructions whose offsets lie in `start..end`. Entries are listed in
/// priority order: the first entry whose range and catch type match handles the exception.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExceptionHandler {
    /// First covered code-unit offset
    pub start: u32,
    /// End of the covered range (exclusive)
    pub end: u32,
    /// Offset of the handler's first instruction
    pub handler: u32,
    /// Caught class, `None` for a catch-all
    pub catch_type: Option<TypeRef>,
}

impl ExceptionHandler {
    /// Returns `true` if the instruction at `offset` is covered by this entry.
    #[must_use]
    pub fn covers(&self, offset: u32) -> bool {
        (self.start..self.end).contains(&offset)
    }

    /// Returns `true` for catch-all entries (`finally` and `synchronized` cleanup).
    #[must_use]
    pub fn is_catch_all(&self) -> bool {
        self.catch_type.is_none()
    }
}

/// Identity of a method across runs; the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodKey {
    /// Declaring class
    pub class: TypeRef,
    /// Method name
    pub name: Arc<str>,
    /// Descriptor string
    pub descriptor: Arc<str>,
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.class, self.name, self.descriptor)
    }
}

/// The code of one method together with the signature information needed to decompile it.
///
/// Parameters occupy the last registers of the frame: the receiver first for instance
/// methods, then one register per declared parameter.
#[derive(Debug, Clone)]
pub struct MethodCode {
    /// Declaring class
    pub class: TypeRef,
    /// Method name
    pub name: Arc<str>,
    /// Signature
    pub descriptor: MethodDescriptor,
    /// `true` if the method has no receiver
    pub is_static: bool,
    /// Frame size in logical registers
    pub registers: u16,
    /// Instructions in offset order
    pub instructions: Arc<[Instruction]>,
    /// Exception table in priority order
    pub handlers: Arc<[ExceptionHandler]>,
}

impl MethodCode {
    /// Creates a method container.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Decode`] if the parameters do not fit in the register frame.
    pub fn new(
        class: &str,
        name: &str,
        descriptor: MethodDescriptor,
        is_static: bool,
        registers: u16,
        instructions: Vec<Instruction>,
        handlers: Vec<ExceptionHandler>,
    ) -> Result<Self> {
        let param_count = descriptor.params.len() + usize::from(!is_static);
        if param_count > usize::from(registers) {
            return Err(decode_error!(
                0,
                "{} parameter registers do not fit in a frame of {}",
                param_count,
                registers
            ));
        }

        Ok(MethodCode {
            class: TypeRef::new(class),
            name: Arc::from(name),
            descriptor,
            is_static,
            registers,
            instructions: instructions.into(),
            handlers: handlers.into(),
        })
    }

    /// Returns the cache key of this method.
    #[must_use]
    pub fn key(&self) -> MethodKey {
        MethodKey {
            class: self.class.clone(),
            name: self.name.clone(),
            descriptor: Arc::from(self.descriptor.to_string()),
        }
    }

    /// Returns `true` for instance initializers.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        &*self.name == "<init>"
    }

    /// Returns the register of each parameter with its type, receiver first.
    #[must_use]
    pub fn parameter_registers(&self) -> Vec<(Register, JavaType)> {
        let mut types = Vec::with_capacity(self.descriptor.params.len() + 1);
        if !self.is_static {
            types.push(JavaType::Class(self.class.clone()));
        }
        types.extend(self.descriptor.params.iter().cloned());

        let first = usize::from(self.registers) - types.len();
        types
            .into_iter()
            .enumerate()
            .filter_map(|(i, ty)| Register::try_from(first + i).ok().map(|reg| (reg, ty)))
            .collect()
    }
}

/// All methods of one class.
#[derive(Debug, Clone)]
pub struct ClassCode {
    /// Class name
    pub name: TypeRef,
    /// Methods in declaration order
    pub methods: Vec<Arc<MethodCode>>,
}

impl ClassCode {
    /// Creates a class container.
    #[must_use]
    pub fn new(name: &str, methods: Vec<Arc<MethodCode>>) -> Self {
        ClassCode {
            name: TypeRef::new(name),
            methods,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_method_descriptor() {
        let desc = MethodDescriptor::parse("(I[Ljava/lang/String;J)Z").unwrap();
        assert_eq!(
            desc.params,
            vec![
                JavaType::INT,
                JavaType::class("java.lang.String").array_of(),
                JavaType::LONG
            ]
        );
        assert_eq!(desc.ret, JavaType::BOOLEAN);
        assert_eq!(desc.to_string(), "(I[Ljava/lang/String;J)Z");
    }

    #[test]
    fn test_invalid_method_descriptors() {
        assert!(MethodDescriptor::parse("I)V").is_err());
        assert!(MethodDescriptor::parse("(I").is_err());
        assert!(MethodDescriptor::parse("(V)V").is_err());
        assert!(MethodDescriptor::parse("(I)").is_err());
    }

    #[test]
    fn test_parameter_registers() {
        let desc = MethodDescriptor::parse("(IJ)V").unwrap();
        let method = MethodCode::new("com/example/A", "f", desc, false, 5, vec![], vec![]).unwrap();
        let params = method.parameter_registers();
        assert_eq!(params.len(), 3);
        assert_eq!(params[0], (2, JavaType::class("com.example.A")));
        assert_eq!(params[1], (3, JavaType::INT));
        assert_eq!(params[2], (4, JavaType::LONG));
    }

    #[test]
    fn test_frame_too_small() {
        let desc = MethodDescriptor::parse("(II)V").unwrap();
        let err = MethodCode::new("A", "f", desc, true, 1, vec![], vec![]).unwrap_err();
        assert!(matches!(err, crate::Error::Decode { .. }));
    }

    #[test]
    fn test_method_key_display() {
        let desc = MethodDescriptor::parse("()V").unwrap();
        let method = MethodCode::new("a/B", "run", desc, true, 0, vec![], vec![]).unwrap();
        assert_eq!(method.key().to_string(), "a.B.run()V");
    }
}
