//! Fluent construction of method bodies with symbolic labels.
//!
//! [`CodeAssembler`] lays instructions out at their encoded widths and resolves named
//! labels to code-unit offsets when the body is built. It is how test fixtures, benchmarks
//! and embedders without a dex parser produce [`MethodCode`] values.
//!
//! # Examples
//!
//! ```rust,ignore
//! use dexscope::bytecode::{CodeAssembler, IfCondition};
//!
//! let mut asm = CodeAssembler::new();
//! asm.if_zero(IfCondition::Le, 0, "negative")
//!     .const_int(1, 1)
//!     .return_value(1)
//!     .label("negative")
//!     .const_int(1, 0)
//!     .return_value(1);
//! let method = asm.build_method("a.B", "sign", "(I)I", true, 2)?;
//! ```

use std::{collections::HashMap, sync::Arc};

use crate::{
    bytecode::{
        ArrayKind, BinaryOp, CompareKind, ExceptionHandler, FieldRef, IfCondition, Instruction,
        InvokeKind, MethodCode, MethodDescriptor, MethodRef, NumericKind, Opcode, Operand,
        Register, UnaryOp,
    },
    types::{JavaType, PrimitiveType, TypeRef},
    Result,
};

#[derive(Debug)]
enum Fixup {
    Branch(String),
    Switch(Vec<String>),
}

#[derive(Debug)]
struct TryRange {
    start: String,
    end: String,
    handler: String,
    catch_type: Option<TypeRef>,
}

/// Builder for instruction sequences with labels and exception ranges.
///
/// Emitters never fail; label resolution errors are reported by [`CodeAssembler::build`].
#[derive(Debug, Default)]
pub struct CodeAssembler {
    instructions: Vec<Instruction>,
    fixups: Vec<(usize, Fixup)>,
    labels: HashMap<String, usize>,
    duplicate_labels: Vec<String>,
    ranges: Vec<TryRange>,
    next_offset: u32,
}

impl CodeAssembler {
    /// Creates an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of emitted instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` if nothing has been emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Binds `name` to the next emitted instruction.
    pub fn label(&mut self, name: &str) -> &mut Self {
        if self
            .labels
            .insert(name.to_string(), self.instructions.len())
            .is_some()
        {
            self.duplicate_labels.push(name.to_string());
        }
        self
    }

    /// Emits a raw opcode at the next offset.
    pub fn emit(&mut self, opcode: Opcode) -> &mut Self {
        let width = opcode.width();
        self.instructions
            .push(Instruction::new(self.next_offset, opcode));
        self.next_offset += width;
        self
    }

    fn emit_branch(&mut self, opcode: Opcode, fixup: Fixup) -> &mut Self {
        self.fixups.push((self.instructions.len(), fixup));
        self.emit(opcode)
    }

    /// Registers a protected range `start..end` handled at `handler`.
    ///
    /// `catch_type` is a class name, or `None` for a catch-all. Ranges are kept in the
    /// order they are declared, which is the handler priority order.
    pub fn try_range(
        &mut self,
        start: &str,
        end: &str,
        handler: &str,
        catch_type: Option<&str>,
    ) -> &mut Self {
        self.ranges.push(TryRange {
            start: start.to_string(),
            end: end.to_string(),
            handler: handler.to_string(),
            catch_type: catch_type.map(TypeRef::new),
        });
        self
    }

    /// `nop`
    pub fn nop(&mut self) -> &mut Self {
        self.emit(Opcode::Nop)
    }

    /// `move dst, src`
    pub fn mov(&mut self, dst: Register, src: Register) -> &mut Self {
        self.emit(Opcode::Move { dst, src })
    }

    /// `move-result dst`
    pub fn move_result(&mut self, dst: Register) -> &mut Self {
        self.emit(Opcode::MoveResult { dst })
    }

    /// `move-exception dst`
    pub fn move_exception(&mut self, dst: Register) -> &mut Self {
        self.emit(Opcode::MoveException { dst })
    }

    /// `const dst, value` with integer bits.
    pub fn const_int(&mut self, dst: Register, value: i32) -> &mut Self {
        self.emit(Opcode::Const { dst, value })
    }

    /// `const dst, value` with the bits of a `float`.
    pub fn const_float(&mut self, dst: Register, value: f32) -> &mut Self {
        self.emit(Opcode::Const {
            dst,
            value: i32::from_ne_bytes(value.to_bits().to_ne_bytes()),
        })
    }

    /// `const-wide dst, value` with integer bits.
    pub fn const_long(&mut self, dst: Register, value: i64) -> &mut Self {
        self.emit(Opcode::ConstWide { dst, value })
    }

    /// `const-wide dst, value` with the bits of a `double`.
    pub fn const_double(&mut self, dst: Register, value: f64) -> &mut Self {
        self.emit(Opcode::ConstWide {
            dst,
            value: i64::from_ne_bytes(value.to_bits().to_ne_bytes()),
        })
    }

    /// `const-string dst, value`
    pub fn const_string(&mut self, dst: Register, value: &str) -> &mut Self {
        self.emit(Opcode::ConstString {
            dst,
            value: Arc::from(value),
        })
    }

    /// `const-class dst, class`
    pub fn const_class(&mut self, dst: Register, class: JavaType) -> &mut Self {
        self.emit(Opcode::ConstClass { dst, class })
    }

    /// `neg-*` / `not-*`
    pub fn unary(
        &mut self,
        op: UnaryOp,
        kind: NumericKind,
        dst: Register,
        src: Register,
    ) -> &mut Self {
        self.emit(Opcode::Unary { op, kind, dst, src })
    }

    /// `<from>-to-<to> dst, src`
    pub fn convert(
        &mut self,
        from: NumericKind,
        to: PrimitiveType,
        dst: Register,
        src: Register,
    ) -> &mut Self {
        self.emit(Opcode::Convert { from, to, dst, src })
    }

    /// Three-register binary operation.
    pub fn binary(
        &mut self,
        op: BinaryOp,
        kind: NumericKind,
        dst: Register,
        lhs: Register,
        rhs: Register,
    ) -> &mut Self {
        self.emit(Opcode::Binary {
            op,
            kind,
            dst,
            lhs,
            rhs: Operand::Register(rhs),
        })
    }

    /// `int` binary operation with a literal right operand.
    pub fn binary_lit(&mut self, op: BinaryOp, dst: Register, lhs: Register, lit: i32) -> &mut Self {
        self.emit(Opcode::Binary {
            op,
            kind: NumericKind::Int,
            dst,
            lhs,
            rhs: Operand::Literal(lit),
        })
    }

    /// `cmp*-* dst, lhs, rhs`
    pub fn compare(
        &mut self,
        kind: CompareKind,
        dst: Register,
        lhs: Register,
        rhs: Register,
    ) -> &mut Self {
        self.emit(Opcode::Compare {
            kind,
            dst,
            lhs,
            rhs,
        })
    }

    /// `if-<cond> lhs, rhs, target`
    pub fn if_cmp(
        &mut self,
        condition: IfCondition,
        lhs: Register,
        rhs: Register,
        target: &str,
    ) -> &mut Self {
        self.emit_branch(
            Opcode::If {
                condition,
                lhs,
                rhs: Some(rhs),
                target: 0,
            },
            Fixup::Branch(target.to_string()),
        )
    }

    /// `if-<cond>z reg, target`
    pub fn if_zero(&mut self, condition: IfCondition, reg: Register, target: &str) -> &mut Self {
        self.emit_branch(
            Opcode::If {
                condition,
                lhs: reg,
                rhs: None,
                target: 0,
            },
            Fixup::Branch(target.to_string()),
        )
    }

    /// `goto target`
    pub fn goto(&mut self, target: &str) -> &mut Self {
        self.emit_branch(Opcode::Goto { target: 0 }, Fixup::Branch(target.to_string()))
    }

    /// `switch src` with `(key, label)` cases; the default falls through.
    pub fn switch(&mut self, src: Register, cases: &[(i32, &str)]) -> &mut Self {
        let labels = cases.iter().map(|(_, label)| (*label).to_string()).collect();
        self.emit_branch(
            Opcode::Switch {
                src,
                cases: cases.iter().map(|&(key, _)| (key, 0)).collect(),
            },
            Fixup::Switch(labels),
        )
    }

    /// `return-void`
    pub fn return_void(&mut self) -> &mut Self {
        self.emit(Opcode::Return { src: None })
    }

    /// `return src`
    pub fn return_value(&mut self, src: Register) -> &mut Self {
        self.emit(Opcode::Return { src: Some(src) })
    }

    /// `throw src`
    pub fn throw(&mut self, src: Register) -> &mut Self {
        self.emit(Opcode::Throw { src })
    }

    /// `invoke-<kind> {args}, method`
    pub fn invoke(&mut self, kind: InvokeKind, method: MethodRef, args: &[Register]) -> &mut Self {
        self.emit(Opcode::Invoke {
            kind,
            method,
            args: args.to_vec(),
        })
    }

    /// `new-instance dst, class`
    pub fn new_instance(&mut self, dst: Register, class: &str) -> &mut Self {
        self.emit(Opcode::NewInstance {
            dst,
            class: TypeRef::new(class),
        })
    }

    /// `new-array dst, size, array_type`
    pub fn new_array(&mut self, dst: Register, size: Register, array_type: JavaType) -> &mut Self {
        self.emit(Opcode::NewArray {
            dst,
            size,
            array_type,
        })
    }

    /// `array-length dst, array`
    pub fn array_length(&mut self, dst: Register, array: Register) -> &mut Self {
        self.emit(Opcode::ArrayLength { dst, array })
    }

    /// `aget* dst, array, index`
    pub fn array_get(
        &mut self,
        kind: ArrayKind,
        dst: Register,
        array: Register,
        index: Register,
    ) -> &mut Self {
        self.emit(Opcode::ArrayGet {
            kind,
            dst,
            array,
            index,
        })
    }

    /// `aput* src, array, index`
    pub fn array_put(
        &mut self,
        kind: ArrayKind,
        src: Register,
        array: Register,
        index: Register,
    ) -> &mut Self {
        self.emit(Opcode::ArrayPut {
            kind,
            src,
            array,
            index,
        })
    }

    /// `iget dst, object, field`
    pub fn instance_get(&mut self, dst: Register, object: Register, field: FieldRef) -> &mut Self {
        self.emit(Opcode::InstanceGet { dst, object, field })
    }

    /// `iput src, object, field`
    pub fn instance_put(&mut self, src: Register, object: Register, field: FieldRef) -> &mut Self {
        self.emit(Opcode::InstancePut { src, object, field })
    }

    /// `sget dst, field`
    pub fn static_get(&mut self, dst: Register, field: FieldRef) -> &mut Self {
        self.emit(Opcode::StaticGet { dst, field })
    }

    /// `sput src, field`
    pub fn static_put(&mut self, src: Register, field: FieldRef) -> &mut Self {
        self.emit(Opcode::StaticPut { src, field })
    }

    /// `check-cast reg, class`
    pub fn check_cast(&mut self, reg: Register, class: JavaType) -> &mut Self {
        self.emit(Opcode::CheckCast { reg, class })
    }

    /// `instance-of dst, src, class`
    pub fn instance_of(&mut self, dst: Register, src: Register, class: JavaType) -> &mut Self {
        self.emit(Opcode::InstanceOf { dst, src, class })
    }

    /// `monitor-enter reg`
    pub fn monitor_enter(&mut self, reg: Register) -> &mut Self {
        self.emit(Opcode::MonitorEnter { reg })
    }

    /// `monitor-exit reg`
    pub fn monitor_exit(&mut self, reg: Register) -> &mut Self {
        self.emit(Opcode::MonitorExit { reg })
    }

    fn resolve(&self, label: &str) -> Result<u32> {
        let Some(&index) = self.labels.get(label) else {
            return Err(malformed_error!("undefined label '{}'", label));
        };
        Ok(self
            .instructions
            .get(index)
            .map_or(self.next_offset, |insn| insn.offset))
    }

    /// Resolves labels and returns the instructions with their exception table.
    ///
    /// A label bound after the last instruction resolves to the end offset, which is valid
    /// as the end of a protected range but not as a branch target.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for undefined or duplicate labels.
    pub fn build(&self) -> Result<(Vec<Instruction>, Vec<ExceptionHandler>)> {
        if let Some(name) = self.duplicate_labels.first() {
            return Err(malformed_error!("label '{}' is defined twice", name));
        }

        let mut instructions = self.instructions.clone();
        for (index, fixup) in &self.fixups {
            let resolved = match fixup {
                Fixup::Branch(label) => vec![self.resolve(label)?],
                Fixup::Switch(labels) => labels
                    .iter()
                    .map(|label| self.resolve(label))
                    .collect::<Result<Vec<_>>>()?,
            };
            match &mut instructions[*index].opcode {
                Opcode::If { target, .. } | Opcode::Goto { target } => *target = resolved[0],
                Opcode::Switch { cases, .. } => {
                    for (case, target) in cases.iter_mut().zip(resolved) {
                        case.1 = target;
                    }
                }
                other => {
                    return Err(malformed_error!(
                        "fixup recorded for non-branch '{}'",
                        other.mnemonic()
                    ))
                }
            }
        }

        let handlers = self
            .ranges
            .iter()
            .map(|range| {
                Ok(ExceptionHandler {
                    start: self.resolve(&range.start)?,
                    end: self.resolve(&range.end)?,
                    handler: self.resolve(&range.handler)?,
                    catch_type: range.catch_type.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((instructions, handlers))
    }

    /// Builds a complete [`MethodCode`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for label or descriptor errors and
    /// [`crate::Error::Decode`] if the parameters do not fit in `registers`.
    pub fn build_method(
        &self,
        class: &str,
        name: &str,
        descriptor: &str,
        is_static: bool,
        registers: u16,
    ) -> Result<MethodCode> {
        let (instructions, handlers) = self.build()?;
        MethodCode::new(
            class,
            name,
            MethodDescriptor::parse(descriptor)?,
            is_static,
            registers,
            instructions,
            handlers,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_and_labels() {
        let mut asm = CodeAssembler::new();
        asm.const_int(0, 0)
            .label("loop")
            .if_zero(IfCondition::Ge, 1, "done")
            .binary_lit(BinaryOp::Add, 0, 0, 1)
            .goto("loop")
            .label("done")
            .return_value(0);
        let (insns, handlers) = asm.build().unwrap();

        assert!(handlers.is_empty());
        let offsets: Vec<u32> = insns.iter().map(|i| i.offset).collect();
        assert_eq!(offsets, vec![0, 1, 3, 5, 7]);
        assert_eq!(insns[1].opcode.branch_targets(), vec![7]);
        assert_eq!(insns[3].opcode.branch_targets(), vec![1]);
    }

    #[test]
    fn test_switch_and_try_ranges() {
        let mut asm = CodeAssembler::new();
        asm.label("start")
            .switch(0, &[(1, "one"), (2, "two")])
            .return_void()
            .label("one")
            .return_void()
            .label("two")
            .label("end")
            .return_void()
            .label("handler")
            .move_exception(1)
            .throw(1)
            .try_range("start", "end", "handler", Some("java/io/IOException"));
        let (insns, handlers) = asm.build().unwrap();

        assert_eq!(insns[0].opcode.branch_targets(), vec![4, 5]);
        assert_eq!(handlers.len(), 1);
        assert_eq!(handlers[0].start, 0);
        assert_eq!(handlers[0].end, 5);
        assert_eq!(handlers[0].handler, 6);
        assert_eq!(
            handlers[0].catch_type.as_ref().map(TypeRef::name),
            Some("java.io.IOException")
        );
    }

    #[test]
    fn test_undefined_label() {
        let mut asm = CodeAssembler::new();
        asm.goto("nowhere");
        assert!(asm.build().is_err());
    }

    #[test]
    fn test_duplicate_label() {
        let mut asm = CodeAssembler::new();
        asm.label("a").nop().label("a").return_void();
        assert!(asm.build().is_err());
    }

    #[test]
    fn test_float_bits() {
        let mut asm = CodeAssembler::new();
        asm.const_float(0, 1.5);
        let (insns, _) = asm.build().unwrap();
        let Opcode::Const { value, .. } = insns[0].opcode else {
            panic!("expected const");
        };
        assert_eq!(f32::from_bits(value as u32), 1.5);
    }
}
