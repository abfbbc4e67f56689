//! Decoded Dalvik instructions.
//!
//! The opcode set is closed: [`Opcode`] is a tagged enum covering every instruction family
//! the pipeline understands, and every stage matches on it exhaustively. Width variants of
//! the same operation (`const/4`, `const/16`, `const`; `goto`, `goto/16`) are one variant
//! each, since they only differ in encoding.
//!
//! Register pairs of wide values are collapsed into a single logical register by the
//! container layer, so every register operand here is one [`Register`].

use std::{fmt, sync::Arc};

use strum::{Display, IntoStaticStr};

use crate::{
    bytecode::{FieldRef, MethodRef},
    types::{JavaType, PrimitiveType, TypeRef},
};

/// A logical register number.
pub type Register = u16;

/// Operand kind of arithmetic instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum NumericKind {
    /// 32-bit integer arithmetic (also used for boolean `and`/`or`/`xor`)
    Int,
    /// 64-bit integer arithmetic
    Long,
    /// 32-bit floating point
    Float,
    /// 64-bit floating point
    Double,
}

impl NumericKind {
    /// Returns the primitive type of this kind.
    #[must_use]
    pub fn primitive(self) -> PrimitiveType {
        match self {
            NumericKind::Int => PrimitiveType::Int,
            NumericKind::Long => PrimitiveType::Long,
            NumericKind::Float => PrimitiveType::Float,
            NumericKind::Double => PrimitiveType::Double,
        }
    }
}

/// Binary arithmetic and bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `&`
    And,
    /// `|`
    Or,
    /// `^`
    Xor,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `>>>`
    Ushr,
}

impl BinaryOp {
    /// Returns the Java operator symbol.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Ushr => ">>>",
        }
    }

    /// Returns `true` for shifts, whose right operand is always an `int`.
    #[must_use]
    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr)
    }

    /// Returns `true` for the operators that also apply to booleans.
    #[must_use]
    pub fn is_bitwise(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or | BinaryOp::Xor)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum UnaryOp {
    /// Arithmetic negation
    Neg,
    /// Bitwise complement
    Not,
}

/// The `cmp*` family, producing -1, 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum CompareKind {
    /// `cmpl-float` (NaN compares as less)
    CmplFloat,
    /// `cmpg-float` (NaN compares as greater)
    CmpgFloat,
    /// `cmpl-double`
    CmplDouble,
    /// `cmpg-double`
    CmpgDouble,
    /// `cmp-long`
    CmpLong,
}

impl CompareKind {
    /// Returns the operand type.
    #[must_use]
    pub fn operand_kind(self) -> NumericKind {
        match self {
            CompareKind::CmplFloat | CompareKind::CmpgFloat => NumericKind::Float,
            CompareKind::CmplDouble | CompareKind::CmpgDouble => NumericKind::Double,
            CompareKind::CmpLong => NumericKind::Long,
        }
    }
}

/// Condition of an `if-*` instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum IfCondition {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `>`
    Gt,
    /// `<=`
    Le,
}

impl IfCondition {
    /// Returns the logical negation.
    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            IfCondition::Eq => IfCondition::Ne,
            IfCondition::Ne => IfCondition::Eq,
            IfCondition::Lt => IfCondition::Ge,
            IfCondition::Ge => IfCondition::Lt,
            IfCondition::Gt => IfCondition::Le,
            IfCondition::Le => IfCondition::Gt,
        }
    }

    /// Returns the Java operator symbol.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            IfCondition::Eq => "==",
            IfCondition::Ne => "!=",
            IfCondition::Lt => "<",
            IfCondition::Ge => ">=",
            IfCondition::Gt => ">",
            IfCondition::Le => "<=",
        }
    }

    /// Returns `true` for `==` and `!=`, the only conditions valid on references.
    #[must_use]
    pub fn is_equality(self) -> bool {
        matches!(self, IfCondition::Eq | IfCondition::Ne)
    }
}

/// Dispatch kind of an `invoke-*` instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum InvokeKind {
    /// `invoke-virtual`
    Virtual,
    /// `invoke-super`
    Super,
    /// `invoke-direct` (constructors and private methods)
    Direct,
    /// `invoke-static`
    Static,
    /// `invoke-interface`
    Interface,
}

/// Element width variant of `aget`/`aput`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum ArrayKind {
    /// Plain `aget`: `int` or `float`
    Narrow,
    /// `-wide`: `long` or `double`
    Wide,
    /// `-object`
    Object,
    /// `-boolean`
    Boolean,
    /// `-byte`
    Byte,
    /// `-char`
    Char,
    /// `-short`
    Short,
}

/// Right operand of a binary instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    /// A register
    Register(Register),
    /// An `int` literal (`add-int/lit8`, `rsub-int`, ...)
    Literal(i32),
}

/// How an instruction transfers control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum FlowType {
    /// Continues with the next instruction
    Sequential,
    /// Branches to its target or falls through
    ConditionalBranch,
    /// Always branches to its target
    UnconditionalBranch,
    /// Branches to one of its case targets or falls through
    Switch,
    /// Leaves the method normally
    Return,
    /// Leaves the method by throwing
    Throw,
}

/// One decoded opcode with its operands.
///
/// Branch targets are absolute method-local code-unit offsets.
#[derive(Debug, Clone, PartialEq)]
pub enum Opcode {
    /// `nop`
    Nop,
    /// `move`, `move-wide`, `move-object`
    Move {
        /// Destination
        dst: Register,
        /// Source
        src: Register,
    },
    /// `move-result*`, paired with the preceding invoke
    MoveResult {
        /// Destination
        dst: Register,
    },
    /// `move-exception`, first instruction of a handler
    MoveException {
        /// Destination
        dst: Register,
    },
    /// `const/4`, `const/16`, `const`, `const/high16`: 32 untyped bits
    Const {
        /// Destination
        dst: Register,
        /// Raw bits; `int` or `float` depending on use
        value: i32,
    },
    /// `const-wide*`: 64 untyped bits
    ConstWide {
        /// Destination
        dst: Register,
        /// Raw bits; `long` or `double` depending on use
        value: i64,
    },
    /// `const-string`
    ConstString {
        /// Destination
        dst: Register,
        /// String literal
        value: Arc<str>,
    },
    /// `const-class`
    ConstClass {
        /// Destination
        dst: Register,
        /// Referenced type
        class: JavaType,
    },
    /// `neg-*`, `not-*`
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand kind
        kind: NumericKind,
        /// Destination
        dst: Register,
        /// Source
        src: Register,
    },
    /// `int-to-long`, `double-to-int`, `int-to-byte`, ...
    Convert {
        /// Source kind
        from: NumericKind,
        /// Target type
        to: PrimitiveType,
        /// Destination
        dst: Register,
        /// Source
        src: Register,
    },
    /// Arithmetic and bitwise binary operations
    Binary {
        /// Operator
        op: BinaryOp,
        /// Operand kind
        kind: NumericKind,
        /// Destination
        dst: Register,
        /// Left operand
        lhs: Register,
        /// Right operand
        rhs: Operand,
    },
    /// `cmpl-*`, `cmpg-*`, `cmp-long`
    Compare {
        /// Comparison kind
        kind: CompareKind,
        /// Destination
        dst: Register,
        /// Left operand
        lhs: Register,
        /// Right operand
        rhs: Register,
    },
    /// `if-*` (two registers) and `if-*z` (compare with zero/null)
    If {
        /// Condition
        condition: IfCondition,
        /// Left operand
        lhs: Register,
        /// Right operand; `None` compares with zero
        rhs: Option<Register>,
        /// Branch target
        target: u32,
    },
    /// `goto`, `goto/16`, `goto/32`
    Goto {
        /// Branch target
        target: u32,
    },
    /// `packed-switch` and `sparse-switch` with the payload resolved
    Switch {
        /// Selector
        src: Register,
        /// Case keys with their targets; the default is the next instruction
        cases: Vec<(i32, u32)>,
    },
    /// `return*`, `return-void`
    Return {
        /// Returned value, `None` for `return-void`
        src: Option<Register>,
    },
    /// `throw`
    Throw {
        /// Thrown value
        src: Register,
    },
    /// `invoke-*` and `invoke-*/range`
    Invoke {
        /// Dispatch kind
        kind: InvokeKind,
        /// Callee
        method: MethodRef,
        /// Arguments, receiver first for instance calls
        args: Vec<Register>,
    },
    /// `new-instance`
    NewInstance {
        /// Destination
        dst: Register,
        /// Instantiated class
        class: TypeRef,
    },
    /// `new-array`
    NewArray {
        /// Destination
        dst: Register,
        /// Length
        size: Register,
        /// Array type (not the element type)
        array_type: JavaType,
    },
    /// `array-length`
    ArrayLength {
        /// Destination
        dst: Register,
        /// Array
        array: Register,
    },
    /// `aget*`
    ArrayGet {
        /// Element width variant
        kind: ArrayKind,
        /// Destination
        dst: Register,
        /// Array
        array: Register,
        /// Index
        index: Register,
    },
    /// `aput*`
    ArrayPut {
        /// Element width variant
        kind: ArrayKind,
        /// Stored value
        src: Register,
        /// Array
        array: Register,
        /// Index
        index: Register,
    },
    /// `iget*`
    InstanceGet {
        /// Destination
        dst: Register,
        /// Object
        object: Register,
        /// Field
        field: FieldRef,
    },
    /// `iput*`
    InstancePut {
        /// Stored value
        src: Register,
        /// Object
        object: Register,
        /// Field
        field: FieldRef,
    },
    /// `sget*`
    StaticGet {
        /// Destination
        dst: Register,
        /// Field
        field: FieldRef,
    },
    /// `sput*`
    StaticPut {
        /// Stored value
        src: Register,
        /// Field
        field: FieldRef,
    },
    /// `check-cast`: narrows the type of `reg` in place
    CheckCast {
        /// Checked register (used and redefined)
        reg: Register,
        /// Target type
        class: JavaType,
    },
    /// `instance-of`
    InstanceOf {
        /// Destination
        dst: Register,
        /// Tested value
        src: Register,
        /// Tested type
        class: JavaType,
    },
    /// `monitor-enter`
    MonitorEnter {
        /// Lock object
        reg: Register,
    },
    /// `monitor-exit`
    MonitorExit {
        /// Lock object
        reg: Register,
    },
}

impl Opcode {
    /// Returns the mnemonic used in listings.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::Move { .. } => "move",
            Opcode::MoveResult { .. } => "move-result",
            Opcode::MoveException { .. } => "move-exception",
            Opcode::Const { .. } => "const",
            Opcode::ConstWide { .. } => "const-wide",
            Opcode::ConstString { .. } => "const-string",
            Opcode::ConstClass { .. } => "const-class",
            Opcode::Unary { op, .. } => op.into(),
            Opcode::Convert { .. } => "convert",
            Opcode::Binary { op, .. } => op.into(),
            Opcode::Compare { kind, .. } => kind.into(),
            Opcode::If { .. } => "if",
            Opcode::Goto { .. } => "goto",
            Opcode::Switch { .. } => "switch",
            Opcode::Return { .. } => "return",
            Opcode::Throw { .. } => "throw",
            Opcode::Invoke { .. } => "invoke",
            Opcode::NewInstance { .. } => "new-instance",
            Opcode::NewArray { .. } => "new-array",
            Opcode::ArrayLength { .. } => "array-length",
            Opcode::ArrayGet { .. } => "aget",
            Opcode::ArrayPut { .. } => "aput",
            Opcode::InstanceGet { .. } => "iget",
            Opcode::InstancePut { .. } => "iput",
            Opcode::StaticGet { .. } => "sget",
            Opcode::StaticPut { .. } => "sput",
            Opcode::CheckCast { .. } => "check-cast",
            Opcode::InstanceOf { .. } => "instance-of",
            Opcode::MonitorEnter { .. } => "monitor-enter",
            Opcode::MonitorExit { .. } => "monitor-exit",
        }
    }

    /// Returns the encoded width in 16-bit code units.
    ///
    /// Used to lay out offsets; the variable-width forms use the smallest encoding that
    /// fits the operands.
    #[must_use]
    pub fn width(&self) -> u32 {
        match self {
            Opcode::Nop
            | Opcode::Move { .. }
            | Opcode::MoveResult { .. }
            | Opcode::MoveException { .. }
            | Opcode::Unary { .. }
            | Opcode::Convert { .. }
            | Opcode::Return { .. }
            | Opcode::Throw { .. }
            | Opcode::ArrayLength { .. }
            | Opcode::MonitorEnter { .. }
            | Opcode::MonitorExit { .. } => 1,
            Opcode::Const { value, .. } => match value {
                -8..=7 => 1,
                v if i16::try_from(*v).is_ok() => 2,
                _ => 3,
            },
            Opcode::ConstWide { value, .. } => {
                if i16::try_from(*value).is_ok() {
                    2
                } else if i32::try_from(*value).is_ok() {
                    3
                } else {
                    5
                }
            }
            Opcode::Switch { .. } | Opcode::Invoke { .. } => 3,
            Opcode::ConstString { .. }
            | Opcode::ConstClass { .. }
            | Opcode::Binary { .. }
            | Opcode::Compare { .. }
            | Opcode::If { .. }
            | Opcode::Goto { .. }
            | Opcode::NewInstance { .. }
            | Opcode::NewArray { .. }
            | Opcode::ArrayGet { .. }
            | Opcode::ArrayPut { .. }
            | Opcode::InstanceGet { .. }
            | Opcode::InstancePut { .. }
            | Opcode::StaticGet { .. }
            | Opcode::StaticPut { .. }
            | Opcode::CheckCast { .. }
            | Opcode::InstanceOf { .. } => 2,
        }
    }

    /// Returns how this instruction transfers control.
    #[must_use]
    pub fn flow_type(&self) -> FlowType {
        match self {
            Opcode::If { .. } => FlowType::ConditionalBranch,
            Opcode::Goto { .. } => FlowType::UnconditionalBranch,
            Opcode::Switch { .. } => FlowType::Switch,
            Opcode::Return { .. } => FlowType::Return,
            Opcode::Throw { .. } => FlowType::Throw,
            _ => FlowType::Sequential,
        }
    }

    /// Returns `true` if this instruction ends a basic block.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        self.flow_type() != FlowType::Sequential
    }

    /// Returns `true` if control may continue with the next instruction.
    #[must_use]
    pub fn can_fall_through(&self) -> bool {
        matches!(
            self.flow_type(),
            FlowType::Sequential | FlowType::ConditionalBranch | FlowType::Switch
        )
    }

    /// Returns the explicit branch targets, in case order.
    #[must_use]
    pub fn branch_targets(&self) -> Vec<u32> {
        match self {
            Opcode::If { target, .. } | Opcode::Goto { target } => vec![*target],
            Opcode::Switch { cases, .. } => cases.iter().map(|&(_, target)| target).collect(),
            _ => Vec::new(),
        }
    }

    /// Returns `true` if executing this instruction may raise an exception.
    #[must_use]
    pub fn can_throw(&self) -> bool {
        match self {
            Opcode::Binary { op, kind, rhs, .. } => {
                matches!(op, BinaryOp::Div | BinaryOp::Rem)
                    && matches!(kind, NumericKind::Int | NumericKind::Long)
                    && !matches!(rhs, Operand::Literal(v) if *v != 0)
            }
            Opcode::ConstString { .. }
            | Opcode::ConstClass { .. }
            | Opcode::Throw { .. }
            | Opcode::Invoke { .. }
            | Opcode::NewInstance { .. }
            | Opcode::NewArray { .. }
            | Opcode::ArrayLength { .. }
            | Opcode::ArrayGet { .. }
            | Opcode::ArrayPut { .. }
            | Opcode::InstanceGet { .. }
            | Opcode::InstancePut { .. }
            | Opcode::StaticGet { .. }
            | Opcode::StaticPut { .. }
            | Opcode::CheckCast { .. }
            | Opcode::InstanceOf { .. }
            | Opcode::MonitorEnter { .. }
            | Opcode::MonitorExit { .. } => true,
            _ => false,
        }
    }

    /// Returns the registers read, in evaluation order.
    ///
    /// Type inference and the expression assembler rely on this order: operand `i` of an
    /// SSA instruction is the value of `uses()[i]`.
    #[must_use]
    pub fn uses(&self) -> Vec<Register> {
        match self {
            Opcode::Nop
            | Opcode::MoveResult { .. }
            | Opcode::MoveException { .. }
            | Opcode::Const { .. }
            | Opcode::ConstWide { .. }
            | Opcode::ConstString { .. }
            | Opcode::ConstClass { .. }
            | Opcode::Goto { .. }
            | Opcode::NewInstance { .. }
            | Opcode::StaticGet { .. }
            | Opcode::Return { src: None } => Vec::new(),
            Opcode::Move { src, .. }
            | Opcode::Unary { src, .. }
            | Opcode::Convert { src, .. }
            | Opcode::Switch { src, .. }
            | Opcode::Return { src: Some(src) }
            | Opcode::Throw { src }
            | Opcode::StaticPut { src, .. }
            | Opcode::InstanceOf { src, .. } => vec![*src],
            Opcode::Binary { lhs, rhs, .. } => match rhs {
                Operand::Register(rhs) => vec![*lhs, *rhs],
                Operand::Literal(_) => vec![*lhs],
            },
            Opcode::Compare { lhs, rhs, .. } => vec![*lhs, *rhs],
            Opcode::If { lhs, rhs, .. } => match rhs {
                Some(rhs) => vec![*lhs, *rhs],
                None => vec![*lhs],
            },
            Opcode::Invoke { args, .. } => args.clone(),
            Opcode::NewArray { size, .. } => vec![*size],
            Opcode::ArrayLength { array, .. } => vec![*array],
            Opcode::ArrayGet { array, index, .. } => vec![*array, *index],
            Opcode::ArrayPut {
                src, array, index, ..
            } => vec![*array, *index, *src],
            Opcode::InstanceGet { object, .. } => vec![*object],
            Opcode::InstancePut { src, object, .. } => vec![*object, *src],
            Opcode::CheckCast { reg, .. }
            | Opcode::MonitorEnter { reg }
            | Opcode::MonitorExit { reg } => vec![*reg],
        }
    }

    /// Returns the register written, if any.
    ///
    /// Invokes write nothing themselves; their result is written by the paired
    /// `move-result`.
    #[must_use]
    pub fn def(&self) -> Option<Register> {
        match self {
            Opcode::Move { dst, .. }
            | Opcode::MoveResult { dst }
            | Opcode::MoveException { dst }
            | Opcode::Const { dst, .. }
            | Opcode::ConstWide { dst, .. }
            | Opcode::ConstString { dst, .. }
            | Opcode::ConstClass { dst, .. }
            | Opcode::Unary { dst, .. }
            | Opcode::Convert { dst, .. }
            | Opcode::Binary { dst, .. }
            | Opcode::Compare { dst, .. }
            | Opcode::NewInstance { dst, .. }
            | Opcode::NewArray { dst, .. }
            | Opcode::ArrayLength { dst, .. }
            | Opcode::ArrayGet { dst, .. }
            | Opcode::InstanceGet { dst, .. }
            | Opcode::StaticGet { dst, .. }
            | Opcode::InstanceOf { dst, .. } => Some(*dst),
            Opcode::CheckCast { reg, .. } => Some(*reg),
            _ => None,
        }
    }

    /// Returns a copy with every register renamed through `map`.
    ///
    /// Used to compare duplicated code (such as inlined `finally` bodies) modulo register
    /// allocation.
    #[must_use]
    pub fn map_registers(&self, mut map: impl FnMut(Register) -> Register) -> Opcode {
        let mut copy = self.clone();
        match &mut copy {
            Opcode::Nop
            | Opcode::Goto { .. }
            | Opcode::Return { src: None } => {}
            Opcode::MoveResult { dst }
            | Opcode::MoveException { dst }
            | Opcode::Const { dst, .. }
            | Opcode::ConstWide { dst, .. }
            | Opcode::ConstString { dst, .. }
            | Opcode::ConstClass { dst, .. }
            | Opcode::NewInstance { dst, .. }
            | Opcode::StaticGet { dst, .. } => *dst = map(*dst),
            Opcode::Move { dst, src }
            | Opcode::Unary { dst, src, .. }
            | Opcode::Convert { dst, src, .. }
            | Opcode::InstanceOf { dst, src, .. } => {
                *src = map(*src);
                *dst = map(*dst);
            }
            Opcode::Binary { dst, lhs, rhs, .. } => {
                *lhs = map(*lhs);
                if let Operand::Register(rhs) = rhs {
                    *rhs = map(*rhs);
                }
                *dst = map(*dst);
            }
            Opcode::Compare { dst, lhs, rhs, .. } => {
                *lhs = map(*lhs);
                *rhs = map(*rhs);
                *dst = map(*dst);
            }
            Opcode::If { lhs, rhs, .. } => {
                *lhs = map(*lhs);
                if let Some(rhs) = rhs {
                    *rhs = map(*rhs);
                }
            }
            Opcode::Switch { src, .. }
            | Opcode::Return { src: Some(src) }
            | Opcode::Throw { src }
            | Opcode::StaticPut { src, .. } => *src = map(*src),
            Opcode::Invoke { args, .. } => {
                for arg in args.iter_mut() {
                    *arg = map(*arg);
                }
            }
            Opcode::NewArray { dst, size, .. } => {
                *size = map(*size);
                *dst = map(*dst);
            }
            Opcode::ArrayLength { dst, array } => {
                *array = map(*array);
                *dst = map(*dst);
            }
            Opcode::ArrayGet {
                dst, array, index, ..
            } => {
                *array = map(*array);
                *index = map(*index);
                *dst = map(*dst);
            }
            Opcode::ArrayPut {
                src, array, index, ..
            } => {
                *array = map(*array);
                *index = map(*index);
                *src = map(*src);
            }
            Opcode::InstanceGet { dst, object, .. } => {
                *object = map(*object);
                *dst = map(*dst);
            }
            Opcode::InstancePut { src, object, .. } => {
                *object = map(*object);
                *src = map(*src);
            }
            Opcode::CheckCast { reg, .. }
            | Opcode::MonitorEnter { reg }
            | Opcode::MonitorExit { reg } => *reg = map(*reg),
        }
        copy
    }
}

/// An instruction at a method-local code-unit offset.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Offset in 16-bit code units from the start of the method's code
    pub offset: u32,
    /// The decoded opcode
    pub opcode: Opcode,
}

impl Instruction {
    /// Creates an instruction.
    #[must_use]
    pub fn new(offset: u32, opcode: Opcode) -> Self {
        Instruction { offset, opcode }
    }

    /// Returns the offset of the following instruction.
    #[must_use]
    pub fn next_offset(&self) -> u32 {
        self.offset.saturating_add(self.opcode.width())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}: ", self.offset)?;
        let regs = |regs: &[Register]| {
            regs.iter()
                .map(|r| format!("v{r}"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        match &self.opcode {
            Opcode::Const { dst, value } => write!(f, "const v{dst}, {value:#x}"),
            Opcode::ConstWide { dst, value } => write!(f, "const-wide v{dst}, {value:#x}"),
            Opcode::ConstString { dst, value } => write!(f, "const-string v{dst}, {value:?}"),
            Opcode::ConstClass { dst, class } => write!(f, "const-class v{dst}, {class}"),
            Opcode::Convert { from, to, dst, src } => {
                write!(f, "{from}-to-{to} v{dst}, v{src}")
            }
            Opcode::Unary { op, kind, dst, src } => write!(f, "{op}-{kind} v{dst}, v{src}"),
            Opcode::Binary {
                op,
                kind,
                dst,
                lhs,
                rhs,
            } => match rhs {
                Operand::Register(rhs) => write!(f, "{op}-{kind} v{dst}, v{lhs}, v{rhs}"),
                Operand::Literal(lit) => write!(f, "{op}-{kind}/lit v{dst}, v{lhs}, #{lit}"),
            },
            Opcode::If {
                condition,
                lhs,
                rhs,
                target,
            } => match rhs {
                Some(rhs) => write!(f, "if-{condition} v{lhs}, v{rhs}, {target:04x}"),
                None => write!(f, "if-{condition}z v{lhs}, {target:04x}"),
            },
            Opcode::Goto { target } => write!(f, "goto {target:04x}"),
            Opcode::Switch { src, cases } => {
                write!(f, "switch v{src}, {{")?;
                for (index, (key, target)) in cases.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key} -> {target:04x}")?;
                }
                write!(f, "}}")
            }
            Opcode::Invoke { kind, method, args } => {
                write!(f, "invoke-{kind} {{{}}}, {method}", regs(args))
            }
            Opcode::NewInstance { dst, class } => write!(f, "new-instance v{dst}, {class}"),
            Opcode::NewArray {
                dst,
                size,
                array_type,
            } => write!(f, "new-array v{dst}, v{size}, {array_type}"),
            Opcode::InstanceGet { dst, object, field } => {
                write!(f, "iget v{dst}, v{object}, {field}")
            }
            Opcode::InstancePut { src, object, field } => {
                write!(f, "iput v{src}, v{object}, {field}")
            }
            Opcode::StaticGet { dst, field } => write!(f, "sget v{dst}, {field}"),
            Opcode::StaticPut { src, field } => write!(f, "sput v{src}, {field}"),
            Opcode::CheckCast { reg, class } => write!(f, "check-cast v{reg}, {class}"),
            Opcode::InstanceOf { dst, src, class } => {
                write!(f, "instance-of v{dst}, v{src}, {class}")
            }
            other => {
                let mut operands = Vec::new();
                operands.extend(other.def());
                operands.extend(other.uses());
                if operands.is_empty() {
                    write!(f, "{}", other.mnemonic())
                } else {
                    write!(f, "{} {}", other.mnemonic(), regs(&operands))
                }
            }
        }
    }
}
