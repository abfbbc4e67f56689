//! Expression trees of the generated source.

use std::{fmt, sync::Arc};

use crate::{
    bytecode::{BinaryOp, CompareKind, FieldRef, IfCondition, InvokeKind, MethodRef, UnaryOp},
    types::{JavaType, TypeRef},
};

/// Index of a local variable in [`super::MethodBody::locals`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(usize);

impl LocalId {
    /// Creates a local id from its index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local{}", self.0)
    }
}

/// A constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// `int`, `byte` or `short` constant
    Int(i32),
    /// `long` constant
    Long(i64),
    /// `float` constant
    Float(f32),
    /// `double` constant
    Double(f64),
    /// `true` / `false`
    Boolean(bool),
    /// `char` constant, as a UTF-16 unit
    Char(u16),
    /// `null`
    Null,
    /// String constant
    String(Arc<str>),
    /// Class literal, `Foo.class`
    Class(JavaType),
}

/// A Java expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A named local or parameter
    Local(LocalId),
    /// The receiver of an instance method
    This,
    /// A constant
    Literal(Literal),
    /// `-x`, `~x`
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expression>,
    },
    /// Arithmetic and bitwise operators
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        lhs: Box<Expression>,
        /// Right operand
        rhs: Box<Expression>,
    },
    /// A three-way comparison left unfused, rendered through the boxed type's `compare`
    Compare {
        /// Comparison kind
        kind: CompareKind,
        /// Left operand
        lhs: Box<Expression>,
        /// Right operand
        rhs: Box<Expression>,
    },
    /// A relational test
    Condition {
        /// Relation
        op: IfCondition,
        /// Left operand
        lhs: Box<Expression>,
        /// Right operand
        rhs: Box<Expression>,
    },
    /// Logical negation
    Not(Box<Expression>),
    /// `(T) x`
    Cast {
        /// Target type
        ty: JavaType,
        /// Converted value
        operand: Box<Expression>,
    },
    /// `x instanceof T`
    InstanceOf {
        /// Tested value
        operand: Box<Expression>,
        /// Tested type
        ty: JavaType,
    },
    /// Method call
    Invoke {
        /// Dispatch kind
        kind: InvokeKind,
        /// Callee
        method: MethodRef,
        /// Receiver; `None` for static calls
        receiver: Option<Box<Expression>>,
        /// Arguments
        args: Vec<Expression>,
    },
    /// `new T(args)`, an allocation fused with its constructor call
    New {
        /// Instantiated class
        class: TypeRef,
        /// Constructor arguments
        args: Vec<Expression>,
    },
    /// `new T[size]`
    NewArray {
        /// Element type
        element: JavaType,
        /// Length
        size: Box<Expression>,
    },
    /// `a.length`
    ArrayLength(Box<Expression>),
    /// `a[i]`
    ArrayGet {
        /// Array
        array: Box<Expression>,
        /// Index
        index: Box<Expression>,
    },
    /// `o.f`
    InstanceField {
        /// Object
        object: Box<Expression>,
        /// Field
        field: FieldRef,
    },
    /// `T.f`
    StaticField(FieldRef),
}

impl Expression {
    /// Returns a boxed local reference.
    #[must_use]
    pub fn local(id: LocalId) -> Box<Expression> {
        Box::new(Expression::Local(id))
    }

    /// Returns the logical negation, flipping relations instead of wrapping them.
    #[must_use]
    pub fn negate(self) -> Expression {
        match self {
            Expression::Condition { op, lhs, rhs } => Expression::Condition {
                op: op.negate(),
                lhs,
                rhs,
            },
            Expression::Not(inner) => *inner,
            Expression::Literal(Literal::Boolean(value)) => {
                Expression::Literal(Literal::Boolean(!value))
            }
            other => Expression::Not(Box::new(other)),
        }
    }

    /// Calls `f` on every direct subexpression, in evaluation order.
    pub fn for_each_child(&self, f: &mut impl FnMut(&Expression)) {
        match self {
            Expression::Local(_)
            | Expression::This
            | Expression::Literal(_)
            | Expression::StaticField(_) => {}
            Expression::Unary { operand, .. }
            | Expression::Not(operand)
            | Expression::Cast { operand, .. }
            | Expression::InstanceOf { operand, .. }
            | Expression::ArrayLength(operand)
            | Expression::NewArray { size: operand, .. }
            | Expression::InstanceField {
                object: operand, ..
            } => f(operand),
            Expression::Binary { lhs, rhs, .. }
            | Expression::Compare { lhs, rhs, .. }
            | Expression::Condition { lhs, rhs, .. }
            | Expression::ArrayGet {
                array: lhs,
                index: rhs,
            } => {
                f(lhs);
                f(rhs);
            }
            Expression::Invoke { receiver, args, .. } => {
                if let Some(receiver) = receiver {
                    f(receiver);
                }
                args.iter().for_each(f);
            }
            Expression::New { args, .. } => args.iter().for_each(f),
        }
    }

    fn for_each_child_mut(&mut self, f: &mut impl FnMut(&mut Expression)) {
        match self {
            Expression::Local(_)
            | Expression::This
            | Expression::Literal(_)
            | Expression::StaticField(_) => {}
            Expression::Unary { operand, .. }
            | Expression::Not(operand)
            | Expression::Cast { operand, .. }
            | Expression::InstanceOf { operand, .. }
            | Expression::ArrayLength(operand)
            | Expression::NewArray { size: operand, .. }
            | Expression::InstanceField {
                object: operand, ..
            } => f(operand),
            Expression::Binary { lhs, rhs, .. }
            | Expression::Compare { lhs, rhs, .. }
            | Expression::Condition { lhs, rhs, .. }
            | Expression::ArrayGet {
                array: lhs,
                index: rhs,
            } => {
                f(lhs);
                f(rhs);
            }
            Expression::Invoke { receiver, args, .. } => {
                if let Some(receiver) = receiver {
                    f(receiver);
                }
                args.iter_mut().for_each(f);
            }
            Expression::New { args, .. } => args.iter_mut().for_each(f),
        }
    }

    /// Returns every local read, in evaluation order, with repeats.
    #[must_use]
    pub fn locals(&self) -> Vec<LocalId> {
        let mut out = Vec::new();
        self.collect_locals(&mut out);
        out
    }

    fn collect_locals(&self, out: &mut Vec<LocalId>) {
        if let Expression::Local(id) = self {
            out.push(*id);
        }
        self.for_each_child(&mut |child| child.collect_locals(out));
    }

    /// Returns `true` if the expression reads `local`.
    #[must_use]
    pub fn reads(&self, local: LocalId) -> bool {
        if *self == Expression::Local(local) {
            return true;
        }
        let mut found = false;
        self.for_each_child(&mut |child| found |= child.reads(local));
        found
    }

    /// Replaces every read of `from` with a read of `to`.
    pub fn replace_local(&mut self, from: LocalId, to: LocalId) {
        if *self == Expression::Local(from) {
            *self = Expression::Local(to);
            return;
        }
        self.for_each_child_mut(&mut |child| child.replace_local(from, to));
    }

    /// Returns the Java precedence level; higher binds tighter.
    #[must_use]
    pub fn precedence(&self) -> u8 {
        match self {
            Expression::Binary { op, .. } => binary_precedence(*op),
            Expression::Condition { op, .. } => {
                if op.is_equality() {
                    8
                } else {
                    9
                }
            }
            Expression::InstanceOf { .. } => 9,
            Expression::Unary { .. } | Expression::Not(_) | Expression::Cast { .. } => 13,
            Expression::Literal(Literal::Int(v)) if *v < 0 => 13,
            Expression::Literal(Literal::Long(v)) if *v < 0 => 13,
            Expression::Literal(Literal::Float(v)) if v.is_sign_negative() => 13,
            Expression::Literal(Literal::Double(v)) if v.is_sign_negative() => 13,
            Expression::New { .. } | Expression::NewArray { .. } => 14,
            _ => 15,
        }
    }
}

/// Returns the Java precedence level of a binary operator.
#[must_use]
pub fn binary_precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 12,
        BinaryOp::Add | BinaryOp::Sub => 11,
        BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr => 10,
        BinaryOp::And => 7,
        BinaryOp::Xor => 6,
        BinaryOp::Or => 5,
    }
}

/// The target of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum LValue {
    /// A local
    Local(LocalId),
    /// `a[i]`
    ArrayElement {
        /// Array
        array: Expression,
        /// Index
        index: Expression,
    },
    /// `o.f`
    InstanceField {
        /// Object
        object: Expression,
        /// Field
        field: FieldRef,
    },
    /// `T.f`
    StaticField(FieldRef),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negate_flips_relations() {
        let condition = Expression::Condition {
            op: IfCondition::Lt,
            lhs: Expression::local(LocalId::new(0)),
            rhs: Box::new(Expression::Literal(Literal::Int(10))),
        };
        let Expression::Condition { op, .. } = condition.clone().negate() else {
            panic!("expected a relation");
        };
        assert_eq!(op, IfCondition::Ge);
        assert_eq!(condition.clone().negate().negate(), condition);

        let flag = Expression::Local(LocalId::new(1));
        assert_eq!(flag.clone().negate(), Expression::Not(Box::new(flag.clone())));
        assert_eq!(flag.clone().negate().negate(), flag);
    }

    #[test]
    fn test_replace_local() {
        let mut sum = Expression::Binary {
            op: BinaryOp::Add,
            lhs: Expression::local(LocalId::new(0)),
            rhs: Box::new(Expression::Binary {
                op: BinaryOp::Mul,
                lhs: Expression::local(LocalId::new(0)),
                rhs: Expression::local(LocalId::new(1)),
            }),
        };
        assert_eq!(sum.locals(), vec![LocalId::new(0), LocalId::new(0), LocalId::new(1)]);
        sum.replace_local(LocalId::new(0), LocalId::new(2));
        assert!(!sum.reads(LocalId::new(0)));
        assert!(sum.reads(LocalId::new(2)));
    }
}
