//! Type constraints and their collection from SSA form.
//!
//! Every definition contributes a [`TypeConstraint::Define`], every typed read a
//! [`TypeConstraint::Demand`], every copy (moves and phi operands) a
//! [`TypeConstraint::Assign`], and every array access a [`TypeConstraint::ArrayElement`]
//! tying the element value to the array's element type. The constraint list is the
//! inference engine's working set and is discarded after resolution.

use crate::{
    analysis::{
        cfg::ControlFlowGraph,
        ssa::{SsaFunction, SsaValueId, ValueOrigin},
        typing::TypeKinds,
    },
    bytecode::{ArrayKind, InvokeKind, MethodCode, Opcode, Operand},
    types::{JavaType, PrimitiveType},
    utils::graph::NodeId,
};

/// A place where a value must be converted before it can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConversionSite {
    /// Operand `operand` of the instruction at absolute index `index`.
    Use {
        /// Block of the instruction
        block: NodeId,
        /// Absolute instruction index
        index: usize,
        /// Operand position
        operand: usize,
    },
    /// Operand `operand` of phi `phi` in `block`, converted where the predecessor
    /// defines it.
    PhiOperand {
        /// Block holding the phi
        block: NodeId,
        /// Position in the block's phi list
        phi: usize,
        /// Operand position, in predecessor order
        operand: usize,
    },
}

/// A fact relating the types of one or two values.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeConstraint {
    /// The definition of `value` fixes its kinds and, for references, its class.
    Define {
        /// Defined value
        value: SsaValueId,
        /// Kinds the definition can produce
        kinds: TypeKinds,
        /// Reference type produced, joined into the value's lower bound
        bound: Option<JavaType>,
    },
    /// A read requires `kinds`; an empty intersection becomes a conversion at `site`.
    Demand {
        /// Read value
        value: SsaValueId,
        /// Accepted kinds
        kinds: TypeKinds,
        /// Expected reference type, narrowing the value's upper bound
        bound: Option<JavaType>,
        /// Where a conversion goes
        site: ConversionSite,
        /// What the value is converted to
        target: JavaType,
    },
    /// `dst` receives `src` without a conversion, unless the link is cut.
    Assign {
        /// Source
        src: SsaValueId,
        /// Destination
        dst: SsaValueId,
        /// Where a conversion goes if the link is cut
        site: ConversionSite,
    },
    /// `element` is loaded from or stored to `array`.
    ArrayElement {
        /// Array value
        array: SsaValueId,
        /// Loaded or stored value
        element: SsaValueId,
        /// `true` for stores
        store: bool,
    },
}

fn use_site(block: NodeId, index: usize, operand: usize) -> ConversionSite {
    ConversionSite::Use {
        block,
        index,
        operand,
    }
}

fn reference_bound(ty: &JavaType) -> Option<JavaType> {
    ty.is_reference().then(|| ty.clone())
}

/// Collects the constraints of a method in SSA form.
pub(crate) fn collect(
    cfg: &ControlFlowGraph,
    ssa: &SsaFunction,
    method: &MethodCode,
) -> Vec<TypeConstraint> {
    let mut constraints = Vec::new();

    for (value, (_, ty)) in ssa.params().iter().zip(method.parameter_registers()) {
        constraints.push(TypeConstraint::Define {
            value: *value,
            kinds: TypeKinds::of(&ty),
            bound: reference_bound(&ty),
        });
    }

    for (block, phi) in ssa.phis() {
        let Some(ValueOrigin::Phi { phi: position, .. }) =
            ssa.value(phi.result()).map(|value| value.origin())
        else {
            continue;
        };
        for (operand, incoming) in phi.operands().iter().enumerate() {
            constraints.push(TypeConstraint::Assign {
                src: incoming.value,
                dst: phi.result(),
                site: ConversionSite::PhiOperand {
                    block,
                    phi: position,
                    operand,
                },
            });
        }
    }

    let insns = cfg.all_instructions();
    for block in cfg.block_ids() {
        let Some(data) = ssa.block(block) else {
            continue;
        };
        for ssa_insn in data.instructions.iter().filter(|insn| !insn.folded) {
            let Some(insn) = insns.get(ssa_insn.index) else {
                continue;
            };
            let mut collector = Collector {
                constraints: &mut constraints,
                block,
                index: ssa_insn.index,
                uses: &ssa_insn.uses,
            };
            collector.instruction(cfg, method, &insn.opcode, ssa_insn.def);
        }
    }
    constraints
}

struct Collector<'c> {
    constraints: &'c mut Vec<TypeConstraint>,
    block: NodeId,
    index: usize,
    uses: &'c [SsaValueId],
}

impl Collector<'_> {
    fn define(&mut self, value: Option<SsaValueId>, kinds: TypeKinds, bound: Option<JavaType>) {
        if let Some(value) = value {
            self.constraints.push(TypeConstraint::Define {
                value,
                kinds,
                bound,
            });
        }
    }

    fn define_type(&mut self, value: Option<SsaValueId>, ty: &JavaType) {
        self.define(value, TypeKinds::of(ty), reference_bound(ty));
    }

    fn demand(&mut self, operand: usize, kinds: TypeKinds, target: JavaType) {
        let Some(&value) = self.uses.get(operand) else {
            return;
        };
        self.constraints.push(TypeConstraint::Demand {
            value,
            kinds,
            bound: None,
            site: use_site(self.block, self.index, operand),
            target,
        });
    }

    fn demand_type(&mut self, operand: usize, ty: &JavaType) {
        let Some(&value) = self.uses.get(operand) else {
            return;
        };
        self.constraints.push(TypeConstraint::Demand {
            value,
            kinds: TypeKinds::accepted_by(ty),
            bound: reference_bound(ty),
            site: use_site(self.block, self.index, operand),
            target: ty.clone(),
        });
    }

    fn demand_reference(&mut self, operand: usize) {
        self.demand(operand, TypeKinds::REFERENCE, JavaType::object());
    }

    fn instruction(
        &mut self,
        cfg: &ControlFlowGraph,
        method: &MethodCode,
        opcode: &Opcode,
        def: Option<SsaValueId>,
    ) {
        match opcode {
            Opcode::Nop | Opcode::MoveResult { .. } | Opcode::Goto { .. } => {}
            Opcode::Move { .. } => {
                if let (Some(&src), Some(dst)) = (self.uses.first(), def) {
                    self.constraints.push(TypeConstraint::Assign {
                        src,
                        dst,
                        site: use_site(self.block, self.index, 0),
                    });
                }
            }
            Opcode::MoveException { .. } => {
                for bound in catch_types(cfg, self.block) {
                    self.define(def, TypeKinds::OBJECT, Some(bound));
                }
            }
            Opcode::Const { value, .. } => self.define(def, TypeKinds::of_literal(*value), None),
            Opcode::ConstWide { .. } => self.define(def, TypeKinds::WIDE, None),
            Opcode::ConstString { .. } => {
                self.define_type(def, &JavaType::class("java.lang.String"));
            }
            Opcode::ConstClass { .. } => {
                self.define_type(def, &JavaType::class("java.lang.Class"));
            }
            Opcode::Unary { kind, .. } => {
                self.define_type(def, &JavaType::Primitive(kind.primitive()));
                let operand = JavaType::Primitive(kind.primitive());
                self.demand(0, TypeKinds::numeric_operand(*kind), operand);
            }
            Opcode::Convert { from, to, .. } => {
                self.define_type(def, &JavaType::Primitive(*to));
                let operand = JavaType::Primitive(from.primitive());
                self.demand(0, TypeKinds::numeric_operand(*from), operand);
            }
            Opcode::Binary { op, kind, rhs, .. } => {
                let operand_type = JavaType::Primitive(kind.primitive());
                let mut operand_kinds = TypeKinds::numeric_operand(*kind);
                if op.is_bitwise() && kind.primitive() == PrimitiveType::Int {
                    operand_kinds |= TypeKinds::BOOLEAN;
                    self.define(def, TypeKinds::INT | TypeKinds::BOOLEAN, None);
                } else {
                    self.define_type(def, &operand_type);
                }
                self.demand(0, operand_kinds, operand_type.clone());
                if matches!(rhs, Operand::Register(_)) {
                    if op.is_shift() {
                        self.demand(1, TypeKinds::INTEGRAL, JavaType::INT);
                    } else {
                        self.demand(1, operand_kinds, operand_type);
                    }
                }
            }
            Opcode::Compare { kind, .. } => {
                self.define_type(def, &JavaType::INT);
                let operand = JavaType::Primitive(kind.operand_kind().primitive());
                let kinds = TypeKinds::numeric_operand(kind.operand_kind());
                self.demand(0, kinds, operand.clone());
                self.demand(1, kinds, operand);
            }
            Opcode::If { condition, rhs, .. } => {
                let kinds = if condition.is_equality() {
                    TypeKinds::INT_LIKE | TypeKinds::REFERENCE
                } else {
                    TypeKinds::INTEGRAL
                };
                self.demand(0, kinds, JavaType::INT);
                if rhs.is_some() {
                    self.demand(1, kinds, JavaType::INT);
                }
            }
            Opcode::Switch { .. } => self.demand(0, TypeKinds::INTEGRAL, JavaType::INT),
            Opcode::Return { src } => {
                if src.is_some() {
                    let ret = method.descriptor.ret.clone();
                    self.demand_type(0, &ret);
                }
            }
            Opcode::Throw { .. } => {
                self.demand_type(0, &JavaType::class("java.lang.Throwable"));
            }
            Opcode::Invoke {
                kind,
                method: callee,
                ..
            } => {
                let mut expected = Vec::with_capacity(callee.descriptor.params.len() + 1);
                if *kind != InvokeKind::Static {
                    expected.push(JavaType::Class(callee.class.clone()));
                }
                expected.extend(callee.descriptor.params.iter().cloned());
                for (operand, ty) in expected.iter().enumerate() {
                    self.demand_type(operand, ty);
                }
                self.define_type(def, &callee.descriptor.ret);
            }
            Opcode::NewInstance { class, .. } => {
                self.define_type(def, &JavaType::Class(class.clone()));
            }
            Opcode::NewArray { array_type, .. } => {
                self.define_type(def, array_type);
                self.demand(0, TypeKinds::INTEGRAL, JavaType::INT);
            }
            Opcode::ArrayLength { .. } => {
                self.define_type(def, &JavaType::INT);
                self.demand(0, TypeKinds::ARRAY, JavaType::object());
            }
            Opcode::ArrayGet { kind, .. } => {
                self.define(def, TypeKinds::array_element(*kind), None);
                self.demand(0, TypeKinds::ARRAY, JavaType::object());
                self.demand(1, TypeKinds::INTEGRAL, JavaType::INT);
                if let (Some(&array), Some(element)) = (self.uses.first(), def) {
                    self.constraints.push(TypeConstraint::ArrayElement {
                        array,
                        element,
                        store: false,
                    });
                }
            }
            Opcode::ArrayPut { kind, .. } => {
                self.demand(0, TypeKinds::ARRAY, JavaType::object());
                self.demand(1, TypeKinds::INTEGRAL, JavaType::INT);
                let target = match kind {
                    ArrayKind::Wide => JavaType::LONG,
                    ArrayKind::Object => JavaType::object(),
                    ArrayKind::Boolean => JavaType::BOOLEAN,
                    ArrayKind::Byte => JavaType::Primitive(PrimitiveType::Byte),
                    ArrayKind::Char => JavaType::Primitive(PrimitiveType::Char),
                    ArrayKind::Short => JavaType::Primitive(PrimitiveType::Short),
                    ArrayKind::Narrow => JavaType::INT,
                };
                self.demand(2, TypeKinds::array_element(*kind).narrowed(), target);
                if let (Some(&array), Some(&element)) = (self.uses.first(), self.uses.get(2)) {
                    self.constraints.push(TypeConstraint::ArrayElement {
                        array,
                        element,
                        store: true,
                    });
                }
            }
            Opcode::InstanceGet { field, .. } => {
                self.demand_type(0, &JavaType::Class(field.class.clone()));
                self.define_type(def, &field.ty);
            }
            Opcode::InstancePut { field, .. } => {
                self.demand_type(0, &JavaType::Class(field.class.clone()));
                self.demand_type(1, &field.ty);
            }
            Opcode::StaticGet { field, .. } => self.define_type(def, &field.ty),
            Opcode::StaticPut { field, .. } => self.demand_type(0, &field.ty),
            Opcode::CheckCast { class, .. } => {
                self.demand_reference(0);
                self.define_type(def, class);
            }
            Opcode::InstanceOf { .. } => {
                self.demand_reference(0);
                self.define_type(def, &JavaType::BOOLEAN);
            }
            Opcode::MonitorEnter { .. } | Opcode::MonitorExit { .. } => self.demand_reference(0),
        }
    }
}

/// Returns the classes a handler entry block may receive, `Throwable` for catch-alls.
fn catch_types(cfg: &ControlFlowGraph, handler: NodeId) -> Vec<JavaType> {
    let mut types: Vec<JavaType> = Vec::new();
    let mut catch_all = false;
    for (_, block) in cfg.blocks() {
        for entry in block.protection.iter().filter(|entry| entry.handler == handler) {
            catch_all |= entry.catch_all;
            for class in &entry.catch_types {
                let ty = JavaType::Class(class.clone());
                if !types.contains(&ty) {
                    types.push(ty);
                }
            }
        }
    }
    if catch_all || types.is_empty() {
        vec![JavaType::class("java.lang.Throwable")]
    } else {
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{cfg::CfgBuilder, liveness::RegisterLiveness, ssa::SsaBuilder},
        bytecode::{BinaryOp, CodeAssembler, IfCondition, NumericKind},
    };

    #[test]
    fn test_collects_phi_assignments_and_demands() {
        let mut asm = CodeAssembler::new();
        asm.if_zero(IfCondition::Eq, 1, "zero")
            .const_int(0, 5)
            .goto("join")
            .label("zero")
            .const_int(0, 7)
            .label("join")
            .binary(BinaryOp::Add, NumericKind::Int, 0, 0, 1)
            .return_value(0);
        let method = asm.build_method("a.B", "f", "(I)I", true, 2).unwrap();
        let cfg = CfgBuilder::build(&method).unwrap();
        let liveness = RegisterLiveness::compute(&cfg, method.registers);
        let ssa = SsaBuilder::build(&cfg, &method, &liveness).unwrap();

        let constraints = collect(&cfg, &ssa, &method);
        let assigns = constraints
            .iter()
            .filter(|c| matches!(c, TypeConstraint::Assign { .. }))
            .count();
        assert_eq!(assigns, 2);
        assert!(constraints.iter().any(|c| matches!(
            c,
            TypeConstraint::Demand { kinds, target, .. }
                if *kinds == TypeKinds::INTEGRAL && *target == JavaType::INT
        )));
    }
}
