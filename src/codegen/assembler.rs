//! Lowering of SSA instructions and structured regions to statements.
//!
//! Each block is lowered once, in instruction order, into its statements plus the
//! expression of its branch or switch terminator. Single-use values defined and consumed
//! in the same block are held back as pending expressions and substituted at their use;
//! every other value becomes a named local. Phi merges leave SSA as assignments to one
//! local per phi, written at the end of each predecessor (or right before the throwing
//! instruction for handler merges). The region tree is then walked to nest the block
//! statements into Java control flow.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    analysis::{
        cfg::ControlFlowGraph,
        ssa::{SsaFunction, SsaInstruction, SsaValueId, UseSite, ValueOrigin},
        typing::{ConversionSite, TypeAssignment},
    },
    bytecode::{BinaryOp, IfCondition, InvokeKind, MethodCode, Opcode, Operand},
    codegen::{
        expression::{Expression, LValue, Literal, LocalId},
        naming::LocalNamer,
        statement::{CatchBlock, LocalVariable, MethodBody, Statement, SwitchArm},
    },
    config::DecompilerConfig,
    structure::{
        BranchCondition, CatchClause, GotoEntry, Jump, JumpCondition, JumpTarget, LoopKind, Region,
        Structure,
    },
    types::{JavaType, PrimitiveType},
    utils::graph::NodeId,
    Result,
};

/// Reordering class of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    /// Free to move
    Pure,
    /// May throw or read mutable state
    Trapping,
    /// Writes state or calls out
    Effectful,
}

fn effect_of(opcode: &Opcode) -> Effect {
    match opcode {
        Opcode::Invoke { .. }
        | Opcode::NewInstance { .. }
        | Opcode::ArrayPut { .. }
        | Opcode::InstancePut { .. }
        | Opcode::StaticPut { .. }
        | Opcode::MonitorEnter { .. }
        | Opcode::MonitorExit { .. }
        | Opcode::Return { .. }
        | Opcode::Throw { .. } => Effect::Effectful,
        Opcode::ConstString { .. } | Opcode::ConstClass { .. } | Opcode::InstanceOf { .. } => {
            Effect::Pure
        }
        other if other.can_throw() => Effect::Trapping,
        _ => Effect::Pure,
    }
}

/// A value whose expression waits for its single use.
#[derive(Debug)]
struct Pending {
    value: SsaValueId,
    expr: Expression,
    /// Contains a trapping or effectful operation
    ordered: bool,
}

/// Lowering state of one block.
#[derive(Debug, Default)]
struct BlockOut {
    statements: Vec<Statement>,
    pending: Vec<Pending>,
}

/// Output of one block.
#[derive(Debug, Default)]
struct BlockCode {
    statements: Vec<Statement>,
    condition: Option<Expression>,
    selector: Option<Expression>,
}

enum Lowered {
    Value(Expression),
    Statement(Statement),
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Loop(NodeId),
    Switch,
}

/// Builds the statement tree of one method from its SSA form, types and structure.
///
/// # Examples
///
/// ```rust,ignore
/// use dexscope::codegen::{ExpressionAssembler, JavaWriter};
///
/// let body = ExpressionAssembler::new(&cfg, &method, &ssa, &types, &structure)
///     .with_config(&config)
///     .assemble()?;
/// println!("{}", JavaWriter::new().method(&method, &body));
/// ```
pub struct ExpressionAssembler<'a> {
    cfg: &'a ControlFlowGraph,
    method: &'a MethodCode,
    ssa: &'a SsaFunction,
    types: &'a TypeAssignment,
    structure: &'a Structure,
    inline: bool,
}

impl<'a> ExpressionAssembler<'a> {
    /// Creates an assembler with expression inlining enabled.
    #[must_use]
    pub fn new(
        cfg: &'a ControlFlowGraph,
        method: &'a MethodCode,
        ssa: &'a SsaFunction,
        types: &'a TypeAssignment,
        structure: &'a Structure,
    ) -> Self {
        ExpressionAssembler {
            cfg,
            method,
            ssa,
            types,
            structure,
            inline: true,
        }
    }

    /// Applies the inlining setting of `config`.
    #[must_use]
    pub fn with_config(mut self, config: &DecompilerConfig) -> Self {
        self.inline = config.inline_expressions;
        self
    }

    /// Lowers the method.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the SSA form or the region tree does not
    /// match the control flow graph.
    pub fn assemble(self) -> Result<MethodBody> {
        let mut lowering = Lowering::new(&self);
        lowering.plan();
        for block in self.cfg.block_ids() {
            let code = lowering.lower_block(block)?;
            lowering.blocks[block.index()] = code;
        }

        let mut body = Vec::new();
        lowering.region(self.structure.root(), &mut body)?;
        if self.method.descriptor.ret == JavaType::Void
            && matches!(body.last(), Some(Statement::Return(None)))
        {
            body.pop();
        }

        let mut statements: Vec<Statement> =
            lowering.declared.iter().map(|&local| Statement::Declare(local)).collect();
        statements.extend(body);
        Ok(MethodBody {
            locals: lowering.locals,
            params: lowering.params,
            statements,
        })
    }
}

struct Lowering<'a> {
    cfg: &'a ControlFlowGraph,
    method: &'a MethodCode,
    ssa: &'a SsaFunction,
    types: &'a TypeAssignment,
    structure: &'a Structure,
    inline: bool,

    locals: Vec<LocalVariable>,
    namer: LocalNamer,
    params: Vec<LocalId>,
    receiver: Option<SsaValueId>,
    value_locals: Vec<Option<LocalId>>,
    /// Held back until their single use in the defining block
    inlinable: Vec<bool>,
    /// Written straight into the local of the phi they feed
    coalesced: Vec<bool>,
    /// Constants re-emitted at the phi copy that is their only use
    rematerialized: Vec<bool>,
    /// `new-instance` values with the index of their constructor call
    fused: BTreeMap<SsaValueId, usize>,
    /// Locals declared at the top of the body
    declared: BTreeSet<LocalId>,

    blocks: Vec<BlockCode>,
    scopes: Vec<Scope>,
    labelled: BTreeSet<NodeId>,
}

impl<'a> Lowering<'a> {
    fn new(assembler: &ExpressionAssembler<'a>) -> Self {
        let values = assembler.ssa.value_count();
        Lowering {
            cfg: assembler.cfg,
            method: assembler.method,
            ssa: assembler.ssa,
            types: assembler.types,
            structure: assembler.structure,
            inline: assembler.inline,
            locals: Vec::new(),
            namer: LocalNamer::new(),
            params: Vec::new(),
            receiver: None,
            value_locals: vec![None; values],
            inlinable: vec![false; values],
            coalesced: vec![false; values],
            rematerialized: vec![false; values],
            fused: BTreeMap::new(),
            declared: BTreeSet::new(),
            blocks: (0..assembler.cfg.block_count()).map(|_| BlockCode::default()).collect(),
            scopes: Vec::new(),
            labelled: BTreeSet::new(),
        }
    }

    fn opcode(&self, index: usize) -> Option<&'a Opcode> {
        self.cfg.all_instructions().get(index).map(|insn| &insn.opcode)
    }

    fn new_local(&mut self, ty: JavaType, parameter: bool) -> LocalId {
        let id = LocalId::new(self.locals.len());
        let name = self.namer.name(&ty);
        self.locals.push(LocalVariable {
            name,
            ty,
            parameter,
        });
        id
    }

    fn local_of(&mut self, value: SsaValueId) -> LocalId {
        if let Some(local) = self.value_locals.get(value.index()).copied().flatten() {
            return local;
        }
        let local = self.new_local(self.types.type_of(value), false);
        if let Some(slot) = self.value_locals.get_mut(value.index()) {
            *slot = Some(local);
        }
        local
    }

    fn flag(flags: &[bool], value: SsaValueId) -> bool {
        flags.get(value.index()).copied().unwrap_or(false)
    }

    fn set_flag(flags: &mut [bool], value: SsaValueId) {
        if let Some(flag) = flags.get_mut(value.index()) {
            *flag = true;
        }
    }

    /// Returns `true` for the receiver operand of the constructor call fused with a
    /// `new-instance`.
    fn is_init_receiver(&self, value: SsaValueId, site: &UseSite) -> bool {
        matches!(
            (self.fused.get(&value), site),
            (Some(&init), UseSite::Instruction { index, operand: 0, .. }) if *index == init
        )
    }

    fn remaining_uses(&self, value: SsaValueId) -> Vec<UseSite> {
        self.ssa.value(value).map_or_else(Vec::new, |data| {
            data.uses()
                .iter()
                .filter(|site| !self.is_init_receiver(value, site))
                .copied()
                .collect()
        })
    }

    /// The block a use reads its value in; phi operands are read in their predecessor.
    fn use_block(&self, site: &UseSite) -> Option<NodeId> {
        match *site {
            UseSite::Instruction { block, .. } => Some(block),
            UseSite::Phi {
                block,
                phi,
                operand,
            } => self
                .ssa
                .block(block)?
                .phis
                .get(phi)?
                .operands()
                .get(operand)
                .map(|operand| operand.predecessor),
        }
    }

    /// Decides which values get locals, which are inlined and where phis merge.
    fn plan(&mut self) {
        let ssa = self.ssa;
        let mut params = ssa.params();
        if !self.method.is_static {
            if let Some((&receiver, rest)) = params.split_first() {
                self.receiver = Some(receiver);
                params = rest;
            }
        }
        for (position, &value) in params.iter().enumerate() {
            let ty = self
                .method
                .descriptor
                .params
                .get(position)
                .cloned()
                .unwrap_or_else(|| self.types.type_of(value));
            let local = self.new_local(ty, true);
            self.value_locals[value.index()] = Some(local);
            self.params.push(local);
        }

        for data in ssa.blocks() {
            for insn in &data.instructions {
                if let (Some(Opcode::NewInstance { .. }), Some(value)) = (self.opcode(insn.index), insn.def) {
                    let init = data.instructions.iter().find(|later| {
                        later.index > insn.index
                            && later.uses.first() == Some(&value)
                            && matches!(self.opcode(later.index), Some(Opcode::Invoke { method, .. }) if method.is_constructor())
                    });
                    if let Some(init) = init {
                        if !self.structure.is_suppressed(init.index) {
                            self.fused.insert(value, init.index);
                        }
                    }
                }
            }
        }

        for (_, phi) in ssa.phis() {
            let local = self.local_of(phi.result());
            self.declared.insert(local);
        }

        for data in ssa.values() {
            let value = data.id();
            let ValueOrigin::Instruction { block, index } = data.origin() else {
                continue;
            };
            if self.structure.is_suppressed(index) {
                continue;
            }
            let Some(opcode) = self.opcode(index) else {
                continue;
            };
            if matches!(opcode, Opcode::MoveException { .. }) {
                continue;
            }
            let def_index = self.fused.get(&value).copied().unwrap_or(index);
            let uses = self.remaining_uses(value);
            match uses[..] {
                [UseSite::Instruction {
                    block: use_block,
                    index: use_index,
                    ..
                }] if self.inline
                    && use_block == block
                    && use_index > def_index
                    && !self.structure.is_suppressed(use_index) =>
                {
                    Self::set_flag(&mut self.inlinable, value);
                }
                [UseSite::Phi { .. }]
                    if self.inline
                        && matches!(
                            opcode,
                            Opcode::Const { .. }
                                | Opcode::ConstWide { .. }
                                | Opcode::ConstString { .. }
                                | Opcode::ConstClass { .. }
                        ) =>
                {
                    Self::set_flag(&mut self.rematerialized, value);
                }
                _ => {}
            }
        }

        self.coalesce();

        for data in ssa.values() {
            let value = data.id();
            let ValueOrigin::Instruction { block, index } = data.origin() else {
                continue;
            };
            if Self::flag(&self.inlinable, value)
                || Self::flag(&self.coalesced, value)
                || Self::flag(&self.rematerialized, value)
                || self.structure.is_suppressed(index)
                || matches!(self.opcode(index), Some(Opcode::MoveException { .. }))
            {
                continue;
            }
            let escapes = self
                .remaining_uses(value)
                .iter()
                .any(|site| self.use_block(site) != Some(block));
            if escapes {
                let local = self.local_of(value);
                self.declared.insert(local);
            }
        }
    }

    /// Lets a phi operand defined in its predecessor write the phi's local directly.
    ///
    /// The predecessor must flow only into the phi's block, and must not read the phi's
    /// previous value after the definition.
    fn coalesce(&mut self) {
        let ssa = self.ssa;
        for (join, phi) in ssa.phis() {
            for operand in phi.operands() {
                let value = operand.value;
                let pred = operand.predecessor;
                let Some(data) = ssa.value(value) else {
                    continue;
                };
                let ValueOrigin::Instruction { block, index } = data.origin() else {
                    continue;
                };
                if block != pred
                    || data.use_count() != 1
                    || Self::flag(&self.coalesced, value)
                    || self.structure.is_suppressed(index)
                    || self.fused.contains_key(&value)
                    || matches!(self.opcode(index), Some(Opcode::MoveException { .. }))
                {
                    continue;
                }
                if !matches!(self.cfg.edge_between(pred, join), Some(edge) if edge.is_normal()) {
                    continue;
                }
                let targets: BTreeSet<NodeId> = self
                    .cfg
                    .outgoing(pred)
                    .filter(|(_, edge)| edge.is_normal())
                    .map(|(target, _)| target)
                    .collect();
                if targets.len() != 1 {
                    continue;
                }

                let result = phi.result();
                let read_later = ssa.value(result).is_some_and(|phi_value| {
                    phi_value.uses().iter().any(|site| match *site {
                        UseSite::Instruction {
                            block: use_block,
                            index: use_index,
                            ..
                        } => use_block == pred && use_index > index,
                        UseSite::Phi { .. } => self.use_block(site) == Some(pred),
                    })
                });
                if read_later {
                    continue;
                }

                let local = self.local_of(result);
                self.value_locals[value.index()] = Some(local);
                Self::set_flag(&mut self.coalesced, value);
                if let Some(flag) = self.rematerialized.get_mut(value.index()) {
                    *flag = false;
                }
            }
        }
    }
}

impl<'a> Lowering<'a> {
    fn lower_block(&mut self, block: NodeId) -> Result<BlockCode> {
        let (cfg, ssa) = (self.cfg, self.ssa);
        let data = cfg
            .block(block)
            .ok_or_else(|| malformed_error!("block {} is not part of the graph", block))?;
        let normal_targets: BTreeSet<NodeId> = cfg
            .outgoing(block)
            .filter(|(_, edge)| edge.is_normal())
            .map(|(target, _)| target)
            .collect();
        let branching = normal_targets.len() > 1;

        let mut out = BlockOut::default();
        let mut terminator = None;
        for index in data.range.clone() {
            if self.structure.is_suppressed(index) {
                continue;
            }
            let insn = ssa
                .instruction(block, index)
                .ok_or_else(|| malformed_error!("instruction {} of {} has no SSA form", index, block))?;
            if insn.folded {
                continue;
            }
            if data.throw_point == Some(index) {
                let copies = self.edge_copies(block, true);
                self.sequentialize(copies, &mut out);
            }
            let opcode = self
                .opcode(index)
                .ok_or_else(|| malformed_error!("instruction {} is out of range", index))?;
            match opcode {
                Opcode::If { .. } | Opcode::Switch { .. } => {
                    if branching {
                        terminator = Some((index, opcode, insn));
                    }
                }
                _ => self.lower_instruction(block, index, opcode, insn, &mut out),
            }
        }

        let mut code = BlockCode::default();
        match terminator {
            Some((index, Opcode::If { condition, rhs, .. }, insn)) => {
                code.condition = Some(self.branch_condition(block, index, *condition, rhs.is_some(), insn, &mut out));
            }
            Some((index, Opcode::Switch { .. }, insn)) => {
                let mut ordered = false;
                let selector = insn.uses.first().copied().map(|value| {
                    self.operand(block, index, 0, value, &mut out, &mut ordered)
                });
                code.selector = selector;
            }
            _ => {}
        }

        for pending in std::mem::take(&mut out.pending) {
            if pending.ordered {
                self.materialize(pending, &mut out);
            }
        }

        let copies = self.edge_copies(block, false);
        if !copies.is_empty() {
            let written: Vec<LocalId> = copies.iter().map(|(dst, _)| *dst).collect();
            let overwritten = |expr: &Option<Expression>| {
                expr.as_ref()
                    .is_some_and(|expr| written.iter().any(|&local| expr.reads(local)))
            };
            if overwritten(&code.condition) {
                code.condition = code
                    .condition
                    .take()
                    .map(|expr| Expression::Local(self.snapshot(JavaType::BOOLEAN, expr, &mut out)));
            }
            if overwritten(&code.selector) {
                code.selector = code
                    .selector
                    .take()
                    .map(|expr| Expression::Local(self.snapshot(JavaType::INT, expr, &mut out)));
            }
            self.sequentialize(copies, &mut out);
        }

        code.statements = out.statements;
        Ok(code)
    }

    fn snapshot(&mut self, ty: JavaType, expr: Expression, out: &mut BlockOut) -> LocalId {
        let local = self.new_local(ty, false);
        out.statements.push(Statement::Assign {
            target: LValue::Local(local),
            value: expr,
            declare: true,
        });
        local
    }

    fn lower_instruction(
        &mut self,
        block: NodeId,
        index: usize,
        opcode: &'a Opcode,
        insn: &SsaInstruction,
        out: &mut BlockOut,
    ) {
        if matches!(opcode, Opcode::NewInstance { .. })
            && insn.def.is_some_and(|value| self.fused.contains_key(&value))
        {
            return;
        }
        let allocation = match opcode {
            Opcode::Invoke { method, .. } if method.is_constructor() => insn
                .uses
                .first()
                .copied()
                .filter(|receiver| self.fused.contains_key(receiver)),
            _ => None,
        };
        let first = usize::from(allocation.is_some());

        let effect = effect_of(opcode);
        if effect != Effect::Pure {
            self.flush_ordered(&insn.uses[first..], out);
        }
        let mut ordered = false;
        let mut ops: Vec<Expression> = Vec::with_capacity(insn.uses.len());
        for (position, &value) in insn.uses.iter().enumerate() {
            if position < first {
                ops.push(Expression::This);
            } else {
                ops.push(self.operand(block, index, position, value, out, &mut ordered));
            }
        }
        let mut ops = ops.into_iter();
        let mut next = || ops.next().unwrap_or(Expression::Literal(Literal::Null));

        let def = allocation.or(insn.def);
        let lowered = match opcode {
            Opcode::Nop
            | Opcode::Goto { .. }
            | Opcode::MoveResult { .. }
            | Opcode::MoveException { .. }
            | Opcode::If { .. }
            | Opcode::Switch { .. } => Lowered::Nothing,
            Opcode::Move { .. } => Lowered::Value(next()),
            Opcode::Const { value, .. } => {
                Lowered::Value(Expression::Literal(def.map_or(Literal::Int(*value), |d| self.int_literal(d, *value))))
            }
            Opcode::ConstWide { value, .. } => {
                Lowered::Value(Expression::Literal(def.map_or(Literal::Long(*value), |d| self.wide_literal(d, *value))))
            }
            Opcode::ConstString { value, .. } => {
                Lowered::Value(Expression::Literal(Literal::String(value.clone())))
            }
            Opcode::ConstClass { class, .. } => {
                Lowered::Value(Expression::Literal(Literal::Class(class.clone())))
            }
            Opcode::Unary { op, .. } => Lowered::Value(Expression::Unary {
                op: *op,
                operand: Box::new(next()),
            }),
            Opcode::Convert { to, .. } => Lowered::Value(Expression::Cast {
                ty: JavaType::Primitive(*to),
                operand: Box::new(next()),
            }),
            Opcode::Binary { op, rhs, .. } => {
                let lhs = next();
                let boolean = def.is_some_and(|d| self.types.type_of(d) == JavaType::BOOLEAN);
                match rhs {
                    Operand::Literal(1) if boolean && *op == BinaryOp::Xor => {
                        Lowered::Value(lhs.negate())
                    }
                    Operand::Literal(literal) => Lowered::Value(Expression::Binary {
                        op: *op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(Expression::Literal(if boolean {
                            Literal::Boolean(*literal != 0)
                        } else {
                            Literal::Int(*literal)
                        })),
                    }),
                    Operand::Register(_) => Lowered::Value(Expression::Binary {
                        op: *op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(next()),
                    }),
                }
            }
            Opcode::Compare { kind, .. } => Lowered::Value(Expression::Compare {
                kind: *kind,
                lhs: Box::new(next()),
                rhs: Box::new(next()),
            }),
            Opcode::Return { src } => Lowered::Statement(Statement::Return(src.map(|_| next()))),
            Opcode::Throw { .. } => Lowered::Statement(Statement::Throw(next())),
            Opcode::Invoke { kind, method, .. } => {
                let receiver = if *kind == InvokeKind::Static { None } else { Some(next()) };
                let count = insn.uses.len().saturating_sub(usize::from(receiver.is_some()));
                let args: Vec<Expression> = (0..count).map(|_| next()).collect();
                if allocation.is_some() {
                    Lowered::Value(Expression::New {
                        class: method.class.clone(),
                        args,
                    })
                } else if method.is_constructor()
                    && self.method.is_constructor()
                    && receiver == Some(Expression::This)
                {
                    Lowered::Statement(Statement::ConstructorCall {
                        delegate: method.class == self.method.class,
                        args,
                    })
                } else {
                    Lowered::Value(Expression::Invoke {
                        kind: *kind,
                        method: method.clone(),
                        receiver: receiver.map(Box::new),
                        args,
                    })
                }
            }
            Opcode::NewInstance { class, .. } => Lowered::Value(Expression::New {
                class: class.clone(),
                args: Vec::new(),
            }),
            Opcode::NewArray { array_type, .. } => Lowered::Value(Expression::NewArray {
                element: array_type.element_type().cloned().unwrap_or_else(JavaType::object),
                size: Box::new(next()),
            }),
            Opcode::ArrayLength { .. } => Lowered::Value(Expression::ArrayLength(Box::new(next()))),
            Opcode::ArrayGet { .. } => Lowered::Value(Expression::ArrayGet {
                array: Box::new(next()),
                index: Box::new(next()),
            }),
            Opcode::ArrayPut { .. } => {
                let (array, index) = (next(), next());
                Lowered::Statement(Statement::Assign {
                    target: LValue::ArrayElement { array, index },
                    value: next(),
                    declare: false,
                })
            }
            Opcode::InstanceGet { field, .. } => Lowered::Value(Expression::InstanceField {
                object: Box::new(next()),
                field: field.clone(),
            }),
            Opcode::InstancePut { field, .. } => {
                let object = next();
                Lowered::Statement(Statement::Assign {
                    target: LValue::InstanceField {
                        object,
                        field: field.clone(),
                    },
                    value: next(),
                    declare: false,
                })
            }
            Opcode::StaticGet { field, .. } => Lowered::Value(Expression::StaticField(field.clone())),
            Opcode::StaticPut { field, .. } => Lowered::Statement(Statement::Assign {
                target: LValue::StaticField(field.clone()),
                value: next(),
                declare: false,
            }),
            Opcode::CheckCast { class, .. } => Lowered::Value(Expression::Cast {
                ty: class.clone(),
                operand: Box::new(next()),
            }),
            Opcode::InstanceOf { class, .. } => Lowered::Value(Expression::InstanceOf {
                operand: Box::new(next()),
                ty: class.clone(),
            }),
            Opcode::MonitorEnter { .. } | Opcode::MonitorExit { .. } => {
                Lowered::Statement(Statement::Monitor {
                    enter: matches!(opcode, Opcode::MonitorEnter { .. }),
                    object: next(),
                })
            }
        };

        match lowered {
            Lowered::Nothing => {}
            Lowered::Statement(statement) => out.statements.push(statement),
            Lowered::Value(expr) => self.define(def, expr, effect, ordered, out),
        }
    }

    /// Binds the result of an instruction: held back, assigned to a local, or evaluated
    /// for its effect only.
    fn define(
        &mut self,
        def: Option<SsaValueId>,
        expr: Expression,
        effect: Effect,
        consumed_ordered: bool,
        out: &mut BlockOut,
    ) {
        let ordered = effect != Effect::Pure || consumed_ordered;
        let Some(value) = def else {
            out.statements.push(Statement::Expression(expr));
            return;
        };
        if Self::flag(&self.inlinable, value) {
            out.pending.push(Pending {
                value,
                expr,
                ordered,
            });
            return;
        }
        if Self::flag(&self.rematerialized, value) {
            return;
        }
        if self.remaining_uses(value).is_empty() {
            match expr {
                Expression::Invoke { .. } | Expression::New { .. } => {
                    out.statements.push(Statement::Expression(expr));
                }
                expr if ordered => self.assign(value, expr, out),
                _ => {}
            }
            return;
        }
        self.assign(value, expr, out);
    }

    fn assign(&mut self, value: SsaValueId, expr: Expression, out: &mut BlockOut) {
        let local = self.local_of(value);
        let expr = if Self::flag(&self.coalesced, value) {
            match self.ssa.value(value).and_then(|data| data.uses().first().copied()) {
                Some(UseSite::Phi {
                    block,
                    phi,
                    operand,
                }) => self.convert(
                    expr,
                    &ConversionSite::PhiOperand {
                        block,
                        phi,
                        operand,
                    },
                ),
                _ => expr,
            }
        } else {
            expr
        };
        self.write_local(local, expr, out);
    }

    fn write_local(&mut self, local: LocalId, expr: Expression, out: &mut BlockOut) {
        self.flush_reading(local, out);
        out.statements.push(Statement::Assign {
            target: LValue::Local(local),
            value: expr,
            declare: !self.declared.contains(&local),
        });
    }

    /// Emits a held-back value as a local assignment.
    fn materialize(&mut self, pending: Pending, out: &mut BlockOut) {
        let local = self.local_of(pending.value);
        out.statements.push(Statement::Assign {
            target: LValue::Local(local),
            value: pending.expr,
            declare: !self.declared.contains(&local),
        });
    }

    /// Emits the held-back ordered values the current instruction does not consume.
    fn flush_ordered(&mut self, uses: &[SsaValueId], out: &mut BlockOut) {
        while let Some(position) = out
            .pending
            .iter()
            .position(|pending| pending.ordered && !uses.contains(&pending.value))
        {
            let pending = out.pending.remove(position);
            self.materialize(pending, out);
        }
    }

    /// Emits the held-back values that read `local` before it is overwritten.
    fn flush_reading(&mut self, local: LocalId, out: &mut BlockOut) {
        let mut index = 0;
        while index < out.pending.len() {
            if out.pending[index].expr.reads(local) {
                let pending = out.pending.remove(index);
                self.materialize(pending, out);
            } else {
                index += 1;
            }
        }
    }

    fn operand(
        &mut self,
        block: NodeId,
        index: usize,
        position: usize,
        value: SsaValueId,
        out: &mut BlockOut,
        ordered: &mut bool,
    ) -> Expression {
        let expr = match out.pending.iter().position(|pending| pending.value == value) {
            Some(at) => {
                let pending = out.pending.remove(at);
                *ordered |= pending.ordered;
                pending.expr
            }
            None => self.reference(value),
        };
        self.convert(
            expr,
            &ConversionSite::Use {
                block,
                index,
                operand: position,
            },
        )
    }

    fn convert(&self, expr: Expression, site: &ConversionSite) -> Expression {
        match self.types.conversion(site) {
            Some(ty) => Expression::Cast {
                ty: ty.clone(),
                operand: Box::new(expr),
            },
            None => expr,
        }
    }

    /// Returns the expression naming an already computed value.
    fn reference(&mut self, value: SsaValueId) -> Expression {
        if Some(value) == self.receiver {
            return Expression::This;
        }
        if let Some(local) = self.value_locals.get(value.index()).copied().flatten() {
            return Expression::Local(local);
        }
        let origin = self.ssa.value(value).map(|data| data.origin());
        match origin {
            Some(ValueOrigin::Undefined) | None => {
                Expression::Literal(default_literal(&self.types.type_of(value)))
            }
            Some(ValueOrigin::Instruction { index, .. }) if Self::flag(&self.rematerialized, value) => {
                match self.opcode(index) {
                    Some(Opcode::Const { value: bits, .. }) => {
                        Expression::Literal(self.int_literal(value, *bits))
                    }
                    Some(Opcode::ConstWide { value: bits, .. }) => {
                        Expression::Literal(self.wide_literal(value, *bits))
                    }
                    Some(Opcode::ConstString { value, .. }) => {
                        Expression::Literal(Literal::String(value.clone()))
                    }
                    Some(Opcode::ConstClass { class, .. }) => {
                        Expression::Literal(Literal::Class(class.clone()))
                    }
                    _ => Expression::Local(self.local_of(value)),
                }
            }
            Some(_) => Expression::Local(self.local_of(value)),
        }
    }

    fn int_literal(&self, value: SsaValueId, bits: i32) -> Literal {
        match self.types.type_of(value) {
            JavaType::Primitive(PrimitiveType::Float) => {
                Literal::Float(f32::from_bits(u32::from_ne_bytes(bits.to_ne_bytes())))
            }
            JavaType::Primitive(PrimitiveType::Boolean) => Literal::Boolean(bits != 0),
            JavaType::Primitive(PrimitiveType::Char) => {
                u16::try_from(bits).map_or(Literal::Int(bits), Literal::Char)
            }
            JavaType::Primitive(PrimitiveType::Long) => Literal::Long(i64::from(bits)),
            JavaType::Primitive(PrimitiveType::Double) => Literal::Double(f64::from(bits)),
            ty if ty.is_reference() && bits == 0 => Literal::Null,
            _ => Literal::Int(bits),
        }
    }

    fn wide_literal(&self, value: SsaValueId, bits: i64) -> Literal {
        if self.types.type_of(value) == JavaType::DOUBLE {
            Literal::Double(f64::from_bits(u64::from_ne_bytes(bits.to_ne_bytes())))
        } else {
            Literal::Long(bits)
        }
    }

    fn branch_condition(
        &mut self,
        block: NodeId,
        index: usize,
        condition: IfCondition,
        binary: bool,
        insn: &SsaInstruction,
        out: &mut BlockOut,
    ) -> Expression {
        let mut ordered = false;
        let Some(&lhs_value) = insn.uses.first() else {
            return Expression::Literal(Literal::Boolean(false));
        };
        let lhs = self.operand(block, index, 0, lhs_value, out, &mut ordered);
        if binary {
            let rhs = match insn.uses.get(1) {
                Some(&value) => self.operand(block, index, 1, value, out, &mut ordered),
                None => Expression::Literal(Literal::Int(0)),
            };
            return Expression::Condition {
                op: condition,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }

        let ty = self.types.type_of(lhs_value);
        match lhs {
            Expression::Compare { lhs, rhs, .. } => Expression::Condition {
                op: condition,
                lhs,
                rhs,
            },
            lhs if ty == JavaType::BOOLEAN && condition.is_equality() => {
                if condition == IfCondition::Eq {
                    lhs.negate()
                } else {
                    lhs
                }
            }
            lhs => Expression::Condition {
                op: condition,
                lhs: Box::new(lhs),
                rhs: Box::new(Expression::Literal(if ty.is_reference() {
                    Literal::Null
                } else {
                    Literal::Int(0)
                })),
            },
        }
    }

    /// Returns the phi assignments on the normal or exceptional edges leaving `block`.
    fn edge_copies(&mut self, block: NodeId, exceptional: bool) -> Vec<(LocalId, Expression)> {
        let ssa = self.ssa;
        let targets: BTreeSet<NodeId> = self
            .cfg
            .outgoing(block)
            .filter(|(_, edge)| edge.is_exceptional() == exceptional)
            .map(|(target, _)| target)
            .collect();

        let mut copies = Vec::new();
        for target in targets {
            let Some(data) = ssa.block(target) else {
                continue;
            };
            for (position, phi) in data.phis.iter().enumerate() {
                for (operand, incoming) in phi.operands().iter().enumerate() {
                    if incoming.predecessor != block || Self::flag(&self.coalesced, incoming.value) {
                        continue;
                    }
                    let dst = self.local_of(phi.result());
                    let src = self.reference(incoming.value);
                    let src = self.convert(
                        src,
                        &ConversionSite::PhiOperand {
                            block: target,
                            phi: position,
                            operand,
                        },
                    );
                    if src != Expression::Local(dst) {
                        copies.push((dst, src));
                    }
                }
            }
        }
        copies
    }

    /// Emits parallel copies one at a time, breaking cycles with a temporary.
    fn sequentialize(&mut self, mut copies: Vec<(LocalId, Expression)>, out: &mut BlockOut) {
        while !copies.is_empty() {
            let ready = (0..copies.len()).find(|&i| {
                let dst = copies[i].0;
                copies
                    .iter()
                    .enumerate()
                    .all(|(j, (_, src))| j == i || !src.reads(dst))
            });
            match ready {
                Some(i) => {
                    let (dst, src) = copies.remove(i);
                    self.write_local(dst, src, out);
                }
                None => {
                    let dst = copies[0].0;
                    let ty = self.locals[dst.index()].ty.clone();
                    let temp = self.snapshot(ty, Expression::Local(dst), out);
                    for (_, src) in &mut copies {
                        src.replace_local(dst, temp);
                    }
                }
            }
        }
    }
}

impl<'a> Lowering<'a> {
    fn region(&mut self, region: &'a Region, out: &mut Vec<Statement>) -> Result<()> {
        match region {
            Region::Block(block) => {
                let code = self
                    .blocks
                    .get_mut(block.index())
                    .ok_or_else(|| malformed_error!("region names unknown block {}", block))?;
                out.append(&mut code.statements);
            }
            Region::Sequence(items) => {
                for item in items {
                    self.region(item, out)?;
                }
            }
            Region::If {
                head,
                condition,
                then_region,
                else_region,
            } => {
                self.region(head, out)?;
                let mut condition = self.condition(*condition)?;
                let mut then_branch = Vec::new();
                self.region(then_region, &mut then_branch)?;
                let mut else_branch = Vec::new();
                if let Some(else_region) = else_region {
                    self.region(else_region, &mut else_branch)?;
                }
                if then_branch.is_empty() && !else_branch.is_empty() {
                    std::mem::swap(&mut then_branch, &mut else_branch);
                    condition = condition.negate();
                }
                out.push(Statement::If {
                    condition,
                    then_branch,
                    else_branch,
                });
            }
            Region::Loop {
                kind,
                header,
                head,
                condition,
                body,
            } => self.lower_loop(*kind, *header, head.as_deref(), *condition, body, out)?,
            Region::Switch { head, block, cases } => {
                self.region(head, out)?;
                let selector = self
                    .blocks
                    .get_mut(block.index())
                    .and_then(|code| code.selector.take())
                    .ok_or_else(|| malformed_error!("block {} has no switch selector", block))?;
                self.scopes.push(Scope::Switch);
                let mut arms = Vec::with_capacity(cases.len());
                for case in cases {
                    let mut body = Vec::new();
                    self.region(&case.body, &mut body)?;
                    if !case.falls_through && !body.last().is_some_and(Statement::is_abrupt) {
                        body.push(Statement::Break(None));
                    }
                    arms.push(SwitchArm {
                        keys: case.keys.clone(),
                        default: case.default,
                        body,
                    });
                }
                self.scopes.pop();
                out.push(Statement::Switch { selector, arms });
            }
            Region::TryCatch {
                body,
                catches,
                finally,
            } => {
                let mut protected = Vec::new();
                self.region(body, &mut protected)?;
                let mut clauses = Vec::with_capacity(catches.len());
                for clause in catches {
                    clauses.push(self.catch_block(clause)?);
                }
                let finally = match finally {
                    Some(region) => {
                        let mut statements = Vec::new();
                        self.region(region, &mut statements)?;
                        Some(statements)
                    }
                    None => None,
                };
                out.push(Statement::Try {
                    body: protected,
                    catches: clauses,
                    finally,
                });
            }
            Region::Break(header) => out.push(self.break_to(*header)),
            Region::Continue(header) => out.push(self.continue_to(*header)),
            Region::Goto(entries) => {
                for entry in entries {
                    self.goto_entry(entry, out)?;
                }
            }
        }
        Ok(())
    }

    /// Takes the branch expression of a block, in the sense the region proceeds on.
    fn condition(&mut self, branch: BranchCondition) -> Result<Expression> {
        let condition = self
            .blocks
            .get_mut(branch.block.index())
            .and_then(|code| code.condition.take())
            .ok_or_else(|| malformed_error!("block {} has no branch condition", branch.block))?;
        Ok(if branch.negated {
            condition.negate()
        } else {
            condition
        })
    }

    fn lower_loop(
        &mut self,
        kind: LoopKind,
        header: NodeId,
        head: Option<&'a Region>,
        condition: Option<BranchCondition>,
        body: &'a Region,
        out: &mut Vec<Statement>,
    ) -> Result<()> {
        self.scopes.push(Scope::Loop(header));
        let mut head_statements = Vec::new();
        if let Some(head) = head {
            self.region(head, &mut head_statements)?;
        }
        let condition = condition.map(|branch| self.condition(branch)).transpose()?;
        let mut statements = Vec::new();
        self.region(body, &mut statements)?;
        self.scopes.pop();

        let label = self
            .labelled
            .contains(&header)
            .then(|| format!("loop{}", header.index()));
        out.push(match (kind, condition) {
            (LoopKind::While, Some(condition)) if head_statements.is_empty() => Statement::While {
                label,
                condition,
                body: statements,
            },
            (LoopKind::While, Some(condition)) => {
                head_statements.push(Statement::If {
                    condition: condition.negate(),
                    then_branch: vec![Statement::Break(None)],
                    else_branch: Vec::new(),
                });
                head_statements.append(&mut statements);
                Statement::Loop {
                    label,
                    body: head_statements,
                }
            }
            (LoopKind::DoWhile, Some(condition)) => Statement::DoWhile {
                label,
                body: statements,
                condition,
            },
            _ => {
                head_statements.append(&mut statements);
                Statement::Loop {
                    label,
                    body: head_statements,
                }
            }
        });
        Ok(())
    }

    fn catch_block(&mut self, clause: &'a CatchClause) -> Result<CatchBlock> {
        let types = if clause.catch_all || clause.catch_types.is_empty() {
            vec![JavaType::class("java.lang.Throwable")]
        } else {
            clause.catch_types.iter().cloned().map(JavaType::Class).collect()
        };
        let local = self.catch_local(clause.handler, &types);
        let mut body = Vec::new();
        self.region(&clause.body, &mut body)?;
        Ok(CatchBlock { types, local, body })
    }

    /// The exception variable: the `move-exception` result of the handler, or a fresh
    /// local when the handler ignores the exception.
    fn catch_local(&mut self, handler: NodeId, types: &[JavaType]) -> LocalId {
        let caught = self.cfg.block(handler).and_then(|data| {
            let index = data.range.start;
            match self.opcode(index) {
                Some(Opcode::MoveException { .. }) => self.ssa.instruction(handler, index)?.def,
                _ => None,
            }
        });
        match caught {
            Some(value) => self.local_of(value),
            None => {
                let ty = match types {
                    [single] => single.clone(),
                    _ => JavaType::class("java.lang.Throwable"),
                };
                self.new_local(ty, false)
            }
        }
    }

    fn goto_entry(&mut self, entry: &'a GotoEntry, out: &mut Vec<Statement>) -> Result<()> {
        out.push(Statement::Label(goto_label(entry.label)));
        self.region(&entry.body, out)?;

        for jump in &entry.jumps {
            if jump.condition == JumpCondition::Exception {
                out.push(Statement::Comment(format!(
                    "on exception: {}",
                    jump_text(jump.target)
                )));
            }
        }

        let mut cases: Vec<(NodeId, SwitchArm)> = Vec::new();
        let mut unconditional = Vec::new();
        for jump in &entry.jumps {
            match &jump.condition {
                JumpCondition::Exception => {}
                JumpCondition::Always => unconditional.push(jump),
                JumpCondition::Branch { block, taken } => {
                    let condition = self
                        .blocks
                        .get_mut(block.index())
                        .and_then(|code| code.condition.take());
                    let statement = self.jump(jump);
                    match condition {
                        Some(condition) => out.push(Statement::If {
                            condition: if *taken { condition } else { condition.negate() },
                            then_branch: vec![statement],
                            else_branch: Vec::new(),
                        }),
                        None => out.push(statement),
                    }
                }
                JumpCondition::Case { block, .. } if !self.has_selector(*block) => {
                    // Every case and the default share one target.
                    unconditional.push(jump);
                }
                JumpCondition::Case {
                    block,
                    keys,
                    default,
                } => {
                    self.scopes.push(Scope::Switch);
                    let statement = self.jump(jump);
                    self.scopes.pop();
                    cases.push((
                        *block,
                        SwitchArm {
                            keys: keys.clone(),
                            default: *default,
                            body: vec![statement],
                        },
                    ));
                }
            }
        }

        if let Some(&(block, _)) = cases.first() {
            let selector = self
                .blocks
                .get_mut(block.index())
                .and_then(|code| code.selector.take())
                .ok_or_else(|| malformed_error!("block {} has no switch selector", block))?;
            out.push(Statement::Switch {
                selector,
                arms: cases.into_iter().map(|(_, arm)| arm).collect(),
            });
        }
        for jump in unconditional {
            let statement = self.jump(jump);
            out.push(statement);
        }
        Ok(())
    }

    fn has_selector(&self, block: NodeId) -> bool {
        self.blocks
            .get(block.index())
            .is_some_and(|code| code.selector.is_some())
    }

    fn jump(&mut self, jump: &Jump) -> Statement {
        match jump.target {
            JumpTarget::Label(block) => Statement::Goto(goto_label(block)),
            JumpTarget::Break(header) => self.break_to(header),
            JumpTarget::Continue(header) => self.continue_to(header),
        }
    }

    fn break_to(&mut self, header: NodeId) -> Statement {
        if self.scopes.last() == Some(&Scope::Loop(header)) {
            Statement::Break(None)
        } else {
            self.labelled.insert(header);
            Statement::Break(Some(format!("loop{}", header.index())))
        }
    }

    fn continue_to(&mut self, header: NodeId) -> Statement {
        let innermost = self.scopes.iter().rev().find_map(|scope| match scope {
            Scope::Loop(loop_header) => Some(*loop_header),
            Scope::Switch => None,
        });
        if innermost == Some(header) {
            Statement::Continue(None)
        } else {
            self.labelled.insert(header);
            Statement::Continue(Some(format!("loop{}", header.index())))
        }
    }
}

fn goto_label(block: NodeId) -> String {
    format!("B{}", block.index())
}

fn jump_text(target: JumpTarget) -> String {
    match target {
        JumpTarget::Label(block) => format!("goto {}", goto_label(block)),
        JumpTarget::Break(header) => format!("break loop{}", header.index()),
        JumpTarget::Continue(header) => format!("continue loop{}", header.index()),
    }
}

fn default_literal(ty: &JavaType) -> Literal {
    match ty {
        JavaType::Primitive(PrimitiveType::Boolean) => Literal::Boolean(false),
        JavaType::Primitive(PrimitiveType::Long) => Literal::Long(0),
        JavaType::Primitive(PrimitiveType::Float) => Literal::Float(0.0),
        JavaType::Primitive(PrimitiveType::Double) => Literal::Double(0.0),
        JavaType::Primitive(PrimitiveType::Char) => Literal::Char(0),
        JavaType::Primitive(_) => Literal::Int(0),
        _ => Literal::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{
            cfg::CfgBuilder, liveness::RegisterLiveness, ssa::SsaBuilder, typing::TypeInference,
        },
        bytecode::{CodeAssembler, MethodRef, NumericKind},
        structure::Structurer,
        types::ClassHierarchyMap,
    };

    fn assemble(
        asm: &CodeAssembler,
        descriptor: &str,
        registers: u16,
        config: &DecompilerConfig,
    ) -> MethodBody {
        let method = asm
            .build_method("a.B", "f", descriptor, true, registers)
            .unwrap();
        let cfg = CfgBuilder::build(&method).unwrap();
        let liveness = RegisterLiveness::compute(&cfg, method.registers);
        let ssa = SsaBuilder::build(&cfg, &method, &liveness).unwrap();
        let hierarchy = ClassHierarchyMap::new();
        let types = TypeInference::new(&cfg, &ssa, &method, &hierarchy)
            .solve()
            .unwrap();
        let structure = Structurer::new(&cfg, &method, &liveness)
            .with_config(config)
            .structure()
            .unwrap();
        ExpressionAssembler::new(&cfg, &method, &ssa, &types, &structure)
            .with_config(config)
            .assemble()
            .unwrap()
    }

    #[test]
    fn test_if_else_returns() {
        let mut asm = CodeAssembler::new();
        asm.if_cmp(IfCondition::Le, 0, 1, "else")
            .return_value(0)
            .label("else")
            .return_value(1);
        let body = assemble(&asm, "(II)I", 2, &DecompilerConfig::default());

        assert_eq!(body.params.len(), 2);
        let [Statement::If {
            then_branch,
            else_branch,
            ..
        }] = &body.statements[..]
        else {
            panic!("expected a single if, got {:?}", body.statements);
        };
        assert!(matches!(then_branch[..], [Statement::Return(Some(Expression::Local(_)))]));
        assert!(matches!(else_branch[..], [Statement::Return(Some(Expression::Local(_)))]));
    }

    #[test]
    fn test_effects_keep_their_order() {
        // baz(bar(), foo()) with foo() called first
        let foo = MethodRef::new("a.C", "foo", "()I").unwrap();
        let bar = MethodRef::new("a.C", "bar", "()I").unwrap();
        let baz = MethodRef::new("a.C", "baz", "(II)V").unwrap();
        let mut asm = CodeAssembler::new();
        asm.invoke(InvokeKind::Static, foo.clone(), &[])
            .move_result(0)
            .invoke(InvokeKind::Static, bar.clone(), &[])
            .move_result(1)
            .invoke(InvokeKind::Static, baz.clone(), &[1, 0])
            .return_void();
        let body = assemble(&asm, "()V", 2, &DecompilerConfig::default());

        let [Statement::Assign {
            target: LValue::Local(saved),
            value: Expression::Invoke { method: first, .. },
            declare: true,
        }, Statement::Expression(Expression::Invoke { method, args, .. })] = &body.statements[..]
        else {
            panic!("unexpected statements {:?}", body.statements);
        };
        assert_eq!(*first, foo);
        assert_eq!(*method, baz);
        assert!(matches!(&args[0], Expression::Invoke { method, .. } if *method == bar));
        assert_eq!(args[1], Expression::Local(*saved));
    }

    #[test]
    fn test_constructor_fuses_with_allocation() {
        let init = MethodRef::new("a.Foo", "<init>", "(I)V").unwrap();
        let mut asm = CodeAssembler::new();
        asm.new_instance(0, "a.Foo")
            .invoke(InvokeKind::Direct, init, &[0, 1])
            .return_value(0);
        let body = assemble(&asm, "(I)La/Foo;", 2, &DecompilerConfig::default());

        let [Statement::Return(Some(Expression::New { class, args }))] = &body.statements[..] else {
            panic!("expected return new, got {:?}", body.statements);
        };
        assert_eq!(class.name(), "a.Foo");
        assert_eq!(args[..], [Expression::Local(body.params[0])]);
    }

    #[test]
    fn test_literal_mode_names_every_value() {
        // return a + b * 2;
        let mut asm = CodeAssembler::new();
        asm.binary_lit(BinaryOp::Mul, 0, 2, 2)
            .binary(BinaryOp::Add, NumericKind::Int, 0, 1, 0)
            .return_value(0);

        let inlined = assemble(&asm, "(II)I", 3, &DecompilerConfig::default());
        assert!(matches!(
            inlined.statements[..],
            [Statement::Return(Some(Expression::Binary { op: BinaryOp::Add, .. }))]
        ));

        let literal = assemble(&asm, "(II)I", 3, &DecompilerConfig::literal());
        assert_eq!(literal.statements.len(), 3);
        assert!(matches!(
            literal.statements[..2],
            [Statement::Assign { declare: true, .. }, Statement::Assign { declare: true, .. }]
        ));
        assert!(matches!(
            literal.statements[2],
            Statement::Return(Some(Expression::Local(_)))
        ));
    }

    #[test]
    fn test_while_loop_writes_the_phi_local() {
        // i = 0; while (i < n) { i += 1; } return i;
        let mut asm = CodeAssembler::new();
        asm.const_int(0, 0)
            .label("head")
            .if_cmp(IfCondition::Ge, 0, 1, "done")
            .binary_lit(BinaryOp::Add, 0, 0, 1)
            .goto("head")
            .label("done")
            .return_value(0);
        let body = assemble(&asm, "(I)I", 2, &DecompilerConfig::default());

        let [Statement::Declare(counter), Statement::Assign {
            target: LValue::Local(init),
            value: Expression::Literal(Literal::Int(0)),
            declare: false,
        }, Statement::While {
            label: None,
            condition: Expression::Condition { op, .. },
            body: loop_body,
        }, Statement::Return(Some(Expression::Local(result)))] = &body.statements[..]
        else {
            panic!("unexpected statements {:?}", body.statements);
        };
        assert_eq!(counter, init);
        assert_eq!(counter, result);
        assert_eq!(*op, IfCondition::Lt);
        assert!(matches!(
            loop_body[..],
            [Statement::Assign { target: LValue::Local(local), declare: false, .. }] if local == *counter
        ));
    }

    #[test]
    fn test_flat_switch_with_one_target_is_a_plain_jump() {
        // switch (v0) { case 1: case 2: default: } return v0;
        let mut asm = CodeAssembler::new();
        asm.switch(0, &[(1, "join"), (2, "join")])
            .label("join")
            .return_value(0);
        let method = asm.build_method("a.B", "f", "(I)I", true, 1).unwrap();
        let cfg = CfgBuilder::build(&method).unwrap();
        let liveness = RegisterLiveness::compute(&cfg, method.registers);
        let ssa = SsaBuilder::build(&cfg, &method, &liveness).unwrap();
        let hierarchy = ClassHierarchyMap::new();
        let types = TypeInference::new(&cfg, &ssa, &method, &hierarchy)
            .solve()
            .unwrap();
        let structure = Structure::flat(&cfg);
        let body = ExpressionAssembler::new(&cfg, &method, &ssa, &types, &structure)
            .assemble()
            .unwrap();

        let mut gotos = 0;
        let mut switches = 0;
        for statement in &body.statements {
            statement.visit(&mut |nested| match nested {
                Statement::Goto(_) => gotos += 1,
                Statement::Switch { .. } => switches += 1,
                _ => {}
            });
        }
        assert_eq!(switches, 0, "{:?}", body.statements);
        assert!(gotos > 0, "{:?}", body.statements);
    }
}
