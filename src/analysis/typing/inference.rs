//! Constraint propagation and type resolution.

use std::collections::BTreeMap;

use tracing::debug;

use crate::{
    analysis::{
        cfg::ControlFlowGraph,
        ssa::{SsaFunction, SsaValueId},
        typing::{constraint, ConversionSite, TypeConstraint, TypeKinds},
    },
    bytecode::MethodCode,
    types::{ClassHierarchy, JavaType, PrimitiveType},
    utils::CancellationToken,
    Error, Result,
};

/// Working state of one value.
#[derive(Debug, Clone)]
struct TypeState {
    kinds: TypeKinds,
    /// Join of the reference types flowing in
    lower: Option<JavaType>,
    /// Most specific reference type expected by uses
    upper: Option<JavaType>,
}

/// The final type of every value plus the conversions needed to honor it.
#[derive(Debug, Clone)]
pub struct TypeAssignment {
    types: Vec<JavaType>,
    conversions: BTreeMap<ConversionSite, JavaType>,
    warnings: Vec<String>,
    rounds: usize,
}

impl TypeAssignment {
    /// Returns the declared type of a value; `Object` for unknown ids.
    #[must_use]
    pub fn type_of(&self, value: SsaValueId) -> JavaType {
        self.types
            .get(value.index())
            .cloned()
            .unwrap_or_else(JavaType::object)
    }

    /// Returns the types of all values, indexed by value id.
    #[must_use]
    pub fn types(&self) -> &[JavaType] {
        &self.types
    }

    /// Returns the conversion required at `site`.
    #[must_use]
    pub fn conversion(&self, site: &ConversionSite) -> Option<&JavaType> {
        self.conversions.get(site)
    }

    /// Returns all conversions, ordered by site.
    #[must_use]
    pub fn conversions(&self) -> &BTreeMap<ConversionSite, JavaType> {
        &self.conversions
    }

    /// Returns resolver failures that degraded a type to `Object`.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Returns the number of propagation rounds run.
    #[must_use]
    pub const fn rounds(&self) -> usize {
        self.rounds
    }
}

/// Type inference over one method in SSA form.
///
/// Propagation is monotonic: each round only removes kinds from value sets (and only moves
/// reference bounds up or down their hierarchy chains), so the fixed point is reached in a
/// bounded number of rounds. [`TypeInference::step`] runs one round, which lets callers
/// observe intermediate states; [`TypeInference::solve`] runs to the fixed point and
/// resolves every value to a concrete type.
///
/// # Examples
///
/// ```rust,ignore
/// use dexscope::analysis::TypeInference;
///
/// let types = TypeInference::new(&cfg, &ssa, &method, &hierarchy).solve()?;
/// for (id, ty) in types.types().iter().enumerate() {
///     println!("v{id}: {ty}");
/// }
/// ```
pub struct TypeInference<'a> {
    hierarchy: &'a dyn ClassHierarchy,
    constraints: Vec<TypeConstraint>,
    /// Assign links cut because their kinds could not meet
    cut: Vec<bool>,
    states: Vec<TypeState>,
    conversions: BTreeMap<ConversionSite, JavaType>,
    warnings: Vec<String>,
    rounds: usize,
    max_rounds: usize,
    token: Option<CancellationToken>,
}

impl<'a> TypeInference<'a> {
    /// Collects the constraints of `ssa` and seeds every value with its definitions.
    #[must_use]
    pub fn new(
        cfg: &ControlFlowGraph,
        ssa: &SsaFunction,
        method: &MethodCode,
        hierarchy: &'a dyn ClassHierarchy,
    ) -> Self {
        let mut constraints = constraint::collect(cfg, ssa, method);
        // Uses constrain a value before copies carry kinds across, so a copy whose ends
        // disagree is cut (and converted) rather than the use.
        constraints.sort_by_key(|constraint| match constraint {
            TypeConstraint::Define { .. } => 0,
            TypeConstraint::Demand { .. } => 1,
            TypeConstraint::ArrayElement { .. } => 2,
            TypeConstraint::Assign { .. } => 3,
        });
        let mut inference = TypeInference {
            hierarchy,
            cut: vec![false; constraints.len()],
            constraints,
            states: vec![
                TypeState {
                    kinds: TypeKinds::all(),
                    lower: None,
                    upper: None,
                };
                ssa.value_count()
            ],
            conversions: BTreeMap::new(),
            warnings: Vec::new(),
            rounds: 0,
            max_rounds: 64,
            token: None,
        };
        inference.seed();
        inference
    }

    /// Sets the bound on propagation rounds.
    #[must_use]
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    /// Polls `token` before every round.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Returns the current kind set of a value.
    #[must_use]
    pub fn kinds(&self, value: SsaValueId) -> TypeKinds {
        self.states
            .get(value.index())
            .map_or(TypeKinds::empty(), |state| state.kinds)
    }

    /// Returns the constraints being solved.
    #[must_use]
    pub fn constraints(&self) -> &[TypeConstraint] {
        &self.constraints
    }

    fn seed(&mut self) {
        for index in 0..self.constraints.len() {
            if let TypeConstraint::Define { value, kinds, bound } = &self.constraints[index] {
                let (value, kinds, bound) = (*value, *kinds, bound.clone());
                let Some(state) = self.states.get_mut(value.index()) else {
                    continue;
                };
                let narrowed = state.kinds & kinds;
                if narrowed.is_empty() {
                    debug!(%value, "conflicting definitions, keeping the first");
                } else {
                    state.kinds = narrowed;
                }
                if let Some(bound) = bound {
                    self.join_lower(value, &bound);
                }
            }
        }
    }

    /// Runs one propagation round. Returns `true` if any value changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the cancellation token fired.
    pub fn step(&mut self) -> Result<bool> {
        if let Some(token) = &self.token {
            token.checkpoint()?;
        }
        self.rounds += 1;
        let mut changed = false;
        for index in 0..self.constraints.len() {
            changed |= self.apply(index);
        }
        Ok(changed)
    }

    fn apply(&mut self, index: usize) -> bool {
        match self.constraints[index].clone() {
            TypeConstraint::Define { .. } => false,
            TypeConstraint::Demand {
                value,
                kinds,
                bound,
                site,
                target,
            } => {
                let current = self.kinds(value);
                let narrowed = current & kinds;
                let mut changed = false;
                if narrowed.is_empty() {
                    if !self.conversions.contains_key(&site) {
                        let conflict = Error::TypeConflict(format!(
                            "{value} used as {target} but may only be {current:?}"
                        ));
                        debug!(%conflict, "resolved with a conversion");
                        self.conversions.insert(site, target);
                    }
                } else {
                    changed |= self.narrow(value, narrowed);
                }
                if let Some(bound) = bound {
                    changed |= self.narrow_upper(value, &bound);
                }
                changed
            }
            TypeConstraint::Assign { src, dst, .. } => {
                if self.cut[index] {
                    return false;
                }
                let src_kinds = self.kinds(src);
                let dst_kinds = self.kinds(dst);
                let dst_narrowed = dst_kinds & src_kinds.widened();
                let src_narrowed = src_kinds & dst_kinds.narrowed();
                if dst_narrowed.is_empty() || src_narrowed.is_empty() {
                    self.cut[index] = true;
                    return false;
                }
                let mut changed = self.narrow(dst, dst_narrowed);
                changed |= self.narrow(src, src_narrowed);
                if let Some(lower) = self.states[src.index()].lower.clone() {
                    changed |= self.join_lower(dst, &lower);
                }
                if let Some(upper) = self.states[dst.index()].upper.clone() {
                    changed |= self.narrow_upper(src, &upper);
                }
                changed
            }
            TypeConstraint::ArrayElement {
                array,
                element,
                store,
            } => {
                let Some(JavaType::Array(element_type)) = self.states[array.index()].lower.clone()
                else {
                    return false;
                };
                let kinds = if store {
                    TypeKinds::accepted_by(&element_type)
                } else {
                    TypeKinds::of(&element_type)
                };
                let narrowed = self.kinds(element) & kinds;
                let mut changed = false;
                if !narrowed.is_empty() {
                    changed |= self.narrow(element, narrowed);
                }
                if element_type.is_reference() {
                    changed |= if store {
                        self.narrow_upper(element, &element_type)
                    } else {
                        self.join_lower(element, &element_type)
                    };
                }
                changed
            }
        }
    }

    fn narrow(&mut self, value: SsaValueId, kinds: TypeKinds) -> bool {
        match self.states.get_mut(value.index()) {
            Some(state) if state.kinds != kinds => {
                state.kinds = kinds;
                true
            }
            _ => false,
        }
    }

    /// Joins `bound` into the lower bound of `value` through the hierarchy.
    fn join_lower(&mut self, value: SsaValueId, bound: &JavaType) -> bool {
        let Some(current) = self.states.get(value.index()).map(|state| state.lower.clone())
        else {
            return false;
        };
        let joined = match current {
            None => bound.clone(),
            Some(current) if &current == bound => return false,
            Some(current) => match self.hierarchy.least_upper_bound(&current, bound) {
                Ok(joined) => joined,
                Err(error) => {
                    self.warn(&error);
                    JavaType::object()
                }
            },
        };
        let state = &mut self.states[value.index()];
        if state.lower.as_ref() == Some(&joined) {
            return false;
        }
        state.lower = Some(joined);
        true
    }

    /// Replaces the upper bound of `value` with `bound` if it is strictly more specific.
    fn narrow_upper(&mut self, value: SsaValueId, bound: &JavaType) -> bool {
        let Some(current) = self.states.get(value.index()).map(|state| state.upper.clone())
        else {
            return false;
        };
        let replace = match &current {
            None => true,
            Some(current) if current == bound => false,
            Some(current) => match self.hierarchy.is_subtype(bound, current) {
                Ok(more_specific) => more_specific,
                Err(error) => {
                    self.warn(&error);
                    false
                }
            },
        };
        if replace {
            self.states[value.index()].upper = Some(bound.clone());
        }
        replace
    }

    fn warn(&mut self, error: &Error) {
        let message = error.to_string();
        if !self.warnings.contains(&message) {
            self.warnings.push(message);
        }
    }

    /// Propagates to the fixed point and resolves every value.
    ///
    /// Stops early, keeping the narrowed sets reached so far, when the round bound is hit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the cancellation token fired.
    pub fn solve(mut self) -> Result<TypeAssignment> {
        let mut converged = false;
        while self.rounds < self.max_rounds {
            if !self.step()? {
                converged = true;
                break;
            }
        }
        if !converged {
            debug!(rounds = self.rounds, "type inference hit its round bound");
        }

        let types: Vec<JavaType> = (0..self.states.len())
            .map(|index| self.resolve(index))
            .collect();
        self.harmonize(&types);

        debug!(
            values = types.len(),
            rounds = self.rounds,
            conversions = self.conversions.len(),
            "resolved types"
        );
        Ok(TypeAssignment {
            types,
            conversions: self.conversions,
            warnings: self.warnings,
            rounds: self.rounds,
        })
    }

    fn resolve(&self, index: usize) -> JavaType {
        let Some(state) = self.states.get(index) else {
            return JavaType::object();
        };
        if let Some(primitive) = state.kinds.preferred_primitive() {
            return JavaType::Primitive(primitive);
        }
        state
            .lower
            .clone()
            .or_else(|| state.upper.clone())
            .unwrap_or_else(JavaType::object)
    }

    /// Records conversions on copies whose ends resolved to different primitive types.
    ///
    /// Widening a narrower integral type to `int` stays implicit.
    fn harmonize(&mut self, types: &[JavaType]) {
        for constraint in &self.constraints {
            let TypeConstraint::Assign { src, dst, site } = constraint else {
                continue;
            };
            let (Some(from), Some(to)) = (types.get(src.index()), types.get(dst.index())) else {
                continue;
            };
            let (Some(from_primitive), Some(to_primitive)) = (from.as_primitive(), to.as_primitive())
            else {
                continue;
            };
            let implicit = from_primitive == to_primitive
                || (to_primitive == PrimitiveType::Int
                    && from_primitive != PrimitiveType::Boolean
                    && from_primitive.widens_to(PrimitiveType::Int));
            if !implicit {
                self.conversions.insert(*site, to.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{cfg::CfgBuilder, liveness::RegisterLiveness, ssa::SsaBuilder},
        bytecode::{
            ArrayKind, BinaryOp, CodeAssembler, FieldRef, IfCondition, InvokeKind, MethodRef,
            NumericKind,
        },
        types::ClassHierarchyMap,
        utils::graph::NodeId,
    };

    fn infer(method: &MethodCode) -> (SsaFunction, TypeAssignment) {
        let cfg = CfgBuilder::build(method).unwrap();
        let liveness = RegisterLiveness::compute(&cfg, method.registers);
        let ssa = SsaBuilder::build(&cfg, method, &liveness).unwrap();
        let hierarchy = ClassHierarchyMap::new();
        let types = TypeInference::new(&cfg, &ssa, method, &hierarchy)
            .solve()
            .unwrap();
        (ssa, types)
    }

    #[test]
    fn test_literal_used_as_float() {
        let mut asm = CodeAssembler::new();
        asm.const_float(0, 1.5)
            .binary(BinaryOp::Mul, NumericKind::Float, 0, 0, 1)
            .return_value(0);
        let method = asm.build_method("a.B", "f", "(F)F", true, 2).unwrap();
        let (ssa, types) = infer(&method);
        let constant = ssa.instruction(NodeId::new(0), 0).unwrap().def.unwrap();
        assert_eq!(types.type_of(constant), JavaType::FLOAT);
        assert!(types.conversions().is_empty());
    }

    #[test]
    fn test_null_constant_takes_reference_type() {
        let mut asm = CodeAssembler::new();
        asm.const_int(0, 0).return_value(0);
        let method = asm
            .build_method("a.B", "f", "()Ljava/lang/String;", true, 1)
            .unwrap();
        let (ssa, types) = infer(&method);
        let null = ssa.instruction(NodeId::new(0), 0).unwrap().def.unwrap();
        assert_eq!(types.type_of(null), JavaType::class("java.lang.String"));
    }

    #[test]
    fn test_phi_joins_reference_types() {
        let mut asm = CodeAssembler::new();
        asm.if_zero(IfCondition::Eq, 1, "other")
            .new_instance(0, "java.lang.Integer")
            .goto("join")
            .label("other")
            .new_instance(0, "java.lang.Long")
            .label("join")
            .return_value(0);
        let method = asm
            .build_method("a.B", "pick", "(Z)Ljava/lang/Object;", true, 2)
            .unwrap();
        let (ssa, types) = infer(&method);
        let (_, phi) = ssa.phis().next().unwrap();
        assert_eq!(types.type_of(phi.result()), JavaType::class("java.lang.Number"));
    }

    #[test]
    fn test_integer_widths_converted_at_definitions() {
        let small = FieldRef::new("a.B", "small", "B").unwrap();
        let medium = FieldRef::new("a.B", "medium", "S").unwrap();
        let mut asm = CodeAssembler::new();
        asm.if_zero(IfCondition::Eq, 2, "other")
            .static_get(0, small)
            .goto("join")
            .label("other")
            .static_get(0, medium)
            .label("join")
            .binary(BinaryOp::Add, NumericKind::Float, 0, 0, 1)
            .return_value(0);
        let method = asm.build_method("a.B", "f", "(FZ)F", true, 3).unwrap();
        let (ssa, types) = infer(&method);

        let (block, phi) = ssa.phis().next().unwrap();
        assert_eq!(types.type_of(phi.result()), JavaType::FLOAT);
        for operand in 0..2 {
            let site = ConversionSite::PhiOperand {
                block,
                phi: 0,
                operand,
            };
            assert_eq!(types.conversion(&site), Some(&JavaType::FLOAT));
        }
        // Nothing is converted at the addition itself.
        assert!(types
            .conversions()
            .keys()
            .all(|site| matches!(site, ConversionSite::PhiOperand { .. })));
    }

    #[test]
    fn test_array_element_follows_array_type() {
        let mut asm = CodeAssembler::new();
        asm.const_int(0, 0)
            .array_get(ArrayKind::Narrow, 1, 2, 0)
            .return_value(1);
        let method = asm.build_method("a.B", "first", "([F)F", true, 3).unwrap();
        let (ssa, types) = infer(&method);
        let element = ssa.instruction(NodeId::new(0), 1).unwrap().def.unwrap();
        assert_eq!(types.type_of(element), JavaType::FLOAT);
        let index = ssa.instruction(NodeId::new(0), 0).unwrap().def.unwrap();
        assert_eq!(types.type_of(index), JavaType::INT);
    }

    #[test]
    fn test_kinds_only_narrow() {
        let call = MethodRef::new("a.B", "take", "(J)V").unwrap();
        let mut asm = CodeAssembler::new();
        asm.const_long(0, 3)
            .mov(1, 0)
            .invoke(InvokeKind::Static, call, &[1])
            .return_void();
        let method = asm.build_method("a.B", "f", "()V", true, 2).unwrap();
        let cfg = CfgBuilder::build(&method).unwrap();
        let liveness = RegisterLiveness::compute(&cfg, method.registers);
        let ssa = SsaBuilder::build(&cfg, &method, &liveness).unwrap();
        let hierarchy = ClassHierarchyMap::new();
        let mut inference = TypeInference::new(&cfg, &ssa, &method, &hierarchy);

        let mut previous: Vec<TypeKinds> = (0..ssa.value_count())
            .map(|index| inference.kinds(SsaValueId::new(index)))
            .collect();
        while inference.step().unwrap() {
            let current: Vec<TypeKinds> = (0..ssa.value_count())
                .map(|index| inference.kinds(SsaValueId::new(index)))
                .collect();
            for (before, after) in previous.iter().zip(&current) {
                assert!(before.contains(*after));
            }
            previous = current;
        }
        let constant = ssa.instruction(NodeId::new(0), 0).unwrap().def.unwrap();
        assert_eq!(inference.kinds(constant), TypeKinds::LONG);
        let types = inference.solve().unwrap();
        assert!(types.types().iter().all(|ty| *ty != JavaType::Void));
    }

    #[test]
    fn test_cancellation_stops_inference() {
        let mut asm = CodeAssembler::new();
        asm.return_void();
        let method = asm.build_method("a.B", "f", "()V", true, 0).unwrap();
        let cfg = CfgBuilder::build(&method).unwrap();
        let liveness = RegisterLiveness::compute(&cfg, method.registers);
        let ssa = SsaBuilder::build(&cfg, &method, &liveness).unwrap();
        let hierarchy = ClassHierarchyMap::new();
        let token = CancellationToken::new();
        token.cancel();
        let result = TypeInference::new(&cfg, &ssa, &method, &hierarchy)
            .with_cancellation(token)
            .solve();
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
