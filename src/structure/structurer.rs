//! The region reduction driver.

use std::collections::BTreeSet;

use tracing::debug;

use crate::{
    analysis::{
        cfg::{CatchEntry, CfgEdge, ControlFlowGraph},
        RegisterLiveness,
    },
    bytecode::MethodCode,
    config::DecompilerConfig,
    structure::{
        conditional, exception,
        exception::FinallyMatcher,
        graph::RegionGraph,
        looping, GotoEntry, Jump, JumpCondition, JumpTarget, Region,
    },
    utils::{
        graph::{algorithms, NodeId},
        CancellationToken,
    },
    Error, Result,
};

/// One planned reduction: `members` (entered through `members[0]`) become one node.
pub(super) struct Fold {
    pub(super) members: Vec<usize>,
    pub(super) region: Region,
    pub(super) exit: Option<NodeId>,
    pub(super) normal: Vec<(usize, CfgEdge)>,
    /// Replaces the protection taken over from `members[0]`
    pub(super) protection: Option<Vec<CatchEntry>>,
}

/// The structured form of one method.
#[derive(Debug, Clone)]
pub struct Structure {
    root: Region,
    suppressed: BTreeSet<usize>,
    folds: usize,
    iterations: usize,
}

impl Structure {
    /// Renders the CFG unstructured: every block becomes a labelled goto entry.
    ///
    /// Used as the best-effort artifact when structuring fails.
    #[must_use]
    pub fn flat(cfg: &ControlFlowGraph) -> Self {
        let graph = RegionGraph::from_cfg(cfg);
        let (_, root) = goto_region(&graph);
        Structure {
            root,
            suppressed: BTreeSet::new(),
            folds: 0,
            iterations: 0,
        }
    }

    /// Returns the root region.
    #[must_use]
    pub fn root(&self) -> &Region {
        &self.root
    }

    /// Returns the instruction indices that a merged `finally` made redundant.
    #[must_use]
    pub fn suppressed(&self) -> &BTreeSet<usize> {
        &self.suppressed
    }

    /// Returns `true` if the instruction at `index` must not be rendered.
    #[must_use]
    pub fn is_suppressed(&self, index: usize) -> bool {
        self.suppressed.contains(&index)
    }

    /// Returns the number of structured folds performed.
    #[must_use]
    pub fn folds(&self) -> usize {
        self.folds
    }

    /// Returns the number of reduction iterations spent, nested loop bodies included.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Returns `true` if part of the method fell back to explicit jumps.
    #[must_use]
    pub fn has_goto(&self) -> bool {
        self.root.has_goto()
    }
}

/// Folds the CFG of one method into a [`Region`] tree.
///
/// Reduction repeatedly replaces a subgraph of the region graph with one node:
///
/// 1. **Loops**: the outermost natural loops are cut out and reduced as sub-problems, so
///    inner loops always fold before the loop containing them
/// 2. **Acyclic constructs**: sequences, `if` diamonds and triangles, switches and
///    try/catch regions; among all applicable candidates the one holding the fewest
///    blocks folds first
/// 3. **Fallback**: when nothing applies, the remaining nodes become one
///    [`Region::Goto`] with explicit jumps
///
/// Every fold lowers the number of nodes plus edges, and iterations are bounded by
/// [`DecompilerConfig::max_structuring_iterations`], shared with the loop sub-problems.
///
/// # Examples
///
/// ```rust,ignore
/// use dexscope::{analysis::{CfgBuilder, RegisterLiveness}, structure::Structurer};
///
/// let cfg = CfgBuilder::build(&method)?;
/// let liveness = RegisterLiveness::compute(&cfg, method.registers);
/// let structure = Structurer::new(&cfg, &method, &liveness).structure()?;
/// println!("{}", structure.root());
/// ```
pub struct Structurer<'a> {
    cfg: &'a ControlFlowGraph,
    method: &'a MethodCode,
    liveness: &'a RegisterLiveness,
    max_iterations: usize,
    merge_finally: bool,
    token: CancellationToken,
    iterations: usize,
    folds: usize,
    suppressed: BTreeSet<usize>,
}

impl<'a> Structurer<'a> {
    /// Creates a structurer with the default configuration.
    #[must_use]
    pub fn new(
        cfg: &'a ControlFlowGraph,
        method: &'a MethodCode,
        liveness: &'a RegisterLiveness,
    ) -> Self {
        let defaults = DecompilerConfig::default();
        Structurer {
            cfg,
            method,
            liveness,
            max_iterations: defaults.max_structuring_iterations,
            merge_finally: defaults.merge_finally,
            token: CancellationToken::new(),
            iterations: 0,
            folds: 0,
            suppressed: BTreeSet::new(),
        }
    }

    /// Applies the iteration bound and `finally` merging setting of `config`.
    #[must_use]
    pub fn with_config(mut self, config: &DecompilerConfig) -> Self {
        self.max_iterations = config.max_structuring_iterations;
        self.merge_finally = config.merge_finally;
        self
    }

    /// Polls `token` once per iteration.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Reduces the method to a single root region.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Structuring`] if the iteration bound is exceeded and
    /// [`Error::Cancelled`] if the token was cancelled.
    pub fn structure(mut self) -> Result<Structure> {
        let mut graph = RegionGraph::from_cfg(self.cfg);
        self.reduce(&mut graph)?;

        let root = graph
            .live()
            .next()
            .map(|(_, node)| node.region.clone())
            .unwrap_or_else(Region::empty);
        let leaves = root.block_count();
        if leaves != self.cfg.block_count() {
            return Err(Error::Structuring(format!(
                "region tree holds {leaves} of {} blocks",
                self.cfg.block_count()
            )));
        }

        debug!(
            method = %self.method.name,
            blocks = leaves,
            folds = self.folds,
            iterations = self.iterations,
            goto = root.has_goto(),
            "structured method"
        );
        Ok(Structure {
            root,
            suppressed: self.suppressed,
            folds: self.folds,
            iterations: self.iterations,
        })
    }

    fn reduce(&mut self, graph: &mut RegionGraph) -> Result<()> {
        let mut blocked: BTreeSet<usize> = BTreeSet::new();
        while !graph.is_reduced() {
            self.iterations += 1;
            if self.iterations > self.max_iterations {
                return Err(Error::Structuring(format!(
                    "{} nodes left after {} iterations",
                    graph.live_count(),
                    self.max_iterations
                )));
            }
            self.token.checkpoint()?;

            let before = graph.size();
            let folded = if self.fold_loop(graph, &mut blocked)? {
                true
            } else if let Some(fold) = self.best_candidate(graph) {
                self.apply(graph, fold);
                blocked.clear();
                true
            } else {
                false
            };
            if folded && graph.size() < before {
                self.folds += 1;
                continue;
            }

            let before = graph.size();
            let (members, region) = goto_region(graph);
            debug!(nodes = members.len(), "falling back to explicit jumps");
            graph.fold(&members, region, None, Vec::new());
            if graph.size() >= before {
                return Err(Error::Structuring(format!(
                    "no progress with {} nodes left",
                    graph.live_count()
                )));
            }
        }
        Ok(())
    }

    /// Picks the acyclic fold covering the fewest blocks, the first one found on a tie.
    fn best_candidate(&self, graph: &RegionGraph) -> Option<Fold> {
        let mut best: Option<(usize, Fold)> = None;
        for (index, _) in graph.live() {
            let candidates = [
                conditional::sequence(graph, index),
                conditional::conditional(graph, index),
                conditional::switch(graph, index),
                exception::try_catch(graph, index),
            ];
            for fold in candidates.into_iter().flatten().filter(|fold| fold.members.len() > 1) {
                let size = graph.block_count(fold.members.iter().copied());
                if best.as_ref().map_or(true, |(smallest, _)| size < *smallest) {
                    best = Some((size, fold));
                }
            }
        }
        best.map(|(_, fold)| fold)
    }

    fn apply(&mut self, graph: &mut RegionGraph, mut fold: Fold) {
        if self.merge_finally && matches!(fold.region, Region::TryCatch { .. }) {
            let matcher = FinallyMatcher {
                cfg: self.cfg,
                liveness: self.liveness,
            };
            if let Some(indices) = matcher.merge(graph, &mut fold) {
                self.suppressed.extend(indices);
            }
        }
        let slot = graph.fold(&fold.members, fold.region, fold.exit, fold.normal);
        if let (Some(protection), Some(node)) = (fold.protection, graph.node_mut(slot)) {
            node.protection = protection;
        }
    }

    /// Folds the first outermost loop that has a single follow.
    fn fold_loop(&mut self, graph: &mut RegionGraph, blocked: &mut BTreeSet<usize>) -> Result<bool> {
        for (header, body) in looping::outermost_loops(graph) {
            if blocked.contains(&header) {
                continue;
            }
            let Some(plan) = looping::plan(graph, header, body) else {
                blocked.insert(header);
                continue;
            };

            let mut sub = looping::subgraph(graph, &plan);
            self.reduce(&mut sub)?;
            let body = sub
                .live()
                .next()
                .map(|(_, node)| node.region.clone())
                .unwrap_or_else(Region::empty);
            let pure_header = self.cfg.block(plan.header_block).is_some_and(|block| block.len() == 1);
            let region = looping::refine(body, plan.header_block, pure_header);

            debug!(header = %plan.header_block, nodes = plan.members.len(), "folded loop");
            graph.fold(
                &plan.members,
                region,
                None,
                conditional::follow_edge(plan.follow),
            );
            return Ok(true);
        }
        Ok(false)
    }
}

/// Turns every live node into a labelled entry with explicit jumps, in reverse postorder.
///
/// Returns the members consumed (entry first) and the goto region.
fn goto_region(graph: &RegionGraph) -> (Vec<usize>, Region) {
    let entry = graph.entry_index();
    let mut order: Vec<usize> = algorithms::reverse_postorder(graph, NodeId::new(entry))
        .into_iter()
        .map(|node| node.index())
        .filter(|&index| graph.node(index).is_some())
        .collect();
    for (index, _) in graph.live() {
        if !order.contains(&index) {
            order.push(index);
        }
    }

    let mut entries = Vec::new();
    for &index in &order {
        let Some(node) = graph.node(index) else {
            continue;
        };
        let Some(label) = node.entry else {
            continue;
        };
        let jumps = node
            .succs
            .iter()
            .filter_map(|(target, edge)| {
                let target = graph.node(*target)?;
                let target = match (&target.region, target.entry) {
                    (Region::Break(header), None) => JumpTarget::Break(*header),
                    (Region::Continue(header), None) => JumpTarget::Continue(*header),
                    (_, Some(block)) => JumpTarget::Label(block),
                    _ => return None,
                };
                Some(Jump {
                    target,
                    condition: jump_condition(edge, node.exit),
                })
            })
            .collect();
        entries.push(GotoEntry {
            label,
            body: node.region.clone(),
            jumps,
        });
    }
    (order, Region::Goto(entries))
}

fn jump_condition(edge: &CfgEdge, exit: Option<NodeId>) -> JumpCondition {
    match (edge, exit) {
        (CfgEdge::ConditionalTrue, Some(block)) => JumpCondition::Branch { block, taken: true },
        (CfgEdge::ConditionalFalse, Some(block)) => JumpCondition::Branch { block, taken: false },
        (CfgEdge::Switch { cases, default }, Some(block)) => JumpCondition::Case {
            block,
            keys: cases.clone(),
            default: *default,
        },
        (CfgEdge::Exception { .. }, _) => JumpCondition::Exception,
        _ => JumpCondition::Always,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::cfg::CfgBuilder,
        bytecode::{BinaryOp, CodeAssembler, IfCondition, InvokeKind, MethodRef},
        structure::LoopKind,
    };

    fn structure(asm: &CodeAssembler, descriptor: &str, registers: u16) -> (ControlFlowGraph, Structure) {
        let method = asm
            .build_method("a.B", "f", descriptor, true, registers)
            .unwrap();
        let cfg = CfgBuilder::build(&method).unwrap();
        let liveness = RegisterLiveness::compute(&cfg, method.registers);
        let structure = Structurer::new(&cfg, &method, &liveness).structure().unwrap();
        (cfg, structure)
    }

    fn sorted_leaves(region: &Region) -> Vec<NodeId> {
        let mut blocks = region.blocks();
        blocks.sort();
        blocks
    }

    #[test]
    fn test_if_else_returns() {
        let mut asm = CodeAssembler::new();
        asm.if_cmp(IfCondition::Le, 0, 1, "else")
            .return_value(0)
            .label("else")
            .return_value(1);
        let (cfg, structure) = structure(&asm, "(II)I", 2);

        let Region::If {
            then_region,
            else_region: Some(else_region),
            ..
        } = structure.root()
        else {
            panic!("expected if/else, got {}", structure.root());
        };
        assert!(matches!(**then_region, Region::Sequence(_)));
        assert!(matches!(**else_region, Region::Sequence(_)));
        assert!(!structure.has_goto());
        assert_eq!(sorted_leaves(structure.root()), cfg.block_ids().collect::<Vec<_>>());
    }

    #[test]
    fn test_while_loop() {
        // i = 0; while (i < n) { i += 1; } return i;
        let mut asm = CodeAssembler::new();
        asm.const_int(0, 0)
            .label("head")
            .if_cmp(IfCondition::Ge, 0, 1, "done")
            .binary_lit(BinaryOp::Add, 0, 0, 1)
            .goto("head")
            .label("done")
            .return_value(0);
        let (cfg, structure) = structure(&asm, "(I)I", 2);

        let mut found = None;
        structure.root().visit(&mut |region| {
            if let Region::Loop {
                kind, condition, ..
            } = region
            {
                found = Some((*kind, *condition));
            }
        });
        let (kind, condition) = found.expect("loop region");
        assert_eq!(kind, LoopKind::While);
        let condition = condition.expect("loop condition");
        // The loop continues while the `if-ge` exit test fails.
        assert!(condition.negated);
        assert!(!structure.has_goto());
        assert_eq!(sorted_leaves(structure.root()), cfg.block_ids().collect::<Vec<_>>());
    }

    #[test]
    fn test_do_while_loop() {
        // do { i += 1; } while (i < n); return i;
        let mut asm = CodeAssembler::new();
        asm.const_int(0, 0)
            .label("body")
            .binary_lit(BinaryOp::Add, 0, 0, 1)
            .if_cmp(IfCondition::Lt, 0, 1, "body")
            .return_value(0);
        let (_, structure) = structure(&asm, "(I)I", 2);

        let mut kinds = Vec::new();
        structure.root().visit(&mut |region| {
            if let Region::Loop { kind, .. } = region {
                kinds.push(*kind);
            }
        });
        assert_eq!(kinds, vec![LoopKind::DoWhile]);
    }

    #[test]
    fn test_try_catch() {
        let callee = MethodRef::new("a.C", "run", "()V").unwrap();
        let mut asm = CodeAssembler::new();
        asm.label("start")
            .invoke(InvokeKind::Static, callee, &[])
            .label("end")
            .return_void()
            .label("handler")
            .move_exception(0)
            .return_void()
            .try_range("start", "end", "handler", Some("java.io.IOException"));
        let (cfg, structure) = structure(&asm, "()V", 1);

        let mut clauses = Vec::new();
        structure.root().visit(&mut |region| {
            if let Region::TryCatch { catches, .. } = region {
                clauses.extend(catches.iter().map(|c| c.catch_types.clone()));
            }
        });
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0][0].name(), "java.io.IOException");
        assert_eq!(sorted_leaves(structure.root()), cfg.block_ids().collect::<Vec<_>>());
    }

    #[test]
    fn test_irreducible_falls_back_to_goto() {
        // Two blocks jumping into each other, each also reachable from the entry.
        let mut asm = CodeAssembler::new();
        asm.if_zero(IfCondition::Eq, 0, "b")
            .label("a")
            .binary_lit(BinaryOp::Add, 0, 0, -1)
            .if_zero(IfCondition::Ne, 0, "b")
            .return_value(0)
            .label("b")
            .binary_lit(BinaryOp::Add, 0, 0, 2)
            .if_zero(IfCondition::Ne, 0, "a")
            .return_value(0);
        let (cfg, structure) = structure(&asm, "(I)I", 1);

        assert!(structure.has_goto());
        assert_eq!(sorted_leaves(structure.root()), cfg.block_ids().collect::<Vec<_>>());
    }

    #[test]
    fn test_iteration_bound_is_enforced() {
        let mut asm = CodeAssembler::new();
        asm.if_cmp(IfCondition::Le, 0, 1, "else")
            .return_value(0)
            .label("else")
            .return_value(1);
        let method = asm.build_method("a.B", "f", "(II)I", true, 2).unwrap();
        let cfg = CfgBuilder::build(&method).unwrap();
        let liveness = RegisterLiveness::compute(&cfg, method.registers);
        let config = DecompilerConfig {
            max_structuring_iterations: 0,
            ..DecompilerConfig::default()
        };
        let result = Structurer::new(&cfg, &method, &liveness)
            .with_config(&config)
            .structure();
        assert!(matches!(result, Err(Error::Structuring(_))));

        let flat = Structure::flat(&cfg);
        assert!(flat.has_goto());
        assert_eq!(sorted_leaves(flat.root()), cfg.block_ids().collect::<Vec<_>>());
    }

    #[test]
    fn test_switch_to_follow_folds_as_a_sequence() {
        let mut asm = CodeAssembler::new();
        asm.switch(0, &[(1, "join"), (2, "join")])
            .label("join")
            .return_value(0);
        let (cfg, structure) = structure(&asm, "(I)I", 1);

        assert!(!structure.has_goto());
        assert!(structure.folds() > 0);
        assert_eq!(sorted_leaves(structure.root()), cfg.block_ids().collect::<Vec<_>>());
    }
}
