//! Sequence, two-way and multi-way branch folding.

use std::collections::BTreeSet;

use crate::{
    analysis::cfg::CfgEdge,
    structure::{
        graph::RegionGraph,
        structurer::Fold,
        BranchCondition, Region, SwitchCase,
    },
};

/// `a; b` where `b` is entered only from `a`.
pub(super) fn sequence(graph: &RegionGraph, a: usize) -> Option<Fold> {
    let node = graph.node(a)?;
    let targets = node.normal_targets();
    let [b] = targets[..] else {
        return None;
    };
    if b == a || b == graph.entry_index() || graph.preds(b) != [a] || !graph.same_protection(a, b) {
        return None;
    }
    let next = graph.node(b)?;
    Some(Fold {
        members: vec![a, b],
        region: Region::sequence([node.region.clone(), next.region.clone()]),
        exit: next.exit,
        normal: next.normal_edges().map(|(t, e)| (t, e.clone())).collect(),
        protection: None,
    })
}

/// Returns `true` if `arm` can be nested inside the branch of `head`.
fn is_arm(graph: &RegionGraph, head: usize, arm: usize) -> bool {
    arm != head
        && arm != graph.entry_index()
        && graph.preds(arm) == [head]
        && graph.same_protection(head, arm)
}

/// `if`/`else` diamonds and `if` triangles hanging off a conditional branch.
pub(super) fn conditional(graph: &RegionGraph, c: usize) -> Option<Fold> {
    let node = graph.node(c)?;
    let block = node.exit?;
    let mut taken = None;
    let mut fallthrough = None;
    for (target, edge) in node.normal_edges() {
        match edge {
            CfgEdge::ConditionalTrue => taken = Some(target),
            CfgEdge::ConditionalFalse => fallthrough = Some(target),
            _ => return None,
        }
    }
    let (y, x) = (taken?, fallthrough?);
    let condition = BranchCondition {
        block,
        negated: true,
    };

    let arm = |index: usize| graph.node(index).map(|n| (n.region.clone().into_sequence(), n.normal_targets()));
    let (x_region, x_targets) = arm(x)?;
    let (y_region, y_targets) = arm(y)?;
    let (x_ok, y_ok) = (is_arm(graph, c, x), is_arm(graph, c, y));

    if x_ok && y_ok && x_targets == y_targets && x_targets.len() <= 1 {
        return Some(Fold {
            members: vec![c, x, y],
            region: Region::If {
                head: Box::new(node.region.clone()),
                condition,
                then_region: Box::new(x_region),
                else_region: Some(Box::new(y_region)),
            },
            exit: None,
            normal: follow_edge(x_targets.first().copied()),
            protection: None,
        });
    }
    if x_ok && (x_targets == [y] || x_targets.is_empty()) {
        return Some(triangle(node.region.clone(), condition, c, x, x_region, y));
    }
    if y_ok && (y_targets == [x] || y_targets.is_empty()) {
        return Some(triangle(node.region.clone(), condition.negate(), c, y, y_region, x));
    }
    None
}

fn triangle(head: Region, condition: BranchCondition, c: usize, arm: usize, region: Region, follow: usize) -> Fold {
    Fold {
        members: vec![c, arm],
        region: Region::If {
            head: Box::new(head),
            condition,
            then_region: Box::new(region),
            else_region: None,
        },
        exit: None,
        normal: follow_edge(Some(follow)),
        protection: None,
    }
}

pub(super) fn follow_edge(follow: Option<usize>) -> Vec<(usize, CfgEdge)> {
    follow
        .map(|target| vec![(target, CfgEdge::Unconditional)])
        .unwrap_or_default()
}

/// A switch whose case bodies are entered only from the switch or by falling through
/// from the previous case, and which converge on at most one follow.
pub(super) fn switch(graph: &RegionGraph, s: usize) -> Option<Fold> {
    let node = graph.node(s)?;
    let block = node.exit?;
    let mut edges: Vec<(usize, Vec<i32>, bool)> = Vec::new();
    for (target, edge) in node.normal_edges() {
        let CfgEdge::Switch { cases, default } = edge else {
            return None;
        };
        edges.push((target, cases.clone(), *default));
    }
    if edges.is_empty() {
        return None;
    }

    let plan = plan_cases(graph, s, &edges, None)?;
    // A default entered by falling out of a case is where the cases break to.
    let default_target = edges.iter().find(|(_, _, default)| *default).map(|(t, _, _)| *t);
    let plan = match (plan.follow, default_target) {
        (None, Some(target)) if plan.entered.contains(&target) => {
            plan_cases(graph, s, &edges, Some(target))?
        }
        _ => plan,
    };
    // Every key leads straight to the follow: the switch is a plain jump.
    if plan.order.is_empty() {
        return None;
    }

    let mut cases = Vec::new();
    for (position, &body) in plan.order.iter().enumerate() {
        let (keys, default) = edges
            .iter()
            .filter(|(target, _, _)| *target == body)
            .fold((Vec::new(), false), |(mut keys, default), (_, more, d)| {
                keys.extend(more.iter().copied());
                (keys, default || *d)
            });
        let falls_through = plan
            .next
            .iter()
            .any(|(b, succ)| *b == body && succ.is_some() && plan.order.get(position + 1) == succ.as_ref());
        cases.push(SwitchCase {
            keys,
            default,
            body: graph.node(body)?.region.clone().into_sequence(),
            falls_through,
        });
    }
    if let Some(follow) = plan.follow {
        let keys: Vec<i32> = edges
            .iter()
            .filter(|(target, _, _)| *target == follow)
            .flat_map(|(_, keys, _)| keys.iter().copied())
            .collect();
        if !keys.is_empty() {
            cases.push(SwitchCase {
                keys,
                default: false,
                body: Region::empty(),
                falls_through: false,
            });
        }
    }

    let mut members = vec![s];
    members.extend(plan.order);
    Some(Fold {
        members,
        region: Region::Switch {
            head: Box::new(node.region.clone()),
            block,
            cases,
        },
        exit: None,
        normal: follow_edge(plan.follow),
        protection: None,
    })
}

struct CasePlan {
    /// Case bodies in emission order
    order: Vec<usize>,
    /// Fallthrough successor of each body
    next: Vec<(usize, Option<usize>)>,
    /// Bodies entered by falling through
    entered: BTreeSet<usize>,
    follow: Option<usize>,
}

fn plan_cases(
    graph: &RegionGraph,
    s: usize,
    edges: &[(usize, Vec<i32>, bool)],
    excluded: Option<usize>,
) -> Option<CasePlan> {
    let targets: BTreeSet<usize> = edges.iter().map(|(target, _, _)| *target).collect();
    let mut bodies: BTreeSet<usize> = targets
        .iter()
        .copied()
        .filter(|&t| {
            t != s && Some(t) != excluded && t != graph.entry_index() && graph.same_protection(s, t)
        })
        .collect();
    loop {
        let before = bodies.len();
        let snapshot = bodies.clone();
        bodies.retain(|&t| graph.preds(t).iter().all(|p| *p == s || snapshot.contains(p)));
        if bodies.len() == before {
            break;
        }
    }

    let mut follows: BTreeSet<usize> = targets.difference(&bodies).copied().collect();
    let mut next: Vec<(usize, Option<usize>)> = Vec::new();
    for &body in &bodies {
        let succs = graph.node(body)?.normal_targets();
        match succs[..] {
            [] => next.push((body, None)),
            [succ] if bodies.contains(&succ) => next.push((body, Some(succ))),
            [succ] => {
                follows.insert(succ);
                next.push((body, None));
            }
            _ => return None,
        }
    }
    if follows.len() > 1 || follows.contains(&s) {
        return None;
    }

    let mut entered: BTreeSet<usize> = BTreeSet::new();
    for succ in next.iter().filter_map(|(_, succ)| *succ) {
        if !entered.insert(succ) {
            return None;
        }
    }
    let mut heads: Vec<usize> = bodies.iter().copied().filter(|b| !entered.contains(b)).collect();
    heads.sort_by_key(|&b| graph.node(b).and_then(|n| n.entry));
    let mut order = Vec::with_capacity(bodies.len());
    for head in heads {
        let mut current = Some(head);
        while let Some(body) = current {
            if order.contains(&body) {
                return None;
            }
            order.push(body);
            current = next.iter().find(|(b, _)| *b == body).and_then(|(_, succ)| *succ);
        }
    }
    // Bodies missing from the chains sit on a fallthrough cycle.
    if order.len() != bodies.len() {
        return None;
    }

    Some(CasePlan {
        order,
        next,
        entered,
        follow: follows.first().copied(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::cfg::CfgBuilder,
        bytecode::{CodeAssembler, IfCondition},
    };

    #[test]
    fn test_diamond_with_returns() {
        let mut asm = CodeAssembler::new();
        asm.if_cmp(IfCondition::Le, 0, 1, "else")
            .return_value(0)
            .label("else")
            .return_value(1);
        let method = asm.build_method("a.B", "max", "(II)I", true, 2).unwrap();
        let cfg = CfgBuilder::build(&method).unwrap();
        let graph = RegionGraph::from_cfg(&cfg);

        let fold = conditional(&graph, 0).expect("diamond");
        assert_eq!(fold.members, vec![0, 1, 2]);
        assert!(fold.normal.is_empty());
        let Region::If {
            condition,
            else_region: Some(_),
            ..
        } = fold.region
        else {
            panic!("expected if/else");
        };
        assert!(condition.negated);
    }

    #[test]
    fn test_switch_with_fallthrough() {
        // switch (v0) { case 1: v1 = 1; case 2: v1 = 2; break; case 3: return v0; } return v1;
        let mut asm = CodeAssembler::new();
        asm.const_int(1, 0)
            .switch(0, &[(1, "one"), (2, "two"), (3, "three")])
            .label("done")
            .return_value(1)
            .label("one")
            .const_int(1, 1)
            .label("two")
            .const_int(1, 2)
            .goto("done")
            .label("three")
            .return_value(0);
        let method = asm.build_method("a.B", "f", "(I)I", true, 2).unwrap();
        let cfg = CfgBuilder::build(&method).unwrap();
        let graph = RegionGraph::from_cfg(&cfg);
        let fold = graph
            .live()
            .find_map(|(index, _)| switch(&graph, index))
            .expect("switch candidate");

        let Region::Switch { cases, .. } = &fold.region else {
            panic!("expected a switch");
        };
        assert_eq!(cases.len(), 3);
        assert_eq!(cases[0].keys, vec![1]);
        assert!(cases[0].falls_through);
        assert_eq!(cases[1].keys, vec![2]);
        assert!(!cases[1].falls_through);
        assert_eq!(cases[2].keys, vec![3]);
        assert!(cases.iter().all(|case| !case.default));
        assert_eq!(fold.normal.len(), 1);
    }

    #[test]
    fn test_switch_to_follow_is_not_a_candidate() {
        let mut asm = CodeAssembler::new();
        asm.switch(0, &[(1, "join"), (2, "join")])
            .label("join")
            .return_value(0);
        let method = asm.build_method("a.B", "f", "(I)I", true, 1).unwrap();
        let cfg = CfgBuilder::build(&method).unwrap();
        let graph = RegionGraph::from_cfg(&cfg);

        assert!(graph.live().all(|(index, _)| switch(&graph, index).is_none()));
    }
}
