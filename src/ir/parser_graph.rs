//! The state graph of a parser.
//!
//! Parser states form a graph that may contain cycles (a header stack parsed
//! by a state transitioning to itself). A depth-first walk from `start`
//! reports every state reached, classifying repeated arrivals as a join
//! (`Revisit`: reached again through another, already finished path) or as
//! a back edge (`LoopRevisit`: reached again while still being explored).

use std::rc::Rc;

use hashbrown::HashMap;

use super::{Declaration, DeclarationKind, Expression, ExpressionKind, Symbol};
use crate::index::{simple_index, IndexVec};

simple_index! {
    pub struct StateId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    State(StateId),
    Accept,
    Reject,
    /// A transition to a name that is not a state of this parser
    Unknown(Symbol),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    First,
    Revisit,
    LoopRevisit,
}

#[derive(Debug)]
pub struct ParserGraph {
    states: IndexVec<StateId, Rc<Declaration>>,
    by_name: HashMap<Symbol, StateId>,
    transitions: IndexVec<StateId, Vec<Transition>>,
    predecessor_counts: IndexVec<StateId, usize>,
    start: Option<StateId>,
}

/// The names a state selection may transition to, in source order
pub fn selection_targets(selection: &Expression) -> Vec<Symbol> {
    match &selection.kind {
        ExpressionKind::Path(path) => vec![path.name.symbol],
        ExpressionKind::Select { cases, .. } => {
            cases.iter().map(|case| case.state.name.symbol).collect()
        }
        _ => Vec::new(),
    }
}

impl ParserGraph {
    /// Builds the graph of `parser`; an empty graph for anything else
    pub fn build(parser: &Declaration) -> Self {
        let mut graph = Self {
            states: IndexVec::new(),
            by_name: HashMap::new(),
            transitions: IndexVec::new(),
            predecessor_counts: IndexVec::new(),
            start: None,
        };

        let DeclarationKind::Parser { states, .. } = &parser.kind else {
            return graph;
        };

        for state in states.iter() {
            let id = graph.states.push(state.clone());
            graph.by_name.insert(state.name.symbol, id);
            graph.transitions.push(Vec::new());
            graph.predecessor_counts.push(0);
        }

        let accept = Symbol::new("accept");
        let reject = Symbol::new("reject");

        for (id, state) in graph.states.enumerate() {
            let DeclarationKind::ParserState {
                selection: Some(selection),
                ..
            } = &state.kind
            else {
                continue;
            };

            let mut targets = Vec::new();
            for name in selection_targets(selection) {
                let transition = match graph.by_name.get(&name) {
                    Some(target) => Transition::State(*target),
                    None if name == accept => Transition::Accept,
                    None if name == reject => Transition::Reject,
                    None => Transition::Unknown(name),
                };

                // Several select cases may lead to the same state; that is
                // still one edge
                if !targets.contains(&transition) {
                    targets.push(transition);
                }
            }
            graph.transitions[id] = targets;
        }

        for id in graph.states.indices() {
            for transition in graph.transitions[id].clone() {
                if let Transition::State(target) = transition {
                    graph.predecessor_counts[target] += 1;
                }
            }
        }

        graph.start = graph.by_name.get(&Symbol::new("start")).copied();
        graph
    }

    pub fn start(&self) -> Option<StateId> {
        self.start
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn state(&self, id: StateId) -> &Rc<Declaration> {
        &self.states[id]
    }

    pub fn lookup(&self, name: Symbol) -> Option<StateId> {
        self.by_name.get(&name).copied()
    }

    pub fn transitions(&self, id: StateId) -> &[Transition] {
        &self.transitions[id]
    }

    pub fn successors(&self, id: StateId) -> impl Iterator<Item = StateId> + '_ {
        self.transitions[id].iter().filter_map(|t| match t {
            Transition::State(target) => Some(*target),
            _ => None,
        })
    }

    pub fn predecessor_count(&self, id: StateId) -> usize {
        self.predecessor_counts[id]
    }

    /// A state with more than one incoming edge, where abstract values merge
    pub fn is_join_point(&self, id: StateId) -> bool {
        self.predecessor_counts[id] > 1
    }

    /// Walks the graph depth first from `start`, reporting every arrival at a
    /// state. States are only descended into on their first visit.
    pub fn walk(&self, mut visitor: impl FnMut(StateId, Visit)) {
        let Some(start) = self.start else {
            return;
        };

        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            OnStack,
            Done,
        }

        let mut marks = IndexVec::<StateId, Mark>::from_elem(Mark::Unvisited, self.len());
        // (state, index of the next successor to explore)
        let mut stack = vec![(start, 0usize)];
        marks[start] = Mark::OnStack;
        visitor(start, Visit::First);

        while let Some((id, next)) = stack.last().copied() {
            let successors = self.successors(id).collect::<Vec<_>>();

            let Some(&successor) = successors.get(next) else {
                marks[id] = Mark::Done;
                stack.pop();
                continue;
            };

            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }

            match marks[successor] {
                Mark::Unvisited => {
                    marks[successor] = Mark::OnStack;
                    visitor(successor, Visit::First);
                    stack.push((successor, 0));
                }
                Mark::OnStack => visitor(successor, Visit::LoopRevisit),
                Mark::Done => visitor(successor, Visit::Revisit),
            }
        }
    }

    /// States reachable from `start` in reverse postorder: every state comes
    /// before its successors, back edges aside
    pub fn reverse_postorder(&self) -> Vec<StateId> {
        let Some(start) = self.start else {
            return Vec::new();
        };

        let mut visited = IndexVec::<StateId, bool>::from_elem(false, self.len());
        let mut postorder = Vec::with_capacity(self.len());
        let mut stack = vec![(start, 0usize)];
        visited[start] = true;

        while let Some((id, next)) = stack.last().copied() {
            match self.successors(id).nth(next) {
                Some(successor) => {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    if !visited[successor] {
                        visited[successor] = true;
                        stack.push((successor, 0));
                    }
                }
                None => {
                    postorder.push(id);
                    stack.pop();
                }
            }
        }

        postorder.reverse();
        postorder
    }

    pub fn has_cycles(&self) -> bool {
        let mut cyclic = false;
        self.walk(|_, visit| cyclic |= visit == Visit::LoopRevisit);
        cyclic
    }

    /// Declared states that `start` can never reach
    pub fn unreachable_states(&self) -> Vec<StateId> {
        let reachable = self.reverse_postorder();
        self.states
            .indices()
            .filter(|id| !reachable.contains(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::build::*;

    fn state(name: &str, targets: &[&str]) -> Rc<Declaration> {
        let selection = match targets {
            [single] => path(single),
            _ => select(
                vec![path("x")],
                targets
                    .iter()
                    .enumerate()
                    .map(|(i, t)| select_case(int(i as i128), t))
                    .collect(),
            ),
        };
        parser_state(name, Vec::new(), selection)
    }

    fn graph(states: Vec<Rc<Declaration>>) -> ParserGraph {
        ParserGraph::build(&parser("p", Vec::new(), Vec::new(), states))
    }

    #[test]
    fn predecessor_counts_and_join_points() {
        let graph = graph(vec![
            state("start", &["a", "b"]),
            state("a", &["join"]),
            state("b", &["join"]),
            state("join", &["accept"]),
        ]);

        let join = graph.lookup(Symbol::new("join")).unwrap();
        assert_eq!(graph.predecessor_count(join), 2);
        assert!(graph.is_join_point(join));
        assert_eq!(graph.transitions(join), &[Transition::Accept]);
        assert!(!graph.has_cycles());
    }

    #[test]
    fn walk_distinguishes_revisits_from_loops() {
        let graph = graph(vec![
            state("start", &["a", "b"]),
            state("a", &["b"]),
            state("b", &["a", "accept"]),
        ]);

        let mut visits = Vec::new();
        graph.walk(|id, visit| visits.push((graph.state(id).name(), visit)));

        assert_eq!(
            visits,
            vec![
                ("start", Visit::First),
                ("a", Visit::First),
                ("b", Visit::First),
                ("a", Visit::LoopRevisit),
                ("b", Visit::Revisit),
            ]
        );
        assert!(graph.has_cycles());
    }

    #[test]
    fn reverse_postorder_and_unreachable_states() {
        let graph = graph(vec![
            state("start", &["a"]),
            state("a", &["accept"]),
            state("orphan", &["reject"]),
        ]);

        let order = graph
            .reverse_postorder()
            .into_iter()
            .map(|id| graph.state(id).name())
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["start", "a"]);

        let orphans = graph.unreachable_states();
        assert_eq!(orphans.len(), 1);
        assert_eq!(graph.state(orphans[0]).name(), "orphan");
    }
}
