//! Fixed-point analysis of a parser's state graph.
//!
//! Each reachable state gets the join of the values flowing in over all of
//! its incoming edges. States are swept in reverse postorder until a sweep
//! changes no entry value, or the sweep budget runs out on a graph whose
//! loops keep refining.

use std::rc::Rc;

use super::{
    evaluator::{Flow, Issue, SymbolicEvaluator, ValueMap},
    value::SymbolicValue,
};
use crate::{
    diagnostics::CompilerBug,
    index::IndexVec,
    ir::{
        parser_graph::{ParserGraph, StateId},
        Declaration, DeclarationKind, ExpressionKind, Symbol,
    },
    middle::{reference_map::ReferenceMap, type_map::TypeMap},
};

#[derive(Debug)]
pub struct ParserAnalysis {
    pub graph: ParserGraph,
    /// Values on entry to each state; `None` for states nothing reaches
    pub entry: IndexVec<StateId, Option<ValueMap>>,
    /// Failures found during the last sweep
    pub issues: Vec<Issue>,
    pub sweeps: usize,
    /// False when the sweep budget ran out before the values settled
    pub converged: bool,
}

impl ParserAnalysis {
    pub fn analyze(
        parser: &Rc<Declaration>,
        reference_map: &ReferenceMap,
        type_map: &mut TypeMap,
        max_sweeps: usize,
    ) -> Result<Self, CompilerBug> {
        let DeclarationKind::Parser {
            apply_parameters,
            locals,
            ..
        } = &parser.kind
        else {
            return Err(CompilerBug::Internal(format!(
                "`{}` is not a parser",
                parser.name
            )));
        };

        let graph = ParserGraph::build(parser);
        let mut analysis = Self {
            entry: IndexVec::from_elem(None, graph.len()),
            graph,
            issues: Vec::new(),
            sweeps: 0,
            converged: true,
        };

        let Some(start) = analysis.graph.start() else {
            return Ok(analysis);
        };

        let mut evaluator = SymbolicEvaluator::new(reference_map, type_map);
        let mut initial = ValueMap::new();
        evaluator.bind_parameters(apply_parameters, &mut initial);
        for local in locals.iter() {
            evaluator.declare(local, &mut initial)?;
        }
        let local_issues = evaluator.take_issues();
        analysis.entry[start] = Some(initial);

        let order = analysis.graph.reverse_postorder();
        analysis.converged = false;

        while analysis.sweeps < max_sweeps {
            analysis.sweeps += 1;
            let mut issues = local_issues.clone();
            let mut changed = false;

            for &id in order.iter() {
                let Some(mut values) = analysis.entry[id].clone() else {
                    continue;
                };
                if !analysis.sweep_state(id, &mut evaluator, &mut values, &mut issues)? {
                    continue;
                }

                for target in analysis.graph.successors(id).collect::<Vec<_>>() {
                    let slot = &mut analysis.entry[target];
                    match slot {
                        Some(existing) => changed |= existing.merge(&values)?,
                        None => {
                            *slot = Some(values.clone());
                            changed = true;
                        }
                    }
                }
            }

            issues.extend(evaluator.take_issues());
            analysis.issues = issues;

            log::trace!(
                "parser `{}`: sweep {} {}",
                parser.name,
                analysis.sweeps,
                if changed { "refined entry values" } else { "settled" }
            );

            if !changed {
                analysis.converged = true;
                break;
            }
        }

        Ok(analysis)
    }

    /// Executes one state; false when no path leaves it
    fn sweep_state(
        &self,
        id: StateId,
        evaluator: &mut SymbolicEvaluator,
        values: &mut ValueMap,
        issues: &mut Vec<Issue>,
    ) -> Result<bool, CompilerBug> {
        let state = self.graph.state(id);
        let DeclarationKind::ParserState {
            components,
            selection,
        } = &state.kind
        else {
            return Ok(false);
        };

        for component in components.iter() {
            if evaluator.execute(component, values)? == Flow::Stop {
                return Ok(false);
            }
        }

        if let Some(selection) = selection {
            if let ExpressionKind::Select { selectors, .. } = &selection.kind {
                for selector in selectors.iter() {
                    let value = evaluator.evaluate(selector, values)?;
                    let value = if value.is_uninitialized() {
                        SymbolicValue::StaticError(format!(
                            "`{selector}` reads an uninitialized value"
                        ))
                    } else {
                        value
                    };

                    if value.is_error() {
                        issues.push(Issue {
                            span: state.span,
                            statement: selection.id,
                            value,
                        });
                        return Ok(false);
                    }
                }
            }
        }

        Ok(true)
    }

    pub fn entry_values(&self, state: &str) -> Option<&ValueMap> {
        let id = self.graph.lookup(Symbol::new(state))?;
        self.entry[id].as_ref()
    }

    /// Declared states no path from `start` reaches
    pub fn unreachable_states(&self) -> impl Iterator<Item = &Rc<Declaration>> + '_ {
        self.graph
            .unreachable_states()
            .into_iter()
            .map(|id| self.graph.state(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{build::*, prelude, Direction, Program},
        middle::{
            pass::{CompilationContext, Pass},
            resolve::ResolveReferences,
            symbolic::value::Abstract,
        },
    };
    use pretty_assertions::assert_eq;

    struct Fixture {
        context: CompilationContext,
        parser: Rc<Declaration>,
        header: Rc<Declaration>,
        packet: Rc<Declaration>,
    }

    fn fixture(locals: Vec<Rc<Declaration>>, states: Vec<Rc<Declaration>>) -> Fixture {
        let packet = parameter(Direction::None, "pkt", named_type("packet_in"));
        let header = parameter(Direction::Out, "h", named_type("h_t"));
        let parser = parser("p", vec![packet.clone(), header.clone()], locals, states);

        let mut all = prelude::standard_prelude();
        all.push(header_type());
        all.push(parser.clone());
        let mut context = CompilationContext::default();
        ResolveReferences
            .run(Program::new(all), &mut context)
            .unwrap();
        assert!(context.diagnostics.is_empty(), "{:?}", context.diagnostics);

        Fixture {
            context,
            parser,
            header,
            packet,
        }
    }

    fn header_type() -> Rc<Declaration> {
        header("h_t", vec![("f", bits(8)), ("g", bits(8))])
    }

    fn extract() -> Rc<crate::ir::Statement> {
        call_statement(method_call(path("pkt"), "extract", vec![path("h")]))
    }

    fn analyze(fixture: &mut Fixture, max_sweeps: usize) -> ParserAnalysis {
        ParserAnalysis::analyze(
            &fixture.parser,
            &fixture.context.reference_map,
            &mut fixture.context.type_map,
            max_sweeps,
        )
        .unwrap()
    }

    fn validity(values: &ValueMap, header: &Declaration) -> Abstract<bool> {
        match values.get(header) {
            Some(SymbolicValue::Header(header)) => header.valid.clone(),
            other => panic!("not a header: {other:?}"),
        }
    }

    #[test]
    fn straight_line_parsers_track_validity_and_offsets() {
        let mut fixture = fixture(
            Vec::new(),
            vec![
                parser_state("start", vec![extract()], path("next")),
                parser_state("next", Vec::new(), path("accept")),
            ],
        );
        let analysis = analyze(&mut fixture, 16);

        assert!(analysis.converged);
        assert!(analysis.issues.is_empty(), "{:?}", analysis.issues);

        let start = analysis.entry_values("start").unwrap();
        assert_eq!(validity(start, &fixture.header), Abstract::Constant(false));

        let next = analysis.entry_values("next").unwrap();
        assert_eq!(validity(next, &fixture.header), Abstract::Constant(true));
        assert_eq!(next.get(&fixture.packet).unwrap().to_string(), "packet_in @ 16");
    }

    #[test]
    fn extracting_twice_on_every_path_is_reported() {
        let mut fixture = fixture(
            Vec::new(),
            vec![
                parser_state("start", vec![extract()], path("again")),
                parser_state("again", vec![extract()], path("accept")),
            ],
        );
        let analysis = analyze(&mut fixture, 16);

        assert_eq!(analysis.issues.len(), 1);
        assert_eq!(analysis.issues[0].message(), "overwriting already-valid header");
    }

    #[test]
    fn loops_join_at_their_head() {
        let mut fixture = fixture(
            Vec::new(),
            vec![parser_state(
                "start",
                vec![extract()],
                select(
                    vec![member(path("h"), "f")],
                    vec![
                        select_case(sized(1, 8), "start"),
                        select_case(default_keyset(), "accept"),
                    ],
                ),
            )],
        );

        let analysis = analyze(&mut fixture, 16);
        assert!(analysis.converged);
        // The back edge carries a valid header, the entry an invalid one
        let start = analysis.entry_values("start").unwrap();
        assert_eq!(validity(start, &fixture.header), Abstract::Unknown);
        assert_eq!(start.get(&fixture.packet).unwrap().to_string(), "packet_in @ 0+");
        assert!(analysis.issues.is_empty(), "{:?}", analysis.issues);

        let truncated = analyze(&mut fixture, 1);
        assert!(!truncated.converged);
        assert_eq!(truncated.sweeps, 1);
    }

    #[test]
    fn uninitialized_selectors_and_unreachable_states() {
        let mut fixture = fixture(
            vec![variable("y", bits(8), None)],
            vec![
                parser_state(
                    "start",
                    Vec::new(),
                    select(
                        vec![path("y")],
                        vec![select_case(default_keyset(), "accept")],
                    ),
                ),
                parser_state("orphan", Vec::new(), path("reject")),
            ],
        );
        let analysis = analyze(&mut fixture, 16);

        assert_eq!(analysis.issues.len(), 1);
        assert_eq!(analysis.issues[0].message(), "`y` reads an uninitialized value");
        assert_eq!(
            analysis
                .unreachable_states()
                .map(|state| state.name())
                .collect::<Vec<_>>(),
            vec!["orphan"]
        );
    }
}
