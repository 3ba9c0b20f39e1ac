//! Who invokes what: edges from actions, tables and control bodies to the
//! actions, tables, controls and extern instances (counters, meters,
//! registers, ...) they call. Declarations local to a control are named
//! `control.local`.

use std::{fmt, rc::Rc};

use hashbrown::{HashMap, HashSet};
use serde::Serialize;

use crate::{
    diagnostics::CompilerBug,
    ir::{
        visit::{inspect_program, Context, Inspector},
        Declaration, DeclarationKind, Expression, ExpressionKind, NodeId, Program, Property,
        PropertyValue,
    },
    middle::{
        instance::{MethodInstance, MethodKind, ResolutionError},
        reference_map::ReferenceMap,
        type_map::TypeMap,
    },
};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CalleeKind {
    Action,
    Table,
    Control,
    Counter,
    Meter,
    Register,
    Extern,
}

impl CalleeKind {
    fn of_extern(name: &str) -> Self {
        match name {
            "Counter" | "DirectCounter" => Self::Counter,
            "Meter" | "DirectMeter" => Self::Meter,
            "Register" | "RegisterAction" => Self::Register,
            _ => Self::Extern,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CallGraphEdge {
    pub caller: String,
    pub callee: String,
    pub kind: CalleeKind,
}

#[derive(Debug, Default, Serialize)]
pub struct CallGraph {
    edges: Vec<CallGraphEdge>,
    #[serde(skip)]
    seen: HashSet<CallGraphEdge>,
}

impl CallGraph {
    pub fn build(
        program: &Program,
        reference_map: &ReferenceMap,
        type_map: &mut TypeMap,
    ) -> Result<Self, CompilerBug> {
        let mut names = HashMap::new();
        for declaration in program.declarations.iter() {
            names.insert(declaration.id, declaration.name().to_owned());
            if let DeclarationKind::Control { locals, .. } = &declaration.kind {
                for local in locals.iter() {
                    names.insert(local.id, format!("{}.{}", declaration.name, local.name));
                }
            }
        }

        let mut builder = Builder {
            reference_map,
            type_map,
            names,
            graph: CallGraph::default(),
            bug: None,
        };
        inspect_program(&mut builder, program);

        match builder.bug {
            Some(bug) => Err(bug),
            None => {
                log::debug!("call graph has {} edges", builder.graph.len());
                Ok(builder.graph)
            }
        }
    }

    pub fn edges(&self) -> &[CallGraphEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn callees<'g>(&'g self, caller: &'g str) -> impl Iterator<Item = &'g CallGraphEdge> {
        self.edges.iter().filter(move |edge| edge.caller == caller)
    }

    pub fn callers<'g>(&'g self, callee: &'g str) -> impl Iterator<Item = &'g CallGraphEdge> {
        self.edges.iter().filter(move |edge| edge.callee == callee)
    }

    fn add(&mut self, edge: CallGraphEdge) {
        if self.seen.insert(edge.clone()) {
            self.edges.push(edge);
        }
    }
}

impl fmt::Display for CallGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for edge in self.edges.iter() {
            writeln!(f, "{} -> {} ({})", edge.caller, edge.callee, edge.kind)?;
        }
        Ok(())
    }
}

struct Builder<'a> {
    reference_map: &'a ReferenceMap,
    type_map: &'a mut TypeMap,
    names: HashMap<NodeId, String>,
    graph: CallGraph,
    bug: Option<CompilerBug>,
}

impl Builder<'_> {
    fn name_of(&self, declaration: &Declaration) -> String {
        self.names
            .get(&declaration.id)
            .cloned()
            .unwrap_or_else(|| declaration.name().to_owned())
    }

    fn caller(&self, context: &Context) -> Option<String> {
        let caller = context
            .enclosing_action()
            .or_else(|| context.enclosing_table())
            .or_else(|| context.enclosing_control())?;
        Some(self.name_of(caller))
    }

    fn add(&mut self, context: &Context, callee: &Declaration, kind: CalleeKind) {
        let Some(caller) = self.caller(context) else {
            return;
        };
        let callee = self.name_of(callee);
        self.graph.add(CallGraphEdge {
            caller,
            callee,
            kind,
        });
    }

    fn call(&mut self, call: &Rc<Expression>, context: &Context) {
        let instance = match MethodInstance::resolve(call, self.reference_map, self.type_map) {
            Ok(instance) => instance,
            Err(ResolutionError::Binding(_)) => return,
            Err(ResolutionError::Bug(bug)) => {
                self.bug.get_or_insert(bug);
                return;
            }
        };

        match &instance.kind {
            MethodKind::ActionCall { action } => self.add(context, action, CalleeKind::Action),
            MethodKind::Apply { object, applied } => match applied.kind {
                DeclarationKind::Table { .. } => self.add(context, object, CalleeKind::Table),
                DeclarationKind::Control { .. } => self.add(context, object, CalleeKind::Control),
                _ => {}
            },
            MethodKind::ExternMethod {
                object: Some(object),
                extern_type,
                ..
            } if matches!(object.kind, DeclarationKind::Instance { .. }) => {
                self.add(context, object, CalleeKind::of_extern(extern_type.name()))
            }
            _ => {}
        }
    }

    /// An entry of a table's action list, or its default action
    fn listed_action(&mut self, entry: &Expression, context: &Context) {
        let path = match &entry.kind {
            ExpressionKind::MethodCall { target, .. } => target.as_path(),
            _ => entry.as_path(),
        };
        let action = path.and_then(|path| self.reference_map.get_declaration(path));
        if let Some(action) = action.filter(|action| action.is_action()) {
            self.add(context, action, CalleeKind::Action);
        }
    }
}

impl Inspector for Builder<'_> {
    fn preorder_property(&mut self, property: &Rc<Property>, context: &Context) -> bool {
        match &property.value {
            PropertyValue::ActionList(actions) => {
                for action in actions.iter() {
                    self.listed_action(action, context);
                }
                false
            }
            PropertyValue::Expression(value) if property.name.name() == "default_action" => {
                self.listed_action(value, context);
                false
            }
            _ => true,
        }
    }

    fn preorder_expression(&mut self, expression: &Rc<Expression>, context: &Context) -> bool {
        if expression.is_method_call() {
            self.call(expression, context);
        }
        true
    }

    fn preorder_declaration(&mut self, declaration: &Rc<Declaration>, _context: &Context) -> bool {
        !matches!(
            declaration.kind,
            DeclarationKind::Extern { .. } | DeclarationKind::Parser { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{build::*, Direction},
        middle::passes::testing::compile,
    };
    use pretty_assertions::assert_eq;

    fn edges(graph: &CallGraph) -> Vec<String> {
        graph
            .edges()
            .iter()
            .map(|edge| format!("{} -> {} ({})", edge.caller, edge.callee, edge.kind))
            .collect()
    }

    #[test]
    fn calls_are_collected_from_actions_tables_and_bodies() {
        let (program, mut context) = compile(vec![
            action("drop", Vec::new(), Vec::new()),
            control(
                "c",
                vec![parameter(Direction::InOut, "x", bits(32))],
                vec![
                    instance(
                        "hits",
                        specialized_type("Counter", vec![bits(32)]),
                        vec![sized(16, 32)],
                    ),
                    instance(
                        "r",
                        specialized_type("Register", vec![bits(32), bits(32)]),
                        vec![sized(16, 32)],
                    ),
                    action(
                        "count",
                        Vec::new(),
                        vec![
                            call_statement(method_call(path("hits"), "count", vec![sized(1, 32)])),
                            call_statement(method_call(
                                path("r"),
                                "write",
                                vec![sized(0, 32), path("x")],
                            )),
                        ],
                    ),
                    table(
                        "t",
                        vec![
                            key_property(vec![(path("x"), "exact")]),
                            actions_property(vec![path("count"), path("drop")]),
                            property("default_action", call(path("drop"), Vec::new())),
                        ],
                    ),
                ],
                vec![
                    call_statement(method_call(path("t"), "apply", Vec::new())),
                    call_statement(call(path("count"), Vec::new())),
                ],
            ),
        ]);

        let graph =
            CallGraph::build(&program, &context.reference_map, &mut context.type_map).unwrap();
        assert_eq!(
            edges(&graph),
            vec![
                "c.count -> c.hits (counter)",
                "c.count -> c.r (register)",
                "c.t -> c.count (action)",
                "c.t -> drop (action)",
                "c -> c.t (table)",
                "c -> c.count (action)",
            ]
        );
        assert_eq!(graph.callees("c").count(), 2);
        assert_eq!(graph.callers("drop").count(), 1);
    }

    #[test]
    fn packet_methods_are_not_edges() {
        let (program, mut context) = compile(vec![
            header("h_t", vec![("f", bits(8))]),
            control(
                "d",
                vec![
                    parameter(Direction::None, "pkt", named_type("packet_out")),
                    parameter(Direction::In, "h", named_type("h_t")),
                ],
                Vec::new(),
                vec![call_statement(method_call(path("pkt"), "emit", vec![path("h")]))],
            ),
        ]);

        let graph =
            CallGraph::build(&program, &context.reference_map, &mut context.type_map).unwrap();
        assert!(graph.is_empty());
    }
}
