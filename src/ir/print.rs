//! P4-style rendering of IR nodes.
//!
//! Output is coloured the way the LIR dumps of the back end are; the plain
//! form (used by `Display` and by tests) is the same text with the escapes
//! stripped.

use colored::Colorize;
use itertools::Itertools;

use super::{
    Annotation, Argument, Declaration, DeclarationKind, Expression, ExpressionKind, Literal,
    Program, Property, PropertyValue, Statement, StatementKind, Type, TypeKind,
};

const INDENT: &str = "    ";

pub fn render_program(program: &Program, color: bool) -> String {
    let mut printer = Printer::default();
    for declaration in program.declarations.iter() {
        printer.declaration(declaration);
    }
    printer.finish(color)
}

pub fn render_declaration(declaration: &Declaration, color: bool) -> String {
    let mut printer = Printer::default();
    printer.declaration(declaration);
    printer.finish(color)
}

pub fn render_statement(statement: &Statement, color: bool) -> String {
    let mut printer = Printer::default();
    printer.statement(statement);
    printer.finish(color)
}

pub fn render_expression(expression: &Expression, color: bool) -> String {
    let text = expression_text(expression);
    if color {
        text
    } else {
        strip_ansi_escapes::strip_str(text)
    }
}

pub fn render_type(ty: &Type, color: bool) -> String {
    let text = type_text(ty);
    if color {
        text
    } else {
        strip_ansi_escapes::strip_str(text)
    }
}

#[derive(Default)]
struct Printer {
    indent: usize,
    out: String,
}

impl Printer {
    fn finish(self, color: bool) -> String {
        if color {
            self.out
        } else {
            strip_ansi_escapes::strip_str(self.out)
        }
    }

    fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.indent {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    fn nested(&mut self, f: impl FnOnce(&mut Self)) {
        self.indent += 1;
        f(self);
        self.indent -= 1;
    }

    fn declaration(&mut self, declaration: &Declaration) {
        let annotations = annotations_text(&declaration.annotations);
        let name = declaration.name().blue();

        match &declaration.kind {
            DeclarationKind::Constant { ty, value } => self.line(format!(
                "{annotations}{} {} {name} = {};",
                "const".magenta(),
                type_text(ty),
                expression_text(value)
            )),
            DeclarationKind::Variable { ty, initializer } => match initializer {
                Some(initializer) => self.line(format!(
                    "{annotations}{} {name} = {};",
                    type_text(ty),
                    expression_text(initializer)
                )),
                None => self.line(format!("{annotations}{} {name};", type_text(ty))),
            },
            DeclarationKind::Parameter { .. } => {
                self.line(format!("{};", parameter_text(declaration)))
            }
            DeclarationKind::TypeVariable => self.line(format!("{name};")),
            DeclarationKind::Struct { fields }
            | DeclarationKind::Header { fields }
            | DeclarationKind::HeaderUnion { fields } => {
                let keyword = match declaration.kind {
                    DeclarationKind::Struct { .. } => "struct",
                    DeclarationKind::Header { .. } => "header",
                    _ => "header_union",
                };
                self.line(format!("{annotations}{} {name} {{", keyword.magenta()));
                self.nested(|p| {
                    for field in fields.iter() {
                        p.line(format!("{} {};", type_text(&field.ty), field.name));
                    }
                });
                self.line("}");
            }
            DeclarationKind::Enum { members } => self.line(format!(
                "{annotations}{} {name} {{ {} }}",
                "enum".magenta(),
                members.iter().join(", ")
            )),
            DeclarationKind::Error { members } => self.line(format!(
                "{} {{ {} }}",
                "error".magenta(),
                members.iter().join(", ")
            )),
            DeclarationKind::Extern {
                type_parameters,
                methods,
            } => {
                self.line(format!(
                    "{annotations}{} {name}{} {{",
                    "extern".magenta(),
                    type_parameters_text(type_parameters)
                ));
                self.nested(|p| {
                    for method in methods.iter() {
                        p.declaration(method);
                    }
                });
                self.line("}");
            }
            DeclarationKind::Method {
                signature,
                is_abstract,
            } => {
                let prefix = if *is_abstract {
                    format!("{} ", "abstract".magenta())
                } else {
                    String::new()
                };
                self.line(format!(
                    "{annotations}{prefix}{} {name}{}({});",
                    type_text(&signature.return_type),
                    type_parameters_text(&signature.type_parameters),
                    parameters_text(&signature.parameters)
                ))
            }
            DeclarationKind::Function { signature, body } => {
                self.line(format!(
                    "{annotations}{} {name}{}({}) {{",
                    type_text(&signature.return_type),
                    type_parameters_text(&signature.type_parameters),
                    parameters_text(&signature.parameters)
                ));
                self.statements(&body.statements);
                self.line("}");
            }
            DeclarationKind::Action { parameters, body } => {
                self.line(format!(
                    "{annotations}{} {name}({}) {{",
                    "action".magenta(),
                    parameters_text(parameters)
                ));
                self.statements(&body.statements);
                self.line("}");
            }
            DeclarationKind::Table { properties } | DeclarationKind::StatefulAlu { properties } => {
                let keyword = match declaration.kind {
                    DeclarationKind::Table { .. } => "table",
                    _ => "stateful_alu",
                };
                self.line(format!("{annotations}{} {name} {{", keyword.magenta()));
                self.nested(|p| {
                    for property in properties.iter() {
                        p.property(property);
                    }
                });
                self.line("}");
            }
            DeclarationKind::Instance {
                ty,
                arguments,
                initializer,
            } => {
                let head = format!(
                    "{annotations}{}({}) {name}",
                    type_text(ty),
                    arguments_text(arguments)
                );
                match initializer {
                    Some(initializer) => {
                        self.line(format!("{head} = {{"));
                        self.nested(|p| {
                            for declaration in initializer.iter() {
                                p.declaration(declaration);
                            }
                        });
                        self.line("};");
                    }
                    None => self.line(format!("{head};")),
                }
            }
            DeclarationKind::ParserState {
                components,
                selection,
            } => {
                self.line(format!("{annotations}{} {name} {{", "state".magenta()));
                self.nested(|p| {
                    for component in components.iter() {
                        p.statement(component);
                    }
                    if let Some(selection) = selection {
                        p.transition(selection);
                    }
                });
                self.line("}");
            }
            DeclarationKind::Parser {
                type_parameters,
                apply_parameters,
                constructor_parameters,
                locals,
                states,
            } => {
                self.line(format!(
                    "{annotations}{} {name}{}({}){} {{",
                    "parser".magenta(),
                    type_parameters_text(type_parameters),
                    parameters_text(apply_parameters),
                    constructor_parameters_text(constructor_parameters)
                ));
                self.nested(|p| {
                    for declaration in locals.iter().chain(states.iter()) {
                        p.declaration(declaration);
                    }
                });
                self.line("}");
            }
            DeclarationKind::Control {
                type_parameters,
                apply_parameters,
                constructor_parameters,
                locals,
                body,
            } => {
                self.line(format!(
                    "{annotations}{} {name}{}({}){} {{",
                    "control".magenta(),
                    type_parameters_text(type_parameters),
                    parameters_text(apply_parameters),
                    constructor_parameters_text(constructor_parameters)
                ));
                self.nested(|p| {
                    for declaration in locals.iter() {
                        p.declaration(declaration);
                    }
                    p.line(format!("{} {{", "apply".magenta()));
                    p.statements(&body.statements);
                    p.line("}");
                });
                self.line("}");
            }
            DeclarationKind::Package {
                type_parameters,
                constructor_parameters,
            } => self.line(format!(
                "{annotations}{} {name}{}({});",
                "package".magenta(),
                type_parameters_text(type_parameters),
                parameters_text(constructor_parameters)
            )),
        }
    }

    fn property(&mut self, property: &Property) {
        match &property.value {
            PropertyValue::Expression(expression) => self.line(format!(
                "{} = {};",
                property.name,
                expression_text(expression)
            )),
            PropertyValue::ActionList(actions) => {
                self.line(format!("{} = {{", property.name));
                self.nested(|p| {
                    for action in actions.iter() {
                        p.line(format!("{};", expression_text(action)));
                    }
                });
                self.line("}");
            }
            PropertyValue::Key(elements) => {
                self.line(format!("{} = {{", property.name));
                self.nested(|p| {
                    for element in elements.iter() {
                        p.line(format!(
                            "{}: {};",
                            expression_text(&element.expression),
                            element.match_kind
                        ));
                    }
                });
                self.line("}");
            }
        }
    }

    fn transition(&mut self, selection: &Expression) {
        match &selection.kind {
            ExpressionKind::Select { selectors, cases } => {
                self.line(format!(
                    "{} {}({}) {{",
                    "transition".magenta(),
                    "select".magenta(),
                    selectors.iter().map(|s| expression_text(s)).join(", ")
                ));
                self.nested(|p| {
                    for case in cases.iter() {
                        p.line(format!(
                            "{}: {};",
                            expression_text(&case.keyset),
                            case.state.name
                        ));
                    }
                });
                self.line("}");
            }
            _ => self.line(format!(
                "{} {};",
                "transition".magenta(),
                expression_text(selection)
            )),
        }
    }

    fn statements(&mut self, statements: &[std::rc::Rc<Statement>]) {
        self.nested(|p| {
            for statement in statements {
                p.statement(statement);
            }
        });
    }

    fn statement(&mut self, statement: &Statement) {
        match &statement.kind {
            StatementKind::Assignment { lhs, rhs } => self.line(format!(
                "{} = {};",
                expression_text(lhs),
                expression_text(rhs)
            )),
            StatementKind::MethodCall(call) => self.line(format!("{};", expression_text(call))),
            StatementKind::If {
                condition,
                positive,
                negative,
            } => {
                self.line(format!(
                    "{} ({}) {{",
                    "if".magenta(),
                    expression_text(condition)
                ));
                self.branch(positive);
                match negative {
                    Some(negative) => {
                        self.line(format!("}} {} {{", "else".magenta()));
                        self.branch(negative);
                        self.line("}");
                    }
                    None => self.line("}"),
                }
            }
            StatementKind::Block(block) => {
                self.line("{");
                self.statements(&block.statements);
                self.line("}");
            }
            StatementKind::Return(Some(value)) => self.line(format!(
                "{} {};",
                "return".magenta(),
                expression_text(value)
            )),
            StatementKind::Return(None) => self.line(format!("{};", "return".magenta())),
            StatementKind::Exit => self.line(format!("{};", "exit".magenta())),
            StatementKind::Empty => self.line(";"),
            StatementKind::Declaration(declaration) => self.declaration(declaration),
        }
    }

    /// The body of an `if` arm, without the braces of a block arm
    fn branch(&mut self, statement: &Statement) {
        match &statement.kind {
            StatementKind::Block(block) => self.statements(&block.statements),
            _ => self.nested(|p| p.statement(statement)),
        }
    }
}

fn annotations_text(annotations: &[std::rc::Rc<Annotation>]) -> String {
    annotations
        .iter()
        .map(|annotation| {
            if annotation.expressions.is_empty() {
                format!("{} ", format!("@{}", annotation.name).cyan())
            } else {
                format!(
                    "{}({}) ",
                    format!("@{}", annotation.name).cyan(),
                    annotation
                        .expressions
                        .iter()
                        .map(|e| expression_text(e))
                        .join(", ")
                )
            }
        })
        .collect()
}

fn parameter_text(parameter: &Declaration) -> String {
    let DeclarationKind::Parameter {
        direction,
        ty,
        default_value,
    } = &parameter.kind
    else {
        return parameter.name().to_owned();
    };

    let mut text = annotations_text(&parameter.annotations);
    let direction = direction.to_string();
    if !direction.is_empty() {
        text.push_str(&format!("{} ", direction.magenta()));
    }
    text.push_str(&format!("{} {}", type_text(ty), parameter.name()));
    if let Some(default_value) = default_value {
        text.push_str(&format!(" = {}", expression_text(default_value)));
    }
    text
}

fn parameters_text(parameters: &[std::rc::Rc<Declaration>]) -> String {
    parameters.iter().map(|p| parameter_text(p)).join(", ")
}

fn constructor_parameters_text(parameters: &[std::rc::Rc<Declaration>]) -> String {
    if parameters.is_empty() {
        String::new()
    } else {
        format!("({})", parameters_text(parameters))
    }
}

fn type_parameters_text(parameters: &[std::rc::Rc<Declaration>]) -> String {
    if parameters.is_empty() {
        String::new()
    } else {
        format!(
            "<{}>",
            parameters
                .iter()
                .map(|p| p.name().yellow().to_string())
                .join(", ")
        )
    }
}

fn arguments_text(arguments: &[std::rc::Rc<Argument>]) -> String {
    arguments
        .iter()
        .map(|argument| match argument.name {
            Some(name) => format!("{name} = {}", expression_text(&argument.expression)),
            None => expression_text(&argument.expression),
        })
        .join(", ")
}

fn literal_text(literal: &Literal) -> String {
    let text = match literal {
        Literal::Boolean(b) => b.to_string(),
        Literal::Integer {
            value,
            width: Some(width),
            signed,
        } => format!("{width}{}{value}", if *signed { "s" } else { "w" }),
        Literal::Integer { value, .. } => value.to_string(),
        Literal::String(s) => format!("{s:?}"),
    };
    text.purple().to_string()
}

fn type_text(ty: &Type) -> String {
    let text = match &ty.kind {
        TypeKind::Bool => "bool".to_owned(),
        TypeKind::Bits {
            width,
            signed: false,
        } => format!("bit<{width}>"),
        TypeKind::Bits {
            width,
            signed: true,
        } => format!("int<{width}>"),
        TypeKind::Varbits { max_width } => format!("varbit<{max_width}>"),
        TypeKind::Void => "void".to_owned(),
        TypeKind::Error => "error".to_owned(),
        TypeKind::String => "string".to_owned(),
        TypeKind::Name(path) => path.name.to_string(),
        TypeKind::Specialized { base, arguments } => {
            return format!(
                "{}<{}>",
                type_text(base),
                arguments.iter().map(|a| type_text(a)).join(", ")
            )
        }
        TypeKind::Stack { element, size } => return format!("{}[{size}]", type_text(element)),
        TypeKind::Tuple(elements) => {
            return format!(
                "{}<{}>",
                "tuple".yellow(),
                elements.iter().map(|e| type_text(e)).join(", ")
            )
        }
    };
    text.yellow().to_string()
}

fn operand_text(operand: &Expression) -> String {
    match operand.kind {
        ExpressionKind::Binary { .. } | ExpressionKind::Mux { .. } => {
            format!("({})", expression_text(operand))
        }
        _ => expression_text(operand),
    }
}

fn expression_text(expression: &Expression) -> String {
    match &expression.kind {
        ExpressionKind::Literal(literal) => literal_text(literal),
        ExpressionKind::Path(path) => path.name.to_string(),
        ExpressionKind::This => "this".magenta().to_string(),
        ExpressionKind::Member { base, member } => format!("{}.{member}", operand_text(base)),
        ExpressionKind::ArrayIndex { base, index } => {
            format!("{}[{}]", operand_text(base), expression_text(index))
        }
        ExpressionKind::TypeName(ty) => type_text(ty),
        ExpressionKind::Binary { operator, lhs, rhs } => format!(
            "{} {operator} {}",
            operand_text(lhs),
            operand_text(rhs)
        ),
        ExpressionKind::Unary { operator, operand } => {
            format!("{operator}{}", operand_text(operand))
        }
        ExpressionKind::Cast { ty, expression } => {
            format!("({}){}", type_text(ty), operand_text(expression))
        }
        ExpressionKind::MethodCall {
            target,
            type_arguments,
            arguments,
        } => {
            let type_arguments = if type_arguments.is_empty() {
                String::new()
            } else {
                format!("<{}>", type_arguments.iter().map(|t| type_text(t)).join(", "))
            };
            format!(
                "{}{type_arguments}({})",
                operand_text(target),
                arguments_text(arguments)
            )
        }
        ExpressionKind::ConstructorCall { ty, arguments } => {
            format!("{}({})", type_text(ty), arguments_text(arguments))
        }
        ExpressionKind::List(items) => {
            format!("{{ {} }}", items.iter().map(|i| expression_text(i)).join(", "))
        }
        ExpressionKind::StructLiteral(fields) => format!(
            "{{ {} }}",
            fields
                .iter()
                .map(|f| format!("{} = {}", f.name, expression_text(&f.expression)))
                .join(", ")
        ),
        ExpressionKind::Mux {
            condition,
            positive,
            negative,
        } => format!(
            "{} ? {} : {}",
            operand_text(condition),
            operand_text(positive),
            operand_text(negative)
        ),
        ExpressionKind::Select { selectors, cases } => format!(
            "{}({}) {{ {} }}",
            "select".magenta(),
            selectors.iter().map(|s| expression_text(s)).join(", "),
            cases
                .iter()
                .map(|c| format!("{}: {};", expression_text(&c.keyset), c.state.name))
                .join(" ")
        ),
        ExpressionKind::Default => "default".magenta().to_string(),
    }
}

impl core::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&strip_ansi_escapes::strip_str(literal_text(self)))
    }
}

impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&render_type(self, false))
    }
}

impl core::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&render_expression(self, false))
    }
}

impl core::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(render_statement(self, false).trim_end())
    }
}

impl core::fmt::Display for Declaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(render_declaration(self, false).trim_end())
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ir::{build::*, BinaryOperatorKind, Direction};

    #[test]
    fn expressions() {
        let expression = binary(
            BinaryOperatorKind::Add,
            binary(BinaryOperatorKind::Multiply, path("a"), sized(3, 8)),
            method_call(member(path("hdr"), "ipv4"), "isValid", Vec::new()),
        );

        assert_eq!(expression.to_string(), "(a * 8w3) + hdr.ipv4.isValid()");
    }

    #[test]
    fn parser_state_with_select() {
        let state = parser_state(
            "start",
            vec![call_statement(method_call(
                path("pkt"),
                "extract",
                vec![member(path("hdr"), "eth")],
            ))],
            select(
                vec![member(member(path("hdr"), "eth"), "type")],
                vec![
                    select_case(sized(0x800, 16), "parse_ipv4"),
                    select_case(default_keyset(), "accept"),
                ],
            ),
        );

        assert_eq!(
            render_declaration(&state, false),
            indoc! {"
                state start {
                    pkt.extract(hdr.eth);
                    transition select(hdr.eth.type) {
                        16w2048: parse_ipv4;
                        default: accept;
                    }
                }
            "}
        );
    }

    #[test]
    fn control_with_action() {
        let control = control(
            "ingress",
            vec![parameter(Direction::InOut, "meta", named_type("meta_t"))],
            vec![action(
                "set",
                vec![parameter(Direction::None, "v", bits(8))],
                vec![assign(member(path("meta"), "x"), path("v"))],
            )],
            vec![if_statement(
                path("c"),
                block_statement(vec![call_statement(call(path("set"), vec![sized(1, 8)]))]),
                Some(exit_statement()),
            )],
        );

        assert_eq!(
            render_declaration(&control, false),
            indoc! {"
                control ingress(inout meta_t meta) {
                    action set(bit<8> v) {
                        meta.x = v;
                    }
                    apply {
                        if (c) {
                            set(8w1);
                        } else {
                            exit;
                        }
                    }
                }
            "}
        );
    }
}
