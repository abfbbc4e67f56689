//! Java source rendering.

use crate::{
    bytecode::{CompareKind, InvokeKind, MethodCode, UnaryOp},
    codegen::{
        expression::{binary_precedence, Expression, LValue, Literal},
        statement::{CatchBlock, MethodBody, Statement, SwitchArm},
    },
    types::JavaType,
};

/// Prints method bodies as Java source.
///
/// Output is deterministic: the same body always renders to the same text.
#[derive(Debug, Clone)]
pub struct JavaWriter {
    indent: usize,
}

impl Default for JavaWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl JavaWriter {
    /// Creates a writer indenting by four spaces.
    #[must_use]
    pub fn new() -> Self {
        JavaWriter { indent: 4 }
    }

    /// Sets the number of spaces per nesting level.
    #[must_use]
    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }

    /// Renders a complete method declaration with its body.
    #[must_use]
    pub fn method(&self, method: &MethodCode, body: &MethodBody) -> String {
        let mut printer = Printer::new(self, body);
        let header = if &*method.name == "<clinit>" {
            "static".to_string()
        } else {
            let params: Vec<String> = body
                .params
                .iter()
                .map(|&param| {
                    let ty = body
                        .local(param)
                        .map_or_else(|| "Object".to_string(), |local| type_name(&local.ty));
                    format!("{ty} {}", body.name(param))
                })
                .collect();
            let modifier = if method.is_static { "static " } else { "" };
            let name = if method.is_constructor() {
                method.class.simple_name().to_string()
            } else {
                format!("{} {}", type_name(&method.descriptor.ret), method.name)
            };
            format!("{modifier}{name}({})", params.join(", "))
        };
        printer.open(&header);
        printer.statements(&body.statements);
        printer.close("}");
        printer.out
    }

    /// Renders statements at nesting level zero.
    #[must_use]
    pub fn statements(&self, body: &MethodBody, statements: &[Statement]) -> String {
        let mut printer = Printer::new(self, body);
        printer.statements(statements);
        printer.out
    }

    /// Renders one expression.
    #[must_use]
    pub fn expression(&self, body: &MethodBody, expr: &Expression) -> String {
        Printer::new(self, body).expr(expr)
    }
}

struct Printer<'a> {
    writer: &'a JavaWriter,
    body: &'a MethodBody,
    depth: usize,
    out: String,
}

impl<'a> Printer<'a> {
    fn new(writer: &'a JavaWriter, body: &'a MethodBody) -> Self {
        Printer {
            writer,
            body,
            depth: 0,
            out: String::new(),
        }
    }

    fn line(&mut self, text: &str) {
        self.out.push_str(&" ".repeat(self.depth * self.writer.indent));
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn open(&mut self, header: &str) {
        self.line(&format!("{header} {{"));
        self.depth += 1;
    }

    fn close(&mut self, footer: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.line(footer);
    }

    fn statements(&mut self, statements: &[Statement]) {
        for statement in statements {
            self.statement(statement);
        }
    }

    fn statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Declare(local) => {
                let ty = self
                    .body
                    .local(*local)
                    .map_or_else(|| "Object".to_string(), |local| type_name(&local.ty));
                self.line(&format!("{ty} {};", self.body.name(*local)));
            }
            Statement::Assign {
                target,
                value,
                declare,
            } => {
                let target = match target {
                    LValue::Local(local) if *declare => {
                        let ty = self
                            .body
                            .local(*local)
                            .map_or_else(|| "Object".to_string(), |local| type_name(&local.ty));
                        format!("{ty} {}", self.body.name(*local))
                    }
                    LValue::Local(local) => self.body.name(*local).to_string(),
                    LValue::ArrayElement { array, index } => {
                        format!("{}[{}]", self.child(array, 15), self.expr(index))
                    }
                    LValue::InstanceField { object, field } => {
                        format!("{}.{}", self.child(object, 15), field.name)
                    }
                    LValue::StaticField(field) => {
                        format!("{}.{}", field.class.simple_name(), field.name)
                    }
                };
                let value = self.expr(value);
                self.line(&format!("{target} = {value};"));
            }
            Statement::Expression(expr) => {
                let text = self.expr(expr);
                self.line(&format!("{text};"));
            }
            Statement::ConstructorCall { delegate, args } => {
                let keyword = if *delegate { "this" } else { "super" };
                let args = self.args(args);
                self.line(&format!("{keyword}({args});"));
            }
            Statement::Return(None) => self.line("return;"),
            Statement::Return(Some(value)) => {
                let value = self.expr(value);
                self.line(&format!("return {value};"));
            }
            Statement::Throw(value) => {
                let value = self.expr(value);
                self.line(&format!("throw {value};"));
            }
            Statement::Monitor { enter, object } => {
                let name = if *enter { "monitorenter" } else { "monitorexit" };
                let object = self.expr(object);
                self.line(&format!("{name}({object});"));
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.expr(condition);
                self.open(&format!("if ({condition})"));
                self.statements(then_branch);
                self.else_chain(else_branch);
            }
            Statement::While {
                label,
                condition,
                body,
            } => {
                let condition = self.expr(condition);
                self.open(&format!("{}while ({condition})", label_prefix(label.as_deref())));
                self.statements(body);
                self.close("}");
            }
            Statement::DoWhile {
                label,
                body,
                condition,
            } => {
                self.open(&format!("{}do", label_prefix(label.as_deref())));
                self.statements(body);
                let condition = self.expr(condition);
                self.close(&format!("}} while ({condition});"));
            }
            Statement::Loop { label, body } => {
                self.open(&format!("{}while (true)", label_prefix(label.as_deref())));
                self.statements(body);
                self.close("}");
            }
            Statement::Switch { selector, arms } => {
                let selector = self.expr(selector);
                self.open(&format!("switch ({selector})"));
                for arm in arms {
                    self.arm(arm);
                }
                self.close("}");
            }
            Statement::Try {
                body,
                catches,
                finally,
            } => {
                self.open("try");
                self.statements(body);
                for clause in catches {
                    self.catch(clause);
                }
                if let Some(finally) = finally {
                    self.close("} finally {");
                    self.depth += 1;
                    self.statements(finally);
                }
                self.close("}");
            }
            Statement::Break(label) => match label {
                Some(label) => self.line(&format!("break {label};")),
                None => self.line("break;"),
            },
            Statement::Continue(label) => match label {
                Some(label) => self.line(&format!("continue {label};")),
                None => self.line("continue;"),
            },
            Statement::Label(label) => {
                self.depth = self.depth.saturating_sub(1);
                self.line(&format!("{label}:"));
                self.depth += 1;
            }
            Statement::Goto(label) => self.line(&format!("goto {label};")),
            Statement::Comment(text) => self.line(&format!("// {text}")),
        }
    }

    /// `} else if (..) {` for an else arm holding a single `if`.
    fn else_chain(&mut self, else_branch: &[Statement]) {
        match else_branch {
            [] => self.close("}"),
            [Statement::If {
                condition,
                then_branch,
                else_branch,
            }] => {
                let condition = self.expr(condition);
                self.close(&format!("}} else if ({condition}) {{"));
                self.depth += 1;
                self.statements(then_branch);
                self.else_chain(else_branch);
            }
            statements => {
                self.close("} else {");
                self.depth += 1;
                self.statements(statements);
                self.close("}");
            }
        }
    }

    fn arm(&mut self, arm: &SwitchArm) {
        for key in &arm.keys {
            self.line(&format!("case {key}:"));
        }
        if arm.default {
            self.line("default:");
        }
        self.depth += 1;
        self.statements(&arm.body);
        self.depth = self.depth.saturating_sub(1);
    }

    fn catch(&mut self, clause: &CatchBlock) {
        let types: Vec<String> = clause.types.iter().map(type_name).collect();
        let header = format!(
            "}} catch ({} {}) {{",
            types.join(" | "),
            self.body.name(clause.local)
        );
        self.close(&header);
        self.depth += 1;
        self.statements(&clause.body);
    }

    fn args(&self, args: &[Expression]) -> String {
        args.iter().map(|arg| self.expr(arg)).collect::<Vec<_>>().join(", ")
    }

    /// Renders `expr`, parenthesized if it binds looser than `min`.
    fn child(&self, expr: &Expression, min: u8) -> String {
        let text = self.expr(expr);
        if expr.precedence() < min {
            format!("({text})")
        } else {
            text
        }
    }

    fn expr(&self, expr: &Expression) -> String {
        match expr {
            Expression::Local(local) => self.body.name(*local).to_string(),
            Expression::This => "this".to_string(),
            Expression::Literal(literal) => literal_text(literal),
            Expression::Unary { op, operand } => {
                let symbol = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "~",
                };
                let operand = self.child(operand, 13);
                if operand.starts_with(symbol) {
                    format!("{symbol}({operand})")
                } else {
                    format!("{symbol}{operand}")
                }
            }
            Expression::Binary { op, lhs, rhs } => {
                let precedence = binary_precedence(*op);
                format!(
                    "{} {} {}",
                    self.child(lhs, precedence),
                    op.symbol(),
                    self.child(rhs, precedence + 1)
                )
            }
            Expression::Compare { kind, lhs, rhs } => {
                let class = match kind {
                    CompareKind::CmpLong => "Long",
                    CompareKind::CmplFloat | CompareKind::CmpgFloat => "Float",
                    CompareKind::CmplDouble | CompareKind::CmpgDouble => "Double",
                };
                format!("{class}.compare({}, {})", self.expr(lhs), self.expr(rhs))
            }
            Expression::Condition { op, lhs, rhs } => {
                let precedence = expr.precedence();
                format!(
                    "{} {} {}",
                    self.child(lhs, precedence),
                    op.symbol(),
                    self.child(rhs, precedence + 1)
                )
            }
            Expression::Not(operand) => format!("!{}", self.child(operand, 13)),
            Expression::Cast { ty, operand } => {
                format!("({}) {}", type_name(ty), self.child(operand, 13))
            }
            Expression::InstanceOf { operand, ty } => {
                format!("{} instanceof {}", self.child(operand, 9), type_name(ty))
            }
            Expression::Invoke {
                kind,
                method,
                receiver,
                args,
            } => {
                let target = match (kind, receiver) {
                    (InvokeKind::Static, _) | (_, None) => method.class.simple_name().to_string(),
                    (InvokeKind::Super, Some(_)) => "super".to_string(),
                    (_, Some(receiver)) => self.child(receiver, 15),
                };
                format!("{target}.{}({})", method.name, self.args(args))
            }
            Expression::New { class, args } => {
                format!("new {}({})", class.simple_name(), self.args(args))
            }
            Expression::NewArray { element, size } => {
                let (base, dimensions) = element.base_type();
                format!(
                    "new {}[{}]{}",
                    type_name(base),
                    self.expr(size),
                    "[]".repeat(dimensions)
                )
            }
            Expression::ArrayLength(array) => format!("{}.length", self.child(array, 15)),
            Expression::ArrayGet { array, index } => {
                format!("{}[{}]", self.child(array, 15), self.expr(index))
            }
            Expression::InstanceField { object, field } => {
                format!("{}.{}", self.child(object, 15), field.name)
            }
            Expression::StaticField(field) => {
                format!("{}.{}", field.class.simple_name(), field.name)
            }
        }
    }
}

fn label_prefix(label: Option<&str>) -> String {
    label.map_or_else(String::new, |label| format!("{label}: "))
}

/// Source spelling of a type, with classes by simple name.
fn type_name(ty: &JavaType) -> String {
    match ty {
        JavaType::Void => "void".to_string(),
        JavaType::Primitive(primitive) => primitive.to_string(),
        JavaType::Class(class) => class.simple_name().to_string(),
        JavaType::Array(element) => format!("{}[]", type_name(element)),
    }
}

fn literal_text(literal: &Literal) -> String {
    match literal {
        Literal::Int(value) => value.to_string(),
        Literal::Long(value) => format!("{value}L"),
        Literal::Float(value) => {
            if value.is_nan() {
                "Float.NaN".to_string()
            } else if value.is_infinite() {
                if *value > 0.0 {
                    "Float.POSITIVE_INFINITY".to_string()
                } else {
                    "Float.NEGATIVE_INFINITY".to_string()
                }
            } else {
                format!("{value:?}f")
            }
        }
        Literal::Double(value) => {
            if value.is_nan() {
                "Double.NaN".to_string()
            } else if value.is_infinite() {
                if *value > 0.0 {
                    "Double.POSITIVE_INFINITY".to_string()
                } else {
                    "Double.NEGATIVE_INFINITY".to_string()
                }
            } else {
                format!("{value:?}")
            }
        }
        Literal::Boolean(value) => value.to_string(),
        Literal::Char(unit) => format!("'{}'", escape_unit(*unit, '\'')),
        Literal::Null => "null".to_string(),
        Literal::String(text) => {
            let escaped: String = text
                .encode_utf16()
                .map(|unit| escape_unit(unit, '"'))
                .collect();
            format!("\"{escaped}\"")
        }
        Literal::Class(ty) => format!("{}.class", type_name(ty)),
    }
}

/// Escapes one UTF-16 unit for a literal delimited by `quote`.
fn escape_unit(unit: u16, quote: char) -> String {
    match char::from_u32(u32::from(unit)) {
        Some('\n') => "\\n".to_string(),
        Some('\r') => "\\r".to_string(),
        Some('\t') => "\\t".to_string(),
        Some('\\') => "\\\\".to_string(),
        Some(c) if c == quote => format!("\\{c}"),
        Some(c) if !c.is_control() && (c.is_ascii() || unit >= 0xa0) => c.to_string(),
        _ => format!("\\u{unit:04x}"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        bytecode::{BinaryOp, IfCondition, MethodDescriptor},
        codegen::{expression::LocalId, statement::LocalVariable},
    };

    fn body() -> MethodBody {
        MethodBody {
            locals: vec![
                LocalVariable {
                    name: "i".to_string(),
                    ty: JavaType::INT,
                    parameter: true,
                },
                LocalVariable {
                    name: "i2".to_string(),
                    ty: JavaType::INT,
                    parameter: true,
                },
            ],
            params: vec![LocalId::new(0), LocalId::new(1)],
            statements: Vec::new(),
        }
    }

    #[test]
    fn test_precedence_parentheses() {
        let body = body();
        let writer = JavaWriter::new();
        let sum = Expression::Binary {
            op: BinaryOp::Add,
            lhs: Expression::local(LocalId::new(0)),
            rhs: Expression::local(LocalId::new(1)),
        };
        let product = Expression::Binary {
            op: BinaryOp::Mul,
            lhs: Box::new(sum.clone()),
            rhs: Box::new(Expression::Literal(Literal::Int(2))),
        };
        assert_eq!(writer.expression(&body, &product), "(i + i2) * 2");

        let difference = Expression::Binary {
            op: BinaryOp::Sub,
            lhs: Expression::local(LocalId::new(0)),
            rhs: Box::new(sum),
        };
        assert_eq!(writer.expression(&body, &difference), "i - (i + i2)");

        let negated = Expression::Not(Box::new(Expression::Condition {
            op: IfCondition::Lt,
            lhs: Expression::local(LocalId::new(0)),
            rhs: Box::new(Expression::Literal(Literal::Int(-1))),
        }));
        assert_eq!(writer.expression(&body, &negated), "!(i < -1)");
    }

    #[test]
    fn test_literals() {
        assert_eq!(literal_text(&Literal::Float(1.5)), "1.5f");
        assert_eq!(literal_text(&Literal::Float(1.0)), "1.0f");
        assert_eq!(literal_text(&Literal::Float(f32::NAN)), "Float.NaN");
        assert_eq!(literal_text(&Literal::Double(2.0)), "2.0");
        assert_eq!(literal_text(&Literal::Long(5)), "5L");
        assert_eq!(literal_text(&Literal::Char(u16::from(b'\''))), "'\\''");
        assert_eq!(
            literal_text(&Literal::String(Arc::from("a\"b\n"))),
            "\"a\\\"b\\n\""
        );
        assert_eq!(
            literal_text(&Literal::Class(JavaType::class("java.lang.String").array_of())),
            "String[].class"
        );
    }

    #[test]
    fn test_method_declaration() {
        let method = MethodCode::new(
            "a.B",
            "max",
            MethodDescriptor::parse("(II)I").unwrap(),
            true,
            2,
            Vec::new(),
            Vec::new(),
        )
        .unwrap();
        let mut body = body();
        body.statements = vec![Statement::If {
            condition: Expression::Condition {
                op: IfCondition::Gt,
                lhs: Expression::local(LocalId::new(0)),
                rhs: Expression::local(LocalId::new(1)),
            },
            then_branch: vec![Statement::Return(Some(Expression::Local(LocalId::new(0))))],
            else_branch: vec![Statement::Return(Some(Expression::Local(LocalId::new(1))))],
        }];
        let text = JavaWriter::new().method(&method, &body);
        assert_eq!(
            text,
            "static int max(int i, int i2) {\n    if (i > i2) {\n        return i;\n    } else {\n        return i2;\n    }\n}\n"
        );
    }
}
