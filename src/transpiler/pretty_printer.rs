use std::collections::HashSet;
use crate::types::{ResolvedType, TypeContext};
use super::expression::{Expression, ExpressionKind};
use super::statement::Statement;
use super::token::{Token, TokenType};


/// Resolves identifiers to the text emitted for them
pub trait PrettyPrintEnvironment {
    /// Text to emit for a name, function templates use `$(0)` style argument placeholders
    fn get_name(&mut self, name: &str) -> String;
}

/// Substitutes `$(0)`, `$(1)` and so on in a function template
pub fn substitute_arguments(template: &str, arguments: &[String]) -> String {
    let mut output = template.to_string();
    for (i, argument) in arguments.iter().enumerate() {
        output = output.replace(&format!("$({})", i), argument);
    }

    output
}

fn write_float_literal(lexeme: &str, single_precision: bool) -> String {
    let mut literal = lexeme.to_string();
    if !literal.contains(|c: char| c == '.' || c == 'e' || c == 'E') {
        literal.push_str(".0");
    } else if literal.ends_with('.') {
        literal.push('0');
    }

    if single_precision {
        literal.push('f');
    }

    literal
}

fn is_single_precision(ty: &ResolvedType) -> bool {
    ty.same_unqualified(&ResolvedType::float())
}

struct PrettyPrinter<'a> {
    context: &'a TypeContext,
    env: &'a mut dyn PrettyPrintEnvironment,
    local_scopes: Vec<HashSet<String>>,
}

impl<'a> PrettyPrinter<'a> {
    fn is_local(&self, name: &str) -> bool {
        self.local_scopes.iter().any(|scope| scope.contains(name))
    }

    fn define_local(&mut self, name: &str) {
        if let Some(scope) = self.local_scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    fn literal(&self, token: &Token) -> String {
        match token.token_type {
            TokenType::ScalarNumber => write_float_literal(&token.lexeme, is_single_precision(&self.context.scalar)),
            TokenType::FloatNumber => write_float_literal(&token.lexeme, true),
            TokenType::DoubleNumber => write_float_literal(&token.lexeme, false),
            TokenType::Uint32Number => format!("{}u", token.lexeme),
            _ => token.lexeme.clone(),
        }
    }

    fn expression(&mut self, expression: &Expression) -> String {
        match &expression.kind {
            ExpressionKind::ArraySubscript { array, index, .. } => {
                format!("{}[{}]", self.expression(array), self.expression(index))
            },
            ExpressionKind::Assignment { assignee, operator, value } => {
                format!("{} {} {}", self.expression(assignee), operator.lexeme, self.expression(value))
            },
            ExpressionKind::Binary { left, operator, right } | ExpressionKind::Logical { left, operator, right } => {
                format!("{} {} {}", self.expression(left), operator.lexeme, self.expression(right))
            },
            ExpressionKind::Call { callee, arguments, .. } => {
                let callee = self.expression(callee);
                let arguments: Vec<String> = arguments.iter().map(|a| self.expression(a)).collect();
                if callee.contains("$(") {
                    substitute_arguments(&callee, &arguments)
                } else {
                    format!("{}({})", callee, arguments.join(", "))
                }
            },
            ExpressionKind::Cast { ty, expression, .. } => {
                format!("({}){}", ty.get_name(), self.expression(expression))
            },
            ExpressionKind::Conditional { condition, true_expression, false_expression, .. } => {
                format!(
                    "{} ? {} : {}",
                    self.expression(condition),
                    self.expression(true_expression),
                    self.expression(false_expression)
                )
            },
            ExpressionKind::Grouping(inner) => format!("({})", self.expression(inner)),
            ExpressionKind::Literal(token) => self.literal(token),
            ExpressionKind::PostfixIncDec { target, operator } => {
                format!("{}{}", self.expression(target), operator.lexeme)
            },
            ExpressionKind::PrefixIncDec { target, operator } => {
                format!("{}{}", operator.lexeme, self.expression(target))
            },
            ExpressionKind::Identifier(name) => {
                if self.is_local(&name.lexeme) {
                    format!("_{}", name.lexeme)
                } else {
                    self.env.get_name(&name.lexeme)
                }
            },
            ExpressionKind::Unary { operator, right } => format!("{}{}", operator.lexeme, self.expression(right)),
        }
    }

    /// Declarations and expression statements without their trailing newline
    fn simple_statement(&mut self, statement: &Statement) -> String {
        match statement {
            Statement::VarDeclaration { ty, declarators } => {
                let mut parts = Vec::new();
                for declarator in declarators {
                    let initialiser = declarator.initialiser.as_ref().map(|i| self.expression(i));
                    self.define_local(&declarator.name.lexeme);
                    match initialiser {
                        Some(initialiser) => parts.push(format!("_{} = {}", declarator.name.lexeme, initialiser)),
                        None => parts.push(format!("_{}", declarator.name.lexeme)),
                    }
                }

                format!("{} {};", ty.get_name(), parts.join(", "))
            },
            Statement::Expression(Some(expression)) => format!("{};", self.expression(expression)),
            _ => ";".to_string(),
        }
    }

    fn statement(&mut self, statement: &Statement, output: &mut String) {
        match statement {
            Statement::Break(_) => output.push_str("break;\n"),
            Statement::Continue(_) => output.push_str("continue;\n"),
            Statement::Compound(statements) => {
                output.push_str("{\n");
                self.local_scopes.push(HashSet::new());
                for statement in statements {
                    self.statement(statement, output);
                }
                self.local_scopes.pop();
                output.push_str("}\n");
            },
            Statement::Do { body, condition } => {
                output.push_str("do\n");
                self.statement(body, output);
                let condition = self.expression(condition);
                output.push_str(&format!("while({});\n", condition));
            },
            Statement::Expression(_) | Statement::VarDeclaration { .. } => {
                let line = self.simple_statement(statement);
                output.push_str(&line);
                output.push('\n');
            },
            Statement::For { initialiser, condition, increment, body } => {
                self.local_scopes.push(HashSet::new());
                let initialiser = initialiser.as_ref().map(|i| self.simple_statement(i)).unwrap_or_else(|| ";".to_string());
                let condition = condition.as_ref().map(|c| self.expression(c)).unwrap_or_default();
                let increment = increment.as_ref().map(|i| self.expression(i)).unwrap_or_default();
                output.push_str(&format!("for({} {}; {})\n", initialiser, condition, increment));
                self.statement(body, output);
                self.local_scopes.pop();
            },
            Statement::If { condition, then_branch, else_branch } => {
                let condition = self.expression(condition);
                output.push_str(&format!("if({})\n", condition));
                self.statement(then_branch, output);
                if let Some(else_branch) = else_branch {
                    output.push_str("else\n");
                    self.statement(else_branch, output);
                }
            },
            Statement::Labelled { value, body, .. } => {
                match value {
                    Some(value) => {
                        let value = self.expression(value);
                        output.push_str(&format!("case {}:\n", value));
                    },
                    None => output.push_str("default:\n"),
                }
                self.statement(body, output);
            },
            Statement::Switch { condition, body, .. } => {
                let condition = self.expression(condition);
                output.push_str(&format!("switch({})\n", condition));
                self.statement(body, output);
            },
            Statement::While { condition, body } => {
                let condition = self.expression(condition);
                output.push_str(&format!("while({})\n", condition));
                self.statement(body, output);
            },
        }
    }
}

/// Prints statements as C code, local variables are prefixed with `_`
pub fn print_statements(
    statements: &[Statement],
    env: &mut dyn PrettyPrintEnvironment,
    context: &TypeContext,
) -> String {
    let mut printer = PrettyPrinter { context, env, local_scopes: vec![HashSet::new()] };
    let mut output = String::new();
    for statement in statements {
        printer.statement(statement, &mut output);
    }

    output
}

pub fn print_expression(
    expression: &Expression,
    env: &mut dyn PrettyPrintEnvironment,
    context: &TypeContext,
) -> String {
    let mut printer = PrettyPrinter { context, env, local_scopes: vec![HashSet::new()] };

    printer.expression(expression)
}
