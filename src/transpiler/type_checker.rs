use std::collections::HashMap;
use crate::types::{
    get_common_type, get_promoted_type, is_implicitly_convertible,
    ResolvedType, TypeContext, TypeDetail,
};
use super::error_handler::ErrorHandlerBase;
use super::expression::{Expression, ExpressionId, ExpressionKind};
use super::statement::Statement;
use super::token::{Token, TokenType};


/// Type assigned to every checked expression
pub type ResolvedTypes = HashMap<ExpressionId, ResolvedType>;

/// Scope which the type checker resolves identifiers against
pub trait TypeCheckEnvironment {
    /// Defines a new name, reporting redeclarations
    fn define(&mut self, name: &Token, ty: ResolvedType, error_handler: &mut dyn ErrorHandlerBase);
    /// Looks up a name, reporting it if undefined
    fn get_type(&self, name: &Token, error_handler: &mut dyn ErrorHandlerBase) -> Option<ResolvedType>;
}

/// Block scope nested inside another environment
pub struct LocalScope<'a> {
    enclosing: &'a mut dyn TypeCheckEnvironment,
    types: HashMap<String, ResolvedType>,
}

impl<'a> LocalScope<'a> {
    pub fn new(enclosing: &'a mut dyn TypeCheckEnvironment) -> Self {
        LocalScope { enclosing, types: HashMap::new() }
    }
}

impl<'a> TypeCheckEnvironment for LocalScope<'a> {
    fn define(&mut self, name: &Token, ty: ResolvedType, error_handler: &mut dyn ErrorHandlerBase) {
        if self.types.insert(name.lexeme.clone(), ty).is_some() {
            error_handler.error_at(name, "Redeclaration of variable");
        }
    }

    fn get_type(&self, name: &Token, error_handler: &mut dyn ErrorHandlerBase) -> Option<ResolvedType> {
        match self.types.get(&name.lexeme) {
            Some(ty) => Some(ty.clone()),
            None => self.enclosing.get_type(name, error_handler),
        }
    }
}

fn is_integral(ty: &ResolvedType) -> bool {
    ty.get_numeric().map(|n| n.is_integral).unwrap_or(false)
}

fn is_scalar(ty: &ResolvedType) -> bool {
    ty.is_numeric() || ty.is_pointer()
}

struct TypeChecker<'a> {
    context: &'a TypeContext,
    error_handler: &'a mut dyn ErrorHandlerBase,
    types: ResolvedTypes,
    loop_depth: usize,
    switch_depth: usize,
}

impl<'a> TypeChecker<'a> {
    fn error(&mut self, token: &Token, message: &str) -> Option<ResolvedType> {
        self.error_handler.error_at(token, message);

        None
    }

    fn operand_error(&mut self, token: &Token, left: &ResolvedType, right: &ResolvedType) -> Option<ResolvedType> {
        let message = format!("Invalid operand types '{}' and '{}'", left, right);
        self.error(token, &message)
    }

    fn literal_type(&self, token: &Token) -> ResolvedType {
        match token.token_type {
            TokenType::Int32Number => ResolvedType::int32(),
            TokenType::Uint32Number => ResolvedType::uint32(),
            TokenType::FloatNumber => ResolvedType::float(),
            TokenType::DoubleNumber => ResolvedType::double(),
            TokenType::ScalarNumber => self.context.scalar.clone(),
            TokenType::String => ResolvedType::int8().add_const().create_pointer(),
            _ => ResolvedType::bool(),
        }
    }

    fn check_expression(
        &mut self,
        expression: &Expression,
        env: &mut dyn TypeCheckEnvironment,
    ) -> Option<ResolvedType> {
        let ty = match &expression.kind {
            ExpressionKind::ArraySubscript { array, closing_square_bracket, index } => {
                let array_type = self.check_expression(array, env)?;
                let index_type = self.check_expression(index, env)?;

                if !is_integral(&index_type) {
                    return self.error(closing_square_bracket, "Array subscript is not an integer");
                }
                match array_type.get_pointee() {
                    Some(pointee) => pointee.clone(),
                    None => return self.error(closing_square_bracket, "Subscripted object is not a pointer"),
                }
            },
            ExpressionKind::Assignment { assignee, operator, value } => {
                let assignee_type = self.check_expression(assignee, env)?;
                let value_type = self.check_expression(value, env)?;
                self.check_assignment(operator, &assignee_type, &value_type)?
            },
            ExpressionKind::Binary { left, operator, right } => {
                let left_type = self.check_expression(left, env)?;
                let right_type = self.check_expression(right, env)?;
                self.check_binary(operator, &left_type, &right_type)?
            },
            ExpressionKind::Call { callee, closing_paren, arguments } => {
                let callee_type = self.check_expression(callee, env)?;
                let mut argument_types = Vec::new();
                for argument in arguments {
                    argument_types.push(self.check_expression(argument, env)?);
                }

                match &callee_type.detail {
                    TypeDetail::Function { return_type, arg_types } => {
                        if argument_types.len() > arg_types.len() {
                            return self.error(closing_paren, "Too many arguments to function");
                        }
                        if argument_types.len() < arg_types.len() {
                            return self.error(closing_paren, "Too few arguments to function");
                        }
                        for (argument, parameter) in argument_types.iter().zip(arg_types) {
                            if !is_implicitly_convertible(argument, parameter) {
                                return self.operand_error(closing_paren, parameter, argument);
                            }
                        }

                        (**return_type).clone()
                    },
                    _ => return self.error(closing_paren, "Called object is not a function"),
                }
            },
            ExpressionKind::Cast { ty, closing_paren, expression } => {
                let expression_type = self.check_expression(expression, env)?;
                if !(ty.is_numeric() && expression_type.is_numeric()) {
                    let message = format!("Invalid cast from '{}' to '{}'", expression_type, ty);
                    return self.error(closing_paren, &message);
                }

                ty.clone()
            },
            ExpressionKind::Conditional { condition, question, true_expression, false_expression } => {
                let condition_type = self.check_expression(condition, env)?;
                let true_type = self.check_expression(true_expression, env)?;
                let false_type = self.check_expression(false_expression, env)?;

                if !is_scalar(&condition_type) {
                    return self.error(question, "Conditional expression condition must be scalar");
                }
                if true_type.is_numeric() && false_type.is_numeric() {
                    get_common_type(&true_type, &false_type)?
                } else if true_type.same_unqualified(&false_type) {
                    true_type
                } else {
                    return self.operand_error(question, &true_type, &false_type);
                }
            },
            ExpressionKind::Grouping(inner) => self.check_expression(inner, env)?,
            ExpressionKind::Literal(token) => self.literal_type(token),
            ExpressionKind::Logical { left, operator, right } => {
                let left_type = self.check_expression(left, env)?;
                let right_type = self.check_expression(right, env)?;
                if !is_scalar(&left_type) || !is_scalar(&right_type) {
                    return self.operand_error(operator, &left_type, &right_type);
                }

                ResolvedType::bool()
            },
            ExpressionKind::PostfixIncDec { target, operator } | ExpressionKind::PrefixIncDec { target, operator } => {
                let target_type = self.check_expression(target, env)?;
                if target_type.is_const {
                    return self.error(operator, "Increment/decrement of read-only variable");
                }
                if !target.is_lvalue() || !is_scalar(&target_type) {
                    let message = format!("Invalid operand type '{}'", target_type);
                    return self.error(operator, &message);
                }

                target_type
            },
            ExpressionKind::Identifier(name) => env.get_type(name, self.error_handler)?,
            ExpressionKind::Unary { operator, right } => {
                let right_type = self.check_expression(right, env)?;
                let valid = match operator.token_type {
                    TokenType::Plus | TokenType::Minus => right_type.is_numeric(),
                    TokenType::Not => is_scalar(&right_type),
                    _ => is_integral(&right_type),
                };
                if !valid {
                    let message = format!("Invalid operand type '{}'", right_type);
                    return self.error(operator, &message);
                }

                if operator.token_type == TokenType::Not {
                    ResolvedType::bool()
                } else {
                    get_promoted_type(&right_type)
                }
            },
        };

        self.types.insert(expression.id, ty.clone());

        Some(ty)
    }

    fn check_binary(&mut self, operator: &Token, left: &ResolvedType, right: &ResolvedType) -> Option<ResolvedType> {
        let both_numeric = left.is_numeric() && right.is_numeric();
        let both_integral = is_integral(left) && is_integral(right);

        match operator.token_type {
            TokenType::Plus | TokenType::Minus => {
                if both_numeric {
                    get_common_type(left, right)
                } else if left.is_pointer() && is_integral(right) {
                    Some(left.remove_const())
                } else if operator.token_type == TokenType::Plus && is_integral(left) && right.is_pointer() {
                    Some(right.remove_const())
                } else if operator.token_type == TokenType::Minus && left.is_pointer() && left.same_unqualified(right) {
                    Some(ResolvedType::int32())
                } else {
                    self.operand_error(operator, left, right)
                }
            },
            TokenType::Star | TokenType::Slash if both_numeric => get_common_type(left, right),
            TokenType::Percent | TokenType::Ampersand | TokenType::Pipe | TokenType::Caret if both_integral => {
                get_common_type(left, right)
            },
            TokenType::ShiftLeft | TokenType::ShiftRight if both_integral => Some(get_promoted_type(left)),
            TokenType::EqualEqual | TokenType::NotEqual | TokenType::Less | TokenType::LessEqual |
            TokenType::Greater | TokenType::GreaterEqual => {
                if both_numeric || (left.is_pointer() && left.same_unqualified(right)) {
                    Some(ResolvedType::bool())
                } else {
                    self.operand_error(operator, left, right)
                }
            },
            _ => self.operand_error(operator, left, right),
        }
    }

    fn check_assignment(&mut self, operator: &Token, assignee: &ResolvedType, value: &ResolvedType) -> Option<ResolvedType> {
        if assignee.is_const {
            return self.error(operator, "Assignment of read-only variable");
        }

        let valid = match operator.token_type {
            TokenType::Equal => is_implicitly_convertible(value, assignee),
            TokenType::PlusEqual | TokenType::MinusEqual => {
                (assignee.is_numeric() && value.is_numeric()) || (assignee.is_pointer() && is_integral(value))
            },
            TokenType::StarEqual | TokenType::SlashEqual => assignee.is_numeric() && value.is_numeric(),
            _ => is_integral(assignee) && is_integral(value),
        };

        if valid {
            Some(assignee.clone())
        } else {
            self.operand_error(operator, assignee, value)
        }
    }

    fn check_condition(&mut self, condition: &Expression, env: &mut dyn TypeCheckEnvironment) {
        if let Some(ty) = self.check_expression(condition, env) {
            if !is_scalar(&ty) {
                self.error(condition.anchor(), "Condition must be scalar");
            }
        }
    }

    fn check_statement(&mut self, statement: &Statement, env: &mut dyn TypeCheckEnvironment) {
        match statement {
            Statement::Break(token) => {
                if self.loop_depth == 0 && self.switch_depth == 0 {
                    self.error(token, "Statement not within loop");
                }
            },
            Statement::Continue(token) => {
                if self.loop_depth == 0 {
                    self.error(token, "Statement not within loop");
                }
            },
            Statement::Compound(statements) => {
                let mut scope = LocalScope::new(env);
                for statement in statements {
                    self.check_statement(statement, &mut scope);
                }
            },
            Statement::Do { body, condition } => {
                self.loop_depth += 1;
                self.check_statement(body, env);
                self.loop_depth -= 1;
                self.check_condition(condition, env);
            },
            Statement::Expression(expression) => {
                if let Some(expression) = expression {
                    self.check_expression(expression, env);
                }
            },
            Statement::For { initialiser, condition, increment, body } => {
                let mut scope = LocalScope::new(env);
                if let Some(initialiser) = initialiser {
                    self.check_statement(initialiser, &mut scope);
                }
                if let Some(condition) = condition {
                    self.check_condition(condition, &mut scope);
                }
                if let Some(increment) = increment {
                    self.check_expression(increment, &mut scope);
                }

                self.loop_depth += 1;
                self.check_statement(body, &mut scope);
                self.loop_depth -= 1;
            },
            Statement::If { condition, then_branch, else_branch } => {
                self.check_condition(condition, env);
                self.check_statement(then_branch, env);
                if let Some(else_branch) = else_branch {
                    self.check_statement(else_branch, env);
                }
            },
            Statement::Labelled { keyword, value, body } => {
                if self.switch_depth == 0 {
                    self.error(keyword, "Statement not within switch statement");
                }
                if let Some(value) = value {
                    if let Some(ty) = self.check_expression(value, env) {
                        if !is_integral(&ty) {
                            self.error(keyword, "Case value must be integral");
                        }
                    }
                }
                self.check_statement(body, env);
            },
            Statement::Switch { switch, condition, body } => {
                if let Some(ty) = self.check_expression(condition, env) {
                    if !is_integral(&ty) {
                        self.error(switch, "Switch statement condition must be integral");
                    }
                }

                self.switch_depth += 1;
                self.check_statement(body, env);
                self.switch_depth -= 1;
            },
            Statement::VarDeclaration { ty, declarators } => {
                for declarator in declarators {
                    if let Some(initialiser) = &declarator.initialiser {
                        if let Some(initialiser_type) = self.check_expression(initialiser, env) {
                            if !is_implicitly_convertible(&initialiser_type, ty) {
                                self.operand_error(&declarator.name, ty, &initialiser_type);
                            }
                        }
                    }
                    env.define(&declarator.name, ty.clone(), self.error_handler);
                }
            },
            Statement::While { condition, body } => {
                self.check_condition(condition, env);
                self.loop_depth += 1;
                self.check_statement(body, env);
                self.loop_depth -= 1;
            },
        }
    }
}

/// Type checks statements, returning the type of every expression
pub fn type_check_statements(
    statements: &[Statement],
    env: &mut dyn TypeCheckEnvironment,
    context: &TypeContext,
    error_handler: &mut dyn ErrorHandlerBase,
) -> ResolvedTypes {
    let mut checker = TypeChecker { context, error_handler, types: HashMap::new(), loop_depth: 0, switch_depth: 0 };

    // Statements share a scope so declarations do not leak into the enclosing environment
    let mut scope = LocalScope::new(env);
    for statement in statements {
        checker.check_statement(statement, &mut scope);
    }

    checker.types
}

/// Type checks a single expression
pub fn type_check_expression(
    expression: &Expression,
    env: &mut dyn TypeCheckEnvironment,
    context: &TypeContext,
    error_handler: &mut dyn ErrorHandlerBase,
) -> ResolvedTypes {
    let mut checker = TypeChecker { context, error_handler, types: HashMap::new(), loop_depth: 0, switch_depth: 0 };
    checker.check_expression(expression, env);

    checker.types
}
