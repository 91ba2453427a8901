use crate::types::ResolvedType;
use super::token::Token;


/// Unique id of an expression node, used to key resolved types
pub type ExpressionId = usize;

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub id: ExpressionId,
    pub kind: ExpressionKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    ArraySubscript {
        array: Box<Expression>,
        closing_square_bracket: Token,
        index: Box<Expression>,
    },
    Assignment {
        assignee: Box<Expression>,
        operator: Token,
        value: Box<Expression>,
    },
    Binary {
        left: Box<Expression>,
        operator: Token,
        right: Box<Expression>,
    },
    Call {
        callee: Box<Expression>,
        closing_paren: Token,
        arguments: Vec<Expression>,
    },
    Cast {
        ty: ResolvedType,
        closing_paren: Token,
        expression: Box<Expression>,
    },
    Conditional {
        condition: Box<Expression>,
        question: Token,
        true_expression: Box<Expression>,
        false_expression: Box<Expression>,
    },
    Grouping(Box<Expression>),
    Literal(Token),
    Logical {
        left: Box<Expression>,
        operator: Token,
        right: Box<Expression>,
    },
    PostfixIncDec {
        target: Box<Expression>,
        operator: Token,
    },
    PrefixIncDec {
        target: Box<Expression>,
        operator: Token,
    },
    Identifier(Token),
    Unary {
        operator: Token,
        right: Box<Expression>,
    },
}

impl Expression {
    /// Token best describing where this expression is in the source
    pub fn anchor(&self) -> &Token {
        match &self.kind {
            ExpressionKind::ArraySubscript { closing_square_bracket, .. } => closing_square_bracket,
            ExpressionKind::Assignment { operator, .. } => operator,
            ExpressionKind::Binary { operator, .. } => operator,
            ExpressionKind::Call { closing_paren, .. } => closing_paren,
            ExpressionKind::Cast { closing_paren, .. } => closing_paren,
            ExpressionKind::Conditional { question, .. } => question,
            ExpressionKind::Grouping(expression) => expression.anchor(),
            ExpressionKind::Literal(value) => value,
            ExpressionKind::Logical { operator, .. } => operator,
            ExpressionKind::PostfixIncDec { operator, .. } => operator,
            ExpressionKind::PrefixIncDec { operator, .. } => operator,
            ExpressionKind::Identifier(name) => name,
            ExpressionKind::Unary { operator, .. } => operator,
        }
    }

    /// Can this expression be assigned to
    pub fn is_lvalue(&self) -> bool {
        match &self.kind {
            ExpressionKind::Identifier(_) | ExpressionKind::ArraySubscript { .. } => true,
            ExpressionKind::Grouping(expression) => expression.is_lvalue(),
            _ => false,
        }
    }

    /// Identifiers referenced anywhere in this expression
    pub fn collect_identifiers<'a>(&'a self, names: &mut Vec<&'a str>) {
        match &self.kind {
            ExpressionKind::ArraySubscript { array, index, .. } => {
                array.collect_identifiers(names);
                index.collect_identifiers(names);
            },
            ExpressionKind::Assignment { assignee, value, .. } => {
                assignee.collect_identifiers(names);
                value.collect_identifiers(names);
            },
            ExpressionKind::Binary { left, right, .. } | ExpressionKind::Logical { left, right, .. } => {
                left.collect_identifiers(names);
                right.collect_identifiers(names);
            },
            ExpressionKind::Call { callee, arguments, .. } => {
                callee.collect_identifiers(names);
                for argument in arguments {
                    argument.collect_identifiers(names);
                }
            },
            ExpressionKind::Conditional { condition, true_expression, false_expression, .. } => {
                condition.collect_identifiers(names);
                true_expression.collect_identifiers(names);
                false_expression.collect_identifiers(names);
            },
            ExpressionKind::Cast { expression, .. } | ExpressionKind::Grouping(expression) => {
                expression.collect_identifiers(names);
            },
            ExpressionKind::PostfixIncDec { target, .. } | ExpressionKind::PrefixIncDec { target, .. } => {
                target.collect_identifiers(names);
            },
            ExpressionKind::Unary { right, .. } => right.collect_identifiers(names),
            ExpressionKind::Identifier(name) => names.push(&name.lexeme),
            ExpressionKind::Literal(_) => {},
        }
    }
}
