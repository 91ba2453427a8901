use crate::types::ResolvedType;
use super::expression::Expression;
use super::token::Token;


/// Declared name with optional initialiser
#[derive(Debug, Clone, PartialEq)]
pub struct InitDeclarator {
    pub name: Token,
    pub initialiser: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Break(Token),
    Compound(Vec<Statement>),
    Continue(Token),
    Do {
        body: Box<Statement>,
        condition: Expression,
    },
    Expression(Option<Expression>),
    For {
        initialiser: Option<Box<Statement>>,
        condition: Option<Expression>,
        increment: Option<Expression>,
        body: Box<Statement>,
    },
    If {
        condition: Expression,
        then_branch: Box<Statement>,
        else_branch: Option<Box<Statement>>,
    },
    /// `case value:` or `default:` label
    Labelled {
        keyword: Token,
        value: Option<Expression>,
        body: Box<Statement>,
    },
    Switch {
        switch: Token,
        condition: Expression,
        body: Box<Statement>,
    },
    VarDeclaration {
        ty: ResolvedType,
        declarators: Vec<InitDeclarator>,
    },
    While {
        condition: Expression,
        body: Box<Statement>,
    },
}

impl Statement {
    /// Identifiers referenced anywhere in this statement
    pub fn collect_identifiers<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Statement::Break(_) | Statement::Continue(_) => {},
            Statement::Compound(statements) => {
                for statement in statements {
                    statement.collect_identifiers(names);
                }
            },
            Statement::Do { body, condition } | Statement::While { condition, body } => {
                condition.collect_identifiers(names);
                body.collect_identifiers(names);
            },
            Statement::Expression(expression) => {
                if let Some(expression) = expression {
                    expression.collect_identifiers(names);
                }
            },
            Statement::For { initialiser, condition, increment, body } => {
                if let Some(initialiser) = initialiser {
                    initialiser.collect_identifiers(names);
                }
                if let Some(condition) = condition {
                    condition.collect_identifiers(names);
                }
                if let Some(increment) = increment {
                    increment.collect_identifiers(names);
                }
                body.collect_identifiers(names);
            },
            Statement::If { condition, then_branch, else_branch } => {
                condition.collect_identifiers(names);
                then_branch.collect_identifiers(names);
                if let Some(else_branch) = else_branch {
                    else_branch.collect_identifiers(names);
                }
            },
            Statement::Labelled { value, body, .. } => {
                if let Some(value) = value {
                    value.collect_identifiers(names);
                }
                body.collect_identifiers(names);
            },
            Statement::Switch { condition, body, .. } => {
                condition.collect_identifiers(names);
                body.collect_identifiers(names);
            },
            Statement::VarDeclaration { declarators, .. } => {
                for declarator in declarators {
                    if let Some(initialiser) = &declarator.initialiser {
                        initialiser.collect_identifiers(names);
                    }
                }
            },
        }
    }
}
