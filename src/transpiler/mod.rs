//! Front end for the C-like code snippets models are written in. Code is
//! scanned into tokens when a model is finalised, then parsed, type checked
//! against a scope chain and pretty printed into kernels during generation.

pub mod token;
pub mod error_handler;
pub mod scanner;
pub mod expression;
pub mod statement;
pub mod parser;
pub mod type_checker;
pub mod pretty_printer;
pub mod standard_library;

use crate::error::FrontEndError;
use crate::types::TypeContext;
use error_handler::ErrorHandler;
use expression::Expression;
use statement::Statement;
use token::Token;
use type_checker::{ResolvedTypes, TypeCheckEnvironment};


/// Parses and type checks a statement list
pub fn compile_statements(
    tokens: &[Token],
    env: &mut dyn TypeCheckEnvironment,
    context: &TypeContext,
    description: &str,
) -> Result<(Vec<Statement>, ResolvedTypes), FrontEndError> {
    let mut error_handler = ErrorHandler::new(description);

    let statements = parser::parse_block_item_list(tokens, context, &mut error_handler);
    error_handler.to_result()?;

    let types = type_checker::type_check_statements(&statements, env, context, &mut error_handler);
    error_handler.to_result()?;

    Ok((statements, types))
}

/// Parses and type checks a single expression
pub fn compile_expression(
    tokens: &[Token],
    env: &mut dyn TypeCheckEnvironment,
    context: &TypeContext,
    description: &str,
) -> Result<(Expression, ResolvedTypes), FrontEndError> {
    let mut error_handler = ErrorHandler::new(description);

    let expression = parser::parse_expression(tokens, context, &mut error_handler);
    error_handler.to_result()?;

    let expression = match expression {
        Some(expression) => expression,
        None => return Err(FrontEndError::Diagnostics {
            context: description.to_string(),
            count: 1,
            messages: "Expect expression".to_string(),
        }),
    };

    let types = type_checker::type_check_expression(&expression, env, context, &mut error_handler);
    error_handler.to_result()?;

    Ok((expression, types))
}

/// Scans code, returning the tokens or the diagnostics produced
pub fn scan_code(code: &str, description: &str) -> Result<Vec<Token>, FrontEndError> {
    let mut error_handler = ErrorHandler::new(description);
    let tokens = scanner::scan_source(code, &mut error_handler);
    error_handler.to_result()?;

    Ok(tokens)
}
