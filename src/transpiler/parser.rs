use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use crate::types::{get_numeric_type, ResolvedType, TypeContext};
use super::error_handler::ErrorHandlerBase;
use super::expression::{Expression, ExpressionKind};
use super::statement::{InitDeclarator, Statement};
use super::token::{Token, TokenType};


// Ids are unique across every parse so type tables from different snippets never collide
static NEXT_EXPRESSION_ID: AtomicUsize = AtomicUsize::new(0);

/// Marker used to unwind out of a statement after reporting an error
struct ParseError;

type ParseResult<T> = Result<T, ParseError>;

const ASSIGNMENT_OPERATORS: [TokenType; 11] = [
    TokenType::Equal, TokenType::StarEqual, TokenType::SlashEqual, TokenType::PercentEqual,
    TokenType::PlusEqual, TokenType::MinusEqual, TokenType::AmpersandEqual, TokenType::CaretEqual,
    TokenType::PipeEqual, TokenType::ShiftLeftEqual, TokenType::ShiftRightEqual,
];

/// Binding power of binary operators, `None` if not a binary operator
fn binary_precedence(token_type: TokenType) -> Option<u8> {
    match token_type {
        TokenType::PipePipe => Some(1),
        TokenType::AmpersandAmpersand => Some(2),
        TokenType::Pipe => Some(3),
        TokenType::Caret => Some(4),
        TokenType::Ampersand => Some(5),
        TokenType::EqualEqual | TokenType::NotEqual => Some(6),
        TokenType::Less | TokenType::LessEqual | TokenType::Greater | TokenType::GreaterEqual => Some(7),
        TokenType::ShiftLeft | TokenType::ShiftRight => Some(8),
        TokenType::Plus | TokenType::Minus => Some(9),
        TokenType::Star | TokenType::Slash | TokenType::Percent => Some(10),
        _ => None,
    }
}

struct Parser<'a> {
    tokens: Vec<Token>,
    current: usize,
    context: &'a TypeContext,
    error_handler: &'a mut dyn ErrorHandlerBase,
}

impl<'a> Parser<'a> {
    fn new(tokens: &[Token], context: &'a TypeContext, error_handler: &'a mut dyn ErrorHandlerBase) -> Self {
        let mut tokens = tokens.to_vec();
        if tokens.last().map(|t| t.token_type) != Some(TokenType::EndOfFile) {
            let line = tokens.last().map(|t| t.line).unwrap_or(1);
            tokens.push(Token::new(TokenType::EndOfFile, "", line));
        }

        Parser { tokens, current: 0, context, error_handler }
    }

    fn make(&self, kind: ExpressionKind) -> Expression {
        Expression { id: NEXT_EXPRESSION_ID.fetch_add(1, Ordering::Relaxed), kind }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn peek_next(&self) -> &Token {
        &self.tokens[(self.current + 1).min(self.tokens.len() - 1)]
    }

    fn previous(&self) -> Token {
        self.tokens[self.current.saturating_sub(1)].clone()
    }

    fn is_at_end(&self) -> bool {
        self.peek().token_type == TokenType::EndOfFile
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }

        self.previous()
    }

    fn check(&self, token_type: TokenType) -> bool {
        self.peek().token_type == token_type
    }

    fn match_any(&mut self, token_types: &[TokenType]) -> bool {
        if token_types.iter().any(|t| self.check(*t)) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, token_type: TokenType, message: &str) -> ParseResult<Token> {
        if self.check(token_type) {
            Ok(self.advance())
        } else {
            Err(self.error_at_current(message))
        }
    }

    fn error_at_current(&mut self, message: &str) -> ParseError {
        let token = self.peek().clone();
        self.error_handler.error_at(&token, message);

        ParseError
    }

    /// Skips to the start of the next statement
    fn synchronise(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if self.previous().token_type == TokenType::Semicolon {
                return;
            }

            match self.peek().token_type {
                TokenType::For | TokenType::If | TokenType::While | TokenType::Do |
                TokenType::Switch | TokenType::Case | TokenType::Default | TokenType::Break |
                TokenType::Continue | TokenType::TypeSpecifier | TokenType::TypeQualifier => return,
                _ => { self.advance(); },
            }
        }
    }

    fn is_type_start(&self, token: &Token) -> bool {
        matches!(token.token_type, TokenType::TypeSpecifier | TokenType::TypeQualifier)
    }

    fn parse_type(&mut self) -> ParseResult<ResolvedType> {
        let mut specifiers = BTreeSet::new();
        let mut is_const = false;
        let start = self.peek().clone();

        while self.is_type_start(self.peek()) {
            let token = self.advance();
            if token.token_type == TokenType::TypeQualifier {
                is_const = true;
            } else if !specifiers.insert(token.lexeme.clone()) {
                self.error_handler.error_at(&token, "Duplicate type specifier");
            }
        }

        match get_numeric_type(&specifiers, self.context) {
            Some(ty) => Ok(if is_const { ty.add_const() } else { ty }),
            None => {
                self.error_handler.error_at(&start, "Unknown type specifier");
                Err(ParseError)
            },
        }
    }

    // Expressions

    fn expression(&mut self) -> ParseResult<Expression> {
        self.assignment()
    }

    fn assignment(&mut self) -> ParseResult<Expression> {
        let expression = self.conditional()?;

        if self.match_any(&ASSIGNMENT_OPERATORS) {
            let operator = self.previous();
            let value = self.assignment()?;

            if !expression.is_lvalue() {
                self.error_handler.error_at(&operator, "Invalid assignment target");
            }

            return Ok(self.make(ExpressionKind::Assignment {
                assignee: Box::new(expression),
                operator,
                value: Box::new(value),
            }));
        }

        Ok(expression)
    }

    fn conditional(&mut self) -> ParseResult<Expression> {
        let condition = self.binary(1)?;

        if self.match_any(&[TokenType::Question]) {
            let question = self.previous();
            let true_expression = self.expression()?;
            self.consume(TokenType::Colon, "Expect ':' in conditional expression.")?;
            let false_expression = self.conditional()?;

            return Ok(self.make(ExpressionKind::Conditional {
                condition: Box::new(condition),
                question,
                true_expression: Box::new(true_expression),
                false_expression: Box::new(false_expression),
            }));
        }

        Ok(condition)
    }

    /// Precedence climbing over left-associative binary operators
    fn binary(&mut self, min_precedence: u8) -> ParseResult<Expression> {
        let mut left = self.unary()?;

        loop {
            let token_type = self.peek().token_type;
            let precedence = match binary_precedence(token_type) {
                Some(precedence) if precedence >= min_precedence => precedence,
                _ => break,
            };

            let operator = self.advance();
            let right = self.binary(precedence + 1)?;

            let kind = if matches!(token_type, TokenType::AmpersandAmpersand | TokenType::PipePipe) {
                ExpressionKind::Logical { left: Box::new(left), operator, right: Box::new(right) }
            } else {
                ExpressionKind::Binary { left: Box::new(left), operator, right: Box::new(right) }
            };
            left = self.make(kind);
        }

        Ok(left)
    }

    fn unary(&mut self) -> ParseResult<Expression> {
        if self.match_any(&[TokenType::PlusPlus, TokenType::MinusMinus]) {
            let operator = self.previous();
            let target = self.unary()?;

            return Ok(self.make(ExpressionKind::PrefixIncDec { target: Box::new(target), operator }));
        }

        if self.match_any(&[TokenType::Plus, TokenType::Minus, TokenType::Not, TokenType::Tilde]) {
            let operator = self.previous();
            let right = self.unary()?;

            return Ok(self.make(ExpressionKind::Unary { operator, right: Box::new(right) }));
        }

        if self.check(TokenType::LeftParen) && self.is_type_start(self.peek_next()) {
            self.advance();
            let ty = self.parse_type()?;
            let closing_paren = self.consume(TokenType::RightParen, "Expect ')' after cast type.")?;
            let expression = self.unary()?;

            return Ok(self.make(ExpressionKind::Cast { ty, closing_paren, expression: Box::new(expression) }));
        }

        self.postfix()
    }

    fn postfix(&mut self) -> ParseResult<Expression> {
        let mut expression = self.primary()?;

        loop {
            if self.match_any(&[TokenType::LeftSquareBracket]) {
                let index = self.expression()?;
                let closing_square_bracket = self.consume(
                    TokenType::RightSquareBracket, "Expect ']' after index."
                )?;
                expression = self.make(ExpressionKind::ArraySubscript {
                    array: Box::new(expression),
                    closing_square_bracket,
                    index: Box::new(index),
                });
            } else if self.match_any(&[TokenType::LeftParen]) {
                let mut arguments = Vec::new();
                if !self.check(TokenType::RightParen) {
                    loop {
                        arguments.push(self.assignment()?);
                        if !self.match_any(&[TokenType::Comma]) {
                            break;
                        }
                    }
                }
                let closing_paren = self.consume(TokenType::RightParen, "Expect ')' after arguments.")?;
                expression = self.make(ExpressionKind::Call { callee: Box::new(expression), closing_paren, arguments });
            } else if self.match_any(&[TokenType::PlusPlus, TokenType::MinusMinus]) {
                let operator = self.previous();
                expression = self.make(ExpressionKind::PostfixIncDec { target: Box::new(expression), operator });
            } else {
                break;
            }
        }

        Ok(expression)
    }

    fn primary(&mut self) -> ParseResult<Expression> {
        let is_literal = self.peek().is_number() || matches!(
            self.peek().token_type, TokenType::True | TokenType::False | TokenType::String
        );
        if is_literal {
            let literal = self.advance();
            return Ok(self.make(ExpressionKind::Literal(literal)));
        }

        if self.match_any(&[TokenType::Identifier]) {
            let name = self.previous();
            return Ok(self.make(ExpressionKind::Identifier(name)));
        }

        if self.match_any(&[TokenType::LeftParen]) {
            let expression = self.expression()?;
            self.consume(TokenType::RightParen, "Expect ')' after expression.")?;
            return Ok(self.make(ExpressionKind::Grouping(Box::new(expression))));
        }

        Err(self.error_at_current("Expect expression"))
    }

    // Statements

    fn declaration_or_statement(&mut self) -> Option<Statement> {
        let result = if self.is_type_start(self.peek()) {
            self.declaration()
        } else {
            self.statement()
        };

        match result {
            Ok(statement) => Some(statement),
            Err(ParseError) => {
                self.synchronise();
                None
            },
        }
    }

    fn declaration(&mut self) -> ParseResult<Statement> {
        let ty = self.parse_type()?;

        let mut declarators = Vec::new();
        loop {
            let name = self.consume(TokenType::Identifier, "Expect variable name")?;
            let initialiser = if self.match_any(&[TokenType::Equal]) {
                Some(self.assignment()?)
            } else {
                None
            };
            declarators.push(InitDeclarator { name, initialiser });

            if !self.match_any(&[TokenType::Comma]) {
                break;
            }
        }

        self.consume(TokenType::Semicolon, "Expect ';' after declaration")?;

        Ok(Statement::VarDeclaration { ty, declarators })
    }

    fn statement(&mut self) -> ParseResult<Statement> {
        let token = self.peek().clone();
        match token.token_type {
            TokenType::LeftBrace => {
                self.advance();
                self.compound_statement()
            },
            TokenType::If => {
                self.advance();
                self.consume(TokenType::LeftParen, "Expect '(' after 'if'")?;
                let condition = self.expression()?;
                self.consume(TokenType::RightParen, "Expect ')' after 'if' condition")?;
                let then_branch = Box::new(self.statement()?);
                let else_branch = if self.match_any(&[TokenType::Else]) {
                    Some(Box::new(self.statement()?))
                } else {
                    None
                };

                Ok(Statement::If { condition, then_branch, else_branch })
            },
            TokenType::While => {
                self.advance();
                self.consume(TokenType::LeftParen, "Expect '(' after 'while'")?;
                let condition = self.expression()?;
                self.consume(TokenType::RightParen, "Expect ')' after 'while' condition")?;
                let body = Box::new(self.statement()?);

                Ok(Statement::While { condition, body })
            },
            TokenType::Do => {
                self.advance();
                let body = Box::new(self.statement()?);
                self.consume(TokenType::While, "Expect 'while' after 'do' body")?;
                self.consume(TokenType::LeftParen, "Expect '(' after 'while'")?;
                let condition = self.expression()?;
                self.consume(TokenType::RightParen, "Expect ')' after 'while' condition")?;
                self.consume(TokenType::Semicolon, "Expect ';' after 'do-while' loop")?;

                Ok(Statement::Do { body, condition })
            },
            TokenType::For => {
                self.advance();
                self.for_statement()
            },
            TokenType::Switch => {
                let switch = self.advance();
                self.consume(TokenType::LeftParen, "Expect '(' after 'switch'")?;
                let condition = self.expression()?;
                self.consume(TokenType::RightParen, "Expect ')' after 'switch' condition")?;
                let body = Box::new(self.statement()?);

                Ok(Statement::Switch { switch, condition, body })
            },
            TokenType::Case => {
                let keyword = self.advance();
                let value = self.conditional()?;
                self.consume(TokenType::Colon, "Expect ':' after 'case' value")?;
                let body = Box::new(self.statement()?);

                Ok(Statement::Labelled { keyword, value: Some(value), body })
            },
            TokenType::Default => {
                let keyword = self.advance();
                self.consume(TokenType::Colon, "Expect ':' after 'default'")?;
                let body = Box::new(self.statement()?);

                Ok(Statement::Labelled { keyword, value: None, body })
            },
            TokenType::Break => {
                let keyword = self.advance();
                self.consume(TokenType::Semicolon, "Expect ';' after 'break'")?;

                Ok(Statement::Break(keyword))
            },
            TokenType::Continue => {
                let keyword = self.advance();
                self.consume(TokenType::Semicolon, "Expect ';' after 'continue'")?;

                Ok(Statement::Continue(keyword))
            },
            _ => self.expression_statement(),
        }
    }

    fn compound_statement(&mut self) -> ParseResult<Statement> {
        let mut statements = Vec::new();
        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            if let Some(statement) = self.declaration_or_statement() {
                statements.push(statement);
            }
        }
        self.consume(TokenType::RightBrace, "Expect '}' after compound statement.")?;

        Ok(Statement::Compound(statements))
    }

    fn for_statement(&mut self) -> ParseResult<Statement> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'for'")?;

        let initialiser = if self.match_any(&[TokenType::Semicolon]) {
            None
        } else if self.is_type_start(self.peek()) {
            Some(Box::new(self.declaration()?))
        } else {
            Some(Box::new(self.expression_statement()?))
        };

        let condition = if self.check(TokenType::Semicolon) { None } else { Some(self.expression()?) };
        self.consume(TokenType::Semicolon, "Expect ';' after loop condition")?;

        let increment = if self.check(TokenType::RightParen) { None } else { Some(self.expression()?) };
        self.consume(TokenType::RightParen, "Expect ')' after for clauses")?;

        let body = Box::new(self.statement()?);

        Ok(Statement::For { initialiser, condition, increment, body })
    }

    fn expression_statement(&mut self) -> ParseResult<Statement> {
        if self.match_any(&[TokenType::Semicolon]) {
            return Ok(Statement::Expression(None));
        }

        let expression = self.expression()?;
        self.consume(TokenType::Semicolon, "Expect ';' after expression")?;

        Ok(Statement::Expression(Some(expression)))
    }
}

/// Parses a single expression which must use every token
pub fn parse_expression(
    tokens: &[Token],
    context: &TypeContext,
    error_handler: &mut dyn ErrorHandlerBase,
) -> Option<Expression> {
    let mut parser = Parser::new(tokens, context, error_handler);

    match parser.expression() {
        Ok(expression) => {
            if parser.is_at_end() {
                Some(expression)
            } else {
                parser.error_at_current("Expect end of expression");
                None
            }
        },
        Err(ParseError) => None,
    }
}

/// Parses a list of declarations and statements, recovering after errors
pub fn parse_block_item_list(
    tokens: &[Token],
    context: &TypeContext,
    error_handler: &mut dyn ErrorHandlerBase,
) -> Vec<Statement> {
    let mut parser = Parser::new(tokens, context, error_handler);

    let mut statements = Vec::new();
    while !parser.is_at_end() {
        if let Some(statement) = parser.declaration_or_statement() {
            statements.push(statement);
        }
    }

    statements
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::transpiler::error_handler::ErrorHandler;
    use crate::transpiler::scanner::scan_source;

    fn parse_statements(source: &str) -> (Vec<Statement>, ErrorHandler) {
        let mut handler = ErrorHandler::new("parser test");
        let tokens = scan_source(source, &mut handler);
        let statements = parse_block_item_list(&tokens, &TypeContext::default(), &mut handler);

        (statements, handler)
    }

    #[test]
    fn test_precedence() {
        let mut handler = ErrorHandler::new("parser test");
        let tokens = scan_source("a + b * c", &mut handler);
        let expression = parse_expression(&tokens, &TypeContext::default(), &mut handler).unwrap();

        match expression.kind {
            ExpressionKind::Binary { operator, right, .. } => {
                assert_eq!(operator.token_type, TokenType::Plus);
                assert!(matches!(right.kind, ExpressionKind::Binary { .. }));
            },
            _ => panic!("Expected binary expression"),
        }
    }

    #[test]
    fn test_statements() {
        let (statements, handler) = parse_statements(
            "scalar x = 1.0, y;\nfor(int i = 0; i < 10; i++) { x += i; }\nif(x > 2.0) y = x; else { y = -x; }"
        );

        assert!(!handler.has_error());
        assert_eq!(statements.len(), 3);
        assert!(matches!(&statements[0], Statement::VarDeclaration { declarators, .. } if declarators.len() == 2));
        assert!(matches!(statements[1], Statement::For { .. }));
        assert!(matches!(statements[2], Statement::If { else_branch: Some(_), .. }));
    }

    #[test]
    fn test_recovers_after_error() {
        let (statements, handler) = parse_statements("x = ;\ny = 2;");

        assert_eq!(handler.messages().len(), 1);
        assert_eq!(handler.messages()[0], "[line 1] Error at ';': Expect expression");
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn test_missing_semicolon_at_end() {
        let (_, handler) = parse_statements("x = 2");

        assert_eq!(handler.messages()[0], "[line 1] Error at end: Expect ';' after expression");
    }
}
