use tracing::error;
use crate::error::FrontEndError;
use super::token::{Token, TokenType};


/// Collects diagnostics from the scanner, parser and type checker
pub trait ErrorHandlerBase {
    /// Reports an error against a line
    fn error(&mut self, line: usize, message: &str);
    /// Reports an error anchored to a token
    fn error_at(&mut self, token: &Token, message: &str);
    fn has_error(&self) -> bool;
}

/// Default handler which logs each diagnostic and keeps the formatted text
#[derive(Debug, Clone, Default)]
pub struct ErrorHandler {
    context: String,
    messages: Vec<String>,
}

impl ErrorHandler {
    pub fn new(context: &str) -> Self {
        ErrorHandler { context: context.to_string(), messages: Vec::new() }
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// Converts accumulated diagnostics into an error
    pub fn to_result(&self) -> Result<(), FrontEndError> {
        if self.messages.is_empty() {
            Ok(())
        } else {
            Err(FrontEndError::Diagnostics {
                context: self.context.clone(),
                count: self.messages.len(),
                messages: self.messages.join("\n"),
            })
        }
    }

    fn report(&mut self, line: usize, location: &str, message: &str) {
        let formatted = format!("[line {}] Error{}: {}", line, location, message);
        error!("{}: {}", self.context, formatted);
        self.messages.push(formatted);
    }
}

impl ErrorHandlerBase for ErrorHandler {
    fn error(&mut self, line: usize, message: &str) {
        self.report(line, "", message);
    }

    fn error_at(&mut self, token: &Token, message: &str) {
        if token.token_type == TokenType::EndOfFile {
            self.report(token.line, " at end", message);
        } else {
            let location = format!(" at '{}'", token.lexeme);
            self.report(token.line, &location, message);
        }
    }

    fn has_error(&self) -> bool {
        !self.messages.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_anchored_messages() {
        let mut handler = ErrorHandler::new("test");
        handler.error_at(&Token::new(TokenType::Identifier, "x", 3), "Undefined identifier");
        handler.error_at(&Token::new(TokenType::EndOfFile, "", 4), "Expect ';'");

        assert!(handler.has_error());
        assert_eq!(handler.messages()[0], "[line 3] Error at 'x': Undefined identifier");
        assert_eq!(handler.messages()[1], "[line 4] Error at end: Expect ';'");
        assert!(handler.to_result().is_err());
    }
}
