use std::fmt::{Display, Formatter, Result as FmtResult};


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // Single-character and compound punctuation
    LeftParen, RightParen, LeftBrace, RightBrace, LeftSquareBracket, RightSquareBracket,
    Comma, Dot, Colon, Semicolon, Question,

    // Operators
    Minus, MinusMinus, MinusEqual, Plus, PlusPlus, PlusEqual,
    Star, StarEqual, Slash, SlashEqual, Percent, PercentEqual,
    Ampersand, AmpersandAmpersand, AmpersandEqual,
    Pipe, PipePipe, PipeEqual, Caret, CaretEqual, Tilde,
    Not, NotEqual, Equal, EqualEqual,
    Greater, GreaterEqual, ShiftRight, ShiftRightEqual,
    Less, LessEqual, ShiftLeft, ShiftLeftEqual,

    // Literals
    Identifier, String,
    Int32Number, Uint32Number, FloatNumber, DoubleNumber, ScalarNumber,
    True, False,

    // Types
    TypeSpecifier, TypeQualifier,

    // Keywords
    Do, Else, For, If, While, Switch, Case, Default, Break, Continue,

    EndOfFile,
}

/// Scanned token, numeric lexemes have their sign and suffix removed
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: String,
    pub line: usize,
}

impl Token {
    pub fn new(token_type: TokenType, lexeme: &str, line: usize) -> Self {
        Token { token_type, lexeme: lexeme.to_string(), line }
    }

    pub fn is_number(&self) -> bool {
        matches!(
            self.token_type,
            TokenType::Int32Number | TokenType::Uint32Number | TokenType::FloatNumber |
            TokenType::DoubleNumber | TokenType::ScalarNumber
        )
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{:?}('{}', line {})", self.token_type, self.lexeme, self.line)
    }
}
