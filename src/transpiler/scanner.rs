use std::collections::HashMap;
use lazy_static::lazy_static;
use pest::Parser;
use pest::iterators::Pair;
use super::error_handler::ErrorHandlerBase;
use super::token::{Token, TokenType};


#[derive(pest_derive::Parser)]
#[grammar_inline = r#"
whitespace = _{ " " | "\t" | "\r" | "\n" }
line_comment = _{ "//" ~ (!NEWLINE ~ ANY)* }
block_comment = _{ "/*" ~ (!"*/" ~ ANY)* ~ "*/" }
unterminated_comment = { "/*" ~ ANY* }

hex_body = @{ ("0x" | "0X") ~ ASCII_HEX_DIGIT+ }
unsigned_suffix = @{ "u" | "U" }
hex_number = ${ hex_body ~ unsigned_suffix? }

exponent = @{ ("e" | "E") ~ ("+" | "-")? ~ ASCII_DIGIT+ }
float_body = @{
    (ASCII_DIGIT+ ~ "." ~ ASCII_DIGIT* ~ exponent?) |
    ("." ~ ASCII_DIGIT+ ~ exponent?) |
    (ASCII_DIGIT+ ~ exponent)
}
float_suffix = @{ "f" | "F" | "d" | "D" }
decimal_float = ${ float_body ~ float_suffix? }

integer_body = @{ ASCII_DIGIT+ }
integer_suffix = @{ "u" | "U" | "f" | "F" | "d" | "D" }
decimal_integer = ${ integer_body ~ integer_suffix? }

identifier = @{ (ASCII_ALPHA | "_") ~ (ASCII_ALPHANUMERIC | "_")* }

string = @{ "\"" ~ (("\\" ~ ANY) | (!("\"" | "\\" | NEWLINE) ~ ANY))* ~ "\"" }
unterminated_string = @{ "\"" ~ (!NEWLINE ~ ANY)* }

operator = @{
    "<<=" | ">>=" |
    "++" | "--" | "+=" | "-=" | "*=" | "/=" | "%=" | "&&" | "&=" | "||" | "|=" | "^=" |
    "!=" | "==" | ">=" | "<=" | "<<" | ">>" |
    "(" | ")" | "{" | "}" | "[" | "]" | "," | "." | ":" | ";" | "?" |
    "-" | "+" | "*" | "/" | "%" | "&" | "|" | "^" | "~" | "!" | "=" | ">" | "<"
}

unknown = @{ ANY }

program = _{
    SOI ~ (
        whitespace | line_comment | block_comment | unterminated_comment |
        decimal_float | hex_number | decimal_integer | identifier |
        string | unterminated_string | operator | unknown
    )* ~ EOI
}
"#]
struct SourceScanner;

lazy_static! {
    static ref KEYWORDS: HashMap<&'static str, TokenType> = {
        let mut keywords = HashMap::new();

        keywords.insert("const", TokenType::TypeQualifier);
        keywords.insert("do", TokenType::Do);
        keywords.insert("else", TokenType::Else);
        keywords.insert("false", TokenType::False);
        keywords.insert("for", TokenType::For);
        keywords.insert("if", TokenType::If);
        keywords.insert("true", TokenType::True);
        keywords.insert("while", TokenType::While);
        keywords.insert("switch", TokenType::Switch);
        keywords.insert("case", TokenType::Case);
        keywords.insert("default", TokenType::Default);
        keywords.insert("break", TokenType::Break);
        keywords.insert("continue", TokenType::Continue);

        for specifier in [
            "char", "short", "int", "long", "float", "double", "signed", "unsigned", "bool",
            "uint8_t", "int8_t", "uint16_t", "int16_t", "uint32_t", "int32_t",
            "scalar", "timepoint",
        ] {
            keywords.insert(specifier, TokenType::TypeSpecifier);
        }

        keywords
    };
}

fn operator_token_type(operator: &str) -> Option<TokenType> {
    let token_type = match operator {
        "(" => TokenType::LeftParen,
        ")" => TokenType::RightParen,
        "{" => TokenType::LeftBrace,
        "}" => TokenType::RightBrace,
        "[" => TokenType::LeftSquareBracket,
        "]" => TokenType::RightSquareBracket,
        "," => TokenType::Comma,
        "." => TokenType::Dot,
        ":" => TokenType::Colon,
        ";" => TokenType::Semicolon,
        "?" => TokenType::Question,
        "-" => TokenType::Minus,
        "--" => TokenType::MinusMinus,
        "-=" => TokenType::MinusEqual,
        "+" => TokenType::Plus,
        "++" => TokenType::PlusPlus,
        "+=" => TokenType::PlusEqual,
        "*" => TokenType::Star,
        "*=" => TokenType::StarEqual,
        "/" => TokenType::Slash,
        "/=" => TokenType::SlashEqual,
        "%" => TokenType::Percent,
        "%=" => TokenType::PercentEqual,
        "&" => TokenType::Ampersand,
        "&&" => TokenType::AmpersandAmpersand,
        "&=" => TokenType::AmpersandEqual,
        "|" => TokenType::Pipe,
        "||" => TokenType::PipePipe,
        "|=" => TokenType::PipeEqual,
        "^" => TokenType::Caret,
        "^=" => TokenType::CaretEqual,
        "~" => TokenType::Tilde,
        "!" => TokenType::Not,
        "!=" => TokenType::NotEqual,
        "=" => TokenType::Equal,
        "==" => TokenType::EqualEqual,
        ">" => TokenType::Greater,
        ">=" => TokenType::GreaterEqual,
        ">>" => TokenType::ShiftRight,
        ">>=" => TokenType::ShiftRightEqual,
        "<" => TokenType::Less,
        "<=" => TokenType::LessEqual,
        "<<" => TokenType::ShiftLeft,
        "<<=" => TokenType::ShiftLeftEqual,
        _ => return None,
    };

    Some(token_type)
}

fn line_of(pair: &Pair<Rule>) -> usize {
    pair.as_span().start_pos().line_col().0
}

/// Splits a compound numeric pair into its digits and optional suffix
fn split_number<'a>(pair: Pair<'a, Rule>) -> (&'a str, Option<&'a str>) {
    let mut body = pair.as_str();
    let mut suffix = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::hex_body | Rule::float_body | Rule::integer_body => body = inner.as_str(),
            Rule::unsigned_suffix | Rule::float_suffix | Rule::integer_suffix => suffix = Some(inner.as_str()),
            _ => {},
        }
    }

    (body, suffix)
}

fn classify_number(rule: Rule, suffix: Option<&str>) -> TokenType {
    match (rule, suffix.map(|s| s.to_ascii_lowercase())) {
        (_, Some(s)) if s == "u" => TokenType::Uint32Number,
        (_, Some(s)) if s == "f" => TokenType::FloatNumber,
        (_, Some(s)) if s == "d" => TokenType::DoubleNumber,
        (Rule::decimal_float, _) => TokenType::ScalarNumber,
        _ => TokenType::Int32Number,
    }
}

/// Scans source into tokens terminated by `EndOfFile`. Problems are reported
/// through the error handler and scanning carries on past them.
/// A `-` is always its own token so `-5` scans as `Minus`, `Int32Number`.
pub fn scan_source(source: &str, error_handler: &mut dyn ErrorHandlerBase) -> Vec<Token> {
    let mut tokens = Vec::new();
    let end_line = source.matches('\n').count() + 1;

    let pairs = match SourceScanner::parse(Rule::program, source) {
        Ok(pairs) => pairs,
        Err(_) => {
            error_handler.error(1, "Unable to scan source");
            tokens.push(Token::new(TokenType::EndOfFile, "", end_line));
            return tokens;
        }
    };

    for pair in pairs {
        let line = line_of(&pair);
        match pair.as_rule() {
            Rule::decimal_float | Rule::decimal_integer | Rule::hex_number => {
                let rule = pair.as_rule();
                let (body, suffix) = split_number(pair);
                tokens.push(Token::new(classify_number(rule, suffix), body, line));
            },
            Rule::identifier => {
                let lexeme = pair.as_str();
                let token_type = KEYWORDS.get(lexeme).copied().unwrap_or(TokenType::Identifier);
                tokens.push(Token::new(token_type, lexeme, line));
            },
            Rule::string => tokens.push(Token::new(TokenType::String, pair.as_str(), line)),
            Rule::operator => match operator_token_type(pair.as_str()) {
                Some(token_type) => tokens.push(Token::new(token_type, pair.as_str(), line)),
                None => error_handler.error(line, "Unexpected character."),
            },
            Rule::unterminated_string => error_handler.error(line, "Unterminated string."),
            Rule::unterminated_comment => error_handler.error(line, "Unterminated block comment."),
            Rule::unknown => error_handler.error(line, "Unexpected character."),
            _ => {},
        }
    }

    tokens.push(Token::new(TokenType::EndOfFile, "", end_line));

    tokens
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::transpiler::error_handler::ErrorHandler;

    fn scan(source: &str) -> (Vec<Token>, ErrorHandler) {
        let mut handler = ErrorHandler::new("scanner test");
        let tokens = scan_source(source, &mut handler);

        (tokens, handler)
    }

    #[test]
    fn test_hex_literals() {
        let (tokens, handler) = scan("0x1234 0xFFFFFFFFU -0x1234 -0x7FFFFFFF");
        assert!(!handler.has_error());

        let types: Vec<TokenType> = tokens.iter().map(|t| t.token_type).collect();
        assert_eq!(
            types,
            vec![
                TokenType::Int32Number, TokenType::Uint32Number, TokenType::Minus,
                TokenType::Int32Number, TokenType::Minus, TokenType::Int32Number,
                TokenType::EndOfFile,
            ]
        );
        assert_eq!(tokens[0].lexeme, "0x1234");
        assert_eq!(tokens[1].lexeme, "0xFFFFFFFF");
    }

    #[test]
    fn test_keywords_and_operators() {
        let (tokens, handler) = scan("const scalar x = a >>= 2;\n// comment\nif(x) { y++; }");
        assert!(!handler.has_error());

        assert_eq!(tokens[0].token_type, TokenType::TypeQualifier);
        assert_eq!(tokens[1].token_type, TokenType::TypeSpecifier);
        assert_eq!(tokens[5].token_type, TokenType::ShiftRightEqual);
        assert_eq!(tokens[8].token_type, TokenType::If);
        assert_eq!(tokens[8].line, 3);
        assert_eq!(tokens.last().map(|t| t.line), Some(3));
    }

    #[test]
    fn test_errors_continue() {
        let (tokens, handler) = scan("a @ b\n\"open");

        assert_eq!(handler.messages().len(), 2);
        assert_eq!(tokens.len(), 3);
        assert!(handler.messages()[1].starts_with("[line 2]"));
    }
}
