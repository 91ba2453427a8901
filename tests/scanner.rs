#[cfg(test)]
mod tests {
    use spike_codegen::error::FrontEndError;
    use spike_codegen::transpiler::scan_code;
    use spike_codegen::transpiler::token::TokenType;


    fn token_types(code: &str) -> Vec<TokenType> {
        scan_code(code, "scanner test").unwrap().iter().map(|t| t.token_type).collect()
    }

    #[test]
    fn test_numeric_literal_suffixes() {
        let tokens = scan_code("x = 1.0f + 2.5 - 3u * 4d / .5e1 + 12f;", "literals").unwrap();

        let types: Vec<TokenType> = tokens.iter().map(|t| t.token_type).collect();
        assert_eq!(
            types,
            vec![
                TokenType::Identifier, TokenType::Equal,
                TokenType::FloatNumber, TokenType::Plus,
                TokenType::ScalarNumber, TokenType::Minus,
                TokenType::Uint32Number, TokenType::Star,
                TokenType::DoubleNumber, TokenType::Slash,
                TokenType::ScalarNumber, TokenType::Plus,
                TokenType::FloatNumber, TokenType::Semicolon,
                TokenType::EndOfFile,
            ]
        );

        let lexemes: Vec<&str> = tokens.iter().filter(|t| t.is_number()).map(|t| t.lexeme.as_str()).collect();
        assert_eq!(lexemes, vec!["1.0", "2.5", "3", "4", ".5e1", "12"]);
    }

    #[test]
    fn test_negative_numbers_scan_as_minus() {
        assert_eq!(
            token_types("-5 - -0.5"),
            vec![
                TokenType::Minus, TokenType::Int32Number, TokenType::Minus,
                TokenType::Minus, TokenType::ScalarNumber, TokenType::EndOfFile,
            ]
        );
    }

    #[test]
    fn test_minus_is_never_part_of_a_literal() {
        let tokens = scan_code("V-1u; V -= -2.0f; x = 3e-2;", "minus").unwrap();

        let pairs: Vec<(TokenType, &str)> = tokens.iter().map(|t| (t.token_type, t.lexeme.as_str())).collect();
        assert_eq!(
            pairs,
            vec![
                (TokenType::Identifier, "V"), (TokenType::Minus, "-"), (TokenType::Uint32Number, "1"),
                (TokenType::Semicolon, ";"),
                (TokenType::Identifier, "V"), (TokenType::MinusEqual, "-="),
                (TokenType::Minus, "-"), (TokenType::FloatNumber, "2.0"), (TokenType::Semicolon, ";"),
                (TokenType::Identifier, "x"), (TokenType::Equal, "="),
                (TokenType::ScalarNumber, "3e-2"), (TokenType::Semicolon, ";"),
                (TokenType::EndOfFile, ""),
            ]
        );
    }

    #[test]
    fn test_literal_type_classes() {
        let cases = [
            ("7", TokenType::Int32Number),
            ("0x1F", TokenType::Int32Number),
            ("7u", TokenType::Uint32Number),
            ("7U", TokenType::Uint32Number),
            ("0x1Fu", TokenType::Uint32Number),
            ("7f", TokenType::FloatNumber),
            ("1.5F", TokenType::FloatNumber),
            ("7d", TokenType::DoubleNumber),
            ("1.5D", TokenType::DoubleNumber),
            ("1.5", TokenType::ScalarNumber),
            (".25", TokenType::ScalarNumber),
            ("2e3", TokenType::ScalarNumber),
        ];

        for (code, expected) in cases {
            assert_eq!(token_types(code), vec![expected, TokenType::EndOfFile], "scanning {}", code);
        }
    }

    #[test]
    fn test_comments_and_strings() {
        let tokens = scan_code(
            "/* block\ncomment */ printf(\"%f\\n\", V); // trailing\nV = 0;",
            "comments",
        ).unwrap();

        assert_eq!(tokens[0].token_type, TokenType::Identifier);
        assert_eq!(tokens[0].line, 2);
        assert_eq!(tokens[2].token_type, TokenType::String);
        assert_eq!(tokens[2].lexeme, "\"%f\\n\"");

        let last_statement: Vec<&str> = tokens.iter().filter(|t| t.line == 3).map(|t| t.lexeme.as_str()).collect();
        assert_eq!(last_statement, vec!["V", "=", "0", ";", ""]);
    }

    #[test]
    fn test_empty_code_is_only_end_of_file() {
        assert_eq!(token_types(""), vec![TokenType::EndOfFile]);
        assert_eq!(token_types("  // nothing here\n"), vec![TokenType::EndOfFile]);
    }

    #[test]
    fn test_unterminated_comment_is_reported() {
        let error = scan_code("V = 1; /* never closed", "sim code").unwrap_err();

        match error {
            FrontEndError::Diagnostics { context, count, .. } => {
                assert_eq!(context, "sim code");
                assert_eq!(count, 1);
            },
        }
    }
}
