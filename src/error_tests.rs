//! Tests for error reporting across the tokenizer, parser and evaluator
//!
//! These check that each layer reports the right message at the right
//! location, and that errors convert cleanly between layers.

#[cfg(test)]
mod tests {
    use crate::config::{Config, ConfigOptions};
    use crate::error::{CfgError, ConfigError, ErrorContext, Location, ParserError, TokenizerError};
    use crate::lexer::{LexerConfig, TokenKind, Tokenizer};
    use crate::parser::{Parser, ParserConfig};

    fn load_err(source: &str) -> ConfigError {
        Config::from_source(source).expect_err("Should fail to load")
    }

    fn get_err(source: &str, key: &str) -> ConfigError {
        Config::from_source(source)
            .expect("Should load")
            .get(key)
            .expect_err("Should fail lookup")
    }

    #[test]
    fn test_location_tracking() {
        let mut location = Location::new();
        assert_eq!(location, Location::at(1, 1));
        location.next_line();
        assert_eq!(location, Location::at(2, 1));
        location.update(&Location::at(7, 3));
        assert_eq!(location.to_string(), "(7, 3)");
        assert!(Location::at(1, 9) < Location::at(2, 1));
        assert!(Location::at(2, 1) < Location::at(2, 2));
    }

    #[test]
    fn test_error_context_snippet() {
        let source = "a: 1\nb: @\nc: 3";
        let context = ErrorContext::new(source, Location::at(2, 4));
        assert_eq!(
            context.source_snippet(),
            "1 | a: 1\n2 | b: @\n       ^\n3 | c: 3\n"
        );

        let rendered = context
            .with_suggestion("Quote the file name")
            .with_help("`@` includes another file")
            .format_error("@ operand must be a string");
        assert!(rendered.starts_with("Error at (2, 4): @ operand must be a string\n\n"));
        assert!(rendered.contains("Suggestions:\n  1. Quote the file name\n"));
        assert!(rendered.ends_with("Help: `@` includes another file\n"));
    }

    #[test]
    fn test_error_context_limits() {
        assert_eq!(ErrorContext::new("", Location::at(3, 1)).source_snippet(), "");
        let source = (1..=10).map(|i| format!("k{}: {}", i, i)).collect::<Vec<_>>().join("\n");
        let snippet = ErrorContext::new(source, Location::at(10, 1)).extract_lines_around(1);
        assert_eq!(snippet, " 9 | k9: 9\n10 | k10: 10\n     ^\n");
    }

    #[test]
    fn test_tokenizer_errors_carry_locations() {
        let err = Tokenizer::new("a: 'x\nb: 2")
            .all_tokens()
            .expect_err("Should fail");
        assert!(matches!(err, TokenizerError::UnterminatedString { .. }));
        assert_eq!(err.location(), Location::at(1, 4));

        let err = Tokenizer::with_config("'abcdef'", LexerConfig::default().with_max_string_length(2))
            .all_tokens()
            .expect_err("Should fail");
        assert_eq!(err.to_string(), "String exceeds maximum length of 2 characters");
    }

    #[test]
    fn test_parser_error_messages() {
        let cases: Vec<(&str, &str, Location)> = vec![
            ("a 1", "Expected key-value separator, found: INTEGER", Location::at(1, 3)),
            ("1: 2", "Expected container (mapping or list) but got INTEGER", Location::at(1, 1)),
            ("{a: 1", "Expected RIGHT_CURLY but got EOF", Location::at(1, 6)),
            ("a: [1, 2", "Expected RIGHT_BRACKET but got EOF", Location::at(1, 9)),
            ("a: 1 2", "Expected RIGHT_CURLY or EOF but got INTEGER", Location::at(1, 6)),
            ("{a: 1} b", "Expected EOF but got WORD", Location::at(1, 8)),
        ];
        for (source, message, location) in cases {
            let err = load_err(source);
            assert_eq!(err.to_string(), message, "message for {:?}", source);
            assert_eq!(err.location(), Some(location), "location for {:?}", source);
        }
    }

    #[test]
    fn test_tokenizer_error_through_parser() {
        let err = load_err("a: 0o79");
        let ConfigError::Syntax(ParserError::Tokenizer(inner)) = &err else {
            panic!("Expected a wrapped tokenizer error, got {:?}", err);
        };
        assert!(matches!(inner, TokenizerError::InvalidNumber { .. }));
        assert_eq!(err.location(), Some(Location::at(1, 7)));
    }

    #[test]
    fn test_max_depth_through_config() {
        let options =
            ConfigOptions::new().with_parser_config(ParserConfig::new().with_max_depth(4));
        let config = Config::with_options(options);
        let err = config
            .load("a: [[[[[[1]]]]]]")
            .expect_err("Should exceed depth");
        assert!(matches!(
            err,
            ConfigError::Syntax(ParserError::MaxDepthExceeded { .. })
        ));
    }

    #[test]
    fn test_evaluation_error_messages() {
        let cases: Vec<(&str, &str, &str)> = vec![
            ("a: @1", "a", "@ operand must be a string, but is 1"),
            ("a: @'missing.cfg'", "a", "Unable to locate missing.cfg"),
            ("a: [1, 2]", "a[2]", "index out of range: is 2, must be between 0 and 1"),
            ("a: [1, 2]", "a['x']", "integer required, but found \"x\""),
            ("a: {b: 1}", "a[0]", "string required, but found 0"),
            ("a: {b: 1}", "a[1:]", "slices can only operate on lists"),
            ("a: [1, 2]", "a[::0]", "slice step cannot be zero"),
            ("a: 'x' + 1", "a", "Unable to add \"x\" and 1 at (1, 8)"),
            ("a: ~1.5", "a", "Unable to complement 1.5 at (1, 4)"),
            ("a: 5 % 0", "a", "Division by zero at (1, 6)"),
            ("a: b", "a", "Unknown variable 'b' at (1, 4)"),
        ];
        for (source, key, message) in cases {
            let err = get_err(source, key);
            assert_eq!(err.to_string(), message, "{:?} -> {:?}", source, key);
        }
    }

    #[test]
    fn test_circular_reference_message() {
        let err = get_err("a: ${b}\nb: ${a}", "a");
        let ConfigError::CircularReference { references } = &err else {
            panic!("Expected circular reference, got {:?}", err);
        };
        assert_eq!(
            references,
            &vec![
                ("a".to_string(), Location::at(2, 4)),
                ("b".to_string(), Location::at(1, 4)),
            ]
        );
        assert_eq!(err.to_string(), "Circular reference: a (2, 4), b (1, 4)");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(ConfigError::NotLoaded.is_recoverable());
        assert!(
            ConfigError::NotFound {
                key: "x".to_string(),
                location: None
            }
            .is_recoverable()
        );
        assert!(
            !ConfigError::BadIndex {
                message: "bad".to_string(),
                location: Location::new()
            }
            .is_recoverable()
        );
        assert!(!load_err("a: 'x").is_recoverable());
    }

    #[test]
    fn test_cfg_error_conversions() {
        let err: CfgError = load_err("[1]").into();
        assert_eq!(err.to_string(), "Root configuration must be a mapping");

        let err: CfgError = <CfgError as serde::de::Error>::custom("bad value");
        assert_eq!(err.to_string(), "Serde error: bad value");

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CfgError = io.into();
        assert_eq!(err.to_string(), "IO error: gone");
    }

    #[test]
    fn test_io_error_from_missing_file() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let missing = dir.path().join("missing.cfg");
        let err = Config::from_file(&missing).expect_err("Should fail");
        let ConfigError::Io { path, .. } = &err else {
            panic!("Expected an I/O error, got {:?}", err);
        };
        assert_eq!(path, &missing.display().to_string());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_token_kind_names_in_messages() {
        assert_eq!(TokenKind::RightBracket.to_string(), "RIGHT_BRACKET");
        let err = Parser::new("[1 2]")
            .and_then(|mut p| p.list())
            .expect_err("Should fail");
        assert_eq!(err.to_string(), "Expected RIGHT_BRACKET but got INTEGER");
    }
}
