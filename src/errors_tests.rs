//! Unit tests for error handling
//!
//! Tests error types, conversions, and error message formatting.

#[cfg(test)]
mod tests {
    use std::io;

    use crate::errors::GeoRankError;

    // ====== Error Type Tests ======

    #[test]
    fn test_custom_error() {
        let error = GeoRankError::Custom("Test error message".to_string());
        assert_eq!(format!("{error}"), "Test error message");
    }

    #[test]
    fn test_invalid_input_is_client_error() {
        let error = GeoRankError::InvalidInput("latitude out of range".to_string());
        assert!(error.is_client_error());
        assert!(format!("{error}").contains("latitude out of range"));
    }

    #[test]
    fn test_upstream_errors_are_not_client_errors() {
        let errors = vec![
            GeoRankError::SearchUnavailable("backend down".to_string()),
            GeoRankError::Store("connection refused".to_string()),
            GeoRankError::Weather("timeout".to_string()),
            GeoRankError::Timeout("store".to_string()),
        ];

        for error in errors {
            assert!(!error.is_client_error(), "{error} should not be a client error");
        }
    }

    #[test]
    fn test_search_unavailable_display() {
        let error = GeoRankError::SearchUnavailable("HTTP 503".to_string());
        assert_eq!(format!("{error}"), "Search unavailable: HTTP 503");
    }

    // ====== Error Conversion Tests ======

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let err: GeoRankError = io_err.into();

        match err {
            GeoRankError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("Expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn test_error_from_serde_json() {
        let parse_result: Result<serde_json::Value, _> = serde_json::from_str("{invalid json}");
        let err: GeoRankError = parse_result.unwrap_err().into();
        assert!(matches!(err, GeoRankError::Serialization(_)));
    }

    #[test]
    fn test_error_from_toml() {
        let parse_result: Result<toml::Value, _> = toml::from_str("= broken");
        let err: GeoRankError = parse_result.unwrap_err().into();
        assert!(matches!(err, GeoRankError::TomlParsing(_)));
    }

    // ====== Result Type Tests ======

    #[test]
    fn test_result_and_then() {
        let result: crate::Result<i32> = Ok(42);
        let chained = result.and_then(|v| {
            if v > 40 {
                Ok(v + 10)
            } else {
                Err(GeoRankError::Custom("Too small".to_string()))
            }
        });
        assert_eq!(chained.unwrap(), 52);
    }
}
