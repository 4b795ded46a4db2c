use super::*;
use axum::http::HeaderMap;

fn headers_with(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("authorization", value.parse().unwrap());
    headers
}

#[cfg(test)]
mod extract_bearer_token_tests {
    use super::*;

    #[test]
    fn valid_bearer_token() {
        let result = extract_bearer_token(&headers_with("Bearer user-42"));
        assert_eq!(result, Ok("user-42".to_string()));
    }

    #[test]
    fn valid_bearer_token_with_extra_whitespace() {
        let result = extract_bearer_token(&headers_with("Bearer   user-42  "));
        assert_eq!(result, Ok("user-42".to_string()));
    }

    #[test]
    fn case_insensitive_bearer() {
        let result = extract_bearer_token(&headers_with("bearer user-42"));
        assert_eq!(result, Ok("user-42".to_string()));
    }

    #[test]
    fn missing_authorization_header() {
        let result = extract_bearer_token(&HeaderMap::new());
        assert_eq!(result, Err(BearerError::Missing));
    }

    #[test]
    fn wrong_auth_scheme() {
        let result = extract_bearer_token(&headers_with("Basic dXNlcjpwYXNz"));
        assert_eq!(result, Err(BearerError::InvalidFormat));
    }

    #[test]
    fn missing_bearer_prefix() {
        let result = extract_bearer_token(&headers_with("user-42"));
        assert_eq!(result, Err(BearerError::InvalidFormat));
    }

    #[test]
    fn bearer_with_empty_token() {
        let result = extract_bearer_token(&headers_with("Bearer    "));
        assert_eq!(result, Err(BearerError::Empty));
    }
}

#[cfg(test)]
mod resolve_user_id_tests {
    use super::*;

    #[test]
    fn explicit_user_wins() {
        let headers = headers_with("Bearer from-token");
        assert_eq!(resolve_user_id(Some("alice"), &headers), "alice");
    }

    #[test]
    fn blank_explicit_user_falls_back_to_token() {
        let headers = headers_with("Bearer from-token");
        assert_eq!(resolve_user_id(Some("  "), &headers), "from-token");
        assert_eq!(resolve_user_id(None, &headers), "from-token");
    }

    #[test]
    fn default_user_without_token() {
        assert_eq!(resolve_user_id(None, &HeaderMap::new()), DEFAULT_USER_ID);
        assert_eq!(resolve_user_id(None, &headers_with("Basic abc")), DEFAULT_USER_ID);
    }
}

#[cfg(test)]
mod bearer_error_display_tests {
    use super::*;

    #[test]
    fn missing_error_message() {
        assert_eq!(BearerError::Missing.to_string(), "Authorization token not provided");
    }

    #[test]
    fn invalid_format_error_message() {
        assert_eq!(
            BearerError::InvalidFormat.to_string(),
            "Invalid authorization token format"
        );
    }
}
