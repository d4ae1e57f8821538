//! Identifier casing helpers for generated Go code.

fn is_separator(c: char) -> bool {
    matches!(c, '_' | '-' | '.' | '/' | ' ')
}

/// `echo_client` → `EchoClient`, `bar-baz` → `BarBaz`. Interior capitals are kept.
pub fn pascal_case(s: &str) -> String {
    s.split(is_separator)
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// `echo_client` → `echoClient`, `HTTPClient` → `hTTPClient`.
pub fn camel_case(s: &str) -> String {
    let pascal = pascal_case(s);
    let mut chars = pascal.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// `EchoEcho` → `echo_echo`, `bar-baz` → `bar_baz`.
pub fn snake_case(s: &str) -> String {
    let mut result = String::new();
    let mut prev_lower = false;

    for ch in s.chars() {
        if ch.is_uppercase() {
            if prev_lower && !result.ends_with('_') {
                result.push('_');
            }
            result.extend(ch.to_lowercase());
            prev_lower = false;
        } else if is_separator(ch) {
            if !result.is_empty() && !result.ends_with('_') {
                result.push('_');
            }
            prev_lower = false;
        } else {
            result.push(ch);
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }

    result
}

/// Go package identifier: lowercase alphanumerics only.
pub fn go_package_ident(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pascal_case() {
        assert_eq!(pascal_case("echo"), "Echo");
        assert_eq!(pascal_case("bar_baz"), "BarBaz");
        assert_eq!(pascal_case("multi-word.name"), "MultiWordName");
        assert_eq!(pascal_case("EchoEcho"), "EchoEcho");
        assert_eq!(pascal_case(""), "");
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("echo"), "echo");
        assert_eq!(camel_case("Bar_baz"), "barBaz");
        assert_eq!(camel_case("clients/echo"), "clientsEcho");
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("EchoEcho"), "echo_echo");
        assert_eq!(snake_case("bounce"), "bounce");
        assert_eq!(snake_case("bar-baz"), "bar_baz");
        assert_eq!(snake_case("HTTPClient"), "httpclient");
        assert_eq!(snake_case("getV2Thing"), "get_v2_thing");
    }

    #[test]
    fn test_go_package_ident() {
        assert_eq!(go_package_ident("echo-client_v2"), "echoclientv2");
    }
}
