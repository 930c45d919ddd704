//! Query string construction for provider urls.

use indexmap::IndexMap;

/// Append `params` to `path` as a query string, in map order.
///
/// Values are written verbatim: provider parameters are either pre-encoded or
/// simple tokens.
pub fn build_uri(path: &str, params: &IndexMap<String, String>) -> String {
    if params.is_empty() {
        return path.to_string();
    }

    let query = params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    format!("{path}?{query}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_params_return_path() {
        let path = "https://accounts.google.com/o/oauth2/v2/auth";
        assert_eq!(build_uri(path, &IndexMap::new()), path);
    }

    #[test]
    fn test_params_keep_insertion_order() {
        let mut params = IndexMap::new();
        params.insert("b".to_string(), "2".to_string());
        params.insert("a".to_string(), "1".to_string());

        assert_eq!(build_uri("https://x.test/auth", &params), "https://x.test/auth?b=2&a=1");
    }

    #[test]
    fn test_values_are_not_encoded() {
        let mut params = IndexMap::new();
        params.insert("scope".to_string(), "openid email".to_string());
        params.insert("fields".to_string(), "id,picture{url}".to_string());

        let uri = build_uri("https://x.test/me", &params);
        assert_eq!(uri, "https://x.test/me?scope=openid email&fields=id,picture{url}");
        assert!(!uri.ends_with('&'));
    }
}
