//! Environment variable expansion for configuration strings.

use crate::ConfigError;

/// Expand `${VAR}` and `${VAR:-default}` references in `value`.
///
/// Bare `$VAR` is kept literally. `field` names the configuration key and is
/// only used for error messages.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    // Fast path: no expansion needed
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    shellexpand::env(&escape_bare_dollars(value))
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| ConfigError::EnvVar {
            field: field.to_owned(),
            message: format!("${{{}}} not set", e.var_name),
        })
}

/// Double every `$` not followed by `{`; shellexpand reads `$$` as a literal `$`.
fn escape_bare_dollars(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        escaped.push(c);
        if c == '$' && chars.peek() != Some(&'{') {
            escaped.push('$');
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_value_unchanged() {
        assert_eq!(expand_env("127.0.0.1", "server.host").unwrap(), "127.0.0.1");
    }

    #[test]
    fn test_default_used_when_unset() {
        let value = expand_env("${REFRESH_TEST_SURELY_UNSET:-site}", "watch.root").unwrap();
        assert_eq!(value, "site");
    }

    #[test]
    fn test_missing_variable_names_field() {
        let err = expand_env("${REFRESH_TEST_SURELY_UNSET}", "watch.root").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("watch.root"));
        assert!(message.contains("REFRESH_TEST_SURELY_UNSET"));
    }

    #[test]
    fn test_bare_dollar_kept_literally() {
        assert_eq!(expand_env("$HOME/site", "watch.root").unwrap(), "$HOME/site");
        assert_eq!(
            expand_env("$REFRESH_TEST_SURELY_UNSET/site", "watch.root").unwrap(),
            "$REFRESH_TEST_SURELY_UNSET/site"
        );
    }

    #[test]
    fn test_bare_dollar_kept_next_to_braced_reference() {
        let value = expand_env("$HOME/${REFRESH_TEST_SURELY_UNSET:-site}/$", "watch.root").unwrap();
        assert_eq!(value, "$HOME/site/$");
    }
}
