//! `${VAR}` placeholder expansion for TOML configuration files.

use thiserror::Error;

/// Placeholder expansion failure. Line numbers are 1-based.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvExpandError {
    /// `${` without a closing `}` on the same line.
    #[error("Unclosed environment variable placeholder on line {0}")]
    Unclosed(usize),

    /// `${}`.
    #[error("Empty environment variable name on line {0}")]
    EmptyName(usize),

    /// Referenced variable is not set (or not unicode).
    #[error("Environment variable '{name}' is not set (referenced on line {line})")]
    Unset {
        /// Variable name
        name: String,
        /// Line of the reference
        line: usize,
    },
}

/// Expand `${VAR_NAME}` placeholders from the process environment.
///
/// Placeholders inside `#` comments are left untouched; a `#` inside a quoted string
/// does not start a comment.
pub fn expand_env_vars(input: &str) -> Result<String, EnvExpandError> {
    let mut result = String::with_capacity(input.len());

    for (idx, line) in input.split_inclusive('\n').enumerate() {
        let line_no = idx + 1;
        let (code, comment) = split_comment(line);
        let mut rest = code;

        while let Some(start) = rest.find("${") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];

            let end = after.find('}').ok_or(EnvExpandError::Unclosed(line_no))?;
            let name = &after[..end];
            if name.is_empty() {
                return Err(EnvExpandError::EmptyName(line_no));
            }

            let value = std::env::var(name).map_err(|_| EnvExpandError::Unset {
                name: name.to_string(),
                line: line_no,
            })?;
            result.push_str(&value);
            rest = &after[end + 1..];
        }

        result.push_str(rest);
        result.push_str(comment);
    }

    Ok(result)
}

/// Split a TOML line into code and trailing comment, honoring basic and literal strings.
fn split_comment(line: &str) -> (&str, &str) {
    let mut in_double = false;
    let mut in_single = false;
    let mut escaped = false;

    for (i, ch) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_double => escaped = true,
            '"' if !in_single => in_double = !in_double,
            '\'' if !in_double => in_single = !in_single,
            '#' if !in_double && !in_single => return line.split_at(i),
            _ => {}
        }
    }

    (line, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_in_strings_not_comments() {
        std::env::set_var("FLEET_CORE_TEST_DB_URL", "sqlite://from-env.db");

        let input = "url = \"${FLEET_CORE_TEST_DB_URL}\" # ${NOT_EXPANDED}\n";
        assert_eq!(
            expand_env_vars(input).unwrap(),
            "url = \"sqlite://from-env.db\" # ${NOT_EXPANDED}\n"
        );

        std::env::remove_var("FLEET_CORE_TEST_DB_URL");
    }

    #[test]
    fn test_hash_inside_string_is_not_a_comment() {
        std::env::set_var("FLEET_CORE_TEST_HOST", "10.0.0.1");

        let input = "host = \"#${FLEET_CORE_TEST_HOST}\"\nlabel = '#x' # ${SKIPPED}\n";
        assert_eq!(
            expand_env_vars(input).unwrap(),
            "host = \"#10.0.0.1\"\nlabel = '#x' # ${SKIPPED}\n"
        );

        std::env::remove_var("FLEET_CORE_TEST_HOST");
    }

    #[test]
    fn test_expand_errors() {
        assert_eq!(
            expand_env_vars("a = 1\nurl = \"${FLEET_CORE_TEST_UNSET}\""),
            Err(EnvExpandError::Unset {
                name: "FLEET_CORE_TEST_UNSET".to_string(),
                line: 2
            })
        );
        assert_eq!(
            expand_env_vars("url = \"${UNCLOSED\""),
            Err(EnvExpandError::Unclosed(1))
        );
        assert_eq!(
            expand_env_vars("url = \"${}\""),
            Err(EnvExpandError::EmptyName(1))
        );
    }

    #[test]
    fn test_no_placeholders_is_identity() {
        let input = "[server]\nport = 3100\n";
        assert_eq!(expand_env_vars(input).unwrap(), input);
    }
}
