use crate::application::use_cases::plugins::errors::PluginManagerError;

/// Execution-side options shared by `--exec` and `--verify`.
#[derive(Debug, Clone, Default)]
pub struct ExecuteParams {
    pub params: String,
    pub separator: String,
    pub params_v2: String,
    pub timeout_override_secs: Option<u64>,
    pub run_as: Option<String>,
}

impl ExecuteParams {
    /// `--paramsV2` is split shell-style. Otherwise `--params` has its
    /// separator (default `,`) replaced by spaces and is split the same way.
    pub fn split_args(&self) -> Result<Vec<String>, PluginManagerError> {
        if !self.params_v2.is_empty() {
            return split_shell_words(&self.params_v2);
        }
        let separator = if self.separator.is_empty() {
            ","
        } else {
            self.separator.as_str()
        };
        split_shell_words(&self.params.replace(separator, " "))
    }

    pub fn execution_timeout(&self, fetched_timeout_secs: u64) -> u64 {
        self.timeout_override_secs.unwrap_or(fetched_timeout_secs)
    }
}

/// Arguments that can change a persistent plugin's running state.
const STATE_CHANGING_ARGS: &[&str] = &[
    "--start",
    "--stop",
    "--restart",
    "--install",
    "--uninstall",
    "--upgrade",
];

pub fn changes_plugin_state(args: &[String]) -> bool {
    args.iter().any(|a| STATE_CHANGING_ARGS.contains(&a.as_str()))
}

/// Shell-style word splitting. Unbalanced quotes are rejected.
pub fn split_shell_words(input: &str) -> Result<Vec<String>, PluginManagerError> {
    shlex::split(input).ok_or_else(|| {
        PluginManagerError::ExecuteFailed(format!("Invalid params, unbalanced quotes in [{input}]"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_use_separator() {
        let p = ExecuteParams {
            params: "--start,--verbose".into(),
            ..Default::default()
        };
        assert_eq!(p.split_args().unwrap(), ["--start", "--verbose"]);

        let p = ExecuteParams {
            params: "a|b c".into(),
            separator: "|".into(),
            ..Default::default()
        };
        assert_eq!(p.split_args().unwrap(), ["a", "b", "c"]);
    }

    #[test]
    fn params_v2_wins_and_keeps_quoting() {
        let p = ExecuteParams {
            params: "--ignored".into(),
            params_v2: r#"--name "hello world" --path 'a b' x\ y"#.into(),
            ..Default::default()
        };
        assert_eq!(
            p.split_args().unwrap(),
            ["--name", "hello world", "--path", "a b", "x y"]
        );
    }

    #[test]
    fn empty_params_yield_no_args() {
        assert!(ExecuteParams::default().split_args().unwrap().is_empty());
        assert_eq!(split_shell_words(r#""""#).unwrap(), [""]);
    }

    #[test]
    fn unbalanced_quotes_are_rejected() {
        let p = ExecuteParams {
            params_v2: r#"--name "unterminated"#.into(),
            ..Default::default()
        };
        let err = p.split_args().unwrap_err();
        assert_eq!(err.code_name(), "EXECUTE_FAILED");
    }

    #[test]
    fn detects_state_changing_arguments() {
        assert!(changes_plugin_state(&["--start".to_string()]));
        assert!(!changes_plugin_state(&["--status".to_string()]));
    }
}
