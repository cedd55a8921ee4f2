use super::Shell;

const ZSH_HOOK: &str = r#"_autoenv_hook() {
  eval "$(AUTOENV_SHELL_PID=$$ autoenv export zsh)"
}
typeset -ag precmd_functions
if [[ -z "${precmd_functions[(r)_autoenv_hook]+1}" ]]; then
  precmd_functions=(_autoenv_hook $precmd_functions)
fi
_autoenv_hook
"#;

const BASH_HOOK: &str = r#"_autoenv_hook() {
  local prev_exit=$?
  eval "$(AUTOENV_SHELL_PID=$$ autoenv export bash)"
  return $prev_exit
}
if [[ ";${PROMPT_COMMAND[*]:-};" != *";_autoenv_hook;"* ]]; then
  PROMPT_COMMAND="_autoenv_hook${PROMPT_COMMAND:+;$PROMPT_COMMAND}"
fi
_autoenv_hook
"#;

/// Script to `eval` from the shell's rc file.
///
/// `$$` pins the session to the interactive shell even though `$(...)` runs
/// in a subshell.
pub fn hook_script(shell: Shell) -> &'static str {
    match shell {
        Shell::Zsh => ZSH_HOOK,
        Shell::Bash => BASH_HOOK,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hooks_call_export_for_their_shell() {
        assert!(hook_script(Shell::Zsh).contains("autoenv export zsh"));
        assert!(hook_script(Shell::Bash).contains("autoenv export bash"));
        assert!(hook_script(Shell::Zsh).contains("precmd_functions"));
        assert!(hook_script(Shell::Bash).contains("PROMPT_COMMAND"));
    }
}
