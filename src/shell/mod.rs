//! Shell syntax: rendering export plans and hook scripts.

mod hook;

use std::fmt;
use std::str::FromStr;

pub use hook::hook_script;

use crate::ports::ShellRenderer;

/// Shells autoenv can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    Bash,
    Zsh,
}

impl Shell {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::Zsh => "zsh",
        }
    }
}

impl fmt::Display for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unsupported shell: {0} (supported: bash, zsh)")]
pub struct UnsupportedShell(pub String);

impl FromStr for Shell {
    type Err = UnsupportedShell;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bash" => Ok(Self::Bash),
            "zsh" => Ok(Self::Zsh),
            other => Err(UnsupportedShell(other.to_string())),
        }
    }
}

/// `export NAME='value'` / `unset NAME`, understood by bash and zsh alike.
#[derive(Debug, Default, Clone, Copy)]
pub struct PosixRenderer;

impl PosixRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl ShellRenderer for PosixRenderer {
    fn format_unsets(&self, _shell: Shell, names: &[&str]) -> String {
        let mut sorted = names.to_vec();
        sorted.sort_unstable();

        let mut out = String::new();
        for name in sorted {
            out.push_str("unset ");
            out.push_str(name);
            out.push('\n');
        }
        out
    }

    fn format_exports(&self, _shell: Shell, vars: &[(&str, &str)]) -> String {
        let mut sorted = vars.to_vec();
        sorted.sort_unstable_by(|a, b| a.0.cmp(b.0));

        let mut out = String::new();
        for (name, value) in sorted {
            out.push_str(&format!("export {}='{}'\n", name, single_quote_escape(value)));
        }
        out
    }
}

/// Escape a value for use inside single quotes.
pub fn single_quote_escape(value: &str) -> String {
    value.replace('\'', r"'\''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::ExportPlan;

    #[test]
    fn parses_supported_shells() {
        assert_eq!("bash".parse::<Shell>().unwrap(), Shell::Bash);
        assert_eq!("zsh".parse::<Shell>().unwrap(), Shell::Zsh);
        let err = "fish".parse::<Shell>().unwrap_err();
        assert!(err.to_string().contains("fish"));
    }

    #[test]
    fn exports_are_sorted_and_quoted() {
        let out = PosixRenderer.format_exports(Shell::Zsh, &[("FOO", "1"), ("BAR", "it's")]);
        assert_eq!(out, "export BAR='it'\\''s'\nexport FOO='1'\n");
    }

    #[test]
    fn unsets_are_sorted() {
        let out = PosixRenderer.format_unsets(Shell::Bash, &["FOO", "BAR"]);
        assert_eq!(out, "unset BAR\nunset FOO\n");
    }

    #[test]
    fn render_puts_unsets_before_exports() {
        let mut plan = ExportPlan::default();
        plan.deactivate.insert("OLD".to_string());
        plan.activate.insert("A".to_string(), "x".to_string());

        let out = PosixRenderer.render(Shell::Bash, &plan);

        assert_eq!(out, "unset OLD\nexport A='x'\n");
    }

    #[test]
    fn empty_plan_renders_nothing() {
        assert_eq!(PosixRenderer.render(Shell::Zsh, &ExportPlan::default()), "");
    }
}
