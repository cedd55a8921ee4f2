use anyhow::{bail, Result};

use crate::models::GITHUB_DEFAULT_OWNER;

/// Turn a user-supplied target into `owner/repo`.
///
/// Accepts `https://github.com/owner/repo(.git)`, `github.com/owner/repo`,
/// `owner/repo`, or a bare `repo` combined with `default_owner`.
pub fn resolve_repo(target: &str, default_owner: Option<&str>) -> Result<String> {
    let trimmed = target.trim();
    let stripped = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let stripped = stripped.strip_prefix("github.com/").unwrap_or(stripped);
    let stripped = stripped.trim_end_matches('/');
    let stripped = stripped.strip_suffix(".git").unwrap_or(stripped);

    let parts: Vec<&str> = stripped.split('/').collect();
    match parts.as_slice() {
        [owner, repo] if !owner.is_empty() && !repo.is_empty() => Ok(format!("{owner}/{repo}")),
        [repo] if !repo.is_empty() => match default_owner.filter(|o| !o.is_empty()) {
            Some(owner) => Ok(format!("{owner}/{repo}")),
            None => bail!(
                "{target:?} has no owner; pass owner/repo or run \
                 `autoenv configure set {GITHUB_DEFAULT_OWNER} <owner>`"
            ),
        },
        _ => bail!("invalid repository target {target:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_urls_and_slugs() {
        for target in [
            "https://github.com/acme/api",
            "https://github.com/acme/api.git",
            "github.com/acme/api",
            "acme/api",
            "acme/api/",
        ] {
            assert_eq!(resolve_repo(target, None).unwrap(), "acme/api", "{target}");
        }
    }

    #[test]
    fn bare_repo_uses_default_owner() {
        assert_eq!(resolve_repo("api", Some("acme")).unwrap(), "acme/api");
        assert_eq!(resolve_repo("other/api", Some("acme")).unwrap(), "other/api");
    }

    #[test]
    fn bare_repo_without_owner_is_an_error() {
        let err = resolve_repo("api", None).unwrap_err();
        assert!(err.to_string().contains(GITHUB_DEFAULT_OWNER));
        assert!(resolve_repo("api", Some("")).is_err());
    }

    #[test]
    fn malformed_targets_are_rejected() {
        assert!(resolve_repo("", Some("acme")).is_err());
        assert!(resolve_repo("a/b/c", None).is_err());
        assert!(resolve_repo("/api", None).is_err());
    }
}
