use std::collections::BTreeMap;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use thiserror::Error;

use crate::models::EnvSnapshot;
use crate::ports::EnvLoader;

/// Name of the configuration file looked up in each directory.
pub const ENV_FILE_NAME: &str = ".env";

/// Failures reading a `.env` that exists.
#[derive(Debug, Error)]
pub enum EnvFileError {
    #[error(
        "parse {}: malformed entry{}",
        .path.display(),
        .line.map(|l| format!(" at line {l}")).unwrap_or_default()
    )]
    Parse { path: PathBuf, line: Option<usize> },

    #[error("read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Loads `.env` files with dotenv syntax.
#[derive(Debug, Default, Clone, Copy)]
pub struct DotenvLoader;

impl DotenvLoader {
    pub fn new() -> Self {
        Self
    }
}

impl EnvLoader for DotenvLoader {
    fn load(&self, dir: &Path) -> Result<Option<EnvSnapshot>, EnvFileError> {
        let file = dir.join(ENV_FILE_NAME);

        let meta = match fs::metadata(&file) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(EnvFileError::Io { path: file, source }),
        };
        if !meta.is_file() {
            tracing::debug!("{} is not a regular file, ignoring", file.display());
            return Ok(None);
        }

        let mtime = mtime_nanos(&meta).map_err(|source| EnvFileError::Io {
            path: file.clone(),
            source,
        })?;
        let content = fs::read_to_string(&file).map_err(|source| EnvFileError::Io {
            path: file.clone(),
            source,
        })?;
        let values = parse(&file, &content)?;

        Ok(Some(EnvSnapshot {
            origin: dir.to_path_buf(),
            file,
            mtime,
            values,
        }))
    }
}

/// Parse `.env` content. `file` is only used for error reporting.
///
/// `$NAME` and `${NAME}` resolve against earlier keys of the same file and
/// nothing else; unknown names expand to an empty string. The invoking
/// process inherits whatever the shell has exported, so its environment is
/// never consulted.
pub fn parse(file: &Path, content: &str) -> Result<BTreeMap<String, String>, EnvFileError> {
    let marked = mark_references(content);
    let mut values = BTreeMap::new();

    for item in dotenvy::from_read_iter(marked.as_bytes()) {
        let (name, raw) = item.map_err(|e| parse_error(file, &marked, e))?;
        if !is_shell_identifier(&name) {
            tracing::warn!(
                "{}: skipping {:?}, not a valid shell variable name",
                file.display(),
                name
            );
            continue;
        }
        let value = expand(&raw, &values);
        values.insert(name, value);
    }

    Ok(values)
}

// Stands in for every `$` dotenvy would substitute, so that it never does.
const REFERENCE: char = '\u{E000}';

/// Replace each substitutable `$` with [`REFERENCE`], following dotenvy's
/// quoting: nothing inside single quotes, nothing escaped, nothing in comments.
fn mark_references(content: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum Quote {
        None,
        Single,
        Double,
    }

    let mut out = String::with_capacity(content.len());
    let mut quote = Quote::None;
    let mut prev = '\n';
    let mut chars = content.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Quote::Single, '\'') => quote = Quote::None,
            (Quote::Single, _) => {}
            (_, '\\') => {
                out.push(c);
                if let Some(next) = chars.next() {
                    out.push(next);
                    prev = next;
                }
                continue;
            }
            (_, '$') => {
                out.push(REFERENCE);
                prev = c;
                continue;
            }
            (Quote::Double, '"') => quote = Quote::None,
            (Quote::Double, _) => {}
            (Quote::None, '\'') => quote = Quote::Single,
            (Quote::None, '"') => quote = Quote::Double,
            (Quote::None, '#') if prev.is_whitespace() => {
                out.push(c);
                for next in chars.by_ref() {
                    out.push(next);
                    if next == '\n' {
                        break;
                    }
                }
                prev = '\n';
                continue;
            }
            _ => {}
        }
        out.push(c);
        prev = c;
    }

    out
}

/// Resolve marked references in one value against the keys seen so far.
fn expand(raw: &str, known: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != REFERENCE {
            out.push(c);
            continue;
        }

        let name: String = if chars.next_if_eq(&'{').is_some() {
            chars.by_ref().take_while(|&c| c != '}').collect()
        } else {
            let mut name = String::new();
            while let Some(c) = chars.next_if(|c| c.is_ascii_alphanumeric() || *c == '_') {
                name.push(c);
            }
            if name.is_empty() {
                // A lone `$` is just a dollar sign
                out.push('$');
                continue;
            }
            name
        };

        if let Some(value) = known.get(&name) {
            out.push_str(value);
        }
    }

    out
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_shell_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_error(file: &Path, content: &str, err: dotenvy::Error) -> EnvFileError {
    match err {
        dotenvy::Error::Io(source) => EnvFileError::Io {
            path: file.to_path_buf(),
            source,
        },
        dotenvy::Error::LineParse(line, _) => EnvFileError::Parse {
            path: file.to_path_buf(),
            line: locate_line(content, &line),
        },
        _ => EnvFileError::Parse {
            path: file.to_path_buf(),
            line: None,
        },
    }
}

// dotenvy reports the offending text, not its position in the file.
fn locate_line(content: &str, offending: &str) -> Option<usize> {
    let first = offending.lines().next()?.trim();
    if first.is_empty() {
        return None;
    }
    content
        .lines()
        .position(|l| l.trim() == first)
        .map(|idx| idx + 1)
}

fn mtime_nanos(meta: &Metadata) -> io::Result<i64> {
    let modified = meta.modified()?;
    let nanos = match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
        Err(e) => -i64::try_from(e.duration().as_nanos()).unwrap_or(i64::MAX),
    };
    Ok(nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DotenvLoader.load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn loads_values_and_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(ENV_FILE_NAME);
        fs::write(&file, "# comment\nFOO=1\n\nexport BAR='two words'\nBAZ=\"a\\nb\"\n").unwrap();
        let when = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        fs::File::options()
            .write(true)
            .open(&file)
            .unwrap()
            .set_modified(when)
            .unwrap();

        let snapshot = DotenvLoader.load(dir.path()).unwrap().unwrap();

        assert_eq!(snapshot.origin, dir.path());
        assert_eq!(snapshot.file, file);
        assert_eq!(snapshot.mtime, 1_700_000_000_000_000_000);
        assert_eq!(snapshot.values["FOO"], "1");
        assert_eq!(snapshot.values["BAR"], "two words");
        assert_eq!(snapshot.values["BAZ"], "a\nb");
        assert_eq!(snapshot.values.len(), 3);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(ENV_FILE_NAME), "FOO=1\nBAR BAZ\n").unwrap();

        let err = DotenvLoader.load(dir.path()).unwrap_err();
        match err {
            EnvFileError::Parse { path, line } => {
                assert!(path.ends_with(ENV_FILE_NAME));
                assert_eq!(line, Some(2));
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn later_definition_wins() {
        let values = parse(Path::new(".env"), "FOO=1\nFOO=2\n").unwrap();
        assert_eq!(values["FOO"], "2");
    }

    #[test]
    fn skips_names_the_shell_cannot_export() {
        let values = parse(Path::new(".env"), "GOOD=1\nnot.valid=2\n").unwrap();
        assert_eq!(values.len(), 1);
        assert!(values.contains_key("GOOD"));
    }

    #[test]
    fn references_resolve_from_the_file_not_the_process() {
        std::env::set_var("AUTOENV_LOADER_BASE", "from-shell");
        std::env::set_var("AUTOENV_LOADER_ONLY_IN_SHELL", "leaked");

        let values = parse(
            Path::new(".env"),
            "AUTOENV_LOADER_BASE=file\n\
             URL=${AUTOENV_LOADER_BASE}/x\n\
             BARE=$AUTOENV_LOADER_BASE\n\
             OTHER=$AUTOENV_LOADER_ONLY_IN_SHELL/y\n",
        )
        .unwrap();

        assert_eq!(values["URL"], "file/x");
        assert_eq!(values["BARE"], "file");
        assert_eq!(values["OTHER"], "/y");
    }

    #[test]
    fn later_keys_see_the_latest_earlier_value() {
        let values = parse(Path::new(".env"), "A=1\nB=$A\nA=2\nC=$A\nD=$LATER\nLATER=x\n").unwrap();
        assert_eq!(values["B"], "1");
        assert_eq!(values["C"], "2");
        assert_eq!(values["D"], "");
    }

    #[test]
    fn quoting_and_escapes_keep_dollars_literal() {
        let content = r#"# it's a comment with $A
A=1 # don't expand $A here
B='$A'
C="\$A"
D="$A-${A}"
E=5$
"#;
        let values = parse(Path::new(".env"), content).unwrap();

        assert_eq!(values["A"], "1");
        assert_eq!(values["B"], "$A");
        assert_eq!(values["C"], "$A");
        assert_eq!(values["D"], "1-1");
        assert_eq!(values["E"], "5$");
    }

    #[test]
    fn shell_identifiers() {
        assert!(is_shell_identifier("FOO"));
        assert!(is_shell_identifier("_foo9"));
        assert!(!is_shell_identifier("9FOO"));
        assert!(!is_shell_identifier("A-B"));
        assert!(!is_shell_identifier(""));
    }
}
