use super::verdict::{ActionVerdict, RiskLevel};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Upper bound on dangling-symlink hops followed during resolution.
const MAX_LINK_HOPS: u8 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathIntent {
    Read,
    Write,
}

impl PathIntent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// Classifies filesystem paths against a deny-list of system directories and
/// a sensitive-file heuristic. Pure apart from read-only `stat`/`readlink`.
#[derive(Debug, Clone)]
pub struct PathValidator {
    base_dir: PathBuf,
    protected_prefixes: Vec<PathBuf>,
    sensitive_patterns: Vec<String>,
}

impl PathValidator {
    /// Relative paths are resolved against `base_dir`. Each protected prefix
    /// is kept literally and, when it is itself a symlink (e.g. `/etc` ->
    /// `/private/etc`), also under its resolved alias.
    pub fn new(
        base_dir: impl Into<PathBuf>,
        protected_prefixes: &[String],
        sensitive_patterns: &[String],
    ) -> Self {
        let mut prefixes: Vec<PathBuf> = Vec::with_capacity(protected_prefixes.len() * 2);
        for raw in protected_prefixes {
            let expanded = PathBuf::from(shellexpand::tilde(raw).as_ref());
            if let Ok(real) = fs::canonicalize(&expanded)
                && real != expanded
                && !prefixes.contains(&real)
            {
                prefixes.push(real);
            }
            if !prefixes.contains(&expanded) {
                prefixes.push(expanded);
            }
        }

        Self {
            base_dir: base_dir.into(),
            protected_prefixes: prefixes,
            sensitive_patterns: sensitive_patterns
                .iter()
                .map(|p| p.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Absolute, lexically normalized form of `raw` (tilde expanded, no `.`/`..`).
    pub fn absolutize(&self, raw: &str) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(raw).as_ref());
        let joined = if expanded.is_absolute() {
            expanded
        } else {
            self.base_dir.join(expanded)
        };
        normalize_lexically(&joined)
    }

    pub fn classify(&self, raw: &str, intent: PathIntent) -> ActionVerdict {
        if raw.trim().is_empty() {
            return ActionVerdict::blocked("invalid path: empty");
        }
        if raw.contains('\0') {
            return ActionVerdict::blocked("invalid path: contains NUL byte");
        }

        let absolute = self.absolutize(raw);
        if let Some(prefix) = self.protected_prefix_of(&absolute) {
            return blocked_in(prefix, intent);
        }

        let real = match resolve_real(&absolute, MAX_LINK_HOPS) {
            Ok(real) => real,
            Err(error) => {
                return ActionVerdict::blocked(format!(
                    "invalid path: cannot resolve {}: {error}",
                    absolute.display()
                ));
            }
        };
        if let Some(prefix) = self.protected_prefix_of(&real) {
            return blocked_in(prefix, intent);
        }

        if intent == PathIntent::Write
            && (self.is_sensitive(&absolute) || self.is_sensitive(&real))
        {
            let name = real
                .file_name()
                .map_or_else(|| real.display().to_string(), |n| n.to_string_lossy().into_owned());
            return ActionVerdict::confirm(
                format!("writing sensitive file '{name}' that may contain credentials or secrets"),
                RiskLevel::High,
            );
        }

        ActionVerdict::Allowed
    }

    /// Whether a write to `raw` hits the sensitive-file heuristic. Used for
    /// permission subject keys; does not consult the deny-list.
    pub fn is_sensitive_path(&self, raw: &str) -> bool {
        let absolute = self.absolutize(raw);
        let real = resolve_real(&absolute, MAX_LINK_HOPS).unwrap_or_else(|_| absolute.clone());
        self.is_sensitive(&absolute) || self.is_sensitive(&real)
    }

    fn protected_prefix_of(&self, path: &Path) -> Option<&Path> {
        let lowered = PathBuf::from(path.to_string_lossy().to_ascii_lowercase());
        self.protected_prefixes
            .iter()
            .find(|prefix| {
                path.starts_with(prefix)
                    || lowered.starts_with(prefix.to_string_lossy().to_ascii_lowercase())
            })
            .map(PathBuf::as_path)
    }

    fn is_sensitive(&self, path: &Path) -> bool {
        let full = path.to_string_lossy().to_ascii_lowercase();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        self.sensitive_patterns.iter().any(|pattern| {
            if pattern.contains('/') {
                full.contains(pattern.as_str())
            } else {
                name.contains(pattern.as_str())
            }
        })
    }
}

fn blocked_in(prefix: &Path, intent: PathIntent) -> ActionVerdict {
    ActionVerdict::blocked(format!(
        "access denied: cannot {} in system directory {}",
        intent.as_str(),
        prefix.display()
    ))
}

/// Resolve `.` and `..` without touching the filesystem. `..` never climbs above root.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// Real location a write to `path` would land on.
///
/// Existing paths are canonicalized. Dangling symlinks are followed through
/// their target. Paths that do not exist yet resolve their nearest existing
/// ancestor and re-append the missing tail.
fn resolve_real(path: &Path, hops: u8) -> io::Result<PathBuf> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => match fs::canonicalize(path) {
            Ok(real) => Ok(real),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                if hops == 0 {
                    return Err(io::Error::other("too many levels of symbolic links"));
                }
                let target = fs::read_link(path)?;
                let parent = path.parent().unwrap_or_else(|| Path::new("/"));
                resolve_real(&normalize_lexically(&parent.join(target)), hops - 1)
            }
            Err(error) => Err(error),
        },
        Ok(_) => fs::canonicalize(path),
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            let mut missing = Vec::new();
            let mut current = path;
            loop {
                let (Some(name), Some(parent)) = (current.file_name(), current.parent()) else {
                    return Ok(path.to_path_buf());
                };
                missing.push(name.to_os_string());
                match fs::symlink_metadata(parent) {
                    Ok(_) => {
                        let mut real = resolve_real(parent, hops)?;
                        for part in missing.iter().rev() {
                            real.push(part);
                        }
                        return Ok(real);
                    }
                    Err(error) if error.kind() == io::ErrorKind::NotFound => current = parent,
                    Err(error) => return Err(error),
                }
            }
        }
        Err(error) => Err(error),
    }
}
