//! Archive paths
//!
//! An [`Apath`] is a stored file path broken up into its components. Paths
//! are compared component by component, so the ordering does not depend on
//! the platform separator: `a/b` sorts before `a.b` even though a raw string
//! comparison puts `a.b` first.
//!
//! Apaths are always relative. Components are valid UTF-8, non-empty, never
//! `.` or `..`, and contain no separator or NUL characters.
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::problem::{Problem, ProblemResult, Result};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Apath(Vec<String>);

impl Apath {
    /// Break a filesystem path into components.
    ///
    /// Root, prefix and `.` components are dropped so that `/home/x` and
    /// `./home/x` both become `home/x`. A `..` component can't be expressed
    /// and is rejected.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Apath> {
        let path = path.as_ref();
        let mut parts = Vec::new();

        for component in path.components() {
            match component {
                Component::Prefix(_) | Component::RootDir | Component::CurDir => (),
                Component::ParentDir => {
                    return Problem::new("path", "component", ProblemResult::BadPath)
                        .path(path)
                        .os_error("parent directory component")
                        .signal();
                }
                Component::Normal(part) => match part.to_str() {
                    Some(s) => parts.push(s.to_string()),
                    None => {
                        return Problem::new("path", "component", ProblemResult::BadPath)
                            .path(path)
                            .os_error("not valid UTF-8")
                            .signal();
                    }
                },
            }
        }

        if parts.is_empty() {
            return Problem::new("path", "component", ProblemResult::BadPath)
                .path(path)
                .os_error("no components")
                .signal();
        }
        Ok(Apath(parts))
    }

    /// Build directly from components, checking each of them.
    pub fn from_components<I, S>(components: I) -> Option<Apath>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let apath = Apath(components.into_iter().map(Into::into).collect());
        if apath.is_valid() {
            Some(apath)
        } else {
            None
        }
    }

    pub fn components(&self) -> &[String] {
        &self.0
    }

    /// True if this could have been produced by [`Apath::from_path`].
    ///
    /// Paths read back from an archive must be checked before they are joined
    /// onto a restore directory.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self.0.iter().all(|part| {
                !part.is_empty()
                    && part != "."
                    && part != ".."
                    && !part.contains(['/', '\\', '\0'])
            })
    }

    pub fn to_path_buf(&self) -> PathBuf {
        self.0.iter().collect()
    }

    /// Join this apath under a base directory.
    pub fn below<P: AsRef<Path>>(&self, base: P) -> PathBuf {
        base.as_ref().join(self.to_path_buf())
    }
}

impl fmt::Display for Apath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}
