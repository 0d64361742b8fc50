// src/results/mod.rs

//! Result-file sets and the copy/append primitives used by exports.
//!
//! An operation declares the files it is expected to produce. After it has
//! run, each expected path is either [`ResultPath::Present`] or
//! [`ResultPath::Missing`], so a caller's destination list can be zipped
//! against it by position even when some outputs were not produced.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// One entry of an operation's result list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultPath {
    Present(PathBuf),
    Missing,
}

impl ResultPath {
    /// `Present` if `path` is an existing file, `Missing` otherwise.
    pub fn probe(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_file() {
            ResultPath::Present(path)
        } else {
            ResultPath::Missing
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            ResultPath::Present(p) => Some(p),
            ResultPath::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, ResultPath::Missing)
    }
}

/// Ordered, index-aligned result list of one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    paths: Vec<ResultPath>,
}

impl ResultSet {
    pub fn new(paths: Vec<ResultPath>) -> Self {
        Self { paths }
    }

    /// Probe every expected path on disk.
    pub fn from_expected<I, P>(expected: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: expected.into_iter().map(|p| ResultPath::probe(p)).collect(),
        }
    }

    pub fn paths(&self) -> &[ResultPath] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        self.paths.iter().filter(|p| p.is_missing()).count()
    }

    /// Copy each result onto the destination at the same position.
    ///
    /// Every pair is attempted. Returns `false` if any pair failed, including
    /// positions where one list is longer than the other or the source is
    /// [`ResultPath::Missing`].
    pub fn copy_to<P: AsRef<Path>>(&self, dests: &[P]) -> bool {
        let pairs = self.paths.len().max(dests.len());
        let mut all_ok = true;

        for i in 0..pairs {
            let source = self.paths.get(i).unwrap_or(&ResultPath::Missing);
            let ok = match (source, dests.get(i)) {
                (ResultPath::Present(src), Some(dest)) => copy_file(src, dest.as_ref()),
                (ResultPath::Missing, Some(dest)) => {
                    warn!(index = i, dest = ?dest.as_ref(), "no result to export at this position");
                    false
                }
                (_, None) => {
                    debug!(index = i, "result has no destination");
                    false
                }
            };
            all_ok &= ok;
        }

        all_ok
    }
}

/// Copy `src` to `dest`, overwriting it. Returns `false` on any failure.
pub fn copy_file(src: &Path, dest: &Path) -> bool {
    if !src.is_file() {
        debug!(src = ?src, "copy source does not exist");
        return false;
    }
    match ensure_parent(dest).and_then(|_| fs::copy(src, dest)) {
        Ok(bytes) => {
            debug!(src = ?src, dest = ?dest, bytes, "copied file");
            true
        }
        Err(e) => {
            warn!(src = ?src, dest = ?dest, error = %e, "copy failed");
            false
        }
    }
}

/// Append the contents of `src` to `dest`, creating `dest` if needed.
pub fn append_file(src: &Path, dest: &Path) -> bool {
    if !src.is_file() {
        debug!(src = ?src, "append source does not exist");
        return false;
    }
    let result = (|| -> io::Result<u64> {
        ensure_parent(dest)?;
        let mut input = fs::File::open(src)?;
        let mut output = OpenOptions::new().create(true).append(true).open(dest)?;
        io::copy(&mut input, &mut output)
    })();

    match result {
        Ok(bytes) => {
            debug!(src = ?src, dest = ?dest, bytes, "appended file");
            true
        }
        Err(e) => {
            warn!(src = ?src, dest = ?dest, error = %e, "append failed");
            false
        }
    }
}

fn ensure_parent(dest: &Path) -> io::Result<()> {
    match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn probe_marks_absent_files_missing() {
        let dir = tempdir().unwrap();
        let present = dir.path().join("a");
        fs::write(&present, "x").unwrap();

        let set = ResultSet::from_expected([present.clone(), dir.path().join("b")]);
        assert_eq!(set.paths()[0], ResultPath::Present(present));
        assert!(set.paths()[1].is_missing());
        assert_eq!(set.missing_count(), 1);
    }

    #[test]
    fn copy_to_is_best_effort() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let c = dir.path().join("c");
        fs::write(&a, "A").unwrap();
        fs::write(&c, "C").unwrap();

        let set = ResultSet::new(vec![
            ResultPath::Present(a),
            ResultPath::Missing,
            ResultPath::Present(c),
        ]);
        let out = dir.path().join("out");
        let dests = [out.join("a"), out.join("b"), out.join("c")];

        assert!(!set.copy_to(&dests));
        assert_eq!(fs::read_to_string(&dests[0]).unwrap(), "A");
        assert!(!dests[1].exists());
        assert_eq!(fs::read_to_string(&dests[2]).unwrap(), "C");
    }

    #[test]
    fn append_concatenates() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        fs::write(&src, "two\n").unwrap();
        fs::write(&dest, "one\n").unwrap();

        assert!(append_file(&src, &dest));
        assert_eq!(fs::read_to_string(&dest).unwrap(), "one\ntwo\n");
        assert!(!append_file(&dir.path().join("nope"), &dest));
    }
}
