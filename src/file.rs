use std::fmt;
use std::hash::Hash;
use std::time::SystemTime;

/// A handle to a build artifact's path, with observable timestamp state.
///
/// This is an external collaborator (the workflow's filesystem abstraction):
/// the core never assumes a particular backing store. Implementors are
/// expected to be cheap to clone (e.g. an interned path or an `Rc<str>`).
pub trait IoFile: Clone + Eq + Hash + Ord + fmt::Debug + fmt::Display {
    /// Whether the file currently exists.
    fn exists(&self) -> bool;

    /// The file's modification time. Only meaningful when [`exists`] is true.
    ///
    /// [`exists`]: IoFile::exists
    fn mtime(&self) -> Option<SystemTime>;

    /// Whether this file is newer than `t`.
    fn is_newer(&self, t: SystemTime) -> bool {
        self.mtime().is_some_and(|m| m > t)
    }

    /// Make the file read-only.
    fn protect(&self) -> anyhow::Result<()>;

    /// Delete the file.
    fn remove(&self) -> anyhow::Result<()>;
}
