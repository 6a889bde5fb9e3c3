//! Passthrough errors.
//!
//! `io::Error` is classified on the way in so that callers can match on
//! outcomes (above all "already exists") instead of inspecting raw codes.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VfsError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The create target is taken, whatever kind of entry holds it.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("directory not empty: {0}")]
    NotEmpty(String),

    /// A relative path resolved outside the backend root.
    #[error("path escapes root: {0}")]
    PathEscapesRoot(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("no space left on device")]
    NoSpace,

    #[error("file name too long")]
    NameTooLong,

    /// Anything the classification above does not cover; keeps its errno.
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// Backend-internal failure with no OS error behind it.
    #[error("backend failure: {0}")]
    Backend(String),
}

impl VfsError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    pub fn not_empty(path: impl Into<String>) -> Self {
        Self::NotEmpty(path.into())
    }

    pub fn path_escapes_root(path: impl Into<String>) -> Self {
        Self::PathEscapesRoot(path.into())
    }

    pub fn invalid_path(reason: impl Into<String>) -> Self {
        Self::InvalidPath(reason.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// The collision outcome of `create_dir`.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, VfsError::AlreadyExists(_))
    }

    /// errno to hand back to the hosting filesystem callback.
    pub fn to_errno(&self) -> i32 {
        match self {
            VfsError::NotFound(_) => libc::ENOENT,
            VfsError::AlreadyExists(_) => libc::EEXIST,
            VfsError::PermissionDenied(_) | VfsError::PathEscapesRoot(_) => libc::EACCES,
            VfsError::NotADirectory(_) => libc::ENOTDIR,
            VfsError::IsADirectory(_) => libc::EISDIR,
            VfsError::NotEmpty(_) => libc::ENOTEMPTY,
            VfsError::InvalidPath(_) => libc::EINVAL,
            VfsError::NoSpace => libc::ENOSPC,
            VfsError::NameTooLong => libc::ENAMETOOLONG,
            VfsError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            VfsError::Backend(_) => libc::EIO,
        }
    }
}

impl From<io::Error> for VfsError {
    fn from(e: io::Error) -> Self {
        match e.raw_os_error() {
            Some(libc::ENAMETOOLONG) => return VfsError::NameTooLong,
            Some(libc::ENOSPC) => return VfsError::NoSpace,
            _ => {}
        }
        let msg = e.to_string();
        match e.kind() {
            io::ErrorKind::NotFound => VfsError::NotFound(msg),
            io::ErrorKind::AlreadyExists => VfsError::AlreadyExists(msg),
            io::ErrorKind::PermissionDenied => VfsError::PermissionDenied(msg),
            io::ErrorKind::NotADirectory => VfsError::NotADirectory(msg),
            io::ErrorKind::IsADirectory => VfsError::IsADirectory(msg),
            io::ErrorKind::DirectoryNotEmpty => VfsError::NotEmpty(msg),
            io::ErrorKind::StorageFull => VfsError::NoSpace,
            _ => VfsError::Io(e),
        }
    }
}

pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_exists_is_distinguishable() {
        let err = VfsError::from(io::Error::from(io::ErrorKind::AlreadyExists));
        assert!(err.is_already_exists());
        assert_eq!(err.to_errno(), libc::EEXIST);

        let err = VfsError::from(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(!err.is_already_exists());
        assert_eq!(err.to_errno(), libc::EACCES);
    }

    #[test]
    fn test_raw_os_errors() {
        let err = VfsError::from(io::Error::from_raw_os_error(libc::ENAMETOOLONG));
        assert!(matches!(err, VfsError::NameTooLong));

        let err = VfsError::from(io::Error::from_raw_os_error(libc::ENOSPC));
        assert_eq!(err.to_errno(), libc::ENOSPC);

        let err = VfsError::from(io::Error::from_raw_os_error(libc::EROFS));
        assert_eq!(err.to_errno(), libc::EROFS);
    }

    #[test]
    fn test_not_empty_classified() {
        let err = VfsError::from(io::Error::from_raw_os_error(libc::ENOTEMPTY));
        assert!(matches!(err, VfsError::NotEmpty(_)));
        assert_eq!(err.to_errno(), libc::ENOTEMPTY);
    }

    #[test]
    fn test_raw_eexist_classified() {
        let err = VfsError::from(io::Error::from_raw_os_error(libc::EEXIST));
        assert!(err.is_already_exists());
    }
}
