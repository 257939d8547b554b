//! Error types for the bot core

use std::path::PathBuf;
use thiserror::Error;

/// Ignore-list mutations that the caller asked for but that make no sense
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("user {0} is already ignored")]
    AlreadyIgnored(String),

    #[error("user {0} is not on the ignore list")]
    NotIgnored(String),
}

/// Failures reading or writing the ignore-list file.
///
/// A missing file is not an error; it loads as an empty list.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("failed to read ignore list '{}': {}", .path.display(), .source)]
    Read { path: PathBuf, source: std::io::Error },

    #[error("ignore list '{}' is malformed: {}", .path.display(), .source)]
    Malformed { path: PathBuf, source: serde_json::Error },

    #[error("failed to write ignore list '{}': {}", .path.display(), .source)]
    Write { path: PathBuf, source: std::io::Error },
}

#[derive(Error, Debug)]
pub enum DictionaryError {
    #[error("failed to read dictionary '{}': {}", .path.display(), .source)]
    Read { path: PathBuf, source: std::io::Error },

    #[error("dictionary '{}' is malformed: {}", .path.display(), .source)]
    MalformedJson { path: PathBuf, source: serde_json::Error },

    #[error("dictionary line {line}: invalid frequency '{value}'")]
    InvalidFrequency { line: usize, value: String },

    #[error("built-in dictionary is corrupt: {0}")]
    Builtin(#[source] std::io::Error),

    #[error("dictionary is empty")]
    Empty,
}
