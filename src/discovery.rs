// ABOUTME: Handler program resolution for configured endpoints
// ABOUTME: Resolves absolute paths, relative paths against a handler root, and bare names on PATH
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::types::GatewayError;

/// Resolve a handler program to an executable path
///
/// Resolution order:
/// 1. A name containing a path separator is used as a path, joined onto
///    `handler_root` when relative and a root is given
/// 2. Otherwise, search `PATH` using `which`
///
/// # Errors
///
/// Returns `GatewayError` if the program cannot be found.
pub fn resolve_handler(name: &str, handler_root: Option<&Path>) -> Result<PathBuf, GatewayError> {
    if name.trim().is_empty() {
        return Err(GatewayError::config("handler program is empty"));
    }

    if name.contains(std::path::MAIN_SEPARATOR) {
        let path = match handler_root {
            Some(root) if Path::new(name).is_relative() => root.join(name),
            _ => PathBuf::from(name),
        };
        if path.is_file() {
            debug!(handler = name, path = %path.display(), "Resolved handler path");
            return Ok(path);
        }
        return Err(GatewayError::config(format!(
            "handler program does not exist: {}",
            path.display()
        )));
    }

    which::which(name)
        .map_err(|e| GatewayError::config(format!("handler '{name}' not found on PATH: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_absolute_path() {
        let path = resolve_handler("/bin/sh", None).unwrap();
        assert_eq!(path, PathBuf::from("/bin/sh"));
    }

    #[test]
    fn resolves_bare_name_on_path() {
        let path = resolve_handler("sh", None).unwrap();
        assert!(path.is_absolute());
    }

    #[test]
    fn relative_path_joins_root() {
        let path = resolve_handler("bin/sh", Some(Path::new("/"))).unwrap();
        assert_eq!(path, PathBuf::from("/bin/sh"));
    }

    #[test]
    fn missing_handler_is_config_error() {
        let err = resolve_handler("/nonexistent/handler/xyz123", None).unwrap_err();
        assert!(err.message.contains("does not exist"));
        assert!(resolve_handler("", None).is_err());
        assert!(resolve_handler("no-such-handler-xyz123", None).is_err());
    }
}
