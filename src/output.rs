//! File output: the generator buffers each scope in memory and hands the
//! finished text here on scope exit.

use std::fs;
use std::path::Path;

use crate::error::{CompileError, CompileResult};

pub fn prepare_dir(path: &Path) -> CompileResult<()> {
    fs::create_dir_all(path).map_err(|e| {
        CompileError::Io(format!(
            "Failed to create output directory {}: {}",
            path.display(),
            e
        ))
    })
}

pub fn write_text(path: &Path, contents: &str) -> CompileResult<()> {
    fs::write(path, contents)
        .map_err(|e| CompileError::Io(format!("Failed to write {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_into_created_directory() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("pack").join("fns");
        prepare_dir(&out).unwrap();
        let file = out.join("scope_0.func");
        write_text(&file, "say hi\n").unwrap();
        assert_eq!(std::fs::read_to_string(file).unwrap(), "say hi\n");
    }
}
