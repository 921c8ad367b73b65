//! Managed block inside gitignore-style files.
//!
//! repoguard owns exactly one delimited block per file and never touches the
//! lines around it. Writes go through a temporary file in the same directory
//! and are skipped when the content would not change.

use std::fs;
use std::io::Write as _;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::Result;

/// First line of the managed block.
pub const BLOCK_BEGIN: &str = "# >>> repoguard: private content (managed, do not edit) >>>";

/// Last line of the managed block.
pub const BLOCK_END: &str = "# <<< repoguard <<<";

/// Splits `content` into the text around the managed block and the block entries.
fn split_block(content: &str) -> (Vec<&str>, Option<Vec<String>>) {
    let mut outside = Vec::new();
    let mut block: Option<Vec<String>> = None;
    let mut inside = false;
    for line in content.lines() {
        if line.trim() == BLOCK_BEGIN {
            inside = true;
            block.get_or_insert_with(Vec::new);
        } else if line.trim() == BLOCK_END && inside {
            inside = false;
        } else if inside {
            if let Some(entries) = block.as_mut() {
                let entry = line.trim();
                if !entry.is_empty() && !entry.starts_with('#') {
                    entries.push(entry.to_string());
                }
            }
        } else {
            outside.push(line);
        }
    }
    (outside, block)
}

fn read(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}

fn persist(path: &Path, content: &str) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let mut file = NamedTempFile::new_in(parent)?;
    file.write_all(content.as_bytes())?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn render(outside: &[&str], entries: Option<&[String]>) -> String {
    let mut body = outside.join("\n").trim_end().to_string();
    if let Some(entries) = entries {
        if !body.is_empty() {
            body.push_str("\n\n");
        }
        body.push_str(BLOCK_BEGIN);
        body.push('\n');
        for entry in entries {
            body.push_str(entry);
            body.push('\n');
        }
        body.push_str(BLOCK_END);
    }
    if !body.is_empty() {
        body.push('\n');
    }
    body
}

/// Entries of the managed block, or `None` when the file has no block.
pub fn read_block(path: &Path) -> Result<Option<Vec<String>>> {
    let content = read(path)?;
    Ok(split_block(&content).1)
}

/// Replaces the managed block with `entries`. Returns whether the file changed.
pub fn write_block(path: &Path, entries: &[String]) -> Result<bool> {
    let content = read(path)?;
    let (outside, _) = split_block(&content);
    let updated = render(&outside, Some(entries));
    if updated == content {
        return Ok(false);
    }
    debug!(path = %path.display(), entries = entries.len(), "Writing managed ignore block");
    persist(path, &updated)?;
    Ok(true)
}

/// Deletes the managed block. Returns whether the file changed.
pub fn remove_block(path: &Path) -> Result<bool> {
    let content = read(path)?;
    let (outside, block) = split_block(&content);
    if block.is_none() {
        return Ok(false);
    }
    debug!(path = %path.display(), "Removing managed ignore block");
    persist(path, &render(&outside, None))?;
    Ok(true)
}
