//! Per-session workspace: a bounded filesystem view.
//!
//! All tool file access goes through `Workspace`, which only hands out
//! `SessionPath`s — paths proven at construction to stay under the session
//! root. Escape attempts fail with `WorkspacePathEscape` before any I/O.

mod classify;

pub use classify::{classify, ArtifactKind};

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use tokio::fs;

use crate::error::{CoreError, Result};

/// Per-file write cap.
pub const MAX_FILE_BYTES: u64 = 16 * 1024 * 1024;

/// A workspace-confined path: the session root plus a normalized relative
/// sub-path. Construction is the only place escape checks happen, so every
/// holder of a `SessionPath` may use it without re-validating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPath {
    root: PathBuf,
    rel: PathBuf,
}

impl SessionPath {
    pub fn new(root: &Path, candidate: &str) -> Result<Self> {
        if candidate.is_empty() {
            return Err(CoreError::BadArgs("empty path".into()));
        }

        let raw = Path::new(candidate);
        if raw.is_absolute() {
            return Err(CoreError::WorkspacePathEscape(candidate.to_string()));
        }

        // Lexical normalization: resolve `.` and reject any `..` that would
        // climb above the root.
        let mut rel = PathBuf::new();
        let mut depth: isize = 0;
        for component in raw.components() {
            match component {
                Component::Normal(part) => {
                    rel.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(CoreError::WorkspacePathEscape(candidate.to_string()));
                    }
                    rel.pop();
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(CoreError::WorkspacePathEscape(candidate.to_string()));
                }
            }
        }

        if rel.as_os_str().is_empty() {
            return Err(CoreError::WorkspacePathEscape(candidate.to_string()));
        }

        Ok(Self {
            root: root.to_path_buf(),
            rel,
        })
    }

    pub fn relative(&self) -> &Path {
        &self.rel
    }

    pub fn absolute(&self) -> PathBuf {
        self.root.join(&self.rel)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    CreateOrReplace,
    CreateExclusive,
}

/// One ordered substitution for `edit_file`. `find` must occur in the file;
/// only the first occurrence is replaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEdit {
    pub find: String,
    pub replace: String,
}

/// Listing entry with the semantic classification from `classify`.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceEntry {
    pub path: String,
    pub kind: ArtifactKind,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Handle on one session's directory. Cheap to clone; all methods resolve
/// through `SessionPath`.
#[derive(Debug, Clone)]
pub struct Workspace {
    session_id: String,
    root: PathBuf,
}

impl Workspace {
    pub fn new(workspace_root: &Path, session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            root: workspace_root.join(session_id),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, rel: &str) -> Result<SessionPath> {
        SessionPath::new(&self.root, rel)
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    pub async fn write_file(&self, rel: &str, content: &[u8], mode: WriteMode) -> Result<SessionPath> {
        if content.len() as u64 > MAX_FILE_BYTES {
            return Err(CoreError::FileTooLarge {
                path: rel.to_string(),
                size: content.len() as u64,
                cap: MAX_FILE_BYTES,
            });
        }

        let path = self.resolve(rel)?;
        let abs = path.absolute();

        if mode == WriteMode::CreateExclusive && abs.exists() {
            return Err(CoreError::SessionConflict(format!(
                "file '{}' already exists",
                rel
            )));
        }

        if let Some(parent) = abs.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&abs, content).await?;
        Ok(path)
    }

    pub async fn read_file(&self, rel: &str) -> Result<Vec<u8>> {
        let abs = self.resolve(rel)?.absolute();
        match fs::read(&abs).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CoreError::NotFound(rel.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn read_to_string(&self, rel: &str) -> Result<String> {
        let bytes = self.read_file(rel).await?;
        String::from_utf8(bytes).map_err(|_| {
            CoreError::BadArgs(format!("file '{}' is not valid UTF-8", rel))
        })
    }

    /// Apply ordered substitutions and return a unified-diff summary.
    /// An empty edit list is a no-op and yields an empty diff. Each `find`
    /// anchor must match the current content exactly once: a missing anchor
    /// fails with `ConflictNotFound`, and so does an ambiguous one — the
    /// caller adds surrounding context rather than guessing which occurrence
    /// was meant. Nothing is written on failure.
    pub async fn edit_file(&self, rel: &str, edits: &[FileEdit]) -> Result<String> {
        let original = self.read_to_string(rel).await?;
        if edits.is_empty() {
            return Ok(String::new());
        }

        let mut updated = original.clone();
        for (idx, edit) in edits.iter().enumerate() {
            let count = updated.matches(&edit.find).count();
            if count > 1 {
                return Err(CoreError::ConflictNotFound(format!(
                    "edit {}: anchor {:?} found {} times in '{}'; add surrounding context to make it unique",
                    idx + 1,
                    preview(&edit.find),
                    count,
                    rel
                )));
            }
            match updated.find(&edit.find) {
                Some(pos) => {
                    updated.replace_range(pos..pos + edit.find.len(), &edit.replace);
                }
                None => {
                    return Err(CoreError::ConflictNotFound(format!(
                        "edit {}: anchor {:?} not present in '{}'",
                        idx + 1,
                        preview(&edit.find),
                        rel
                    )));
                }
            }
        }

        if updated.len() as u64 > MAX_FILE_BYTES {
            return Err(CoreError::FileTooLarge {
                path: rel.to_string(),
                size: updated.len() as u64,
                cap: MAX_FILE_BYTES,
            });
        }

        let abs = self.resolve(rel)?.absolute();
        fs::write(&abs, &updated).await?;

        let diff = TextDiff::from_lines(&original, &updated)
            .unified_diff()
            .context_radius(2)
            .header(&format!("a/{}", rel), &format!("b/{}", rel))
            .to_string();
        Ok(diff)
    }

    pub async fn delete_file(&self, rel: &str) -> Result<()> {
        let abs = self.resolve(rel)?.absolute();
        match fs::remove_file(&abs).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CoreError::NotFound(rel.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Recursively list files under `subdir` (the whole workspace when
    /// `None`), classified and sorted by path.
    pub async fn list_files(&self, subdir: Option<&str>) -> Result<Vec<WorkspaceEntry>> {
        let base = match subdir {
            Some(rel) => self.resolve(rel)?.absolute(),
            None => self.root.clone(),
        };
        if !base.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        let mut stack = vec![base];
        while let Some(dir) = stack.pop() {
            let mut read_dir = fs::read_dir(&dir).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                let path = entry.path();
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    stack.push(path);
                    continue;
                }
                let rel = path
                    .strip_prefix(&self.root)
                    .map_err(|_| CoreError::Io("listing escaped workspace root".into()))?
                    .to_path_buf();
                let modified: DateTime<Utc> = meta
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());
                entries.push(WorkspaceEntry {
                    kind: classify(&rel),
                    path: rel.to_string_lossy().replace('\\', "/"),
                    size: meta.len(),
                    modified,
                });
            }
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    /// Newest file of a kind, by mtime. Used for "the spec", "the report".
    pub async fn latest_of_kind(&self, kind: ArtifactKind) -> Result<Option<WorkspaceEntry>> {
        let mut entries: Vec<_> = self
            .list_files(None)
            .await?
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect();
        entries.sort_by_key(|e| e.modified);
        Ok(entries.pop())
    }

    /// Remove the whole workspace directory. Used by session deletion.
    pub async fn remove_all(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root).await?;
        }
        Ok(())
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 60;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let head: String = text.chars().take(MAX).collect();
        format!("{}…", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, Workspace) {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::new(dir.path(), "test-session");
        (dir, ws)
    }

    #[test]
    fn session_path_rejects_escapes() {
        let root = PathBuf::from("/data/workspace/s1");
        assert!(SessionPath::new(&root, "../other/file.v").is_err());
        assert!(SessionPath::new(&root, "a/../../etc/passwd").is_err());
        assert!(SessionPath::new(&root, "/etc/passwd").is_err());
        assert!(SessionPath::new(&root, "..").is_err());
    }

    #[test]
    fn session_path_normalizes_within_root() {
        let root = PathBuf::from("/data/workspace/s1");
        let p = SessionPath::new(&root, "a/./b/../c.v").unwrap();
        assert_eq!(p.relative(), Path::new("a/c.v"));
        assert!(p.absolute().starts_with(&root));
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let (_dir, ws) = workspace();
        ws.write_file("counter.v", b"module counter;", WriteMode::CreateOrReplace)
            .await
            .unwrap();
        let content = ws.read_to_string("counter.v").await.unwrap();
        assert_eq!(content, "module counter;");
    }

    #[tokio::test]
    async fn create_exclusive_refuses_overwrite() {
        let (_dir, ws) = workspace();
        ws.write_file("a.v", b"one", WriteMode::CreateExclusive)
            .await
            .unwrap();
        let err = ws
            .write_file("a.v", b"two", WriteMode::CreateExclusive)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::SessionConflict(_)));
    }

    #[tokio::test]
    async fn read_missing_file_is_not_found() {
        let (_dir, ws) = workspace();
        let err = ws.read_file("nope.v").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn oversized_write_is_rejected() {
        let (_dir, ws) = workspace();
        let big = vec![b'x'; (MAX_FILE_BYTES + 1) as usize];
        let err = ws
            .write_file("big.bin", &big, WriteMode::CreateOrReplace)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::FileTooLarge { .. }));
    }

    #[tokio::test]
    async fn edit_applies_in_order_and_diffs() {
        let (_dir, ws) = workspace();
        ws.write_file(
            "counter.v",
            b"always @(posedge clk)\n  count <= 1;\n",
            WriteMode::CreateOrReplace,
        )
        .await
        .unwrap();

        let diff = ws
            .edit_file(
                "counter.v",
                &[
                    FileEdit {
                        find: "count <= 1;".into(),
                        replace: "count <= 0;".into(),
                    },
                    FileEdit {
                        find: "count <= 0;".into(),
                        replace: "count <= 4'd0;".into(),
                    },
                ],
            )
            .await
            .unwrap();

        assert!(diff.contains("-  count <= 1;"));
        assert!(diff.contains("+  count <= 4'd0;"));
        let content = ws.read_to_string("counter.v").await.unwrap();
        assert!(content.contains("4'd0"));
    }

    #[tokio::test]
    async fn empty_edit_list_is_noop() {
        let (_dir, ws) = workspace();
        ws.write_file("a.v", b"content", WriteMode::CreateOrReplace)
            .await
            .unwrap();
        let diff = ws.edit_file("a.v", &[]).await.unwrap();
        assert!(diff.is_empty());
        assert_eq!(ws.read_to_string("a.v").await.unwrap(), "content");
    }

    #[tokio::test]
    async fn ambiguous_anchor_is_rejected() {
        let (_dir, ws) = workspace();
        ws.write_file(
            "a.v",
            b"count <= 0;\ncount <= 0;\n",
            WriteMode::CreateOrReplace,
        )
        .await
        .unwrap();
        let err = ws
            .edit_file(
                "a.v",
                &[FileEdit {
                    find: "count <= 0;".into(),
                    replace: "count <= 1;".into(),
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ConflictNotFound(_)));
        assert!(err.to_string().contains("2 times"));
        // Nothing written.
        assert_eq!(
            ws.read_to_string("a.v").await.unwrap(),
            "count <= 0;\ncount <= 0;\n"
        );
    }

    #[tokio::test]
    async fn missing_anchor_leaves_file_untouched() {
        let (_dir, ws) = workspace();
        ws.write_file("a.v", b"content", WriteMode::CreateOrReplace)
            .await
            .unwrap();
        let err = ws
            .edit_file(
                "a.v",
                &[FileEdit {
                    find: "absent".into(),
                    replace: "x".into(),
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ConflictNotFound(_)));
        assert_eq!(ws.read_to_string("a.v").await.unwrap(), "content");
    }

    #[tokio::test]
    async fn listing_classifies_entries() {
        let (_dir, ws) = workspace();
        ws.write_file("counter_spec.yaml", b"counter:", WriteMode::CreateOrReplace)
            .await
            .unwrap();
        ws.write_file("counter.v", b"module counter;", WriteMode::CreateOrReplace)
            .await
            .unwrap();
        ws.write_file("counter_tb.v", b"module tb;", WriteMode::CreateOrReplace)
            .await
            .unwrap();

        let entries = ws.list_files(None).await.unwrap();
        let kinds: Vec<_> = entries.iter().map(|e| (e.path.as_str(), e.kind)).collect();
        assert!(kinds.contains(&("counter_spec.yaml", ArtifactKind::Spec)));
        assert!(kinds.contains(&("counter.v", ArtifactKind::Verilog)));
        assert!(kinds.contains(&("counter_tb.v", ArtifactKind::Testbench)));
    }
}
