use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

/// Subfolder of the host output directory that preview files land in.
pub const PREVIEW_SUBFOLDER: &str = "ComfyUI-EasyNodes";

/// Reference to an image file the host can serve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageEntry {
    pub filename: String,
    pub subfolder: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Side-channel payload surfaced in the editor next to a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Preview {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub text: Vec<String>,
}

impl Preview {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.text.is_empty()
    }
}

/// Where encoded preview images are written.
pub trait PreviewStore: Send + Sync {
    /// `kind` is `output` or `temp`. Returns the path written.
    fn save(&self, kind: &str, subfolder: &str, filename: &str, bytes: &[u8]) -> Result<PathBuf>;
}

/// Writes previews to `<root>/<kind>/<subfolder>/<filename>`.
#[derive(Debug, Clone)]
pub struct FsPreviewStore {
    root: PathBuf,
}

impl FsPreviewStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl PreviewStore for FsPreviewStore {
    fn save(&self, kind: &str, subfolder: &str, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let dir = self.root.join(kind).join(subfolder);
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create preview directory: {}", dir.display()))?;
        let path = dir.join(filename);
        fs::write(&path, bytes).with_context(|| format!("Failed to write preview: {}", path.display()))?;
        Ok(path)
    }
}

/// Per-invocation state handed to a node body.
pub struct CallContext<'a> {
    unique_id: Option<String>,
    retain_previews: bool,
    store: Option<&'a dyn PreviewStore>,
    preview: RefCell<Preview>,
    console: RefCell<String>,
}

impl<'a> CallContext<'a> {
    pub fn new(unique_id: Option<String>, retain_previews: bool, store: Option<&'a dyn PreviewStore>) -> Self {
        Self {
            unique_id,
            retain_previews,
            store,
            preview: RefCell::new(Preview::default()),
            console: RefCell::new(String::new()),
        }
    }

    /// A context with no host attached, for calling node bodies directly.
    pub fn detached() -> Self {
        Self::new(None, false, None)
    }

    pub fn unique_id(&self) -> Option<&str> {
        self.unique_id.as_deref()
    }

    pub fn show_text(&self, text: impl Into<String>) {
        self.preview.borrow_mut().text.push(text.into());
    }

    /// Stores already-encoded PNG bytes and queues them for display.
    pub fn show_image(&self, png: &[u8]) -> Result<()> {
        let digest = hex(&Sha256::digest(png));
        let filename = format!("preview-{}_{}.png", self.unique_id.as_deref().unwrap_or("none"), &digest[..8]);
        let kind = if self.retain_previews { "output" } else { "temp" };

        if let Some(store) = self.store {
            store.save(kind, PREVIEW_SUBFOLDER, &filename, png)?;
        }

        self.preview.borrow_mut().images.push(ImageEntry {
            filename,
            subfolder: PREVIEW_SUBFOLDER.to_string(),
            kind: kind.to_string(),
        });
        Ok(())
    }

    /// Console output attached to the failure report if the call fails.
    pub fn print(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        info!(node = self.unique_id.as_deref().unwrap_or("-"), "{}", line);
        let mut console = self.console.borrow_mut();
        console.push_str(line);
        console.push('\n');
    }

    pub fn console(&self) -> String {
        self.console.borrow().clone()
    }

    pub fn take_preview(&self) -> Preview {
        self.preview.take()
    }

    pub fn has_preview(&self) -> bool {
        !self.preview.borrow().is_empty()
    }
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_filename_uses_digest_prefix() {
        let ctx = CallContext::new(Some("7".to_string()), false, None);
        ctx.show_image(b"png-bytes").expect("show_image");
        let preview = ctx.take_preview();
        let entry = &preview.images[0];
        assert!(entry.filename.starts_with("preview-7_"));
        assert_eq!(entry.filename.len(), "preview-7_".len() + 8 + ".png".len());
        assert_eq!(entry.kind, "temp");
        assert_eq!(entry.subfolder, PREVIEW_SUBFOLDER);
    }

    #[test]
    fn test_empty_preview_fields_are_skipped() {
        let preview = Preview {
            images: vec![],
            text: vec!["hi".into()],
        };
        let json = serde_json::to_value(&preview).expect("serialize");
        assert_eq!(json, serde_json::json!({"text": ["hi"]}));
    }
}
