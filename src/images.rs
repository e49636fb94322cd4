// 🖼️ Image Storage Collaborator - blob in, public URI out
//
// The contest core only needs this one contract: hand over the uploaded
// bytes, get back a URI that displays can dereference. Format handling,
// resizing and validation belong to the uploader, not here.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;

/// Object storage seam for costume images.
pub trait ImageStore {
    /// Persist the blob and return a publicly dereferenceable URI.
    fn store(&self, bytes: &[u8], original_name: &str) -> Result<String>;
}

/// Local-filesystem store serving files under `/static/` (the server
/// binary mounts the media directory there).
///
/// Filenames are content-addressed (sha256 of the bytes + the original
/// extension), so re-uploading the same image lands on the same URI
/// instead of piling up copies.
pub struct LocalImageStore {
    media_dir: PathBuf,
}

impl LocalImageStore {
    pub fn new(media_dir: PathBuf) -> Self {
        LocalImageStore { media_dir }
    }

    fn file_name(bytes: &[u8], original_name: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = format!("{:x}", hasher.finalize());

        match original_name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => format!("{}.{}", digest, ext.to_lowercase()),
            _ => digest,
        }
    }
}

impl ImageStore for LocalImageStore {
    fn store(&self, bytes: &[u8], original_name: &str) -> Result<String> {
        fs::create_dir_all(&self.media_dir)
            .with_context(|| format!("Failed to create media dir {:?}", self.media_dir))?;

        let name = Self::file_name(bytes, original_name);
        let path = self.media_dir.join(&name);
        if !path.exists() {
            fs::write(&path, bytes)
                .with_context(|| format!("Failed to write image {:?}", path))?;
        }

        Ok(format!("/static/{}", name))
    }
}
