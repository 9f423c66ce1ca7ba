//! Archival package lookup in the pairtree object store.
//!
//! Packages live at `<obj_root>/<namespace>/pairtree_root/<ppath>/<clean id>/<clean id>.zip`,
//! and the zip's modification time is the authoritative ingest timestamp.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io;
use std::path::PathBuf;

use crate::item::ItemIdentity;

#[cfg(test)]
use mockall::automock;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Modification time of the item's archival package, or `None` if it has not been deposited.
    async fn package_modified(&self, item: &ItemIdentity) -> io::Result<Option<DateTime<Utc>>>;
}

#[derive(Debug, Clone)]
pub struct PairtreeArchive {
    obj_root: PathBuf,
}

impl PairtreeArchive {
    pub fn new(obj_root: impl Into<PathBuf>) -> Self {
        Self {
            obj_root: obj_root.into(),
        }
    }

    pub fn package_path(&self, item: &ItemIdentity) -> PathBuf {
        let clean_id = clean_identifier(&item.object_id);

        let mut path = self.obj_root.join(&item.namespace).join("pairtree_root");
        for segment in ppath_segments(&clean_id) {
            path.push(segment);
        }
        path.push(&clean_id);
        path.push(format!("{clean_id}.zip"));
        path
    }
}

#[async_trait]
impl ArchiveStore for PairtreeArchive {
    async fn package_modified(&self, item: &ItemIdentity) -> io::Result<Option<DateTime<Utc>>> {
        let path = self.package_path(item);
        match tokio::fs::metadata(&path).await {
            Ok(metadata) => Ok(Some(DateTime::<Utc>::from(metadata.modified()?))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No archival package");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Apply pairtree identifier cleaning.
pub fn clean_identifier(id: &str) -> String {
    let mut encoded = String::with_capacity(id.len());
    for byte in id.bytes() {
        let needs_hex = !(0x21..=0x7e).contains(&byte)
            || matches!(byte, b'"' | b'*' | b'+' | b',' | b'<' | b'=' | b'>' | b'?' | b'\\' | b'^' | b'|');
        if needs_hex {
            encoded.push_str(&format!("^{byte:02x}"));
        } else {
            encoded.push(byte as char);
        }
    }

    encoded
        .chars()
        .map(|c| match c {
            '/' => '=',
            ':' => '+',
            '.' => ',',
            other => other,
        })
        .collect()
}

fn ppath_segments(clean_id: &str) -> Vec<String> {
    let chars: Vec<char> = clean_id.chars().collect();
    chars.chunks(2).map(|chunk| chunk.iter().collect()).collect()
}
