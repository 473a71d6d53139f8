use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::{body::Bytes, extract::Multipart};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;

/// Longest client-supplied extension we keep on a stored file.
const MAX_EXTENSION_LEN: usize = 8;

/// Where an upload belongs. Each kind gets its own subdirectory and file prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Profile,
    Message,
}

impl UploadKind {
    fn subdir(self) -> &'static str {
        match self {
            UploadKind::Profile => "profiles",
            UploadKind::Message => "messages",
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            UploadKind::Profile => "profile",
            UploadKind::Message => "msg",
        }
    }
}

/// A file part pulled out of a multipart body.
#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub bytes: Bytes,
}

/// A fully buffered multipart form: text fields plus at most one file part.
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub file: Option<UploadedFile>,
}

impl MultipartForm {
    /// Drain `multipart`, treating the part named `file_field` as the upload.
    /// An empty file part (nothing chosen in the browser) counts as no upload.
    pub async fn read(mut multipart: Multipart, file_field: &str) -> Result<Self, AppError> {
        let mut form = MultipartForm::default();

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };

            if name == file_field {
                let file_name = field.file_name().map(str::to_owned);
                let bytes = field.bytes().await?;
                if !bytes.is_empty() {
                    form.file = Some(UploadedFile { file_name, bytes });
                }
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    pub fn text(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }
}

/// Writes uploads under `{root}/profiles` and `{root}/messages`, served at `/uploads`.
pub struct UploadStorage {
    root: PathBuf,
}

impl UploadStorage {
    pub async fn new(root: PathBuf) -> Result<Self, AppError> {
        for kind in [UploadKind::Profile, UploadKind::Message] {
            tokio::fs::create_dir_all(root.join(kind.subdir())).await?;
        }
        info!("Upload directory: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store `file` and return its public path, e.g. `/uploads/messages/msg_1700000000000_1a2b3c4d.png`.
    pub async fn save(&self, kind: UploadKind, file: &UploadedFile) -> Result<String, AppError> {
        let dir = self.root.join(kind.subdir());
        tokio::fs::create_dir_all(&dir).await?;

        let name = stored_file_name(
            kind,
            file.file_name.as_deref(),
            chrono::Utc::now().timestamp_millis(),
            &Uuid::new_v4().simple().to_string()[..8],
        );
        let path = dir.join(&name);

        let mut out = tokio::fs::File::create(&path).await?;
        out.write_all(&file.bytes).await?;
        out.flush().await?;

        debug!("Stored {} bytes at {}", file.bytes.len(), path.display());
        Ok(format!("/uploads/{}/{}", kind.subdir(), name))
    }

    /// Delete a file previously returned by `save`. Paths outside the upload root are ignored.
    pub async fn remove(&self, public_path: &str) -> Result<(), AppError> {
        let Some(relative) = public_path.strip_prefix("/uploads/") else {
            return Ok(());
        };
        if relative.split('/').any(|part| part.is_empty() || part == "..") {
            return Ok(());
        }
        tokio::fs::remove_file(self.root.join(relative)).await?;
        debug!("Removed {}", public_path);
        Ok(())
    }
}

/// `{prefix}_{millis}_{suffix}{.ext}`. The extension comes from the client's
/// file name and is dropped unless it is short and ASCII alphanumeric.
pub fn stored_file_name(kind: UploadKind, original: Option<&str>, millis: i64, suffix: &str) -> String {
    let ext = original
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default();

    format!("{}_{}_{}{}", kind.prefix(), millis, suffix, ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_file_name_keeps_safe_extension() {
        assert_eq!(
            stored_file_name(UploadKind::Message, Some("cat.PNG"), 1700, "abcd1234"),
            "msg_1700_abcd1234.png"
        );
        assert_eq!(
            stored_file_name(UploadKind::Profile, Some("me.jpeg"), 5, "x"),
            "profile_5_x.jpeg"
        );
    }

    #[test]
    fn test_stored_file_name_drops_unsafe_extension() {
        assert_eq!(stored_file_name(UploadKind::Message, None, 1, "s"), "msg_1_s");
        assert_eq!(stored_file_name(UploadKind::Message, Some("noext"), 1, "s"), "msg_1_s");
        assert_eq!(
            stored_file_name(UploadKind::Message, Some("evil.p/hp"), 1, "s"),
            "msg_1_s"
        );
        assert_eq!(
            stored_file_name(UploadKind::Message, Some("a.averyverylongext"), 1, "s"),
            "msg_1_s"
        );
    }

    #[tokio::test]
    async fn test_save_writes_under_kind_directory() {
        let root = std::env::temp_dir().join(format!("parlor_uploads_{}", Uuid::new_v4()));
        let storage = UploadStorage::new(root.clone()).await.unwrap();

        let file = UploadedFile {
            file_name: Some("photo.png".into()),
            bytes: Bytes::from_static(b"not really a png"),
        };
        let public = storage.save(UploadKind::Profile, &file).await.unwrap();
        assert!(public.starts_with("/uploads/profiles/profile_"));
        assert!(public.ends_with(".png"));

        let on_disk = root.join(public.trim_start_matches("/uploads/"));
        assert_eq!(tokio::fs::read(&on_disk).await.unwrap(), b"not really a png");

        storage.remove(&public).await.unwrap();
        assert!(!on_disk.exists());

        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_remove_ignores_paths_outside_root() {
        let root = std::env::temp_dir().join(format!("parlor_uploads_{}", Uuid::new_v4()));
        let storage = UploadStorage::new(root.clone()).await.unwrap();

        storage.remove("/etc/passwd").await.unwrap();
        storage.remove("/uploads/../outside.txt").await.unwrap();

        let _ = tokio::fs::remove_dir_all(&root).await;
    }
}
