//! Shared classroom files: validation, blob upload and the file list.

use crate::auth::UserProfile;
use crate::backend::BoxFuture;
use crate::drawing::now_millis;
use crate::error::{BannerSlot, ClassroomError, ClassroomResult};
use crate::participation::{EngagementKind, ParticipationReporter};
use serde::{Deserialize, Serialize};

/// Default upload ceiling: 10 MB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// MIME types accepted for upload.
pub const ALLOWED_MIME_TYPES: [&str; 13] = [
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "text/plain",
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
];

/// A file picked for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(name: &str, mime_type: &str, bytes: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Metadata recorded for an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub id: String,
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub mime_type: String,
    #[serde(rename = "downloadURL")]
    pub download_url: String,
    pub storage_path: String,
    pub uploaded_by: String,
    pub uploaded_by_name: String,
    pub uploaded_at: i64,
}

impl FileMetadata {
    pub fn category(&self) -> FileCategory {
        FileCategory::from_mime(&self.mime_type)
    }
}

/// Coarse grouping used to pick an icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    Pdf,
    Document,
    Spreadsheet,
    Presentation,
    Text,
    Image,
    Other,
}

impl FileCategory {
    pub fn from_mime(mime_type: &str) -> Self {
        match mime_type {
            "application/pdf" => Self::Pdf,
            "application/msword"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => Self::Document,
            "application/vnd.ms-excel"
            | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => Self::Spreadsheet,
            "application/vnd.ms-powerpoint"
            | "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
                Self::Presentation
            }
            "text/plain" => Self::Text,
            m if ALLOWED_MIME_TYPES.contains(&m) && is_image(m) => Self::Image,
            _ => Self::Other,
        }
    }
}

/// Check type and size before anything is sent to the blob store.
pub fn validate_file(mime_type: &str, size: u64, max_bytes: u64) -> ClassroomResult<()> {
    if !ALLOWED_MIME_TYPES.contains(&mime_type) {
        return Err(ClassroomError::Validation(
            "File type not supported. Please upload PDF, Word, Excel, PowerPoint, text, or image files."
                .to_string(),
        ));
    }
    if size > max_bytes {
        return Err(ClassroomError::Validation(format!(
            "File size must be less than {}.",
            format_file_size(max_bytes)
        )));
    }
    Ok(())
}

/// Human-readable size: "0 Bytes", "1.5 KB", "10 MB".
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut unit = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let text = format!("{:.2}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", text, UNITS[unit])
}

pub fn is_image(mime_type: &str) -> bool {
    mime_type.starts_with("image/")
}

pub fn is_pdf(mime_type: &str) -> bool {
    mime_type == "application/pdf"
}

/// Blob store contract.
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at `path`, returning a download URL.
    fn upload(&self, path: &str, bytes: Vec<u8>, mime_type: &str) -> BoxFuture<'_, ClassroomResult<String>>;

    fn delete(&self, path: &str) -> BoxFuture<'_, ClassroomResult<()>>;
}

/// Files shared in one classroom, newest first.
pub struct FileShelf {
    classroom: String,
    files: Vec<FileMetadata>,
    max_upload_bytes: u64,
    banner: BannerSlot,
    reporter: Option<ParticipationReporter>,
    side_effects: Vec<BoxFuture<'static, ()>>,
}

impl FileShelf {
    pub fn new(classroom: &str) -> Self {
        Self {
            classroom: classroom.to_string(),
            files: Vec::new(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            banner: BannerSlot::default(),
            reporter: None,
            side_effects: Vec::new(),
        }
    }

    pub fn with_max_upload_bytes(mut self, max: u64) -> Self {
        self.max_upload_bytes = max;
        self
    }

    /// Use a banner slot with a custom dismiss delay.
    pub fn with_banner(mut self, banner: BannerSlot) -> Self {
        self.banner = banner;
        self
    }

    pub fn with_reporter(mut self, reporter: ParticipationReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn files(&self) -> &[FileMetadata] {
        &self.files
    }

    pub fn banner(&self) -> &BannerSlot {
        &self.banner
    }

    /// Replace the list with a fetched one, re-sorted newest first.
    pub fn set_files(&mut self, mut files: Vec<FileMetadata>) {
        files.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        self.files = files;
    }

    pub fn take_side_effects(&mut self) -> Vec<BoxFuture<'static, ()>> {
        std::mem::take(&mut self.side_effects)
    }

    pub fn storage_path(&self, name: &str, at: i64) -> String {
        format!("classrooms/{}/files/{}_{}", self.classroom, at, name)
    }

    pub async fn upload<B: BlobStore + ?Sized>(
        &mut self,
        store: &B,
        file: FileUpload,
        user: &UserProfile,
    ) -> ClassroomResult<&FileMetadata> {
        validate_file(&file.mime_type, file.size(), self.max_upload_bytes)?;

        let at = now_millis();
        let id = format!("{}_{}", at, file.name);
        let storage_path = self.storage_path(&file.name, at);
        let size = file.size();
        let download_url = match store.upload(&storage_path, file.bytes, &file.mime_type).await {
            Ok(url) => url,
            Err(e) => {
                self.banner.raise(&e, now_millis());
                return Err(e);
            }
        };
        log::info!("Uploaded {} ({})", storage_path, format_file_size(size));

        if let Some(reporter) = &self.reporter {
            self.side_effects.push(reporter.fire(EngagementKind::FileShare));
        }
        self.files.insert(
            0,
            FileMetadata {
                id,
                name: file.name,
                size,
                mime_type: file.mime_type,
                download_url,
                storage_path,
                uploaded_by: user.uid.clone(),
                uploaded_by_name: user.name_for_display(),
                uploaded_at: at,
            },
        );
        Ok(&self.files[0])
    }

    /// Delete a file. Only its uploader or a teacher may do so.
    pub async fn delete<B: BlobStore + ?Sized>(
        &mut self,
        store: &B,
        file_id: &str,
        user: &UserProfile,
    ) -> ClassroomResult<()> {
        let index = self
            .files
            .iter()
            .position(|f| f.id == file_id)
            .ok_or_else(|| ClassroomError::NotFound(format!("file {}", file_id)))?;
        let file = &self.files[index];
        if file.uploaded_by != user.uid && !user.is_teacher() {
            return Err(ClassroomError::Permission(format!(
                "{} may not delete {}",
                user.uid, file.name
            )));
        }
        if let Err(e) = store.delete(&file.storage_path).await {
            self.banner.raise(&e, now_millis());
            return Err(e);
        }
        self.files.remove(index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::backend::{MemoryBlobStore, MemoryParticipation};
    use crate::participation::ParticipationService;
    use pollster::block_on;
    use std::sync::Arc;

    fn user(uid: &str, role: Role) -> UserProfile {
        UserProfile {
            uid: uid.to_string(),
            email: format!("{}@school.edu", uid),
            display_name: String::new(),
            role,
        }
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(500), "500 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(10 * 1024 * 1024), "10 MB");
        assert_eq!(format_file_size(5 * 1024 * 1024 * 1024 * 1024), "5120 GB");
    }

    #[test]
    fn test_validate_file() {
        assert!(validate_file("application/pdf", 100, DEFAULT_MAX_UPLOAD_BYTES).is_ok());
        assert!(validate_file("image/webp", DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_MAX_UPLOAD_BYTES).is_ok());
        assert!(matches!(
            validate_file("application/zip", 1, DEFAULT_MAX_UPLOAD_BYTES),
            Err(ClassroomError::Validation(_))
        ));
        assert!(validate_file("text/plain", DEFAULT_MAX_UPLOAD_BYTES + 1, DEFAULT_MAX_UPLOAD_BYTES).is_err());
    }

    #[test]
    fn test_categories() {
        assert_eq!(FileCategory::from_mime("application/pdf"), FileCategory::Pdf);
        assert_eq!(FileCategory::from_mime("image/png"), FileCategory::Image);
        assert_eq!(FileCategory::from_mime("image/tiff"), FileCategory::Other);
        assert!(is_image("image/gif"));
        assert!(is_pdf("application/pdf"));
        assert!(!is_pdf("text/plain"));
    }

    #[test]
    fn test_rejected_file_never_reaches_store() {
        let store = MemoryBlobStore::new();
        let mut shelf = FileShelf::new("room");
        let upload = FileUpload::new("virus.exe", "application/x-msdownload", vec![0; 4]);

        let result = block_on(shelf.upload(&store, upload, &user("s1", Role::Student)));
        assert!(matches!(result, Err(ClassroomError::Validation(_))));
        assert_eq!(store.len(), 0);
        assert!(shelf.files().is_empty());
    }

    #[test]
    fn test_upload_lists_newest_first_and_fires_file_share() {
        let store = MemoryBlobStore::new();
        let service = Arc::new(MemoryParticipation::new());
        let mut shelf =
            FileShelf::new("room").with_reporter(ParticipationReporter::new(service.clone(), "room", "s1"));
        let student = user("s1", Role::Student);

        let first = block_on(shelf.upload(&store, FileUpload::new("a.txt", "text/plain", b"a".to_vec()), &student))
            .unwrap()
            .clone();
        assert!(first.storage_path.starts_with("classrooms/room/files/"));
        assert!(first.storage_path.ends_with("_a.txt"));
        assert_eq!(first.uploaded_by_name, "s1");

        block_on(shelf.upload(&store, FileUpload::new("b.txt", "text/plain", b"b".to_vec()), &student)).unwrap();
        assert_eq!(shelf.files()[0].name, "b.txt");
        assert_eq!(store.len(), 2);

        for effect in shelf.take_side_effects() {
            block_on(effect);
        }
        let records = block_on(service.records("room")).unwrap();
        assert_eq!(records[0].files_shared, 2);
    }

    #[test]
    fn test_delete_permissions() {
        let store = MemoryBlobStore::new();
        let mut shelf = FileShelf::new("room");
        let owner = user("s1", Role::Student);
        let other = user("s2", Role::Student);
        let teacher = user("t1", Role::Teacher);

        let id = block_on(shelf.upload(&store, FileUpload::new("a.pdf", "application/pdf", vec![1]), &owner))
            .unwrap()
            .id
            .clone();

        let denied = block_on(shelf.delete(&store, &id, &other));
        assert!(matches!(denied, Err(ClassroomError::Permission(_))));
        assert_eq!(store.len(), 1);

        block_on(shelf.delete(&store, &id, &teacher)).unwrap();
        assert!(shelf.files().is_empty());
        assert_eq!(store.len(), 0);

        assert!(matches!(
            block_on(shelf.delete(&store, &id, &teacher)),
            Err(ClassroomError::NotFound(_))
        ));
    }

    #[test]
    fn test_store_failure_raises_banner() {
        let store = MemoryBlobStore::new();
        store.set_offline(true);
        let mut shelf = FileShelf::new("room");
        let result = block_on(shelf.upload(
            &store,
            FileUpload::new("a.txt", "text/plain", vec![1]),
            &user("s1", Role::Student),
        ));
        assert!(matches!(result, Err(ClassroomError::Sync(_))));
        assert!(shelf.banner().current(now_millis()).is_some());
    }

    #[test]
    fn test_set_files_sorts_newest_first() {
        let mut shelf = FileShelf::new("room");
        let meta = |id: &str, at: i64| FileMetadata {
            id: id.to_string(),
            name: id.to_string(),
            size: 1,
            mime_type: "text/plain".to_string(),
            download_url: String::new(),
            storage_path: String::new(),
            uploaded_by: "u".to_string(),
            uploaded_by_name: "u".to_string(),
            uploaded_at: at,
        };
        shelf.set_files(vec![meta("old", 1), meta("new", 3), meta("mid", 2)]);
        let ids: Vec<_> = shelf.files().iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }
}
