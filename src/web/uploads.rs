use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use axum::extract::Multipart;
use tokio::{fs::OpenOptions, io::AsyncWriteExt};
use tracing::warn;

/// Public URL prefix under which stored uploads are served.
pub const UPLOADS_URL_PREFIX: &str = "uploads";

/// Result type used by the shared upload helpers.
pub type UploadResult<T> = Result<T, UploadError>;

/// Error returned when parsing or persisting uploaded files.
#[derive(Debug)]
pub struct UploadError {
    message: String,
}

impl UploadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for UploadError {}

/// A file part held in memory until the whole submission has been validated.
#[derive(Debug, Clone)]
pub struct PendingFile {
    pub field_name: String,
    pub original_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl PendingFile {
    pub fn is_pdf(&self) -> bool {
        self.content_type
            .as_deref()
            .and_then(|value| value.parse::<mime::Mime>().ok())
            .is_some_and(|parsed| parsed.essence_str() == mime::APPLICATION_PDF.essence_str())
    }
}

/// Text fields and file parts of a multipart submission.
#[derive(Debug, Default)]
pub struct ParsedForm {
    pub files: Vec<PendingFile>,
    pub text_fields: HashMap<String, Vec<String>>,
}

impl ParsedForm {
    pub fn first_file_for(&self, field_name: &str) -> Option<&PendingFile> {
        self.files.iter().find(|file| file.field_name == field_name)
    }

    pub fn text_values(&self, field_name: &str) -> &[String] {
        self.text_fields
            .get(field_name)
            .map(|values| values.as_slice())
            .unwrap_or(&[])
    }

    pub fn first_text(&self, field_name: &str) -> Option<&str> {
        self.text_values(field_name).first().map(|s| s.as_str())
    }
}

/// Reads every part of the form. File inputs left empty by the browser
/// (no file name, no bytes) are dropped so optional uploads read as absent.
pub async fn read_form(mut multipart: Multipart) -> UploadResult<ParsedForm> {
    let mut form = ParsedForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| UploadError::new(format!("Failed to parse form: {err}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        let Some(file_name) = field.file_name().map(str::to_string) else {
            let value = field
                .text()
                .await
                .map_err(|err| UploadError::new(format!("Failed to read field `{field_name}`: {err}")))?;
            form.text_fields.entry(field_name).or_default().push(value);
            continue;
        };

        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|err| UploadError::new(format!("Failed to read upload `{field_name}`: {err}")))?;

        if file_name.is_empty() && bytes.is_empty() {
            continue;
        }

        form.files.push(PendingFile {
            field_name,
            original_name: file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
    }

    Ok(form)
}

/// Metadata describing a stored upload on disk.
#[derive(Debug, Clone)]
pub struct SavedFile {
    pub stored_name: String,
    pub stored_path: PathBuf,
}

impl SavedFile {
    /// Path recorded on the application and served under `/uploads/`.
    pub fn public_path(&self) -> String {
        format!("{}/{}", UPLOADS_URL_PREFIX, self.stored_name)
    }
}

/// Files written for one submission. Dropping the guard without calling
/// [`SavedUploads::keep`] removes them again.
#[derive(Debug)]
pub struct SavedUploads {
    dest_dir: PathBuf,
    files: Vec<SavedFile>,
    kept: bool,
}

impl SavedUploads {
    pub fn new(dest_dir: &Path) -> Self {
        Self {
            dest_dir: dest_dir.to_path_buf(),
            files: Vec::new(),
            kept: false,
        }
    }

    pub async fn save(&mut self, pending: &PendingFile) -> UploadResult<SavedFile> {
        tokio::fs::create_dir_all(&self.dest_dir)
            .await
            .map_err(|err| UploadError::new(format!("Failed to create upload directory: {err}")))?;

        let stored_name = stored_file_name(unix_nanos(), &pending.original_name);
        let stored_path = self.dest_dir.join(&stored_name);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&stored_path)
            .await
            .map_err(|err| UploadError::new(format!("Failed to save file: {err}")))?;
        let saved = SavedFile {
            stored_name,
            stored_path,
        };
        self.files.push(saved.clone());

        file.write_all(&pending.bytes)
            .await
            .map_err(|err| UploadError::new(format!("Failed to write file: {err}")))?;
        file.flush()
            .await
            .map_err(|err| UploadError::new(format!("Failed to flush file: {err}")))?;

        Ok(saved)
    }

    pub fn keep(mut self) {
        self.kept = true;
    }
}

impl Drop for SavedUploads {
    fn drop(&mut self) {
        if self.kept {
            return;
        }
        for file in &self.files {
            if let Err(err) = std::fs::remove_file(&file.stored_path) {
                warn!(?err, file = %file.stored_path.display(), "failed to remove orphaned upload");
            }
        }
    }
}

/// Longest file name most filesystems accept, in bytes.
const MAX_STORED_NAME_BYTES: usize = 255;

/// `<unix-nanos>_<sanitized original name>`, shortened to fit
/// [`MAX_STORED_NAME_BYTES`]. Long names lose the end of their stem; the
/// extension is kept.
pub fn stored_file_name(nanos: u128, original_name: &str) -> String {
    // Truncation happens below, after the timestamp prefix is accounted for.
    let options = sanitize_filename::Options {
        truncate: false,
        ..Default::default()
    };
    let mut sanitized = sanitize_filename::sanitize_with_options(original_name, options);
    if sanitized.is_empty() {
        sanitized = "upload.pdf".to_string();
    }

    let prefix = format!("{nanos}_");
    let budget = MAX_STORED_NAME_BYTES.saturating_sub(prefix.len());
    if sanitized.len() > budget {
        sanitized = shorten_name(&sanitized, budget);
    }
    format!("{prefix}{sanitized}")
}

fn shorten_name(name: &str, budget: usize) -> String {
    let (stem, extension) = match name.rfind('.') {
        Some(dot) if dot > 0 && name.len() - dot <= budget / 2 => name.split_at(dot),
        _ => (name, ""),
    };
    let mut cut = budget - extension.len();
    while !stem.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{extension}", &stem[..cut])
}

fn unix_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default()
}
