use crate::error::AppError;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const UPLOADS_DIR: &str = "uploads";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Results,
    AdmitCards,
}

impl UploadKind {
    fn dir_name(self) -> &'static str {
        match self {
            UploadKind::Results => "results",
            UploadKind::AdmitCards => "admitcards",
        }
    }
}

/// Writes `bytes` under `dir`, never replacing an existing file. On a name
/// clash a counter is inserted after the timestamp prefix.
fn write_new(dir: &Path, name: &str, bytes: &[u8]) -> Result<String, AppError> {
    let (prefix, rest) = name.split_once('-').unwrap_or(("", name));
    let mut candidate = name.to_string();
    for n in 1..=1000 {
        match OpenOptions::new().write(true).create_new(true).open(dir.join(&candidate)) {
            Ok(mut file) => {
                if let Err(e) = file.write_all(bytes) {
                    drop(file);
                    let _ = std::fs::remove_file(dir.join(&candidate));
                    return Err(e.into());
                }
                return Ok(candidate);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                candidate = format!("{}-{}-{}", prefix, n, rest);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(AppError::Conflict("no free upload file name".into()))
}

/// Uploaded file as handed over by the intake layer: inline bytes or a path
/// the front end has already staged on disk.
#[derive(Debug, Clone)]
pub struct FileIntake {
    pub file_name: Option<String>,
    pub content_base64: Option<String>,
    pub source_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    /// Path relative to the workspace root, always with `/` separators.
    pub rel_path: String,
    pub file_name: String,
    pub checksum: String,
}

impl FileIntake {
    fn read(&self) -> Result<(String, Vec<u8>), AppError> {
        match (&self.content_base64, &self.source_path) {
            (Some(b64), None) => {
                let name = self
                    .file_name
                    .clone()
                    .ok_or_else(|| AppError::invalid("missing fileName"))?;
                let bytes = B64
                    .decode(b64.trim())
                    .map_err(|e| AppError::invalid(format!("contentBase64 is not valid base64: {}", e)))?;
                Ok((name, bytes))
            }
            (None, Some(src)) => {
                let src = Path::new(src);
                if !src.is_file() {
                    return Err(AppError::invalid(format!(
                        "sourcePath is not a file: {}",
                        src.to_string_lossy()
                    )));
                }
                let name = match &self.file_name {
                    Some(n) => n.clone(),
                    None => src
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .ok_or_else(|| AppError::invalid("sourcePath has no file name"))?,
                };
                Ok((name, std::fs::read(src)?))
            }
            (None, None) => Err(AppError::invalid("no file uploaded")),
            (Some(_), Some(_)) => Err(AppError::invalid(
                "provide either contentBase64 or sourcePath, not both",
            )),
        }
    }
}

/// Copies an upload into `<workspace>/uploads/<kind>/` and returns its reference.
pub fn store(workspace: &Path, kind: UploadKind, intake: &FileIntake) -> Result<StoredFile, AppError> {
    let (original_name, bytes) = intake.read()?;
    if bytes.is_empty() {
        return Err(AppError::invalid("uploaded file is empty"));
    }
    let safe_name = sanitize_file_name(&original_name);
    if safe_name.is_empty() {
        return Err(AppError::invalid("fileName must contain a usable name"));
    }

    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let dir = workspace.join(UPLOADS_DIR).join(kind.dir_name());
    std::fs::create_dir_all(&dir)?;

    let stored_name = write_new(&dir, &format!("{}-{}", millis, safe_name), &bytes)?;

    Ok(StoredFile {
        rel_path: format!("{}/{}/{}", UPLOADS_DIR, kind.dir_name(), stored_name),
        file_name: original_name,
        checksum: sha256_hex(&bytes),
    })
}

/// Resolves a stored reference back to an absolute path, refusing anything
/// that would escape the workspace.
pub fn resolve(workspace: &Path, rel_path: &str) -> Result<PathBuf, AppError> {
    let rel = Path::new(rel_path);
    if rel.is_absolute() || rel.components().any(|c| !matches!(c, Component::Normal(_))) {
        return Err(AppError::invalid("stored file reference is not workspace-relative"));
    }
    Ok(workspace.join(rel))
}

pub fn read_stored(workspace: &Path, rel_path: &str) -> Result<Vec<u8>, AppError> {
    let path = resolve(workspace, rel_path)?;
    if !path.is_file() {
        return Err(AppError::not_found("stored file"));
    }
    Ok(std::fs::read(path)?)
}

/// Removes a stored file; a file that is already gone is not an error.
pub fn remove_stored(workspace: &Path, rel_path: &str) -> Result<(), AppError> {
    let path = resolve(workspace, rel_path)?;
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn sanitize_file_name(name: &str) -> String {
    let base = name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned.trim_start_matches('.').to_string()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
