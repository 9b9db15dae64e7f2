use crate::AppState;
use crate::error::AppError;
use axum::{
    Json,
    extract::{Multipart, State},
};
use serde::Serialize;
use tracing::info;

const UPLOADS_DIR: &str = "uploads";
const DEFAULT_EXT: &str = ".png";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
}

/// Lowercased `.ext` taken from the end of `name`, or `.png`.
fn extension_for(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            format!(".{}", ext.to_ascii_lowercase())
        }
        _ => DEFAULT_EXT.to_string(),
    }
}

fn random_name(ext: &str) -> String {
    let id: [u8; 8] = rand::random();
    format!(
        "{}-{}{}",
        chrono::Utc::now().timestamp_millis(),
        hex::encode(id),
        ext
    )
}

/// Store the `file` part under `<public>/uploads` and return its public URL.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut file = None;
    let mut filename: Option<String> = None;
    let mut part_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("invalid form data: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                part_name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("invalid form data: {}", e)))?;
                file = Some(bytes);
            }
            "filename" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("invalid form data: {}", e)))?;
                filename = Some(text);
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| AppError::BadRequest("file is required".into()))?;
    let ext = extension_for(filename.or(part_name).as_deref().unwrap_or("upload"));
    let stored = random_name(&ext);

    let dir = state.config.public_dir.join(UPLOADS_DIR);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| AppError::Upload(format!("{}: {}", dir.display(), e)))?;

    let path = dir.join(&stored);
    tokio::fs::write(&path, &file)
        .await
        .map_err(|e| AppError::Upload(format!("{}: {}", path.display(), e)))?;

    info!("Stored upload {} ({} bytes)", path.display(), file.len());
    Ok(Json(UploadResponse {
        url: format!("/{}/{}", UPLOADS_DIR, stored),
    }))
}
