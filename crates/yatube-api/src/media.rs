use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};
use uuid::Uuid;

use yatube_types::api::MediaUploadResponse;

use crate::error::{BlogError, Result};
use crate::middleware::Viewer;
use crate::state::AppState;

/// 5 MB upload limit for post images
pub const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024;

/// Directory under the media root that post images are stored in.
pub const UPLOAD_DIR: &str = "posts";

const IMAGE_EXTENSIONS: [&str; 4] = ["gif", "png", "jpg", "webp"];

/// File extension for a supported image format, judged by magic bytes.
pub fn sniff_extension(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("gif")
    } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("webp")
    } else {
        None
    }
}

/// True for references produced by `upload_image`: `posts/<sha256 hex>.<ext>`.
pub fn is_valid_reference(reference: &str) -> bool {
    let Some(name) = reference.strip_prefix(UPLOAD_DIR).and_then(|r| r.strip_prefix('/')) else {
        return false;
    };
    let Some((digest, ext)) = name.split_once('.') else {
        return false;
    };
    digest.len() == 64
        && digest.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        && IMAGE_EXTENSIONS.contains(&ext)
}

/// POST /media/: accepts raw image bytes, stores them content-addressed
/// under `<media_root>/posts/` and returns the reference to put on a post.
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    bytes: Bytes,
) -> Result<impl IntoResponse> {
    let claims = viewer.require()?;

    if bytes.is_empty() {
        return Err(BlogError::invalid("image", "The submitted file is empty."));
    }
    if bytes.len() > MAX_IMAGE_SIZE {
        return Err(BlogError::invalid("image", "Images may be at most 5 MB."));
    }
    let ext = sniff_extension(&bytes).ok_or_else(|| {
        BlogError::invalid(
            "image",
            "Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
        )
    })?;

    let digest = hex::encode(Sha256::digest(&bytes));
    let reference = format!("{}/{}.{}", UPLOAD_DIR, digest, ext);

    let dir = state.media_root.join(UPLOAD_DIR);
    tokio::fs::create_dir_all(&dir).await.map_err(|e| {
        error!("Failed to create media directory {}: {}", dir.display(), e);
        anyhow::anyhow!("cannot create media directory: {}", e)
    })?;

    let path = state.media_root.join(&reference);
    // A file at the final name is always complete: writes land there only
    // through a rename.
    let exists = tokio::fs::try_exists(&path).await.unwrap_or(false);
    if !exists {
        store_atomically(&dir, &path, &bytes).await.map_err(|e| {
            error!("Failed to store image {}: {}", path.display(), e);
            anyhow::anyhow!("cannot store image: {}", e)
        })?;
    }

    info!("{} uploaded {} ({} bytes)", claims.username, reference, bytes.len());

    Ok((
        StatusCode::CREATED,
        Json(MediaUploadResponse {
            image: reference,
            size: bytes.len() as u64,
        }),
    ))
}

/// Write `bytes` to a unique temporary file in `dir`, then rename it onto
/// `path`. Readers never see a partial file, and a failed write removes its
/// temporary file.
async fn store_atomically(dir: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = dir.join(format!(".upload-{}.tmp", Uuid::new_v4()));

    let written = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    if written.is_err() {
        if let Err(e) = tokio::fs::remove_file(&tmp).await {
            warn!("Failed to remove temporary upload {}: {}", tmp.display(), e);
        }
    }
    written
}
