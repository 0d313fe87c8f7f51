use crate::server::forms::ImageUpload;
use image::ImageFormat;
use std::{io, path::Path};
use tokio::{fs::OpenOptions, io::AsyncWriteExt};
use tracing::debug;

/// Where uploaded files are served from.
pub const MEDIA_URL: &str = "/media";

const POST_IMAGE_DIR: &str = "posts";
const MAX_STEM_LEN: usize = 50;

/// Writes a post image below `media_root` and returns its path relative to it.
pub async fn store_post_image(media_root: &Path, image: &ImageUpload) -> io::Result<String> {
    store_with_suffixes(media_root, image, rand::random).await
}

/// Never replaces an existing file, a taken name is retried with the next suffix.
async fn store_with_suffixes(
    media_root: &Path,
    image: &ImageUpload,
    mut next_suffix: impl FnMut() -> u32,
) -> io::Result<String> {
    let dir = media_root.join(POST_IMAGE_DIR);
    tokio::fs::create_dir_all(&dir).await?;

    loop {
        let file_name = upload_file_name(image.file_name(), image.format(), next_suffix());
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dir.join(&file_name))
            .await
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                debug!(file_name, "Upload name taken, drawing another");
                continue;
            }
            Err(err) => return Err(err),
        };
        file.write_all(image.bytes()).await?;
        file.flush().await?;

        let path = format!("{POST_IMAGE_DIR}/{file_name}");
        debug!(path, size = image.bytes().len(), "Stored post image");
        return Ok(path);
    }
}

/// Keeps a recognizable, filesystem-safe part of the client's file name.
fn upload_file_name(original: &str, format: ImageFormat, suffix: u32) -> String {
    let stem = Path::new(original)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default();
    let mut stem: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .take(MAX_STEM_LEN)
        .collect();
    if stem.is_empty() {
        stem.push_str("image");
    }

    let extension = format.extensions_str().first().copied().unwrap_or("img");
    format!("{stem}_{suffix:08x}.{extension}")
}
