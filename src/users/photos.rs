use bytes::Bytes;
use uuid::Uuid;

/// A decoded profile upload.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub body: Bytes,
    pub content_type: String,
    /// Client side file name, logged only. Never used to build a path.
    pub original_name: Option<String>,
}

pub fn is_image(content_type: &str) -> bool {
    content_type.starts_with("image/")
}

/// Storage name for a new photo: `<user id>-<photo id>.<ext>`. Every upload
/// gets a fresh name so the live photo is never overwritten in place.
pub fn photo_file_name(user_id: Uuid, content_type: &str) -> String {
    let ext = ext_from_mime(content_type).unwrap_or("bin");
    format!("{}-{}.{}", user_id, Uuid::new_v4().simple(), ext)
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        "image/avif" => Some("avif"),
        "image/bmp" => Some("bmp"),
        "image/tiff" => Some("tiff"),
        "image/svg+xml" => Some("svg"),
        _ => None,
    }
}

/// Content type to serve a stored photo with, from its extension.
pub fn content_type_for(file_name: &str) -> &'static str {
    match file_name.rsplit_once('.').map(|(_, ext)| ext) {
        Some("jpg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("heic") => "image/heic",
        Some("avif") => "image/avif",
        Some("bmp") => "image/bmp",
        Some("tiff") => "image/tiff",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
