//! MIME type detection based on file extensions.

/// Content type for a filename, from its extension.
///
/// Unknown extensions fall back to `application/octet-stream`.
pub fn content_type(filename: &str) -> &'static str {
    match extension(filename) {
        "pdf" => "application/pdf",
        "css" => "text/css",
        "htm" | "html" => "text/html",
        "js" => "text/javascript",
        "map" | "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "mp4" => "video/mp4",
        "gif" => "image/gif",
        "apk" => "application/vnd.android.package-archive",
        "txt" => "text/plain",
        "mpeg" => "video/mpeg",
        "webm" => "video/webm",
        "mp3" => "audio/mp3",
        "mpga" => "audio/mpeg",
        "weba" => "audio/webm",
        "wav" => "audio/wave",
        "gz" | "tgz" => "application/gzip",
        "zip" => "application/zip",
        "ico" => "image/x-icon",
        _ => {
            tracing::warn!(filename, "content-type not defined for file");
            "application/octet-stream"
        }
    }
}

fn extension(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(pos) => &filename[pos + 1..],
        None => "",
    }
}
