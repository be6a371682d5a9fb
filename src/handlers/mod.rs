//! Two small bundled convenience handlers: serve a single file from disk,
//! or serve a static in-memory blob. Both are illustrative uses of the
//! registry/handler traits, not part of the engine's hard core -- grounded
//! in `http_handle_file`/`http_handle_static` from the engine this crate's
//! shape is distilled from.

mod file;
mod static_blob;

pub use self::file::FileHandler;
pub use self::static_blob::StaticHandler;

/// Guess a MIME type from a path's extension, using the same small,
/// deliberately non-exhaustive table as the grounding source. Returns
/// `None` for anything not recognized; callers fall back to their own
/// default (typically `application/octet-stream`).
pub(crate) fn guess_content_type(path: &str) -> Option<&'static str> {
    const CONTENT_MAP: &[(&str, &str)] = &[
        (".ai", "application/postscript"),
        (".aif", "audio/aiff"),
        (".aiff", "audio/aiff"),
        (".avi", "video/avi"),
        (".au", "audio/basic"),
        (".bin", "application/octet-stream"),
        (".bmp", "image/bmp"),
        (".css", "text/css"),
        (".eps", "application/postscript"),
        (".gif", "image/gif"),
        (".htm", "text/html"),
        (".html", "text/html"),
        (".ico", "image/x-icon"),
        (".jpeg", "image/jpeg"),
        (".jpg", "image/jpeg"),
        (".js", "application/javascript"),
        (".md", "text/markdown"),
        (".mp2", "video/mpeg"),
        (".mp3", "audio/mpeg3"),
        (".mpeg", "video/mpeg"),
        (".mpg", "video/mpeg"),
        (".pdf", "application/pdf"),
        (".png", "image/png"),
        (".ps", "application/postscript"),
        (".rtf", "text/rtf"),
        (".text", "text/plain"),
        (".tif", "image/tiff"),
        (".tiff", "image/tiff"),
        (".txt", "text/plain"),
        (".wav", "audio/wav"),
        ("README", "text/plain"),
    ];
    CONTENT_MAP
        .iter()
        .find(|(ext, _)| path.len() >= ext.len() && path[path.len() - ext.len()..].eq_ignore_ascii_case(ext))
        .map(|(_, typ)| *typ)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_common_extensions() {
        assert_eq!(guess_content_type("/a/b/c.html"), Some("text/html"));
        assert_eq!(guess_content_type("/a/b/c.JPG"), Some("image/jpeg"));
        assert_eq!(guess_content_type("README"), Some("text/plain"));
        assert_eq!(guess_content_type("/a/b/c.unknown"), None);
    }
}
