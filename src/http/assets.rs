use std::{
    convert::Infallible,
    path::{Path, PathBuf},
    sync::Arc,
};

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, Method, Response, StatusCode},
    response::IntoResponse,
};
use percent_encoding::percent_decode_str;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tower::ServiceExt;
use tower_http::services::ServeDir;

use super::{encoding::Encoding, ApiError, SiteState};

const PRECOMPRESSED_EXTENSIONS: [&str; 3] = ["html", "css", "js"];

/// Maps a percent-decoded request path onto the serving root.
///
/// Returns `None` for anything that is not a plain relative path, leaving the
/// directory service to reject it.
fn resolve(root: &Path, uri_path: &str) -> Option<PathBuf> {
    if uri_path == "/" {
        return Some(root.join("index.html"));
    }
    let mut path = root.to_path_buf();
    for segment in uri_path.split('/') {
        let segment = percent_decode_str(segment).decode_utf8().ok()?;
        match &*segment {
            "" | "." => {}
            ".." => return None,
            s if s.contains(['/', '\\', '\0']) => return None,
            s => path.push(s),
        }
    }
    Some(path)
}

/// Content types pinned for the site's own asset types.
fn pinned_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?;
    Some(match ext {
        "html" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "webp" => "image/webp",
        "json" => "application/json",
        _ => return None,
    })
}

fn content_type(path: &Path) -> HeaderValue {
    //parse mime type from the file head when the extension says nothing
    pinned_type(path)
        .or_else(|| tree_magic_mini::from_filepath(path))
        .and_then(|mime| HeaderValue::from_str(mime).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"))
}

/// Streams the first existing precompressed sibling of `path` in `accepted` order.
async fn precompressed(
    path: &Path,
    accepted: &[Encoding],
) -> Result<Option<Response<Body>>, ApiError> {
    let compressible = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| PRECOMPRESSED_EXTENSIONS.contains(&ext));
    if !compressible {
        return Ok(None);
    }
    for &encoding in accepted {
        let sibling = encoding.sibling_of(path);
        if !tokio::fs::metadata(&sibling)
            .await
            .is_ok_and(|meta| meta.is_file())
        {
            continue;
        }
        let file = File::open(&sibling)
            .await
            .map_err(|_| ApiError::Internal("Failed to open precompressed asset"))?;
        let size = file.metadata().await.map(|meta| meta.len()).unwrap_or(0);
        let mut resp = Response::new(Body::from_stream(ReaderStream::new(file)));
        let headers = resp.headers_mut();
        headers.insert(header::CONTENT_TYPE, content_type(path));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
        headers.insert(header::CONTENT_ENCODING, encoding.header_value());
        headers.insert(header::VARY, HeaderValue::from_static("Accept-Encoding"));
        return Ok(Some(resp));
    }
    Ok(None)
}

async fn serve_dir(root: &Path, request: Request) -> Response<Body> {
    let result: Result<_, Infallible> = ServeDir::new(root).oneshot(request).await;
    match result {
        Ok(resp) => resp.into_response(),
        Err(never) => match never {},
    }
}

/// Production asset handler: precompressed siblings first, then plain files.
pub async fn get(State(state): State<Arc<SiteState>>, request: Request) -> Response<Body> {
    let Some(path) = resolve(&state.root, request.uri().path()) else {
        return serve_dir(&state.root, request).await;
    };
    let accepted = if request.method() == Method::GET {
        Encoding::accepted(request.headers())
    } else {
        Vec::new()
    };
    match precompressed(&path, &accepted).await {
        Ok(Some(resp)) => return resp,
        Ok(None) => {}
        Err(err) => return err.into_response(),
    }

    let mut resp = serve_dir(&state.root, request).await;
    if resp.status() == StatusCode::OK && path.is_file() {
        let unknown = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .map_or(true, |ct| ct == "application/octet-stream");
        if pinned_type(&path).is_some() || unknown {
            resp.headers_mut()
                .insert(header::CONTENT_TYPE, content_type(&path));
        }
    }
    resp
}

#[cfg(test)]
mod tests {
    use std::fs;

    use axum::body::to_bytes;
    use rstest::rstest;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::http::production_router;

    const GZ_BYTES: &[u8] = b"\x1f\x8b pretend gzip";
    const ZST_BYTES: &[u8] = b"\x28\xb5\x2f\xfd pretend zstd";

    fn dist() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::write(root.join("index.html"), "<html></html>").unwrap();
        fs::write(root.join("index.html.gz"), GZ_BYTES).unwrap();
        fs::write(root.join("style.min.css"), ".a{color:red}").unwrap();
        fs::write(root.join("style.min.css.gz"), GZ_BYTES).unwrap();
        fs::write(root.join("script.min.js"), "start();").unwrap();
        fs::write(root.join("script.min.js.gz"), GZ_BYTES).unwrap();
        fs::write(root.join("script.min.js.zst"), ZST_BYTES).unwrap();
        fs::write(root.join("build-stats.json"), "{}").unwrap();
        tmp
    }

    async fn fetch(root: &Path, uri: &str, accept: Option<&str>) -> Response<Body> {
        let mut req = Request::builder().uri(uri);
        if let Some(accept) = accept {
            req = req.header(header::ACCEPT_ENCODING, accept);
        }
        production_router(root.to_path_buf(), std::time::Duration::from_secs(60))
            .oneshot(req.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body(resp: Response<Body>) -> Vec<u8> {
        to_bytes(resp.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    #[tokio::test]
    async fn serves_gzip_sibling() {
        let tmp = dist();
        let resp = fetch(tmp.path(), "/style.min.css", Some("gzip, deflate")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_ENCODING], "gzip");
        assert_eq!(resp.headers()[header::VARY], "Accept-Encoding");
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/css");
        assert_eq!(
            resp.headers()[header::CONTENT_LENGTH],
            GZ_BYTES.len().to_string().as_str()
        );
        assert_eq!(body(resp).await, GZ_BYTES);
    }

    #[tokio::test]
    async fn root_maps_to_index() {
        let tmp = dist();
        let resp = fetch(tmp.path(), "/", Some("gzip")).await;
        assert_eq!(resp.headers()[header::CONTENT_ENCODING], "gzip");
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/html");
        assert_eq!(body(resp).await, GZ_BYTES);
    }

    #[tokio::test]
    async fn prefers_zstd_when_both_exist() {
        let tmp = dist();
        let resp = fetch(tmp.path(), "/script.min.js", Some("gzip, zstd")).await;
        assert_eq!(resp.headers()[header::CONTENT_ENCODING], "zstd");
        assert_eq!(body(resp).await, ZST_BYTES);

        let resp = fetch(tmp.path(), "/style.min.css", Some("gzip, zstd")).await;
        assert_eq!(resp.headers()[header::CONTENT_ENCODING], "gzip");
    }

    #[rstest]
    #[case(None)]
    #[case(Some("br"))]
    #[tokio::test]
    async fn plain_file_without_matching_encoding(#[case] accept: Option<&str>) {
        let tmp = dist();
        let resp = fetch(tmp.path(), "/style.min.css", accept).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().get(header::CONTENT_ENCODING).is_none());
        assert_eq!(body(resp).await, b".a{color:red}");
    }

    #[tokio::test]
    async fn plain_file_without_sibling() {
        let tmp = dist();
        fs::remove_file(tmp.path().join("style.min.css.gz")).unwrap();
        let resp = fetch(tmp.path(), "/style.min.css", Some("gzip")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().get(header::CONTENT_ENCODING).is_none());
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/css");
        assert_eq!(body(resp).await, b".a{color:red}");
    }

    #[tokio::test]
    async fn pinned_types_override_guesses() {
        let tmp = dist();
        let resp = fetch(tmp.path(), "/script.min.js", None).await;
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/javascript");
        let resp = fetch(tmp.path(), "/build-stats.json", Some("gzip")).await;
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
        assert!(resp.headers().get(header::CONTENT_ENCODING).is_none());
    }

    #[tokio::test]
    async fn hardening_headers_on_every_response() {
        let tmp = dist();
        for uri in ["/style.min.css", "/missing.css"] {
            let resp = fetch(tmp.path(), uri, Some("gzip")).await;
            assert_eq!(resp.headers()[header::CACHE_CONTROL], "public, max-age=60");
            assert_eq!(resp.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
            assert_eq!(resp.headers()[header::X_FRAME_OPTIONS], "DENY");
            assert_eq!(resp.headers()[header::X_XSS_PROTECTION], "1; mode=block");
        }
    }

    #[tokio::test]
    async fn escaped_names_get_their_sibling() {
        let tmp = dist();
        fs::write(tmp.path().join("my page.html"), "<p>page</p>").unwrap();
        fs::write(tmp.path().join("my page.html.gz"), GZ_BYTES).unwrap();
        let resp = fetch(tmp.path(), "/my%20page.html", Some("gzip")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_ENCODING], "gzip");
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/html");
        assert_eq!(body(resp).await, GZ_BYTES);
    }

    #[tokio::test]
    async fn traversal_is_not_resolved() {
        let tmp = dist();
        let resp = fetch(tmp.path(), "/../style.min.css", Some("gzip")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[rstest]
    #[case("/", Some("index.html"))]
    #[case("/css/site.css", Some("css/site.css"))]
    #[case("//a/./b.js", Some("a/b.js"))]
    #[case("/../etc/passwd", None)]
    #[case("/%2e%2e/b.css", None)]
    #[case("/a%2fb.css", None)]
    #[case("/a%5c..%5cb.css", None)]
    #[case("/my%20page.html", Some("my page.html"))]
    #[case("/bad%ff.css", None)]
    fn resolves_request_paths(#[case] uri: &str, #[case] expected: Option<&str>) {
        let root = Path::new("/srv/dist");
        assert_eq!(resolve(root, uri), expected.map(|rel| root.join(rel)));
    }
}
