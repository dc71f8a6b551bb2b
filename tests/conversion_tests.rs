//! End-to-end conversion tests: `.eml` fixtures in, EPUB out.

use std::io::Read;
use std::path::{Path, PathBuf};

use assert_fs::prelude::*;
use predicates::prelude::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use email_to_epub::config::Config;
use email_to_epub::error::ConvertError;
use email_to_epub::pipeline::{ConvertOptions, Converter, Summary};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01\x08\x06\0\0\0";

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Copy a fixture into `dir`, pointing its remote images at `server`.
fn stage(dir: &Path, name: &str, server: Option<&MockServer>) -> PathBuf {
    let mut text = std::fs::read_to_string(fixture(name)).unwrap();
    if let Some(server) = server {
        text = text.replace("IMAGE_HOST", &server.address().to_string());
    }
    let staged = dir.join(name);
    std::fs::write(&staged, text).unwrap();
    staged
}

fn options(dir: &Path, output: &str) -> ConvertOptions {
    let mut options = ConvertOptions::from_config(&Config::default(), dir.join(output));
    options.images_dir = dir.join("images");
    options.attachments_dir = dir.join("attachments");
    options
}

async fn convert(dir: &Path, output: &str, emails: &[PathBuf]) -> Result<Summary, ConvertError> {
    let mut converter = Converter::new(options(dir, output))?;
    converter.run(emails, None).await
}

fn read_entry(epub: &Path, name: &str) -> String {
    let mut archive = zip::ZipArchive::new(std::fs::File::open(epub).unwrap()).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut text = String::new();
    entry.read_to_string(&mut text).unwrap();
    text
}

fn count_images(page: &str) -> usize {
    page.matches("<img").count()
}

async fn png_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG))
        .expect(1)
        .mount(&server)
        .await;
    server
}

// ─── Remote and inline images end up in the book ────────────────────

#[tokio::test]
async fn test_remote_and_inline_images_are_embedded() {
    let server = png_server().await;
    let dir = tempfile::tempdir().unwrap();
    let email = stage(dir.path(), "hello.eml", Some(&server));

    let summary = convert(dir.path(), "out.epub", &[email]).await.unwrap();

    assert_eq!(summary.chapters, 1);
    // Cover, remote a.png, inline img1
    assert_eq!(summary.images, 3);
    assert_eq!(summary.failed_downloads, 0);

    let epub = dir.path().join("out.epub");
    let nav = read_entry(&epub, "OEBPS/nav.xhtml");
    assert!(nav.contains(">1. Hello</a>"));

    let page = read_entry(&epub, "OEBPS/text/page1.xhtml");
    assert_eq!(count_images(&page), 2);
    assert_eq!(page.matches("src=\"../images/").count(), 2);
    assert!(page.contains("src=\"../images/attachment_img1.png\""));
    assert!(!page.contains("IMAGE_HOST") && !page.contains("cid:"));
    assert!(!page.contains("srcset") && !page.contains("loading="));
    assert!(page.contains(">Hello</span>"));
    assert!(page.contains("Newsletter &lt;news@example.com&gt;"));
    assert!(page.contains("Date:"));
}

// ─── A 200 response that is not an image ────────────────────────────

#[tokio::test]
async fn test_html_error_page_is_dropped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chart.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<!DOCTYPE html><html><body>Please log in</body></html>", "text/html"),
        )
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let email = stage(dir.path(), "error-page.eml", Some(&server));

    let summary = convert(dir.path(), "out.epub", &[email]).await.unwrap();

    assert_eq!(summary.images, 1, "only the cover is embedded");
    assert_eq!(summary.removed_images, 1);
    let page = read_entry(&dir.path().join("out.epub"), "OEBPS/text/page1.xhtml");
    assert_eq!(count_images(&page), 0);
    assert!(page.contains("<p>Chart:</p><p>End</p>"));
}

// ─── Missing content id and unsupported schemes are not fatal ───────

#[tokio::test]
async fn test_missing_content_id_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let email = stage(dir.path(), "missing-cid.eml", None);

    let summary = convert(dir.path(), "out.epub", &[email]).await.unwrap();

    assert_eq!(summary.chapters, 1);
    let page = read_entry(&dir.path().join("out.epub"), "OEBPS/text/page1.xhtml");
    assert!(!page.contains("cid:"));
    // Unsupported references are left as they are
    assert!(page.contains("src=\"file:///etc/passwd\""));
}

// ─── Text-only email with attachments ───────────────────────────────

#[tokio::test]
async fn test_plain_text_email_embeds_image_attachments() {
    let dir = tempfile::tempdir().unwrap();
    let email = stage(dir.path(), "plain.eml", None);

    let summary = convert(dir.path(), "out.epub", &[email]).await.unwrap();

    // Cover, beach.png and sunset.gif; itinerary.txt is skipped
    assert_eq!(summary.images, 3);
    let page = read_entry(&dir.path().join("out.epub"), "OEBPS/text/page1.xhtml");
    assert_eq!(count_images(&page), 2);
    assert!(page.contains("Two photos attached."));
    assert!(page.contains("See you soon &lt;3"));
    assert!(page.contains("Cc:"));
    assert!(page.contains("_attachment_1.png"));
    assert!(page.contains("_attachment_3.gif"));
}

// ─── Several emails keep their order ────────────────────────────────

#[tokio::test]
async fn test_chapters_follow_input_order() {
    let server = png_server().await;
    let dir = tempfile::tempdir().unwrap();
    let emails = vec![
        stage(dir.path(), "hello.eml", Some(&server)),
        stage(dir.path(), "plain.eml", None),
        stage(dir.path(), "missing-cid.eml", None),
    ];

    let summary = convert(dir.path(), "out.epub", &emails).await.unwrap();
    assert_eq!(summary.chapters, 3);

    let nav = read_entry(&dir.path().join("out.epub"), "OEBPS/nav.xhtml");
    let first = nav.find("1. Hello").unwrap();
    let second = nav.find("2. Holiday photos").unwrap();
    let third = nav.find("3. Broken inline image").unwrap();
    assert!(first < second && second < third);
}

// ─── Existing output is never touched ───────────────────────────────

#[tokio::test]
async fn test_existing_output_is_left_untouched() {
    let temp = assert_fs::TempDir::new().unwrap();
    let output = temp.child("out.epub");
    output.write_str("my old book").unwrap();
    let email = stage(temp.path(), "missing-cid.eml", None);

    let err = convert(temp.path(), "out.epub", &[email]).await.unwrap_err();

    assert!(matches!(err, ConvertError::OutputExists(_)));
    output.assert("my old book");
    // Fails before any working directory is created
    temp.child("images").assert(predicate::path::missing());
    temp.child("attachments").assert(predicate::path::missing());
}

// ─── A second run re-checks with HEAD instead of downloading ────────

#[tokio::test]
async fn test_second_run_reuses_downloaded_images() {
    let server = png_server().await;
    Mock::given(method("HEAD"))
        .and(path("/a.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-length", PNG.len().to_string().as_str())
                .set_body_bytes(PNG),
        )
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let email = stage(dir.path(), "hello.eml", Some(&server));

    let first = convert(dir.path(), "first.epub", std::slice::from_ref(&email))
        .await
        .unwrap();
    let second = convert(dir.path(), "second.epub", &[email]).await.unwrap();

    assert_eq!(first.images, second.images);
    assert!(dir.path().join("second.epub").exists());
    // `png_server` expects exactly one GET; verified when the server drops
}
