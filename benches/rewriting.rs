use criterion::{criterion_group, criterion_main, Criterion};
use std::collections::HashMap;
use std::path::Path;

use email_to_epub::attachments::{AttachmentExtractor, DiskExtractor};
use email_to_epub::book::EpubBook;
use email_to_epub::html::HtmlDocument;
use email_to_epub::parser::header::decode_rfc2047;
use email_to_epub::resolve::Resolver;

fn bench_decode_headers(c: &mut Criterion) {
    let words = [
        "=?UTF-8?B?SGVsbG8gd29ybGQsIHRoaXMgaXMgYSBuZXdzbGV0dGVy?=",
        "=?ISO-8859-1?Q?Caf=E9_cr=E8me_=26_croissants?=",
        "Plain subject without any encoding",
    ];

    c.bench_function("decode_rfc2047", |b| {
        b.iter(|| words.iter().map(|w| decode_rfc2047(w).len()).sum::<usize>())
    });
}

fn bench_rewrite_body(c: &mut Criterion) {
    let fixture_path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("hello.eml");
    let message = email_to_epub::parser::eml::parse_eml(&fixture_path).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let attachments =
        DiskExtractor::new(dir.path()).extract("hello.eml", &message.subject, &message.attachments);
    let downloads = HashMap::new();

    // A long newsletter: the same body repeated
    let html = message.html.repeat(50);

    c.bench_function("rewrite_newsletter_body", |b| {
        b.iter(|| {
            let doc = HtmlDocument::parse(&html);
            let mut book = EpubBook::new("Bench");
            let mut resolver = Resolver::new(&mut book, &downloads, &attachments);
            resolver.resolve_document(&doc);
            doc.body_xhtml().len()
        })
    });
}

criterion_group!(benches, bench_decode_headers, bench_rewrite_body);
criterion_main!(benches);
