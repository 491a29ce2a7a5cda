//! Rerun flow: archived PDFs resubmit with their recovered source URL and
//! old file path.

mod common;

use chrono::{TimeZone, Utc};
use shelfmark_core::domains::archive::{Library, PdfStore, RerunApi, RerunSelection, SaveOptions};
use shelfmark_core::domains::convert::ConversionJobPayload;

use common::{memory_store, test_queue};

/// Minimal one-page PDF built through lopdf.
fn minimal_pdf() -> Vec<u8> {
    use lopdf::{dictionary, Document, Object, Stream};
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        lopdf::content::Content { operations: vec![] }
            .encode()
            .unwrap(),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

#[tokio::test]
async fn rerun_week_recovers_urls_and_old_paths() {
    let dir = tempfile::tempdir().unwrap();
    let pdf_store = PdfStore::new(dir.path());
    let when = Utc.with_ymd_and_hms(2024, 2, 5, 12, 0, 0).unwrap();

    let saved = pdf_store
        .save_pdf(
            &minimal_pdf(),
            "https://example.com/a",
            &SaveOptions {
                title: None,
                bookmarked_at: Some(when),
                direct_article: false,
            },
        )
        .await
        .unwrap();

    let store = memory_store();
    let convert_queue = test_queue("convert", store);
    let api = RerunApi::new(Library::new(dir.path()), convert_queue.clone());

    let summary = api.rerun_week("2024-W06").await.unwrap();
    assert_eq!(summary.submitted, 1);

    let job = convert_queue
        .get_job(&summary.jobs[0])
        .await
        .unwrap()
        .expect("rerun job exists");
    let payload: ConversionJobPayload = serde_json::from_value(job.data).unwrap();
    assert_eq!(payload.url, "https://example.com/a");
    assert_eq!(
        payload.old_file_path.as_deref(),
        Some(saved.to_string_lossy().as_ref())
    );
}

#[tokio::test]
async fn rerun_selected_accepts_files_and_urls() {
    let dir = tempfile::tempdir().unwrap();
    let pdf_store = PdfStore::new(dir.path());
    let when = Utc.with_ymd_and_hms(2024, 2, 5, 12, 0, 0).unwrap();
    pdf_store
        .save_pdf(
            &minimal_pdf(),
            "https://example.com/b",
            &SaveOptions {
                title: None,
                bookmarked_at: Some(when),
                direct_article: false,
            },
        )
        .await
        .unwrap();

    let store = memory_store();
    let convert_queue = test_queue("convert", store);
    let api = RerunApi::new(Library::new(dir.path()), convert_queue.clone());

    let summary = api
        .rerun_selected(RerunSelection {
            files: vec!["media/2024-W06/pdfs/example.com-b.pdf".to_string()],
            urls: vec!["https://example.com/fresh".to_string()],
        })
        .await
        .unwrap();
    assert_eq!(summary.submitted, 2);

    let from_file = convert_queue.get_job(&summary.jobs[0]).await.unwrap().unwrap();
    let payload: ConversionJobPayload = serde_json::from_value(from_file.data).unwrap();
    assert_eq!(payload.url, "https://example.com/b");
    assert!(payload.old_file_path.is_some());

    let from_url = convert_queue.get_job(&summary.jobs[1]).await.unwrap().unwrap();
    let payload: ConversionJobPayload = serde_json::from_value(from_url.data).unwrap();
    assert_eq!(payload.url, "https://example.com/fresh");
    assert!(payload.old_file_path.is_none());
}

#[tokio::test]
async fn rerun_skips_pdfs_without_subject() {
    let dir = tempfile::tempdir().unwrap();
    let pdfs = dir.path().join("media/2024-W06/pdfs");
    tokio::fs::create_dir_all(&pdfs).await.unwrap();
    // A bare PDF with no embedded Subject.
    tokio::fs::write(pdfs.join("orphan.pdf"), minimal_pdf())
        .await
        .unwrap();

    let store = memory_store();
    let convert_queue = test_queue("convert", store);
    let api = RerunApi::new(Library::new(dir.path()), convert_queue.clone());

    let summary = api.rerun_week("2024-W06").await.unwrap();
    assert_eq!(summary.submitted, 0);
}
