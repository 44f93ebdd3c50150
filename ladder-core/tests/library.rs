use std::path::{Path, PathBuf};

use tempfile::TempDir;

use ladder_core::{
    AuditFinding, EncodeSection, EngineLocator, EngineSection, IngestRequest, LadderConfig,
    LibraryError, LibrarySection, Resolution, SqliteVideoStore, VideoLibrary,
};

const HAPPY_ENGINE: &str = "#!/bin/sh\n\
for arg in \"$@\"; do out=\"$arg\"; done\n\
printf 'out_time=00:00:05.000000\\nprogress=continue\\n'\n\
printf 'encoded payload\\n' > \"$out\"\n\
printf 'progress=end\\n'\n\
exit 0\n";

const HAPPY_PROBER: &str = "#!/bin/sh\n\
printf '{\"format\":{\"duration\":\"10.000000\",\"format_name\":\"mov,mp4\"},\"streams\":[]}'\n\
exit 0\n";

const FAILING_PROBER: &str = "#!/bin/sh\n\
echo 'moov atom not found' >&2\n\
exit 1\n";

fn write_stub(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn test_config(base: &Path) -> LadderConfig {
    LadderConfig {
        library: LibrarySection {
            media_dir: base.join("media").to_string_lossy().to_string(),
            db_path: base.join("videos.sqlite").to_string_lossy().to_string(),
            logs_dir: base.join("logs").to_string_lossy().to_string(),
        },
        engine: EngineSection {
            ffmpeg_bin: "ffmpeg".into(),
            ffprobe_bin: "ffprobe".into(),
        },
        encode: EncodeSection {
            video_codec: "libx264".into(),
            preset: "veryfast".into(),
            crf: 23,
            audio_codec: "aac".into(),
            audio_bitrate: "128k".into(),
            faststart: true,
        },
    }
}

fn build_library(base: &Path, engine_body: &str, prober_body: &str) -> VideoLibrary {
    let config = test_config(base);
    let store = SqliteVideoStore::builder()
        .path(&config.library.db_path)
        .build()
        .unwrap();
    store.initialize().unwrap();
    let ffmpeg = write_stub(base, "ffmpeg-stub", engine_body);
    let ffprobe = write_stub(base, "ffprobe-stub", prober_body);
    VideoLibrary::new(store, EngineLocator::new(ffmpeg, ffprobe), &config)
}

fn stage_upload(base: &Path, name: &str) -> PathBuf {
    let staging = base.join("staging");
    std::fs::create_dir_all(&staging).unwrap();
    let path = staging.join(name);
    std::fs::write(&path, b"raw upload bytes").unwrap();
    path
}

fn ingest_request(base: &Path, display_name: &str, upload_name: &str) -> IngestRequest {
    IngestRequest {
        owner: "user-1".into(),
        display_name: display_name.into(),
        upload_name: upload_name.into(),
        staged_file: stage_upload(base, upload_name),
    }
}

#[tokio::test]
async fn ingest_moves_upload_into_place_and_probes_duration() {
    let dir = TempDir::new().unwrap();
    let library = build_library(dir.path(), HAPPY_ENGINE, HAPPY_PROBER);

    let request = ingest_request(dir.path(), "clip", "clip.mp4");
    let staged = request.staged_file.clone();
    let video = library.ingest(request).await.unwrap();

    assert!(video.source.exists());
    assert!(!staged.exists());
    assert!(video.source.starts_with(library.media_dir()));
    let name = video.source.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.ends_with("_clip.mp4"));
    assert_eq!(video.duration, Some(10.0));
    assert!(video.format.is_empty());

    let fetched = library.store().fetch_by_id(&video.id).unwrap().unwrap();
    assert_eq!(fetched.source, video.source);
}

#[tokio::test]
async fn ingest_survives_probe_failure_with_duration_unset() {
    let dir = TempDir::new().unwrap();
    let library = build_library(dir.path(), HAPPY_ENGINE, FAILING_PROBER);

    let video = library
        .ingest(ingest_request(dir.path(), "clip", "clip.mp4"))
        .await
        .unwrap();
    assert_eq!(video.duration, None);
    assert!(library.store().fetch_by_id(&video.id).unwrap().is_some());
}

#[tokio::test]
async fn encode_places_rendition_under_id_and_resolution_directory() {
    let dir = TempDir::new().unwrap();
    let library = build_library(dir.path(), HAPPY_ENGINE, HAPPY_PROBER);
    let video = library
        .ingest(ingest_request(dir.path(), "clip", "clip.mp4"))
        .await
        .unwrap();

    let report = library
        .encode(&video.id, &[Resolution::P720], None)
        .await
        .unwrap();
    assert!(report.all_succeeded());
    assert_eq!(report.completed, vec![Resolution::P720]);

    let refreshed = library.store().fetch_by_id(&video.id).unwrap().unwrap();
    let rendition = refreshed.format.get(&Resolution::P720).expect("720p entry");
    assert!(rendition.exists());

    let expected_dir = video.source.parent().unwrap().join(&video.id).join("720p");
    assert_eq!(rendition.parent().unwrap(), expected_dir.as_path());
    let name = rendition.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.ends_with("_clip.mp4"));
}

#[tokio::test]
async fn rename_moves_primary_and_every_rendition() {
    let dir = TempDir::new().unwrap();
    let library = build_library(dir.path(), HAPPY_ENGINE, HAPPY_PROBER);
    let video = library
        .ingest(ingest_request(dir.path(), "clip", "clip.mp4"))
        .await
        .unwrap();
    library
        .encode(&video.id, &[Resolution::P720, Resolution::P480], None)
        .await
        .unwrap();

    let before = library.store().fetch_by_id(&video.id).unwrap().unwrap();
    let old_primary = before.source.clone();
    let old_720 = before.format[&Resolution::P720].clone();
    let old_480 = before.format[&Resolution::P480].clone();

    let renamed = library.rename(&video.id, "holiday").await.unwrap();

    // Exactly three files moved: the primary plus both renditions.
    assert!(!old_primary.exists());
    assert!(!old_720.exists());
    assert!(!old_480.exists());
    assert!(renamed.source.exists());
    assert_eq!(renamed.format.len(), 2);
    for (resolution, path) in &renamed.format {
        assert!(path.exists(), "missing rendition for {resolution}");
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with("_holiday.mp4"));
        // Renditions never leave their resolution directory.
        assert_eq!(path.parent(), before.format[resolution].parent());
    }
    let primary_name = renamed.source.file_name().unwrap().to_string_lossy().to_string();
    assert!(primary_name.ends_with("_holiday.mp4"));

    let persisted = library.store().fetch_by_id(&video.id).unwrap().unwrap();
    assert_eq!(persisted.source, renamed.source);
    assert_eq!(persisted.format, renamed.format);
}

#[tokio::test]
async fn rename_aborts_cleanly_when_primary_move_fails() {
    let dir = TempDir::new().unwrap();
    let library = build_library(dir.path(), HAPPY_ENGINE, HAPPY_PROBER);
    let video = library
        .ingest(ingest_request(dir.path(), "clip", "clip.mp4"))
        .await
        .unwrap();
    library
        .encode(&video.id, &[Resolution::P720], None)
        .await
        .unwrap();
    let before = library.store().fetch_by_id(&video.id).unwrap().unwrap();

    std::fs::remove_file(&before.source).unwrap();
    let err = library.rename(&video.id, "holiday").await.unwrap_err();
    assert!(matches!(err, LibraryError::Relocation(_)));

    // Nothing else was touched: the rendition and the record are unchanged.
    assert!(before.format[&Resolution::P720].exists());
    let persisted = library.store().fetch_by_id(&video.id).unwrap().unwrap();
    assert_eq!(persisted.source, before.source);
}

#[tokio::test]
async fn rename_mid_sequence_failure_leaves_partial_state_and_old_record() {
    let dir = TempDir::new().unwrap();
    let library = build_library(dir.path(), HAPPY_ENGINE, HAPPY_PROBER);
    let video = library
        .ingest(ingest_request(dir.path(), "clip", "clip.mp4"))
        .await
        .unwrap();
    library
        .encode(&video.id, &[Resolution::P720, Resolution::P480], None)
        .await
        .unwrap();
    let before = library.store().fetch_by_id(&video.id).unwrap().unwrap();

    // The 480p file disappears underneath us; its move will fail after the
    // primary and the 720p rendition have already moved.
    std::fs::remove_file(&before.format[&Resolution::P480]).unwrap();
    let err = library.rename(&video.id, "holiday").await.unwrap_err();
    assert!(matches!(err, LibraryError::Relocation(_)));

    // No rollback: the primary has moved, the record still holds the old
    // layout.
    assert!(!before.source.exists());
    assert!(!before.format[&Resolution::P720].exists());
    let persisted = library.store().fetch_by_id(&video.id).unwrap().unwrap();
    assert_eq!(persisted.source, before.source);
    assert_eq!(persisted.format, before.format);
}

#[tokio::test]
async fn delete_with_missing_primary_still_reclaims_directory_and_record() {
    let dir = TempDir::new().unwrap();
    let library = build_library(dir.path(), HAPPY_ENGINE, HAPPY_PROBER);
    let video = library
        .ingest(ingest_request(dir.path(), "clip", "clip.mp4"))
        .await
        .unwrap();
    library
        .encode(&video.id, &[Resolution::P720], None)
        .await
        .unwrap();

    let derived_root = video.source.parent().unwrap().join(&video.id);
    assert!(derived_root.exists());
    std::fs::remove_file(&video.source).unwrap();

    let report = library.delete(&video.id).await.unwrap();
    assert!(!report.primary_removed);
    assert!(report.derived_removed);
    assert!(report.record_removed);
    assert!(!derived_root.exists());
    assert!(library.store().fetch_by_id(&video.id).unwrap().is_none());
}

#[tokio::test]
async fn delete_removes_everything_for_an_intact_video() {
    let dir = TempDir::new().unwrap();
    let library = build_library(dir.path(), HAPPY_ENGINE, HAPPY_PROBER);
    let video = library
        .ingest(ingest_request(dir.path(), "clip", "clip.mp4"))
        .await
        .unwrap();
    library
        .encode(&video.id, &[Resolution::P480], None)
        .await
        .unwrap();

    let report = library.delete(&video.id).await.unwrap();
    assert!(report.primary_removed);
    assert!(report.derived_removed);
    assert!(report.record_removed);
    assert!(!video.source.exists());
}

#[tokio::test]
async fn reprobe_refreshes_duration_from_engine() {
    let dir = TempDir::new().unwrap();
    let library = build_library(dir.path(), HAPPY_ENGINE, HAPPY_PROBER);
    let video = library
        .ingest(ingest_request(dir.path(), "clip", "clip.mp4"))
        .await
        .unwrap();
    assert_eq!(video.duration, Some(10.0));

    // The prober now reports a longer cut.
    write_stub(
        dir.path(),
        "ffprobe-stub",
        "#!/bin/sh\nprintf '{\"format\":{\"duration\":\"25.000000\"}}'\nexit 0\n",
    );
    let refreshed = library.reprobe(&video.id).await.unwrap();
    assert_eq!(refreshed.duration, Some(25.0));
    let persisted = library.store().fetch_by_id(&video.id).unwrap().unwrap();
    assert_eq!(persisted.duration, Some(25.0));
}

#[tokio::test]
async fn audit_reports_missing_files_and_orphan_directories() {
    let dir = TempDir::new().unwrap();
    let library = build_library(dir.path(), HAPPY_ENGINE, HAPPY_PROBER);
    let video = library
        .ingest(ingest_request(dir.path(), "clip", "clip.mp4"))
        .await
        .unwrap();
    library
        .encode(&video.id, &[Resolution::P720], None)
        .await
        .unwrap();

    let persisted = library.store().fetch_by_id(&video.id).unwrap().unwrap();
    std::fs::remove_file(&persisted.format[&Resolution::P720]).unwrap();
    std::fs::remove_file(&persisted.source).unwrap();
    let orphan = library.media_dir().join("stale-id");
    std::fs::create_dir_all(&orphan).unwrap();

    let findings = library.audit().await.unwrap();
    assert!(findings.contains(&AuditFinding::MissingPrimary {
        video_id: video.id.clone(),
        path: persisted.source.clone(),
    }));
    assert!(findings.contains(&AuditFinding::MissingRendition {
        video_id: video.id.clone(),
        resolution: Resolution::P720,
        path: persisted.format[&Resolution::P720].clone(),
    }));
    assert!(findings.contains(&AuditFinding::OrphanDirectory { path: orphan }));
}

#[tokio::test]
async fn unknown_video_id_is_reported_as_not_found() {
    let dir = TempDir::new().unwrap();
    let library = build_library(dir.path(), HAPPY_ENGINE, HAPPY_PROBER);
    let err = library.rename("ghost", "holiday").await.unwrap_err();
    assert!(matches!(err, LibraryError::NotFound { .. }));
}
