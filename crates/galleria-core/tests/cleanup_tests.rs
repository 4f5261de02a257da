//! Validate, clean up, validate again.

mod common;

use common::Fixture;
use galleria_core::{
    CancellationToken, Classification, ExecutionMode, Galleria, GalleriaError, LayoutConvention,
};

fn broken_library(fx: &Fixture) {
    fx.flat_artifact(1, 10, 2);
    // orphan file and an orphan empty directory
    fx.file("10/2/p_0.png");
    fx.dir("11/5");
    // master reachable, one page never downloaded
    fx.flat_artifact(3, 10, 2);
    std::fs::remove_file(fx.root.join("10/3/p_1.png")).unwrap();
    // master missing entirely
    fx.master(4, 10, "10/4");
    fx.page(4, 0, "10/4/p_0.png");
    fx.catalog().insert_tag_link(4, "sketch").unwrap();
    // no owner: reported, never purged
    fx.master(6, 0, "0/6");
}

#[test]
fn test_cleanup_leaves_consistent_library() {
    let fx = Fixture::new();
    broken_library(&fx);
    let engine = fx.engine();
    let token = CancellationToken::new();

    let report = engine.validate().unwrap();
    assert_eq!(report.incomplete_downloads(), vec![3, 4]);
    let path = fx.tmp.path().join("validation_result.json");
    report.write(&path).unwrap();

    let loaded = galleria_core::ReconciliationReport::read(&path).unwrap();
    let summary = engine
        .cleanup(&loaded, ExecutionMode::Commit, &token)
        .unwrap();
    assert_eq!(summary.purged_artifacts, vec![3, 4]);
    assert_eq!(summary.orphan_files, 1);
    assert_eq!(summary.orphan_directories, 1);

    assert!(!fx.exists("10/2"));
    assert!(!fx.exists("11"));
    assert!(!fx.exists("10/3"));
    assert!(fx.exists("10/1/p_1.png"));

    let catalog = fx.catalog();
    assert!(catalog.master(3).unwrap().is_none());
    assert!(catalog.master(4).unwrap().is_none());
    assert_eq!(catalog.tag_link_count(4).unwrap(), 0);
    assert!(catalog.master(6).unwrap().is_some());

    let after = engine.validate().unwrap();
    assert!(after.orphan_files.is_empty());
    assert!(after.orphan_directories.is_empty());
    assert_eq!(after.artifacts_with(Classification::Ok), vec![1]);
    assert_eq!(after.artifacts_with(Classification::NoOwner), vec![6]);
}

#[test]
fn test_cleanup_dry_run_touches_nothing() {
    let fx = Fixture::new();
    broken_library(&fx);
    let engine = fx.engine();

    let report = engine.validate().unwrap();
    let summary = engine
        .cleanup(&report, ExecutionMode::DryRun, &CancellationToken::new())
        .unwrap();

    assert!(!summary.log.is_empty());
    assert!(summary.log.lines().iter().all(|l| l.contains("WOULD ")));
    assert!(fx.exists("10/2/p_0.png"));
    assert!(fx.exists("11/5"));
    assert!(fx.catalog().master(3).unwrap().is_some());
    assert_eq!(engine.validate().unwrap(), report);
}

#[test]
fn test_stale_report_is_rejected() {
    let fx = Fixture::new();
    broken_library(&fx);
    let engine = fx.engine();
    let report = engine.validate().unwrap();

    std::fs::remove_file(fx.root.join("10/2/p_0.png")).unwrap();
    let err = engine
        .cleanup(&report, ExecutionMode::Commit, &CancellationToken::new())
        .unwrap_err();

    assert!(matches!(err, GalleriaError::StaleReport { .. }));
    assert!(fx.exists("11/5"));
    assert!(fx.catalog().master(4).unwrap().is_some());
}

#[test]
fn test_cancelled_cleanup_purges_nothing() {
    let fx = Fixture::new();
    broken_library(&fx);
    let engine = fx.engine();
    let report = engine.validate().unwrap();
    let token = CancellationToken::new();
    token.cancel();

    let err = engine
        .cleanup(&report, ExecutionMode::Commit, &token)
        .unwrap_err();
    assert!(matches!(err, GalleriaError::Cancelled));
    assert!(fx.catalog().master(3).unwrap().is_some());
}

#[test]
fn test_single_file_still_stored_as_zip_survives_cleanup() {
    let fx = Fixture::new();
    fx.zip_file("10/7/ugoira.zip", &["000.jpg", "001.jpg"]);
    fx.master(7, 10, "10/7/ugoira.zip");
    fx.page(7, 0, "10/7/ugoira.zip");
    let engine = fx.engine();

    let report = engine.validate().unwrap();
    assert_eq!(report.classifications[&7], Classification::Ok);
    assert!(report.orphan_files.is_empty());
    assert_eq!(engine.verify().unwrap().error_count(), 0);

    engine
        .cleanup(&report, ExecutionMode::Commit, &CancellationToken::new())
        .unwrap();
    assert!(fx.exists("10/7/ugoira.zip"));
    assert!(fx.catalog().master(7).unwrap().is_some());
}

#[test]
fn test_unlisted_archives_are_not_purged() {
    let fx = Fixture::new();
    fx.flat_artifact(1, 10, 2);
    let token = CancellationToken::new();
    let engine = fx.engine();
    let plan = engine
        .plan_migration(LayoutConvention::Flat, LayoutConvention::Archive)
        .unwrap();
    engine.execute(&plan, ExecutionMode::Commit, &token).unwrap();

    let unlisted = Galleria::builder(&fx.db, &fx.root)
        .list_archives(false)
        .build()
        .unwrap();
    let report = unlisted.validate().unwrap();
    assert_eq!(report.classifications[&1], Classification::Ok);

    unlisted
        .cleanup(&report, ExecutionMode::Commit, &token)
        .unwrap();
    assert!(fx.exists("10/1.zip"));
    assert!(fx.catalog().master(1).unwrap().is_some());
}

#[test]
fn test_remove_empty_directories_standalone() {
    let fx = Fixture::new();
    fx.dir("a/b");
    fx.file("c/keep.png");

    let log =
        galleria_core::remove_empty_directories(&fx.root, ExecutionMode::Commit).unwrap();
    assert_eq!(log.len(), 2);
    assert!(!fx.exists("a"));
    assert!(fx.exists("c/keep.png"));
    assert!(fx.root.is_dir());
}
