//! Integration tests for ftp-inventory
//!
//! The FTP server is replaced by the scripted `FakeSession`, so the full
//! walk → hash → save → reconcile → emit pipeline runs without a network.

use chrono::{TimeZone, Utc};
use ftp_inventory::config::HashConfig;
use ftp_inventory::error::FtpError;
use ftp_inventory::ftp::FakeSession;
use ftp_inventory::hasher::{md5_hex, HashPass, HashRun};
use ftp_inventory::inventory::{self, ContentHash, InventoryFormat, UnhashedReason};
use ftp_inventory::reconcile::{reconcile, save_mappings_csv, MoveStatus};
use ftp_inventory::redirect::{self, Dialect, EmitOutcome};
use ftp_inventory::walker::TreeWalker;
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

fn hash_config() -> HashConfig {
    HashConfig {
        retry_delay: Duration::ZERO,
        ..HashConfig::default()
    }
}

fn scan(fake: &mut FakeSession, start: &str) -> HashRun {
    let walked = TreeWalker::new(fake).walk(start).unwrap();
    HashPass::new(fake, hash_config()).run(walked.files).unwrap()
}

fn media_site() -> FakeSession {
    let mut fake = FakeSession::new();
    fake.add_file("/media/hero banner.png", b"hero")
        .add_file("/media/logo.png", b"logo")
        .add_file("/media/old/team.jpg", b"team photo")
        .add_file("/media/old/retired.gif", b"retired");
    fake
}

#[test]
fn test_scan_produces_complete_inventory() {
    let mut fake = media_site();

    let run = scan(&mut fake, "/media");

    assert!(run.summary.completed);
    assert_eq!(run.inventory.total_files(), 4);
    assert_eq!(run.inventory.unhashed_count(), 0);

    let hero = run.inventory.get("/media/hero banner.png").unwrap();
    assert_eq!(hero.name, "hero banner.png");
    assert_eq!(hero.size, 4);
    assert_eq!(hero.hash, ContentHash::digest(md5_hex(b"hero", 8192)));
}

#[test]
fn test_flaky_server_still_hashes_every_file_once() {
    let mut fake = media_site();
    let timeout = |p: &str| FtpError::Timeout { path: p.into() };
    fake.fail_retrieve("/media/logo.png", timeout("/media/logo.png"))
        .fail_retrieve("/media/logo.png", timeout("/media/logo.png"))
        .fail_noop(FtpError::ConnectionReset {
            path: "NOOP".into(),
            reason: "reset by peer".into(),
        })
        .fail_list(
            "/media/old",
            FtpError::TransientReply {
                path: "/media/old".into(),
                code: 421,
                message: "Too many connections".into(),
            },
        );

    let run = scan(&mut fake, "/media");

    assert_eq!(run.inventory.total_files(), 4);
    assert_eq!(run.summary.hashed, 4);
    assert_eq!(run.summary.errored, 0);
    assert_eq!(fake.retrievals("/media/logo.png"), 3);
    assert_eq!(
        run.inventory.get("/media/logo.png").unwrap().hash.as_digest(),
        Some(md5_hex(b"logo", 8192).as_str())
    );
}

#[test]
fn test_save_load_preserves_hashes_in_both_formats() {
    let dir = tempdir().unwrap();
    let mut fake = media_site();
    fake.fail_retrieve(
        "/media/old/team.jpg",
        FtpError::PermissionDenied {
            path: "/media/old/team.jpg".into(),
            reason: "550 Permission denied".into(),
        },
    );
    let run = scan(&mut fake, "/media");

    let written = inventory::save_all(
        &run.inventory,
        &dir.path().join("inv"),
        &[InventoryFormat::Csv, InventoryFormat::Json],
    )
    .unwrap();

    for path in &written {
        let loaded = inventory::load(path).unwrap();
        assert_eq!(loaded, run.inventory);
        assert_eq!(
            loaded.get("/media/old/team.jpg").unwrap().hash,
            ContentHash::Unhashed(UnhashedReason::Failed)
        );
    }
}

#[test]
fn test_rehash_completes_failed_files() {
    let dir = tempdir().unwrap();
    let mut fake = media_site();
    fake.fail_retrieve(
        "/media/logo.png",
        FtpError::Protocol {
            path: "/media/logo.png".into(),
            code: 500,
            message: "server error".into(),
        },
    );
    let first = scan(&mut fake, "/media");
    assert_eq!(first.summary.errored, 1);

    let path = dir.path().join("first.csv");
    inventory::save(&first.inventory, &path, InventoryFormat::Csv).unwrap();

    let loaded = inventory::load(&path).unwrap();
    let retrievals_before = fake.retrievals("/media/hero banner.png");
    let second = HashPass::new(&mut fake, hash_config())
        .run(loaded.into_files())
        .unwrap();

    assert_eq!(second.summary.hashed, 1);
    assert_eq!(second.summary.already_hashed, 3);
    assert_eq!(second.inventory.unhashed_count(), 0);
    assert_eq!(fake.retrievals("/media/hero banner.png"), retrievals_before);
}

#[test]
fn test_resume_from_checkpoint_skips_downloads() {
    let dir = tempdir().unwrap();
    let checkpoint = dir.path().join("run.checkpoint.json");
    let mut fake = media_site();

    let walked = TreeWalker::new(&mut fake).walk("/media").unwrap();
    let config = HashConfig {
        checkpoint_interval: 1,
        ..hash_config()
    };
    HashPass::new(&mut fake, config)
        .with_checkpoint(checkpoint.clone())
        .run(walked.files)
        .unwrap();

    let previous = inventory::load(&checkpoint).unwrap();
    let walked = TreeWalker::new(&mut fake).walk("/media").unwrap();
    let resumed = HashPass::new(&mut fake, hash_config())
        .resume_from(&previous)
        .run(walked.files)
        .unwrap();

    assert_eq!(resumed.summary.carried_over, 4);
    assert_eq!(resumed.summary.hashed, 0);
    assert_eq!(fake.retrievals("/media/logo.png"), 1);
}

#[test]
fn test_reorganization_produces_redirects() {
    let dir = tempdir().unwrap();

    let mut before_site = media_site();
    let before = scan(&mut before_site, "/media").inventory;

    // Same content, reorganized: one move, one rename, one delete, one addition
    let mut after_site = FakeSession::new();
    after_site
        .add_file("/media/hero banner.png", b"hero")
        .add_file("/media/brand/logo.png", b"logo")
        .add_file("/media/people/team-2024.jpg", b"team photo")
        .add_file("/media/new.webp", b"new");
    let after = scan(&mut after_site, "/media").inventory;

    // Persist and reload through different formats
    let before_path = dir.path().join("before.json");
    let after_path = dir.path().join("after.csv");
    inventory::save(&before, &before_path, InventoryFormat::Json).unwrap();
    inventory::save(&after, &after_path, InventoryFormat::Csv).unwrap();
    let before = inventory::load(&before_path).unwrap();
    let after = inventory::load(&after_path).unwrap();

    let result = reconcile(&before, &after, Some("https://example.com"));
    let s = &result.summary;
    assert_eq!((s.moved, s.unchanged, s.new, s.deleted), (2, 1, 1, 1));
    assert!(result.events.iter().all(|e| e.status == MoveStatus::Moved));
    assert_eq!(result.events[0].old_path, "/media/logo.png");
    assert_eq!(result.events[0].new_url, "https://example.com/media/brand/logo.png");
    assert_eq!(result.events[1].filename, "team-2024.jpg");

    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let htaccess = dir.path().join("redirects.htaccess");
    assert_eq!(
        redirect::emit(&result.events, Dialect::Apache, at, &htaccess).unwrap(),
        EmitOutcome::Written { rules: 2 }
    );
    let text = fs::read_to_string(&htaccess).unwrap();
    assert!(text.contains("# Total redirects: 2"));
    assert!(text.contains("RewriteRule ^media/logo\\.png$ /media/brand/logo.png [R=301,L]"));

    let mappings = dir.path().join("url_mappings.csv");
    save_mappings_csv(&result.events, &mappings).unwrap();
    assert_eq!(fs::read_to_string(&mappings).unwrap().lines().count(), 3);
}

#[test]
fn test_unchanged_site_emits_nothing() {
    let dir = tempdir().unwrap();
    let before = scan(&mut media_site(), "/media").inventory;
    let after = scan(&mut media_site(), "/media").inventory;

    let result = reconcile(&before, &after, None);
    assert!(result.events.is_empty());
    assert_eq!(result.summary.unchanged, before.total_files());

    let path = dir.path().join("redirects.nginx.conf");
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    assert_eq!(
        redirect::emit(&result.events, Dialect::Nginx, at, &path).unwrap(),
        EmitOutcome::NothingToEmit
    );
    assert!(!path.exists());
}
