//! Benchmarks for ftp-inventory
//!
//! Run with: cargo bench

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ftp_inventory::ftp::ListingEntry;
use ftp_inventory::hasher::md5_hex;
use ftp_inventory::inventory::{self, ContentHash, FileDescriptor, Inventory, InventoryFormat};
use ftp_inventory::reconcile::reconcile;
use ftp_inventory::redirect::{render, Dialect};

fn inventory_of(count: usize, prefix: &str) -> Inventory {
    let files = (0..count)
        .map(|i| {
            let name = format!("image_{:06}.png", i);
            FileDescriptor::new(
                format!("{}/{}", prefix, name),
                name,
                1024 + i as u64,
                "-rw-r--r--",
                Utc::now(),
            )
            .with_hash(ContentHash::digest(md5_hex(&i.to_le_bytes(), 8192)))
        })
        .collect();
    Inventory::new(Utc::now(), files).expect("unique paths")
}

fn benchmark_reconcile(c: &mut Criterion) {
    let before = inventory_of(10_000, "/media/old");
    let after = inventory_of(10_000, "/media/new");

    c.bench_function("reconcile_10k_all_moved", |b| {
        b.iter(|| {
            // Fresh copies so the lazy index is rebuilt each iteration
            let before = before.clone();
            let after = after.clone();
            black_box(reconcile(&before, &after, Some("https://example.com")))
        })
    });

    let result = reconcile(&before, &after, None);
    c.bench_function("render_apache_10k", |b| {
        b.iter(|| black_box(render(&result.events, Dialect::Apache, Utc::now())))
    });
}

fn benchmark_store(c: &mut Criterion) {
    let inv = inventory_of(5_000, "/media");
    let csv = inventory::render(&inv, InventoryFormat::Csv).expect("render csv");
    let json = inventory::render(&inv, InventoryFormat::Json).expect("render json");

    c.bench_function("parse_csv_5k", |b| {
        b.iter(|| black_box(inventory::parse(&csv).expect("parse csv")))
    });

    c.bench_function("parse_json_5k", |b| {
        b.iter(|| black_box(inventory::parse(&json).expect("parse json")))
    });
}

fn benchmark_listing_parse(c: &mut Criterion) {
    let line = "-rw-r--r--    1 web      web        183245 Mar 01 10:15 hero banner final.png";

    c.bench_function("listing_entry_parse", |b| {
        b.iter(|| black_box(ListingEntry::parse(black_box(line)).expect("parse line")))
    });
}

criterion_group!(benches, benchmark_reconcile, benchmark_store, benchmark_listing_parse);
criterion_main!(benches);
