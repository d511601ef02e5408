// Concurrent imports against one shared store
//
// Writers import sales files for the same entity from several threads while
// a reader keeps taking snapshots. Every snapshot must hold whole batches
// and agree with the import log written in the same commit.

use retail_analytics::db;
use retail_analytics::{import_csv, AnalyticsAggregator, EntityType, ImportOptions, Store, StoreError};
use rust_decimal::Decimal;
use std::fmt::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

const WRITERS: usize = 6;
const ROWS_PER_FILE: usize = 25;

fn open_seeded(dir: &TempDir) -> Arc<Store> {
    retail_analytics::logging::init_test();
    let store = Store::open(&dir.path().join("retail.db")).unwrap();

    let options = ImportOptions::default();
    import_csv(&store, EntityType::Category, b"id,name\n1,Tools\n", options).unwrap();
    import_csv(&store, EntityType::Product, b"id,name,price,category_id\n1,Widget,2,1\n", options).unwrap();

    Arc::new(store)
}

/// Sales `first_id..first_id + ROWS_PER_FILE`, each with quantity 1 and total 2
fn sales_file(first_id: usize) -> String {
    let mut csv = String::from("id,product_id,quantity,total_price,date\n");
    for id in first_id..first_id + ROWS_PER_FILE {
        writeln!(csv, "{},1,1,2,2024-01-{:02}", id, id % 28 + 1).unwrap();
    }
    csv
}

/// (sales rows, sum of `inserted` over the sales import log) in one snapshot
fn snapshot(store: &Store) -> (i64, usize) {
    store
        .read(|conn| -> Result<_, StoreError> {
            let rows = db::count(conn, EntityType::Sale)?;
            let logged = db::recent_imports(conn, 1000)?
                .iter()
                .filter(|r| r.entity_type == EntityType::Sale)
                .map(|r| r.inserted)
                .sum();
            Ok((rows, logged))
        })
        .unwrap()
}

fn spawn_reader(store: Arc<Store>, done: Arc<AtomicBool>) -> thread::JoinHandle<usize> {
    thread::spawn(move || {
        let mut snapshots = 0;
        while !done.load(Ordering::Acquire) {
            let (rows, logged) = snapshot(&store);
            assert_eq!(rows as usize % ROWS_PER_FILE, 0, "snapshot saw a partial batch: {} rows", rows);
            assert_eq!(rows as usize, logged, "rows and import log disagree");

            let summary = AnalyticsAggregator::new(&store, 10).sales_summary().unwrap();
            assert_eq!(summary.total_sales % ROWS_PER_FILE, 0);
            assert_eq!(summary.total_revenue, Decimal::from(2 * summary.total_sales));

            snapshots += 1;
        }
        snapshots
    })
}

#[test]
fn test_concurrent_imports_of_distinct_batches() {
    let dir = TempDir::new().unwrap();
    let store = open_seeded(&dir);
    let done = Arc::new(AtomicBool::new(false));
    let start = Arc::new(Barrier::new(WRITERS));

    let reader = spawn_reader(Arc::clone(&store), Arc::clone(&done));

    let writers: Vec<_> = (0..WRITERS)
        .map(|w| {
            let store = Arc::clone(&store);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                let csv = sales_file(w * ROWS_PER_FILE + 1);
                start.wait();
                import_csv(&store, EntityType::Sale, csv.as_bytes(), ImportOptions::default()).unwrap()
            })
        })
        .collect();

    let summaries: Vec<_> = writers.into_iter().map(|h| h.join().unwrap()).collect();
    done.store(true, Ordering::Release);
    let snapshots = reader.join().unwrap();
    assert!(snapshots > 0);

    for summary in &summaries {
        assert_eq!((summary.inserted, summary.updated, summary.failed), (ROWS_PER_FILE, 0, 0));
    }

    let (rows, logged) = snapshot(&store);
    assert_eq!(rows as usize, WRITERS * ROWS_PER_FILE);
    assert_eq!(logged, WRITERS * ROWS_PER_FILE);

    let log = store.read(|conn| db::recent_imports(conn, 1000)).unwrap();
    let sales_batches: Vec<&str> = log
        .iter()
        .filter(|r| r.entity_type == EntityType::Sale)
        .map(|r| r.batch_id.as_str())
        .collect();
    assert_eq!(sales_batches.len(), WRITERS);
    for summary in &summaries {
        assert!(sales_batches.contains(&summary.batch_id.as_str()));
    }
}

#[test]
fn test_concurrent_imports_of_the_same_file() {
    let dir = TempDir::new().unwrap();
    let store = open_seeded(&dir);
    let done = Arc::new(AtomicBool::new(false));
    let start = Arc::new(Barrier::new(WRITERS));
    let csv = Arc::new(sales_file(1));

    let reader = spawn_reader(Arc::clone(&store), Arc::clone(&done));

    let writers: Vec<_> = (0..WRITERS)
        .map(|_| {
            let store = Arc::clone(&store);
            let start = Arc::clone(&start);
            let csv = Arc::clone(&csv);
            thread::spawn(move || {
                start.wait();
                import_csv(&store, EntityType::Sale, csv.as_bytes(), ImportOptions::default()).unwrap()
            })
        })
        .collect();

    let summaries: Vec<_> = writers.into_iter().map(|h| h.join().unwrap()).collect();
    done.store(true, Ordering::Release);
    reader.join().unwrap();

    // exactly one commit inserts, the rest overwrite the same ids
    let inserted: usize = summaries.iter().map(|s| s.inserted).sum();
    let updated: usize = summaries.iter().map(|s| s.updated).sum();
    assert_eq!(inserted, ROWS_PER_FILE);
    assert_eq!(updated, (WRITERS - 1) * ROWS_PER_FILE);
    assert_eq!(summaries.iter().filter(|s| s.inserted == ROWS_PER_FILE).count(), 1);

    let (rows, logged) = snapshot(&store);
    assert_eq!(rows as usize, ROWS_PER_FILE);
    assert_eq!(logged, ROWS_PER_FILE);

    let log = store.read(|conn| db::recent_imports(conn, 1000)).unwrap();
    let digests: Vec<&str> = log
        .iter()
        .filter(|r| r.entity_type == EntityType::Sale)
        .map(|r| r.file_sha256.as_str())
        .collect();
    assert_eq!(digests.len(), WRITERS);
    assert!(digests.iter().all(|d| *d == digests[0]));
}
