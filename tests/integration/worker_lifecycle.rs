//! Prefetch worker driven directly, outside of `scan_file`.

use std::fs::File;
use std::sync::Arc;

use readahead_rs::{
    NoopSink, PrefetchRequest, PrefetchWorker, ReadAt, RequestId, ScanConfig,
};

use crate::patterned_file;

#[test]
fn shutdown_joins_idle_worker() {
    let worker = PrefetchWorker::spawn(&ScanConfig::default(), Arc::new(NoopSink)).unwrap();
    let stats = worker.shutdown().unwrap();
    assert_eq!(stats.requests_started, 0);
}

#[test]
fn shutdown_with_queued_work_releases_sources() {
    let file = patterned_file(256 * 1024);
    let source: Arc<dyn ReadAt> = Arc::new(File::open(file.path()).unwrap());
    let config = ScanConfig {
        chunk_size: 4096,
        ..ScanConfig::default()
    };
    let mut worker = PrefetchWorker::spawn(&config, Arc::new(NoopSink)).unwrap();

    for id in 0..32u64 {
        let accepted = worker.submit(PrefetchRequest {
            id: RequestId(id),
            source: Arc::clone(&source),
            offset: 0,
            length: 256 * 1024,
        });
        assert!(accepted);
    }
    let stats = worker.shutdown().unwrap();

    assert!(stats.requests_started <= 32);
    assert_eq!(stats.read_errors, 0);
    // Every queued or in-flight request was dropped with the worker.
    assert_eq!(Arc::strong_count(&source), 1);
}
