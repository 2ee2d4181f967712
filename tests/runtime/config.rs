//! Builder and configuration file handling

use nerve::prelude::*;
use std::io::Write;

#[test]
fn builder_applies_options() {
    let runtime = Runtime::builder()
        .allocator(AllocatorKind::Heap)
        .memory_limit(1024)
        .async_workers(3)
        .open()
        .unwrap();

    let options = runtime.options();
    assert_eq!(options.allocator, AllocatorKind::Heap);
    assert_eq!(options.memory_limit, Some(1024));
    assert_eq!(options.async_workers, 3);
}

#[test]
fn memory_limit_is_enforced() {
    let runtime = Runtime::builder()
        .allocator(AllocatorKind::Heap)
        .memory_limit(128)
        .open()
        .unwrap();

    let first = runtime.allocate_buffer(100).unwrap();
    let err = runtime.allocate_buffer(100).unwrap_err();
    assert_eq!(ReturnCode::from(&err), ReturnCode::MemoryError);

    runtime.release_buffer(&first).unwrap();
    runtime.allocate_buffer(100).unwrap();
}

#[test]
fn zero_workers_fails_open() {
    let err = Runtime::builder().async_workers(0).open().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn config_file_is_loaded() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "allocator = \"heap\"").unwrap();
    writeln!(file, "async_workers = 1").unwrap();

    let runtime = Runtime::builder()
        .config_file(file.path())
        .unwrap()
        .open()
        .unwrap();
    assert_eq!(runtime.options().allocator, AllocatorKind::Heap);
    assert_eq!(runtime.options().async_workers, 1);
}

#[test]
fn config_file_rejects_unknown_keys() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "threads = 4").unwrap();

    let err = Runtime::builder().config_file(file.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn custom_dispatcher_is_used() {
    let dispatcher = Arc::new(LoopbackDispatcher::new());
    let runtime = Runtime::builder()
        .dispatcher(dispatcher.clone())
        .open()
        .unwrap();

    let model = runtime
        .open_model(crate::common::image(4, 4))
        .unwrap();
    assert_eq!(dispatcher.open_model_count(), 1);
    runtime.close_model(model).unwrap();
    assert_eq!(dispatcher.open_model_count(), 0);
}
