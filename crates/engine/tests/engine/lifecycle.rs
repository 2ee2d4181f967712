//! Model lifecycle: open, execute, close, teardown

use crate::common::*;
use nerve_core::{Direction, Error, ModelId, ReturnCode};
use nerve_engine::{ModelSource, ProcessContext};
use std::io::Write;
use std::sync::Arc;

#[test]
fn open_bind_commit_execute_close() {
    let (ctx, dispatcher) = context();
    let model = ctx.open_model(image(&simple_manifest())).unwrap();

    let counts = ctx.buffer_counts(model).unwrap();
    assert_eq!((counts.inputs, counts.outputs), (1, 1));

    let input = ctx.allocate_buffer(INPUT_SIZE).unwrap();
    let output = ctx.allocate_buffer(OUTPUT_SIZE).unwrap();
    let payload: Vec<u8> = (0..INPUT_SIZE as u8).collect();
    input.write(0, &payload).unwrap();

    ctx.generate_buffer_space(model, 1).unwrap();
    ctx.bind_by_index(model, 0, Direction::In, 0, &input).unwrap();
    ctx.bind_by_index(model, 0, Direction::Out, 0, &output).unwrap();

    let id = ctx.commit(model, 0).unwrap();
    assert!(id.is_assigned());
    assert_eq!(id.model_component(), model);

    ctx.execute(model, 0).unwrap();
    assert_eq!(output.to_vec().unwrap(), payload[..OUTPUT_SIZE].to_vec());
    assert_eq!(dispatcher.executed_count(), 1);

    ctx.close_model(model).unwrap();
    assert!(ctx.buffer_counts(model).unwrap_err().is_not_found());
    ctx.release_buffers(&[input, output]).unwrap();
    assert_eq!(ctx.pool_len().unwrap(), 0);
    assert!(ctx.open_models().unwrap().is_empty());
    assert_eq!(dispatcher.open_model_count(), 0);
}

#[test]
fn execute_commits_implicitly() {
    let (ctx, _dispatcher) = context();
    let model = ctx.open_model(image(&simple_manifest())).unwrap();
    let input = ctx.allocate_buffer(INPUT_SIZE).unwrap();
    let output = ctx.allocate_buffer(OUTPUT_SIZE).unwrap();
    input.fill(3).unwrap();

    ctx.bind_by_label(model, 0, "input", &input).unwrap();
    ctx.bind_by_label(model, 0, "output", &output).unwrap();
    assert!(!ctx.execution_id(model, 0).unwrap().is_assigned());

    ctx.execute(model, 0).unwrap();
    assert!(ctx.execution_id(model, 0).unwrap().is_assigned());
    assert_eq!(output.to_vec().unwrap(), vec![3u8; OUTPUT_SIZE]);

    ctx.execute(model, 0).unwrap();
    ctx.close_model(model).unwrap();
}

#[test]
fn open_from_file() {
    let (ctx, _dispatcher) = context();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&image(&simple_manifest())).unwrap();
    file.flush().unwrap();

    let model = ctx.open_model(file.path()).unwrap();
    assert!(model.is_valid());
    ctx.close_model(model).unwrap();
}

#[test]
fn open_missing_file_is_io_error() {
    let (ctx, _dispatcher) = context();
    let dir = tempfile::tempdir().unwrap();
    let result = ctx.open_model(ModelSource::File(dir.path().join("absent.nnc")));
    assert_eq!(ReturnCode::of(&result), ReturnCode::IoError);
    assert_eq!(ctx.pool_len().unwrap(), 0);
}

#[test]
fn failed_open_releases_loaded_buffer() {
    let (ctx, _dispatcher) = context();
    let result = ctx.open_model(b"not a model".as_slice());
    assert!(matches!(result, Err(Error::Dispatch(_))));
    assert_eq!(ctx.pool_len().unwrap(), 0);

    let result = ctx.open_model(Vec::new());
    assert_eq!(ReturnCode::of(&result), ReturnCode::InvalidArgument);
}

#[test]
fn filtered_model_reports_filtered() {
    let (ctx, _dispatcher) = context();
    let mut manifest = simple_manifest();
    manifest.filtered = true;
    let result = ctx.open_model(image(&manifest));
    assert_eq!(ReturnCode::of(&result), ReturnCode::Filtered);
    assert_eq!(ctx.pool_len().unwrap(), 0);
}

#[test]
fn close_unknown_model() {
    let (ctx, _dispatcher) = context();
    let err = ctx.close_model(ModelId::new(42 << 24)).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn buffer_info_queries() {
    let (ctx, _dispatcher) = context();
    let model = ctx.open_model(image(&wide_manifest())).unwrap();

    let info = ctx.buffer_info_by_index(model, Direction::Out, 1).unwrap();
    assert_eq!(info.label, "head");
    assert_eq!(info.size, 4);

    let info = ctx.buffer_info_by_label(model, "b").unwrap();
    assert_eq!(info.size, 8);
    assert_eq!(info.shape.w, 8);

    assert!(ctx.buffer_info_by_label(model, "missing").is_err());
    ctx.close_model(model).unwrap();
}

#[test]
fn operations_require_acquired_context() {
    let ctx = ProcessContext::new(options(), Arc::new(nerve_engine::LoopbackDispatcher::new()));
    assert_eq!(
        ctx.allocate_buffer(8).unwrap_err(),
        Error::ContextNotInitialized
    );
    assert_eq!(
        ReturnCode::of(&ctx.open_model(image(&simple_manifest()))),
        ReturnCode::InvalidArgument
    );
}

#[test]
fn teardown_releases_everything() {
    let (ctx, dispatcher) = context();
    let model = ctx.open_model(image(&scratch_manifest())).unwrap();
    ctx.allocate_all_buffers(model, 0, true).unwrap();
    assert!(ctx.pool_len().unwrap() > 0);

    assert_eq!(ctx.release(false).unwrap(), 0);
    assert!(!ctx.is_initialized());
    assert_eq!(dispatcher.open_model_count(), 0);

    // A fresh acquire starts from an empty pool.
    ctx.acquire().unwrap();
    assert_eq!(ctx.pool_len().unwrap(), 0);
    assert!(ctx.open_models().unwrap().is_empty());
}

#[test]
fn allocate_all_buffers_binds_every_slot() {
    let (ctx, _dispatcher) = context();
    let model = ctx.open_model(image(&wide_manifest())).unwrap();

    let buffers = ctx.allocate_all_buffers(model, 0, true).unwrap();
    assert_eq!(buffers.inputs.len(), 2);
    assert_eq!(buffers.outputs.len(), 2);
    assert_eq!(buffers.outputs[0].size(), 16);

    buffers.inputs[0].fill(1).unwrap();
    buffers.inputs[1].fill(2).unwrap();
    ctx.execute(model, 0).unwrap();
    assert_eq!(
        buffers.outputs[0].to_vec().unwrap(),
        [vec![1u8; 8], vec![2u8; 8]].concat()
    );
    assert_eq!(buffers.outputs[1].to_vec().unwrap(), vec![1u8; 4]);

    ctx.close_model(model).unwrap();
    ctx.release_buffers(&buffers.all()).unwrap();
    assert_eq!(ctx.pool_len().unwrap(), 0);
}

#[test]
fn allocate_all_buffers_failure_releases() {
    let (ctx, _dispatcher) = context_with(
        nerve_engine::LoopbackDispatcher::new(),
        options().memory_limit(Some(4096)),
    );
    let model = ctx.open_model(image(&simple_manifest())).unwrap();
    let baseline = ctx.pool_len().unwrap();

    // Eat the budget so the output allocation fails.
    let hog_size = 4096 - image(&simple_manifest()).len() - INPUT_SIZE - 10;
    let hog = ctx.allocate_buffer(hog_size).unwrap();

    let result = ctx.allocate_all_buffers(model, 0, false);
    assert_eq!(ReturnCode::of(&result), ReturnCode::MemoryError);
    assert_eq!(ctx.pool_len().unwrap(), baseline + 1);

    ctx.release_buffer(&hog).unwrap();
    ctx.close_model(model).unwrap();
}
