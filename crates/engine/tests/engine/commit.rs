//! Commit: EXT auto-allocation, verification, rollback

use crate::common::*;
use nerve_core::{Direction, Error, ReturnCode};
use nerve_engine::LoopbackDispatcher;

#[test]
fn commit_auto_allocates_ext_and_close_releases_it() {
    let (ctx, _dispatcher) = context();
    let before_open = ctx.pool_len().unwrap();

    let model = ctx.open_model(image(&scratch_manifest())).unwrap();
    let input = ctx.allocate_buffer(INPUT_SIZE).unwrap();
    let output = ctx.allocate_buffer(OUTPUT_SIZE).unwrap();
    ctx.bind_by_index(model, 0, Direction::In, 0, &input).unwrap();
    ctx.bind_by_index(model, 0, Direction::Out, 0, &output).unwrap();

    let before_commit = ctx.pool_len().unwrap();
    ctx.commit(model, 0).unwrap();
    assert_eq!(ctx.pool_len().unwrap(), before_commit + 1);

    let scratch = ctx.execution(model, 0).unwrap();
    let binding = scratch.binding(2).unwrap();
    assert_eq!(binding.size, SCRATCH_SIZE);

    ctx.close_model(model).unwrap();
    ctx.release_buffers(&[input, output]).unwrap();
    assert_eq!(ctx.pool_len().unwrap(), before_open);
}

#[test]
fn double_commit_is_rejected() {
    let (ctx, _dispatcher) = context();
    let model = ctx.open_model(image(&simple_manifest())).unwrap();
    let buffers = ctx.allocate_all_buffers(model, 0, true).unwrap();

    let result = ctx.commit(model, 0);
    assert!(matches!(result, Err(Error::AlreadyCommitted { .. })));
    assert_eq!(ReturnCode::of(&result), ReturnCode::GenericFailure);

    ctx.close_model(model).unwrap();
    ctx.release_buffers(&buffers.all()).unwrap();
}

#[test]
fn failed_verify_rolls_back_ext_allocation() {
    let (ctx, _dispatcher) = context();
    let model = ctx.open_model(image(&scratch_manifest())).unwrap();
    let input = ctx.allocate_buffer(INPUT_SIZE).unwrap();
    ctx.bind_by_index(model, 0, Direction::In, 0, &input).unwrap();

    let before = ctx.pool_len().unwrap();
    let err = ctx.commit(model, 0).unwrap_err();
    assert!(matches!(err, Error::UnboundRegions { unbound: 1, total: 3 }));

    assert_eq!(ctx.pool_len().unwrap(), before);
    let execution = ctx.execution(model, 0).unwrap();
    assert!(execution.binding(2).is_none());
    assert!(!execution.is_committed());

    // Completing the binding lets the same execution commit.
    let output = ctx.allocate_buffer(OUTPUT_SIZE).unwrap();
    ctx.bind_by_index(model, 0, Direction::Out, 0, &output).unwrap();
    ctx.commit(model, 0).unwrap();
    assert_eq!(ctx.pool_len().unwrap(), before + 2);

    ctx.close_model(model).unwrap();
    ctx.release_buffers(&[input, output]).unwrap();
}

#[test]
fn ext_allocation_failure_rolls_back() {
    let manifest = scratch_manifest();
    let image_len = image(&manifest).len();
    // Room for the image, input and output but not the scratch region.
    let limit = image_len + INPUT_SIZE + OUTPUT_SIZE + SCRATCH_SIZE - 1;
    let (ctx, _dispatcher) =
        context_with(LoopbackDispatcher::new(), options().memory_limit(Some(limit)));

    let model = ctx.open_model(image(&manifest)).unwrap();
    let input = ctx.allocate_buffer(INPUT_SIZE).unwrap();
    let output = ctx.allocate_buffer(OUTPUT_SIZE).unwrap();
    ctx.bind_by_label(model, 0, "input", &input).unwrap();
    ctx.bind_by_label(model, 0, "output", &output).unwrap();

    let before = ctx.pool_len().unwrap();
    let result = ctx.commit(model, 0);
    assert_eq!(ReturnCode::of(&result), ReturnCode::MemoryError);
    assert_eq!(ctx.pool_len().unwrap(), before);
    assert!(!ctx.execution(model, 0).unwrap().is_committed());

    ctx.close_model(model).unwrap();
    ctx.release_buffers(&[input, output]).unwrap();
}

#[test]
fn ext_bound_by_label_is_not_auto_allocated() {
    let (ctx, _dispatcher) = context();
    let model = ctx.open_model(image(&scratch_manifest())).unwrap();
    let input = ctx.allocate_buffer(INPUT_SIZE).unwrap();
    let output = ctx.allocate_buffer(OUTPUT_SIZE).unwrap();
    let scratch = ctx.allocate_buffer(SCRATCH_SIZE).unwrap();
    ctx.bind_by_label(model, 0, "input", &input).unwrap();
    ctx.bind_by_label(model, 0, "output", &output).unwrap();
    ctx.bind_by_label(model, 0, "scratch", &scratch).unwrap();

    let before = ctx.pool_len().unwrap();
    ctx.commit(model, 0).unwrap();
    assert_eq!(ctx.pool_len().unwrap(), before);

    ctx.close_model(model).unwrap();
    ctx.release_buffers(&[input, output, scratch]).unwrap();
}

#[test]
fn recommit_after_regenerate_replaces_auto_buffers() {
    let (ctx, _dispatcher) = context();
    let model = ctx.open_model(image(&scratch_manifest())).unwrap();
    let input = ctx.allocate_buffer(INPUT_SIZE).unwrap();
    let output = ctx.allocate_buffer(OUTPUT_SIZE).unwrap();

    for _ in 0..3 {
        ctx.generate_buffer_space(model, 1).unwrap();
        ctx.bind_by_label(model, 0, "input", &input).unwrap();
        ctx.bind_by_label(model, 0, "output", &output).unwrap();
        ctx.commit(model, 0).unwrap();
    }
    // loaded image + input + output + one scratch buffer
    assert_eq!(ctx.pool_len().unwrap(), 4);

    ctx.close_model(model).unwrap();
    ctx.release_buffers(&[input, output]).unwrap();
    assert_eq!(ctx.pool_len().unwrap(), 0);
}

#[test]
fn multiple_sessions_commit_independently() {
    let (ctx, _dispatcher) = context();
    let model = ctx.open_model(image(&simple_manifest())).unwrap();
    ctx.generate_buffer_space(model, 3).unwrap();

    let mut ids = Vec::new();
    let mut owned = Vec::new();
    for session in 0..3 {
        let buffers = ctx.allocate_all_buffers(model, session, true).unwrap();
        ids.push(ctx.execution_id(model, session).unwrap());
        owned.extend(buffers.all());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|id| id.model_component() == model));

    ctx.close_model(model).unwrap();
    ctx.release_buffers(&owned).unwrap();
}
