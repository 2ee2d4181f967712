//! Binding rules

use crate::common::*;
use nerve_core::{Direction, Error, ReturnCode};

#[test]
fn ext_slots_cannot_be_bound_by_index() {
    let (ctx, _dispatcher) = context();
    let model = ctx.open_model(image(&scratch_manifest())).unwrap();
    let scratch = ctx.allocate_buffer(SCRATCH_SIZE).unwrap();

    let err = ctx
        .bind_by_index(model, 0, Direction::Ext, 0, &scratch)
        .unwrap_err();
    assert_eq!(err, Error::DirectionNotBindable(Direction::Ext));
    assert!(err.is_protocol_violation());

    ctx.bind_by_label(model, 0, "scratch", &scratch).unwrap();
    let execution = ctx.execution(model, 0).unwrap();
    assert_eq!(execution.binding(2).unwrap().address, scratch.address());

    ctx.close_model(model).unwrap();
    ctx.release_buffer(&scratch).unwrap();
}

#[test]
fn size_mismatch_is_reported() {
    let (ctx, _dispatcher) = context();
    let model = ctx.open_model(image(&simple_manifest())).unwrap();
    let short = ctx.allocate_buffer(INPUT_SIZE - 1).unwrap();

    let result = ctx.bind_by_index(model, 0, Direction::In, 0, &short);
    assert_eq!(ReturnCode::of(&result), ReturnCode::SizeError);
    assert_eq!(ctx.execution(model, 0).unwrap().bound_count(), 0);

    ctx.close_model(model).unwrap();
}

#[test]
fn implicit_execution_only_for_session_zero() {
    let (ctx, _dispatcher) = context();
    let model = ctx.open_model(image(&simple_manifest())).unwrap();
    let input = ctx.allocate_buffer(INPUT_SIZE).unwrap();

    let err = ctx
        .bind_by_index(model, 1, Direction::In, 0, &input)
        .unwrap_err();
    assert!(matches!(err, Error::ExecutionsNotGenerated { .. }));
    assert_eq!(ctx.execution_count(model).unwrap(), 0);

    ctx.bind_by_index(model, 0, Direction::In, 0, &input).unwrap();
    assert_eq!(ctx.execution_count(model).unwrap(), 1);

    ctx.close_model(model).unwrap();
}

#[test]
fn committed_execution_rejects_bind_until_regenerated() {
    let (ctx, _dispatcher) = context();
    let model = ctx.open_model(image(&simple_manifest())).unwrap();
    let buffers = ctx.allocate_all_buffers(model, 0, true).unwrap();
    let other = ctx.allocate_buffer(INPUT_SIZE).unwrap();

    let err = ctx
        .bind_by_index(model, 0, Direction::In, 0, &other)
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyCommitted { .. }));

    ctx.generate_buffer_space(model, 1).unwrap();
    ctx.bind_by_index(model, 0, Direction::In, 0, &other).unwrap();
    assert!(!ctx.execution_id(model, 0).unwrap().is_assigned());

    ctx.close_model(model).unwrap();
    ctx.release_buffers(&buffers.all()).unwrap();
    ctx.release_buffer(&other).unwrap();
}

#[test]
fn rebinding_before_commit_last_write_wins() {
    let (ctx, _dispatcher) = context();
    let model = ctx.open_model(image(&simple_manifest())).unwrap();
    let first = ctx.allocate_buffer(INPUT_SIZE).unwrap();
    let second = ctx.allocate_buffer(INPUT_SIZE).unwrap();

    ctx.bind_by_label(model, 0, "input", &first).unwrap();
    ctx.bind_by_label(model, 0, "input", &second).unwrap();
    let execution = ctx.execution(model, 0).unwrap();
    assert_eq!(execution.binding(0).unwrap().address, second.address());
    assert_eq!(execution.bound_count(), 1);

    ctx.close_model(model).unwrap();
    ctx.release_buffers(&[first, second]).unwrap();
}

#[test]
fn bind_all_requires_exact_count() {
    let (ctx, _dispatcher) = context();
    let model = ctx.open_model(image(&wide_manifest())).unwrap();
    let a = ctx.allocate_buffer(8).unwrap();
    let b = ctx.allocate_buffer(8).unwrap();
    let sum = ctx.allocate_buffer(16).unwrap();
    let head = ctx.allocate_buffer(4).unwrap();

    let result = ctx.bind_all(model, 0, &[a.clone(), b.clone(), sum.clone()]);
    assert_eq!(ReturnCode::of(&result), ReturnCode::InvalidArgument);

    let all = vec![a, b, sum, head];
    ctx.bind_all(model, 0, &all).unwrap();
    assert_eq!(ctx.execution(model, 0).unwrap().bound_count(), 4);
    ctx.commit(model, 0).unwrap();

    ctx.close_model(model).unwrap();
    ctx.release_buffers(&all).unwrap();
}

#[test]
fn bind_all_in_wrong_order_is_size_error() {
    let (ctx, _dispatcher) = context();
    let model = ctx.open_model(image(&wide_manifest())).unwrap();
    let bufs: Vec<_> = [16, 4, 8, 8]
        .iter()
        .map(|&size| ctx.allocate_buffer(size).unwrap())
        .collect();

    let result = ctx.bind_all(model, 0, &bufs);
    assert_eq!(ReturnCode::of(&result), ReturnCode::SizeError);

    ctx.close_model(model).unwrap();
    ctx.release_buffers(&bufs).unwrap();
}

#[test]
fn unknown_label_is_not_found() {
    let (ctx, _dispatcher) = context();
    let model = ctx.open_model(image(&simple_manifest())).unwrap();
    let input = ctx.allocate_buffer(INPUT_SIZE).unwrap();
    let err = ctx.bind_by_label(model, 0, "nope", &input).unwrap_err();
    assert!(err.is_not_found());
    ctx.close_model(model).unwrap();
}
