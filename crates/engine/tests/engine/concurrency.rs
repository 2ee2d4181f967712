//! Concurrent use of one context

use crate::common::*;
use nerve_core::{Direction, Error, ExecutionId, ModelId, Result, Session};
use nerve_engine::{Dispatcher, LoopbackDispatcher, ProcessContext};
use nerve_memory::Buffer;
use nerve_session::Execution;
use parking_lot::Mutex;
use std::sync::{Arc, Barrier};
use std::thread;

/// Loopback dispatcher that parks inside `commit_execution` until released.
struct GatedDispatcher {
    inner: LoopbackDispatcher,
    arrived: Barrier,
    release: Barrier,
    committed_input: Mutex<Option<u64>>,
}

impl GatedDispatcher {
    fn new() -> Self {
        GatedDispatcher {
            inner: LoopbackDispatcher::new(),
            arrived: Barrier::new(2),
            release: Barrier::new(2),
            committed_input: Mutex::new(None),
        }
    }
}

impl Dispatcher for GatedDispatcher {
    fn name(&self) -> &'static str {
        "gated"
    }

    fn init(&self) -> Result<()> {
        self.inner.init()
    }

    fn deinit(&self) -> Result<()> {
        self.inner.deinit()
    }

    fn open_model(&self, model: &Buffer) -> Result<Session> {
        self.inner.open_model(model)
    }

    fn close_model(&self, model_id: ModelId) -> Result<()> {
        self.inner.close_model(model_id)
    }

    fn commit_execution(&self, model_id: ModelId, execution: &Execution) -> Result<ExecutionId> {
        self.arrived.wait();
        self.release.wait();
        *self.committed_input.lock() = execution.binding(0).map(|binding| binding.address);
        self.inner.commit_execution(model_id, execution)
    }

    fn execute(&self, execution_id: ExecutionId) -> Result<()> {
        self.inner.execute(execution_id)
    }
}

fn gated_context() -> (Arc<ProcessContext>, Arc<GatedDispatcher>) {
    let dispatcher = Arc::new(GatedDispatcher::new());
    let ctx = ProcessContext::new(options(), dispatcher.clone());
    ctx.acquire().unwrap();
    (Arc::new(ctx), dispatcher)
}

#[test]
fn concurrent_models_do_not_interfere() {
    let (ctx, dispatcher) = context();
    let ctx = Arc::new(ctx);
    let barrier = Arc::new(Barrier::new(6));

    let handles: Vec<_> = (0..6u8)
        .map(|i| {
            let ctx = Arc::clone(&ctx);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let model = ctx.open_model(image(&scratch_manifest())).unwrap();
                let input = ctx.allocate_buffer(INPUT_SIZE).unwrap();
                let output = ctx.allocate_buffer(OUTPUT_SIZE).unwrap();
                input.fill(i).unwrap();
                ctx.bind_by_index(model, 0, Direction::In, 0, &input).unwrap();
                ctx.bind_by_index(model, 0, Direction::Out, 0, &output).unwrap();

                for _ in 0..10 {
                    ctx.execute(model, 0).unwrap();
                    ctx.execute_async(model, 0).unwrap();
                    ctx.wait(model, 0).unwrap();
                }
                assert_eq!(output.to_vec().unwrap(), vec![i; OUTPUT_SIZE]);

                ctx.close_model(model).unwrap();
                ctx.release_buffers(&[input, output]).unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(dispatcher.executed_count(), 6 * 20);
    assert_eq!(ctx.pool_len().unwrap(), 0);
    assert!(ctx.open_models().unwrap().is_empty());
}

#[test]
fn concurrent_commits_on_one_session_commit_once() {
    let (ctx, _dispatcher) = context();
    let ctx = Arc::new(ctx);
    let model = ctx.open_model(image(&scratch_manifest())).unwrap();
    let buffers = ctx.allocate_all_buffers(model, 0, false).unwrap();
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let ctx = Arc::clone(&ctx);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                ctx.commit(model, 0).is_ok()
            })
        })
        .collect();

    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(successes, 1);

    // loaded image + input + output + one scratch buffer
    assert_eq!(ctx.pool_len().unwrap(), 4);

    ctx.close_model(model).unwrap();
    ctx.release_buffers(&buffers.all()).unwrap();
}

#[test]
fn concurrent_acquire_release_balances() {
    let (ctx, _dispatcher) = context();
    let ctx = Arc::new(ctx);
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ctx = Arc::clone(&ctx);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..25 {
                    ctx.acquire().unwrap();
                    ctx.release(false).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(ctx.ref_count(), 1);
    assert!(ctx.is_initialized());
}

#[test]
fn bind_during_commit_is_rejected() {
    let (ctx, dispatcher) = gated_context();
    let model = ctx.open_model(image(&simple_manifest())).unwrap();
    let input = ctx.allocate_buffer(INPUT_SIZE).unwrap();
    let output = ctx.allocate_buffer(OUTPUT_SIZE).unwrap();
    ctx.bind_by_index(model, 0, Direction::In, 0, &input).unwrap();
    ctx.bind_by_index(model, 0, Direction::Out, 0, &output).unwrap();

    let committer = {
        let ctx = Arc::clone(&ctx);
        thread::spawn(move || ctx.commit(model, 0))
    };

    dispatcher.arrived.wait();
    let late = ctx.allocate_buffer(INPUT_SIZE).unwrap();
    let err = ctx
        .bind_by_index(model, 0, Direction::In, 0, &late)
        .unwrap_err();
    assert_eq!(
        err,
        Error::CommitInProgress {
            model_id: model,
            session_id: 0
        }
    );
    assert!(err.is_protocol_violation());
    dispatcher.release.wait();

    let id = committer.join().unwrap().unwrap();
    assert_eq!(ctx.execution_id(model, 0).unwrap(), id);

    let execution = ctx.execution(model, 0).unwrap();
    assert_eq!(execution.binding(0).unwrap().address, input.address());
    assert_eq!(*dispatcher.committed_input.lock(), Some(input.address()));

    ctx.close_model(model).unwrap();
    ctx.release_buffers(&[input, output, late]).unwrap();
}

#[test]
fn close_during_commit_releases_auto_allocated_scratch() {
    let (ctx, dispatcher) = gated_context();
    let model = ctx.open_model(image(&scratch_manifest())).unwrap();
    let input = ctx.allocate_buffer(INPUT_SIZE).unwrap();
    let output = ctx.allocate_buffer(OUTPUT_SIZE).unwrap();
    ctx.bind_by_index(model, 0, Direction::In, 0, &input).unwrap();
    ctx.bind_by_index(model, 0, Direction::Out, 0, &output).unwrap();

    let committer = {
        let ctx = Arc::clone(&ctx);
        thread::spawn(move || ctx.commit(model, 0))
    };

    dispatcher.arrived.wait();
    // loaded image + input + output + scratch allocated by the commit
    assert_eq!(ctx.pool_len().unwrap(), 4);
    ctx.close_model(model).unwrap();
    dispatcher.release.wait();

    assert!(committer.join().unwrap().is_err());
    assert_eq!(ctx.pool_len().unwrap(), 2);
    assert!(ctx.open_models().unwrap().is_empty());

    ctx.release_buffers(&[input, output]).unwrap();
    assert_eq!(ctx.pool_len().unwrap(), 0);
}
