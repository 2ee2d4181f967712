//! Shared fixtures for runtime tests

#![allow(dead_code)]

use nerve::prelude::*;
use nerve::nerve_core::{BufferSlot, Region};

pub fn manifest(input: usize, output: usize) -> ModelManifest {
    ModelManifest {
        name: "facade".to_string(),
        regions: vec![
            Region {
                index: 0,
                required_size: input,
                attribute: 0,
                name: "in".to_string(),
            },
            Region {
                index: 1,
                required_size: output,
                attribute: 0,
                name: "out".to_string(),
            },
        ],
        slots: vec![
            BufferSlot {
                region_index: 0,
                direction: Direction::In,
                slot_index: 0,
                size: input,
                offset: 0,
                shape: Shape::new(1, input as u32, 1, 1),
                kind: 0,
                name: "input".to_string(),
            },
            BufferSlot {
                region_index: 1,
                direction: Direction::Out,
                slot_index: 0,
                size: output,
                offset: 0,
                shape: Shape::new(1, output as u32, 1, 1),
                kind: 0,
                name: "output".to_string(),
            },
        ],
        filtered: false,
    }
}

pub fn image(input: usize, output: usize) -> Vec<u8> {
    manifest(input, output).to_bytes().unwrap()
}

pub fn runtime() -> Runtime {
    Runtime::builder()
        .allocator(AllocatorKind::Device)
        .async_workers(2)
        .open()
        .unwrap()
}
