//! Full client workflows through the facade

use crate::common::*;
use nerve::prelude::*;

#[test]
fn allocate_all_and_execute() {
    let runtime = runtime();
    let model = runtime.open_model(image(16, 8)).unwrap();

    let buffers = runtime.allocate_all_buffers(model, 0, true).unwrap();
    assert_eq!(buffers.inputs.len(), 1);
    assert_eq!(buffers.outputs.len(), 1);
    assert!(runtime.execution_id(model, 0).unwrap().is_assigned());

    let payload: Vec<u8> = (1..=16).collect();
    buffers.inputs[0].write(0, &payload).unwrap();
    runtime.execute(model, 0).unwrap();
    assert_eq!(buffers.outputs[0].to_vec().unwrap(), payload[..8].to_vec());

    runtime.close_model(model).unwrap();
    runtime.release_buffers(&buffers.all()).unwrap();
    assert_eq!(runtime.pool_len().unwrap(), 0);
}

#[test]
fn async_round_trip() {
    let runtime = runtime();
    let model = runtime.open_model(image(4, 4)).unwrap();
    runtime.generate_buffer_space(model, 2).unwrap();

    let mut outputs = Vec::new();
    for session in 0..2 {
        let input = runtime.allocate_buffer(4).unwrap();
        let output = runtime.allocate_buffer(4).unwrap();
        input.fill(session as u8 + 1).unwrap();
        runtime.bind_all(model, session, &[input, output.clone()]).unwrap();
        runtime.commit(model, session).unwrap();
        outputs.push(output);
    }

    runtime.execute_async(model, 0).unwrap();
    runtime.execute_async(model, 1).unwrap();
    runtime.wait(model, 1).unwrap();
    runtime.wait(model, 0).unwrap();

    assert_eq!(outputs[0].to_vec().unwrap(), vec![1u8; 4]);
    assert_eq!(outputs[1].to_vec().unwrap(), vec![2u8; 4]);
    assert_eq!(runtime.pending_async().unwrap(), 0);
}

#[test]
fn return_codes_classify_failures() {
    let runtime = runtime();
    let model = runtime.open_model(image(16, 8)).unwrap();

    let wrong = runtime.allocate_buffer(15).unwrap();
    let result = runtime.bind_by_index(model, 0, Direction::In, 0, &wrong);
    assert_eq!(ReturnCode::of(&result), ReturnCode::SizeError);

    let result = runtime.commit(model, 0);
    assert_eq!(ReturnCode::of(&result), ReturnCode::GenericFailure);

    let result = runtime.buffer_counts(ModelId::new(0));
    assert_eq!(ReturnCode::of(&result), ReturnCode::InvalidArgument);

    let result = runtime.release_buffer(&wrong);
    assert_eq!(ReturnCode::of(&result), ReturnCode::Success);

    runtime.close_model(model).unwrap();
}

#[test]
fn buffer_info_queries() {
    let runtime = runtime();
    let model = runtime.open_model(image(12, 6)).unwrap();

    let counts = runtime.buffer_counts(model).unwrap();
    assert_eq!(counts.total(), 2);

    let by_index = runtime.buffer_info_by_index(model, Direction::Out, 0).unwrap();
    let by_label = runtime.buffer_info_by_label(model, "output").unwrap();
    assert_eq!(by_index, by_label);
    assert_eq!(by_label.size, 6);
    assert_eq!(by_label.shape, Shape::new(1, 6, 1, 1));

    runtime.close_model(model).unwrap();
}
