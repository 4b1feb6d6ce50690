//! Flow-control integration tests: FIFO ordering, synchronization groups,
//! optional inputs, in-band control ordering across threads and property
//! snapshots.

mod common;

use common::{control_tags, data_ints, drain_until_stop, test_timeout, ChannelSource};
use visionflow::ops::{Arithmetic, DebugOperation, FrameSource, Histogram, Observed, Threshold};
use visionflow::{ControlTag, Engine, Operation, PropertyValue, Variant};

#[test]
fn test_fifo_order_through_inline_chain() {
    common::init_tracing();
    let mut engine = Engine::new();
    let (channel_source, tx) = ChannelSource::new();
    let mut probe = DebugOperation::new();
    let tap = probe.tap();

    let source = engine.add_operation(Box::new(channel_source), 1).unwrap();
    let mid = engine.add_operation(Box::new(DebugOperation::new()), 0).unwrap();
    let sink = engine.add_operation(Box::new(probe), 0).unwrap();
    engine.connect(source, "output", mid, "input").unwrap();
    engine.connect(mid, "output", sink, "input").unwrap();
    engine.check(true).unwrap();
    engine.start().unwrap();

    for i in 0..200 {
        tx.send(Variant::from(i as i64)).unwrap();
    }
    drop(tx);

    let seen = drain_until_stop(&tap, test_timeout());
    engine.join(test_timeout()).unwrap();
    assert_eq!(data_ints(&seen), (0..200).collect::<Vec<i64>>());
}

#[test]
fn test_group_fires_once_per_complete_set() {
    common::init_tracing();
    let mut engine = Engine::new();
    let mut probe = DebugOperation::new();
    let tap = probe.tap();

    let add = engine.add_operation(Box::new(Arithmetic::new()), 0).unwrap();
    let sink = engine.add_operation(Box::new(probe), 0).unwrap();
    engine.connect(add, "result", sink, "input").unwrap();
    let port_a = engine.expose_input(add, "a").unwrap();
    let port_b = engine.expose_input(add, "b").unwrap();
    engine.check(true).unwrap();
    engine.start().unwrap();

    // Three objects on one input, one on the other: exactly one step fires.
    for i in [1i64, 2, 3] {
        engine.inject(port_a, i).unwrap();
    }
    engine.inject(port_b, 10i64).unwrap();
    assert_eq!(engine.input_depth(add, "a").unwrap(), 2);
    assert_eq!(engine.input_depth(add, "b").unwrap(), 0);
    assert_eq!(tap.try_recv().unwrap(), Observed::Data(Variant::Int(11)));

    // Each further object on `b` pairs with the next queued `a`.
    engine.inject(port_b, 20i64).unwrap();
    engine.inject(port_b, 30i64).unwrap();
    assert_eq!(tap.try_recv().unwrap(), Observed::Data(Variant::Int(22)));
    assert_eq!(tap.try_recv().unwrap(), Observed::Data(Variant::Int(33)));
    assert_eq!(engine.input_depth(add, "a").unwrap(), 0);

    engine.stop();
    engine.join(test_timeout()).unwrap();
}

#[test]
fn test_optional_input_left_disconnected() {
    common::init_tracing();
    let mut engine = Engine::new();
    let mut probe = DebugOperation::new();
    let tap = probe.tap();

    let mut frames = FrameSource::new();
    frames.set_property("count", PropertyValue::Int(2)).unwrap();
    frames.set_property("width", PropertyValue::Int(8)).unwrap();
    frames.set_property("height", PropertyValue::Int(8)).unwrap();

    let source = engine.add_operation(Box::new(frames), 1).unwrap();
    let hist = engine.add_operation(Box::new(Histogram::new()), 1).unwrap();
    let sink = engine.add_operation(Box::new(probe), 0).unwrap();
    // The `roi` input stays disconnected; the histogram must fire on the
    // image alone.
    engine.connect(source, "image", hist, "image").unwrap();
    engine.connect(hist, "histogram", sink, "input").unwrap();
    engine.check(true).unwrap();
    engine.start().unwrap();

    let seen = drain_until_stop(&tap, test_timeout());
    engine.join(test_timeout()).unwrap();

    let histograms: Vec<_> = seen
        .iter()
        .filter_map(|o| match o {
            Observed::Data(v) => Some(v.as_float_vector().unwrap().to_vec()),
            _ => None,
        })
        .collect();
    assert_eq!(histograms.len(), 2);
    for histogram in &histograms {
        assert_eq!(histogram.iter().sum::<f64>(), 64.0);
    }
}

#[test]
fn test_control_tags_stay_ordered_across_threads() {
    common::init_tracing();
    let mut engine = Engine::new();
    let (channel_source, tx) = ChannelSource::new();
    let mut probe = DebugOperation::new();
    let tap = probe.tap();

    let source = engine.add_operation(Box::new(channel_source), 1).unwrap();
    let mid = engine.add_operation(Box::new(DebugOperation::new()), 1).unwrap();
    let sink = engine.add_operation(Box::new(probe), 0).unwrap();
    engine.connect(source, "output", mid, "input").unwrap();
    engine.connect(mid, "output", sink, "input").unwrap();
    engine.check(true).unwrap();
    engine.start().unwrap();

    tx.send(Variant::from(1i64)).unwrap();
    tx.send(Variant::from(2i64)).unwrap();
    let mut seen = Vec::new();
    while data_ints(&seen).len() < 2 {
        seen.push(tap.recv_timeout(test_timeout()).unwrap());
    }

    engine.pause();
    engine.resume();
    tx.send(Variant::from(3i64)).unwrap();
    drop(tx);

    seen.extend(drain_until_stop(&tap, test_timeout()));
    engine.join(test_timeout()).unwrap();

    assert_eq!(data_ints(&seen), vec![1, 2, 3]);
    assert_eq!(
        control_tags(&seen),
        vec![
            ControlTag::Pause,
            ControlTag::Resume,
            ControlTag::EndOfStream,
            ControlTag::Stop
        ]
    );
    let pause_pos = seen
        .iter()
        .position(|o| *o == Observed::Control(ControlTag::Pause))
        .unwrap();
    assert_eq!(data_ints(&seen[..pause_pos]), vec![1, 2]);
}

#[test]
fn test_property_snapshot_round_trip() {
    common::init_tracing();
    let build = || {
        let mut engine = Engine::new();
        let thresh = engine.add_operation(Box::new(Threshold::new()), 0).unwrap();
        let hist = engine.add_operation(Box::new(Histogram::new()), 1).unwrap();
        (engine, thresh, hist)
    };

    let (first, thresh, hist) = build();
    first
        .set_property(thresh, "threshold", PropertyValue::Float(42.5))
        .unwrap();
    first
        .set_property(thresh, "invert", PropertyValue::Bool(true))
        .unwrap();
    first
        .set_property(hist, "levels", PropertyValue::Int(64))
        .unwrap();
    first
        .set_property(hist, "normalized", PropertyValue::Bool(true))
        .unwrap();
    let snapshot = first.export_properties().unwrap();

    let (mut second, thresh2, hist2) = build();
    second.import_properties(&snapshot).unwrap();
    assert_eq!(
        second.get_property(thresh2, "threshold").unwrap(),
        PropertyValue::Float(42.5)
    );
    assert_eq!(
        second.get_property(thresh2, "invert").unwrap(),
        PropertyValue::Bool(true)
    );
    assert_eq!(
        second.get_property(hist2, "levels").unwrap(),
        PropertyValue::Int(64)
    );
    assert_eq!(
        second.get_property(hist2, "normalized").unwrap(),
        PropertyValue::Bool(true)
    );
}
