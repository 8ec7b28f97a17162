use struct_mv::prelude::*;

#[test]
fn vector_options_fill_missing_fields_with_defaults() {
    let opts: VectorOptions = serde_json::from_str(r#"{ "no_overlap": "ignore" }"#).unwrap();
    assert_eq!(opts.stencil_width, 1);
    assert_eq!(opts.no_overlap, NoOverlapPolicy::Ignore);

    let json = serde_json::to_string(&VectorOptions::default()).unwrap();
    assert_eq!(json, r#"{"stencil_width":1,"no_overlap":"error"}"#);
}

#[test]
fn queue_config_builds_a_pool() {
    let cfg: QueueConfig = serde_json::from_str(r#"{ "num_threads": 2 }"#).unwrap();
    assert_eq!(cfg.thread_name_prefix, QueueConfig::default().thread_name_prefix);
    let q = WorkQueue::from_config(&cfg).unwrap();
    assert_eq!(q.num_threads(), 2);
    assert_eq!(q.state(), QueueState::Idle);

    let bad: QueueConfig = serde_json::from_str(r#"{ "num_threads": 0 }"#).unwrap();
    assert!(matches!(
        WorkQueue::from_config(&bad),
        Err(StructMvError::InvalidConfig(_))
    ));
}

#[test]
fn grid_round_trips_through_json() {
    let mut grid = StructGrid::new(2, 1).unwrap();
    grid.add_box(0, IndexBox::new(&[0, 0], &[3, 3]).unwrap()).unwrap();
    grid.add_box(1, IndexBox::new(&[4, 0], &[7, 3]).unwrap()).unwrap();
    let json = serde_json::to_string(&grid.boxes()).unwrap();
    let boxes: Vec<struct_mv::grid::GridBox> = serde_json::from_str(&json).unwrap();
    let back = StructGrid::from_boxes(2, 1, boxes.into_iter().map(|b| (b.owner, b.bbox))).unwrap();
    assert_eq!(back.fingerprint(), grid.fingerprint());
    assert_eq!(back.local_count(), 1);
}
