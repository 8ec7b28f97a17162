mod util;
use util::*;

use once_cell::sync::Lazy;
use proptest::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use struct_mv::prelude::*;

static QUEUE: Lazy<WorkQueue> = Lazy::new(|| WorkQueue::new(NUM_THREADS).unwrap());

fn buffers(v: &StructVector) -> Vec<Vec<f64>> {
    (0..v.atlas().len())
        .map(|i| v.box_data(i).unwrap().1.to_vec())
        .collect()
}

fn pair(ghost: usize) -> (StructVector, StructVector) {
    let domain = bx(&[0, 0, 0], &[9, 6, 3]);
    let a = vector(slab_grid(0, &domain, 3, |_| 0), ghost);
    let b = vector(slab_grid(0, &domain, 3, |_| 0), ghost);
    (a, b)
}

#[test]
fn threaded_constant_fill_matches_serial() {
    let (mut serial, mut threaded) = pair(1);
    serial.set_constant_values(7.0).unwrap();
    threaded.set_constant_values_threaded(&QUEUE, 7.0).unwrap();
    assert_eq!(buffers(&serial), buffers(&threaded));
    assert!(buffers(&threaded).iter().flatten().all(|&x| x == 7.0));
    assert_eq!(QUEUE.state(), QueueState::Idle);
}

#[test]
fn threaded_set_and_get_match_serial() {
    let mut rng = SmallRng::seed_from_u64(0x5eed);
    let (mut serial, mut threaded) = pair(2);
    let target = bx(&[-1, 2, 0], &[11, 5, 4]);
    let vals: Vec<f64> = (0..target.volume()).map(|_| rng.r#gen()).collect();

    serial.set_box_values(&target, &vals).unwrap();
    threaded
        .set_box_values_threaded(&QUEUE, &target, &vals)
        .unwrap();
    assert_eq!(buffers(&serial), buffers(&threaded));

    let window = bx(&[-2, -2, -2], &[12, 8, 5]);
    assert_eq!(
        serial.get_box_values(&window).unwrap(),
        threaded.get_box_values_threaded(&QUEUE, &window).unwrap()
    );
}

#[test]
fn threaded_errors_match_serial() {
    let (mut v, _) = pair(0);
    let target = bx(&[0, 0, 0], &[1, 1, 1]);
    assert_eq!(
        v.set_box_values_threaded(&QUEUE, &target, &[0.0; 3]),
        Err(StructMvError::LengthMismatch {
            expected: 8,
            found: 3
        })
    );
    assert!(matches!(
        v.get_box_values_threaded(&QUEUE, &bx(&[50, 0, 0], &[51, 0, 0])),
        Err(StructMvError::NoOverlap { .. })
    ));
}

#[test]
fn threaded_set_with_narrow_box() {
    // fewer axis-0 planes than workers
    let (mut serial, mut threaded) = pair(1);
    let target = bx(&[4, 0, 0], &[5, 6, 3]);
    let vals = values_of(&target);
    serial.set_box_values(&target, &vals).unwrap();
    threaded
        .set_box_values_threaded(&QUEUE, &target, &vals)
        .unwrap();
    assert_eq!(buffers(&serial), buffers(&threaded));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn random_boxes_match_serial(
        lo in prop::array::uniform3(-3i64..10),
        len in prop::array::uniform3(1i64..6),
    ) {
        let (mut serial, mut threaded) = pair(1);
        let hi = [lo[0] + len[0] - 1, lo[1] + len[1] - 1, lo[2] + len[2] - 1];
        let target = bx(&lo, &hi);
        let vals = values_of(&target);
        let s = serial.set_box_values(&target, &vals);
        let t = threaded.set_box_values_threaded(&QUEUE, &target, &vals);
        prop_assert_eq!(&s, &t);
        if s.is_ok() {
            prop_assert_eq!(buffers(&serial), buffers(&threaded));
            prop_assert_eq!(
                serial.get_box_values(&target).unwrap(),
                threaded.get_box_values_threaded(&QUEUE, &target).unwrap()
            );
        }
    }
}
