mod util;
use util::*;

use serial_test::serial;
use struct_mv::algs::communicator::{CommTag, Communicator, NoComm, Wait};
use struct_mv::algs::wire::{KIND_MIGRATE, decode_values, encode_values};

#[test]
#[serial]
fn rayon_round_trip() {
    let tag = CommTag(0x1000);
    let (c0, c1) = rayons();

    let msg = b"hello";
    let _s = c0.isend(1, tag.as_u16(), msg);

    let mut buf = [0u8; 5];
    let h = c1.irecv(0, tag.as_u16(), &mut buf);
    let got = h.wait().unwrap();
    assert_eq!(&got, msg);
}

#[test]
#[serial]
fn rayon_fifo_order() {
    let tag = CommTag(0x1001);
    let (c0, c1) = rayons();

    for i in 0..10u8 {
        let _ = c0.isend(1, tag.as_u16(), &[i]);
    }
    let mut out = Vec::new();
    for _ in 0..10 {
        let mut b = [0u8; 1];
        let h = c1.irecv(0, tag.as_u16(), &mut b);
        out.push(h.wait().unwrap()[0]);
    }
    assert_eq!(out, (0u8..10u8).collect::<Vec<_>>());
}

#[test]
#[serial]
fn tags_do_not_mix() {
    let (c0, c1) = rayons();
    let a = CommTag(0x1002);
    let b = a.offset(1);
    c0.isend(1, b.as_u16(), &[2]);
    c0.isend(1, a.as_u16(), &[1]);
    let mut buf = [0u8; 1];
    assert_eq!(c1.irecv(0, a.as_u16(), &mut buf).wait().unwrap(), vec![1]);
    assert_eq!(c1.irecv(0, b.as_u16(), &mut buf).wait().unwrap(), vec![2]);
}

#[test]
#[serial]
fn framed_values_cross_threads() {
    let tag = CommTag(0x1004);
    let (c0, c1) = rayons();
    let sent = vec![0.5, -2.0, 1e300];
    std::thread::scope(|s| {
        s.spawn(|| {
            c1.isend(0, tag.as_u16(), &encode_values(KIND_MIGRATE, 1, &sent));
        });
    });
    let mut buf = vec![0u8; 64];
    let bytes = c0.irecv(1, tag.as_u16(), &mut buf).wait().unwrap();
    assert_eq!(decode_values(&bytes, KIND_MIGRATE, 1, 3).unwrap(), sent);
    assert!(decode_values(&bytes, KIND_MIGRATE, 0, 3).is_err());
}

#[test]
fn no_comm_is_nop() {
    let comm = NoComm;
    let mut buf = [0u8; 8];
    assert!(comm.irecv(0, 123, &mut buf).wait().is_none());
    assert!(comm.isend(0, 123, &[]).wait().is_none());
    assert_eq!((comm.rank(), comm.size()), (0, 1));
}

#[cfg(feature = "mpi-support")]
#[test]
fn mpi_comm_smoke_if_available() {
    use struct_mv::algs::communicator::MpiComm;
    let world = MpiComm::new().expect("MPI initialization failed");
    let me = world.rank();
    let n = world.size();
    const TAG: u16 = 0xCAFE;
    let to = (me + 1) % n;
    let from = (me + n - 1) % n;
    let send = world.isend(to, TAG, &[me as u8]);
    let mut buf = [0u8; 1];
    let got = world.irecv(from, TAG, &mut buf).wait().unwrap();
    send.wait();
    assert_eq!(got, vec![from as u8]);
}
