//! Execution of a [`CommPlan`].
//!
//! One exchange epoch:
//! 1. pack and post every send (per peer, in plan order)
//! 2. apply local transfers
//! 3. post every receive, then wait and unpack per peer
//! 4. drain the send handles
//!
//! Sends go out before any receive is waited on, which the blocking MPI
//! receive relies on. After the first failure no further peer data is
//! applied, but every handle is still waited on.

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::migrate::comm_plan::{CommPlan, PlanKind, Transfer, volume};
use crate::algs::wire::{KIND_GHOST, KIND_MIGRATE, decode_values, encode_values, message_len};
use crate::data::box_copy::copy_region;
use crate::data::storage::Storage;
use crate::data::struct_vector::StructVector;
use crate::struct_error::StructMvError;

/// Move values from `from` into the owned regions of `to`.
///
/// Destination points without a source counterpart keep their values.
/// Running the same plan twice yields the same destination as running it
/// once.
///
/// # Errors
/// - `LayoutMismatch` if `plan` was built for other layouts, another rank
///   or is not a migration plan.
/// - `NotReady` if either vector is not initialized.
/// - `Transport` if a peer message is missing or malformed; points written
///   before the failure stay written.
pub fn migrate<S1, S2, C>(
    plan: &CommPlan,
    from: &StructVector<S1>,
    to: &mut StructVector<S2>,
    comm: &C,
    tag: CommTag,
) -> Result<(), StructMvError>
where
    S1: Storage<f64>,
    S2: Storage<f64>,
    C: Communicator,
{
    plan.check(
        PlanKind::Migrate,
        from.layout_fingerprint(),
        to.layout_fingerprint(),
        comm.rank(),
    )?;
    if from.grid().rank() != comm.rank() || to.grid().rank() != comm.rank() {
        return Err(StructMvError::LayoutMismatch(format!(
            "vectors are laid out for rank {}, communicator is rank {}",
            from.grid().rank(),
            comm.rank()
        )));
    }
    if !from.is_initialized() || !to.is_initialized() {
        return Err(StructMvError::NotReady("migrate needs initialized vectors"));
    }
    log::debug!(
        "rank {}: migrating {} transfers (tag {:#x})",
        comm.rank(),
        plan.len(),
        tag.as_u16()
    );

    let sends = post_sends(plan, from, comm, tag, KIND_MIGRATE)?;
    let local = pack(from, plan.local()).and_then(|vals| unpack(to, plan.local(), &vals));
    let result = receive_all(plan, to, comm, tag, KIND_MIGRATE, local);
    drain(sends);
    to.mark_modified();
    result
}

/// Refresh ghost shells of `v` from all owners, local and remote.
pub(crate) fn exchange_ghosts<S, C>(
    plan: &CommPlan,
    v: &mut StructVector<S>,
    comm: &C,
    tag: CommTag,
) -> Result<(), StructMvError>
where
    S: Storage<f64>,
    C: Communicator,
{
    let fp = v.layout_fingerprint();
    plan.check(PlanKind::Ghost, fp, fp, comm.rank())?;
    let sends = post_sends(plan, v, comm, tag, KIND_GHOST)?;
    let local = copy_local(plan, v);
    let result = receive_all(plan, v, comm, tag, KIND_GHOST, local);
    drain(sends);
    result
}

/// Apply only the local part of a ghost plan.
pub(crate) fn fill_local_ghosts<S: Storage<f64>>(
    plan: &CommPlan,
    v: &mut StructVector<S>,
) -> Result<(), StructMvError> {
    let fp = v.layout_fingerprint();
    plan.check(PlanKind::Ghost, fp, fp, plan.rank())?;
    copy_local(plan, v)
}

fn copy_local<S: Storage<f64>>(plan: &CommPlan, v: &mut StructVector<S>) -> Result<(), StructMvError> {
    let vals = pack(v, plan.local())?;
    unpack(v, plan.local(), &vals)
}

/// Concatenate the values of every transfer region, row-major per region.
fn pack<S: Storage<f64>>(v: &StructVector<S>, transfers: &[Transfer]) -> Result<Vec<f64>, StructMvError> {
    let mut out = vec![0.0; volume(transfers)];
    let mut cursor = 0;
    for t in transfers {
        let (entry, span) = v.span(t.src_box)?;
        let n = t.region.volume();
        copy_region(&t.region, &entry.data, span, &t.region, &mut out[cursor..cursor + n]);
        cursor += n;
    }
    Ok(out)
}

fn unpack<S: Storage<f64>>(
    v: &mut StructVector<S>,
    transfers: &[Transfer],
    values: &[f64],
) -> Result<(), StructMvError> {
    let mut cursor = 0;
    for t in transfers {
        let (entry, span) = v.span_mut(t.dst_box)?;
        let n = t.region.volume();
        copy_region(&t.region, &t.region, &values[cursor..cursor + n], &entry.data, span);
        cursor += n;
    }
    Ok(())
}

fn post_sends<S, C>(
    plan: &CommPlan,
    v: &StructVector<S>,
    comm: &C,
    tag: CommTag,
    kind: u16,
) -> Result<Vec<C::SendHandle>, StructMvError>
where
    S: Storage<f64>,
    C: Communicator,
{
    let mut payloads = Vec::new();
    for (peer, transfers) in plan.sends() {
        payloads.push((peer, encode_values(kind, comm.rank(), &pack(v, transfers)?)));
    }
    Ok(payloads
        .iter()
        .map(|(peer, bytes)| {
            log::trace!("rank {} -> {peer}: {} bytes", comm.rank(), bytes.len());
            comm.isend(*peer, tag.as_u16(), bytes)
        })
        .collect())
}

/// Receive and unpack every peer's values. `prior` carries the outcome of
/// earlier steps; once it or any receive fails, later data is discarded.
fn receive_all<S, C>(
    plan: &CommPlan,
    v: &mut StructVector<S>,
    comm: &C,
    tag: CommTag,
    kind: u16,
    prior: Result<(), StructMvError>,
) -> Result<(), StructMvError>
where
    S: Storage<f64>,
    C: Communicator,
{
    let pending: Vec<_> = plan
        .recvs()
        .map(|(peer, transfers)| {
            let n = volume(transfers);
            let mut buf = vec![0u8; message_len(n)];
            let handle = comm.irecv(peer, tag.as_u16(), &mut buf);
            (peer, transfers, n, handle)
        })
        .collect();

    let mut result = prior;
    for (peer, transfers, n, handle) in pending {
        let received = handle.wait();
        if result.is_err() {
            continue;
        }
        result = match received {
            None => Err(StructMvError::transport(peer, "no message received")),
            Some(bytes) => decode_values(&bytes, kind, peer, n)
                .map_err(|msg| StructMvError::transport(peer, msg))
                .and_then(|vals| unpack(v, transfers, &vals)),
        };
        if let Err(e) = &result {
            log::warn!("rank {}: {e}", comm.rank());
        }
    }
    result
}

fn drain<H: Wait>(handles: Vec<H>) {
    for h in handles {
        let _ = h.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::grid::{IndexBox, StructGrid};
    use std::sync::Arc;

    fn bx(lo: &[i64], hi: &[i64]) -> IndexBox {
        IndexBox::new(lo, hi).unwrap()
    }

    fn vector(boxes: Vec<IndexBox>, ghost: usize) -> StructVector {
        let grid = StructGrid::from_boxes(2, 0, boxes.into_iter().map(|b| (0, b))).unwrap();
        let mut v = StructVector::with_stencil_width(Arc::new(grid), ghost);
        v.initialize().unwrap();
        v
    }

    #[test]
    fn serial_migration_repartitions_values() {
        let mut from = vector(vec![bx(&[0, 0], &[3, 3])], 0);
        let all = bx(&[0, 0], &[3, 3]);
        let vals: Vec<f64> = (0..16).map(f64::from).collect();
        from.set_box_values(&all, &vals).unwrap();
        let mut to = vector(vec![bx(&[0, 0], &[1, 3]), bx(&[2, 0], &[3, 3])], 1);

        let plan = CommPlan::build(&from, &to).unwrap();
        migrate(&plan, &from, &mut to, &NoComm, CommTag::new(0x40)).unwrap();
        assert_eq!(to.get_box_values(&all).unwrap(), vals);
        assert!(!to.is_assembled());

        migrate(&plan, &from, &mut to, &NoComm, CommTag::new(0x40)).unwrap();
        assert_eq!(to.get_box_values(&all).unwrap(), vals);
    }

    #[test]
    fn source_ghost_values_fill_uncovered_destination() {
        let line = |b: IndexBox, ghost: usize| {
            let grid = StructGrid::from_boxes(1, 0, [(0, b)]).unwrap();
            let mut v = StructVector::with_stencil_width(Arc::new(grid), ghost);
            v.initialize().unwrap();
            v
        };
        let mut from = line(bx(&[0], &[3]), 2);
        let data = bx(&[-2], &[5]);
        let vals: Vec<f64> = (-2..=5).map(|i| 100.0 + i as f64).collect();
        from.set_box_values(&data, &vals).unwrap();
        let mut to = line(bx(&[0], &[9]), 0);
        to.set_constant_values(-1.0).unwrap();

        let plan = CommPlan::build(&from, &to).unwrap();
        migrate(&plan, &from, &mut to, &NoComm, CommTag::new(0x41)).unwrap();
        assert_eq!(
            to.get_box_values(&bx(&[0], &[9])).unwrap(),
            vec![100.0, 101.0, 102.0, 103.0, 104.0, 105.0, -1.0, -1.0, -1.0, -1.0]
        );
    }

    #[test]
    fn stale_plan_is_rejected() {
        let from = vector(vec![bx(&[0, 0], &[3, 3])], 0);
        let mut to = vector(vec![bx(&[0, 0], &[3, 3])], 0);
        let plan = CommPlan::build(&from, &to).unwrap();
        let mut other = vector(vec![bx(&[0, 0], &[1, 1])], 0);
        assert!(matches!(
            migrate(&plan, &from, &mut other, &NoComm, CommTag::new(1)),
            Err(StructMvError::LayoutMismatch(_))
        ));
        let ghost = CommPlan::ghost_exchange(&from).unwrap();
        assert!(matches!(
            migrate(&ghost, &from, &mut to, &NoComm, CommTag::new(1)),
            Err(StructMvError::LayoutMismatch(_))
        ));
    }

    #[test]
    fn uninitialized_vectors_are_not_ready() {
        let grid = Arc::new(StructGrid::from_boxes(2, 0, [(0, bx(&[0, 0], &[1, 1]))]).unwrap());
        let from = StructVector::new(Arc::clone(&grid));
        let mut to = StructVector::new(grid);
        let plan = CommPlan::build(&from, &to).unwrap();
        assert!(matches!(
            migrate(&plan, &from, &mut to, &NoComm, CommTag::new(2)),
            Err(StructMvError::NotReady(_))
        ));
    }
}
