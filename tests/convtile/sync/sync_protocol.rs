use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use convtile::{
    BufferMap, BufferSlotManager, Engine, IterationOrder, Operand, SyncAction, SyncController,
    SyncRecord, SyncToken, TokenPolicy,
};

use crate::common;

fn double_buffered_plan() -> convtile::TilingPlan {
    common::builder(common::conv(2, 40, 8, 8, 48, 3))
        .m_tiles(16, 16)
        .n_tiles(16, 16)
        .k_tiles(48, 16)
        .double_buffer(true, true)
        .l0_double_buffer(true)
        .order(IterationOrder::ColumnFirst)
        .build(&common::limits())
}

fn position(log: &[SyncRecord], pred: impl Fn(&SyncRecord) -> bool) -> Option<usize> {
    log.iter().position(pred)
}

#[test]
fn tokens_follow_the_operand_policy() {
    let shared_a = SyncToken::for_slot(Operand::Weight, 1, TokenPolicy::Shared);
    let shared_b = SyncToken::for_slot(Operand::Weight, 0, TokenPolicy::Shared);
    assert_eq!(shared_a, shared_b);
    let ping = SyncToken::for_slot(Operand::Activation, 0, TokenPolicy::PerSlot);
    let pong = SyncToken::for_slot(Operand::Activation, 1, TokenPolicy::PerSlot);
    assert_ne!(ping, pong);
    assert_eq!(pong.operand(), Operand::Activation);
    assert_eq!(pong.side(), 1);
    assert_eq!(shared_a.operand(), Operand::Weight);
    assert_eq!(shared_a.side(), 0);
}

#[test]
fn slots_alternate_between_sides() -> Result<()> {
    let plan = double_buffered_plan();
    let map = BufferMap::derive(&plan, &common::limits());
    let sync = Arc::new(SyncController::new());
    let mut producer = BufferSlotManager::new(Engine::Vector, &plan, map, Arc::clone(&sync));
    let mut consumer = BufferSlotManager::new(Engine::Matrix, &plan, map, Arc::clone(&sync));
    assert_eq!(producer.policy(Operand::Activation), TokenPolicy::PerSlot);

    let first = producer.acquire_for_fill(Operand::Activation);
    producer.publish_and_toggle(Operand::Activation);
    let second = producer.acquire_for_fill(Operand::Activation);
    producer.publish_and_toggle(Operand::Activation);
    assert!(first.first_use && second.first_use);
    assert_eq!((first.side, second.side), (0, 1));
    assert_eq!(first.base, map.slot_base(Operand::Activation, 0));
    assert_eq!(second.base, map.activation_slot);

    let read = consumer.acquire_for_read(Operand::Activation);
    assert_eq!(read.side, 0);
    assert_eq!(read.fill, 0);
    consumer.release(Operand::Activation);
    let read = consumer.acquire_for_read(Operand::Activation);
    assert_eq!((read.side, read.fill), (1, 1));

    let third = producer.acquire_for_fill(Operand::Activation);
    assert!(!third.first_use);
    assert_eq!((third.side, third.fill), (0, 2));
    assert_eq!(producer.fills(Operand::Activation), 2);

    let weight = producer.acquire_for_fill(Operand::Weight);
    assert_eq!(weight.base, map.slot_base(Operand::Weight, 0));
    assert!(weight.base >= 2 * map.activation_slot);

    let log = sync.records();
    let acquire = position(&log, |r| r.action == SyncAction::AcquireForFill && r.fill == 2)
        .ok_or_else(|| anyhow!("third fill never acquired"))?;
    let waited = position(&log, |r| r.action == SyncAction::WaitConsumed && r.fill == 2)
        .ok_or_else(|| anyhow!("third fill never waited"))?;
    assert!(waited < acquire);
    Ok(())
}

#[test]
fn fill_is_never_acquired_before_its_slot_is_consumed() -> Result<()> {
    let plan = double_buffered_plan();
    let report = common::dispatch(plan.clone())?;
    let log = &report.sync_log;

    for operand in Operand::ALL {
        let sides = plan.buffers.slots(operand) as u64;
        let acquires: Vec<&SyncRecord> = log
            .iter()
            .filter(|r| r.operand == operand && r.action == SyncAction::AcquireForFill)
            .collect();
        assert!(acquires.len() as u64 > sides, "{operand} refills too rarely to check");
        for acquire in acquires.iter().filter(|r| r.fill >= sides) {
            let previous = acquire.fill - sides;
            let released = position(log, |r| {
                r.engine == Engine::Matrix
                    && r.action == SyncAction::SignalConsumed
                    && r.operand == operand
                    && r.fill == previous
            })
            .ok_or_else(|| anyhow!("{operand} fill {previous} never released"))?;
            let waited = position(log, |r| {
                r.engine == Engine::Vector
                    && r.action == SyncAction::WaitConsumed
                    && r.operand == operand
                    && r.fill == acquire.fill
            })
            .ok_or_else(|| anyhow!("{operand} fill {} acquired without waiting", acquire.fill))?;
            assert!(released < waited);
            assert!(waited < acquire.seq as usize);
            assert_eq!(log[released].side, acquire.side);
        }
    }
    Ok(())
}

#[test]
fn every_read_follows_its_publish() -> Result<()> {
    let report = common::dispatch(double_buffered_plan())?;
    let log = &report.sync_log;
    for read in log.iter().filter(|r| r.action == SyncAction::WaitReady) {
        let published = position(log, |r| {
            r.action == SyncAction::SignalReady && r.operand == read.operand && r.fill == read.fill
        })
        .ok_or_else(|| anyhow!("{} fill {} read but never published", read.operand, read.fill))?;
        assert!(published < read.seq as usize);
        assert_eq!(log[published].side, read.side);
    }
    Ok(())
}

#[test]
fn handshakes_balance_per_token() -> Result<()> {
    let single_buffered =
        common::builder(common::conv(1, 40, 8, 8, 48, 3)).build(&common::limits());
    for plan in [double_buffered_plan(), single_buffered] {
        let report = common::dispatch(plan)?;
        let mut outstanding: HashMap<(SyncToken, bool), i64> = HashMap::new();
        for record in &report.sync_log {
            let (key, delta) = match record.action {
                SyncAction::SignalReady => ((record.token, true), 1),
                SyncAction::WaitReady => ((record.token, true), -1),
                SyncAction::SignalConsumed => ((record.token, false), 1),
                SyncAction::WaitConsumed => ((record.token, false), -1),
                _ => continue,
            };
            let count = outstanding.entry(key).or_default();
            *count += delta;
            assert!(*count >= 0, "wait overtook its signal on {}", record.token);
        }
        assert!(outstanding.values().all(|c| *c == 0), "{outstanding:?}");
    }
    Ok(())
}

#[test]
fn single_fill_skips_the_wait() -> Result<()> {
    let plan = common::builder(common::conv(1, 16, 5, 6, 16, 1))
        .m_tiles(32, 32)
        .build(&common::limits());
    let report = common::dispatch(plan)?;
    let log = &report.sync_log;
    for operand in Operand::ALL {
        let acquire = position(log, |r| {
            r.operand == operand && r.action == SyncAction::AcquireForFill
        })
        .ok_or_else(|| anyhow!("{operand} never filled"))?;
        assert!(log[..acquire]
            .iter()
            .all(|r| !(r.operand == operand && r.action == SyncAction::WaitConsumed)));
        let waits: Vec<&SyncRecord> = log
            .iter()
            .filter(|r| r.operand == operand && r.action == SyncAction::WaitConsumed)
            .collect();
        assert_eq!(waits.len(), 1);
        assert!(waits[0].seq as usize > acquire);
    }
    Ok(())
}
