// tests/bus_memory.rs

mod common;
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use missiondag::bus::{connect, EntryId, EventBus, Fields, MemoryBus};
use missiondag::config::BrokerConfig;
use missiondag::errors::MissionError;

type TestResult = Result<(), Box<dyn Error>>;

const STREAM: &str = "mission:m:runnable";
const GROUP: &str = "mission-workers";

fn fields(n: usize) -> Fields {
    let mut f = Fields::new();
    f.insert("n".to_string(), n.to_string());
    f
}

async fn seeded(count: usize) -> Result<MemoryBus, MissionError> {
    let bus = MemoryBus::new();
    bus.ensure_group(STREAM, GROUP).await?;
    for n in 0..count {
        bus.append(STREAM, fields(n)).await?;
    }
    Ok(bus)
}

#[tokio::test]
async fn append_assigns_increasing_ids_and_read_tails() -> TestResult {
    init_tracing();
    let bus = MemoryBus::new();

    let a = bus.append("s", fields(0)).await?;
    let b = bus.append("s", fields(1)).await?;
    assert!(a < b);
    assert_eq!(bus.last_id("s").await?, b);
    assert_eq!(bus.last_id("empty").await?, EntryId::START);

    let all = bus.read("s", EntryId::START, Duration::ZERO, 10).await?;
    assert_eq!(all.len(), 2);
    let tail = bus.read("s", a, Duration::ZERO, 10).await?;
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].id, b);
    assert_eq!(tail[0].fields.get("n").map(String::as_str), Some("1"));
    Ok(())
}

#[tokio::test]
async fn blocking_read_wakes_on_append() -> TestResult {
    init_tracing();
    let bus = Arc::new(MemoryBus::new());

    let reader = {
        let bus = Arc::clone(&bus);
        tokio::spawn(async move { bus.read("s", EntryId::START, Duration::from_secs(3), 10).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    bus.append("s", fields(7)).await?;

    let entries = with_timeout(reader).await??;
    assert_eq!(entries.len(), 1);
    Ok(())
}

#[tokio::test]
async fn unbounded_block_waits_for_the_next_append() -> TestResult {
    init_tracing();
    let bus = Arc::new(MemoryBus::new());

    let reader = {
        let bus = Arc::clone(&bus);
        tokio::spawn(async move { bus.read("s", EntryId::START, Duration::MAX, 10).await })
    };

    tokio::time::sleep(Duration::from_millis(30)).await;
    bus.append("s", fields(3)).await?;

    let entries = with_timeout(reader).await??;
    assert_eq!(entries.len(), 1);
    Ok(())
}

#[tokio::test]
async fn blocking_read_returns_empty_after_block() -> TestResult {
    let bus = MemoryBus::new();
    let entries = bus
        .read("s", EntryId::START, Duration::from_millis(30), 10)
        .await?;
    assert!(entries.is_empty());
    Ok(())
}

#[tokio::test]
async fn each_entry_goes_to_exactly_one_consumer() -> TestResult {
    init_tracing();
    let bus = seeded(5).await?;

    let first = bus.read_group(STREAM, GROUP, "w1", Duration::ZERO, 3).await?;
    let second = bus.read_group(STREAM, GROUP, "w2", Duration::ZERO, 10).await?;
    let third = bus.read_group(STREAM, GROUP, "w1", Duration::ZERO, 10).await?;

    assert_eq!(first.len(), 3);
    assert_eq!(second.len(), 2);
    assert!(third.is_empty());

    let mut ids: Vec<_> = first.iter().chain(second.iter()).map(|e| e.id).collect();
    ids.dedup();
    assert_eq!(ids.len(), 5);
    assert_eq!(bus.pending_count(STREAM, GROUP), 5);
    Ok(())
}

#[tokio::test]
async fn ensure_group_is_idempotent() -> TestResult {
    let bus = seeded(2).await?;
    bus.read_group(STREAM, GROUP, "w1", Duration::ZERO, 1).await?;

    bus.ensure_group(STREAM, GROUP).await?;

    let rest = bus.read_group(STREAM, GROUP, "w1", Duration::ZERO, 10).await?;
    assert_eq!(rest.len(), 1);
    Ok(())
}

#[tokio::test]
async fn read_group_without_group_fails() -> TestResult {
    let bus = MemoryBus::new();
    bus.append(STREAM, fields(0)).await?;

    let err = bus
        .read_group(STREAM, "nope", "w1", Duration::ZERO, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, MissionError::UnknownGroup { .. }));
    Ok(())
}

#[tokio::test]
async fn unacknowledged_entries_are_redelivered_to_their_consumer() -> TestResult {
    init_tracing();
    let bus = seeded(3).await?;

    let delivered = bus.read_group(STREAM, GROUP, "w1", Duration::ZERO, 10).await?;
    assert!(bus.ack(STREAM, GROUP, delivered[0].id).await?);
    assert!(!bus.ack(STREAM, GROUP, delivered[0].id).await?);

    let pending = bus.pending(STREAM, GROUP, "w1", 10).await?;
    assert_eq!(
        pending.iter().map(|e| e.id).collect::<Vec<_>>(),
        vec![delivered[1].id, delivered[2].id]
    );
    assert!(bus.pending(STREAM, GROUP, "w2", 10).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn idle_entries_can_be_claimed_by_another_consumer() -> TestResult {
    init_tracing();
    let bus = seeded(2).await?;
    bus.read_group(STREAM, GROUP, "dead", Duration::ZERO, 10).await?;

    let too_early = bus
        .claim_idle(STREAM, GROUP, "alive", Duration::from_secs(60), 10)
        .await?;
    assert!(too_early.is_empty());

    tokio::time::sleep(Duration::from_millis(30)).await;
    let claimed = bus
        .claim_idle(STREAM, GROUP, "alive", Duration::from_millis(10), 10)
        .await?;
    assert_eq!(claimed.len(), 2);

    assert!(bus.pending(STREAM, GROUP, "dead", 10).await?.is_empty());
    assert_eq!(bus.pending(STREAM, GROUP, "alive", 10).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn outage_fails_every_call_until_recovery() -> TestResult {
    let bus = seeded(1).await?;
    bus.set_available(false);

    assert!(matches!(
        bus.append(STREAM, fields(1)).await,
        Err(MissionError::BrokerUnavailable(_))
    ));
    assert!(matches!(
        bus.read(STREAM, EntryId::START, Duration::ZERO, 1).await,
        Err(MissionError::BrokerUnavailable(_))
    ));
    assert!(matches!(
        bus.read_group(STREAM, GROUP, "w1", Duration::ZERO, 1).await,
        Err(MissionError::BrokerUnavailable(_))
    ));

    bus.set_available(true);
    assert_eq!(bus.len(STREAM), 1);
    assert_eq!(
        bus.read_group(STREAM, GROUP, "w1", Duration::ZERO, 1).await?.len(),
        1
    );
    Ok(())
}

#[test]
fn connect_rejects_unsupported_brokers() {
    let ok = connect(&BrokerConfig {
        address: "memory://local".to_string(),
    });
    assert!(ok.is_ok());

    let err = connect(&BrokerConfig {
        address: "redis://localhost:6379".to_string(),
    });
    assert!(matches!(err, Err(MissionError::BrokerUnavailable(_))));
}

#[test]
fn entry_ids_parse_from_their_display_form() {
    let id: EntryId = "42".parse().unwrap();
    assert_eq!(id, EntryId::new(42));
    assert_eq!(id.to_string(), "42");
    assert!("x".parse::<EntryId>().is_err());
}
