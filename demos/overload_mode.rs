//! Overload mode example
//!
//! This example demonstrates priority escalation:
//! - A burst of arrivals into the high-priority lane (AL2)
//! - Overload mode entering, a drain-to-buffer service window, and clearing
//! - Watching the transitions through the event stream

use crossflow::{
    events, ArrivalRecord, ArrivalSource, EventEmitter, IntersectionBuilder, JunctionConfig,
    LaneName, MemorySource, SignalState,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== Crossflow: Overload Mode Example ===\n");

    let emitter = EventEmitter::new(256);
    let mut signals = emitter.subscribe_filtered(|e| {
        e.key.starts_with("overload.") || e.key.starts_with("signal.")
    });

    let source = Arc::new(MemorySource::new());
    let controller = IntersectionBuilder::new()
        .with_config(
            JunctionConfig::default()
                .with_tick_period(Duration::from_millis(50))
                .with_release_gate(Duration::from_millis(150)),
        )
        .with_emitter(emitter)
        .with_source(Arc::clone(&source) as Arc<dyn ArrivalSource>)
        .build()
        .await;

    // 14 vehicles into AL2: well past the overload threshold of 10.
    for i in 1..=14 {
        source
            .append(&ArrivalRecord::new(format!("V{i}"), LaneName::HIGH_PRIORITY))
            .await;
    }
    controller.ingest_cycle().await;
    println!("✓ 14 vehicles queued in {}\n", LaneName::HIGH_PRIORITY);

    // Drive the scheduler by hand so every transition is visible.
    let mut ticks = 0;
    loop {
        controller.scheduler_tick().await;
        ticks += 1;

        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(10), signals.recv()).await
        {
            println!("[tick {ticks:3}] {} {:?}", event.key, event.payload);
        }

        if ticks > 2 && controller.signal_state().await == SignalState::AllRed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(160)).await;
    }

    // The residual buffer keeps 4 vehicles queued; a later evaluation with
    // size 4 (< 5) clears the mode.
    controller.scheduler_tick().await;
    if let Some(event) = signals.recv().await {
        assert_eq!(event.key, events::OVERLOAD_CLEARED);
        println!("\n✓ Overload cleared with the backlog at the residual buffer");
    }

    println!("\n=== Result ===");
    println!("Served: {}", controller.served_total());
    if let Some(queue) = controller.queue(LaneName::HIGH_PRIORITY) {
        println!("Remaining in {}: {}", LaneName::HIGH_PRIORITY, queue.len().await);
    }

    Ok(())
}
