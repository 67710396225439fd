//! Basic junction example
//!
//! This example demonstrates the basic usage of crossflow:
//! - Building an intersection controller with an in-memory arrival source
//! - Running the synthetic traffic producer alongside the junction loops
//! - Observing stats and shutting down gracefully

use crossflow::{
    ArrivalSink, ArrivalSource, IntersectionBuilder, JunctionConfig, MemorySource, Road,
    VehicleProducer,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    println!("=== Crossflow: Basic Junction Example ===\n");

    // One in-memory arrival source per road, shared between the producer
    // (writer) and the controller's ingestion loop (reader).
    let sources: Vec<Arc<MemorySource>> = Road::ALL.map(|_| Arc::new(MemorySource::new())).into();

    let config = JunctionConfig::default()
        .with_ingest_period(Duration::from_millis(500))
        .with_tick_period(Duration::from_millis(100))
        .with_release_gate(Duration::from_millis(300))
        .with_drain_period(Duration::from_millis(500));

    let mut builder = IntersectionBuilder::new().with_config(config);
    for source in &sources {
        builder = builder.with_source(Arc::clone(source) as Arc<dyn ArrivalSource>);
    }
    let controller = builder.build().await;
    println!("✓ Controller created with 12 lanes");

    controller.start().await?;
    println!("✓ Junction loops started\n");

    // Synthetic traffic on a fast cadence for the demo
    let producer = Arc::new(VehicleProducer::new(
        Road::ALL
            .into_iter()
            .zip(sources.iter().cloned())
            .map(|(road, source)| (road, source as Arc<dyn ArrivalSink>))
            .collect(),
    ));
    let producing = Arc::new(AtomicBool::new(true));
    let producer_task = {
        let producer = Arc::clone(&producer);
        let producing = Arc::clone(&producing);
        tokio::spawn(async move {
            producer.run(Duration::from_millis(700), producing).await;
        })
    };

    println!("Running for 5 seconds...\n");
    tokio::time::sleep(Duration::from_secs(5)).await;

    producing.store(false, Ordering::SeqCst);
    producer_task.await?;
    controller.shutdown().await;
    println!("✓ Shutdown complete\n");

    println!("=== Junction Statistics ===");
    let stats = controller.stats().await;
    println!("Generated: {}", producer.generated_total());
    println!("Ingested:  {}", stats.ingested_total);
    println!("Served:    {}", stats.served_total);
    println!("Queued:    {}", stats.total_queued);

    let mut lanes: Vec<_> = stats.lanes.iter().collect();
    lanes.sort();
    for (lane, depth) in lanes {
        println!("  {lane}: {depth} waiting");
    }

    Ok(())
}
