use std::sync::Arc;
use std::time::Duration;

use tidemark::{FnTask, ResourceCache, Scheduler, TidemarkError};
use tidemark_demos::common::{boiler_mapping, demo_plant, init_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let (connector, _ctl) = demo_plant();
    let boiler = Arc::new(
        ResourceCache::builder("boiler", connector)
            .mapping(boiler_mapping())
            .retention(5)
            .build()
            .await?,
    );

    let scheduler = Scheduler::builder(Arc::clone(&boiler))
        .interval(Duration::from_millis(500))
        .build()?;
    scheduler.add_task(Arc::new(FnTask::new("print-temp", |ctx| async move {
        let temps = ctx.resource()?.history("temp");
        tracing::info!(handle = %ctx.handle(), history = ?temps, "refreshed");
        Ok::<(), TidemarkError>(())
    })));

    scheduler.start()?;
    tokio::time::sleep(Duration::from_secs(3)).await;
    scheduler.stop().await;
    println!("kept {} refreshes", boiler.history_len());
    Ok(())
}
