use std::time::Duration;

use futures::StreamExt;
use tidemark::{RangeMode, RangeOptions, ResourceCache};
use tidemark_demos::common::{boiler_mapping, demo_plant, init_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Suggested: RUST_LOG=debug to see the partition plan
    init_tracing();

    let (connector, ctl) = demo_plant();
    let boiler = ResourceCache::builder("boiler", connector)
        .mapping(boiler_mapping())
        .build()
        .await?;

    let opts = RangeOptions {
        max_rows_per_request: 20,
        max_concurrency: 2,
    };
    let mode = RangeMode::Interpolated {
        interval: Duration::from_secs(120),
    };
    let mut rows = boiler.last(Duration::from_secs(3600), mode, opts)?;
    let mut count = 0;
    while let Some(row) = rows.next().await {
        count += 1;
        if count <= 3 {
            println!("{} {:?}", row.timestamp, row.values);
        }
    }
    println!(
        "{count} rows from {} ranged requests",
        ctl.range_calls().await.len()
    );

    let mut recorded = boiler.last(Duration::from_secs(600), RangeMode::recorded(), opts)?;
    while let Some(row) = recorded.next().await {
        println!("recorded {} {:?}", row.timestamp, row.values);
    }
    Ok(())
}
