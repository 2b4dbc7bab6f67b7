use tidemark::{ResourceCache, Retrieval};
use tidemark_demos::common::{boiler_mapping, demo_plant, init_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let (connector, _ctl) = demo_plant();
    let boiler = ResourceCache::builder("boiler", connector)
        .mapping(boiler_mapping())
        .timezone("Europe/Oslo")
        .build()
        .await?;

    let row = boiler.current(Retrieval::Interpolated).await?;
    println!("{}", boiler.header().join("\t"));
    let values: Vec<String> = row
        .values
        .iter()
        .map(|v| v.as_ref().map_or_else(|| "-".to_string(), ToString::to_string))
        .collect();
    println!("{}\t{}", row.timestamp, values.join("\t"));
    Ok(())
}
