use chrono::Utc;
use tidemark::{ChannelItem, SourceId, SubscriberConfig, subscribe};
use tidemark_demos::common::{demo_plant, init_tracing};
use tidemark_mock::{ChannelEvent, encode_frame};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let (connector, ctl) = demo_plant();
    let names = vec!["boiler.temp".to_string(), "boiler.pressure".to_string()];
    let mut sub = subscribe(&*connector, &names, None, SubscriberConfig::default()).await?;

    for i in 0..3_i64 {
        let item = ChannelItem {
            name: "BOILER.TEMP".into(),
            source: SourceId::new("W-TEMP"),
            samples: vec![tidemark::Sample::good(Utc::now(), 80 + i)],
        };
        ctl.send(0, ChannelEvent::Frame(encode_frame(&[item]))).await;
    }
    ctl.send(0, ChannelEvent::Eof).await;

    while let Some(msg) = sub.next().await {
        let msg = msg?;
        for item in &msg.items {
            println!("{} {:?}", item.name, item.samples);
        }
    }
    println!("subscription ended: {:?}", sub.state());
    Ok(())
}
