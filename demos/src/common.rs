use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use tidemark::{HistorianConnector, ResourceMapping, Sample};
use tidemark_mock::{MockController, MockHistorian};

/// Initialise a fmt subscriber filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// A small boiler plant with two hours of 30s readings ending now.
#[must_use]
pub fn demo_plant() -> (Arc<dyn HistorianConnector>, MockController) {
    let now = Utc::now();
    let readings = |base: f64, swing: f64| -> Vec<Sample> {
        (0..240)
            .map(|i| {
                let ts = now - TimeDelta::seconds(30 * (240 - i));
                let phase = i as f64 / 24.0;
                Sample::good(ts, base + swing * phase.sin())
            })
            .collect()
    };
    let (historian, ctl) = MockHistorian::builder()
        .point("BOILER.TEMP", "W-TEMP")
        .point("BOILER.FLOW", "W-FLOW")
        .point("BOILER.PRESSURE", "W-PRES")
        .samples("W-TEMP", readings(82.0, 4.0))
        .samples("W-FLOW", readings(12.5, 1.5))
        .samples("W-PRES", readings(3.2, 0.2))
        .build();
    (historian as Arc<dyn HistorianConnector>, ctl)
}

/// `temp`, `flow` and an unbound `setpoint`.
#[must_use]
pub fn boiler_mapping() -> ResourceMapping {
    ResourceMapping::new()
        .bind("temp", "boiler.temp")
        .bind("flow", "boiler.flow")
        .unbound("setpoint")
}
