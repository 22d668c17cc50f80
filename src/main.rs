use anyhow::Result;
use energy_control_engine::{config, reserve, sim, telemetry};
use config::Config;
use reserve::ReserveController;
use sim::{SimConfig, SimulatedSite};
use telemetry::init_tracing;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = Config::load()?;

    if !cfg.reserve.enabled {
        warn!("reserve controller disabled by configuration; running pass-through");
    }

    let tick = Duration::from_secs(cfg.controller.tick_seconds.max(1));
    let mut controller = ReserveController::new(cfg.reserve.clone());

    let mut site = SimulatedSite::new(
        SimConfig {
            max_apparent_power_w: cfg.controller.max_apparent_power_w,
            grid_charge_allowed: cfg.controller.grid_charge_allowed,
            ..SimConfig::default()
        },
        tick.as_secs_f64(),
    );

    info!(
        reserve_soc = cfg.reserve.effective_reserve_soc(),
        tick_s = tick.as_secs(),
        "starting energy control engine"
    );

    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut limit: Option<i64> = None;

    let shutdown = telemetry::shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let input = site.step(limit);
                limit = controller.run_cycle(&input);
                info!(
                    soc = input.soc,
                    state = ?controller.state(),
                    limit_w = limit,
                    "cycle complete"
                );
            }
            _ = &mut shutdown => break,
        }
    }

    warn!("shutdown complete");
    Ok(())
}
