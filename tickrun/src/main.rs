use anyhow::Result;
use std::time::Duration;
use tickrun::prelude::*;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .init();

    info!("tickdev {} starting", tickrun::VERSION);

    // 2. Create the runner. An optional `tickdev.toml` next to the binary
    //    can contribute extra interval plans.
    let runner = Runner::try_current()?;
    let extra_plans = RunnerConfig::load("tickdev")
        .map(|cfg| cfg.intervals)
        .unwrap_or_default();

    // 3. Watch the event stream.
    spawn_event_listener(&runner);

    // 4. Register demo workloads.
    register_demo_components(&runner, extra_plans);

    // 5. Let everything tick for a while, then shut down cleanly.
    tokio::time::sleep(Duration::from_secs(4)).await;
    runner.shutdown();
    tokio::time::sleep(Duration::from_millis(100)).await;
    info!("tickdev done");
    Ok(())
}

/// Subscribes to the runner's event stream and logs everything it sees.
fn spawn_event_listener(runner: &Runner) {
    let mut events = runner.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!("[EVENT] => {:?}", event);
        }
    });
}

/// An interval callback that logs every stage of its lifecycle.
struct Heartbeat {
    label: &'static str,
}

impl Interval for Heartbeat {
    fn tick(&mut self, index: u64) {
        info!("[{}] tick #{}", self.label, index);
    }

    fn finish(&mut self) {
        info!("[{}] finish", self.label);
    }

    fn cancel(&mut self) {
        info!("[{}] cancel", self.label);
    }
}

fn register_demo_components(runner: &Runner, extra_plans: Vec<IntervalPlan>) {
    // --- A finite heartbeat: ten ticks, 200ms apart ---
    runner.interval(
        IntervalPlan::every(Duration::from_millis(200)).times(10),
        Heartbeat { label: "finite" },
    );

    // --- An unbounded heartbeat, torn down after one second ---
    let endless = runner.interval(
        IntervalPlan::every(Duration::from_millis(150)).starting_at(100),
        Heartbeat { label: "endless" },
    );
    let teardown = runner.clone();
    runner.spawn_delayed(Duration::from_secs(1), move || {
        let removed = teardown.cancel_interval(endless);
        info!("[endless] cancel_interval => {removed}");
    });

    // --- Any plans contributed by tickdev.toml ---
    for (n, plan) in extra_plans.into_iter().enumerate() {
        runner.interval_fn(plan, move |index| {
            info!("[config-{n}] tick #{index}");
        });
    }

    // --- A sync task, blocked on from the blocking pool ---
    let sync_runner = runner.clone();
    tokio::task::spawn_blocking(move || {
        let answer = sync_runner.sync(|| {
            std::thread::sleep(Duration::from_millis(50));
            42
        });
        info!("[sync] answer => {:?}", answer);
    });

    // --- A bounded wait on a cell nobody ever runs ---
    tokio::task::spawn_blocking(|| {
        let stuck: SyncTask<&str> = SyncTask::new(|| "never produced");
        let result = stuck.wait_timeout(Duration::from_millis(200), true);
        info!("[timeout] result => {:?}, done => {}", result, stuck.is_done());
    });

    // --- A submitted task cancelled before it can be dispatched ---
    let submitted = runner.submit(|| "never runs");
    submitted.cancel();
    info!(
        "[cancel] still pending => {}",
        runner.pending().contains(submitted.key())
    );
}
