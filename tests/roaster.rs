//! End-to-end tests of the roaster handle over a scripted link
//!
//! Each test runs the real polling thread with a short interval and waits
//! on published updates with generous timeouts.

use futures::{Stream, StreamExt};
use hottop::links::Response;
use hottop::{
    EventKind, LoopState, RoastPhase, Roaster, RoasterConfig, RoasterError, RoasterUpdate,
    ScriptedLink, TickResult,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

const WAIT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fast_config() -> RoasterConfig {
    let mut config = RoasterConfig::default();
    config.polling.interval_ms = 10;
    config.polling.wake_up_frames = 1;
    config
}

fn echo(bean: u16) -> Response {
    Response::Echo { bean, env: bean + 20 }
}

async fn next_tick<S, F>(updates: &mut S, accept: F) -> Arc<TickResult>
where
    S: Stream<Item = RoasterUpdate> + Unpin,
    F: Fn(&TickResult) -> bool,
{
    let wait = async {
        while let Some(update) = updates.next().await {
            if let RoasterUpdate::Tick(tick) = update {
                if accept(&tick) {
                    return tick;
                }
            }
        }
        panic!("update stream ended");
    };
    timeout(WAIT, wait).await.expect("no matching tick in time")
}

async fn wait_for_state(roaster: &Roaster, expected: LoopState) {
    let mut state = roaster.watch_state();
    timeout(WAIT, state.wait_for(|s| *s == expected))
        .await
        .expect("state change timed out")
        .expect("state channel closed");
}

#[tokio::test]
async fn monitoring_publishes_ticks_and_applies_settings() {
    init_tracing();
    let link = ScriptedLink::echoing([185]);
    let mut roaster = Roaster::new(link.clone(), fast_config()).unwrap();
    let mut updates = Box::pin(roaster.subscribe());

    roaster.start_monitoring().unwrap();
    assert_eq!(roaster.state(), LoopState::Polling(RoastPhase::Idle));

    let tick = next_tick(&mut updates, |_| true).await;
    assert_eq!(tick.phase, RoastPhase::Idle);
    assert_eq!(tick.reading.bean_temp, 185.0);
    assert_eq!(tick.elapsed, None);

    roaster.set_heater(70).unwrap();
    roaster.set_fan(44).unwrap();
    let tick = next_tick(&mut updates, |t| t.sent.heater() == 70).await;
    assert_eq!(tick.sent.fan(), 40);
    // The device echoes the command it just received.
    assert_eq!(tick.reading.settings.heater(), 70);
    assert!(roaster.latest().is_some());

    roaster.stop_monitoring().unwrap();
    assert_eq!(roaster.state(), LoopState::Stopped);
}

#[tokio::test]
async fn monitoring_start_keeps_levels_and_roast_start_resets() {
    init_tracing();
    let mut roaster = Roaster::new(ScriptedLink::echoing([190]), fast_config()).unwrap();

    roaster.set_heater(40).unwrap();
    assert!(roaster.toggle_drum());
    roaster.start_monitoring().unwrap();

    let settings = roaster.settings();
    assert_eq!(settings.heater(), 40);
    assert!(!settings.drum_motor());

    roaster.start_roast().unwrap();
    assert_eq!(roaster.settings().heater(), 0);
    assert_eq!(roaster.state(), LoopState::Polling(RoastPhase::Roasting));

    let err = roaster.start_roast().unwrap_err();
    assert!(matches!(err, RoasterError::InvalidState { .. }), "got {err:?}");
}

#[tokio::test]
async fn roast_cycle_runs_through_cooling_back_to_idle() {
    init_tracing();
    let mut config = fast_config();
    config.polling.cooling_secs = 1;
    let link = ScriptedLink::echoing([200]);
    let mut roaster = Roaster::new(link.clone(), config).unwrap();
    let mut updates = Box::pin(roaster.subscribe());

    roaster.start_monitoring().unwrap();
    roaster.start_roast().unwrap();
    let tick = next_tick(&mut updates, |t| t.phase == RoastPhase::Roasting).await;
    assert!(tick.elapsed.is_some());

    roaster.set_heater(90).unwrap();
    roaster.stop_roast().unwrap();

    let tick = next_tick(&mut updates, |t| t.phase == RoastPhase::Cooling).await;
    assert!(tick.sent.drum_motor());
    assert!(tick.sent.cooling_motor());
    assert_eq!(tick.sent.heater(), 0);
    assert_eq!(tick.sent.main_fan(), 100);

    wait_for_state(&roaster, LoopState::Polling(RoastPhase::Idle)).await;
    let settings = roaster.settings();
    assert!(!settings.drum_motor());
    assert!(!settings.cooling_motor());

    roaster.stop_monitoring().unwrap();
}

#[tokio::test]
async fn charge_and_turning_point_reach_subscribers() {
    init_tracing();
    let link = ScriptedLink::new();
    link.repeat(echo(200));
    let mut roaster = Roaster::new(link.clone(), fast_config()).unwrap();
    let mut updates = Box::pin(roaster.subscribe());

    roaster.start_monitoring().unwrap();
    roaster.start_roast().unwrap();
    next_tick(&mut updates, |t| t.phase == RoastPhase::Roasting).await;

    link.extend([195, 180, 160, 150, 152, 158, 165].map(echo));
    link.repeat(echo(170));

    let charge = next_tick(&mut updates, |t| t.event.is_some()).await;
    let turning = next_tick(&mut updates, |t| t.event.is_some()).await;

    let charge = charge.event.unwrap();
    let turning = turning.event.unwrap();
    assert_eq!(charge.kind, EventKind::Charge);
    assert_eq!(charge.temperature, 195.0);
    assert_eq!(turning.kind, EventKind::TurningPoint);
    assert_eq!(turning.temperature, 150.0);
    assert!(charge.elapsed < turning.elapsed);

    let log = roaster.roast_log();
    assert!(log.len() >= 7);
    assert!(log.windows(2).all(|pair| pair[0].elapsed <= pair[1].elapsed));

    roaster.stop_roast().unwrap();
    roaster.stop_monitoring().unwrap();
}

#[tokio::test]
async fn live_roast_blocks_stop_monitoring_until_cooling() {
    init_tracing();
    let link = ScriptedLink::echoing([200]);
    let mut roaster = Roaster::new(link.clone(), fast_config()).unwrap();
    let mut updates = Box::pin(roaster.subscribe());

    roaster.start_monitoring().unwrap();
    roaster.start_roast().unwrap();
    roaster.set_heater(90).unwrap();
    next_tick(&mut updates, |t| t.sent.heater() == 90).await;

    let err = roaster.stop_monitoring().unwrap_err();
    assert!(
        matches!(err, RoasterError::InvalidState { state: LoopState::Polling(RoastPhase::Roasting), .. }),
        "got {err:?}"
    );
    assert_eq!(roaster.state(), LoopState::Polling(RoastPhase::Roasting));

    roaster.stop_roast().unwrap();
    next_tick(&mut updates, |t| t.phase == RoastPhase::Cooling).await;
    roaster.stop_monitoring().unwrap();

    // Leaving mid-cooling switches every motor off.
    let last = link.last_command().unwrap();
    assert_eq!(last.heater(), 0);
    assert!(!last.drum_motor());
    assert!(!last.cooling_motor());
    assert!(!last.solenoid());
    assert_eq!(roaster.state(), LoopState::Stopped);
}

#[tokio::test]
async fn dropping_mid_roast_leaves_heater_off() {
    init_tracing();
    let link = ScriptedLink::echoing([200]);
    let mut roaster = Roaster::new(link.clone(), fast_config()).unwrap();
    let mut updates = Box::pin(roaster.subscribe());

    roaster.start_monitoring().unwrap();
    roaster.start_roast().unwrap();
    roaster.set_heater(90).unwrap();
    next_tick(&mut updates, |t| t.sent.heater() == 90).await;

    drop(roaster);
    timeout(WAIT, async {
        while link.last_command().is_none_or(|s| s.heater() != 0) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("no cooling frame after drop");

    let last = link.last_command().unwrap();
    assert!(last.drum_motor());
    assert!(last.cooling_motor());
}

#[tokio::test]
async fn lost_connection_stops_and_restart_reopens() {
    init_tracing();
    let mut config = fast_config();
    config.retry.max_attempts = 1;
    config.retry.reconnect_after = 1;
    let link = ScriptedLink::new();
    link.fail_reopen(true);
    let mut roaster = Roaster::new(link.clone(), config).unwrap();
    let mut updates = Box::pin(roaster.subscribe());

    roaster.start_monitoring().unwrap();
    let fault = timeout(WAIT, updates.next()).await.expect("no update in time");
    assert!(matches!(fault, Some(RoasterUpdate::Fault(ref e)) if e.is_terminal()));
    wait_for_state(&roaster, LoopState::Stopped).await;
    assert!(roaster.fault().is_some());
    assert!(roaster.start_roast().is_err());

    // Still unreachable: restart surfaces the reopen failure.
    let err = roaster.start_monitoring().unwrap_err();
    assert!(matches!(err, RoasterError::Connection { .. }), "got {err:?}");
    assert!(err.is_retryable());
    assert_eq!(roaster.state(), LoopState::Stopped);

    link.fail_reopen(false);
    link.repeat(echo(180));
    roaster.start_monitoring().unwrap();
    assert!(roaster.fault().is_none());
    let tick = next_tick(&mut updates, |_| true).await;
    assert_eq!(tick.reading.bean_temp, 180.0);

    roaster.stop_monitoring().unwrap();
}

#[tokio::test]
async fn seeded_cache_masks_a_silent_device() {
    init_tracing();
    let link = ScriptedLink::new();
    let seed = hottop::FrameCodec::decode(&hottop::protocol::status_frame(
        &hottop::RoastSettings::baseline(),
        210,
        230,
        true,
    ))
    .unwrap();
    let mut roaster = Roaster::new(link, fast_config()).unwrap().with_cached_reading(seed);
    let mut updates = Box::pin(roaster.subscribe());

    roaster.start_monitoring().unwrap();
    let tick = next_tick(&mut updates, |_| true).await;
    assert_eq!(tick.reading.bean_temp, 210.0);
    assert!(tick.reading.is_stale());

    roaster.stop_monitoring().unwrap();
}

#[tokio::test]
async fn monitoring_restarts_after_stop() {
    init_tracing();
    let mut roaster = Roaster::new(ScriptedLink::echoing([175]), fast_config()).unwrap();
    let mut receiver = roaster.receiver();

    roaster.start_monitoring().unwrap();
    let err = roaster.start_monitoring().unwrap_err();
    assert!(matches!(err, RoasterError::InvalidState { .. }));

    let first = timeout(WAIT, receiver.recv()).await.unwrap().unwrap();
    assert!(matches!(first, RoasterUpdate::Tick(ref t) if t.tick == 1));
    roaster.stop_monitoring().unwrap();
    assert!(roaster.latest().is_some());

    roaster.start_monitoring().unwrap();
    let mut updates = Box::pin(roaster.subscribe());
    let tick = next_tick(&mut updates, |_| true).await;
    assert_eq!(tick.reading.bean_temp, 175.0);

    roaster.stop_monitoring().unwrap();
}

#[tokio::test]
async fn dropping_the_roaster_stops_polling() {
    init_tracing();
    let link = ScriptedLink::echoing([200]);
    let mut roaster = Roaster::new(link.clone(), fast_config()).unwrap();
    let mut updates = Box::pin(roaster.subscribe());
    roaster.start_monitoring().unwrap();
    next_tick(&mut updates, |_| true).await;

    drop(roaster);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let settled = link.written().len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(link.written().len(), settled);
}
