use circuit_snap::demo::{all_demos, build_demo, find_demo, DemoKind};
use circuit_snap::{lock_scene, Arranger, EventSink, Scene, SnapConfig, SnapError};

/// Usage: `circuit_snap [scene.json | demo-name] [config.json]`
///
/// Arranges the scene once and prints the resulting scene as JSON.
#[tokio::main]
async fn main() -> Result<(), SnapError> {
    // Set up logging, controlled by RUST_LOG
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let scene = match args.next() {
        Some(arg) => match find_demo(&arg) {
            Some(kind) => build_demo(kind),
            None => Scene::from_json(&std::fs::read_to_string(&arg)?)?,
        },
        None => {
            let names: Vec<&str> = all_demos().iter().map(|demo| demo.name).collect();
            log::info!(
                "no scene given, using demo \"board\" (available: {})",
                names.join(", ")
            );
            build_demo(DemoKind::MixedBoard)
        }
    };
    let config = match args.next() {
        Some(path) => SnapConfig::load(path)?,
        None => SnapConfig::default().instant(),
    };

    let scene = scene.into_shared();
    let (events, mut rx) = EventSink::channel();
    let listener = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            log::info!("event: {event:?}");
        }
    });

    let arranger = Arranger::new(scene.clone(), config, events);
    let monitor = arranger.start_monitor();
    let outcome = arranger.arrange_with_scripted_display().await;

    // Stop the monitor and close the channel so the listener drains and exits.
    monitor.abort();
    let _ = monitor.await;
    drop(arranger);
    if let Err(err) = listener.await {
        log::warn!("event listener failed: {err}");
    }

    let report = outcome?;
    for warning in &report.warnings {
        log::warn!("{warning}");
    }
    println!("{}", lock_scene(&scene).to_json()?);
    Ok(())
}
