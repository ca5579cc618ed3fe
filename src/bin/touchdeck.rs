use std::path::PathBuf;
use std::process;

use clap::Parser;
use touchdeck::common::config::{Config, config_file};
use touchdeck::common::log;

#[derive(Parser)]
struct Cli {
    /// Path to configuration file to use (overrides default).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Check the configuration file and exit.
    #[arg(long)]
    validate: bool,
}

fn main() -> anyhow::Result<()> {
    sigpipe::reset();
    let opt = Cli::parse();

    if std::env::var_os("RUST_BACKTRACE").is_none() {
        // SAFETY: We are single threaded at this point.
        unsafe { std::env::set_var("RUST_BACKTRACE", "1") };
    }
    log::init_logging();

    let config_path = opt.config.clone().unwrap_or_else(config_file);
    let config = if config_path.exists() {
        Config::read(&config_path)?
    } else {
        Config::default()
    };

    let issues = config.validate();
    if opt.validate {
        if issues.is_empty() {
            println!("Config validation passed");
        } else {
            for issue in issues {
                eprintln!("{}", issue);
            }
            process::exit(1);
        }
        return Ok(());
    }
    for issue in &issues {
        eprintln!("config: {}", issue);
    }
    if !issues.is_empty() {
        process::exit(1);
    }

    run(config)
}

#[cfg(target_os = "macos")]
fn run(config: Config) -> anyhow::Result<()> {
    use std::sync::Arc;

    use tokio::join;
    use touchdeck::actor;
    use touchdeck::actor::coordinator::{Coordinator, Event, RenderRequest, StateSnapshot};
    use touchdeck::actor::invoker::{self, ActionInvoker};
    use touchdeck::actor::poller::{self, ForegroundPoller};
    use touchdeck::actor::window_notify::WindowNotify;
    use touchdeck::classify::{KeywordPolicy, WindowClassifier};
    use touchdeck::sys::macos::{MacPlatform, spawn_window_monitor};
    use touchdeck::sys::window::{AccessibilityOps, KeyInjector, WindowHandle, WindowOps};
    use tracing::info;

    let platform = MacPlatform::new();
    let ops: Arc<dyn WindowOps> = platform.clone();
    let ax: Arc<dyn AccessibilityOps> = platform.clone();
    let keys: Arc<dyn KeyInjector> = platform.clone();

    let classifier = Arc::new(WindowClassifier::new(
        ops.clone(),
        ax.clone(),
        KeywordPolicy::new(&config.keywords),
        config.detector.process_name.clone(),
        config.detector.min_notification_width,
    ));

    let (events_tx, events_rx) = actor::channel::<Event>();
    let (invoker_tx, invoker_rx) = actor::channel();
    let (poller_tx, poller_rx) = actor::channel();
    let (ui_tx, mut ui_rx) = actor::channel::<RenderRequest>();
    let (raw_tx, raw_rx) = tokio::sync::mpsc::unbounded_channel();
    let snapshot = StateSnapshot::default();

    let coordinator = Coordinator::new(
        config.clone(),
        classifier.clone(),
        invoker_tx.clone(),
        ui_tx,
        snapshot.clone(),
    );
    let coordinator_handle = coordinator.spawn(events_rx);

    spawn_window_monitor(
        platform.clone(),
        raw_tx,
        config.detector.process_name.clone(),
        config.detector.notification_window_class.clone(),
    );

    // Stand-in for the hardware button surface: log what it would show.
    std::thread::spawn(move || {
        while let Some((_span, request)) = ui_rx.blocking_recv() {
            match request {
                RenderRequest::Normal { app, bindings } => {
                    let labels: Vec<&str> =
                        bindings.iter().map(|b| b.display_name.as_str()).collect();
                    info!(%app, ?labels, "render: shortcut grid");
                }
                RenderRequest::IncomingCall { actions } => {
                    info!(?actions, "render: incoming call");
                }
                RenderRequest::InCall => info!("render: in-call controls"),
            }
        }
    });

    {
        let events_tx = events_tx.clone();
        let poller_tx = poller_tx.clone();
        let invoker_tx = invoker_tx.clone();
        ctrlc::set_handler(move || {
            events_tx.send(Event::Shutdown);
            poller_tx.send(poller::Request::Stop);
            invoker_tx.send(invoker::Request::Stop);
        })?;
    }

    let window_notify = WindowNotify::new(
        events_tx.clone(),
        raw_rx,
        config.detector.notification_window_class.clone(),
    );
    let poller = ForegroundPoller::new(
        events_tx.clone(),
        poller_rx,
        ops.clone(),
        classifier.clone(),
        snapshot,
        WindowHandle::NONE,
        config.detector.poll_interval(),
    );
    let invoker = ActionInvoker::new(
        events_tx,
        invoker_rx,
        ops,
        ax,
        keys,
        classifier,
        config.keywords.clone(),
        config.call_keys.clone(),
        config.invoker.clone(),
        config.detector.process_name.clone(),
    );

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        tokio::spawn(window_notify.run());
        join!(poller.run(), invoker.run());
    });

    let _ = coordinator_handle.join();
    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn run(_config: Config) -> anyhow::Result<()> {
    anyhow::bail!("no window backend for this platform yet")
}
