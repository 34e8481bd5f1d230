//! modflow demo
//!
//! Builds a small graph in one container: a source module producing sample
//! batches and two consumer modules running their own loops on worker
//! threads. The graph is wired and torn down through combiners.
//!
//! Usage: `modflow [config.toml]`

use anyhow::{anyhow, Context};
use modflow::{
    config::KernelConfig,
    kernel::{
        Combiner, ConnectorRef, InputData, Module, ModuleContainer, ModuleNotifier, NoopNotifier,
        OutputData,
    },
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logs edge changes of consumer modules.
struct EdgeLogger;

impl ModuleNotifier for EdgeLogger {
    fn connection_established(&self, here: &ConnectorRef, there: &ConnectorRef) {
        tracing::info!("{} now reads from {}", here, there);
    }

    fn connection_closed(&self, here: &ConnectorRef, there: &ConnectorRef) {
        tracing::info!("{} no longer reads from {}", here, there);
    }
}

fn init_logging(config: &KernelConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    let (file_layer, guard) = match &config.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow!("log_file {:?} has no file name", path))?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(guard)
}

fn spawn_consumer(
    module: Arc<Module>,
    input: InputData<Vec<f64>>,
    running: Arc<AtomicBool>,
    timeout: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || {
        tracing::info!("Module {} started", module.name());
        while running.load(Ordering::SeqCst) {
            if !module.state().wait_timeout(timeout) {
                continue;
            }
            match input.data(true) {
                Some(batch) if !batch.is_empty() => {
                    let value = match module.name() {
                        "peak" => batch.iter().copied().fold(f64::MIN, f64::max),
                        _ => batch.iter().sum::<f64>() / batch.len() as f64,
                    };
                    tracing::info!("Module {} computed {:.3}", module.name(), value);
                }
                _ => tracing::info!("Module {} has no data", module.name()),
            }
        }
        tracing::info!("Module {} stopped", module.name());
    })
}

fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => KernelConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => KernelConfig::load_or_default(),
    };
    let _log_guard = init_logging(&config)?;

    tracing::info!("Starting modflow kernel demo");

    let container = ModuleContainer::from_config(&config);
    let events = container.subscribe();

    let source = Module::new("source", "Produces sample batches", Arc::new(NoopNotifier));
    let samples = OutputData::<Vec<f64>>::create(&source, "samples", "Sample batches")?;
    container.add(source.clone())?;

    let running = Arc::new(AtomicBool::new(true));
    let mut workers = Vec::new();
    for (name, description) in [("mean", "Averages each batch"), ("peak", "Tracks the batch maximum")] {
        let module = Module::new(name, description, Arc::new(EdgeLogger));
        let input = InputData::<Vec<f64>>::create(&module, "samples", "Sample batches")?;
        container.add(module.clone())?;
        workers.push(spawn_consumer(
            module,
            input,
            running.clone(),
            config.wait_timeout(),
        ));
    }

    for (target, combiners) in container.possible_connections(&source) {
        for combiner in combiners {
            combiner
                .with_force(config.force_connections)
                .apply()
                .with_context(|| format!("Failed to wire {}", target.name()))?;
        }
    }

    for batch in 1..=3 {
        let values: Vec<f64> = (0..8).map(|i| f64::from(i * batch)).collect();
        samples.update_data(Arc::new(values));
        thread::sleep(config.wait_timeout());
    }

    for (connector, combiners) in source.possible_disconnections() {
        for combiner in combiners {
            combiner
                .apply()
                .with_context(|| format!("Failed to unwire {}", connector))?;
        }
    }

    running.store(false, Ordering::SeqCst);
    for worker in workers {
        worker
            .join()
            .map_err(|_| anyhow!("consumer thread panicked"))?;
    }

    for event in events.try_iter() {
        tracing::debug!("Container event: {:?}", event);
    }
    println!("{}", serde_json::to_string_pretty(&container.snapshot())?);

    tracing::info!("Shutting down...");
    Ok(())
}
