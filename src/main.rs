use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use host_monitor::cli::Cli;
use host_monitor::{
    AppConfig, CommandProber, Console, IcmpProber, Monitor, MonitorSettings, ProbeBackend, Prober,
    RealFilesystem, ShutdownReport, SystemClock, Target, load_hosts,
};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    cli.apply(&mut config);
    config.validate().context("invalid configuration")?;

    if cli.write_config {
        let path = match &cli.config {
            Some(path) => path.clone(),
            None => AppConfig::get_config_path()?,
        };
        config
            .save(&path)
            .with_context(|| format!("failed to save {}", path.display()))?;
        println!("✅ configuration written to {}", path.display());
        return Ok(());
    }

    let targets = load_hosts(&config.hosts_file)
        .with_context(|| format!("failed to load targets from {}", config.hosts_file.display()))?;
    info!("loaded {} target(s) from {}", targets.len(), config.hosts_file.display());

    let shutdown = CancellationToken::new();
    listen_for_interrupt(shutdown.clone());

    let report = match config.backend {
        ProbeBackend::Command => {
            let prober = CommandProber::new(config.reply_parser(), config.ping_wait(), config.probe_timeout());
            start(targets, prober, &config, shutdown).await
        }
        ProbeBackend::Icmp => {
            let prober = IcmpProber::new(config.ping_wait(), config.probe_timeout())
                .context("failed to open an ICMP socket, try --backend command")?;
            start(targets, prober, &config, shutdown).await
        }
    };

    if report.unsaved > 0 {
        warn!("{} record(s) were not saved", report.unsaved);
    }
    Ok(())
}

async fn start<P: Prober + 'static>(
    targets: Vec<Target>,
    prober: P,
    config: &AppConfig,
    shutdown: CancellationToken,
) -> ShutdownReport {
    let monitor = Monitor::new(
        targets,
        prober,
        SystemClock,
        RealFilesystem,
        &config.log_settings(),
        MonitorSettings::from(config),
        Console::stdout(),
    );
    println!(
        "\n🚀 monitoring {} target(s), logs go to {}\n",
        monitor.targets().len(),
        monitor.journal().all().path().display()
    );
    monitor.run(shutdown).await
}

fn listen_for_interrupt(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, shutting down");
                shutdown.cancel();
            }
            Err(e) => warn!("unable to listen for interrupt: {e}"),
        }
    });
}
