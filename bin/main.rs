use tracing::{error, info};

use clap::{value_t, App, Arg};

use tradenet::network::TransportKind;
use tradenet::server::{Node, Settings};
use tradenet::Result;

use std::path::PathBuf;

fn main() -> Result<()> {
    let matches = App::new("tradenet")
        .version("0.1")
        .about("Runs a peer-to-peer trade node")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("transport")
                .short("t")
                .long("transport")
                .value_name("TRANSPORT")
                .possible_values(&["tor", "i2p", "clear"])
                .takes_value(true),
        )
        .arg(Arg::with_name("port").short("p").long("port").value_name("PORT").takes_value(true))
        .arg(
            Arg::with_name("base-dir")
                .short("d")
                .long("base-dir")
                .value_name("DIR")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("log-level")
                .short("l")
                .long("log-level")
                .value_name("LEVEL")
                .possible_values(&["error", "warn", "info", "debug", "trace"])
                .default_value("info"),
        )
        .get_matches();

    let level = value_t!(matches.value_of("log-level"), tracing::Level).unwrap_or_else(|e| e.exit());
    tracing_subscriber::fmt()
        .with_level(false)
        .with_target(false)
        .without_time()
        .compact()
        .with_max_level(level)
        .init();

    let mut settings = Settings::load(matches.value_of("config").map(PathBuf::from).as_deref())?;
    if matches.is_present("transport") {
        settings.transport = value_t!(matches.value_of("transport"), TransportKind).unwrap_or_else(|e| e.exit());
    }
    if matches.is_present("port") {
        settings.port = Some(value_t!(matches.value_of("port"), u16).unwrap_or_else(|e| e.exit()));
    }
    if let Some(dir) = matches.value_of("base-dir") {
        settings.base_dir = Some(PathBuf::from(dir));
    }

    let sys = actix::System::new();
    let result = sys.block_on(async move {
        let node = Node::start(settings).await?;

        let sig = if cfg!(unix) {
            use futures::future::FutureExt;
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigint = signal(SignalKind::interrupt())?;
            let mut sigterm = signal(SignalKind::terminate())?;

            futures::select! {
                _ = sigint.recv().fuse() => "SIGINT",
                _ = sigterm.recv().fuse() => "SIGTERM"
            }
        } else {
            tokio::signal::ctrl_c().await?;
            "Ctrl+C"
        };
        info!(target: "tradenet", "Got {}, stopping...", sig);

        let stopped = node.shutdown().await;
        actix::System::current().stop();
        stopped
    });
    if let Err(err) = result.as_ref() {
        error!("node failed: {}", err);
    }
    result
}
