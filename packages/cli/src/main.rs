use anyhow::{Context, bail};
use std::path::PathBuf;
use zw_driver::{Driver, DriverOptions, Notification};
use zw_logging::Loglevel;

fn usage() -> ! {
    eprintln!("usage: cli <serial-port|tcp://host:port> [--state <file>] [--log-level <level>]");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(port) = args.next() else { usage() };

    let mut state_path: Option<PathBuf> = None;
    let mut log_level = Loglevel::Debug;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--state" => {
                state_path = Some(args.next().map(PathBuf::from).unwrap_or_else(|| usage()));
            }
            "--log-level" => {
                let level = args.next().unwrap_or_else(|| usage());
                log_level = level
                    .parse()
                    .map_err(|e| anyhow::anyhow!("bad --log-level: {}", e))?;
            }
            other => bail!("unknown argument: {}", other),
        }
    }

    let options = DriverOptions::builder()
        .log_level(log_level)
        .state_path(state_path)
        .build();

    let (driver, join) = Driver::open(&port, options).context("opening the Z-Wave port")?;

    driver.add_watcher(|notification| match notification {
        Notification::ValueChanged(id) | Notification::ValueRefreshed(id) => {
            println!("value {:?} updated", id);
        }
        Notification::AllNodesQueried => {
            println!("all nodes queried, network is ready");
        }
        other => println!("{:?}", other),
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            eprintln!("shutting down");
            driver.close().ok();
        }
        _ = join => {
            bail!("driver exited unexpectedly");
        }
    }

    Ok(())
}
