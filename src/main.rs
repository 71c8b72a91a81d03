use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{error, info};

use fsload::{actions, Config, FsloadError, HostRunner, Settings, SshExecutor};

async fn run(cli: &Config) -> Result<(), FsloadError> {
    // Everything is validated here, before any node is contacted.
    let settings = Settings::load(&cli.overrides)?;
    info!(
        "DataNodes: {}",
        settings
            .inventory
            .nodes()
            .iter()
            .map(|node| node.hostname.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    );
    let executor = Arc::new(SshExecutor::new(
        settings.tools.clone(),
        settings.ssh.clone(),
        cli.quiet,
    ));
    let runner = HostRunner::new(cli.quiet);
    actions::run(&cli.action, &settings, executor, &runner).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Config::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // Help and version requests are not failures.
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| writeln!(buf, "[fsload] {}: {}", record.level(), record.args()))
        .init();

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
