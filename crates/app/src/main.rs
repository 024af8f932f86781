use std::io::{self, BufRead, Write};

use anyhow::Context;

use ledgerflow_app::Bank;
use ledgerflow_infra::CqrsConfig;

fn main() -> anyhow::Result<()> {
    ledgerflow_observability::init();

    let config = CqrsConfig::from_env();
    tracing::info!(?config, "starting ledgerflow");

    let bank = Bank::in_memory(config).context("failed to register handlers")?;

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read request line")?;
        if line.trim().is_empty() {
            continue;
        }
        let response = bank.handle_line(&line);
        serde_json::to_writer(&mut stdout, &response).context("failed to write response")?;
        writeln!(stdout)?;
        stdout.flush()?;
    }

    bank.shutdown();
    tracing::info!("stdin closed; bye");
    Ok(())
}
