//! Interactive chat command.

use std::io::Write;
use std::path::PathBuf;

use futures_util::StreamExt;
use llamapen::Session;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::session_config;

/// Run an interactive chat loop, streaming tokens as they arrive.
pub(crate) async fn run(
    model: &str,
    opts: &[String],
    base_dir: Option<PathBuf>,
) -> miette::Result<()> {
    let config = session_config(model, opts, base_dir)?;
    let mut session = Session::new(config);

    session
        .init(false)
        .await
        .map_err(|e| miette::miette!("Failed to provision assets: {}", e))?;

    println!("Starting model '{}'...", model);
    session
        .open()
        .await
        .map_err(|e| miette::miette!("Failed to start llama process: {}", e))?;
    println!("Ready. Type a prompt, or press Ctrl-D to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        std::io::stdout().flush().ok();

        let Ok(Some(line)) = lines.next_line().await else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let turn = session
            .prompt(&line)
            .await
            .map_err(|e| miette::miette!("Failed to send prompt: {}", e))?;

        let (mut stream, _completion) = turn.into_parts();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(text) => {
                    print!("{}", text);
                    std::io::stdout().flush().ok();
                }
                Err(e) => {
                    eprintln!();
                    eprintln!("Stream failed: {}", e);
                    break;
                }
            }
        }
        println!();
    }

    session
        .close()
        .await
        .map_err(|e| miette::miette!("Failed to stop llama process: {}", e))?;
    Ok(())
}
