use std::process::ExitCode;

use {
    agentwire_agents::{AgentRunError, TurnOutcome},
    anyhow::Result,
    tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        task::JoinHandle,
    },
    tokio_util::sync::CancellationToken,
    tracing::info,
};

use crate::runtime::Runtime;

/// Cancel `token` on Ctrl-C. Abort the handle to stop listening.
fn cancel_on_ctrl_c(token: &CancellationToken) -> JoinHandle<()> {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    })
}

/// Interactive loop over stdin until EOF or `/exit`. Ctrl-C during a turn
/// cancels that turn only; Ctrl-C at the prompt quits.
pub async fn chat(runtime: &Runtime, verbose: bool) -> Result<()> {
    let mut session = runtime.session(CancellationToken::new(), verbose).await?;

    eprintln!(
        "agentwire chat with {} ({} tools). Type /exit to quit.",
        session.provider().id(),
        runtime.tools.len()
    );

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "/exit" | "/quit") {
            break;
        }

        let turn = CancellationToken::new();
        session.set_cancellation(turn.clone());
        let watcher = cancel_on_ctrl_c(&turn);
        let result = session.process_turn(input).await;
        watcher.abort();
        match result {
            Ok(outcome) => {
                stdout
                    .write_all(format!("{}\n\n", outcome.display_text()).as_bytes())
                    .await?;
            },
            Err(AgentRunError::Cancelled) => eprintln!("(turn cancelled)\n"),
            Err(e) => eprintln!("{e}"),
        }
    }
    info!(items = session.conversation().len(), "chat session ended");
    Ok(())
}

/// Answer one message and exit. Anything but a final answer is a failure.
pub async fn ask(runtime: &Runtime, message: &str, verbose: bool) -> Result<ExitCode> {
    let cancel = CancellationToken::new();
    let _watcher = cancel_on_ctrl_c(&cancel);
    let mut session = runtime.session(cancel, verbose).await?;

    let outcome = session.process_turn(message).await?;
    match outcome {
        TurnOutcome::FinalAnswer(answer) => {
            println!("{answer}");
            Ok(ExitCode::SUCCESS)
        },
        other => {
            eprintln!("{}", other.display_text());
            Ok(ExitCode::FAILURE)
        },
    }
}
