use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use arboard::Clipboard;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncBufReadExt;
use tracing::warn;

use crate::capture::{
    CaptureError, CaptureMachine, CaptureOptions, CapturePhase, HttpSessionApi, MicSource,
    TickOutcome,
};
use crate::config::Config;
use crate::protocol::{SessionMode, TranscriptResult};
use crate::speech::languages;

use super::RecordCliArgs;

pub async fn handle_record_command(args: RecordCliArgs) -> Result<()> {
    let config = Config::load()?;

    let mode = if args.translate || config.capture.translate_by_default {
        SessionMode::Translate
    } else {
        SessionMode::Transcribe
    };
    let language = languages::normalize_code(
        args.language
            .as_deref()
            .or(config.capture.language.as_deref()),
    );
    let target_language = languages::normalize_code(
        args.target_lang
            .as_deref()
            .or(config.capture.target_language.as_deref()),
    );
    let server_url = args
        .server_url
        .unwrap_or_else(|| config.capture.server_url.clone());

    let api = Arc::new(HttpSessionApi::new(server_url)?);
    let options = CaptureOptions {
        mode,
        language,
        target_language,
        max_duration: Duration::from_secs(config.capture.max_duration_seconds),
    };
    let mut machine = CaptureMachine::new(Box::new(MicSource::new()), api, options);

    if let Err(err) = machine.start().await {
        match err {
            CaptureError::DeviceAccessDenied(_) => {
                bail!("{err}. Check your microphone permissions, then start a new recording.");
            }
            other => bail!("{other}"),
        }
    }

    println!("Recording. Press Enter to stop.");
    let clock = ProgressBar::new_spinner();
    clock.set_style(ProgressStyle::with_template("{spinner} {elapsed_precise} {msg}")?);
    clock.enable_steady_tick(Duration::from_millis(120));

    let mut interval =
        tokio::time::interval(Duration::from_millis(config.capture.chunk_interval_ms));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let result: Option<TranscriptResult> = loop {
        tokio::select! {
            _ = interval.tick() => {
                match machine.tick().await {
                    Ok(TickOutcome::AutoStopped(result)) => break Some(result),
                    Ok(_) => {}
                    Err(_) => break None,
                }
            }
            _ = lines.next_line() => {
                clock.set_message("uploading");
                match machine.stop().await {
                    Ok(result) => break Some(result),
                    Err(_) => break None,
                }
            }
            _ = &mut ctrl_c => {
                clock.finish_and_clear();
                if let Some(handle) = machine.abandon() {
                    let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
                }
                println!("Recording abandoned.");
                return Ok(());
            }
        }
    };
    clock.finish_and_clear();

    let result = match result {
        Some(result) => result,
        None => match resolve_failure(&mut machine).await? {
            Some(result) => result,
            None => {
                println!("Recording cancelled.");
                return Ok(());
            }
        },
    };

    println!("\n{}", result.text);
    if let Some(translated) = &result.translated_text {
        println!("\n--- Translation ---\n{translated}");
    }

    if config.capture.copy_to_clipboard && !args.no_copy {
        let text = result
            .translated_text
            .as_deref()
            .unwrap_or(&result.text)
            .to_string();
        match Clipboard::new().and_then(|mut clipboard| clipboard.set_text(text)) {
            Ok(()) => println!("\nCopied to clipboard."),
            Err(err) => warn!("Failed to copy to clipboard: {err}"),
        }
    }

    Ok(())
}

/// Present Retry/Cancel until the recording either completes or the
/// operator gives up. Failures with no preserved session (device denial,
/// allocation failure, expired session) are terminal for the attempt.
async fn resolve_failure(machine: &mut CaptureMachine) -> Result<Option<TranscriptResult>> {
    loop {
        let message = machine
            .last_error()
            .unwrap_or("recording failed")
            .to_string();
        if machine.phase() != CapturePhase::Error || machine.session_id().is_none() {
            bail!("{message}");
        }
        eprintln!("Error: {message}");

        let choice = tokio::task::spawn_blocking(|| {
            dialoguer::Select::new()
                .with_prompt("The recording hit a recoverable error")
                .items(&["Retry", "Cancel"])
                .default(0)
                .interact()
        })
        .await??;

        match choice {
            0 => match machine.retry().await {
                Ok(result) => return Ok(Some(result)),
                Err(err) => {
                    warn!("Retry failed: {err}");
                }
            },
            _ => {
                if let Err(err) = machine.cancel().await {
                    warn!("Cancel reported: {err}");
                }
                return Ok(None);
            }
        }
    }
}
