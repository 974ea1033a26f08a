//! Wires config, input, backend, sink, guard and progress into one run.

use std::time::Duration;

use quill_core::api::{
    self as core_api, AppConfig, BackendKind, CliError, ControllerOptions, Device,
    GenerationController, InputGuard, KillSwitch, ProgressIndicator, SinkKind,
};
use quill_plugins::factory::build_provider;

use crate::commands::cli::{Args, BackendArg, DeviceArg};
use crate::input::load_input;

#[tracing::instrument(name = "cli.run_app", skip_all)]
pub async fn run_app(args: Args, mut cfg: AppConfig) -> Result<i32, CliError> {
    apply_arg_overrides(&mut cfg, &args)?;

    // Input problems must surface before a model resource exists.
    let input = load_input(&args).await?;

    let provider = build_provider(&cfg).map_err(|e| CliError::Backend(format!("{e:#}")))?;
    let session = provider
        .open_session(&cfg.generation)
        .await
        .map_err(|e| CliError::Backend(format!("{e:#}")))?;

    let stdin_tty = atty::is(atty::Stream::Stdin);
    let mut sink = SinkKind::select(
        input.append_to.clone(),
        atty::is(atty::Stream::Stdout),
        &input.text,
    );
    let guard = if stdin_tty {
        InputGuard::interactive()
    } else {
        InputGuard::inert()
    };
    let progress = ProgressIndicator::new(
        cfg.stream.progress && !args.no_progress && atty::is(atty::Stream::Stderr),
        Duration::from_millis(cfg.stream.progress_tick_ms),
    );

    let controller = GenerationController::new(
        session,
        cfg.generation.clone(),
        ControllerOptions::from(&cfg.stream),
    )
    .with_guard(guard)
    .with_progress(progress);

    // Raw mode turns Ctrl-C into a key event the guard sees; without a tty
    // it stays a signal.
    let interrupt = (!stdin_tty).then(|| spawn_interrupt_listener(controller.kill_switch()));

    let outcome = controller.run(&input.text, &mut sink).await;
    if let Some(task) = interrupt {
        task.abort();
    }

    tracing::info!(
        run_id = %outcome.run_id,
        phase = outcome.phase.as_str(),
        emitted = outcome.emitted,
        trimmed = outcome.trimmed,
        "run finished"
    );
    if let Some(err) = &outcome.error {
        tracing::warn!(run_id = %outcome.run_id, error = %err, "run ended early");
    }
    Ok(0)
}

fn spawn_interrupt_listener(kill: KillSwitch) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error.kind = "cli.signal", error = %e, "cannot listen for SIGINT");
                return;
            }
            if !kill.request_kill() {
                tracing::debug!("SIGINT ignored: not generating");
            }
        }
    })
}

/// Command-line flags win over config file and environment.
pub fn apply_arg_overrides(cfg: &mut AppConfig, args: &Args) -> Result<(), CliError> {
    if let Some(backend) = args.backend {
        cfg.backend.kind = match backend {
            BackendArg::Ollama => BackendKind::Ollama,
            BackendArg::Llamacpp => BackendKind::Llamacpp,
        };
    }
    if let Some(url) = &args.url {
        cfg.backend.url = url.clone();
    }
    if let Some(model) = &args.model {
        cfg.backend.model = model.clone();
    }
    if let Some(device) = args.device {
        cfg.generation.device = match device {
            DeviceArg::Auto => Device::Auto,
            DeviceArg::Cpu => Device::Cpu,
            DeviceArg::Gpu => Device::Gpu,
        };
    }
    if let Some(n) = args.n_predict {
        cfg.generation.n_predict = n;
    }
    if let Some(depth) = args.lookahead {
        cfg.stream.lookahead_depth = usize::try_from(depth)
            .map_err(|_| CliError::Config(format!("--lookahead {depth} is too large")))?;
    }
    core_api::validate(cfg)
}
