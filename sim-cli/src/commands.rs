//! Command handlers

use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use sim_control::{
    run_poll_loop, ControllerConfig, LedIndicator, OutputChannel, PollCommand, PollExit, PollLoop,
    ProjectDocument, SimulationController, SimulationEvent,
};
use sim_runtime::{BuildOptions, MemoryStats};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::cli::{Command, RunArgs};
use crate::settings::Settings;

/// Script written into new projects
const STARTER_SCRIPT: &str = "\
# Blink the status LED
println \"hello\"
loop
  pin 2 toggle
  wait 10
end
";

/// Run one command
pub async fn dispatch(command: Command, settings: &Settings) -> Result<()> {
    match command {
        Command::New { project } => new_project(&project, settings),
        Command::Ls { project } => list(&open(&project, settings)?),
        Command::Add {
            project,
            source,
            dest,
        } => add(&project, &source, dest, settings),
        Command::Rm { project, path } => remove(&project, &path, settings),
        Command::Mv { project, from, to } => rename(&project, &from, &to, settings),
        Command::Cat { project, path } => cat(&project, &path, settings),
        Command::Import {
            project,
            image,
            yes,
        } => import(&project, &image, yes, settings),
        Command::Export { project, image } => {
            open(&project, settings)?.export_binary(&image)?;
            Ok(())
        }
        Command::Build {
            project,
            print_code,
            debug,
        } => build(&project, print_code, BuildOptions { debug }, settings),
        Command::Run(args) => run(args, settings).await,
        Command::Config { init } => config(init, settings),
    }
}

/// Open a project with a controller configured from settings
fn open(project: &Path, settings: &Settings) -> Result<ProjectDocument> {
    open_with_config(project, &settings.controller_config())
}

fn open_with_config(project: &Path, config: &ControllerConfig) -> Result<ProjectDocument> {
    let controller = SimulationController::from_config(config);
    let doc = ProjectDocument::open_with(project, controller)
        .with_context(|| format!("Failed to open {}", project.display()))?;
    for path in doc.unrecognized_paths() {
        eprintln!("warning: {}: name not valid on the device; kept but not loaded", path);
    }
    Ok(doc)
}

/// Forward controller output: device console to stdout, the rest to stderr
fn print_output(text: &str, channel: OutputChannel) {
    match channel {
        OutputChannel::Console => {
            let mut stdout = io::stdout().lock();
            let _ = stdout.write_all(text.as_bytes());
            let _ = stdout.flush();
        }
        OutputChannel::Build => eprint!("{}", text),
    }
}

fn new_project(project: &Path, settings: &Settings) -> Result<()> {
    if project.exists() {
        bail!("{} already exists", project.display());
    }
    let name = project
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut doc = ProjectDocument::new(name);
    doc.files_mut()
        .add(settings.entry.as_str(), STARTER_SCRIPT.as_bytes())?;
    doc.save(project)?;
    println!("Created {}", project.display());
    Ok(())
}

fn list(doc: &ProjectDocument) -> Result<()> {
    if let Some(e) = doc.load_error() {
        eprintln!("warning: {}", e);
    }
    for (path, contents) in doc.files().iter() {
        println!("{:>8}  {}", contents.len(), path);
    }
    println!(
        "{} files, {} bytes",
        doc.files().len(),
        doc.files().total_size()
    );
    Ok(())
}

fn add(project: &Path, source: &Path, dest: Option<String>, settings: &Settings) -> Result<()> {
    let contents =
        std::fs::read(source).with_context(|| format!("Failed to read {}", source.display()))?;
    let dest = match dest {
        Some(dest) => dest,
        None => source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .context("Source has no file name; pass --as")?,
    };

    let mut doc = open(project, settings)?;
    if doc.files_mut().add(dest.as_str(), contents)?.is_some() {
        info!("Replaced {}", dest);
    }
    doc.save_in_place()?;
    Ok(())
}

fn remove(project: &Path, path: &str, settings: &Settings) -> Result<()> {
    let mut doc = open(project, settings)?;
    if doc.files_mut().remove(path).is_none() {
        eprintln!("{}: no such file", path);
        return Ok(());
    }
    doc.save_in_place()?;
    Ok(())
}

fn rename(project: &Path, from: &str, to: &str, settings: &Settings) -> Result<()> {
    let mut doc = open(project, settings)?;
    doc.files_mut().rename(from, to)?;
    doc.save_in_place()?;
    Ok(())
}

fn cat(project: &Path, path: &str, settings: &Settings) -> Result<()> {
    let doc = open(project, settings)?;
    let contents = doc
        .files()
        .get(path)
        .with_context(|| format!("{}: no such file", path))?;
    io::stdout().lock().write_all(contents)?;
    Ok(())
}

fn import(project: &Path, image: &Path, yes: bool, settings: &Settings) -> Result<()> {
    let mut doc = open(project, settings)?;
    if !yes {
        bail!(
            "import replaces all {} files in {}; pass --yes to confirm",
            doc.files().len(),
            project.display()
        );
    }
    let count = doc.import_binary(image)?;
    doc.save_in_place()?;
    println!("Imported {} files", count);
    Ok(())
}

fn build(
    project: &Path,
    print_code: bool,
    options: BuildOptions,
    settings: &Settings,
) -> Result<()> {
    let mut doc = open(project, settings)?;
    doc.controller_mut().set_output_handler(print_output);
    doc.build_with(options)?;
    if print_code {
        doc.controller_mut().print_code();
    }
    Ok(())
}

async fn run(args: RunArgs, settings: &Settings) -> Result<()> {
    let config = settings.controller_config();
    let mut doc = open_with_config(&args.project, &config)?;
    doc.controller_mut().set_output_handler(print_output);
    doc.simulate_with(BuildOptions { debug: args.debug })?;

    let period = tick_period(args.period_ms, &config);
    let (cmd_tx, cmd_rx) = mpsc::channel(4);
    let (event_tx, mut event_rx) = broadcast::channel(256);
    let led = config.led;
    let show_led = settings.show_led;

    let summary = {
        let poll = run_poll_loop(
            doc.controller_mut(),
            PollLoop::new(period),
            cmd_rx,
            event_tx,
            args.ticks,
        );
        tokio::pin!(poll);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut interrupted = false;

        loop {
            tokio::select! {
                summary = &mut poll => break summary,

                event = event_rx.recv() => match event {
                    Ok(event) if show_led => report_event(&led, &event),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => warn!("Dropped {} events", n),
                    Err(broadcast::error::RecvError::Closed) => {}
                },

                _ = &mut ctrl_c, if !interrupted => {
                    interrupted = true;
                    info!("Interrupted; stopping simulation");
                    cmd_tx.send(PollCommand::Stop).await?;
                }
            }
        }
    };

    // Events published in the final iteration
    while let Ok(event) = event_rx.try_recv() {
        if show_led {
            report_event(&led, &event);
        }
    }

    match summary.exit {
        PollExit::TickLimit => {
            info!("Tick limit reached after {} ticks", summary.ticks);
            let _ = doc.stop();
        }
        PollExit::Idle | PollExit::Shutdown => {
            debug!("Simulation ended after {} ticks", summary.ticks);
        }
    }
    if let Some(memory) = doc.controller().memory_stats() {
        eprintln!("{}", memory_line(&memory));
    }
    Ok(())
}

/// Tick period: the command line wins over settings
fn tick_period(period_ms: Option<u64>, config: &ControllerConfig) -> Duration {
    period_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.poll_period())
}

fn memory_line(memory: &MemoryStats) -> String {
    format!(
        "Memory: {} bytes free, {} objects, {} strings, {} other",
        memory.free, memory.objects, memory.strings, memory.other
    )
}

fn report_event(led: &LedIndicator, event: &SimulationEvent) {
    match event {
        SimulationEvent::GpioChanged(sample) => {
            for edge in sample.edges() {
                let direction = if edge.is_rising() { "rising" } else { "falling" };
                debug!("GPIO {} {}", edge.pin, direction);
            }
            if let Some(on) = led.update(sample) {
                eprintln!("[LED {}]", if on { "on" } else { "off" });
            }
        }
        SimulationEvent::StateChanged { from, to } => {
            debug!("Simulation {} -> {}", from, to);
        }
    }
}

fn config(init: bool, settings: &Settings) -> Result<()> {
    if init {
        let path = Settings::settings_path().context("Could not determine settings path")?;
        Settings::default().save_to(&path)?;
        println!("Wrote {}", path.display());
        return Ok(());
    }
    if let Some(path) = Settings::settings_path() {
        eprintln!("Default settings file: {}", path.display());
    }
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}
