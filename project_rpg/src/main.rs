mod config;

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use agent::{AgentClient, AgentSystem, HttpAgentClient, ScriptedAgentClient};
use persistence::FileSystem;
use rpg::{build_world, ConnectSystem, Game, RpgContext, Runtime, ScenarioFile};
use session::{PlayerProxy, PlayerProxyManager, ProxyDrain};
use tokio::sync::mpsc;

use crate::config::{parse_cli_args, GameConfig};

/// Everything the round loop waits on, merged into one channel.
#[derive(Debug, PartialEq, Eq)]
enum TerminalInput {
    Line(String),
    /// Stdin reached its end.
    Closed,
    /// SIGINT, SIGTERM or Ctrl+C.
    Interrupted,
}

/// What one line asks the loop to do.
#[derive(Debug, PartialEq, Eq)]
enum Turn<'a> {
    Quit,
    /// Advance a round, submitting the command first if there is one.
    Advance(Option<&'a str>),
}

fn read_turn(line: &str) -> Turn<'_> {
    match line.trim() {
        "/quit" | "/exit" => Turn::Quit,
        "" => Turn::Advance(None),
        command => Turn::Advance(Some(command)),
    }
}

#[tokio::main]
async fn main() {
    observability::init_logging();

    let config = match parse_cli_args() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(2);
        }
    };
    tracing::info!(scenario = %config.game.scenario, offline = config.agent.offline, "RPG terminal starting...");

    if let Err(e) = run_game(config).await {
        tracing::error!(error = %e, "game aborted");
        std::process::exit(1);
    }
    tracing::info!("Game stopped.");
}

fn connect_system(config: &GameConfig, ctx: &mut RpgContext) -> ConnectSystem {
    if config.agent.offline {
        // Players stay unattached so their speech skips the agent check.
        for name in ctx.agents.names() {
            if ctx.entity_by_name(&name).is_some_and(|e| ctx.is_player(e)) {
                continue;
            }
            let client: Arc<dyn AgentClient> = Arc::new(ScriptedAgentClient::silent(name.clone()));
            if let Err(e) = ctx.agents.attach_client(&name, client) {
                tracing::warn!(agent = %name, error = %e, "offline client not attached");
            }
        }
        return ConnectSystem::new();
    }
    let client_config = config.to_client_config();
    if client_config.api_key.is_none() {
        tracing::warn!(env = %config.agent.api_key_env, "no API key in the environment");
    }
    ConnectSystem::with_factory(Box::new(move |name: &str, url: &str| {
        let client = HttpAgentClient::new(name, url, client_config.clone())?;
        Ok(Arc::new(client) as Arc<dyn AgentClient>)
    }))
}

fn build_game(config: &GameConfig) -> Result<(Game, PlayerProxy), Box<dyn std::error::Error>> {
    let scenario = ScenarioFile::load(Path::new(&config.game.scenario))?;
    let runtime = Runtime::new(FileSystem::with_runtime_dir(&config.game.runtime_dir), AgentSystem::new());
    let mut ctx = RpgContext::new(
        runtime,
        PlayerProxyManager::new(config.player.queue_capacity),
        config.to_options(&scenario.about_game),
    );
    build_world(&mut ctx, &scenario)?;

    let player = if config.player.name.is_empty() {
        scenario.players.first().map(|p| p.name.clone()).unwrap_or_default()
    } else {
        config.player.name.clone()
    };
    let proxy = ctx
        .players
        .proxy(&player)
        .cloned()
        .ok_or_else(|| format!("scenario has no player named {player:?}"))?;

    let connect = connect_system(config, &mut ctx);
    Ok((Game::new(ctx, config.to_pipeline_config(), connect), proxy))
}

fn print_drain(drain: ProxyDrain) {
    for msg in drain.stage.iter().chain(&drain.actor) {
        println!("[{}] {}", msg.class_name, msg.message);
    }
    for msg in &drain.tip {
        println!("(提示) {}", msg.message);
    }
}

/// Stdin is blocking, so lines are read on their own thread and handed over.
fn spawn_stdin_reader(tx: mpsc::UnboundedSender<TerminalInput>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(TerminalInput::Line(line)).is_err() {
                return;
            }
        }
        let _ = tx.send(TerminalInput::Closed);
    });
}

#[cfg(unix)]
async fn next_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    Ok(tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
    })
}

#[cfg(not(unix))]
async fn next_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl+C")
}

/// Turns the first termination signal into an input, so a round in progress
/// is always finished before the loop sees it.
fn spawn_signal_forwarder(tx: mpsc::UnboundedSender<TerminalInput>) {
    tokio::spawn(async move {
        match next_signal().await {
            Ok(name) => {
                tracing::info!(signal = name, "Shutdown signal received, finishing the round...");
                let _ = tx.send(TerminalInput::Interrupted);
            }
            Err(e) => tracing::warn!(error = %e, "cannot listen for termination signals"),
        }
    });
}

async fn run_game(config: GameConfig) -> Result<(), Box<dyn std::error::Error>> {
    let (mut game, proxy) = build_game(&config)?;
    game.start().await?;
    for text in proxy.take_kickoff() {
        println!("{text}");
    }
    println!("输入指令后回车推进一轮, 空行直接推进, /quit 退出。");

    let (tx, mut inputs) = mpsc::unbounded_channel();
    spawn_stdin_reader(tx.clone());
    spawn_signal_forwarder(tx);

    while !game.is_over() {
        print!("[第{}回合] {}> ", game.round() + 1, proxy.name());
        std::io::stdout().flush()?;

        let line = match inputs.recv().await {
            Some(TerminalInput::Line(line)) => line,
            Some(TerminalInput::Interrupted) | Some(TerminalInput::Closed) | None => break,
        };
        match read_turn(&line) {
            Turn::Quit => break,
            Turn::Advance(command) => {
                if let Some(command) = command {
                    game.submit_command(proxy.name(), command)?;
                }
            }
        }

        game.step().await?;
        print_drain(proxy.drain_all());
    }

    game.shutdown().await?;
    print_drain(proxy.drain_all());
    Ok(())
}
