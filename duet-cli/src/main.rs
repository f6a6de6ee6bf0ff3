use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::{Input, Select};
use duet_client::media::{Sample, SyntheticMediaSource};
use duet_client::signaling::LocalRelay;
use duet_client::transport::{RtcLinkFactory, TransportConfig};
use duet_client::{CallSession, CallState, CallStatus, SessionConfig, SessionDeps};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "duet")]
#[command(about = "Two-party WebRTC calls from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join a room on a WebSocket relay with synthetic media.
    Join {
        /// Relay endpoint; overrides the config file.
        #[arg(long)]
        url: Option<String>,

        /// Room to join; prompted for when omitted.
        #[arg(short, long)]
        room: Option<String>,

        /// JSON session config (relay URL, ICE servers, media).
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        audio_only: bool,
    },

    /// Call yourself: two sessions over an in-process relay.
    Loopback {
        #[arg(short, long, default_value = "loopback")]
        room: String,

        /// How long to wait for the connection.
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,

        /// Share the screen once connected.
        #[arg(long)]
        share: bool,
    },
}

/// One 20 ms Opus frame of silence.
const OPUS_SILENCE: [u8; 3] = [0xf8, 0xff, 0xfe];

const ACTIONS: [&str; 5] = [
    "Toggle microphone",
    "Toggle camera",
    "Toggle screen share",
    "Show status",
    "Leave",
];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Commands::Join {
            url,
            room,
            config,
            audio_only,
        } => {
            let mut config = match config {
                Some(path) => SessionConfig::from_file(&path)
                    .with_context(|| format!("Failed to load {}", path.display()))?,
                None => SessionConfig::default(),
            };
            if let Some(url) = url {
                config.signaling_url = url;
            }
            if audio_only {
                config.media.video = false;
            }
            let room = match room {
                Some(room) => room,
                None => prompt_room().await?,
            };
            run_join(room, config).await
        }

        Commands::Loopback {
            room,
            timeout_secs,
            share,
        } => run_loopback(room, Duration::from_secs(timeout_secs), share).await,
    }
}

async fn prompt_room() -> Result<String> {
    tokio::task::spawn_blocking(|| {
        Input::<String>::new()
            .with_prompt("Room")
            .validate_with(|input: &String| -> Result<(), &'static str> {
                if input.trim().is_empty() {
                    Err("room must not be blank")
                } else {
                    Ok(())
                }
            })
            .interact_text()
    })
    .await?
    .context("Failed to read room")
}

async fn run_join(room: String, config: SessionConfig) -> Result<()> {
    println!(
        "{} {} via {}",
        "📞 Joining".green().bold(),
        room.as_str().bold(),
        config.signaling_url
    );

    let deps = SessionDeps::native(&config, Arc::new(SyntheticMediaSource::new()));
    let session = CallSession::join(&room, &config, deps)
        .await
        .context("Failed to join")?;

    let pump = pump_microphone(&session);
    let mut status = session.status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            println!("{}", describe(&current));
        }
    });

    loop {
        let choice = tokio::task::spawn_blocking(|| {
            Select::new()
                .with_prompt("Call")
                .items(&ACTIONS)
                .default(0)
                .interact()
        })
        .await?
        .context("Failed to read action")?;

        if session.status().borrow().state.is_ended() {
            println!("{}", "The call is over.".yellow());
            break;
        }

        match choice {
            0 => {
                let muted = session.toggle_mute().await;
                println!("🎙  {}", if muted { "muted" } else { "live" });
            }
            1 => {
                let off = session.toggle_video().await;
                println!("📷 {}", if off { "off" } else { "on" });
            }
            2 => {
                let sharing = session.toggle_share().await;
                println!("🖥  {}", if sharing { "sharing" } else { "not sharing" });
            }
            3 => {
                let current = session.status().borrow().clone();
                println!(
                    "{} (negotiation: {})",
                    describe(&current),
                    session.negotiation_state().await
                );
            }
            _ => break,
        }
    }

    session.leave().await?;
    pump.abort();
    println!("{}", "👋 Left the room".green());
    Ok(())
}

async fn run_loopback(room: String, timeout: Duration, share: bool) -> Result<()> {
    println!("{}", "🔁 Starting loopback call...".green().bold());

    let relay = LocalRelay::new();
    let config = SessionConfig::default();
    let deps = || SessionDeps {
        signaling: Arc::new(relay.clone()),
        links: Arc::new(RtcLinkFactory::new(TransportConfig::host_only())),
        media: Arc::new(SyntheticMediaSource::new()),
    };

    let caller = CallSession::join(&room, &config, deps()).await?;
    let callee = CallSession::join(&room, &config, deps()).await?;
    let pumps = [pump_microphone(&caller), pump_microphone(&callee)];

    let connected = tokio::time::timeout(timeout, async {
        let mut a = caller.status();
        let mut b = callee.status();
        let a_done = a.wait_for(|s| s.state == CallState::Connected || s.state.is_ended());
        let b_done = b.wait_for(|s| s.state == CallState::Connected || s.state.is_ended());
        let (a, b) = tokio::join!(a_done, b_done);
        matches!(
            (a.map(|s| s.state.clone()), b.map(|s| s.state.clone())),
            (Ok(CallState::Connected), Ok(CallState::Connected))
        )
    })
    .await
    .unwrap_or(false);

    println!("   caller: {}", describe(&caller.status().borrow()));
    println!("   callee: {}", describe(&callee.status().borrow()));

    if connected && share {
        let sharing = caller.toggle_share().await;
        println!(
            "   caller sharing: {} (negotiation: {})",
            sharing,
            caller.negotiation_state().await
        );
    }

    caller.leave().await?;
    callee.leave().await?;
    pumps.iter().for_each(|p| p.abort());

    if connected {
        println!("{}", "✨ Loopback call connected".green().bold());
        Ok(())
    } else {
        anyhow::bail!("Loopback call did not connect within {:?}", timeout)
    }
}

/// Feed the local microphone track at its frame rate until the call ends.
/// Muted frames are swallowed by the track.
fn pump_microphone(session: &CallSession) -> tokio::task::JoinHandle<()> {
    let preview = session.local_preview();
    let status = session.status();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(20));
        loop {
            ticker.tick().await;
            if status.borrow().state.is_ended() {
                break;
            }
            let audio = preview.borrow().as_ref().and_then(|s| s.audio().cloned());
            let Some(audio) = audio else {
                continue;
            };
            let sample = Sample {
                data: OPUS_SILENCE.to_vec().into(),
                duration: Duration::from_millis(20),
                ..Default::default()
            };
            if audio.write_sample(&sample).await.is_err() {
                break;
            }
        }
    })
}

fn describe(status: &CallStatus) -> String {
    let state = match &status.state {
        CallState::WaitingForPeer => "waiting for peer".yellow(),
        CallState::Negotiating => "negotiating".cyan(),
        CallState::Connected => "connected".green(),
        CallState::Ended(None) => "ended".normal(),
        CallState::Ended(Some(e)) => format!("ended: {}", e).as_str().red(),
    };
    let mut flags = Vec::new();
    if status.muted {
        flags.push("muted");
    }
    if status.video_off {
        flags.push("camera off");
    }
    if status.sharing {
        flags.push("sharing");
    }
    if flags.is_empty() {
        state.to_string()
    } else {
        format!("{} [{}]", state, flags.join(", "))
    }
}
