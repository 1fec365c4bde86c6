use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use dialoguer::{Confirm, Input};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use uplift::client::{CallClient, ClientConfig, RelayProfile, SampleDevices, SessionEvent};
use uplift::model::{Feedback, MAX_FEEDBACK_TEXT, SCALE_MAX, SCALE_MIN};
use uplift::server::{ServerConfig, UpliftServer};
use uplift::Role;

#[derive(Parser)]
#[command(name = "uplift")]
#[command(about = "Matching server and terminal client for peer support calls")]
struct Cli {
    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the matching queue and signaling relay.
    Serve {
        #[arg(long)]
        bind: Option<SocketAddr>,

        #[arg(long)]
        queue_ttl_secs: Option<u64>,

        #[arg(long)]
        reconnect_grace_secs: Option<u64>,
    },
    /// Queue up and take one call with generated audio.
    Join {
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        server: String,

        #[arg(long, value_enum)]
        role: RoleArg,

        #[arg(long)]
        name: String,

        #[arg(long)]
        video: bool,

        #[arg(long)]
        session_limit_secs: Option<u64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Seeker,
    Responder,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Seeker => Role::Seeker,
            RoleArg::Responder => Role::Responder,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log))
        .context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve {
            bind,
            queue_ttl_secs,
            reconnect_grace_secs,
        } => {
            let mut config = ServerConfig::from_env()?;
            if let Some(bind) = bind {
                config.bind = bind;
            }
            if let Some(ttl) = queue_ttl_secs {
                config.queue_ttl_secs = ttl;
            }
            if let Some(grace) = reconnect_grace_secs {
                config.reconnect_grace_secs = grace;
            }
            serve(config).await
        }
        Commands::Join {
            server,
            role,
            name,
            video,
            session_limit_secs,
        } => {
            let mut config = ClientConfig::from_env()?;
            config.server_url = server;
            config.video = video;
            if let Some(limit) = session_limit_secs {
                config.session_limit_secs = limit;
            }
            join(config, role.into(), name).await
        }
    }
}

async fn serve(config: ServerConfig) -> Result<()> {
    println!("{}", format!("Starting Uplift on {}", config.bind).green().bold());
    let server = UpliftServer::new(config);
    let token = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("{}", "Shutting down...".yellow());
            token.cancel();
        }
    });
    server.run().await
}

async fn join(config: ClientConfig, role: Role, name: String) -> Result<()> {
    let profile = RelayProfile {
        display_name: name.clone(),
        role,
        rating_hint: None,
    };
    let devices = Arc::new(SampleDevices::new(format!("uplift-{name}")));
    let client = CallClient::new(config, profile, devices);
    let link = client.connect().await?;

    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    println!("{}", format!("Waiting for a {} as {}...", role.opposite(), name).cyan());
    let Some(mut call) = client.find_call(&link, &token).await? else {
        println!("{}", "Left the queue.".yellow());
        link.close().await;
        return Ok(());
    };
    println!(
        "{}",
        format!("Matched with {}", call.partner().partner_display_name)
            .green()
            .bold()
    );

    let mut hung_up = false;
    loop {
        tokio::select! {
            _ = token.cancelled(), if !hung_up => {
                hung_up = true;
                call.hang_up().await?;
            }
            event = call.next_event() => {
                let Some(event) = event else { break };
                print_event(&event);
                match event {
                    SessionEvent::FeedbackRequired => {
                        let feedback = tokio::task::spawn_blocking(prompt_feedback).await??;
                        if let Err(e) = call.submit_feedback(feedback).await {
                            warn!("Feedback was not accepted: {}", e);
                        }
                    }
                    SessionEvent::Closed => break,
                    _ => {}
                }
            }
        }
    }

    let outcome = call.outcome().await?;
    println!(
        "Call {} ended ({}) after {}s",
        outcome.session_id,
        outcome.reason,
        outcome.duration.as_secs()
    );
    if let Some(error) = outcome.error {
        println!("{}", format!("Error: {error}").red());
    }
    link.close().await;
    Ok(())
}

fn print_event(event: &SessionEvent) {
    let line = match event {
        SessionEvent::Connected => "Connected".green(),
        SessionEvent::Running { limit } => {
            format!("Call running, {} minutes on the clock", limit.as_secs() / 60).green()
        }
        SessionEvent::Reconnecting => "Connection lost, reconnecting...".yellow(),
        SessionEvent::Recovered => "Connection restored".green(),
        SessionEvent::PeerReconnecting => "Partner is reconnecting...".yellow(),
        SessionEvent::PeerReconnected => "Partner is back".green(),
        SessionEvent::Ended { reason, duration } => {
            format!("Call ended: {} ({}s)", reason, duration.as_secs()).bold()
        }
        SessionEvent::FeedbackRequired => "Please rate the call".cyan(),
        SessionEvent::Closed => "Closed".dimmed(),
    };
    println!("{line}");
}

fn prompt_feedback() -> Result<Feedback> {
    let scale = |prompt: &str| -> Result<u8> {
        let value = Input::<u8>::new()
            .with_prompt(format!("{prompt} ({SCALE_MIN}-{SCALE_MAX})"))
            .validate_with(|v: &u8| {
                if (SCALE_MIN..=SCALE_MAX).contains(v) {
                    Ok(())
                } else {
                    Err("out of range")
                }
            })
            .interact_text()?;
        Ok(value)
    };

    let mood_before = scale("Mood before the call")?;
    let mood_after = scale("Mood after the call")?;
    let rating = scale("Rating")?;
    let text: String = Input::new()
        .with_prompt("Comments")
        .allow_empty(true)
        .validate_with(|t: &String| {
            if t.chars().count() <= MAX_FEEDBACK_TEXT {
                Ok(())
            } else {
                Err("too long")
            }
        })
        .interact_text()?;
    let misconduct_flag = Confirm::new()
        .with_prompt("Report misconduct?")
        .default(false)
        .interact()?;

    Ok(Feedback {
        mood_before,
        mood_after,
        rating,
        text: (!text.trim().is_empty()).then_some(text),
        misconduct_flag,
    })
}
