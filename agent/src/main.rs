//! Command line SIP answering machine.
//!
//! Registers an account at a SIP server, answers every incoming
//! call, records the caller to `<call-id>.wav` and echoes the
//! audio straight back:
//!
//! ```text
//! sipecho-agent sip.example.com alice 5060
//! ```
//!
//! Runs until interrupted; Ctrl-C hangs up the active calls and
//! removes the registration before exiting.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use sipecho::endpoint::Builder;
use sipecho::headers::Header;
use sipecho::transaction::TransactionLayer;
use sipecho::ua::{
    AccountConfig, CallInfo, RegState, Registration, UaConfig, UaHandler, UserAgent,
    allowed_methods,
};
use tokio::time;
use tracing_subscriber::EnvFilter;

/// SIP answering machine that records and echoes callers.
#[derive(Parser, Debug)]
#[command(name = "sipecho-agent", version)]
struct Cli {
    /// SIP server to register at, e.g. `sip.example.com` or `192.0.2.1:5060`
    server: String,

    /// User part of the account
    user: String,

    /// Local UDP port to listen on
    port: u16,

    /// Password used to answer digest challenges
    #[arg(short, long)]
    password: Option<String>,

    /// Registration expiry in seconds
    #[arg(long, default_value_t = 3600)]
    expires: u32,

    /// Directory recordings are written to
    #[arg(long, default_value = ".", value_name = "DIR")]
    record_dir: PathBuf,

    /// Value of the User-Agent header
    #[arg(long)]
    user_agent: Option<String>,

    /// Log filter when RUST_LOG is not set (trace, debug, info, ...)
    #[arg(short, long, default_value = "sipecho=info,sipecho_agent=info")]
    log_level: String,
}

/// Prints registration and call progress to stdout.
struct ConsoleHandler;

#[async_trait]
impl UaHandler for ConsoleHandler {
    async fn on_reg_state(&self, state: &RegState) {
        let event = if state.registered { "Register" } else { "Unregister" };
        println!("*** {}: code={}", event, state.code);
    }

    async fn on_call_state(&self, call: &CallInfo) {
        println!(
            "########## Call-ID:{}\tState:{}\t({} -> {})\tDuration:{}sec",
            call.call_id,
            call.state,
            call.remote_uri,
            call.local_uri,
            call.connect_duration.as_secs()
        );
    }

    async fn on_call_media(&self, call: &CallInfo, recording: &Path) {
        tracing::info!("Recording call {} to {}", call.call_id, recording.display());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let account = AccountConfig {
        username: args.user,
        domain: args.server,
        password: args.password,
        expiry: args.expires,
    };
    let mut config = UaConfig::new(account);
    config.recording_dir = args.record_dir;
    if let Some(user_agent) = args.user_agent {
        config.user_agent = user_agent;
    }

    let handler = Arc::new(ConsoleHandler);
    let ua = UserAgent::new(config.clone(), handler.clone());

    let endpoint = Builder::new()
        .with_name("sipecho-agent")
        .with_transaction_layer(TransactionLayer::default())
        .add_capability(Header::Allow(allowed_methods()))
        .add_service(ua.clone())
        .build();

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.port));
    endpoint
        .start_udp(addr)
        .await
        .with_context(|| format!("Cannot listen on UDP port {}", args.port))?;

    tokio::spawn(endpoint.clone().run());

    let registration = Registration::new(&endpoint, &config, handler)
        .await
        .with_context(|| format!("Cannot reach registrar {}", config.account.domain))?;
    if let Err(err) = registration.register().await {
        tracing::warn!("Registration failed: {}", err);
    }

    loop {
        tokio::select! {
            _ = time::sleep(Duration::from_secs(1)) => {}
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    ua.hangup_all(&endpoint).await;
    if let Err(err) = registration.unregister().await {
        tracing::warn!("Unregister failed: {}", err);
    }

    Ok(())
}
