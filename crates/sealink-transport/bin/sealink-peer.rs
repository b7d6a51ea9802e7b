//! Standalone sealink peer.
//!
//! Reads configuration from environment variables and runs as client or server.
//!
//! - `PEER_ROLE`: `server` (default) or `client`
//! - `PEER_ADDR`: listen address (server) or `host:port` (client)
//! - `SECURITY_MODE`: `negotiated` (default), `preshared` or `plain`
//! - `PEER_CONFIG`: optional JSON file with a full `ServerConfig`/`ChannelConfig`
//! - `PEER_MESSAGE`: client message (default `"hello"`)

use std::env;

use sealink_transport::{
    Channel, ChannelConfig, ChannelEvent, Error, Result, SecureServer, SecurityMode, ServerConfig,
};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let role = env::var("PEER_ROLE").unwrap_or_else(|_| "server".to_string());
    let security = match env::var("SECURITY_MODE") {
        Ok(mode) => Some(mode.parse::<SecurityMode>()?),
        Err(_) => None,
    };
    let config_json = match env::var("PEER_CONFIG") {
        Ok(path) => Some(std::fs::read_to_string(path)?),
        Err(_) => None,
    };

    match role.as_str() {
        "server" => run_server(config_json, security).await?,
        "client" => run_client(config_json, security).await?,
        other => return Err(format!("PEER_ROLE must be 'server' or 'client', got '{}'", other).into()),
    }
    Ok(())
}

async fn run_server(config_json: Option<String>, security: Option<SecurityMode>) -> Result<()> {
    let mut config = match config_json {
        Some(json) => ServerConfig::from_json(&json)?,
        None => ServerConfig::default(),
    };
    if let Ok(addr) = env::var("PEER_ADDR") {
        config.bind_address = addr;
    }
    if let Some(security) = security {
        config.security = security;
    }

    let server = SecureServer::bind(config).await?;
    eprintln!("sealink peer listening on {}", server.local_addr()?);

    loop {
        let session = match server.accept().await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "session setup failed");
                continue;
            }
        };
        tokio::spawn(async move {
            let peer = session.peer();
            // Reply with the request reversed.
            let served = session
                .serve(|request| request.iter().rev().copied().collect())
                .await;
            if let Err(e) = served {
                tracing::warn!(%peer, error = %e, "session ended with error");
            }
        });
    }
}

async fn run_client(config_json: Option<String>, security: Option<SecurityMode>) -> Result<()> {
    let mut config = match config_json {
        Some(json) => ChannelConfig::from_json(&json)?,
        None => ChannelConfig::default(),
    };
    if let Ok(addr) = env::var("PEER_ADDR") {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| Error::Config(format!("PEER_ADDR '{}' is not host:port", addr)))?;
        config.host = host.to_string();
        config.port = port
            .parse()
            .map_err(|_| Error::Config(format!("invalid port '{}'", port)))?;
    }
    if let Some(security) = security {
        config.security = security;
    }
    let message = env::var("PEER_MESSAGE").unwrap_or_else(|_| "hello".to_string());

    let mut channel = Channel::new(config);
    channel.connect().await?;
    while let Some(event) = channel.next_event().await {
        eprintln!("{}", event);
    }

    channel.send(message.as_bytes())?;
    while let Some(event) = channel.next_event().await {
        eprintln!("{}", event);
        if matches!(event, ChannelEvent::Disconnected(_)) {
            break;
        }
    }

    channel.terminate().await;
    Ok(())
}
