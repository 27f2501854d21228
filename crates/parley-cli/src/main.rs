//! Parley CLI tools: channel URL signing, verification, signaling diagnostics.

#![forbid(unsafe_code)]

mod logging_media;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use parley_common::SignalingSettings;
use parley_signaling::{
    ice_servers_with_default, ChannelSigner, ClientId, LocalPeer, NegotiationEngine,
    SessionEvent, SignalingSession,
};
use parley_sigv4::{ChannelEndpoint, Credentials, SystemClock};

use crate::logging_media::LoggingMedia;

#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(about = "Parley signaling tools")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a signed signaling channel URL
    Sign {
        #[command(flatten)]
        channel: ChannelArgs,

        /// URL lifetime in seconds
        #[arg(
            long,
            default_value_t = parley_common::config::DEFAULT_URL_EXPIRES_SECS,
            value_parser = clap::value_parser!(u64).range(1..=parley_common::config::MAX_URL_EXPIRES_SECS)
        )]
        expires: u64,
    },

    /// Check a signed URL's signature against a secret key
    Verify {
        /// The signed URL
        url: String,

        #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
        secret_key: String,
    },

    /// Join a channel and log signaling traffic until interrupted
    Watch {
        #[command(flatten)]
        channel: ChannelArgs,

        /// Log full SDP bodies
        #[arg(long)]
        verbose: bool,
    },

    /// Show version information
    Version,
}

#[derive(clap::Args, Debug)]
struct ChannelArgs {
    /// WSS endpoint returned for the channel and role
    #[arg(long)]
    endpoint: String,

    /// Signaling channel ARN
    #[arg(long)]
    channel_arn: String,

    #[arg(long, value_enum, default_value_t = RoleArg::Viewer)]
    role: RoleArg,

    /// Viewer client id (random when omitted)
    #[arg(long)]
    client_id: Option<String>,

    #[arg(long, env = "AWS_REGION")]
    region: String,

    #[arg(long, env = "AWS_ACCESS_KEY_ID")]
    access_key_id: String,

    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    secret_key: String,

    #[arg(long, env = "AWS_SESSION_TOKEN", hide_env_values = true)]
    session_token: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum RoleArg {
    Master,
    Viewer,
}

impl ChannelArgs {
    fn local_peer(&self) -> LocalPeer {
        match self.role {
            RoleArg::Master => LocalPeer::master(),
            RoleArg::Viewer => LocalPeer::viewer(self.client_id.clone().map(ClientId::from)),
        }
    }

    fn signer(&self) -> ChannelSigner {
        let mut credentials = Credentials::new(&self.access_key_id, &self.secret_key);
        if let Some(token) = &self.session_token {
            credentials = credentials.with_session_token(token);
        }
        ChannelSigner::new(
            self.local_peer(),
            ChannelEndpoint::new(&self.endpoint, &self.channel_arn),
            credentials,
            &self.region,
            Arc::new(SystemClock),
        )
    }
}

fn main() -> Result<()> {
    parley_common::init_tracing();

    let args = Args::parse();

    match args.command {
        Command::Sign { channel, expires } => {
            let signed = channel
                .signer()
                .with_expires(expires)
                .sign()
                .context("failed to sign channel url")?;
            println!("{}", signed);
            eprintln!("expires at {}", signed.expires_at().to_rfc3339());
        }
        Command::Verify { url, secret_key } => {
            if parley_sigv4::verify(&url, &secret_key).context("cannot verify url")? {
                println!("signature valid");
            } else {
                bail!("signature does not match");
            }
        }
        Command::Watch { channel, verbose } => {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            rt.block_on(watch(channel, verbose))?;
        }
        Command::Version => {
            println!("parley {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

async fn watch(channel: ChannelArgs, verbose: bool) -> Result<()> {
    let settings = SignalingSettings::from_env()?;
    let signer = channel
        .signer()
        .with_expires(settings.url_expires_secs);
    let local = signer.local_peer().clone();

    let ice_servers = ice_servers_with_default(Vec::new(), &channel.region);
    println!("ice servers: {}", serde_json::to_string(&ice_servers)?);
    if let Some(id) = local.client_id() {
        println!("client id: {}", id);
    }

    let engine = Arc::new(NegotiationEngine::with_settings(
        local,
        Arc::new(LoggingMedia { verbose }),
        &settings,
    ));
    let (session, mut events) = SignalingSession::connect_signed(signer, engine, settings)
        .await
        .context("failed to connect to signaling channel")?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("interrupted, closing");
                session.close().await;
                return Ok(());
            }
            event = events.recv() => {
                let Some(event) = event else { return Ok(()); };
                match event {
                    SessionEvent::Failed { error } => bail!("session failed: {}", error),
                    SessionEvent::Closed => return Ok(()),
                    SessionEvent::RemoteSdp { client_id, kind, flushed, .. } => {
                        println!("remote {} from {} ({} buffered candidates applied)", kind, client_id, flushed);
                    }
                    SessionEvent::RemoteCandidate { client_id, outcome, .. } => {
                        println!("candidate from {}: {:?}", client_id, outcome);
                    }
                    SessionEvent::NegotiationFailed { client_id, error } => {
                        println!("negotiation with {} failed: {}", client_id, error);
                    }
                    other => println!("{:?}", other),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_sign() {
        let args = Args::try_parse_from([
            "parley",
            "sign",
            "--endpoint",
            "wss://v-1234.kinesisvideo.us-west-2.amazonaws.com",
            "--channel-arn",
            "arn:aws:kinesisvideo:us-west-2:123456789012:channel/demo/1",
            "--role",
            "master",
            "--region",
            "us-west-2",
            "--access-key-id",
            "AKID",
            "--secret-key",
            "secret",
        ])
        .unwrap();

        match args.command {
            Command::Sign { channel, expires } => {
                assert_eq!(expires, 299);
                assert_eq!(channel.role, RoleArg::Master);
                assert_eq!(channel.local_peer(), LocalPeer::master());
                let signed = channel.signer().sign().unwrap();
                assert_eq!(signed.query_param("X-Amz-ClientId"), None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_sign_rejects_out_of_range_expiry() {
        for expires in ["0", "301", "10000000000000000"] {
            let result = Args::try_parse_from([
                "parley",
                "sign",
                "--endpoint",
                "wss://v-1234.kinesisvideo.us-west-2.amazonaws.com",
                "--channel-arn",
                "arn:aws:kinesisvideo:us-west-2:123456789012:channel/demo/1",
                "--region",
                "us-west-2",
                "--access-key-id",
                "AKID",
                "--secret-key",
                "secret",
                "--expires",
                expires,
            ]);
            assert!(result.is_err(), "expires {}", expires);
        }
    }

    #[test]
    fn test_viewer_keeps_given_client_id() {
        let args = Args::try_parse_from([
            "parley",
            "watch",
            "--endpoint",
            "wss://v-1234.kinesisvideo.us-west-2.amazonaws.com",
            "--channel-arn",
            "arn:aws:kinesisvideo:us-west-2:123456789012:channel/demo/1",
            "--client-id",
            "viewer-7",
            "--region",
            "us-west-2",
            "--access-key-id",
            "AKID",
            "--secret-key",
            "secret",
        ])
        .unwrap();

        let Command::Watch { channel, .. } = args.command else {
            panic!("expected watch");
        };
        let signed = channel.signer().sign().unwrap();
        assert_eq!(signed.query_param("X-Amz-ClientId"), Some("viewer-7"));
    }
}
