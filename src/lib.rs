mod codec;
mod error;

pub use codec::FeedLineCodec;
pub use error::{ConnectError, FeedError, ReadError};

use async_stream::try_stream;
use futures::sink::SinkExt;
use futures::{pin_mut, Stream, StreamExt};
use log::{debug, info, trace};
use std::borrow::Cow;
use std::future::Future;
use std::io::{self, Write};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time;
use tokio_util::codec::Framed;

/// Round-robin address for the APRS-IS core servers.
pub const DEFAULT_HOST: &str = "rotate.aprs.net";
/// Full, unfiltered feed port.
pub const DEFAULT_PORT: u16 = 10152;

type Transport = Framed<TcpStream, FeedLineCodec>;

/// One line of the server's feed, without its line terminator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FeedLine {
    pub raw: Vec<u8>,
}

impl FeedLine {
    pub fn new(raw: Vec<u8>) -> FeedLine {
        FeedLine { raw }
    }

    /// The line as text, with invalid UTF-8 replaced by U+FFFD and trailing
    /// whitespace trimmed.
    pub fn text(&self) -> Cow<'_, str> {
        match String::from_utf8_lossy(&self.raw) {
            Cow::Borrowed(text) => Cow::Borrowed(text.trim_end()),
            Cow::Owned(text) => Cow::Owned(text.trim_end().to_string()),
        }
    }

    /// Server status and comment lines start with `#`.
    pub fn is_server_comment(&self) -> bool {
        self.raw.first() == Some(&b'#')
    }
}

#[derive(Clone, Debug)]
pub struct FeedSettings {
    pub host: String,
    pub port: u16,
    pub callsign: String,
    pub passcode: String,
    pub client_name: String,
    pub client_version: String,
    pub filter: Option<String>,
    /// `None` lets the connect block for as long as the OS allows.
    pub connect_timeout: Option<Duration>,
}

impl FeedSettings {
    pub fn new(host: String, port: u16, callsign: String, passcode: String) -> FeedSettings {
        FeedSettings {
            host,
            port,
            callsign,
            passcode,
            client_name: option_env!("CARGO_PKG_NAME")
                .unwrap_or("unknown")
                .to_string(),
            client_version: option_env!("CARGO_PKG_VERSION")
                .unwrap_or("0.0.0")
                .to_string(),
            filter: None,
            connect_timeout: None,
        }
    }

    pub fn with_client(mut self, name: String, version: String) -> FeedSettings {
        self.client_name = name;
        self.client_version = version;
        self
    }

    pub fn with_filter(mut self, filter: String) -> FeedSettings {
        self.filter = if filter.is_empty() { None } else { Some(filter) };
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> FeedSettings {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The login line without its terminator.
    pub fn login_message(&self) -> String {
        format!(
            "user {} pass {} vers {} {}{}",
            self.callsign,
            self.passcode,
            self.client_name,
            self.client_version,
            match &self.filter {
                Some(filter) => format!(" filter {}", filter),
                None => "".to_string(),
            }
        )
    }
}

/// How a feed run finished when it did not fail.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamEnd {
    /// The server closed the connection.
    PeerClosed,
    /// The shutdown future completed first.
    Interrupted,
}

/// A logged-in connection to an APRS-IS server.
///
/// The socket is owned here and closed when the client is dropped, so every
/// way out of [`FeedClient::run`] releases it.
pub struct FeedClient {
    transport: Transport,
}

impl FeedClient {
    /// Connects and sends the login line. The server's answer is not waited
    /// for; whether the login was accepted only shows up later in the feed.
    pub async fn connect(settings: &FeedSettings) -> Result<Self, ConnectError> {
        let mut transport = Self::init_connect(settings).await?;
        Self::login(settings, &mut transport).await?;

        Ok(Self { transport })
    }

    pub fn lines(&mut self) -> impl Stream<Item = Result<FeedLine, ReadError>> + '_ {
        try_stream! {
            while let Some(line) = self.transport.next().await {
                let line = line?;
                if line.is_server_comment() {
                    let comment = line.text();
                    debug!("Received server comment: {}", comment);
                    if comment.starts_with("# logresp") {
                        if comment.contains("unverified") {
                            info!("User not verified on APRS-IS server");
                        } else if comment.contains(" verified") {
                            info!("User verified on APRS-IS server");
                        }
                    }
                } else {
                    trace!("{:?}", line.text());
                }
                yield line;
            }
        }
    }

    /// Writes every received line to `out` until the server hangs up or
    /// `shutdown` completes.
    pub async fn run<W, F>(mut self, out: &mut W, shutdown: F) -> Result<StreamEnd, ReadError>
    where
        W: Write,
        F: Future,
    {
        let lines = self.lines();
        pin_mut!(lines);
        pin_mut!(shutdown);

        loop {
            tokio::select! {
                line = lines.next() => match line {
                    Some(line) => writeln!(out, "{}", line?.text())?,
                    None => {
                        info!("APRS-IS server closed the connection");
                        return Ok(StreamEnd::PeerClosed);
                    }
                },
                _ = &mut shutdown => {
                    info!("Disconnecting from APRS-IS server");
                    writeln!(out, "\nDisconnected.")?;
                    return Ok(StreamEnd::Interrupted);
                }
            }
        }
    }

    async fn init_connect(settings: &FeedSettings) -> Result<Transport, ConnectError> {
        let address = settings.address();

        info!("Connecting to APRS-IS server {}", address);
        let stream = connect_within(settings.connect_timeout, TcpStream::connect(&address)).await?;

        Ok(Framed::new(stream, FeedLineCodec::new()))
    }

    async fn login(settings: &FeedSettings, transport: &mut Transport) -> Result<(), ConnectError> {
        let login_message = settings.login_message();

        info!("Logging on to APRS-IS server as {}", settings.callsign);
        trace!("Login message: {}", login_message);
        transport.send(login_message.as_bytes()).await?;

        Ok(())
    }
}

/// Awaits `connect`, giving up after `limit` when one is set.
async fn connect_within<T, F>(limit: Option<Duration>, connect: F) -> Result<T, ConnectError>
where
    F: Future<Output = io::Result<T>>,
{
    Ok(match limit {
        Some(limit) => time::timeout(limit, connect).await??,
        None => connect.await?,
    })
}

/// Connects, announces the connection on `out` and streams the feed to it.
pub async fn run<W, F>(
    settings: &FeedSettings,
    out: &mut W,
    shutdown: F,
) -> Result<StreamEnd, FeedError>
where
    W: Write,
    F: Future,
{
    let client = FeedClient::connect(settings).await?;

    writeln!(
        out,
        "Connected to {}:{} as {}, printing full feed:",
        settings.host, settings.port, settings.callsign
    )
    .map_err(ReadError::from)?;

    Ok(client.run(out, shutdown).await?)
}
