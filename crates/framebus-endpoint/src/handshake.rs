use std::fmt;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

use framebus_frame::{FrameError, FrameReader, FrameWriter, GREETING};
use serde::{Deserialize, Serialize};

use crate::error::{EndpointError, Result};

const MAX_PROTOCOL_LEN: usize = 32;
const MAX_VERSION_LEN: usize = 16;

/// Protocol name carried in every greeting.
pub const PROTOCOL_NAME: &str = "framebus";
/// Local protocol version.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Socket pattern announced in a greeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Pattern {
    /// Request side of a request/reply pair.
    Req,
    /// Reply side of a request/reply pair.
    Rep,
    /// Publishing side of a publish/subscribe pair.
    Pub,
    /// Subscribing side of a publish/subscribe pair.
    Sub,
}

impl Pattern {
    /// The only pattern this one may talk to.
    pub fn counterpart(self) -> Pattern {
        match self {
            Pattern::Req => Pattern::Rep,
            Pattern::Rep => Pattern::Req,
            Pattern::Pub => Pattern::Sub,
            Pattern::Sub => Pattern::Pub,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Pattern::Req => "REQ",
            Pattern::Rep => "REP",
            Pattern::Pub => "PUB",
            Pattern::Sub => "SUB",
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Greeting exchanged as the first frame in each direction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Greeting {
    pub protocol: String,
    pub version: String,
    pub pattern: Pattern,
}

impl Greeting {
    fn local(pattern: Pattern, config: &HandshakeConfig) -> Self {
        Self {
            protocol: config.protocol_name.clone(),
            version: config.protocol_version.clone(),
            pattern,
        }
    }
}

/// Configuration for the greeting exchange.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Upper bound for the whole exchange.
    pub timeout: Duration,
    /// Expected protocol name.
    pub protocol_name: String,
    /// Local protocol version (`<major>.<minor>`).
    pub protocol_version: String,
    /// Maximum greeting payload size in bytes.
    pub max_handshake_payload: usize,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            protocol_name: PROTOCOL_NAME.to_string(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            max_handshake_payload: 16 * 1024,
        }
    }
}

/// Connecting side: send our greeting, then validate the peer's.
pub fn handshake_connect<R: Read, W: Write>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    local: Pattern,
    config: &HandshakeConfig,
) -> Result<Greeting> {
    validate_config(config)?;
    send_greeting(writer, &Greeting::local(local, config))?;

    let deadline = Instant::now() + config.timeout;
    let payload = recv_greeting_payload(reader, deadline, config)?;
    let remote = parse_greeting(&payload)?;
    check_remote(&remote, local, config)?;
    Ok(remote)
}

/// Accepting side: validate the peer's greeting, then answer with ours.
///
/// Servers accept through `nonblocking::handshake_accept`; this blocking
/// form backs the in-crate socket tests.
#[cfg(test)]
pub(crate) fn handshake_accept<R: Read, W: Write>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    local: Pattern,
    config: &HandshakeConfig,
) -> Result<Greeting> {
    validate_config(config)?;

    let deadline = Instant::now() + config.timeout;
    let payload = recv_greeting_payload(reader, deadline, config)?;
    let remote = parse_greeting(&payload)?;
    check_remote(&remote, local, config)?;

    send_greeting(writer, &Greeting::local(local, config))?;
    Ok(remote)
}

fn send_greeting<W: Write>(writer: &mut FrameWriter<W>, greeting: &Greeting) -> Result<()> {
    let payload = serde_json::to_vec(greeting)?;
    writer.send(GREETING, &payload)?;
    Ok(())
}

fn recv_greeting_payload<R: Read>(
    reader: &mut FrameReader<R>,
    deadline: Instant,
    config: &HandshakeConfig,
) -> Result<Vec<u8>> {
    loop {
        if Instant::now() >= deadline {
            return Err(EndpointError::Timeout(config.timeout));
        }

        match reader.read_frame() {
            Ok(frame) => {
                check_greeting_frame(frame.kind, frame.payload.len(), config)?;
                return Ok(frame.payload.to_vec());
            }
            Err(FrameError::Timeout) => continue,
            Err(FrameError::ConnectionClosed) => return Err(EndpointError::Disconnected),
            Err(err) => return Err(EndpointError::Frame(err)),
        }
    }
}

fn check_greeting_frame(kind: u16, size: usize, config: &HandshakeConfig) -> Result<()> {
    if kind != GREETING {
        return Err(EndpointError::HandshakeFailed(format!(
            "expected GREETING frame {GREETING}, got kind {kind}"
        )));
    }
    if size > config.max_handshake_payload {
        return Err(EndpointError::HandshakeFailed(format!(
            "greeting payload too large: {} (max {})",
            size, config.max_handshake_payload
        )));
    }
    Ok(())
}

fn parse_greeting(payload: &[u8]) -> Result<Greeting> {
    serde_json::from_slice(payload)
        .map_err(|err| EndpointError::HandshakeFailed(format!("malformed greeting: {err}")))
}

fn check_remote(remote: &Greeting, local: Pattern, config: &HandshakeConfig) -> Result<()> {
    check_protocol_name(&remote.protocol)?;
    if remote.protocol != config.protocol_name {
        return Err(rejected(format!(
            "peer speaks '{}', not '{}'",
            remote.protocol, config.protocol_name
        )));
    }

    let ours = Version::parse(&config.protocol_version)?;
    let theirs = Version::parse(&remote.version)?;
    if !ours.compatible_with(theirs) {
        return Err(rejected(format!(
            "peer version {theirs} is incompatible with {ours}"
        )));
    }

    let expected = local.counterpart();
    if remote.pattern != expected {
        return Err(rejected(format!(
            "{local} socket needs a {expected} peer, got {}",
            remote.pattern
        )));
    }
    Ok(())
}

fn validate_config(config: &HandshakeConfig) -> Result<()> {
    check_protocol_name(&config.protocol_name)?;
    Version::parse(&config.protocol_version).map(|_| ())
}

fn check_protocol_name(protocol: &str) -> Result<()> {
    if (1..=MAX_PROTOCOL_LEN).contains(&protocol.len()) {
        Ok(())
    } else {
        Err(rejected(format!(
            "protocol name of {} bytes",
            protocol.len()
        )))
    }
}

fn rejected(reason: String) -> EndpointError {
    EndpointError::HandshakeFailed(reason)
}

/// `<major>.<minor>`; peers agree when the majors match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Version {
    major: u16,
    minor: u16,
}

impl Version {
    fn parse(text: &str) -> Result<Self> {
        let malformed = || rejected(format!("malformed version '{text}'"));
        if text.len() > MAX_VERSION_LEN {
            return Err(malformed());
        }
        let (major, minor) = text.split_once('.').ok_or_else(malformed)?;
        Ok(Self {
            major: major.parse().map_err(|_| malformed())?,
            minor: minor.parse().map_err(|_| malformed())?,
        })
    }

    fn compatible_with(self, other: Version) -> bool {
        self.major == other.major
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Greeting exchange over a tokio `Framed` stream.
#[cfg(feature = "async")]
pub mod nonblocking {
    use framebus_frame::{Frame, FrameCodec, FrameError};
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::{AsyncRead, AsyncWrite};
    use tokio_util::codec::Framed;

    use super::*;

    /// Connecting side over a framed async stream.
    pub async fn handshake_connect<T>(
        framed: &mut Framed<T, FrameCodec>,
        local: Pattern,
        config: &HandshakeConfig,
    ) -> Result<Greeting>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        validate_config(config)?;
        framed.send(greeting_frame(local, config)?).await?;
        read_greeting(framed, local, config).await
    }

    /// Accepting side over a framed async stream.
    pub async fn handshake_accept<T>(
        framed: &mut Framed<T, FrameCodec>,
        local: Pattern,
        config: &HandshakeConfig,
    ) -> Result<Greeting>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let remote = read_greeting(framed, local, config).await?;
        framed.send(greeting_frame(local, config)?).await?;
        Ok(remote)
    }

    /// Serialized greeting frame announcing `pattern`.
    pub fn greeting_frame(pattern: Pattern, config: &HandshakeConfig) -> Result<Frame> {
        let payload = serde_json::to_vec(&Greeting::local(pattern, config))?;
        Ok(Frame::greeting(payload))
    }

    /// Read and validate the peer's greeting without answering it.
    pub async fn read_greeting<T>(
        framed: &mut Framed<T, FrameCodec>,
        local: Pattern,
        config: &HandshakeConfig,
    ) -> Result<Greeting>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        validate_config(config)?;

        // Greetings arrive before the peer is known; hold them to the tighter budget.
        let runtime_limit = framed.codec().max_payload_size();
        framed
            .codec_mut()
            .set_max_payload_size(config.max_handshake_payload);
        let received = tokio::time::timeout(config.timeout, framed.next()).await;
        framed.codec_mut().set_max_payload_size(runtime_limit);

        let remote = match received {
            Err(_) => return Err(EndpointError::Timeout(config.timeout)),
            Ok(Some(Ok(frame))) => {
                check_greeting_frame(frame.kind, frame.payload.len(), config)?;
                parse_greeting(&frame.payload)?
            }
            Ok(Some(Err(FrameError::PayloadTooLarge { size, max }))) => {
                return Err(EndpointError::HandshakeFailed(format!(
                    "greeting payload too large: {size} (max {max})"
                )))
            }
            Ok(Some(Err(FrameError::ConnectionClosed))) | Ok(None) => {
                return Err(EndpointError::Disconnected)
            }
            Ok(Some(Err(err))) => return Err(EndpointError::Frame(err)),
        };
        check_remote(&remote, local, config)?;
        Ok(remote)
    }
}
