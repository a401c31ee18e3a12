use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::timeout;
use tracing::debug;

use crate::status::ServerStatus;

const SIMPLE_HEADER: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];
const SPLIT_HEADER: [u8; 4] = [0xFE, 0xFF, 0xFF, 0xFF];
const A2S_INFO: u8 = 0x54;
const S2C_CHALLENGE: u8 = 0x41;
const S2A_INFO_SOURCE: u8 = 0x49;
const S2A_INFO_GOLDSRC: u8 = 0x6D;
const INFO_PAYLOAD: &[u8] = b"Source Engine Query\0";
const MAX_CHALLENGE_ROUNDS: usize = 3;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("timeout")]
    Timeout,
    #[error("io error: {0}")]
    Io(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait ServerQuery: Send + Sync {
    async fn query(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<ServerStatus, QueryError>;
}

/// Decoded A2S_INFO reply, covering both the Source and the legacy GoldSrc layouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoResponse {
    pub protocol: u8,
    pub name: String,
    pub map: String,
    pub folder: String,
    pub game: String,
    pub players: u8,
    pub max_players: u8,
    pub bots: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Reply {
    Challenge([u8; 4]),
    Info(InfoResponse),
}

#[derive(Debug, Default, Clone)]
pub struct A2sClient;

impl A2sClient {
    pub fn new() -> Self {
        Self
    }

    pub async fn info(
        &self,
        host: &str,
        port: u16,
        limit: Duration,
    ) -> Result<InfoResponse, QueryError> {
        timeout(limit, Self::exchange(host, port))
            .await
            .map_err(|_| QueryError::Timeout)?
    }

    async fn exchange(host: &str, port: u16) -> Result<InfoResponse, QueryError> {
        let target = lookup_host((host, port))
            .await
            .map_err(|e| QueryError::Io(format!("failed to resolve {host}: {e}")))?
            .next()
            .ok_or_else(|| QueryError::Io(format!("no address for {host}")))?;

        let bind: SocketAddr = match target.ip() {
            IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| QueryError::Io(format!("failed to bind udp socket: {e}")))?;
        socket
            .connect(target)
            .await
            .map_err(|e| QueryError::Io(format!("failed to connect to {target}: {e}")))?;

        let mut request = build_info_request(None);
        let mut buf = vec![0_u8; 4096];

        for _ in 0..MAX_CHALLENGE_ROUNDS {
            socket
                .send(&request)
                .await
                .map_err(|e| QueryError::Io(format!("send failed: {e}")))?;
            let n = socket
                .recv(&mut buf)
                .await
                .map_err(|e| QueryError::Io(format!("recv failed: {e}")))?;

            match parse_reply(&buf[..n])? {
                Reply::Info(info) => return Ok(info),
                Reply::Challenge(challenge) => {
                    debug!(%target, "a2s challenge received, resending");
                    request = build_info_request(Some(challenge));
                }
            }
        }

        Err(QueryError::Malformed("server kept answering with challenges".to_string()))
    }
}

#[async_trait]
impl ServerQuery for A2sClient {
    async fn query(
        &self,
        host: &str,
        port: u16,
        limit: Duration,
    ) -> Result<ServerStatus, QueryError> {
        let info = self.info(host, port, limit).await?;
        Ok(ServerStatus {
            online: info.players.into(),
            max: info.max_players.into(),
            name: info.name.trim().to_string(),
            map: info.map.trim().to_string(),
        })
    }
}

fn build_info_request(challenge: Option<[u8; 4]>) -> Vec<u8> {
    let mut packet = Vec::with_capacity(29);
    packet.extend_from_slice(&SIMPLE_HEADER);
    packet.push(A2S_INFO);
    packet.extend_from_slice(INFO_PAYLOAD);
    if let Some(challenge) = challenge {
        packet.extend_from_slice(&challenge);
    }
    packet
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn u8(&mut self) -> Result<u8, QueryError> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or_else(|| QueryError::Malformed(format!("truncated at byte {}", self.pos)))?;
        self.pos += 1;
        Ok(byte)
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], QueryError> {
        let end = self.pos + N;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or_else(|| QueryError::Malformed(format!("truncated at byte {}", self.pos)))?;
        self.pos = end;
        let mut out = [0_u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn cstr(&mut self) -> Result<String, QueryError> {
        let rest = &self.data[self.pos.min(self.data.len())..];
        let len = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| QueryError::Malformed("unterminated string".to_string()))?;
        let text = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.pos += len + 1;
        Ok(text)
    }
}

fn parse_reply(packet: &[u8]) -> Result<Reply, QueryError> {
    let mut r = Reader::new(packet);
    let header = r.take::<4>()?;
    if header == SPLIT_HEADER {
        return Err(QueryError::Malformed("split info responses are not supported".to_string()));
    }
    if header != SIMPLE_HEADER {
        return Err(QueryError::Malformed(format!("unexpected header {header:02X?}")));
    }

    match r.u8()? {
        S2C_CHALLENGE => Ok(Reply::Challenge(r.take::<4>()?)),
        S2A_INFO_SOURCE => {
            let protocol = r.u8()?;
            let name = r.cstr()?;
            let map = r.cstr()?;
            let folder = r.cstr()?;
            let game = r.cstr()?;
            let _app_id = r.take::<2>()?;
            let players = r.u8()?;
            let max_players = r.u8()?;
            let bots = r.u8()?;
            Ok(Reply::Info(InfoResponse {
                protocol,
                name,
                map,
                folder,
                game,
                players,
                max_players,
                bots,
            }))
        }
        S2A_INFO_GOLDSRC => {
            let _address = r.cstr()?;
            let name = r.cstr()?;
            let map = r.cstr()?;
            let folder = r.cstr()?;
            let game = r.cstr()?;
            let players = r.u8()?;
            let max_players = r.u8()?;
            let protocol = r.u8()?;
            Ok(Reply::Info(InfoResponse {
                protocol,
                name,
                map,
                folder,
                game,
                players,
                max_players,
                bots: 0,
            }))
        }
        other => Err(QueryError::Malformed(format!("unexpected response type 0x{other:02X}"))),
    }
}
