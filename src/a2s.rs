// src/a2s.rs
//! Valve A2S queries over UDP.

use std::io::{BufRead, Cursor, ErrorKind, Read};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use byteorder::{LittleEndian, ReadBytesExt};
use log::debug;
use tokio::net::UdpSocket;

use crate::error::QueryError;
use crate::models::server::{PlayerInfo, ServerInfo, ServerStatus};

const SIMPLE_HEADER: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];
const SPLIT_HEADER: [u8; 4] = [0xFE, 0xFF, 0xFF, 0xFF];

const A2S_INFO: u8 = 0x54;
const A2S_PLAYER: u8 = 0x55;
const S2C_CHALLENGE: u8 = 0x41;
const S2A_INFO: u8 = 0x49;
const S2A_PLAYER: u8 = 0x44;

const INFO_PAYLOAD: &[u8] = b"Source Engine Query\0";
const MAX_PACKET: usize = 1400;

/// Source of live server snapshots and rosters.
#[async_trait]
pub trait QueryClient: Send + Sync {
    async fn server_info(&self, host: &str, port: u16) -> Result<ServerInfo, QueryError>;

    /// Players sorted by score, highest first.
    async fn players_info(&self, host: &str, port: u16) -> Result<Vec<PlayerInfo>, QueryError>;
}

pub struct A2sClient {
    timeout: Duration,
}

impl A2sClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Sends `request`, answering one challenge round if the server asks.
    async fn exchange(
        &self,
        addr: &str,
        request: Vec<u8>,
    ) -> Result<(Vec<u8>, Duration), QueryError> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|source| QueryError::Io { addr: addr.to_string(), source })?;
        socket
            .connect(addr)
            .await
            .map_err(|source| QueryError::Io { addr: addr.to_string(), source })?;

        let started = Instant::now();
        let mut reply = self.round_trip(&socket, addr, &request).await?;

        if reply.first() == Some(&S2C_CHALLENGE) {
            if reply.len() < 5 {
                return Err(malformed(addr, "short challenge"));
            }
            debug!("Challenge received from {}", addr);
            let mut retry = request;
            if retry[4] == A2S_INFO {
                retry.extend_from_slice(&reply[1..5]);
            } else {
                let len = retry.len();
                retry[len - 4..].copy_from_slice(&reply[1..5]);
            }
            reply = self.round_trip(&socket, addr, &retry).await?;
        }
        Ok((reply, started.elapsed()))
    }

    /// One datagram out, one back. Returns the payload after the header.
    async fn round_trip(
        &self,
        socket: &UdpSocket,
        addr: &str,
        packet: &[u8],
    ) -> Result<Vec<u8>, QueryError> {
        socket.send(packet).await.map_err(|e| io_error(addr, e))?;

        let mut buffer = [0u8; MAX_PACKET];
        let len = match tokio::time::timeout(self.timeout, socket.recv(&mut buffer)).await {
            Ok(Ok(len)) => len,
            Ok(Err(e)) => return Err(io_error(addr, e)),
            Err(_) => return Err(QueryError::Timeout { addr: addr.to_string() }),
        };

        let data = &buffer[..len];
        if data.len() < 5 {
            return Err(malformed(addr, "packet too short"));
        }
        if data[..4] == SPLIT_HEADER {
            return Err(malformed(addr, "split responses are not supported"));
        }
        if data[..4] != SIMPLE_HEADER {
            return Err(malformed(addr, "bad packet header"));
        }
        Ok(data[4..].to_vec())
    }
}

#[async_trait]
impl QueryClient for A2sClient {
    async fn server_info(&self, host: &str, port: u16) -> Result<ServerInfo, QueryError> {
        let addr = format!("{}:{}", host, port);
        let mut request = SIMPLE_HEADER.to_vec();
        request.push(A2S_INFO);
        request.extend_from_slice(INFO_PAYLOAD);

        let (reply, elapsed) = self.exchange(&addr, request).await?;
        let info = parse_info(&reply, elapsed.as_secs_f64() * 1000.0)
            .map_err(|reason| malformed(&addr, &reason))?;
        debug!("New server info query to {}", addr);
        Ok(info)
    }

    async fn players_info(&self, host: &str, port: u16) -> Result<Vec<PlayerInfo>, QueryError> {
        let addr = format!("{}:{}", host, port);
        let mut request = SIMPLE_HEADER.to_vec();
        request.push(A2S_PLAYER);
        request.extend_from_slice(&SIMPLE_HEADER);

        let (reply, _) = self.exchange(&addr, request).await?;
        let mut players = parse_players(&reply).map_err(|reason| malformed(&addr, &reason))?;
        players.sort_by(|a, b| b.score.cmp(&a.score));
        debug!("New players info query to {}", addr);
        Ok(players)
    }
}

fn io_error(addr: &str, source: std::io::Error) -> QueryError {
    if source.kind() == ErrorKind::ConnectionRefused {
        QueryError::ServerRestarting { addr: addr.to_string() }
    } else {
        QueryError::Io { addr: addr.to_string(), source }
    }
}

fn malformed(addr: &str, reason: &str) -> QueryError {
    QueryError::Malformed {
        addr: addr.to_string(),
        reason: reason.to_string(),
    }
}

fn read_cstring(cursor: &mut Cursor<&[u8]>) -> Result<String, String> {
    let mut raw = Vec::new();
    cursor
        .read_until(0, &mut raw)
        .map_err(|e| e.to_string())?;
    if raw.pop() != Some(0) {
        return Err("unterminated string".to_string());
    }
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

/// Decodes an S2A_INFO payload (type byte included).
pub fn parse_info(payload: &[u8], ping: f64) -> Result<ServerInfo, String> {
    let mut cursor = Cursor::new(payload);
    let kind = cursor.read_u8().map_err(|e| e.to_string())?;
    if kind != S2A_INFO {
        return Err(format!("unexpected info reply type 0x{:02X}", kind));
    }
    let _protocol = cursor.read_u8().map_err(|e| e.to_string())?;
    let name = read_cstring(&mut cursor)?;
    let map = read_cstring(&mut cursor)?;
    let _folder = read_cstring(&mut cursor)?;
    let _game = read_cstring(&mut cursor)?;
    let _app_id = cursor.read_u16::<LittleEndian>().map_err(|e| e.to_string())?;
    let players = cursor.read_u8().map_err(|e| e.to_string())?;
    let max_players = cursor.read_u8().map_err(|e| e.to_string())?;
    // bots, server type, environment, visibility
    let mut skipped = [0u8; 4];
    cursor.read_exact(&mut skipped).map_err(|e| e.to_string())?;
    let vac = cursor.read_u8().map_err(|e| e.to_string())?;

    Ok(ServerInfo {
        name: name.trim_matches('\u{feff}').to_string(),
        players: players.into(),
        max_players: max_players.into(),
        map,
        vac: vac == 1,
        ping,
        status: ServerStatus::Online,
    })
}

/// Decodes an S2A_PLAYER payload (type byte included), in wire order.
pub fn parse_players(payload: &[u8]) -> Result<Vec<PlayerInfo>, String> {
    let mut cursor = Cursor::new(payload);
    let kind = cursor.read_u8().map_err(|e| e.to_string())?;
    if kind != S2A_PLAYER {
        return Err(format!("unexpected player reply type 0x{:02X}", kind));
    }
    let count = cursor.read_u8().map_err(|e| e.to_string())?;
    let mut players = Vec::with_capacity(count.into());
    for _ in 0..count {
        let index = cursor.read_u8().map_err(|e| e.to_string())?;
        let name = read_cstring(&mut cursor)?;
        let score = cursor.read_i32::<LittleEndian>().map_err(|e| e.to_string())?;
        let duration = cursor.read_f32::<LittleEndian>().map_err(|e| e.to_string())?;
        players.push(PlayerInfo {
            name,
            score,
            duration,
            index,
        });
    }
    Ok(players)
}
