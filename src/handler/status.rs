use std::{io::Cursor, path::Path};

use anyhow::{ensure, Result};
use base64::{engine::general_purpose, Engine};
use image::{image_dimensions, io::Reader as ImageReader, ImageOutputFormat};
use log::{debug, warn};

use crate::{
    component::Component,
    protocol::{
        codec::connection::Connection,
        packet::status::{Ping, Players, Status, StatusRequest, StatusResponse, Version},
        Negotiated, ProtocolVersion,
    },
    server::Context,
};

/// Players listed when hovering the player count.
const SAMPLE_SIZE: usize = 12;

pub async fn handle(client: &mut Connection, context: &Context) -> Result<()> {
    client.read_packet::<StatusRequest>().await?;
    client
        .write_packet(StatusResponse::new(&server_status(context, client.protocol))?)
        .await?;

    let ping: Ping = client.read_packet().await?;
    client.write_packet(ping).await?;
    client.close().await
}

/// Status document for a client speaking `protocol`. Clients we support see
/// their own version, everyone else sees the newest one and an incompatible marker.
pub fn server_status(context: &Context, protocol: Negotiated) -> Status {
    let version = protocol.supported().unwrap_or(ProtocolVersion::NEWEST);

    Status {
        version: Version { name: format!("ferry {}", version.name()), protocol: version.id() },
        players: Players {
            max: context.players.max(),
            online: context.players.online(),
            sample: context.players.sample(SAMPLE_SIZE),
        },
        description: Component::text(&context.config.motd),
        favicon: context.favicon.clone(),
    }
}

/// Answers the pre-netty `0xFE` ping with a `0xFF` kick packet.
pub async fn legacy_ping(client: &mut Connection, context: &Context) -> Result<()> {
    debug!("{} sent a legacy ping", client.peer());

    let reply = legacy_response(
        ProtocolVersion::NEWEST,
        &context.config.motd,
        context.players.online(),
        context.players.max(),
    );
    client.write_unframed(&reply).await?;
    client.close().await
}

pub fn legacy_response(version: ProtocolVersion, motd: &str, online: usize, max: usize) -> Vec<u8> {
    let text = format!("§1\0{}\0{}\0{}\0{}\0{}", version.id(), version.name(), motd, online, max);
    let chars: Vec<u16> = text.encode_utf16().collect();

    let mut reply = Vec::with_capacity(3 + chars.len() * 2);
    reply.push(0xFF);
    reply.extend_from_slice(&(chars.len() as u16).to_be_bytes());
    for c in chars {
        reply.extend_from_slice(&c.to_be_bytes());
    }
    reply
}

pub fn load_favicon(path: &Path) -> Option<String> {
    if !path.exists() {
        return None;
    }

    match read_favicon(path) {
        Ok(favicon) => Some(favicon),
        Err(e) => {
            warn!("favicon {}: {}", path.display(), e);
            None
        }
    }
}

fn read_favicon(path: &Path) -> Result<String> {
    let dimensions = image_dimensions(path)?;
    ensure!(dimensions == (64, 64), "must be 64x64, is {}x{}", dimensions.0, dimensions.1);

    let mut buffer = Vec::with_capacity(4096);
    ImageReader::open(path)?
        .decode()?
        .write_to(&mut Cursor::new(&mut buffer), ImageOutputFormat::Png)?;

    Ok(format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(buffer)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_response_layout() {
        let reply = legacy_response(ProtocolVersion::V1_8, "hi", 1, 20);
        let text = "§1\u{0}47\u{0}1.8\u{0}hi\u{0}1\u{0}20";
        let units: Vec<u16> = text.encode_utf16().collect();

        assert_eq!(reply[0], 0xFF);
        assert_eq!(u16::from_be_bytes([reply[1], reply[2]]) as usize, units.len());
        assert_eq!(&reply[3..5], &[0x00, 0xA7]);
        assert_eq!(reply.len(), 3 + units.len() * 2);
    }

    #[test]
    fn missing_favicon_is_skipped() {
        assert_eq!(load_favicon(Path::new("does-not-exist.png")), None);
    }
}
