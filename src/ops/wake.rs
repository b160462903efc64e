//! Wake-on-LAN
//!
//! Builds the magic packet from the descriptor's MAC address and broadcasts
//! it on UDP port 9. Delivery is fire-and-forget; callers wanting
//! confirmation should follow up with `power_status`.

use async_trait::async_trait;
use tokio::net::UdpSocket;

use super::{OpOutcome, Operation};
use crate::registry::TvDescriptor;
use crate::tokens::TokenStore;

/// Standard WoL discard port
const WOL_PORT: u16 = 9;

/// The `wake` operation
#[derive(Default)]
pub struct WakeOp;

impl WakeOp {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Parse `AA:BB:CC:DD:EE:FF` (or `-` separated) into bytes
fn parse_mac(mac: &str) -> Option<[u8; 6]> {
    let mut bytes = [0u8; 6];
    let mut count = 0;
    for part in mac.split([':', '-']) {
        if count == 6 {
            return None;
        }
        bytes[count] = u8::from_str_radix(part, 16).ok()?;
        count += 1;
    }
    (count == 6).then_some(bytes)
}

/// Six 0xFF bytes followed by the MAC repeated sixteen times
fn magic_packet(mac: [u8; 6]) -> [u8; 102] {
    let mut packet = [0xFFu8; 102];
    for repeat in 0..16 {
        packet[6 + repeat * 6..12 + repeat * 6].copy_from_slice(&mac);
    }
    packet
}

#[async_trait]
impl Operation for WakeOp {
    fn name(&self) -> &'static str {
        "wake"
    }

    async fn run(&self, tv: &TvDescriptor, _tokens: &TokenStore, _args: &[String]) -> OpOutcome {
        let Some(mac) = parse_mac(&tv.mac_address) else {
            return OpOutcome::failure(format!("invalid MAC address: {}", tv.mac_address));
        };

        let socket = match UdpSocket::bind(("0.0.0.0", 0)).await {
            Ok(s) => s,
            Err(e) => return OpOutcome::failure(format!("cannot open socket: {e}")),
        };
        if let Err(e) = socket.set_broadcast(true) {
            return OpOutcome::failure(format!("cannot enable broadcast: {e}"));
        }

        let packet = magic_packet(mac);
        match socket.send_to(&packet, ("255.255.255.255", WOL_PORT)).await {
            Ok(_) => {
                tracing::info!(tv_id = %tv.id, mac = %tv.mac_address, "magic packet sent");
                OpOutcome::success(format!("magic packet sent to {}", tv.mac_address))
            }
            Err(e) => OpOutcome::failure(format!("cannot send magic packet: {e}")),
        }
    }
}
