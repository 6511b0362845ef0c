use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, RouterError};
use crate::types::{LinkAdvertisement, RouterIdentity};
use crate::RouterId;

/// Message kinds, serialized by their numeric tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MessageKind {
    Hello = 0,
    LsaUpdate = 1,
    Connect = 2,
    Disconnect = 3,
    UpdateWeight = 4,
}

impl TryFrom<u8> for MessageKind {
    type Error = String;

    fn try_from(tag: u8) -> std::result::Result<Self, Self::Error> {
        match tag {
            0 => Ok(MessageKind::Hello),
            1 => Ok(MessageKind::LsaUpdate),
            2 => Ok(MessageKind::Connect),
            3 => Ok(MessageKind::Disconnect),
            4 => Ok(MessageKind::UpdateWeight),
            other => Err(format!("unknown message kind {}", other)),
        }
    }
}

impl From<MessageKind> for u8 {
    fn from(kind: MessageKind) -> u8 {
        kind as u8
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageKind::Hello => "HELLO",
            MessageKind::LsaUpdate => "LSAUPDATE",
            MessageKind::Connect => "CONNECT",
            MessageKind::Disconnect => "DISCONNECT",
            MessageKind::UpdateWeight => "UPDATE_WEIGHT",
        };
        f.write_str(s)
    }
}

/// Why a responder refused a request; sent back in a reply of the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rejection {
    MismatchedLink,
    NoCapacity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolMessage {
    pub src_process_ip: String,
    pub src_process_port: u16,
    pub src_ip: RouterId,
    pub dst_ip: RouterId,
    pub kind: MessageKind,
    pub router_id: RouterId,
    pub neighbor_id: RouterId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lsa_array: Vec<LinkAdvertisement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<Rejection>,
}

impl ProtocolMessage {
    pub fn new(sender: &RouterIdentity, destination: &str, kind: MessageKind) -> Self {
        Self {
            src_process_ip: sender.process_ip.clone(),
            src_process_port: sender.process_port,
            src_ip: sender.simulated_ip.clone(),
            dst_ip: destination.to_string(),
            kind,
            router_id: sender.simulated_ip.clone(),
            neighbor_id: sender.simulated_ip.clone(),
            lsa_array: Vec::new(),
            weight: None,
            rejection: None,
        }
    }

    pub fn lsa_update(sender: &RouterIdentity, destination: &str, lsa: LinkAdvertisement) -> Self {
        let mut message = Self::new(sender, destination, MessageKind::LsaUpdate);
        message.lsa_array.push(lsa);
        message
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_neighbor(mut self, neighbor_id: &str) -> Self {
        self.neighbor_id = neighbor_id.to_string();
        self
    }

    /// Reply of the same kind telling `request`'s sender it was refused.
    pub fn rejection(local: &RouterIdentity, request: &ProtocolMessage, reason: Rejection) -> Self {
        let mut message = Self::new(local, &request.src_ip, request.kind).with_neighbor(&request.src_ip);
        message.rejection = Some(reason);
        message
    }

    /// Transport identity of whoever sent this hop.
    pub fn sender(&self) -> RouterIdentity {
        RouterIdentity::new(self.src_process_ip.clone(), self.src_process_port, self.src_ip.clone())
    }

    /// The newest advertisement carried, if any.
    pub fn advertisement(&self) -> Option<&LinkAdvertisement> {
        self.lsa_array.iter().max_by_key(|lsa| lsa.sequence)
    }

    /// Copy for the next hop: only the per-hop header changes, the origin
    /// and payload travel unmodified.
    pub fn restamp(&self, hop: &RouterIdentity, destination: &str) -> Self {
        Self {
            src_process_ip: hop.process_ip.clone(),
            src_process_port: hop.process_port,
            src_ip: hop.simulated_ip.clone(),
            dst_ip: destination.to_string(),
            ..self.clone()
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(line: &str) -> Result<Self> {
        serde_json::from_str(line).map_err(|e| RouterError::MalformedMessage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> RouterIdentity {
        RouterIdentity::new("127.0.0.1", 5000, "192.168.1.1")
    }

    #[test]
    fn kind_is_encoded_as_numeric_tag() {
        let message = ProtocolMessage::new(&identity(), "192.168.1.2", MessageKind::Disconnect);
        let value: serde_json::Value = serde_json::from_str(&message.encode().unwrap()).unwrap();
        assert_eq!(value["kind"], 3);
        assert!(value.get("weight").is_none());
    }

    #[test]
    fn unknown_kind_is_malformed() {
        let mut value = serde_json::to_value(ProtocolMessage::new(&identity(), "x", MessageKind::Hello)).unwrap();
        value["kind"] = serde_json::json!(9);
        let err = ProtocolMessage::decode(&value.to_string()).unwrap_err();
        assert!(matches!(err, RouterError::MalformedMessage(_)));
        assert!(matches!(
            ProtocolMessage::decode("not json"),
            Err(RouterError::MalformedMessage(_))
        ));
    }

    #[test]
    fn restamp_keeps_origin_and_payload() {
        let lsa = LinkAdvertisement::placeholder("192.168.1.1");
        let original = ProtocolMessage::lsa_update(&identity(), "192.168.1.2", lsa.clone());
        let hop = RouterIdentity::new("127.0.0.1", 5001, "192.168.1.2");
        let forwarded = original.restamp(&hop, "192.168.1.3");

        assert_eq!(forwarded.router_id, "192.168.1.1");
        assert_eq!(forwarded.src_ip, "192.168.1.2");
        assert_eq!(forwarded.src_process_port, 5001);
        assert_eq!(forwarded.dst_ip, "192.168.1.3");
        assert_eq!(forwarded.advertisement(), Some(&lsa));
    }

    #[test]
    fn rejection_answers_in_kind() {
        let request = ProtocolMessage::new(&identity(), "192.168.1.2", MessageKind::Connect).with_weight(4);
        let local = RouterIdentity::new("127.0.0.1", 5001, "192.168.1.2");
        let reply = ProtocolMessage::rejection(&local, &request, Rejection::NoCapacity);
        assert_eq!(reply.kind, MessageKind::Connect);
        assert_eq!(reply.dst_ip, "192.168.1.1");
        assert_eq!(reply.rejection, Some(Rejection::NoCapacity));
    }
}
