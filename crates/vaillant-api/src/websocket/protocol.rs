// Wire protocol strategies.
//
// Two incompatible frame dialects exist for the same service. Both sit
// behind `Protocol` so the connection state machine never looks at raw
// field names: it asks for an endpoint, a handshake, a ping frame, and a
// classification of each inbound frame.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use secrecy::ExposeSecret;
use strum::{Display, EnumString};
use url::Url;

use super::WebSocketConfig;
use crate::error::Error;
use crate::model::{Device, Token};

/// Attribute mapping pushed by the device.
pub type AttrMap = Map<String, Value>;

/// Heartbeat interval advertised to the device-direct server, in seconds.
const LOGIN_HEARTBEAT_SECS: u64 = 180;
/// `s2c_invalid_msg` code: M2M socket closed, log in again.
const CODE_SOCKET_CLOSED: i64 = 1009;
/// `s2c_invalid_msg` code: heartbeat missed.
const CODE_HEARTBEAT_MISSED: i64 = 1011;

/// Which frame dialect the peer speaks.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Protocol {
    /// Connect to the host:port the device advertises and log in with
    /// app id, uid and token (`cmd`-tagged frames).
    #[default]
    DeviceDirect,
    /// Connect to the fixed cloud host and name the device in the first
    /// frame (`type`-tagged frames).
    CloudRouted,
}

/// Where and how to open the socket.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub url: Url,
    pub headers: Vec<(String, String)>,
}

/// Frames sent right after the socket opens.
#[derive(Debug, Clone)]
pub struct Handshake {
    /// Login frame that must be acknowledged before anything else is sent.
    pub login: Option<Value>,
    /// Frames sent once login (if any) succeeded.
    pub frames: Vec<Value>,
}

/// Classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    LoginResponse { success: bool },
    Attributes { device_id: String, attrs: AttrMap },
    Pong,
    /// The server dropped the logical session.
    SessionClosed { code: i64 },
    Unhandled,
}

impl Protocol {
    pub fn connect_request(
        self,
        token: &Token,
        device: &Device,
        config: &WebSocketConfig,
    ) -> Result<ConnectRequest, Error> {
        let scheme = if config.use_tls { "wss" } else { "ws" };
        match self {
            Self::DeviceDirect => {
                let port = config.port.unwrap_or(if config.use_tls {
                    device.wss_port
                } else {
                    device.ws_port
                });
                let url = Url::parse(&format!("{scheme}://{}:{port}/ws/app/v1", device.host))?;
                Ok(ConnectRequest {
                    url,
                    headers: Vec::new(),
                })
            }
            Self::CloudRouted => {
                let host = strip_scheme(&config.api_host);
                let url = match config.port {
                    Some(port) => format!("{scheme}://{host}:{port}/monitor/ws/app"),
                    None => format!("{scheme}://{host}/monitor/ws/app"),
                };
                Ok(ConnectRequest {
                    url: Url::parse(&url)?,
                    headers: vec![(
                        "Authorization".into(),
                        format!("Bearer {}", token.access_token.expose_secret()),
                    )],
                })
            }
        }
    }

    pub fn handshake(self, token: &Token, device: &Device) -> Handshake {
        match self {
            Self::DeviceDirect => Handshake {
                login: Some(json!({
                    "cmd": "login_req",
                    "data": {
                        "appid": token.app_id,
                        "uid": token.uid,
                        "token": token.access_token.expose_secret(),
                        "p0_type": "attrs_v4",
                        "heartbeat_interval": LOGIN_HEARTBEAT_SECS,
                        "auto_subscribe": false,
                    },
                })),
                frames: vec![
                    json!({ "cmd": "subscribe_req", "data": [{ "did": device.id }] }),
                    json!({ "cmd": "c2s_read", "data": { "did": device.id } }),
                ],
            },
            Self::CloudRouted => Handshake {
                login: None,
                frames: vec![json!({
                    "type": "msg",
                    "productKey": device.product_key,
                    "mac": device.mac,
                    "did": device.id,
                })],
            },
        }
    }

    pub fn classify(self, frame: &Value) -> Inbound {
        match self {
            Self::DeviceDirect => {
                let data = frame.get("data");
                match frame.get("cmd").and_then(Value::as_str) {
                    Some("login_res") => Inbound::LoginResponse {
                        success: data
                            .and_then(|d| d.get("success"))
                            .and_then(Value::as_bool)
                            .unwrap_or(false),
                    },
                    Some("s2c_noti") => data.map_or(Inbound::Unhandled, |d| {
                        attributes(d.get("did"), d.get("attrs"))
                    }),
                    Some("pong") => Inbound::Pong,
                    Some("s2c_invalid_msg") => {
                        match data.and_then(|d| d.get("error_code")).and_then(Value::as_i64) {
                            Some(code @ (CODE_SOCKET_CLOSED | CODE_HEARTBEAT_MISSED)) => {
                                Inbound::SessionClosed { code }
                            }
                            _ => Inbound::Unhandled,
                        }
                    }
                    _ => Inbound::Unhandled,
                }
            }
            Self::CloudRouted => match frame.get("type").and_then(Value::as_str) {
                Some("2") => attributes(frame.get("did"), frame.get("data")),
                Some("pong") => Inbound::Pong,
                _ => Inbound::Unhandled,
            },
        }
    }

    pub fn ping(self) -> Value {
        match self {
            Self::DeviceDirect => json!({ "cmd": "ping" }),
            Self::CloudRouted => json!({ "type": "ping" }),
        }
    }

    /// Arbitrary command frame. `payload` is omitted when `None`.
    pub fn command(self, device: &Device, name: &str, payload: Option<Value>) -> Value {
        let mut frame = match self {
            Self::DeviceDirect => json!({ "cmd": name }),
            Self::CloudRouted => json!({ "type": name, "did": device.id }),
        };
        if let (Some(payload), Some(obj)) = (payload, frame.as_object_mut()) {
            obj.insert("data".into(), payload);
        }
        frame
    }

    /// Attribute write for the bound device.
    pub fn write_attrs(self, device: &Device, attrs: AttrMap) -> Value {
        match self {
            Self::DeviceDirect => self.command(
                device,
                "c2s_write",
                Some(json!({ "did": device.id, "attrs": attrs })),
            ),
            Self::CloudRouted => self.command(device, "c2s_write", Some(Value::Object(attrs))),
        }
    }
}

fn attributes(device_id: Option<&Value>, attrs: Option<&Value>) -> Inbound {
    let Some(device_id) = device_id.and_then(Value::as_str) else {
        return Inbound::Unhandled;
    };
    Inbound::Attributes {
        device_id: device_id.to_owned(),
        attrs: attrs
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
    }
}

fn strip_scheme(host: &str) -> &str {
    let host = host.split_once("://").map_or(host, |(_, rest)| rest);
    host.trim_end_matches('/')
}

// ── Tests ────────────────────────────────────────────────────────────
