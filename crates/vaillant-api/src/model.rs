// Value records shared by the HTTP and WebSocket clients.

use std::io;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;

use crate::error::Error;

/// Event name carried by every attribute-update dispatch.
pub const EVT_DEVICE_ATTR_UPDATE: &str = "device:attr:update";

// ── Token ────────────────────────────────────────────────────────────

/// Credentials returned by [`ApiClient::login`](crate::ApiClient::login).
///
/// Immutable once built. The WebSocket login frame carries `app_id`,
/// `uid` and `access_token`; username and password are kept so an
/// expired token can be refreshed without prompting.
#[derive(Debug, Clone)]
pub struct Token {
    pub app_id: String,
    pub username: String,
    pub password: SecretString,
    pub access_token: SecretString,
    pub uid: String,
}

/// On-disk shape of a token. Key names are part of the persisted format.
#[derive(Serialize, Deserialize)]
struct TokenRecord {
    app_id: String,
    username: String,
    password: String,
    token: String,
    uid: String,
}

impl Token {
    pub fn new(
        app_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        access_token: impl Into<String>,
        uid: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            username: username.into(),
            password: SecretString::from(password.into()),
            access_token: SecretString::from(access_token.into()),
            uid: uid.into(),
        }
    }

    /// Encode as base64 JSON for persisting between sessions.
    ///
    /// The JSON uses `", "` / `": "` separators and `\uXXXX` escapes for
    /// anything outside printable ASCII, so blobs are byte-identical to
    /// the ones earlier releases wrote.
    pub fn serialize(&self) -> String {
        let record = TokenRecord {
            app_id: self.app_id.clone(),
            username: self.username.clone(),
            password: self.password.expose_secret().to_owned(),
            token: self.access_token.expose_secret().to_owned(),
            uid: self.uid.clone(),
        };
        let mut ser = serde_json::Serializer::with_formatter(Vec::new(), SpacedAsciiFormatter);
        // A struct of plain strings always serializes.
        if record.serialize(&mut ser).is_err() {
            return String::new();
        }
        BASE64.encode(ser.into_inner())
    }

    /// Decode a blob produced by [`serialize`](Self::serialize).
    ///
    /// Key order and JSON whitespace do not matter.
    pub fn deserialize(blob: &str) -> Result<Self, Error> {
        let bytes = BASE64
            .decode(blob.trim())
            .map_err(|e| Error::TokenDecode(e.to_string()))?;
        let record: TokenRecord =
            serde_json::from_slice(&bytes).map_err(|e| Error::TokenDecode(e.to_string()))?;
        Ok(Self::new(
            record.app_id,
            record.username,
            record.password,
            record.token,
            record.uid,
        ))
    }
}

/// Compact JSON with a space after `,` and `:`, ASCII-only output.
struct SpacedAsciiFormatter;

impl Formatter for SpacedAsciiFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            return Ok(());
        }
        writer.write_all(b", ")
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            return Ok(());
        }
        writer.write_all(b", ")
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        let mut buf = [0u8; 4];
        for ch in fragment.chars() {
            if (' '..='~').contains(&ch) {
                writer.write_all(ch.encode_utf8(&mut buf).as_bytes())?;
            } else {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.app_id == other.app_id
            && self.username == other.username
            && self.password.expose_secret() == other.password.expose_secret()
            && self.access_token.expose_secret() == other.access_token.expose_secret()
            && self.uid == other.uid
    }
}

impl Eq for Token {}

// ── Device ───────────────────────────────────────────────────────────

/// One appliance bound to the account, as returned by the bindings endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    #[serde(rename = "did")]
    pub id: String,
    pub mac: String,
    pub product_key: String,
    #[serde(default)]
    pub product_name: String,
    /// Host advertised for device-direct WebSocket connections.
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub ws_port: u16,
    #[serde(default)]
    pub wss_port: u16,
    #[serde(default)]
    pub wifi_soft_version: String,
    #[serde(default)]
    pub wifi_hard_version: String,
    #[serde(default)]
    pub mcu_soft_version: String,
    #[serde(default)]
    pub mcu_hard_version: String,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub dev_alias: Option<String>,
    #[serde(default)]
    pub remark: Option<String>,
}

impl Device {
    /// User-assigned alias if set, otherwise the product name.
    pub fn display_name(&self) -> &str {
        self.dev_alias
            .as_deref()
            .filter(|alias| !alias.is_empty())
            .unwrap_or(&self.product_name)
    }
}

// ── DeviceInfo ───────────────────────────────────────────────────────

/// Serial-number record from the vendor app API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub sno: String,
    pub mac: String,
    #[serde(rename = "gizDid")]
    pub device_id: String,
    #[serde(rename = "serialNumber")]
    pub serial_number: String,
    pub model: String,
    #[serde(rename = "status")]
    pub status_code: i64,
}

// ── Tests ────────────────────────────────────────────────────────────
