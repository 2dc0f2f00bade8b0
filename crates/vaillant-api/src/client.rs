// HTTP client for the vendor account and device-discovery endpoints.
//
// Stateless request/response mapping: every call takes the credential it
// needs and returns a value record or a classified error. The WebSocket
// client consumes the resulting Token and Device.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::model::{Device, DeviceInfo, Token};
use crate::transport::TransportConfig;

/// Vendor app backend (login, serial-number lookup).
pub const DEFAULT_APP_URL: &str = "https://vicapi.vaillant.com.cn";
/// IoT platform backend (bindings).
pub const DEFAULT_API_URL: &str = "https://api.gizwits.com";
pub const DEFAULT_API_VERSION: &str = "1.0";

const GIZWITS_USER_AGENT: &str = "GizWifiSDK (v13.21121715)";
/// Bindings error code for a rejected user token.
const TOKEN_INVALID_CODE: i64 = 9004;
/// App API code meaning "not logged in".
const NOT_LOGGED_IN_CODE: &str = "505";

/// Endpoint and identity settings for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub app_url: Url,
    pub api_url: Url,
    pub application_id: String,
    pub api_version: String,
    pub transport: TransportConfig,
}

impl ApiConfig {
    /// Config pointing at the production hosts.
    pub fn new(application_id: impl Into<String>) -> Result<Self, Error> {
        Ok(Self {
            app_url: Url::parse(DEFAULT_APP_URL)?,
            api_url: Url::parse(DEFAULT_API_URL)?,
            application_id: application_id.into(),
            api_version: DEFAULT_API_VERSION.into(),
            transport: TransportConfig::default(),
        })
    }
}

// ── Response envelopes ───────────────────────────────────────────────

/// App API envelope: `{ "code": "200", "data": ... }`.
#[derive(Deserialize)]
struct AppResponse<T> {
    code: Option<String>,
    data: Option<T>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct LoginData {
    token: String,
    uid: String,
}

#[derive(Deserialize)]
struct BindingsResponse {
    #[serde(default)]
    devices: Vec<Device>,
    error_code: Option<i64>,
    error_message: Option<String>,
}

// ── ApiClient ────────────────────────────────────────────────────────

/// HTTP client for authentication and device discovery.
pub struct ApiClient {
    http: reqwest::Client,
    config: ApiConfig,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, Error> {
        let http = config.transport.build_client()?;
        Ok(Self { http, config })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, config: ApiConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Exchange a username/password for a [`Token`].
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<Token, Error> {
        let url = self.config.app_url.join("/app/user/login")?;
        let body = json!({
            "appKey": self.config.application_id,
            "version": self.config.api_version,
            "data": {
                "username": username,
                "password": password.expose_secret(),
            },
        });

        debug!("logging in at {}", url);
        let builder = self.app_headers(self.http.post(url)).json(&body);
        let resp: AppResponse<LoginData> = self.send(builder).await?;

        match (resp.code.as_deref(), resp.data) {
            (Some("200"), Some(data)) => {
                debug!(uid = %data.uid, "login successful");
                Ok(Token::new(
                    self.config.application_id.clone(),
                    username,
                    password.expose_secret(),
                    data.token,
                    data.uid,
                ))
            }
            _ => Err(Error::InvalidCredentials),
        }
    }

    /// List the devices bound to the account owning `access_token`.
    pub async fn get_device_list(&self, access_token: &SecretString) -> Result<Vec<Device>, Error> {
        let mut url = self.config.api_url.join("/app/bindings")?;
        url.query_pairs_mut()
            .append_pair("show_disabled", "0")
            .append_pair("limit", "20")
            .append_pair("skip", "0");

        debug!("GET {}", url);
        let builder = self
            .http
            .get(url)
            .header(reqwest::header::USER_AGENT, GIZWITS_USER_AGENT)
            .header("X-Gizwits-Application-Id", &self.config.application_id)
            .header("X-Gizwits-User-token", access_token.expose_secret());
        let resp: BindingsResponse = self.send(builder).await?;

        match resp.error_code {
            Some(TOKEN_INVALID_CODE) => Err(Error::InvalidAuth),
            Some(code) => Err(Error::Request {
                message: format!(
                    "bindings error {code}: {}",
                    resp.error_message.unwrap_or_default()
                ),
            }),
            None => Ok(resp.devices),
        }
    }

    /// Look up serial number and model for a device by MAC address.
    pub async fn get_device_info(
        &self,
        access_token: &SecretString,
        mac: &str,
    ) -> Result<DeviceInfo, Error> {
        let mut url = self.config.app_url.join("/app/device/sn/status")?;
        url.query_pairs_mut()
            .append_pair("mac", &mac.to_uppercase());

        debug!("GET {}", url);
        let builder = self
            .app_headers(self.http.get(url))
            .header(reqwest::header::AUTHORIZATION, access_token.expose_secret())
            .header("Version", &self.config.api_version);
        let resp: AppResponse<DeviceInfo> = self.send(builder).await?;

        match (resp.code.as_deref(), resp.data) {
            (Some(NOT_LOGGED_IN_CODE), _) => Err(Error::InvalidAuth),
            (Some("200"), Some(info)) => Ok(info),
            (code, _) => Err(Error::Request {
                message: format!(
                    "device info lookup failed (code {}): {}",
                    code.unwrap_or("none"),
                    resp.message.unwrap_or_default()
                ),
            }),
        }
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Headers the vendor app backend expects from its embedded webview.
    fn app_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header(reqwest::header::USER_AGENT, &self.config.transport.user_agent)
            .header(reqwest::header::REFERER, "http://localhost/main.html")
            .header("X-Requested-With", "com.vaillant.plus")
            .header(reqwest::header::ORIGIN, "http://localhost")
    }

    /// Send a request and map the status code before decoding.
    ///
    /// 4xx is treated as an auth rejection, 200 is decoded, and anything
    /// else becomes [`Error::Request`].
    async fn send<T: DeserializeOwned>(&self, builder: reqwest::RequestBuilder) -> Result<T, Error> {
        let resp = builder.send().await.map_err(|e| Error::Request {
            message: format!("error requesting data: {e}"),
        })?;
        let status = resp.status();
        let url = resp.url().clone();

        if status.is_client_error() {
            return Err(Error::InvalidAuth);
        }

        if status != reqwest::StatusCode::OK {
            return Err(Error::Request {
                message: format!("HTTP {status} from {url}"),
            });
        }

        let body = resp.text().await.map_err(Error::Transport)?;
        debug!("Received data for {}: {}", url, body);

        serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: body.clone(),
            }
        })
    }
}
