//! Shared helpers for command handlers.

use serde_json::Value;

use vaillant_api::{AttrMap, Device, Token};

use crate::error::CliError;
use crate::session::Session;

/// Pick a device by id or MAC; with no selector, the only bound device.
pub fn pick_device(mut devices: Vec<Device>, selector: Option<&str>) -> Result<Device, CliError> {
    if let Some(wanted) = selector {
        return devices
            .into_iter()
            .find(|d| d.id == wanted || d.mac.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| CliError::NotFound {
                resource_type: "device".into(),
                identifier: wanted.into(),
            });
    }

    match devices.len() {
        0 => Err(CliError::NotFound {
            resource_type: "device".into(),
            identifier: "(any)".into(),
        }),
        1 => Ok(devices.swap_remove(0)),
        count => Err(CliError::AmbiguousDevice { count }),
    }
}

/// Log in (or reuse the cached token) and resolve the target device.
pub async fn device_session(
    session: &Session,
    selector: Option<&str>,
) -> Result<(Token, Device), CliError> {
    let api = session.api();
    let (token, devices) = session
        .authorized(|token: Token| async move {
            let devices = api.get_device_list(&token.access_token).await?;
            Ok::<_, vaillant_api::Error>((token, devices))
        })
        .await?;

    let selector = selector.or(session.profile().device.as_deref());
    let device = pick_device(devices, selector)?;
    Ok((token, device))
}

/// Parse `KEY=VALUE`; VALUE is JSON when it parses, else a plain string.
pub fn parse_attr(raw: &str) -> Result<(String, Value), CliError> {
    let (key, value) = raw.split_once('=').ok_or_else(|| CliError::Validation {
        field: raw.into(),
        reason: "expected KEY=VALUE".into(),
    })?;
    let key = key.trim();
    if key.is_empty() {
        return Err(CliError::Validation {
            field: raw.into(),
            reason: "attribute name is empty".into(),
        });
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.into()));
    Ok((key.into(), value))
}

pub fn parse_attrs(raw: &[String]) -> Result<AttrMap, CliError> {
    raw.iter().map(|r| parse_attr(r)).collect()
}

/// Attributes in `current` whose value differs from `previous`.
pub fn changed_attrs(previous: &AttrMap, current: &AttrMap) -> AttrMap {
    current
        .iter()
        .filter(|(k, v)| previous.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
