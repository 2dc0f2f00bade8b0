//! Device listing and lookup.

use tabled::Tabled;

use vaillant_api::{Device, DeviceInfo, Token};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;
use crate::session::Session;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Product")]
    product: String,
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Online")]
    online: String,
}

fn row(d: &Device) -> DeviceRow {
    DeviceRow {
        id: d.id.clone(),
        name: d.display_name().to_owned(),
        product: d.product_name.clone(),
        mac: d.mac.clone(),
        host: if d.host.is_empty() {
            "-".into()
        } else {
            format!("{}:{}", d.host, d.ws_port)
        },
        online: if d.is_online { "yes" } else { "no" }.into(),
    }
}

fn detail(info: &DeviceInfo) -> String {
    [
        format!("Serial:    {}", info.serial_number),
        format!("SNO:       {}", info.sno),
        format!("Model:     {}", info.model),
        format!("MAC:       {}", info.mac),
        format!("Device ID: {}", info.device_id),
        format!("Status:    {}", info.status_code),
    ]
    .join("\n")
}

pub async fn list(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let api = session.api();
    let devices = session
        .authorized(|token: Token| async move { api.get_device_list(&token.access_token).await })
        .await?;

    let out = output::render_list(global.output, &devices, row);
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn info(session: &Session, mac: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let api = session.api();
    let info = session
        .authorized(|token: Token| async move { api.get_device_info(&token.access_token, mac).await })
        .await?;

    let out = output::render_single(global.output, &info, detail);
    output::print_output(&out, global.quiet);
    Ok(())
}
