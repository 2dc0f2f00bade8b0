//! Live attribute stream.

use std::sync::{Arc, Mutex};

use chrono::Local;
use serde_json::{Value, json};
use tracing::info;

use vaillant_api::{AttrMap, WebSocketClient};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;
use crate::session::Session;

use super::util;

pub async fn handle(session: &Session, args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (token, device) = util::device_session(session, args.device.as_deref()).await?;
    let color = output::should_color(global.color);
    let format = global.output;
    let quiet = global.quiet;

    if !quiet {
        eprintln!("Watching {} ({}), Ctrl-C to stop", device.display_name(), device.id);
    }
    let client = WebSocketClient::new(token, device, session.websocket_config());

    client.on_subscribe(move |attrs: &AttrMap| {
        if !quiet {
            eprintln!("Subscribed, {} attributes", attrs.len());
        }
    });

    let last = Arc::new(Mutex::new(AttrMap::new()));
    let changes_only = args.changes;
    client.on_update(move |event: &str, payload: &Value| {
        let Some(attrs) = payload.get("data").and_then(Value::as_object) else {
            return;
        };
        let shown = {
            let mut last = last.lock().expect("attribute snapshot lock poisoned");
            let shown = if changes_only {
                util::changed_attrs(&last, attrs)
            } else {
                attrs.clone()
            };
            last.clone_from(attrs);
            shown
        };
        if !shown.is_empty() {
            output::print_output(&render_update(format, event, &shown), quiet);
        }
    });

    let mut states = client.state_changes();
    let state_printer = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            if !quiet {
                eprintln!("{} {}", timestamp(), output::state_label(state, color));
            }
        }
    });

    let listener = client.clone();
    let mut task = tokio::spawn(async move { listener.listen().await });

    let finished = tokio::select! {
        joined = &mut task => Some(joined),
        _ = tokio::signal::ctrl_c() => None,
    };
    let result = match finished {
        Some(joined) => joined,
        None => {
            info!("interrupted, closing connection");
            client.close().await;
            task.await
        }
    };
    state_printer.abort();

    match result {
        Ok(listen) => listen.map_err(|e| CliError::from(e).for_profile(session.profile_name())),
        Err(join) => Err(CliError::Io(std::io::Error::other(join))),
    }
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

fn render_update(format: OutputFormat, event: &str, attrs: &AttrMap) -> String {
    match format {
        OutputFormat::Table => {
            let ts = timestamp();
            attrs
                .iter()
                .map(|(k, v)| format!("{ts} {k} = {v}"))
                .collect::<Vec<_>>()
                .join("\n")
        }
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json(
            &json!({ "time": Local::now().to_rfc3339(), "event": event, "data": attrs }),
            true,
        ),
    }
}
