//! One-shot attribute write.

use std::time::Duration;

use tracing::debug;

use vaillant_api::{ConnectionState, WebSocketClient};

use crate::cli::{GlobalOpts, SendArgs};
use crate::error::CliError;
use crate::session::Session;

use super::util;

pub async fn handle(session: &Session, args: SendArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let attrs = util::parse_attrs(&args.attrs)?;
    let (token, device) = util::device_session(session, args.device.as_deref()).await?;
    let label = format!("{} ({})", device.display_name(), device.id);

    let client = WebSocketClient::new(token, device, session.websocket_config());
    let mut states = client.state_changes();
    let listener = client.clone();
    let task = tokio::spawn(async move { listener.listen().await });

    let wait = Duration::from_secs(args.wait);
    let reached = tokio::time::timeout(wait, async {
        states
            .wait_for(|s| matches!(s, ConnectionState::Subscribed | ConnectionState::Stopped))
            .await
            .map(|state| *state)
    })
    .await;

    let outcome = match reached {
        Ok(Ok(ConnectionState::Subscribed)) => {
            let count = attrs.len();
            debug!(count, device = %label, "writing attributes");
            client.write_attrs(attrs).await.map(|()| count)
        }
        Ok(_) => {
            // listen() already stopped; surface its error if it had one
            return match task.await {
                Ok(Err(e)) => Err(CliError::from(e).for_profile(session.profile_name())),
                _ => Err(CliError::Disconnected),
            };
        }
        Err(_) => {
            client.close().await;
            let _ = task.await;
            return Err(CliError::Timeout {
                seconds: args.wait,
            });
        }
    };

    client.close().await;
    let _ = task.await;

    let count = outcome?;
    if !global.quiet {
        eprintln!("Wrote {count} attribute(s) to {label}");
    }
    Ok(())
}
