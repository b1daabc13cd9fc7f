// washwatch — Telegram Bot Channel
//
// One chat, two calls: `sendMessage` for the done-notification and
// `getUpdates` for remote `/set` commands. Both are plain HTTPS POSTs
// against api.telegram.org with the ESP x509 bundle for TLS.
//
// The radio is brought up lazily on the first call that needs it; most wake
// passes go back to sleep without ever touching the network.

#[cfg(target_os = "espidf")]
use anyhow::{bail, Context};
#[cfg(target_os = "espidf")]
use embedded_svc::http::client::Client;
#[cfg(target_os = "espidf")]
use embedded_svc::http::Status;
#[cfg(target_os = "espidf")]
use embedded_svc::io::{Read, Write};
#[cfg(target_os = "espidf")]
use esp_idf_hal::modem::Modem;
#[cfg(target_os = "espidf")]
use esp_idf_svc::eventloop::EspSystemEventLoop;
#[cfg(target_os = "espidf")]
use esp_idf_svc::http::client::{Configuration as HttpConfiguration, EspHttpConnection};
#[cfg(target_os = "espidf")]
use esp_idf_svc::nvs::EspDefaultNvsPartition;
#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::EspWifi;
use serde::{Deserialize, Serialize};

#[cfg(target_os = "espidf")]
use crate::config::{TELEGRAM_CHAT_ID, TELEGRAM_TOKEN};
#[cfg(target_os = "espidf")]
use crate::cycle::StatusChannel;
use crate::cycle::InboundCommands;

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct GetUpdatesRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u8,
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    text: Option<String>,
}

/// Only the newest text message matters; everything older was superseded.
/// The returned cursor is one past the newest update so the next poll sees
/// only genuinely new traffic.
fn digest_updates(updates: Vec<Update>) -> InboundCommands {
    let next_cursor = updates.last().map(|u| u.update_id + 1);
    let latest = updates
        .into_iter()
        .rev()
        .find_map(|u| u.message.and_then(|m| m.text));
    InboundCommands { latest, next_cursor }
}

#[cfg(target_os = "espidf")]
pub struct TelegramChannel {
    radio: Option<(Modem, EspSystemEventLoop, EspDefaultNvsPartition)>,
    wifi: Option<EspWifi<'static>>,
}

#[cfg(target_os = "espidf")]
impl TelegramChannel {
    pub fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs_partition: EspDefaultNvsPartition,
    ) -> Self {
        Self {
            radio: Some((modem, sys_loop, nvs_partition)),
            wifi: None,
        }
    }

    fn ensure_connected(&mut self) -> anyhow::Result<()> {
        if self.wifi.is_some() {
            return Ok(());
        }
        // One shot per boot: a failed bring-up consumes the modem, and the
        // next attempt happens after the short-poll sleep anyway.
        let (modem, sys_loop, nvs) = self
            .radio
            .take()
            .context("wifi bring-up already failed this boot")?;
        self.wifi = Some(crate::wifi::connect(modem, sys_loop, nvs)?);
        Ok(())
    }

    fn call<T: Serialize, R: for<'de> Deserialize<'de>>(
        &mut self,
        method: &str,
        body: &T,
    ) -> anyhow::Result<R> {
        self.ensure_connected()?;

        let url = format!("https://api.telegram.org/bot{TELEGRAM_TOKEN}/{method}");
        let payload = serde_json::to_vec(body)?;
        let content_len = payload.len().to_string();

        let conn = EspHttpConnection::new(&HttpConfiguration {
            crt_bundle_attach: Some(esp_idf_sys::esp_crt_bundle_attach),
            ..Default::default()
        })?;
        let mut client = Client::wrap(conn);

        let mut request = client.post(
            &url,
            &[
                ("Content-Type", "application/json"),
                ("Content-Length", &content_len),
            ],
        )?;
        request.write_all(&payload)?;
        let mut response = request.submit()?;

        let status = response.status();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 512];
        loop {
            let n = response.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        if status != 200 {
            bail!("bot api {method} returned http {status}");
        }

        let parsed: ApiResponse<R> = serde_json::from_slice(&buf)?;
        if !parsed.ok {
            bail!("bot api {method} reported failure");
        }
        parsed
            .result
            .with_context(|| format!("bot api {method} returned no result"))
    }
}

#[cfg(target_os = "espidf")]
impl StatusChannel for TelegramChannel {
    fn send_message(&mut self, text: &str) -> anyhow::Result<()> {
        let body = SendMessageRequest {
            chat_id: TELEGRAM_CHAT_ID,
            text,
        };
        // The result payload (the echoed message) is irrelevant.
        let _: serde_json::Value = self.call("sendMessage", &body)?;
        Ok(())
    }

    fn poll_commands(&mut self, since: Option<i64>) -> anyhow::Result<InboundCommands> {
        let body = GetUpdatesRequest {
            offset: since,
            timeout: 0,
        };
        let updates: Vec<Update> = self.call("getUpdates", &body)?;
        log::debug!("{} update(s) pending", updates.len());
        Ok(digest_updates(updates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_text_wins_and_cursor_advances_past_it() {
        let raw = r#"{"ok":true,"result":[
            {"update_id":10,"message":{"text":"/set 1 2"}},
            {"update_id":11,"message":{"text":"/set 9 9"}},
            {"update_id":12,"message":{}}
        ]}"#;
        let parsed: ApiResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();
        let commands = digest_updates(parsed.result.unwrap());
        assert_eq!(commands.latest.as_deref(), Some("/set 9 9"));
        assert_eq!(commands.next_cursor, Some(13));
    }

    #[test]
    fn empty_update_list_leaves_the_cursor_alone() {
        let commands = digest_updates(Vec::new());
        assert!(commands.latest.is_none());
        assert!(commands.next_cursor.is_none());
    }

    #[test]
    fn non_message_updates_are_tolerated() {
        let raw = r#"{"ok":true,"result":[{"update_id":5}]}"#;
        let parsed: ApiResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();
        let commands = digest_updates(parsed.result.unwrap());
        assert!(commands.latest.is_none());
        assert_eq!(commands.next_cursor, Some(6));
    }
}
