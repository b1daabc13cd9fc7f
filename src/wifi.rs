// washwatch — Wi-Fi Station Bring-Up
//
// Credentials are baked in at build time. The radio stays down until the
// first call that actually needs the network, since most wake passes never
// touch it. Connection failure is an ordinary error for the caller: the
// cycle falls back to a short-poll retry rather than blocking on the AP.

use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

use crate::config::*;

/// Start the station and block until the netif is up, retrying the connect a
/// few times. Returns the live driver; dropping it tears the radio down.
pub fn connect(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
) -> anyhow::Result<EspWifi<'static>> {
    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    let auth_method = if WIFI_PASS.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: WIFI_SSID
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: WIFI_PASS
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start().context("wifi start failed")?;
    log::info!("wifi started, connecting to `{WIFI_SSID}`");

    let mut last_err = None;
    for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
        match wifi.connect() {
            Ok(()) => match wifi.wait_netif_up() {
                Ok(()) => {
                    log::info!("wifi up on attempt {attempt}");
                    last_err = None;
                    break;
                }
                Err(err) => {
                    log::warn!("netif up failed on attempt {attempt}: {err:#}");
                    last_err = Some(err);
                }
            },
            Err(err) => {
                log::warn!("wifi connect failed on attempt {attempt}: {err:#}");
                last_err = Some(err);
            }
        }

        if attempt < WIFI_CONNECT_ATTEMPTS {
            let _ = wifi.disconnect();
            thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
        }
    }

    if let Some(err) = last_err {
        let _ = wifi.stop();
        bail!("wifi unavailable after {WIFI_CONNECT_ATTEMPTS} attempts: {err}");
    }
    Ok(esp_wifi)
}
