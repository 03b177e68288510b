//! Demo consumer: drains the mailbox and reports what it sees.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::sample::{Mailbox, WeatherSample};

/// Apparent temperature in °C from air temperature in °C and relative humidity in %.
///
/// NOAA heat index: the simple estimate below 80 °F, the Rothfusz regression above.
pub fn heat_index(celsius: f32, humidity: f32) -> f32 {
    let t = celsius * 9.0 / 5.0 + 32.0;
    let rh = humidity;

    let simple = 0.5 * (t + 61.0 + (t - 68.0) * 1.2 + rh * 0.094);
    let fahrenheit = if (simple + t) / 2.0 < 80.0 {
        simple
    } else {
        -42.379 + 2.049_015_2 * t + 10.143_331 * rh
            - 0.224_755_4 * t * rh
            - 0.006_837_83 * t * t
            - 0.054_817_17 * rh * rh
            + 0.001_228_74 * t * t * rh
            + 0.000_852_82 * t * rh * rh
            - 0.000_001_99 * t * t * rh * rh
    };

    (fahrenheit - 32.0) * 5.0 / 9.0
}

fn report(sample: &WeatherSample) {
    let celsius = sample.celsius();
    log::info!(
        "Weather: {:.1} °C, feels like {:.1} °C, {}% humidity, {:.1} hPa",
        celsius,
        heat_index(celsius, sample.humidity as f32),
        sample.humidity,
        sample.pressure
    );
}

/// Poll `mailbox` every `poll_interval` until `shutdown` fires.
///
/// Returns the number of fresh samples consumed.
pub async fn run_consumer(
    mailbox: Arc<Mailbox>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<()>,
) -> u64 {
    let mut consumed = 0;
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }

        match mailbox.take() {
            Some(sample) => {
                consumed += 1;
                report(&sample);
            }
            None => log::trace!("No fresh weather sample"),
        }
    }
    log::info!("Consumer stopping after {} samples", consumed);
    consumed
}
