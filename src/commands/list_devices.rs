//! List available audio input and output devices.

use crate::recording::device::{suppress_alsa_warnings, Direction};
use anyhow::anyhow;
use cpal::traits::{DeviceTrait, HostTrait};

/// Lists the microphones and output devices on the system.
///
/// # Errors
/// - If the audio host cannot enumerate devices
pub fn handle_list_devices() -> Result<(), anyhow::Error> {
    // Enumerate devices while suppressing ALSA library warnings
    let (host, inputs, outputs) = suppress_alsa_warnings(|| {
        let host = cpal::default_host();
        let inputs = named_devices(&host, Direction::Input)?;
        let outputs = named_devices(&host, Direction::Output)?;
        Ok::<_, anyhow::Error>((host, inputs, outputs))
    })?;

    println!();
    print_devices(
        Direction::Input,
        &inputs,
        host.default_input_device().and_then(|d| d.name().ok()),
    );
    print_devices(
        Direction::Output,
        &outputs,
        host.default_output_device().and_then(|d| d.name().ok()),
    );
    println!("Use an ID or name as audio.input_device / audio.output_device in mictape.toml.");

    Ok(())
}

/// Devices whose name can be queried, in host order.
fn named_devices(host: &cpal::Host, direction: Direction) -> anyhow::Result<Vec<cpal::Device>> {
    let devices: Vec<cpal::Device> = match direction {
        Direction::Input => host.input_devices().map(|d| d.collect::<Vec<_>>()),
        Direction::Output => host.output_devices().map(|d| d.collect::<Vec<_>>()),
    }
    .map_err(|e| anyhow!("Failed to enumerate audio devices: {e}"))?;

    Ok(devices.into_iter().filter(|d| d.name().is_ok()).collect())
}

fn print_devices(direction: Direction, devices: &[cpal::Device], default_name: Option<String>) {
    if devices.is_empty() {
        println!("No audio {} devices found on this system.", direction.label());
        println!();
        return;
    }

    println!("Available audio {} devices:", direction.label());
    println!();

    for (index, device) in devices.iter().enumerate() {
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let default_indicator = if default_name.as_ref() == Some(&device_name) {
            " [DEFAULT]"
        } else {
            ""
        };

        let config = match direction {
            Direction::Input => device.default_input_config(),
            Direction::Output => device.default_output_config(),
        };
        let config_info = match config {
            Ok(config) => format!(" ({}Hz, {} channels)", config.sample_rate().0, config.channels()),
            Err(_) => " (configuration unavailable)".to_string(),
        };

        println!("  ID: {}", index);
        println!("    Name: {}{}", device_name, default_indicator);
        println!("    Config:{}", config_info);
        println!();
    }
}
