use ptpcam_rs::usb;

/// This example lists the connected PTP cameras.
/// Pass `--force` to list every non-hub USB device.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let force = std::env::args().any(|arg| arg == "--force");

    let devices = usb::list_devices(force)?;

    if devices.is_empty() {
        println!("Found no PTP devices");
    }

    for device in devices {
        println!(
            "{device}  {} {}",
            device.manufacturer().unwrap_or("?"),
            device.product().unwrap_or("?")
        );
    }

    Ok(())
}
