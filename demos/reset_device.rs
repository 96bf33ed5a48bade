use ptpcam_rs::{reset, usb};

/// This example resets the first camera found, or the one at `<bus> <dev>`.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let bus = args.next().map(|s| s.parse()).transpose()?.unwrap_or(0);
    let dev = args.next().map(|s| s.parse()).transpose()?.unwrap_or(0);

    let device = usb::find_device(bus, dev, false)?;
    let report = reset::reset(&device)?;

    println!("Pipes: {:?}", report.pipes);
    println!(
        "Device status {}, reset {}",
        if report.status_ok() { "OK" } else { "not OK" },
        if report.reset_accepted { "accepted" } else { "refused" }
    );

    Ok(())
}
