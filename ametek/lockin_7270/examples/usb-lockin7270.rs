use std::{thread, time::Duration};

use ametek_7270::{LockIn7270, Measurand, Setting, UsbInterfaceLockIn};

fn main() {
    // Open the first 7270 on the USB bus.
    let interface = UsbInterfaceLockIn::simple().expect("Failed to open the 7270");
    let mut lockin = LockIn7270::try_new(interface).unwrap();
    println!("Firmware version: {}", lockin.get_firmware_version().unwrap());

    // Default setup, then a 1 s time constant.
    lockin.setup_default().unwrap();
    lockin.set_setting(Setting::TimeConstant, 15).unwrap();
    println!("Sensitivity: {}", lockin.get_sensitivity().unwrap());

    // Read all four front panel outputs ten times.
    for _ in 0..10 {
        for measurand in [Measurand::X, Measurand::Y, Measurand::Magnitude, Measurand::Phase] {
            println!("{measurand}: {}", lockin.read_value(measurand).unwrap());
        }
        thread::sleep(Duration::from_secs(1));
    }

    lockin.close();
}
