use srs_sim922::{DiodeCalibration, SerialInterfaceSim922, Sim922};

fn main() {
    let port = "/dev/ttyUSB0";

    // Get our serial instrument interface to the SIM900 mainframe
    let serial_inst = SerialInterfaceSim922::simple(port).expect("Failed to open serial port");

    // Open the link to the SIM922 in slot 4.
    let mut inst = Sim922::try_new(serial_inst).unwrap();
    println!("Instrument ID: {}", inst.get_name().unwrap());

    // Temperature from the module curve and from the liquid nitrogen transdiode calibration.
    let mut ch1 = inst.get_channel(1).unwrap();
    println!("Channel 1 temperature: {:?}", ch1.get_temperature());
    println!(
        "Channel 1 calibrated temperature: {:?}",
        ch1.get_calibrated_temperature(&DiodeCalibration::LN2_TRANSDIODE)
    );
    println!("All temperatures: {:?}", inst.get_all_temperatures());

    // Hand the serial link back to the mainframe.
    inst.close().unwrap();
}
