//! Prints the serial ports present on this machine, one per line.

fn main() {
    match serial_line::list_ports() {
        Ok(ports) if ports.is_empty() => eprintln!("no serial ports found"),
        Ok(ports) => {
            for port in ports {
                println!("{}", port);
            }
        }
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    }
}
