use anyhow::{bail, Context};
use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use turboctl::codes::TelegramKind;
use turboctl::frame::TelegramStream;
use turboctl::link::{open_serial, BAUD_RATE};
use turboctl::{logging, PumpConfig, TelegramReader, VirtualPump};

// The main entry point for the virtual pump application.
fn main() -> anyhow::Result<()> {
    // An optional argument names a TOML settings file.
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = PumpConfig::load(config_path.as_deref()).context("invalid settings")?;
    logging::init(&config.log_level).map_err(|e| anyhow::anyhow!(e))?;

    println!("============================");
    println!("  TURBOVAC Virtual Pump     ");
    println!("============================");

    let pump = VirtualPump::new(&config).context("could not start the virtual pump")?;
    info!(
        step_ms = config.step_ms,
        control_mode = ?config.control_mode,
        "pump ready"
    );

    // Main menu loop.
    loop {
        println!("\nSelect mode:");
        println!("  1. Manual Telegram Input");
        println!("  2. Listen on Serial Port");
        println!("  3. Exit");
        let choice = prompt("> ")?;

        match choice.trim() {
            "1" => run_manual_mode(&pump)?,
            "2" => {
                if let Err(e) = run_serial_mode(&pump, &config) {
                    eprintln!("[ERROR] {:#}", e);
                }
            }
            "3" => break,
            _ => eprintln!("[ERROR] Invalid choice. Please enter 1, 2, or 3."),
        }
    }
    Ok(())
}

// Print `text` and read one line from stdin.
fn prompt(text: &str) -> anyhow::Result<String> {
    print!("{}", text);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line)
}

// Handles the manual telegram input mode.
fn run_manual_mode(pump: &VirtualPump) -> anyhow::Result<()> {
    println!("\n--- Manual Mode ---");
    println!("Enter query telegrams as hex (spaces allowed), or type 'back' to return to the main menu.");
    print!("> ");
    io::stdout().flush()?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let input = line?;
        let input = input.trim();

        if input == "back" {
            break;
        }

        if !input.is_empty() {
            let digits: String = input.chars().filter(|c| !c.is_whitespace()).collect();
            match hex::decode(&digits) {
                Ok(bytes) => {
                    process_and_display_telegram(pump, &bytes);
                }
                Err(e) => eprintln!("[ERROR] Not a hex string: {}", e),
            }
        }
        print!("> ");
        io::stdout().flush()?;
    }
    Ok(())
}

// Handles the serial port listening mode.
fn run_serial_mode(pump: &VirtualPump, config: &PumpConfig) -> anyhow::Result<()> {
    println!("\n--- Serial Mode ---");

    // List available serial ports.
    let ports = serialport::available_ports().context("could not enumerate serial ports")?;
    if ports.is_empty() {
        bail!("no serial ports found");
    }

    println!("Available serial ports:");
    for (i, port) in ports.iter().enumerate() {
        println!("  {}: {}", i, port.port_name);
    }

    // Get user's choice of serial port.
    let port_index: usize = match prompt("Select a port (number): ")?.trim().parse() {
        Ok(i) if i < ports.len() => i,
        _ => bail!("invalid port selection"),
    };
    let port_name = &ports[port_index].port_name;

    // Get user's choice of baud rate. Pumps ship set to 19200.
    let baud_rates = [9600, 19200, 38400, 57600, 115200];
    println!("Available baud rates:");
    for (i, &rate) in baud_rates.iter().enumerate() {
        println!("  {}: {}", i, rate);
    }
    let baud_rate = match prompt("Select a baud rate (number, default 19200): ")?.trim() {
        "" => BAUD_RATE,
        choice => match choice.parse::<usize>() {
            Ok(i) if i < baud_rates.len() => baud_rates[i],
            _ => bail!("invalid baud rate selection"),
        },
    };

    // Open the selected serial port with the pump's 8E1 framing.
    let mut port = open_serial(port_name, baud_rate, config.read_timeout())
        .with_context(|| format!("failed to open port '{}'", port_name))?;

    println!(
        "\nListening on {} at {} baud. Press Ctrl+C to exit.",
        port_name, baud_rate
    );

    let mut serial_buf: Vec<u8> = vec![0; 128];
    let mut stream = TelegramStream::new();
    loop {
        match port.read(serial_buf.as_mut_slice()) {
            Ok(bytes_read) => {
                for query in stream.push(&serial_buf[..bytes_read]) {
                    let reply = process_and_display_telegram(pump, &query);
                    if !reply.is_empty() {
                        if let Err(e) = port.write_all(&reply) {
                            eprintln!("[ERROR] Failed to write to serial port: {}", e);
                        }
                    }
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => {
                // A pause in the middle of a telegram ends it.
                if !stream.pending().is_empty() {
                    warn!(bytes = %hex::encode(stream.take()), "dropping incomplete telegram");
                }
            }
            Err(e) => eprintln!("[ERROR] Serial port error: {}", e),
        }
    }
}

// Common function to answer a telegram and print both sides.
fn process_and_display_telegram(pump: &VirtualPump, query: &[u8]) -> Vec<u8> {
    let catalogue = Arc::clone(pump.catalogue());
    println!("> {}", hex::encode(query));
    match TelegramReader::from_bytes(query, TelegramKind::Query, Arc::clone(&catalogue)) {
        Ok(reader) => println!("  {}", reader),
        Err(e) => {
            eprintln!("[ERROR] Invalid telegram: {}", e);
            return Vec::new();
        }
    }

    let reply = pump.process(query);
    if reply.is_empty() {
        eprintln!("[ERROR] The pump did not answer.");
        return reply;
    }
    println!("< {}", hex::encode(&reply));
    if let Ok(reader) = TelegramReader::from_bytes(&reply, TelegramKind::Reply, catalogue) {
        println!("  {}", reader);
    }
    reply
}
