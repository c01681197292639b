use evdev::Key;
use ir_keytable::{
    bpf,
    input::InputDev,
    keymap::Keymap,
    keytable::{parse_params, BpfProtocol, Keytable},
    lirc,
    protocols::{self, protocol_names},
    rc_maps::{keymap_to_filename, parse_rc_maps_file},
    rcdev::{self, Decoder, Rcdev},
};
use std::process::exit;

pub fn keytable(args: &crate::App) {
    let mut table = Keytable::new();

    for arg in &args.parameter {
        match parse_params(arg) {
            Ok(params) => table.params.extend(params),
            Err(e) => {
                eprintln!("error: {e}");
                exit(1);
            }
        }
    }

    // Validate a keymap without a device; used by the keymap test suite
    if let Some(path) = &args.test_keymap {
        merge_keymap_file(&mut table, path);
        return;
    }

    for path in &args.write {
        merge_keymap_file(&mut table, path);
    }

    for arg in &args.set_key {
        if let Err(e) = table.merge_inline(arg) {
            eprintln!("error: {e}");
            exit(1);
        }
    }

    for name in &args.protocol {
        match protocols::parse(name, true) {
            Some(protocols) => table.protocols |= protocols,
            // not a kernel decoder; try a bpf decoder of that name
            None => table.add_bpf_protocol(BpfProtocol {
                name: name.clone(),
                param: Vec::new(),
            }),
        }
    }

    let no_action = !args.clear
        && !args.read
        && !args.test
        && args.write.is_empty()
        && args.set_key.is_empty()
        && args.protocol.is_empty()
        && args.auto_load.is_none()
        && args.delay.is_none()
        && args.period.is_none();

    if no_action {
        list_devices(args.sysdev.as_deref());
        return;
    }

    if args.auto_load.is_some()
        && (args.clear
            || !args.write.is_empty()
            || !args.set_key.is_empty()
            || !args.protocol.is_empty())
    {
        eprintln!("error: auto-load can only be combined with --read, --verbose and --sysdev");
        exit(1);
    }

    let name = match rcdev::find_device(Some(args.sysdev.as_deref().unwrap_or("rc0"))) {
        Ok(name) => name,
        Err(e) => {
            eprintln!("error: {e}");
            exit(1);
        }
    };

    let mut rcdev = match Rcdev::open(&name) {
        Ok(rcdev) => rcdev,
        Err(e) => {
            eprintln!("error: {name}: {e}");
            exit(1);
        }
    };

    let mut clear = args.clear;

    if let Some(cfg) = &args.auto_load {
        let rules = match parse_rc_maps_file(cfg) {
            Ok(rules) => rules,
            Err(e) => {
                eprintln!("error: {e}");
                exit(1);
            }
        };

        let mut matches = 0;

        for rule in rules
            .iter()
            .filter(|r| r.matches(rcdev.driver.as_deref(), rcdev.default_keymap.as_deref()))
        {
            log::debug!(
                "keymap for {}, {} is in {}",
                rcdev.driver.as_deref().unwrap_or("?"),
                rcdev.default_keymap.as_deref().unwrap_or("?"),
                rule.file
            );

            let path = match keymap_to_filename(&rule.file) {
                Ok(path) => path,
                Err(e) => {
                    eprintln!("error: {e}");
                    exit(1);
                }
            };

            merge_keymap_file(&mut table, &path);

            // a matched keymap replaces the table, it does not add to it
            clear = true;
            matches += 1;
        }

        if matches == 0 {
            log::debug!("no keymap for {} found, keeping as-is", rcdev.name);
            return;
        }
    }

    let mut inputdev = match InputDev::open(&rcdev.inputdev) {
        Ok(inputdev) => inputdev,
        Err(e) => {
            eprintln!("error: {}: {e}", rcdev.inputdev);
            exit(1);
        }
    };

    log::debug!("input protocol version 0x{:08x}", inputdev.version);

    if clear {
        inputdev.clear_keytable();
        println!("Old keytable cleared");
    }

    // every entry counts as written, even if its ioctl fails; the failure
    // has its own diagnostic
    let write_cnt = table.entries.len();

    for entry in &table.entries {
        log::debug!("\t{:04x}={:04x}", entry.scancode, entry.keycode);

        if let Err(e) = inputdev.set_keycode(entry.scancode, entry.keycode) {
            eprintln!(
                "error: setting scancode 0x{:04x} with 0x{:04x}: {e}",
                entry.scancode, entry.keycode
            );
        }
    }

    if write_cnt > 0 {
        println!("Wrote {write_cnt} keycode(s) to driver");
    }

    if !table.protocols.is_empty() || !table.bpf.is_empty() {
        // bpf decoders from a previous load would decode alongside the new
        // protocols
        if let Some(lircdev) = &rcdev.lircdev {
            match lirc::open(lircdev) {
                Ok(lirc) => {
                    if let Err(e) = lirc.clear_bpf() {
                        log::warn!("{lircdev}: {e}");
                    }
                }
                Err(e) => log::warn!("{lircdev}: {e}"),
            }
        }

        let requested = table.bpf_for_unsupported(table.protocols, rcdev.supported);

        match rcdev.set_protocols(requested) {
            Ok(()) => println!(
                "Protocols changed to {}",
                protocol_names(rcdev.current).join(" ")
            ),
            Err(e) => eprintln!("error: {e}"),
        }

        if !table.bpf.is_empty() {
            match &rcdev.lircdev {
                Some(lircdev) => attach_bpf(&table, lircdev),
                None => eprintln!(
                    "error: unable to attach bpf program, lirc device name was not found"
                ),
            }
        }
    }

    if args.read {
        for (scancode, keycode) in inputdev.read_keytable() {
            match u16::try_from(keycode) {
                Ok(code) => {
                    println!("scancode 0x{scancode:04x} = {:?} (0x{keycode:02x})", Key::new(code))
                }
                Err(_) => println!("scancode 0x{scancode:04x} = 0x{keycode:02x}"),
            }
        }

        display_proto(&rcdev);
    }

    if args.delay.is_some() || args.period.is_some() {
        match inputdev.get_repeat() {
            Ok((mut delay, mut period)) => {
                if let Some(arg) = args.delay {
                    delay = arg;
                }

                if let Some(arg) = args.period {
                    period = arg;
                }

                match inputdev.set_repeat(delay, period) {
                    Ok(()) => println!(
                        "Changed repeat delay to {delay} ms and repeat period to {period} ms"
                    ),
                    Err(e) => eprintln!("error: {}: {e}", rcdev.inputdev),
                }
            }
            Err(e) => eprintln!("error: {}: {e}", rcdev.inputdev),
        }
    }

    if args.test {
        super::test::test(&rcdev, &mut inputdev);
    }
}

/// Parse one keymap file and merge every protocol section into the table;
/// a file which does not parse fails the invocation
fn merge_keymap_file(table: &mut Keytable, path: &std::path::Path) {
    match Keymap::parse_file(path) {
        Ok(keymaps) => {
            let filename = path.display().to_string();

            for keymap in &keymaps {
                table.merge(keymap, &filename);
            }
        }
        Err(e) => {
            eprintln!("error: {e}");
            exit(1);
        }
    }
}

fn attach_bpf(table: &Keytable, lircdev: &str) {
    let lirc = match lirc::open(lircdev) {
        Ok(lirc) => lirc,
        Err(e) => {
            eprintln!("error: {lircdev}: {e}");
            return;
        }
    };

    for protocol in &table.bpf {
        let object = match bpf::find_bpf_file(&protocol.name) {
            Ok(object) => object,
            Err(e) => {
                eprintln!("error: {e}");
                continue;
            }
        };

        match bpf::attach(&lirc, &object, &table.merged_params(protocol), &table.raw) {
            Ok(()) => println!("Loaded BPF protocol {}", protocol.name),
            Err(e) => eprintln!("error: {e}"),
        }
    }
}

fn display_proto(rcdev: &Rcdev) {
    let what = match rcdev.decoder {
        Decoder::Hardware => "Current kernel protocols",
        _ => "Enabled kernel protocols",
    };

    println!("{what}: {}", protocol_names(rcdev.current).join(" "));
}

/// List every rc device, or just the named one
fn list_devices(name: Option<&str>) {
    let names = match name {
        Some(name) => vec![name.to_owned()],
        None => match rcdev::enumerate_devices() {
            Ok(names) if !names.is_empty() => names,
            Ok(_) => {
                eprintln!("error: no devices found");
                exit(1);
            }
            Err(e) => {
                eprintln!("error: /sys/class/rc: {e}");
                exit(1);
            }
        },
    };

    for name in names {
        let rcdev = match Rcdev::open(&name) {
            Ok(rcdev) => rcdev,
            Err(e) => {
                log::warn!("{name}: {e}");
                continue;
            }
        };

        println!("Found {} with:", rcdev.path.display());

        if let Some(device_name) = &rcdev.device_name {
            println!("\tName: {device_name}");
        }

        if let Some(driver) = &rcdev.driver {
            println!("\tDriver: {driver}");
        }

        if let Some(default_keymap) = &rcdev.default_keymap {
            println!("\tDefault keymap: {default_keymap}");
        }

        println!("\tInput device: {}", rcdev.inputdev);

        if let Some(lircdev) = &rcdev.lircdev {
            println!("\tLIRC device: {lircdev}");

            if let Ok(lirc) = lirc::open(lircdev) {
                match lirc.query_bpf() {
                    Ok(progs) => println!("\tAttached BPF protocols: {}", progs.join(" ")),
                    Err(e) => log::debug!("{lircdev}: {e}"),
                }
            }
        }

        println!(
            "\tSupported kernel protocols: {}",
            protocol_names(rcdev.supported).join(" ")
        );
        display_proto(&rcdev);

        match InputDev::open(&rcdev.inputdev) {
            Ok(inputdev) => {
                if rcdev.device_name.is_none() {
                    if let Ok(name) = inputdev.name() {
                        println!("\tName: {name}");
                    }
                }

                if let Ok(id) = inputdev.input_id() {
                    println!(
                        "\tbus: {}, vendor/product: {:04x}:{:04x}, version: 0x{:04x}",
                        id.bustype, id.vendor, id.product, id.version
                    );
                }

                if let Ok((delay, period)) = inputdev.get_repeat() {
                    println!("\tRepeat delay = {delay} ms, repeat period = {period} ms");
                }
            }
            Err(_) => println!("\tExtra capabilities: <access denied>"),
        }
    }
}
