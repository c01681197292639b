use evdev::Key;
use ir_keytable::{
    input::InputDev,
    lirc::{self, LircScancode, LIRC_SCANCODE_FLAG_REPEAT, LIRC_SCANCODE_FLAG_TOGGLE},
    protocols::lirc_protocol_name,
    rcdev::Rcdev,
};
use nix::{
    errno::Errno,
    poll::{poll, PollFd, PollFlags, PollTimeout},
};
use std::os::fd::AsFd;

const EV_SYN: u16 = 0x00;
const EV_KEY: u16 = 0x01;
const EV_REL: u16 = 0x02;
const EV_ABS: u16 = 0x03;
const EV_MSC: u16 = 0x04;
const EV_REP: u16 = 0x14;

const MSC_SCAN: u16 = 0x04;

/// Print decoded scancodes and input events until interrupted
pub fn test(rcdev: &Rcdev, inputdev: &mut InputDev) {
    // lirc reports time on the monotonic clock; have evdev do the same
    let _ = inputdev.clock_monotonic();

    let mut lircdev = rcdev.lircdev.as_ref().and_then(|path| {
        match lirc::open(path) {
            Ok(mut lirc) => {
                // no scancode mode means the kernel is too old; the input
                // events still show the decoded keys
                if lirc.can_receive_scancodes() && lirc.scancode_mode().is_ok() {
                    Some(lirc)
                } else {
                    None
                }
            }
            Err(e) => {
                eprintln!("error: {path}: {e}");
                None
            }
        }
    });

    println!("Testing events. Please, press CTRL-C to abort.");

    let mut events: Vec<libc::input_event> = Vec::with_capacity(64);
    let mut scancodes: Vec<LircScancode> = Vec::with_capacity(64);

    loop {
        let (input_ready, lirc_ready) = {
            let mut fds = vec![PollFd::new(inputdev.as_fd(), PollFlags::POLLIN)];

            if let Some(lirc) = &lircdev {
                fds.push(PollFd::new(lirc.as_fd(), PollFlags::POLLIN));
            }

            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => (),
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    eprintln!("error: poll: {e}");
                    return;
                }
            }

            let ready = |fd: Option<&PollFd>| {
                fd.and_then(|fd| fd.revents())
                    .is_some_and(|revents| revents.contains(PollFlags::POLLIN))
            };

            (ready(fds.first()), ready(fds.get(1)))
        };

        if lirc_ready {
            if let Some(lirc) = &mut lircdev {
                match lirc.receive_scancodes(&mut scancodes) {
                    Ok(()) => print_scancodes(&scancodes),
                    Err(e) => {
                        eprintln!("error: reading lirc scancode: {e}");
                        return;
                    }
                }
            }
        }

        if input_ready {
            match inputdev.read_events(&mut events) {
                Ok(()) => print_events(&events),
                Err(e) => {
                    eprintln!("error: reading event: {e}");
                    return;
                }
            }
        }
    }
}

fn print_scancodes(scancodes: &[LircScancode]) {
    for sc in scancodes {
        print!(
            "{}.{:06}: ",
            sc.timestamp / 1_000_000_000,
            (sc.timestamp % 1_000_000_000) / 1_000
        );

        match lirc_protocol_name(sc.rc_proto) {
            Some(name) => print!("lirc protocol({name}): scancode = 0x{:x}", sc.scancode),
            None => print!(
                "lirc protocol({}): scancode = 0x{:x}",
                sc.rc_proto, sc.scancode
            ),
        }

        if (sc.flags & LIRC_SCANCODE_FLAG_REPEAT) != 0 {
            print!(" repeat");
        }

        if (sc.flags & LIRC_SCANCODE_FLAG_TOGGLE) != 0 {
            print!(" toggle=1");
        }

        println!();
    }
}

fn print_events(events: &[libc::input_event]) {
    for ev in events {
        print!(
            "{}.{:06}: event type {}(0x{:02x})",
            ev.time.tv_sec,
            ev.time.tv_usec,
            event_type_name(ev.type_),
            ev.type_
        );

        match ev.type_ {
            EV_SYN => println!("."),
            EV_KEY => println!(
                " key_{}: {:?}(0x{:04x})",
                if ev.value == 0 { "up" } else { "down" },
                Key::new(ev.code),
                ev.code
            ),
            EV_MSC if ev.code == MSC_SCAN => println!(": scancode = 0x{:02x}", ev.value),
            EV_REP => println!(": value = {}", ev.value),
            _ => println!(": code = 0x{:02x}, value = {}", ev.code, ev.value),
        }
    }
}

fn event_type_name(event_type: u16) -> &'static str {
    match event_type {
        EV_SYN => "EV_SYN",
        EV_KEY => "EV_KEY",
        EV_REL => "EV_REL",
        EV_ABS => "EV_ABS",
        EV_MSC => "EV_MSC",
        EV_REP => "EV_REP",
        _ => "EV_UNKNOWN",
    }
}
