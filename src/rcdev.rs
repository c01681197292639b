//! Discover remote controller devices from sysfs on linux, and read or
//! change their IR protocols across both generations of the rc sysfs
//! interface.

use crate::protocols::{self, Protocols, PROTOCOL_MAP};
use std::{
    fs::{self, OpenOptions},
    io::{self, Error, ErrorKind, Write},
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

/// Generation of the rc sysfs interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysfsVersion {
    /// One node per protocol decoder, plus `protocol` and
    /// `supported_protocols` for hardware decoders
    V1,
    /// A single consolidated `protocols` node
    V2,
}

/// How the device decodes IR. Only meaningful on the v1 interface; a v2
/// device may mix hardware and software decoding per protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoder {
    Unknown,
    Software,
    Hardware,
}

/// Single remote controller device on linux
#[derive(Debug)]
pub struct Rcdev {
    /// sysfs directory, e.g. /sys/class/rc/rc0
    pub path: PathBuf,
    /// Name of rc. This is usually "rc" followed by a number
    pub name: String,
    /// Path to the input device. A receiver without one cannot be configured
    pub inputdev: String,
    /// Path to lirc device, if any. The kernel can be compiled without lirc
    /// chardevs
    pub lircdev: Option<String>,
    /// Name of the driver
    pub driver: Option<String>,
    /// Name of the actual device. Human readable
    pub device_name: Option<String>,
    /// Default keymap name for this device
    pub default_keymap: Option<String>,
    pub version: SysfsVersion,
    pub decoder: Decoder,
    /// Protocols the device can decode
    pub supported: Protocols,
    /// Protocols currently enabled
    pub current: Protocols,
}

/// Names of the rc devices attached to the system, sorted
pub fn enumerate_devices() -> io::Result<Vec<String>> {
    let mut names = Vec::new();

    for entry in fs::read_dir("/sys/class/rc")? {
        let entry = entry?;

        if let Some(name) = entry.file_name().to_str() {
            if name.starts_with("rc") {
                names.push(name.to_owned());
            }
        }
    }

    names.sort();

    Ok(names)
}

/// Find one rc device by name, or the first one if no name is given
pub fn find_device(name: Option<&str>) -> io::Result<String> {
    let names = enumerate_devices()?;

    match name {
        Some(name) => {
            if names.iter().any(|n| n == name) {
                Ok(name.to_owned())
            } else {
                Err(Error::new(
                    ErrorKind::NotFound,
                    format!("not found device {name}"),
                ))
            }
        }
        None => names
            .into_iter()
            .next()
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "no devices found")),
    }
}

impl Rcdev {
    pub fn open(name: &str) -> io::Result<Rcdev> {
        Rcdev::from_path(Path::new("/sys/class/rc").join(name))
    }

    /// Read all attributes of the rc device rooted at `path`
    pub fn from_path(path: PathBuf) -> io::Result<Rcdev> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_owned();

        let uevent = read_uevent(&path)?;

        let input = single_subdir(&path, "input")?;
        let event = single_subdir(&input, "event")?;

        let inputdev = match read_uevent(&event)?.devname {
            Some(devname) => format!("/dev/{devname}"),
            None => {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    format!("{}: input device name not found", event.display()),
                ));
            }
        };

        let lircdev = match single_subdir(&path, "lirc") {
            Ok(lirc) => read_uevent(&lirc)?.devname.map(|d| format!("/dev/{d}")),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };

        let mut dev = Rcdev {
            path,
            name,
            inputdev,
            lircdev,
            driver: uevent.drv_name,
            device_name: uevent.dev_name,
            default_keymap: uevent.name,
            version: SysfsVersion::V1,
            decoder: Decoder::Software,
            supported: Protocols::empty(),
            current: Protocols::empty(),
        };

        dev.read_protocols()?;

        Ok(dev)
    }

    /// Classify the sysfs interface generation from the node names present,
    /// and populate the supported and enabled protocol masks from it
    fn read_protocols(&mut self) -> io::Result<()> {
        let protocols = self.path.join("protocols");

        if protocols.exists() {
            self.version = SysfsVersion::V2;
            self.decoder = Decoder::Unknown;

            let line = fs::read_to_string(&protocols)?;
            (self.supported, self.current) = parse_protocols_v2(&line);

            return Ok(());
        }

        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let Some(file_name) = entry.file_name().to_str().map(String::from) else {
                continue;
            };

            if file_name == "protocol" {
                // hardware decoders have no separate enabled state
                self.decoder = Decoder::Hardware;
                self.current = parse_protocol_list(&fs::read_to_string(entry.path())?);
            } else if file_name == "supported_protocols" {
                self.supported = parse_protocol_list(&fs::read_to_string(entry.path())?);
            } else if let Some(pme) = PROTOCOL_MAP
                .iter()
                .find(|pme| pme.sysfs1_name == Some(file_name.as_str()))
            {
                self.supported |= pme.protocols;

                if sw_decoder_enabled(&entry.path())? {
                    self.current |= pme.protocols;
                }
            }
        }

        Ok(())
    }

    /// Enable exactly the protocols in `desired`, using whichever encoding
    /// this device's interface generation wants.
    ///
    /// On v1 the requested mask is silently narrowed to the supported set,
    /// as the original sysfs interface always did; on v2 the kernel
    /// validates the write itself.
    pub fn set_protocols(&mut self, desired: Protocols) -> io::Result<()> {
        if self.version == SysfsVersion::V2 {
            let path = self.path.join("protocols");

            // a read-only protocols node means a device whose protocol is
            // fixed, e.g. cec; don't attempt a write that cannot succeed
            if fs::metadata(&path)?.permissions().mode() & 0o222 == 0 {
                return Err(Error::new(
                    ErrorKind::PermissionDenied,
                    "protocols for device can not be changed",
                ));
            }

            self.current = desired;

            return write_sysfs(&path, &v2_write_string(self.current));
        }

        self.current = desired & self.supported;

        match self.decoder {
            Decoder::Hardware => write_sysfs(
                &self.path.join("protocol"),
                &(protocols::protocol_names(self.current).join(" ") + "\n"),
            ),
            Decoder::Software | Decoder::Unknown => {
                let mut res = Ok(());

                for pme in PROTOCOL_MAP {
                    let Some(sysfs1_name) = pme.sysfs1_name else {
                        continue;
                    };

                    if !self.supported.contains(pme.protocols) {
                        continue;
                    }

                    let path = self.path.join(sysfs1_name).join("enabled");
                    let enabled = if self.current.contains(pme.protocols) {
                        "1"
                    } else {
                        "0"
                    };

                    if let Err(e) = write_sysfs(&path, enabled) {
                        log::warn!("{}: {e}", path.display());
                        res = Err(e);
                    }
                }

                res
            }
        }
    }
}

fn write_sysfs(path: &Path, contents: &str) -> io::Result<()> {
    let mut f = OpenOptions::new().write(true).open(path)?;

    f.write_all(contents.as_bytes())
}

/// Read a software decoder's `enabled` node. An unreadable or malformed node
/// counts as disabled, not as a failure of the whole device.
fn sw_decoder_enabled(dir: &Path) -> io::Result<bool> {
    match fs::read_to_string(dir.join("enabled")) {
        Ok(contents) => Ok(contents.trim() == "1"),
        Err(e) if e.kind() == ErrorKind::NotFound || e.kind() == ErrorKind::PermissionDenied => {
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Parse the v2 `protocols` node: whitespace-separated protocol names, the
/// enabled ones wrapped in square brackets
pub fn parse_protocols_v2(line: &str) -> (Protocols, Protocols) {
    let mut supported = Protocols::empty();
    let mut current = Protocols::empty();

    for token in line.split_whitespace() {
        let (name, enabled) = match token.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            Some(name) => (name, true),
            None => (token, false),
        };

        let protocol = protocols::parse(name, false).unwrap_or(Protocols::OTHER);

        supported |= protocol;
        if enabled {
            current |= protocol;
        }
    }

    (supported, current)
}

/// Parse the v1 `protocol` or `supported_protocols` node: a line of
/// whitespace-separated protocol names
pub fn parse_protocol_list(line: &str) -> Protocols {
    line.split_whitespace()
        .map(|token| protocols::parse(token, false).unwrap_or(Protocols::OTHER))
        .collect()
}

/// Encoding for a v2 `protocols` write: disable everything, then enable one
/// protocol per line
pub fn v2_write_string(mask: Protocols) -> String {
    let mut s = String::from("none\n");

    for name in protocols::protocol_names(mask) {
        s.push('+');
        s.push_str(name);
        s.push('\n');
    }

    s
}

/// The single subdirectory of `path` whose name starts with `prefix`. More
/// than one means a device layout this tool does not support.
fn single_subdir(path: &Path, prefix: &str) -> io::Result<PathBuf> {
    let mut found = None;

    for entry in fs::read_dir(path)? {
        let entry = entry?;

        if let Some(name) = entry.file_name().to_str() {
            if name.starts_with(prefix) {
                if found.is_some() {
                    return Err(Error::new(
                        ErrorKind::Unsupported,
                        format!(
                            "{}: more than one {prefix} interface found",
                            path.display()
                        ),
                    ));
                }

                found = Some(entry.path());
            }
        }
    }

    found.ok_or_else(|| {
        Error::new(
            ErrorKind::NotFound,
            format!("{}: no {prefix}* node found", path.display()),
        )
    })
}

struct UEvent {
    name: Option<String>,
    drv_name: Option<String>,
    dev_name: Option<String>,
    devname: Option<String>,
}

/// Parse a sysfs uevent file. Lines are KEY=value; anything else is skipped.
fn read_uevent(path: &Path) -> io::Result<UEvent> {
    let mut uevent = UEvent {
        name: None,
        drv_name: None,
        dev_name: None,
        devname: None,
    };

    for line in fs::read_to_string(path.join("uevent"))?.lines() {
        match line.split_once('=') {
            Some(("NAME", value)) => uevent.name = Some(value.to_owned()),
            Some(("DRV_NAME", value)) => uevent.drv_name = Some(value.to_owned()),
            Some(("DEV_NAME", value)) => uevent.dev_name = Some(value.to_owned()),
            Some(("DEVNAME", value)) => uevent.devname = Some(value.to_owned()),
            _ => (),
        }
    }

    Ok(uevent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v2_protocols_line() {
        let (supported, current) = parse_protocols_v2("nec rc-5 [rc-6]");

        assert_eq!(supported, Protocols::NEC | Protocols::RC5 | Protocols::RC6);
        assert_eq!(current, Protocols::RC6);

        let (supported, current) = parse_protocols_v2("[lirc] weird-proto [nec]\n");

        assert_eq!(
            supported,
            Protocols::LIRC | Protocols::OTHER | Protocols::NEC
        );
        assert_eq!(current, Protocols::LIRC | Protocols::NEC);

        assert_eq!(parse_protocols_v2(""), (Protocols::empty(), Protocols::empty()));
    }

    #[test]
    fn v1_protocol_list() {
        assert_eq!(
            parse_protocol_list("rc-5 nec\n"),
            Protocols::RC5 | Protocols::NEC
        );
        assert_eq!(parse_protocol_list("bizarre"), Protocols::OTHER);
    }

    #[test]
    fn v2_write_encoding() {
        assert_eq!(v2_write_string(Protocols::NEC), "none\n+nec\n");
        assert_eq!(
            v2_write_string(Protocols::NEC | Protocols::RC5),
            "none\n+rc-5\n+nec\n"
        );
        assert_eq!(v2_write_string(Protocols::empty()), "none\n");
    }

    #[test]
    fn v2_device_from_sysfs_tree() {
        let dev = Rcdev::from_path(PathBuf::from("testdata/sysfs/rc0")).unwrap();

        assert_eq!(dev.name, "rc0");
        assert_eq!(dev.inputdev, "/dev/input/event3");
        assert_eq!(dev.lircdev, Some(String::from("/dev/lirc0")));
        assert_eq!(dev.driver, Some(String::from("ite-cir")));
        assert_eq!(dev.device_name, Some(String::from("ITE8704 CIR transceiver")));
        assert_eq!(dev.default_keymap, Some(String::from("rc-rc6-mce")));
        assert_eq!(dev.version, SysfsVersion::V2);
        assert_eq!(dev.decoder, Decoder::Unknown);
        assert!(dev.supported.contains(Protocols::NEC | Protocols::RC6));
        assert_eq!(dev.current, Protocols::RC6);
    }

    #[test]
    fn v1_software_decoder_from_sysfs_tree() {
        let dev = Rcdev::from_path(PathBuf::from("testdata/sysfs/rc1")).unwrap();

        assert_eq!(dev.version, SysfsVersion::V1);
        assert_eq!(dev.decoder, Decoder::Software);
        assert_eq!(dev.lircdev, None);
        assert_eq!(dev.supported, Protocols::NEC | Protocols::RC5);
        assert_eq!(dev.current, Protocols::NEC);
    }

    #[test]
    fn missing_input_node_is_fatal() {
        let e = Rcdev::from_path(PathBuf::from("testdata/sysfs/rc2")).unwrap_err();

        assert_eq!(e.kind(), ErrorKind::NotFound);
        assert!(e.to_string().contains("no input* node"));
    }
}
