//! Loading and attaching bpf IR decoders to lirc devices. Protocols the
//! kernel has no decoder for ship as compiled bpf objects under the keymap
//! directories; we patch in their parameters and attach them to the raw IR
//! stream.

use crate::{keytable::RawEntry, lirc};
use aya::{maps::Array, BpfLoader};
use nix::sys::resource::{setrlimit, Resource};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Directories searched for compiled bpf decoders, best first
const BPF_PROTOCOL_DIRS: [&str; 2] = [
    "/etc/rc_keymaps/protocols",
    "/lib/udev/rc_keymaps/protocols",
];

/// Locate the compiled bpf object for a protocol name. A name which is
/// itself a path to an existing file is used as-is, anything else is
/// searched for as `<name>.o` in the protocol directories.
pub fn find_bpf_file(name: &str) -> Result<PathBuf, String> {
    if Path::new(name).exists() {
        return Ok(PathBuf::from(name));
    }

    for dir in BPF_PROTOCOL_DIRS {
        let path = Path::new(dir).join(format!("{name}.o"));

        if path.exists() {
            return Ok(path);
        }
    }

    Err(format!(
        "bpf protocol {name} not found in {} or {}",
        BPF_PROTOCOL_DIRS[0], BPF_PROTOCOL_DIRS[1]
    ))
}

/// Load a bpf decoder and attach it to the lirc device. Parameters become
/// global variables of the program; raw keymap entries are fed through the
/// program's raw pattern map when it has one.
pub fn attach(
    lircdev: &lirc::Lirc,
    object: &Path,
    params: &[(String, i64)],
    rawtable: &[RawEntry],
) -> Result<(), String> {
    if !lircdev.can_receive_raw() {
        return Err(format!("{lircdev}: bpf decoding requires raw IR receiver"));
    }

    let data = fs::read(object).map_err(|e| format!("{}: {e}", object.display()))?;

    // The default memlock limit is too small for bpf maps on older kernels;
    // raise it like systemd does for its own programs
    let _ = setrlimit(Resource::RLIMIT_MEMLOCK, 64 * 1024 * 1024, 64 * 1024 * 1024);

    let mut loader = BpfLoader::new();

    let params: Vec<(String, i32)> = params
        .iter()
        .map(|(name, value)| (name.clone(), *value as i32))
        .collect();

    for (name, value) in &params {
        loader.set_global(name, value, true);
    }

    let mut bpf = loader
        .load(&data)
        .map_err(|e| format!("{}: {e}", object.display()))?;

    if let Some(map) = bpf.map_mut("raw_map") {
        match Array::<_, u64>::try_from(map) {
            Ok(mut raw_map) => {
                for (index, entry) in rawtable.iter().enumerate() {
                    if let Err(e) = raw_map.set(index as u32, entry.scancode, 0) {
                        log::warn!("{}: raw_map: {e}", object.display());
                        break;
                    }
                }
            }
            Err(e) => {
                log::warn!("{}: raw_map: {e}", object.display());
            }
        }
    }

    lircdev
        .attach_bpf(&mut bpf)
        .map_err(|e| format!("{}: {e}", object.display()))
}
