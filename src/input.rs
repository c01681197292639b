//! Interface to evdev input chardevs on Linux. The scancode ioctls come in
//! two generations: the original 32-bit scancode/keycode pair, and the
//! input_keymap_entry record added in input protocol 1.0.1 which carries
//! variable-length scancodes and index-based access.

use nix::{ioctl_read, ioctl_read_buf, ioctl_write_ptr};
use std::{
    fs::{File, OpenOptions},
    io, mem,
    os::{
        fd::BorrowedFd,
        unix::{
            fs::OpenOptionsExt,
            io::{AsFd, AsRawFd, RawFd},
        },
    },
    path::{Path, PathBuf},
};

const EV_MAGIC: u8 = b'E';

pub const KEY_RESERVED: u32 = 0;

/// input_keymap_entry from linux/input.h
#[repr(C)]
#[derive(Clone, Copy)]
pub struct InputKeymapEntry {
    pub flags: u8,
    pub len: u8,
    pub index: u16,
    pub keycode: u32,
    pub scancode: [u8; 32],
}

pub const KEYMAP_BY_INDEX: u8 = 1 << 0;

/// input_id from linux/input.h
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct InputId {
    pub bustype: u16,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
}

ioctl_read!(eviocgversion, EV_MAGIC, 0x01, libc::c_int);
ioctl_read!(eviocgid, EV_MAGIC, 0x02, InputId);
ioctl_read!(eviocgrep, EV_MAGIC, 0x03, [u32; 2]);
ioctl_write_ptr!(eviocsrep, EV_MAGIC, 0x03, [u32; 2]);
ioctl_read!(eviocgkeycode, EV_MAGIC, 0x04, [u32; 2]);
ioctl_write_ptr!(eviocskeycode, EV_MAGIC, 0x04, [u32; 2]);
ioctl_read!(eviocgkeycode_v2, EV_MAGIC, 0x04, InputKeymapEntry);
ioctl_write_ptr!(eviocskeycode_v2, EV_MAGIC, 0x04, InputKeymapEntry);
ioctl_read_buf!(eviocgname, EV_MAGIC, 0x06, u8);
ioctl_write_ptr!(eviocsclockid, EV_MAGIC, 0xa0, libc::c_int);

/// Which scancode ioctl encoding the kernel speaks. Probed once per device
/// and threaded through every keytable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeycodeIoctl {
    /// 32-bit scancode/keycode pairs, table enumerated by scancode
    Legacy,
    /// input_keymap_entry records, variable-length scancodes, index access
    Indexed,
}

/// An evdev input chardev
pub struct InputDev {
    path: PathBuf,
    file: File,
    /// EVIOCGVERSION input protocol version
    pub version: u32,
}

impl InputDev {
    /// Open the input chardev and probe the input protocol version, which
    /// decides the scancode ioctl encoding for the rest of the run
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<InputDev> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)?;

        let mut version = 0 as libc::c_int;

        unsafe { eviocgversion(file.as_raw_fd(), &mut version)? };

        Ok(InputDev {
            path: PathBuf::from(path),
            file,
            version: version as u32,
        })
    }

    pub fn keycode_ioctl(&self) -> KeycodeIoctl {
        if self.version >= 0x10001 {
            KeycodeIoctl::Indexed
        } else {
            KeycodeIoctl::Legacy
        }
    }

    /// Remove all scancode mappings. The legacy interface has no way to
    /// enumerate or delete entries, so every possible 16-bit scancode is set
    /// to KEY_RESERVED; the indexed interface deletes entry 0 until the
    /// kernel reports the table is empty.
    pub fn clear_keytable(&self) {
        match self.keycode_ioctl() {
            KeycodeIoctl::Legacy => {
                for scancode in 0u32..0x10000 {
                    let codes = [scancode, KEY_RESERVED];

                    let _ = unsafe { eviocskeycode(self.file.as_raw_fd(), &codes) };
                }
            }
            KeycodeIoctl::Indexed => loop {
                let entry = InputKeymapEntry {
                    flags: KEYMAP_BY_INDEX,
                    len: 0,
                    index: 0,
                    keycode: KEY_RESERVED,
                    scancode: [0u8; 32],
                };

                if unsafe { eviocskeycode_v2(self.file.as_raw_fd(), &entry) }.is_err() {
                    break;
                }
            },
        }
    }

    /// Set one scancode mapping. A scancode which does not fit in 32 bits
    /// must take the indexed record whatever the probed generation; the
    /// legacy pair cannot represent it.
    pub fn set_keycode(&self, scancode: u64, keycode: u32) -> io::Result<()> {
        if self.keycode_ioctl() == KeycodeIoctl::Legacy && u32::try_from(scancode).is_ok() {
            let codes = [scancode as u32, keycode];

            unsafe { eviocskeycode(self.file.as_raw_fd(), &codes)? };
        } else {
            let entry = keymap_entry(scancode, keycode);

            unsafe { eviocskeycode_v2(self.file.as_raw_fd(), &entry)? };
        }

        Ok(())
    }

    /// Read the whole scancode table back. The legacy interface is scanned
    /// over the full 16-bit scancode space; the indexed interface is walked
    /// by index until the kernel runs out of entries.
    pub fn read_keytable(&self) -> Vec<(u64, u32)> {
        let mut table = Vec::new();

        match self.keycode_ioctl() {
            KeycodeIoctl::Legacy => {
                for scancode in 0u32..0x10000 {
                    let mut codes = [scancode, 0];

                    if unsafe { eviocgkeycode(self.file.as_raw_fd(), &mut codes) }.is_err() {
                        continue;
                    }

                    if codes[1] != KEY_RESERVED {
                        table.push((u64::from(scancode), codes[1]));
                    }
                }
            }
            KeycodeIoctl::Indexed => {
                for index in 0..u16::MAX {
                    let mut entry = InputKeymapEntry {
                        flags: KEYMAP_BY_INDEX,
                        len: mem::size_of::<u64>() as u8,
                        index,
                        keycode: 0,
                        scancode: [0u8; 32],
                    };

                    if unsafe { eviocgkeycode_v2(self.file.as_raw_fd(), &mut entry) }.is_err() {
                        break;
                    }

                    match entry_scancode(&entry) {
                        Some(scancode) => table.push((scancode, entry.keycode)),
                        None => {
                            log::warn!(
                                "{}: unknown scancode length {}",
                                self.path.display(),
                                entry.len
                            );
                        }
                    }
                }
            }
        }

        table
    }

    /// Repeat delay and period in milliseconds
    pub fn get_repeat(&self) -> io::Result<(u32, u32)> {
        let mut rep = [0u32; 2];

        unsafe { eviocgrep(self.file.as_raw_fd(), &mut rep)? };

        Ok((rep[0], rep[1]))
    }

    pub fn set_repeat(&self, delay: u32, period: u32) -> io::Result<()> {
        let rep = [delay, period];

        unsafe { eviocsrep(self.file.as_raw_fd(), &rep)? };

        Ok(())
    }

    pub fn name(&self) -> io::Result<String> {
        let mut buf = [0u8; 128];

        let len = unsafe { eviocgname(self.file.as_raw_fd(), &mut buf)? };

        let len = buf[..len as usize]
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(len as usize);

        Ok(String::from_utf8_lossy(&buf[..len]).into_owned())
    }

    pub fn input_id(&self) -> io::Result<InputId> {
        let mut id = InputId::default();

        unsafe { eviocgid(self.file.as_raw_fd(), &mut id)? };

        Ok(id)
    }

    /// Ask for event timestamps on the monotonic clock, like lirc uses
    pub fn clock_monotonic(&self) -> io::Result<()> {
        let clock = libc::CLOCK_MONOTONIC;

        unsafe { eviocsclockid(self.file.as_raw_fd(), &clock)? };

        Ok(())
    }

    /// Read pending input events. Returns an empty vector when nothing is
    /// ready on a non-blocking device.
    pub fn read_events(&mut self, result: &mut Vec<libc::input_event>) -> io::Result<()> {
        use std::io::Read;

        let length = result.capacity() * mem::size_of::<libc::input_event>();
        let data = unsafe { std::slice::from_raw_parts_mut(result.as_ptr() as *mut u8, length) };

        let res = match self.file.read(data) {
            Ok(res) => res,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => 0,
            Err(err) => return Err(err),
        };

        unsafe { result.set_len(res / mem::size_of::<libc::input_event>()) };

        Ok(())
    }
}

impl AsRawFd for InputDev {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl AsFd for InputDev {
    fn as_fd(&self) -> BorrowedFd {
        self.file.as_fd()
    }
}

impl std::fmt::Display for InputDev {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        write!(f, "{}", self.path.display())
    }
}

/// Build an input_keymap_entry for a scancode-keyed write. Scancodes which
/// fit in 32 bits are sent as 4 bytes; kernels from before v5.7 reject
/// 8-byte scancodes.
fn keymap_entry(scancode: u64, keycode: u32) -> InputKeymapEntry {
    let mut entry = InputKeymapEntry {
        flags: 0,
        len: 0,
        index: 0,
        keycode,
        scancode: [0u8; 32],
    };

    if let Ok(scancode) = u32::try_from(scancode) {
        entry.len = mem::size_of::<u32>() as u8;
        entry.scancode[..4].copy_from_slice(&scancode.to_ne_bytes());
    } else {
        entry.len = mem::size_of::<u64>() as u8;
        entry.scancode[..8].copy_from_slice(&scancode.to_ne_bytes());
    }

    entry
}

/// Decode the scancode of an entry the kernel filled in; the length tells
/// the scancode width
fn entry_scancode(entry: &InputKeymapEntry) -> Option<u64> {
    match usize::from(entry.len) {
        4 => Some(u32::from_ne_bytes(entry.scancode[..4].try_into().unwrap()).into()),
        8 => Some(u64::from_ne_bytes(entry.scancode[..8].try_into().unwrap())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_scancodes_use_four_bytes() {
        let entry = keymap_entry(0x1e3b, 0x161);

        assert_eq!(entry.len, 4);
        assert_eq!(entry.keycode, 0x161);
        assert_eq!(entry_scancode(&entry), Some(0x1e3b));
    }

    #[test]
    fn large_scancodes_use_eight_bytes() {
        let entry = keymap_entry(0x800f_0400_1234, 116);

        assert_eq!(entry.len, 8);
        assert_eq!(entry_scancode(&entry), Some(0x800f_0400_1234));
    }

    #[test]
    fn unknown_scancode_length() {
        let mut entry = keymap_entry(1, 1);
        entry.len = 3;

        assert_eq!(entry_scancode(&entry), None);
    }
}
