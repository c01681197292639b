//! Interface to lirc chardevs on Linux

use aya::programs::{Link, LircMode2, ProgramError};
use nix::{ioctl_read, ioctl_write_ptr};
use std::{
    fmt,
    fs::{File, OpenOptions},
    io::{self, Error, ErrorKind, Read},
    mem,
    os::{
        fd::BorrowedFd,
        unix::io::{AsFd, AsRawFd, RawFd},
    },
    path::{Path, PathBuf},
};

const LIRC_MAGIC: u8 = b'i';

const LIRC_GET_FEATURES: u8 = 0x00;
const LIRC_SET_REC_MODE: u8 = 0x12;

ioctl_read!(lirc_get_features, LIRC_MAGIC, LIRC_GET_FEATURES, u32);
ioctl_write_ptr!(lirc_set_rec_mode, LIRC_MAGIC, LIRC_SET_REC_MODE, u32);

const LIRC_CAN_REC_MODE2: u32 = 0x00040000;
const LIRC_CAN_REC_SCANCODE: u32 = 0x00080000;

const LIRC_MODE_SCANCODE: u32 = 0x00000008;

/// A lirc chardev like /dev/lirc0
pub struct Lirc {
    path: PathBuf,
    file: File,
    features: u32,
    scancode_mode: bool,
}

pub const LIRC_SCANCODE_FLAG_TOGGLE: u16 = 1;
pub const LIRC_SCANCODE_FLAG_REPEAT: u16 = 2;

#[repr(C)]
#[derive(Debug)]
pub struct LircScancode {
    pub timestamp: u64,
    pub flags: u16,
    pub rc_proto: u16,
    pub keycode: u32,
    pub scancode: u64,
}

/// Open a lirc chardev, which should have a path like "/dev/lirc0"
pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Lirc> {
    lirc_open(path.as_ref())
}

fn lirc_open(path: &Path) -> io::Result<Lirc> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    let mut features = 0u32;

    if let Ok(0) = unsafe { lirc_get_features(file.as_raw_fd(), &mut features) } {
        Ok(Lirc {
            path: PathBuf::from(path),
            file,
            features,
            scancode_mode: false,
        })
    } else {
        Err(Error::new(
            ErrorKind::NotFound,
            String::from("not a lirc device"),
        ))
    }
}

impl Lirc {
    /// Does this lirc device receive raw IR, i.e. can a decoder be attached
    pub fn can_receive_raw(&self) -> bool {
        (self.features & LIRC_CAN_REC_MODE2) != 0
    }

    /// Does this lirc device support receiving in decoded scancode format
    pub fn can_receive_scancodes(&self) -> bool {
        (self.features & (LIRC_CAN_REC_MODE2 | LIRC_CAN_REC_SCANCODE)) != 0
    }

    /// Switch to scancode mode
    pub fn scancode_mode(&mut self) -> io::Result<()> {
        if !self.scancode_mode {
            let mode = LIRC_MODE_SCANCODE;

            unsafe { lirc_set_rec_mode(self.file.as_raw_fd(), &mode)? };

            self.scancode_mode = true;
        }

        Ok(())
    }

    /// Read the decoded IR. If there is nothing to be read, the result vector
    /// will be set to length 0. Otherwise, up to the capacity of result
    /// entries will be read.
    pub fn receive_scancodes(&mut self, result: &mut Vec<LircScancode>) -> io::Result<()> {
        self.scancode_mode()?;

        let length = result.capacity() * mem::size_of::<LircScancode>();
        let data = unsafe { std::slice::from_raw_parts_mut(result.as_ptr() as *mut u8, length) };

        let res = match self.file.read(data) {
            Ok(res) => res,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => 0,
            Err(err) => return Err(err),
        };

        unsafe {
            result.set_len(res / mem::size_of::<LircScancode>());
        }

        Ok(())
    }

    /// Attach a loaded bpf decoder. The program stays attached after this
    /// process exits.
    pub fn attach_bpf(&self, bpf: &mut aya::Bpf) -> Result<(), String> {
        let mut iter = bpf.programs_mut();

        let Some((_, program)) = iter.next() else {
            return Err("missing program".into());
        };

        if iter.next().is_some() {
            return Err("only single program expected".into());
        }

        let program: &mut LircMode2 = match program.try_into() {
            Ok(program) => program,
            Err(e) => {
                return Err(format!("{e}"));
            }
        };

        if let Err(e) = program.load() {
            return Err(format!("{e}"));
        }

        match program.attach(self.as_fd()) {
            Ok(link) => {
                program.take_link(link).unwrap();

                Ok(())
            }
            Err(e) => Err(format!("{e}")),
        }
    }

    /// query bpf programs
    pub fn query_bpf(&self) -> Result<Vec<String>, ProgramError> {
        let links = LircMode2::query(self.as_fd())?;
        let mut res = Vec::new();

        for link in links {
            let info = link.info()?;
            match info.name_as_str() {
                Some(name) => res.push(name.to_owned()),
                None => res.push(format!("{}", info.id())),
            }
        }

        Ok(res)
    }

    /// Remove all attached bpf programs
    pub fn clear_bpf(&self) -> Result<(), ProgramError> {
        let links = LircMode2::query(self.as_fd())?;
        for link in links {
            link.detach()?;
        }
        Ok(())
    }
}

impl AsRawFd for Lirc {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl AsFd for Lirc {
    fn as_fd(&self) -> BorrowedFd {
        self.file.as_fd()
    }
}

impl fmt::Display for Lirc {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "{}", self.path.display())
    }
}
