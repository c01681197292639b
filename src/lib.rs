pub mod bpf;
pub mod input;
pub mod keymap;
pub mod keytable;
pub mod lirc;
pub mod protocols;
pub mod rc_maps;
pub mod rcdev;
