pub mod keytable;
pub mod test;
