//! Process exit codes.

pub const SUCCESS: u8 = 0;
pub const GENERAL_ERROR: u8 = 1;
pub const NOT_FOUND: u8 = 3;
pub const PERMISSION_DENIED: u8 = 4;
pub const ADDRESS_IN_USE: u8 = 5;
