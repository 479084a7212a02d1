/// Board identity, selected at compile time via feature flags.

#[cfg(feature = "board-xiao")]
mod hw {
    pub const BOARD_NAME: &str = "xiao_esp32s3";
}

#[cfg(all(feature = "board-m5stickc", not(feature = "board-xiao")))]
mod hw {
    pub const BOARD_NAME: &str = "m5stickc_plus2";
}

#[cfg(not(any(feature = "board-xiao", feature = "board-m5stickc")))]
mod hw {
    pub const BOARD_NAME: &str = "unknown";
}

pub use hw::*;
