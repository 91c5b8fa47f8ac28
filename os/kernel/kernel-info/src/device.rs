//! # Device Node

/// Name of the character device (and of its class and node).
pub const DEVICE_NAME: &str = "kmap";

/// Directory under which device nodes are published.
pub const DEVICE_DIR: &str = "/dev";

/// Minor number of the single device node.
pub const DEVICE_MINOR: u32 = 0;

/// Deterministic initial content, tiled across the whole buffer.
pub const FILL_PATTERN: &[u8] = b"0123456789";

const _: () = assert!(!FILL_PATTERN.is_empty());
