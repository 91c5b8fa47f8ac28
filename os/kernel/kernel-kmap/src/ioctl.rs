//! Control requests.
//!
//! The device defines no control commands. Every request is acknowledged and
//! reported successful without looking at its arguments.

/// Acknowledge a control request.
#[must_use]
pub fn handle_ioctl(cmd: u32, arg: u64) -> i64 {
    log::info!("unlocked ioctl (cmd {cmd:#x}, arg {arg:#x})");
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_command_succeeds() {
        for cmd in [0, 1, 0x4008_6b01, u32::MAX] {
            assert_eq!(handle_ioctl(cmd, 0xdead_beef), 0);
        }
    }
}
