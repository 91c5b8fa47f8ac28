use std::io;

/// The hosted platform could not be brought up.
#[derive(Debug, thiserror::Error)]
pub enum HostedError {
    #[error("physical memory needs at least one frame")]
    NoFrames,
    #[error("physical memory of {frames} frames does not fit the address space")]
    TooLarge { frames: u64 },
    #[error("failed to create the physical memory file")]
    MemfdCreate(#[source] io::Error),
    #[error("failed to size the physical memory file to {len} bytes")]
    Resize {
        len: u64,
        #[source]
        source: io::Error,
    },
    #[error("failed to map physical memory into the direct map")]
    DirectMap(#[source] io::Error),
}
