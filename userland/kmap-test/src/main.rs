use kernel_hosted::{
    Access, ClientError, HostedConfig, HostedError, HostedKernel, KernelLogger, open,
};
use kernel_info::memory::KMAP_CAPACITY;
use kernel_kmap::{KmapConfig, KmapInitError};
use log::LevelFilter;
use std::borrow::Cow;
use std::env;
use std::io::{self, Write};
use std::process::ExitCode;

const GREETING: &[u8] = b"Hello world\0";

#[derive(Debug, thiserror::Error)]
enum HarnessError {
    #[error("failed to boot the hosted kernel: {0}")]
    Boot(#[from] HostedError),
    #[error("failed to load the driver: {0}")]
    Load(#[from] KmapInitError),
    #[error("Open error on \"{path}\": {source}")]
    Open { path: String, source: ClientError },
    #[error("mmap() failed: {0}")]
    Map(#[source] ClientError),
    #[error("access to the mapping failed: {0}")]
    Access(#[source] ClientError),
    #[error(transparent)]
    Output(#[from] io::Error),
}

fn usage(exe: &str) -> ExitCode {
    println!("Usage: {exe} <mapping device>");
    println!("mapping devices: 1) /dev/kmap");
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    // args: <mapping device>
    let args: Vec<String> = env::args().collect();
    let exe = args.first().map_or("kmap-test", String::as_str);
    if !(2..=3).contains(&args.len()) {
        return usage(exe);
    }

    let level = env::var("KMAP_LOG")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(LevelFilter::Warn);
    if let Err(e) = KernelLogger::new(level).init() {
        eprintln!("logger: {e}");
    }

    match run(&args[1], &mut io::stdout().lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Load the driver, exercise the device at `path`, unload the driver.
fn run(path: &str, out: &mut impl Write) -> Result<(), HarnessError> {
    let kernel = HostedKernel::boot(HostedConfig::default())?;
    let device = kernel.load_driver(KmapConfig::default())?;

    let file = open(&kernel, &device, path).map_err(|source| HarnessError::Open {
        path: path.to_owned(),
        source,
    })?;
    writeln!(out, "DEVICE     = '{path}'")?;

    let map = file
        .mmap(KMAP_CAPACITY, Access::ReadWrite)
        .map_err(HarnessError::Map)?;
    writeln!(out, "DEBUG PTR  = {:p}", map.as_ptr())?;
    writeln!(out, "DEBUG BUF  = {KMAP_CAPACITY}")?;

    // One byte short so the copy always ends in a NUL.
    let mut buffer = vec![0u8; KMAP_CAPACITY];
    map.read(0, &mut buffer[..KMAP_CAPACITY - 1])
        .map_err(HarnessError::Access)?;
    writeln!(out, "READ MMAP  = '{}'", c_str(&buffer))?;

    map.write(0, GREETING).map_err(HarnessError::Access)?;
    buffer.fill(0);
    map.read(0, &mut buffer[..KMAP_CAPACITY - 1])
        .map_err(HarnessError::Access)?;
    writeln!(out, "WRITE MMAP = '{}'", c_str(&buffer))?;

    drop(map);
    drop(file);
    device.shutdown();
    Ok(())
}

/// The bytes before the first NUL.
fn c_str(buf: &[u8]) -> Cow<'_, str> {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c_str_stops_at_nul() {
        assert_eq!(c_str(b"Hello world\x00012"), "Hello world");
        assert_eq!(c_str(b"0123"), "0123");
    }

    #[test]
    fn transcript() {
        let mut out = Vec::new();
        run("/dev/kmap", &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines[0], "DEVICE     = '/dev/kmap'");
        let read = lines[3]
            .strip_prefix("READ MMAP  = '")
            .and_then(|r| r.strip_suffix('\''))
            .unwrap();
        assert_eq!(read.len(), KMAP_CAPACITY - 1);
        assert!(read.starts_with("01234567890123"));
        assert_eq!(lines[4], "WRITE MMAP = 'Hello world'");
    }

    #[test]
    fn wrong_device_fails_to_open() {
        let err = run("/dev/vmap", &mut io::sink()).unwrap_err();
        assert!(matches!(err, HarnessError::Open { .. }));
    }
}
