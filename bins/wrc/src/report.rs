//! Human-readable run output.

use std::io::{self, Write};
use std::time::Duration;
use wrc_core::{Namespace, RunConfig};

/// Device line followed by the run line.
pub fn banner<W: Write>(out: &mut W, ns: &Namespace, config: &RunConfig) -> io::Result<()> {
    writeln!(
        out,
        "{} qc={}/{} qd={}/{} bc={:#x} bs={} nbpio={}/{}",
        ns.device,
        config.queue_count,
        ns.queue_count,
        config.queue_depth,
        ns.max_queue_depth(),
        ns.block_count,
        ns.block_size,
        config.blocks_per_io,
        ns.max_blocks_per_io
    )?;
    writeln!(
        out,
        "{} lba={:#x}-{:#x} pat={:#x} inc={:#x}",
        config.mode.label(),
        config.start_lba,
        config.last_lba(),
        config.pattern,
        config.pattern_increment
    )
}

/// Closing line of a clean run.
pub fn completion<W: Write>(out: &mut W, elapsed: Duration) -> io::Result<()> {
    writeln!(out, "Completion time: {} seconds", elapsed.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wrc_core::{Mode, RunRequest};

    fn ns() -> Namespace {
        Namespace {
            device: "/dev/nvme0n1".to_string(),
            block_size: 512,
            block_count: 0x10_0000,
            queue_count: 64,
            queue_size: 256,
            max_blocks_per_io: 256,
            blocks_per_page: 8,
        }
    }

    fn config() -> RunConfig {
        let mut req = RunRequest::new(Mode::Write, 0xAA);
        req.start_lba = 0x100;
        req.block_count = Some(0x200);
        req.validate(&ns()).unwrap()
    }

    #[test]
    fn test_banner_format() {
        let mut out = Vec::new();
        banner(&mut out, &ns(), &config()).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "/dev/nvme0n1 qc=16/64 qd=64/255 bc=0x100000 bs=512 nbpio=256/256"
        );
        assert_eq!(lines[1], "WRITE lba=0x100-0x2ff pat=0xaa inc=0x0");
    }

    #[test]
    fn test_completion_line() {
        let mut out = Vec::new();
        completion(&mut out, Duration::from_millis(2500)).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Completion time: 2 seconds\n");
    }
}
