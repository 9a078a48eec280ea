// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Artifact writers: raw chain, Intel HEX image, label listing.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::core::assembler::error::{AsmError, AsmErrorKind, AsmRunError};

const HEX_LINE_LIMIT: usize = 32;

fn io_run_error(what: &str, path: &Path, err: io::Error) -> AsmRunError {
    AsmRunError::new(
        AsmError::new(
            AsmErrorKind::Io,
            &format!("Error writing {what}: {err}"),
            Some(path.to_string_lossy().as_ref()),
        ),
        Vec::new(),
        Vec::new(),
    )
}

/// Create `path` for writing, creating missing parent directories first.
fn create_output(path: &Path) -> io::Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(BufWriter::new(File::create(path)?))
}

pub(super) fn emit_binary(path: &Path, bytes: &[u8]) -> Result<(), AsmRunError> {
    create_output(path)
        .and_then(|mut out| {
            out.write_all(bytes)?;
            out.flush()
        })
        .map_err(|err| io_run_error("output file", path, err))
}

pub(super) fn emit_hex(path: &Path, base: u32, bytes: &[u8]) -> Result<(), AsmRunError> {
    create_output(path)
        .and_then(|mut out| {
            write_intel_hex(&mut out, base, bytes)?;
            out.flush()
        })
        .map_err(|err| io_run_error("hex file", path, err))
}

pub(super) fn emit_labels(path: &Path, labels: &[(String, u32)]) -> Result<(), AsmRunError> {
    create_output(path)
        .and_then(|mut out| {
            write_labels(&mut out, labels)?;
            out.flush()
        })
        .map_err(|err| io_run_error("labels file", path, err))
}

/// Write `NAME = $XXXXXXXX` lines.
pub fn write_labels<W: Write>(mut out: W, labels: &[(String, u32)]) -> io::Result<()> {
    for (name, address) in labels {
        writeln!(out, "{name} = ${address:08X}")?;
    }
    Ok(())
}

/// Write `bytes` as an Intel HEX image whose first byte lives at `base`.
///
/// Records hold at most 32 bytes and never cross a 64 KiB boundary; an
/// extended linear address record precedes every segment above the first.
pub fn write_intel_hex<W: Write>(mut out: W, base: u32, bytes: &[u8]) -> io::Result<()> {
    let span = u64::from(base) + bytes.len() as u64;
    if span > 1u64 << 32 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Chain exceeds the 32-bit address space of Intel HEX",
        ));
    }

    let mut current_ela: Option<u16> = None;
    let mut offset = 0usize;
    while offset < bytes.len() {
        let addr = base + offset as u32;
        let ela = (addr >> 16) as u16;
        if current_ela != Some(ela) {
            if ela != 0 || current_ela.is_some() {
                write_extended_linear_address_record(&mut out, ela)?;
            }
            current_ela = Some(ela);
        }

        let line_addr = (addr & 0xffff) as u16;
        let to_boundary = 0x1_0000 - usize::from(line_addr);
        let len = HEX_LINE_LIMIT
            .min(bytes.len() - offset)
            .min(to_boundary);
        let chunk = &bytes[offset..offset + len];

        let mut checksum: u8 = len as u8;
        checksum = checksum.wrapping_add((line_addr >> 8) as u8);
        checksum = checksum.wrapping_add((line_addr & 0xff) as u8);
        let mut hex_data = String::with_capacity(len * 2);
        for &val in chunk {
            hex_data.push(hex_digit((val >> 4) & 0x0f));
            hex_data.push(hex_digit(val & 0x0f));
            checksum = checksum.wrapping_add(val);
        }
        checksum = (!checksum).wrapping_add(1);
        writeln!(out, ":{:02X}{:04X}00{}{:02X}", len, line_addr, hex_data, checksum)?;
        offset += len;
    }

    writeln!(out, ":00000001FF")?;
    Ok(())
}

fn hex_digit(val: u8) -> char {
    match val {
        0..=9 => (b'0' + val) as char,
        _ => (b'A' + (val - 10)) as char,
    }
}

fn write_extended_linear_address_record<W: Write>(out: &mut W, upper: u16) -> io::Result<()> {
    let mut csum: u8 = 0;
    csum = csum.wrapping_add(2); // length
    csum = csum.wrapping_add(4); // record type 04
    csum = csum.wrapping_add((upper >> 8) as u8);
    csum = csum.wrapping_add((upper & 0xff) as u8);
    csum = (!csum).wrapping_add(1);
    writeln!(out, ":02000004{:04X}{:02X}", upper, csum)
}
