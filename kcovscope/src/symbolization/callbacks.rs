//! Coverage callback discovery
//!
//! Every basic block instrumented with `-fsanitize-coverage=trace-pc` calls
//! [`TRACE_PC`]. The call sites are the set of PCs kcov can ever report, so
//! they are the denominator of every coverage figure.
//!
//! Linked images are disassembled and searched for direct calls to the
//! callback. Relocatable modules (and images linked with `--emit-relocs`)
//! carry a relocation per call site instead, which is both cheaper and exact.

use crate::targets::Arch;
use capstone::arch::arm64::{self, Arm64OperandType};
use capstone::arch::x86::{self, X86OperandType};
use capstone::arch::{riscv, ArchOperand};
use capstone::prelude::*;
use capstone::Instructions;
use log::{debug, warn};
use object::{Object, ObjectSection, ObjectSymbol, RelocationFlags, RelocationTarget, SectionKind};
use std::collections::HashSet;

use super::elf::{is_relocatable, symbol_addresses};

/// Symbol the compiler emits a call to at the start of every basic block
pub const TRACE_PC: &str = "__sanitizer_cov_trace_pc";

/// Link-time addresses of every call to [`TRACE_PC`], sorted and deduplicated
#[must_use]
pub fn find_callback_pcs(arch: Arch, obj: &object::File<'_>) -> Vec<u64> {
    let mut pcs = if is_relocatable(obj) {
        relocation_call_sites(arch, obj)
    } else {
        let scanned = scan_call_sites(arch, obj);
        if scanned.is_empty() {
            relocation_call_sites(arch, obj)
        } else {
            scanned
        }
    };

    pcs.sort_unstable();
    pcs.dedup();
    pcs
}

fn scan_call_sites(arch: Arch, obj: &object::File<'_>) -> Vec<u64> {
    let targets: HashSet<u64> = symbol_addresses(obj, TRACE_PC).into_iter().collect();
    if targets.is_empty() {
        debug!("{TRACE_PC} is not defined, nothing to scan for");
        return Vec::new();
    }

    let mut pcs = Vec::new();
    for section in obj.sections().filter(|s| s.kind() == SectionKind::Text) {
        let Ok(data) = section.data() else {
            continue;
        };
        pcs.extend(scan_calls(arch, section.address(), data, &targets));
    }
    pcs
}

/// Find direct calls into `targets` within one code section
///
/// The section is disassembled, so only real call instructions count:
/// `call rel32` on x86, `bl` on arm64, and `jal` or `auipc`+`jalr` on
/// riscv64. Other arches rely on relocations.
#[must_use]
pub fn scan_calls(arch: Arch, section_addr: u64, data: &[u8], targets: &HashSet<u64>) -> Vec<u64> {
    let Some(cs) = disassembler(arch) else {
        return Vec::new();
    };
    let result = cs.and_then(|mut cs| {
        // Keep going over literal pools and padding
        cs.set_skipdata(true)?;
        let insns = cs.disasm_all(data, section_addr)?;
        Ok(match arch {
            Arch::RiscV64 => riscv64_calls(&insns, targets),
            _ => direct_calls(&cs, arch, &insns, targets),
        })
    });
    result.unwrap_or_else(|e| {
        warn!("Failed to disassemble code at 0x{section_addr:x}: {e}");
        Vec::new()
    })
}

fn disassembler(arch: Arch) -> Option<CsResult<Capstone>> {
    let cs = match arch {
        Arch::Amd64 => Capstone::new().x86().mode(x86::ArchMode::Mode64).detail(true).build(),
        Arch::I386 => Capstone::new().x86().mode(x86::ArchMode::Mode32).detail(true).build(),
        Arch::Arm64 => Capstone::new().arm64().mode(arm64::ArchMode::Arm).detail(true).build(),
        Arch::RiscV64 => Capstone::new()
            .riscv()
            .mode(riscv::ArchMode::RiscV64)
            .extra_mode([riscv::ArchExtraMode::RiscVC].iter().copied())
            .build(),
        _ => return None,
    };
    Some(cs)
}

/// x86 `call` and arm64 `bl` with an immediate destination
fn direct_calls(cs: &Capstone, arch: Arch, insns: &Instructions<'_>, targets: &HashSet<u64>) -> Vec<u64> {
    let mnemonic = if arch == Arch::Arm64 { "bl" } else { "call" };
    let mut pcs = Vec::new();
    for insn in insns.iter().filter(|insn| insn.mnemonic() == Some(mnemonic)) {
        let Ok(detail) = cs.insn_detail(insn) else {
            continue;
        };
        let dest = match detail.arch_detail().operands().as_slice() {
            [ArchOperand::X86Operand(op)] => match op.op_type {
                X86OperandType::Imm(dest) => dest,
                _ => continue,
            },
            [ArchOperand::Arm64Operand(op)] => match op.op_type {
                Arm64OperandType::Imm(dest) => dest,
                _ => continue,
            },
            _ => continue,
        };
        #[allow(clippy::cast_sign_loss)]
        let mut dest = dest as u64;
        if arch == Arch::I386 {
            dest &= 0xFFFF_FFFF;
        }
        if targets.contains(&dest) {
            pcs.push(insn.address());
        }
    }
    pcs
}

/// `jal ra` and `auipc rX` + `jalr ra, rX`; the recorded PC is the jump itself
fn riscv64_calls(insns: &Instructions<'_>, targets: &HashSet<u64>) -> Vec<u64> {
    let mut pcs = Vec::new();
    let mut auipc: Option<(u64, u32)> = None;
    for insn in insns.iter() {
        let Ok(word) = <[u8; 4]>::try_from(insn.bytes()) else {
            auipc = None;
            continue;
        };
        let word = u32::from_le_bytes(word);
        let pc = insn.address();
        let dest = match word & 0x7F {
            0x6F if rd(word) == RA => Some(pc.wrapping_add_signed(i64::from(jal_offset(word)))),
            0x67 if rd(word) == RA => auipc
                .filter(|&(_, hi)| rd(hi) == rs1(word))
                .map(|(at, hi)| {
                    at.wrapping_add_signed(i64::from(auipc_offset(hi)))
                        .wrapping_add_signed(i64::from(i_type_offset(word)))
                }),
            _ => None,
        };
        if dest.is_some_and(|dest| targets.contains(&dest)) {
            pcs.push(pc);
        }
        auipc = (word & 0x7F == 0x17).then_some((pc, word));
    }
    pcs
}

const RA: u32 = 1;

fn rd(insn: u32) -> u32 {
    (insn >> 7) & 0x1F
}

fn rs1(insn: u32) -> u32 {
    (insn >> 15) & 0x1F
}

#[allow(clippy::cast_possible_wrap)]
fn auipc_offset(insn: u32) -> i32 {
    (insn & 0xFFFF_F000) as i32
}

#[allow(clippy::cast_possible_wrap)]
fn i_type_offset(insn: u32) -> i32 {
    (insn as i32) >> 20
}

/// Sign-extended byte offset encoded in a JAL instruction
#[allow(clippy::cast_possible_wrap)]
fn jal_offset(insn: u32) -> i32 {
    let imm20 = (insn >> 31) & 0x1;
    let imm10_1 = (insn >> 21) & 0x3FF;
    let imm11 = (insn >> 20) & 0x1;
    let imm19_12 = (insn >> 12) & 0xFF;
    let imm = (imm20 << 20) | (imm19_12 << 12) | (imm11 << 11) | (imm10_1 << 1);
    ((imm << 11) as i32) >> 11
}

fn relocation_call_sites(arch: Arch, obj: &object::File<'_>) -> Vec<u64> {
    let relocatable = is_relocatable(obj);
    let mut pcs = Vec::new();

    // Call-site relocations point at the rel32 operand, one byte past the opcode
    let operand_skew = u64::from(matches!(arch, Arch::Amd64 | Arch::I386));

    for section in obj.sections() {
        // Relocatable modules only map `.text` at its load address
        let wanted = if relocatable {
            section.name().is_ok_and(|n| n == ".text")
        } else {
            section.kind() == SectionKind::Text
        };
        if !wanted {
            continue;
        }
        // Offsets are section-relative in relocatable objects, absolute otherwise
        let base = if relocatable { section.address() } else { 0 };

        for (offset, relocation) in section.relocations() {
            let RelocationTarget::Symbol(index) = relocation.target() else {
                continue;
            };
            let is_trace_pc = obj
                .symbol_by_index(index)
                .ok()
                .and_then(|s| s.name().ok())
                .is_some_and(|name| name == TRACE_PC);
            if !is_trace_pc {
                continue;
            }
            let site = (base + offset).wrapping_sub(operand_skew);
            // `call` expands to auipc+jalr and the jalr is the call site
            let pair = matches!(
                relocation.flags(),
                RelocationFlags::Elf { r_type: object::elf::R_RISCV_CALL | object::elf::R_RISCV_CALL_PLT }
            );
            pcs.push(if arch == Arch::RiscV64 && pair { site + 4 } else { site });
        }
    }
    pcs
}
