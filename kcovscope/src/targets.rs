//! Target registry
//!
//! An explicit, immutable table of the OS/architecture pairs the report
//! engine understands. The registry is built once at process start and
//! passed by reference into sessions; nothing in here is mutable.
//!
//! Each [`Target`] knows:
//! - the file name of its kernel/executable image inside the object dir
//! - the ELF machine its images must carry
//! - the length of the call instruction kcov reports the return address of
//! - which backend family handles module discovery and symbolization

use crate::domain::CoverError;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Os {
    Linux,
    FreeBsd,
    NetBsd,
    OpenBsd,
    Fuchsia,
}

impl Os {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::FreeBsd => "freebsd",
            Os::NetBsd => "netbsd",
            Os::OpenBsd => "openbsd",
            Os::Fuchsia => "fuchsia",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Arch {
    Amd64,
    I386,
    Arm64,
    Arm,
    RiscV64,
    Ppc64le,
    S390x,
    Mips64le,
}

impl Arch {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Arch::Amd64 => "amd64",
            Arch::I386 => "386",
            Arch::Arm64 => "arm64",
            Arch::Arm => "arm",
            Arch::RiscV64 => "riscv64",
            Arch::Ppc64le => "ppc64le",
            Arch::S390x => "s390x",
            Arch::Mips64le => "mips64le",
        }
    }

    /// Length of the call instruction whose return address kcov records
    #[must_use]
    pub fn call_instruction_len(self) -> u64 {
        match self {
            Arch::Amd64 | Arch::I386 => 5,
            Arch::Arm64 | Arch::Ppc64le | Arch::RiscV64 => 4,
            Arch::Arm => 3,
            Arch::S390x => 6,
            Arch::Mips64le => 8,
        }
    }

    /// ELF machine images for this arch must carry
    #[must_use]
    pub fn object_architecture(self) -> object::Architecture {
        match self {
            Arch::Amd64 => object::Architecture::X86_64,
            Arch::I386 => object::Architecture::I386,
            Arch::Arm64 => object::Architecture::Aarch64,
            Arch::Arm => object::Architecture::Arm,
            Arch::RiscV64 => object::Architecture::Riscv64,
            Arch::Ppc64le => object::Architecture::PowerPc64,
            Arch::S390x => object::Architecture::S390x,
            Arch::Mips64le => object::Architecture::Mips64,
        }
    }
}

/// How modules are found and symbolized for a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendFamily {
    /// ELF kernel image plus `.ko` modules
    LinuxElf,
    /// ELF kernel image only
    GenericElf,
}

/// One OS/architecture pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub os: Os,
    pub arch: Arch,
    /// Image file name inside the kernel object dir
    pub kernel_object: &'static str,
    pub family: BackendFamily,
}

impl Target {
    /// Registry key, e.g. `linux/amd64`
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}", self.os.as_str(), self.arch.as_str())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os.as_str(), self.arch.as_str())
    }
}

/// Immutable table of supported targets
#[derive(Debug, Clone)]
pub struct TargetRegistry {
    targets: BTreeMap<String, Target>,
}

impl TargetRegistry {
    /// The built-in target table
    #[must_use]
    pub fn builtin() -> Self {
        let linux = |arch| Target {
            os: Os::Linux,
            arch,
            kernel_object: "vmlinux",
            family: BackendFamily::LinuxElf,
        };
        let generic = |os, arch, kernel_object| Target {
            os,
            arch,
            kernel_object,
            family: BackendFamily::GenericElf,
        };

        let all = [
            linux(Arch::Amd64),
            linux(Arch::I386),
            linux(Arch::Arm64),
            linux(Arch::Arm),
            linux(Arch::RiscV64),
            linux(Arch::Ppc64le),
            linux(Arch::S390x),
            linux(Arch::Mips64le),
            generic(Os::FreeBsd, Arch::Amd64, "kernel.full"),
            generic(Os::FreeBsd, Arch::I386, "kernel.full"),
            generic(Os::NetBsd, Arch::Amd64, "netbsd.gdb"),
            generic(Os::OpenBsd, Arch::Amd64, "bsd.gdb"),
            generic(Os::Fuchsia, Arch::Amd64, "zircon.elf"),
            generic(Os::Fuchsia, Arch::Arm64, "zircon.elf"),
        ];

        Self { targets: all.into_iter().map(|t| (t.key(), t)).collect() }
    }

    /// Look up a target by `os/arch` key
    ///
    /// # Errors
    /// Returns `UnknownTarget` for keys not in the table
    pub fn get(&self, key: &str) -> Result<&Target, CoverError> {
        self.targets.get(key).ok_or_else(|| CoverError::UnknownTarget(key.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }
}

/// PC of the call instruction given the return address kcov recorded
#[must_use]
pub fn previous_instruction_pc(target: &Target, pc: u64) -> u64 {
    let pc = pc.wrapping_sub(target.arch.call_instruction_len());
    // Thumb call sites have the low bit set
    if target.arch == Arch::Arm {
        return pc & !1;
    }
    pc
}

/// Inverse of [`previous_instruction_pc`]: the return address of a call site
#[must_use]
pub fn next_instruction_pc(target: &Target, pc: u64) -> u64 {
    pc.wrapping_add(target.arch.call_instruction_len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let registry = TargetRegistry::builtin();
        let target = registry.get("linux/amd64").unwrap();
        assert_eq!(target.kernel_object, "vmlinux");
        assert_eq!(target.family, BackendFamily::LinuxElf);
        assert_eq!(registry.get("freebsd/amd64").unwrap().kernel_object, "kernel.full");
    }

    #[test]
    fn test_unknown_target() {
        let registry = TargetRegistry::builtin();
        let err = registry.get("plan9/amd64").unwrap_err();
        assert!(err.to_string().contains("plan9/amd64"));
    }

    #[test]
    fn test_previous_instruction_pc() {
        let registry = TargetRegistry::builtin();
        let amd64 = registry.get("linux/amd64").unwrap();
        assert_eq!(previous_instruction_pc(amd64, 0xffff_ffff_8100_0105), 0xffff_ffff_8100_0100);

        let arm64 = registry.get("linux/arm64").unwrap();
        assert_eq!(previous_instruction_pc(arm64, 0x1004), 0x1000);

        let arm = registry.get("linux/arm").unwrap();
        assert_eq!(previous_instruction_pc(arm, 0x1004), 0x1000);
        assert_eq!(previous_instruction_pc(arm, 0x1005), 0x1002);
    }

    #[test]
    fn test_next_undoes_previous() {
        let registry = TargetRegistry::builtin();
        for target in registry.iter().filter(|t| t.arch != Arch::Arm) {
            let pc = 0x4000_1234;
            assert_eq!(next_instruction_pc(target, previous_instruction_pc(target, pc)), pc);
        }
    }
}
