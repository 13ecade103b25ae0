// src/binary/arch.rs
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Bitmask of CPU architectures. A binary carries exactly one bit, rules may
/// carry several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Architecture(pub u32);

impl Architecture {
    pub const X86: Architecture = Architecture(1 << 0);
    pub const AMD64: Architecture = Architecture(1 << 1);
    pub const ARM: Architecture = Architecture(1 << 2);
    pub const ARM64: Architecture = Architecture(1 << 3);
    pub const RISCV: Architecture = Architecture(1 << 4);
    pub const PPC64: Architecture = Architecture(1 << 5);
    pub const MIPS: Architecture = Architecture(1 << 6);
    pub const S390X: Architecture = Architecture(1 << 7);

    pub const ALL_X86: Architecture = Architecture(Self::X86.0 | Self::AMD64.0);
    pub const ALL_ARM: Architecture = Architecture(Self::ARM.0 | Self::ARM64.0);

    const NAMED: [(Architecture, &'static str); 8] = [
        (Self::X86, "x86"),
        (Self::AMD64, "amd64"),
        (Self::ARM, "arm"),
        (Self::ARM64, "arm64"),
        (Self::RISCV, "riscv"),
        (Self::PPC64, "ppc64"),
        (Self::MIPS, "mips"),
        (Self::S390X, "s390x"),
    ];

    pub const fn union(self, other: Architecture) -> Architecture {
        Architecture(self.0 | other.0)
    }

    /// True when the two masks share at least one architecture.
    pub const fn matches(self, other: Architecture) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Map an ELF `e_machine` value. Unknown machines map to an empty mask.
    pub fn from_elf_machine(machine: u16) -> Architecture {
        use goblin::elf::header::{
            EM_386, EM_AARCH64, EM_ARM, EM_MIPS, EM_PPC64, EM_RISCV, EM_S390, EM_X86_64,
        };
        match machine {
            EM_386 => Self::X86,
            EM_X86_64 => Self::AMD64,
            EM_ARM => Self::ARM,
            EM_AARCH64 => Self::ARM64,
            EM_RISCV => Self::RISCV,
            EM_PPC64 => Self::PPC64,
            EM_MIPS => Self::MIPS,
            EM_S390 => Self::S390X,
            _ => Architecture(0),
        }
    }

    /// Names of the single architectures accepted on the command line.
    pub fn valid_names() -> Vec<&'static str> {
        Self::NAMED.iter().map(|(_, name)| *name).collect()
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMED
            .iter()
            .filter(|(arch, _)| self.matches(*arch))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            write!(f, "unknown")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::NAMED
            .iter()
            .find(|(_, name)| *name == wanted)
            .map(|(arch, _)| *arch)
            .ok_or_else(|| format!("unknown architecture: {}", s))
    }
}

impl Serialize for Architecture {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Instruction set revision, e.g. ARMv8.3 or x86-64-v2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Isa {
    pub major: u32,
    pub minor: u32,
}

impl Isa {
    pub const ARM64_V8_3: Isa = Isa::new(8, 3);
    pub const ARM64_V8_5: Isa = Isa::new(8, 5);
    pub const AMD64_V1: Isa = Isa::new(1, 0);
    pub const AMD64_V2: Isa = Isa::new(2, 0);
    pub const AMD64_V3: Isa = Isa::new(3, 0);
    pub const AMD64_V4: Isa = Isa::new(4, 0);

    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    pub fn is_zero(&self) -> bool {
        self.major == 0 && self.minor == 0
    }

    pub fn is_at_least(&self, other: &Isa) -> bool {
        (self.major, self.minor) >= (other.major, other.minor)
    }
}

impl fmt::Display for Isa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.minor == 0 && self.major < 8 {
            write!(f, "v{}", self.major)
        } else {
            write!(f, "v{}.{}", self.major, self.minor)
        }
    }
}

impl FromStr for Isa {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let body = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        let mut parts = body.splitn(2, '.');
        let major = parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .ok_or_else(|| format!("invalid ISA version: {}", s))?;
        let minor = match parts.next() {
            Some(p) => p
                .parse::<u32>()
                .map_err(|_| format!("invalid ISA version: {}", s))?,
            None => 0,
        };
        Ok(Isa::new(major, minor))
    }
}

/// Architecture mask plus the minimum ISA revision a feature needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Platform {
    pub architecture: Architecture,
    pub min_isa: Isa,
}

impl Platform {
    pub const ALL: Platform = Platform::new(
        Architecture::ALL_X86.union(Architecture::ALL_ARM),
        Isa::new(0, 0),
    );
    pub const ALL_X86: Platform = Platform::new(Architecture::ALL_X86, Isa::new(0, 0));
    pub const ARM64_V8_3: Platform = Platform::new(Architecture::ARM64, Isa::ARM64_V8_3);
    pub const ARM64_V8_5: Platform = Platform::new(Architecture::ARM64, Isa::ARM64_V8_5);

    pub const fn new(architecture: Architecture, min_isa: Isa) -> Self {
        Self {
            architecture,
            min_isa,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min_isa.is_zero() {
            write!(f, "{}", self.architecture)
        } else {
            write!(f, "{} {}", self.architecture, self.min_isa)
        }
    }
}
