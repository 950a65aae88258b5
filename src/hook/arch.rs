//! Instruction sets and their absolute jump encodings.

use goblin::elf::header::{machine_to_str, EM_386, EM_AARCH64, EM_ARM, EM_X86_64};
use strum::{Display, EnumIter};

use crate::{Error, Result};

/// Instruction set of a patch site.
///
/// | Architecture | Patch | Length |
/// |--------------|-------|--------|
/// | `Arm` | `ldr pc, [pc, #-4]` + address | 8 |
/// | `Thumb` | (`nop`) + `ldr.w pc, [pc]` + address | 8 or 10 |
/// | `AArch64` | `ldr x16, #8` + `br x16` + address | 16 |
/// | `X86_64` | `jmp [rip]` + address | 14 |
/// | `X86` | `push imm32` + `ret` | 6 |
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Architecture {
    /// 32-bit ARM (A32)
    Arm,
    /// 32-bit ARM Thumb-2 (T32)
    Thumb,
    /// 64-bit ARM
    AArch64,
    /// x86-64
    X86_64,
    /// 32-bit x86
    X86,
}

#[cfg(target_arch = "aarch64")]
const HOST: Architecture = Architecture::AArch64;
#[cfg(target_arch = "arm")]
const HOST: Architecture = Architecture::Thumb;
#[cfg(target_arch = "x86")]
const HOST: Architecture = Architecture::X86;
#[cfg(not(any(target_arch = "aarch64", target_arch = "arm", target_arch = "x86")))]
const HOST: Architecture = Architecture::X86_64;

impl Architecture {
    /// The instruction set of the running host.
    #[must_use]
    pub const fn host() -> Self {
        HOST
    }

    /// Architecture of an ELF `e_machine` value.
    ///
    /// 32-bit ARM modules answer [`Architecture::Arm`]; the mode of each function comes
    /// from its symbol address, see [`Architecture::for_symbol`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedArchitecture`] for any other machine.
    pub fn from_elf_machine(machine: u16) -> Result<Self> {
        match machine {
            EM_ARM => Ok(Self::Arm),
            EM_AARCH64 => Ok(Self::AArch64),
            EM_X86_64 => Ok(Self::X86_64),
            EM_386 => Ok(Self::X86),
            other => Err(Error::UnsupportedArchitecture(machine_to_str(other))),
        }
    }

    /// Refines a 32-bit ARM architecture from the interworking bit of a symbol address.
    ///
    /// Thumb function symbols carry bit 0 set. Other architectures are returned unchanged.
    #[must_use]
    pub fn for_symbol(self, address: usize) -> Self {
        match self {
            Self::Arm | Self::Thumb if address & 1 == 1 => Self::Thumb,
            Self::Arm | Self::Thumb => Self::Arm,
            other => other,
        }
    }

    /// Address of the first instruction of a symbol, without the interworking bit.
    #[must_use]
    pub fn code_address(self, address: usize) -> usize {
        match self {
            Self::Thumb => address & !1,
            _ => address,
        }
    }

    /// Encodes an absolute jump to `target` placed at code address `at`.
    ///
    /// For `Thumb`, `target` keeps its interworking bit, so a Thumb destination stays in
    /// Thumb state.
    #[must_use]
    pub fn encode_jump(self, at: usize, target: usize) -> Vec<u8> {
        let mut code = Vec::with_capacity(16);
        match self {
            Self::Arm => {
                code.extend_from_slice(&0xE51F_F004u32.to_le_bytes());
                code.extend_from_slice(&(target as u32).to_le_bytes());
            }
            Self::Thumb => {
                // the literal must be word aligned
                if at & 2 != 0 {
                    code.extend_from_slice(&0xBF00u16.to_le_bytes());
                }
                code.extend_from_slice(&0xF8DFu16.to_le_bytes());
                code.extend_from_slice(&0xF000u16.to_le_bytes());
                code.extend_from_slice(&(target as u32).to_le_bytes());
            }
            Self::AArch64 => {
                code.extend_from_slice(&0x5800_0050u32.to_le_bytes());
                code.extend_from_slice(&0xD61F_0200u32.to_le_bytes());
                code.extend_from_slice(&(target as u64).to_le_bytes());
            }
            Self::X86_64 => {
                code.extend_from_slice(&[0xFF, 0x25, 0x00, 0x00, 0x00, 0x00]);
                code.extend_from_slice(&(target as u64).to_le_bytes());
            }
            Self::X86 => {
                code.push(0x68);
                code.extend_from_slice(&(target as u32).to_le_bytes());
                code.push(0xC3);
            }
        }
        code
    }

    /// Length of the jump [`Architecture::encode_jump`] produces at `at`.
    #[must_use]
    pub fn jump_len(self, at: usize) -> usize {
        match self {
            Self::Arm => 8,
            Self::Thumb if at & 2 != 0 => 10,
            Self::Thumb => 8,
            Self::AArch64 => 16,
            Self::X86_64 => 14,
            Self::X86 => 6,
        }
    }
}

impl Default for Architecture {
    fn default() -> Self {
        Self::host()
    }
}
