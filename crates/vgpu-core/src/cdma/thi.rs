//! THI (host interface) register block shared by the NVDEC and VIC classes.

/// Number of 32-bit registers in a THI block.
pub const THI_REGISTER_COUNT: usize = 32;

/// THI methods the channel interpreter acts on. The value is the register offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThiMethod {
    IncSyncpt = 0x00,
    SetMethod0 = 0x10,
    SetMethod1 = 0x11,
}

impl ThiMethod {
    pub fn from_offset(offset: u32) -> Option<Self> {
        match offset {
            0x00 => Some(ThiMethod::IncSyncpt),
            0x10 => Some(ThiMethod::SetMethod0),
            0x11 => Some(ThiMethod::SetMethod1),
            _ => None,
        }
    }
}

/// THI register file.
///
/// Layout: [0x00]=increment_syncpt, [0x02]=increment_syncpt_error,
/// [0x03]=ctx_switch_increment_syncpt, [0x08]=ctx_switch, [0x0A]=ctx_syncpt_eof,
/// [0x10]=method_0, [0x11]=method_1, [0x1E]=int_status, [0x1F]=int_mask.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThiRegisters {
    regs: [u32; THI_REGISTER_COUNT],
}

impl Default for ThiRegisters {
    fn default() -> Self {
        Self {
            regs: [0; THI_REGISTER_COUNT],
        }
    }
}

impl ThiRegisters {
    /// Store `data` at word `offset`. Returns false if the offset is outside the block.
    pub fn write(&mut self, offset: u32, data: u32) -> bool {
        match self.regs.get_mut(offset as usize) {
            Some(reg) => {
                *reg = data;
                true
            }
            None => false,
        }
    }

    pub fn read(&self, offset: u32) -> Option<u32> {
        self.regs.get(offset as usize).copied()
    }

    /// Method selector latched by `SetMethod0`.
    pub fn method_0(&self) -> u32 {
        self.regs[ThiMethod::SetMethod0 as usize]
    }
}
