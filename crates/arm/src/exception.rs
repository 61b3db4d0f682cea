use crate::{memory::Memory, Cpu, CpuMode, Cycles};

/// Hook invoked before the CPU performs architectural exception entry.
/// Returning [`ExceptionHandlerResult::Handled`] suppresses the exception;
/// the GBA uses this for HLE BIOS calls and tests use it to stop execution.
pub type ExceptionHandler =
    Box<dyn Send + Sync + FnMut(&mut Cpu, &mut dyn Memory, CpuException) -> ExceptionHandlerResult>;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ExceptionHandlerResult {
    Handled(Cycles),
    Ignored,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CpuException {
    Reset,
    Undefined,
    Swi,
    PrefetchAbort,
    DataAbort,
    Irq,
    Fiq,
}

impl CpuException {
    fn name(self) -> &'static str {
        match self {
            CpuException::Reset => "Reset",
            CpuException::Undefined => "Undefined",
            CpuException::Swi => "SWI",
            CpuException::PrefetchAbort => "Prefetch Abort",
            CpuException::DataAbort => "Data Abort",
            CpuException::Irq => "IRQ",
            CpuException::Fiq => "FIQ",
        }
    }

    pub(crate) fn info(self) -> CpuExceptionInfo {
        // The following are the exception vectors in memory. When an exception
        // arises, the CPU is switched into ARM state and the program counter
        // is loaded with the respective address:
        //   Address  Exception                  Mode on Entry      Interrupt Flags
        //   BASE+00h Reset                      Supervisor (_svc)  I=1, F=1
        //   BASE+04h Undefined Instruction      Undefined  (_und)  I=1, F=unchanged
        //   BASE+08h Software Interrupt (SWI)   Supervisor (_svc)  I=1, F=unchanged
        //   BASE+0Ch Prefetch Abort             Abort      (_abt)  I=1, F=unchanged
        //   BASE+10h Data Abort                 Abort      (_abt)  I=1, F=unchanged
        //   BASE+18h Normal Interrupt (IRQ)     IRQ        (_irq)  I=1, F=unchanged
        //   BASE+1Ch Fast Interrupt (FIQ)       FIQ        (_fiq)  I=1, F=1
        match self {
            CpuException::Reset => CpuExceptionInfo::new(CpuMode::Supervisor, Some(true), 0, 0x00),
            CpuException::Undefined => CpuExceptionInfo::new(CpuMode::Undefined, None, 0, 0x04),
            CpuException::Swi => CpuExceptionInfo::new(CpuMode::Supervisor, None, 0, 0x08),
            CpuException::PrefetchAbort => CpuExceptionInfo::new(CpuMode::Abort, None, 4, 0x0C),
            CpuException::DataAbort => CpuExceptionInfo::new(CpuMode::Abort, None, 4, 0x10),
            CpuException::Irq => CpuExceptionInfo::new(CpuMode::Irq, None, 4, 0x18),
            CpuException::Fiq => CpuExceptionInfo::new(CpuMode::Fiq, Some(true), 4, 0x1C),
        }
    }
}

impl std::fmt::Display for CpuException {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct CpuExceptionInfo {
    pub(crate) mode_on_entry: CpuMode,
    pub(crate) f_flag: Option<bool>,
    pub(crate) pc_adjust: u32,
    pub(crate) offset: u32,
}

impl CpuExceptionInfo {
    const fn new(
        mode_on_entry: CpuMode,
        f_flag: Option<bool>,
        pc_adjust: u32,
        offset: u32,
    ) -> CpuExceptionInfo {
        CpuExceptionInfo {
            mode_on_entry,
            f_flag,
            pc_adjust,
            offset,
        }
    }
}

pub const EXCEPTION_BASE: u32 = 0;
