use crate::{
    exception::{CpuException, ExceptionHandler, ExceptionHandlerResult, EXCEPTION_BASE},
    lookup,
    memory::{AccessType, Memory},
    CpsrFlag, CpuMode, Cycles, Registers,
};

pub type InstrFn = fn(u32, &mut Cpu, &mut dyn Memory) -> Cycles;

/// mov r0, r0 -- an ARM instruction that does nothing.
const ARM_NOOP_OPCODE: u32 = 0xE1A00000;

/// mov r8, r8 -- a THUMB instruction that does nothing.
const THUMB_NOOP_OPCODE: u16 = 0x46C0;

#[derive(PartialEq, Clone, Copy, Eq)]
pub enum InstructionSet {
    Arm,
    Thumb,
}

/// The ARM7TDMI interpreter.
///
/// The three-stage pipeline is modeled as the two raw words ahead of the
/// executing instruction: `decoded` is the word about to execute and
/// `fetched` the word after it. While an instruction executes, R15 reads as
/// its own address plus 8 (ARM) or plus 4 (THUMB). A branch (or anything
/// else that writes R15) refills both slots.
pub struct Cpu {
    pub registers: Registers,
    fetched: u32,
    decoded: u32,
    next_fetch_access: AccessType,
    exception_handler: Option<ExceptionHandler>,
}

impl Cpu {
    /// Creates a CPU whose pipeline has not been filled yet. [`Cpu::branch`]
    /// must run before the first [`Cpu::step`], otherwise the PC will be one
    /// instruction ahead of where it should be.
    pub fn uninitialized(isa: InstructionSet, mode: CpuMode) -> Self {
        let mut registers = Registers::new(mode);

        let noop_opcode = if isa == InstructionSet::Thumb {
            registers.set_flag(CpsrFlag::T);
            THUMB_NOOP_OPCODE as u32
        } else {
            registers.clear_flag(CpsrFlag::T);
            ARM_NOOP_OPCODE
        };

        Cpu {
            registers,
            fetched: noop_opcode,
            decoded: noop_opcode,
            next_fetch_access: AccessType::NonSequential,
            exception_handler: None,
        }
    }

    pub fn new(isa: InstructionSet, mode: CpuMode, memory: &mut dyn Memory) -> Self {
        let mut cpu = Cpu::uninitialized(isa, mode);
        cpu.branch(0, memory);
        cpu
    }

    /// Executes the next instruction and returns the cycles it consumed,
    /// including the opcode fetch that happens alongside it.
    #[inline]
    pub fn step(&mut self, memory: &mut dyn Memory) -> Cycles {
        if self.registers.get_flag(CpsrFlag::T) {
            self.step_thumb(memory)
        } else {
            self.step_arm(memory)
        }
    }

    fn step_arm(&mut self, memory: &mut dyn Memory) -> Cycles {
        let opcode = self.decoded;
        self.decoded = self.fetched;

        let fetch_pc = (self.registers.read(15) & !0x3).wrapping_add(4);
        self.registers.write(15, fetch_pc);

        let access = std::mem::replace(&mut self.next_fetch_access, AccessType::Sequential);
        let (fetched, wait) = memory.code32(fetch_pc, access);
        self.fetched = fetched;

        let cycles = Cycles::one() + wait;
        if check_condition(opcode >> 28, &self.registers) {
            let exec_fn = lookup::decode_arm_opcode(opcode);
            cycles + exec_fn(opcode, self, memory)
        } else {
            cycles
        }
    }

    fn step_thumb(&mut self, memory: &mut dyn Memory) -> Cycles {
        let opcode = self.decoded;
        self.decoded = self.fetched;

        let fetch_pc = (self.registers.read(15) & !0x1).wrapping_add(2);
        self.registers.write(15, fetch_pc);

        let access = std::mem::replace(&mut self.next_fetch_access, AccessType::Sequential);
        let (fetched, wait) = memory.code16(fetch_pc, access);
        self.fetched = fetched as u32;

        let exec_fn = lookup::decode_thumb_opcode(opcode);
        Cycles::one() + wait + exec_fn(opcode, self, memory)
    }

    /// Flushes the pipeline and refills it from `address` in the current
    /// state. Everything that writes R15 funnels through here.
    pub fn branch(&mut self, address: u32, memory: &mut dyn Memory) -> Cycles {
        if self.registers.get_flag(CpsrFlag::T) {
            self.branch_thumb(address, memory)
        } else {
            self.branch_arm(address, memory)
        }
    }

    pub(crate) fn branch_arm(&mut self, address: u32, memory: &mut dyn Memory) -> Cycles {
        let address = address & !0x3;

        let (decoded, wait_decode) = memory.code32(address, AccessType::NonSequential);
        let (fetched, wait_fetch) = memory.code32(address.wrapping_add(4), AccessType::Sequential);

        self.decoded = decoded;
        self.fetched = fetched;
        self.next_fetch_access = AccessType::Sequential;
        self.registers.write(15, address.wrapping_add(4));

        Cycles::from(2) + wait_decode + wait_fetch
    }

    pub(crate) fn branch_thumb(&mut self, address: u32, memory: &mut dyn Memory) -> Cycles {
        let address = address & !0x1;

        let (decoded, wait_decode) = memory.code16(address, AccessType::NonSequential);
        let (fetched, wait_fetch) = memory.code16(address.wrapping_add(2), AccessType::Sequential);

        self.decoded = decoded as u32;
        self.fetched = fetched as u32;
        self.next_fetch_access = AccessType::Sequential;
        self.registers.write(15, address.wrapping_add(2));

        Cycles::from(2) + wait_decode + wait_fetch
    }

    /// Marks the next opcode fetch as non-sequential. Stores do this: the
    /// data access breaks up the prefetch stream.
    #[inline]
    pub(crate) fn interrupt_prefetch(&mut self) {
        self.next_fetch_access = AccessType::NonSequential;
    }

    /// The address of the instruction that will be executed next.
    pub fn next_execution_address(&self) -> u32 {
        if self.registers.get_flag(CpsrFlag::T) {
            self.registers.read(15).wrapping_sub(2)
        } else {
            self.registers.read(15).wrapping_sub(4)
        }
    }

    /// The address of the currently executing instruction. Only meaningful
    /// from inside an instruction or exception handler.
    pub fn exception_address(&self) -> u32 {
        if self.registers.get_flag(CpsrFlag::T) {
            self.registers.read(15).wrapping_sub(4)
        } else {
            self.registers.read(15).wrapping_sub(8)
        }
    }

    /// Installs a hook that runs before architectural exception entry.
    /// Returns the previously installed handler.
    pub fn set_exception_handler<F>(&mut self, handler: F) -> Option<ExceptionHandler>
    where
        F: 'static
            + Send
            + Sync
            + FnMut(&mut Cpu, &mut dyn Memory, CpuException) -> ExceptionHandlerResult,
    {
        self.exception_handler.replace(Box::new(handler))
    }

    /// Raises an exception between instructions (IRQ, reset).
    pub fn exception(&mut self, exception: CpuException, memory: &mut dyn Memory) -> Cycles {
        self.exception_with_ret(exception, self.next_execution_address(), memory)
    }

    /// Raises an exception from inside the currently executing instruction
    /// (SWI, undefined instruction). The return address is the instruction
    /// after the faulting one, which the advanced pipeline PC already points
    /// one instruction past.
    pub(crate) fn exception_internal(
        &mut self,
        exception: CpuException,
        memory: &mut dyn Memory,
    ) -> Cycles {
        self.exception_with_ret(exception, self.next_execution_address(), memory)
    }

    /// Architectural exception entry:
    ///   - R14_new = return address (+ the per-exception adjustment)
    ///   - SPSR_new = old CPSR
    ///   - CPSR mode = entry mode, T = 0 (ARM state)
    ///   - I = 1 always; F = 1 for Reset and FIQ only
    ///   - PC = vector
    fn exception_with_ret(
        &mut self,
        exception: CpuException,
        return_addr: u32,
        memory: &mut dyn Memory,
    ) -> Cycles {
        // The handler is taken out while it runs; reentrant exception
        // handling is not a thing we want and the borrow checker agrees.
        if let Some(mut handler) = self.exception_handler.take() {
            let result = handler(self, memory, exception);
            if self.exception_handler.is_none() {
                self.exception_handler = Some(handler);
            }
            if let ExceptionHandlerResult::Handled(cycles) = result {
                return cycles;
            }
        }

        let info = exception.info();
        let vector = EXCEPTION_BASE + info.offset;

        let cpsr = self.registers.read_cpsr();
        self.registers.write_mode(info.mode_on_entry);
        self.registers.write_spsr(cpsr);
        self.registers
            .write(14, return_addr.wrapping_add(info.pc_adjust));
        self.registers.clear_flag(CpsrFlag::T);
        self.registers.set_flag(CpsrFlag::I);

        if let Some(f) = info.f_flag {
            self.registers.put_flag(CpsrFlag::F, f);
        }

        self.branch_arm(vector, memory)
    }
}

/// Evaluates an ARM condition code against the current flags.
pub(crate) fn check_condition(cond: u32, regs: &Registers) -> bool {
    let n = regs.get_flag(CpsrFlag::N);
    let z = regs.get_flag(CpsrFlag::Z);
    let c = regs.get_flag(CpsrFlag::C);
    let v = regs.get_flag(CpsrFlag::V);

    match cond {
        0x0 => z,            // EQ     equal (zero set)
        0x1 => !z,           // NE     not equal
        0x2 => c,            // CS/HS  unsigned higher or same
        0x3 => !c,           // CC/LO  unsigned lower
        0x4 => n,            // MI     negative
        0x5 => !n,           // PL     positive or zero
        0x6 => v,            // VS     overflow
        0x7 => !v,           // VC     no overflow
        0x8 => c && !z,      // HI     unsigned higher
        0x9 => !c || z,      // LS     unsigned lower or same
        0xA => n == v,       // GE     signed greater or equal
        0xB => n != v,       // LT     signed less than
        0xC => !z && n == v, // GT     signed greater than
        0xD => z || n != v,  // LE     signed less or equal
        0xE => true,         // AL     always
        0xF => false,        // NV     never (reserved on ARMv4)
        _ => unreachable!("bad condition code: {cond:04b}"),
    }
}
