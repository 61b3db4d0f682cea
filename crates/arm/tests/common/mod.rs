use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use arm::{
    AccessType, Cpu, CpuException, CpuMode, Cycles, ExceptionHandlerResult, InstructionSet, Memory,
    Waitstates,
};

/// The SWI comment tests use to stop execution.
pub const HALT_SWI: u32 = 0xCE;

/// Flat zero-waitstate RAM covering the bottom of the address space.
/// Accesses wrap at the RAM size so stack pushes from address 0 stay inside.
pub struct TestMemory {
    pub data: Vec<u8>,
}

impl TestMemory {
    pub fn new() -> Self {
        TestMemory {
            data: vec![0; 0x10000],
        }
    }

    fn index(&self, address: u32) -> usize {
        address as usize % self.data.len()
    }

    pub fn set_word(&mut self, address: u32, value: u32) {
        for offset in 0..4 {
            let index = self.index(address + offset);
            self.data[index] = (value >> (offset * 8)) as u8;
        }
    }

    pub fn word(&self, address: u32) -> u32 {
        (0..4).fold(0u32, |acc, offset| {
            acc | u32::from(self.data[self.index(address + offset)]) << (offset * 8)
        })
    }
}

impl Memory for TestMemory {
    fn load8(&mut self, address: u32, _access: AccessType) -> (u8, Waitstates) {
        (self.data[self.index(address)], Waitstates::zero())
    }

    fn load16(&mut self, address: u32, _access: AccessType) -> (u16, Waitstates) {
        let address = address & !0x1;
        let lo = self.data[self.index(address)] as u16;
        let hi = self.data[self.index(address + 1)] as u16;
        (lo | (hi << 8), Waitstates::zero())
    }

    fn load32(&mut self, address: u32, _access: AccessType) -> (u32, Waitstates) {
        (self.word(address & !0x3), Waitstates::zero())
    }

    fn store8(&mut self, address: u32, value: u8, _access: AccessType) -> Waitstates {
        let index = self.index(address);
        self.data[index] = value;
        Waitstates::zero()
    }

    fn store16(&mut self, address: u32, value: u16, _access: AccessType) -> Waitstates {
        let address = address & !0x1;
        let index = self.index(address);
        self.data[index] = value as u8;
        let index = self.index(address + 1);
        self.data[index] = (value >> 8) as u8;
        Waitstates::zero()
    }

    fn store32(&mut self, address: u32, value: u32, _access: AccessType) -> Waitstates {
        self.set_word(address & !0x3, value);
        Waitstates::zero()
    }
}

pub struct Executor {
    pub cpu: Cpu,
    pub memory: TestMemory,
    halted: Arc<AtomicBool>,
}

impl Executor {
    /// Loads `code` at address 0 and prepares a CPU halting on `swi HALT_SWI`.
    pub fn from_arm(code: &[u32]) -> Self {
        let mut memory = TestMemory::new();
        for (index, &word) in code.iter().enumerate() {
            memory.set_word(index as u32 * 4, word);
        }
        Self::with_memory(InstructionSet::Arm, memory)
    }

    pub fn from_thumb(code: &[u16]) -> Self {
        let mut memory = TestMemory::new();
        for (index, &half) in code.iter().enumerate() {
            let address = index as u32 * 2;
            memory.data[address as usize] = half as u8;
            memory.data[address as usize + 1] = (half >> 8) as u8;
        }
        Self::with_memory(InstructionSet::Thumb, memory)
    }

    fn with_memory(isa: InstructionSet, mut memory: TestMemory) -> Self {
        let mut cpu = Cpu::new(isa, CpuMode::System, &mut memory);

        let halted = Arc::new(AtomicBool::new(false));
        let halted_in_handler = halted.clone();
        cpu.set_exception_handler(move |cpu, memory, exception| {
            if exception == CpuException::Swi {
                let address = cpu.exception_address();
                let comment = if cpu.registers.get_flag(arm::CpsrFlag::T) {
                    let (opcode, _) = memory.load16(address, AccessType::NonSequential);
                    u32::from(opcode) & 0xFF
                } else {
                    let (opcode, _) = memory.load32(address, AccessType::NonSequential);
                    opcode & 0xFF_FFFF
                };

                if comment == HALT_SWI {
                    halted_in_handler.store(true, Ordering::Relaxed);
                    return ExceptionHandlerResult::Handled(Cycles::one());
                }
            }
            ExceptionHandlerResult::Ignored
        });

        Executor {
            cpu,
            memory,
            halted,
        }
    }

    /// Runs until the halting SWI fires. Panics if it never does.
    pub fn run(&mut self) {
        for _ in 0..100_000 {
            if self.halted.load(Ordering::Relaxed) {
                return;
            }
            self.cpu.step(&mut self.memory);
        }
        panic!(
            "execution never reached the halting SWI; next pc = 0x{:08X}",
            self.cpu.next_execution_address()
        );
    }

    pub fn step(&mut self) -> Cycles {
        self.cpu.step(&mut self.memory)
    }
}

/// Shorthand used by the test files: assemble-by-hand, run, return the CPU.
pub fn execute_arm(code: &[u32]) -> Executor {
    let mut executor = Executor::from_arm(code);
    executor.run();
    executor
}

pub fn execute_thumb(code: &[u16]) -> Executor {
    let mut executor = Executor::from_thumb(code);
    executor.run();
    executor
}
