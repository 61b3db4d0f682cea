mod alu;
mod arm;
mod clock;
mod cpu;
mod exception;
mod lookup;
mod memory;
mod registers;
mod thumb;

pub use clock::{Cycles, Waitstates};
pub use cpu::{Cpu, InstrFn, InstructionSet};
pub use exception::{CpuException, ExceptionHandler, ExceptionHandlerResult};
pub use memory::{AccessType, Memory};
pub use registers::{CpsrFlag, CpuMode, Registers};
