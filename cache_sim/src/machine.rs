use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::{
    cache::{Cache, CacheConfig, CacheStat, ConfigError},
    common::{Pc, Word},
    instr::Instr,
    memory::{Addr, Memory, MemoryAccessError, MEM_WORD_SIZE},
    register::{RegFile, RegId, NUM_REGS},
    trace::TraceSink,
};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Memory(#[from] MemoryAccessError),
}

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    MemoryAccessError(#[from] MemoryAccessError),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

type Result<T, E = RuntimeError> = std::result::Result<T, E>;

#[derive(Default)]
pub enum ControlFlow {
    #[default]
    Continue,
    Halt,
}

/// the word machine: register file, program counter, and memory reached
/// exclusively through the cache, instruction fetches included.
pub struct Machine<T> {
    reg_file: RegFile,
    memory: Memory<MEM_WORD_SIZE>,
    cache: Cache,
    pc: Pc,
    trace: T,
    executed: usize,
}

impl<T: TraceSink> Machine<T> {
    pub fn new(image: &[Word], config: CacheConfig, trace: T) -> Result<Self, BuildError> {
        let mut memory = Memory::new();
        memory.load_image(image)?;
        log::info!("loaded image of {} words", image.len());
        Ok(Self {
            reg_file: RegFile::new(),
            memory,
            cache: Cache::new(config)?,
            pc: Pc::new(0),
            trace,
            executed: 0,
        })
    }

    /// fetches, decodes and executes one instruction.
    pub fn step(&mut self) -> Result<ControlFlow> {
        let old_pc = self.pc;
        let bin = self
            .cache
            .read(&mut self.memory, old_pc.into_addr(), &mut self.trace)?;
        let instr = Instr::decode_from(bin)?;
        log::trace!("pc={old_pc}: {instr}");
        self.pc.incr();
        self.executed += 1;
        match instr {
            Instr::Add { rs1, rs2, rd } => {
                let val = self.reg_file.get(rs1).wrapping_add(self.reg_file.get(rs2));
                self.reg_file.set(rd, val);
            }
            Instr::Nand { rs1, rs2, rd } => {
                let val = !(self.reg_file.get(rs1) & self.reg_file.get(rs2));
                self.reg_file.set(rd, val);
            }
            Instr::Lw { base, dst, offset } => {
                let addr = self.effective_addr(base, offset)?;
                let val = self.cache.read(&mut self.memory, addr, &mut self.trace)?;
                self.reg_file.set(dst, val);
            }
            Instr::Sw { base, src, offset } => {
                let addr = self.effective_addr(base, offset)?;
                let val = self.reg_file.get(src);
                self.cache.write(&mut self.memory, addr, val, &mut self.trace)?;
            }
            Instr::Beq { rs1, rs2, offset } => {
                if self.reg_file.get(rs1) == self.reg_file.get(rs2) {
                    let target = self.pc.into_usize() as i64 + offset as i64;
                    self.pc = Pc::new(self.memory.addr_of(target)?.inner());
                }
            }
            Instr::Jalr { rs, rd } => {
                // link is written before the target register is read: jalr
                // with equal registers jumps to the following instruction
                self.reg_file.set(rd, self.pc.into_usize() as Word);
                let target = self.reg_file.get(rs);
                self.pc = Pc::new(self.memory.addr_of(target as i64)?.inner());
            }
            Instr::Halt => return Ok(ControlFlow::Halt),
            Instr::Noop => {}
        }
        Ok(ControlFlow::Continue)
    }

    /// runs to `halt`.
    pub fn run(&mut self) -> Result<()> {
        loop {
            if let ControlFlow::Halt = self.step()? {
                log::info!("machine halted after {} instructions", self.executed);
                return Ok(());
            }
        }
    }

    fn effective_addr(&self, base: RegId, offset: i32) -> Result<Addr, MemoryAccessError> {
        self.memory
            .addr_of(self.reg_file.get(base) as i64 + offset as i64)
    }

    pub fn pc(&self) -> Pc {
        self.pc
    }

    pub fn executed(&self) -> usize {
        self.executed
    }

    pub fn reg(&self, id: RegId) -> Word {
        self.reg_file.get(id)
    }

    pub fn cache_stat(&self) -> CacheStat {
        self.cache.stat()
    }

    pub fn into_trace(self) -> T {
        self.trace
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let memory = (0..self.memory.image_len())
            .map(|i| {
                self.memory
                    .get(Addr::new(i))
                    .unwrap_or_else(|_| unreachable!("image prefix is in range"))
            })
            .collect();
        StateSnapshot {
            pc: self.pc.into_usize(),
            executed: self.executed,
            registers: *self.reg_file.raw(),
            memory,
        }
    }
}

/// point-in-time view of the architectural state. memory is the backing
/// store as-is: dirty cache lines are not flushed into it.
#[derive(Serialize)]
pub struct StateSnapshot {
    pub pc: usize,
    pub executed: usize,
    pub registers: [Word; NUM_REGS],
    /// the image-length prefix of the backing store
    pub memory: Vec<Word>,
}

impl fmt::Display for StateSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "state:")?;
        writeln!(f, "\tpc {}", self.pc)?;
        writeln!(f, "\tmemory:")?;
        for (i, w) in self.memory.iter().enumerate() {
            writeln!(f, "\t\tmem[ {i} ] {w}")?;
        }
        writeln!(f, "\tregisters:")?;
        for (i, w) in self.registers.iter().enumerate() {
            writeln!(f, "\t\treg[ {i} ] {w}")?;
        }
        write!(f, "end state")
    }
}
