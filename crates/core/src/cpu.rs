//! Boundary between the hardware simulation and an instruction-level CPU.
//!
//! Instruction decoding lives outside this workspace. A CPU implementation
//! drives a [`CpuBus`]: every memory or port access goes through the bus, and
//! after each instruction the CPU reports the cycles it consumed so the bus
//! can advance video, audio and cartridge hardware by the same amount.

use crate::state::StateMap;
use crate::EmuError;

/// Everything a CPU sees of the machine.
pub trait CpuBus {
    fn read(&mut self, addr: u16) -> Result<u8, EmuError>;

    fn write(&mut self, addr: u16, val: u8) -> Result<(), EmuError>;

    /// Port read for CPUs with a separate I/O space.
    fn io_read(&mut self, port: u8) -> Result<u8, EmuError>;

    /// Port write for CPUs with a separate I/O space.
    fn io_write(&mut self, port: u8, val: u8) -> Result<(), EmuError>;

    /// Advance every clocked device by `cycles` master cycles.
    fn tick(&mut self, cycles: u32) -> Result<(), EmuError>;

    /// Maskable interrupt request level.
    fn irq_line(&self) -> bool;

    /// Non-maskable interrupt request. Edge-triggered: the CPU calls
    /// [`CpuBus::acknowledge_nmi`] once it has taken it.
    fn nmi_line(&self) -> bool {
        false
    }

    fn acknowledge_nmi(&mut self) {}
}

/// An instruction-level CPU. `step` runs one instruction and returns the
/// cycles it took; devices are ticked by [`Cpu::run_cycles`].
pub trait Cpu<B: CpuBus> {
    fn reset(&mut self);

    fn step(&mut self, bus: &mut B) -> Result<u32, EmuError>;

    /// Run whole instructions until at least `budget` cycles have elapsed.
    /// Returns the cycles actually consumed, which may overshoot the budget.
    fn run_cycles(&mut self, bus: &mut B, budget: u32) -> Result<u32, EmuError> {
        let mut elapsed = 0u32;
        while elapsed < budget {
            let cycles = self.step(bus)?.max(1);
            bus.tick(cycles)?;
            elapsed += cycles;
        }
        Ok(elapsed)
    }

    /// Register state for save states. CPUs without state support return an
    /// empty map.
    fn capture_state(&self) -> StateMap {
        StateMap::new()
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        let _ = state;
        Ok(())
    }
}

/// Stand-in CPU that never fetches and burns a fixed 4 cycles per step.
/// Used for headless runs and for exercising device timing in tests.
#[derive(Debug, Default, Clone)]
pub struct HaltedCpu {
    steps: u64,
}

impl HaltedCpu {
    pub const CYCLES_PER_STEP: u32 = 4;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }
}

impl<B: CpuBus> Cpu<B> for HaltedCpu {
    fn reset(&mut self) {
        self.steps = 0;
    }

    fn step(&mut self, _bus: &mut B) -> Result<u32, EmuError> {
        self.steps += 1;
        Ok(Self::CYCLES_PER_STEP)
    }

    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        state.put("steps", self.steps);
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        self.steps = state.get("steps")?;
        Ok(())
    }
}
