//! Game Boy memory bus.
//!
//! # Memory Map
//!
//! ```text
//! $0000-$7FFF  Cartridge ROM (banked by the mapper)
//! $8000-$9FFF  Video RAM (two banks on the Color, VBK)
//! $A000-$BFFF  Cartridge RAM / mapper registers
//! $C000-$CFFF  Work RAM bank 0
//! $D000-$DFFF  Work RAM bank 1 (1-7 on the Color, SVBK)
//! $E000-$FDFF  Echo of $C000-$DDFF
//! $FE00-$FE9F  OAM
//! $FEA0-$FEFF  Unusable, reads 0
//! $FF00-$FF7F  I/O registers
//! $FF80-$FFFE  High RAM
//! $FFFF        Interrupt enable
//! ```
//!
//! The LR35902 has no separate I/O space; port accesses are rejected.
//! Sound registers are kept as plain storage since no audio unit runs.

use emu_core::cartridge::Cartridge;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::{CpuBus, EmuError, StateMap, Stateful};

use crate::interrupts;
use crate::joypad::Joypad;
use crate::mappers::GbMapper;
use crate::ppu::Ppu;
use crate::serial::Serial;
use crate::timer::Timer;

const WRAM_BANK_SIZE: usize = 0x1000;
const OAM_DMA_LENGTH: u16 = 0xA0;
const HDMA_BLOCK: u16 = 0x10;

pub struct GbBus {
    cgb: bool,
    pub(crate) ppu: Ppu,
    timer: Timer,
    joypad: Joypad,
    serial: Serial,
    pub(crate) cartridge: Option<GbMapper>,

    wram: Vec<u8>,
    wram_bank: u8,
    hram: [u8; 0x7F],
    sound_registers: [u8; 0x30],
    ie: u8,
    if_reg: u8,
    key1: u8,

    hdma_source: u16,
    hdma_dest: u16,
    hdma_blocks: u8,
    hdma_active: bool,

    frame_ready: bool,
}

impl GbBus {
    pub fn new(cgb: bool) -> Self {
        let wram_banks = if cgb { 8 } else { 2 };
        Self {
            cgb,
            ppu: Ppu::new(cgb),
            timer: Timer::new(),
            joypad: Joypad::new(),
            serial: Serial::new(),
            cartridge: None,
            wram: vec![0; WRAM_BANK_SIZE * wram_banks],
            wram_bank: 1,
            hram: [0; 0x7F],
            sound_registers: [0; 0x30],
            ie: 0,
            if_reg: interrupts::VBLANK,
            key1: 0,
            hdma_source: 0,
            hdma_dest: 0,
            hdma_blocks: 0,
            hdma_active: false,
            frame_ready: false,
        }
    }

    pub fn reset(&mut self) {
        let cartridge = self.cartridge.take();
        *self = Self::new(self.cgb);
        self.cartridge = cartridge;
    }

    pub fn is_cgb(&self) -> bool {
        self.cgb
    }

    pub fn ppu(&self) -> &Ppu {
        &self.ppu
    }

    pub fn cartridge(&self) -> Option<&GbMapper> {
        self.cartridge.as_ref()
    }

    /// Held buttons, see [`crate::buttons`].
    pub fn set_buttons(&mut self, pressed: u8) {
        self.joypad.set_pressed(pressed);
    }

    /// Bytes sent over the link cable since the last call.
    pub fn take_serial_output(&mut self) -> Vec<u8> {
        self.serial.take_output()
    }

    /// True once after the LCD finished a frame.
    pub fn take_frame_ready(&mut self) -> bool {
        std::mem::take(&mut self.frame_ready)
    }

    /// IF with the unused bits reading high.
    pub fn interrupt_flags(&self) -> u8 {
        0xE0 | self.if_reg
    }

    pub fn request_interrupt(&mut self, mask: u8) {
        self.if_reg |= mask & 0x1F;
    }

    fn wram_index(&self, addr: u16) -> usize {
        let offset = usize::from(addr & 0x0FFF);
        if addr & 0x1000 == 0 {
            offset
        } else {
            usize::from(self.wram_bank) * WRAM_BANK_SIZE + offset
        }
    }

    fn read_cart(&self, addr: u16) -> Result<u8, EmuError> {
        match &self.cartridge {
            Some(cart) => cart.read(addr),
            None => Ok(0xFF),
        }
    }

    fn read_io(&self, addr: u16) -> u8 {
        match addr {
            0xFF00 => self.joypad.read(),
            0xFF01 | 0xFF02 => self.serial.read_register(addr),
            0xFF04..=0xFF07 => self.timer.read_register(addr),
            0xFF0F => self.interrupt_flags(),
            0xFF10..=0xFF3F => self.sound_registers[usize::from(addr - 0xFF10)],
            0xFF40..=0xFF45 | 0xFF47..=0xFF4B | 0xFF4F | 0xFF68..=0xFF6B => {
                self.ppu.read_register(addr)
            }
            0xFF4D if self.cgb => 0x7E | self.key1,
            0xFF55 if self.cgb => self.hdma_status(),
            0xFF70 if self.cgb => 0xF8 | self.wram_bank,
            _ => 0xFF,
        }
    }

    fn write_io(&mut self, addr: u16, val: u8) -> Result<(), EmuError> {
        match addr {
            0xFF00 => self.joypad.write(val),
            0xFF01 | 0xFF02 => self.serial.write_register(addr, val),
            0xFF04..=0xFF07 => self.timer.write_register(addr, val),
            0xFF0F => self.if_reg = val & 0x1F,
            0xFF10..=0xFF3F => self.sound_registers[usize::from(addr - 0xFF10)] = val,
            0xFF46 => self.oam_dma(val)?,
            0xFF40..=0xFF45 | 0xFF47..=0xFF4B | 0xFF4F | 0xFF68..=0xFF6B => {
                self.ppu.write_register(addr, val)
            }
            0xFF4D if self.cgb => {
                log(LogCategory::Stubs, LogLevel::Debug, || {
                    format!("KEY1 <- {val:02X}, double speed is not emulated")
                });
                self.key1 = val & 0x01;
            }
            0xFF51 if self.cgb => self.hdma_source = (self.hdma_source & 0x00FF) | (u16::from(val) << 8),
            0xFF52 if self.cgb => self.hdma_source = (self.hdma_source & 0xFF00) | u16::from(val & 0xF0),
            0xFF53 if self.cgb => {
                self.hdma_dest = (self.hdma_dest & 0x00FF) | (u16::from(val & 0x1F) << 8)
            }
            0xFF54 if self.cgb => self.hdma_dest = (self.hdma_dest & 0xFF00) | u16::from(val & 0xF0),
            0xFF55 if self.cgb => self.start_hdma(val)?,
            0xFF70 if self.cgb => {
                let bank = val & 0x07;
                self.wram_bank = if bank == 0 { 1 } else { bank };
            }
            _ => {}
        }
        Ok(())
    }

    /// Copies 160 bytes from `page << 8` into OAM in one go.
    fn oam_dma(&mut self, page: u8) -> Result<(), EmuError> {
        // Pages past work RAM read through the echo area.
        let page = if page > 0xDF { page - 0x20 } else { page };
        let source = u16::from(page) << 8;
        for offset in 0..OAM_DMA_LENGTH {
            let byte = self.read(source + offset)?;
            self.ppu.write_oam_dma(usize::from(offset), byte);
        }
        Ok(())
    }

    fn hdma_status(&self) -> u8 {
        match (self.hdma_active, self.hdma_blocks) {
            (true, blocks) => blocks.wrapping_sub(1) & 0x7F,
            (false, 0) => 0xFF,
            (false, blocks) => 0x80 | (blocks.wrapping_sub(1) & 0x7F),
        }
    }

    fn start_hdma(&mut self, val: u8) -> Result<(), EmuError> {
        if self.hdma_active && val & 0x80 == 0 {
            self.hdma_active = false;
            log(LogCategory::Video, LogLevel::Debug, || {
                format!("HDMA cancelled, {} blocks left", self.hdma_blocks)
            });
            return Ok(());
        }
        self.hdma_blocks = (val & 0x7F) + 1;
        if val & 0x80 != 0 {
            self.hdma_active = true;
            return Ok(());
        }
        log(LogCategory::Video, LogLevel::Trace, || {
            format!(
                "GDMA {:04X} -> {:04X}, {} bytes",
                self.hdma_source,
                0x8000 | self.hdma_dest,
                u16::from(self.hdma_blocks) * HDMA_BLOCK
            )
        });
        while self.hdma_blocks > 0 {
            self.hdma_block()?;
        }
        Ok(())
    }

    fn hdma_block(&mut self) -> Result<(), EmuError> {
        for _ in 0..HDMA_BLOCK {
            let byte = self.read(self.hdma_source)?;
            self.ppu.write_vram_dma(0x8000 | (self.hdma_dest & 0x1FFF), byte);
            self.hdma_source = self.hdma_source.wrapping_add(1);
            self.hdma_dest = (self.hdma_dest + 1) & 0x1FFF;
        }
        self.hdma_blocks -= 1;
        if self.hdma_blocks == 0 {
            self.hdma_active = false;
        }
        Ok(())
    }
}

impl CpuBus for GbBus {
    fn read(&mut self, addr: u16) -> Result<u8, EmuError> {
        let value = match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => self.read_cart(addr)?,
            0x8000..=0x9FFF => self.ppu.read_vram(addr),
            0xC000..=0xDFFF => self.wram[self.wram_index(addr)],
            0xE000..=0xFDFF => self.wram[self.wram_index(addr - 0x2000)],
            0xFE00..=0xFE9F => self.ppu.read_oam(addr),
            0xFEA0..=0xFEFF => 0x00,
            0xFF00..=0xFF7F => self.read_io(addr),
            0xFF80..=0xFFFE => self.hram[usize::from(addr - 0xFF80)],
            0xFFFF => self.ie,
        };
        Ok(value)
    }

    fn write(&mut self, addr: u16, val: u8) -> Result<(), EmuError> {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                if let Some(cart) = &mut self.cartridge {
                    cart.write(addr, val)?;
                }
            }
            0x8000..=0x9FFF => self.ppu.write_vram(addr, val),
            0xC000..=0xDFFF => {
                let index = self.wram_index(addr);
                self.wram[index] = val;
            }
            0xE000..=0xFDFF => {
                let index = self.wram_index(addr - 0x2000);
                self.wram[index] = val;
            }
            0xFE00..=0xFE9F => self.ppu.write_oam(addr, val),
            0xFEA0..=0xFEFF => {}
            0xFF00..=0xFF7F => self.write_io(addr, val)?,
            0xFF80..=0xFFFE => self.hram[usize::from(addr - 0xFF80)] = val,
            0xFFFF => self.ie = val,
        }
        Ok(())
    }

    fn io_read(&mut self, port: u8) -> Result<u8, EmuError> {
        Err(EmuError::UnsupportedPort {
            device: "gb bus",
            port,
        })
    }

    fn io_write(&mut self, port: u8, _val: u8) -> Result<(), EmuError> {
        Err(EmuError::UnsupportedPort {
            device: "gb bus",
            port,
        })
    }

    fn tick(&mut self, cycles: u32) -> Result<(), EmuError> {
        if self.ppu.step(cycles) {
            self.frame_ready = true;
        }
        self.if_reg |= self.ppu.take_interrupts();
        if self.ppu.take_hblank() && self.hdma_active {
            self.hdma_block()?;
        }

        self.timer.step(cycles);
        if self.timer.take_interrupt() {
            self.if_reg |= interrupts::TIMER;
        }
        self.serial.step(cycles);
        if self.serial.take_interrupt() {
            self.if_reg |= interrupts::SERIAL;
        }
        if self.joypad.take_interrupt() {
            self.if_reg |= interrupts::JOYPAD;
        }
        if let Some(cart) = &mut self.cartridge {
            cart.step(cycles);
        }
        Ok(())
    }

    fn irq_line(&self) -> bool {
        self.if_reg & self.ie & 0x1F != 0
    }
}

impl Stateful for GbBus {
    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        state.put("wram", self.wram.as_slice());
        state.put("wram_bank", self.wram_bank);
        state.put("hram", &self.hram[..]);
        state.put("sound_registers", &self.sound_registers[..]);
        state.put("ie", self.ie);
        state.put("if", self.if_reg);
        state.put("key1", self.key1);
        state.put("hdma_source", self.hdma_source);
        state.put("hdma_dest", self.hdma_dest);
        state.put("hdma_blocks", self.hdma_blocks);
        state.put("hdma_active", self.hdma_active);
        state.insert_scope("ppu", self.ppu.capture_state());
        state.insert_scope("timer", self.timer.capture_state());
        state.insert_scope("joypad", self.joypad.capture_state());
        state.insert_scope("serial", self.serial.capture_state());
        if let Some(cart) = &self.cartridge {
            state.insert_scope("cart", cart.capture_state());
        }
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        state.get_bytes_into("wram", &mut self.wram)?;
        let bank: u8 = state.get("wram_bank")?;
        self.wram_bank = if self.cgb { (bank & 0x07).max(1) } else { 1 };
        state.get_bytes_into("hram", &mut self.hram)?;
        state.get_bytes_into("sound_registers", &mut self.sound_registers)?;
        self.ie = state.get("ie")?;
        self.if_reg = state.get::<u8>("if")? & 0x1F;
        self.key1 = state.get("key1")?;
        self.hdma_source = state.get("hdma_source")?;
        self.hdma_dest = state.get::<u16>("hdma_dest")? & 0x1FFF;
        self.hdma_blocks = state.get("hdma_blocks")?;
        self.hdma_active = state.get("hdma_active")?;
        self.ppu.restore_state(&state.scope("ppu"))?;
        self.timer.restore_state(&state.scope("timer"))?;
        self.joypad.restore_state(&state.scope("joypad"))?;
        self.serial.restore_state(&state.scope("serial"))?;
        if let Some(cart) = &mut self.cartridge {
            cart.restore_state(&state.scope("cart"))?;
        }
        self.frame_ready = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{test_rom, CartridgeHeader};
    use crate::ppu::CYCLES_PER_LINE;

    fn bus(cgb: bool) -> GbBus {
        let mut bus = GbBus::new(cgb);
        let rom = test_rom(0x03, 2, 0x03);
        let header = CartridgeHeader::parse(&rom).unwrap();
        bus.cartridge = Some(GbMapper::new(&header, rom));
        bus
    }

    #[test]
    fn test_echo_ram() {
        let mut bus = bus(false);
        bus.write(0xC123, 0x42).unwrap();
        assert_eq!(bus.read(0xE123).unwrap(), 0x42);
        bus.write(0xFDFF, 0x24).unwrap();
        assert_eq!(bus.read(0xDDFF).unwrap(), 0x24);
    }

    #[test]
    fn test_unusable_area_reads_zero() {
        let mut bus = bus(false);
        bus.write(0xFEA0, 0x55).unwrap();
        assert_eq!(bus.read(0xFEA0).unwrap(), 0x00);
    }

    #[test]
    fn test_hram_and_ie() {
        let mut bus = bus(false);
        bus.write(0xFF80, 1).unwrap();
        bus.write(0xFFFE, 2).unwrap();
        bus.write(0xFFFF, 0x1F).unwrap();
        assert_eq!(bus.read(0xFF80).unwrap(), 1);
        assert_eq!(bus.read(0xFFFE).unwrap(), 2);
        assert_eq!(bus.read(0xFFFF).unwrap(), 0x1F);
    }

    #[test]
    fn test_interrupt_flags_and_irq_line() {
        let mut bus = bus(false);
        bus.write(0xFF0F, 0x00).unwrap();
        assert_eq!(bus.read(0xFF0F).unwrap(), 0xE0);
        bus.write(0xFF07, 0x05).unwrap();
        bus.write(0xFF05, 0xFF).unwrap();
        bus.tick(16).unwrap();
        assert_eq!(bus.read(0xFF0F).unwrap() & 0x1F, interrupts::TIMER);
        assert!(!bus.irq_line());
        bus.write(0xFFFF, interrupts::TIMER).unwrap();
        assert!(bus.irq_line());
    }

    #[test]
    fn test_vblank_reaches_if() {
        let mut bus = bus(false);
        bus.write(0xFF0F, 0x00).unwrap();
        bus.tick(CYCLES_PER_LINE * 144).unwrap();
        assert!(bus.take_frame_ready());
        assert_eq!(bus.read(0xFF0F).unwrap() & interrupts::VBLANK, interrupts::VBLANK);
    }

    #[test]
    fn test_oam_dma_copies_page() {
        let mut bus = bus(false);
        for i in 0..0xA0u16 {
            bus.write(0xC100 + i, i as u8).unwrap();
        }
        bus.write(0xFF40, 0x00).unwrap();
        bus.write(0xFF46, 0xC1).unwrap();
        assert_eq!(bus.read(0xFE00).unwrap(), 0);
        assert_eq!(bus.read(0xFE9F).unwrap(), 0x9F);
    }

    #[test]
    fn test_joypad_interrupt_on_press() {
        let mut bus = bus(false);
        bus.write(0xFF0F, 0x00).unwrap();
        bus.set_buttons(crate::buttons::START);
        bus.tick(4).unwrap();
        assert_eq!(bus.read(0xFF0F).unwrap() & interrupts::JOYPAD, interrupts::JOYPAD);
        bus.write(0xFF00, 0x10).unwrap();
        assert_eq!(bus.read(0xFF00).unwrap() & 0x0F, 0x07);
    }

    #[test]
    fn test_io_ports_rejected() {
        let mut bus = bus(false);
        assert!(matches!(
            bus.io_read(0x10),
            Err(EmuError::UnsupportedPort { port: 0x10, .. })
        ));
        assert!(bus.io_write(0x10, 0).is_err());
    }

    #[test]
    fn test_cgb_wram_banks() {
        let mut bus = bus(true);
        bus.write(0xFF70, 2).unwrap();
        bus.write(0xD000, 0x22).unwrap();
        bus.write(0xFF70, 0).unwrap();
        assert_eq!(bus.read(0xFF70).unwrap(), 0xF9);
        assert_eq!(bus.read(0xD000).unwrap(), 0x00);
        bus.write(0xFF70, 2).unwrap();
        assert_eq!(bus.read(0xD000).unwrap(), 0x22);
        // Bank 0 is fixed.
        bus.write(0xC000, 0x11).unwrap();
        bus.write(0xFF70, 5).unwrap();
        assert_eq!(bus.read(0xC000).unwrap(), 0x11);
    }

    #[test]
    fn test_dmg_ignores_color_registers() {
        let mut bus = bus(false);
        bus.write(0xFF70, 3).unwrap();
        assert_eq!(bus.read(0xFF70).unwrap(), 0xFF);
        assert_eq!(bus.read(0xFF55).unwrap(), 0xFF);
    }

    #[test]
    fn test_general_purpose_hdma() {
        let mut bus = bus(true);
        bus.write(0xFF40, 0x00).unwrap();
        for i in 0..0x20u16 {
            bus.write(0xC000 + i, 0x80 + i as u8).unwrap();
        }
        bus.write(0xFF51, 0xC0).unwrap();
        bus.write(0xFF52, 0x00).unwrap();
        bus.write(0xFF53, 0x01).unwrap();
        bus.write(0xFF54, 0x00).unwrap();
        bus.write(0xFF55, 0x01).unwrap();
        assert_eq!(bus.read(0xFF55).unwrap(), 0xFF);
        assert_eq!(bus.read(0x8100).unwrap(), 0x80);
        assert_eq!(bus.read(0x811F).unwrap(), 0x9F);
    }

    #[test]
    fn test_hblank_hdma_one_block_per_line() {
        let mut bus = bus(true);
        for i in 0..0x30u16 {
            bus.write(0xC000 + i, 0x40 + i as u8).unwrap();
        }
        bus.write(0xFF51, 0xC0).unwrap();
        bus.write(0xFF52, 0x00).unwrap();
        bus.write(0xFF53, 0x00).unwrap();
        bus.write(0xFF54, 0x00).unwrap();
        bus.write(0xFF55, 0x82).unwrap();
        assert_eq!(bus.read(0xFF55).unwrap(), 0x02);

        // First H-Blank of line 0.
        bus.tick(80).unwrap();
        bus.tick(172).unwrap();
        assert_eq!(bus.read(0xFF55).unwrap(), 0x01);
        assert_eq!(bus.ppu().vram()[0x0F], 0x4F);

        bus.tick(CYCLES_PER_LINE - 252).unwrap();
        bus.tick(252).unwrap();
        assert_eq!(bus.read(0xFF55).unwrap(), 0x00);
        // Cancel the last block.
        bus.write(0xFF55, 0x00).unwrap();
        assert_eq!(bus.read(0xFF55).unwrap(), 0x80);
        bus.tick(CYCLES_PER_LINE).unwrap();
        assert_eq!(bus.ppu().vram()[0x20], 0x00);
    }

    #[test]
    fn test_state_roundtrip() {
        let mut bus = bus(true);
        bus.write(0xC000, 0x12).unwrap();
        bus.write(0xFF80, 0x34).unwrap();
        bus.write(0xFF70, 3).unwrap();
        bus.tick(10_000).unwrap();
        let state = bus.capture_state();
        let mut other = self::bus(true);
        other.restore_state(&state).unwrap();
        assert_eq!(other.read(0xC000).unwrap(), 0x12);
        assert_eq!(other.read(0xFF80).unwrap(), 0x34);
        assert_eq!(other.read(0xFF70).unwrap(), 0xFB);
        assert_eq!(other.capture_state(), state);
    }
}
