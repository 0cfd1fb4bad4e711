//! Sega 8-bit memory and I/O bus.
//!
//! Memory map:
//! - 0x0000-0xBFFF: cartridge (paged by the mapper)
//! - 0xC000-0xFFFF: system RAM, mirrored (8 KiB, 1 KiB on the SG-1000);
//!   writes to 0xFFFC-0xFFFF also reach the mapper registers
//!
//! I/O ports are decoded on A7, A6 and A0:
//! - 0x00-0x3F: memory control (even), I/O control (odd)
//! - 0x40-0x7F: V counter / H counter on read, PSG on write
//! - 0x80-0xBF: VDP data (even), VDP control/status (odd)
//! - 0xC0-0xFF: controller ports 0xDC / 0xDD
//!
//! The Game Gear adds ports 0x00-0x06 (start button, region, serial, PSG
//! stereo) in front of that decoding.

use emu_core::apu::{AudioChip, PsgVariant, Sn76489};
use emu_core::cartridge::Cartridge;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::{ClockConfiguration, CpuBus, EmuError, Region, StateMap, Stateful};
use serde::{Deserialize, Serialize};

use crate::mappers::SmsMapper;
use crate::vdp::{Vdp, VdpVariant};

/// Controller bits, active high as passed to [`SmsBus::set_buttons`].
pub mod buttons {
    pub const UP: u8 = 0x01;
    pub const DOWN: u8 = 0x02;
    pub const LEFT: u8 = 0x04;
    pub const RIGHT: u8 = 0x08;
    pub const BUTTON_1: u8 = 0x10;
    pub const BUTTON_2: u8 = 0x20;
}

/// Console model; selects VDP, PSG and RAM size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmsModel {
    Sg1000,
    MasterSystem,
    GameGear,
}

impl SmsModel {
    pub fn machine_id(self) -> &'static str {
        match self {
            SmsModel::Sg1000 => "sg1000",
            SmsModel::MasterSystem => "sms",
            SmsModel::GameGear => "gamegear",
        }
    }

    pub fn vdp_variant(self) -> VdpVariant {
        match self {
            SmsModel::Sg1000 => VdpVariant::Tms9918a,
            SmsModel::MasterSystem => VdpVariant::Sms2,
            SmsModel::GameGear => VdpVariant::GameGear,
        }
    }

    pub fn psg_variant(self) -> PsgVariant {
        match self {
            SmsModel::Sg1000 => PsgVariant::Ti,
            SmsModel::MasterSystem => PsgVariant::Sega,
            SmsModel::GameGear => PsgVariant::GameGear,
        }
    }

    fn ram_size(self) -> usize {
        match self {
            SmsModel::Sg1000 => 0x0400,
            _ => 0x2000,
        }
    }

    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            SmsModel::Sg1000 => &["sg", "sc"],
            SmsModel::MasterSystem => &["sms"],
            SmsModel::GameGear => &["gg"],
        }
    }
}

const GG_PORT_DEFAULTS: [u8; 6] = [0xC0, 0x7F, 0xFF, 0x00, 0xFF, 0x00];

pub struct SmsBus {
    model: SmsModel,
    pub(crate) vdp: Vdp,
    pub(crate) psg: Sn76489,
    pub(crate) cartridge: Option<SmsMapper>,
    ram: Vec<u8>,

    memory_control: u8,
    io_control: u8,
    gg_ports: [u8; 6],

    pressed: [u8; 2],
    start_pressed: bool,
    nmi_pending: bool,
    japanese: bool,
    frame_ready: bool,
}

impl SmsBus {
    pub fn new(model: SmsModel, region: Region, clock: &ClockConfiguration) -> Self {
        Self {
            model,
            vdp: Vdp::new(model.vdp_variant(), region, clock.cycles_per_scanline()),
            psg: Sn76489::new(model.psg_variant(), clock),
            cartridge: None,
            ram: vec![0; model.ram_size()],
            memory_control: 0,
            io_control: 0xFF,
            gg_ports: GG_PORT_DEFAULTS,
            pressed: [0; 2],
            start_pressed: false,
            nmi_pending: false,
            japanese: false,
            frame_ready: false,
        }
    }

    pub fn reset(&mut self) {
        self.vdp.reset();
        self.psg.reset();
        self.ram.fill(0);
        self.memory_control = 0;
        self.io_control = 0xFF;
        self.gg_ports = GG_PORT_DEFAULTS;
        self.nmi_pending = false;
        self.frame_ready = false;
    }

    pub fn model(&self) -> SmsModel {
        self.model
    }

    pub fn vdp(&self) -> &Vdp {
        &self.vdp
    }

    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub fn set_japanese(&mut self, japanese: bool) {
        self.japanese = japanese;
    }

    /// Held buttons for player 0 or 1, see [`buttons`].
    pub fn set_buttons(&mut self, player: usize, pressed: u8) {
        if let Some(slot) = self.pressed.get_mut(player) {
            *slot = pressed & 0x3F;
        }
    }

    /// Game Gear start button (port 0x00, bit 7).
    pub fn set_start(&mut self, pressed: bool) {
        self.start_pressed = pressed;
    }

    /// Pause button: raises the NMI on SMS and SG-1000.
    pub fn press_pause(&mut self) {
        if self.model != SmsModel::GameGear {
            self.nmi_pending = true;
        }
    }

    /// True once after the VDP finished a frame.
    pub fn take_frame_ready(&mut self) -> bool {
        std::mem::take(&mut self.frame_ready)
    }

    fn port_dc(&self) -> u8 {
        let p1 = !self.pressed[0] & 0x3F;
        let p2 = (!self.pressed[1] & 0x03) << 6;
        if self.model == SmsModel::GameGear {
            p1 | 0xC0
        } else {
            p1 | p2
        }
    }

    fn port_dd(&self) -> u8 {
        if self.model == SmsModel::GameGear {
            return 0xFF;
        }
        let p2 = (!self.pressed[1] >> 2) & 0x0F;
        p2 | 0x30 | self.th_bits()
    }

    /// TH pins as seen on port 0xDD. Export consoles read back the output
    /// level; Japanese consoles read it inverted.
    fn th_bits(&self) -> u8 {
        let mut bits = 0xC0;
        for (direction, level, pin) in [(0x02, 0x20, 0x40), (0x08, 0x80, 0x80)] {
            if self.io_control & direction == 0 {
                let high = (self.io_control & level != 0) != self.japanese;
                if !high {
                    bits &= !pin;
                }
            }
        }
        bits
    }

    fn write_io_control(&mut self, val: u8) {
        let rising = |old: u8, new: u8, level: u8| old & level == 0 && new & level != 0;
        if rising(self.io_control, val, 0x20) || rising(self.io_control, val, 0x80) {
            self.vdp.latch_h_counter();
        }
        self.io_control = val;
    }

    fn gg_port_read(&self, port: u8) -> u8 {
        match port {
            0 => {
                let mut value = 0x00;
                if !self.start_pressed {
                    value |= 0x80;
                }
                if !self.japanese {
                    value |= 0x40;
                }
                if self.vdp.region() == Region::Pal {
                    value |= 0x20;
                }
                value
            }
            _ => self.gg_ports[usize::from(port).min(5)],
        }
    }

    fn gg_port_write(&mut self, port: u8, val: u8) -> Result<(), EmuError> {
        match port {
            0 => Ok(()),
            6 => self.psg.write_port(port, val),
            _ => {
                log(LogCategory::Stubs, LogLevel::Debug, || {
                    format!("GG serial port {port:02X} <- {val:02X}")
                });
                self.gg_ports[usize::from(port)] = val;
                Ok(())
            }
        }
    }

    fn ram_index(&self, addr: u16) -> usize {
        usize::from(addr) & (self.ram.len() - 1)
    }
}

impl CpuBus for SmsBus {
    fn read(&mut self, addr: u16) -> Result<u8, EmuError> {
        if addr >= 0xC000 {
            return Ok(self.ram[self.ram_index(addr)]);
        }
        match &self.cartridge {
            Some(cart) => cart.read(addr),
            None => Ok(0xFF),
        }
    }

    fn write(&mut self, addr: u16, val: u8) -> Result<(), EmuError> {
        if addr >= 0xC000 {
            let index = self.ram_index(addr);
            self.ram[index] = val;
            if addr < 0xFFFC {
                return Ok(());
            }
        }
        match &mut self.cartridge {
            Some(cart) => cart.write(addr, val),
            None => Ok(()),
        }
    }

    fn io_read(&mut self, port: u8) -> Result<u8, EmuError> {
        if self.model == SmsModel::GameGear && port < 0x07 {
            return Ok(self.gg_port_read(port));
        }
        let value = match (port & 0xC1, self.model) {
            (0x40, SmsModel::Sg1000) | (0x41, SmsModel::Sg1000) => 0xFF,
            (0x40, _) => self.vdp.v_counter(),
            (0x41, _) => self.vdp.h_counter(),
            (0x80, _) => self.vdp.read_data(),
            (0x81, _) => self.vdp.read_status(),
            (0xC0, _) => self.port_dc(),
            (0xC1, _) => self.port_dd(),
            _ => 0xFF,
        };
        Ok(value)
    }

    fn io_write(&mut self, port: u8, val: u8) -> Result<(), EmuError> {
        if self.model == SmsModel::GameGear && port < 0x07 {
            return self.gg_port_write(port, val);
        }
        match port & 0xC1 {
            0x00 if self.model != SmsModel::Sg1000 => {
                log(LogCategory::Stubs, LogLevel::Debug, || {
                    format!("memory control <- {val:02X}")
                });
                self.memory_control = val;
            }
            0x01 if self.model != SmsModel::Sg1000 => self.write_io_control(val),
            0x40 | 0x41 => self.psg.write_port(port, val)?,
            0x80 => self.vdp.write_data(val),
            0x81 => self.vdp.write_control(val),
            _ => {}
        }
        Ok(())
    }

    fn tick(&mut self, cycles: u32) -> Result<(), EmuError> {
        if self.vdp.step(cycles) {
            self.frame_ready = true;
        }
        self.psg.step(cycles);
        if let Some(cart) = &mut self.cartridge {
            cart.step(cycles);
        }
        Ok(())
    }

    fn irq_line(&self) -> bool {
        self.vdp.irq_line()
    }

    fn nmi_line(&self) -> bool {
        self.nmi_pending
    }

    fn acknowledge_nmi(&mut self) {
        self.nmi_pending = false;
    }
}

impl Stateful for SmsBus {
    fn capture_state(&self) -> StateMap {
        let mut state = StateMap::new();
        state.put("ram", self.ram.as_slice());
        state.put("memory_control", self.memory_control);
        state.put("io_control", self.io_control);
        state.put("gg_ports", &self.gg_ports[..]);
        state.put("nmi_pending", self.nmi_pending);
        state.insert_scope("vdp", self.vdp.capture_state());
        state.insert_scope("psg", self.psg.capture_state());
        if let Some(cart) = &self.cartridge {
            state.insert_scope("cart", cart.capture_state());
        }
        state
    }

    fn restore_state(&mut self, state: &StateMap) -> Result<(), EmuError> {
        state.get_bytes_into("ram", &mut self.ram)?;
        self.memory_control = state.get("memory_control")?;
        self.io_control = state.get("io_control")?;
        state.get_bytes_into("gg_ports", &mut self.gg_ports)?;
        self.nmi_pending = state.get("nmi_pending")?;
        self.vdp.restore_state(&state.scope("vdp"))?;
        self.psg.restore_state(&state.scope("psg"))?;
        if let Some(cart) = &mut self.cartridge {
            cart.restore_state(&state.scope("cart"))?;
        }
        self.frame_ready = false;
        Ok(())
    }
}
