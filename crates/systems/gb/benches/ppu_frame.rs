use criterion::{black_box, criterion_group, criterion_main, Criterion};
use emu_gb::ppu::{Ppu, CYCLES_PER_FRAME};

fn busy_ppu(cgb: bool) -> Ppu {
    let mut ppu = Ppu::new(cgb);
    // Background, window and 8x16 sprites.
    ppu.write_register(0xFF40, 0x00);
    for addr in 0x8000..0xA000u16 {
        ppu.write_vram(addr, (u32::from(addr).wrapping_mul(37) >> 3) as u8);
    }
    for i in 0..160u16 {
        ppu.write_oam(0xFE00 + i, (i * 7) as u8);
    }
    ppu.write_register(0xFF4A, 72);
    ppu.write_register(0xFF4B, 87);
    ppu.write_register(0xFF40, 0xE7);
    ppu
}

fn full_frame(c: &mut Criterion) {
    let mut dmg = busy_ppu(false);
    c.bench_function("ppu dmg one frame", |b| {
        b.iter(|| {
            dmg.step(black_box(CYCLES_PER_FRAME));
            black_box(dmg.take_frame());
        })
    });

    let mut cgb = busy_ppu(true);
    c.bench_function("ppu cgb one frame", |b| {
        b.iter(|| {
            cgb.step(black_box(CYCLES_PER_FRAME));
            black_box(cgb.take_frame());
        })
    });
}

criterion_group!(benches, full_frame);
criterion_main!(benches);
