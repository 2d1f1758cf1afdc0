use criterion::{black_box, criterion_group, criterion_main, Criterion};
use resource_core::{Attributes, Block, File, Format, ReadOptions};

fn sample_file(format: Format) -> File {
    let mut file = File::new(format);
    for (t, code) in ["PICT", "snd ", "TEXT", "DATA"].iter().enumerate() {
        for id in 0..64i64 {
            let payload = vec![(t as u8) ^ (id as u8); 4096];
            file.add_resource(code, id, &format!("{code}-{id}"), Block::from(payload), &Attributes::new());
        }
    }
    file
}

fn bench_write(c: &mut Criterion) {
    for format in [Format::Classic, Format::Extended, Format::Rez] {
        let file = sample_file(format);
        c.bench_function(&format!("write_{}_256x4k", format.name()), |b| {
            b.iter(|| black_box(&file).to_block(None).unwrap())
        });
    }
}

fn bench_read(c: &mut Criterion) {
    for format in [Format::Classic, Format::Extended, Format::Rez] {
        let image = sample_file(format).to_block(None).unwrap();
        c.bench_function(&format!("read_{}_zero_copy", format.name()), |b| {
            b.iter(|| File::from_block(black_box(image.share()), &ReadOptions::default()).unwrap())
        });
        let copying = ReadOptions { zero_copy: false, ..Default::default() };
        c.bench_function(&format!("read_{}_copying", format.name()), |b| {
            b.iter(|| File::from_block(black_box(image.share()), &copying).unwrap())
        });
    }
}

fn bench_fill(c: &mut Criterion) {
    let mut block = Block::new(1024 * 1024, Default::default());
    c.bench_function("block_fill_pattern_1mb", |b| {
        b.iter(|| block.fill_pattern(black_box(0xDEAD_BEEF), 1024 * 1024, 0))
    });
}

criterion_group!(benches, bench_write, bench_read, bench_fill);
criterion_main!(benches);
