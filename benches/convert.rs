// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use criterion::{criterion_group, criterion_main, Criterion};
use edgefirst_capture::format;

pub fn benchmark_convert(c: &mut Criterion) {
    let fmts = [format::YUYV, format::Y16, format::GREY, format::RGB3, format::UYVY];
    let dims = [(320, 240), (640, 480), (1280, 720), (1920, 1080)];

    for fmt in fmts.iter() {
        let conversion = format::lookup(*fmt).unwrap();
        let mut group = c.benchmark_group(format!("convert/{}", fmt.to_string().trim_end()));
        for dim in dims.iter() {
            let raw: Vec<u8> = (0..conversion.frame_size(dim.0, dim.1))
                .map(|i| (i * 31 % 251) as u8)
                .collect();
            group.bench_with_input(format!("{}x{}", dim.0, dim.1), &raw, |b, raw| {
                b.iter(|| conversion.convert(raw, dim.0, dim.1).unwrap())
            });
        }
        group.finish();
    }
}

criterion_group!(benches, benchmark_convert);
criterion_main!(benches);
