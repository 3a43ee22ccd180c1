use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lpddr5x_sim::dram::command::Command;
use lpddr5x_sim::dram::config::DramConfig;
use lpddr5x_sim::dram::Dram;

fn device_config() -> DramConfig {
    toml::from_str(
        r#"
impl = "LPDDR5X"
[org]
preset = "LPDDR5X_8Gb_x16"
[timing]
preset = "LPDDR5X_8533"
"#,
    )
    .unwrap()
}

pub fn issue_read_stream(c: &mut Criterion) {
    let config = device_config();
    c.bench_function("issue 256 reads", |b| {
        b.iter(|| {
            let mut dram = Dram::new(&config).unwrap();
            for i in 0..256usize {
                let addr = [0, 0, i % 4, (i / 4) % 4, i % 64, 0];
                loop {
                    let preq = dram.get_preq_command(Command::Rd32, &addr);
                    if dram.check_ready(preq, &addr) {
                        dram.issue_command(preq, &addr);
                        if preq == Command::Rd32 {
                            break;
                        }
                    }
                    dram.tick();
                }
            }
            black_box(dram.clk())
        })
    });
}

criterion_group!(benches, issue_read_stream);
criterion_main!(benches);
